use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::Instrument;

use crate::archive::{ArchivePlan, ArchiveWriter};
use crate::checkpoint::CheckpointStore;
use crate::constants::CLOSE_TIMEOUT_SECS;
use crate::mail::charset::{self, CharsetDetector, HeuristicDetector};
use crate::mail::parser;
use crate::mail::{Mailbox, MessageId};

use super::{MessageOutcome, PassReport, SkipReason, SyncError, SyncMode, SyncOptions};

/// What the engine remembers between passes of one process.
#[derive(Debug, Default)]
struct SyncState {
    checkpoint: Option<MessageId>,
    /// Archived while an earlier id was still failing, so above the checkpoint
    archived_ahead: BTreeSet<MessageId>,
    failures: HashMap<MessageId, u32>,
    dead_letters: BTreeSet<MessageId>,
    passes: u64,
}

/// Mirrors one mailbox folder into an archive directory.
///
/// The checkpoint only moves forward, one fully written message at a time,
/// and never past a message that failed.
pub struct SyncEngine<M> {
    mailbox: M,
    checkpoint_store: CheckpointStore,
    writer: ArchiveWriter,
    detector: Arc<dyn CharsetDetector>,
    options: SyncOptions,
    state: SyncState,
}

impl<M: Mailbox> SyncEngine<M> {
    pub fn new(
        mailbox: M,
        checkpoint_store: CheckpointStore,
        writer: ArchiveWriter,
        options: SyncOptions,
    ) -> Self {
        Self {
            mailbox,
            checkpoint_store,
            writer,
            detector: Arc::new(HeuristicDetector),
            options,
            state: SyncState::default(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_detector(mut self, detector: Arc<dyn CharsetDetector>) -> Self {
        self.detector = detector;
        self
    }

    #[cfg(test)]
    pub(crate) fn mailbox_mut(&mut self) -> &mut M {
        &mut self.mailbox
    }

    /// Run until the mode is exhausted or `shutdown` resolves.
    ///
    /// On every exit path the checkpoint of the last completed message is
    /// flushed and the mailbox is closed.
    pub async fn run(
        &mut self,
        mode: SyncMode,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), SyncError> {
        tracing::info!("Archiving into {}", self.writer.output_dir().display());
        let outcome = tokio::select! {
            result = self.run_passes(mode) => result,
            _ = shutdown => {
                tracing::info!("Shutdown requested, stopping sync");
                Ok(())
            }
        };

        let flushed = self.flush();
        // The session may be stuck mid-response after an interrupted pass
        let close_timeout = Duration::from_secs(CLOSE_TIMEOUT_SECS);
        if tokio::time::timeout(close_timeout, self.mailbox.close())
            .await
            .is_err()
        {
            tracing::warn!(
                "Closing the mailbox did not finish within {:?}, giving up",
                close_timeout
            );
        }

        if let Err(e) = &outcome {
            tracing::error!("Sync aborted: {}", e);
        }
        outcome.and(flushed)
    }

    async fn run_passes(&mut self, mode: SyncMode) -> Result<(), SyncError> {
        loop {
            self.run_pass().await?;

            match mode {
                SyncMode::OneShot => return Ok(()),
                SyncMode::Continuous(interval) => {
                    tracing::info!("Pass complete, sleeping for {:?}", interval);
                    tokio::time::sleep(interval).await;
                }
            }
        }
    }

    /// One traversal from the checkpoint to the newest message on the server.
    pub async fn run_pass(&mut self) -> Result<PassReport, SyncError> {
        self.state.passes += 1;
        let span = tracing::info_span!(
            "pass",
            folder = %self.options.folder,
            n = self.state.passes
        );
        self.run_pass_inner().instrument(span).await
    }

    async fn run_pass_inner(&mut self) -> Result<PassReport, SyncError> {
        // Every advance is persisted, so after the first pass the in-memory
        // value is authoritative
        if self.state.passes == 1 {
            self.state.checkpoint = if self.options.resume {
                self.checkpoint_store.load()?
            } else {
                tracing::info!("Resume disabled, archiving every message");
                None
            };
        }

        match self.state.checkpoint {
            Some(id) => tracing::info!(
                "Resuming after message {} (checkpoint {})",
                id,
                self.checkpoint_store.path().display()
            ),
            None => tracing::info!("No checkpoint, archiving everything"),
        }

        let ids = self
            .mailbox
            .list_ids_from(self.state.checkpoint)
            .await
            .map_err(SyncError::Connection)?;

        let mut report = PassReport {
            listed: ids.len(),
            ..PassReport::default()
        };
        // Set once a message fails; the checkpoint must not pass it
        let mut blocked = false;

        for id in ids {
            if self.state.archived_ahead.contains(&id) {
                report.already_handled += 1;
                if !blocked {
                    self.state.archived_ahead.remove(&id);
                    self.advance(id)?;
                }
                continue;
            }

            if self.state.dead_letters.contains(&id) {
                report.already_handled += 1;
                blocked = true;
                continue;
            }

            match self.process(id).await? {
                MessageOutcome::Archived { dir } => {
                    report.archived += 1;
                    tracing::debug!("Message {} archived to {}", id, dir.display());
                    if blocked {
                        self.state.archived_ahead.insert(id);
                    } else {
                        self.advance(id)?;
                    }
                }
                MessageOutcome::Skipped(reason) => {
                    report.skipped += 1;
                    blocked = true;
                    tracing::warn!(uid = %id, "Skipping message {}: {}", id, reason);
                    self.record_failure(id);
                }
            }
        }

        report.checkpoint = self.state.checkpoint;
        tracing::info!(
            "Pass finished: {} listed, {} archived, {} skipped, checkpoint {}",
            report.listed,
            report.archived,
            report.skipped,
            report
                .checkpoint
                .map(|id| id.to_string())
                .unwrap_or_else(|| "none".to_string())
        );
        Ok(report)
    }

    /// Fetch, decompose and write one message.
    async fn process(&mut self, id: MessageId) -> Result<MessageOutcome, SyncError> {
        let Some(raw) = self
            .mailbox
            .fetch_raw(id)
            .await
            .map_err(SyncError::Connection)?
        else {
            return Ok(MessageOutcome::Skipped(SkipReason::Vanished));
        };

        let writer = self.writer.clone();
        let detector = Arc::clone(&self.detector);
        let result =
            tokio::task::spawn_blocking(move || archive_message(&writer, detector.as_ref(), id, &raw))
                .await;

        Ok(match result {
            Ok(Ok(dir)) => MessageOutcome::Archived { dir },
            Ok(Err(reason)) => MessageOutcome::Skipped(reason),
            Err(e) => MessageOutcome::Skipped(SkipReason::Task(e.to_string())),
        })
    }

    /// Move the checkpoint to `id` and persist it before going on.
    fn advance(&mut self, id: MessageId) -> Result<(), SyncError> {
        self.checkpoint_store.save(id)?;
        self.state.checkpoint = Some(id);
        self.state.failures.remove(&id);
        Ok(())
    }

    fn record_failure(&mut self, id: MessageId) {
        let attempts = self.state.failures.entry(id).or_insert(0);
        *attempts += 1;

        if let Some(limit) = self.options.retry_limit
            && *attempts >= limit
        {
            tracing::error!(
                uid = %id,
                "Giving up on message {} after {} failed attempts; the checkpoint stays below it",
                id,
                attempts
            );
            self.state.dead_letters.insert(id);
        }
    }

    /// Persist the checkpoint of the last completed message.
    fn flush(&self) -> Result<(), SyncError> {
        if let Some(id) = self.state.checkpoint {
            self.checkpoint_store.save(id)?;
            tracing::debug!("Checkpoint {} flushed", id);
        }
        Ok(())
    }
}

fn archive_message(
    writer: &ArchiveWriter,
    detector: &dyn CharsetDetector,
    id: MessageId,
    raw: &[u8],
) -> Result<PathBuf, SkipReason> {
    let parsed = parser::decompose(raw)?;
    tracing::info!("Backing up message {} with subject: {}", id, parsed.subject);

    let plan = ArchivePlan::for_message(&parsed);
    let text = charset::decode_with_fallback(detector, &parsed.raw);
    let dir = writer.write(id, &plan, &text)?;

    if !plan.attachments.is_empty() {
        tracing::info!(
            "Message {}: wrote {} attachment(s)",
            id,
            plan.attachments.len()
        );
    }
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::Notify;

    #[derive(Default)]
    struct FakeMailbox {
        messages: BTreeMap<MessageId, Vec<u8>>,
        list_calls: Vec<Option<MessageId>>,
        fetched: Vec<MessageId>,
        fail_fetch: Option<MessageId>,
        notify_on_list: Option<(usize, Arc<Notify>)>,
        /// Fetching this id notifies and then never completes
        stall_fetch: Option<(MessageId, Arc<Notify>)>,
        stall_close: bool,
        closed: bool,
    }

    impl FakeMailbox {
        fn with(messages: Vec<(u32, Vec<u8>)>) -> Self {
            Self {
                messages: messages
                    .into_iter()
                    .map(|(uid, raw)| (MessageId::new(uid), raw))
                    .collect(),
                ..Self::default()
            }
        }
    }

    impl Mailbox for FakeMailbox {
        async fn list_ids_from(
            &mut self,
            after: Option<MessageId>,
        ) -> anyhow::Result<Vec<MessageId>> {
            self.list_calls.push(after);
            if let Some((call, notify)) = &self.notify_on_list
                && self.list_calls.len() == *call
            {
                notify.notify_one();
            }
            Ok(self
                .messages
                .keys()
                .copied()
                .filter(|id| after.is_none_or(|after| *id > after))
                .collect())
        }

        async fn fetch_raw(&mut self, id: MessageId) -> anyhow::Result<Option<Vec<u8>>> {
            if self.fail_fetch == Some(id) {
                anyhow::bail!("connection reset by peer");
            }
            if let Some((stalled, notify)) = &self.stall_fetch
                && *stalled == id
            {
                notify.notify_one();
                std::future::pending::<()>().await;
            }
            self.fetched.push(id);
            Ok(self.messages.get(&id).cloned())
        }

        async fn close(&mut self) {
            self.closed = true;
            if self.stall_close {
                std::future::pending::<()>().await;
            }
        }
    }

    fn message(subject: &str, date: &str, attachment: Option<(&str, &str)>) -> Vec<u8> {
        let mut raw = format!(
            "From: a@example.com\r\nSubject: {}\r\nDate: {}\r\nMIME-Version: 1.0\r\n",
            subject, date
        );
        match attachment {
            None => raw.push_str("\r\nJust text.\r\n"),
            Some((name, body)) => raw.push_str(&format!(
                "Content-Type: multipart/mixed; boundary=\"b\"\r\n\r\n\
                 --b\r\nContent-Type: text/plain\r\n\r\nSee attached.\r\n\
                 --b\r\nContent-Type: text/plain\r\n\
                 Content-Disposition: attachment; filename=\"{}\"\r\n\r\n{}\r\n\
                 --b--\r\n",
                name, body
            )),
        }
        raw.into_bytes()
    }

    fn simple(n: u32) -> Vec<u8> {
        message(
            &format!("Message {}", n),
            &format!("Mon, 1 Jan 2024 10:00:{:02} +0000", n),
            None,
        )
    }

    const MALFORMED: &[u8] = b"Subject: no date here\r\n\r\nbody";

    struct Fixture {
        dir: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                dir: TempDir::new().unwrap(),
            }
        }

        fn output(&self) -> PathBuf {
            self.dir.path().join("emails")
        }

        fn store(&self) -> CheckpointStore {
            CheckpointStore::new(self.dir.path().join("state").join("checkpoint"))
        }

        fn engine(&self, mailbox: FakeMailbox, options: SyncOptions) -> SyncEngine<FakeMailbox> {
            SyncEngine::new(mailbox, self.store(), ArchiveWriter::new(self.output()), options)
        }

        fn archive_dirs(&self) -> Vec<String> {
            let mut names: Vec<String> = fs::read_dir(self.output())
                .map(|entries| {
                    entries
                        .filter_map(|e| e.ok())
                        .filter(|e| e.path().is_dir())
                        .map(|e| e.file_name().to_string_lossy().into_owned())
                        .collect()
                })
                .unwrap_or_default();
            names.sort();
            names
        }
    }

    #[tokio::test]
    async fn test_one_shot_archives_everything() {
        let fx = Fixture::new();
        let mailbox = FakeMailbox::with(vec![(1, simple(1)), (2, simple(2)), (3, simple(3))]);
        let mut engine = fx.engine(mailbox, SyncOptions::default());

        engine
            .run(SyncMode::OneShot, std::future::pending())
            .await
            .unwrap();

        assert_eq!(fx.store().load().unwrap(), Some(MessageId::new(3)));
        assert_eq!(
            fx.archive_dirs(),
            vec![
                "2024-01-01_10-00-01_Message 1",
                "2024-01-01_10-00-02_Message 2",
                "2024-01-01_10-00-03_Message 3",
            ]
        );
        let eml = fx
            .output()
            .join("2024-01-01_10-00-02_Message 2")
            .join("Message 2.eml");
        assert_eq!(fs::read(eml).unwrap(), simple(2));
        assert!(engine.mailbox_mut().closed);
        assert_eq!(engine.mailbox_mut().list_calls, vec![None]);
    }

    #[tokio::test]
    async fn test_second_pass_without_new_mail_is_a_no_op() {
        let fx = Fixture::new();
        let mailbox = FakeMailbox::with(vec![(1, simple(1)), (2, simple(2))]);
        let mut engine = fx.engine(mailbox, SyncOptions::default());

        engine.run_pass().await.unwrap();
        let dirs_before = fx.archive_dirs();

        let report = engine.run_pass().await.unwrap();

        assert_eq!(report.listed, 0);
        assert_eq!(report.archived, 0);
        assert_eq!(report.checkpoint, Some(MessageId::new(2)));
        assert_eq!(fx.archive_dirs(), dirs_before);
        assert_eq!(fx.store().load().unwrap(), Some(MessageId::new(2)));
        assert_eq!(engine.mailbox_mut().fetched.len(), 2);
    }

    #[tokio::test]
    async fn test_restart_fetches_only_newer_ids() {
        let fx = Fixture::new();
        let mut first = fx.engine(
            FakeMailbox::with(vec![(1, simple(1)), (2, simple(2)), (3, simple(3))]),
            SyncOptions::default(),
        );
        first.run(SyncMode::OneShot, std::future::pending()).await.unwrap();

        // Messages 4 and 5 arrive while the archiver is down
        let mailbox = FakeMailbox::with(vec![
            (1, simple(1)),
            (2, simple(2)),
            (3, simple(3)),
            (4, simple(4)),
            (5, simple(5)),
        ]);
        let mut second = fx.engine(mailbox, SyncOptions::default());
        second.run(SyncMode::OneShot, std::future::pending()).await.unwrap();

        let mailbox = second.mailbox_mut();
        assert_eq!(mailbox.list_calls, vec![Some(MessageId::new(3))]);
        assert_eq!(mailbox.fetched, vec![MessageId::new(4), MessageId::new(5)]);
        assert_eq!(fx.store().load().unwrap(), Some(MessageId::new(5)));
        assert_eq!(fx.archive_dirs().len(), 5);
    }

    #[tokio::test]
    async fn test_identical_subject_and_second_do_not_collide() {
        let fx = Fixture::new();
        let date = "Fri, 5 Jan 2024 08:30:00 +0000";
        let mailbox = FakeMailbox::with(vec![
            (10, message("Invoice", date, Some(("invoice.txt", "first")))),
            (11, message("Invoice", date, Some(("invoice.txt", "second")))),
        ]);
        let mut engine = fx.engine(mailbox, SyncOptions::default());

        engine.run_pass().await.unwrap();

        let first = fx.output().join("2024-01-05_08-30-00_Invoice");
        let second = fx.output().join("2024-01-05_08-30-00_Invoice_1");
        assert_eq!(
            fx.archive_dirs(),
            vec![
                "2024-01-05_08-30-00_Invoice",
                "2024-01-05_08-30-00_Invoice_1"
            ]
        );
        assert_eq!(fs::read_to_string(first.join("invoice.txt")).unwrap(), "first");
        assert_eq!(fs::read_to_string(second.join("invoice.txt")).unwrap(), "second");
        assert!(first.join("Invoice.eml").exists());
        assert!(second.join("Invoice.eml").exists());
    }

    #[tokio::test]
    async fn test_malformed_message_skipped_without_blocking_later_ones() {
        let fx = Fixture::new();
        let mailbox = FakeMailbox::with(vec![
            (1, simple(1)),
            (2, MALFORMED.to_vec()),
            (3, simple(3)),
            (4, simple(4)),
        ]);
        let mut engine = fx.engine(mailbox, SyncOptions::default());

        let report = engine.run_pass().await.unwrap();

        assert_eq!(report.archived, 3);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.checkpoint, Some(MessageId::new(1)));
        assert_eq!(fx.store().load().unwrap(), Some(MessageId::new(1)));
        assert_eq!(fx.archive_dirs().len(), 3);

        // Only the failed message is retried; 3 and 4 are not archived twice
        let report = engine.run_pass().await.unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(report.already_handled, 2);
        assert_eq!(fx.archive_dirs().len(), 3);
        assert_eq!(
            engine.mailbox_mut().fetched,
            vec![
                MessageId::new(1),
                MessageId::new(2),
                MessageId::new(3),
                MessageId::new(4),
                MessageId::new(2),
            ]
        );

        // Once it becomes readable the checkpoint catches up past 3 and 4
        engine
            .mailbox_mut()
            .messages
            .insert(MessageId::new(2), simple(2));
        let report = engine.run_pass().await.unwrap();
        assert_eq!(report.archived, 1);
        assert_eq!(report.checkpoint, Some(MessageId::new(4)));
        assert_eq!(fx.store().load().unwrap(), Some(MessageId::new(4)));
        assert_eq!(fx.archive_dirs().len(), 4);
    }

    #[tokio::test]
    async fn test_retry_limit_dead_letters_message() {
        let fx = Fixture::new();
        let mailbox = FakeMailbox::with(vec![(1, MALFORMED.to_vec()), (2, simple(2))]);
        let options = SyncOptions {
            retry_limit: Some(2),
            ..SyncOptions::default()
        };
        let mut engine = fx.engine(mailbox, options);

        engine.run_pass().await.unwrap();
        engine.run_pass().await.unwrap();
        let report = engine.run_pass().await.unwrap();

        assert_eq!(report.skipped, 0);
        assert_eq!(report.already_handled, 2);
        assert_eq!(report.checkpoint, None);
        let fetched_one = engine
            .mailbox_mut()
            .fetched
            .iter()
            .filter(|id| **id == MessageId::new(1))
            .count();
        assert_eq!(fetched_one, 2);
    }

    #[tokio::test]
    async fn test_connection_error_aborts_and_keeps_progress() {
        let fx = Fixture::new();
        let mut mailbox = FakeMailbox::with(vec![(1, simple(1)), (2, simple(2)), (3, simple(3))]);
        mailbox.fail_fetch = Some(MessageId::new(3));
        let mut engine = fx.engine(mailbox, SyncOptions::default());

        let result = engine.run(SyncMode::OneShot, std::future::pending()).await;

        assert!(matches!(result, Err(SyncError::Connection(_))));
        assert_eq!(fx.store().load().unwrap(), Some(MessageId::new(2)));
        assert!(engine.mailbox_mut().closed);
    }

    #[tokio::test]
    async fn test_blank_checkpoint_archives_everything() {
        let fx = Fixture::new();
        let path = fx.store().path().to_path_buf();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "   \n").unwrap();

        let mut engine = fx.engine(FakeMailbox::with(vec![(7, simple(7))]), SyncOptions::default());
        engine.run_pass().await.unwrap();

        assert_eq!(engine.mailbox_mut().list_calls, vec![None]);
        assert_eq!(fx.store().load().unwrap(), Some(MessageId::new(7)));
    }

    #[tokio::test]
    async fn test_resume_disabled_ignores_stored_checkpoint() {
        let fx = Fixture::new();
        fx.store().save(MessageId::new(2)).unwrap();

        let options = SyncOptions {
            resume: false,
            ..SyncOptions::default()
        };
        let mut engine = fx.engine(
            FakeMailbox::with(vec![(1, simple(1)), (2, simple(2))]),
            options,
        );
        engine.run_pass().await.unwrap();
        engine.run_pass().await.unwrap();

        assert_eq!(
            engine.mailbox_mut().list_calls,
            vec![None, Some(MessageId::new(2))]
        );
        assert_eq!(fx.archive_dirs().len(), 2);
    }

    #[tokio::test]
    async fn test_resume_disabled_never_passes_failed_message() {
        let fx = Fixture::new();
        fx.store().save(MessageId::new(2)).unwrap();

        let options = SyncOptions {
            resume: false,
            ..SyncOptions::default()
        };
        let mailbox = FakeMailbox::with(vec![
            (1, MALFORMED.to_vec()),
            (2, simple(2)),
            (3, simple(3)),
        ]);
        let mut engine = fx.engine(mailbox, options);

        let first = engine.run_pass().await.unwrap();
        let second = engine.run_pass().await.unwrap();

        assert_eq!(first.checkpoint, None);
        assert_eq!(second.checkpoint, None);
        assert_eq!(second.skipped, 1);
        assert_eq!(second.already_handled, 2);
        assert_eq!(engine.mailbox_mut().list_calls, vec![None, None]);
        assert_eq!(fx.store().load().unwrap(), Some(MessageId::new(2)));

        engine
            .mailbox_mut()
            .messages
            .insert(MessageId::new(1), simple(1));
        let third = engine.run_pass().await.unwrap();
        assert_eq!(third.checkpoint, Some(MessageId::new(3)));
        assert_eq!(fx.archive_dirs().len(), 3);
    }

    #[tokio::test]
    async fn test_shutdown_mid_pass_keeps_last_completed_message() {
        let fx = Fixture::new();
        let notify = Arc::new(Notify::new());
        let mut mailbox = FakeMailbox::with(vec![(1, simple(1)), (2, simple(2)), (3, simple(3))]);
        mailbox.stall_fetch = Some((MessageId::new(3), Arc::clone(&notify)));
        let mut engine = fx.engine(mailbox, SyncOptions::default());

        let shutdown = async move { notify.notified().await };
        let result = engine.run(SyncMode::OneShot, shutdown).await;

        assert!(result.is_ok());
        assert_eq!(fx.store().load().unwrap(), Some(MessageId::new(2)));
        assert_eq!(fx.archive_dirs().len(), 2);
        assert!(engine.mailbox_mut().closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_close_does_not_block_exit() {
        let fx = Fixture::new();
        let mut mailbox = FakeMailbox::with(Vec::new());
        mailbox.stall_close = true;
        let mut engine = fx.engine(mailbox, SyncOptions::default());

        let result = engine.run(SyncMode::OneShot, std::future::pending()).await;

        assert!(result.is_ok());
        assert!(engine.mailbox_mut().closed);
    }

    #[tokio::test]
    async fn test_shutdown_during_continuous_mode_flushes_checkpoint() {
        let fx = Fixture::new();
        let notify = Arc::new(Notify::new());
        let mut mailbox = FakeMailbox::with(vec![(1, simple(1)), (2, simple(2))]);
        mailbox.notify_on_list = Some((2, Arc::clone(&notify)));
        let mut engine = fx.engine(mailbox, SyncOptions::default());

        let shutdown = async move { notify.notified().await };
        engine
            .run(SyncMode::Continuous(Duration::from_millis(10)), shutdown)
            .await
            .unwrap();

        assert_eq!(fx.store().load().unwrap(), Some(MessageId::new(2)));
        assert!(engine.mailbox_mut().list_calls.len() >= 2);
        assert!(engine.mailbox_mut().closed);
    }

    #[tokio::test]
    async fn test_undetectable_charset_uses_fallback() {
        struct NeverDetects;
        impl CharsetDetector for NeverDetects {
            fn detect(&self, _raw: &[u8]) -> Option<&'static encoding_rs::Encoding> {
                None
            }
        }

        let fx = Fixture::new();
        let mut raw = b"Subject: Latin\r\nDate: Tue, 2 Jan 2024 08:00:00 +0000\r\n\r\ncaf".to_vec();
        raw.push(0xE9);
        let mut engine = fx
            .engine(FakeMailbox::with(vec![(1, raw)]), SyncOptions::default())
            .with_detector(Arc::new(NeverDetects));

        let report = engine.run_pass().await.unwrap();

        assert_eq!(report.archived, 1);
        let eml = fx
            .output()
            .join("2024-01-02_08-00-00_Latin")
            .join("Latin.eml");
        assert!(fs::read_to_string(eml).unwrap().ends_with("caf\u{e9}"));
    }
}
