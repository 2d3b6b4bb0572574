//! IMAP client operations: connection, folder selection, UID search and fetch.

use std::sync::Arc;

use anyhow::{Context, Result};
use futures::StreamExt;
use rustls::pki_types::ServerName;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_util::compat::TokioAsyncReadCompatExt;

use super::{ImapClient, ImapSession, ImapStream};
use crate::config::ImapConfig;
use crate::mail::{Mailbox, MessageId};

impl ImapClient {
    //
    // Connection Management
    //

    /// Connect, log in and select the configured folder.
    pub async fn connect_and_select(&mut self) -> Result<()> {
        let stream = open_stream(&self.config).await?;
        let client = async_imap::Client::new(stream);

        let mut session = client
            .login(&self.username, &self.password)
            .await
            .map_err(|e| anyhow::anyhow!("Login failed: {:?}", e.0))?;

        let mailbox = session
            .select(&self.folder)
            .await
            .with_context(|| format!("Failed to select folder '{}'", self.folder))?;

        tracing::info!(
            "Connected to {} and selected '{}' ({} messages)",
            self.config.server,
            self.folder,
            mailbox.exists
        );

        self.session = Some(session);
        Ok(())
    }

    pub async fn disconnect(&mut self) -> Result<()> {
        if let Some(mut session) = self.session.take() {
            session.logout().await.ok();
        }
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    pub(crate) fn session(&mut self) -> Result<&mut ImapSession> {
        self.session
            .as_mut()
            .context("Not connected to IMAP server")
    }

    //
    // Search & Fetch Operations
    //

    async fn search_uids_after(&mut self, after: Option<MessageId>) -> Result<Vec<MessageId>> {
        let query = match after {
            None => "ALL".to_string(),
            Some(id) => match id.get().checked_add(1) {
                Some(next) => format!("UID {}:*", next),
                None => return Ok(Vec::new()),
            },
        };

        let uids = self
            .session()?
            .uid_search(&query)
            .await
            .with_context(|| format!("UID SEARCH {} failed", query))?;

        // `n:*` always matches the highest UID, even when it is below n
        let mut ids: Vec<MessageId> = uids
            .into_iter()
            .map(MessageId::new)
            .filter(|id| after.is_none_or(|after| *id > after))
            .collect();
        ids.sort_unstable();

        tracing::debug!("UID SEARCH {} returned {} new ids", query, ids.len());
        Ok(ids)
    }

    async fn fetch_message(&mut self, id: MessageId) -> Result<Option<Vec<u8>>> {
        let session = self.session()?;
        let mut messages = session
            .uid_fetch(id.to_string(), "(UID BODY.PEEK[])")
            .await
            .with_context(|| format!("Failed to fetch message {}", id))?;

        // Drain the whole response so the session is ready for the next command
        let mut raw = None;
        while let Some(result) = messages.next().await {
            let fetch = result.context("Failed to fetch message")?;
            if raw.is_none()
                && fetch.uid.is_none_or(|uid| uid == id.get())
                && let Some(body) = fetch.body()
            {
                raw = Some(body.to_vec());
            }
        }

        Ok(raw)
    }
}

impl Mailbox for ImapClient {
    async fn list_ids_from(&mut self, after: Option<MessageId>) -> Result<Vec<MessageId>> {
        self.search_uids_after(after).await
    }

    async fn fetch_raw(&mut self, id: MessageId) -> Result<Option<Vec<u8>>> {
        self.fetch_message(id).await
    }

    async fn close(&mut self) {
        if self.is_connected() {
            self.disconnect().await.ok();
            tracing::info!("Logged out from {}", self.config.server);
        } else {
            tracing::debug!("Already logged out");
        }
    }
}

async fn open_stream(config: &ImapConfig) -> Result<Box<dyn ImapStream>> {
    let addr = format!("{}:{}", config.server, config.port);

    let tcp = TcpStream::connect(&addr)
        .await
        .with_context(|| format!("Failed to connect to {}", addr))?;

    if !config.tls {
        tracing::warn!("Connecting to {} without TLS", addr);
        return Ok(Box::new(tcp.compat()));
    }

    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let tls_config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();

    let server_name = ServerName::try_from(config.server.clone())
        .with_context(|| format!("Invalid server name '{}'", config.server))?;

    let tls_stream = TlsConnector::from(Arc::new(tls_config))
        .connect(server_name, tcp)
        .await
        .context("TLS handshake failed")?;

    // Wrap tokio stream with compat layer for futures-io compatibility
    Ok(Box::new(tls_stream.compat()))
}
