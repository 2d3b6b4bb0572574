pub mod charset;
pub mod imap;
pub mod parser;
pub mod types;

pub use imap::ImapClient;
pub use types::MessageId;

/// A UID-addressable, ordered message store the sync engine reads from.
///
/// Every error returned here is treated as a connection failure and aborts
/// the current pass.
#[allow(async_fn_in_trait)]
pub trait Mailbox {
    /// UIDs strictly greater than `after` (all UIDs when `None`), ascending.
    async fn list_ids_from(&mut self, after: Option<MessageId>) -> anyhow::Result<Vec<MessageId>>;

    /// Raw RFC 5322 bytes of `id`, or `None` if the server no longer has it.
    async fn fetch_raw(&mut self, id: MessageId) -> anyhow::Result<Option<Vec<u8>>>;

    async fn close(&mut self);
}
