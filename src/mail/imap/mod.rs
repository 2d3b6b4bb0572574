//! IMAP transport for the archiver.
//!
//! This module is split into:
//! - `mod.rs` - Types and construction
//! - `client.rs` - Connection, folder selection, UID search and fetch

mod client;

use std::fmt;

use crate::config::ImapConfig;

/// Any byte stream async-imap can drive: plain TCP or TLS over TCP.
pub(crate) trait ImapStream:
    futures::AsyncRead + futures::AsyncWrite + Unpin + Send + fmt::Debug
{
}

impl<T> ImapStream for T where
    T: futures::AsyncRead + futures::AsyncWrite + Unpin + Send + fmt::Debug
{
}

pub(crate) type ImapSession = async_imap::Session<Box<dyn ImapStream>>;

pub struct ImapClient {
    pub(crate) session: Option<ImapSession>,
    pub config: ImapConfig,
    pub username: String,
    pub(crate) password: String,
    /// Folder selected after login
    pub folder: String,
}

impl ImapClient {
    pub fn new(config: ImapConfig, username: String, password: String, folder: String) -> Self {
        Self {
            session: None,
            config,
            username,
            password,
            folder,
        }
    }
}

impl fmt::Debug for ImapClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImapClient")
            .field("server", &self.config.server)
            .field("port", &self.config.port)
            .field("username", &self.username)
            .field("folder", &self.folder)
            .field("connected", &self.session.is_some())
            .finish()
    }
}
