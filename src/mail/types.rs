use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset};

/// Server-assigned IMAP UID. Strictly increasing within a mailbox and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageId(u32);

impl MessageId {
    pub const fn new(uid: u32) -> Self {
        Self(uid)
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MessageId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

/// A fetched message broken down into the fields the archive layout needs.
#[derive(Debug, Clone)]
pub struct ParsedMessage {
    /// Decoded subject, not yet sanitized
    pub subject: String,
    /// Send time in the offset the Date header was written in
    pub sent_at: DateTime<FixedOffset>,
    pub raw: Vec<u8>,
    /// Direct children of a multipart root, in original order
    pub parts: Vec<MessagePart>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagePart {
    pub is_attachment: bool,
    pub suggested_filename: Option<String>,
    pub content_type: String,
    /// Payload with the transfer encoding removed
    pub payload: Vec<u8>,
}
