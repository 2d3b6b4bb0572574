//! On-disk archive layout: one directory per message holding the raw `.eml`
//! and every attachment.

pub mod naming;
pub mod writer;

pub use naming::ArchivePlan;
pub use writer::{ArchiveWriter, WriteError};
