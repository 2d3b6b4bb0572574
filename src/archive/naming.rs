//! Deterministic names for archive directories and the files inside them.

use crate::constants::{DIR_TIMESTAMP_FORMAT, INVALID_FILENAME_CHARS, MAX_SUBJECT_BYTES};
use crate::mail::types::{MessagePart, ParsedMessage};

/// Everything the writer needs to materialize one message, already named.
#[derive(Debug, Clone)]
pub struct ArchivePlan {
    pub dir_name: String,
    pub eml_name: String,
    pub attachments: Vec<PlannedFile>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedFile {
    pub name: String,
    pub payload: Vec<u8>,
}

impl ArchivePlan {
    pub fn for_message(message: &ParsedMessage) -> Self {
        let subject = subject_component(&message.subject);
        let dir_name = format!(
            "{}_{}",
            message.sent_at.format(DIR_TIMESTAMP_FORMAT),
            subject
        );

        let attachments = message
            .parts
            .iter()
            .enumerate()
            .filter(|(_, part)| part.is_attachment)
            .map(|(index, part)| PlannedFile {
                name: attachment_filename(part, index),
                payload: part.payload.clone(),
            })
            .collect();

        Self {
            eml_name: format!("{}.eml", subject),
            dir_name,
            attachments,
        }
    }
}

/// Remove the characters that are invalid in file names on common platforms.
pub fn sanitize_component(value: &str) -> String {
    value
        .chars()
        .filter(|c| !INVALID_FILENAME_CHARS.contains(c))
        .collect()
}

/// Sanitized subject cut at a char boundary so the directory name stays
/// within the usual 255-byte component limit.
fn subject_component(subject: &str) -> String {
    let mut name = sanitize_component(subject);
    if name.len() > MAX_SUBJECT_BYTES {
        let mut end = MAX_SUBJECT_BYTES;
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        name.truncate(end);
    }
    name
}

/// Final on-disk name for an attachment part at `index` among its siblings.
pub fn attachment_filename(part: &MessagePart, index: usize) -> String {
    let sanitized = part
        .suggested_filename
        .as_deref()
        .filter(|name| !name.is_empty())
        .map(|name| {
            sanitize_component(name)
                .chars()
                .filter(char::is_ascii)
                .collect::<String>()
        });

    match sanitized {
        Some(name) if !matches!(name.as_str(), "" | "." | "..") => name,
        _ => fallback_filename(&part.content_type, index),
    }
}

/// `part-NNN.ext` for parts that carry no usable filename.
pub fn fallback_filename(content_type: &str, index: usize) -> String {
    format!("part-{:03}{}", index, extension_for(content_type))
}

fn extension_for(content_type: &str) -> String {
    let essence = content_type.trim().to_ascii_lowercase();

    let preferred = match essence.as_str() {
        "text/plain" => Some(".txt"),
        "text/html" => Some(".html"),
        "text/csv" => Some(".csv"),
        "image/jpeg" => Some(".jpg"),
        "image/png" => Some(".png"),
        "image/gif" => Some(".gif"),
        "audio/mpeg" => Some(".mp3"),
        "video/mp4" => Some(".mp4"),
        "message/rfc822" => Some(".eml"),
        "application/pdf" => Some(".pdf"),
        "application/zip" => Some(".zip"),
        "application/json" => Some(".json"),
        "application/octet-stream" => Some(".bin"),
        _ => None,
    };
    if let Some(ext) = preferred {
        return ext.to_string();
    }

    mime_guess::get_mime_extensions_str(&essence)
        .and_then(|exts| exts.first())
        .map(|ext| format!(".{}", ext))
        .unwrap_or_else(|| ".bin".to_string())
}

/// Split `name` into stem and extension the way `n_1.ext` suffixing expects:
/// the extension is everything from the last dot, unless that dot only leads
/// the name (`.profile` has no extension).
pub fn split_extension(name: &str) -> (&str, &str) {
    let leading_dots = name.len() - name.trim_start_matches('.').len();
    match name.rfind('.') {
        Some(pos) if pos >= leading_dots && pos > 0 => name.split_at(pos),
        _ => (name, ""),
    }
}

/// `stem_n.ext` for the n-th collision on `name`.
pub fn numbered(name: &str, n: u32) -> String {
    let (stem, ext) = split_extension(name);
    format!("{}_{}{}", stem, n, ext)
}
