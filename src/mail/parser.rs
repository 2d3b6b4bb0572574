use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone};
use mail_parser::decoders::base64::base64_decode;
use mail_parser::decoders::quoted_printable::quoted_printable_decode;
use mail_parser::{Encoding, HeaderName, Message, MessageParser, MimeHeaders, PartType};

use super::types::{MessagePart, ParsedMessage};

/// A message the archive cannot name: not MIME, or missing/garbled Subject or Date.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedMessage {
    #[error("not a parsable RFC 5322 message")]
    Unparsable,
    #[error("no Date header")]
    MissingDate,
    #[error("unparsable Date header {0:?}")]
    InvalidDate(String),
    #[error("missing or unparsable Subject header")]
    MissingSubject,
}

/// Break raw message bytes down into subject, send time and top-level parts.
pub fn decompose(raw: &[u8]) -> Result<ParsedMessage, MalformedMessage> {
    let message = MessageParser::default()
        .parse(raw)
        .ok_or(MalformedMessage::Unparsable)?;

    let subject = message
        .subject()
        .ok_or(MalformedMessage::MissingSubject)?
        .to_string();

    let raw_date = message
        .header_raw(HeaderName::Date)
        .ok_or(MalformedMessage::MissingDate)?;
    let sent_at = parse_date_header(raw_date)
        .or_else(|| message.date().and_then(from_mail_date))
        .ok_or_else(|| MalformedMessage::InvalidDate(raw_date.trim().to_string()))?;

    let parts = match &message.root_part().body {
        PartType::Multipart(children) => children
            .iter()
            .filter_map(|id| message.part(*id))
            .map(|part| MessagePart {
                is_attachment: part.content_disposition().is_some()
                    && !matches!(part.body, PartType::Multipart(_)),
                suggested_filename: part.attachment_name().map(|s| s.to_string()),
                content_type: content_type_of(part),
                payload: payload_of(&message, part),
            })
            .collect(),
        _ => Vec::new(),
    };

    Ok(ParsedMessage {
        subject,
        sent_at,
        raw: raw.to_vec(),
        parts,
    })
}

/// Parse an RFC 2822 date after dropping a parenthetical zone name such as
/// `(CEST)`, which strict parsers reject.
pub fn parse_date_header(value: &str) -> Option<DateTime<FixedOffset>> {
    let stripped = strip_parenthetical(value);
    DateTime::parse_from_rfc2822(stripped.trim()).ok()
}

/// Remove everything from the first `(` to the last `)`.
fn strip_parenthetical(value: &str) -> String {
    match (value.find('('), value.rfind(')')) {
        (Some(open), Some(close)) if open < close => {
            format!("{}{}", &value[..open], &value[close + 1..])
        }
        _ => value.to_string(),
    }
}

fn from_mail_date(date: &mail_parser::DateTime) -> Option<DateTime<FixedOffset>> {
    let offset_secs = (date.tz_hour as i32 * 3600 + date.tz_minute as i32 * 60)
        * if date.tz_before_gmt { -1 } else { 1 };
    let offset = FixedOffset::east_opt(offset_secs)?;
    let naive = NaiveDate::from_ymd_opt(date.year as i32, date.month as u32, date.day as u32)?
        .and_hms_opt(date.hour as u32, date.minute as u32, date.second as u32)?;
    offset.from_local_datetime(&naive).single()
}

/// Part body with only the transfer encoding removed.
///
/// mail-parser converts text parts to UTF-8 through their declared charset,
/// so those are decoded again from the raw bytes to keep the payload exact.
fn payload_of(message: &Message, part: &mail_parser::MessagePart) -> Vec<u8> {
    if !matches!(part.body, PartType::Text(_) | PartType::Html(_)) {
        return part.contents().to_vec();
    }

    let range = part.raw_body_offset() as usize..part.raw_end_offset() as usize;
    message
        .raw_message()
        .get(range)
        .and_then(|raw| match part.encoding {
            Encoding::None => Some(raw.to_vec()),
            Encoding::Base64 => base64_decode(raw),
            Encoding::QuotedPrintable => quoted_printable_decode(raw),
        })
        .unwrap_or_else(|| part.contents().to_vec())
}

fn content_type_of(part: &mail_parser::MessagePart) -> String {
    match part.content_type() {
        Some(ct) => match ct.subtype() {
            Some(subtype) => format!("{}/{}", ct.ctype(), subtype).to_ascii_lowercase(),
            None => ct.ctype().to_ascii_lowercase(),
        },
        None => "text/plain".to_string(),
    }
}
