//! Snapshot tag grammars and ordering.
//!
//! Tags are free-form, but two grammars give them an order: an absolute
//! timestamp (`2020-01-01.00:00:00`) and a plain non-negative integer. The
//! grammars are tried in priority order against a whole group of tags; the
//! first one every tag parses under decides the ordering.

use chrono::{Local, NaiveDate, NaiveDateTime};
use std::cmp::Ordering;

/// strftime format of generated tags.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d.%H:%M:%S";

/// A grammar that can parse and order tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagGrammar {
    Timestamp,
    Integer,
}

/// Grammars in the order they are attempted.
pub const TAG_GRAMMARS: [TagGrammar; 2] = [TagGrammar::Timestamp, TagGrammar::Integer];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum TagKey {
    Timestamp(NaiveDateTime),
    Integer(u64),
}

impl TagGrammar {
    fn key(self, tag: &str) -> Option<TagKey> {
        match self {
            TagGrammar::Timestamp => parse_timestamp(tag, TIMESTAMP_FORMAT).map(TagKey::Timestamp),
            TagGrammar::Integer => parse_integer(tag).map(TagKey::Integer),
        }
    }

    /// Whether `tag` conforms to this grammar.
    pub fn parses(self, tag: &str) -> bool {
        self.key(tag).is_some()
    }

    /// Compare two tags under this grammar; `None` if either does not parse.
    pub fn compare(self, a: &str, b: &str) -> Option<Ordering> {
        Some(self.key(a)?.cmp(&self.key(b)?))
    }

    /// Sort `tags` in place when every tag parses under this grammar.
    ///
    /// Returns `false` and leaves `tags` untouched otherwise.
    pub fn sort(self, tags: &mut [String]) -> bool {
        let keys: Option<Vec<TagKey>> = tags.iter().map(|tag| self.key(tag)).collect();
        let Some(keys) = keys else {
            return false;
        };

        let mut keyed: Vec<(TagKey, String)> = keys
            .into_iter()
            .zip(tags.iter().cloned())
            .collect();
        keyed.sort_by(|a, b| a.0.cmp(&b.0));
        for (slot, (_, tag)) in tags.iter_mut().zip(keyed) {
            *slot = tag;
        }
        true
    }

    /// Classify a single tag under the first grammar that accepts it.
    pub fn detect(tag: &str) -> Option<TagGrammar> {
        TAG_GRAMMARS.into_iter().find(|grammar| grammar.parses(tag))
    }
}

/// Order a group of tags under the first grammar the whole group parses under.
///
/// Mixed-format groups keep their listing order and yield `None`.
pub fn order_tags(tags: &mut [String]) -> Option<TagGrammar> {
    TAG_GRAMMARS.into_iter().find(|grammar| grammar.sort(tags))
}

/// Parse `value` under the strftime `format`.
///
/// Date-only formats resolve to midnight. Under [`TIMESTAMP_FORMAT`] every
/// field must be zero-padded and the seconds stay below 60.
pub fn parse_timestamp(value: &str, format: &str) -> Option<NaiveDateTime> {
    if format == TIMESTAMP_FORMAT && !has_timestamp_shape(value) {
        return None;
    }
    NaiveDateTime::parse_from_str(value, format)
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(value, format)
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

/// `YYYY-MM-DD.HH:MM:SS`, nothing more.
fn has_timestamp_shape(value: &str) -> bool {
    let bytes = value.as_bytes();
    bytes.len() == 19
        && bytes.iter().enumerate().all(|(index, byte)| match index {
            4 | 7 => *byte == b'-',
            10 => *byte == b'.',
            13 | 16 => *byte == b':',
            _ => byte.is_ascii_digit(),
        })
        && bytes[14] < b'6'
        && bytes[17] < b'6'
}

fn parse_integer(value: &str) -> Option<u64> {
    if value.is_empty() || !value.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}

/// Render `instant` as a tag under `format`.
pub fn format_tag(instant: NaiveDateTime, format: &str) -> String {
    instant.format(format).to_string()
}

/// Tag for a snapshot taken now, in local time.
pub fn timestamp_tag() -> String {
    format_tag(Local::now().naive_local(), TIMESTAMP_FORMAT)
}

/// Tag that continues an integer sequence, if `latest` is an integer tag.
pub fn next_integer_tag(latest: &str) -> Option<String> {
    if TagGrammar::detect(latest) != Some(TagGrammar::Integer) {
        return None;
    }
    parse_integer(latest)?.checked_add(1).map(|next| next.to_string())
}
