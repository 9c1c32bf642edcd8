//! Metadata side-file codec.
//!
//! One `name=value` pair per line. Store-level fields are `key`,
//! `fileSize`, `lastAccess` and `createTime`; caller metadata is written as
//! `meta.<name>=<value>`. Names and values are both escaped, so neither can
//! break a line or move the `=` separator. Unknown lines are ignored so older
//! and newer writers can share a cache directory.

use std::collections::BTreeMap;

use super::types::CacheEntry;

const FIELD_KEY: &str = "key";
const FIELD_FILE_SIZE: &str = "fileSize";
const FIELD_LAST_ACCESS: &str = "lastAccess";
const FIELD_CREATE_TIME: &str = "createTime";
const META_PREFIX: &str = "meta.";

/// Why a metadata file could not be decoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum MetaDecodeError {
    MissingKey,
    InvalidNumber { field: &'static str, value: String },
}

pub(crate) fn encode(entry: &CacheEntry) -> String {
    let mut out = String::with_capacity(128);
    push_line(&mut out, FIELD_KEY, &entry.key);
    push_line(&mut out, FIELD_FILE_SIZE, &entry.file_size.to_string());
    push_line(&mut out, FIELD_LAST_ACCESS, &entry.last_access.to_string());
    push_line(&mut out, FIELD_CREATE_TIME, &entry.create_time.to_string());
    for (name, value) in &entry.meta {
        push_line(&mut out, &format!("{META_PREFIX}{name}"), value);
    }
    out
}

pub(crate) fn decode(text: &str) -> Result<CacheEntry, MetaDecodeError> {
    let mut key = None;
    let mut file_size = 0;
    let mut last_access = 0;
    let mut create_time = 0;
    let mut meta = BTreeMap::new();

    for line in text.lines() {
        let Some((name, value)) = split_field(line) else {
            continue;
        };
        let name = unescape(name);
        let value = unescape(value);
        match name.as_str() {
            FIELD_KEY => key = Some(value),
            FIELD_FILE_SIZE => file_size = parse_number(FIELD_FILE_SIZE, &value)?,
            FIELD_LAST_ACCESS => last_access = parse_number(FIELD_LAST_ACCESS, &value)?,
            FIELD_CREATE_TIME => create_time = parse_number(FIELD_CREATE_TIME, &value)?,
            other => {
                if let Some(meta_name) = other.strip_prefix(META_PREFIX) {
                    meta.insert(meta_name.to_string(), value);
                }
            }
        }
    }

    let key = key
        .filter(|k| !k.is_empty())
        .ok_or(MetaDecodeError::MissingKey)?;
    Ok(CacheEntry {
        key,
        file_size,
        last_access,
        create_time,
        meta,
    })
}

/// Read only the recorded last access time, tolerating otherwise broken files
pub(crate) fn scan_last_access(text: &str) -> Option<u64> {
    text.lines().find_map(|line| {
        line.strip_prefix(FIELD_LAST_ACCESS)
            .and_then(|rest| rest.strip_prefix('='))
            .and_then(|v| v.trim().parse().ok())
    })
}

fn parse_number(field: &'static str, value: &str) -> Result<u64, MetaDecodeError> {
    value
        .trim()
        .parse()
        .map_err(|_| MetaDecodeError::InvalidNumber {
            field,
            value: value.to_string(),
        })
}

fn push_line(out: &mut String, name: &str, value: &str) {
    escape_into(out, name);
    out.push('=');
    escape_into(out, value);
    out.push('\n');
}

/// Split a line at its first unescaped `=`
fn split_field(line: &str) -> Option<(&str, &str)> {
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '=' => return Some((&line[..i], &line[i + 1..])),
            _ => {}
        }
    }
    None
}

fn escape_into(out: &mut String, value: &str) {
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '=' => out.push_str("\\="),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
