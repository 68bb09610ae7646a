//! Bean file header codec.
//!
//! A bean file is a YAML header between two `---` lines followed by a
//! free-form Markdown body:
//!
//! ```text
//! ---
//! title: Wire the pump
//! status: todo
//! type: task
//! ---
//! Body text. A later `---` line is a horizontal rule, not a delimiter.
//! ```
//!
//! Only the first two delimiter lines bound the header. Headers that are not
//! valid YAML (an unquoted `title: Fix: x` is the usual culprit) fall back to
//! a tolerant line reader so recovery can still salvage their fields.

use serde_json::Value;
use serde_yaml::Mapping;

use crate::config::WorkspaceConfig;
use crate::ingest::{BeanFields, RawRecord, fields_from_raw};

pub const DELIMITER: &str = "---";

/// A bean file split into header text and verbatim body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Split<'a> {
    /// Byte offset of the header text within the original content.
    pub header_start: usize,
    pub header: &'a str,
    pub body: &'a str,
}

fn is_delimiter(line: &str) -> bool {
    line.trim_end_matches(['\n', '\r']).trim_end() == DELIMITER
}

/// Split a file into header and body.
///
/// Returns `None` when the file does not open with a delimiter line or the
/// header is never closed.
#[must_use]
pub fn split(content: &str) -> Option<Split<'_>> {
    let start = if content.starts_with('\u{feff}') {
        '\u{feff}'.len_utf8()
    } else {
        0
    };
    let mut lines = content[start..].split_inclusive('\n');
    let first = lines.next()?;
    if !is_delimiter(first) {
        return None;
    }

    let header_start = start + first.len();
    let mut offset = header_start;
    for line in lines {
        if is_delimiter(line) {
            return Some(Split {
                header_start,
                header: &content[header_start..offset],
                body: &content[offset + line.len()..],
            });
        }
        offset += line.len();
    }
    None
}

fn yaml_to_record(mapping: &Mapping) -> Option<RawRecord> {
    serde_json::to_value(mapping)
        .ok()
        .and_then(RawRecord::from_value)
}

fn unquote(value: &str) -> &str {
    let v = value.trim();
    if v.len() >= 2
        && ((v.starts_with('"') && v.ends_with('"')) || (v.starts_with('\'') && v.ends_with('\'')))
    {
        &v[1..v.len() - 1]
    } else {
        v
    }
}

/// Line-by-line `key: value` reader for headers `serde_yaml` rejects.
///
/// Splits on the first `": "` (or a trailing `:`), so `title: Fix: x` keeps
/// `Fix: x` as its value. Flow lists (`[a, b]`) become arrays.
fn lenient_record(header: &str) -> RawRecord {
    let mut record = RawRecord::default();
    let mut current_list: Option<(String, Vec<Value>)> = None;

    for line in header.lines() {
        let trimmed = line.trim_end();
        if trimmed.trim().is_empty() || trimmed.trim_start().starts_with('#') {
            continue;
        }

        if let Some(item) = trimmed.trim_start().strip_prefix("- ") {
            if let Some((_, items)) = current_list.as_mut() {
                items.push(Value::String(unquote(item).to_string()));
                continue;
            }
        }

        if let Some((key, items)) = current_list.take() {
            record.insert(key, Value::Array(items));
        }

        if line.starts_with([' ', '\t']) {
            continue;
        }

        let (key, value) = match trimmed.split_once(": ") {
            Some((k, v)) => (k, v),
            None => match trimmed.strip_suffix(':') {
                Some(k) => (k, ""),
                None => continue,
            },
        };
        let key = key.trim();
        if key.is_empty() || key.contains(' ') {
            continue;
        }

        let value = value.trim();
        if value.is_empty() {
            current_list = Some((key.to_string(), Vec::new()));
            continue;
        }
        if let Some(inner) = value.strip_prefix('[').and_then(|v| v.strip_suffix(']')) {
            let items = inner
                .split(',')
                .map(|s| unquote(s).to_string())
                .filter(|s| !s.is_empty())
                .map(Value::String)
                .collect();
            record.insert(key, Value::Array(items));
        } else {
            record.insert(key, Value::String(unquote(value).to_string()));
        }
    }

    if let Some((key, items)) = current_list {
        record.insert(key, Value::Array(items));
    }
    record
}

/// Parse header text into a raw record, tolerating invalid YAML.
#[must_use]
pub fn header_record(header: &str) -> RawRecord {
    match serde_yaml::from_str::<Mapping>(header) {
        Ok(mapping) => yaml_to_record(&mapping).unwrap_or_else(|| lenient_record(header)),
        Err(err) => {
            tracing::debug!(error = %err, "header is not valid YAML, reading line by line");
            lenient_record(header)
        }
    }
}

/// Parse a whole bean file's header into fields.
///
/// Files without a header yield an empty field set; the body is carried
/// through either way.
#[must_use]
pub fn parse_fields(content: &str, config: &WorkspaceConfig) -> BeanFields {
    match split(content) {
        Some(parts) => {
            let mut fields = fields_from_raw(&header_record(parts.header), config);
            fields.body = Some(parts.body.to_string());
            fields
        }
        None => BeanFields {
            body: Some(content.to_string()),
            ..BeanFields::default()
        },
    }
}

fn header_mapping(header: &str) -> Mapping {
    if let Ok(mapping) = serde_yaml::from_str::<Mapping>(header) {
        return mapping;
    }
    let mut mapping = Mapping::new();
    for (key, value) in lenient_record(header).as_map() {
        if let Ok(yaml) = serde_yaml::to_value(value) {
            mapping.insert(serde_yaml::Value::String(key.clone()), yaml);
        }
    }
    mapping
}

/// Header keys that recovery writes back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderPatch {
    pub id: Option<String>,
    pub title: String,
    pub status: String,
    pub bean_type: String,
}

/// Re-render a file with the patched header, keeping its body verbatim.
///
/// Keys not named in the patch are preserved in their original order. When
/// the existing content has no recognizable header, the whole content is
/// treated as body.
pub fn render_patched(content: &str, patch: &HeaderPatch) -> Result<String, serde_yaml::Error> {
    let (mut mapping, body) = match split(content) {
        Some(parts) => (header_mapping(parts.header), parts.body),
        None => (Mapping::new(), content),
    };

    let mut set = |key: &str, value: &str| {
        mapping.insert(
            serde_yaml::Value::String(key.to_string()),
            serde_yaml::Value::String(value.to_string()),
        );
    };
    if let Some(id) = &patch.id {
        set("id", id);
    }
    set("title", &patch.title);
    set("status", &patch.status);
    set("type", &patch.bean_type);

    let yaml = serde_yaml::to_string(&mapping)?;
    let mut out = String::with_capacity(yaml.len() + body.len() + 8);
    out.push_str(DELIMITER);
    out.push('\n');
    out.push_str(&yaml);
    if !yaml.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(DELIMITER);
    out.push('\n');
    out.push_str(body);
    Ok(out)
}

/// Characters that make an unquoted YAML scalar mean something else.
fn needs_quoting(value: &str) -> bool {
    value.contains(": ")
        || value.ends_with(':')
        || value.contains(" #")
        || value.starts_with("- ")
        || value.starts_with("? ")
        || value.starts_with(['#', '[', ']', '{', '}', '&', '*', '!', '|', '>', '%', '@', '`', ',', '"', '\''])
}

/// Whether `value` is one complete quoted scalar, optionally followed by a
/// comment.
fn is_quoted_scalar(value: &str) -> bool {
    let mut chars = value.char_indices();
    let Some((_, open)) = chars.next() else {
        return false;
    };
    if open != '"' && open != '\'' {
        return false;
    }

    let mut close = None;
    let mut escaped = false;
    let mut pending_single = false;
    for (i, c) in chars {
        if open == '"' {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => {
                    close = Some(i);
                    break;
                }
                _ => {}
            }
        } else if pending_single {
            // `''` is an escaped quote; anything else closed the scalar.
            if c == '\'' {
                pending_single = false;
            } else {
                close = Some(i - 1);
                break;
            }
        } else if c == '\'' {
            pending_single = true;
        }
    }
    if close.is_none() && pending_single {
        close = Some(value.len() - 1);
    }

    let Some(close) = close else {
        return false;
    };
    let rest = &value[close + 1..];
    rest.is_empty() || (rest.starts_with([' ', '\t']) && rest.trim_start().starts_with('#'))
}

/// Quote the header's `title:` line if its value would be misparsed.
///
/// Returns `None` when nothing needs to change, so callers can skip the write
/// entirely.
#[must_use]
pub fn quote_title_line(content: &str) -> Option<String> {
    let parts = split(content)?;
    let mut offset = parts.header_start;
    for line in parts.header.split_inclusive('\n') {
        let bare = line.trim_end_matches(['\n', '\r']);
        if let Some(raw_value) = bare.strip_prefix("title:") {
            let value = raw_value.trim();
            if value.is_empty() || is_quoted_scalar(value) || !needs_quoting(value) {
                return None;
            }
            let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
            let ending = &line[bare.len()..];
            let mut out = String::with_capacity(content.len() + 2);
            out.push_str(&content[..offset]);
            out.push_str("title: \"");
            out.push_str(&escaped);
            out.push('"');
            out.push_str(ending);
            out.push_str(&content[offset + line.len()..]);
            return Some(out);
        }
        offset += line.len();
    }
    None
}
