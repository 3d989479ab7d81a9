//! Front matter handling for work item files.
//!
//! The header is a `---` delimited block of `key: value` lines at the top of
//! the file. Rewrites are byte-level substitutions inside that block so
//! unknown fields and the body survive untouched, whatever their encoding.

use super::{LifecycleState, Priority};
use regex::bytes::{NoExpand, Regex};
use std::sync::LazyLock;

/// Format of `created` / `last_updated` header values.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Format of `due_date` header values.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

static STATUS_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m-u)^status:[^\r\n]*").expect("valid regex"));
static LAST_UPDATED_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m-u)^last_updated:[^\r\n]*").expect("valid regex"));

/// Current local time in [`TIMESTAMP_FORMAT`].
pub fn now_timestamp() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Byte range of the front matter body (between the delimiter lines).
///
/// Returns `None` if the content does not start with a `---` line or the
/// block is never closed.
pub fn front_matter_span(content: &[u8]) -> Option<(usize, usize)> {
    let first_line_end = content.iter().position(|&b| b == b'\n')?;
    if content[..first_line_end].trim_ascii_end() != b"---" {
        return None;
    }
    let start = first_line_end + 1;
    let mut offset = start;
    for line in content[start..].split_inclusive(|&b| b == b'\n') {
        if line.trim_ascii_end() == b"---" {
            return Some((start, offset));
        }
        offset += line.len();
    }
    None
}

/// Rewrite `status` and `last_updated` in the header of `content`.
///
/// Missing keys are appended to the header; content without a header gets
/// one prepended. Everything else is preserved byte-for-byte, including a
/// body that is not valid UTF-8.
pub fn rewrite_status(content: &[u8], state: LifecycleState, now: &str) -> Vec<u8> {
    let status_line = format!("status: \"{}\"", state);
    let updated_line = format!("last_updated: \"{}\"", now);

    let Some((start, end)) = front_matter_span(content) else {
        let mut out = format!("---\n{status_line}\n{updated_line}\n---\n").into_bytes();
        out.extend_from_slice(content);
        return out;
    };

    let header = &content[start..end];
    let header = replace_or_append(&STATUS_LINE, header, status_line.as_bytes());
    let header = replace_or_append(&LAST_UPDATED_LINE, &header, updated_line.as_bytes());

    let mut out = Vec::with_capacity(content.len() + 32);
    out.extend_from_slice(&content[..start]);
    out.extend_from_slice(&header);
    out.extend_from_slice(&content[end..]);
    out
}

fn replace_or_append(pattern: &Regex, header: &[u8], line: &[u8]) -> Vec<u8> {
    if pattern.is_match(header) {
        return pattern.replacen(header, 1, NoExpand(line)).into_owned();
    }
    let mut out = header.to_vec();
    if !out.is_empty() && !out.ends_with(b"\n") {
        out.push(b'\n');
    }
    out.extend_from_slice(line);
    out.push(b'\n');
    out
}

/// Metadata read from a work item header.
///
/// Fields absent from the header are `None`; values are kept as written
/// apart from quote stripping, so dates are not reinterpreted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkItemMeta {
    pub title: Option<String>,
    pub status: Option<String>,
    pub priority: Option<Priority>,
    pub assignee: Option<String>,
    pub created: Option<String>,
    pub last_updated: Option<String>,
    pub due_date: Option<String>,
    pub tags: Vec<String>,
}

impl WorkItemMeta {
    pub fn parse(content: &str) -> Self {
        Self::from_bytes(content.as_bytes())
    }

    /// Parse the header of raw file content.
    ///
    /// Only the header is decoded; invalid UTF-8 there is replaced rather
    /// than rejected, and the body is never looked at.
    pub fn from_bytes(content: &[u8]) -> Self {
        let mut meta = WorkItemMeta::default();
        let Some((start, end)) = front_matter_span(content) else {
            return meta;
        };

        for line in String::from_utf8_lossy(&content[start..end]).lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = unquote(value.trim());
            match key.trim() {
                "title" => meta.title = Some(value),
                "status" => meta.status = Some(value),
                "priority" => meta.priority = value.parse().ok(),
                "assignee" => meta.assignee = Some(value),
                "created" => meta.created = Some(value),
                "last_updated" => meta.last_updated = Some(value),
                "due_date" => meta.due_date = Some(value),
                "tags" => meta.tags = parse_tags(&value),
                _ => {}
            }
        }
        meta
    }

    /// The header status as a known lifecycle state, if it is one.
    pub fn lifecycle_state(&self) -> Option<LifecycleState> {
        self.status.as_deref().and_then(|s| s.parse().ok())
    }

    /// The due date, if present and well-formed.
    pub fn due(&self) -> Option<chrono::NaiveDate> {
        self.due_date
            .as_deref()
            .and_then(|d| chrono::NaiveDate::parse_from_str(d, DATE_FORMAT).ok())
    }
}

fn unquote(value: &str) -> String {
    let stripped = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .map(|v| v.replace("\\\"", "\""));
    if let Some(v) = stripped {
        return v;
    }
    value
        .strip_prefix('\'')
        .and_then(|v| v.strip_suffix('\''))
        .unwrap_or(value)
        .to_string()
}

fn parse_tags(value: &str) -> Vec<String> {
    let inner = value
        .strip_prefix('[')
        .and_then(|v| v.strip_suffix(']'))
        .unwrap_or(value);
    inner
        .split(',')
        .map(|t| unquote(t.trim()))
        .filter(|t| !t.is_empty())
        .collect()
}

/// Header of a freshly created work item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItemHeader {
    pub title: String,
    pub status: LifecycleState,
    pub priority: Priority,
    pub assignee: String,
    pub created: String,
    pub last_updated: String,
    pub due_date: String,
    pub tags: Vec<String>,
}

impl WorkItemHeader {
    /// Render the front matter block, including both delimiter lines.
    pub fn render(&self) -> String {
        let tags = self
            .tags
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "---\n\
             title: \"{}\"\n\
             status: \"{}\"\n\
             priority: \"{}\"\n\
             assignee: \"{}\"\n\
             created: \"{}\"\n\
             last_updated: \"{}\"\n\
             due_date: \"{}\"\n\
             tags: [{}]\n\
             ---\n",
            escape(&self.title),
            self.status,
            self.priority,
            escape(&self.assignee),
            self.created,
            self.last_updated,
            self.due_date,
            tags,
        )
    }
}

fn escape(value: &str) -> String {
    value.replace('"', "\\\"").replace(['\n', '\r'], " ")
}
