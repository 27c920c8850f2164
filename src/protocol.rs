//! Wire-level types of the control protocol.
//!
//! Replies are CRLF-delimited lines of the form `<3-digit status><sep><text>`
//! where `sep` is `-` (mid-reply), `+` (data reply, followed by a block
//! terminated by a lone `.`) or a space (end of the logical message).

use crate::error::is_success_status;
use std::collections::HashMap;
use thiserror::Error;

/// Status value used when a code could not be parsed.
pub const UNPARSED_STATUS: i32 = -1;

/// Line terminating a multi-line data block.
pub const END_OF_DATA: &str = ".";

/// Why a reply line could not be classified.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LineError {
    /// Too short, or the first three characters are not a status code.
    #[error("malformed reply line: '{0}'")]
    Malformed(String),

    /// Status code parsed, but the fourth character is not a known separator.
    #[error("unknown separator '{separator}' in: '{line}'")]
    UnknownSeparator {
        /// The offending character.
        separator: char,
        /// The full line.
        line: String,
    },
}

/// The role a reply line plays in its logical message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    /// `NNN-text`
    Mid,
    /// `NNN+text`, opens a data block.
    Data,
    /// `NNN text`, closes the message.
    End,
}

impl LineKind {
    fn from_separator(separator: char) -> Option<Self> {
        match separator {
            '-' => Some(LineKind::Mid),
            '+' => Some(LineKind::Data),
            ' ' => Some(LineKind::End),
            _ => None,
        }
    }

    /// The separator character for this kind.
    pub fn separator(&self) -> char {
        match self {
            LineKind::Mid => '-',
            LineKind::Data => '+',
            LineKind::End => ' ',
        }
    }
}

/// A single classified reply line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyLine {
    /// The 3-digit status code.
    pub status: i32,
    /// What kind of line this is.
    pub kind: LineKind,
    /// The text after the separator.
    pub text: String,
}

impl ReplyLine {
    /// Parse a terminator-stripped reply line.
    pub fn parse(line: &str) -> Result<Self, LineError> {
        let status = parse_status(line).ok_or_else(|| LineError::Malformed(line.to_string()))?;

        // The first three bytes are ASCII digits, so index 3 is a char boundary.
        let separator = line[3..]
            .chars()
            .next()
            .ok_or_else(|| LineError::Malformed(line.to_string()))?;

        let kind = LineKind::from_separator(separator).ok_or_else(|| LineError::UnknownSeparator {
            separator,
            line: line.to_string(),
        })?;

        Ok(ReplyLine {
            status,
            kind,
            text: line[3 + separator.len_utf8()..].to_string(),
        })
    }
}

fn parse_status(line: &str) -> Option<i32> {
    let code = line.get(..3)?;
    if !code.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    code.parse().ok()
}

/// A `NNN-text` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MidReplyLine {
    /// Status code.
    pub status: i32,
    /// Text after the separator.
    pub text: String,
}

impl MidReplyLine {
    /// Create a mid-reply line.
    pub fn new(status: i32, text: impl Into<String>) -> Self {
        Self {
            status,
            text: text.into(),
        }
    }

    /// Split `KEY=VALUE` text. Text without `=` yields an empty value.
    pub fn key_value(&self) -> (&str, &str) {
        self.text.split_once('=').unwrap_or((self.text.as_str(), ""))
    }
}

/// A `NNN+text` line together with the block that followed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataReplyLine {
    /// Status code.
    pub status: i32,
    /// Text after the separator, usually `key=`.
    pub text: String,
    /// Block lines in arrival order, without the `.` terminator.
    pub body: Vec<String>,
}

impl DataReplyLine {
    /// Start a data block with no body yet.
    pub fn new(status: i32, text: impl Into<String>) -> Self {
        Self {
            status,
            text: text.into(),
            body: Vec::new(),
        }
    }

    /// The key this block carries (`text` minus a trailing `=`).
    pub fn key(&self) -> &str {
        self.text.strip_suffix('=').unwrap_or(&self.text)
    }

    /// The body joined with `\n`.
    pub fn data(&self) -> String {
        self.body.join("\n")
    }
}

/// The `NNN text` line closing a logical message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndReplyLine {
    /// Authoritative status of the whole message.
    pub status: i32,
    /// Status text.
    pub text: String,
}

impl EndReplyLine {
    /// Create an end-reply line.
    pub fn new(status: i32, text: impl Into<String>) -> Self {
        Self {
            status,
            text: text.into(),
        }
    }

    /// Build from a raw `NNN text` line, using [`UNPARSED_STATUS`] when the
    /// code is not numeric.
    pub fn from_raw(line: &str) -> Self {
        let (code, text) = line.split_once(' ').unwrap_or((line, ""));
        let status = parse_status(code)
            .filter(|_| code.len() == 3)
            .unwrap_or(UNPARSED_STATUS);
        Self::new(status, text)
    }
}

/// One complete logical message.
///
/// Only the parser builds these, and only once the end-reply line has been
/// seen, so a `ResponseBuffer` is never partial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseBuffer {
    /// Mid-reply lines in arrival order.
    pub mid_reply_lines: Vec<MidReplyLine>,
    /// Data blocks in arrival order.
    pub data_reply_lines: Vec<DataReplyLine>,
    /// The terminating line.
    pub end_reply_line: EndReplyLine,
}

impl ResponseBuffer {
    /// Assemble a buffer from its parts.
    pub fn new(
        mid_reply_lines: Vec<MidReplyLine>,
        data_reply_lines: Vec<DataReplyLine>,
        end_reply_line: EndReplyLine,
    ) -> Self {
        Self {
            mid_reply_lines,
            data_reply_lines,
            end_reply_line,
        }
    }

    /// A buffer holding just an end-reply line.
    pub fn single(status: i32, text: impl Into<String>) -> Self {
        Self::new(Vec::new(), Vec::new(), EndReplyLine::new(status, text))
    }

    /// Status of the end-reply line.
    pub fn status(&self) -> i32 {
        self.end_reply_line.status
    }

    /// Text of the end-reply line.
    pub fn status_text(&self) -> &str {
        &self.end_reply_line.text
    }

    /// See [`is_success_status`].
    pub fn is_success(&self) -> bool {
        is_success_status(self.status())
    }

    /// The first value carried by the message: the first mid-reply line's
    /// value, otherwise the first data block's body.
    pub fn first_value(&self) -> Option<String> {
        if let Some(line) = self.mid_reply_lines.first() {
            return Some(line.key_value().1.to_string());
        }
        self.data_reply_lines.first().map(DataReplyLine::data)
    }

    /// Look up a value by key prefix over mid-reply lines, then data blocks.
    pub fn value_of(&self, key: &str) -> Option<String> {
        if let Some(line) = self.mid_reply_lines.iter().find(|l| l.text.starts_with(key)) {
            let prefix = format!("{}=", key);
            return Some(line.text.strip_prefix(&prefix).unwrap_or(&line.text).to_string());
        }

        self.data_reply_lines
            .iter()
            .find(|l| l.text.starts_with(key))
            .map(DataReplyLine::data)
    }

    /// All key/value pairs from mid-reply lines and data blocks.
    pub fn values(&self) -> HashMap<String, String> {
        let mut result = HashMap::new();

        for line in &self.mid_reply_lines {
            let (key, value) = line.key_value();
            result.insert(key.to_string(), value.to_string());
        }

        for block in &self.data_reply_lines {
            result.insert(block.key().to_string(), block.data());
        }

        result
    }

    /// The message as it appeared on the wire, one entry per line.
    pub fn raw_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();

        for line in &self.mid_reply_lines {
            lines.push(format!("{:03}-{}", line.status, line.text));
        }

        for block in &self.data_reply_lines {
            lines.push(format!("{:03}+{}", block.status, block.text));
            lines.extend(block.body.iter().cloned());
            lines.push(END_OF_DATA.to_string());
        }

        lines.push(format!(
            "{:03} {}",
            self.end_reply_line.status, self.end_reply_line.text
        ));
        lines
    }
}

/// Outbound lines, before normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineBuffer(Vec<String>);

impl LineBuffer {
    /// Create an empty line buffer.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Append a line.
    pub fn push(&mut self, line: impl Into<String>) {
        self.0.push(line.into());
    }

    /// The buffered lines.
    pub fn lines(&self) -> &[String] {
        &self.0
    }

    /// Number of buffered entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the buffer holds no lines.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Wire bytes: bare `\n` becomes CRLF and every entry ends with CRLF.
    ///
    /// Normalizing an already normalized buffer is a no-op.
    pub fn normalize(&self) -> Vec<u8> {
        let mut out = Vec::new();

        for line in &self.0 {
            let line = line.replace("\r\n", "\n").replace('\n', "\r\n");
            out.extend_from_slice(line.as_bytes());
            if !line.ends_with("\r\n") {
                out.extend_from_slice(b"\r\n");
            }
        }

        out
    }
}

impl From<&str> for LineBuffer {
    fn from(line: &str) -> Self {
        Self(vec![line.to_string()])
    }
}

impl From<String> for LineBuffer {
    fn from(line: String) -> Self {
        Self(vec![line])
    }
}

impl From<Vec<String>> for LineBuffer {
    fn from(lines: Vec<String>) -> Self {
        Self(lines)
    }
}

/// Extract `KEY=VALUE` and `KEY="quoted value"` pairs from reply text.
///
/// Keys are runs of `[A-Za-z0-9_/]`. Unquoted values are runs of
/// `[A-Za-z0-9_,]`; quoted values may contain backslash escapes. Anything
/// that does not fit the grammar is skipped.
pub fn parse_key_value_pairs(text: &str) -> HashMap<String, String> {
    let mut result = HashMap::new();
    let bytes = text.as_bytes();
    let mut pos = 0;

    while pos < bytes.len() {
        if !is_key_byte(bytes[pos]) {
            pos += 1;
            continue;
        }

        let key_start = pos;
        while pos < bytes.len() && is_key_byte(bytes[pos]) {
            pos += 1;
        }
        let key = &text[key_start..pos];

        if bytes.get(pos) != Some(&b'=') {
            continue;
        }

        let value_start = pos + 1;
        let parsed = if bytes.get(value_start) == Some(&b'"') {
            parse_quoted_string(&text[value_start..])
        } else {
            parse_bare_value(&text[value_start..])
        };

        if let Some((value, consumed)) = parsed {
            result.insert(key.to_string(), value);
            pos = value_start + consumed;
        }
    }

    result
}

fn is_key_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'/'
}

fn parse_bare_value(s: &str) -> Option<(String, usize)> {
    let end = s
        .bytes()
        .position(|b| !(b.is_ascii_alphanumeric() || b == b'_' || b == b','))
        .unwrap_or(s.len());

    if end == 0 {
        None
    } else {
        Some((s[..end].to_string(), end))
    }
}

/// Parse a quoted string, returning the unescaped value and the number of
/// bytes consumed including both quotes. Unterminated strings yield `None`.
fn parse_quoted_string(s: &str) -> Option<(String, usize)> {
    let mut chars = s.char_indices();
    if !matches!(chars.next(), Some((_, '"'))) {
        return None;
    }

    let mut result = String::new();
    while let Some((i, c)) = chars.next() {
        match c {
            '"' => return Some((result, i + 1)),
            '\\' => {
                let (_, next) = chars.next()?;
                match next {
                    'n' => result.push('\n'),
                    'r' => result.push('\r'),
                    't' => result.push('\t'),
                    other => result.push(other),
                }
            }
            _ => result.push(c),
        }
    }

    None
}

/// Quote a string for use as a command argument.
pub fn quote_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 2);
    result.push('"');

    for c in s.chars() {
        match c {
            '"' => result.push_str("\\\""),
            '\\' => result.push_str("\\\\"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            _ => result.push(c),
        }
    }

    result.push('"');
    result
}
