use std::fmt;

use http::Method;
use url::Url;

use crate::net::response::{is_html_mime, is_text_mime};
use crate::path;

/// Identifies a cached response: caller tag, HTTP verb and absolute URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub tag: String,
    pub method: Method,
    pub url: Url,
}

impl CacheKey {
    pub fn new(tag: impl Into<String>, method: Method, url: Url) -> Self {
        Self {
            tag: tag.into(),
            method,
            url,
        }
    }
}

/// Renders the key as it appears in the registry. Control characters in the
/// tag become `_` so a key always stays on one registry line.
impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag: String = self
            .tag
            .chars()
            .map(|c| if c.is_control() { '_' } else { c })
            .collect();
        write!(f, "({tag};{}) {}", self.method, self.url)
    }
}

/// Suffix of the sidecar file, the longest one appended to a file name.
const INFO_SUFFIX: &str = ".info.txt";

/// One registry line: key, MIME type and body file name (without extension).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: String,
    pub mime: String,
    pub file_name: String,
}

impl CacheEntry {
    /// Builds the entry for sequence number `sequence`.
    pub fn new(sequence: u32, key: &CacheKey, mime: &str) -> Self {
        Self {
            key: key.to_string(),
            mime: mime.to_string(),
            file_name: path::safe_file_name_within(
                &format!("{sequence:04} {key}"),
                path::MAX_FILE_NAME_LEN - INFO_SUFFIX.len(),
            ),
        }
    }

    /// Body file: `.html` for HTML, `.txt` for other text, no extension for binary.
    pub fn body_path(&self) -> String {
        let ext = if is_html_mime(&self.mime) {
            ".html"
        } else if is_text_mime(&self.mime) {
            ".txt"
        } else {
            ""
        };
        format!("{}{ext}", self.file_name)
    }

    /// Sidecar with the formatted request and response headers.
    pub fn info_path(&self) -> String {
        format!("{}{INFO_SUFFIX}", self.file_name)
    }

    /// Serializes the entry as a registry line (no trailing newline).
    pub fn to_line(&self) -> String {
        format!("{} | {} | {}", self.key, self.mime, self.file_name)
    }

    /// Parses a registry line. Splits from the right so keys may contain `|`.
    pub fn parse_line(line: &str) -> Option<Self> {
        let mut fields = line.rsplitn(3, '|').map(str::trim);
        let file_name = fields.next()?;
        let mime = fields.next()?;
        let key = fields.next()?;
        if key.is_empty() || file_name.is_empty() {
            return None;
        }
        Some(Self {
            key: key.to_string(),
            mime: mime.to_string(),
            file_name: file_name.to_string(),
        })
    }

    /// Sequence number encoded at the start of the file name.
    pub fn sequence(&self) -> Option<u32> {
        self.file_name.split(' ').next()?.parse().ok()
    }
}
