//! Logical path helpers.
//!
//! Paths handled here are *logical*: `/`-separated strings addressed relative to
//! some root (a cache directory, a file store). They are normalized textually,
//! without touching the filesystem.
//!
//! ```rust
//! use kit::path;
//!
//! assert_eq!(path::combine(&["one/../two"]).unwrap(), "two");
//! assert_eq!(path::combine(&["/one", ".."]).unwrap(), "/");
//! assert!(path::combine(&["/.."]).is_err());
//! ```
use crate::errors::{KitError, Result};

/// Maximum length (in bytes) of a name produced by [`safe_file_name`].
pub const MAX_FILE_NAME_LEN: usize = 250;

const ILLEGAL_FILE_NAME_CHARS: &[char] = &['\\', '/', ':', '*', '?', '<', '>', '|', '"', '\r', '\n', '\t'];

/// Joins `segments` with `/` and normalizes the result.
///
/// - `.` segments are dropped.
/// - `..` pops the previous segment. Popping the leading empty segment of an
///   absolute path would leave the root, which is an error. When there is
///   nothing left to pop (or the previous segment is itself `..`), the `..` is kept.
/// - Empty segments (from `//`) are dropped, except the leading one that marks
///   an absolute path.
pub fn combine<S: AsRef<str>>(segments: &[S]) -> Result<String> {
    let joined = segments
        .iter()
        .map(|s| s.as_ref())
        .collect::<Vec<_>>()
        .join("/")
        .replace('\\', "/");

    if joined.is_empty() {
        return Ok(String::new());
    }

    let mut out: Vec<&str> = Vec::new();
    for (idx, segment) in joined.split('/').enumerate() {
        match segment {
            "." => {}
            "" if idx > 0 => {}
            ".." => match out.last() {
                Some(&"") => return Err(KitError::PathEscapesRoot(joined.clone())),
                Some(&"..") | None => out.push(".."),
                Some(_) => {
                    out.pop();
                }
            },
            other => out.push(other),
        }
    }

    if out.len() == 1 && out[0].is_empty() {
        return Ok("/".to_string());
    }
    Ok(out.join("/"))
}

/// Turns an arbitrary string into something usable as a single file name.
///
/// Characters that are illegal in file names on common platforms (plus quotes
/// and embedded newlines) become `_`; a run of them collapses into a single `_`.
/// The result is truncated to [`MAX_FILE_NAME_LEN`] bytes.
pub fn safe_file_name(name: &str) -> String {
    safe_file_name_within(name, MAX_FILE_NAME_LEN)
}

/// [`safe_file_name`] with a custom byte limit, for names that still get a
/// suffix appended. Truncation never splits a UTF-8 sequence.
pub fn safe_file_name_within(name: &str, max_len: usize) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_replaced = false;

    for c in name.chars() {
        if ILLEGAL_FILE_NAME_CHARS.contains(&c) || c.is_control() {
            if !last_replaced {
                out.push('_');
            }
            last_replaced = true;
        } else {
            out.push(c);
            last_replaced = false;
        }
    }

    let mut end = out.len().min(max_len);
    while !out.is_char_boundary(end) {
        end -= 1;
    }
    out.truncate(end);
    out
}

/// Last component of `path`, ignoring any `?query` suffix.
pub fn file_name(path: &str) -> &str {
    let path = path.split_once('?').map_or(path, |(p, _)| p);
    path.rsplit('/').next().unwrap_or(path)
}

/// Parent of `path`, i.e. `combine(path, "..")`.
pub fn parent(path: &str) -> Result<String> {
    combine(&[path, ".."])
}
