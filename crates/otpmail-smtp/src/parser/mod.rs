//! SMTP reply recognition over a raw byte buffer.
//!
//! Replies can be single-line or multi-line:
//! - Single: `250 OK\r\n`
//! - Multi: `250-First line\r\n250-Second line\r\n250 Last line\r\n`
//!
//! Bytes arrive in arbitrary chunks, so the parser only reports a reply once
//! its final line is complete and leaves partial input untouched.

use crate::error::{Error, Result};
use crate::types::{Reply, ReplyCode};

/// Longest reply line accepted, CRLF included (RFC 5321 section 4.5.3.1.5).
pub const MAX_LINE_LEN: usize = 512;

/// Longest multi-line reply accepted.
pub const MAX_REPLY_LEN: usize = 64 * 1024;

/// Looks for the first complete reply at the start of `buf`.
///
/// Returns the reply and the number of bytes it occupies, or `None` if the
/// final line has not arrived yet.
///
/// # Errors
///
/// Returns an error if a complete line does not start with a reply code, or
/// if a line or reply grows past [`MAX_LINE_LEN`] or [`MAX_REPLY_LEN`].
pub fn next_reply(buf: &[u8]) -> Result<Option<(Reply, usize)>> {
    let mut lines = Vec::new();
    let mut start = 0;

    while let Some(offset) = buf[start..].iter().position(|&b| b == b'\n') {
        if offset + 1 > MAX_LINE_LEN {
            return Err(too_long("reply line", MAX_LINE_LEN));
        }
        let end = start + offset;
        let line = strip_cr(&buf[start..end]);
        start = end + 1;

        let code = ReplyCode::from_digits(line).ok_or_else(|| malformed(line))?;
        let text = line.get(4..).unwrap_or_default();
        lines.push(String::from_utf8_lossy(text).into_owned());

        if is_last_reply_line(line) {
            return Ok(Some((Reply::new(code, lines), start)));
        }
        if line[3] != b'-' {
            return Err(malformed(line));
        }
    }

    if buf.len() - start > MAX_LINE_LEN {
        return Err(too_long("reply line", MAX_LINE_LEN));
    }
    if buf.len() > MAX_REPLY_LEN {
        return Err(too_long("reply", MAX_REPLY_LEN));
    }
    Ok(None)
}

/// Checks if a line is the last line of a reply.
///
/// Multi-line replies use `-` after the code for continuation and ` ` (or
/// nothing) for the last line.
#[must_use]
pub fn is_last_reply_line(line: &[u8]) -> bool {
    line.len() == 3 || (line.len() >= 4 && line[3] == b' ')
}

fn strip_cr(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn too_long(what: &str, limit: usize) -> Error {
    Error::Protocol(format!("{what} exceeds {limit} octets"))
}

fn malformed(line: &[u8]) -> Error {
    Error::Protocol(format!(
        "Malformed reply line: {}",
        String::from_utf8_lossy(line)
    ))
}
