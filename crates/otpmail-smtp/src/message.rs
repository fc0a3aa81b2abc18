//! DATA payload composition.

use chrono::{DateTime, Utc};

use crate::types::{Address, Envelope};

/// Prefix of the plaintext line that carries the one-time code.
pub const FALLBACK_PREFIX: &str = "Your one-time code is: ";

/// Generates a Message-ID of the form `<nanos.random@domain>`.
#[must_use]
pub fn generate_message_id(sender: &Address, now: DateTime<Utc>) -> String {
    let nanos = now
        .timestamp_nanos_opt()
        .unwrap_or_else(|| now.timestamp_micros());
    let salt: u32 = rand::random();
    format!("<{nanos}.{salt:08x}@{}>", sender.domain())
}

/// Builds the full DATA payload, terminating `.` line included.
///
/// Layout: headers, blank line, HTML body, blank line, the fallback code
/// line, then `.`. Line endings are normalized to CRLF and body lines
/// starting with `.` are dot-stuffed.
#[must_use]
pub fn compose(
    from: &Address,
    envelope: &Envelope,
    message_id: &str,
    date: DateTime<Utc>,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(envelope.html_body.len() + 512);

    push_line(&mut out, &format!("From: {from}"));
    push_line(&mut out, &format!("To: {}", envelope.recipient));
    push_line(
        &mut out,
        &format!("Subject: {}", header_value(&envelope.subject)),
    );
    push_line(&mut out, &format!("Date: {}", date.to_rfc2822()));
    push_line(&mut out, &format!("Message-ID: {message_id}"));
    push_line(&mut out, "MIME-Version: 1.0");
    push_line(&mut out, "Content-Type: text/html; charset=UTF-8");
    push_line(&mut out, "");

    for line in envelope.html_body.split('\n') {
        push_body_line(&mut out, line.strip_suffix('\r').unwrap_or(line));
    }
    push_line(&mut out, "");
    push_body_line(
        &mut out,
        &format!("{FALLBACK_PREFIX}{}", header_value(&envelope.one_time_code)),
    );

    out.extend_from_slice(b".\r\n");
    out
}

/// Header values may not carry line breaks.
fn header_value(value: &str) -> String {
    value
        .chars()
        .map(|c| if c == '\r' || c == '\n' { ' ' } else { c })
        .collect()
}

fn push_line(out: &mut Vec<u8>, line: &str) {
    out.extend_from_slice(line.as_bytes());
    out.extend_from_slice(b"\r\n");
}

fn push_body_line(out: &mut Vec<u8>, line: &str) {
    if line.starts_with('.') {
        out.push(b'.');
    }
    push_line(out, line);
}
