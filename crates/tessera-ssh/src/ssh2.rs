// ABOUTME: Parser for the RFC 4716 "SSH2 public key" interchange format.
// ABOUTME: Collects header metadata and decodes the base64 body into a public key.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ssh_key::PublicKey;

use crate::error::{Result, SshError};

/// First line of an interchange public-key block.
pub const SSH2_BEGIN: &str = "---- BEGIN SSH2 PUBLIC KEY ----";
/// Last line of an interchange public-key block.
pub const SSH2_END: &str = "---- END SSH2 PUBLIC KEY ----";

/// Parse an SSH2 public key block.
///
/// Header lines (`Tag: value`, continued with a trailing `\`) are skipped
/// except `Comment`, which becomes the key comment. Body lines are joined and
/// decoded as the binary public-key wire encoding.
///
/// # Errors
/// Returns `SshError::MalformedKey` if the block is incomplete or the body
/// does not decode.
pub fn parse_ssh2_public_key(text: &str) -> Result<PublicKey> {
    parse_block(text).map_err(|reason| SshError::MalformedKey {
        source_label: "SSH2 public key block".to_string(),
        reason,
    })
}

pub(crate) fn looks_like_ssh2(text: &str) -> bool {
    text.trim_start().starts_with(SSH2_BEGIN)
}

pub(crate) fn parse_block(text: &str) -> std::result::Result<PublicKey, String> {
    let mut lines = text.lines().map(str::trim).skip_while(|l| l.is_empty());

    if lines.next() != Some(SSH2_BEGIN) {
        return Err(format!("missing `{SSH2_BEGIN}` marker"));
    }

    let mut body = String::new();
    let mut comment: Option<String> = None;
    // Header being continued across lines: (tag, accumulated value).
    let mut pending: Option<(String, String)> = None;
    let mut closed = false;

    for line in lines {
        if line == SSH2_END {
            closed = true;
            break;
        }

        if let Some((tag, mut value)) = pending.take() {
            let (part, continued) = split_continuation(line);
            value.push_str(part);
            if continued {
                pending = Some((tag, value));
            } else {
                record_header(&tag, &value, &mut comment);
            }
            continue;
        }

        if body.is_empty() {
            if let Some((tag, value)) = line.split_once(':') {
                let (part, continued) = split_continuation(value.trim_start());
                if continued {
                    pending = Some((tag.trim().to_string(), part.to_string()));
                } else {
                    record_header(tag.trim(), part, &mut comment);
                }
                continue;
            }
        }

        body.push_str(line);
    }

    if !closed {
        return Err(format!("missing `{SSH2_END}` marker"));
    }
    if pending.is_some() {
        return Err("header continuation runs into the end marker".to_string());
    }
    if body.is_empty() {
        return Err("block has no key body".to_string());
    }

    let wire = STANDARD
        .decode(body.as_bytes())
        .map_err(|e| format!("key body is not valid base64: {e}"))?;

    let mut key = PublicKey::from_bytes(&wire).map_err(|e| format!("invalid key body: {e}"))?;
    if let Some(comment) = comment {
        key.set_comment(comment);
    }
    Ok(key)
}

fn split_continuation(value: &str) -> (&str, bool) {
    match value.strip_suffix('\\') {
        Some(rest) => (rest, true),
        None => (value, false),
    }
}

fn record_header(tag: &str, value: &str, comment: &mut Option<String>) {
    if tag.eq_ignore_ascii_case("Comment") {
        let value = value.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(value);
        *comment = Some(value.to_string());
    }
}
