//! RESP-to-human pretty-printer for the debugger's `<reply>` log lines.
//!
//! Grounded on `ldbRespToHuman` and its per-type helpers in `debug_lua.c`:
//! each RESP type tag gets its own renderer, containers recurse into their
//! elements, and nesting is capped the same way value rendering is.

use crate::value::{quote_escape, RENDER_DEPTH_CAP};

#[derive(Debug, PartialEq, Eq)]
pub enum RespError {
    Truncated,
    Protocol(String),
}

/// Renders one complete RESP reply found at the start of `input` as a
/// human-readable string, returning the rendered text and the remaining
/// unconsumed bytes.
pub fn resp_to_human(input: &[u8]) -> Result<(String, &[u8]), RespError> {
    render_at(input, 0)
}

fn render_at(input: &[u8], depth: usize) -> Result<(String, &[u8]), RespError> {
    let (&tag, rest) = input.split_first().ok_or(RespError::Truncated)?;
    let (line, rest) = take_line(rest)?;

    match tag {
        b':' => Ok((line.to_string(), rest)),
        b',' => Ok((format!("(double) {}", line), rest)),
        b'+' | b'-' => Ok((render_status(tag, line), rest)),
        b'_' => Ok(("(null)".to_string(), rest)),
        b'#' => match line {
            "t" => Ok(("#true".to_string(), rest)),
            "f" => Ok(("#false".to_string(), rest)),
            other => Err(RespError::Protocol(format!("bad bool tag {other}"))),
        },
        b'$' => render_bulk(line, rest),
        b'*' => render_container(line, rest, depth, "[", "]", ", "),
        b'~' => render_container(line, rest, depth, "~(", ")", ", "),
        b'%' => render_map(line, rest, depth),
        other => Err(RespError::Protocol(format!("unknown RESP tag '{}'", other as char))),
    }
}

fn take_line(input: &[u8]) -> Result<(&str, &[u8]), RespError> {
    let pos = input
        .windows(2)
        .position(|w| w == b"\r\n")
        .ok_or(RespError::Truncated)?;
    let line = std::str::from_utf8(&input[..pos]).map_err(|_| RespError::Protocol("non-utf8 line".to_string()))?;
    Ok((line, &input[pos + 2..]))
}

/// Reprs the whole simple-status line, INCLUDING the leading tag byte,
/// matching `ldbRespToHuman_Status`'s behavior for both `+` and `-`.
fn render_status(tag: u8, line: &str) -> String {
    quote_escape(&format!("{}{}", tag as char, line))
}

fn render_bulk(len_str: &str, rest: &[u8]) -> Result<(String, &[u8]), RespError> {
    let len: i64 = len_str.parse().map_err(|_| RespError::Protocol("bad bulk length".to_string()))?;
    if len < 0 {
        return Ok(("NULL".to_string(), rest));
    }
    let len = len as usize;
    if rest.len() < len + 2 {
        return Err(RespError::Truncated);
    }
    let data = std::str::from_utf8(&rest[..len]).map_err(|_| RespError::Protocol("non-utf8 bulk".to_string()))?;
    Ok((quote_escape(data), &rest[len + 2..]))
}

fn render_container<'a>(
    count_str: &str,
    mut rest: &'a [u8],
    depth: usize,
    open: &str,
    close: &str,
    sep: &str,
) -> Result<(String, &'a [u8]), RespError> {
    if depth >= RENDER_DEPTH_CAP {
        // Still must consume the elements to leave `rest` correctly positioned.
        let count: i64 = count_str.parse().map_err(|_| RespError::Protocol("bad count".to_string()))?;
        for _ in 0..count.max(0) {
            let (_, r) = render_at(rest, depth + 1)?;
            rest = r;
        }
        return Ok(("...".to_string(), rest));
    }
    let count: i64 = count_str.parse().map_err(|_| RespError::Protocol("bad count".to_string()))?;
    let mut items = Vec::new();
    for _ in 0..count.max(0) {
        let (item, r) = render_at(rest, depth + 1)?;
        items.push(item);
        rest = r;
    }
    Ok((format!("{}{}{}", open, items.join(sep), close), rest))
}

fn render_map(count_str: &str, mut rest: &[u8], depth: usize) -> Result<(String, &[u8]), RespError> {
    let count: i64 = count_str.parse().map_err(|_| RespError::Protocol("bad count".to_string()))?;
    let mut pairs = Vec::new();
    for _ in 0..count.max(0) {
        let (key, r) = render_at(rest, depth + 1)?;
        rest = r;
        let (val, r) = render_at(rest, depth + 1)?;
        rest = r;
        pairs.push(format!("{} => {}", key, val));
    }
    Ok((format!("{{{}}}", pairs.join(", ")), rest))
}
