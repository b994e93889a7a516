//! Primitive value codecs: numbers, quoted strings, struct lines and
//! base64 line wrapping.

use crate::error::EncodingError;
use crate::node::Param;

/// Width of a wrapped base64 payload line.
pub const BASE64_LINE_WIDTH: usize = 128;

/// Indentation unit of the canonical layout.
pub const INDENT: &str = "  ";

const DELIMITERS: [char; 3] = ['"', '\'', '`'];

pub fn indent(level: usize) -> String {
    INDENT.repeat(level)
}

/// Canonical decimal form of a number: no forced decimals, no trailing zeros.
pub fn format_number(n: f64) -> Result<String, EncodingError> {
    if !n.is_finite() {
        return Err(EncodingError::NonFiniteNumber(n.to_string()));
    }
    if n == 0.0 {
        // -0 reads back as 0
        return Ok("0".to_string());
    }
    Ok(format!("{n}"))
}

/// True when `s` carries every quote delimiter and so cannot be quoted losslessly.
pub fn needs_side_channel(s: &str) -> bool {
    DELIMITERS.iter().all(|d| s.contains(*d))
}

/// Quote `s` for a parameter position.
///
/// Bare when possible, otherwise wrapped in the first delimiter not present
/// in `s`. A string containing all three delimiters is wrapped in backticks
/// with its own backticks folded to `'`; see [`needs_side_channel`].
pub fn format_string(s: &str) -> String {
    let bare = !s.is_empty()
        && !s.chars().any(char::is_whitespace)
        && !s.starts_with(DELIMITERS);
    if bare {
        return s.to_string();
    }

    match DELIMITERS.iter().find(|d| !s.contains(**d)) {
        Some(d) => format!("{d}{s}{d}"),
        None => format!("`{}`", s.replace('`', "'")),
    }
}

/// One parameter as written on a line. Strings holding a line break have
/// no single-line form.
pub fn format_param(param: &Param) -> Result<String, EncodingError> {
    match param {
        Param::Number(n) => format_number(*n),
        Param::String(s) if s.contains(['\n', '\r']) => {
            Err(EncodingError::LineBreakInString(s.clone()))
        }
        Param::String(s) => Ok(format_string(s)),
    }
}

/// Parameters joined with single spaces, each preceded by one.
pub fn format_params(params: &[Param]) -> Result<String, EncodingError> {
    let mut out = String::new();
    for param in params {
        out.push(' ');
        out.push_str(&format_param(param)?);
    }
    Ok(out)
}

/// `TOKEN p1 p2 ...` for a struct at `level`, without leading indentation.
///
/// Every string parameter holding all three delimiters gets a `|` block
/// with the same token appended, one level deeper, carrying the raw value.
pub fn struct_text(token: &str, params: &[Param], level: usize) -> Result<String, EncodingError> {
    let mut out = format!("{token}{}", format_params(params)?);
    for raw in params
        .iter()
        .filter_map(Param::as_str)
        .filter(|s| needs_side_channel(s))
    {
        out.push('\n');
        out.push_str(&indent(level + 1));
        out.push('<');
        out.push_str(token);
        out.push('\n');
        out.push_str(&indent(level + 2));
        out.push('|');
        out.push_str(raw);
        out.push('\n');
        out.push_str(&indent(level + 1));
        out.push('>');
    }
    Ok(out)
}

/// Split flat base64 text into lines of [`BASE64_LINE_WIDTH`] characters.
pub fn wrap_base64(flat: &str) -> Vec<&str> {
    let mut lines = Vec::with_capacity(flat.len() / BASE64_LINE_WIDTH + 1);
    let mut rest = flat;
    while !rest.is_empty() {
        // base64 text is ASCII, so byte and char boundaries agree
        let cut = rest.len().min(BASE64_LINE_WIDTH);
        let (line, tail) = rest.split_at(cut);
        lines.push(line);
        rest = tail;
    }
    lines
}

/// Join wrapped lines back into flat text, ignoring indentation.
pub fn unwrap_base64<'a>(lines: impl IntoIterator<Item = &'a str>) -> String {
    lines.into_iter().map(str::trim).collect()
}

/// Exact decoded byte length of padded base64 text.
pub fn decoded_len(b64: &str) -> usize {
    let len = b64.trim_end().len();
    let pad = if b64.trim_end().ends_with("==") {
        2
    } else if b64.trim_end().ends_with('=') {
        1
    } else {
        0
    };
    (len - pad) * 3 / 4
}

pub fn is_base64_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '=')
}
