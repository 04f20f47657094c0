//! Content-Disposition header parsing (filename and filename*).
//!
//! Header values reach this module byte-preserving: every raw header byte is
//! one `char` in U+0000..=U+00FF (see `transfer::response`). That lets the
//! plain `filename=` form be re-decoded with the response charset.

/// Extracts the filename from a raw Content-Disposition header value.
///
/// Supports:
/// - `filename*=charset'lang'percent-encoded` (RFC 5987; UTF-8 and ISO-8859-1)
/// - `filename="value"` (quoted; strips quotes and unescapes)
/// - `filename=value` (token)
///
/// If both `filename` and a decodable `filename*` exist, `filename*` takes precedence.
/// `charset` is the response `Content-Type` charset, used for the plain form only.
pub fn parse_content_disposition_filename(
    header_value: &str,
    charset: Option<&str>,
) -> Option<String> {
    let mut plain: Option<String> = None;

    for param in split_params(header_value) {
        let Some((name, v)) = param.split_once('=') else {
            continue;
        };
        let name = name.trim().to_ascii_lowercase();
        let v = v.trim();

        if name == "filename*" {
            if let Some(decoded) = decode_extended_value(unquote(v).as_str()) {
                if !decoded.is_empty() {
                    return Some(decoded);
                }
            }
        } else if name == "filename" {
            let unquoted = unquote(v);
            if !unquoted.is_empty() {
                plain = Some(decode_with_charset(&unquoted, charset));
            }
        }
    }

    plain
}

/// Split header parameters on `;`, ignoring separators inside quoted strings.
fn split_params(value: &str) -> Vec<&str> {
    let mut params = Vec::new();
    let mut in_quotes = false;
    let mut escaped = false;
    let mut start = 0;
    for (i, c) in value.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => {
                params.push(value[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    params.push(value[start..].trim());
    params
}

fn unquote(v: &str) -> String {
    if v.len() >= 2 && v.starts_with('"') && v.ends_with('"') {
        decode_quoted_filename(&v[1..v.len() - 1])
    } else {
        v.to_string()
    }
}

/// Decode `charset'lang'value`. Returns `None` for charsets we cannot decode.
fn decode_extended_value(v: &str) -> Option<String> {
    let mut parts = v.splitn(3, '\'');
    let charset = parts.next()?.trim().to_ascii_lowercase();
    let _lang = parts.next()?;
    let encoded = parts.next()?;
    let bytes = percent_decode(encoded);
    match charset.as_str() {
        "utf-8" | "utf8" => String::from_utf8(bytes).ok(),
        "iso-8859-1" | "latin1" | "latin-1" => Some(latin1_to_string(&bytes)),
        _ => None,
    }
}

/// Re-decode a byte-preserving header value with the response charset.
fn decode_with_charset(value: &str, charset: Option<&str>) -> String {
    // Characters above U+00FF only appear when the caller already decoded the value.
    if value.chars().any(|c| u32::from(c) > 0xFF) {
        return value.to_string();
    }
    let bytes: Vec<u8> = value.chars().map(|c| c as u8).collect();
    match charset.map(|c| c.trim().to_ascii_lowercase()) {
        Some(c) if c == "iso-8859-1" || c == "latin1" || c == "us-ascii" => {
            latin1_to_string(&bytes)
        }
        _ => String::from_utf8(bytes.clone()).unwrap_or_else(|_| latin1_to_string(&bytes)),
    }
}

fn latin1_to_string(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Decode backslash-escaped quotes in a quoted filename value.
pub(super) fn decode_quoted_filename(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(&next) = chars.peek() {
                if next == '"' || next == '\\' {
                    out.push(next);
                    chars.next();
                    continue;
                }
            }
        }
        out.push(c);
    }
    out
}

/// Percent-decode into raw bytes. Malformed escapes are kept literally.
pub(super) fn percent_decode(input: &str) -> Vec<u8> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(h), Some(l)) = (hex_digit(bytes[i + 1]), hex_digit(bytes[i + 2])) {
                out.push(h << 4 | l);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    out
}

fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_quoted() {
        let r = parse_content_disposition_filename("attachment; filename=\"report.pdf\"", None);
        assert_eq!(r.as_deref(), Some("report.pdf"));
    }

    #[test]
    fn parse_token() {
        let r = parse_content_disposition_filename("attachment; filename=report.pdf", None);
        assert_eq!(r.as_deref(), Some("report.pdf"));
    }

    #[test]
    fn quoted_value_may_contain_separator() {
        let r = parse_content_disposition_filename(
            "attachment; filename=\"a;b \\\"c\\\".txt\"; size=10",
            None,
        );
        assert_eq!(r.as_deref(), Some("a;b \"c\".txt"));
    }

    #[test]
    fn parse_filename_star_utf8() {
        let r = parse_content_disposition_filename(
            "attachment; filename*=UTF-8''caf%C3%A9.txt",
            None,
        );
        assert_eq!(r.as_deref(), Some("café.txt"));
    }

    #[test]
    fn parse_filename_star_latin1_with_language() {
        let r = parse_content_disposition_filename(
            "attachment; filename*=iso-8859-1'fr'caf%E9.txt",
            None,
        );
        assert_eq!(r.as_deref(), Some("café.txt"));
    }

    #[test]
    fn parse_filename_star_precedence() {
        let r = parse_content_disposition_filename(
            "attachment; filename=\"fallback.bin\"; filename*=UTF-8''real%20name.dat",
            None,
        );
        assert_eq!(r.as_deref(), Some("real name.dat"));
    }

    #[test]
    fn unknown_extended_charset_falls_back_to_plain() {
        let r = parse_content_disposition_filename(
            "attachment; filename*=koi8-r''%C1.txt; filename=\"plain.txt\"",
            None,
        );
        assert_eq!(r.as_deref(), Some("plain.txt"));
    }

    #[test]
    fn plain_form_uses_response_charset() {
        // Raw UTF-8 bytes of "é" delivered byte-preserving.
        let raw = "attachment; filename=\"caf\u{00C3}\u{00A9}.txt\"";
        assert_eq!(
            parse_content_disposition_filename(raw, Some("utf-8")).as_deref(),
            Some("café.txt")
        );
        assert_eq!(
            parse_content_disposition_filename(raw, None).as_deref(),
            Some("café.txt")
        );
        assert_eq!(
            parse_content_disposition_filename(raw, Some("ISO-8859-1")).as_deref(),
            Some("caf\u{00C3}\u{00A9}.txt")
        );
    }

    #[test]
    fn missing_filename_is_none() {
        assert_eq!(parse_content_disposition_filename("inline", None), None);
        assert_eq!(
            parse_content_disposition_filename("attachment; filename=\"\"", None),
            None
        );
    }

    #[test]
    fn percent_decode_keeps_malformed_escapes() {
        assert_eq!(percent_decode("a%20b"), b"a b".to_vec());
        assert_eq!(percent_decode("100%"), b"100%".to_vec());
        assert_eq!(percent_decode("%zz"), b"%zz".to_vec());
        assert_eq!(percent_decode("%4"), b"%4".to_vec());
    }
}
