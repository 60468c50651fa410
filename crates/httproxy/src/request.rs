//! Request head parsing and re-serialization.
//!
//! Adapted from a `ParsedRequest_parse` / `ParsedRequest_unparse`
//! design, but fields borrow out of the caller's buffer instead of
//! being `strdup`-ed (see [`crate::header`]).

use std::fmt;

use crate::header::HeaderTable;

/// Minimum buffer length accepted by [`parse`] (mirrors `MIN_REQ_LEN`).
const MIN_HEAD_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    BufferTooShort,
    MissingRequestLineTerminator,
    MalformedRequestLine,
    InvalidEncoding,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            ParseError::BufferTooShort => "request buffer shorter than the minimum head size",
            ParseError::MissingRequestLineTerminator => "no CRLF terminating the request line",
            ParseError::MalformedRequestLine => "request line is not `method uri version`",
            ParseError::InvalidEncoding => "request head is not valid UTF-8",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for ParseError {}

/// A parsed request head: method, target (split into host/port/path),
/// version, and headers, all borrowing from the same backing buffer.
#[derive(Debug)]
pub struct ParsedRequest<'a> {
    pub method: &'a str,
    pub host: &'a str,
    pub port: Option<&'a str>,
    pub path: &'a str,
    pub version: &'a str,
    pub headers: HeaderTable<'a>,
}

/// Parses one request head (request line + headers, terminated by a
/// bare `\r\n`) out of `buf`. `buf` may contain trailing bytes past the
/// head (e.g. a request body); they are simply not consumed, and are
/// never required to be valid UTF-8 (or text at all) since only the
/// head region up to and including the terminating blank line is ever
/// decoded.
pub fn parse(buf: &[u8]) -> Result<ParsedRequest<'_>, ParseError> {
    if buf.len() < MIN_HEAD_LEN {
        return Err(ParseError::BufferTooShort);
    }

    // Bound decoding to the head: up through `\r\n\r\n` if present,
    // otherwise the whole buffer (an incomplete head, with no known
    // body boundary). Trailing bytes past this point are opaque
    // octets and must never be asked to decode as text.
    let head_end = find_subslice(buf, b"\r\n\r\n")
        .map(|pos| pos + 4)
        .unwrap_or(buf.len());
    let text = std::str::from_utf8(&buf[..head_end]).map_err(|_| ParseError::InvalidEncoding)?;

    let line_end = text
        .find("\r\n")
        .ok_or(ParseError::MissingRequestLineTerminator)?;
    let request_line = &text[..line_end];
    let rest = &text[line_end + 2..];

    let mut tokens = request_line.split_whitespace();
    let method = tokens.next().ok_or(ParseError::MalformedRequestLine)?;
    let uri = tokens.next().ok_or(ParseError::MalformedRequestLine)?;
    let version = tokens.next().ok_or(ParseError::MalformedRequestLine)?;
    if tokens.next().is_some() {
        return Err(ParseError::MalformedRequestLine);
    }

    let (host, port, path) = split_request_uri(uri);

    let mut headers = HeaderTable::new();
    parse_headers(rest, &mut headers);

    Ok(ParsedRequest {
        method,
        host,
        port,
        path,
        version,
        headers,
    })
}

/// Finds the first occurrence of `needle` in `haystack`, searching raw
/// bytes so the region before a known boundary can be picked out
/// before anything is decoded as text.
fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Splits an absolute- or origin-form request-URI into `(host, port,
/// path)`. A leading `http://`/`https://` (case-sensitive) is stripped
/// first; the remainder splits on the first `/` into authority and
/// path, and the authority splits on the first `:` into host and port.
fn split_request_uri(uri: &str) -> (&str, Option<&str>, &str) {
    let remainder = uri
        .strip_prefix("http://")
        .or_else(|| uri.strip_prefix("https://"))
        .unwrap_or(uri);

    let (authority, path) = match remainder.find('/') {
        Some(slash) => (&remainder[..slash], &remainder[slash..]),
        None => (remainder, "/"),
    };

    let (host, port) = match authority.find(':') {
        Some(colon) => {
            let port = &authority[colon + 1..];
            (&authority[..colon], (!port.is_empty()).then_some(port))
        }
        None => (authority, None),
    };

    (host, port, path)
}

/// Consumes header lines from `rest` (the text following the request
/// line's CRLF) until a bare CRLF or end of buffer, inserting each into
/// `headers` via `set` (so duplicates collapse, last-wins).
fn parse_headers<'a>(mut rest: &'a str, headers: &mut HeaderTable<'a>) {
    while let Some(pos) = rest.find("\r\n") {
        let line = &rest[..pos];
        rest = &rest[pos + 2..];
        if line.is_empty() {
            break;
        }
        if let Some(colon) = line.find(':') {
            let name = &line[..colon];
            let value = line[colon + 1..].trim_start_matches(' ');
            headers.set(name, value);
        }
        // A line without ':' is silently discarded.
    }
}

impl<'a> ParsedRequest<'a> {
    /// `port`, or `default` if the request-URI carried no port.
    pub fn port_or(&self, default: u16) -> u16 {
        self.port.and_then(|p| p.parse().ok()).unwrap_or(default)
    }

    /// Exact byte length of the origin-form head [`write_head`] would
    /// produce; never under-reports.
    pub fn total_length(&self) -> usize {
        self.method.len() + 1 + self.path.len() + 1 + self.version.len() + 2
            + self.headers.serialized_length()
    }

    /// Writes `METHOD SP PATH SP VERSION CRLF` followed by the
    /// (hop-by-hop-filtered) serialized header table, into `out`.
    pub fn write_head(&self, out: &mut String) {
        out.push_str(self.method);
        out.push(' ');
        out.push_str(self.path);
        out.push(' ');
        out.push_str(self.version);
        out.push_str("\r\n");
        self.headers.serialize(out);
    }

    /// Convenience wrapper around [`write_head`] that allocates exactly
    /// `total_length()` bytes up front.
    pub fn to_head(&self) -> String {
        let mut out = String::with_capacity(self.total_length());
        self.write_head(&mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_defaults_to_root() {
        let req = parse(b"GET http://ex.com HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(req.path, "/");
        assert_eq!(req.host, "ex.com");
        assert_eq!(req.port, None);
    }

    #[test]
    fn splits_host_and_port() {
        let req = parse(b"GET http://ex.com:8080/a HTTP/1.0\r\nX: y\r\n\r\n").unwrap();
        assert_eq!(req.host, "ex.com");
        assert_eq!(req.port, Some("8080"));
        assert_eq!(req.path, "/a");
        assert_eq!(req.port_or(80), 8080);
    }

    #[test]
    fn empty_port_is_absent() {
        let req = parse(b"GET http://ex.com:/a HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(req.port, None);
        assert_eq!(req.port_or(80), 80);
    }

    #[test]
    fn scenario_get_absolute_form() {
        let req = parse(
            b"GET http://example.com/index.html HTTP/1.1\r\n\
Host: example.com\r\n\
Proxy-Connection: keep-alive\r\n\r\n",
        )
        .unwrap();
        assert_eq!(
            req.to_head(),
            "GET /index.html HTTP/1.1\r\nHost: example.com\r\n\r\n"
        );
    }

    #[test]
    fn scenario_duplicate_headers_collapse() {
        let req = parse(b"GET http://ex.com/a HTTP/1.1\r\nX-A: 1\r\nX-A: 2\r\n\r\n").unwrap();
        assert_eq!(req.to_head(), "GET /a HTTP/1.1\r\nX-A: 2\r\n\r\n");
    }

    #[test]
    fn non_utf8_over_read_body_does_not_fail_parse() {
        // A POST whose body co-arrived in the same read as the head:
        // the body is raw, non-UTF-8 bytes (e.g. a binary upload), but
        // only the head region is ever decoded, so parsing succeeds.
        let mut buf =
            b"POST http://ex.com/upload HTTP/1.1\r\nContent-Length: 4\r\n\r\n".to_vec();
        buf.extend_from_slice(&[0xff, 0xfe, 0x00, 0x01]);
        let req = parse(&buf).unwrap();
        assert_eq!(
            req.to_head(),
            "POST /upload HTTP/1.1\r\nContent-Length: 4\r\n\r\n"
        );
    }

    #[test]
    fn header_line_without_colon_is_discarded() {
        let req = parse(b"GET http://ex.com/a HTTP/1.1\r\nnot-a-header\r\nX: 1\r\n\r\n").unwrap();
        assert_eq!(req.to_head(), "GET /a HTTP/1.1\r\nX: 1\r\n\r\n");
    }

    #[test]
    fn malformed_request_line_rejected() {
        assert_eq!(
            parse(b"garbage with no CRLF"),
            Err(ParseError::MissingRequestLineTerminator)
        );
        assert_eq!(
            parse(b"GET /only-two HTTP/1.1 extra\r\n\r\n"),
            Err(ParseError::MalformedRequestLine)
        );
        assert_eq!(parse(b"ab"), Err(ParseError::BufferTooShort));
    }

    #[test]
    fn length_soundness() {
        let req = parse(
            b"GET http://ex.com/a HTTP/1.1\r\nX-Long: abcdefghijklmnopqrstuvwxyz\r\n\r\n",
        )
        .unwrap();
        let head = req.to_head();
        assert!(req.total_length() >= head.len());
        assert_eq!(req.total_length(), head.len());
    }

    #[test]
    fn idempotent_parse_unparse_parse() {
        let original = b"GET /a HTTP/1.1\r\nHost: ex.com\r\nX-Custom: v\r\n\r\n";
        let first = parse(original).unwrap();
        let reserialized = first.to_head();
        let second = parse(reserialized.as_bytes()).unwrap();

        assert_eq!(first.method, second.method);
        assert_eq!(first.path, second.path);
        assert_eq!(first.version, second.version);
        assert_eq!(first.host, second.host);
        assert_eq!(first.port, second.port);
        assert_eq!(first.headers.get("Host"), second.headers.get("host"));
        assert_eq!(
            first.headers.get("X-Custom"),
            second.headers.get("x-custom")
        );
    }
}
