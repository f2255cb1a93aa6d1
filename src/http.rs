//! HTTP request/response field extraction over raw byte buffers.
//!
//! Every function here works directly on byte slices rather than `str`:
//! traffic is untrusted and not guaranteed to be valid UTF-8. Field lengths
//! are bounded the same way the reference implementation bounds them, and
//! metadata fields are looked up with the exact (quirky) offsets it uses,
//! since the spec was silent on these details and the original is ground
//! truth here.

use memchr::memmem;

pub const MAX_URL_LEN: usize = 512;
pub const MAX_HOST_LEN: usize = 256;
pub const MAX_REFERER_LEN: usize = 512;

const HDR_SEARCH_LIMIT: usize = 3 * 1024;
const MIN_PE_PAYLOAD_SIZE: usize = 14;
const HTTP_200_OFFSET: usize = 8;

/// Returns `true` if `payload` begins with a recognized HTTP request method
/// followed by a space, i.e. this looks like the first line of a request.
pub fn is_http_request(payload: &[u8]) -> bool {
    const METHODS: [&[u8]; 3] = [b"GET ", b"POST ", b"HEAD "];
    METHODS.iter().any(|m| payload.starts_with(m))
}

/// Extracts the request-line URL: bytes up to the first CR or LF, capped at
/// [`MAX_URL_LEN`].
pub fn extract_url(payload: &[u8]) -> Vec<u8> {
    let limit = payload.len().min(MAX_URL_LEN);
    let end = payload[..limit]
        .iter()
        .position(|&b| b == b'\r' || b == b'\n')
        .unwrap_or(limit);
    payload[..end].to_vec()
}

/// Extracts the `Host:` header's raw tail, bounded at [`MAX_HOST_LEN`].
///
/// Matches the reference implementation's `get_host`: the search anchors
/// on `"\r\nHost:"`, but only the leading `"\r\n"` is skipped before
/// copying, so the returned bytes include the literal `"Host:"` prefix.
/// Kept exactly as the original behaves since downstream tooling that
/// consumes dump-file preambles already expects this shape.
pub fn extract_host(payload: &[u8]) -> Vec<u8> {
    extract_header_tail(payload, b"\r\nHost:", MAX_HOST_LEN)
}

/// Extracts the `Referer:` header's raw tail, bounded at [`MAX_REFERER_LEN`].
/// Same `"Host:"`-prefix quirk as [`extract_host`] applies here too.
pub fn extract_referer(payload: &[u8]) -> Vec<u8> {
    extract_header_tail(payload, b"\r\nReferer:", MAX_REFERER_LEN)
}

fn extract_header_tail(payload: &[u8], needle: &[u8], max_len: usize) -> Vec<u8> {
    let Some(pos) = memmem::find(payload, needle) else {
        return Vec::new();
    };
    let start = pos + 2; // skip "\r\n", deliberately not the rest of needle
    let limit = (payload.len() - start).min(max_len);
    let tail = &payload[start..start + limit];
    let end = tail
        .iter()
        .position(|&b| b == b'\r' || b == b'\n')
        .unwrap_or(limit);
    tail[..end].to_vec()
}

/// Returns the offset just past the first `"\r\n\r\n"` in `payload`, search
/// bounded to the first 3 KiB, or `None` if not found (response headers not
/// yet complete).
pub fn resp_header_length(payload: &[u8]) -> Option<usize> {
    let limit = payload.len().min(HDR_SEARCH_LIMIT);
    memmem::find(&payload[..limit], b"\r\n\r\n").map(|pos| pos + 4)
}

/// Parses the `Content-Length` header's value, search bounded to the first
/// 3 KiB. Returns `None` if the header is absent or unparseable.
pub fn content_length(payload: &[u8]) -> Option<u32> {
    let limit = payload.len().min(HDR_SEARCH_LIMIT);
    let pos = memmem::find(&payload[..limit], b"\r\nContent-Length:")?;
    let start = pos + 2;
    let tail = &payload[start..limit];
    let end = tail
        .iter()
        .position(|&b| b == b'\r' || b == b'\n')
        .unwrap_or(tail.len());
    let line = &tail[..end];
    let colon = line.iter().position(|&b| b == b':')?;
    let digits = std::str::from_utf8(&line[colon + 1..]).ok()?.trim();
    digits.parse::<u32>().ok()
}

/// Outcome of checking whether a reassembled response carries a PE body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeCheck {
    /// Header is not yet complete, or we can't yet tell.
    WaitForBody,
    /// Header is complete and does not introduce a PE (wrong status, or
    /// body doesn't start with the `MZ` signature).
    NotFound,
    /// Header is complete, status 200, and the body starts with `MZ`.
    Found,
}

/// Checks `payload` (the full reassembled server-side buffer so far) for a
/// status-200 HTTP response whose body begins with the PE "MZ" signature.
///
/// Mirrors `contains_pe_file`: requires a literal `"HTTP/"` prefix, the
/// bytes `" 200 "` at a fixed offset (immediately after the `HTTP/x.x`
/// version token), a complete response header, and `MZ` right after it.
pub fn contains_pe_file(payload: &[u8], payload_size: usize) -> PeCheck {
    if payload_size < MIN_PE_PAYLOAD_SIZE {
        return PeCheck::WaitForBody;
    }
    let buf = &payload[..payload_size];

    if !buf.starts_with(b"HTTP/") {
        return PeCheck::NotFound;
    }
    if buf.len() < HTTP_200_OFFSET + 5 || &buf[HTTP_200_OFFSET..HTTP_200_OFFSET + 5] != b" 200 " {
        return PeCheck::NotFound;
    }

    let Some(hdr_end) = memmem::find(buf, b"\r\n\r\n").map(|pos| pos + 4) else {
        return PeCheck::WaitForBody;
    };

    if buf.len() < hdr_end + 2 {
        return PeCheck::WaitForBody;
    }
    if &buf[hdr_end..hdr_end + 2] == b"MZ" {
        PeCheck::Found
    } else {
        PeCheck::NotFound
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_get_post_head() {
        assert!(is_http_request(b"GET /x HTTP/1.1\r\n"));
        assert!(is_http_request(b"POST /x HTTP/1.1\r\n"));
        assert!(is_http_request(b"HEAD /x HTTP/1.1\r\n"));
        assert!(!is_http_request(b"PUT /x HTTP/1.1\r\n"));
        assert!(!is_http_request(b"random bytes"));
    }

    #[test]
    fn url_capped_at_crlf() {
        let url = extract_url(b"GET /foo/bar HTTP/1.1\r\nHost: x\r\n\r\n");
        assert_eq!(url, b"GET /foo/bar HTTP/1.1");
    }

    #[test]
    fn host_extraction_includes_header_name_quirk() {
        let req = b"GET / HTTP/1.1\r\nHost: example.com\r\nReferer: http://x/\r\n\r\n";
        assert_eq!(extract_host(req), b"Host: example.com");
        assert_eq!(extract_referer(req), b"Referer: http://x/");
    }

    #[test]
    fn missing_headers_yield_empty() {
        let req = b"GET / HTTP/1.1\r\n\r\n";
        assert!(extract_host(req).is_empty());
        assert!(extract_referer(req).is_empty());
    }

    #[test]
    fn content_length_parses_value() {
        let resp = b"HTTP/1.1 200 OK\r\nContent-Length: 1234\r\n\r\n";
        assert_eq!(content_length(resp), Some(1234));
    }

    #[test]
    fn resp_header_length_finds_terminator() {
        let resp = b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nMZ";
        let hdr_len = resp_header_length(resp).unwrap();
        assert_eq!(&resp[hdr_len..], b"MZ");
    }

    #[test]
    fn contains_pe_file_requires_200_status() {
        let resp = b"HTTP/1.1 201 Created\r\nContent-Length: 2\r\n\r\nMZ";
        assert_eq!(contains_pe_file(resp, resp.len()), PeCheck::NotFound);
    }

    #[test]
    fn contains_pe_file_detects_mz_signature() {
        let resp = b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nMZ";
        assert_eq!(contains_pe_file(resp, resp.len()), PeCheck::Found);
    }

    #[test]
    fn contains_pe_file_rejects_non_mz_body() {
        let resp = b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nPK";
        assert_eq!(contains_pe_file(resp, resp.len()), PeCheck::NotFound);
    }

    #[test]
    fn contains_pe_file_waits_for_incomplete_header() {
        let resp = b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n";
        assert_eq!(contains_pe_file(resp, resp.len()), PeCheck::WaitForBody);
    }
}
