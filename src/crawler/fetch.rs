//! Minimal HTTP/1.1 page fetch
//!
//! One connection per page: send a `GET` with `Connection: Close`, read the
//! response head up to [`MAX_HEADER_SIZE`] bytes, require `200 OK` and a
//! `Content-Length`, then read exactly that many body bytes. No redirects,
//! chunked encoding or TLS.

use super::links::Target;
use crate::error::{FetchError, FetchResult, MalformedReason};
use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

/// Response heads larger than this are rejected
pub const MAX_HEADER_SIZE: usize = 4096;

const READ_CHUNK: usize = 1024;

/// Parsed status line and headers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u16,
    pub content_length: usize,
}

/// A fetched page
#[derive(Debug)]
pub struct Page {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Build the request bytes for `path`
pub fn build_request(path: &str, host: &str) -> String {
    format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nAccept-Language: en-us\r\nConnection: Close\r\n\r\n",
        path, host
    )
}

/// Locate the blank line ending the head
///
/// Returns `(head_len, body_start)`. Accepts `\r\n\r\n` or `\n\n`, whichever
/// comes first.
pub fn find_head_end(buf: &[u8]) -> Option<(usize, usize)> {
    let crlf = buf
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|i| (i, i + 4));
    let lf = buf.windows(2).position(|w| w == b"\n\n").map(|i| (i, i + 2));
    match (crlf, lf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

/// Parse a response head; `path` is only used in errors
pub fn parse_head(head: &[u8], path: &str) -> FetchResult<ResponseHead> {
    let malformed = |reason| FetchError::Malformed {
        path: path.to_string(),
        reason,
    };

    let text = String::from_utf8_lossy(head);
    let mut lines = text.lines().map(|l| l.trim_end_matches('\r'));

    let status_line = lines.next().ok_or(malformed(MalformedReason::StatusLine))?;
    let mut parts = status_line.split_whitespace();
    let version = parts.next().unwrap_or("");
    if !version.starts_with("HTTP/") {
        return Err(malformed(MalformedReason::StatusLine));
    }
    let status: u16 = parts
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or(malformed(MalformedReason::StatusLine))?;
    if status != 200 {
        return Err(malformed(MalformedReason::Status(status)));
    }

    let content_length = lines
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .ok_or(malformed(MalformedReason::ContentLength))?;

    Ok(ResponseHead {
        status,
        content_length,
    })
}

/// Fetch `path` from the target server
pub fn fetch(target: &Target, path: &str, timeout: Duration) -> FetchResult<Page> {
    let socket_err = |e| FetchError::Socket {
        path: path.to_string(),
        source: e,
    };

    let mut stream = connect(target, timeout)?;
    stream.set_read_timeout(Some(timeout)).map_err(socket_err)?;
    stream.set_write_timeout(Some(timeout)).map_err(socket_err)?;
    stream
        .write_all(build_request(path, &target.host).as_bytes())
        .map_err(socket_err)?;

    let mut buf: Vec<u8> = Vec::with_capacity(MAX_HEADER_SIZE);
    let mut chunk = [0u8; READ_CHUNK];
    let (head_len, body_start) = loop {
        if let Some(end) = find_head_end(&buf) {
            break end;
        }
        if buf.len() >= MAX_HEADER_SIZE {
            return Err(FetchError::Malformed {
                path: path.to_string(),
                reason: MalformedReason::HeaderTooLarge,
            });
        }
        let n = stream.read(&mut chunk).map_err(socket_err)?;
        if n == 0 {
            return Err(FetchError::Malformed {
                path: path.to_string(),
                reason: MalformedReason::StatusLine,
            });
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = parse_head(&buf[..head_len], path)?;

    let mut body = buf.split_off(body_start);
    if body.len() < head.content_length {
        let missing = head.content_length - body.len();
        let got = (&mut stream)
            .take(missing as u64)
            .read_to_end(&mut body)
            .map_err(socket_err)?;
        if got < missing {
            return Err(FetchError::Malformed {
                path: path.to_string(),
                reason: MalformedReason::TruncatedBody,
            });
        }
    }
    body.truncate(head.content_length);

    Ok(Page {
        status: head.status,
        body,
    })
}

fn connect(target: &Target, timeout: Duration) -> FetchResult<TcpStream> {
    let mut last_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses");
    for addr in &target.addrs {
        match TcpStream::connect_timeout(addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_err = e,
        }
    }
    Err(FetchError::Connect {
        server: target.display(),
        source: last_err,
    })
}
