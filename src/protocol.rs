//! Wire formats between the crawler, the coordinator and index workers
//!
//! Coordinator and workers exchange records over named pipes. Every record
//! starts with a fixed 8-byte [`Header`] (`type`, `payload_size`, both `u32`
//! in native byte order) followed by exactly `payload_size` bytes.
//!
//! The crawler hands the directory list to the coordinator on its stdin
//! using a length-prefixed encoding ([`write_startup`] / [`read_startup`])
//! and waits for the [`READY_TOKEN`] on its stdout.

use crate::error::{ProtocolError, ProtocolResult};
use std::io::{self, Read, Write};

/// Size of an encoded header
pub const HEADER_SIZE: usize = 8;

/// Upper bound on a single payload
pub const MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Token the coordinator writes once all workers have parsed their shards
pub const READY_TOKEN: &[u8] = b"READY";

/// Line terminating every command response
pub const END_SENTINEL: &str = "<END>";

/// Record types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum MessageType {
    NotUsed = 0,
    Error = 1,
    EndOfMessages = 2,
    Exit = 3,
    Search = 4,
    MaxCount = 5,
    MinCount = 6,
    WordCount = 7,
    Init = 8,
}

impl TryFrom<u32> for MessageType {
    type Error = ProtocolError;

    fn try_from(value: u32) -> Result<Self, ProtocolError> {
        Ok(match value {
            0 => MessageType::NotUsed,
            1 => MessageType::Error,
            2 => MessageType::EndOfMessages,
            3 => MessageType::Exit,
            4 => MessageType::Search,
            5 => MessageType::MaxCount,
            6 => MessageType::MinCount,
            7 => MessageType::WordCount,
            8 => MessageType::Init,
            other => return Err(ProtocolError::UnknownType(other)),
        })
    }
}

/// Fixed-size record header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub kind: MessageType,
    pub payload_size: u32,
}

impl Header {
    pub fn new(kind: MessageType, payload_size: u32) -> Self {
        Self { kind, payload_size }
    }

    /// Header with no payload
    pub fn bare(kind: MessageType) -> Self {
        Self::new(kind, 0)
    }

    pub fn to_bytes(self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[..4].copy_from_slice(&(self.kind as u32).to_ne_bytes());
        out[4..].copy_from_slice(&self.payload_size.to_ne_bytes());
        out
    }

    pub fn from_bytes(bytes: [u8; HEADER_SIZE]) -> ProtocolResult<Self> {
        let kind = u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let payload_size = u32::from_ne_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        Ok(Self {
            kind: MessageType::try_from(kind)?,
            payload_size,
        })
    }
}

/// Read exactly `buf.len()` bytes, or nothing at all
///
/// Returns `Ok(false)` on a clean end of stream before the first byte and
/// [`ProtocolError::ShortRead`] if the stream ends part way through.
fn read_full_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> ProtocolResult<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => {
                return Err(ProtocolError::ShortRead {
                    expected: buf.len(),
                    got: filled,
                })
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(true)
}

fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> ProtocolResult<()> {
    if read_full_or_eof(reader, buf)? {
        Ok(())
    } else {
        Err(ProtocolError::ShortRead {
            expected: buf.len(),
            got: 0,
        })
    }
}

/// Read the next header; `None` means the peer closed the stream
pub fn read_header<R: Read>(reader: &mut R) -> ProtocolResult<Option<Header>> {
    let mut buf = [0u8; HEADER_SIZE];
    if !read_full_or_eof(reader, &mut buf)? {
        return Ok(None);
    }
    Header::from_bytes(buf).map(Some)
}

/// Read the next header as `(type, payload_size)` without checking the type
pub fn read_raw_header<R: Read>(reader: &mut R) -> ProtocolResult<Option<(u32, u32)>> {
    let mut buf = [0u8; HEADER_SIZE];
    if !read_full_or_eof(reader, &mut buf)? {
        return Ok(None);
    }
    Ok(Some((
        u32::from_ne_bytes([buf[0], buf[1], buf[2], buf[3]]),
        u32::from_ne_bytes([buf[4], buf[5], buf[6], buf[7]]),
    )))
}

/// Read a payload announced by a header
pub fn read_payload<R: Read>(reader: &mut R, size: u32) -> ProtocolResult<Vec<u8>> {
    let size = size as usize;
    if size > MAX_PAYLOAD {
        return Err(ProtocolError::Oversized {
            size,
            limit: MAX_PAYLOAD,
        });
    }
    let mut payload = vec![0u8; size];
    read_full(reader, &mut payload)?;
    Ok(payload)
}

/// Read a payload and decode it as text
pub fn read_string<R: Read>(reader: &mut R, size: u32) -> ProtocolResult<String> {
    let payload = read_payload(reader, size)?;
    Ok(String::from_utf8_lossy(&payload).into_owned())
}

pub fn read_u32<R: Read>(reader: &mut R) -> ProtocolResult<u32> {
    let mut buf = [0u8; 4];
    read_full(reader, &mut buf)?;
    Ok(u32::from_ne_bytes(buf))
}

pub fn read_u64<R: Read>(reader: &mut R) -> ProtocolResult<u64> {
    let mut buf = [0u8; 8];
    read_full(reader, &mut buf)?;
    Ok(u64::from_ne_bytes(buf))
}

fn read_i32<R: Read>(reader: &mut R) -> ProtocolResult<i32> {
    let mut buf = [0u8; 4];
    read_full(reader, &mut buf)?;
    Ok(i32::from_ne_bytes(buf))
}

/// Encode a header plus payload into one buffer
pub fn encode_message(kind: MessageType, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
    out.extend_from_slice(&Header::new(kind, payload.len() as u32).to_bytes());
    out.extend_from_slice(payload);
    out
}

/// Write a header plus payload with a single write call
pub fn write_message<W: Write>(writer: &mut W, kind: MessageType, payload: &[u8]) -> io::Result<()> {
    writer.write_all(&encode_message(kind, payload))
}

/// Encode a SEARCH request
///
/// `payload_size` of the outer header carries the word count; each word
/// follows as its own `NOT_USED` record. The request is returned as one
/// buffer so it reaches the pipe without interleaving.
pub fn encode_search(words: &[String]) -> Vec<u8> {
    let mut out = Header::new(MessageType::Search, words.len() as u32)
        .to_bytes()
        .to_vec();
    for word in words {
        out.extend_from_slice(&encode_message(MessageType::NotUsed, word.as_bytes()));
    }
    out
}

/// Decode the word records that follow a SEARCH header
pub fn read_search_words<R: Read>(reader: &mut R, count: u32) -> ProtocolResult<Vec<String>> {
    let mut words = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let header = read_header(reader)?.ok_or(ProtocolError::ShortRead {
            expected: HEADER_SIZE,
            got: 0,
        })?;
        words.push(read_string(reader, header.payload_size)?);
    }
    Ok(words)
}

/// Directory hand-off from the crawler to the coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupInfo {
    pub terminal_width: usize,
    pub directories: Vec<String>,
}

/// Encode terminal width, directory count and each length-prefixed path
pub fn write_startup<W: Write>(writer: &mut W, terminal_width: usize, directories: &[String]) -> io::Result<()> {
    let mut out = Vec::new();
    out.extend_from_slice(&(terminal_width as i32).to_ne_bytes());
    out.extend_from_slice(&(directories.len() as i32).to_ne_bytes());
    for dir in directories {
        out.extend_from_slice(&(dir.len() as i32).to_ne_bytes());
        out.extend_from_slice(dir.as_bytes());
    }
    writer.write_all(&out)?;
    writer.flush()
}

pub fn read_startup<R: Read>(reader: &mut R) -> ProtocolResult<StartupInfo> {
    let width = read_i32(reader)?;
    let count = read_i32(reader)?;
    if count < 0 {
        return Err(ProtocolError::InvalidLength(count));
    }

    let mut directories = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let len = read_i32(reader)?;
        if len < 0 {
            return Err(ProtocolError::InvalidLength(len));
        }
        directories.push(read_string(reader, len as u32)?);
    }

    Ok(StartupInfo {
        terminal_width: width.max(0) as usize,
        directories,
    })
}

/// Wait for the readiness token
pub fn expect_ready<R: Read>(reader: &mut R) -> ProtocolResult<()> {
    let mut buf = [0u8; READY_TOKEN.len()];
    match read_full(reader, &mut buf) {
        Ok(()) if buf == READY_TOKEN => Ok(()),
        Ok(()) => Err(ProtocolError::NotReady(
            String::from_utf8_lossy(&buf).into_owned(),
        )),
        Err(e) => Err(e),
    }
}
