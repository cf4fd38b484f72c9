//! ## pwrlvl-api::request
//! Reads one HTTP/1.1 request from a byte stream.
//!
//! Bytes are accumulated until the blank line ending the header block, with a hard cap on
//! the accumulated size. The body is read to `Content-Length`; chunked transfer is not
//! supported. A peer that hangs up mid-body gets dispatched with what arrived.

use std::collections::HashMap;
use std::io::{ErrorKind, Read};

use bytes::{Bytes, BytesMut};
use serde_json::{Map, Value};

use crate::error::ProtocolError;

const HEADER_END: &[u8] = b"\r\n\r\n";
const READ_CHUNK: usize = 4096;

/// Size caps applied while reading.
#[derive(Clone, Copy, Debug)]
pub struct Limits {
    pub max_header_bytes: usize,
    pub max_body_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_header_bytes: 65536,
            max_body_bytes: 1_048_576,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Request {
    /// Upper-cased method.
    pub method: String,
    /// Path with the query string removed.
    pub path: String,
    /// Header names are lower-cased.
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl Request {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// The body as a JSON object. Anything that is not an object reads as empty.
    pub fn json_body(&self) -> Map<String, Value> {
        match serde_json::from_slice::<Value>(&self.body) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

/// Reads and parses one request.
pub fn read_request<R: Read>(reader: &mut R, limits: Limits) -> Result<Request, ProtocolError> {
    let mut buffer = BytesMut::with_capacity(READ_CHUNK);
    let mut chunk = [0u8; READ_CHUNK];

    let header_len = loop {
        if let Some(pos) = find_header_end(&buffer) {
            break pos;
        }
        if buffer.len() > limits.max_header_bytes {
            return Err(ProtocolError::HeadersTooLarge(limits.max_header_bytes));
        }
        let n = read_some(reader, &mut chunk)?;
        if n == 0 {
            return Err(ProtocolError::Closed);
        }
        buffer.extend_from_slice(&chunk[..n]);
    };
    if header_len > limits.max_header_bytes {
        return Err(ProtocolError::HeadersTooLarge(limits.max_header_bytes));
    }

    let head = buffer.split_to(header_len + HEADER_END.len());
    let (method, path, headers) = parse_head(&head[..header_len])?;

    let length = match headers.get("content-length") {
        None => 0,
        Some(value) => value
            .parse::<usize>()
            .map_err(|_| ProtocolError::Malformed(format!("bad Content-Length: {value}")))?,
    };
    if length > limits.max_body_bytes {
        return Err(ProtocolError::BodyTooLarge {
            length,
            limit: limits.max_body_bytes,
        });
    }

    while buffer.len() < length {
        let n = read_some(reader, &mut chunk)?;
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);
    }
    buffer.truncate(length);

    Ok(Request {
        method,
        path,
        headers,
        body: buffer.freeze(),
    })
}

fn read_some<R: Read>(reader: &mut R, chunk: &mut [u8]) -> Result<usize, ProtocolError> {
    loop {
        match reader.read(chunk) {
            Ok(n) => return Ok(n),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

fn find_header_end(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(HEADER_END.len())
        .position(|window| window == HEADER_END)
}

type Head = (String, String, HashMap<String, String>);

fn parse_head(head: &[u8]) -> Result<Head, ProtocolError> {
    let text = String::from_utf8_lossy(head);
    let mut lines = text.split("\r\n");

    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let (Some(method), Some(target)) = (parts.next(), parts.next()) else {
        return Err(ProtocolError::Malformed(format!(
            "bad request line: {request_line:?}"
        )));
    };
    let path = target.split('?').next().unwrap_or_default().to_string();

    let headers = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.trim().to_string()))
        .collect();

    Ok((method.to_ascii_uppercase(), path, headers))
}
