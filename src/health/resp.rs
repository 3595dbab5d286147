/// Redis RESP (Redis Serialization Protocol) parsing and generation

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::str;

/// Largest bulk string accepted, the server-side `proto-max-bulk-len` default
pub const MAX_BULK_LEN: usize = 512 * 1024 * 1024;
/// Deepest array nesting accepted
pub const MAX_DEPTH: usize = 32;
/// Array elements reserved up front, whatever the declared length
const PREALLOC_LIMIT: usize = 1024;

/// RESP data types
#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    /// Simple String (+OK\r\n)
    SimpleString(String),
    /// Error (-ERR message\r\n)
    Error(String),
    /// Integer (:123\r\n)
    Integer(i64),
    /// Bulk String ($5\r\nhello\r\n)
    BulkString(Option<Bytes>), // None represents NULL
    /// Array (*2\r\n$5\r\nhello\r\n$5\r\nworld\r\n)
    Array(Option<Vec<RespValue>>), // None represents NULL array
}

/// RESP parser for reading Redis protocol messages
pub struct RespParser;

/// RESP encoder for writing Redis protocol messages
pub struct RespEncoder;

/// Parse error types
#[derive(Debug, thiserror::Error)]
pub enum RespParseError {
    #[error("Invalid RESP format: {0}")]
    InvalidFormat(String),
    #[error("Invalid UTF-8: {0}")]
    InvalidUtf8(#[from] str::Utf8Error),
    #[error("Invalid integer: {0}")]
    InvalidInteger(#[from] std::num::ParseIntError),
}

impl RespValue {
    /// Text content of a simple or bulk string
    pub fn as_text(&self) -> Option<String> {
        match self {
            RespValue::SimpleString(s) => Some(s.clone()),
            RespValue::BulkString(Some(b)) => Some(String::from_utf8_lossy(b).into_owned()),
            _ => None,
        }
    }

    /// Elements of a non-null array
    pub fn as_array(&self) -> Option<&[RespValue]> {
        match self {
            RespValue::Array(Some(elements)) => Some(elements),
            _ => None,
        }
    }

    /// Interpret a flat `[k1, v1, k2, v2, ...]` array as pairs
    pub fn as_pairs(&self) -> Option<Vec<(String, String)>> {
        let elements = self.as_array()?;
        let mut pairs = Vec::with_capacity(elements.len() / 2);
        for chunk in elements.chunks(2) {
            if let [k, v] = chunk {
                pairs.push((k.as_text()?, v.as_text()?));
            }
        }
        Some(pairs)
    }
}

impl RespParser {
    /// Parse one RESP value from the front of `buf`.
    ///
    /// Returns `Ok(None)` and leaves `buf` untouched when the value is not
    /// complete yet.
    pub fn parse(buf: &mut BytesMut) -> Result<Option<RespValue>, RespParseError> {
        match Self::parse_at(buf, 0, 0)? {
            Some((value, consumed)) => {
                buf.advance(consumed);
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn parse_at(
        buf: &[u8],
        pos: usize,
        depth: usize,
    ) -> Result<Option<(RespValue, usize)>, RespParseError> {
        let Some((line, next)) = Self::read_line(buf, pos) else {
            return Ok(None);
        };
        if line.is_empty() {
            return Err(RespParseError::InvalidFormat("empty line".to_string()));
        }
        let body = &line[1..];

        match line[0] {
            b'+' => Ok(Some((
                RespValue::SimpleString(str::from_utf8(body)?.to_string()),
                next,
            ))),
            b'-' => Ok(Some((RespValue::Error(str::from_utf8(body)?.to_string()), next))),
            b':' => Ok(Some((RespValue::Integer(str::from_utf8(body)?.parse()?), next))),
            b'$' => {
                let size: i64 = str::from_utf8(body)?.parse()?;
                if size == -1 {
                    return Ok(Some((RespValue::BulkString(None), next)));
                }
                if size < 0 {
                    return Err(RespParseError::InvalidFormat(
                        "Invalid bulk string size".to_string(),
                    ));
                }
                let end = usize::try_from(size)
                    .ok()
                    .filter(|&len| len <= MAX_BULK_LEN)
                    .and_then(|len| next.checked_add(len))
                    .ok_or_else(|| {
                        RespParseError::InvalidFormat(format!("Bulk string too long: {}", size))
                    })?;
                if buf.len() < end + 2 {
                    return Ok(None);
                }
                if &buf[end..end + 2] != b"\r\n" {
                    return Err(RespParseError::InvalidFormat(
                        "Missing \\r\\n after bulk string".to_string(),
                    ));
                }
                let content = Bytes::copy_from_slice(&buf[next..end]);
                Ok(Some((RespValue::BulkString(Some(content)), end + 2)))
            }
            b'*' => {
                let size: i64 = str::from_utf8(body)?.parse()?;
                if size == -1 {
                    return Ok(Some((RespValue::Array(None), next)));
                }
                if size < 0 {
                    return Err(RespParseError::InvalidFormat(
                        "Invalid array size".to_string(),
                    ));
                }
                if depth >= MAX_DEPTH {
                    return Err(RespParseError::InvalidFormat(
                        "Arrays nested too deeply".to_string(),
                    ));
                }
                let len = usize::try_from(size).map_err(|_| {
                    RespParseError::InvalidFormat(format!("Array too long: {}", size))
                })?;
                let mut elements = Vec::with_capacity(len.min(PREALLOC_LIMIT));
                let mut cursor = next;
                for _ in 0..len {
                    match Self::parse_at(buf, cursor, depth + 1)? {
                        Some((element, after)) => {
                            elements.push(element);
                            cursor = after;
                        }
                        None => return Ok(None),
                    }
                }
                Ok(Some((RespValue::Array(Some(elements)), cursor)))
            }
            other => Err(RespParseError::InvalidFormat(format!(
                "Unknown RESP type: {}",
                other as char
            ))),
        }
    }

    /// Locate a line ending with \r\n starting at `pos`
    fn read_line(buf: &[u8], pos: usize) -> Option<(&[u8], usize)> {
        let rest = buf.get(pos..)?;
        let idx = rest.windows(2).position(|w| w == b"\r\n")?;
        Some((&rest[..idx], pos + idx + 2))
    }
}

impl RespEncoder {
    /// Encode a RESP value to bytes
    pub fn encode(value: &RespValue) -> Bytes {
        let mut buf = BytesMut::new();
        Self::encode_into(&mut buf, value);
        buf.freeze()
    }

    /// Encode a RESP value into an existing buffer
    pub fn encode_into(buf: &mut BytesMut, value: &RespValue) {
        match value {
            RespValue::SimpleString(s) => {
                buf.put_u8(b'+');
                buf.extend_from_slice(s.as_bytes());
                buf.put_slice(b"\r\n");
            }
            RespValue::Error(s) => {
                buf.put_u8(b'-');
                buf.extend_from_slice(s.as_bytes());
                buf.put_slice(b"\r\n");
            }
            RespValue::Integer(n) => {
                buf.put_u8(b':');
                buf.extend_from_slice(n.to_string().as_bytes());
                buf.put_slice(b"\r\n");
            }
            RespValue::BulkString(Some(data)) => {
                buf.put_u8(b'$');
                buf.extend_from_slice(data.len().to_string().as_bytes());
                buf.put_slice(b"\r\n");
                buf.extend_from_slice(data);
                buf.put_slice(b"\r\n");
            }
            RespValue::BulkString(None) => {
                buf.extend_from_slice(b"$-1\r\n");
            }
            RespValue::Array(Some(elements)) => {
                buf.put_u8(b'*');
                buf.extend_from_slice(elements.len().to_string().as_bytes());
                buf.put_slice(b"\r\n");
                for element in elements {
                    Self::encode_into(buf, element);
                }
            }
            RespValue::Array(None) => {
                buf.extend_from_slice(b"*-1\r\n");
            }
        }
    }

    /// Create a Redis command from command name and arguments
    pub fn create_command(command: &str, args: &[&str]) -> RespValue {
        let mut elements = vec![RespValue::BulkString(Some(Bytes::from(command.to_string())))];

        for arg in args {
            elements.push(RespValue::BulkString(Some(Bytes::from(arg.to_string()))));
        }

        RespValue::Array(Some(elements))
    }
}
