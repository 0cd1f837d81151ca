//! RESP framing: the response value model and an incremental command parser.
//!
//! Commands arrive as arrays of bulk strings (`*<n>\r\n` followed by `n`
//! `$<len>\r\n<bytes>\r\n` fields). The parser keeps a byte buffer plus a
//! resumable cursor so input may be fed in arbitrarily small chunks.

use bytes::{Buf, Bytes, BytesMut};
use thiserror::Error;

/// Errors produced while decoding RESP frames.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RespError {
    #[error("Protocol error: expected '*', got '{0}'")]
    ExpectedArray(char),
    #[error("Protocol error: expected '$', got '{0}'")]
    ExpectedBulkString(char),
    #[error("Protocol error: invalid multibulk length")]
    InvalidArrayLength,
    #[error("Protocol error: invalid bulk length")]
    InvalidBulkLength,
    #[error("Protocol error: line is not terminated by CRLF")]
    MissingCrlf,
}

/// A value that can be returned to a client.
#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    Null,
    Integer(i64),
    SimpleString(String),
    BulkString(Bytes),
    Error(String),
    Array(Vec<RespValue>),
}

impl RespValue {
    pub fn ok() -> Self {
        RespValue::SimpleString("OK".to_string())
    }

    pub fn bulk(value: impl Into<Bytes>) -> Self {
        RespValue::BulkString(value.into())
    }

    /// Builds an array of bulk strings.
    pub fn bulk_array<I, B>(items: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        RespValue::Array(items.into_iter().map(|item| RespValue::bulk(item)).collect())
    }

    /// Wraps an optional byte string, mapping `None` to nil.
    pub fn optional_bulk(value: Option<Bytes>) -> Self {
        match value {
            Some(value) => RespValue::BulkString(value),
            None => RespValue::Null,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, RespValue::Error(_))
    }

    /// Encodes the value in RESP wire format.
    ///
    /// # Examples
    ///
    /// ```
    /// use fakeredis::resp::RespValue;
    ///
    /// assert_eq!(RespValue::ok().encode(), b"+OK\r\n".to_vec());
    /// assert_eq!(RespValue::Null.encode(), b"$-1\r\n".to_vec());
    /// ```
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_into(&mut out);
        out
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            RespValue::Null => out.extend_from_slice(b"$-1\r\n"),
            RespValue::Integer(value) => out.extend_from_slice(format!(":{}\r\n", value).as_bytes()),
            RespValue::SimpleString(value) => {
                out.extend_from_slice(format!("+{}\r\n", value).as_bytes())
            }
            RespValue::Error(message) => {
                out.extend_from_slice(format!("-{}\r\n", message).as_bytes())
            }
            RespValue::BulkString(value) => {
                out.extend_from_slice(format!("${}\r\n", value.len()).as_bytes());
                out.extend_from_slice(value);
                out.extend_from_slice(b"\r\n");
            }
            RespValue::Array(items) => {
                out.extend_from_slice(format!("*{}\r\n", items.len()).as_bytes());
                for item in items {
                    item.encode_into(out);
                }
            }
        }
    }
}

/// Encodes a command as an array of bulk strings, the way a client sends it.
pub fn encode_command<I, A>(args: I) -> Vec<u8>
where
    I: IntoIterator<Item = A>,
    A: AsRef<[u8]>,
{
    let args: Vec<A> = args.into_iter().collect();
    let mut out = format!("*{}\r\n", args.len()).into_bytes();
    for arg in &args {
        let arg = arg.as_ref();
        out.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
        out.extend_from_slice(arg);
        out.extend_from_slice(b"\r\n");
    }
    out
}

#[derive(Debug)]
enum ParseState {
    Header,
    Fields {
        expected: usize,
        fields: Vec<Bytes>,
        bulk_len: Option<usize>,
    },
}

/// Incremental parser turning fed bytes into command field lists.
#[derive(Debug)]
pub struct RespParser {
    buffer: BytesMut,
    state: ParseState,
}

impl Default for RespParser {
    fn default() -> Self {
        Self::new()
    }
}

impl RespParser {
    pub fn new() -> Self {
        RespParser {
            buffer: BytesMut::new(),
            state: ParseState::Header,
        }
    }

    /// Appends raw bytes to the parse buffer.
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Number of buffered bytes not yet consumed by a complete command.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Drops any partial command, e.g. after a protocol error.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.state = ParseState::Header;
    }

    /// Returns the next complete command, or `None` when more input is needed.
    ///
    /// A header announcing zero (or a negative number of) fields yields an
    /// empty command, which callers are expected to ignore.
    pub fn next_command(&mut self) -> Result<Option<Vec<Bytes>>, RespError> {
        loop {
            match &mut self.state {
                ParseState::Header => {
                    let Some(line) = take_line(&mut self.buffer)? else {
                        return Ok(None);
                    };
                    if line.first() != Some(&b'*') {
                        return Err(RespError::ExpectedArray(first_char(&line)));
                    }
                    let length =
                        parse_length(&line[1..]).ok_or(RespError::InvalidArrayLength)?;
                    if length <= 0 {
                        return Ok(Some(Vec::new()));
                    }
                    let expected = length as usize;
                    self.state = ParseState::Fields {
                        expected,
                        fields: Vec::with_capacity(expected.min(1024)),
                        bulk_len: None,
                    };
                }
                ParseState::Fields {
                    expected,
                    fields,
                    bulk_len,
                } => {
                    let length = match bulk_len {
                        Some(length) => *length,
                        None => {
                            let Some(line) = take_line(&mut self.buffer)? else {
                                return Ok(None);
                            };
                            if line.first() != Some(&b'$') {
                                return Err(RespError::ExpectedBulkString(first_char(&line)));
                            }
                            let length = parse_length(&line[1..])
                                .filter(|length| *length >= 0)
                                .ok_or(RespError::InvalidBulkLength)?
                                as usize;
                            *bulk_len = Some(length);
                            length
                        }
                    };

                    if self.buffer.len() < length + 2 {
                        return Ok(None);
                    }
                    let field = self.buffer.split_to(length).freeze();
                    if &self.buffer[..2] != b"\r\n" {
                        return Err(RespError::MissingCrlf);
                    }
                    self.buffer.advance(2);
                    fields.push(field);
                    *bulk_len = None;

                    if fields.len() == *expected {
                        let fields = std::mem::take(fields);
                        self.state = ParseState::Header;
                        return Ok(Some(fields));
                    }
                }
            }
        }
    }
}

/// Splits off one `\n`-terminated line, without its `\r\n` terminator.
fn take_line(buffer: &mut BytesMut) -> Result<Option<BytesMut>, RespError> {
    let Some(position) = buffer.iter().position(|byte| *byte == b'\n') else {
        return Ok(None);
    };
    let mut line = buffer.split_to(position + 1);
    if !line.ends_with(b"\r\n") {
        return Err(RespError::MissingCrlf);
    }
    line.truncate(line.len() - 2);
    Ok(Some(line))
}

fn parse_length(digits: &[u8]) -> Option<i64> {
    std::str::from_utf8(digits).ok()?.parse::<i64>().ok()
}

fn first_char(line: &[u8]) -> char {
    line.first().map(|byte| *byte as char).unwrap_or(' ')
}
