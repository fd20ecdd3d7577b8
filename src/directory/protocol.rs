//! RouterOS API wire format.
//!
//! A sentence is a sequence of words terminated by a zero-length word. Each
//! word is prefixed with its length in a 1 to 5 byte variable encoding.

use crate::error::DirectoryError;
use std::collections::HashMap;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest word accepted from the device.
pub const MAX_WORD_LEN: usize = 16 * 1024 * 1024;

/// Append the length prefix for a word of `len` bytes.
pub fn encode_length(len: usize, buf: &mut Vec<u8>) {
    let len = len as u32;
    if len < 0x80 {
        buf.push(len as u8);
    } else if len < 0x4000 {
        buf.extend_from_slice(&((len | 0x8000) as u16).to_be_bytes());
    } else if len < 0x20_0000 {
        buf.extend_from_slice(&(len | 0xC0_0000).to_be_bytes()[1..]);
    } else if len < 0x1000_0000 {
        buf.extend_from_slice(&(len | 0xE000_0000).to_be_bytes());
    } else {
        buf.push(0xF0);
        buf.extend_from_slice(&len.to_be_bytes());
    }
}

/// Encode a full sentence, including the terminating empty word.
pub fn encode_sentence<S: AsRef<str>>(words: &[S]) -> Vec<u8> {
    let mut buf = Vec::new();
    for word in words {
        let bytes = word.as_ref().as_bytes();
        encode_length(bytes.len(), &mut buf);
        buf.extend_from_slice(bytes);
    }
    buf.push(0);
    buf
}

async fn read_length<R: AsyncRead + Unpin>(reader: &mut R) -> Result<usize, DirectoryError> {
    let first = reader.read_u8().await?;

    let (extra, initial) = if first & 0x80 == 0x00 {
        (0, u32::from(first))
    } else if first & 0xC0 == 0x80 {
        (1, u32::from(first & 0x3F))
    } else if first & 0xE0 == 0xC0 {
        (2, u32::from(first & 0x1F))
    } else if first & 0xF0 == 0xE0 {
        (3, u32::from(first & 0x0F))
    } else if first == 0xF0 {
        (4, 0)
    } else {
        return Err(DirectoryError::Protocol(format!(
            "unsupported length prefix 0x{:02x}",
            first
        )));
    };

    let mut len = initial;
    for _ in 0..extra {
        len = (len << 8) | u32::from(reader.read_u8().await?);
    }
    Ok(len as usize)
}

/// Read one word; an empty word marks the end of a sentence.
pub async fn read_word<R: AsyncRead + Unpin>(reader: &mut R) -> Result<String, DirectoryError> {
    let len = read_length(reader).await?;
    if len > MAX_WORD_LEN {
        return Err(DirectoryError::Protocol(format!(
            "word of {} bytes exceeds limit",
            len
        )));
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Read words up to the terminating empty word.
pub async fn read_sentence<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<Vec<String>, DirectoryError> {
    let mut words = Vec::new();
    loop {
        let word = read_word(reader).await?;
        if word.is_empty() {
            return Ok(words);
        }
        words.push(word);
    }
}

pub async fn write_sentence<W: AsyncWrite + Unpin, S: AsRef<str>>(
    writer: &mut W,
    words: &[S],
) -> Result<(), DirectoryError> {
    writer.write_all(&encode_sentence(words)).await?;
    writer.flush().await?;
    Ok(())
}

/// A command and its `=key=value` arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    path: String,
    words: Vec<String>,
}

impl Command {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            words: Vec::new(),
        }
    }

    pub fn attr(mut self, key: &str, value: &str) -> Self {
        self.words.push(format!("={}={}", key, value));
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn words(&self) -> Vec<&str> {
        std::iter::once(self.path.as_str())
            .chain(self.words.iter().map(String::as_str))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    /// `!re`: one data row
    Data,
    /// `!done`: command finished
    Done,
    /// `!empty`: a query matched no rows (RouterOS 7.18 and later)
    Empty,
    /// `!trap`: command failed
    Trap,
    /// `!fatal`: the device is closing the connection
    Fatal,
}

/// One reply sentence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub kind: ReplyKind,
    pub attributes: HashMap<String, String>,
    /// Bare words, e.g. the reason following `!fatal`
    pub messages: Vec<String>,
}

impl Reply {
    pub fn parse(words: Vec<String>) -> Result<Self, DirectoryError> {
        let mut words = words.into_iter();
        let kind = match words.next().as_deref() {
            Some("!re") => ReplyKind::Data,
            Some("!done") => ReplyKind::Done,
            Some("!empty") => ReplyKind::Empty,
            Some("!trap") => ReplyKind::Trap,
            Some("!fatal") => ReplyKind::Fatal,
            Some(other) => {
                return Err(DirectoryError::Protocol(format!(
                    "unexpected reply word '{}'",
                    other
                )))
            }
            None => return Err(DirectoryError::Protocol("empty reply".to_string())),
        };

        let mut attributes = HashMap::new();
        let mut messages = Vec::new();
        for word in words {
            if let Some(pair) = word.strip_prefix('=') {
                let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                attributes.insert(key.to_string(), value.to_string());
            } else if word.starts_with(".tag=") {
                continue;
            } else {
                messages.push(word);
            }
        }

        Ok(Self {
            kind,
            attributes,
            messages,
        })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Human-readable reason carried by a `!trap` or `!fatal` reply.
    pub fn message(&self) -> String {
        self.get("message")
            .map(str::to_string)
            .or_else(|| self.messages.first().cloned())
            .unwrap_or_else(|| "no reason given".to_string())
    }
}
