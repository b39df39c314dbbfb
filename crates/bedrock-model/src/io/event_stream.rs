use bytes::{Bytes, BytesMut};

use super::{Chunks, ChunksError};

// total length (4) + headers length (4) + prelude checksum (4)
const PRELUDE_LEN: usize = 12;
const MESSAGE_CRC_LEN: usize = 4;
const MIN_FRAME_LEN: usize = PRELUDE_LEN + MESSAGE_CRC_LEN;
const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    ChunksError(ChunksError),
    ChecksumMismatch,
    InvalidFrame(&'static str),
    Truncated,
}

/// A typed header value of an event-stream frame.
#[allow(dead_code)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HeaderValue {
    Bool(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Bytes(Bytes),
    String(String),
    Timestamp(i64),
    Uuid([u8; 16]),
}

/// A decoded frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    headers: Vec<(String, HeaderValue)>,
    payload: Bytes,
}

impl Frame {
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.iter().find_map(|(n, v)| match v {
            HeaderValue::String(s) if n == name => Some(s.as_str()),
            _ => None,
        })
    }

    #[inline]
    pub fn message_type(&self) -> Option<&str> {
        self.header_str(":message-type")
    }

    #[inline]
    pub fn event_type(&self) -> Option<&str> {
        self.header_str(":event-type")
    }

    /// Name of the exception, for both modeled exceptions and raw errors.
    #[inline]
    pub fn exception_type(&self) -> Option<&str> {
        self.header_str(":exception-type")
            .or_else(|| self.header_str(":error-code"))
    }

    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

/// A type for reading `application/vnd.amazon.eventstream` frames from a
/// chunk stream.
pub struct EventStream {
    buf: BytesMut,
    chunks: Chunks,
}

impl EventStream {
    #[inline]
    pub fn new(chunks: Chunks) -> Self {
        Self {
            buf: BytesMut::new(),
            chunks,
        }
    }

    pub async fn next_frame(&mut self) -> Result<Option<Frame>, Error> {
        loop {
            // A previous chunk may carry more than one frame.
            if let Some(frame) = self.try_parse_frame()? {
                return Ok(Some(frame));
            }

            match self.chunks.next_chunk().await.map_err(Error::ChunksError)? {
                Some(bytes) => self.buf.extend_from_slice(&bytes),
                None if self.buf.is_empty() => return Ok(None),
                None => return Err(Error::Truncated),
            }
        }
    }

    fn try_parse_frame(&mut self) -> Result<Option<Frame>, Error> {
        if self.buf.len() < PRELUDE_LEN {
            return Ok(None);
        }

        let total_len = read_u32(&self.buf, 0) as usize;
        let headers_len = read_u32(&self.buf, 4) as usize;
        let prelude_crc = read_u32(&self.buf, 8);
        if crc32fast::hash(&self.buf[0..8]) != prelude_crc {
            return Err(Error::ChecksumMismatch);
        }
        if !(MIN_FRAME_LEN..=MAX_FRAME_LEN).contains(&total_len)
            || headers_len > total_len - MIN_FRAME_LEN
        {
            return Err(Error::InvalidFrame("bad frame length"));
        }
        if self.buf.len() < total_len {
            return Ok(None);
        }

        let frame = self.buf.split_to(total_len).freeze();
        let crc_offset = total_len - MESSAGE_CRC_LEN;
        if crc32fast::hash(&frame[..crc_offset]) != read_u32(&frame, crc_offset)
        {
            return Err(Error::ChecksumMismatch);
        }

        let headers_end = PRELUDE_LEN + headers_len;
        let headers = parse_headers(&frame[PRELUDE_LEN..headers_end])?;
        let payload = frame.slice(headers_end..crc_offset);
        Ok(Some(Frame { headers, payload }))
    }
}

#[inline]
fn read_u32(buf: &[u8], offset: usize) -> u32 {
    let mut word = [0; 4];
    word.copy_from_slice(&buf[offset..offset + 4]);
    u32::from_be_bytes(word)
}

fn take<'a>(cursor: &mut &'a [u8], len: usize) -> Result<&'a [u8], Error> {
    if cursor.len() < len {
        return Err(Error::InvalidFrame("header overruns its section"));
    }
    let (head, rest) = cursor.split_at(len);
    *cursor = rest;
    Ok(head)
}

fn take_array<const N: usize>(cursor: &mut &[u8]) -> Result<[u8; N], Error> {
    let mut out = [0; N];
    out.copy_from_slice(take(cursor, N)?);
    Ok(out)
}

fn parse_headers(mut cursor: &[u8]) -> Result<Vec<(String, HeaderValue)>, Error> {
    let mut headers = vec![];
    while !cursor.is_empty() {
        let [name_len] = take_array::<1>(&mut cursor)?;
        let name = str::from_utf8(take(&mut cursor, name_len as usize)?)
            .map_err(|_| Error::InvalidFrame("header name is not utf-8"))?
            .to_owned();
        let [value_type] = take_array::<1>(&mut cursor)?;
        let value = match value_type {
            0 => HeaderValue::Bool(true),
            1 => HeaderValue::Bool(false),
            2 => HeaderValue::Byte(i8::from_be_bytes(take_array(&mut cursor)?)),
            3 => HeaderValue::Short(i16::from_be_bytes(take_array(&mut cursor)?)),
            4 => HeaderValue::Int(i32::from_be_bytes(take_array(&mut cursor)?)),
            5 => HeaderValue::Long(i64::from_be_bytes(take_array(&mut cursor)?)),
            6 | 7 => {
                let len = u16::from_be_bytes(take_array(&mut cursor)?) as usize;
                let raw = take(&mut cursor, len)?;
                if value_type == 6 {
                    HeaderValue::Bytes(Bytes::copy_from_slice(raw))
                } else {
                    let s = str::from_utf8(raw).map_err(|_| {
                        Error::InvalidFrame("header value is not utf-8")
                    })?;
                    HeaderValue::String(s.to_owned())
                }
            }
            8 => HeaderValue::Timestamp(i64::from_be_bytes(take_array(
                &mut cursor,
            )?)),
            9 => HeaderValue::Uuid(take_array(&mut cursor)?),
            _ => return Err(Error::InvalidFrame("unknown header type")),
        };
        headers.push((name, value));
    }
    Ok(headers)
}

/// Encodes a frame with string headers.
#[cfg(test)]
pub fn encode_frame(headers: &[(&str, &str)], payload: &[u8]) -> Bytes {
    let mut header_bytes = vec![];
    for (name, value) in headers {
        header_bytes.push(name.len() as u8);
        header_bytes.extend_from_slice(name.as_bytes());
        header_bytes.push(7);
        header_bytes.extend_from_slice(&(value.len() as u16).to_be_bytes());
        header_bytes.extend_from_slice(value.as_bytes());
    }

    let total_len = MIN_FRAME_LEN + header_bytes.len() + payload.len();
    let mut frame = Vec::with_capacity(total_len);
    frame.extend_from_slice(&(total_len as u32).to_be_bytes());
    frame.extend_from_slice(&(header_bytes.len() as u32).to_be_bytes());
    let prelude_crc = crc32fast::hash(&frame);
    frame.extend_from_slice(&prelude_crc.to_be_bytes());
    frame.extend_from_slice(&header_bytes);
    frame.extend_from_slice(payload);
    let message_crc = crc32fast::hash(&frame);
    frame.extend_from_slice(&message_crc.to_be_bytes());
    Bytes::from(frame)
}
