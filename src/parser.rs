//! RESP decoding, shared in spirit between the sync and async connection types.
//!
//! [`Frame`] is the internal decode representation: it keeps a null bulk string
//! and a null array distinct, which [`Value`] does not need to (both collapse to
//! [`Value::Nil`] once a reply reaches command wrappers).

use std::io::{self, BufRead, Read};

use crate::types::{make_server_error, ErrorKind, RedisError, RedisResult, Value};

/// A single decoded RESP frame, before the null-bulk/null-array distinction is
/// thrown away by [`Frame::into_value`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Status(String),
    Error(String),
    Int(i64),
    BulkNil,
    BulkData(Vec<u8>),
    ArrayNil,
    Array(Vec<Frame>),
}

impl Frame {
    /// Converts this frame into the public [`Value`], discarding the
    /// null-bulk/null-array distinction and converting `Error` frames are handled
    /// by the caller instead (see [`read_value`]) since an error frame is not a
    /// value a command wrapper should ever see as data.
    pub fn into_value(self) -> Value {
        match self {
            Frame::Status(s) if s == "OK" => Value::Okay,
            Frame::Status(s) => Value::Status(s),
            Frame::Error(_) => unreachable!("error frames are converted before into_value"),
            Frame::Int(n) => Value::Int(n),
            Frame::BulkNil | Frame::ArrayNil => Value::Nil,
            Frame::BulkData(b) => Value::Data(b),
            Frame::Array(items) => Value::Bulk(items.into_iter().map(Frame::into_value).collect()),
        }
    }
}

fn unrecognized_frame(context: &'static str, byte: u8) -> RedisError {
    RedisError::from((
        ErrorKind::TypeError,
        "Unrecognized RESP type byte",
        format!("{context}: got {byte:#04x} ({byte})"),
    ))
}

fn eof_error() -> RedisError {
    RedisError::from(io::Error::new(
        io::ErrorKind::UnexpectedEof,
        "Connection closed mid-reply",
    ))
}

/// Reads bytes up to and including `\r\n`, returning everything before it.
/// Fails on EOF before a terminator is found.
fn read_line<R: BufRead + ?Sized>(reader: &mut R) -> RedisResult<Vec<u8>> {
    let mut buf = Vec::new();
    let n = reader.read_until(b'\n', &mut buf)?;
    if n == 0 {
        return Err(eof_error());
    }
    if buf.last() != Some(&b'\n') {
        return Err(eof_error());
    }
    buf.pop(); // \n
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
    Ok(buf)
}

fn read_line_string<R: BufRead + ?Sized>(reader: &mut R) -> RedisResult<String> {
    let line = read_line(reader)?;
    Ok(String::from_utf8_lossy(&line).into_owned())
}

fn read_decimal<R: BufRead + ?Sized>(reader: &mut R) -> RedisResult<i64> {
    let line = read_line_string(reader)?;
    line.trim()
        .parse::<i64>()
        .map_err(|_| RedisError::from((ErrorKind::TypeError, "Expected a decimal length/integer")))
}

/// Reads exactly `len` payload bytes followed by the mandatory trailing `\r\n`.
fn read_bulk_body<R: BufRead + ?Sized>(reader: &mut R, len: usize) -> RedisResult<Vec<u8>> {
    let mut data = vec![0u8; len];
    reader.read_exact(&mut data).map_err(|_| eof_error())?;
    let mut crlf = [0u8; 2];
    reader.read_exact(&mut crlf).map_err(|_| eof_error())?;
    if &crlf != b"\r\n" {
        return Err(RedisError::from((
            ErrorKind::TypeError,
            "Bulk string was not terminated by CRLF",
        )));
    }
    Ok(data)
}

fn read_one_byte<R: Read + ?Sized>(reader: &mut R) -> RedisResult<u8> {
    let mut tag = [0u8; 1];
    reader.read_exact(&mut tag).map_err(|_| eof_error())?;
    Ok(tag[0])
}

/// Parses exactly one RESP frame from a blocking, buffered reader.
pub fn read_frame<R: BufRead + ?Sized>(reader: &mut R) -> RedisResult<Frame> {
    let tag = read_one_byte(reader)?;
    match tag {
        b'+' => Ok(Frame::Status(read_line_string(reader)?)),
        b'-' => Ok(Frame::Error(read_line_string(reader)?)),
        b':' => Ok(Frame::Int(read_decimal(reader)?)),
        b'$' => {
            let len = read_decimal(reader)?;
            if len < 0 {
                Ok(Frame::BulkNil)
            } else {
                Ok(Frame::BulkData(read_bulk_body(reader, len as usize)?))
            }
        }
        b'*' => {
            let len = read_decimal(reader)?;
            if len < 0 {
                Ok(Frame::ArrayNil)
            } else {
                let mut items = Vec::with_capacity(len as usize);
                for _ in 0..len {
                    items.push(read_frame(reader)?);
                }
                Ok(Frame::Array(items))
            }
        }
        other => Err(unrecognized_frame("reply type byte", other)),
    }
}

/// Parses one frame and converts it to a [`Value`], turning a `-ERR ...` frame
/// into a `RedisError` instead of a value — a command wrapper should never see an
/// error frame as data, it should see it as the `Err` arm of a `RedisResult`.
pub fn read_value<R: BufRead + ?Sized>(reader: &mut R) -> RedisResult<Value> {
    match read_frame(reader)? {
        Frame::Error(msg) => Err(make_server_error(msg)),
        other => Ok(other.into_value()),
    }
}

fn find_crlf(buf: &[u8], from: usize) -> Option<usize> {
    if from >= buf.len() {
        return None;
    }
    buf[from..]
        .windows(2)
        .position(|w| w == b"\r\n")
        .map(|i| from + i)
}

fn parse_decimal_slice(bytes: &[u8]) -> RedisResult<i64> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.trim().parse::<i64>().ok())
        .ok_or_else(|| RedisError::from((ErrorKind::TypeError, "Expected a decimal length/integer")))
}

/// Attempts to parse one frame starting at `buf[start..]`.
///
/// Returns `Ok(None)` when `buf` does not yet contain a complete frame (the
/// caller should wait for more bytes and retry from the same `start`); returns
/// `Ok(Some((frame, consumed)))` on success, where `consumed` is the number of
/// bytes from `start` that made up the frame. Never partially consumes `buf` on
/// the `Ok(None)` path, so incremental decoders can safely leave `buf` untouched
/// across a call that returns it.
fn parse_frame_at(buf: &[u8], start: usize) -> RedisResult<Option<(Frame, usize)>> {
    if start >= buf.len() {
        return Ok(None);
    }
    let tag = buf[start];
    let line_start = start + 1;
    match tag {
        b'+' | b'-' | b':' => match find_crlf(buf, line_start) {
            None => Ok(None),
            Some(cr) => {
                let line = &buf[line_start..cr];
                let consumed = cr + 2 - start;
                let frame = match tag {
                    b'+' => Frame::Status(String::from_utf8_lossy(line).into_owned()),
                    b'-' => Frame::Error(String::from_utf8_lossy(line).into_owned()),
                    b':' => Frame::Int(parse_decimal_slice(line)?),
                    _ => unreachable!(),
                };
                Ok(Some((frame, consumed)))
            }
        },
        b'$' => match find_crlf(buf, line_start) {
            None => Ok(None),
            Some(cr) => {
                let len = parse_decimal_slice(&buf[line_start..cr])?;
                let header_len = cr + 2 - start;
                if len < 0 {
                    return Ok(Some((Frame::BulkNil, header_len)));
                }
                let data_start = start + header_len;
                let data_end = data_start + len as usize;
                let total_end = data_end + 2;
                if buf.len() < total_end {
                    return Ok(None);
                }
                if &buf[data_end..total_end] != b"\r\n" {
                    return Err(RedisError::from((
                        ErrorKind::TypeError,
                        "Bulk string was not terminated by CRLF",
                    )));
                }
                Ok(Some((
                    Frame::BulkData(buf[data_start..data_end].to_vec()),
                    total_end - start,
                )))
            }
        },
        b'*' => match find_crlf(buf, line_start) {
            None => Ok(None),
            Some(cr) => {
                let len = parse_decimal_slice(&buf[line_start..cr])?;
                let header_len = cr + 2 - start;
                if len < 0 {
                    return Ok(Some((Frame::ArrayNil, header_len)));
                }
                let mut items = Vec::with_capacity(len as usize);
                let mut cursor = start + header_len;
                for _ in 0..len {
                    match parse_frame_at(buf, cursor)? {
                        None => return Ok(None),
                        Some((frame, used)) => {
                            items.push(frame);
                            cursor += used;
                        }
                    }
                }
                Ok(Some((Frame::Array(items), cursor - start)))
            }
        },
        other => Err(unrecognized_frame("reply type byte", other)),
    }
}

/// Incremental entry point used by the async codec: parses at most one frame
/// from the front of `buf`.
pub fn try_parse_frame(buf: &[u8]) -> RedisResult<Option<(Frame, usize)>> {
    parse_frame_at(buf, 0)
}

/// A `tokio_util` codec wrapping [`try_parse_frame`] for the cooperative
/// connection. A server error frame decodes straight to `Err`, matching
/// [`read_value`]'s treatment of errors as the `Err` arm rather than data.
#[cfg(feature = "aio")]
#[derive(Default)]
pub struct ValueCodec;

#[cfg(feature = "aio")]
impl tokio_util::codec::Decoder for ValueCodec {
    type Item = Value;
    type Error = RedisError;

    fn decode(&mut self, buf: &mut bytes::BytesMut) -> Result<Option<Value>, RedisError> {
        use bytes::Buf;
        match try_parse_frame(buf)? {
            None => Ok(None),
            Some((frame, consumed)) => {
                buf.advance(consumed);
                match frame {
                    Frame::Error(msg) => Err(make_server_error(msg)),
                    other => Ok(Some(other.into_value())),
                }
            }
        }
    }
}

#[cfg(feature = "aio")]
impl tokio_util::codec::Encoder<Vec<u8>> for ValueCodec {
    type Error = RedisError;

    fn encode(&mut self, item: Vec<u8>, dst: &mut bytes::BytesMut) -> Result<(), RedisError> {
        dst.extend_from_slice(&item);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn parse(bytes: &[u8]) -> RedisResult<Value> {
        let mut cur = Cursor::new(bytes);
        read_value(&mut cur)
    }

    #[test]
    fn decodes_status() {
        assert_eq!(parse(b"+OK\r\n").unwrap(), Value::Okay);
        assert_eq!(
            parse(b"+PONG\r\n").unwrap(),
            Value::Status("PONG".to_string())
        );
    }

    #[test]
    fn decodes_error_as_err() {
        let err = parse(b"-ERR wrong number of arguments\r\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResponseError);
    }

    #[test]
    fn decodes_integer() {
        assert_eq!(parse(b":1000\r\n").unwrap(), Value::Int(1000));
        assert_eq!(parse(b":-1\r\n").unwrap(), Value::Int(-1));
    }

    #[test]
    fn decodes_bulk_string_present_and_absent() {
        assert_eq!(
            parse(b"$5\r\nhello\r\n").unwrap(),
            Value::Data(b"hello".to_vec())
        );
        assert_eq!(parse(b"$0\r\n\r\n").unwrap(), Value::Data(Vec::new()));
        assert_eq!(parse(b"$-1\r\n").unwrap(), Value::Nil);
    }

    #[test]
    fn null_bulk_and_empty_bulk_are_distinct_frames() {
        let mut empty = Cursor::new(&b"$0\r\n\r\n"[..]);
        assert_eq!(read_frame(&mut empty).unwrap(), Frame::BulkData(Vec::new()));
        let mut null = Cursor::new(&b"$-1\r\n"[..]);
        assert_eq!(read_frame(&mut null).unwrap(), Frame::BulkNil);
    }

    #[test]
    fn decodes_array_present_and_absent() {
        assert_eq!(
            parse(b"*2\r\n$3\r\nfoo\r\n$3\r\nbar\r\n").unwrap(),
            Value::Bulk(vec![Value::Data(b"foo".to_vec()), Value::Data(b"bar".to_vec())])
        );
        assert_eq!(parse(b"*-1\r\n").unwrap(), Value::Nil);
        assert_eq!(parse(b"*0\r\n").unwrap(), Value::Bulk(Vec::new()));
    }

    #[test]
    fn decodes_nested_arrays() {
        let bytes = b"*2\r\n*1\r\n:1\r\n$-1\r\n";
        assert_eq!(
            parse(bytes).unwrap(),
            Value::Bulk(vec![Value::Bulk(vec![Value::Int(1)]), Value::Nil])
        );
    }

    #[test]
    fn binary_safe_bulk_payload_round_trips() {
        let payload = vec![0u8, 1, 2, b'\r', b'\n', 255];
        let mut framed = format!("${}\r\n", payload.len()).into_bytes();
        framed.extend_from_slice(&payload);
        framed.extend_from_slice(b"\r\n");
        assert_eq!(parse(&framed).unwrap(), Value::Data(payload));
    }

    #[test]
    fn unrecognized_tag_is_a_codec_error() {
        let err = parse(b"!nope\r\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeError);
    }

    #[test]
    fn eof_mid_reply_is_an_error() {
        assert!(parse(b"$5\r\nhel").is_err());
        assert!(parse(b"*2\r\n:1\r\n").is_err());
    }

    #[test]
    fn incremental_parse_reports_need_more_without_consuming() {
        assert_eq!(try_parse_frame(b"$5\r\nhel").unwrap(), None);
        assert_eq!(try_parse_frame(b"*2\r\n:1\r\n").unwrap(), None);
        assert_eq!(try_parse_frame(b"").unwrap(), None);
        assert_eq!(try_parse_frame(b"+O").unwrap(), None);
    }

    #[test]
    fn incremental_parse_succeeds_once_complete_and_reports_consumed_length() {
        let (frame, used) = try_parse_frame(b"+OK\r\nmore-bytes-after").unwrap().unwrap();
        assert_eq!(frame, Frame::Status("OK".to_string()));
        assert_eq!(used, 5);

        let (frame, used) = try_parse_frame(b"*2\r\n:1\r\n:2\r\ntrailing").unwrap().unwrap();
        assert_eq!(frame, Frame::Array(vec![Frame::Int(1), Frame::Int(2)]));
        assert_eq!(used, b"*2\r\n:1\r\n:2\r\n".len());
    }

    #[test]
    fn incremental_parse_rejects_bad_tag_immediately_even_if_incomplete() {
        assert!(try_parse_frame(b"!nope").is_err());
    }
}

#[cfg(all(test, feature = "aio"))]
mod codec_tests {
    use super::*;
    use bytes::BytesMut;
    use tokio_util::codec::Decoder;

    #[test]
    fn decodes_one_frame_at_a_time_leaving_remainder_buffered() {
        let mut codec = ValueCodec;
        let mut buf = BytesMut::from(&b"+OK\r\n$3\r\nfoo"[..]);
        let first = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(first, Value::Okay);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(b"\r\n");
        let second = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(second, Value::Data(b"foo".to_vec()));
        assert!(buf.is_empty());
    }

    #[test]
    fn decodes_error_frame_as_err() {
        let mut codec = ValueCodec;
        let mut buf = BytesMut::from(&b"-ERR nope\r\n"[..]);
        let err = codec.decode(&mut buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResponseError);
    }
}
