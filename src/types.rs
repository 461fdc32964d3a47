//! Core value and error types shared by the sync and async connection implementations.

use std::error;
use std::fmt;
use std::io;
use std::num::{ParseFloatError, ParseIntError};
use std::str::{from_utf8, Utf8Error};

/// A single RESP reply, already stripped of its null-bulk/null-array distinction.
///
/// The decoder keeps that distinction internally (see [`crate::parser::Frame`]) but
/// by the time a reply reaches command wrappers both null forms have collapsed onto
/// [`Value::Nil`], matching what a caller actually needs to branch on.
#[derive(PartialEq, Eq, Clone)]
pub enum Value {
    /// A simple `+OK` status. Kept as its own variant because it is by far the
    /// most common status reply and wrappers match on it directly.
    Okay,
    /// Any other simple string reply.
    Status(String),
    /// An integer reply.
    Int(i64),
    /// A present bulk string, as raw bytes (bulk payloads are binary-safe).
    Data(Vec<u8>),
    /// An array of replies.
    Bulk(Vec<Value>),
    /// A null bulk string or null array.
    Nil,
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Value::Nil => write!(f, "nil"),
            Value::Int(n) => write!(f, "int({n})"),
            Value::Data(ref d) => match from_utf8(d) {
                Ok(s) => write!(f, "string-data('{s}')"),
                Err(_) => write!(f, "binary-data({d:?})"),
            },
            Value::Bulk(ref v) => write!(f, "bulk({v:?})"),
            Value::Okay => write!(f, "ok"),
            Value::Status(ref s) => write!(f, "status({s})"),
        }
    }
}

/// The broad category an error falls into; used both to select the `From` impl
/// that produced it and to let callers branch without string-matching a message.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum ErrorKind {
    /// An error reported by the server, not otherwise classified below.
    ResponseError,
    /// Credentials were rejected (parsed from a `NOAUTH`/`WRONGPASS` reply, or a
    /// failed `AUTH` during connection negotiation).
    AuthenticationFailed,
    /// A reply did not have the shape a command wrapper expected.
    TypeError,
    /// `EXECABORT`: the server aborted a queued transaction.
    ExecAbortError,
    /// `NOSCRIPT`: the sha1 passed to EVALSHA is not loaded on the server.
    NoScriptError,
    /// A connection could not be established, or failed after being established.
    IoError,
    /// The connection configuration passed by the caller was invalid.
    InvalidClientConfig,
    /// A local protocol/state violation was caught before sending anything, e.g.
    /// issuing a disallowed command from subscriber mode.
    ClientError,
}

/// Boxed detail payload carried by [`RedisError`].
#[derive(Debug)]
enum ErrorRepr {
    Simple(ErrorKind, &'static str),
    WithDescription(ErrorKind, &'static str, String),
    Io(io::Error),
}

/// The single error type returned from everywhere in this crate.
pub struct RedisError {
    repr: ErrorRepr,
}

impl RedisError {
    /// The broad category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::Simple(kind, _) => kind,
            ErrorRepr::WithDescription(kind, _, _) => kind,
            ErrorRepr::Io(_) => ErrorKind::IoError,
        }
    }

    /// A human-readable detail string, if one was attached beyond the category.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::WithDescription(_, _, ref detail) => Some(detail.as_str()),
            _ => None,
        }
    }

    /// True for errors that leave the connection unusable for further requests.
    pub fn is_connection_dropped(&self) -> bool {
        matches!(self.kind(), ErrorKind::IoError)
    }
}

impl PartialEq for RedisError {
    fn eq(&self, other: &Self) -> bool {
        self.kind() == other.kind() && self.detail() == other.detail()
    }
}

impl fmt::Debug for RedisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for RedisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.repr {
            ErrorRepr::Simple(_, desc) => write!(f, "{desc}"),
            ErrorRepr::WithDescription(_, desc, ref detail) => write!(f, "{desc}: {detail}"),
            ErrorRepr::Io(ref err) => fmt::Display::fmt(err, f),
        }
    }
}

impl error::Error for RedisError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self.repr {
            ErrorRepr::Io(ref err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for RedisError {
    fn from(err: io::Error) -> RedisError {
        RedisError {
            repr: ErrorRepr::Io(err),
        }
    }
}

impl From<Utf8Error> for RedisError {
    fn from(_: Utf8Error) -> RedisError {
        RedisError {
            repr: ErrorRepr::Simple(ErrorKind::TypeError, "Invalid UTF-8 in bulk reply"),
        }
    }
}

impl From<ParseIntError> for RedisError {
    fn from(_: ParseIntError) -> RedisError {
        RedisError {
            repr: ErrorRepr::Simple(ErrorKind::TypeError, "Could not parse integer reply"),
        }
    }
}

impl From<ParseFloatError> for RedisError {
    fn from(_: ParseFloatError) -> RedisError {
        RedisError {
            repr: ErrorRepr::Simple(ErrorKind::TypeError, "Could not parse float reply"),
        }
    }
}

impl From<(ErrorKind, &'static str)> for RedisError {
    fn from((kind, desc): (ErrorKind, &'static str)) -> RedisError {
        RedisError {
            repr: ErrorRepr::Simple(kind, desc),
        }
    }
}

impl From<(ErrorKind, &'static str, String)> for RedisError {
    fn from((kind, desc, detail): (ErrorKind, &'static str, String)) -> RedisError {
        RedisError {
            repr: ErrorRepr::WithDescription(kind, desc, detail),
        }
    }
}

/// Parses a `-ERR ...`/`-NOAUTH ...`-style server error line into a [`RedisError`],
/// classifying a handful of well-known error-code prefixes into finer `ErrorKind`s.
pub(crate) fn make_server_error(msg: String) -> RedisError {
    let code = msg.split_whitespace().next().unwrap_or("");
    let kind = match code {
        "NOAUTH" | "WRONGPASS" => ErrorKind::AuthenticationFailed,
        "EXECABORT" => ErrorKind::ExecAbortError,
        "NOSCRIPT" => ErrorKind::NoScriptError,
        _ => ErrorKind::ResponseError,
    };
    RedisError {
        repr: ErrorRepr::WithDescription(kind, "An error was signalled by the server", msg),
    }
}

/// Shorthand for `Result<T, RedisError>`.
pub type RedisResult<T> = Result<T, RedisError>;

/// Builds a `Result::Err(RedisError::from(...))` in one line at a call site.
macro_rules! fail {
    ($expr:expr) => {
        return Err(::std::convert::From::from($expr))
    };
}
pub(crate) use fail;

/// Converts a [`Value`] into a concrete Rust type, failing with
/// [`ErrorKind::TypeError`] on a shape mismatch.
pub trait FromRedisValue: Sized {
    fn from_redis_value(v: &Value) -> RedisResult<Self>;
}

pub(crate) fn unexpected(v: &Value, expected: &'static str) -> RedisError {
    RedisError::from((
        ErrorKind::TypeError,
        "Response was of incompatible type",
        format!("{expected} (response was {v:?})"),
    ))
}

impl FromRedisValue for Value {
    fn from_redis_value(v: &Value) -> RedisResult<Self> {
        Ok(v.clone())
    }
}

impl FromRedisValue for () {
    fn from_redis_value(_v: &Value) -> RedisResult<Self> {
        Ok(())
    }
}

impl FromRedisValue for i64 {
    fn from_redis_value(v: &Value) -> RedisResult<Self> {
        match *v {
            Value::Int(n) => Ok(n),
            Value::Data(ref bytes) => Ok(from_utf8(bytes)?.parse()?),
            Value::Status(ref s) => Ok(s.parse()?),
            _ => Err(unexpected(v, "an integer reply")),
        }
    }
}

impl FromRedisValue for usize {
    fn from_redis_value(v: &Value) -> RedisResult<Self> {
        i64::from_redis_value(v).map(|n| n as usize)
    }
}

impl FromRedisValue for f64 {
    fn from_redis_value(v: &Value) -> RedisResult<Self> {
        match *v {
            Value::Data(ref bytes) => Ok(from_utf8(bytes)?.parse()?),
            Value::Status(ref s) => Ok(s.parse()?),
            Value::Int(n) => Ok(n as f64),
            _ => Err(unexpected(v, "a float reply")),
        }
    }
}

impl FromRedisValue for bool {
    fn from_redis_value(v: &Value) -> RedisResult<Self> {
        match *v {
            Value::Int(n) => Ok(n != 0),
            Value::Okay => Ok(true),
            Value::Status(ref s) => Ok(s == "OK"),
            _ => Err(unexpected(v, "a boolean-valued reply")),
        }
    }
}

impl FromRedisValue for String {
    fn from_redis_value(v: &Value) -> RedisResult<Self> {
        match *v {
            Value::Data(ref bytes) => Ok(from_utf8(bytes)?.to_string()),
            Value::Okay => Ok("OK".to_string()),
            Value::Status(ref s) => Ok(s.clone()),
            _ => Err(unexpected(v, "a string reply")),
        }
    }
}

impl FromRedisValue for Vec<u8> {
    fn from_redis_value(v: &Value) -> RedisResult<Self> {
        match *v {
            Value::Data(ref bytes) => Ok(bytes.clone()),
            Value::Status(ref s) => Ok(s.as_bytes().to_vec()),
            _ => Err(unexpected(v, "a bulk reply")),
        }
    }
}

impl<T: FromRedisValue> FromRedisValue for Option<T> {
    fn from_redis_value(v: &Value) -> RedisResult<Self> {
        match *v {
            Value::Nil => Ok(None),
            _ => Ok(Some(T::from_redis_value(v)?)),
        }
    }
}

impl<T: FromRedisValue> FromRedisValue for Vec<T> {
    fn from_redis_value(v: &Value) -> RedisResult<Self> {
        match *v {
            Value::Bulk(ref items) => items.iter().map(T::from_redis_value).collect(),
            Value::Nil => Ok(Vec::new()),
            // a single non-array reply is coerced into a one-element vector, matching
            // the reference crate's leniency for commands like SMEMBERS on a fresh key
            ref other => Ok(vec![T::from_redis_value(other)?]),
        }
    }
}

impl<K: FromRedisValue + Eq + std::hash::Hash, V: FromRedisValue> FromRedisValue
    for std::collections::HashMap<K, V>
{
    fn from_redis_value(v: &Value) -> RedisResult<Self> {
        let items = match *v {
            Value::Bulk(ref items) => items,
            Value::Nil => return Ok(std::collections::HashMap::new()),
            _ => return Err(unexpected(v, "a bulk reply of field/value pairs")),
        };
        if items.len() % 2 != 0 {
            return Err(unexpected(v, "a bulk reply with an even number of items"));
        }
        let mut map = std::collections::HashMap::with_capacity(items.len() / 2);
        let mut iter = items.iter();
        while let (Some(k), Some(val)) = (iter.next(), iter.next()) {
            map.insert(K::from_redis_value(k)?, V::from_redis_value(val)?);
        }
        Ok(map)
    }
}

impl<A: FromRedisValue, B: FromRedisValue> FromRedisValue for (A, B) {
    fn from_redis_value(v: &Value) -> RedisResult<Self> {
        match *v {
            Value::Bulk(ref items) if items.len() == 2 => {
                Ok((A::from_redis_value(&items[0])?, B::from_redis_value(&items[1])?))
            }
            _ => Err(unexpected(v, "a two-element bulk reply")),
        }
    }
}

/// Converts a Rust value into the list of RESP bulk-string arguments it packs to.
pub trait ToRedisArgs {
    fn write_redis_args(&self, out: &mut Vec<Vec<u8>>);

    fn to_redis_args(&self) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        self.write_redis_args(&mut out);
        out
    }

    /// Whether this value packs to exactly one argument; used by blanket
    /// `ToRedisArgs for Vec<T>` to decide whether to splice or nest.
    fn is_single_arg(&self) -> bool {
        true
    }
}

macro_rules! itoa_redis_args {
    ($t:ty) => {
        impl ToRedisArgs for $t {
            fn write_redis_args(&self, out: &mut Vec<Vec<u8>>) {
                let mut buf = ::itoa::Buffer::new();
                out.push(buf.format(*self).as_bytes().to_vec());
            }
        }
    };
}
itoa_redis_args!(i8);
itoa_redis_args!(i16);
itoa_redis_args!(i32);
itoa_redis_args!(i64);
itoa_redis_args!(isize);
itoa_redis_args!(u8);
itoa_redis_args!(u16);
itoa_redis_args!(u32);
itoa_redis_args!(u64);
itoa_redis_args!(usize);

impl ToRedisArgs for f64 {
    fn write_redis_args(&self, out: &mut Vec<Vec<u8>>) {
        let mut buf = ryu::Buffer::new();
        out.push(buf.format(*self).as_bytes().to_vec());
    }
}

impl ToRedisArgs for bool {
    fn write_redis_args(&self, out: &mut Vec<Vec<u8>>) {
        out.push(if *self { b"1".to_vec() } else { b"0".to_vec() });
    }
}

impl ToRedisArgs for String {
    fn write_redis_args(&self, out: &mut Vec<Vec<u8>>) {
        out.push(self.as_bytes().to_vec());
    }
}

impl ToRedisArgs for &str {
    fn write_redis_args(&self, out: &mut Vec<Vec<u8>>) {
        out.push(self.as_bytes().to_vec());
    }
}

impl ToRedisArgs for Vec<u8> {
    fn write_redis_args(&self, out: &mut Vec<Vec<u8>>) {
        out.push(self.clone());
    }
}

impl ToRedisArgs for &[u8] {
    fn write_redis_args(&self, out: &mut Vec<Vec<u8>>) {
        out.push(self.to_vec());
    }
}

impl<T: ToRedisArgs> ToRedisArgs for &T {
    fn write_redis_args(&self, out: &mut Vec<Vec<u8>>) {
        (*self).write_redis_args(out)
    }
    fn is_single_arg(&self) -> bool {
        (*self).is_single_arg()
    }
}

impl<T: ToRedisArgs> ToRedisArgs for Vec<T> {
    fn write_redis_args(&self, out: &mut Vec<Vec<u8>>) {
        for item in self {
            item.write_redis_args(out);
        }
    }
    fn is_single_arg(&self) -> bool {
        false
    }
}

impl<T: ToRedisArgs> ToRedisArgs for &[T] {
    fn write_redis_args(&self, out: &mut Vec<Vec<u8>>) {
        for item in self.iter() {
            item.write_redis_args(out);
        }
    }
    fn is_single_arg(&self) -> bool {
        false
    }
}

/// Bitwise operations accepted by `BITOP`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitOp {
    And,
    Or,
    Xor,
    Not,
}

impl BitOp {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            BitOp::And => "AND",
            BitOp::Or => "OR",
            BitOp::Xor => "XOR",
            BitOp::Not => "NOT",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_from_value_variants() {
        assert_eq!(i64::from_redis_value(&Value::Int(42)).unwrap(), 42);
        assert_eq!(
            i64::from_redis_value(&Value::Data(b"42".to_vec())).unwrap(),
            42
        );
        assert!(i64::from_redis_value(&Value::Nil).is_err());
    }

    #[test]
    fn option_unwraps_nil_to_none() {
        assert_eq!(
            Option::<String>::from_redis_value(&Value::Nil).unwrap(),
            None
        );
        assert_eq!(
            Option::<String>::from_redis_value(&Value::Data(b"hi".to_vec())).unwrap(),
            Some("hi".to_string())
        );
    }

    #[test]
    fn bool_from_int() {
        assert_eq!(bool::from_redis_value(&Value::Int(1)).unwrap(), true);
        assert_eq!(bool::from_redis_value(&Value::Int(0)).unwrap(), false);
    }

    #[test]
    fn hashmap_from_pairs() {
        let v = Value::Bulk(vec![
            Value::Data(b"f1".to_vec()),
            Value::Data(b"v1".to_vec()),
            Value::Data(b"f2".to_vec()),
            Value::Data(b"v2".to_vec()),
        ]);
        let map: std::collections::HashMap<String, String> =
            FromRedisValue::from_redis_value(&v).unwrap();
        assert_eq!(map.get("f1").unwrap(), "v1");
        assert_eq!(map.get("f2").unwrap(), "v2");
    }

    #[test]
    fn server_error_classifies_known_codes() {
        let err = make_server_error("NOSCRIPT No matching script".to_string());
        assert_eq!(err.kind(), ErrorKind::NoScriptError);
        let err = make_server_error("ERR something else".to_string());
        assert_eq!(err.kind(), ErrorKind::ResponseError);
    }

    #[test]
    fn to_redis_args_splices_vecs() {
        let args = vec!["a".to_string(), "b".to_string()].to_redis_args();
        assert_eq!(args, vec![b"a".to_vec(), b"b".to_vec()]);
    }
}
