//! The synchronous, blocking-socket connection: request/reply mode and
//! subscriber mode over one [`std::net::TcpStream`].

use std::io::{BufReader, BufWriter, Write};
use std::net::{TcpStream, ToSocketAddrs};

use crate::cmd::{cmd, Cmd};
use crate::parser::read_value;
use crate::types::{fail, ErrorKind, RedisError, RedisResult, ToRedisArgs, Value};

/// Where to reach the server. Only `Tcp` is exercised by this crate; `Unix`
/// exists for shape-compatibility with connection strings but is rejected at
/// connect time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionAddr {
    Tcp(String, u16),
    Unix(std::path::PathBuf),
}

/// Everything needed to open and negotiate a connection.
#[derive(Clone, Debug)]
pub struct ConnectionInfo {
    pub addr: ConnectionAddr,
    pub db: i64,
    pub username: Option<String>,
    pub passwd: Option<String>,
}

impl ConnectionInfo {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        ConnectionInfo {
            addr: ConnectionAddr::Tcp(host.into(), port),
            db: 0,
            username: None,
            passwd: None,
        }
    }
}

/// Converts something into a [`ConnectionInfo`]: either the struct itself, or a
/// `redis://[username:password@]host:port/db` URL.
pub trait IntoConnectionInfo {
    fn into_connection_info(self) -> RedisResult<ConnectionInfo>;
}

impl IntoConnectionInfo for ConnectionInfo {
    fn into_connection_info(self) -> RedisResult<ConnectionInfo> {
        Ok(self)
    }
}

impl IntoConnectionInfo for &str {
    fn into_connection_info(self) -> RedisResult<ConnectionInfo> {
        parse_redis_url(self)
    }
}

impl IntoConnectionInfo for String {
    fn into_connection_info(self) -> RedisResult<ConnectionInfo> {
        parse_redis_url(&self)
    }
}

fn parse_redis_url(input: &str) -> RedisResult<ConnectionInfo> {
    let url = url::Url::parse(input)
        .map_err(|_| RedisError::from((ErrorKind::InvalidClientConfig, "Invalid connection URL")))?;
    if url.scheme() != "redis" {
        fail!((ErrorKind::InvalidClientConfig, "URL scheme must be redis://"));
    }
    let host = url
        .host_str()
        .ok_or_else(|| RedisError::from((ErrorKind::InvalidClientConfig, "Missing host in URL")))?
        .to_string();
    let port = url.port().unwrap_or(6379);
    let username = {
        let u = url.username();
        if u.is_empty() {
            None
        } else {
            Some(
                percent_encoding::percent_decode_str(u)
                    .decode_utf8_lossy()
                    .into_owned(),
            )
        }
    };
    let passwd = url.password().map(|p| {
        percent_encoding::percent_decode_str(p)
            .decode_utf8_lossy()
            .into_owned()
    });
    let db = match url.path().trim_start_matches('/') {
        "" => 0,
        s => s.parse::<i64>().map_err(|_| {
            RedisError::from((ErrorKind::InvalidClientConfig, "Invalid database number in URL"))
        })?,
    };
    Ok(ConnectionInfo {
        addr: ConnectionAddr::Tcp(host, port),
        db,
        username,
        passwd,
    })
}

/// Commands still permitted once a connection has entered subscriber mode.
const ALLOWED_IN_SUBSCRIBER_MODE: &[&str] = &[
    "SUBSCRIBE",
    "UNSUBSCRIBE",
    "PSUBSCRIBE",
    "PUNSUBSCRIBE",
    "PING",
    "QUIT",
];

/// The capability every command wrapper is written against: send one packed
/// command, get back exactly one decoded reply.
pub trait ConnectionLike {
    /// Sends `cmd` and reads its single reply.
    fn req_command(&mut self, cmd: &Cmd) -> RedisResult<Value>;

    /// The database this connection is bound to.
    fn get_db(&self) -> i64;
}

/// A stateful, blocking TCP connection to a Redis server.
pub struct Connection {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
    db: i64,
    pubsub: bool,
    sub_count: usize,
}

impl Connection {
    fn command_name(cmd: &Cmd) -> String {
        String::from_utf8_lossy(&cmd.args()[0]).to_ascii_uppercase()
    }

    fn send_and_flush(&mut self, bytes: &[u8]) -> RedisResult<()> {
        self.writer.write_all(bytes)?;
        self.writer.flush()?;
        Ok(())
    }

    fn read_one(&mut self) -> RedisResult<Value> {
        read_value(&mut self.reader)
    }

    /// Converts this connection into a [`PubSub`] handle.
    pub fn into_pubsub(self) -> PubSub {
        PubSub(self)
    }

    /// Closes the socket. Idempotent: further use of this connection simply
    /// fails with an I/O error, which is the same outcome a second `disconnect`
    /// call would itself run into.
    pub fn disconnect(self) {
        let _ = self.writer.get_ref().shutdown(std::net::Shutdown::Both);
    }

    /// Issues `command` against `target` and drains one ack frame per
    /// channel/pattern argument: the server sends one ack array per channel
    /// for a multi-channel SUBSCRIBE/UNSUBSCRIBE/PSUBSCRIBE/PUNSUBSCRIBE, and
    /// leaving the rest buffered would corrupt the next call's read (see
    /// `PubSub::into_connection`'s own multi-reply draining below).
    fn raw_subscribe(&mut self, command: &str, target: impl ToRedisArgs) -> RedisResult<()> {
        #[cfg(feature = "log")]
        log::debug!("entering subscriber mode: {command}");
        self.pubsub = true;
        let ack_count = target.to_redis_args().len();
        let mut c = cmd(command);
        c.arg(target);
        self.send_and_flush(&c.get_packed_command())?;
        for _ in 0..ack_count {
            let reply = self.read_one()?;
            if let Value::Bulk(items) = reply {
                if let Some(Value::Int(count)) = items.last() {
                    self.sub_count = *count as usize;
                }
            }
        }
        if self.sub_count == 0 && (command == "UNSUBSCRIBE" || command == "PUNSUBSCRIBE") {
            #[cfg(feature = "log")]
            log::debug!("leaving subscriber mode: {command} drained to zero subscriptions");
            self.pubsub = false;
        }
        Ok(())
    }
}

impl ConnectionLike for Connection {
    fn req_command(&mut self, cmd: &Cmd) -> RedisResult<Value> {
        if self.pubsub {
            let name = Self::command_name(cmd);
            if !ALLOWED_IN_SUBSCRIBER_MODE.contains(&name.as_str()) {
                fail!((
                    ErrorKind::ClientError,
                    "This command cannot be sent while the connection is in subscriber mode"
                ));
            }
        }
        self.send_and_flush(&cmd.get_packed_command())?;
        self.read_one()
    }

    fn get_db(&self) -> i64 {
        self.db
    }
}

/// Opens a TCP connection and negotiates AUTH/SELECT.
pub fn connect(info: &ConnectionInfo) -> RedisResult<Connection> {
    let (host, port) = match &info.addr {
        ConnectionAddr::Tcp(host, port) => (host.clone(), *port),
        ConnectionAddr::Unix(_) => fail!((
            ErrorKind::InvalidClientConfig,
            "Unix sockets are not supported by this build"
        )),
    };

    #[cfg(feature = "log")]
    log::debug!("connecting to {host}:{port}");

    let addr = (host.as_str(), port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| RedisError::from((ErrorKind::InvalidClientConfig, "No address found for host")))?;

    let stream = TcpStream::connect(addr)?;
    let reader_stream = stream.try_clone()?;

    let mut con = Connection {
        reader: BufReader::new(reader_stream),
        writer: BufWriter::new(stream),
        db: info.db,
        pubsub: false,
        sub_count: 0,
    };

    if let Some(passwd) = &info.passwd {
        let mut auth = cmd("AUTH");
        if let Some(username) = &info.username {
            auth.arg(username);
        }
        auth.arg(passwd);
        match con.req_command(&auth)? {
            Value::Okay => {
                #[cfg(feature = "log")]
                log::debug!("AUTH succeeded for {host}:{port}");
            }
            _ => fail!((ErrorKind::AuthenticationFailed, "Password authentication failed")),
        }
    }

    if info.db != 0 {
        let mut select = cmd("SELECT");
        select.arg(info.db);
        match con.req_command(&select)? {
            Value::Okay => {
                #[cfg(feature = "log")]
                log::debug!("SELECT {} succeeded for {host}:{port}", info.db);
            }
            _ => fail!((ErrorKind::ResponseError, "Redis server refused to switch database")),
        }
    }

    Ok(con)
}

/// Scoped acquisition: connects, runs `body`, and releases the connection on
/// every exit path — normal return, or `body` returning an error — by relying on
/// `Connection` going out of scope (its socket is closed when the underlying
/// `TcpStream`s are dropped).
pub fn with_connection<T>(
    info: &ConnectionInfo,
    body: impl FnOnce(&mut Connection) -> RedisResult<T>,
) -> RedisResult<T> {
    let mut con = connect(info)?;
    body(&mut con)
}

/// A single pub-sub message, decoded from a `["message", channel, payload]` or
/// `["pmessage", pattern, channel, payload]` array.
#[derive(Debug, Clone)]
pub struct Msg {
    channel: Value,
    payload: Value,
    pattern: Option<Value>,
}

impl Msg {
    pub fn from_value(value: &Value) -> Option<Self> {
        let items = match value {
            Value::Bulk(items) => items,
            _ => return None,
        };
        let kind = match items.first() {
            Some(Value::Data(b)) => b.as_slice(),
            Some(Value::Status(s)) => s.as_bytes(),
            _ => return None,
        };
        match kind {
            b"message" if items.len() == 3 => Some(Msg {
                channel: items[1].clone(),
                payload: items[2].clone(),
                pattern: None,
            }),
            b"pmessage" if items.len() == 4 => Some(Msg {
                pattern: Some(items[1].clone()),
                channel: items[2].clone(),
                payload: items[3].clone(),
            }),
            _ => None,
        }
    }

    pub fn get_channel_name(&self) -> String {
        String::from_redis_value_lossy(&self.channel)
    }

    pub fn get_payload_bytes(&self) -> &[u8] {
        match &self.payload {
            Value::Data(b) => b,
            _ => &[],
        }
    }

    pub fn get_payload<T: crate::types::FromRedisValue>(&self) -> RedisResult<T> {
        T::from_redis_value(&self.payload)
    }

    pub fn get_pattern<T: crate::types::FromRedisValue>(&self) -> RedisResult<Option<T>> {
        match &self.pattern {
            None => Ok(None),
            Some(v) => Ok(Some(T::from_redis_value(v)?)),
        }
    }
}

trait FromRedisValueLossy {
    fn from_redis_value_lossy(v: &Value) -> String;
}

impl FromRedisValueLossy for String {
    fn from_redis_value_lossy(v: &Value) -> String {
        match v {
            Value::Data(b) => String::from_utf8_lossy(b).into_owned(),
            Value::Status(s) => s.clone(),
            _ => String::new(),
        }
    }
}

/// A connection that has entered subscriber mode. Only pub-sub and connection
/// commands can be issued through it; see [`ALLOWED_IN_SUBSCRIBER_MODE`].
pub struct PubSub(Connection);

impl PubSub {
    pub fn subscribe(&mut self, channel: impl ToRedisArgs) -> RedisResult<()> {
        self.0.raw_subscribe("SUBSCRIBE", channel)
    }

    pub fn psubscribe(&mut self, pattern: impl ToRedisArgs) -> RedisResult<()> {
        self.0.raw_subscribe("PSUBSCRIBE", pattern)
    }

    pub fn unsubscribe(&mut self, channel: impl ToRedisArgs) -> RedisResult<()> {
        self.0.raw_subscribe("UNSUBSCRIBE", channel)
    }

    pub fn punsubscribe(&mut self, pattern: impl ToRedisArgs) -> RedisResult<()> {
        self.0.raw_subscribe("PUNSUBSCRIBE", pattern)
    }

    /// Blocks for the next message. Acknowledgement frames (replies to
    /// subscribe/unsubscribe) are not produced here — they are consumed
    /// synchronously by the methods above.
    pub fn next_message(&mut self) -> RedisResult<Msg> {
        loop {
            let value = self.0.read_one()?;
            if let Some(msg) = Msg::from_value(&value) {
                return Ok(msg);
            }
        }
    }

    /// Leaves subscriber mode by unsubscribing from everything and draining
    /// acknowledgements, then hands back the plain [`Connection`].
    pub fn into_connection(mut self) -> RedisResult<Connection> {
        if self.0.sub_count > 0 || self.0.pubsub {
            #[cfg(feature = "log")]
            log::debug!("leaving subscriber mode: unsubscribing from everything");
            self.0.send_and_flush(&cmd("UNSUBSCRIBE").get_packed_command())?;
            self.0.send_and_flush(&cmd("PUNSUBSCRIBE").get_packed_command())?;
            let mut seen_unsub = false;
            let mut seen_punsub = false;
            loop {
                let reply = self.0.read_one()?;
                if let Value::Bulk(items) = &reply {
                    let kind = match items.first() {
                        Some(Value::Data(b)) => b.first().copied(),
                        Some(Value::Status(s)) => s.as_bytes().first().copied(),
                        _ => None,
                    };
                    match kind {
                        Some(b'u') => seen_unsub = true,
                        Some(b'p') => seen_punsub = true,
                        _ => {}
                    }
                    if let Some(Value::Int(count)) = items.last() {
                        self.0.sub_count = *count as usize;
                    }
                }
                if seen_unsub && seen_punsub && self.0.sub_count == 0 {
                    break;
                }
            }
            self.0.pubsub = false;
            #[cfg(feature = "log")]
            log::debug!("left subscriber mode");
        }
        Ok(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_info_from_url() {
        let info = "redis://user:pw@localhost:6380/3".into_connection_info().unwrap();
        assert_eq!(info.addr, ConnectionAddr::Tcp("localhost".to_string(), 6380));
        assert_eq!(info.db, 3);
        assert_eq!(info.username.as_deref(), Some("user"));
        assert_eq!(info.passwd.as_deref(), Some("pw"));
    }

    #[test]
    fn connection_info_from_url_defaults() {
        let info = "redis://localhost".into_connection_info().unwrap();
        assert_eq!(info.addr, ConnectionAddr::Tcp("localhost".to_string(), 6379));
        assert_eq!(info.db, 0);
        assert!(info.username.is_none());
        assert!(info.passwd.is_none());
    }

    #[test]
    fn rejects_non_redis_scheme() {
        assert!("http://localhost".into_connection_info().is_err());
    }

    #[test]
    fn msg_parses_message_and_pmessage_shapes() {
        let v = Value::Bulk(vec![
            Value::Data(b"message".to_vec()),
            Value::Data(b"ch".to_vec()),
            Value::Data(b"hi".to_vec()),
        ]);
        let msg = Msg::from_value(&v).unwrap();
        assert_eq!(msg.get_channel_name(), "ch");
        assert_eq!(msg.get_payload::<String>().unwrap(), "hi");
        assert!(msg.get_pattern::<String>().unwrap().is_none());

        let v = Value::Bulk(vec![
            Value::Data(b"pmessage".to_vec()),
            Value::Data(b"ch*".to_vec()),
            Value::Data(b"ch1".to_vec()),
            Value::Data(b"hi".to_vec()),
        ]);
        let msg = Msg::from_value(&v).unwrap();
        assert_eq!(msg.get_pattern::<String>().unwrap().as_deref(), Some("ch*"));
    }

    #[test]
    fn msg_rejects_other_shapes() {
        let v = Value::Bulk(vec![Value::Data(b"subscribe".to_vec()), Value::Data(b"ch".to_vec()), Value::Int(1)]);
        assert!(Msg::from_value(&v).is_none());
    }

    /// A multi-channel SUBSCRIBE gets one ack array per channel on the wire.
    /// `raw_subscribe` must drain all of them, or the next read on the
    /// connection picks up a stale ack instead of the caller's next message.
    #[test]
    fn subscribe_to_multiple_channels_drains_one_ack_per_channel() {
        use std::io::Read;
        use std::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 1024];
            let n = stream.read(&mut buf).unwrap();
            assert_eq!(
                &buf[..n],
                b"*3\r\n$9\r\nSUBSCRIBE\r\n$2\r\nc1\r\n$2\r\nc2\r\n".as_slice()
            );
            stream
                .write_all(b"*3\r\n$9\r\nsubscribe\r\n$2\r\nc1\r\n:1\r\n")
                .unwrap();
            stream
                .write_all(b"*3\r\n$9\r\nsubscribe\r\n$2\r\nc2\r\n:2\r\n")
                .unwrap();
            // Proves the un-drained second ack would otherwise be picked up
            // here instead of this genuine published message.
            stream
                .write_all(b"*3\r\n$7\r\nmessage\r\n$2\r\nc1\r\n$2\r\nhi\r\n")
                .unwrap();
        });

        let info = ConnectionInfo::new(addr.ip().to_string(), addr.port());
        let mut con = connect(&info).unwrap();
        con.raw_subscribe("SUBSCRIBE", vec!["c1", "c2"]).unwrap();
        assert_eq!(con.sub_count, 2);
        assert!(con.pubsub);

        let msg = con.read_one().unwrap();
        let msg = Msg::from_value(&msg).unwrap();
        assert_eq!(msg.get_channel_name(), "c1");
        assert_eq!(msg.get_payload::<String>().unwrap(), "hi");

        server.join().unwrap();
    }
}
