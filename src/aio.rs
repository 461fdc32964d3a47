//! The cooperative, `tokio`-backed connection: request/reply mode, subscriber
//! mode, and a `Clone`-able multiplexed connection sharing one socket.
//!
//! Mirrors [`crate::connection`] structurally (same field names, same
//! subscriber-mode bookkeeping) but built on `tokio::net::TcpStream` instead
//! of a blocking socket, and decoding through [`crate::parser::ValueCodec`]
//! instead of [`crate::parser::read_value`].

use std::collections::VecDeque;
use std::io;
use std::net::ToSocketAddrs;
use std::pin::Pin;
use std::task::{self, Poll};

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};

use futures_util::{
    future::{Future, FutureExt},
    ready,
    sink::Sink,
    stream::{Stream, StreamExt},
};
use pin_project_lite::pin_project;
use tokio_util::codec::Framed;

use crate::cmd::{cmd, Cmd};
use crate::connection::{ConnectionAddr, ConnectionInfo, Msg};
use crate::parser::{try_parse_frame, Frame, ValueCodec};
use crate::types::{fail, make_server_error, ErrorKind, RedisError, RedisResult, ToRedisArgs, Value};

/// A boxed future resolving to a [`RedisResult`], the return type of every
/// async trait method below (trait methods cannot themselves be `async fn`
/// and return a borrow-capturing future without this).
pub type RedisFuture<'a, T> = futures_util::future::BoxFuture<'a, RedisResult<T>>;

/// The capability every async command wrapper is written against.
pub trait ConnectionLike: Sized {
    /// Sends `cmd` and reads its single reply.
    fn req_command<'a>(&'a mut self, cmd: &'a Cmd) -> RedisFuture<'a, Value>;

    /// The database this connection is bound to.
    fn get_db(&self) -> i64;
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

/// A stateful cooperative connection to a Redis server.
pub struct Connection {
    stream: TcpStream,
    read_buf: BytesMut,
    db: i64,
    pubsub: bool,
    sub_count: usize,
}

impl Connection {
    fn command_name(cmd: &Cmd) -> String {
        String::from_utf8_lossy(&cmd.args()[0]).to_ascii_uppercase()
    }

    async fn send_and_flush(&mut self, bytes: &[u8]) -> RedisResult<()> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Pulls bytes off the socket until [`try_parse_frame`] can decode a
    /// complete frame out of `read_buf`, then converts it the same way
    /// [`crate::parser::read_value`] does.
    async fn read_one(&mut self) -> RedisResult<Value> {
        loop {
            if let Some((frame, consumed)) = try_parse_frame(&self.read_buf)? {
                self.read_buf.advance(consumed);
                return match frame {
                    Frame::Error(msg) => Err(make_server_error(msg)),
                    other => Ok(other.into_value()),
                };
            }
            let mut chunk = [0u8; 4096];
            let n = self.stream.read(&mut chunk).await?;
            if n == 0 {
                return Err(RedisError::from(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "Connection closed mid-reply",
                )));
            }
            self.read_buf.extend_from_slice(&chunk[..n]);
        }
    }

    /// Converts this connection into a [`PubSub`] handle.
    pub fn into_pubsub(self) -> PubSub {
        PubSub(self)
    }

    /// Issues `command` against `target` and drains one ack frame per
    /// channel/pattern argument: the server sends one ack array per channel
    /// for a multi-channel SUBSCRIBE/UNSUBSCRIBE/PSUBSCRIBE/PUNSUBSCRIBE, and
    /// leaving the rest buffered would corrupt the next call's read.
    async fn raw_subscribe(&mut self, command: &str, target: impl ToRedisArgs) -> RedisResult<()> {
        #[cfg(feature = "log")]
        log::debug!("entering subscriber mode: {command}");
        self.pubsub = true;
        let ack_count = target.to_redis_args().len();
        let mut c = cmd(command);
        c.arg(target);
        self.send_and_flush(&c.get_packed_command()).await?;
        for _ in 0..ack_count {
            let reply = self.read_one().await?;
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
    fn req_command<'a>(&'a mut self, cmd: &'a Cmd) -> RedisFuture<'a, Value> {
        (async move {
            if self.pubsub {
                let name = Self::command_name(cmd);
                if !ALLOWED_IN_SUBSCRIBER_MODE.contains(&name.as_str()) {
                    fail!((
                        ErrorKind::ClientError,
                        "This command cannot be sent while the connection is in subscriber mode"
                    ));
                }
            }
            self.send_and_flush(&cmd.get_packed_command()).await?;
            self.read_one().await
        })
        .boxed()
    }

    fn get_db(&self) -> i64 {
        self.db
    }
}

/// Opens a TCP connection and negotiates AUTH/SELECT, exactly as
/// [`crate::connection::connect`] does for the blocking connection.
pub async fn connect(info: &ConnectionInfo) -> RedisResult<Connection> {
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

    let stream = TcpStream::connect(addr).await?;

    let mut con = Connection {
        stream,
        read_buf: BytesMut::new(),
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
        match con.req_command(&auth).await? {
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
        match con.req_command(&select).await? {
            Value::Okay => {
                #[cfg(feature = "log")]
                log::debug!("SELECT {} succeeded for {host}:{port}", info.db);
            }
            _ => fail!((ErrorKind::ResponseError, "Redis server refused to switch database")),
        }
    }

    Ok(con)
}

/// A connection that has entered subscriber mode. Only pub-sub and connection
/// commands can be issued through it; see [`ALLOWED_IN_SUBSCRIBER_MODE`].
pub struct PubSub(Connection);

impl PubSub {
    pub async fn subscribe(&mut self, channel: impl ToRedisArgs) -> RedisResult<()> {
        self.0.raw_subscribe("SUBSCRIBE", channel).await
    }

    pub async fn psubscribe(&mut self, pattern: impl ToRedisArgs) -> RedisResult<()> {
        self.0.raw_subscribe("PSUBSCRIBE", pattern).await
    }

    pub async fn unsubscribe(&mut self, channel: impl ToRedisArgs) -> RedisResult<()> {
        self.0.raw_subscribe("UNSUBSCRIBE", channel).await
    }

    pub async fn punsubscribe(&mut self, pattern: impl ToRedisArgs) -> RedisResult<()> {
        self.0.raw_subscribe("PUNSUBSCRIBE", pattern).await
    }

    /// Awaits the next message. Acknowledgement frames (replies to
    /// subscribe/unsubscribe) are not produced here — they are consumed by
    /// the methods above.
    pub async fn next_message(&mut self) -> RedisResult<Msg> {
        loop {
            let value = self.0.read_one().await?;
            if let Some(msg) = Msg::from_value(&value) {
                return Ok(msg);
            }
        }
    }

    /// A `Stream` of decoded messages, for callers that prefer combinators
    /// over a `loop { next_message().await }`. Reads straight off the socket
    /// through a fresh [`ValueCodec`]-framed reader rather than `read_buf`,
    /// so it must not be interleaved with [`PubSub::next_message`] calls on
    /// the same instance.
    pub fn on_message(&mut self) -> impl Stream<Item = Msg> + '_ {
        Framed::new(&mut self.0.stream, ValueCodec)
            .filter_map(|item| Box::pin(async move { Msg::from_value(&item.ok()?) }))
    }

    /// Leaves subscriber mode by unsubscribing from everything and draining
    /// acknowledgements, then hands back the plain [`Connection`].
    pub async fn into_connection(mut self) -> RedisResult<Connection> {
        if self.0.sub_count > 0 || self.0.pubsub {
            #[cfg(feature = "log")]
            log::debug!("leaving subscriber mode: unsubscribing from everything");
            self.0.send_and_flush(&cmd("UNSUBSCRIBE").get_packed_command()).await?;
            self.0.send_and_flush(&cmd("PUNSUBSCRIBE").get_packed_command()).await?;
            let mut seen_unsub = false;
            let mut seen_punsub = false;
            loop {
                let reply = self.0.read_one().await?;
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

// Senders through which the result of a single request is returned.
type PipelineOutput<O, E> = oneshot::Sender<Result<O, E>>;

struct InFlight<O, E> {
    output: PipelineOutput<O, E>,
}

// A single message sent through the pipeline.
struct PipelineMessage<S, I, E> {
    input: S,
    output: PipelineOutput<I, E>,
}

/// Routes requests from any number of cloned handles onto one underlying
/// `Sink + Stream`, matching each reply back to the request that produced it
/// by strict arrival order (Redis replies are never reordered within a
/// connection, so a `VecDeque` of waiters is sufficient — no request IDs are
/// carried on the wire).
struct Pipeline<SinkItem, I, E>(mpsc::Sender<PipelineMessage<SinkItem, I, E>>);

impl<SinkItem, I, E> Clone for Pipeline<SinkItem, I, E> {
    fn clone(&self) -> Self {
        Pipeline(self.0.clone())
    }
}

pin_project! {
    struct PipelineSink<T, I, E> {
        #[pin]
        sink_stream: T,
        in_flight: VecDeque<InFlight<I, E>>,
        error: Option<E>,
    }
}

impl<T, I, E> PipelineSink<T, I, E>
where
    T: Stream<Item = Result<I, E>> + 'static,
{
    fn new<SinkItem>(sink_stream: T) -> Self
    where
        T: Sink<SinkItem, Error = E> + Stream<Item = Result<I, E>> + 'static,
    {
        PipelineSink {
            sink_stream,
            in_flight: VecDeque::new(),
            error: None,
        }
    }

    fn poll_read(mut self: Pin<&mut Self>, cx: &mut task::Context) -> Poll<Result<(), ()>> {
        loop {
            let item = match ready!(self.as_mut().project().sink_stream.poll_next(cx)) {
                Some(Ok(item)) => Ok(item),
                Some(Err(err)) => Err(err),
                // the reply stream will not produce any more items; stop handling requests
                None => return Poll::Ready(Err(())),
            };
            self.as_mut().send_result(item);
        }
    }

    fn send_result(self: Pin<&mut Self>, result: Result<I, E>) {
        let self_ = self.project();
        let entry = match self_.in_flight.pop_front() {
            Some(entry) => entry,
            None => return,
        };
        // an error on the receiving end means the caller dropped its future; nothing to do
        entry.output.send(result).ok();
    }
}

impl<SinkItem, T, I, E> Sink<PipelineMessage<SinkItem, I, E>> for PipelineSink<T, I, E>
where
    T: Sink<SinkItem, Error = E> + Stream<Item = Result<I, E>> + 'static,
{
    type Error = ();

    fn poll_ready(
        mut self: Pin<&mut Self>,
        cx: &mut task::Context,
    ) -> Poll<Result<(), Self::Error>> {
        match ready!(self.as_mut().project().sink_stream.poll_ready(cx)) {
            Ok(()) => Ok(()).into(),
            Err(err) => {
                *self.project().error = Some(err);
                Ok(()).into()
            }
        }
    }

    fn start_send(
        mut self: Pin<&mut Self>,
        PipelineMessage { input, output }: PipelineMessage<SinkItem, I, E>,
    ) -> Result<(), Self::Error> {
        let self_ = self.as_mut().project();
        if let Some(err) = self_.error.take() {
            let _ = output.send(Err(err));
            return Err(());
        }
        match self_.sink_stream.start_send(input) {
            Ok(()) => {
                self_.in_flight.push_back(InFlight { output });
                Ok(())
            }
            Err(err) => {
                let _ = output.send(Err(err));
                Err(())
            }
        }
    }

    fn poll_flush(
        mut self: Pin<&mut Self>,
        cx: &mut task::Context,
    ) -> Poll<Result<(), Self::Error>> {
        ready!(self
            .as_mut()
            .project()
            .sink_stream
            .poll_flush(cx)
            .map_err(|err| {
                self.as_mut().send_result(Err(err));
            }))?;
        self.poll_read(cx)
    }

    fn poll_close(
        mut self: Pin<&mut Self>,
        cx: &mut task::Context,
    ) -> Poll<Result<(), Self::Error>> {
        if !self.in_flight.is_empty() {
            ready!(self.as_mut().poll_flush(cx))?;
        }
        let this = self.as_mut().project();
        this.sink_stream.poll_close(cx).map_err(|err| {
            self.send_result(Err(err));
        })
    }
}

impl<SinkItem, I, E> Pipeline<SinkItem, I, E>
where
    SinkItem: Send + 'static,
    I: Send + 'static,
    E: Send + 'static,
{
    fn new<T>(sink_stream: T) -> (Self, impl Future<Output = ()>)
    where
        T: Sink<SinkItem, Error = E> + Stream<Item = Result<I, E>> + 'static,
        T: Send + 'static,
        T::Item: Send,
        T::Error: Send,
    {
        const BUFFER_SIZE: usize = 50;
        let (sender, receiver) = mpsc::channel(BUFFER_SIZE);
        let f = receiver
            .map(Ok)
            .forward(PipelineSink::new::<SinkItem>(sink_stream))
            .map(|_| ());
        (Pipeline(sender), f)
    }

    // `None` means the reply stream ran out of items, which only happens once the connection died.
    async fn send(&mut self, item: SinkItem) -> Result<I, Option<E>> {
        let (sender, receiver) = oneshot::channel();
        self.0
            .send(PipelineMessage {
                input: item,
                output: sender,
            })
            .await
            .map_err(|_| None)?;
        match receiver.await {
            Ok(result) => result.map_err(Some),
            // the sender was dropped, which means the stream half failed
            Err(_) => Err(None),
        }
    }
}

/// A connection that can be `Clone`d, letting callers issue requests
/// concurrently over one shared socket. This is the one sanctioned
/// pipelining surface: commands from different clones interleave on the
/// wire but each clone only ever sees the single reply matching its own
/// request.
#[derive(Clone)]
pub struct MultiplexedConnection {
    pipeline: Pipeline<Vec<u8>, Value, RedisError>,
    db: i64,
}

impl MultiplexedConnection {
    /// Splits a plain [`Connection`] into a `Clone`-able handle plus the
    /// background driver future that must be polled (e.g. via
    /// `tokio::spawn`) for any request to make progress.
    pub(crate) fn new(con: Connection) -> (Self, impl Future<Output = ()>) {
        let framed = Framed::new(con.stream, ValueCodec);
        let (pipeline, driver) = Pipeline::new(framed);
        (
            MultiplexedConnection {
                pipeline,
                db: con.db,
            },
            driver,
        )
    }
}

impl ConnectionLike for MultiplexedConnection {
    fn req_command<'a>(&'a mut self, cmd: &'a Cmd) -> RedisFuture<'a, Value> {
        (async move {
            self.pipeline
                .send(cmd.get_packed_command())
                .await
                .map_err(|err| err.unwrap_or_else(|| RedisError::from(io::Error::from(io::ErrorKind::BrokenPipe))))
        })
        .boxed()
    }

    fn get_db(&self) -> i64 {
        self.db
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_rejects_unix_socket_addr() {
        let info = ConnectionInfo {
            addr: ConnectionAddr::Unix("/tmp/redis.sock".into()),
            db: 0,
            username: None,
            passwd: None,
        };
        let err = connect(&info).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidClientConfig);
    }

    #[tokio::test]
    async fn connect_fails_fast_on_unreachable_host() {
        let info = ConnectionInfo::new("127.0.0.1", 1);
        assert!(connect(&info).await.is_err());
    }

    /// Same correctness requirement as the blocking connection's equivalent
    /// test: a multi-channel SUBSCRIBE must drain one ack per channel, or the
    /// next read picks up a stale ack instead of the caller's next message.
    #[tokio::test]
    async fn subscribe_to_multiple_channels_drains_one_ack_per_channel() {
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let n = stream.read(&mut buf).await.unwrap();
            assert_eq!(
                &buf[..n],
                b"*3\r\n$9\r\nSUBSCRIBE\r\n$2\r\nc1\r\n$2\r\nc2\r\n".as_slice()
            );
            stream
                .write_all(b"*3\r\n$9\r\nsubscribe\r\n$2\r\nc1\r\n:1\r\n")
                .await
                .unwrap();
            stream
                .write_all(b"*3\r\n$9\r\nsubscribe\r\n$2\r\nc2\r\n:2\r\n")
                .await
                .unwrap();
            stream
                .write_all(b"*3\r\n$7\r\nmessage\r\n$2\r\nc1\r\n$2\r\nhi\r\n")
                .await
                .unwrap();
        });

        let info = ConnectionInfo::new(addr.ip().to_string(), addr.port());
        let mut con = connect(&info).await.unwrap();
        con.raw_subscribe("SUBSCRIBE", vec!["c1", "c2"]).await.unwrap();
        assert_eq!(con.sub_count, 2);
        assert!(con.pubsub);

        let msg = con.read_one().await.unwrap();
        let msg = Msg::from_value(&msg).unwrap();
        assert_eq!(msg.get_channel_name(), "c1");
        assert_eq!(msg.get_payload::<String>().unwrap(), "hi");

        server.await.unwrap();
    }
}
