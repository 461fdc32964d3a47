//! A synchronous and, behind the `aio` feature, asynchronous client library
//! for Redis.
//!
//! ```no_run
//! use redis::Commands;
//!
//! let client = redis::Client::open("redis://127.0.0.1/").unwrap();
//! let mut con = client.get_connection().unwrap();
//! con.set("my_key", 42).unwrap();
//! let value: i64 = con.get("my_key").unwrap();
//! assert_eq!(value, 42);
//! ```

mod cache;
mod client;
mod cmd;
mod commands;
mod connection;
mod mutex;
mod parser;
mod script;
mod transaction;
mod types;

#[cfg(feature = "aio")]
pub mod aio;

#[cfg(test)]
mod testing;

pub use cache::Cache;
pub use client::Client;
pub use cmd::{cmd, Cmd};
pub use commands::Commands;
pub use connection::{connect, with_connection, Connection, ConnectionAddr, ConnectionInfo, ConnectionLike, IntoConnectionInfo, Msg, PubSub};
pub use mutex::{Mutex, MutexError};
pub use script::{Script, ScriptInvocation};
pub use transaction::{unwatch, watch, Transaction, TransactionState};
pub use types::{BitOp, ErrorKind, FromRedisValue, RedisError, RedisResult, ToRedisArgs, Value};

#[cfg(feature = "aio")]
pub use commands::AsyncCommands;
