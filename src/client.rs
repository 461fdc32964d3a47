//! A reusable handle to a server address, producing new connections on demand.

use crate::connection::{self, Connection, ConnectionInfo, IntoConnectionInfo};
use crate::types::RedisResult;

/// Holds a [`ConnectionInfo`] and opens connections against it. Cheap to clone;
/// does not itself hold a socket.
#[derive(Clone)]
pub struct Client {
    connection_info: ConnectionInfo,
}

impl Client {
    pub fn open<T: IntoConnectionInfo>(params: T) -> RedisResult<Client> {
        Ok(Client {
            connection_info: params.into_connection_info()?,
        })
    }

    pub fn connection_info(&self) -> &ConnectionInfo {
        &self.connection_info
    }

    /// Opens a new synchronous, blocking connection.
    pub fn get_connection(&self) -> RedisResult<Connection> {
        connection::connect(&self.connection_info)
    }
}

#[cfg(feature = "aio")]
impl Client {
    /// Opens a new cooperative connection.
    pub async fn get_async_connection(&self) -> RedisResult<crate::aio::Connection> {
        crate::aio::connect(&self.connection_info).await
    }

    /// Opens a new `Clone`-able cooperative connection safe to share across
    /// concurrently-running tasks.
    pub async fn get_multiplexed_async_connection(
        &self,
    ) -> RedisResult<crate::aio::MultiplexedConnection> {
        let con = crate::aio::connect(&self.connection_info).await?;
        let (multiplexed, driver) = crate::aio::MultiplexedConnection::new(con);
        tokio::spawn(driver);
        Ok(multiplexed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_parses_url() {
        let client = Client::open("redis://localhost:6379/1").unwrap();
        assert_eq!(client.connection_info().db, 1);
    }
}
