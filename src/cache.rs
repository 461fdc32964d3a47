//! A typed key/value cache shim over SET/GET/DEL, with optional expiration.

use std::marker::PhantomData;

use crate::cmd::cmd;
use crate::connection::ConnectionLike;
use crate::types::{FromRedisValue, RedisResult, ToRedisArgs};

/// Wraps a connection's strings as a typed cache.
///
/// `K` only needs `ToRedisArgs` (it becomes the key directly); `V` needs both
/// `ToRedisArgs` (to store) and `FromRedisValue` (to read back).
pub struct Cache<K, V> {
    expire_seconds: Option<usize>,
    _marker: PhantomData<fn(K, V)>,
}

impl<K: ToRedisArgs, V: ToRedisArgs + FromRedisValue> Cache<K, V> {
    pub fn new() -> Self {
        Cache {
            expire_seconds: None,
            _marker: PhantomData,
        }
    }

    pub fn with_expiration(expire_seconds: usize) -> Self {
        Cache {
            expire_seconds: Some(expire_seconds),
            _marker: PhantomData,
        }
    }

    /// `SET key value`, or `SETEX key expire_seconds value` when this cache was
    /// built with an expiration.
    pub fn set<C: ConnectionLike>(&self, con: &mut C, key: K, value: V) -> RedisResult<()> {
        let c = match self.expire_seconds {
            Some(seconds) => {
                let mut c = cmd("SETEX");
                c.arg(key).arg(seconds).arg(value);
                c
            }
            None => {
                let mut c = cmd("SET");
                c.arg(key).arg(value);
                c
            }
        };
        FromRedisValue::from_redis_value(&con.req_command(&c)?)
    }

    /// `GET key`, decoded via `V`'s `FromRedisValue`. An absent key maps to `None`.
    pub fn get<C: ConnectionLike>(&self, con: &mut C, key: K) -> RedisResult<Option<V>> {
        let mut c = cmd("GET");
        c.arg(key);
        FromRedisValue::from_redis_value(&con.req_command(&c)?)
    }

    /// `DEL key`. The boolean result (whether the key existed) is available but
    /// callers may discard it for fire-and-forget semantics.
    pub fn delete<C: ConnectionLike>(&self, con: &mut C, key: K) -> RedisResult<bool> {
        let mut c = cmd("DEL");
        c.arg(key);
        let n: i64 = FromRedisValue::from_redis_value(&con.req_command(&c)?)?;
        Ok(n > 0)
    }
}

impl<K: ToRedisArgs, V: ToRedisArgs + FromRedisValue> Default for Cache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockConnection;

    #[test]
    fn set_without_expiration_uses_plain_set() {
        let cache: Cache<String, String> = Cache::new();
        let mut con = MockConnection::new();
        con.expect("*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n", "+OK\r\n");
        cache.set(&mut con, "k".to_string(), "v".to_string()).unwrap();
    }

    #[test]
    fn set_with_expiration_uses_setex() {
        let cache: Cache<String, String> = Cache::with_expiration(60);
        let mut con = MockConnection::new();
        con.expect(
            "*4\r\n$5\r\nSETEX\r\n$1\r\nk\r\n$2\r\n60\r\n$1\r\nv\r\n",
            "+OK\r\n",
        );
        cache.set(&mut con, "k".to_string(), "v".to_string()).unwrap();
    }

    #[test]
    fn get_missing_key_is_none() {
        let cache: Cache<String, String> = Cache::new();
        let mut con = MockConnection::new();
        con.expect("*2\r\n$3\r\nGET\r\n$1\r\nk\r\n", "$-1\r\n");
        assert_eq!(cache.get(&mut con, "k".to_string()).unwrap(), None);
    }

    #[test]
    fn get_present_empty_value_is_distinct_from_missing() {
        let cache: Cache<String, String> = Cache::new();
        let mut con = MockConnection::new();
        con.expect("*2\r\n$3\r\nGET\r\n$1\r\nk\r\n", "$0\r\n\r\n");
        assert_eq!(cache.get(&mut con, "k".to_string()).unwrap(), Some(String::new()));
    }

    #[test]
    fn delete_reports_whether_key_existed() {
        let cache: Cache<String, String> = Cache::new();
        let mut con = MockConnection::new();
        con.expect("*2\r\n$3\r\nDEL\r\n$1\r\nk\r\n", ":0\r\n");
        assert_eq!(cache.delete(&mut con, "k".to_string()).unwrap(), false);
    }
}
