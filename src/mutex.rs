//! A distributed mutex built on SETNX/EXPIRE acquisition and a Lua
//! compare-and-delete release script.

use std::fmt;
use std::time::{Duration, Instant};

use crate::cmd::cmd;
use crate::connection::ConnectionLike;
use crate::script::Script;
use crate::types::{unexpected, FromRedisValue, RedisError, RedisResult, Value};

const RELEASE_SCRIPT: &str = r#"
if redis.call("get", KEYS[1]) == ARGV[1] then
    return redis.call("del", KEYS[1])
else
    return 0
end
"#;

/// Errors specific to mutex acquisition, distinct from the underlying
/// `RedisError` taxonomy because a timed-out acquire is an expected, handled
/// outcome rather than a transport failure.
#[derive(Debug)]
pub enum MutexError {
    /// Cumulative waiting exceeded the acquire budget.
    Timeout(String),
    /// `ltime` was less than 1 second.
    InvalidTtl,
    /// Something below the mutex (transport, shape mismatch) failed.
    Redis(RedisError),
}

impl fmt::Display for MutexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutexError::Timeout(name) => write!(f, "timed out acquiring mutex '{name}'"),
            MutexError::InvalidTtl => write!(f, "ltime must be at least 1 second"),
            MutexError::Redis(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for MutexError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MutexError::Redis(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RedisError> for MutexError {
    fn from(err: RedisError) -> Self {
        MutexError::Redis(err)
    }
}

/// A named distributed lock.
///
/// Tokens identifying a specific holder are always caller-supplied: this type
/// never generates one, so it carries no randomness dependency of its own.
pub struct Mutex {
    name: String,
    release_script: Script,
    retry_interval: Duration,
    default_atime: f64,
    default_ltime: i64,
    single_command_acquire: bool,
}

impl Mutex {
    /// `atime` defaults to 10 seconds, `ltime` to 30 seconds; override with
    /// [`Mutex::with_defaults`].
    pub fn new(name: impl Into<String>) -> Self {
        Mutex {
            name: name.into(),
            release_script: Script::new(RELEASE_SCRIPT),
            retry_interval: Duration::from_millis(100),
            default_atime: 10.0,
            default_ltime: 30,
            single_command_acquire: false,
        }
    }

    pub fn with_defaults(mut self, atime: f64, ltime: i64) -> Self {
        self.default_atime = atime;
        self.default_ltime = ltime;
        self
    }

    /// Switches acquisition to a single `SET name token NX PX ltime_ms` round
    /// trip instead of `SETNX` followed by `EXPIRE`, closing the crash window
    /// between the two (requires Redis >= 2.6.12).
    pub fn with_single_command_acquire(mut self, enabled: bool) -> Self {
        self.single_command_acquire = enabled;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Acquires using this mutex's default `atime`/`ltime`.
    pub fn acquire<C: ConnectionLike>(&self, con: &mut C, token: &[u8]) -> Result<(), MutexError> {
        self.acquire_with(con, token, self.default_atime, self.default_ltime)
    }

    /// Attempts `SETNX name token` (or the single-command form), retrying every
    /// [`Mutex::retry_interval`] until `atime` seconds of cumulative waiting
    /// elapse.
    pub fn acquire_with<C: ConnectionLike>(
        &self,
        con: &mut C,
        token: &[u8],
        atime: f64,
        ltime: i64,
    ) -> Result<(), MutexError> {
        if ltime < 1 {
            return Err(MutexError::InvalidTtl);
        }
        let start = Instant::now();
        let budget = Duration::from_secs_f64(atime.max(0.0));
        loop {
            let acquired = if self.single_command_acquire {
                self.try_set_nx_px(con, token, ltime)?
            } else {
                self.try_setnx_then_expire(con, token, ltime)?
            };
            if acquired {
                #[cfg(feature = "log")]
                log::debug!("acquired mutex '{}'", self.name);
                return Ok(());
            }
            let elapsed = start.elapsed();
            if elapsed >= budget {
                #[cfg(feature = "log")]
                log::debug!("timed out acquiring mutex '{}' after {:?}", self.name, elapsed);
                return Err(MutexError::Timeout(self.name.clone()));
            }
            let remaining = budget - elapsed;
            let wait = self.retry_interval.min(remaining);
            #[cfg(feature = "log")]
            log::trace!("failed to acquire mutex '{}', retrying in {:?}", self.name, wait);
            std::thread::sleep(wait);
        }
    }

    fn try_setnx_then_expire<C: ConnectionLike>(
        &self,
        con: &mut C,
        token: &[u8],
        ltime: i64,
    ) -> Result<bool, MutexError> {
        let mut setnx = cmd("SETNX");
        setnx.arg(&self.name).arg(token);
        let acquired = bool::from_redis_value(&con.req_command(&setnx)?)?;
        if acquired {
            let mut expire = cmd("EXPIRE");
            expire.arg(&self.name).arg(ltime);
            con.req_command(&expire)?;
        }
        Ok(acquired)
    }

    fn try_set_nx_px<C: ConnectionLike>(
        &self,
        con: &mut C,
        token: &[u8],
        ltime: i64,
    ) -> Result<bool, MutexError> {
        let mut set = cmd("SET");
        set.arg(&self.name).arg(token).arg("NX").arg("PX").arg(ltime * 1000);
        match con.req_command(&set)? {
            Value::Okay => Ok(true),
            Value::Nil => Ok(false),
            other => Err(MutexError::Redis(unexpected(&other, "OK or nil in reply to SET NX PX"))),
        }
    }

    /// Releases the lock if and only if it is still held by `token`. Releasing
    /// a lock owned by someone else (or already expired) is a silent no-op.
    pub fn release<C: ConnectionLike>(&self, con: &mut C, token: &[u8]) -> Result<(), MutexError> {
        let _deleted: i64 = self
            .release_script
            .prepare_invoke()
            .key(&self.name)
            .arg(token)
            .invoke(con)?;
        Ok(())
    }

    /// Scoped acquire/release: releases on every exit path out of `body`,
    /// including `body` returning an error.
    pub fn with_mutex<C: ConnectionLike, T>(
        &self,
        con: &mut C,
        token: &[u8],
        body: impl FnOnce(&mut C) -> RedisResult<T>,
    ) -> Result<T, MutexError> {
        self.acquire(con, token)?;
        let result = body(con);
        let release_result = self.release(con, token);
        match result {
            Ok(value) => {
                release_result?;
                Ok(value)
            }
            Err(err) => {
                let _ = release_result;
                Err(MutexError::Redis(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockConnection;

    #[test]
    fn invalid_ltime_is_rejected_locally() {
        let mutex = Mutex::new("L");
        let mut con = MockConnection::new();
        let err = mutex.acquire_with(&mut con, b"T1", 1.0, 0).unwrap_err();
        assert!(matches!(err, MutexError::InvalidTtl));
    }

    #[test]
    fn acquires_on_first_try_then_sets_expiry() {
        let mutex = Mutex::new("L");
        let mut con = MockConnection::new();
        con.expect("*3\r\n$5\r\nSETNX\r\n$1\r\nL\r\n$2\r\nT1\r\n", ":1\r\n");
        con.expect("*3\r\n$6\r\nEXPIRE\r\n$1\r\nL\r\n$2\r\n10\r\n", ":1\r\n");
        mutex.acquire_with(&mut con, b"T1", 5.0, 10).unwrap();
    }

    #[test]
    fn single_command_acquire_uses_set_nx_px() {
        let mutex = Mutex::new("L").with_single_command_acquire(true);
        let mut con = MockConnection::new();
        con.expect(
            "*6\r\n$3\r\nSET\r\n$1\r\nL\r\n$2\r\nT1\r\n$2\r\nNX\r\n$2\r\nPX\r\n$5\r\n10000\r\n",
            "+OK\r\n",
        );
        mutex.acquire_with(&mut con, b"T1", 5.0, 10).unwrap();
    }

    #[test]
    fn release_runs_compare_and_delete_script() {
        let mutex = Mutex::new("L");
        let mut con = MockConnection::new();
        let expected = format!(
            "*5\r\n$7\r\nEVALSHA\r\n${}\r\n{}\r\n$1\r\n1\r\n$1\r\nL\r\n$2\r\nT1\r\n",
            mutex.release_script.hash().len(),
            mutex.release_script.hash()
        );
        con.expect(&expected, ":1\r\n");
        mutex.release(&mut con, b"T1").unwrap();
    }
}
