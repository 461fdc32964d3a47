//! Lua script loading and invocation (SCRIPT LOAD / EVALSHA / EVAL fallback).

use sha1_smol::Sha1;

use crate::cmd::cmd;
use crate::connection::ConnectionLike;
use crate::types::{ErrorKind, FromRedisValue, RedisResult, ToRedisArgs, Value};

/// A Lua script, keyed by its body's sha1 so `EVALSHA` can be tried before
/// falling back to sending the full script body.
pub struct Script {
    code: String,
    hash: String,
}

impl Script {
    pub fn new(code: &str) -> Script {
        let mut hasher = Sha1::new();
        hasher.update(code.as_bytes());
        Script {
            code: code.to_string(),
            hash: hasher.digest().to_string(),
        }
    }

    /// The sha1 this script will be cached under once loaded.
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Issues `SCRIPT LOAD`, returning the sha1 the server reports (which should
    /// equal [`Script::hash`]).
    pub fn load<C: ConnectionLike>(&self, con: &mut C) -> RedisResult<String> {
        let mut c = cmd("SCRIPT");
        c.arg("LOAD").arg(&self.code);
        String::from_redis_value(&con.req_command(&c)?)
    }

    /// Starts building an invocation with `KEYS`/`ARGV` attached one at a time.
    pub fn prepare_invoke(&self) -> ScriptInvocation<'_> {
        ScriptInvocation {
            script: self,
            keys: Vec::new(),
            args: Vec::new(),
        }
    }

    /// Shorthand for `prepare_invoke().invoke(con)` when the script needs no
    /// keys or extra arguments.
    pub fn invoke<T: FromRedisValue, C: ConnectionLike>(&self, con: &mut C) -> RedisResult<T> {
        self.prepare_invoke().invoke(con)
    }
}

/// A script plus the `KEYS`/`ARGV` it will be invoked with.
pub struct ScriptInvocation<'a> {
    script: &'a Script,
    keys: Vec<Vec<u8>>,
    args: Vec<Vec<u8>>,
}

impl<'a> ScriptInvocation<'a> {
    pub fn key<T: ToRedisArgs>(mut self, key: T) -> Self {
        key.write_redis_args(&mut self.keys);
        self
    }

    pub fn arg<T: ToRedisArgs>(mut self, arg: T) -> Self {
        arg.write_redis_args(&mut self.args);
        self
    }

    fn build(&self, command: &str) -> crate::cmd::Cmd {
        let mut c = cmd(command);
        c.arg(match command {
            "EVALSHA" => self.script.hash.as_str(),
            _ => self.script.code.as_str(),
        });
        c.arg(self.keys.len());
        for key in &self.keys {
            c.arg(key.clone());
        }
        for arg in &self.args {
            c.arg(arg.clone());
        }
        c
    }

    /// Tries `EVALSHA` first; on `NOSCRIPT` falls back to `EVAL` with the full
    /// script body once.
    pub fn invoke<T: FromRedisValue, C: ConnectionLike>(&self, con: &mut C) -> RedisResult<T> {
        match con.req_command(&self.build("EVALSHA")) {
            Ok(value) => T::from_redis_value(&value),
            Err(err) if err.kind() == ErrorKind::NoScriptError => {
                let value = con.req_command(&self.build("EVAL"))?;
                T::from_redis_value(&value)
            }
            Err(err) => Err(err),
        }
    }

    /// Like [`ScriptInvocation::invoke`] but returns the raw [`Value`] instead of
    /// decoding it, for scripts whose reply shape varies by caller.
    pub fn invoke_raw<C: ConnectionLike>(&self, con: &mut C) -> RedisResult<Value> {
        match con.req_command(&self.build("EVALSHA")) {
            Ok(value) => Ok(value),
            Err(err) if err.kind() == ErrorKind::NoScriptError => con.req_command(&self.build("EVAL")),
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockConnection;

    #[test]
    fn hash_is_stable_sha1_of_body() {
        let script = Script::new("return 1");
        assert_eq!(script.hash().len(), 40);
        assert_eq!(Script::new("return 1").hash(), script.hash());
        assert_ne!(Script::new("return 2").hash(), script.hash());
    }

    #[test]
    fn invoke_uses_evalsha_when_cached() {
        let script = Script::new("return 1");
        let mut con = MockConnection::new();
        let expected = format!(
            "*3\r\n$7\r\nEVALSHA\r\n${}\r\n{}\r\n$1\r\n0\r\n",
            script.hash().len(),
            script.hash()
        );
        con.expect(&expected, ":1\r\n");
        let v: i64 = script.invoke(&mut con).unwrap();
        assert_eq!(v, 1);
    }

    #[test]
    fn falls_back_to_eval_on_noscript() {
        let script = Script::new("return ARGV[1]");
        let mut con = MockConnection::new();
        let evalsha_req = format!(
            "*4\r\n$7\r\nEVALSHA\r\n${}\r\n{}\r\n$1\r\n0\r\n$1\r\nx\r\n",
            script.hash().len(),
            script.hash()
        );
        con.expect(&evalsha_req, "-NOSCRIPT No matching script\r\n");
        con.expect(
            "*4\r\n$4\r\nEVAL\r\n$14\r\nreturn ARGV[1]\r\n$1\r\n0\r\n$1\r\nx\r\n",
            "$1\r\nx\r\n",
        );
        let v: String = script.prepare_invoke().arg("x").invoke(&mut con).unwrap();
        assert_eq!(v, "x");
    }
}
