//! A scripted, in-memory [`ConnectionLike`] double used by unit tests across the
//! crate in place of a live `redis-server`.

use std::collections::VecDeque;
use std::io::Cursor;

use crate::cmd::Cmd;
use crate::connection::ConnectionLike;
use crate::parser::read_value;
use crate::types::{RedisResult, Value};

pub struct MockConnection {
    expectations: VecDeque<(Vec<u8>, Vec<u8>)>,
    db: i64,
}

impl MockConnection {
    pub fn new() -> Self {
        MockConnection {
            expectations: VecDeque::new(),
            db: 0,
        }
    }

    /// Queues one request/reply pair. `request` and `reply` are the literal
    /// RESP-encoded bytes expected on the wire and to hand back, respectively.
    pub fn expect(&mut self, request: &str, reply: &str) -> &mut Self {
        self.expectations
            .push_back((request.as_bytes().to_vec(), reply.as_bytes().to_vec()));
        self
    }
}

impl Default for MockConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionLike for MockConnection {
    fn req_command(&mut self, cmd: &Cmd) -> RedisResult<Value> {
        let (expected_request, reply) = self
            .expectations
            .pop_front()
            .unwrap_or_else(|| panic!("unexpected command with no queued expectation: {cmd:?}"));
        let actual_request = cmd.get_packed_command();
        assert_eq!(
            actual_request, expected_request,
            "command did not match the queued expectation"
        );
        let mut cursor = Cursor::new(reply);
        read_value(&mut cursor)
    }

    fn get_db(&self) -> i64 {
        self.db
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::cmd;

    #[test]
    fn replies_in_queued_order() {
        let mut con = MockConnection::new();
        con.expect("*1\r\n$4\r\nPING\r\n", "+PONG\r\n");
        con.expect("*1\r\n$4\r\nPING\r\n", "+PONG\r\n");
        assert_eq!(con.req_command(&cmd("PING")).unwrap(), Value::Status("PONG".into()));
        assert_eq!(con.req_command(&cmd("PING")).unwrap(), Value::Status("PONG".into()));
    }

    #[test]
    #[should_panic(expected = "unexpected command")]
    fn panics_when_expectations_exhausted() {
        let mut con = MockConnection::new();
        let _ = con.req_command(&cmd("PING"));
    }
}
