//! MULTI/EXEC/DISCARD/WATCH state tracking.
//!
//! [`Transaction`] borrows a connection for its lifetime. While queueing,
//! [`Transaction::queue_cmd`] is the one place that reads the server's `QUEUED`
//! status — individual command wrappers in [`crate::commands`] are never
//! MULTI-aware themselves; building a transaction means routing commands
//! through `queue_cmd` instead of calling the plain wrappers.

use crate::cmd::{cmd, Cmd};
use crate::connection::ConnectionLike;
use crate::types::{fail, unexpected, ErrorKind, RedisResult, ToRedisArgs, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Idle,
    Queueing,
    Aborted,
}

/// Issues `WATCH` on the given keys. Only valid while no transaction is open on
/// this connection (Redis itself rejects `WATCH` inside `MULTI`, so this is
/// exposed as a free function on the plain connection rather than a
/// `Transaction` method).
pub fn watch<C: ConnectionLike, K: ToRedisArgs>(con: &mut C, keys: K) -> RedisResult<()> {
    let mut c = cmd("WATCH");
    c.arg(keys);
    match con.req_command(&c)? {
        Value::Okay => Ok(()),
        other => Err(unexpected(&other, "OK in reply to WATCH")),
    }
}

/// Issues `UNWATCH`, clearing any keys previously marked with [`watch`].
pub fn unwatch<C: ConnectionLike>(con: &mut C) -> RedisResult<()> {
    match con.req_command(&cmd("UNWATCH"))? {
        Value::Okay => Ok(()),
        other => Err(unexpected(&other, "OK in reply to UNWATCH")),
    }
}

/// A MULTI block in progress on a borrowed connection.
pub struct Transaction<'a, C: ConnectionLike> {
    con: &'a mut C,
    state: TransactionState,
    queued: usize,
}

impl<'a, C: ConnectionLike> Transaction<'a, C> {
    /// Sends `MULTI` and starts tracking queued commands.
    pub fn begin(con: &'a mut C) -> RedisResult<Self> {
        match con.req_command(&cmd("MULTI"))? {
            Value::Okay => Ok(Transaction {
                con,
                state: TransactionState::Queueing,
                queued: 0,
            }),
            other => Err(unexpected(&other, "OK in reply to MULTI")),
        }
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// The number of commands successfully queued so far.
    pub fn queued_len(&self) -> usize {
        self.queued
    }

    /// Sends one already-built command and consumes the `QUEUED` status reply.
    /// A non-`QUEUED` reply or a transport error aborts the transaction; the
    /// next `exec` call is then rejected locally without touching the socket.
    pub fn queue_cmd(&mut self, cmd: &Cmd) -> RedisResult<()> {
        match self.state {
            TransactionState::Aborted => fail!((
                ErrorKind::ExecAbortError,
                "Transaction already aborted by a previous failure"
            )),
            TransactionState::Idle => fail!((
                ErrorKind::ClientError,
                "queue_cmd called without an open MULTI block"
            )),
            TransactionState::Queueing => {}
        }

        match self.con.req_command(cmd) {
            Ok(Value::Status(ref s)) if s == "QUEUED" => {
                self.queued += 1;
                Ok(())
            }
            Ok(other) => {
                self.state = TransactionState::Aborted;
                Err(unexpected(&other, "QUEUED in reply to a command inside MULTI"))
            }
            Err(err) => {
                self.state = TransactionState::Aborted;
                Err(err)
            }
        }
    }

    /// Sends `EXEC`. Returns `Some(replies)` in queued order on success, `None`
    /// if a watched key changed (the server's null-array abort sentinel), and
    /// transitions to `Aborted` — rejecting the caller locally — if the
    /// transaction had already failed to queue a command or the server itself
    /// replies `EXECABORT`.
    pub fn exec(mut self) -> RedisResult<Option<Vec<Value>>> {
        if self.state == TransactionState::Aborted {
            fail!((
                ErrorKind::ExecAbortError,
                "EXEC rejected locally: a previous queue_cmd call aborted this transaction"
            ));
        }
        match self.con.req_command(&cmd("EXEC")) {
            Ok(Value::Nil) => {
                self.state = TransactionState::Idle;
                Ok(None)
            }
            Ok(Value::Bulk(items)) => {
                self.state = TransactionState::Idle;
                Ok(Some(items))
            }
            Ok(other) => Err(unexpected(&other, "an array (or nil) in reply to EXEC")),
            Err(err) => {
                self.state = TransactionState::Aborted;
                Err(err)
            }
        }
    }

    /// Sends `DISCARD`, dropping all queued commands without executing them.
    pub fn discard(mut self) -> RedisResult<()> {
        match self.con.req_command(&cmd("DISCARD"))? {
            Value::Okay => {
                self.state = TransactionState::Idle;
                Ok(())
            }
            other => Err(unexpected(&other, "OK in reply to DISCARD")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockConnection;

    #[test]
    fn queues_and_execs_in_order() {
        let mut con = MockConnection::new();
        con.expect("*1\r\n$5\r\nMULTI\r\n", "+OK\r\n");
        con.expect("*3\r\n$3\r\nSET\r\n$1\r\na\r\n$1\r\n1\r\n", "+QUEUED\r\n");
        con.expect("*3\r\n$3\r\nSET\r\n$1\r\nb\r\n$1\r\n2\r\n", "+QUEUED\r\n");
        con.expect("*1\r\n$4\r\nEXEC\r\n", "*2\r\n+OK\r\n+OK\r\n");

        let mut txn = Transaction::begin(&mut con).unwrap();
        assert_eq!(txn.state(), TransactionState::Queueing);
        let mut set_a = cmd("SET");
        set_a.arg("a").arg("1");
        txn.queue_cmd(&set_a).unwrap();
        let mut set_b = cmd("SET");
        set_b.arg("b").arg("2");
        txn.queue_cmd(&set_b).unwrap();
        assert_eq!(txn.queued_len(), 2);
        let replies = txn.exec().unwrap().unwrap();
        assert_eq!(replies, vec![Value::Okay, Value::Okay]);
    }

    #[test]
    fn discard_leaves_queued_commands_unexecuted() {
        let mut con = MockConnection::new();
        con.expect("*1\r\n$5\r\nMULTI\r\n", "+OK\r\n");
        con.expect("*3\r\n$3\r\nSET\r\n$1\r\na\r\n$1\r\n1\r\n", "+QUEUED\r\n");
        con.expect("*1\r\n$7\r\nDISCARD\r\n", "+OK\r\n");

        let mut txn = Transaction::begin(&mut con).unwrap();
        let mut set_a = cmd("SET");
        set_a.arg("a").arg("1");
        txn.queue_cmd(&set_a).unwrap();
        txn.discard().unwrap();
    }

    #[test]
    fn watch_conflict_surfaces_as_none_not_error() {
        let mut con = MockConnection::new();
        con.expect("*1\r\n$5\r\nMULTI\r\n", "+OK\r\n");
        con.expect("*3\r\n$3\r\nSET\r\n$1\r\na\r\n$1\r\n1\r\n", "+QUEUED\r\n");
        con.expect("*1\r\n$4\r\nEXEC\r\n", "*-1\r\n");

        let mut txn = Transaction::begin(&mut con).unwrap();
        let mut set_a = cmd("SET");
        set_a.arg("a").arg("1");
        txn.queue_cmd(&set_a).unwrap();
        assert_eq!(txn.exec().unwrap(), None);
    }

    #[test]
    fn execabort_transitions_to_aborted_and_rejects_next_exec() {
        let mut con = MockConnection::new();
        con.expect("*1\r\n$5\r\nMULTI\r\n", "+OK\r\n");
        con.expect(
            "*2\r\n$7\r\nBOGUSCMD\r\n$1\r\na\r\n",
            "-ERR unknown command 'BOGUSCMD'\r\n",
        );

        let mut txn = Transaction::begin(&mut con).unwrap();
        let mut bad = cmd("BOGUSCMD");
        bad.arg("a");
        assert!(txn.queue_cmd(&bad).is_err());
        assert_eq!(txn.state(), TransactionState::Aborted);
        let err = txn.exec().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExecAbortError);
    }
}
