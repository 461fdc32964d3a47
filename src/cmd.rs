//! Builds and encodes a single RESP request.

use crate::types::ToRedisArgs;

/// Encodes a request as a RESP array of bulk strings: `*N\r\n` followed by one
/// `$len\r\n<bytes>\r\n` per argument. Argument bytes are written verbatim, so
/// binary payloads round-trip unmodified.
pub fn pack_command(args: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    out.push(b'*');
    let mut buf = itoa::Buffer::new();
    out.extend_from_slice(buf.format(args.len()).as_bytes());
    out.extend_from_slice(b"\r\n");
    for arg in args {
        out.push(b'$');
        out.extend_from_slice(buf.format(arg.len()).as_bytes());
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(arg);
        out.extend_from_slice(b"\r\n");
    }
    out
}

/// A single Redis command under construction.
///
/// Build one with [`cmd`], add arguments with [`Cmd::arg`], then either hand it
/// to a connection's `req_command` or call [`Cmd::get_packed_command`] directly.
#[derive(Clone, Debug, Default)]
pub struct Cmd {
    args: Vec<Vec<u8>>,
}

impl Cmd {
    /// Starts building a command with the given command name as its first
    /// argument (e.g. `Cmd::new("GET")`).
    pub fn new(name: &str) -> Self {
        let mut cmd = Cmd { args: Vec::new() };
        cmd.args.push(name.as_bytes().to_vec());
        cmd
    }

    /// Appends one more argument, splicing `Vec`/slice arguments into multiple
    /// wire arguments rather than nesting them.
    pub fn arg<T: ToRedisArgs>(&mut self, arg: T) -> &mut Self {
        arg.write_redis_args(&mut self.args);
        self
    }

    /// The arguments accumulated so far, in wire order, including the command
    /// name as the first element.
    pub fn args(&self) -> &[Vec<u8>] {
        &self.args
    }

    /// Encodes this command as a RESP array ready to write to a socket.
    pub fn get_packed_command(&self) -> Vec<u8> {
        pack_command(&self.args)
    }
}

/// Starts building a command; equivalent to `Cmd::new(name)`.
pub fn cmd(name: &str) -> Cmd {
    Cmd::new(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoding_is_bit_exact() {
        let mut c = cmd("SET");
        c.arg("foo").arg("bar");
        assert_eq!(
            c.get_packed_command(),
            b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n".to_vec()
        );
    }

    #[test]
    fn vec_argument_splices_not_nests() {
        let mut c = cmd("DEL");
        c.arg(vec!["a".to_string(), "b".to_string(), "c".to_string()]);
        assert_eq!(c.args().len(), 4);
        assert_eq!(c.get_packed_command()[..4].to_vec(), b"*4\r\n".to_vec());
    }

    #[test]
    fn integer_argument_is_decimalized() {
        let mut c = cmd("INCRBY");
        c.arg("counter").arg(42i64);
        assert_eq!(
            c.get_packed_command(),
            b"*3\r\n$7\r\nINCRBY\r\n$7\r\ncounter\r\n$2\r\n42\r\n".to_vec()
        );
    }

    #[test]
    fn binary_argument_round_trips_through_encoding() {
        let mut c = cmd("SET");
        let payload = vec![0u8, b'\r', b'\n', 255];
        c.arg("k").arg(payload.clone());
        let packed = c.get_packed_command();
        let mut cur = std::io::Cursor::new(&packed[..]);
        let v = crate::parser::read_frame(&mut cur);
        // packed command is itself a valid RESP array frame
        assert!(v.is_ok());
    }
}
