//! TCP node connection on top of the `redis` client.
//!
//! Each command opens a fresh connection, sends the request, reads one
//! reply and closes. Connect, read and write are each bounded by the
//! configured timeout.

use std::time::Duration;

use redis::{Client, Connection, ConnectionAddr, ConnectionInfo, ConnectionLike, RedisConnectionInfo};

use crate::error::ConnectionError;
use crate::node::{NodeAddress, NodeConnection};
use crate::reply::ReplyValue;

/// Default per-call timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// Node reachable over TCP.
#[derive(Debug, Clone)]
pub struct TcpNode {
    address: NodeAddress,
    timeout: Duration,
}

impl TcpNode {
    pub fn new(address: NodeAddress, timeout: Duration) -> Self {
        Self { address, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn connection_info(&self) -> ConnectionInfo {
        ConnectionInfo {
            addr: ConnectionAddr::Tcp(self.address.host.clone(), self.address.port),
            redis: RedisConnectionInfo::default(),
        }
    }

    fn connect(&self) -> Result<Connection, ConnectionError> {
        let node = self.address.id();
        let client = Client::open(self.connection_info())
            .map_err(|e| ConnectionError::from_redis(&node, e))?;
        let con = client
            .get_connection_with_timeout(self.timeout)
            .map_err(|e| ConnectionError::from_redis(&node, e))?;
        con.set_read_timeout(Some(self.timeout))
            .and_then(|_| con.set_write_timeout(Some(self.timeout)))
            .map_err(|e| ConnectionError::from_redis(&node, e))?;
        Ok(con)
    }
}

impl NodeConnection for TcpNode {
    fn address(&self) -> &NodeAddress {
        &self.address
    }

    fn command(&self, args: &[&str]) -> Result<ReplyValue, ConnectionError> {
        let Some((name, rest)) = args.split_first() else {
            return Err(ConnectionError::Protocol {
                node: self.address.id(),
                message: "empty command".to_string(),
            });
        };
        let mut con = self.connect()?;
        let mut cmd = redis::cmd(name);
        cmd.arg(rest);

        // Error replies come back as values so `exec` can show them.
        let value = con
            .req_command(&cmd)
            .map_err(|e| ConnectionError::from_redis(&self.address.id(), e))?;
        let reply = ReplyValue::from(value);
        log::debug!("{}: {} -> {}", self.address, name, reply.kind());
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;

    /// Serve one connection: read the request, answer with `reply`.
    fn serve_once(reply: &'static [u8]) -> NodeAddress {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut header = String::new();
            reader.read_line(&mut header).unwrap();
            let argc: usize = header.trim()[1..].parse().unwrap();
            for _ in 0..argc * 2 {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
            }
            let mut stream = stream;
            stream.write_all(reply).unwrap();
            let mut rest = Vec::new();
            let _ = reader.read_to_end(&mut rest);
        });
        NodeAddress::new("127.0.0.1", port)
    }

    /// Like `serve_once`, but closes the socket right after the reply.
    fn serve_and_close(reply: &'static [u8]) -> NodeAddress {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 256];
            let _ = stream.read(&mut buf);
            let _ = stream.write_all(reply);
        });
        NodeAddress::new("127.0.0.1", port)
    }

    #[test]
    fn test_command_round_trip() {
        let addr = serve_once(b"+PONG\r\n");
        let node = TcpNode::new(addr, DEFAULT_TIMEOUT);
        assert_eq!(node.command(&["PING"]).unwrap(), ReplyValue::Status("PONG".into()));
    }

    #[test]
    fn test_info_over_tcp() {
        let addr = serve_once(b"$31\r\n# Server\r\nredis_version:7.2.4\r\n\r\n");
        let node = TcpNode::new(addr, DEFAULT_TIMEOUT);
        let text = node.info().unwrap();
        assert!(text.contains("redis_version:7.2.4"));
    }

    #[test]
    fn test_error_reply_is_a_value() {
        let addr = serve_once(b"-ERR unknown command 'NOPE'\r\n");
        let node = TcpNode::new(addr, DEFAULT_TIMEOUT);
        assert_eq!(
            node.command(&["NOPE"]).unwrap(),
            ReplyValue::Error("ERR unknown command 'NOPE'".into())
        );
    }

    #[test]
    fn test_resp3_reply_types() {
        let addr = serve_once(b"%2\r\n+ok\r\n#t\r\n+pi\r\n,3.5\r\n");
        let node = TcpNode::new(addr, DEFAULT_TIMEOUT);
        assert_eq!(
            node.command(&["HELLO"]).unwrap(),
            ReplyValue::Map(vec![
                ("ok".into(), ReplyValue::Bool(true)),
                ("pi".into(), ReplyValue::Double(3.5)),
            ])
        );
    }

    #[test]
    fn test_oversized_bulk_header_is_an_error() {
        let addr = serve_and_close(b"$9223372036854775807\r\nabc");
        let node = TcpNode::new(addr, Duration::from_millis(500));
        assert!(node.command(&["GET", "k"]).is_err());
    }

    #[test]
    fn test_oversized_array_header_is_an_error() {
        let addr = serve_and_close(b"*9223372036854775807\r\n:1\r\n");
        let node = TcpNode::new(addr, Duration::from_millis(500));
        assert!(node.command(&["KEYS", "*"]).is_err());
    }

    #[test]
    fn test_refused_connection_is_connection_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let node = TcpNode::new(NodeAddress::new("127.0.0.1", port), Duration::from_millis(200));
        let err = node.command(&["PING"]).unwrap_err();
        assert!(matches!(err, ConnectionError::Io { .. }));
        assert_eq!(err.node(), format!("127.0.0.1:{port}"));
    }

    #[test]
    fn test_silent_node_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            std::thread::sleep(Duration::from_millis(400));
            drop(stream);
        });
        let node = TcpNode::new(NodeAddress::new("127.0.0.1", port), Duration::from_millis(100));
        let err = node.command(&["PING"]).unwrap_err();
        assert!(matches!(err, ConnectionError::Timeout { .. }));
        handle.join().unwrap();
    }

    #[test]
    fn test_empty_command_rejected() {
        let node = TcpNode::new(NodeAddress::new("127.0.0.1", 1), DEFAULT_TIMEOUT);
        assert!(matches!(
            node.command(&[]).unwrap_err(),
            ConnectionError::Protocol { .. }
        ));
    }
}
