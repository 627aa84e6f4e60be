#![allow(dead_code)]
use dns_forward_domain::ForwardConfig;
use hickory_proto::op::{Edns, Message, MessageType, OpCode, Query};
use hickory_proto::rr::{Name, RecordType};
use std::net::SocketAddr;
use std::time::Duration;

pub struct QueryBuilder;

impl QueryBuilder {
    pub fn a(name: &str) -> Vec<u8> {
        Self::with_id(name, fastrand::u16(..))
    }

    pub fn with_id(name: &str, id: u16) -> Vec<u8> {
        let mut message = Message::new();
        message
            .set_id(id)
            .set_message_type(MessageType::Query)
            .set_op_code(OpCode::Query)
            .set_recursion_desired(true)
            .add_query(Query::query(Name::from_ascii(name).unwrap(), RecordType::A));
        message.to_vec().unwrap()
    }

    /// Query carrying an OPT record advertising `payload` bytes.
    pub fn with_edns(name: &str, id: u16, payload: u16) -> Vec<u8> {
        let mut message = Message::from_vec(&Self::with_id(name, id)).unwrap();
        let mut edns = Edns::new();
        edns.set_max_payload(payload);
        message.set_edns(edns);
        message.to_vec().unwrap()
    }
}

/// Builds `forward` directives for tests, with health checking off and a
/// short per-attempt timeout unless told otherwise.
pub struct ForwardConfigBuilder {
    upstreams: Vec<String>,
    options: Vec<String>,
    timeout: Duration,
    health_timeout: Option<Duration>,
}

impl ForwardConfigBuilder {
    pub fn new() -> Self {
        Self {
            upstreams: Vec::new(),
            options: Vec::new(),
            timeout: Duration::from_millis(500),
            health_timeout: None,
        }
    }

    pub fn upstream(mut self, addr: SocketAddr) -> Self {
        self.upstreams.push(addr.to_string());
        self
    }

    pub fn option(mut self, line: &str) -> Self {
        self.options.push(line.to_string());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> ForwardConfig {
        let mut directive = format!("forward . {} {{\n", self.upstreams.join(" "));
        if !self.options.iter().any(|o| o.starts_with("health_check")) {
            directive.push_str("health_check 0\n");
        }
        for option in &self.options {
            directive.push_str(option);
            directive.push('\n');
        }
        directive.push('}');

        let mut config = ForwardConfig::from_directive(&directive).unwrap();
        config.timeout = self.timeout;
        if let Some(timeout) = self.health_timeout {
            config.health_check.timeout = timeout;
        }
        config
    }
}

impl Default for ForwardConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// An address nothing listens on (UDP or TCP).
pub fn closed_port_addr() -> SocketAddr {
    let socket = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
    socket.local_addr().unwrap()
}
