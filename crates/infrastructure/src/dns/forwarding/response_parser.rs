use bytes::Bytes;
use dns_forward_domain::DomainError;
use hickory_proto::op::{Message, MessageType, ResponseCode};
use std::net::SocketAddr;
use tracing::debug;

/// An upstream reply that passed validation; `bytes` are relayed untouched.
#[derive(Debug, Clone)]
pub struct DnsResponse {
    pub bytes: Bytes,

    pub rcode: ResponseCode,

    pub truncated: bool,
}

impl DnsResponse {
    pub fn is_server_error(&self) -> bool {
        matches!(
            self.rcode,
            ResponseCode::ServFail | ResponseCode::Refused | ResponseCode::NotImp
        )
    }
}

pub struct ResponseParser;

impl ResponseParser {
    /// Checks that `response_bytes` answer the query carrying `query_id`: the
    /// message parses, the IDs match and the QR bit is set.
    pub fn validate(
        query_id: u16,
        response_bytes: Bytes,
        server: SocketAddr,
    ) -> Result<DnsResponse, DomainError> {
        let message = Message::from_vec(&response_bytes).map_err(|e| {
            DomainError::InvalidDnsResponse(format!("{}: failed to parse response: {}", server, e))
        })?;

        if message.id() != query_id {
            return Err(DomainError::InvalidDnsResponse(format!(
                "{}: ID mismatch (expected {}, got {})",
                server,
                query_id,
                message.id()
            )));
        }

        if message.message_type() != MessageType::Response {
            return Err(DomainError::InvalidDnsResponse(format!(
                "{}: reply is not a response",
                server
            )));
        }

        let rcode = message.response_code();
        let truncated = message.truncated();

        debug!(
            server = %server,
            rcode = ?rcode,
            truncated = truncated,
            answers = message.answers().len(),
            "DNS response validated"
        );

        Ok(DnsResponse {
            bytes: response_bytes,
            rcode,
            truncated,
        })
    }

    /// Transaction ID of a wire-format message.
    pub fn message_id(message_bytes: &[u8]) -> Option<u16> {
        match message_bytes {
            [hi, lo, ..] => Some(u16::from_be_bytes([*hi, *lo])),
            _ => None,
        }
    }

    pub fn rcode_to_status(rcode: ResponseCode) -> &'static str {
        match rcode {
            ResponseCode::NoError => "NOERROR",
            ResponseCode::NXDomain => "NXDOMAIN",
            ResponseCode::ServFail => "SERVFAIL",
            ResponseCode::Refused => "REFUSED",
            ResponseCode::NotImp => "NOTIMP",
            ResponseCode::FormErr => "FORMERR",
            _ => "UNKNOWN",
        }
    }
}
