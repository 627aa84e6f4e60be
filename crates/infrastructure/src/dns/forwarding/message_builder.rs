//! DNS Message Builder
//!
//! Constructs the few messages the forwarder originates itself using
//! `hickory-proto`: health-check queries and error replies to clients.

use dns_forward_domain::DomainError;
use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::{Name, RecordType};

/// Reply size every UDP client accepts, EDNS or not (RFC 1035 §2.3.4).
pub const MIN_UDP_PAYLOAD: usize = 512;

/// Builds DNS messages in wire format
pub struct MessageBuilder;

impl MessageBuilder {
    /// Build the health-check query: `. IN NS` with a random ID.
    ///
    /// `recursion_desired` controls the RD bit; `health_check ... no_rec`
    /// clears it.
    pub fn build_health_query(recursion_desired: bool) -> Result<Vec<u8>, DomainError> {
        let mut message = Message::new();
        message
            .set_id(fastrand::u16(..))
            .set_message_type(MessageType::Query)
            .set_op_code(OpCode::Query)
            .set_recursion_desired(recursion_desired)
            .add_query(Query::query(Name::root(), RecordType::NS));

        Self::serialize_message(&message)
    }

    /// Build a reply carrying only `rcode` for a client query.
    ///
    /// The question section and RD bit are echoed back. `None` when the query
    /// cannot be parsed at all.
    pub fn build_error_response(query_bytes: &[u8], rcode: ResponseCode) -> Option<Vec<u8>> {
        let query = Message::from_vec(query_bytes).ok()?;

        let mut response = Message::error_msg(query.id(), query.op_code(), rcode);
        response
            .set_recursion_desired(query.recursion_desired())
            .set_recursion_available(true)
            .add_queries(query.queries().iter().cloned());

        Self::serialize_message(&response).ok()
    }

    /// Largest reply the client takes over UDP: its EDNS payload size, never
    /// below 512.
    pub fn max_udp_payload(query_bytes: &[u8]) -> usize {
        Message::from_vec(query_bytes)
            .ok()
            .and_then(|query| {
                query
                    .extensions()
                    .as_ref()
                    .map(|edns| edns.max_payload() as usize)
            })
            .map_or(MIN_UDP_PAYLOAD, |size| size.max(MIN_UDP_PAYLOAD))
    }

    /// Cuts a reply down to header, question and OPT record with TC set, so
    /// the client retries over TCP.
    pub fn build_truncated_response(response_bytes: &[u8]) -> Option<Vec<u8>> {
        let full = Message::from_vec(response_bytes).ok()?;

        let mut truncated = Message::new();
        truncated
            .set_id(full.id())
            .set_message_type(MessageType::Response)
            .set_op_code(full.op_code())
            .set_authoritative(full.authoritative())
            .set_truncated(true)
            .set_recursion_desired(full.recursion_desired())
            .set_recursion_available(full.recursion_available())
            .set_response_code(full.response_code())
            .add_queries(full.queries().iter().cloned());
        if let Some(edns) = full.extensions() {
            truncated.set_edns(edns.clone());
        }

        Self::serialize_message(&truncated).ok()
    }

    /// First question name of a client query, as an FQDN.
    pub fn query_name(query_bytes: &[u8]) -> Option<String> {
        let query = Message::from_vec(query_bytes).ok()?;
        query.queries().first().map(|q| q.name().to_ascii())
    }

    fn serialize_message(message: &Message) -> Result<Vec<u8>, DomainError> {
        message.to_vec().map_err(|e| {
            DomainError::InvalidDnsQuery(format!("Failed to serialize DNS message: {}", e))
        })
    }
}
