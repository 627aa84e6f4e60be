use crate::dns::forwarding::{MessageBuilder, ResponseParser};
use crate::dns::load_balancer::ProxyPool;
use dns_forward_domain::{DomainError, Protocol};
use hickory_proto::op::ResponseCode;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Turns raw client queries into raw replies using a forwarding pool.
///
/// Every query gets exactly one reply, except cancelled ones which get none.
#[derive(Clone)]
pub struct DnsServerHandler {
    pool: Arc<ProxyPool>,
}

impl DnsServerHandler {
    pub fn new(pool: Arc<ProxyPool>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Arc<ProxyPool> {
        &self.pool
    }

    pub async fn handle_raw(
        &self,
        query: &[u8],
        client: SocketAddr,
        protocol: Protocol,
        cancel: &CancellationToken,
    ) -> Option<Vec<u8>> {
        let Some(qname) = MessageBuilder::query_name(query) else {
            debug!(client = %client, "Unparseable query");
            return MessageBuilder::build_error_response(query, ResponseCode::FormErr);
        };

        if !self.pool.is_routable(&qname) {
            debug!(domain = %qname, client = %client, "Query outside forwarded zone");
            return MessageBuilder::build_error_response(query, ResponseCode::Refused);
        }

        match self.pool.forward_with(query, protocol, cancel).await {
            Ok(response) => {
                debug!(
                    domain = %qname,
                    client = %client,
                    server = %response.server,
                    rcode = ResponseParser::rcode_to_status(response.rcode),
                    latency_ms = response.latency_ms,
                    "Query forwarded"
                );
                if protocol == Protocol::Udp {
                    let limit = MessageBuilder::max_udp_payload(query);
                    if response.bytes.len() > limit {
                        debug!(
                            domain = %qname,
                            size = response.bytes.len(),
                            limit,
                            "Reply too large for UDP client, sending truncated"
                        );
                        return MessageBuilder::build_truncated_response(&response.bytes)
                            .or_else(|| {
                                MessageBuilder::build_error_response(query, ResponseCode::ServFail)
                            });
                    }
                }
                Some(response.bytes.to_vec())
            }
            Err(DomainError::QueryCancelled) => None,
            Err(e @ DomainError::AdmissionDenied { .. }) => {
                warn!(domain = %qname, client = %client, error = %e, "Query refused");
                MessageBuilder::build_error_response(query, ResponseCode::Refused)
            }
            Err(e) => {
                error!(domain = %qname, client = %client, error = %e, "Query forwarding failed");
                MessageBuilder::build_error_response(query, ResponseCode::ServFail)
            }
        }
    }
}
