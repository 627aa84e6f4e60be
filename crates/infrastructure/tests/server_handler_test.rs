use dns_forward_domain::{ForwardConfig, Protocol};
use dns_forward_infrastructure::{DnsServerHandler, ProxyPool};
use hickory_proto::op::{Message, ResponseCode};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

mod helpers;
use helpers::{
    closed_port_addr, ForwardConfigBuilder, MockBehavior, MockDnsServer, QueryBuilder,
    LARGE_ANSWER_RECORDS,
};

fn client() -> SocketAddr {
    "127.0.0.1:5353".parse().unwrap()
}

async fn handler_for(config: &ForwardConfig) -> DnsServerHandler {
    DnsServerHandler::new(Arc::new(ProxyPool::from_config(config).await.unwrap()))
}

#[tokio::test]
async fn test_answer_is_relayed_verbatim() {
    let server = MockDnsServer::start(MockBehavior::Answer).await.unwrap();
    let handler = handler_for(&ForwardConfigBuilder::new().upstream(server.addr()).build()).await;

    let query = QueryBuilder::with_id("example.org.", 7);
    let reply = handler
        .handle_raw(&query, client(), Protocol::Udp, &CancellationToken::new())
        .await
        .unwrap();

    let message = Message::from_vec(&reply).unwrap();
    assert_eq!(message.id(), 7);
    assert_eq!(message.response_code(), ResponseCode::NoError);
}

#[tokio::test]
async fn test_unreachable_upstreams_give_servfail() {
    let handler =
        handler_for(&ForwardConfigBuilder::new().upstream(closed_port_addr()).build()).await;

    let query = QueryBuilder::with_id("example.org.", 9);
    let reply = handler
        .handle_raw(&query, client(), Protocol::Udp, &CancellationToken::new())
        .await
        .unwrap();

    let message = Message::from_vec(&reply).unwrap();
    assert_eq!(message.id(), 9);
    assert_eq!(message.response_code(), ResponseCode::ServFail);
    assert_eq!(message.queries().len(), 1);
}

#[tokio::test]
async fn test_out_of_zone_query_is_refused() {
    let server = MockDnsServer::start(MockBehavior::Answer).await.unwrap();
    let directive = format!("forward example.org {} {{\nhealth_check 0\n}}", server.addr());
    let handler = handler_for(&ForwardConfig::from_directive(&directive).unwrap()).await;

    let reply = handler
        .handle_raw(
            &QueryBuilder::a("example.net."),
            client(),
            Protocol::Udp,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let message = Message::from_vec(&reply).unwrap();
    assert_eq!(message.response_code(), ResponseCode::Refused);
    assert_eq!(server.total_queries(), 0);
}

#[tokio::test]
async fn test_cancelled_query_gets_no_reply() {
    let server = MockDnsServer::start(MockBehavior::Silent).await.unwrap();
    let handler = handler_for(&ForwardConfigBuilder::new().upstream(server.addr()).build()).await;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let reply = handler
        .handle_raw(&QueryBuilder::a("example.org."), client(), Protocol::Udp, &cancel)
        .await;

    assert!(reply.is_none());
}

#[tokio::test]
async fn test_garbage_gets_no_reply() {
    let server = MockDnsServer::start(MockBehavior::Answer).await.unwrap();
    let handler = handler_for(&ForwardConfigBuilder::new().upstream(server.addr()).build()).await;

    let reply = handler
        .handle_raw(&[0xde, 0xad], client(), Protocol::Udp, &CancellationToken::new())
        .await;

    assert!(reply.is_none());
    assert_eq!(server.total_queries(), 0);
}

#[tokio::test]
async fn test_oversized_reply_is_truncated_for_udp_client() {
    let server = MockDnsServer::start(MockBehavior::TruncateLarge).await.unwrap();
    let handler = handler_for(&ForwardConfigBuilder::new().upstream(server.addr()).build()).await;

    let query = QueryBuilder::with_id("example.org.", 21);
    let reply = handler
        .handle_raw(&query, client(), Protocol::Udp, &CancellationToken::new())
        .await
        .unwrap();

    assert!(reply.len() <= 512, "reply is {} bytes", reply.len());
    let message = Message::from_vec(&reply).unwrap();
    assert_eq!(message.id(), 21);
    assert!(message.truncated());
    assert!(message.answers().is_empty());
    assert_eq!(message.queries().len(), 1);
    assert_eq!(server.tcp_queries(), 1);
}

#[tokio::test]
async fn test_large_reply_fits_advertised_edns_size() {
    let server = MockDnsServer::start(MockBehavior::TruncateLarge).await.unwrap();
    let handler = handler_for(&ForwardConfigBuilder::new().upstream(server.addr()).build()).await;

    let query = QueryBuilder::with_edns("example.org.", 22, 4096);
    let reply = handler
        .handle_raw(&query, client(), Protocol::Udp, &CancellationToken::new())
        .await
        .unwrap();

    let message = Message::from_vec(&reply).unwrap();
    assert!(!message.truncated());
    assert_eq!(message.answers().len(), LARGE_ANSWER_RECORDS as usize);
}

#[tokio::test]
async fn test_large_reply_is_relayed_whole_to_tcp_client() {
    let server = MockDnsServer::start(MockBehavior::TruncateLarge).await.unwrap();
    let handler = handler_for(&ForwardConfigBuilder::new().upstream(server.addr()).build()).await;

    let query = QueryBuilder::with_id("example.org.", 23);
    let reply = handler
        .handle_raw(&query, client(), Protocol::Tcp, &CancellationToken::new())
        .await
        .unwrap();

    assert!(reply.len() > 512);
    let message = Message::from_vec(&reply).unwrap();
    assert_eq!(message.answers().len(), LARGE_ANSWER_RECORDS as usize);
    assert_eq!(server.udp_queries(), 0);
}
