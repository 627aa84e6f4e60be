#![allow(dead_code)]
use hickory_proto::op::Message;
use hickory_proto::rr::rdata::A;
use hickory_proto::rr::{Name, RData, Record};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio_util::sync::CancellationToken;

/// How the mock upstream reacts to queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MockBehavior {
    /// NOERROR reply echoing the question.
    Answer = 0,
    /// TC bit over UDP, full reply over TCP.
    Truncate = 1,
    /// Reads queries and never replies.
    Silent = 2,
    /// Replies with a transaction ID that does not match.
    WrongId = 3,
    /// TC bit over UDP, then an answer over TCP too large for a 512-byte
    /// UDP reply.
    TruncateLarge = 4,
}

/// A records in a `TruncateLarge` TCP answer.
pub const LARGE_ANSWER_RECORDS: u16 = 40;

impl MockBehavior {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Truncate,
            2 => Self::Silent,
            3 => Self::WrongId,
            4 => Self::TruncateLarge,
            _ => Self::Answer,
        }
    }
}

const RD_UNSEEN: u8 = 0;
const RD_CLEAR: u8 = 1;
const RD_SET: u8 = 2;

#[derive(Default)]
struct MockState {
    behavior: AtomicU8,
    udp_queries: AtomicUsize,
    tcp_queries: AtomicUsize,
    tcp_connections: AtomicUsize,
    last_rd: AtomicU8,
}

impl MockState {
    fn behavior(&self) -> MockBehavior {
        MockBehavior::from_u8(self.behavior.load(Ordering::SeqCst))
    }

    fn record_rd(&self, query: &[u8]) {
        if query.len() > 2 {
            let rd = if query[2] & 0x01 == 0x01 { RD_SET } else { RD_CLEAR };
            self.last_rd.store(rd, Ordering::SeqCst);
        }
    }
}

/// In-process upstream answering on the same port over UDP and TCP.
pub struct MockDnsServer {
    addr: SocketAddr,
    state: Arc<MockState>,
    shutdown: CancellationToken,
}

impl MockDnsServer {
    pub async fn start(behavior: MockBehavior) -> Result<Self, std::io::Error> {
        let (udp, tcp) = Self::bind_pair().await?;
        let addr = udp.local_addr()?;

        let state = Arc::new(MockState::default());
        state.behavior.store(behavior as u8, Ordering::SeqCst);
        let shutdown = CancellationToken::new();

        tokio::spawn(Self::serve_udp(udp, Arc::clone(&state), shutdown.clone()));
        tokio::spawn(Self::serve_tcp(tcp, Arc::clone(&state), shutdown.clone()));

        Ok(Self {
            addr,
            state,
            shutdown,
        })
    }

    /// UDP on an ephemeral port, then TCP on the same port.
    async fn bind_pair() -> Result<(UdpSocket, TcpListener), std::io::Error> {
        let mut last_error = None;
        for _ in 0..20 {
            let udp = UdpSocket::bind("127.0.0.1:0").await?;
            match TcpListener::bind(udp.local_addr()?).await {
                Ok(tcp) => return Ok((udp, tcp)),
                Err(e) => last_error = Some(e),
            }
        }
        Err(last_error.unwrap_or_else(|| std::io::Error::other("no free port pair")))
    }

    async fn serve_udp(socket: UdpSocket, state: Arc<MockState>, shutdown: CancellationToken) {
        let mut buf = vec![0u8; 4096];
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                result = socket.recv_from(&mut buf) => {
                    let Ok((len, peer)) = result else { continue };
                    let query = &buf[..len];
                    state.udp_queries.fetch_add(1, Ordering::SeqCst);
                    state.record_rd(query);

                    let response = match state.behavior() {
                        MockBehavior::Answer => build_response(query, false, false),
                        MockBehavior::Truncate | MockBehavior::TruncateLarge => {
                            build_response(query, true, false)
                        }
                        MockBehavior::WrongId => build_response(query, false, true),
                        MockBehavior::Silent => None,
                    };
                    if let Some(response) = response {
                        let _ = socket.send_to(&response, peer).await;
                    }
                }
            }
        }
    }

    async fn serve_tcp(listener: TcpListener, state: Arc<MockState>, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                result = listener.accept() => {
                    let Ok((stream, _)) = result else { continue };
                    state.tcp_connections.fetch_add(1, Ordering::SeqCst);
                    tokio::spawn(Self::serve_connection(stream, Arc::clone(&state), shutdown.clone()));
                }
            }
        }
    }

    async fn serve_connection(
        mut stream: TcpStream,
        state: Arc<MockState>,
        shutdown: CancellationToken,
    ) {
        loop {
            let query = tokio::select! {
                _ = shutdown.cancelled() => break,
                query = read_framed(&mut stream) => match query {
                    Ok(query) => query,
                    Err(_) => break,
                },
            };
            state.tcp_queries.fetch_add(1, Ordering::SeqCst);
            state.record_rd(&query);

            let response = match state.behavior() {
                MockBehavior::Answer | MockBehavior::Truncate => {
                    build_response(&query, false, false)
                }
                MockBehavior::TruncateLarge => {
                    build_response(&query, false, false).map(with_large_answer)
                }
                MockBehavior::WrongId => build_response(&query, false, true),
                MockBehavior::Silent => None,
            };
            if let Some(response) = response {
                let mut framed = (response.len() as u16).to_be_bytes().to_vec();
                framed.extend_from_slice(&response);
                if stream.write_all(&framed).await.is_err() {
                    break;
                }
            }
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn set_behavior(&self, behavior: MockBehavior) {
        self.state.behavior.store(behavior as u8, Ordering::SeqCst);
    }

    pub fn udp_queries(&self) -> usize {
        self.state.udp_queries.load(Ordering::SeqCst)
    }

    pub fn tcp_queries(&self) -> usize {
        self.state.tcp_queries.load(Ordering::SeqCst)
    }

    pub fn tcp_connections(&self) -> usize {
        self.state.tcp_connections.load(Ordering::SeqCst)
    }

    pub fn total_queries(&self) -> usize {
        self.udp_queries() + self.tcp_queries()
    }

    /// RD bit of the most recent query, if any arrived.
    pub fn last_recursion_desired(&self) -> Option<bool> {
        match self.state.last_rd.load(Ordering::SeqCst) {
            RD_SET => Some(true),
            RD_CLEAR => Some(false),
            _ => None,
        }
    }

    /// Polls until at least `count` queries arrived or `within` elapses.
    pub async fn wait_for_queries(&self, count: usize, within: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + within;
        while tokio::time::Instant::now() < deadline {
            if self.total_queries() >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.total_queries() >= count
    }

    pub fn shutdown(self) {
        self.shutdown.cancel();
    }
}

impl Drop for MockDnsServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn read_framed(stream: &mut TcpStream) -> std::io::Result<Vec<u8>> {
    let mut len_buf = [0u8; 2];
    stream.read_exact(&mut len_buf).await?;
    let mut query = vec![0u8; u16::from_be_bytes(len_buf) as usize];
    stream.read_exact(&mut query).await?;
    Ok(query)
}

/// Turns a query into a NOERROR reply by flipping header bits; the question
/// section is echoed as-is.
fn build_response(query: &[u8], truncated: bool, wrong_id: bool) -> Option<Vec<u8>> {
    if query.len() < 12 {
        return None;
    }

    let mut response = query.to_vec();
    // QR, keep opcode and RD
    response[2] = (response[2] | 0x80) & !0x06;
    if truncated {
        response[2] |= 0x02;
    }
    // RA, rcode NOERROR
    response[3] = 0x80;
    if wrong_id {
        response[0] ^= 0xFF;
    }
    Some(response)
}

/// Adds `LARGE_ANSWER_RECORDS` A records for the question name.
fn with_large_answer(response: Vec<u8>) -> Vec<u8> {
    let Ok(mut message) = Message::from_vec(&response) else {
        return response;
    };
    let name = message
        .queries()
        .first()
        .map(|q| q.name().clone())
        .unwrap_or_else(Name::root);
    for i in 0..LARGE_ANSWER_RECORDS {
        let rdata = RData::A(A::new(10, 0, (i >> 8) as u8, i as u8));
        message.add_answer(Record::from_rdata(name.clone(), 300, rdata));
    }
    message.to_vec().unwrap_or(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_server_responds() {
        let server = MockDnsServer::start(MockBehavior::Answer).await.unwrap();

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let query = vec![
            0x12, 0x34, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ];
        client.send_to(&query, server.addr()).await.unwrap();

        let mut buf = vec![0u8; 512];
        let (len, _) = client.recv_from(&mut buf).await.unwrap();

        assert_eq!(len, 12);
        assert_eq!(buf[0..2], query[0..2], "Transaction ID should match");
        assert_eq!(buf[2] & 0x80, 0x80, "QR bit should be set (response)");
        assert_eq!(server.udp_queries(), 1);
        assert_eq!(server.last_recursion_desired(), Some(true));
    }

    #[test]
    fn test_large_answer_is_well_formed() {
        let query = crate::helpers::QueryBuilder::with_id("example.org.", 1);
        let response = with_large_answer(build_response(&query, false, false).unwrap());

        let message = Message::from_vec(&response).unwrap();
        assert_eq!(message.answers().len(), LARGE_ANSWER_RECORDS as usize);
        assert!(response.len() > 512);
    }

    #[test]
    fn test_truncated_response_bits() {
        let query = [0xab, 0xcd, 0x01, 0x00, 0, 0, 0, 0, 0, 0, 0, 0];
        let response = build_response(&query, true, false).unwrap();
        assert_eq!(response[0..2], [0xab, 0xcd]);
        assert_eq!(response[2], 0x83);
    }
}
