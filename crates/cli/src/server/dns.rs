use dns_forward_domain::Protocol;
use dns_forward_infrastructure::dns::transport::tcp::{
    read_with_length_prefix, send_with_length_prefix,
};
use dns_forward_infrastructure::DnsServerHandler;
use socket2::{Domain, Socket, Type};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

const TCP_IDLE_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_UDP_QUERY_SIZE: usize = 65535;

pub async fn start_dns_server(
    bind_addr: String,
    handler: DnsServerHandler,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let socket_addr: SocketAddr = bind_addr.parse()?;
    let domain = if socket_addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };

    let udp_socket = Arc::new(create_udp_socket(domain, socket_addr)?);
    let tcp_listener = create_tcp_listener(domain, socket_addr)?;

    info!(bind_address = %socket_addr, "DNS server ready");

    let udp = tokio::spawn(run_udp(udp_socket, handler.clone(), shutdown.clone()));
    let tcp = tokio::spawn(run_tcp(tcp_listener, handler, shutdown));

    let (udp, tcp) = tokio::join!(udp, tcp);
    udp?;
    tcp?;
    Ok(())
}

async fn run_udp(socket: Arc<UdpSocket>, handler: DnsServerHandler, shutdown: CancellationToken) {
    let mut recv_buf = vec![0u8; MAX_UDP_QUERY_SIZE];

    loop {
        let (len, from) = tokio::select! {
            _ = shutdown.cancelled() => break,
            result = socket.recv_from(&mut recv_buf) => match result {
                Ok(received) => received,
                Err(e) => {
                    debug!(error = %e, "UDP recv error");
                    continue;
                }
            },
        };

        let query: Arc<[u8]> = Arc::from(&recv_buf[..len]);
        let handler = handler.clone();
        let socket = Arc::clone(&socket);
        let cancel = shutdown.child_token();
        tokio::spawn(async move {
            if let Some(response) = handler.handle_raw(&query, from, Protocol::Udp, &cancel).await
            {
                if let Err(e) = socket.send_to(&response, from).await {
                    debug!(client = %from, error = %e, "UDP send error");
                }
            }
        });
    }
}

async fn run_tcp(listener: TcpListener, handler: DnsServerHandler, shutdown: CancellationToken) {
    loop {
        let (stream, from) = tokio::select! {
            _ = shutdown.cancelled() => break,
            result = listener.accept() => match result {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!(error = %e, "TCP accept error");
                    continue;
                }
            },
        };

        let handler = handler.clone();
        let cancel = shutdown.child_token();
        tokio::spawn(serve_tcp_client(stream, from, handler, cancel));
    }
}

/// Answers framed queries on one client connection, in order, until the
/// client goes quiet or disconnects.
async fn serve_tcp_client(
    mut stream: TcpStream,
    from: SocketAddr,
    handler: DnsServerHandler,
    cancel: CancellationToken,
) {
    loop {
        let query = tokio::select! {
            _ = cancel.cancelled() => break,
            read = tokio::time::timeout(TCP_IDLE_TIMEOUT, read_with_length_prefix(&mut stream)) => {
                match read {
                    Ok(Ok(query)) => query,
                    Ok(Err(_)) | Err(_) => break,
                }
            }
        };

        let Some(response) = handler
            .handle_raw(&query, from, Protocol::Tcp, &cancel)
            .await
        else {
            continue;
        };

        if let Err(e) = send_with_length_prefix(&mut stream, &response).await {
            debug!(client = %from, error = %e, "TCP send error");
            break;
        }
    }
}

fn create_udp_socket(domain: Domain, socket_addr: SocketAddr) -> anyhow::Result<UdpSocket> {
    let socket = Socket::new(domain, Type::DGRAM, Some(socket2::Protocol::UDP))?;
    if socket_addr.is_ipv6() {
        socket.set_only_v6(false)?;
    }
    socket.set_reuse_address(true)?;
    socket.set_recv_buffer_size(512 * 1024)?;
    socket.set_send_buffer_size(512 * 1024)?;
    socket.bind(&socket_addr.into())?;
    socket.set_nonblocking(true)?;
    let std_socket: std::net::UdpSocket = socket.into();
    Ok(UdpSocket::from_std(std_socket)?)
}

fn create_tcp_listener(domain: Domain, socket_addr: SocketAddr) -> anyhow::Result<TcpListener> {
    let socket = Socket::new(domain, Type::STREAM, Some(socket2::Protocol::TCP))?;
    if socket_addr.is_ipv6() {
        socket.set_only_v6(false)?;
    }
    socket.set_reuse_address(true)?;
    socket.bind(&socket_addr.into())?;
    socket.listen(1024)?;
    socket.set_nonblocking(true)?;
    let std_listener: std::net::TcpListener = socket.into();
    Ok(TcpListener::from_std(std_listener)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dns_forward_domain::ForwardConfig;
    use dns_forward_infrastructure::ProxyPool;
    use hickory_proto::op::{Message, MessageType, OpCode, Query};
    use hickory_proto::rr::{Name, RecordType};
    use tokio::sync::mpsc;

    /// Upstream that reports the size of every query and echoes it back as a
    /// response.
    async fn echo_upstream() -> (SocketAddr, mpsc::UnboundedReceiver<usize>) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut buf = vec![0u8; 65535];
            while let Ok((len, peer)) = socket.recv_from(&mut buf).await {
                let _ = tx.send(len);
                let mut response = buf[..len].to_vec();
                response[2] |= 0x80;
                let _ = socket.send_to(&response, peer).await;
            }
        });
        (addr, rx)
    }

    fn large_query() -> Vec<u8> {
        let mut message = Message::new();
        message
            .set_id(0x5151)
            .set_message_type(MessageType::Query)
            .set_op_code(OpCode::Query)
            .set_recursion_desired(true);
        for i in 0..600 {
            let name = Name::from_ascii(format!("host{}.example.org.", i)).unwrap();
            message.add_query(Query::query(name, RecordType::A));
        }
        message.to_vec().unwrap()
    }

    #[tokio::test]
    async fn test_udp_query_larger_than_4k_is_forwarded_whole() {
        let (upstream, mut sizes) = echo_upstream().await;
        let directive = format!("forward . {} {{\nhealth_check 0\n}}", upstream);
        let config = ForwardConfig::from_directive(&directive).unwrap();
        let pool = Arc::new(ProxyPool::from_config(&config).await.unwrap());

        let socket = create_udp_socket(Domain::IPV4, "127.0.0.1:0".parse().unwrap()).unwrap();
        let server_addr = socket.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        tokio::spawn(run_udp(
            Arc::new(socket),
            DnsServerHandler::new(pool),
            shutdown.clone(),
        ));

        let query = large_query();
        assert!(query.len() > 4096);
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(&query, server_addr).await.unwrap();

        let received = tokio::time::timeout(Duration::from_secs(2), sizes.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, query.len());

        shutdown.cancel();
    }
}
