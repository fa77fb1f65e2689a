//! UDP socket setup and send helpers

use socket2::{Domain, Protocol, Socket, Type};
use std::io::{self, ErrorKind};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;

use crate::error::NetworkError;

/// Pause before the single retry of a transient send failure
pub const SEND_RETRY_BACKOFF: Duration = Duration::from_millis(5);

#[cfg(target_os = "linux")]
const ENOBUFS: i32 = 105;
#[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
const ENOBUFS: i32 = 55;
#[cfg(windows)]
const ENOBUFS: i32 = 10055;
#[cfg(not(any(
    target_os = "linux",
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    windows
)))]
const ENOBUFS: i32 = -1;

/// Bind a UDP socket with the requested receive buffer and hand it to tokio
///
/// Must be called from within a tokio runtime.
pub fn bind_socket(addr: SocketAddr, recv_buffer_size: usize) -> Result<UdpSocket, NetworkError> {
    let bind_failed = |source: io::Error| NetworkError::BindFailed { addr, source };

    let socket = Socket::new(
        if addr.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        },
        Type::DGRAM,
        Some(Protocol::UDP),
    )
    .map_err(bind_failed)?;

    socket.set_reuse_address(true).map_err(bind_failed)?;
    socket
        .set_recv_buffer_size(recv_buffer_size)
        .map_err(bind_failed)?;
    socket.set_nonblocking(true).map_err(bind_failed)?; // required for passing to tokio
    socket.bind(&addr.into()).map_err(bind_failed)?;

    let socket = UdpSocket::from_std(socket.into()).map_err(bind_failed)?;
    tracing::debug!(
        "Bound UDP socket on {} (recv buffer {} bytes)",
        socket.local_addr().unwrap_or(addr),
        recv_buffer_size
    );
    Ok(socket)
}

/// Send errors worth one more attempt
pub fn is_transient_send_error(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::WouldBlock
            | ErrorKind::Interrupted
            | ErrorKind::ConnectionRefused
            | ErrorKind::TimedOut
    ) || err.raw_os_error() == Some(ENOBUFS)
}

/// Receive errors caused by ICMP feedback from an earlier send
pub fn is_transient_recv_error(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::ConnectionReset | ErrorKind::ConnectionRefused | ErrorKind::Interrupted
    )
}

/// Send one datagram, retrying a transient failure once
pub async fn send_frame(
    socket: &UdpSocket,
    frame: &[u8],
    peer: SocketAddr,
) -> Result<usize, NetworkError> {
    match socket.send_to(frame, peer).await {
        Ok(sent) => Ok(sent),
        Err(e) if is_transient_send_error(&e) => {
            tracing::debug!("Transient send error to {}: {}, retrying", peer, e);
            tokio::time::sleep(SEND_RETRY_BACKOFF).await;
            socket
                .send_to(frame, peer)
                .await
                .map_err(|source| NetworkError::SendFailed { peer, source })
        }
        Err(source) => Err(NetworkError::SendFailed { peer, source }),
    }
}
