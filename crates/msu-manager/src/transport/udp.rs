use std::net::SocketAddr;

use anyhow::Context;
use protocol::framing::MAX_DATAGRAM_LEN;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use crate::controller::{ApplyOutcome, LifecycleController};

pub async fn bind_udp_listener(addr: SocketAddr) -> anyhow::Result<UdpSocket> {
    UdpSocket::bind(addr)
        .await
        .with_context(|| format!("failed to bind udp listener {addr}"))
}

/// Receives one command per datagram and applies them in arrival order.
pub async fn run_udp_listener(
    socket: UdpSocket,
    controller: LifecycleController,
    shutdown: CancellationToken,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM_LEN];
    loop {
        let received = tokio::select! {
            _ = shutdown.cancelled() => break,
            received = socket.recv_from(&mut buf) => received,
        };
        match received {
            Ok((len, peer)) => {
                handle_datagram(&controller, &buf[..len], peer).await;
            }
            Err(err) => {
                tracing::warn!(
                    event = "udp.recv_failed",
                    error = %err,
                    "udp receive failed"
                );
            }
        }
    }
    tracing::info!(event = "udp.stopped", "udp listener stopped");
}

pub(crate) async fn handle_datagram(
    controller: &LifecycleController,
    payload: &[u8],
    peer: SocketAddr,
) -> Option<ApplyOutcome> {
    tracing::debug!(event = "udp.datagram", peer = %peer, bytes = payload.len());
    match protocol::parse(payload) {
        Ok(command) => {
            tracing::info!(
                event = "udp.command",
                peer = %peer,
                command = %command.kind(),
                "command received via udp"
            );
            Some(controller.apply(command).await)
        }
        Err(reason) => {
            tracing::error!(
                event = "udp.command.rejected",
                peer = %peer,
                error = %reason,
                payload = %String::from_utf8_lossy(payload),
                "dropping invalid datagram"
            );
            None
        }
    }
}
