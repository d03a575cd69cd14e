use std::net::UdpSocket;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::capture::{CaptureSender, classify};
use crate::error::Result;

/// Largest UDP payload we accept.
const MAX_DATAGRAM: usize = 65_535;
/// How often receive loops re-check the `running` flag.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// UDP capture source.
///
/// Binds one socket on the monitored port and one on the peer port. The
/// destination port of every datagram is the local port of the socket
/// that received it, which [`classify`] turns into a direction.
pub struct UdpCapture {
    sockets: Vec<UdpSocket>,
    monitored_port: u16,
}

impl UdpCapture {
    pub fn bind(host: &str, monitored_port: u16, peer_port: u16) -> Result<Self> {
        let mut sockets = Vec::with_capacity(2);
        for port in [monitored_port, peer_port] {
            let socket = UdpSocket::bind((host, port))?;
            socket.set_read_timeout(Some(POLL_INTERVAL))?;
            tracing::info!(addr = %socket.local_addr()?, "capturing UDP");
            sockets.push(socket);
        }
        Ok(Self {
            sockets,
            monitored_port,
        })
    }

    pub fn monitored_port(&self) -> u16 {
        self.monitored_port
    }

    /// One receive thread per socket. Threads exit once `running` is
    /// cleared or the pipeline drops its receiver.
    pub fn spawn(self, sender: CaptureSender, running: Arc<AtomicBool>) -> Vec<JoinHandle<()>> {
        let monitored_port = self.monitored_port;
        self.sockets
            .into_iter()
            .map(|socket| {
                let sender = sender.clone();
                let running = running.clone();
                thread::spawn(move || receive_loop(socket, monitored_port, sender, running))
            })
            .collect()
    }
}

fn receive_loop(
    socket: UdpSocket,
    monitored_port: u16,
    sender: CaptureSender,
    running: Arc<AtomicBool>,
) {
    let local_port = match socket.local_addr() {
        Ok(addr) => addr.port(),
        Err(e) => {
            tracing::warn!(error = %e, "cannot read local address, receive loop not started");
            return;
        }
    };
    let direction = classify(local_port, monitored_port);
    let mut buf = vec![0u8; MAX_DATAGRAM];

    while running.load(Ordering::SeqCst) {
        match socket.recv_from(&mut buf) {
            Ok((len, peer)) => {
                tracing::trace!(%peer, %direction, len, "datagram");
                if !sender.send(direction, buf[..len].to_vec()) {
                    tracing::debug!(%direction, "pipeline gone");
                    break;
                }
            }
            Err(ref e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) => {}
            Err(e) => {
                if running.load(Ordering::SeqCst) {
                    tracing::warn!(error = %e, port = local_port, "UDP receive error");
                }
            }
        }
    }
    tracing::debug!(port = local_port, "receive loop exited");
}
