// socket.rs -- UDP transport: bind, non-blocking recv, OOB/sequenced split
//
// Ground: myq2-sys::net_udp.rs's UDP_OpenSocket/UDP_GetPacket (bind,
// set_nonblocking, recv_from looped until WouldBlock). The teacher's
// NetState also juggles loopback ring buffers and a background I/O thread
// feeding a packet queue (net_io_thread.rs) so the game's single-threaded
// poll loop never blocks on the socket; this crate has no local server to
// loop back to and follows spec.md section 5/9's single-threaded
// cooperative model directly, so polling the non-blocking socket in the
// caller's own loop replaces the queue-plus-thread machinery.

use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use crate::error::TransportError;

const MAX_DATAGRAM: usize = 4096;

/// One end of the client's UDP connection to a Quake 2 server.
pub struct ClientSocket {
    socket: UdpSocket,
    server_addr: SocketAddr,
}

/// A datagram received from the configured server, already classified.
pub enum Incoming {
    /// A connectionless (`0xFFFFFFFF`-prefixed) datagram -- OOB handshake
    /// or status traffic, handled outside the netchan.
    OutOfBand(Vec<u8>),
    /// A sequenced datagram to be handed to `Netchan::process`.
    Sequenced(Vec<u8>),
}

impl ClientSocket {
    pub fn connect(server_ip: &str, server_port: u16) -> Result<Self, TransportError> {
        let server_addr = (server_ip, server_port)
            .to_socket_addrs()
            .map_err(TransportError::Bind)?
            .next()
            .ok_or_else(|| {
                TransportError::Bind(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "no address resolved for server",
                ))
            })?;

        let bind_addr: SocketAddr = if server_addr.is_ipv6() {
            "[::]:0".parse().unwrap()
        } else {
            "0.0.0.0:0".parse().unwrap()
        };
        let socket = UdpSocket::bind(bind_addr).map_err(TransportError::Bind)?;
        socket.set_nonblocking(true).map_err(TransportError::Bind)?;

        Ok(Self { socket, server_addr })
    }

    pub fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        self.socket.send_to(data, self.server_addr).map_err(TransportError::Send)?;
        Ok(())
    }

    /// Drains every datagram currently queued on the socket, classifying
    /// each as out-of-band or sequenced netchan traffic. Datagrams from
    /// any address other than the configured server are discarded, the
    /// way `NET_GetPacket` filters on the bound remote in connected mode.
    pub fn poll(&self) -> Result<Vec<Incoming>, TransportError> {
        let mut out = Vec::new();
        let mut buf = [0u8; MAX_DATAGRAM];
        loop {
            match self.socket.recv_from(&mut buf) {
                Ok((n, from)) => {
                    if from != self.server_addr {
                        tracing::trace!(target: "socket", ?from, "dropped datagram from unexpected address");
                        continue;
                    }
                    let data = buf[..n].to_vec();
                    if data.len() >= 4 && data[..4] == [0xFF, 0xFF, 0xFF, 0xFF] {
                        out.push(Incoming::OutOfBand(data));
                    } else {
                        out.push(Incoming::Sequenced(data));
                    }
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(TransportError::Recv(e)),
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_binds_an_ephemeral_local_port() {
        let sock = ClientSocket::connect("127.0.0.1", 27910).unwrap();
        assert_eq!(sock.server_addr.port(), 27910);
    }

    #[test]
    fn poll_with_no_traffic_returns_empty() {
        let sock = ClientSocket::connect("127.0.0.1", 27911).unwrap();
        let incoming = sock.poll().unwrap();
        assert!(incoming.is_empty());
    }

    #[test]
    fn send_then_poll_roundtrips_a_datagram() {
        let a = ClientSocket::connect("127.0.0.1", 0).unwrap();
        let a_port = a.socket.local_addr().unwrap().port();
        let b = ClientSocket::connect("127.0.0.1", a_port).unwrap();
        let b_port = b.socket.local_addr().unwrap().port();

        // Redirect `a`'s notion of "the server" to where `b` is actually
        // bound, since `connect` resolved against the port `b` hadn't
        // bound yet when `a` was constructed.
        let a = ClientSocket { socket: a.socket, server_addr: format!("127.0.0.1:{b_port}").parse().unwrap() };

        a.send(b"\xFF\xFF\xFF\xFFping").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        let incoming = b.poll().unwrap();
        assert_eq!(incoming.len(), 1);
        match &incoming[0] {
            Incoming::OutOfBand(data) => assert_eq!(&data[4..], b"ping"),
            _ => panic!("expected out-of-band datagram"),
        }
    }
}
