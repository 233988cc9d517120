use crate::models::EventSubmission;
use std::net::UdpSocket;
use std::time::Duration;

/// UDP listener for receiving event submissions
///
/// One JSON submission per datagram.
pub struct UdpListener {
    socket: UdpSocket,
    buffer: [u8; 4096],
}

impl UdpListener {
    /// Create a listener bound to the given address
    pub fn new(address: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = UdpSocket::bind(address)?;
        socket.set_read_timeout(Some(Duration::from_secs(1)))?;

        Ok(UdpListener {
            socket,
            buffer: [0; 4096],
        })
    }

    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.socket.local_addr()
    }

    /// Read one submission, returning None on timeout or a skipped
    /// unparseable datagram.
    pub fn read_submission(&mut self) -> Result<Option<EventSubmission>, Box<dyn std::error::Error>> {
        match self.socket.recv_from(&mut self.buffer) {
            Ok((size, _addr)) => {
                let payload = String::from_utf8_lossy(&self.buffer[..size]);
                match serde_json::from_str::<EventSubmission>(&payload) {
                    Ok(submission) => Ok(Some(submission)),
                    Err(e) => {
                        log::debug!("Skipping unparseable datagram: {}", e);
                        Ok(None)
                    }
                }
            }
            Err(e) => {
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut
                {
                    Ok(None)
                } else {
                    Err(Box::new(e))
                }
            }
        }
    }
}
