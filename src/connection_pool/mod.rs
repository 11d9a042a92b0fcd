use socket2::TcpKeepalive;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::debug;

/// Bounded pool of reusable connections to a single target. Owned and used
/// by one task at a time, so the lock is only held for push/pop.
pub struct ConnectionPool {
    target: SocketAddr,
    idle: Mutex<Vec<TcpStream>>,
    max_idle: usize,
}

impl ConnectionPool {
    pub fn new(target: SocketAddr, max_idle: usize) -> Self {
        Self {
            target,
            idle: Mutex::new(Vec::new()),
            max_idle,
        }
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    pub async fn checkout(&self) -> io::Result<TcpStream> {
        // try to get from pool first
        {
            let mut idle = self.idle.lock().await;
            while let Some(stream) = idle.pop() {
                if is_connection_alive(&stream).await {
                    debug!("Reusing pooled connection to {}", self.target);
                    return Ok(stream);
                } else {
                    debug!("Discarding dead pooled connection to {}", self.target);
                    continue;
                }
            }
        }
        debug!("Creating new connection to {}", self.target);
        let stream = TcpStream::connect(self.target).await?;

        configure_keepalive(&stream)?;

        Ok(stream)
    }

    pub async fn checkin(&self, stream: TcpStream) {
        let mut idle = self.idle.lock().await;

        if idle.len() < self.max_idle {
            idle.push(stream);
            debug!(
                "Returned connection to pool for {} (pool size: {})",
                self.target,
                idle.len()
            );
        } else {
            debug!("Pool full for {}, dropping connection", self.target);
            drop(stream);
        }
    }
}

async fn is_connection_alive(stream: &TcpStream) -> bool {
    let mut buf = [0u8; 1];
    match stream.try_read(&mut buf) {
        Ok(0) => false,  // EOF = connection closed
        Ok(_) => true,   // data available = connection alive (shouldn't happen for pooled connections)
        Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
            // no data available but connection is still open
            // this is the expected case for idle pooled connections
            stream.peer_addr().is_ok()
        }
        Err(_) => false, // connection is dead
    }
}

fn configure_keepalive(stream: &TcpStream) -> io::Result<()> {
    let sock_ref = socket2::SockRef::from(stream);

    let keepalive = TcpKeepalive::new()
        .with_time(Duration::from_secs(30)) // probe after 30 seconds of idle
        .with_interval(Duration::from_secs(10)); // probe every 10 seconds

    sock_ref.set_tcp_keepalive(&keepalive)?;

    // enable TCP_NODELAY to reduce latency
    stream.set_nodelay(true)?;

    Ok(())
}
