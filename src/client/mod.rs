use http::StatusCode;
use std::io;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use crate::connection_pool::ConnectionPool;

const MAX_HEADERS: usize = 32;
const READ_CHUNK: usize = 8 * 1024;

/// Any failure at the connection or wire level. Never propagated past the
/// request loop; callers read the classification off the outcome instead.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect to target: {0}")]
    Connect(#[source] io::Error),
    #[error("transport failure mid-request: {0}")]
    Io(#[from] io::Error),
    #[error("malformed response: {0}")]
    Response(#[from] httparse::Error),
    #[error("response carried an invalid status code")]
    Status,
}

/// Per-attempt record: Idle on construction, `started` once a connection is
/// in hand, then either `completed` or `errored`. `received_data` is set on
/// the first non-empty read regardless of how the attempt ends.
#[derive(Debug, Clone, Default)]
pub struct RequestOutcome {
    pub started: bool,
    pub received_data: bool,
    pub errored: bool,
    pub completed: bool,
    pub status: Option<StatusCode>,
}

/// Issues one GET against the pool's target and resolves it to an outcome.
/// A connection that carried a full response goes back to the pool; one
/// that errored is dropped.
pub async fn issue_request(pool: &ConnectionPool, host: &str) -> RequestOutcome {
    let mut outcome = RequestOutcome::default();

    let mut stream = match pool.checkout().await {
        Ok(stream) => stream,
        Err(e) => {
            debug!("Request not started: {}", TransportError::Connect(e));
            outcome.errored = true;
            return outcome;
        }
    };
    outcome.started = true;

    match exchange(&mut stream, host, &mut outcome).await {
        Ok(status) => {
            outcome.completed = true;
            outcome.status = Some(status);
            pool.checkin(stream).await;
        }
        Err(e) => {
            debug!("Request failed: {}", e);
            outcome.errored = true;
        }
    }

    outcome
}

/// Writes the request and reads one full response off the stream, marking
/// `received_data` as soon as the first bytes arrive.
async fn exchange(
    stream: &mut TcpStream,
    host: &str,
    outcome: &mut RequestOutcome,
) -> Result<StatusCode, TransportError> {
    let request = format!("GET / HTTP/1.1\r\nHost: {host}\r\nConnection: keep-alive\r\n\r\n");
    stream.write_all(request.as_bytes()).await?;

    let mut buf: Vec<u8> = Vec::with_capacity(READ_CHUNK);
    let mut chunk = [0u8; READ_CHUNK];

    // read until the header block parses
    let (status, header_len, content_length) = loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(TransportError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed before response headers",
            )));
        }
        outcome.received_data = true;
        buf.extend_from_slice(&chunk[..n]);

        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut response = httparse::Response::new(&mut headers);
        match response.parse(&buf)? {
            httparse::Status::Complete(header_len) => {
                let status = response
                    .code
                    .and_then(|code| StatusCode::from_u16(code).ok())
                    .ok_or(TransportError::Status)?;
                break (status, header_len, content_length_of(response.headers));
            }
            httparse::Status::Partial => continue,
        }
    };

    let mut body_read = buf.len() - header_len;
    match content_length {
        Some(expected) => {
            while body_read < expected {
                let n = stream.read(&mut chunk).await?;
                if n == 0 {
                    return Err(TransportError::Io(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "connection closed mid-body",
                    )));
                }
                body_read += n;
            }
        }
        None => {
            // no content-length: the response body runs to EOF
            loop {
                let n = stream.read(&mut chunk).await?;
                if n == 0 {
                    break;
                }
                body_read += n;
            }
        }
    }

    debug!("Received {} body bytes with status {}", body_read, status);
    Ok(status)
}

fn content_length_of(headers: &[httparse::Header<'_>]) -> Option<usize> {
    headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case("content-length"))
        .and_then(|h| std::str::from_utf8(h.value).ok())
        .and_then(|v| v.trim().parse().ok())
}
