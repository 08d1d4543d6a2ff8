//! TCP listener and per-connection request cycle.
//!
//! Each accepted connection carries exactly one request: read a frame,
//! parse it into a table, run the resolved processor, and write the result
//! back as a frame with the same encoding. The stream is dropped when the
//! handler returns, so the connection is closed on every exit path.

use crate::config::{Config, ServeMode};
use crate::frame::{self, FrameError};
use crate::processors::Processor;
use crate::table::Table;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Server instance
pub struct Server {
    config: Config,
    processor: Arc<dyn Processor>,
}

impl Server {
    /// Create a new server instance with an already-resolved processor.
    pub fn new(config: Config, processor: Arc<dyn Processor>) -> Self {
        Server { config, processor }
    }

    /// Bind the configured address and begin accepting connections.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let listener = TcpListener::bind(&self.config.listen).await?;
        info!(
            address = %listener.local_addr()?,
            mode = ?self.config.mode,
            "Server listening"
        );
        self.serve(listener).await
    }

    /// Accept connections from an already-bound listener.
    ///
    /// Connections are served one at a time; in `once` mode the first
    /// served connection ends the loop. Per-connection failures are logged
    /// and never take the listener down.
    async fn serve(self, listener: TcpListener) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let timeout = self.config.frame_timeout();

        loop {
            match listener.accept().await {
                Ok((mut stream, addr)) => {
                    debug!(peer = %addr, "New connection");

                    if let Err(e) = handle_connection(&mut stream, &*self.processor, timeout).await
                    {
                        debug!(peer = %addr, error = %e, "Connection error");
                    }
                    drop(stream);

                    if self.config.mode == ServeMode::Once {
                        return Ok(());
                    }
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }
}

/// Handle one connection: a single read-process-write cycle.
///
/// Payload errors are reported back to the caller as a frame holding an
/// `{"error": ...}` object, leaving the happy-path wire format untouched.
/// Frame-level failures where no response can be delivered propagate to the
/// caller for logging.
async fn handle_connection<S>(
    stream: &mut S,
    processor: &dyn Processor,
    timeout: Option<Duration>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let text = match read_frame_timed(stream, timeout).await {
        Ok(text) => text,
        Err(e @ FrameError::InvalidEncoding { .. }) => {
            // The frame arrived whole but its bytes don't decode; the peer
            // can still be told what went wrong
            warn!(error = %e, "Rejecting request frame");
            write_error_frame(stream, timeout, &e.to_string()).await?;
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let table = match Table::from_json(&text) {
        Ok(table) => table,
        Err(e) => {
            warn!(error = %e, "Rejecting request payload");
            write_error_frame(stream, timeout, &e.to_string()).await?;
            return Ok(());
        }
    };

    debug!(rows = table.len(), columns = table.columns().len(), "Processing table");
    let result = processor.process(table);
    let body = result.to_json();

    match write_frame_timed(stream, timeout, &body).await {
        Ok(()) => Ok(()),
        Err(e @ FrameError::Oversized { .. }) => {
            warn!(error = %e, "Response does not fit a single frame");
            write_error_frame(stream, timeout, &e.to_string()).await?;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Report a per-request failure to the caller as an error-object frame.
async fn write_error_frame<S>(
    stream: &mut S,
    timeout: Option<Duration>,
    message: &str,
) -> Result<(), FrameError>
where
    S: AsyncWrite + Unpin,
{
    let body = json!({ "error": message }).to_string();
    write_frame_timed(stream, timeout, &body).await
}

/// Read a frame, treating an elapsed timeout as a truncated frame.
async fn read_frame_timed<R>(reader: &mut R, timeout: Option<Duration>) -> Result<String, FrameError>
where
    R: AsyncRead + Unpin,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, frame::read_frame(reader))
            .await
            .map_err(|_| FrameError::Truncated)?,
        None => frame::read_frame(reader).await,
    }
}

/// Write a frame, treating an elapsed timeout as a truncated frame.
async fn write_frame_timed<W>(
    writer: &mut W,
    timeout: Option<Duration>,
    text: &str,
) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, frame::write_frame(writer, text))
            .await
            .map_err(|_| FrameError::Truncated)?,
        None => frame::write_frame(writer, text).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{read_frame, write_frame};
    use crate::processors;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpStream;

    fn test_config(mode: ServeMode) -> Config {
        Config {
            listen: "127.0.0.1:0".to_string(),
            processor: "identity".to_string(),
            mode,
            timeout_secs: 5,
            log_level: "info".to_string(),
        }
    }

    /// Run one handler cycle over an in-memory stream, returning the
    /// response frame text.
    async fn cycle(processor: &dyn Processor, request: &str) -> String {
        let (mut client, mut server_side) = tokio::io::duplex(256 * 1024);

        write_frame(&mut client, request).await.unwrap();
        handle_connection(&mut server_side, processor, None)
            .await
            .unwrap();
        read_frame(&mut client).await.unwrap()
    }

    #[tokio::test]
    async fn test_pass_through_empty_array() {
        let reply = cycle(&processors::identity::Identity, "[]").await;
        assert_eq!(reply, "[]");
    }

    #[tokio::test]
    async fn test_pass_through_single_record() {
        let reply = cycle(&processors::identity::Identity, r#"[{"a":1}]"#).await;
        assert_eq!(reply, r#"[{"a":1}]"#);
    }

    #[tokio::test]
    async fn test_pass_through_heterogeneous_records() {
        let reply = cycle(&processors::identity::Identity, r#"[{"a":1},{"b":2}]"#).await;
        assert_eq!(reply, r#"[{"a":1},{"b":2}]"#);
    }

    #[tokio::test]
    async fn test_reverse_processor_cycle() {
        let reply = cycle(&processors::reverse::Reverse, r#"[{"a":1},{"a":2}]"#).await;
        assert_eq!(reply, r#"[{"a":2},{"a":1}]"#);
    }

    #[tokio::test]
    async fn test_malformed_payload_gets_error_frame() {
        let (mut client, mut server_side) = tokio::io::duplex(4096);

        write_frame(&mut client, "this is not json").await.unwrap();
        handle_connection(&mut server_side, &processors::identity::Identity, None)
            .await
            .unwrap();

        let reply = read_frame(&mut client).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&reply).unwrap();
        assert!(value["error"].as_str().unwrap().contains("not valid JSON"));
    }

    #[tokio::test]
    async fn test_non_array_payload_gets_error_frame() {
        let (mut client, mut server_side) = tokio::io::duplex(4096);

        write_frame(&mut client, r#"{"a":1}"#).await.unwrap();
        handle_connection(&mut server_side, &processors::identity::Identity, None)
            .await
            .unwrap();

        let reply = read_frame(&mut client).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&reply).unwrap();
        assert!(value["error"].as_str().unwrap().contains("array of records"));
    }

    #[tokio::test]
    async fn test_undecodable_frame_gets_error_frame() {
        let (mut client, mut server_side) = tokio::io::duplex(4096);

        // Length prefix of 3 followed by a lone surrogate group
        client
            .write_all(&[0x00, 0x03, 0xED, 0xA0, 0xBD])
            .await
            .unwrap();
        handle_connection(&mut server_side, &processors::identity::Identity, None)
            .await
            .unwrap();

        let reply = read_frame(&mut client).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&reply).unwrap();
        assert!(value["error"]
            .as_str()
            .unwrap()
            .contains("modified UTF-8"));
    }

    #[tokio::test]
    async fn test_peer_close_mid_frame_is_truncated() {
        let (mut client, mut server_side) = tokio::io::duplex(4096);

        // Declare 10 payload bytes, deliver 2, then hang up
        client.write_all(&[0x00, 0x0A, b'[', b']']).await.unwrap();
        drop(client);

        let result = handle_connection(&mut server_side, &processors::identity::Identity, None)
            .await;
        let err = result.unwrap_err();
        assert!(err.to_string().contains("mid-frame"));
    }

    #[tokio::test]
    async fn test_read_timeout_is_truncated() {
        let (client, mut server_side) = tokio::io::duplex(4096);

        // Client never sends anything; handler must give up
        let result = handle_connection(
            &mut server_side,
            &processors::identity::Identity,
            Some(Duration::from_millis(20)),
        )
        .await;
        assert!(result.is_err());
        drop(client);
    }

    #[tokio::test]
    async fn test_serve_once_over_tcp() {
        let request = r#"[{"name":"x","value":10},{"name":"y","value":20}]"#;

        let server = Server::new(
            test_config(ServeMode::Once),
            processors::resolve("identity").unwrap(),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(async move { server.serve(listener).await });

        let mut stream = TcpStream::connect(addr).await.unwrap();
        write_frame(&mut stream, request).await.unwrap();
        let reply = read_frame(&mut stream).await.unwrap();

        assert_eq!(
            Table::from_json(&reply).unwrap(),
            Table::from_json(request).unwrap()
        );
        assert_eq!(reply, request);

        // Once mode: serve() returns after the first connection
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_serve_forever_survives_bad_request() {
        let server = Server::new(
            test_config(ServeMode::Forever),
            processors::resolve("identity").unwrap(),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(async move { server.serve(listener).await });

        // First connection delivers garbage and gets an error frame
        let mut bad = TcpStream::connect(addr).await.unwrap();
        write_frame(&mut bad, "{{{").await.unwrap();
        let reply = read_frame(&mut bad).await.unwrap();
        assert!(reply.contains("error"));
        drop(bad);

        // Listener is still up for a well-formed request
        let mut good = TcpStream::connect(addr).await.unwrap();
        write_frame(&mut good, r#"[{"a":1}]"#).await.unwrap();
        assert_eq!(read_frame(&mut good).await.unwrap(), r#"[{"a":1}]"#);

        task.abort();
    }
}
