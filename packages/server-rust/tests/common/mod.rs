//! Shared helpers for integration tests: a started server on loopback and a
//! line-oriented TCP client.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use cmdserver::{CommandServer, ServerConfig, ServiceFactory};
use futures_util::{SinkExt, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LinesCodec};

pub const PASSWORD: &str = "correctpw";
const READ_TIMEOUT: Duration = Duration::from_secs(5);

pub fn local_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        drain_timeout: Duration::from_secs(2),
        ..ServerConfig::default()
    }
}

/// Starts a server with a control service on an OS-assigned port.
/// Returns the server and the control port.
pub async fn server_with_control(config: ServerConfig) -> (Arc<CommandServer>, u16) {
    let server = CommandServer::new(config, ServiceFactory::with_builtins());
    server.start().await.expect("server should start");
    let port = server
        .add_control(PASSWORD, 0)
        .await
        .expect("control should bind");
    (server, port)
}

pub struct LineClient {
    lines: Framed<TcpStream, LinesCodec>,
}

impl LineClient {
    pub async fn connect(port: u16) -> Self {
        let stream = TcpStream::connect(("127.0.0.1", port))
            .await
            .expect("connect should succeed");
        Self::from_stream(stream)
    }

    pub fn from_stream(stream: TcpStream) -> Self {
        Self {
            lines: Framed::new(stream, LinesCodec::new()),
        }
    }

    pub async fn send(&mut self, line: &str) {
        self.lines.send(line).await.expect("send should succeed");
    }

    /// Writes bytes as-is, bypassing the line encoder.
    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.lines
            .get_mut()
            .write_all(bytes)
            .await
            .expect("raw write should succeed");
    }

    /// Next line, or `None` once the server closed the connection.
    pub async fn recv(&mut self) -> Option<String> {
        match tokio::time::timeout(READ_TIMEOUT, self.lines.next()).await {
            Ok(Some(Ok(line))) => Some(line),
            Ok(Some(Err(_)) | None) => None,
            Err(_) => panic!("timed out waiting for a line"),
        }
    }

    pub async fn expect(&mut self, expected: &str) {
        assert_eq!(self.recv().await.as_deref(), Some(expected));
    }

    /// Sends `line` and returns the single reply.
    pub async fn ask(&mut self, line: &str) -> String {
        self.send(line).await;
        self.recv().await.expect("server closed before replying")
    }

    /// Sends `line` and collects reply lines up to the `END` marker.
    pub async fn ask_block(&mut self, line: &str) -> Vec<String> {
        self.send(line).await;
        let mut block = Vec::new();
        loop {
            let line = self.recv().await.expect("server closed mid-block");
            if line == cmdserver_core::reply::END {
                return block;
            }
            block.push(line);
        }
    }

    pub async fn expect_closed(&mut self) {
        assert_eq!(self.recv().await, None);
    }
}

pub async fn login(port: u16) -> LineClient {
    let mut client = LineClient::connect(port).await;
    assert_eq!(
        client.ask(&format!("PASSWORD {PASSWORD}")).await,
        cmdserver_core::reply::LOGGED_IN
    );
    client
}

/// Polls until `check` holds or the timeout expires.
pub async fn eventually<F: Fn() -> bool>(check: F) {
    tokio::time::timeout(READ_TIMEOUT, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
