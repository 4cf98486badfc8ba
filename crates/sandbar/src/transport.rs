//! Message transport: one JSON document per line.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::error::ServerError;

#[async_trait]
pub trait Transport: Send {
    /// Next non-blank line, or `None` once the peer has closed.
    async fn receive(&mut self) -> Result<Option<String>, ServerError>;

    async fn send(&mut self, message: &str) -> Result<(), ServerError>;
}

/// Reads requests from stdin and writes responses to stdout.
pub struct StdioTransport {
    reader: BufReader<tokio::io::Stdin>,
    writer: tokio::io::Stdout,
}

impl StdioTransport {
    pub fn new() -> Self {
        Self {
            reader: BufReader::new(tokio::io::stdin()),
            writer: tokio::io::stdout(),
        }
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn receive(&mut self) -> Result<Option<String>, ServerError> {
        let mut line = String::new();
        loop {
            line.clear();
            if self.reader.read_line(&mut line).await? == 0 {
                return Ok(None);
            }
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                return Ok(Some(trimmed.to_string()));
            }
        }
    }

    async fn send(&mut self, message: &str) -> Result<(), ServerError> {
        self.writer.write_all(message.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }
}

/// In-memory transport pair for driving the server in tests.
#[cfg(test)]
pub struct ChannelTransport {
    rx: tokio::sync::mpsc::Receiver<String>,
    tx: tokio::sync::mpsc::Sender<String>,
}

#[cfg(test)]
impl ChannelTransport {
    /// Two connected ends: what one sends, the other receives.
    pub fn pair() -> (Self, Self) {
        let (tx_a, rx_b) = tokio::sync::mpsc::channel(32);
        let (tx_b, rx_a) = tokio::sync::mpsc::channel(32);
        (Self { rx: rx_a, tx: tx_a }, Self { rx: rx_b, tx: tx_b })
    }
}

#[cfg(test)]
#[async_trait]
impl Transport for ChannelTransport {
    async fn receive(&mut self) -> Result<Option<String>, ServerError> {
        while let Some(msg) = self.rx.recv().await {
            if !msg.trim().is_empty() {
                return Ok(Some(msg));
            }
        }
        Ok(None)
    }

    async fn send(&mut self, message: &str) -> Result<(), ServerError> {
        self.tx.send(message.to_string()).await.map_err(|e| {
            ServerError::Transport(std::io::Error::new(std::io::ErrorKind::BrokenPipe, e))
        })
    }
}
