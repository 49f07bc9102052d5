//! Client side of a dialog: writes the header and payload, reads acks.

use crate::error::{Result, SyncError};
use crate::protocol::DialogHeader;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub struct SenderDialog<S> {
    stream: S,
}

impl<S> SenderDialog<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    /// Write the header frame. Always the first thing on the connection.
    pub async fn initiate(&mut self, header: &DialogHeader) -> Result<()> {
        self.stream.write_all(&header.encode()).await?;
        Ok(())
    }

    pub async fn send_bytes(&mut self, buf: &[u8]) -> Result<()> {
        self.stream.write_all(buf).await?;
        Ok(())
    }

    /// Read one acknowledgment byte. Flushes first so the peer has everything
    /// it needs to answer.
    pub async fn action_needed(&mut self) -> Result<bool> {
        self.stream.flush().await?;
        match self.stream.read_u8().await {
            Ok(b) => Ok(b == 1),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(SyncError::Protocol(
                "Connection closed while waiting for acknowledgment".to_string(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    /// Flush and shut down the write half. The receiver observes this as end
    /// of stream, which terminates the segment loop.
    pub async fn finish(&mut self) -> Result<()> {
        self.stream.flush().await?;
        self.stream.shutdown().await?;
        Ok(())
    }

    /// Wait for the receiver to close its side. The receiver closes only
    /// after the dialog has been applied to the mirror.
    pub async fn wait_closed(&mut self) -> Result<()> {
        let mut rest = Vec::new();
        self.stream.read_to_end(&mut rest).await?;
        if !rest.is_empty() {
            return Err(SyncError::Protocol(format!(
                "Unexpected {} trailing bytes after dialog",
                rest.len()
            )));
        }
        Ok(())
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}
