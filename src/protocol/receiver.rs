//! Server side of a dialog: decodes the header, exposes a length-delimited
//! read primitive and the one-byte acknowledgment channel.

use crate::error::{Result, SyncError};
use crate::operation::{FileAction, FileType};
use crate::protocol::{check_string_len, DialogHeader, PROTOCOL_VERSION};
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub struct ReceiverDialog<S> {
    stream: S,
    header: Option<DialogHeader>,
    has_data: bool,
}

impl<S> ReceiverDialog<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            header: None,
            has_data: true,
        }
    }

    /// Header decoded by [`accept`](Self::accept), if any.
    pub fn header(&self) -> Option<&DialogHeader> {
        self.header.as_ref()
    }

    /// Read and decode the header frame.
    pub async fn accept(&mut self) -> Result<DialogHeader> {
        let fixed = self.read_exact_field(3, "header").await?;
        let version = fixed[0];
        if version != PROTOCOL_VERSION {
            return Err(SyncError::UnsupportedVersion {
                version,
                supported: PROTOCOL_VERSION,
            });
        }
        let action = FileAction::from_u8(fixed[1]).ok_or(SyncError::UnknownAction(fixed[1]))?;
        let file_type =
            FileType::from_u8(fixed[2]).ok_or(SyncError::UnknownFileType(fixed[2]))?;
        let relative_path = self.read_string().await?;

        let header = DialogHeader {
            version,
            action,
            file_type,
            relative_path,
        };
        self.header = Some(header.clone());
        Ok(header)
    }

    /// Whether the last [`read`](Self::read) got everything it asked for.
    /// `false` means the peer closed the stream.
    pub fn has_data(&self) -> bool {
        self.has_data
    }

    /// Read up to `n` bytes, accumulating partial reads until `n` bytes are
    /// collected or the stream is exhausted.
    pub async fn read(&mut self, n: usize) -> Result<Bytes> {
        let mut buf = BytesMut::zeroed(n);
        let mut filled = 0;
        while filled < n {
            let read = self.stream.read(&mut buf[filled..]).await?;
            if read == 0 {
                break;
            }
            filled += read;
        }
        buf.truncate(filled);
        self.has_data = filled == n;
        Ok(buf.freeze())
    }

    /// Read an i32-length-prefixed UTF-8 string.
    pub async fn read_string(&mut self) -> Result<String> {
        let len_bytes = self.read_exact_field(4, "string length").await?;
        let len = i32::from_le_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]);
        let len = check_string_len(len)?;
        let raw = self.read_exact_field(len, "string").await?;
        String::from_utf8(raw.to_vec())
            .map_err(|_| SyncError::Protocol("Invalid UTF-8 in string field".to_string()))
    }

    /// Write a single acknowledgment byte (1 = send it, 0 = skip).
    pub async fn notify(&mut self, action_needed: bool) -> Result<()> {
        self.stream.write_all(&[action_needed as u8]).await?;
        self.stream.flush().await?;
        Ok(())
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    async fn read_exact_field(&mut self, n: usize, what: &str) -> Result<Bytes> {
        let bytes = self.read(n).await?;
        if !self.has_data {
            return Err(SyncError::Protocol(format!(
                "Truncated {}: expected {} bytes, got {}",
                what,
                n,
                bytes.len()
            )));
        }
        Ok(bytes)
    }
}
