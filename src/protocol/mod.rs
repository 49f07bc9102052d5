//! Wire protocol for one operation per connection.
//!
//! # Framing
//!
//! All integers are fixed-width little-endian; strings are UTF-8 with an i32
//! length prefix and no terminator.
//!
//! ```text
//! header:  version:u8 | action:u8 | file_type:u8 | path_len:i32 | path
//! rename:  header | new_name_len:i32 | new_name
//! change:  header | file_digest:H  <- ack:u8
//!          then, if ack == 1, until the sender closes:
//!          segment_digest:H  <- ack:u8  | segment bytes (if ack == 1)
//! ```
//!
//! The segment loop has no terminator: the receiver stops when a digest read
//! comes back short because the sender shut down its write half.

pub mod receiver;
pub mod sender;

pub use receiver::ReceiverDialog;
pub use sender::SenderDialog;

use crate::error::{Result, SyncError};
use crate::operation::{FileAction, FileType, Operation};
use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncWrite};

/// Current protocol version, always the first header byte.
pub const PROTOCOL_VERSION: u8 = 1;

/// Upper bound for length-prefixed strings (paths).
pub const MAX_PATH_LEN: usize = 64 * 1024;

/// Fixed part of the header before the path bytes.
pub const HEADER_FIXED_LEN: usize = 1 + 1 + 1 + 4;

/// Any bidirectional byte stream a dialog can run over.
pub trait Connection: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> Connection for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

/// Sender dialog over a type-erased connection, as handed to strategies.
pub type ClientDialog = SenderDialog<Box<dyn Connection>>;

/// Receiver dialog over a type-erased connection, as handed to strategies.
pub type ServerDialog = ReceiverDialog<Box<dyn Connection>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogHeader {
    pub version: u8,
    pub action: FileAction,
    pub file_type: FileType,
    pub relative_path: String,
}

impl DialogHeader {
    pub fn new(action: FileAction, file_type: FileType, relative_path: impl Into<String>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            action,
            file_type,
            relative_path: relative_path.into(),
        }
    }

    pub fn for_operation(op: &Operation) -> Self {
        Self::new(op.action(), op.file_type, op.relative_path.clone())
    }

    pub fn encode(&self) -> Bytes {
        let path = self.relative_path.as_bytes();
        let mut buf = BytesMut::with_capacity(HEADER_FIXED_LEN + path.len());
        buf.put_u8(self.version);
        buf.put_u8(self.action as u8);
        buf.put_u8(self.file_type as u8);
        put_string(&mut buf, &self.relative_path);
        buf.freeze()
    }
}

/// Append an i32-length-prefixed UTF-8 string.
pub fn put_string(buf: &mut BytesMut, s: &str) {
    buf.put_i32_le(s.len() as i32);
    buf.put_slice(s.as_bytes());
}

pub fn encode_string(s: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(4 + s.len());
    put_string(&mut buf, s);
    buf.freeze()
}

/// Validate a decoded length prefix before allocating for it.
fn check_string_len(len: i32) -> Result<usize> {
    if len < 0 {
        return Err(SyncError::Protocol(format!("Negative string length {}", len)));
    }
    let len = len as usize;
    if len > MAX_PATH_LEN {
        return Err(SyncError::Protocol(format!(
            "String length {} exceeds maximum {}",
            len, MAX_PATH_LEN
        )));
    }
    Ok(len)
}
