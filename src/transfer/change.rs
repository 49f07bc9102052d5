//! Change transfer: whole-file digest first, then segment-by-segment
//! negotiation so only segments the receiver has never seen are sent.

use crate::error::{Result, SyncError};
use crate::hash::HashAlgorithm;
use crate::operation::{FileType, Operation};
use crate::protocol::{ClientDialog, DialogHeader};
use crate::transfer::{TransferReport, TransferStrategy};
use async_trait::async_trait;
use std::io::{Seek, SeekFrom};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt};

pub struct ChangeTransfer {
    segment_size: usize,
    hash: HashAlgorithm,
}

impl ChangeTransfer {
    pub fn new(segment_size: usize, hash: HashAlgorithm) -> Self {
        Self { segment_size, hash }
    }

    /// Open the source and hash it in full, leaving the handle rewound.
    async fn open_and_hash(&self, op: &Operation) -> Result<(File, Vec<u8>)> {
        let path = op.absolute_path.clone();
        let hash = self.hash;
        let (file, digest) = tokio::task::spawn_blocking(move || -> std::io::Result<_> {
            let mut file = std::fs::File::open(&path)?;
            let digest = hash.digest_reader(&mut file)?;
            file.seek(SeekFrom::Start(0))?;
            Ok((file, digest))
        })
        .await?
        .map_err(SyncError::io_at("read", &op.absolute_path))?;

        Ok((File::from_std(file), digest.as_bytes().to_vec()))
    }
}

#[async_trait]
impl TransferStrategy for ChangeTransfer {
    async fn execute(&self, op: &Operation, dialog: &mut ClientDialog) -> Result<TransferReport> {
        dialog.initiate(&DialogHeader::for_operation(op)).await?;
        if op.file_type == FileType::Directory {
            return Ok(TransferReport::default());
        }

        let (mut file, file_digest) = self.open_and_hash(op).await?;
        dialog.send_bytes(&file_digest).await?;

        if !dialog.action_needed().await? {
            tracing::debug!("{} unchanged on receiver", op.relative_path);
            return Ok(TransferReport {
                unchanged: true,
                ..Default::default()
            });
        }

        let mut report = TransferReport::default();
        let mut buf = vec![0u8; self.segment_size];
        loop {
            let n = read_segment(&mut file, &mut buf)
                .await
                .map_err(SyncError::io_at("read", &op.absolute_path))?;
            if n == 0 {
                break;
            }

            let segment = &buf[..n];
            let digest = self.hash.digest(segment);
            dialog.send_bytes(digest.as_bytes()).await?;

            if dialog.action_needed().await? {
                dialog.send_bytes(segment).await?;
                report.segments_sent += 1;
            } else {
                report.segments_cached += 1;
            }

            if n < buf.len() {
                break;
            }
        }

        tracing::debug!(
            "{}: {} segments sent, {} already cached",
            op.relative_path,
            report.segments_sent,
            report.segments_cached
        );
        Ok(report)
    }
}

/// Fill `buf` from `reader` unless end of file comes first, so every segment
/// but the last has exactly the configured size.
async fn read_segment<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
