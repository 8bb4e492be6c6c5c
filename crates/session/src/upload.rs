//! Chunked upload writer for streaming sessions.
//!
//! Every file gets its own client-streaming `WriteStream` call. Chunks are
//! pushed through a bounded channel in file order, the request stream is
//! closed, and the daemon's acknowledgment is awaited before the next file is
//! opened.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::channel::mpsc;
use futures::{SinkExt, StreamExt};
use protocol::PathEntry;
use protocol::wire::{Chunk, WriteStreamRequest};
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

use crate::channel::Channel;
use crate::error::{IoResultExt, SessionError};

/// Frames buffered between the file reader and the RPC call.
const CHANNEL_DEPTH: usize = 8;

/// Totals for one upload pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UploadReport {
    /// Files acknowledged by the daemon.
    pub files: usize,
    /// Bytes sent.
    pub bytes: u64,
    /// Frames sent.
    pub chunks: usize,
}

impl UploadReport {
    fn add(&mut self, bytes: u64, chunks: usize) {
        self.files += 1;
        self.bytes += bytes;
        self.chunks += chunks;
    }
}

/// Streams local files to the daemon in fixed-size chunks.
#[derive(Clone)]
pub struct ChunkedUploadWriter {
    channel: Channel,
    chunk_size: usize,
    ack_timeout: Duration,
}

impl ChunkedUploadWriter {
    /// Creates a writer; a zero `chunk_size` is treated as one byte.
    pub fn new(channel: Channel, chunk_size: usize, ack_timeout: Duration) -> Self {
        Self {
            channel,
            chunk_size: chunk_size.max(1),
            ack_timeout,
        }
    }

    /// Uploads every entry in order; the first failure aborts the pass.
    pub async fn upload(
        &self,
        transfer_id: &str,
        entries: &[PathEntry],
    ) -> Result<UploadReport, SessionError> {
        let mut report = UploadReport::default();
        for entry in entries {
            let (bytes, chunks) = self.upload_file(transfer_id, entry).await?;
            report.add(bytes, chunks);
        }
        info!(
            %transfer_id,
            files = report.files,
            bytes = report.bytes,
            chunks = report.chunks,
            "stream upload finished"
        );
        Ok(report)
    }

    async fn upload_file(
        &self,
        transfer_id: &str,
        entry: &PathEntry,
    ) -> Result<(u64, usize), SessionError> {
        let source = PathBuf::from(&entry.source);
        let mut file = File::open(&source).await.with_path(&source)?;
        let size = file.metadata().await.with_path(&source)?.len();
        let name = stream_name(entry, &source);
        debug!(source = %source.display(), path = %name, size, "streaming file");

        let (mut frames, requests) = mpsc::channel(CHANNEL_DEPTH);
        let channel = self.channel.clone();
        let mut call = tokio::spawn(async move { channel.write_stream(requests.boxed()).await });

        let header = FrameHeader {
            transfer_id,
            path: &name,
            size,
        };
        let pumped = self.pump(&mut file, &source, &header, &mut frames).await;
        drop(frames);
        let (bytes, chunks) = match pumped {
            Ok(totals) => totals,
            Err(e) => {
                call.abort();
                return Err(e);
            }
        };

        let Ok(joined) = tokio::time::timeout(self.ack_timeout, &mut call).await else {
            call.abort();
            return Err(SessionError::Timeout {
                operation: "write stream acknowledgment",
                after: self.ack_timeout,
            });
        };
        let ack = joined?.map_err(|status| SessionError::rpc("WriteStream", status))?;
        if let Some(err) = ack.error.filter(|e| e.code != 0 || !e.description.is_empty()) {
            return Err(SessionError::Rejected {
                code: err.code,
                description: err.description,
            });
        }
        debug!(path = %name, bytes, chunks, "file acknowledged");
        Ok((bytes, chunks))
    }

    async fn pump(
        &self,
        file: &mut File,
        source: &Path,
        header: &FrameHeader<'_>,
        frames: &mut mpsc::Sender<WriteStreamRequest>,
    ) -> Result<(u64, usize), SessionError> {
        let mut buffer = vec![0_u8; self.chunk_size];
        let mut bytes = 0_u64;
        let mut chunks = 0_usize;
        loop {
            let filled = fill(file, &mut buffer).await.with_path(source)?;
            if filled == 0 && chunks > 0 {
                break;
            }
            if frames.send(header.frame(&buffer[..filled])).await.is_err() {
                // The call ended early; its own result carries the reason.
                break;
            }
            bytes += filled as u64;
            chunks += 1;
            if filled < buffer.len() {
                break;
            }
        }
        Ok((bytes, chunks))
    }
}

struct FrameHeader<'a> {
    transfer_id: &'a str,
    path: &'a str,
    size: u64,
}

impl FrameHeader<'_> {
    fn frame(&self, contents: &[u8]) -> WriteStreamRequest {
        WriteStreamRequest {
            transfer_id: self.transfer_id.to_owned(),
            path: self.path.to_owned(),
            size: self.size,
            chunk: Some(Chunk {
                contents: contents.to_vec(),
            }),
        }
    }
}

/// Reads until `buffer` is full or the file ends.
async fn fill(file: &mut File, buffer: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        let read = file.read(&mut buffer[filled..]).await?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    Ok(filled)
}

/// Name the daemon stores the stream under: the destination when given,
/// otherwise the source file name.
fn stream_name(entry: &PathEntry, source: &Path) -> String {
    entry
        .destination
        .clone()
        .filter(|d| !d.is_empty())
        .or_else(|| {
            source
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| entry.source.clone())
}
