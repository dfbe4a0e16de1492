// In-memory transport channel that records every call

use async_trait::async_trait;
use bytes::Bytes;
use http::StatusCode;
use lintel_core::{FileResource, FullResponse, HeaderMap, Readiness, ResponseHead, TransportChannel};
use std::io;
use std::path::PathBuf;
use tokio::io::AsyncReadExt;

/// One call made on a [`RecordingChannel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelOp {
    Buffered {
        status: StatusCode,
        headers: HeaderMap,
        body: Bytes,
    },
    Head {
        status: StatusCode,
        headers: HeaderMap,
    },
    Chunk(Bytes),
    /// Bytes actually read from the file handed over for zero-copy.
    ZeroCopy {
        path: PathBuf,
        length: u64,
        contents: Bytes,
    },
    Terminal,
    Abort,
}

/// Transport channel for tests.
///
/// Records the order of writes, can pretend to support zero-copy, and can
/// simulate a peer that disconnects or a socket that fails.
#[derive(Debug, Default)]
pub struct RecordingChannel {
    ops: Vec<ChannelOp>,
    zero_copy: bool,
    cancel_after: Option<usize>,
    fail_chunk_at: Option<usize>,
    ready_calls: usize,
    chunks_written: usize,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advertise zero-copy support.
    pub fn with_zero_copy(mut self) -> Self {
        self.zero_copy = true;
        self
    }

    /// Report `Readiness::Cancelled` once `ready()` was answered `n` times.
    pub fn cancel_after(mut self, n: usize) -> Self {
        self.cancel_after = Some(n);
        self
    }

    /// Fail the `n`th chunk write (zero-based) with a broken pipe.
    pub fn fail_chunk_at(mut self, n: usize) -> Self {
        self.fail_chunk_at = Some(n);
        self
    }

    pub fn ops(&self) -> &[ChannelOp] {
        &self.ops
    }

    pub fn ready_calls(&self) -> usize {
        self.ready_calls
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Status of the buffered response or the streamed head.
    pub fn status(&self) -> Option<StatusCode> {
        self.ops.iter().find_map(|op| match op {
            ChannelOp::Buffered { status, .. } | ChannelOp::Head { status, .. } => Some(*status),
            _ => None,
        })
    }

    /// Headers of the buffered response or the streamed head.
    pub fn headers(&self) -> Option<&HeaderMap> {
        self.ops.iter().find_map(|op| match op {
            ChannelOp::Buffered { headers, .. } | ChannelOp::Head { headers, .. } => Some(headers),
            _ => None,
        })
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers()?.get(name).map(String::as_str)
    }

    /// Every body byte that reached the channel, in order.
    pub fn body(&self) -> Bytes {
        let mut body = Vec::new();
        for op in &self.ops {
            match op {
                ChannelOp::Buffered { body: b, .. } | ChannelOp::Chunk(b) => body.extend_from_slice(b),
                ChannelOp::ZeroCopy { contents, .. } => body.extend_from_slice(contents),
                _ => {}
            }
        }
        Bytes::from(body)
    }

    pub fn chunk_count(&self) -> usize {
        self.count(|op| matches!(op, ChannelOp::Chunk(_)))
    }

    pub fn terminal_count(&self) -> usize {
        self.count(|op| matches!(op, ChannelOp::Terminal))
    }

    pub fn is_buffered(&self) -> bool {
        self.count(|op| matches!(op, ChannelOp::Buffered { .. })) == 1
    }

    pub fn used_zero_copy(&self) -> bool {
        self.count(|op| matches!(op, ChannelOp::ZeroCopy { .. })) > 0
    }

    pub fn aborted(&self) -> bool {
        self.count(|op| matches!(op, ChannelOp::Abort)) > 0
    }

    fn count(&self, predicate: impl Fn(&ChannelOp) -> bool) -> usize {
        self.ops.iter().filter(|op| predicate(op)).count()
    }
}

#[async_trait]
impl TransportChannel for RecordingChannel {
    async fn write_buffered(&mut self, response: FullResponse) -> io::Result<()> {
        self.ops.push(ChannelOp::Buffered {
            status: response.head.status,
            headers: response.head.headers,
            body: response.body,
        });
        Ok(())
    }

    async fn write_head(&mut self, head: ResponseHead) -> io::Result<()> {
        self.ops.push(ChannelOp::Head {
            status: head.status,
            headers: head.headers,
        });
        Ok(())
    }

    async fn write_stream_chunk(&mut self, chunk: Bytes) -> io::Result<()> {
        let index = self.chunks_written;
        self.chunks_written += 1;
        if self.fail_chunk_at == Some(index) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "simulated socket failure"));
        }
        self.ops.push(ChannelOp::Chunk(chunk));
        Ok(())
    }

    async fn write_terminal(&mut self) -> io::Result<()> {
        self.ops.push(ChannelOp::Terminal);
        Ok(())
    }

    fn supports_zero_copy(&self) -> bool {
        self.zero_copy
    }

    async fn write_zero_copy(&mut self, file: FileResource, length: u64) -> io::Result<()> {
        if !self.zero_copy {
            return Err(io::Error::new(io::ErrorKind::Unsupported, "zero-copy disabled"));
        }
        let path = file.path().to_path_buf();
        let mut contents = Vec::new();
        file.into_file().take(length).read_to_end(&mut contents).await?;
        self.ops.push(ChannelOp::ZeroCopy {
            path,
            length,
            contents: Bytes::from(contents),
        });
        Ok(())
    }

    async fn ready(&mut self) -> Readiness {
        self.ready_calls += 1;
        match self.cancel_after {
            Some(n) if self.ready_calls > n => Readiness::Cancelled,
            _ => Readiness::Writable,
        }
    }

    async fn abort(&mut self) {
        self.ops.push(ChannelOp::Abort);
    }
}
