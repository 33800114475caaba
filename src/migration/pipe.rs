// SPDX-License-Identifier: Apache-2.0

//! Bounded in-memory byte pipe between the export and load tasks.
//!
//! The writer blocks while `capacity` bytes are buffered and the reader
//! blocks while the pipe is empty. Shutting down or dropping the writer ends
//! the reader's stream; dropping the reader makes further writes fail with
//! `BrokenPipe`.

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};

pub fn bounded_pipe(capacity: usize) -> (PipeWriter, PipeReader) {
    let (write_half, read_half) = tokio::io::duplex(capacity.max(1));
    (
        PipeWriter {
            inner: write_half,
            written: Arc::new(AtomicU64::new(0)),
        },
        PipeReader { inner: read_half },
    )
}

#[derive(Debug)]
pub struct PipeWriter {
    inner: DuplexStream,
    written: Arc<AtomicU64>,
}

impl PipeWriter {
    /// Shared counter of bytes accepted by the pipe.
    pub fn byte_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.written)
    }
}

impl AsyncWrite for PipeWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let polled = Pin::new(&mut this.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(n)) = &polled {
            this.written.fetch_add(*n as u64, Ordering::Relaxed);
        }
        polled
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

#[derive(Debug)]
pub struct PipeReader {
    inner: DuplexStream,
}

impl AsyncRead for PipeReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
    }
}
