//! Dedicated writer task for outbound frames.
//!
//! Every component that talks to the board (dispatcher, heartbeat, channel
//! handles) holds a cheap [`WriterHandle`]; encoded frames go through an
//! mpsc channel to a single task that owns the write half of the transport.
//!
//! ```text
//! Dispatcher ─┐
//! Heartbeat  ─┼─► mpsc::Sender<OutboundFrame> ─► Writer Task ─► serial stream
//! Channels   ─┘
//! ```
//!
//! Frames queued together are written with one vectored write, so a burst
//! of mode changes during resync costs a single syscall on most transports.

use std::io::IoSlice;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{DyioError, Result};
use crate::protocol::HEADER_SIZE;

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Maximum frames to batch in a single write operation.
const MAX_BATCH_SIZE: usize = 64;

/// A frame ready to be written to the transport.
#[derive(Debug, Clone)]
pub struct OutboundFrame {
    /// Encoded header (11 bytes).
    pub header: [u8; HEADER_SIZE],
    /// Rpc name followed by the payload.
    pub body: Bytes,
}

impl OutboundFrame {
    /// Split an encoded frame into header and body.
    ///
    /// Returns a protocol error if `encoded` is shorter than a header.
    pub fn from_encoded(encoded: Vec<u8>) -> Result<Self> {
        if encoded.len() < HEADER_SIZE {
            return Err(DyioError::Protocol(format!(
                "Encoded frame too short: {} bytes",
                encoded.len()
            )));
        }

        let mut header = [0u8; HEADER_SIZE];
        header.copy_from_slice(&encoded[..HEADER_SIZE]);
        let mut body = Bytes::from(encoded);
        Ok(Self {
            header,
            body: body.split_off(HEADER_SIZE),
        })
    }

    /// Total size of this frame (header + body).
    #[inline]
    pub fn size(&self) -> usize {
        HEADER_SIZE + self.body.len()
    }
}

/// Configuration for the writer task.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Channel capacity for the frame queue.
    pub channel_capacity: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Handle for sending frames to the writer task.
#[derive(Clone, Debug)]
pub struct WriterHandle {
    tx: mpsc::Sender<OutboundFrame>,
}

impl WriterHandle {
    fn new(tx: mpsc::Sender<OutboundFrame>) -> Self {
        Self { tx }
    }

    /// Queue a frame, waiting for room in the channel if it is full.
    pub async fn send(&self, frame: OutboundFrame) -> Result<()> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| DyioError::ConnectionClosed)
    }

    /// Queue an already-encoded frame.
    pub async fn send_encoded(&self, encoded: Vec<u8>) -> Result<()> {
        self.send(OutboundFrame::from_encoded(encoded)?).await
    }
}

/// Spawn the writer task and return a handle for sending frames.
pub fn spawn_writer_task<W>(
    writer: W,
    config: WriterConfig,
) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
    let handle = WriterHandle::new(tx);
    let task = tokio::spawn(writer_loop(rx, writer));

    (handle, task)
}

async fn writer_loop<W>(
    mut rx: mpsc::Receiver<OutboundFrame>,
    mut writer: W,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        let first = match rx.recv().await {
            Some(f) => f,
            None => return Ok(()),
        };

        let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
        batch.push(first);
        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(frame) => batch.push(frame),
                Err(_) => break,
            }
        }

        let batch_size = batch.len();
        if let Err(e) = write_batch(&mut writer, &batch).await {
            tracing::error!("Write failed, dropping {} frame(s): {}", batch_size, e);
            return Err(e);
        }
        tracing::trace!("Wrote {} frame(s)", batch_size);
    }
}

/// Write a batch of frames with write_vectored, continuing after partial writes.
async fn write_batch<W>(writer: &mut W, batch: &[OutboundFrame]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if batch.is_empty() {
        return Ok(());
    }

    let total_size: usize = batch.iter().map(OutboundFrame::size).sum();
    let mut total_written = 0;

    while total_written < total_size {
        let slices = build_remaining_slices(batch, total_written);
        if slices.is_empty() {
            break;
        }

        let written = writer.write_vectored(&slices).await?;
        if written == 0 {
            return Err(DyioError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )));
        }
        total_written += written;
    }

    writer.flush().await?;
    Ok(())
}

/// Build IoSlice array for remaining data after a partial write.
fn build_remaining_slices(batch: &[OutboundFrame], skip_bytes: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(batch.len() * 2);
    let mut offset = 0;

    for frame in batch {
        let header_end = offset + HEADER_SIZE;
        if skip_bytes < header_end {
            let start = skip_bytes.saturating_sub(offset);
            slices.push(IoSlice::new(&frame.header[start..]));
        }
        offset = header_end;

        if !frame.body.is_empty() {
            let body_end = offset + frame.body.len();
            if skip_bytes < body_end {
                let start = skip_bytes.saturating_sub(offset);
                slices.push(IoSlice::new(&frame.body[start..]));
            }
            offset = body_end;
        }
    }

    slices
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{encode, rpc, BoardId, MethodType};
    use std::io::Cursor;
    use std::time::Duration;
    use tokio::io::duplex;

    fn ping() -> OutboundFrame {
        let bytes = encode(rpc::PING, MethodType::Post, BoardId::BROADCAST, &[]).unwrap();
        OutboundFrame::from_encoded(bytes).unwrap()
    }

    #[test]
    fn test_from_encoded_splits_header() {
        let frame = ping();
        assert_eq!(frame.header[0], 3);
        assert_eq!(&frame.body[..], b"_png");
        assert_eq!(frame.size(), HEADER_SIZE + 4);
    }

    #[test]
    fn test_from_encoded_rejects_short_input() {
        assert!(OutboundFrame::from_encoded(vec![3; 5]).is_err());
    }

    #[tokio::test]
    async fn test_writer_handle_send() {
        let (client, mut server) = duplex(4096);
        let (handle, _task) = spawn_writer_task(client, WriterConfig::default());

        handle.send(ping()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let mut buf = vec![0u8; 64];
        let n = tokio::io::AsyncReadExt::read(&mut server, &mut buf)
            .await
            .unwrap();
        assert_eq!(n, HEADER_SIZE + 4);
        assert_eq!(&buf[11..15], b"_png");
    }

    #[tokio::test]
    async fn test_writer_batching() {
        let (client, mut server) = duplex(4096);
        let (handle, _task) = spawn_writer_task(client, WriterConfig::default());

        for _ in 0..10 {
            handle.send(ping()).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut buf = vec![0u8; 1024];
        let mut total = 0;
        while total < 10 * (HEADER_SIZE + 4) {
            let n = tokio::io::AsyncReadExt::read(&mut server, &mut buf[total..])
                .await
                .unwrap();
            total += n;
        }
        assert_eq!(total, 10 * (HEADER_SIZE + 4));
    }

    #[test]
    fn test_build_remaining_slices_partial_header() {
        let batch = vec![ping()];
        let slices = build_remaining_slices(&batch, 5);
        assert_eq!(slices.len(), 2);
        assert_eq!(slices[0].len(), HEADER_SIZE - 5);
        assert_eq!(slices[1].len(), 4);
    }

    #[test]
    fn test_build_remaining_slices_skip_header() {
        let batch = vec![ping(), ping()];
        let slices = build_remaining_slices(&batch, HEADER_SIZE + 2);
        assert_eq!(slices.len(), 3);
        assert_eq!(slices[0].len(), 2);
        assert_eq!(slices[1].len(), HEADER_SIZE);
    }

    #[tokio::test]
    async fn test_write_batch_multiple() {
        let mut buf = Cursor::new(Vec::new());
        let batch: Vec<_> = (0..5).map(|_| ping()).collect();

        write_batch(&mut buf, &batch).await.unwrap();
        assert_eq!(buf.into_inner().len(), 5 * (HEADER_SIZE + 4));
    }

    #[tokio::test]
    async fn test_writer_shutdown_on_channel_close() {
        let (client, _server) = duplex(4096);
        let (handle, task) = spawn_writer_task(client, WriterConfig::default());

        drop(handle);
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_send_after_writer_gone() {
        let (tx, rx) = mpsc::channel::<OutboundFrame>(1);
        drop(rx);
        let handle = WriterHandle::new(tx);

        assert!(matches!(
            handle.send(ping()).await,
            Err(DyioError::ConnectionClosed)
        ));
    }
}
