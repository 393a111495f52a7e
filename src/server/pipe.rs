use bytes::{Bytes, BytesMut};
use std::io;
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    sync::mpsc,
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

// Minimum capacity of each pipe-owned read segment.
const SEGMENT_CAPACITY: usize = 4 * 1024;
// Segments buffered between the filler and the processor.
const PIPE_DEPTH: usize = 16;

// Consumer half of the ingress pipe.
//
// Yields segments as the filler produces them, an `Err` when the stream
// failed, and `None` once the stream reached end-of-input (or the filler
// stopped after cancellation).
pub(crate) struct IngressPipe {
    segments: mpsc::Receiver<io::Result<Bytes>>,
}

impl IngressPipe {
    #[inline]
    pub(crate) async fn next_segment(&mut self) -> Option<io::Result<Bytes>> {
        self.segments.recv().await
    }
}

// Spawns the filler task: reads the stream into pipe-owned segments until
// end-of-input, pipe closure or cancellation. Read errors are forwarded
// through the pipe so the processor observes them in order.
pub(crate) fn spawn_filler<R>(
    mut reader: R,
    cancel: CancellationToken,
) -> (IngressPipe, JoinHandle<()>)
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let (tx, rx) = mpsc::channel(PIPE_DEPTH);

    let handle = tokio::spawn(async move {
        loop {
            let mut segment = BytesMut::with_capacity(SEGMENT_CAPACITY);

            let read = tokio::select! {
                biased;

                _ = cancel.cancelled() => break,
                read = reader.read_buf(&mut segment) => read,
            };

            match read {
                Ok(0) => break,
                Ok(_) => {
                    let delivered = tokio::select! {
                        biased;

                        _ = cancel.cancelled() => false,
                        sent = tx.send(Ok(segment.freeze())) => sent.is_ok(),
                    };
                    if !delivered {
                        break;
                    }
                }
                Err(err) => {
                    let _ = tx.send(Err(err)).await;
                    break;
                }
            }
        }
    });

    (IngressPipe { segments: rx }, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn delivers_bytes_then_eof() {
        let (mut client, server) = tokio::io::duplex(1 << 16);
        let (mut pipe, filler) = spawn_filler(server, CancellationToken::new());

        client.write_all(b"hello").await.unwrap();
        client.shutdown().await.unwrap();
        drop(client);

        let mut collected = Vec::new();
        while let Some(segment) = pipe.next_segment().await {
            collected.extend_from_slice(&segment.unwrap());
        }

        assert_eq!(collected, b"hello");
        filler.await.unwrap();
    }

    #[tokio::test]
    async fn cancellation_stops_the_filler() {
        let (_client, server) = tokio::io::duplex(1 << 16);
        let cancel = CancellationToken::new();
        let (mut pipe, filler) = spawn_filler(server, cancel.clone());

        cancel.cancel();
        filler.await.unwrap();
        assert!(pipe.next_segment().await.is_none());
    }

    #[tokio::test]
    async fn dropping_the_pipe_stops_the_filler() {
        let (mut client, server) = tokio::io::duplex(8);
        let (pipe, filler) = spawn_filler(server, CancellationToken::new());
        drop(pipe);

        // The filler exits on its next failed send even while the peer
        // keeps writing.
        let writer = tokio::spawn(async move {
            let _ = client.write_all(&[0u8; 4096]).await;
        });

        filler.await.unwrap();
        writer.abort();
    }
}
