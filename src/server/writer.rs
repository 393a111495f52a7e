use crate::{
    errors::Error,
    http::{response::Response, types},
};
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;

// Chunk size for copying a streamed body to the egress writer.
const STREAM_CHUNK: usize = 8 * 1024;
// Egress is flushed whenever at least this much is unflushed.
const FLUSH_THRESHOLD: usize = 64 * 1024;

// Serializes one response to the egress writer.
//
// `Content-Length` and `Connection` are always server-emitted; user headers
// with either name are dropped. A body stream takes precedence over the
// byte-array body, and a stream of unknown length cannot be framed under
// keep-alive, so the effective keep-alive flag is returned to the caller
// together with the number of body bytes written.
pub(crate) async fn write_response<W>(
    egress: &mut BufWriter<W>,
    response: &mut Response,
    keep_alive: bool,
    cancel: &CancellationToken,
) -> Result<(bool, u64), Error>
where
    W: AsyncWrite + Unpin,
{
    let mut keep_alive = keep_alive;

    let content_length = match &response.body_stream {
        Some(stream) => match stream.remaining() {
            Some(remaining) => Some(remaining),
            None => {
                keep_alive = false;
                None
            }
        },
        None => Some(response.body.len() as u64),
    };

    let mut head = Vec::with_capacity(256);
    let mut digits = itoa::Buffer::new();

    head.extend_from_slice(b"HTTP/1.1 ");
    head.extend_from_slice(digits.format(response.status).as_bytes());
    head.push(b' ');
    head.extend_from_slice(reason_phrase(response).as_bytes());
    head.extend_from_slice(b"\r\n");

    if let Some(length) = content_length {
        head.extend_from_slice(b"Content-Length: ");
        head.extend_from_slice(digits.format(length).as_bytes());
        head.extend_from_slice(b"\r\n");
    }
    head.extend_from_slice(b"Connection: ");
    head.extend_from_slice(match keep_alive {
        true => b"keep-alive" as &[u8],
        false => b"close",
    });
    head.extend_from_slice(b"\r\n");

    for (name, value) in &response.headers {
        if is_reserved(name) {
            continue;
        }
        head.extend_from_slice(name.as_bytes());
        head.extend_from_slice(b": ");
        head.extend_from_slice(value.as_bytes());
        head.extend_from_slice(b"\r\n");
    }
    head.extend_from_slice(b"\r\n");

    write_all(egress, &head, cancel).await?;
    let mut unflushed = head.len();

    let written = match response.body_stream.take() {
        Some(mut stream) => {
            let mut written: u64 = 0;
            let mut chunk = [0u8; STREAM_CHUNK];
            loop {
                let read = tokio::select! {
                    biased;

                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                    read = stream.reader.read(&mut chunk) => read?,
                };
                if read == 0 {
                    break;
                }

                write_all(egress, &chunk[..read], cancel).await?;
                written += read as u64;
                unflushed += read;
                if unflushed >= FLUSH_THRESHOLD {
                    flush(egress, cancel).await?;
                    unflushed = 0;
                }
            }
            written
        }
        None => {
            write_all(egress, &response.body, cancel).await?;
            response.body.len() as u64
        }
    };

    flush(egress, cancel).await?;

    Ok((keep_alive, written))
}

#[inline]
fn reason_phrase(response: &Response) -> &str {
    match response.reason.is_empty() {
        true => types::canonical_reason(response.status),
        false => &response.reason,
    }
}

#[inline]
fn is_reserved(name: &str) -> bool {
    name.eq_ignore_ascii_case("content-length") || name.eq_ignore_ascii_case("connection")
}

#[inline]
async fn write_all<W: AsyncWrite + Unpin>(
    egress: &mut BufWriter<W>,
    bytes: &[u8],
    cancel: &CancellationToken,
) -> Result<(), Error> {
    tokio::select! {
        biased;

        _ = cancel.cancelled() => Err(Error::Cancelled),
        result = egress.write_all(bytes) => Ok(result?),
    }
}

#[inline]
async fn flush<W: AsyncWrite + Unpin>(
    egress: &mut BufWriter<W>,
    cancel: &CancellationToken,
) -> Result<(), Error> {
    tokio::select! {
        biased;

        _ = cancel.cancelled() => Err(Error::Cancelled),
        result = egress.flush() => Ok(result?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::response::BodyStream;
    use std::io::Cursor;
    use tokio::io::AsyncReadExt;

    async fn render(response: &mut Response, keep_alive: bool) -> (bool, u64, Vec<u8>) {
        let (mut client, server) = tokio::io::duplex(1 << 20);
        let mut egress = BufWriter::new(server);

        let (effective, written) =
            write_response(&mut egress, response, keep_alive, &CancellationToken::new())
                .await
                .unwrap();
        egress.shutdown().await.unwrap();
        drop(egress);

        let mut wire = Vec::new();
        client.read_to_end(&mut wire).await.unwrap();
        (effective, written, wire)
    }

    fn wire_str(wire: &[u8]) -> &str {
        std::str::from_utf8(wire).unwrap()
    }

    #[tokio::test]
    async fn buffered_body_framing() {
        let mut response = Response::new();
        response.status(200).body("hello");

        let (keep_alive, written, wire) = render(&mut response, true).await;

        assert!(keep_alive);
        assert_eq!(written, 5);
        assert_eq!(
            wire_str(&wire),
            "HTTP/1.1 200 OK\r\nContent-Length: 5\r\nConnection: keep-alive\r\n\r\nhello"
        );
    }

    #[tokio::test]
    async fn canonical_and_custom_reasons() {
        #[rustfmt::skip]
        let cases = [
            (200, "",          "HTTP/1.1 200 OK\r\n"),
            (400, "",          "HTTP/1.1 400 Bad Request\r\n"),
            (404, "",          "HTTP/1.1 404 Not Found\r\n"),
            (500, "",          "HTTP/1.1 500 Internal Server Error\r\n"),
            (418, "",          "HTTP/1.1 418 Unknown\r\n"),
            (200, "All Good",  "HTTP/1.1 200 All Good\r\n"),
        ];

        for (status, reason, first_line) in cases {
            let mut response = Response::new();
            response.status(status).reason(reason);

            let (_, _, wire) = render(&mut response, true).await;
            assert!(wire_str(&wire).starts_with(first_line), "{status} {reason:?}");
        }
    }

    #[tokio::test]
    async fn reserved_user_headers_are_dropped() {
        let mut response = Response::new();
        response
            .status(200)
            .header("Content-Length", "999")
            .header("connection", "upgrade")
            .header("X-Custom", "kept")
            .body("ok");

        let (_, _, wire) = render(&mut response, true).await;
        let wire = wire_str(&wire);

        assert_eq!(wire.matches("Content-Length").count(), 1);
        assert!(wire.contains("Content-Length: 2\r\n"));
        assert_eq!(wire.to_ascii_lowercase().matches("connection").count(), 1);
        assert!(wire.contains("Connection: keep-alive\r\n"));
        assert!(wire.contains("X-Custom: kept\r\n"));
    }

    #[tokio::test]
    async fn user_headers_keep_insertion_order() {
        let mut response = Response::new();
        response
            .status(200)
            .header("x-order", "one")
            .header("x-order", "two")
            .header("x-other", "three")
            .body("");

        let (_, _, wire) = render(&mut response, true).await;
        let wire = wire_str(&wire);

        let one = wire.find("x-order: one").unwrap();
        let two = wire.find("x-order: two").unwrap();
        let three = wire.find("x-other: three").unwrap();
        assert!(one < two && two < three);
    }

    #[tokio::test]
    async fn sized_stream_keeps_connection_alive() {
        let payload = vec![7u8; 10_000];
        let mut response = Response::new();
        response
            .status(200)
            .body_stream(BodyStream::new(Cursor::new(payload.clone()), Some(10_000)));

        let (keep_alive, written, wire) = render(&mut response, true).await;

        assert!(keep_alive);
        assert_eq!(written, 10_000);
        let wire = wire_str(&wire);
        assert!(wire.contains("Content-Length: 10000\r\n"));
        assert!(wire.contains("Connection: keep-alive\r\n"));
        let body_start = wire.find("\r\n\r\n").unwrap() + 4;
        assert_eq!(&wire.as_bytes()[body_start..], &payload[..]);
    }

    #[tokio::test]
    async fn unknown_length_stream_forces_close() {
        let mut response = Response::new();
        response
            .status(200)
            .body_stream(BodyStream::new(&b"streamed"[..], None));

        let (keep_alive, written, wire) = render(&mut response, true).await;

        assert!(!keep_alive);
        assert_eq!(written, 8);
        let wire = wire_str(&wire);
        assert!(!wire.contains("Content-Length"));
        assert!(wire.contains("Connection: close\r\n"));
        assert!(wire.ends_with("\r\n\r\nstreamed"));
    }

    #[tokio::test]
    async fn stream_takes_precedence_over_body() {
        let mut response = Response::new();
        response
            .status(200)
            .body("ignored")
            .body_stream(BodyStream::new(&b"wins"[..], Some(4)));

        let (_, written, wire) = render(&mut response, true).await;

        assert_eq!(written, 4);
        let wire = wire_str(&wire);
        assert!(wire.contains("Content-Length: 4\r\n"));
        assert!(wire.ends_with("\r\n\r\nwins"));
    }

    #[tokio::test]
    async fn keep_alive_false_is_preserved() {
        let mut response = Response::new();
        response.status(200).body("bye");

        let (keep_alive, _, wire) = render(&mut response, false).await;

        assert!(!keep_alive);
        assert!(wire_str(&wire).contains("Connection: close\r\n"));
    }

    #[tokio::test]
    async fn default_response_is_a_404() {
        let mut response = Response::new();

        let (_, written, wire) = render(&mut response, true).await;

        assert_eq!(written, 0);
        assert_eq!(
            wire_str(&wire),
            "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: keep-alive\r\n\r\n"
        );
    }

    #[tokio::test]
    async fn large_stream_is_flushed_periodically() {
        // Larger than the flush threshold so the periodic flush path runs.
        let payload = vec![3u8; 200_000];
        let mut response = Response::new();
        response
            .status(200)
            .body_stream(BodyStream::new(Cursor::new(payload.clone()), Some(200_000)));

        let (mut client, server) = tokio::io::duplex(1 << 14);
        let mut egress = BufWriter::new(server);
        let cancel = CancellationToken::new();

        let drain = tokio::spawn(async move {
            let mut wire = Vec::new();
            client.read_to_end(&mut wire).await.unwrap();
            wire
        });

        let (keep_alive, written) = write_response(&mut egress, &mut response, true, &cancel)
            .await
            .unwrap();
        egress.shutdown().await.unwrap();
        drop(egress);

        let wire = drain.await.unwrap();
        assert!(keep_alive);
        assert_eq!(written, 200_000);
        assert!(wire.ends_with(&payload[payload.len() - 100..]));
    }

    #[tokio::test]
    async fn cancellation_aborts_the_write() {
        let mut response = Response::new();
        response.status(200).body("late");

        let (_client, server) = tokio::io::duplex(1 << 16);
        let mut egress = BufWriter::new(server);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = write_response(&mut egress, &mut response, true, &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
