use crate::{
    errors::Error,
    http::{
        parser::{self, ParseSetup, Parsed},
        request::Request,
        response::Response,
    },
    server::{
        context::{Context, Services},
        metrics::Metrics,
        pipe::{self, IngressPipe},
        pipeline::App,
        pools::Pool,
        writer,
    },
};
use bytes::{Buf, BytesMut};
use std::{net::SocketAddr, sync::Arc, time::Instant};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;

// Per-server state shared by every connection loop: the composed app, the
// service provider, the pools and the parser limits.
pub(crate) struct Engine {
    pub(crate) app: App,
    pub(crate) services: Arc<Services>,
    pub(crate) requests: Pool<Request>,
    pub(crate) responses: Pool<Response>,
    pub(crate) contexts: Pool<Context>,
    pub(crate) metrics: Option<Metrics>,
    pub(crate) max_header_count: usize,
    pub(crate) max_request_body_size: usize,
}

impl Engine {
    // Processes pipelined requests on one duplex stream until the client
    // closes, keep-alive drops, a protocol fault occurs or the token is
    // cancelled. The stream is dropped by the caller after return.
    pub(crate) async fn serve_connection<S>(
        &self,
        stream: S,
        secure: bool,
        remote: SocketAddr,
        local: SocketAddr,
        cancel: CancellationToken,
    ) -> Result<(), Error>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);

        let filler_cancel = cancel.child_token();
        let (mut pipe, filler) = pipe::spawn_filler(read_half, filler_cancel.clone());
        let mut egress = BufWriter::new(write_half);

        let result = self
            .process(&mut pipe, &mut egress, secure, remote, local, &cancel)
            .await;

        // Teardown order: processor first, then the filler, then the egress
        // writer. The filler's cancellation is expected and swallowed.
        filler_cancel.cancel();
        drop(pipe);
        let _ = filler.await;
        let _ = egress.shutdown().await;

        result
    }

    async fn process<W>(
        &self,
        pipe: &mut IngressPipe,
        egress: &mut BufWriter<W>,
        secure: bool,
        remote: SocketAddr,
        local: SocketAddr,
        cancel: &CancellationToken,
    ) -> Result<(), Error>
    where
        W: AsyncWrite + Unpin,
    {
        let setup = ParseSetup {
            secure,
            remote: Some(remote),
            local: Some(local),
            pool: Some(&self.requests),
            max_header_count: self.max_header_count,
            max_request_body_size: self.max_request_body_size,
        };
        let mut buffer = BytesMut::new();

        loop {
            // Drain every complete request already buffered before asking
            // the pipe for more. Requests never overlap: each one is fully
            // dispatched and written before the next parse begins.
            loop {
                let mut view: &[u8] = &buffer;
                match parser::parse(&mut view, &setup) {
                    Parsed::Success(request) => {
                        let consumed = buffer.len() - view.len();
                        buffer.advance(consumed);

                        if !self.dispatch(request, egress, secure, cancel).await? {
                            return Ok(());
                        }
                    }
                    Parsed::Incomplete => break,
                    Parsed::Rejected(err) => {
                        log::debug!("closing connection to {remote} on protocol fault: {err:?}");
                        return Ok(());
                    }
                }
            }

            let segment = tokio::select! {
                biased;

                _ = cancel.cancelled() => return Err(Error::Cancelled),
                segment = pipe.next_segment() => segment,
            };
            match segment {
                Some(Ok(segment)) => buffer.extend_from_slice(&segment),
                Some(Err(err)) => return Err(err.into()),
                None => {
                    if !buffer.is_empty() {
                        log::debug!("connection to {remote} ended mid-request");
                    }
                    return Ok(());
                }
            }
        }
    }

    // Runs one parsed request through the app and writes the response.
    // Returns the effective keep-alive. Pooled values are returned exactly
    // once on every path.
    async fn dispatch<W>(
        &self,
        request: Request,
        egress: &mut BufWriter<W>,
        secure: bool,
        cancel: &CancellationToken,
    ) -> Result<bool, Error>
    where
        W: AsyncWrite + Unpin,
    {
        let method = request.method();
        let keep_alive = request.keep_alive();
        let received = request.body().len() as u64;
        let started = self.metrics.as_ref().map(|_| Instant::now());

        let mut cx = self.contexts.acquire();
        cx.request = Some(request);
        cx.response = Some(self.responses.acquire());
        cx.services = Some(self.services.scope());

        match self.app.call(&mut cx, cancel).await {
            Ok(()) => {
                // The request is done with once the chain completes; hand it
                // back before the response goes out.
                if let Some(request) = cx.request.take() {
                    self.requests.release(request);
                }
                let mut response = cx.response.take().expect("response missing after dispatch");
                let status = response.status_code();

                let written = writer::write_response(egress, &mut response, keep_alive, cancel).await;

                self.responses.release(response);
                self.contexts.release(cx);

                let (effective, written) = written?;
                if let (Some(metrics), Some(started)) = (&self.metrics, started) {
                    metrics.record_request(
                        method,
                        status,
                        secure,
                        effective,
                        started.elapsed(),
                        received,
                        written,
                    );
                }
                Ok(effective)
            }
            Err(err) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_error(method, secure);
                }
                if let Some(request) = cx.request.take() {
                    self.requests.release(request);
                }
                if let Some(response) = cx.response.take() {
                    self.responses.release(response);
                }
                self.contexts.release(cx);
                Err(err)
            }
        }
    }
}
