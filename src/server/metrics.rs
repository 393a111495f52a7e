//! Measurement instruments for the server engine.
//!
//! The engine only records; export is wired up by the embedding process
//! through an opentelemetry metrics provider. Without one the instruments
//! are no-ops, so recording can never fail a request.

use crate::http::types::Method;
use opentelemetry::{
    global,
    metrics::{Counter, Histogram, Unit, UpDownCounter},
    Context as OtelContext, KeyValue,
};
use std::time::Duration;

const METER_NAME: &str = "bolt_web.server";

pub(crate) struct Metrics {
    open_connections: UpDownCounter<i64>,
    requests: Counter<u64>,
    duration: Histogram<u64>,
    errors: Counter<u64>,
    request_body_bytes: Counter<u64>,
    response_body_bytes: Counter<u64>,
}

impl Metrics {
    pub(crate) fn new() -> Self {
        let meter = global::meter(METER_NAME);

        Metrics {
            open_connections: meter
                .i64_up_down_counter("http.server.open_connections")
                .with_description("Connections currently open.")
                .init(),

            requests: meter
                .u64_counter("http.server.requests")
                .with_description("Requests processed to completion.")
                .init(),

            duration: meter
                .u64_histogram("http.server.duration")
                .with_description(
                    "Time from dispatch start to completion of the response write.",
                )
                .with_unit(Unit::new("ms"))
                .init(),

            errors: meter
                .u64_counter("http.server.errors")
                .with_description("Requests that failed in middleware or a handler.")
                .init(),

            request_body_bytes: meter
                .u64_counter("http.server.request.body.size")
                .with_description("Request body bytes received.")
                .with_unit(Unit::new("By"))
                .init(),

            response_body_bytes: meter
                .u64_counter("http.server.response.body.size")
                .with_description("Response body bytes written.")
                .with_unit(Unit::new("By"))
                .init(),
        }
    }

    pub(crate) fn connection_opened(&self) {
        self.open_connections.add(&OtelContext::current(), 1, &[]);
    }

    pub(crate) fn connection_closed(&self) {
        self.open_connections.add(&OtelContext::current(), -1, &[]);
    }

    pub(crate) fn record_request(
        &self,
        method: Method,
        status: u16,
        secure: bool,
        keep_alive: bool,
        elapsed: Duration,
        received: u64,
        written: u64,
    ) {
        let attributes = [
            KeyValue::new("http.method", method.as_str()),
            KeyValue::new("http.status_code", i64::from(status)),
            KeyValue::new("http.scheme", scheme(secure)),
            KeyValue::new("http.keep_alive", keep_alive),
        ];
        let otel = OtelContext::current();

        self.requests.add(&otel, 1, &attributes);
        self.duration.record(
            &otel,
            elapsed.as_millis().try_into().unwrap_or(u64::MAX),
            &attributes,
        );
        self.request_body_bytes.add(&otel, received, &attributes);
        self.response_body_bytes.add(&otel, written, &attributes);
    }

    pub(crate) fn record_error(&self, method: Method, secure: bool) {
        let attributes = [
            KeyValue::new("http.method", method.as_str()),
            KeyValue::new("http.scheme", scheme(secure)),
        ];

        self.errors.add(&OtelContext::current(), 1, &attributes);
    }
}

#[inline(always)]
const fn scheme(secure: bool) -> &'static str {
    match secure {
        true => "https",
        false => "http",
    }
}
