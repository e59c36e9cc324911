use lazy_static::lazy_static;
use prometheus::{register_int_counter, register_int_gauge, Encoder, IntCounter, IntGauge, TextEncoder};

lazy_static! {
    pub(crate) static ref ROWS_STREAMED: IntCounter = register_int_counter!(
        "couch_stream_rows_total",
        "Total number of rows and changes read from streaming results"
    )
    .expect("metric can be registered");
    pub(crate) static ref BUFFERED_BYTES: IntGauge = register_int_gauge!(
        "couch_stream_buffered_bytes",
        "Bytes currently held in the token reader buffer"
    )
    .expect("metric can be registered");
}

/// Renders every registered metric in the Prometheus text format.
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
