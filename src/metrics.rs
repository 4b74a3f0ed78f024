//! Prometheus metrics for chat turns
//!
//! Metrics live in the default registry; `gather_text` renders them in the
//! text exposition format.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram, Counter, CounterVec, Encoder,
    Histogram, TextEncoder,
};

lazy_static! {
    /// Finished chat turns.
    ///
    /// Labels:
    /// - outcome: "completed" or "cancelled"
    pub static ref CHAT_TURNS: CounterVec = register_counter_vec!(
        "neurochat_turns_total",
        "Chat turns by outcome",
        &["outcome"]
    ).expect("failed to register CHAT_TURNS metric");

    /// Text fragments received from the model.
    pub static ref FRAGMENTS_TOTAL: Counter = register_counter!(
        "neurochat_fragments_total",
        "Response fragments streamed from the model"
    ).expect("failed to register FRAGMENTS_TOTAL metric");

    /// Non-fatal stream problems.
    ///
    /// Labels:
    /// - kind: "transport" or "decode"
    pub static ref STREAM_ERRORS: CounterVec = register_counter_vec!(
        "neurochat_stream_errors_total",
        "Stream errors reported during generation",
        &["kind"]
    ).expect("failed to register STREAM_ERRORS metric");

    /// Tokens the server reports having generated.
    pub static ref TOKENS_GENERATED: Counter = register_counter!(
        "neurochat_tokens_generated_total",
        "Tokens generated according to the final frame"
    ).expect("failed to register TOKENS_GENERATED metric");

    /// Wall time of a generation, from request to last fragment.
    pub static ref GENERATION_DURATION: Histogram = register_histogram!(
        "neurochat_generation_duration_seconds",
        "Time spent streaming one response",
        vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]
    ).expect("failed to register GENERATION_DURATION metric");
}

/// Render every registered metric as Prometheus text
pub fn gather_text() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if encoder.encode(&prometheus::gather(), &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
