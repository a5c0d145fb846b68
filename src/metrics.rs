//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use lazy_static::lazy_static;
use prometheus::{IntCounter, IntCounterVec, Opts, Registry};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("clipstream_http_requests_total", "Total number of HTTP requests"),
        &["method", "endpoint", "status"]
    ).expect("metric can be created");

    // Domain Metrics
    pub static ref VIDEO_VIEWS_TOTAL: IntCounter = IntCounter::new(
        "clipstream_video_views_total",
        "Total number of recorded video views"
    ).expect("metric can be created");
    pub static ref MEDIA_UPLOADS_TOTAL: IntCounter = IntCounter::new(
        "clipstream_media_uploads_total",
        "Total number of media uploads"
    ).expect("metric can be created");
    pub static ref TOKENS_ISSUED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("clipstream_tokens_issued_total", "Total number of tokens issued"),
        &["kind"]
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("clipstream_errors_total", "Total number of errors"),
        &["error_type"]
    ).expect("metric can be created");
}

/// Initialize metrics registry.
pub fn init_metrics() {
    REGISTRY
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .expect("HTTP_REQUESTS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(VIDEO_VIEWS_TOTAL.clone()))
        .expect("VIDEO_VIEWS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(MEDIA_UPLOADS_TOTAL.clone()))
        .expect("MEDIA_UPLOADS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(TOKENS_ISSUED_TOTAL.clone()))
        .expect("TOKENS_ISSUED_TOTAL can be registered");
    REGISTRY
        .register(Box::new(ERRORS_TOTAL.clone()))
        .expect("ERRORS_TOTAL can be registered");

    tracing::info!("Metrics registry initialized");
}
