use std::sync::atomic::{AtomicU64, Ordering};

/// Track pipeline metrics without external dependencies.
pub(crate) struct Metrics;

static SENT_MESSAGES: AtomicU64 = AtomicU64::new(0);
static RECEIVED_MESSAGES: AtomicU64 = AtomicU64::new(0);
static ENCODE_ERRORS: AtomicU64 = AtomicU64::new(0);
static DECODE_ERRORS: AtomicU64 = AtomicU64::new(0);
static AUTH_REJECTED: AtomicU64 = AtomicU64::new(0);
static UNROUTABLE: AtomicU64 = AtomicU64::new(0);
static HANDLER_FAILURES: AtomicU64 = AtomicU64::new(0);
static OPEN_ENDPOINTS: AtomicU64 = AtomicU64::new(0);

/// Pipeline stage that rejected a message.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Rejection {
    Encode,
    Decode,
    Auth,
    Unroutable,
    Handler,
}

impl Metrics {
    #[inline]
    pub(crate) fn record_sent() {
        SENT_MESSAGES.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_received() {
        RECEIVED_MESSAGES.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_rejection(stage: Rejection) {
        let counter = match stage {
            Rejection::Encode => &ENCODE_ERRORS,
            Rejection::Decode => &DECODE_ERRORS,
            Rejection::Auth => &AUTH_REJECTED,
            Rejection::Unroutable => &UNROUTABLE,
            Rejection::Handler => &HANDLER_FAILURES,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_endpoint_open() {
        OPEN_ENDPOINTS.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_endpoint_close() {
        OPEN_ENDPOINTS.fetch_sub(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn totals() -> MetricsSnapshot {
        MetricsSnapshot {
            sent_messages: SENT_MESSAGES.load(Ordering::Relaxed),
            received_messages: RECEIVED_MESSAGES.load(Ordering::Relaxed),
            encode_errors: ENCODE_ERRORS.load(Ordering::Relaxed),
            decode_errors: DECODE_ERRORS.load(Ordering::Relaxed),
            auth_rejected: AUTH_REJECTED.load(Ordering::Relaxed),
            unroutable: UNROUTABLE.load(Ordering::Relaxed),
            handler_failures: HANDLER_FAILURES.load(Ordering::Relaxed),
            open_endpoints: OPEN_ENDPOINTS.load(Ordering::Relaxed),
        }
    }
}

/// Process-wide snapshot of pipeline counters.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Messages handed to the transport
    pub sent_messages: u64,
    /// Messages taken off the transport
    pub received_messages: u64,
    /// Values that failed to serialize
    pub encode_errors: u64,
    /// Payloads or envelopes that failed to deserialize
    pub decode_errors: u64,
    /// Payloads rejected by signature verification
    pub auth_rejected: u64,
    /// Broadcasts whose tag matched no subscription, or calls with no handler
    pub unroutable: u64,
    /// Handlers that returned an error or panicked
    pub handler_failures: u64,
    /// Endpoints currently holding a socket
    pub open_endpoints: u64,
}

impl MetricsSnapshot {
    /// Total messages rejected at any stage of the pipeline.
    #[must_use]
    pub fn total_rejected(&self) -> u64 {
        self.encode_errors
            + self.decode_errors
            + self.auth_rejected
            + self.unroutable
            + self.handler_failures
    }
}
