//! Error taxonomy shared by every layer of the bridge (spec §7).

use thiserror::Error;

/// Errors raised by the bip-stream, codec, and canvas event layers.
///
/// `BadReservation`, `BadConsume`, and `ReentrantIo` are programmer errors:
/// callers should treat them as non-recoverable at the call site rather than
/// retrying. `Timeout` is expected to be caught by an event loop and treated
/// as a clean shutdown signal. `BadEvent`/`NoContext` are reported upstream
/// as non-fatal and the caller is expected to continue.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// `reserve(count, flexible)` was called with `count <= 0`, or with
    /// `flexible == false` and `count` larger than half the data area.
    #[error("bad reservation: requested {requested} bytes (flexible={flexible}, capacity={capacity})")]
    BadReservation {
        /// Bytes requested by the caller.
        requested: u32,
        /// Whether the reservation was allowed to shrink.
        flexible: bool,
        /// Usable capacity of the ring (`last`, i.e. `data_len`).
        capacity: u32,
    },

    /// `consume(count)` referred to more bytes than the last `valid()` slice
    /// contained.
    #[error("bad consume: tried to consume {count} bytes, only {available} were valid")]
    BadConsume {
        /// Bytes the caller tried to consume.
        count: u32,
        /// Bytes actually available in the last `valid()` slice.
        available: u32,
    },

    /// An async read or write was attempted while another one was already
    /// in flight on the same stream.
    #[error("reentrant async io on the same stream")]
    ReentrantIo,

    /// The active lock strategy's deadline expired while waiting for space
    /// or data.
    #[error("deadline exceeded after {elapsed_ms}ms (limit {limit_ms}ms)")]
    Timeout {
        /// Milliseconds actually elapsed.
        elapsed_ms: u32,
        /// The configured deadline.
        limit_ms: u32,
    },

    /// A canvas event opcode was unrecognized, or its payload was malformed
    /// (including a `FillText`/`StrokeText` argument count outside `{3, 4}`).
    #[error("malformed canvas event: {reason}")]
    BadEvent {
        /// Human-readable description of what was wrong.
        reason: &'static str,
    },

    /// A `ReceiveCanvas` response named a `context_id` that matches no live
    /// registration and carried no offscreen handle to attach instead.
    #[error("no live registration for context_id {context_id}")]
    NoContext {
        /// The context id that failed to resolve.
        context_id: u32,
    },

    /// A failure on the host side was routed back to the worker.
    #[error("host error: {message}")]
    HostError {
        /// Message forwarded from the host.
        message: String,
    },
}

/// Convenience alias used throughout the crate.
pub type Result<T> = core::result::Result<T, BridgeError>;
