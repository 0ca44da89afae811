//! Cross-thread streaming core for a sandboxed wasm execution runtime.
//!
//! This crate implements the four tightly coupled subsystems that sit
//! between a synchronously-blocking compute thread (running untrusted wasm)
//! and an asynchronous, cooperatively-scheduled host/UI thread:
//!
//! - [`bip_stream`] — a lock-free SPSC ring buffer with wrap-around
//!   reservations over a shared memory region (C1).
//! - [`lock`] — pluggable wait policies (busy/backoff/deadline) shared by
//!   the synchronous and cooperative-async codec variants (C2).
//! - [`codec`] — typed scalar/bytes/string readers and writers layered on
//!   top of a bip-stream (C3).
//! - [`canvas`] — the binary drawing-event wire format consumed by the
//!   canvas replay engine (C4); the engine itself, and the host-facing
//!   facade that owns the DOM, live in the `bridge-worker` and
//!   `bridge-host` crates respectively (C5/C6).
//! - [`stdin`] — a length-prefixed single-producer/single-consumer byte
//!   channel for standard input and EOF (C7).
//!
//! The WebAssembly host/runtime, package manager, bundler, registry fetch,
//! CLI, and virtual filesystem are explicitly out of scope; this crate
//! consumes them as opaque services (spec.md §1).

pub mod bip_stream;
pub mod canvas;
pub mod codec;
pub mod error;
pub mod lock;
pub mod stdin;
pub mod wait;

pub use error::{BridgeError, Result};
