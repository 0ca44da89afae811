//! Canvas worker engine (C5): owns the per-canvas registration table and the
//! commit/reset/theme-replay state machine described in spec.md §4.5,
//! expressed against two small traits ([`engine::Surface2d`],
//! [`engine::HostChannel`]) so it stays host-agnostic and unit testable off
//! a browser. The `wasm` feature supplies the real
//! `OffscreenCanvasRenderingContext2d` and `DedicatedWorkerGlobalScope`
//! implementations behind those traits.

pub mod engine;

#[cfg(feature = "wasm")]
pub mod wasm;

pub use engine::{CanvasEngine, CanvasResponse, HostChannel, Surface2d, Theme};
