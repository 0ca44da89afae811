//! wasm32 bindings for the canvas worker engine: a [`Surface2d`](crate::Surface2d)
//! backed by `OffscreenCanvasRenderingContext2d`, and a
//! [`HostChannel`](crate::HostChannel) that exchanges control messages with
//! the host's `DedicatedWorkerGlobalScope` endpoint using the same atomic
//! wait/notify handshake `bridge_core::stdin` uses for standard input.

mod host_channel;
mod surface;

pub use host_channel::WasmHostChannel;
pub use surface::WasmSurface;
