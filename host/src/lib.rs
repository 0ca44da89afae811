//! Canvas host facade (C6): owns DOM canvas allocation, the free-list
//! reuse/stale-reset policy, and host<->worker control-message routing
//! described in spec.md §4.6. The policy in [`facade::CanvasPool`] is
//! generic over [`facade::CanvasFactory`] and `bridge_core::lock::Clock` so
//! it is backend-independent and unit-testable off a browser; the `wasm`
//! feature supplies the real `web_sys::Document`-backed factory and the
//! `Worker` control-channel wiring.

pub mod facade;
pub mod messages;

#[cfg(feature = "wasm")]
pub mod dom;
#[cfg(feature = "wasm")]
pub mod wasm;

pub use facade::{CanvasFactory, CanvasHost, CanvasPool};
pub use messages::Message;

#[cfg(feature = "wasm")]
pub use dom::DomCanvasFactory;
#[cfg(feature = "wasm")]
pub use wasm::HostWorkerLink;
