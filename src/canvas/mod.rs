//! Canvas drawing-event wire format (spec §3, §4.4, §6): ~60 discriminated
//! opcodes packed/unpacked over the typed codec. This module only knows how
//! to turn an [`Event`](event::Event) into bytes and back; the replay state
//! machine that consumes a stream of them lives in the `bridge-worker`
//! crate's canvas engine (C5).

pub mod event;

pub use event::{DrawImageVariant, Event, EventKind, FillRule, Gradient, GradientKind, GradientStop, Paint};
