//! Host<->worker control messages (spec.md §4.6): "plain tagged records; no
//! byte-level spec required beyond field presence." This enum is the
//! in-process representation used by [`crate::facade::CanvasHost`]; the
//! `wasm` module translates it to/from a tagged `JsValue` for the real
//! `postMessage` channel.

/// One control-channel message. Direction (`to: "host" | "worker"`) is
/// implied by which side calls [`crate::facade::CanvasHost::handle`] versus
/// which side a worker-side `HostChannel` posts from.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// host -> worker, sent once per connection alongside the shared
    /// bip-stream region.
    Connection {
        instance_id: u32,
        theme: Vec<(String, String)>,
    },
    /// host -> worker: the theme changed.
    Theme(Vec<(String, String)>),
    /// worker -> host.
    RequestCanvas { global_id: u32, w: i16, h: i16 },
    /// host -> worker. `has_canvas` is true only the first time this
    /// `context_id` is emitted — the offscreen handle is ownership-
    /// transferring and must not be re-sent on reuse.
    ReceiveCanvas {
        global_id: u32,
        context_id: u32,
        has_canvas: bool,
    },
    /// worker -> host.
    ResizeCanvas { global_id: u32, w: i16, h: i16 },
    /// worker -> host.
    RemoveCanvas { global_id: u32 },
    /// either direction.
    Error {
        message: String,
        kind: Option<String>,
        stack: Option<String>,
        fatal: Option<bool>,
    },
}
