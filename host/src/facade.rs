//! Canvas host facade (C6, spec.md §4.6): DOM canvas allocation, the
//! free-list reuse/stale-reset policy, and host<->worker control-message
//! routing, built against a [`CanvasFactory`] so the policy is identical on
//! every backend.

use std::collections::HashMap;

use bridge_core::lock::Clock;

use crate::messages::Message;

/// Allocates/destroys the underlying DOM (or off-DOM, for tests) canvas
/// resource. The free-list/staleness/reuse policy lives in [`CanvasPool`],
/// on top of this trait, so it is identical on every backend.
pub trait CanvasFactory {
    type Canvas;
    fn new_canvas(&mut self) -> Self::Canvas;
    fn resize(&mut self, canvas: &Self::Canvas, w: i16, h: i16);
    fn destroy(&mut self, canvas: Self::Canvas);
}

struct PooledCanvas<C> {
    context_id: u32,
    canvas: C,
    /// True once this canvas object's offscreen handle has been emitted to
    /// a worker at least once (spec.md §4.6: transferred only the first
    /// time).
    transferred: bool,
    stale: bool,
}

/// Owns every live canvas object behind a stable `context_id`, and the
/// stale-reset sweep described in spec.md §4.6: `reset(timeout_ms)` marks
/// everything stale; a `create_canvas()` inside the grace window revives a
/// stale entry, otherwise a fresh one is allocated once the window expires.
pub struct CanvasPool<F: CanvasFactory, C: Clock> {
    factory: F,
    clock: C,
    next_context_id: u32,
    live: Vec<PooledCanvas<F::Canvas>>,
    reset_deadline_ms: Option<u32>,
}

impl<F: CanvasFactory, C: Clock> CanvasPool<F, C> {
    pub fn new(factory: F, clock: C) -> Self {
        Self {
            factory,
            clock,
            next_context_id: 1,
            live: Vec::new(),
            reset_deadline_ms: None,
        }
    }

    /// Revives a stale, non-expired entry if one exists, else allocates a
    /// fresh canvas object. Returns `(context_id, is_first_transfer)`.
    pub fn create_canvas(&mut self, w: i16, h: i16) -> (u32, bool) {
        self.expire_if_due();
        if let Some(entry) = self.live.iter_mut().find(|entry| entry.stale) {
            entry.stale = false;
            self.factory.resize(&entry.canvas, w, h);
            let is_first_transfer = !entry.transferred;
            entry.transferred = true;
            return (entry.context_id, is_first_transfer);
        }
        let canvas = self.factory.new_canvas();
        self.factory.resize(&canvas, w, h);
        let context_id = self.next_context_id;
        self.next_context_id += 1;
        self.live.push(PooledCanvas {
            context_id,
            canvas,
            transferred: true,
            stale: false,
        });
        (context_id, true)
    }

    pub fn resize(&mut self, context_id: u32, w: i16, h: i16) {
        if let Some(entry) = self.live.iter().find(|entry| entry.context_id == context_id) {
            self.factory.resize(&entry.canvas, w, h);
        }
    }

    pub fn remove(&mut self, context_id: u32) {
        if let Some(pos) = self.live.iter().position(|entry| entry.context_id == context_id) {
            let entry = self.live.remove(pos);
            self.factory.destroy(entry.canvas);
        }
    }

    pub fn canvas(&self, context_id: u32) -> Option<&F::Canvas> {
        self.live
            .iter()
            .find(|entry| entry.context_id == context_id)
            .map(|entry| &entry.canvas)
    }

    /// Marks every currently live canvas stale; entries still stale after
    /// `timeout_ms` are destroyed on the next allocation or explicit
    /// [`CanvasPool::expire_if_due`] call.
    pub fn reset(&mut self, timeout_ms: u32) {
        for entry in &mut self.live {
            entry.stale = true;
        }
        self.clock.reset();
        self.reset_deadline_ms = Some(timeout_ms);
    }

    /// Sweeps expired stale entries. Exposed so a host embedder can run the
    /// sweep on a timer even when no `create_canvas` call happens to trigger
    /// it first.
    pub fn expire_if_due(&mut self) {
        let Some(deadline) = self.reset_deadline_ms else {
            return;
        };
        if self.clock.elapsed_ms() < deadline {
            return;
        }
        self.reset_deadline_ms = None;
        let mut i = 0;
        while i < self.live.len() {
            if self.live[i].stale {
                let entry = self.live.remove(i);
                self.factory.destroy(entry.canvas);
            } else {
                i += 1;
            }
        }
    }
}

/// Routes host<->worker control messages (spec.md §4.6 Responsibilities)
/// over a [`CanvasPool`], and owns the per-connection theme.
pub struct CanvasHost<F: CanvasFactory, C: Clock> {
    pool: CanvasPool<F, C>,
    /// `global_id -> context_id`, the worker-scoped view onto the pool's
    /// underlying-canvas-object-scoped identifiers.
    registrations: HashMap<u32, u32>,
    theme: Vec<(String, String)>,
}

impl<F: CanvasFactory, C: Clock> CanvasHost<F, C> {
    pub fn new(factory: F, clock: C) -> Self {
        Self {
            pool: CanvasPool::new(factory, clock),
            registrations: HashMap::new(),
            theme: Vec::new(),
        }
    }

    pub fn theme(&self) -> &[(String, String)] {
        &self.theme
    }

    /// Builds the initial `Connection` message for a newly spawned worker.
    pub fn connection_message(&self, instance_id: u32) -> Message {
        Message::Connection {
            instance_id,
            theme: self.theme.clone(),
        }
    }

    pub fn set_theme(&mut self, theme: Vec<(String, String)>) -> Message {
        self.theme = theme.clone();
        Message::Theme(theme)
    }

    pub fn reset(&mut self, timeout_ms: u32) {
        self.pool.reset(timeout_ms);
    }

    pub fn canvas(&self, context_id: u32) -> Option<&F::Canvas> {
        self.pool.canvas(context_id)
    }

    /// Handles one worker->host message, returning the reply (if any).
    pub fn handle(&mut self, message: Message) -> Option<Message> {
        match message {
            Message::RequestCanvas { global_id, w, h } => {
                let (context_id, is_first_transfer) = self.pool.create_canvas(w, h);
                self.registrations.insert(global_id, context_id);
                Some(Message::ReceiveCanvas {
                    global_id,
                    context_id,
                    has_canvas: is_first_transfer,
                })
            }
            Message::ResizeCanvas { global_id, w, h } => {
                if let Some(&context_id) = self.registrations.get(&global_id) {
                    self.pool.resize(context_id, w, h);
                }
                None
            }
            Message::RemoveCanvas { global_id } => {
                if let Some(context_id) = self.registrations.remove(&global_id) {
                    self.pool.remove(context_id);
                }
                None
            }
            Message::Connection { .. } | Message::Theme(_) | Message::ReceiveCanvas { .. } => None,
            Message::Error { message, fatal, .. } => {
                log::warn!("worker reported error: {message} (fatal={fatal:?})");
                None
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    struct FakeClock {
        now_ms: u32,
    }

    impl Clock for FakeClock {
        fn reset(&mut self) {
            self.now_ms = 0;
        }
        fn elapsed_ms(&mut self) -> u32 {
            self.now_ms
        }
    }

    #[derive(Default)]
    struct CountingFactory {
        created: u32,
        destroyed: Vec<u32>,
    }

    impl CanvasFactory for CountingFactory {
        type Canvas = u32;

        fn new_canvas(&mut self) -> Self::Canvas {
            self.created += 1;
            self.created
        }

        fn resize(&mut self, _canvas: &Self::Canvas, _w: i16, _h: i16) {}

        fn destroy(&mut self, canvas: Self::Canvas) {
            self.destroyed.push(canvas);
        }
    }

    #[test]
    fn request_canvas_assigns_and_transfers_once() {
        let mut host = CanvasHost::new(CountingFactory::default(), FakeClock { now_ms: 0 });
        let reply = host.handle(Message::RequestCanvas {
            global_id: 1,
            w: 100,
            h: 100,
        });
        assert_eq!(
            reply,
            Some(Message::ReceiveCanvas {
                global_id: 1,
                context_id: 1,
                has_canvas: true,
            })
        );
    }

    #[test]
    fn stale_reuse_within_window_returns_same_context() {
        let mut host = CanvasHost::new(CountingFactory::default(), FakeClock { now_ms: 0 });
        host.handle(Message::RequestCanvas { global_id: 1, w: 10, h: 10 });
        host.reset(100);

        host.pool.clock.now_ms = 50;
        let reply = host.handle(Message::RequestCanvas { global_id: 2, w: 10, h: 10 });
        assert_eq!(
            reply,
            Some(Message::ReceiveCanvas {
                global_id: 2,
                context_id: 1,
                has_canvas: false,
            })
        );
    }

    #[test]
    fn stale_reuse_after_window_creates_new_canvas() {
        let mut host = CanvasHost::new(CountingFactory::default(), FakeClock { now_ms: 0 });
        host.handle(Message::RequestCanvas { global_id: 1, w: 10, h: 10 });
        host.reset(100);

        host.pool.clock.now_ms = 150;
        let reply = host.handle(Message::RequestCanvas { global_id: 2, w: 10, h: 10 });
        assert_eq!(
            reply,
            Some(Message::ReceiveCanvas {
                global_id: 2,
                context_id: 2,
                has_canvas: true,
            })
        );
        assert_eq!(host.pool.factory.destroyed, vec![1]);
    }

    #[test]
    fn remove_canvas_destroys_underlying_object() {
        let mut host = CanvasHost::new(CountingFactory::default(), FakeClock { now_ms: 0 });
        host.handle(Message::RequestCanvas { global_id: 1, w: 10, h: 10 });
        host.handle(Message::RemoveCanvas { global_id: 1 });
        assert_eq!(host.pool.factory.destroyed, vec![1]);
        assert!(host.canvas(1).is_none());
    }
}
