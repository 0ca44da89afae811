//! Canvas worker engine (C5): the per-canvas registration table, front/back/
//! state buffers, commit/reset state machine, and theme replay (spec.md
//! §4.5).

use std::collections::HashMap;
use std::mem::{Discriminant, discriminant};

use bridge_core::canvas::{Event, EventKind, Paint};
use bridge_core::codec::Reader;
use bridge_core::lock::LockStrategy;
use bridge_core::{BridgeError, Result};

/// A mapping from color-name string to replacement color string, applied at
/// draw time only to color-valued fields (spec.md Theme, C5).
#[derive(Debug, Default, Clone)]
pub struct Theme {
    map: HashMap<String, String>,
}

impl Theme {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, from: impl Into<String>, to: impl Into<String>) {
        self.map.insert(from.into(), to.into());
    }

    pub fn resolve<'a>(&'a self, color: &'a str) -> &'a str {
        self.map.get(color).map(String::as_str).unwrap_or(color)
    }
}

/// `global_id = (local_id + instance_id) << 8` (spec.md Canvas registration,
/// GLOSSARY "Global id"). `instance_id` is assigned per connected worker
/// invocation.
pub fn global_id(local_id: u16, instance_id: u32) -> u32 {
    ((local_id as u32) + instance_id) << 8
}

/// A 2D rendering surface behind the canvas engine's draw calls. Split out
/// as a trait so the state machine itself stays host-agnostic and unit
/// testable; the `wasm` module supplies the real
/// `OffscreenCanvasRenderingContext2d` implementation.
pub trait Surface2d {
    /// Resets to a canonical baseline: fill/stroke black, line width 1, etc.
    fn reset_baseline(&mut self);
    fn set_dimensions(&mut self, w: i16, h: i16);
    fn clear(&mut self);
    fn set_fill_style(&mut self, color: &str);
    fn set_stroke_style(&mut self, color: &str);
    fn fill_rect(&mut self, x: i16, y: i16, w: i16, h: i16);
    fn stroke_rect(&mut self, x: i16, y: i16, w: i16, h: i16);
    fn clear_rect(&mut self, x: i16, y: i16, w: i16, h: i16);
    /// Every opcode not special-cased in [`apply`]: paths, transforms, text,
    /// images, and the remaining stateful setters. A jump table over the
    /// full opcode set is acceptable per spec.md §9 but not required; this
    /// trait keeps the engine's match small and forwards the rest here.
    /// `theme` is passed through so implementations can resolve color
    /// values embedded deeper than a top-level `Paint::Color` — gradient
    /// stops and the shadow color — the same way `apply` resolves a plain
    /// fill/stroke color (spec.md §4.5 Theme change).
    fn other(&mut self, theme: &Theme, kind: &EventKind);
}

/// The worker's view of the host-side canvas facade (C6).
pub trait HostChannel<S: Surface2d> {
    fn request_canvas(&mut self, global_id: u32, w: i16, h: i16) -> Result<CanvasResponse<S>>;
    fn resize_canvas(&mut self, global_id: u32, w: i16, h: i16);
    fn remove_canvas(&mut self, global_id: u32);
    fn report_error(&mut self, err: BridgeError);
}

/// Reply to `request_canvas`: `surface` is `Some` only on the first
/// emission for a given underlying canvas object (spec.md §4.6).
pub struct CanvasResponse<S> {
    pub context_id: u32,
    pub surface: Option<S>,
}

struct Registration<S> {
    context_id: u32,
    surface: S,
    width: i16,
    height: i16,
    back_buffer: Vec<EventKind>,
    front_buffer: Vec<EventKind>,
    state_buffer: HashMap<Discriminant<EventKind>, EventKind>,
    removed: bool,
}

impl<S: Surface2d> Registration<S> {
    fn new(context_id: u32, surface: S, width: i16, height: i16) -> Self {
        Self {
            context_id,
            surface,
            width,
            height,
            back_buffer: Vec::new(),
            front_buffer: Vec::new(),
            state_buffer: HashMap::new(),
            removed: false,
        }
    }

    /// Clears the surface, replays `state_buffer` when `refresh`, then plays
    /// `front_buffer` in order (spec.md §4.5 Rendering).
    fn render(&mut self, refresh: bool, theme: &Theme) {
        self.surface.clear();
        if refresh {
            for kind in self.state_buffer.values() {
                apply(&mut self.surface, theme, kind);
            }
        }
        for kind in &self.front_buffer {
            apply(&mut self.surface, theme, kind);
        }
    }

    /// Swaps `back_buffer` into `front_buffer`, folds every stateful event
    /// observed into `state_buffer` (latest write per opcode wins), and
    /// renders without a refresh (context state is already current).
    fn commit(&mut self, theme: &Theme) {
        self.front_buffer = std::mem::take(&mut self.back_buffer);
        for kind in &self.front_buffer {
            if is_stateful(kind) {
                self.state_buffer.insert(discriminant(kind), kind.clone());
            }
        }
        self.render(false, theme);
    }
}

fn apply<S: Surface2d>(surface: &mut S, theme: &Theme, kind: &EventKind) {
    match kind {
        EventKind::FillStyle(Paint::Color(c)) => surface.set_fill_style(theme.resolve(c)),
        EventKind::StrokeStyle(Paint::Color(c)) => surface.set_stroke_style(theme.resolve(c)),
        EventKind::FillRect { x, y, w, h } => surface.fill_rect(*x, *y, *w, *h),
        EventKind::StrokeRect { x, y, w, h } => surface.stroke_rect(*x, *y, *w, *h),
        EventKind::ClearRect { x, y, w, h } => surface.clear_rect(*x, *y, *w, *h),
        other => surface.other(theme, other),
    }
}

/// The stateful-setter opcodes from spec.md §4.4, whose latest value is
/// captured into `state_buffer` on every commit.
fn is_stateful(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::LineWidth(_)
            | EventKind::MiterLimit(_)
            | EventKind::LineDashOffset(_)
            | EventKind::ShadowBlur(_)
            | EventKind::ShadowOffsetX(_)
            | EventKind::ShadowOffsetY(_)
            | EventKind::GlobalAlpha(_)
            | EventKind::LineCap(_)
            | EventKind::LineJoin(_)
            | EventKind::TextAlign(_)
            | EventKind::TextBaseline(_)
            | EventKind::Direction(_)
            | EventKind::FontKerning(_)
            | EventKind::FontStretch(_)
            | EventKind::FontVariantCaps(_)
            | EventKind::TextRendering(_)
            | EventKind::GlobalCompositeOperation(_)
            | EventKind::SetLineDash(_)
            | EventKind::Font(_)
            | EventKind::LetterSpacing(_)
            | EventKind::WordSpacing(_)
            | EventKind::ShadowColor(_)
            | EventKind::Filter(_)
            | EventKind::ImageSmoothingEnabled(_)
            | EventKind::FillStyle(_)
            | EventKind::StrokeStyle(_)
    )
}

/// Per-worker registration table plus the theme singleton (spec.md §9
/// "Global mutable state").
pub struct CanvasEngine<S, H> {
    instance_id: u32,
    theme: Theme,
    registrations: HashMap<u32, Registration<S>>,
    host: H,
}

impl<S: Surface2d, H: HostChannel<S>> CanvasEngine<S, H> {
    pub fn new(instance_id: u32, host: H) -> Self {
        Self {
            instance_id,
            theme: Theme::new(),
            registrations: HashMap::new(),
            host,
        }
    }

    pub fn theme(&self) -> &Theme {
        &self.theme
    }

    #[cfg(test)]
    pub(crate) fn registration_count(&self) -> usize {
        self.registrations.len()
    }

    #[cfg(test)]
    pub(crate) fn context_id_of(&self, canvas_id: u16) -> Option<u32> {
        self.registrations
            .get(&global_id(canvas_id, self.instance_id))
            .map(|r| r.context_id)
    }

    /// Changing the theme replays every registration, including removed
    /// ones — they remain visible (spec.md §4.5 Theme change).
    pub fn set_theme(&mut self, theme: Theme) {
        self.theme = theme;
        for registration in self.registrations.values_mut() {
            registration.render(true, &self.theme);
        }
    }

    /// Dispatches one event. Returns `false` once `ConnectionClosed` has
    /// been handled, signaling the event loop to stop.
    pub fn dispatch(&mut self, event: Event) -> bool {
        let global_id = global_id(event.canvas_id, self.instance_id);
        match event.kind {
            EventKind::ConnectionClosed => {
                for registration in self.registrations.values_mut() {
                    if !registration.removed {
                        registration.render(false, &self.theme);
                    }
                }
                return false;
            }
            EventKind::Create { w, h } => self.handle_create(global_id, w, h),
            EventKind::Remove => self.handle_remove(global_id),
            EventKind::Commit => match self.registrations.get_mut(&global_id) {
                Some(registration) => registration.commit(&self.theme),
                None => self.report(BridgeError::NoContext { context_id: global_id }),
            },
            EventKind::Width(w) => self.handle_resize(global_id, Some(w), None),
            EventKind::Height(h) => self.handle_resize(global_id, None, Some(h)),
            other => match self.registrations.get_mut(&global_id) {
                Some(registration) => registration.back_buffer.push(other),
                None => self.report(BridgeError::NoContext { context_id: global_id }),
            },
        }
        true
    }

    fn report(&mut self, err: BridgeError) {
        self.host.report_error(err);
    }

    fn handle_create(&mut self, global_id: u32, w: i16, h: i16) {
        let response = match self.host.request_canvas(global_id, w, h) {
            Ok(response) => response,
            Err(err) => return self.report(err),
        };
        let surface = match response.surface {
            Some(surface) => surface,
            None => {
                let stolen = self
                    .registrations
                    .iter()
                    .find(|(_, r)| r.context_id == response.context_id)
                    .map(|(&id, _)| id);
                match stolen {
                    Some(old_id) => self.registrations.remove(&old_id).unwrap().surface,
                    None => {
                        return self.report(BridgeError::NoContext {
                            context_id: response.context_id,
                        });
                    }
                }
            }
        };
        let mut registration = Registration::new(response.context_id, surface, w, h);
        registration.surface.reset_baseline();
        registration.surface.set_dimensions(w, h);
        self.registrations.insert(global_id, registration);
    }

    fn handle_remove(&mut self, global_id: u32) {
        match self.registrations.get_mut(&global_id) {
            Some(registration) => {
                registration.removed = true;
                registration.commit(&self.theme);
                self.host.remove_canvas(global_id);
            }
            None => self.report(BridgeError::NoContext { context_id: global_id }),
        }
    }

    fn handle_resize(&mut self, global_id: u32, w: Option<i16>, h: Option<i16>) {
        let Some(registration) = self.registrations.get_mut(&global_id) else {
            return self.report(BridgeError::NoContext { context_id: global_id });
        };
        if let Some(w) = w {
            registration.width = w;
        }
        if let Some(h) = h {
            registration.height = h;
        }
        registration.surface.set_dimensions(registration.width, registration.height);
        self.host.resize_canvas(global_id, registration.width, registration.height);
    }

    /// Runs the event loop until `ConnectionClosed` or a clean `Timeout`
    /// (spec.md §4.5 Event loop / Failure semantics). `BadEvent`/`NoContext`
    /// are reported to the host as non-fatal and the loop continues; any
    /// other error (e.g. a programmer error from the codec layer) is fatal
    /// and propagated.
    pub fn run<L: LockStrategy>(&mut self, reader: &mut Reader<'_, L>) -> Result<()> {
        loop {
            let event = match Event::unpack(reader) {
                Ok(event) => event,
                Err(BridgeError::Timeout { .. }) => return Ok(()),
                Err(err @ BridgeError::BadEvent { .. }) => {
                    self.report(err);
                    continue;
                }
                Err(err) => return Err(err),
            };
            if !self.dispatch(event) {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct FilledRect {
        x: i16,
        y: i16,
        w: i16,
        h: i16,
        color: String,
    }

    #[derive(Default)]
    struct RecordingSurface {
        fill_style: String,
        filled_rects: Vec<FilledRect>,
        dimensions: (i16, i16),
        reset_count: u32,
        shadow_color: Option<String>,
    }

    impl Surface2d for RecordingSurface {
        fn reset_baseline(&mut self) {
            self.fill_style = "black".into();
            self.filled_rects.clear();
            self.reset_count += 1;
        }
        fn set_dimensions(&mut self, w: i16, h: i16) {
            self.dimensions = (w, h);
        }
        fn clear(&mut self) {
            self.filled_rects.clear();
        }
        fn set_fill_style(&mut self, color: &str) {
            self.fill_style = color.to_string();
        }
        fn set_stroke_style(&mut self, _color: &str) {}
        fn fill_rect(&mut self, x: i16, y: i16, w: i16, h: i16) {
            self.filled_rects.push(FilledRect {
                x,
                y,
                w,
                h,
                color: self.fill_style.clone(),
            });
        }
        fn stroke_rect(&mut self, _x: i16, _y: i16, _w: i16, _h: i16) {}
        fn clear_rect(&mut self, _x: i16, _y: i16, _w: i16, _h: i16) {
            self.filled_rects.clear();
        }
        fn other(&mut self, theme: &Theme, kind: &EventKind) {
            if let EventKind::ShadowColor(c) = kind {
                self.shadow_color = Some(theme.resolve(c).to_string());
            }
        }
    }

    /// Hands out a fresh surface the first time a `global_id` is requested,
    /// and `None` (forcing a steal) on every subsequent request for the same
    /// `global_id` — modeling "the host chose to reuse a stale canvas".
    struct MockHost {
        next_context_id: u32,
        reuse: Option<u32>,
        errors: Vec<BridgeError>,
        resized: Vec<(u32, i16, i16)>,
        removed: Vec<u32>,
    }

    impl MockHost {
        fn new() -> Self {
            Self {
                next_context_id: 1,
                reuse: None,
                errors: Vec::new(),
                resized: Vec::new(),
                removed: Vec::new(),
            }
        }
    }

    impl HostChannel<RecordingSurface> for MockHost {
        fn request_canvas(
            &mut self,
            _global_id: u32,
            _w: i16,
            _h: i16,
        ) -> Result<CanvasResponse<RecordingSurface>> {
            if let Some(context_id) = self.reuse.take() {
                return Ok(CanvasResponse {
                    context_id,
                    surface: None,
                });
            }
            let context_id = self.next_context_id;
            self.next_context_id += 1;
            Ok(CanvasResponse {
                context_id,
                surface: Some(RecordingSurface::default()),
            })
        }

        fn resize_canvas(&mut self, global_id: u32, w: i16, h: i16) {
            self.resized.push((global_id, w, h));
        }

        fn remove_canvas(&mut self, global_id: u32) {
            self.removed.push(global_id);
        }

        fn report_error(&mut self, err: BridgeError) {
            self.errors.push(err);
        }
    }

    fn create_red_rect_commit(engine: &mut CanvasEngine<RecordingSurface, MockHost>, canvas_id: u16) {
        engine.dispatch(Event {
            canvas_id,
            kind: EventKind::Create { w: 100, h: 100 },
        });
        engine.dispatch(Event {
            canvas_id,
            kind: EventKind::FillStyle(Paint::Color("red".into())),
        });
        engine.dispatch(Event {
            canvas_id,
            kind: EventKind::FillRect { x: 0, y: 0, w: 10, h: 10 },
        });
    }

    fn surface_of<'a>(
        engine: &'a CanvasEngine<RecordingSurface, MockHost>,
        canvas_id: u16,
    ) -> &'a RecordingSurface {
        &engine
            .registrations
            .get(&global_id(canvas_id, 0))
            .unwrap()
            .surface
    }

    #[test]
    fn commit_renders_rect_blank_before_it() {
        let mut engine = CanvasEngine::new(0, MockHost::new());
        create_red_rect_commit(&mut engine, 1);
        assert!(surface_of(&engine, 1).filled_rects.is_empty());

        engine.dispatch(Event {
            canvas_id: 1,
            kind: EventKind::Commit,
        });
        assert_eq!(
            surface_of(&engine, 1).filled_rects,
            vec![FilledRect {
                x: 0,
                y: 0,
                w: 10,
                h: 10,
                color: "red".into(),
            }]
        );
    }

    #[test]
    fn theme_change_recolors_without_new_events() {
        let mut engine = CanvasEngine::new(0, MockHost::new());
        create_red_rect_commit(&mut engine, 1);
        engine.dispatch(Event {
            canvas_id: 1,
            kind: EventKind::Commit,
        });

        let mut theme = Theme::new();
        theme.set("red", "blue");
        engine.set_theme(theme);

        assert_eq!(surface_of(&engine, 1).filled_rects[0].color, "blue");
    }

    #[test]
    fn theme_resolves_shadow_color_through_other() {
        let mut engine = CanvasEngine::new(0, MockHost::new());
        engine.dispatch(Event {
            canvas_id: 1,
            kind: EventKind::Create { w: 10, h: 10 },
        });
        engine.dispatch(Event {
            canvas_id: 1,
            kind: EventKind::ShadowColor("red".into()),
        });
        engine.dispatch(Event {
            canvas_id: 1,
            kind: EventKind::Commit,
        });
        assert_eq!(surface_of(&engine, 1).shadow_color, Some("red".into()));

        let mut theme = Theme::new();
        theme.set("red", "blue");
        engine.set_theme(theme);
        assert_eq!(surface_of(&engine, 1).shadow_color, Some("blue".into()));
    }

    #[test]
    fn stale_canvas_reuse_steals_existing_context() {
        let mut engine = CanvasEngine::new(0, MockHost::new());
        engine.dispatch(Event {
            canvas_id: 1,
            kind: EventKind::Create { w: 10, h: 10 },
        });
        let original_context = engine.context_id_of(1).unwrap();
        assert_eq!(engine.registration_count(), 1);

        engine.host.reuse = Some(original_context);
        engine.dispatch(Event {
            canvas_id: 2,
            kind: EventKind::Create { w: 10, h: 10 },
        });

        // The old global_id's registration was stolen away, not duplicated.
        assert_eq!(engine.registration_count(), 1);
        assert_eq!(engine.context_id_of(2), Some(original_context));
        assert_eq!(engine.context_id_of(1), None);
    }

    #[test]
    fn remove_forces_final_commit_and_notifies_host() {
        let mut engine = CanvasEngine::new(0, MockHost::new());
        create_red_rect_commit(&mut engine, 1);
        engine.dispatch(Event {
            canvas_id: 1,
            kind: EventKind::Remove,
        });

        assert_eq!(
            surface_of(&engine, 1).filled_rects,
            vec![FilledRect {
                x: 0,
                y: 0,
                w: 10,
                h: 10,
                color: "red".into(),
            }]
        );
        assert_eq!(engine.host.removed, vec![global_id(1, 0)]);
    }

    #[test]
    fn unknown_canvas_reports_no_context_and_continues() {
        let mut engine = CanvasEngine::new(0, MockHost::new());
        let kept_running = engine.dispatch(Event {
            canvas_id: 99,
            kind: EventKind::Commit,
        });
        assert!(kept_running);
        assert!(matches!(
            engine.host.errors.as_slice(),
            [BridgeError::NoContext { .. }]
        ));
    }

    #[test]
    fn connection_closed_stops_the_loop() {
        let mut engine = CanvasEngine::new(0, MockHost::new());
        create_red_rect_commit(&mut engine, 1);
        let kept_running = engine.dispatch(Event {
            canvas_id: 0,
            kind: EventKind::ConnectionClosed,
        });
        assert!(!kept_running);
    }

    #[test]
    fn run_exits_cleanly_on_reader_timeout() {
        use bridge_core::bip_stream::BipStream;
        use bridge_core::lock::{Backoff, Deadline};

        struct ImmediateClock;
        impl bridge_core::lock::Clock for ImmediateClock {
            fn reset(&mut self) {}
            fn elapsed_ms(&mut self) -> u32 {
                1_000
            }
        }

        let stream = BipStream::create(64).unwrap();
        let (_producer, consumer) = stream.split();
        let strategy = Deadline::new(Backoff::new(0, 1, 1), 1, ImmediateClock);
        let mut reader = Reader::new(consumer, strategy);

        let mut engine = CanvasEngine::new(0, MockHost::new());
        let result = engine.run(&mut reader);
        assert!(result.is_ok());
    }
}
