//! [`HostChannel`] backed by `DedicatedWorkerGlobalScope`: the worker posts
//! a tagged control message, then blocks on a shared response word the host
//! flips once it has finished the async DOM work on the main thread — the
//! same atomic wait/notify handshake `bridge_core::stdin` uses for standard
//! input, applied to a single-slot control channel instead of a byte ring.
//! A transferred `OffscreenCanvas` rides the same `ReceiveCanvas` message;
//! this worker's message handler is expected to have drained it into
//! `response` before the blocking wait is entered (the handler runs between
//! bip-stream reads, the same cooperative point the lock strategy already
//! yields at).

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicI32, Ordering};

use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{DedicatedWorkerGlobalScope, MessageEvent, OffscreenCanvas};

use bridge_core::{BridgeError, Result};

use crate::engine::{CanvasResponse, HostChannel};
use crate::wasm::surface::WasmSurface;

const STATE_IDLE: i32 = 0;
const STATE_RESPONSE_READY: i32 = 1;

struct ControlFlag {
    word: AtomicI32,
}

impl ControlFlag {
    fn new() -> Self {
        Self {
            word: AtomicI32::new(STATE_IDLE),
        }
    }

    fn reset(&self) {
        self.word.store(STATE_IDLE, Ordering::SeqCst);
    }

    fn mark_ready(&self) {
        self.word.store(STATE_RESPONSE_READY, Ordering::SeqCst);
    }

    #[cfg(target_arch = "wasm32")]
    fn wait_ready(&self) {
        use core::arch::wasm32::memory_atomic_wait32;
        loop {
            if self.word.load(Ordering::SeqCst) == STATE_RESPONSE_READY {
                return;
            }
            unsafe {
                memory_atomic_wait32(self.word.as_ptr(), STATE_IDLE, -1);
            }
        }
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn wait_ready(&self) {
        while self.word.load(Ordering::SeqCst) != STATE_RESPONSE_READY {
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
    }
}

type PendingResponse = (u32, Option<OffscreenCanvas>);

/// Exchanges `RequestCanvas`/`ResizeCanvas`/`RemoveCanvas`/`Error` control
/// messages with the host over a `DedicatedWorkerGlobalScope` (spec.md §4.6).
pub struct WasmHostChannel {
    scope: DedicatedWorkerGlobalScope,
    flag: Rc<ControlFlag>,
    response: Rc<RefCell<Option<PendingResponse>>>,
    _onmessage: Closure<dyn FnMut(MessageEvent)>,
}

impl WasmHostChannel {
    pub fn new(scope: DedicatedWorkerGlobalScope) -> Self {
        let flag = Rc::new(ControlFlag::new());
        let response = Rc::new(RefCell::new(None));

        let flag_cb = flag.clone();
        let response_cb = response.clone();
        let onmessage = Closure::<dyn FnMut(MessageEvent)>::new(move |event: MessageEvent| {
            let data = event.data();
            let ty = js_sys::Reflect::get(&data, &JsValue::from_str("type"))
                .ok()
                .and_then(|v| v.as_string())
                .unwrap_or_default();
            if ty != "ReceiveCanvas" {
                return;
            }
            let context_id = js_sys::Reflect::get(&data, &JsValue::from_str("context_id"))
                .ok()
                .and_then(|v| v.as_f64())
                .unwrap_or(0.0) as u32;
            let canvas = js_sys::Reflect::get(&data, &JsValue::from_str("canvas"))
                .ok()
                .and_then(|v| v.dyn_into::<OffscreenCanvas>().ok());
            *response_cb.borrow_mut() = Some((context_id, canvas));
            flag_cb.mark_ready();
        });
        scope.set_onmessage(Some(onmessage.as_ref().unchecked_ref()));

        Self {
            scope,
            flag,
            response,
            _onmessage: onmessage,
        }
    }

    fn post(&self, ty: &str, fields: &[(&str, JsValue)]) {
        let obj = js_sys::Object::new();
        let _ = js_sys::Reflect::set(&obj, &JsValue::from_str("type"), &JsValue::from_str(ty));
        for (key, value) in fields {
            let _ = js_sys::Reflect::set(&obj, &JsValue::from_str(key), value);
        }
        let _ = self.scope.post_message(&obj);
    }
}

impl HostChannel<WasmSurface> for WasmHostChannel {
    fn request_canvas(&mut self, global_id: u32, w: i16, h: i16) -> Result<CanvasResponse<WasmSurface>> {
        self.flag.reset();
        self.post(
            "RequestCanvas",
            &[
                ("global_id", JsValue::from_f64(global_id as f64)),
                ("w", JsValue::from_f64(w as f64)),
                ("h", JsValue::from_f64(h as f64)),
            ],
        );
        self.flag.wait_ready();

        let (context_id, canvas) = self.response.borrow_mut().take().ok_or(BridgeError::HostError {
            message: "host channel woke with no response recorded".into(),
        })?;
        let surface = canvas
            .and_then(|canvas| canvas.get_context("2d").ok().flatten())
            .and_then(|ctx| ctx.dyn_into::<web_sys::OffscreenCanvasRenderingContext2d>().ok())
            .map(WasmSurface::new);
        Ok(CanvasResponse { context_id, surface })
    }

    fn resize_canvas(&mut self, global_id: u32, w: i16, h: i16) {
        self.post(
            "ResizeCanvas",
            &[
                ("global_id", JsValue::from_f64(global_id as f64)),
                ("w", JsValue::from_f64(w as f64)),
                ("h", JsValue::from_f64(h as f64)),
            ],
        );
    }

    fn remove_canvas(&mut self, global_id: u32) {
        self.post("RemoveCanvas", &[("global_id", JsValue::from_f64(global_id as f64))]);
    }

    fn report_error(&mut self, err: BridgeError) {
        log::error!("canvas engine error: {err}");
        self.post(
            "Error",
            &[
                ("message", JsValue::from_str(&err.to_string())),
                ("fatal", JsValue::from_bool(false)),
            ],
        );
    }
}
