//! Wires a [`CanvasHost`] up to a real `web_sys::Worker`: translates
//! [`Message`] to/from a tagged `JsValue` for `postMessage`, and performs
//! the `OffscreenCanvas` transfer the first time a given `context_id` is
//! emitted (spec.md §4.6 "transferred only on the first emission").

use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{HtmlCanvasElement, MessageEvent, Worker};

use bridge_core::lock::Clock;

use crate::dom::DomCanvasFactory;
use crate::facade::CanvasHost;
use crate::messages::Message;

fn field(obj: &JsValue, key: &str) -> Option<JsValue> {
    js_sys::Reflect::get(obj, &JsValue::from_str(key)).ok()
}

fn decode(data: &JsValue) -> Option<Message> {
    let ty = field(data, "type")?.as_string()?;
    match ty.as_str() {
        "RequestCanvas" => Some(Message::RequestCanvas {
            global_id: field(data, "global_id")?.as_f64()? as u32,
            w: field(data, "w")?.as_f64()? as i16,
            h: field(data, "h")?.as_f64()? as i16,
        }),
        "ResizeCanvas" => Some(Message::ResizeCanvas {
            global_id: field(data, "global_id")?.as_f64()? as u32,
            w: field(data, "w")?.as_f64()? as i16,
            h: field(data, "h")?.as_f64()? as i16,
        }),
        "RemoveCanvas" => Some(Message::RemoveCanvas {
            global_id: field(data, "global_id")?.as_f64()? as u32,
        }),
        "Error" => Some(Message::Error {
            message: field(data, "message")?.as_string().unwrap_or_default(),
            kind: field(data, "kind").and_then(|v| v.as_string()),
            stack: field(data, "stack").and_then(|v| v.as_string()),
            fatal: field(data, "fatal").and_then(|v| v.as_bool()),
        }),
        _ => None,
    }
}

/// Pairs a [`CanvasHost`] with the `web_sys::Worker` it talks to, draining
/// inbound control messages and posting replies (with an offscreen transfer
/// attached when the pooled canvas is fresh for this worker).
pub struct HostWorkerLink<C: Clock> {
    worker: Worker,
    host: CanvasHost<DomCanvasFactory, C>,
    _onmessage: Closure<dyn FnMut(MessageEvent)>,
}

impl<C: Clock + 'static> HostWorkerLink<C> {
    pub fn new(worker: Worker, host: CanvasHost<DomCanvasFactory, C>) -> std::rc::Rc<std::cell::RefCell<Self>> {
        let link = std::rc::Rc::new(std::cell::RefCell::new(Self {
            worker: worker.clone(),
            host,
            // placeholder; replaced below once `link` exists for the closure to capture
            _onmessage: Closure::wrap(Box::new(|_: MessageEvent| {}) as Box<dyn FnMut(MessageEvent)>),
        }));

        let link_cb = link.clone();
        let onmessage = Closure::<dyn FnMut(MessageEvent)>::new(move |event: MessageEvent| {
            link_cb.borrow_mut().on_message(event);
        });
        worker.set_onmessage(Some(onmessage.as_ref().unchecked_ref()));
        link.borrow_mut()._onmessage = onmessage;
        link
    }

    fn on_message(&mut self, event: MessageEvent) {
        let Some(message) = decode(&event.data()) else {
            log::warn!("dropping unrecognized control message from worker");
            return;
        };
        if let Some(reply) = self.host.handle(message) {
            self.post_reply(reply);
        }
    }

    fn post_reply(&self, reply: Message) {
        let Message::ReceiveCanvas {
            global_id,
            context_id,
            has_canvas,
        } = reply
        else {
            return;
        };
        let obj = js_sys::Object::new();
        let _ = js_sys::Reflect::set(&obj, &JsValue::from_str("type"), &JsValue::from_str("ReceiveCanvas"));
        let _ = js_sys::Reflect::set(&obj, &JsValue::from_str("global_id"), &JsValue::from_f64(global_id as f64));
        let _ = js_sys::Reflect::set(&obj, &JsValue::from_str("context_id"), &JsValue::from_f64(context_id as f64));

        if has_canvas {
            if let Some(canvas) = self.host.canvas(context_id) {
                if let Ok(offscreen) = transfer_control_to_offscreen(canvas) {
                    let _ = js_sys::Reflect::set(&obj, &JsValue::from_str("canvas"), &offscreen);
                    let transfer = js_sys::Array::of1(&offscreen);
                    let _ = self.worker.post_message_with_transfer(&obj, &transfer);
                    return;
                }
            }
        }
        let _ = self.worker.post_message(&obj);
    }
}

fn transfer_control_to_offscreen(canvas: &HtmlCanvasElement) -> Result<JsValue, JsValue> {
    canvas.transfer_control_to_offscreen().map(Into::into)
}
