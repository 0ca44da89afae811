//! [`CanvasFactory`] backed by `web_sys::Document`.

use wasm_bindgen::JsCast;
use web_sys::{Document, HtmlCanvasElement};

use crate::facade::CanvasFactory;

pub struct DomCanvasFactory {
    document: Document,
}

impl DomCanvasFactory {
    pub fn new(document: Document) -> Self {
        Self { document }
    }
}

impl CanvasFactory for DomCanvasFactory {
    type Canvas = HtmlCanvasElement;

    fn new_canvas(&mut self) -> Self::Canvas {
        self.document
            .create_element("canvas")
            .expect("document.createElement(\"canvas\") should not fail")
            .dyn_into::<HtmlCanvasElement>()
            .expect("created element is a canvas")
    }

    fn resize(&mut self, canvas: &Self::Canvas, w: i16, h: i16) {
        canvas.set_width(w.max(0) as u32);
        canvas.set_height(h.max(0) as u32);
    }

    fn destroy(&mut self, canvas: Self::Canvas) {
        canvas.remove();
    }
}
