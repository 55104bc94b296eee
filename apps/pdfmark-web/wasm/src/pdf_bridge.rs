//! pdf.js rasterization bridge
//!
//! Parsing for geometry and export happens in Rust with lopdf; pdf.js only
//! paints page bitmaps. Each loaded document is an opaque pdf.js proxy that
//! the viewer keeps next to its session and releases on replacement.

use js_sys::{Reflect, Uint8Array};
use wasm_bindgen::prelude::*;
use web_sys::HtmlCanvasElement;

/// Worker used when the page does not configure one
pub const DEFAULT_WORKER_SRC: &str =
    "https://cdn.jsdelivr.net/npm/pdfjs-dist@3.11.174/build/pdf.worker.min.js";

// External JavaScript functions from pdf-bridge.js
#[wasm_bindgen(module = "/www/js/pdf-bridge.js")]
extern "C" {
    #[wasm_bindgen(js_name = initPdfJs)]
    async fn init_pdf_js_internal(worker_src: &str) -> JsValue;

    #[wasm_bindgen(js_name = loadDocument, catch)]
    async fn load_document_internal(data: Uint8Array) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(js_name = renderPage, catch)]
    async fn render_page_internal(
        document: &JsValue,
        page_num: u32,
        canvas: &HtmlCanvasElement,
        scale: f64,
    ) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(js_name = releaseDocument)]
    fn release_document_internal(document: &JsValue);
}

/// Initialize pdf.js with the default worker
#[wasm_bindgen]
pub async fn init_pdf_js() -> Result<(), JsValue> {
    init_pdf_js_internal(DEFAULT_WORKER_SRC).await;
    Ok(())
}

/// Initialize pdf.js with a custom worker URL
#[wasm_bindgen]
pub async fn init_pdf_js_with_worker(worker_src: &str) -> Result<(), JsValue> {
    init_pdf_js_internal(worker_src).await;
    Ok(())
}

/// A document opened by pdf.js
pub struct PdfJsDocument {
    proxy: JsValue,
}

impl PdfJsDocument {
    /// Open `bytes` in pdf.js. pdf.js takes ownership of the buffer it is
    /// given, so a copy is passed.
    pub async fn open(bytes: &[u8]) -> Result<Self, String> {
        let data = Uint8Array::new_with_length(bytes.len() as u32);
        data.copy_from(bytes);

        let proxy = load_document_internal(data)
            .await
            .map_err(|e| js_error_message(&e))?;
        if proxy.is_undefined() || proxy.is_null() {
            return Err("pdf.js returned no document".to_string());
        }
        Ok(Self { proxy })
    }

    pub fn page_count(&self) -> u32 {
        Reflect::get(&self.proxy, &JsValue::from_str("numPages"))
            .ok()
            .and_then(|n| n.as_f64())
            .map(|n| n as u32)
            .unwrap_or(0)
    }

    /// Paint page `page_num` (1-based) into `canvas` at `scale`. The canvas
    /// is sized by the bridge to the scaled viewport.
    pub async fn render(
        &self,
        page_num: u32,
        canvas: &HtmlCanvasElement,
        scale: f64,
    ) -> Result<(), String> {
        render_page_internal(&self.proxy, page_num, canvas, scale)
            .await
            .map(|_| ())
            .map_err(|e| js_error_message(&e))
    }
}

impl Drop for PdfJsDocument {
    fn drop(&mut self) {
        release_document_internal(&self.proxy);
    }
}

/// Best-effort message from a rejected promise value
pub fn js_error_message(value: &JsValue) -> String {
    if let Some(text) = value.as_string() {
        return text;
    }
    Reflect::get(value, &JsValue::from_str("message"))
        .ok()
        .and_then(|m| m.as_string())
        .unwrap_or_else(|| format!("{:?}", value))
}
