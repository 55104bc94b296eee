//! Fetching documents by URL with `window.fetch`
//!
//! Failures are reported as [`ViewerError::Fetch`] and never retried.

use js_sys::{ArrayBuffer, Uint8Array};
use pdfmark_core::{validate_source_url, ViewerError};
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use web_sys::{Request, RequestInit, RequestMode, Response};

use crate::pdf_bridge::js_error_message;

/// User-facing message for a failed fetch of `url`. Local files usually fail
/// because the browser blocks file access, remote ones because of CORS.
pub fn fetch_failure_message(url: &str, detail: &str) -> String {
    let hint = if url.trim_start().to_ascii_lowercase().starts_with("file:") {
        "Could not load the local PDF. Allow this viewer access to file URLs in the browser's extension settings, then reload"
    } else {
        "Could not load the PDF from this URL. The server may not allow cross-origin requests"
    };
    format!("{} ({})", hint, detail)
}

/// Download `url` and return its bytes
pub async fn fetch_pdf(url: &str, allowed_schemes: &[String]) -> Result<Vec<u8>, ViewerError> {
    validate_source_url(url, allowed_schemes)?;
    let fail = |detail: String| ViewerError::Fetch(fetch_failure_message(url, &detail));

    let window = web_sys::window().ok_or_else(|| fail("no window".to_string()))?;

    let opts = RequestInit::new();
    opts.set_method("GET");
    opts.set_mode(RequestMode::Cors);
    let request =
        Request::new_with_str_and_init(url, &opts).map_err(|e| fail(js_error_message(&e)))?;

    let response = JsFuture::from(window.fetch_with_request(&request))
        .await
        .map_err(|e| fail(js_error_message(&e)))?;
    let response: Response = response
        .dyn_into()
        .map_err(|_| fail("unexpected fetch result".to_string()))?;

    if !response.ok() {
        return Err(fail(format!("HTTP {}", response.status())));
    }

    let buffer = response
        .array_buffer()
        .map_err(|e| fail(js_error_message(&e)))?;
    let buffer = JsFuture::from(buffer)
        .await
        .map_err(|e| fail(js_error_message(&e)))?;
    let buffer: ArrayBuffer = buffer
        .dyn_into()
        .map_err(|_| fail("response body is not binary".to_string()))?;

    Ok(Uint8Array::new(&buffer).to_vec())
}
