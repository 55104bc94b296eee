//! tracing output routed to the browser console
//!
//! Each event is formatted by `tracing-subscriber`'s fmt layer into a
//! [`ConsoleWriter`], which hands the finished line to `console.error`,
//! `console.warn` or `console.log` depending on the event level.

use std::io;
use tracing::{Level, Metadata};
use tracing_subscriber::fmt::MakeWriter;
use wasm_bindgen::JsValue;
use web_sys::console;

/// Console method an event at `level` is written to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleTarget {
    Error,
    Warn,
    Log,
}

impl ConsoleTarget {
    pub fn for_level(level: &Level) -> Self {
        match *level {
            Level::ERROR => ConsoleTarget::Error,
            Level::WARN => ConsoleTarget::Warn,
            _ => ConsoleTarget::Log,
        }
    }
}

/// Buffers one formatted event and flushes it to the console on drop
pub struct ConsoleWriter {
    target: ConsoleTarget,
    buffer: Vec<u8>,
}

impl io::Write for ConsoleWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for ConsoleWriter {
    fn drop(&mut self) {
        let line = String::from_utf8_lossy(&self.buffer);
        let line = line.trim_end();
        if line.is_empty() {
            return;
        }
        let message = JsValue::from_str(line);
        match self.target {
            ConsoleTarget::Error => console::error_1(&message),
            ConsoleTarget::Warn => console::warn_1(&message),
            ConsoleTarget::Log => console::log_1(&message),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleMakeWriter;

impl<'a> MakeWriter<'a> for ConsoleMakeWriter {
    type Writer = ConsoleWriter;

    fn make_writer(&'a self) -> Self::Writer {
        ConsoleWriter {
            target: ConsoleTarget::Log,
            buffer: Vec::new(),
        }
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
        ConsoleWriter {
            target: ConsoleTarget::for_level(meta.level()),
            buffer: Vec::new(),
        }
    }
}

/// Install the console subscriber. Safe to call more than once; only the
/// first call installs anything.
pub fn init() {
    let max_level = if cfg!(debug_assertions) {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let _ = tracing_subscriber::fmt()
        .without_time()
        .with_ansi(false)
        .with_target(false)
        .with_max_level(max_level)
        .with_writer(ConsoleMakeWriter)
        .try_init();
}
