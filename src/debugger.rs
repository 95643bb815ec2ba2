use serde::Serialize;
use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

/// An event published to the debugger channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DebuggerEvent {
    ScpiIssued {
        flow_state: u32,
        component: usize,
        text: String,
        is_query: bool,
    },
    ScpiCompleted {
        flow_state: u32,
        component: usize,
        error: Option<String>,
        result: Option<String>,
    },
    ComponentFailed {
        flow_state: Option<u32>,
        message: String,
    },
}

/// A fire-and-forget sink for debugger events.
pub trait Debugger {
    fn emit(&mut self, event: DebuggerEvent);
}

/// Serializes events to JSON and forwards them to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDebugger;

impl Debugger for LogDebugger {
    fn emit(&mut self, event: DebuggerEvent) {
        match serde_json::to_string(&event) {
            Ok(json) => log::debug!(target: "tickflow::debugger", "{}", json),
            Err(e) => log::warn!("Failed to serialize debugger event: {}", e),
        }
    }
}

/// Writes one JSON object per event, newline-delimited.
pub struct JsonLinesDebugger<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesDebugger<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Debugger for JsonLinesDebugger<W> {
    fn emit(&mut self, event: DebuggerEvent) {
        let written = serde_json::to_writer(&mut self.writer, &event)
            .map_err(std::io::Error::from)
            .and_then(|_| self.writer.write_all(b"\n"));
        if let Err(e) = written {
            log::warn!("Debugger sink write failed: {}", e);
        }
    }
}

/// Keeps every event in memory; clones share the same log.
#[derive(Debug, Default, Clone)]
pub struct RecordingDebugger {
    events: Rc<RefCell<Vec<DebuggerEvent>>>,
}

impl RecordingDebugger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DebuggerEvent> {
        self.events.borrow().clone()
    }
}

impl Debugger for RecordingDebugger {
    fn emit(&mut self, event: DebuggerEvent) {
        self.events.borrow_mut().push(event);
    }
}
