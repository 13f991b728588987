//! Capture of tag diagnostics from `tracing`.
//!
//! Rejected markers are reported with `warn!`/`error!` and never abort a
//! scan. [`DiagnosticsLayer`] is a [`tracing_subscriber::Layer`] that copies
//! those events into a [`DiagnosticBuffer`] so a host can show them after
//! the fact. The buffer has its own mutex and is capped, so a burst of
//! malformed markers cannot grow it without bound.

use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::Local;
use serde::Serialize;
use tracing::Subscriber;
use tracing_subscriber::layer::Layer;
use tracing_subscriber::registry::LookupSpan;

/// Maximum diagnostics kept in memory.
pub const MAX_DIAGNOSTICS: usize = 1000;
/// Trim to this many when the cap is exceeded.
pub const DIAGNOSTICS_TRIM_TO: usize = 600;

/// Severity of a captured diagnostic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Severity {
    Warn,
    Error,
}

impl Severity {
    pub fn label(self) -> &'static str {
        match self {
            Self::Warn => "WARN ",
            Self::Error => "ERROR",
        }
    }
}

/// Longest marker payload excerpt kept in a diagnostic.
const PAYLOAD_EXCERPT_CHARS: usize = 80;

/// One captured diagnostic.
///
/// Marker rejections carry the tag name and an excerpt of the offending
/// payload so a host can point at the message that needs fixing.
#[derive(Clone, Debug, Serialize)]
pub struct Diagnostic {
    pub time: String,
    pub severity: Severity,
    pub tag: Option<String>,
    pub message: String,
    pub payload: Option<String>,
}

impl Diagnostic {
    /// Build a diagnostic from a WARN or ERROR event. Other levels yield `None`.
    fn from_event(event: &tracing::Event<'_>) -> Option<Self> {
        let severity = match *event.metadata().level() {
            tracing::Level::WARN => Severity::Warn,
            tracing::Level::ERROR => Severity::Error,
            _ => return None,
        };
        let mut fields = DiagnosticFields::default();
        event.record(&mut fields);

        let mut message = fields.message;
        if !fields.context.is_empty() {
            message.push_str(&format!(" ({})", fields.context.join(", ")));
        }
        Some(Self {
            time: Local::now().format("%H:%M:%S").to_string(),
            severity,
            tag: fields.tag,
            message: message.trim_start().to_string(),
            payload: fields.payload.map(|p| excerpt(&p)),
        })
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.time, self.severity.label())?;
        if let Some(tag) = &self.tag {
            write!(f, " [{tag}]")?;
        }
        write!(f, " {}", self.message)?;
        if let Some(payload) = &self.payload {
            write!(f, " in `{payload}`")?;
        }
        Ok(())
    }
}

fn excerpt(payload: &str) -> String {
    let mut chars = payload.chars();
    let head: String = chars.by_ref().take(PAYLOAD_EXCERPT_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

/// Shared buffer of captured diagnostics.
#[derive(Clone, Default)]
pub struct DiagnosticBuffer(Arc<Mutex<Vec<Diagnostic>>>);

impl DiagnosticBuffer {
    /// Take every pending diagnostic out of the buffer.
    pub fn drain(&self) -> Vec<Diagnostic> {
        let mut buf = self.0.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut *buf)
    }

    pub fn len(&self) -> usize {
        self.0.lock().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&self, diagnostic: Diagnostic) {
        if let Ok(mut buf) = self.0.lock() {
            buf.push(diagnostic);
            if buf.len() > MAX_DIAGNOSTICS {
                let trim_to = buf.len() - DIAGNOSTICS_TRIM_TO;
                buf.drain(..trim_to);
            }
        }
    }
}

/// Layer that records WARN and ERROR events into a [`DiagnosticBuffer`].
pub struct DiagnosticsLayer {
    buffer: DiagnosticBuffer,
}

impl DiagnosticsLayer {
    /// Create the layer and the buffer it writes to.
    pub fn new() -> (Self, DiagnosticBuffer) {
        let buffer = DiagnosticBuffer::default();
        (
            Self {
                buffer: buffer.clone(),
            },
            buffer,
        )
    }
}

impl<S: Subscriber + for<'a> LookupSpan<'a>> Layer<S> for DiagnosticsLayer {
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        if let Some(diagnostic) = Diagnostic::from_event(event) {
            self.buffer.push(diagnostic);
        }
    }
}

/// Splits an event into the fields the extractor and reducer emit.
#[derive(Default)]
struct DiagnosticFields {
    message: String,
    tag: Option<String>,
    payload: Option<String>,
    context: Vec<String>,
}

impl DiagnosticFields {
    fn set(&mut self, name: &str, value: String) {
        match name {
            "message" => self.message = value,
            "tag" => self.tag = Some(value),
            "payload" => self.payload = Some(value),
            other => self.context.push(format!("{other}={value}")),
        }
    }
}

impl tracing::field::Visit for DiagnosticFields {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
        self.set(field.name(), format!("{value:?}"));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.set(field.name(), value.to_string());
    }
}
