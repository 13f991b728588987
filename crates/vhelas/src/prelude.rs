//! Convenience re-exports for hosts embedding the extension.
//!
//! ```ignore
//! use vhelas::prelude::*;
//! ```

// ── Conversation ────────────────────────────────────────────────────
pub use crate::chat::{ChatMessage, VariableStore};

// ── Tags ────────────────────────────────────────────────────────────
pub use crate::tags::{Scalar, TagError, TagName, TagPayload, TagRegistry, extract_tags};

// ── Update cycle ────────────────────────────────────────────────────
pub use crate::config::{OutputAugmentation, ParserAugmentation, Settings};
pub use crate::events::{ChatEvent, ChatEventHandler, EventBus};
pub use crate::extension::{HostContext, StatusLineExtension, UpdateReport};
pub use crate::intercept::{GenerationInterceptor, InterceptAction};
pub use crate::scan::{NoPersistence, Persistence, ScanReport};
pub use crate::status::{MemorySink, SlotLayout, StatusLine, StatusSink};

// ── Host shim ───────────────────────────────────────────────────────
pub use crate::diagnostics::{DiagnosticBuffer, DiagnosticsLayer};
pub use crate::host::{ChatFile, SaveFlag};
