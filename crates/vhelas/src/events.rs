//! Host lifecycle events and the handlers that react to them.
//!
//! The host delivers [`ChatEvent`]s one at a time; each dispatch runs to
//! completion before the next event is taken. Handlers are composed in an
//! [`EventBus`] and called in registration order.
//!
//! # Standard wiring
//!
//! | Handler | Events |
//! |---------|--------|
//! | [`LoggingHandler`] | all |
//! | [`ResetHandler`] | character page loaded, character renamed, chat changed |
//! | [`RescanHandler`] | character page loaded, chat changed, every message event |

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::extension::{HostContext, StatusLineExtension, UpdateReport};
use crate::status::{StatusLine, render_status};

// ── Events ─────────────────────────────────────────────────────────

/// Named lifecycle events emitted by the host chat application.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChatEvent {
    CharacterPageLoaded,
    CharacterRenamed,
    ChatChanged,
    MessageSent,
    MessageReceived,
    MessageEdited,
    MessageDeleted,
    MessageUpdated,
    MessageSwiped,
    MessageSwipeDeleted,
    MessageFileEmbedded,
    CharacterFirstMessageSelected,
}

impl ChatEvent {
    pub const ALL: [ChatEvent; 12] = [
        ChatEvent::CharacterPageLoaded,
        ChatEvent::CharacterRenamed,
        ChatEvent::ChatChanged,
        ChatEvent::MessageSent,
        ChatEvent::MessageReceived,
        ChatEvent::MessageEdited,
        ChatEvent::MessageDeleted,
        ChatEvent::MessageUpdated,
        ChatEvent::MessageSwiped,
        ChatEvent::MessageSwipeDeleted,
        ChatEvent::MessageFileEmbedded,
        ChatEvent::CharacterFirstMessageSelected,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::CharacterPageLoaded => "CHARACTER_PAGE_LOADED",
            Self::CharacterRenamed => "CHARACTER_RENAMED",
            Self::ChatChanged => "CHAT_CHANGED",
            Self::MessageSent => "MESSAGE_SENT",
            Self::MessageReceived => "MESSAGE_RECEIVED",
            Self::MessageEdited => "MESSAGE_EDITED",
            Self::MessageDeleted => "MESSAGE_DELETED",
            Self::MessageUpdated => "MESSAGE_UPDATED",
            Self::MessageSwiped => "MESSAGE_SWIPED",
            Self::MessageSwipeDeleted => "MESSAGE_SWIPE_DELETED",
            Self::MessageFileEmbedded => "MESSAGE_FILE_EMBEDDED",
            Self::CharacterFirstMessageSelected => "CHARACTER_FIRST_MESSAGE_SELECTED",
        }
    }

    /// Character- or chat-level events that replace the whole conversation.
    pub fn is_reset(self) -> bool {
        matches!(
            self,
            Self::CharacterPageLoaded | Self::CharacterRenamed | Self::ChatChanged
        )
    }
}

impl fmt::Display for ChatEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChatEvent {
    type Err = String;

    /// Accepts the wire name in any case, e.g. `MESSAGE_SENT` or `message_sent`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_uppercase();
        Self::ALL
            .into_iter()
            .find(|e| e.as_str() == wanted)
            .ok_or_else(|| format!("unknown event '{}'", s.trim()))
    }
}

// ── Handlers ───────────────────────────────────────────────────────

/// Reacts to host events.
///
/// [`handles`](Self::handles) decides the subscription; `on_event` is only
/// called for subscribed events. Returning `Some` reports that the handler
/// ran an update cycle.
pub trait ChatEventHandler: Send + Sync {
    fn handles(&self, event: ChatEvent) -> bool {
        let _ = event;
        true
    }

    fn on_event(&self, event: ChatEvent, ctx: &mut HostContext<'_>) -> Option<UpdateReport>;
}

/// Rescans the conversation and updates the status line.
pub struct RescanHandler {
    extension: Arc<StatusLineExtension>,
}

impl RescanHandler {
    pub fn new(extension: Arc<StatusLineExtension>) -> Self {
        Self { extension }
    }
}

impl ChatEventHandler for RescanHandler {
    fn handles(&self, event: ChatEvent) -> bool {
        event != ChatEvent::CharacterRenamed
    }

    fn on_event(&self, event: ChatEvent, ctx: &mut HostContext<'_>) -> Option<UpdateReport> {
        debug!(%event, "rescanning conversation");
        Some(self.extension.refresh(ctx))
    }
}

/// Clears the display and rebuilds state from scratch when the character or
/// chat changes.
pub struct ResetHandler {
    extension: Arc<StatusLineExtension>,
}

impl ResetHandler {
    pub fn new(extension: Arc<StatusLineExtension>) -> Self {
        Self { extension }
    }
}

impl ChatEventHandler for ResetHandler {
    fn handles(&self, event: ChatEvent) -> bool {
        event.is_reset()
    }

    fn on_event(&self, event: ChatEvent, ctx: &mut HostContext<'_>) -> Option<UpdateReport> {
        info!(%event, messages = ctx.chat.len(), "conversation reset");
        render_status(ctx.sink, &StatusLine::default());
        Some(self.extension.refresh(ctx))
    }
}

/// Logs every event via `tracing`.
pub struct LoggingHandler;

impl ChatEventHandler for LoggingHandler {
    fn on_event(&self, event: ChatEvent, ctx: &mut HostContext<'_>) -> Option<UpdateReport> {
        debug!(%event, messages = ctx.chat.len(), "host event");
        None
    }
}

// ── Bus ────────────────────────────────────────────────────────────

/// Ordered set of handlers. Every subscribed handler sees every event.
///
/// ```ignore
/// let bus = EventBus::new()
///     .with(LoggingHandler)
///     .with(ResetHandler::new(ext.clone()))
///     .with(RescanHandler::new(ext));
/// ```
pub struct EventBus {
    handlers: Vec<Box<dyn ChatEventHandler>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    /// The standard subscriptions for `extension`.
    pub fn standard(extension: Arc<StatusLineExtension>) -> Self {
        Self::new()
            .with(LoggingHandler)
            .with(ResetHandler::new(extension.clone()))
            .with(RescanHandler::new(extension))
    }

    /// Add a handler to the chain. Handlers are called in registration order.
    pub fn with(mut self, handler: impl ChatEventHandler + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Deliver `event` to every subscribed handler.
    ///
    /// Returns the merged report of all handlers that ran an update, or
    /// `None` when none did.
    pub fn dispatch(&self, event: ChatEvent, ctx: &mut HostContext<'_>) -> Option<UpdateReport> {
        self.handlers
            .iter()
            .filter(|h| h.handles(event))
            .filter_map(|h| h.on_event(event, ctx))
            .reduce(UpdateReport::merge)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ChatMessage;
    use crate::config::Settings;
    use crate::scan::NoPersistence;
    use crate::status::MemorySink;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn extension() -> Arc<StatusLineExtension> {
        Arc::new(StatusLineExtension::new(Settings::default()).unwrap())
    }

    #[test]
    fn event_names_parse_in_any_case() {
        assert_eq!("MESSAGE_SENT".parse::<ChatEvent>(), Ok(ChatEvent::MessageSent));
        assert_eq!(" chat_changed ".parse::<ChatEvent>(), Ok(ChatEvent::ChatChanged));
        assert!("NOPE".parse::<ChatEvent>().is_err());
        for event in ChatEvent::ALL {
            assert_eq!(event.as_str().parse::<ChatEvent>(), Ok(event));
        }
    }

    #[test]
    fn serde_uses_wire_names() {
        let json = serde_json::to_string(&ChatEvent::MessageSwipeDeleted).unwrap();
        assert_eq!(json, "\"MESSAGE_SWIPE_DELETED\"");
    }

    #[test]
    fn subscriptions_follow_standard_wiring() {
        let ext = extension();
        let reset = ResetHandler::new(ext.clone());
        let rescan = RescanHandler::new(ext);
        assert!(reset.handles(ChatEvent::CharacterRenamed));
        assert!(!reset.handles(ChatEvent::MessageReceived));
        assert!(rescan.handles(ChatEvent::MessageReceived));
        assert!(rescan.handles(ChatEvent::ChatChanged));
        assert!(!rescan.handles(ChatEvent::CharacterRenamed));
    }

    #[test]
    fn message_event_runs_one_update() {
        let bus = EventBus::standard(extension());
        assert_eq!(bus.len(), 3);
        let sink = MemorySink::new();
        let mut chat = vec![ChatMessage::assistant(r#"x<!--STATUS:["C"]-->"#)];
        let report = bus
            .dispatch(
                ChatEvent::MessageReceived,
                &mut HostContext::new(&mut chat, &NoPersistence, &sink),
            )
            .unwrap();
        assert!(report.scan.modified);
        assert_eq!(report.status.center, "C");
        assert_eq!(sink.snapshot().renders, 1);
    }

    #[test]
    fn chat_change_runs_reset_then_rescan_with_single_save() {
        let bus = EventBus::standard(extension());
        let sink = MemorySink::new();
        let saves = AtomicUsize::new(0);
        let persist = || {
            saves.fetch_add(1, Ordering::SeqCst);
        };
        let mut chat = vec![ChatMessage::assistant(r#"x<!--STATUS:["L","R"]-->"#)];
        let report = bus
            .dispatch(
                ChatEvent::ChatChanged,
                &mut HostContext::new(&mut chat, &persist, &sink),
            )
            .unwrap();
        // Reset clears, reset refreshes, rescan refreshes.
        assert_eq!(sink.snapshot().renders, 3);
        assert!(report.scan.modified);
        assert_eq!(report.status, StatusLine::new("L", "", "R"));
        // The second pass found nothing left to change.
        assert_eq!(saves.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn rename_only_reaches_reset_handler() {
        let bus = EventBus::standard(extension());
        let sink = MemorySink::new();
        let mut chat = vec![ChatMessage::assistant("plain")];
        let report = bus.dispatch(
            ChatEvent::CharacterRenamed,
            &mut HostContext::new(&mut chat, &NoPersistence, &sink),
        );
        assert!(report.is_some());
        assert_eq!(sink.snapshot().renders, 2);
    }

    #[test]
    fn empty_bus_reports_nothing() {
        let bus = EventBus::new();
        assert!(bus.is_empty());
        let sink = MemorySink::new();
        let mut chat: Vec<ChatMessage> = Vec::new();
        assert!(
            bus.dispatch(
                ChatEvent::MessageSent,
                &mut HostContext::new(&mut chat, &NoPersistence, &sink),
            )
            .is_none()
        );
    }
}
