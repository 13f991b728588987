//! Pre-generation interception.
//!
//! The host calls a registered [`GenerationInterceptor`] right before the
//! outbound message list goes to the text-generation service. The
//! interceptor may rewrite that list or abort generation. The stored
//! conversation is never touched here; only the outbound copy is.
//!
//! The standard behaviour ([`prepare_outbound`]):
//!
//! 1. Disabled extension → proceed untouched.
//! 2. LLM parser augmentation without an API key → abort.
//! 3. Strip any recognized markers still present in outbound texts.
//! 4. Prepend a synthetic `Vhelas` message carrying the newest save as a
//!    `<!--SAVE:...-->` marker, when a save exists.

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::chat::ChatMessage;
use crate::config::Settings;
use crate::status::latest_payload;
use crate::tags::{MARKER_CLOSE, TagName, TagPayload, TagRegistry, strip_markers};

/// Display name of the injected save message.
pub const SAVE_AUTHOR: &str = "Vhelas";

/// Decision returned by a [`GenerationInterceptor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterceptAction {
    /// Let generation proceed with the (possibly rewritten) outbound list.
    Proceed,
    /// Stop generation with the given reason.
    Abort(String),
}

/// Hook invoked by the host before each generation request.
pub trait GenerationInterceptor: Send + Sync {
    /// Inspect the stored conversation and rewrite `outbound` in place.
    fn intercept(&self, chat: &[ChatMessage], outbound: &mut Vec<ChatMessage>) -> InterceptAction;
}

/// Newest valid save string in the conversation.
pub fn latest_save(registry: &TagRegistry, chat: &[ChatMessage]) -> Option<String> {
    match latest_payload(registry, chat, TagName::Save) {
        Some(TagPayload::Save(save)) => Some(save),
        _ => None,
    }
}

/// Build the synthetic leading message that carries `save` to the game
/// service.
///
/// The save is JSON-encoded and any `-->` inside it is written as
/// `--\u003e` so the marker cannot be closed early.
pub fn save_message(save: &str) -> ChatMessage {
    let payload = Value::String(save.to_string())
        .to_string()
        .replace(MARKER_CLOSE, "--\\u003e");
    ChatMessage {
        name: Some(SAVE_AUTHOR.to_string()),
        is_user: false,
        send_date: Some(Value::from(Utc::now().timestamp_millis())),
        mes: format!("<!--{}:{payload}-->", TagName::Save),
        ..Default::default()
    }
}

/// Apply the standard interception rules to `outbound`.
pub fn prepare_outbound(
    registry: &TagRegistry,
    settings: &Settings,
    chat: &[ChatMessage],
    outbound: &mut Vec<ChatMessage>,
) -> InterceptAction {
    if !settings.enabled {
        return InterceptAction::Proceed;
    }
    if settings.missing_api_key() {
        warn!("llm parser augmentation is enabled without an api key; aborting generation");
        return InterceptAction::Abort(
            "parser augmentation 'llm' requires an api key".to_string(),
        );
    }

    let mut stripped = 0;
    for msg in outbound.iter_mut() {
        if let Some(clean) = strip_markers(&msg.mes) {
            msg.mes = clean;
            stripped += 1;
        }
    }
    if stripped > 0 {
        debug!(stripped, "removed leftover markers from outbound messages");
    }

    if let Some(save) = latest_save(registry, chat) {
        info!(bytes = save.len(), "injecting save into outbound messages");
        outbound.insert(0, save_message(&save));
    }
    InterceptAction::Proceed
}
