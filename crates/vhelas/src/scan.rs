//! Conversation-wide tag scanning.
//!
//! [`scan_conversation`] runs the single-message extractor over every
//! alternative of every message, rewrites cleaned texts, and merges the
//! extracted payloads into the matching variable stores. User messages lose
//! their derived variables and have markers stripped without storing them.
//!
//! [`scan_and_persist`] wraps the walk with the persistence contract: at most
//! one save request per scan, issued after the whole conversation has been
//! visited.

use tracing::{debug, info};

use crate::chat::{ChatMessage, clear_derived};
use crate::tags::{TagRegistry, extract_tags};

/// Receives a save request when a scan changed the conversation.
///
/// Hosts are free to debounce or coalesce these requests.
pub trait Persistence: Send + Sync {
    fn request_save(&self);
}

impl<F> Persistence for F
where
    F: Fn() + Send + Sync,
{
    fn request_save(&self) {
        self()
    }
}

/// Persistence that drops every request.
pub struct NoPersistence;

impl Persistence for NoPersistence {
    fn request_save(&self) {}
}

/// Summary of one conversation scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Whether any text or variable store changed.
    pub modified: bool,
    /// Messages with at least one change.
    pub messages_changed: usize,
    /// Alternatives whose text had markers removed.
    pub texts_cleaned: usize,
    /// Alternatives whose variable store received extracted payloads.
    pub stores_updated: usize,
    /// Derived variables cleared from user messages.
    pub user_vars_cleared: usize,
    /// Marker occurrences that failed to parse or validate.
    pub rejected: usize,
}

/// Walk every message and alternative, extracting and merging tag payloads.
pub fn scan_conversation(registry: &TagRegistry, chat: &mut [ChatMessage]) -> ScanReport {
    let mut report = ScanReport::default();

    for (index, msg) in chat.iter_mut().enumerate() {
        let mut changed = false;

        if msg.is_user
            && let Some(store) = msg.variables.get_mut(0)
        {
            let cleared = clear_derived(store);
            if cleared > 0 {
                debug!(index, cleared, "cleared derived variables on user message");
                report.user_vars_cleared += cleared;
                changed = true;
            }
        }

        let active = msg.active_index();
        let count = msg.swipes.as_ref().map_or(1, Vec::len);
        for alt in 0..count {
            let text = match &msg.swipes {
                Some(swipes) => swipes[alt].clone(),
                None => msg.mes.clone(),
            };
            let extraction = extract_tags(registry, &text);
            report.rejected += extraction.rejected.len();
            if extraction.is_empty() {
                continue;
            }

            // User turns lose their markers but never carry the state.
            if !msg.is_user {
                let store = msg.store_mut(alt);
                clear_derived(store);
                store.extend(extraction.variables());
                report.stores_updated += 1;
            }

            if let Some(cleaned) = extraction.cleaned {
                match msg.swipes.as_mut() {
                    Some(swipes) => {
                        if alt == active {
                            msg.mes = cleaned.clone();
                        }
                        swipes[alt] = cleaned;
                    }
                    None => msg.mes = cleaned,
                }
                report.texts_cleaned += 1;
            }
            debug!(
                index,
                swipe = alt,
                tags = extraction.payloads.len(),
                "extracted tags"
            );
            changed = true;
        }

        if changed {
            report.messages_changed += 1;
        }
    }

    report.modified = report.messages_changed > 0;
    debug!(
        messages = chat.len(),
        changed = report.messages_changed,
        rejected = report.rejected,
        "conversation scan complete"
    );
    report
}

/// Scan the conversation and request one save if anything changed.
pub fn scan_and_persist(
    registry: &TagRegistry,
    chat: &mut [ChatMessage],
    persistence: &dyn Persistence,
) -> ScanReport {
    let report = scan_conversation(registry, chat);
    if report.modified {
        info!(
            messages_changed = report.messages_changed,
            "conversation modified, requesting save"
        );
        persistence.request_save();
    }
    report
}
