//! Single-message marker extraction.
//!
//! A marker is `<!--NAME:<json>-->`. For each registered tag the extractor
//! collects every non-overlapping occurrence (the payload may span lines and
//! ends at the first `-->`), then tries them latest-first. The first one that
//! parses and validates wins: its payload is recorded and **every** marker of
//! that tag is cut from the text. When no occurrence validates, the text is
//! left alone for that tag.

use std::ops::Range;

use tracing::{trace, warn};

use super::grammar::{TagError, TagName, TagPayload, TagRegistry};
use crate::chat::VariableStore;

/// Opening sequence shared by every marker.
pub const MARKER_OPEN: &str = "<!--";
/// Closing sequence of every marker.
pub const MARKER_CLOSE: &str = "-->";

/// The outcome of scanning one message text.
#[derive(Debug, Default)]
pub struct Extraction {
    /// Winning payload per tag, in tag processing order.
    pub payloads: Vec<TagPayload>,
    /// Text with winning tags' markers removed and trimmed. `None` when no
    /// tag succeeded.
    pub cleaned: Option<String>,
    /// Occurrences that failed to parse or validate.
    pub rejected: Vec<TagError>,
}

impl Extraction {
    /// `true` when no tag produced a payload.
    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }

    pub fn get(&self, tag: TagName) -> Option<&TagPayload> {
        self.payloads.iter().find(|p| p.tag() == tag)
    }

    /// Payloads keyed by their variable-store key.
    pub fn variables(&self) -> VariableStore {
        self.payloads
            .iter()
            .map(|p| (p.tag().variable_key(), p.to_value()))
            .collect()
    }
}

/// One marker occurrence: the whole marker span and its payload span.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Occurrence {
    span: Range<usize>,
    payload: Range<usize>,
}

// Byte offsets come from `find` on ASCII delimiters, so every boundary is a
// char boundary.
#[allow(clippy::string_slice)]
fn occurrences(text: &str, tag: TagName) -> Vec<Occurrence> {
    let open = tag.open_marker();
    let mut found = Vec::new();
    let mut pos = 0;
    while let Some(rel) = text[pos..].find(&open) {
        let start = pos + rel;
        let payload_start = start + open.len();
        let Some(close) = text[payload_start..].find(MARKER_CLOSE) else {
            break;
        };
        let payload_end = payload_start + close;
        let end = payload_end + MARKER_CLOSE.len();
        found.push(Occurrence {
            span: start..end,
            payload: payload_start..payload_end,
        });
        pos = end;
    }
    found
}

#[allow(clippy::string_slice)]
fn remove_spans(text: &str, spans: &[Occurrence]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for occ in spans {
        out.push_str(&text[last..occ.span.start]);
        last = occ.span.end;
    }
    out.push_str(&text[last..]);
    out
}

/// Scan one message text for markers of every registered tag.
///
/// Text without any `<!--` returns an empty extraction immediately.
#[allow(clippy::string_slice)]
pub fn extract_tags(registry: &TagRegistry, text: &str) -> Extraction {
    let mut extraction = Extraction::default();
    if !text.contains(MARKER_OPEN) {
        return extraction;
    }

    let mut current = text.to_string();
    for tag in registry.tags() {
        let found = occurrences(&current, tag);
        if found.is_empty() {
            continue;
        }
        trace!(tag = %tag, count = found.len(), "marker occurrences");

        for occ in found.iter().rev() {
            let raw = &current[occ.payload.clone()];
            match registry.parse(tag, raw) {
                Ok(payload) => {
                    extraction.payloads.push(payload);
                    current = remove_spans(&current, &found).trim().to_string();
                    extraction.cleaned = Some(current.clone());
                    break;
                }
                Err(err) => {
                    warn!(tag = %tag, payload = raw, "{err}");
                    extraction.rejected.push(err);
                }
            }
        }
    }
    extraction
}

/// Remove every recognized marker from `text`, valid or not, and trim.
///
/// Returns `None` when the text carried no recognized marker.
pub fn strip_markers(text: &str) -> Option<String> {
    if !text.contains(MARKER_OPEN) {
        return None;
    }
    let mut current = text.to_string();
    let mut changed = false;
    for tag in TagName::ALL {
        let found = occurrences(&current, tag);
        if !found.is_empty() {
            current = remove_spans(&current, &found);
            changed = true;
        }
    }
    changed.then(|| current.trim().to_string())
}
