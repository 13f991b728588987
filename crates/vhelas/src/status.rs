//! Status line derivation and rendering.
//!
//! The status line is taken from the newest message whose active variable
//! store holds a valid `vhelas_status` array. Stored values are validated
//! again on read because other code may have written to the store since
//! extraction. Array length decides slot placement:
//!
//! | Length | Left | Center | Right |
//! |--------|------|--------|-------|
//! | 3 | `[0]` | `[1]` | `[2]` |
//! | 2 | `[0]` | empty | `[1]` |
//! | 1 | empty | `[0]` | empty |

use std::fmt;
use std::sync::Mutex;

use serde::Serialize;
use tracing::{debug, error};

use crate::chat::ChatMessage;
use crate::tags::{Scalar, TagName, TagPayload, TagRegistry};

/// The three display segments of the status bar.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusLine {
    pub left: String,
    pub center: String,
    pub right: String,
}

impl StatusLine {
    pub fn new(
        left: impl Into<String>,
        center: impl Into<String>,
        right: impl Into<String>,
    ) -> Self {
        Self {
            left: left.into(),
            center: center.into(),
            right: right.into(),
        }
    }

    /// Place status cells into slots by array length. Any other length
    /// yields an empty line.
    pub fn from_cells(cells: &[Scalar]) -> Self {
        match cells {
            [l, c, r] => Self::new(l.to_display(), c.to_display(), r.to_display()),
            [l, r] => Self::new(l.to_display(), "", r.to_display()),
            [c] => Self::new("", c.to_display(), ""),
            _ => Self::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty() && self.center.is_empty() && self.right.is_empty()
    }

    /// Which slots the display should show for these segments.
    pub fn layout(&self) -> SlotLayout {
        let (l, c, r) = (
            !self.left.is_empty(),
            !self.center.is_empty(),
            !self.right.is_empty(),
        );
        match (l, c, r) {
            (false, false, false) => SlotLayout::Hidden,
            (true, false, true) => SlotLayout::LeftRight,
            (false, true, false) => SlotLayout::CenterOnly,
            _ => SlotLayout::All,
        }
    }
}

impl fmt::Display for StatusLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let layout = self.layout();
        let slots = [
            (layout.left_visible(), &self.left),
            (layout.center_visible(), &self.center),
            (layout.right_visible(), &self.right),
        ];
        let shown: Vec<&str> = slots
            .iter()
            .filter(|(visible, _)| *visible)
            .map(|(_, text)| text.as_str())
            .collect();
        f.write_str(&shown.join(" | "))
    }
}

/// Slot visibility directive handed to the display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotLayout {
    /// Every segment is empty; the whole bar is hidden.
    Hidden,
    /// Left and right shown, center hidden.
    LeftRight,
    /// Only the center shown.
    CenterOnly,
    /// All three slots shown.
    All,
}

impl SlotLayout {
    pub fn bar_visible(self) -> bool {
        self != Self::Hidden
    }

    pub fn left_visible(self) -> bool {
        matches!(self, Self::LeftRight | Self::All)
    }

    pub fn center_visible(self) -> bool {
        matches!(self, Self::CenterOnly | Self::All)
    }

    pub fn right_visible(self) -> bool {
        matches!(self, Self::LeftRight | Self::All)
    }
}

// ── Reducers ───────────────────────────────────────────────────────

/// Newest valid payload of `tag` across the conversation.
///
/// Only the active alternative of each message is consulted. Stored values
/// that fail validation are logged and skipped in favour of older ones.
pub fn latest_payload(
    registry: &TagRegistry,
    chat: &[ChatMessage],
    tag: TagName,
) -> Option<TagPayload> {
    let key = tag.variable_key();
    for (index, msg) in chat.iter().enumerate().rev() {
        let Some(value) = msg.active_store().and_then(|store| store.get(&key)) else {
            continue;
        };
        match registry.validate(tag, value) {
            Ok(payload) => return Some(payload),
            Err(err) => error!(index, tag = %tag, "stored value rejected: {err}"),
        }
    }
    None
}

/// Derive the status line from the newest valid stored status.
pub fn derive_status(registry: &TagRegistry, chat: &[ChatMessage]) -> StatusLine {
    match latest_payload(registry, chat, TagName::Status) {
        Some(TagPayload::Status(cells)) => StatusLine::from_cells(&cells),
        _ => StatusLine::default(),
    }
}

// ── Display sink ───────────────────────────────────────────────────

/// Host-side display for the status bar.
pub trait StatusSink: Send + Sync {
    /// Render the three segments with the given slot visibility.
    fn show(&self, line: &StatusLine, layout: SlotLayout);

    /// Rendered heights of the currently visible slots.
    fn slot_heights(&self) -> Vec<u32>;

    /// Publish the bar height for surrounding page layout.
    fn publish_height(&self, height: u32);
}

/// Push a status line to the sink, then publish the bar height.
/// Returns the published height.
pub fn render_status(sink: &dyn StatusSink, line: &StatusLine) -> u32 {
    let layout = line.layout();
    debug!(?layout, "rendering status line");
    sink.show(line, layout);
    remeasure(sink, layout)
}

/// Recompute and publish the bar height without re-rendering, e.g. after
/// the host viewport was resized. A hidden bar has height 0.
pub fn remeasure(sink: &dyn StatusSink, layout: SlotLayout) -> u32 {
    let height = if layout.bar_visible() {
        sink.slot_heights().into_iter().max().unwrap_or(0)
    } else {
        0
    };
    sink.publish_height(height);
    height
}

/// Snapshot of what a [`MemorySink`] last displayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rendered {
    pub line: StatusLine,
    pub layout: SlotLayout,
    pub height: u32,
    pub renders: u32,
}

impl Default for Rendered {
    fn default() -> Self {
        Self {
            line: StatusLine::default(),
            layout: SlotLayout::Hidden,
            height: 0,
            renders: 0,
        }
    }
}

/// In-memory display that measures one unit of height per text line.
#[derive(Debug, Default)]
pub struct MemorySink {
    state: Mutex<Rendered>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the last rendered state.
    pub fn snapshot(&self) -> Rendered {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl StatusSink for MemorySink {
    fn show(&self, line: &StatusLine, layout: SlotLayout) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.line = line.clone();
        state.layout = layout;
        state.renders += 1;
    }

    fn slot_heights(&self) -> Vec<u32> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let slots = [
            (state.layout.left_visible(), &state.line.left),
            (state.layout.center_visible(), &state.line.center),
            (state.layout.right_visible(), &state.line.right),
        ];
        slots
            .iter()
            .filter(|(visible, _)| *visible)
            .map(|(_, text)| text.lines().count() as u32)
            .collect()
    }

    fn publish_height(&self, height: u32) {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).height = height;
    }
}
