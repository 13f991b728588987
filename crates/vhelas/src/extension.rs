//! The extension's update cycle.
//!
//! One [`StatusLineExtension::refresh`] is the whole pipeline for a host
//! event: rescan every message, request at most one save, derive the status
//! line from the updated stores, and hand it to the display.

use tracing::debug;

use crate::chat::ChatMessage;
use crate::config::Settings;
use crate::intercept::{GenerationInterceptor, InterceptAction, prepare_outbound};
use crate::scan::{Persistence, ScanReport, scan_and_persist};
use crate::status::{StatusLine, StatusSink, derive_status, render_status};
use crate::tags::{TagError, TagRegistry};

/// Host collaborators for one update cycle.
pub struct HostContext<'a> {
    /// The conversation, mutated in place.
    pub chat: &'a mut [ChatMessage],
    pub persistence: &'a dyn Persistence,
    pub sink: &'a dyn StatusSink,
}

impl<'a> HostContext<'a> {
    pub fn new(
        chat: &'a mut [ChatMessage],
        persistence: &'a dyn Persistence,
        sink: &'a dyn StatusSink,
    ) -> Self {
        Self {
            chat,
            persistence,
            sink,
        }
    }
}

/// What one or more refreshes did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateReport {
    pub scan: ScanReport,
    pub status: StatusLine,
    /// Published status bar height.
    pub height: u32,
}

impl UpdateReport {
    /// Combine with a later report: change flags accumulate, the display
    /// state is the later one.
    pub fn merge(mut self, later: UpdateReport) -> Self {
        self.scan.modified |= later.scan.modified;
        self.scan.messages_changed += later.scan.messages_changed;
        self.scan.texts_cleaned += later.scan.texts_cleaned;
        self.scan.stores_updated += later.scan.stores_updated;
        self.scan.user_vars_cleared += later.scan.user_vars_cleared;
        self.scan.rejected += later.scan.rejected;
        self.status = later.status;
        self.height = later.height;
        self
    }
}

/// Settings plus the compiled tag registry, loaded once and shared by every
/// handler.
#[derive(Debug)]
pub struct StatusLineExtension {
    settings: Settings,
    registry: TagRegistry,
}

impl StatusLineExtension {
    pub fn new(settings: Settings) -> Result<Self, TagError> {
        Ok(Self {
            settings,
            registry: TagRegistry::standard()?,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn registry(&self) -> &TagRegistry {
        &self.registry
    }

    /// Rescan the conversation and redraw the status line.
    ///
    /// A disabled extension skips the scan and hides the bar.
    pub fn refresh(&self, ctx: &mut HostContext<'_>) -> UpdateReport {
        if !self.settings.enabled {
            debug!("extension disabled, hiding status line");
            let status = StatusLine::default();
            let height = render_status(ctx.sink, &status);
            return UpdateReport {
                scan: ScanReport::default(),
                status,
                height,
            };
        }

        let scan = scan_and_persist(&self.registry, ctx.chat, ctx.persistence);
        let status = derive_status(&self.registry, ctx.chat);
        let height = render_status(ctx.sink, &status);
        UpdateReport {
            scan,
            status,
            height,
        }
    }
}

impl GenerationInterceptor for StatusLineExtension {
    fn intercept(&self, chat: &[ChatMessage], outbound: &mut Vec<ChatMessage>) -> InterceptAction {
        prepare_outbound(&self.registry, &self.settings, chat, outbound)
    }
}
