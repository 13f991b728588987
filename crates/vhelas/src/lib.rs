//! Inline state tags and a status line for chat-based text adventures.
//!
//! A game backend embeds machine-readable state in the messages it
//! generates, as HTML-comment markers the reader never sees:
//!
//! ```text
//! The door creaks open.<!--STATUS:["Cellar","Night","HP 12"]--><!--SAVE:"eyJ..."-->
//! ```
//!
//! `vhelas` pulls those markers out of every message and swipe, validates
//! each payload against its JSON Schema, moves the values into the message's
//! per-swipe variable store under `vhelas_*` keys, and strips the markers
//! from the displayed text. The newest valid `STATUS` drives a three-slot
//! status bar, and the newest valid `SAVE` is fed back to the game service
//! ahead of each generation request.
//!
//! # Getting started
//!
//! ```ignore
//! use std::sync::Arc;
//! use vhelas::prelude::*;
//!
//! let extension = Arc::new(StatusLineExtension::new(Settings::load(None))?);
//! let bus = EventBus::standard(extension.clone());
//!
//! let sink = MemorySink::new();
//! let saves = SaveFlag::new();
//! let mut chat = vec![ChatMessage::assistant(r#"Hi<!--STATUS:["Inn","Noon"]-->"#)];
//!
//! bus.dispatch(
//!     ChatEvent::MessageReceived,
//!     &mut HostContext::new(&mut chat, &saves, &sink),
//! );
//! assert_eq!(chat[0].mes, "Hi");
//! assert_eq!(sink.snapshot().line.to_string(), "Inn | Noon");
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`chat`] | [`ChatMessage`](chat::ChatMessage), swipes and per-swipe variable stores |
//! | [`tags`] | Marker grammar, payload schemas, single-message extraction |
//! | [`scan`] | Whole-conversation rescan and the [`Persistence`](scan::Persistence) seam |
//! | [`status`] | Status line reducer, slot layout, [`StatusSink`](status::StatusSink) |
//! | [`events`] | Host lifecycle events and the [`EventBus`](events::EventBus) |
//! | [`extension`] | The update cycle tying scan, status and persistence together |
//! | [`intercept`] | Save injection and marker stripping before generation |
//! | [`config`] | [`Settings`](config::Settings) loaded from the host settings file |
//! | [`diagnostics`] | `tracing` layer buffering rejected-marker warnings |
//! | [`host`] | Chat files on disk and a coalescing save flag |

pub mod chat;
pub mod config;
pub mod diagnostics;
pub mod events;
pub mod extension;
pub mod host;
pub mod intercept;
pub mod prelude;
pub mod scan;
pub mod status;
pub mod tags;

pub use chat::{ChatMessage, DERIVED_PREFIX, VariableStore};
pub use config::Settings;
pub use extension::{HostContext, StatusLineExtension, UpdateReport};
pub use tags::{TagError, TagName, TagPayload, TagRegistry};
