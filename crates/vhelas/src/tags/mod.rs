//! Inline tag markers: grammar, validation, and extraction.
//!
//! | Item | Purpose |
//! |------|---------|
//! | [`TagName`] | The fixed set of recognized marker names |
//! | [`TagRegistry`] | Compiled payload schemas, the only way to build a [`TagPayload`] |
//! | [`extract_tags`] | Pull validated payloads out of one message text |
//! | [`strip_markers`] | Remove recognized markers without validating them |

pub mod extract;
pub mod grammar;

pub use extract::{Extraction, MARKER_CLOSE, MARKER_OPEN, extract_tags, strip_markers};
pub use grammar::{InputPayload, Scalar, TagError, TagName, TagPayload, TagRegistry};
