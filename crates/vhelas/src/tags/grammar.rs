//! Tag names, payload schemas, and typed payloads.
//!
//! Every recognized tag has a JSON Schema describing its payload. The
//! [`TagRegistry`] compiles those schemas once; a [`TagPayload`] can only be
//! obtained through [`TagRegistry::validate`] or [`TagRegistry::parse`], so a
//! payload that exists is a payload that passed its schema.

use std::fmt;

use jsonschema::Validator;
use serde_json::{Number, Value, json};
use thiserror::Error;

use crate::chat::DERIVED_PREFIX;

// ── Tag names ──────────────────────────────────────────────────────

/// A recognized marker name. Names are case-sensitive on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagName {
    Status,
    Save,
    Input,
    Game,
    GameStart,
}

impl TagName {
    /// All tags, in the order the extractor processes them.
    pub const ALL: [TagName; 5] = [
        TagName::Status,
        TagName::Save,
        TagName::Input,
        TagName::Game,
        TagName::GameStart,
    ];

    /// Wire name as it appears between `<!--` and `:`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Status => "STATUS",
            Self::Save => "SAVE",
            Self::Input => "INPUT",
            Self::Game => "GAME",
            Self::GameStart => "GAMESTART",
        }
    }

    /// Look up a tag by its exact wire name.
    pub fn from_wire(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }

    /// Variable-store key the validated payload is assigned to.
    pub fn variable_key(self) -> String {
        format!("{DERIVED_PREFIX}{}", self.as_str().to_lowercase())
    }

    /// The marker-opening sequence, e.g. `<!--STATUS:`.
    pub fn open_marker(self) -> String {
        format!("<!--{}:", self.as_str())
    }

    fn schema(self) -> Value {
        let scalar = json!({ "type": ["string", "number", "null"] });
        match self {
            Self::Status => json!({
                "type": "array",
                "minItems": 1,
                "maxItems": 3,
                "items": scalar,
            }),
            Self::Save | Self::Game => json!({ "type": "string" }),
            Self::Input => json!({
                "anyOf": [
                    { "type": "string" },
                    { "type": "array", "items": scalar },
                ]
            }),
            Self::GameStart => json!({ "type": "boolean" }),
        }
    }
}

impl fmt::Display for TagName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Payloads ───────────────────────────────────────────────────────

/// A string, number, or null element of an array payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Text(String),
    Number(Number),
    Null,
}

impl Scalar {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self::Text(s.clone())),
            Value::Number(n) => Some(Self::Number(n.clone())),
            Value::Null => Some(Self::Null),
            _ => None,
        }
    }

    fn to_value(&self) -> Value {
        match self {
            Self::Text(s) => Value::String(s.clone()),
            Self::Number(n) => Value::Number(n.clone()),
            Self::Null => Value::Null,
        }
    }

    /// Display text for a status slot. Null renders as an empty string and
    /// integral floats render without a fractional part.
    pub fn to_display(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Null => String::new(),
            Self::Number(n) => format_number(n),
        }
    }
}

fn format_number(n: &Number) -> String {
    if n.is_i64() || n.is_u64() {
        return n.to_string();
    }
    let Some(f) = n.as_f64() else {
        return n.to_string();
    };
    if f == 0.0 {
        return "0".to_string();
    }
    // Outside [1e-6, 1e21) the host switches to exponent notation.
    let magnitude = f.abs();
    if !(1e-6..1e21).contains(&magnitude) {
        let sci = format!("{f:e}");
        return match sci.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{mantissa}e+{exp}"),
            _ => sci,
        };
    }
    if f.fract() == 0.0 {
        format!("{f:.0}")
    } else {
        f.to_string()
    }
}

fn scalars(value: &Value) -> Option<Vec<Scalar>> {
    value.as_array()?.iter().map(Scalar::from_value).collect()
}

/// Payload of an `INPUT` marker.
#[derive(Debug, Clone, PartialEq)]
pub enum InputPayload {
    Text(String),
    Fields(Vec<Scalar>),
}

/// A validated tag payload, one variant per recognized tag.
#[derive(Debug, Clone, PartialEq)]
pub enum TagPayload {
    /// One to three status cells.
    Status(Vec<Scalar>),
    Save(String),
    Input(InputPayload),
    Game(String),
    GameStart(bool),
}

impl TagPayload {
    pub fn tag(&self) -> TagName {
        match self {
            Self::Status(_) => TagName::Status,
            Self::Save(_) => TagName::Save,
            Self::Input(_) => TagName::Input,
            Self::Game(_) => TagName::Game,
            Self::GameStart(_) => TagName::GameStart,
        }
    }

    /// JSON value stored in the variable store.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Status(cells) | Self::Input(InputPayload::Fields(cells)) => {
                Value::Array(cells.iter().map(Scalar::to_value).collect())
            }
            Self::Save(s) | Self::Game(s) | Self::Input(InputPayload::Text(s)) => {
                Value::String(s.clone())
            }
            Self::GameStart(b) => Value::Bool(*b),
        }
    }

    // Only called after the schema accepted `value`.
    fn from_checked(tag: TagName, value: &Value) -> Option<Self> {
        match tag {
            TagName::Status => scalars(value)
                .filter(|cells| (1..=3).contains(&cells.len()))
                .map(Self::Status),
            TagName::Save => value.as_str().map(|s| Self::Save(s.to_string())),
            TagName::Game => value.as_str().map(|s| Self::Game(s.to_string())),
            TagName::Input => match value {
                Value::String(s) => Some(Self::Input(InputPayload::Text(s.clone()))),
                _ => scalars(value).map(|cells| Self::Input(InputPayload::Fields(cells))),
            },
            TagName::GameStart => value.as_bool().map(Self::GameStart),
        }
    }
}

// ── Errors ─────────────────────────────────────────────────────────

/// Why a marker payload was rejected.
#[derive(Debug, Error)]
pub enum TagError {
    #[error("invalid JSON in {tag} marker: {source}")]
    InvalidJson {
        tag: TagName,
        #[source]
        source: serde_json::Error,
    },
    #[error("validation failed for {tag} marker: {}", .violations.join("; "))]
    Validation {
        tag: TagName,
        violations: Vec<String>,
    },
    #[error("{tag} payload has an unexpected shape")]
    Shape { tag: TagName },
    #[error("schema for {tag} failed to compile: {reason}")]
    Schema { tag: TagName, reason: String },
}

impl TagError {
    pub fn tag(&self) -> TagName {
        match self {
            Self::InvalidJson { tag, .. }
            | Self::Validation { tag, .. }
            | Self::Shape { tag }
            | Self::Schema { tag, .. } => *tag,
        }
    }
}

// ── Registry ───────────────────────────────────────────────────────

/// Fixed registry of recognized tags with their compiled payload schemas.
pub struct TagRegistry {
    entries: Vec<(TagName, Validator)>,
}

impl TagRegistry {
    /// Compile the schemas of every recognized tag.
    pub fn standard() -> Result<Self, TagError> {
        let entries = TagName::ALL
            .into_iter()
            .map(|tag| {
                jsonschema::validator_for(&tag.schema())
                    .map(|v| (tag, v))
                    .map_err(|e| TagError::Schema {
                        tag,
                        reason: e.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { entries })
    }

    /// Registered tags in processing order.
    pub fn tags(&self) -> impl Iterator<Item = TagName> + '_ {
        self.entries.iter().map(|(tag, _)| *tag)
    }

    /// Validate an already-parsed JSON value as the payload of `tag`.
    pub fn validate(&self, tag: TagName, value: &Value) -> Result<TagPayload, TagError> {
        let validator = self
            .entries
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, v)| v)
            .ok_or(TagError::Shape { tag })?;

        let violations: Vec<String> = validator
            .iter_errors(value)
            .map(|e| format!("{}: {e}", display_path(&e.instance_path().to_string())))
            .collect();
        if !violations.is_empty() {
            return Err(TagError::Validation { tag, violations });
        }

        TagPayload::from_checked(tag, value).ok_or(TagError::Shape { tag })
    }

    /// Parse the raw text between `<!--NAME:` and `-->`, then validate it.
    pub fn parse(&self, tag: TagName, raw: &str) -> Result<TagPayload, TagError> {
        let value: Value =
            serde_json::from_str(raw).map_err(|source| TagError::InvalidJson { tag, source })?;
        self.validate(tag, &value)
    }
}

fn display_path(path: &str) -> &str {
    if path.is_empty() { "/" } else { path }
}

impl fmt::Debug for TagRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TagRegistry")
            .field("tags", &self.tags().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> TagRegistry {
        TagRegistry::standard().unwrap()
    }

    #[test]
    fn wire_names_are_case_sensitive() {
        assert_eq!(TagName::from_wire("STATUS"), Some(TagName::Status));
        assert_eq!(TagName::from_wire("GAMESTART"), Some(TagName::GameStart));
        assert_eq!(TagName::from_wire("status"), None);
        assert_eq!(TagName::from_wire("HEALTH"), None);
    }

    #[test]
    fn variable_keys_use_derived_prefix() {
        assert_eq!(TagName::Status.variable_key(), "vhelas_status");
        assert_eq!(TagName::Save.variable_key(), "vhelas_save");
        assert_eq!(TagName::Input.variable_key(), "vhelas_input");
        assert_eq!(TagName::Game.variable_key(), "vhelas_game");
        assert_eq!(TagName::GameStart.variable_key(), "vhelas_gamestart");
    }

    #[test]
    fn status_accepts_one_to_three_scalars() {
        let reg = registry();
        assert!(reg.parse(TagName::Status, r#"["a"]"#).is_ok());
        assert!(reg.parse(TagName::Status, r#"["a", 2, null]"#).is_ok());
        assert!(matches!(
            reg.parse(TagName::Status, "[]"),
            Err(TagError::Validation { .. })
        ));
        assert!(matches!(
            reg.parse(TagName::Status, "[1,2,3,4]"),
            Err(TagError::Validation { .. })
        ));
        assert!(matches!(
            reg.parse(TagName::Status, r#"["a", true]"#),
            Err(TagError::Validation { .. })
        ));
        assert!(matches!(
            reg.parse(TagName::Status, r#"{"a": 1}"#),
            Err(TagError::Validation { .. })
        ));
    }

    #[test]
    fn invalid_json_is_reported_as_such() {
        let err = registry().parse(TagName::Save, "not json").unwrap_err();
        assert!(matches!(err, TagError::InvalidJson { tag: TagName::Save, .. }));
        assert!(err.to_string().contains("SAVE"));
    }

    #[test]
    fn string_tags_reject_non_strings() {
        let reg = registry();
        assert_eq!(
            reg.parse(TagName::Save, r#""slot-1""#).unwrap(),
            TagPayload::Save("slot-1".into())
        );
        assert!(reg.parse(TagName::Save, "42").is_err());
        assert_eq!(
            reg.parse(TagName::Game, r#""zork""#).unwrap(),
            TagPayload::Game("zork".into())
        );
        assert!(reg.parse(TagName::Game, "null").is_err());
    }

    #[test]
    fn input_accepts_string_or_scalar_array() {
        let reg = registry();
        assert_eq!(
            reg.parse(TagName::Input, r#""look""#).unwrap(),
            TagPayload::Input(InputPayload::Text("look".into()))
        );
        let fields = reg.parse(TagName::Input, r#"["go", 3, null]"#).unwrap();
        assert!(matches!(fields, TagPayload::Input(InputPayload::Fields(ref c)) if c.len() == 3));
        // Arrays of any length are fine for INPUT, including empty ones.
        assert!(reg.parse(TagName::Input, "[]").is_ok());
        assert!(reg.parse(TagName::Input, r#"[{"x": 1}]"#).is_err());
        assert!(reg.parse(TagName::Input, "true").is_err());
    }

    #[test]
    fn gamestart_requires_boolean() {
        let reg = registry();
        assert_eq!(
            reg.parse(TagName::GameStart, "true").unwrap(),
            TagPayload::GameStart(true)
        );
        assert!(reg.parse(TagName::GameStart, r#""true""#).is_err());
    }

    #[test]
    fn payload_value_round_trips_through_validate() {
        let reg = registry();
        let payload = reg.parse(TagName::Status, r#"["HP 3", 1.5, null]"#).unwrap();
        let stored = payload.to_value();
        assert_eq!(stored, json!(["HP 3", 1.5, null]));
        assert_eq!(reg.validate(TagName::Status, &stored).unwrap(), payload);
    }

    #[test]
    fn scalar_display_matches_host_conversion() {
        assert_eq!(Scalar::Null.to_display(), "");
        assert_eq!(Scalar::Text("x".into()).to_display(), "x");
        assert_eq!(Scalar::Number(7.into()).to_display(), "7");
        let float = Number::from_f64(2.0).unwrap();
        assert_eq!(Scalar::Number(float).to_display(), "2");
        let frac = Number::from_f64(0.25).unwrap();
        assert_eq!(Scalar::Number(frac).to_display(), "0.25");
    }

    #[test]
    fn scalar_display_edge_numbers() {
        let show = |f: f64| Scalar::Number(Number::from_f64(f).unwrap()).to_display();
        assert_eq!(show(-0.0), "0");
        assert_eq!(show(1e21), "1e+21");
        assert_eq!(show(2.5e25), "2.5e+25");
        assert_eq!(show(1e-7), "1e-7");
        assert_eq!(show(-1.5e-7), "-1.5e-7");
        assert_eq!(show(1e20), "100000000000000000000");
        assert_eq!(show(0.000001), "0.000001");
        assert_eq!(show(-3.0), "-3");
    }
}
