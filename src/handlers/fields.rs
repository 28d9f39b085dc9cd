//! Record payload decoding.
//!
//! New records are assembled field by field through [`RECORD_FIELDS`]; each
//! entry names the payload key, the kind of value it expects and the setter
//! that stores it. Keys not listed are ignored.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use thiserror::Error;

use crate::database::models::{Record, RecordUpdate, Timestamp};
use crate::database::tags;

#[derive(Debug, Error, PartialEq)]
pub enum FieldError {
    #[error("request body must be a JSON object")]
    NotAnObject,

    #[error("'{0}' is required")]
    Missing(&'static str),

    #[error("'{field}' {message}")]
    Invalid { field: &'static str, message: String },
}

impl FieldError {
    /// Payload key the error refers to
    pub fn field(&self) -> &str {
        match self {
            FieldError::NotAnObject => "body",
            FieldError::Missing(field) => field,
            FieldError::Invalid { field, .. } => field,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    OptionalText,
    Number,
    Entity,
    EntityList,
    Tags,
}

impl FieldKind {
    fn expected(self) -> &'static str {
        match self {
            FieldKind::Text => "a string",
            FieldKind::OptionalText => "a string or null",
            FieldKind::Number => "a number or null",
            FieldKind::Entity => "an object or null",
            FieldKind::EntityList => "a list of objects",
            FieldKind::Tags => "a list of tags",
        }
    }
}

type Setter = fn(&mut Record, &Value) -> Result<(), String>;

pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    set: Setter,
}

fn text(value: &Value) -> Result<String, String> {
    match value {
        Value::Null => Ok(String::new()),
        Value::String(s) => Ok(s.clone()),
        other => Err(format!("got {}", other)),
    }
}

fn optional_text(value: &Value) -> Result<Option<String>, String> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        other => Err(format!("got {}", other)),
    }
}

fn number(value: &Value) -> Result<Option<f64>, String> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n.as_f64().map(Some).ok_or_else(|| format!("got {}", n)),
        other => Err(format!("got {}", other)),
    }
}

fn entity<E: DeserializeOwned>(value: &Value) -> Result<Option<E>, String> {
    match value {
        Value::Null => Ok(None),
        Value::Object(_) => serde_json::from_value(value.clone()).map(Some).map_err(|e| e.to_string()),
        other => Err(format!("got {}", other)),
    }
}

fn entity_list<E: DeserializeOwned>(value: &Value) -> Result<Vec<E>, String> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(_) => serde_json::from_value(value.clone()).map_err(|e| e.to_string()),
        other => Err(format!("got {}", other)),
    }
}

fn tag_set(value: &Value) -> Result<BTreeSet<String>, String> {
    match value {
        Value::Null => Ok(BTreeSet::new()),
        Value::String(s) => Ok(tags::parse_tag_input(s)),
        Value::Array(items) => {
            let names = items
                .iter()
                .map(|item| item.as_str().ok_or_else(|| format!("got {}", item)))
                .collect::<Result<Vec<_>, _>>()?;
            tags::normalize(names)
        }
        other => Err(format!("got {}", other)),
    }
}

#[rustfmt::skip]
pub const RECORD_FIELDS: &[FieldSpec] = &[
    FieldSpec { name: "reason", kind: FieldKind::Text, set: |r, v| { r.reason = text(v)?; Ok(()) } },
    FieldSpec { name: "outcome", kind: FieldKind::Text, set: |r, v| { r.outcome = text(v)?; Ok(()) } },
    FieldSpec { name: "duration", kind: FieldKind::Number, set: |r, v| { r.duration = number(v)?; Ok(()) } },
    FieldSpec { name: "executable", kind: FieldKind::Entity, set: |r, v| { r.executable = entity(v)?; Ok(()) } },
    FieldSpec { name: "repository", kind: FieldKind::Entity, set: |r, v| { r.repository = entity(v)?; Ok(()) } },
    FieldSpec { name: "main_file", kind: FieldKind::OptionalText, set: |r, v| { r.main_file = optional_text(v)?; Ok(()) } },
    FieldSpec { name: "version", kind: FieldKind::OptionalText, set: |r, v| { r.version = optional_text(v)?; Ok(()) } },
    FieldSpec { name: "diff", kind: FieldKind::Text, set: |r, v| { r.diff = text(v)?; Ok(()) } },
    FieldSpec { name: "dependencies", kind: FieldKind::EntityList, set: |r, v| { r.dependencies = entity_list(v)?; Ok(()) } },
    FieldSpec { name: "parameters", kind: FieldKind::Entity, set: |r, v| { r.parameters = entity(v)?; Ok(()) } },
    FieldSpec { name: "launch_mode", kind: FieldKind::Entity, set: |r, v| { r.launch_mode = entity(v)?; Ok(()) } },
    FieldSpec { name: "datastore", kind: FieldKind::Entity, set: |r, v| { r.datastore = entity(v)?; Ok(()) } },
    FieldSpec { name: "input_datastore", kind: FieldKind::Entity, set: |r, v| { r.input_datastore = entity(v)?; Ok(()) } },
    FieldSpec { name: "output_data", kind: FieldKind::EntityList, set: |r, v| { r.output_data = entity_list(v)?; Ok(()) } },
    FieldSpec { name: "input_data", kind: FieldKind::EntityList, set: |r, v| { r.input_data = entity_list(v)?; Ok(()) } },
    FieldSpec { name: "platforms", kind: FieldKind::EntityList, set: |r, v| { r.platforms = entity_list(v)?; Ok(()) } },
    FieldSpec { name: "tags", kind: FieldKind::Tags, set: |r, v| { r.tags = tag_set(v)?; Ok(()) } },
    FieldSpec { name: "user", kind: FieldKind::Text, set: |r, v| { r.user = text(v)?; Ok(()) } },
    FieldSpec { name: "script_arguments", kind: FieldKind::Text, set: |r, v| { r.script_arguments = text(v)?; Ok(()) } },
    FieldSpec { name: "stdout_stderr", kind: FieldKind::Text, set: |r, v| { r.stdout_stderr = text(v)?; Ok(()) } },
    FieldSpec { name: "repeats", kind: FieldKind::OptionalText, set: |r, v| { r.repeats = optional_text(v)?; Ok(()) } },
];

fn as_object(payload: &Value) -> Result<&Map<String, Value>, FieldError> {
    payload.as_object().ok_or(FieldError::NotAnObject)
}

fn invalid(field: &'static str, kind: FieldKind, detail: String) -> FieldError {
    FieldError::Invalid {
        field,
        message: format!("must be {} ({})", kind.expected(), detail),
    }
}

/// Assemble a new record from a PUT payload addressed to `url_label`
pub fn build_record(payload: &Value, url_label: &str) -> Result<Record, FieldError> {
    let fields = as_object(payload)?;

    let label = match fields.get("label") {
        Some(Value::String(label)) => label,
        Some(_) => return Err(invalid("label", FieldKind::Text, "not a string".into())),
        None => return Err(FieldError::Missing("label")),
    };
    if label != url_label {
        return Err(FieldError::Invalid {
            field: "label",
            message: format!("'{}' does not match the URL label '{}'", label, url_label),
        });
    }

    let timestamp = match fields.get("timestamp") {
        Some(Value::String(raw)) => Timestamp::parse(raw).ok_or_else(|| FieldError::Invalid {
            field: "timestamp",
            message: format!("'{}' is not a valid timestamp", raw),
        })?,
        Some(_) => return Err(invalid("timestamp", FieldKind::Text, "not a string".into())),
        None => return Err(FieldError::Missing("timestamp")),
    };

    let mut record = Record::new(label.clone(), timestamp);
    for spec in RECORD_FIELDS {
        if let Some(value) = fields.get(spec.name) {
            (spec.set)(&mut record, value).map_err(|detail| invalid(spec.name, spec.kind, detail))?;
        }
    }
    Ok(record)
}

/// Changes a PUT may make to an existing record; every other key is ignored
pub fn build_update(payload: &Value) -> Result<RecordUpdate, FieldError> {
    let fields = as_object(payload)?;
    let mut update = RecordUpdate::default();
    if let Some(value) = fields.get("reason") {
        update.reason = Some(text(value).map_err(|d| invalid("reason", FieldKind::Text, d))?);
    }
    if let Some(value) = fields.get("outcome") {
        update.outcome = Some(text(value).map_err(|d| invalid("outcome", FieldKind::Text, d))?);
    }
    if let Some(value) = fields.get("tags") {
        update.tags = Some(tag_set(value).map_err(|d| invalid("tags", FieldKind::Tags, d))?);
    }
    Ok(update)
}
