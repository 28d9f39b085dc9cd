use chrono::{NaiveDateTime, Timelike};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

use super::literal;

/// Identity whose permission row marks a project as public
pub const ANONYMOUS: &str = "anonymous";

/// Structured key/value parameters. Keys are kept sorted so the serialized
/// form is canonical.
pub type Mapping = serde_json::Map<String, Value>;

/// Record and data-key timestamp, serialized as `YYYY-MM-DD HH:MM:SS`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(pub NaiveDateTime);

impl Timestamp {
    const FORMATS: &'static [&'static str] = &[
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
    ];

    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        Self::FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
            .map(Timestamp)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.nanosecond() == 0 {
            write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S"))
        } else {
            write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S%.6f"))
        }
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Timestamp::parse(&raw).ok_or_else(|| de::Error::custom(format!("invalid timestamp '{}'", raw)))
    }
}

/// Accepts a JSON object, null (empty mapping), or a stored literal string
/// that must decode to a mapping.
fn mapping_or_literal<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Mapping, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Mapping::new()),
        Value::String(text) => literal::parse_mapping(&text).map_err(de::Error::custom),
        other => Err(de::Error::custom(format!("expected a mapping, found {}", other))),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl Project {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            description: String::new(),
        }
    }

    /// Display name, falling back to the id
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// A project together with what the list and gate need to know about it
#[derive(Debug, Clone)]
pub struct ProjectSummary {
    pub project: Project,
    pub last_updated: Option<Timestamp>,
    pub access: Vec<String>,
}

impl ProjectSummary {
    pub fn is_public(&self) -> bool {
        self.access.iter().any(|u| u == ANONYMOUS)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub username: String,
    pub password_hash: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubEntityKind {
    Executable,
    Repository,
    ParameterSet,
    LaunchMode,
    Datastore,
    Dependency,
    Platform,
    DataKey,
}

impl SubEntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubEntityKind::Executable => "executable",
            SubEntityKind::Repository => "repository",
            SubEntityKind::ParameterSet => "parameter_set",
            SubEntityKind::LaunchMode => "launch_mode",
            SubEntityKind::Datastore => "datastore",
            SubEntityKind::Dependency => "dependency",
            SubEntityKind::Platform => "platform",
            SubEntityKind::DataKey => "data_key",
        }
    }
}

/// Shared nested object, deduplicated by exact attribute match
pub trait SubEntity: Serialize {
    const KIND: SubEntityKind;

    /// SHA-256 over the kind and the canonical JSON of every attribute.
    /// Two values share a row exactly when their fingerprints are equal.
    fn fingerprint(&self) -> Result<String, serde_json::Error> {
        let canonical = serde_json::to_vec(self)?;
        let mut hasher = Sha256::new();
        hasher.update(Self::KIND.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(&canonical);
        Ok(hex::encode(hasher.finalize()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Executable {
    pub path: String,
    pub version: Option<String>,
    pub name: String,
    pub options: String,
}

impl SubEntity for Executable {
    const KIND: SubEntityKind = SubEntityKind::Executable;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Repository {
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
    pub upstream: Option<String>,
}

impl SubEntity for Repository {
    const KIND: SubEntityKind = SubEntityKind::Repository;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ParameterSet {
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
}

impl SubEntity for ParameterSet {
    const KIND: SubEntityKind = SubEntityKind::ParameterSet;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LaunchMode {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(deserialize_with = "mapping_or_literal")]
    pub parameters: Mapping,
}

impl SubEntity for LaunchMode {
    const KIND: SubEntityKind = SubEntityKind::LaunchMode;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Datastore {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(deserialize_with = "mapping_or_literal")]
    pub parameters: Mapping,
}

impl SubEntity for Datastore {
    const KIND: SubEntityKind = SubEntityKind::Datastore;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Dependency {
    pub path: String,
    pub version: Option<String>,
    pub name: String,
    pub module: String,
    pub diff: String,
    pub source: Option<String>,
}

impl SubEntity for Dependency {
    const KIND: SubEntityKind = SubEntityKind::Dependency;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PlatformInformation {
    pub system_name: String,
    pub ip_addr: String,
    pub architecture_bits: String,
    pub machine: String,
    pub architecture_linkage: String,
    pub version: String,
    pub release: String,
    pub network_name: String,
    pub processor: String,
}

impl SubEntity for PlatformInformation {
    const KIND: SubEntityKind = SubEntityKind::Platform;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DataKey {
    pub path: String,
    pub digest: String,
    #[serde(deserialize_with = "mapping_or_literal")]
    pub metadata: Mapping,
    pub creation: Option<Timestamp>,
}

impl SubEntity for DataKey {
    const KIND: SubEntityKind = SubEntityKind::DataKey;
}

/// One computational experiment, identified within its project by `label`
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub label: String,
    pub timestamp: Timestamp,
    pub reason: String,
    pub outcome: String,
    pub duration: Option<f64>,
    pub executable: Option<Executable>,
    pub repository: Option<Repository>,
    pub main_file: Option<String>,
    pub version: Option<String>,
    pub diff: String,
    pub dependencies: Vec<Dependency>,
    pub parameters: Option<ParameterSet>,
    pub launch_mode: Option<LaunchMode>,
    pub datastore: Option<Datastore>,
    pub input_datastore: Option<Datastore>,
    pub output_data: Vec<DataKey>,
    pub input_data: Vec<DataKey>,
    pub platforms: Vec<PlatformInformation>,
    pub tags: BTreeSet<String>,
    pub user: String,
    pub script_arguments: String,
    pub stdout_stderr: String,
    pub repeats: Option<String>,
}

impl Record {
    pub fn new(label: impl Into<String>, timestamp: Timestamp) -> Self {
        Self {
            label: label.into(),
            timestamp,
            reason: String::new(),
            outcome: String::new(),
            duration: None,
            executable: None,
            repository: None,
            main_file: None,
            version: None,
            diff: String::new(),
            dependencies: Vec::new(),
            parameters: None,
            launch_mode: None,
            datastore: None,
            input_datastore: None,
            output_data: Vec::new(),
            input_data: Vec::new(),
            platforms: Vec::new(),
            tags: BTreeSet::new(),
            user: String::new(),
            script_arguments: String::new(),
            stdout_stderr: String::new(),
            repeats: None,
        }
    }
}

/// Row ids of the shared sub-entities a stored record points at
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubEntityRefs {
    pub executable: Option<Uuid>,
    pub repository: Option<Uuid>,
    pub parameters: Option<Uuid>,
    pub launch_mode: Option<Uuid>,
    pub datastore: Option<Uuid>,
    pub input_datastore: Option<Uuid>,
    pub dependencies: Vec<Uuid>,
    pub platforms: Vec<Uuid>,
    pub output_data: Vec<Uuid>,
    pub input_data: Vec<Uuid>,
}

#[derive(Debug, Clone)]
pub struct StoredRecord {
    pub project_id: String,
    pub record: Record,
    pub refs: SubEntityRefs,
}

/// The only fields a PUT on an existing record may change
#[derive(Debug, Clone, Default)]
pub struct RecordUpdate {
    pub reason: Option<String>,
    pub outcome: Option<String>,
    pub tags: Option<BTreeSet<String>>,
}
