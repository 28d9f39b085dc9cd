use serde::Serialize;
use std::collections::BTreeSet;

use super::media::Version;
use crate::database::models::{
    DataKey, Datastore, Dependency, Executable, LaunchMode, Mapping, ParameterSet, PlatformInformation,
    ProjectSummary, Repository, StoredRecord, Timestamp,
};

/// Wire shape of one data key. `creation` is absent from v3 documents.
#[derive(Debug, Serialize)]
pub struct DataKeyView<'a> {
    pub path: &'a str,
    pub digest: &'a str,
    pub metadata: &'a Mapping,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation: Option<Option<Timestamp>>,
}

impl<'a> DataKeyView<'a> {
    fn new(key: &'a DataKey, version: Version) -> Self {
        Self {
            path: &key.path,
            digest: &key.digest,
            metadata: &key.metadata,
            creation: match version {
                Version::V3 => None,
                Version::V4 => Some(key.creation),
            },
        }
    }
}

/// Record document (`record-v3+json`, `record-v4+json`, `application/json`)
#[derive(Debug, Serialize)]
pub struct RecordView<'a> {
    pub label: &'a str,
    pub timestamp: Timestamp,
    pub reason: &'a str,
    pub outcome: &'a str,
    pub duration: Option<f64>,
    pub executable: Option<&'a Executable>,
    pub repository: Option<&'a Repository>,
    pub main_file: Option<&'a str>,
    pub version: Option<&'a str>,
    pub diff: &'a str,
    pub dependencies: &'a [Dependency],
    pub parameters: Option<&'a ParameterSet>,
    pub launch_mode: Option<&'a LaunchMode>,
    pub datastore: Option<&'a Datastore>,
    pub input_datastore: Option<&'a Datastore>,
    pub output_data: Vec<DataKeyView<'a>>,
    pub input_data: Vec<DataKeyView<'a>>,
    pub platforms: &'a [PlatformInformation],
    pub tags: &'a BTreeSet<String>,
    pub user: &'a str,
    pub project_id: &'a str,
    pub script_arguments: &'a str,
    pub stdout_stderr: &'a str,
    pub repeats: Option<&'a str>,
}

impl<'a> RecordView<'a> {
    pub fn new(stored: &'a StoredRecord, version: Version) -> Self {
        let record = &stored.record;
        Self {
            label: &record.label,
            timestamp: record.timestamp,
            reason: &record.reason,
            outcome: &record.outcome,
            duration: record.duration,
            executable: record.executable.as_ref(),
            repository: record.repository.as_ref(),
            main_file: record.main_file.as_deref(),
            version: record.version.as_deref(),
            diff: &record.diff,
            dependencies: &record.dependencies,
            parameters: record.parameters.as_ref(),
            launch_mode: record.launch_mode.as_ref(),
            datastore: record.datastore.as_ref(),
            input_datastore: record.input_datastore.as_ref(),
            output_data: record.output_data.iter().map(|k| DataKeyView::new(k, version)).collect(),
            input_data: record.input_data.iter().map(|k| DataKeyView::new(k, version)).collect(),
            platforms: &record.platforms,
            tags: &record.tags,
            user: &record.user,
            project_id: &stored.project_id,
            script_arguments: &record.script_arguments,
            stdout_stderr: &record.stdout_stderr,
            repeats: record.repeats.as_deref(),
        }
    }
}

/// Project document. `access` is only present for identified callers.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectView {
    pub id: String,
    pub name: String,
    pub description: String,
    pub records: Vec<String>,
    pub tags: Option<String>,
    pub user: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access: Option<Vec<String>>,
}

/// One entry of the project list document
#[derive(Debug, Clone, Serialize)]
pub struct ProjectListItem {
    pub id: String,
    pub name: String,
    pub description: String,
    pub uri: String,
    pub last_updated: Option<Timestamp>,
}

impl ProjectListItem {
    pub fn new(summary: &ProjectSummary, uri: String) -> Self {
        Self {
            id: summary.project.id.clone(),
            name: summary.project.display_name().to_string(),
            description: summary.project.description.clone(),
            uri,
            last_updated: summary.last_updated,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PermissionListView {
    pub id: String,
    pub name: String,
    pub access: Vec<String>,
}

/// Most recently updated first; projects without records last, ties by id
pub fn sort_by_last_updated(summaries: &mut [ProjectSummary]) {
    summaries.sort_by(|a, b| {
        b.last_updated
            .cmp(&a.last_updated)
            .then_with(|| a.project.id.cmp(&b.project.id))
    });
}

/// `{base}{project}/`
pub fn project_uri(base: &str, project_id: &str) -> String {
    format!("{}{}/", base, project_id)
}

/// `{base}{project}/{label}/`
pub fn record_uri(base: &str, project_id: &str, label: &str) -> String {
    format!("{}{}/{}/", base, project_id, label)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::{Project, Record, SubEntityRefs};
    use serde_json::{json, Value};

    fn stored() -> StoredRecord {
        let mut record = Record::new("haggling", Timestamp::parse("2011-10-13 17:25:03").unwrap());
        record.output_data.push(DataKey {
            path: "example2.dat".into(),
            digest: "abc".into(),
            metadata: Mapping::new(),
            creation: None,
        });
        record.tags = ["foobar".to_string()].into_iter().collect();
        StoredRecord {
            project_id: "TestProject".into(),
            record,
            refs: SubEntityRefs::default(),
        }
    }

    #[test]
    fn v4_record_carries_every_field() {
        let stored = stored();
        let value = serde_json::to_value(RecordView::new(&stored, Version::V4)).unwrap();
        let keys: BTreeSet<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
        let expected: BTreeSet<&str> = [
            "label", "timestamp", "reason", "outcome", "duration", "executable", "repository", "main_file",
            "version", "diff", "dependencies", "parameters", "launch_mode", "datastore", "input_datastore",
            "output_data", "input_data", "platforms", "tags", "user", "project_id", "script_arguments",
            "stdout_stderr", "repeats",
        ]
        .into_iter()
        .collect();
        assert_eq!(keys, expected);
        assert_eq!(value["tags"], json!(["foobar"]));
        assert_eq!(value["output_data"][0]["creation"], Value::Null);
        assert!(value["output_data"][0]["metadata"].is_object());
    }

    #[test]
    fn v3_record_omits_creation() {
        let stored = stored();
        let value = serde_json::to_value(RecordView::new(&stored, Version::V3)).unwrap();
        assert!(value["output_data"][0].get("creation").is_none());
        assert_eq!(value["output_data"][0]["path"], json!("example2.dat"));
    }

    #[test]
    fn project_access_hidden_when_absent() {
        let view = ProjectView {
            id: "P".into(),
            name: "P".into(),
            description: String::new(),
            records: vec![],
            tags: None,
            user: "anonymous".into(),
            access: None,
        };
        let value = serde_json::to_value(view).unwrap();
        assert!(value.get("access").is_none());
        assert_eq!(value["tags"], Value::Null);
    }

    #[test]
    fn list_sorts_newest_first_with_empty_projects_last() {
        let summary = |id: &str, ts: Option<&str>| ProjectSummary {
            project: Project::new(id),
            last_updated: ts.and_then(Timestamp::parse),
            access: vec![],
        };
        let mut list = vec![
            summary("empty", None),
            summary("old", Some("2010-01-01 00:00:00")),
            summary("new", Some("2012-01-01 00:00:00")),
        ];
        sort_by_last_updated(&mut list);
        let ids: Vec<&str> = list.iter().map(|s| s.project.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old", "empty"]);
    }

    #[test]
    fn uris_end_with_slash() {
        assert_eq!(project_uri("http://testserver/", "P"), "http://testserver/P/");
        assert_eq!(record_uri("http://testserver/", "P", "r1"), "http://testserver/P/r1/");
    }
}
