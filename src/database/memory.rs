use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::models::{
    Project, ProjectSummary, Record, RecordUpdate, StoredRecord, SubEntity, SubEntityKind, SubEntityRefs, User,
    ANONYMOUS,
};
use super::store::{grants_write, Created, Store, StoreError};
use super::tags;

/// Process-local store. One lock guards all state, so each method is atomic.
pub struct MemoryStore {
    state: RwLock<State>,
}

#[derive(Default)]
struct State {
    users: BTreeMap<String, User>,
    projects: BTreeMap<String, Project>,
    permissions: BTreeMap<String, BTreeSet<String>>,
    records: Vec<RecordRow>,
    fingerprints: HashMap<(SubEntityKind, String), Uuid>,
    entities: HashMap<Uuid, Value>,
}

struct RecordRow {
    project_id: String,
    record: Record,
    tag_string: String,
    refs: SubEntityRefs,
}

impl RecordRow {
    fn to_stored(&self) -> StoredRecord {
        StoredRecord {
            project_id: self.project_id.clone(),
            record: self.record.clone(),
            refs: self.refs.clone(),
        }
    }
}

impl State {
    fn get_or_create_project(&mut self, id: &str, creator: &str) -> (Project, Created) {
        if let Some(project) = self.projects.get(id) {
            return (project.clone(), Created::Existing);
        }
        let project = Project::new(id);
        self.projects.insert(id.to_string(), project.clone());
        self.permissions
            .entry(id.to_string())
            .or_default()
            .insert(creator.to_string());
        tracing::info!("Created project '{}' for '{}'", id, creator);
        (project, Created::New)
    }

    fn bind<E: SubEntity>(&mut self, entity: &E) -> Result<Uuid, StoreError> {
        let fingerprint = entity.fingerprint()?;
        if let Some(id) = self.fingerprints.get(&(E::KIND, fingerprint.clone())) {
            return Ok(*id);
        }
        let id = Uuid::new_v4();
        self.entities.insert(id, serde_json::to_value(entity)?);
        self.fingerprints.insert((E::KIND, fingerprint), id);
        Ok(id)
    }

    fn bind_all<E: SubEntity>(&mut self, entities: &[E]) -> Result<Vec<Uuid>, StoreError> {
        entities.iter().map(|e| self.bind(e)).collect()
    }

    fn bind_refs(&mut self, record: &Record) -> Result<SubEntityRefs, StoreError> {
        Ok(SubEntityRefs {
            executable: record.executable.as_ref().map(|e| self.bind(e)).transpose()?,
            repository: record.repository.as_ref().map(|e| self.bind(e)).transpose()?,
            parameters: record.parameters.as_ref().map(|e| self.bind(e)).transpose()?,
            launch_mode: record.launch_mode.as_ref().map(|e| self.bind(e)).transpose()?,
            datastore: record.datastore.as_ref().map(|e| self.bind(e)).transpose()?,
            input_datastore: record.input_datastore.as_ref().map(|e| self.bind(e)).transpose()?,
            dependencies: self.bind_all(&record.dependencies)?,
            platforms: self.bind_all(&record.platforms)?,
            output_data: self.bind_all(&record.output_data)?,
            input_data: self.bind_all(&record.input_data)?,
        })
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let mut state = State::default();
        state.users.insert(
            ANONYMOUS.to_string(),
            User { username: ANONYMOUS.to_string(), password_hash: String::new() },
        );
        Self { state: RwLock::new(state) }
    }

    /// Number of distinct shared sub-entities of one kind
    pub async fn subentity_count(&self, kind: SubEntityKind) -> usize {
        let state = self.state.read().await;
        state.fingerprints.keys().filter(|(k, _)| *k == kind).count()
    }

    /// Stored attributes of a shared sub-entity
    pub async fn subentity(&self, id: Uuid) -> Option<Value> {
        self.state.read().await.entities.get(&id).cloned()
    }

    /// Insert a record row without the (project, label) uniqueness check.
    /// Only useful to reproduce integrity faults left behind by older data.
    pub async fn insert_unchecked(&self, project_id: &str, record: Record) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if !state.projects.contains_key(project_id) {
            return Err(StoreError::ProjectNotFound(project_id.to_string()));
        }
        let refs = state.bind_refs(&record)?;
        let tag_string = tags::join_tags(&record.tags);
        state.records.push(RecordRow { project_id: project_id.to_string(), record, tag_string, refs });
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn find_user(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(self.state.read().await.users.get(username).cloned())
    }

    async fn create_user(&self, user: User) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if state.users.contains_key(&user.username) {
            return Err(StoreError::Duplicate(format!("user {}", user.username)));
        }
        state.users.insert(user.username.clone(), user);
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.state.read().await.users.keys().cloned().collect())
    }

    async fn find_project(&self, id: &str) -> Result<Option<Project>, StoreError> {
        Ok(self.state.read().await.projects.get(id).cloned())
    }

    async fn list_projects(&self) -> Result<Vec<ProjectSummary>, StoreError> {
        let state = self.state.read().await;
        let summaries = state
            .projects
            .values()
            .map(|project| ProjectSummary {
                project: project.clone(),
                last_updated: state
                    .records
                    .iter()
                    .filter(|row| row.project_id == project.id)
                    .map(|row| row.record.timestamp)
                    .max(),
                access: state
                    .permissions
                    .get(&project.id)
                    .map(|users| users.iter().cloned().collect())
                    .unwrap_or_default(),
            })
            .collect();
        Ok(summaries)
    }

    async fn get_or_create_project(&self, id: &str, creator: &str) -> Result<(Project, Created), StoreError> {
        Ok(self.state.write().await.get_or_create_project(id, creator))
    }

    async fn update_project(
        &self,
        id: &str,
        name: Option<String>,
        description: Option<String>,
    ) -> Result<Project, StoreError> {
        let mut state = self.state.write().await;
        let project = state
            .projects
            .get_mut(id)
            .ok_or_else(|| StoreError::ProjectNotFound(id.to_string()))?;
        if let Some(name) = name {
            project.name = name;
        }
        if let Some(description) = description {
            project.description = description;
        }
        Ok(project.clone())
    }

    async fn project_access(&self, project_id: &str) -> Result<Vec<String>, StoreError> {
        let state = self.state.read().await;
        if !state.projects.contains_key(project_id) {
            return Err(StoreError::ProjectNotFound(project_id.to_string()));
        }
        Ok(state
            .permissions
            .get(project_id)
            .map(|users| users.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn grant_permission(&self, project_id: &str, username: &str) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if !state.projects.contains_key(project_id) {
            return Err(StoreError::ProjectNotFound(project_id.to_string()));
        }
        if !state.users.contains_key(username) {
            return Err(StoreError::UserNotFound(username.to_string()));
        }
        state
            .permissions
            .entry(project_id.to_string())
            .or_default()
            .insert(username.to_string());
        Ok(())
    }

    async fn find_records(&self, project_id: &str, label: &str) -> Result<Vec<StoredRecord>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .records
            .iter()
            .filter(|row| row.project_id == project_id && row.record.label == label)
            .map(RecordRow::to_stored)
            .collect())
    }

    async fn record_labels(&self, project_id: &str, tag_filter: Option<&str>) -> Result<Vec<String>, StoreError> {
        let state = self.state.read().await;
        let mut rows: Vec<&RecordRow> = state
            .records
            .iter()
            .filter(|row| row.project_id == project_id)
            .filter(|row| tag_filter.map_or(true, |t| row.tag_string.contains(t)))
            .collect();
        rows.sort_by(|a, b| a.record.timestamp.cmp(&b.record.timestamp).then(a.record.label.cmp(&b.record.label)));
        Ok(rows.into_iter().map(|row| row.record.label.clone()).collect())
    }

    async fn create_record(
        &self,
        project_id: &str,
        creator: &str,
        record: &Record,
    ) -> Result<(StoredRecord, Created), StoreError> {
        let mut state = self.state.write().await;
        if state
            .records
            .iter()
            .any(|row| row.project_id == project_id && row.record.label == record.label)
        {
            return Err(StoreError::Duplicate(format!("{}/{}", project_id, record.label)));
        }
        if state.projects.contains_key(project_id) {
            let access = state.permissions.get(project_id).into_iter().flatten();
            if !grants_write(access, creator) {
                return Err(StoreError::Forbidden {
                    project: project_id.to_string(),
                    username: creator.to_string(),
                });
            }
        }
        let refs = state.bind_refs(record)?;
        let (_, created) = state.get_or_create_project(project_id, creator);
        let row = RecordRow {
            project_id: project_id.to_string(),
            record: record.clone(),
            tag_string: tags::join_tags(&record.tags),
            refs,
        };
        let stored = row.to_stored();
        state.records.push(row);
        Ok((stored, created))
    }

    async fn update_record(&self, project_id: &str, label: &str, update: &RecordUpdate) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let row = state
            .records
            .iter_mut()
            .find(|row| row.project_id == project_id && row.record.label == label)
            .ok_or_else(|| StoreError::RecordNotFound {
                project: project_id.to_string(),
                label: label.to_string(),
            })?;
        if let Some(reason) = &update.reason {
            row.record.reason = reason.clone();
        }
        if let Some(outcome) = &update.outcome {
            row.record.outcome = outcome.clone();
        }
        if let Some(new_tags) = &update.tags {
            row.record.tags = new_tags.clone();
            row.tag_string = tags::join_tags(new_tags);
        }
        Ok(())
    }

    async fn delete_record(&self, project_id: &str, label: &str) -> Result<u64, StoreError> {
        let mut state = self.state.write().await;
        let before = state.records.len();
        state
            .records
            .retain(|row| !(row.project_id == project_id && row.record.label == label));
        Ok((before - state.records.len()) as u64)
    }
}
