use async_trait::async_trait;
use thiserror::Error;

use super::models::{Project, ProjectSummary, Record, RecordUpdate, StoredRecord, User, ANONYMOUS};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    #[error("Record not found: {project}/{label}")]
    RecordNotFound { project: String, label: String },

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("'{username}' may not write to project '{project}'")]
    Forbidden { project: String, username: String },

    #[error("Duplicate entry: {0}")]
    Duplicate(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::InvalidData(err.to_string())
    }
}

/// Outcome of a get-or-create
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Created {
    New,
    Existing,
}

impl Created {
    pub fn is_new(self) -> bool {
        matches!(self, Created::New)
    }
}

/// Write rule for an existing project: a concrete identity that holds a
/// permission row, or any concrete identity when the project is public.
pub fn grants_write<I, S>(access: I, username: &str) -> bool
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    username != ANONYMOUS && access.into_iter().any(|u| u.as_ref() == ANONYMOUS || u.as_ref() == username)
}

/// Persistent repository for projects, records, permissions and users.
///
/// Every method is a single atomic unit: implementations serialize
/// get-or-create operations so concurrent identical requests cannot create a
/// project twice, leave it without its creator's permission, or duplicate a
/// shared sub-entity.
#[async_trait]
pub trait Store: Send + Sync {
    /// Cheap connectivity probe
    async fn ping(&self) -> Result<(), StoreError>;

    async fn find_user(&self, username: &str) -> Result<Option<User>, StoreError>;

    async fn create_user(&self, user: User) -> Result<(), StoreError>;

    async fn list_users(&self) -> Result<Vec<String>, StoreError>;

    async fn find_project(&self, id: &str) -> Result<Option<Project>, StoreError>;

    /// All projects with their access lists and last-updated timestamps
    async fn list_projects(&self) -> Result<Vec<ProjectSummary>, StoreError>;

    /// Get or create a project. A newly created project receives a permission
    /// row for `creator` in the same unit of work.
    async fn get_or_create_project(&self, id: &str, creator: &str) -> Result<(Project, Created), StoreError>;

    /// Apply name / description changes to an existing project
    async fn update_project(
        &self,
        id: &str,
        name: Option<String>,
        description: Option<String>,
    ) -> Result<Project, StoreError>;

    /// Usernames holding a permission on the project
    async fn project_access(&self, project_id: &str) -> Result<Vec<String>, StoreError>;

    /// Grant `username` access to the project. Granting twice is a no-op.
    async fn grant_permission(&self, project_id: &str, username: &str) -> Result<(), StoreError>;

    /// Every row stored under (project, label); more than one is an integrity
    /// fault the caller reports as a conflict.
    async fn find_records(&self, project_id: &str, label: &str) -> Result<Vec<StoredRecord>, StoreError>;

    /// Labels of the project's records, optionally restricted to those whose
    /// stored tag string contains `tag_filter`
    async fn record_labels(&self, project_id: &str, tag_filter: Option<&str>) -> Result<Vec<String>, StoreError>;

    /// Create a record, creating its project (and the creator's permission)
    /// when unknown and binding every sub-entity by exact attribute match.
    /// When the project already exists `creator` must pass [`grants_write`]
    /// in the same unit of work, otherwise nothing is written and the call
    /// fails with [`StoreError::Forbidden`].
    async fn create_record(
        &self,
        project_id: &str,
        creator: &str,
        record: &Record,
    ) -> Result<(StoredRecord, Created), StoreError>;

    /// Update the mutable fields of an existing record
    async fn update_record(&self, project_id: &str, label: &str, update: &RecordUpdate) -> Result<(), StoreError>;

    /// Delete every row under (project, label), returning how many were removed
    async fn delete_record(&self, project_id: &str, label: &str) -> Result<u64, StoreError>;
}
