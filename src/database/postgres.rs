use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

use super::models::{
    Project, ProjectSummary, Record, RecordUpdate, StoredRecord, SubEntity, SubEntityRefs, Timestamp, User,
};
use super::store::{grants_write, Created, Store, StoreError};
use super::tags;

/// Tables backing [`PgStore`]. Every statement is idempotent.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    username      TEXT PRIMARY KEY,
    password_hash TEXT NOT NULL DEFAULT ''
);

INSERT INTO users (username, password_hash) VALUES ('anonymous', '') ON CONFLICT (username) DO NOTHING;

CREATE TABLE IF NOT EXISTS projects (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL DEFAULT '',
    description TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS permissions (
    project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    username   TEXT NOT NULL REFERENCES users(username) ON DELETE CASCADE,
    PRIMARY KEY (project_id, username)
);

CREATE TABLE IF NOT EXISTS sub_entities (
    id          UUID PRIMARY KEY,
    kind        TEXT NOT NULL,
    fingerprint TEXT NOT NULL UNIQUE,
    body        JSONB NOT NULL
);

CREATE TABLE IF NOT EXISTS records (
    id                 UUID PRIMARY KEY,
    project_id         TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    label              TEXT NOT NULL,
    recorded_at        TIMESTAMP NOT NULL,
    reason             TEXT NOT NULL DEFAULT '',
    outcome            TEXT NOT NULL DEFAULT '',
    duration           DOUBLE PRECISION,
    main_file          TEXT,
    version            TEXT,
    diff               TEXT NOT NULL DEFAULT '',
    tags               TEXT NOT NULL DEFAULT '',
    user_name          TEXT NOT NULL DEFAULT '',
    script_arguments   TEXT NOT NULL DEFAULT '',
    stdout_stderr      TEXT NOT NULL DEFAULT '',
    repeats            TEXT,
    executable_id      UUID REFERENCES sub_entities(id),
    repository_id      UUID REFERENCES sub_entities(id),
    parameters_id      UUID REFERENCES sub_entities(id),
    launch_mode_id     UUID REFERENCES sub_entities(id),
    datastore_id       UUID REFERENCES sub_entities(id),
    input_datastore_id UUID REFERENCES sub_entities(id),
    UNIQUE (project_id, label)
);

CREATE INDEX IF NOT EXISTS records_project_idx ON records (project_id, recorded_at);

CREATE TABLE IF NOT EXISTS record_links (
    record_id UUID NOT NULL REFERENCES records(id) ON DELETE CASCADE,
    relation  TEXT NOT NULL,
    position  INTEGER NOT NULL,
    entity_id UUID NOT NULL REFERENCES sub_entities(id),
    PRIMARY KEY (record_id, relation, position)
);
"#;

const UNIQUE_VIOLATION: &str = "23505";

const RECORD_COLUMNS: &str = "id, project_id, label, recorded_at, reason, outcome, duration, main_file, version, \
     diff, tags, user_name, script_arguments, stdout_stderr, repeats, executable_id, repository_id, \
     parameters_id, launch_mode_id, datastore_id, input_datastore_id";

/// List relations of a record, stored in `record_links`
#[derive(Clone, Copy)]
enum Relation {
    Dependencies,
    Platforms,
    OutputData,
    InputData,
}

impl Relation {
    const ALL: [Relation; 4] = [
        Relation::Dependencies,
        Relation::Platforms,
        Relation::OutputData,
        Relation::InputData,
    ];

    fn as_str(self) -> &'static str {
        match self {
            Relation::Dependencies => "dependencies",
            Relation::Platforms => "platforms",
            Relation::OutputData => "output_data",
            Relation::InputData => "input_data",
        }
    }

    fn ids(self, refs: &SubEntityRefs) -> &[Uuid] {
        match self {
            Relation::Dependencies => &refs.dependencies,
            Relation::Platforms => &refs.platforms,
            Relation::OutputData => &refs.output_data,
            Relation::InputData => &refs.input_data,
        }
    }

    fn ids_mut(self, refs: &mut SubEntityRefs) -> &mut Vec<Uuid> {
        match self {
            Relation::Dependencies => &mut refs.dependencies,
            Relation::Platforms => &mut refs.platforms,
            Relation::OutputData => &mut refs.output_data,
            Relation::InputData => &mut refs.input_data,
        }
    }
}

/// Map a unique-key violation to [`StoreError::Duplicate`]
fn unique_violation(err: sqlx::Error, what: impl Into<String>) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
            StoreError::Duplicate(what.into())
        }
        _ => StoreError::Sqlx(err),
    }
}

/// PostgreSQL-backed store
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn project_exists(&self, id: &str) -> Result<bool, StoreError> {
        let found: Option<String> = sqlx::query_scalar("SELECT id FROM projects WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    async fn project_or_not_found(&self, id: &str) -> Result<(), StoreError> {
        if self.project_exists(id).await? {
            Ok(())
        } else {
            Err(StoreError::ProjectNotFound(id.to_string()))
        }
    }

    async fn get_or_create_project_tx(
        tx: &mut Transaction<'_, Postgres>,
        id: &str,
        creator: &str,
    ) -> Result<(Project, Created), StoreError> {
        let inserted = sqlx::query("INSERT INTO projects (id) VALUES ($1) ON CONFLICT (id) DO NOTHING")
            .bind(id)
            .execute(&mut **tx)
            .await?
            .rows_affected();

        let created = if inserted == 1 {
            sqlx::query("INSERT INTO permissions (project_id, username) VALUES ($1, $2) ON CONFLICT DO NOTHING")
                .bind(id)
                .bind(creator)
                .execute(&mut **tx)
                .await?;
            info!("Created project '{}' for '{}'", id, creator);
            Created::New
        } else {
            Created::Existing
        };

        let row = sqlx::query("SELECT id, name, description FROM projects WHERE id = $1")
            .bind(id)
            .fetch_one(&mut **tx)
            .await?;
        Ok((project_from_row(&row)?, created))
    }

    /// Get or create one shared sub-entity by fingerprint
    async fn bind_entity<E: SubEntity>(tx: &mut Transaction<'_, Postgres>, entity: &E) -> Result<Uuid, StoreError> {
        let fingerprint = entity.fingerprint()?;
        let body = serde_json::to_value(entity)?;

        sqlx::query(
            "INSERT INTO sub_entities (id, kind, fingerprint, body) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (fingerprint) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(E::KIND.as_str())
        .bind(&fingerprint)
        .bind(Json(body))
        .execute(&mut **tx)
        .await?;

        let id: Uuid = sqlx::query_scalar("SELECT id FROM sub_entities WHERE fingerprint = $1")
            .bind(&fingerprint)
            .fetch_one(&mut **tx)
            .await?;
        Ok(id)
    }

    async fn bind_optional<E: SubEntity>(
        tx: &mut Transaction<'_, Postgres>,
        entity: Option<&E>,
    ) -> Result<Option<Uuid>, StoreError> {
        match entity {
            Some(entity) => Ok(Some(Self::bind_entity(tx, entity).await?)),
            None => Ok(None),
        }
    }

    async fn bind_list<E: SubEntity>(tx: &mut Transaction<'_, Postgres>, entities: &[E]) -> Result<Vec<Uuid>, StoreError> {
        let mut ids = Vec::with_capacity(entities.len());
        for entity in entities {
            ids.push(Self::bind_entity(tx, entity).await?);
        }
        Ok(ids)
    }

    async fn bind_refs(tx: &mut Transaction<'_, Postgres>, record: &Record) -> Result<SubEntityRefs, StoreError> {
        Ok(SubEntityRefs {
            executable: Self::bind_optional(tx, record.executable.as_ref()).await?,
            repository: Self::bind_optional(tx, record.repository.as_ref()).await?,
            parameters: Self::bind_optional(tx, record.parameters.as_ref()).await?,
            launch_mode: Self::bind_optional(tx, record.launch_mode.as_ref()).await?,
            datastore: Self::bind_optional(tx, record.datastore.as_ref()).await?,
            input_datastore: Self::bind_optional(tx, record.input_datastore.as_ref()).await?,
            dependencies: Self::bind_list(tx, &record.dependencies).await?,
            platforms: Self::bind_list(tx, &record.platforms).await?,
            output_data: Self::bind_list(tx, &record.output_data).await?,
            input_data: Self::bind_list(tx, &record.input_data).await?,
        })
    }

    /// Rebuild a stored record from its row, its link rows and the referenced sub-entities
    async fn load_record(&self, row: &PgRow) -> Result<StoredRecord, StoreError> {
        let record_id: Uuid = row.try_get("id")?;

        let mut refs = SubEntityRefs {
            executable: row.try_get("executable_id")?,
            repository: row.try_get("repository_id")?,
            parameters: row.try_get("parameters_id")?,
            launch_mode: row.try_get("launch_mode_id")?,
            datastore: row.try_get("datastore_id")?,
            input_datastore: row.try_get("input_datastore_id")?,
            ..SubEntityRefs::default()
        };

        let links = sqlx::query("SELECT relation, entity_id FROM record_links WHERE record_id = $1 ORDER BY relation, position")
            .bind(record_id)
            .fetch_all(&self.pool)
            .await?;
        for link in &links {
            let relation: String = link.try_get("relation")?;
            let entity_id: Uuid = link.try_get("entity_id")?;
            if let Some(rel) = Relation::ALL.into_iter().find(|r| r.as_str() == relation) {
                rel.ids_mut(&mut refs).push(entity_id);
            }
        }

        let wanted: Vec<Uuid> = [
            refs.executable,
            refs.repository,
            refs.parameters,
            refs.launch_mode,
            refs.datastore,
            refs.input_datastore,
        ]
        .into_iter()
        .flatten()
        .chain(Relation::ALL.into_iter().flat_map(|r| r.ids(&refs).to_vec()))
        .collect();

        let entity_rows = sqlx::query("SELECT id, body FROM sub_entities WHERE id = ANY($1)")
            .bind(&wanted)
            .fetch_all(&self.pool)
            .await?;
        let mut bodies: HashMap<Uuid, Value> = HashMap::with_capacity(entity_rows.len());
        for entity_row in &entity_rows {
            let id: Uuid = entity_row.try_get("id")?;
            let Json(body): Json<Value> = entity_row.try_get("body")?;
            bodies.insert(id, body);
        }

        let recorded_at = row.try_get("recorded_at")?;
        let mut record = Record::new(row.try_get::<String, _>("label")?, Timestamp(recorded_at));
        record.reason = row.try_get("reason")?;
        record.outcome = row.try_get("outcome")?;
        record.duration = row.try_get("duration")?;
        record.main_file = row.try_get("main_file")?;
        record.version = row.try_get("version")?;
        record.diff = row.try_get("diff")?;
        record.tags = tags::parse_tag_input(&row.try_get::<String, _>("tags")?);
        record.user = row.try_get("user_name")?;
        record.script_arguments = row.try_get("script_arguments")?;
        record.stdout_stderr = row.try_get("stdout_stderr")?;
        record.repeats = row.try_get("repeats")?;

        record.executable = entity_opt(&bodies, refs.executable)?;
        record.repository = entity_opt(&bodies, refs.repository)?;
        record.parameters = entity_opt(&bodies, refs.parameters)?;
        record.launch_mode = entity_opt(&bodies, refs.launch_mode)?;
        record.datastore = entity_opt(&bodies, refs.datastore)?;
        record.input_datastore = entity_opt(&bodies, refs.input_datastore)?;
        record.dependencies = entity_list(&bodies, &refs.dependencies)?;
        record.platforms = entity_list(&bodies, &refs.platforms)?;
        record.output_data = entity_list(&bodies, &refs.output_data)?;
        record.input_data = entity_list(&bodies, &refs.input_data)?;

        Ok(StoredRecord {
            project_id: row.try_get("project_id")?,
            record,
            refs,
        })
    }
}

fn project_from_row(row: &PgRow) -> Result<Project, StoreError> {
    Ok(Project {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
    })
}

fn entity<E: DeserializeOwned>(bodies: &HashMap<Uuid, Value>, id: Uuid) -> Result<E, StoreError> {
    let body = bodies
        .get(&id)
        .ok_or_else(|| StoreError::InvalidData(format!("dangling sub-entity reference {}", id)))?;
    Ok(serde_json::from_value(body.clone())?)
}

fn entity_opt<E: DeserializeOwned>(bodies: &HashMap<Uuid, Value>, id: Option<Uuid>) -> Result<Option<E>, StoreError> {
    id.map(|id| entity(bodies, id)).transpose()
}

fn entity_list<E: DeserializeOwned>(bodies: &HashMap<Uuid, Value>, ids: &[Uuid]) -> Result<Vec<E>, StoreError> {
    ids.iter().map(|id| entity(bodies, *id)).collect()
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(())
    }

    async fn find_user(&self, username: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query("SELECT username, password_hash FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| {
            Ok(User {
                username: row.try_get("username")?,
                password_hash: row.try_get("password_hash")?,
            })
        })
        .transpose()
    }

    async fn create_user(&self, user: User) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO users (username, password_hash) VALUES ($1, $2)")
            .bind(&user.username)
            .bind(&user.password_hash)
            .execute(&self.pool)
            .await
            .map_err(|e| unique_violation(e, format!("user {}", user.username)))?;
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<String>, StoreError> {
        Ok(sqlx::query_scalar("SELECT username FROM users ORDER BY username")
            .fetch_all(&self.pool)
            .await?)
    }

    async fn find_project(&self, id: &str) -> Result<Option<Project>, StoreError> {
        let row = sqlx::query("SELECT id, name, description FROM projects WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(project_from_row).transpose()
    }

    async fn list_projects(&self) -> Result<Vec<ProjectSummary>, StoreError> {
        let rows = sqlx::query(
            "SELECT p.id, p.name, p.description, \
                    (SELECT MAX(r.recorded_at) FROM records r WHERE r.project_id = p.id) AS last_updated, \
                    COALESCE((SELECT array_agg(pm.username ORDER BY pm.username) \
                              FROM permissions pm WHERE pm.project_id = p.id), ARRAY[]::TEXT[]) AS access \
             FROM projects p ORDER BY p.id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let last_updated: Option<chrono::NaiveDateTime> = row.try_get("last_updated")?;
                Ok(ProjectSummary {
                    project: project_from_row(row)?,
                    last_updated: last_updated.map(Timestamp),
                    access: row.try_get("access")?,
                })
            })
            .collect()
    }

    async fn get_or_create_project(&self, id: &str, creator: &str) -> Result<(Project, Created), StoreError> {
        let mut tx = self.pool.begin().await?;
        let result = Self::get_or_create_project_tx(&mut tx, id, creator).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn update_project(
        &self,
        id: &str,
        name: Option<String>,
        description: Option<String>,
    ) -> Result<Project, StoreError> {
        let row = sqlx::query(
            "UPDATE projects SET name = COALESCE($2, name), description = COALESCE($3, description) \
             WHERE id = $1 RETURNING id, name, description",
        )
        .bind(id)
        .bind(name)
        .bind(description)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::ProjectNotFound(id.to_string()))?;
        project_from_row(&row)
    }

    async fn project_access(&self, project_id: &str) -> Result<Vec<String>, StoreError> {
        self.project_or_not_found(project_id).await?;
        Ok(sqlx::query_scalar("SELECT username FROM permissions WHERE project_id = $1 ORDER BY username")
            .bind(project_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn grant_permission(&self, project_id: &str, username: &str) -> Result<(), StoreError> {
        self.project_or_not_found(project_id).await?;
        if self.find_user(username).await?.is_none() {
            return Err(StoreError::UserNotFound(username.to_string()));
        }
        sqlx::query("INSERT INTO permissions (project_id, username) VALUES ($1, $2) ON CONFLICT DO NOTHING")
            .bind(project_id)
            .bind(username)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_records(&self, project_id: &str, label: &str) -> Result<Vec<StoredRecord>, StoreError> {
        let query = format!("SELECT {} FROM records WHERE project_id = $1 AND label = $2", RECORD_COLUMNS);
        let rows = sqlx::query(&query)
            .bind(project_id)
            .bind(label)
            .fetch_all(&self.pool)
            .await?;
        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            records.push(self.load_record(row).await?);
        }
        Ok(records)
    }

    async fn record_labels(&self, project_id: &str, tag_filter: Option<&str>) -> Result<Vec<String>, StoreError> {
        Ok(sqlx::query_scalar(
            "SELECT label FROM records \
             WHERE project_id = $1 AND ($2::TEXT IS NULL OR strpos(tags, $2) > 0) \
             ORDER BY recorded_at, label",
        )
        .bind(project_id)
        .bind(tag_filter)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn create_record(
        &self,
        project_id: &str,
        creator: &str,
        record: &Record,
    ) -> Result<(StoredRecord, Created), StoreError> {
        let mut tx = self.pool.begin().await?;
        let (_, created) = Self::get_or_create_project_tx(&mut tx, project_id, creator).await?;
        if !created.is_new() {
            // rows of a concurrent creator become visible once ON CONFLICT has waited on them
            let access: Vec<String> = sqlx::query_scalar("SELECT username FROM permissions WHERE project_id = $1")
                .bind(project_id)
                .fetch_all(&mut *tx)
                .await?;
            if !grants_write(&access, creator) {
                return Err(StoreError::Forbidden {
                    project: project_id.to_string(),
                    username: creator.to_string(),
                });
            }
        }
        let refs = Self::bind_refs(&mut tx, record).await?;

        let record_id = Uuid::new_v4();
        let insert = format!(
            "INSERT INTO records ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, \
             $16, $17, $18, $19, $20, $21)",
            RECORD_COLUMNS
        );
        sqlx::query(&insert)
            .bind(record_id)
            .bind(project_id)
            .bind(&record.label)
            .bind(record.timestamp.0)
            .bind(&record.reason)
            .bind(&record.outcome)
            .bind(record.duration)
            .bind(&record.main_file)
            .bind(&record.version)
            .bind(&record.diff)
            .bind(tags::join_tags(&record.tags))
            .bind(&record.user)
            .bind(&record.script_arguments)
            .bind(&record.stdout_stderr)
            .bind(&record.repeats)
            .bind(refs.executable)
            .bind(refs.repository)
            .bind(refs.parameters)
            .bind(refs.launch_mode)
            .bind(refs.datastore)
            .bind(refs.input_datastore)
            .execute(&mut *tx)
            .await
            .map_err(|e| unique_violation(e, format!("{}/{}", project_id, record.label)))?;

        for relation in Relation::ALL {
            for (position, entity_id) in relation.ids(&refs).iter().enumerate() {
                sqlx::query("INSERT INTO record_links (record_id, relation, position, entity_id) VALUES ($1, $2, $3, $4)")
                    .bind(record_id)
                    .bind(relation.as_str())
                    .bind(position as i32)
                    .bind(entity_id)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;

        let stored = StoredRecord {
            project_id: project_id.to_string(),
            record: record.clone(),
            refs,
        };
        Ok((stored, created))
    }

    async fn update_record(&self, project_id: &str, label: &str, update: &RecordUpdate) -> Result<(), StoreError> {
        let affected = sqlx::query(
            "UPDATE records SET reason = COALESCE($3, reason), outcome = COALESCE($4, outcome), \
             tags = COALESCE($5, tags) WHERE project_id = $1 AND label = $2",
        )
        .bind(project_id)
        .bind(label)
        .bind(&update.reason)
        .bind(&update.outcome)
        .bind(update.tags.as_ref().map(tags::join_tags))
        .execute(&self.pool)
        .await?
        .rows_affected();

        if affected == 0 {
            return Err(StoreError::RecordNotFound {
                project: project_id.to_string(),
                label: label.to_string(),
            });
        }
        Ok(())
    }

    async fn delete_record(&self, project_id: &str, label: &str) -> Result<u64, StoreError> {
        Ok(sqlx::query("DELETE FROM records WHERE project_id = $1 AND label = $2")
            .bind(project_id)
            .bind(label)
            .execute(&self.pool)
            .await?
            .rows_affected())
    }
}
