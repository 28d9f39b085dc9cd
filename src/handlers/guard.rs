//! Per-project access checks.
//!
//! Reading needs the project to be public (granted to `anonymous`) or the
//! caller to hold a permission row. Writing additionally needs a concrete
//! identity, public or not. Listing and granting permissions is limited to
//! members.

use tracing::warn;

use crate::app::AppState;
use crate::auth::{Caller, Identity};
use crate::database::models::{Project, ANONYMOUS};
use crate::error::ApiError;

/// A project that passed the gate, with its access list
#[derive(Debug, Clone)]
pub struct Gate {
    pub project: Project,
    pub access: Vec<String>,
}

impl Gate {
    pub fn is_public(&self) -> bool {
        is_public(&self.access)
    }
}

pub fn is_public(access: &[String]) -> bool {
    access.iter().any(|u| u == ANONYMOUS)
}

/// Concrete identity holding a permission row; the public grant does not count
pub fn is_member(access: &[String], identity: &Identity) -> bool {
    !identity.is_anonymous() && access.iter().any(|u| u == identity.username())
}

pub fn may_read(access: &[String], identity: &Identity) -> bool {
    is_public(access) || is_member(access, identity)
}

pub fn may_write(access: &[String], identity: &Identity) -> bool {
    !identity.is_anonymous() && may_read(access, identity)
}

async fn load(state: &AppState, project_id: &str) -> Result<Option<Gate>, ApiError> {
    let project = match state.store.find_project(project_id).await? {
        Some(project) => project,
        None => return Ok(None),
    };
    let access = state.store.project_access(project_id).await?;
    Ok(Some(Gate { project, access }))
}

fn not_found(project_id: &str) -> ApiError {
    ApiError::not_found(format!("Project '{}' not found", project_id))
}

async fn identified<'a>(state: &AppState, caller: &'a Caller) -> Result<&'a Identity, ApiError> {
    let identity = caller.identity(state).await?;
    if identity.is_anonymous() {
        return Err(caller.unauthorized(&state.config));
    }
    Ok(identity)
}

fn denied(project_id: &str, identity: &Identity) -> ApiError {
    warn!("Denied '{}' access to project '{}'", identity.username(), project_id);
    ApiError::forbidden(format!("No access to project '{}'", project_id))
}

/// Public projects pass without resolving the caller
pub async fn authorize_read(state: &AppState, caller: &Caller, project_id: &str) -> Result<Gate, ApiError> {
    let gate = load(state, project_id).await?.ok_or_else(|| not_found(project_id))?;
    if gate.is_public() {
        return Ok(gate);
    }
    let identity = identified(state, caller).await?;
    if !may_read(&gate.access, identity) {
        return Err(denied(project_id, identity));
    }
    Ok(gate)
}

pub async fn authorize_write(state: &AppState, caller: &Caller, project_id: &str) -> Result<Gate, ApiError> {
    let gate = load(state, project_id).await?.ok_or_else(|| not_found(project_id))?;
    let identity = identified(state, caller).await?;
    if !may_write(&gate.access, identity) {
        return Err(denied(project_id, identity));
    }
    Ok(gate)
}

/// Write rule for existing projects; for unknown ids any concrete identity
/// may create. Returns `None` when the project does not exist yet.
pub async fn authorize_create_or_write(
    state: &AppState,
    caller: &Caller,
    project_id: &str,
) -> Result<Option<Gate>, ApiError> {
    match load(state, project_id).await? {
        Some(gate) => {
            let identity = identified(state, caller).await?;
            if !may_write(&gate.access, identity) {
                return Err(denied(project_id, identity));
            }
            Ok(Some(gate))
        }
        None => {
            identified(state, caller).await?;
            Ok(None)
        }
    }
}

pub async fn authorize_member(state: &AppState, caller: &Caller, project_id: &str) -> Result<Gate, ApiError> {
    let gate = load(state, project_id).await?.ok_or_else(|| not_found(project_id))?;
    let identity = identified(state, caller).await?;
    if !is_member(&gate.access, identity) {
        return Err(denied(project_id, identity));
    }
    Ok(gate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn access(users: &[&str]) -> Vec<String> {
        users.iter().map(|u| u.to_string()).collect()
    }

    fn user(name: &str) -> Identity {
        Identity::User(name.to_string())
    }

    #[test]
    fn public_projects_are_readable_by_anyone() {
        let public = access(&["anonymous", "owner"]);
        assert!(may_read(&public, &Identity::Anonymous));
        assert!(may_read(&public, &user("stranger")));
    }

    #[test]
    fn private_projects_need_membership() {
        let private = access(&["owner"]);
        assert!(!may_read(&private, &Identity::Anonymous));
        assert!(!may_read(&private, &user("stranger")));
        assert!(may_read(&private, &user("owner")));
    }

    #[test]
    fn writes_need_a_concrete_identity() {
        let public = access(&["anonymous"]);
        assert!(!may_write(&public, &Identity::Anonymous));
        assert!(may_write(&public, &user("stranger")));
        assert!(!may_write(&access(&["owner"]), &user("stranger")));
    }

    #[test]
    fn public_grant_is_not_membership() {
        let public = access(&["anonymous"]);
        assert!(!is_member(&public, &Identity::Anonymous));
        assert!(!is_member(&public, &user("stranger")));
        assert!(is_member(&access(&["anonymous", "owner"]), &user("owner")));
    }
}
