//! Mutation services and read operations.
//!
//! Every operation takes a `Context` holding the collaborators and the
//! authenticated actor by reference. Mutations persist through `Storage`
//! before raising events, then invalidate whole cache keys for every viewer
//! whose view could have changed.

use std::collections::BTreeSet;

use jiff::{Zoned, civil::Date};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::{
    blobs::{BlobError, BlobStorage},
    cache::{self, CacheError, ViewCache},
    config::Settings,
    events::{self, DomainEvent, JobQueue},
    models::{
        InvalidChoice, ProjectId, TeamId, UserId,
        attachment::Attachment,
        store::Store,
        user::User,
    },
    policy::{self, Action, Target},
    sanitize::Sanitizer,
    storage::{Storage, StorageError},
};

pub mod attachments;
pub mod auth;
pub mod comments;
pub mod notifications;
pub mod projects;
pub mod tasks;
pub mod teams;
pub mod views;

/// Stable wording for failures that carry no detail for the caller.
pub const GENERIC_FAILURE: &str = "The operation failed.";

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Unauthenticated.")]
    Unauthenticated,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("This action is unauthorized.")]
    Unauthorized,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    InvariantViolation(String),

    #[error("{0}")]
    Validation(String),

    #[error("Blob storage error: {0}")]
    Blob(#[from] BlobError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Password error: {0}")]
    Password(#[from] auth::PasswordError),
}

/// Outcome class of a `ServiceError`, for boundaries that map failures to
/// status or exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Unauthenticated,
    Unauthorized,
    NotFound,
    Conflict,
    InvariantViolation,
    Validation,
    Failure,
}

impl ServiceError {
    pub fn not_found(entity: &str, id: impl std::fmt::Display) -> Self {
        ServiceError::NotFound(format!("{entity} #{id} not found."))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Unauthenticated | ServiceError::InvalidCredentials => {
                ErrorKind::Unauthenticated
            }
            ServiceError::Unauthorized => ErrorKind::Unauthorized,
            ServiceError::NotFound(_) => ErrorKind::NotFound,
            ServiceError::Conflict(_) => ErrorKind::Conflict,
            ServiceError::InvariantViolation(_) => ErrorKind::InvariantViolation,
            ServiceError::Validation(_) => ErrorKind::Validation,
            ServiceError::Blob(_)
            | ServiceError::Storage(_)
            | ServiceError::Cache(_)
            | ServiceError::Password(_) => ErrorKind::Failure,
        }
    }

    /// What the caller gets to see. Unexpected failures are logged with their
    /// source and reported with the generic wording.
    pub fn user_message(&self) -> String {
        match self.kind() {
            ErrorKind::Failure => {
                error!(error = %self, "operation failed");
                GENERIC_FAILURE.to_string()
            }
            _ => self.to_string(),
        }
    }
}

impl From<InvalidChoice> for ServiceError {
    fn from(e: InvalidChoice) -> Self {
        ServiceError::Validation(e.to_string())
    }
}

/// Collaborators one operation runs against.
pub struct Context<'a> {
    pub store: &'a mut Store,
    pub storage: &'a dyn Storage,
    pub cache: &'a mut dyn ViewCache,
    pub queue: &'a mut dyn JobQueue,
    pub blobs: &'a dyn BlobStorage,
    pub sanitizer: &'a dyn Sanitizer,
    pub settings: &'a Settings,
}

impl Context<'_> {
    pub(crate) fn save(&self) -> Result<(), ServiceError> {
        self.storage.save(self.store)?;
        Ok(())
    }

    pub(crate) fn raise(&mut self, event: DomainEvent) {
        events::dispatch(self.queue, self.store, &event);
    }

    pub(crate) fn forget_project_detail(&mut self, project_id: ProjectId, viewers: &BTreeSet<UserId>) {
        cache::forget_project_detail(self.cache, project_id, viewers.iter().copied());
    }

    pub(crate) fn forget_team_listings(&mut self, viewers: &BTreeSet<UserId>) {
        cache::forget_team_listings(self.cache, viewers.iter().copied());
    }
}

pub(crate) fn authorize(
    store: &Store,
    actor: &User,
    action: Action,
    target: Target<'_>,
) -> Result<(), ServiceError> {
    if policy::can(store, actor, action, target) {
        Ok(())
    } else {
        debug!(user_id = actor.id, %action, target = target.kind(), "authorization denied");
        Err(ServiceError::Unauthorized)
    }
}

/// Everyone whose team listing shows `team_id`.
pub(crate) fn team_viewers(store: &Store, team_id: TeamId) -> BTreeSet<UserId> {
    let mut viewers: BTreeSet<UserId> = store.team_members(team_id).map(|m| m.user_id).collect();
    viewers.extend(store.get_team(team_id).map(|t| t.owner_id));
    viewers
}

/// Everyone who may hold a cached detail view of `project_id`.
pub(crate) fn project_viewers(store: &Store, project_id: ProjectId) -> BTreeSet<UserId> {
    let Some(project) = store.get_project(project_id) else {
        return BTreeSet::new();
    };
    let mut viewers: BTreeSet<UserId> = store
        .project_members(project_id)
        .map(|m| m.user_id)
        .collect();
    viewers.insert(project.created_by_user_id);
    viewers.extend(team_viewers(store, project.team_id));
    viewers
}

/// Releases the stored files of removed attachments. A missing file is only
/// worth a warning and a failing disk is logged; neither fails the caller.
pub(crate) fn release_files(blobs: &dyn BlobStorage, attachments: &[Attachment]) {
    for attachment in attachments {
        match blobs.delete(&attachment.disk, &attachment.path) {
            Ok(true) => debug!(attachment_id = attachment.id, path = %attachment.path, "file deleted"),
            Ok(false) => warn!(
                attachment_id = attachment.id,
                path = %attachment.path,
                "attachment file already missing"
            ),
            Err(e) => error!(
                attachment_id = attachment.id,
                path = %attachment.path,
                error = %e,
                "failed to delete attachment file"
            ),
        }
    }
}

/// Today's date in the local time zone, for due date rules.
pub(crate) fn today() -> Date {
    Zoned::now().date()
}

/// Due dates may not lie in the past.
pub(crate) fn due_date_not_past(due_date: Option<Date>) -> Result<(), ServiceError> {
    match due_date {
        Some(due) if due < today() => Err(ServiceError::Validation(
            "The due date field must be a date after or equal to today.".to_string(),
        )),
        _ => Ok(()),
    }
}

/// Rejects blank required text fields.
pub(crate) fn required(field: &str, value: &str) -> Result<(), ServiceError> {
    if value.trim().is_empty() {
        return Err(ServiceError::Validation(format!("The {field} field is required.")));
    }
    Ok(())
}

/// Rejects text longer than `max` characters.
pub(crate) fn max_length(field: &str, value: &str, max: usize) -> Result<(), ServiceError> {
    if value.chars().count() > max {
        return Err(ServiceError::Validation(format!(
            "The {field} field must not be greater than {max} characters."
        )));
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unexpected_failures_hide_their_detail() {
        let err = ServiceError::Storage(StorageError::FutureVersion(9));
        assert_eq!(err.kind(), ErrorKind::Failure);
        assert_eq!(err.user_message(), GENERIC_FAILURE);

        let err = ServiceError::InvariantViolation("Cannot remove the sole project manager.".into());
        assert_eq!(err.user_message(), "Cannot remove the sole project manager.");
        assert_eq!(ServiceError::Unauthorized.user_message(), "This action is unauthorized.");
    }

    #[test]
    fn test_invalid_choice_is_a_validation_error() {
        let err: ServiceError = InvalidChoice::new("role", "owner").into();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.to_string(), "The selected role is invalid.");
    }
}
