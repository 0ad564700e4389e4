// src/models.rs

pub mod attachment;
pub mod comment;
pub mod notification;
pub mod project;
pub mod store;
pub mod task;
pub mod team;
pub mod user;

pub type UserId = u64;
pub type TeamId = u64;
pub type ProjectId = u64;
pub type TaskId = u64;
pub type CommentId = u64;
pub type AttachmentId = u64;

/// Error returned when a closed enum value (role, status, priority, target
/// type) is parsed from free text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("The selected {field} is invalid.")]
pub struct InvalidChoice {
    pub field: &'static str,
    pub value: String,
}

impl InvalidChoice {
    pub fn new(field: &'static str, value: &str) -> Self {
        Self {
            field,
            value: value.to_string(),
        }
    }
}
