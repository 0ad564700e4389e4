use std::fmt;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::models::{
    AttachmentId, CommentId, InvalidChoice, ProjectId, TaskId, UserId, comment::Commentable,
    user::UserSummary,
};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Attachment {
    pub id: AttachmentId,
    /// Uploader
    pub user_id: UserId,
    pub attachable: Attachable,
    /// Blob storage disk the file lives on
    pub disk: String,
    /// Path of the file inside the disk
    pub path: String,
    /// File name as uploaded by the client
    pub file_name: String,
    pub file_size: u64,
    pub mime_type: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// What an attachment hangs off: a type tag plus the numeric id.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Attachable {
    Project(ProjectId),
    Task(TaskId),
    Comment(CommentId),
}

impl Attachable {
    pub fn parse(kind: &str, id: u64) -> Result<Self, InvalidChoice> {
        match kind {
            "project" => Ok(Attachable::Project(id)),
            "task" => Ok(Attachable::Task(id)),
            "comment" => Ok(Attachable::Comment(id)),
            other => Err(InvalidChoice::new("attachable type", other)),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Attachable::Project(_) => "project",
            Attachable::Task(_) => "task",
            Attachable::Comment(_) => "comment",
        }
    }

    pub fn id(&self) -> u64 {
        match self {
            Attachable::Project(id) | Attachable::Task(id) | Attachable::Comment(id) => *id,
        }
    }
}

impl From<Commentable> for Attachable {
    fn from(commentable: Commentable) -> Self {
        match commentable {
            Commentable::Project(id) => Attachable::Project(id),
            Commentable::Task(id) => Attachable::Task(id),
        }
    }
}

impl fmt::Display for Attachable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} #{}", self.kind(), self.id())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AttachmentView {
    pub attachment: Attachment,
    pub uploader: Option<UserSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attachable_tag_round_trips_through_json() {
        let json = serde_json::to_string(&Attachable::Comment(7)).unwrap();
        assert_eq!(json, r#"{"type":"comment","id":7}"#);
        assert_eq!(
            serde_json::from_str::<Attachable>(&json).unwrap(),
            Attachable::Comment(7)
        );
    }

    #[test]
    fn test_attachable_rejects_unknown_type() {
        let err = Attachable::parse("team", 1).unwrap_err();
        assert_eq!(err.to_string(), "The selected attachable type is invalid.");
    }
}
