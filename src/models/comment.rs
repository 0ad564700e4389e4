use std::fmt;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::models::{CommentId, InvalidChoice, ProjectId, TaskId, UserId, user::UserSummary};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Comment {
    pub id: CommentId,
    /// Sanitized content
    pub content: String,
    pub user_id: UserId,
    pub commentable: Commentable,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// What a comment hangs off: a type tag plus the numeric id.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Commentable {
    Project(ProjectId),
    Task(TaskId),
}

impl Commentable {
    pub fn parse(kind: &str, id: u64) -> Result<Self, InvalidChoice> {
        match kind {
            "project" => Ok(Commentable::Project(id)),
            "task" => Ok(Commentable::Task(id)),
            other => Err(InvalidChoice::new("commentable type", other)),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Commentable::Project(_) => "project",
            Commentable::Task(_) => "task",
        }
    }

    pub fn id(&self) -> u64 {
        match self {
            Commentable::Project(id) | Commentable::Task(id) => *id,
        }
    }
}

impl fmt::Display for Commentable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} #{}", self.kind(), self.id())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CommentView {
    pub comment: Comment,
    pub author: Option<UserSummary>,
}
