use std::{fmt, str::FromStr};

use jiff::Timestamp;
use jiff::civil::Date;
use serde::{Deserialize, Serialize};

use crate::models::{
    InvalidChoice, ProjectId, TeamId, UserId,
    attachment::AttachmentView,
    comment::CommentView,
    task::TaskView,
    team::Team,
    user::UserSummary,
};

#[derive(Serialize, Deserialize, Default, Clone, Debug, PartialEq)]
pub struct Project {
    /// Numeric id of the project
    pub id: ProjectId,
    /// Team owning the project
    pub team_id: TeamId,
    /// Name of the project
    pub name: String,
    /// Description of the project
    pub description: Option<String>,
    /// Lifecycle status of the project
    pub status: ProjectStatus,
    /// Due date of the project
    pub due_date: Option<Date>,
    /// User who created the project, immutable
    pub created_by_user_id: UserId,
    /// Created at timestamp of the project
    pub created_at: Timestamp,
    /// Updated at timestamp of the project
    pub updated_at: Timestamp,
}

#[derive(Serialize, Deserialize, Default, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Pending => "pending",
            ProjectStatus::InProgress => "in_progress",
            ProjectStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectStatus {
    type Err = InvalidChoice;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ProjectStatus::Pending),
            "in_progress" => Ok(ProjectStatus::InProgress),
            "completed" => Ok(ProjectStatus::Completed),
            other => Err(InvalidChoice::new("status", other)),
        }
    }
}

#[derive(Serialize, Deserialize, Default, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProjectRole {
    ProjectManager,
    #[default]
    Member,
}

impl ProjectRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectRole::ProjectManager => "project_manager",
            ProjectRole::Member => "member",
        }
    }
}

impl fmt::Display for ProjectRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectRole {
    type Err = InvalidChoice;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "project_manager" => Ok(ProjectRole::ProjectManager),
            "member" => Ok(ProjectRole::Member),
            other => Err(InvalidChoice::new("role", other)),
        }
    }
}

/// Membership edge between a user and a project.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ProjectMember {
    pub project_id: ProjectId,
    pub user_id: UserId,
    pub role: ProjectRole,
    pub joined_at: Timestamp,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ProjectMemberView {
    pub user: UserSummary,
    pub role: ProjectRole,
}

/// Row of a project listing.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ProjectSummary {
    pub project: Project,
    pub team: Option<Team>,
    pub members: Vec<ProjectMemberView>,
    pub tasks_count: usize,
    pub comments_count: usize,
}

/// Everything a viewer sees on the project detail page. This is the value
/// memoized per (project, viewer).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ProjectDetail {
    pub project: Project,
    pub team: Option<Team>,
    pub team_owner: Option<UserSummary>,
    pub creator: Option<UserSummary>,
    pub members: Vec<ProjectMemberView>,
    pub tasks: Vec<TaskView>,
    pub comments: Vec<CommentView>,
    pub attachments: Vec<AttachmentView>,
    pub tasks_count: usize,
    pub comments_count: usize,
    pub completed_tasks_count: usize,
}
