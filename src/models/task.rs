// src/models/task.rs

use std::{fmt, str::FromStr};

use jiff::Timestamp;
use jiff::civil::Date;
use serde::{Deserialize, Serialize};

use crate::models::{InvalidChoice, ProjectId, TaskId, UserId, project::Project, user::UserSummary};

#[derive(Serialize, Deserialize, Default, Clone, Debug, PartialEq)]
pub struct Task {
    /// Numeric id of the task
    pub id: TaskId,
    /// The project this task belongs to
    pub project_id: ProjectId,
    /// Name of the task
    pub name: String,
    /// Description of the task
    pub description: Option<String>,
    /// Current status
    pub status: TaskStatus,
    /// Priority of the task
    pub priority: TaskPriority,
    /// Deadline for this task
    pub due_date: Option<Date>,
    /// Who is working on it, checked for project membership when set
    pub assigned_to_user_id: Option<UserId>,
    /// When the task was created
    pub created_at: Timestamp,
    /// When the task was last changed
    pub updated_at: Timestamp,
}

impl Task {
    /// Whether the daily sweep should move this task to `overdue`.
    pub fn is_past_due(&self, today: Date) -> bool {
        match self.due_date {
            Some(due) => due < today && !self.status.is_closed(),
            None => false,
        }
    }
}

#[derive(Serialize, Deserialize, Default, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Open,
    InProgress,
    Completed,
    Overdue,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Open => "open",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Overdue => "overdue",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    /// Completed and cancelled tasks never become overdue.
    pub fn is_closed(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Cancelled)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = InvalidChoice;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(TaskStatus::Open),
            "in_progress" => Ok(TaskStatus::InProgress),
            "completed" => Ok(TaskStatus::Completed),
            "overdue" => Ok(TaskStatus::Overdue),
            "cancelled" => Ok(TaskStatus::Cancelled),
            other => Err(InvalidChoice::new("status", other)),
        }
    }
}

#[derive(Serialize, Deserialize, Default, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::Low => "low",
            TaskPriority::Medium => "medium",
            TaskPriority::High => "high",
        }
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskPriority {
    type Err = InvalidChoice;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(TaskPriority::Low),
            "medium" => Ok(TaskPriority::Medium),
            "high" => Ok(TaskPriority::High),
            other => Err(InvalidChoice::new("priority", other)),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TaskView {
    pub task: Task,
    pub project: Option<Project>,
    pub assignee: Option<UserSummary>,
    pub comments_count: usize,
}
