//! Domain events and their fan-out.
//!
//! Services raise a `DomainEvent` after the state change is persisted.
//! `dispatch` derives the recipient set from the store as it is at that
//! moment and enqueues one `Job` per recipient. Delivery happens elsewhere
//! (see `delivery`); nothing here retries.

use std::collections::VecDeque;

use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::models::{
    CommentId, ProjectId, TaskId, UserId,
    comment::Commentable,
    notification::NotificationKind,
    store::{CommentableRef, Store},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainEvent {
    TaskAssigned {
        task_id: TaskId,
        assignee_id: UserId,
        assigner_id: UserId,
    },
    TaskCompleted {
        task_id: TaskId,
        completer_id: UserId,
    },
    CommentCreated {
        comment_id: CommentId,
    },
    ProjectCompleted {
        project_id: ProjectId,
        completer_id: UserId,
    },
}

/// An email handed to the mailer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// One unit of deferred delivery: a stored notification for `recipient_id`
/// and, for some events, an email.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub recipient_id: UserId,
    pub kind: NotificationKind,
    pub data: Value,
    pub mail: Option<MailMessage>,
}

/// Work queue boundary between the core and delivery.
pub trait JobQueue {
    fn push(&mut self, job: Job);
    fn pop(&mut self) -> Option<Job>;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Default)]
pub struct MemoryQueue {
    jobs: VecDeque<Job>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }
}

impl JobQueue for MemoryQueue {
    fn push(&mut self, job: Job) {
        self.jobs.push_back(job);
    }

    fn pop(&mut self) -> Option<Job> {
        self.jobs.pop_front()
    }

    fn len(&self) -> usize {
        self.jobs.len()
    }
}

/// Candidates in first-seen order, without duplicates and without `excluded`.
fn distinct<I>(candidates: I, excluded: &[Option<UserId>]) -> Vec<UserId>
where
    I: IntoIterator<Item = UserId>,
{
    let mut out: Vec<UserId> = Vec::new();
    for id in candidates {
        if !excluded.contains(&Some(id)) && !out.contains(&id) {
            out.push(id);
        }
    }
    out
}

fn user_name(store: &Store, id: UserId) -> String {
    store
        .get_user(id)
        .map(|u| u.name.clone())
        .unwrap_or_else(|| String::from("Unknown User"))
}

impl DomainEvent {
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::TaskAssigned { .. } => "TaskAssigned",
            DomainEvent::TaskCompleted { .. } => "TaskCompleted",
            DomainEvent::CommentCreated { .. } => "CommentCreated",
            DomainEvent::ProjectCompleted { .. } => "ProjectCompleted",
        }
    }

    /// Who hears about the event. Empty when the subject no longer exists.
    pub fn recipients(&self, store: &Store) -> Vec<UserId> {
        match *self {
            DomainEvent::TaskAssigned { assignee_id, .. } => vec![assignee_id],

            DomainEvent::TaskCompleted {
                task_id,
                completer_id,
            } => {
                let Some(task) = store.get_task(task_id) else {
                    return vec![];
                };
                let Some(project) = store.get_project(task.project_id) else {
                    return vec![];
                };
                let managers = store.project_managers(project.id).map(|m| m.user_id);
                let candidates = std::iter::once(project.created_by_user_id)
                    .chain(managers)
                    .chain(store.project_team_owner(project));
                distinct(candidates, &[Some(completer_id), task.assigned_to_user_id])
            }

            DomainEvent::CommentCreated { comment_id } => {
                let Some(comment) = store.get_comment(comment_id) else {
                    return vec![];
                };
                let (related, project_id) = match store.resolve_commentable(comment.commentable) {
                    Some(CommentableRef::Project(p)) => (Some(p.created_by_user_id), p.id),
                    Some(CommentableRef::Task(t)) => (t.assigned_to_user_id, t.project_id),
                    None => return vec![],
                };
                let members = store.project_members(project_id).map(|m| m.user_id);
                distinct(related.into_iter().chain(members), &[Some(comment.user_id)])
            }

            DomainEvent::ProjectCompleted {
                project_id,
                completer_id,
            } => {
                let Some(project) = store.get_project(project_id) else {
                    return vec![];
                };
                let members = store.project_members(project.id).map(|m| m.user_id);
                let candidates = std::iter::once(project.created_by_user_id)
                    .chain(members)
                    .chain(store.project_team_owner(project));
                distinct(candidates, &[Some(completer_id)])
            }
        }
    }

    /// Notification kind, payload and optional email for one recipient.
    fn render(&self, store: &Store, recipient_id: UserId) -> Option<Job> {
        let recipient = store.get_user(recipient_id)?;
        let job = match *self {
            DomainEvent::TaskAssigned {
                task_id,
                assigner_id,
                ..
            } => {
                let task = store.get_task(task_id)?;
                let project_name = store
                    .get_project(task.project_id)
                    .map(|p| p.name.clone())
                    .unwrap_or_else(|| String::from("N/A"));
                let assigner = user_name(store, assigner_id);
                Job {
                    recipient_id,
                    kind: NotificationKind::TaskAssigned,
                    data: json!({
                        "task_id": task.id,
                        "task_name": task.name,
                        "project_id": task.project_id,
                        "project_name": project_name,
                        "assigned_by": assigner,
                        "message": format!("You have been assigned to task '{}' by {}.", task.name, assigner),
                    }),
                    mail: Some(MailMessage {
                        to: recipient.email.clone(),
                        subject: format!("New Task Assigned: {}", task.name),
                        body: format!(
                            "Hello {},\n\n{} assigned you the task '{}' in project '{}'.",
                            recipient.name, assigner, task.name, project_name
                        ),
                    }),
                }
            }

            DomainEvent::TaskCompleted {
                task_id,
                completer_id,
            } => {
                let task = store.get_task(task_id)?;
                let project_name = store
                    .get_project(task.project_id)
                    .map(|p| p.name.clone())
                    .unwrap_or_else(|| String::from("N/A"));
                let completer = user_name(store, completer_id);
                Job {
                    recipient_id,
                    kind: NotificationKind::TaskCompleted,
                    data: json!({
                        "task_id": task.id,
                        "task_name": task.name,
                        "project_id": task.project_id,
                        "project_name": project_name,
                        "completed_by": completer,
                        "message": format!("Task '{}' has been completed by {}.", task.name, completer),
                    }),
                    mail: None,
                }
            }

            DomainEvent::CommentCreated { comment_id } => {
                let comment = store.get_comment(comment_id)?;
                let on = store.resolve_commentable(comment.commentable)?;
                let commenter = user_name(store, comment.user_id);
                let label = match comment.commentable {
                    Commentable::Project(_) => "Project",
                    Commentable::Task(_) => "Task",
                };
                Job {
                    recipient_id,
                    kind: NotificationKind::NewComment,
                    data: json!({
                        "comment_id": comment.id,
                        "commenter_id": comment.user_id,
                        "commenter_name": commenter,
                        "commentable_type": comment.commentable.kind(),
                        "commentable_id": comment.commentable.id(),
                        "commentable_name": on.name(),
                        "message": format!(
                            "New comment from {} on {}: {}",
                            commenter,
                            comment.commentable.kind(),
                            on.name()
                        ),
                    }),
                    mail: Some(MailMessage {
                        to: recipient.email.clone(),
                        subject: format!("New Comment on {}: {}", label, on.name()),
                        body: format!(
                            "Hello {},\n\n{} commented on {} '{}':\n\n{}",
                            recipient.name,
                            commenter,
                            comment.commentable.kind(),
                            on.name(),
                            comment.content
                        ),
                    }),
                }
            }

            DomainEvent::ProjectCompleted {
                project_id,
                completer_id,
            } => {
                let project = store.get_project(project_id)?;
                let completer = user_name(store, completer_id);
                Job {
                    recipient_id,
                    kind: NotificationKind::ProjectCompleted,
                    data: json!({
                        "project_id": project.id,
                        "project_name": project.name,
                        "completed_by": completer,
                        "message": format!("Project '{}' has been completed by {}.", project.name, completer),
                    }),
                    mail: None,
                }
            }
        };
        Some(job)
    }
}

/// Enqueues one job per derived recipient and returns how many were queued.
pub fn dispatch(queue: &mut dyn JobQueue, store: &Store, event: &DomainEvent) -> usize {
    let recipients = event.recipients(store);
    if recipients.is_empty() {
        warn!(event = event.name(), "no recipients for event");
        return 0;
    }

    let mut queued = 0;
    for recipient_id in recipients {
        match event.render(store, recipient_id) {
            Some(job) => {
                queue.push(job);
                queued += 1;
            }
            None => warn!(event = event.name(), recipient_id, "skipping unknown recipient"),
        }
    }
    debug!(event = event.name(), queued, "event dispatched");
    queued
}
