//! Hydration of stored records into the views services return.

use crate::models::{
    UserId,
    attachment::{Attachable, Attachment, AttachmentView},
    comment::{Comment, CommentView, Commentable},
    project::{Project, ProjectDetail, ProjectMemberView, ProjectSummary},
    store::Store,
    task::{Task, TaskStatus, TaskView},
    team::{Team, TeamMemberView, TeamView},
    user::UserSummary,
};

pub fn user_summary(store: &Store, id: UserId) -> Option<UserSummary> {
    store.get_user(id).map(UserSummary::from)
}

pub fn team_view(store: &Store, team: &Team) -> TeamView {
    let members = store
        .team_members(team.id)
        .filter_map(|m| {
            Some(TeamMemberView {
                user: user_summary(store, m.user_id)?,
                role: m.role,
            })
        })
        .collect();
    TeamView {
        team: team.clone(),
        owner: user_summary(store, team.owner_id),
        members,
        projects: store.team_projects(team.id).cloned().collect(),
    }
}

fn project_members(store: &Store, project: &Project) -> Vec<ProjectMemberView> {
    store
        .project_members(project.id)
        .filter_map(|m| {
            Some(ProjectMemberView {
                user: user_summary(store, m.user_id)?,
                role: m.role,
            })
        })
        .collect()
}

pub fn project_summary(store: &Store, project: &Project) -> ProjectSummary {
    ProjectSummary {
        project: project.clone(),
        team: store.get_team(project.team_id).cloned(),
        members: project_members(store, project),
        tasks_count: store.project_tasks(project.id).count(),
        comments_count: store.comments_on(Commentable::Project(project.id)).count(),
    }
}

pub fn project_detail(store: &Store, project: &Project) -> ProjectDetail {
    let tasks: Vec<TaskView> = store
        .project_tasks(project.id)
        .map(|t| task_view(store, t))
        .collect();
    let comments: Vec<CommentView> = store
        .comments_on(Commentable::Project(project.id))
        .map(|c| comment_view(store, c))
        .collect();
    let completed_tasks_count = tasks
        .iter()
        .filter(|t| t.task.status == TaskStatus::Completed)
        .count();

    ProjectDetail {
        project: project.clone(),
        team: store.get_team(project.team_id).cloned(),
        team_owner: store
            .project_team_owner(project)
            .and_then(|id| user_summary(store, id)),
        creator: user_summary(store, project.created_by_user_id),
        members: project_members(store, project),
        attachments: store
            .attachments_on(Attachable::Project(project.id))
            .map(|a| attachment_view(store, a))
            .collect(),
        tasks_count: tasks.len(),
        comments_count: comments.len(),
        completed_tasks_count,
        tasks,
        comments,
    }
}

pub fn task_view(store: &Store, task: &Task) -> TaskView {
    TaskView {
        task: task.clone(),
        project: store.get_project(task.project_id).cloned(),
        assignee: task
            .assigned_to_user_id
            .and_then(|id| user_summary(store, id)),
        comments_count: store.comments_on(Commentable::Task(task.id)).count(),
    }
}

pub fn comment_view(store: &Store, comment: &Comment) -> CommentView {
    CommentView {
        comment: comment.clone(),
        author: user_summary(store, comment.user_id),
    }
}

pub fn attachment_view(store: &Store, attachment: &Attachment) -> AttachmentView {
    AttachmentView {
        attachment: attachment.clone(),
        uploader: user_summary(store, attachment.user_id),
    }
}
