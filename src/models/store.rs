use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{
    AttachmentId, CommentId, ProjectId, TaskId, TeamId, UserId,
    attachment::{Attachable, Attachment},
    comment::{Comment, Commentable},
    notification::Notification,
    project::{Project, ProjectMember, ProjectRole},
    task::Task,
    team::{Team, TeamMember, TeamRole},
    user::{AccessToken, User},
};

/// Current schema version
pub const CURRENT_VERSION: u32 = 1;

/// Last id handed out per table. Ids are never reused.
#[derive(Serialize, Deserialize, Default, Clone, Debug)]
pub struct Sequences {
    pub users: u64,
    pub teams: u64,
    pub projects: u64,
    pub tasks: u64,
    pub comments: u64,
    pub attachments: u64,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Store {
    pub version: u32,
    #[serde(default)]
    pub sequences: Sequences,
    #[serde(default)]
    pub users: BTreeMap<UserId, User>,
    #[serde(default)]
    pub tokens: Vec<AccessToken>,
    #[serde(default)]
    pub teams: BTreeMap<TeamId, Team>,
    #[serde(default)]
    pub team_members: Vec<TeamMember>,
    #[serde(default)]
    pub projects: BTreeMap<ProjectId, Project>,
    #[serde(default)]
    pub project_members: Vec<ProjectMember>,
    #[serde(default)]
    pub tasks: BTreeMap<TaskId, Task>,
    #[serde(default)]
    pub comments: BTreeMap<CommentId, Comment>,
    #[serde(default)]
    pub attachments: BTreeMap<AttachmentId, Attachment>,
    #[serde(default)]
    pub notifications: Vec<Notification>,
}

impl Default for Store {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            sequences: Sequences::default(),
            users: BTreeMap::new(),
            tokens: vec![],
            teams: BTreeMap::new(),
            team_members: vec![],
            projects: BTreeMap::new(),
            project_members: vec![],
            tasks: BTreeMap::new(),
            comments: BTreeMap::new(),
            attachments: BTreeMap::new(),
            notifications: vec![],
        }
    }
}

/// A resolved comment target.
#[derive(Clone, Copy, Debug)]
pub enum CommentableRef<'a> {
    Project(&'a Project),
    Task(&'a Task),
}

impl CommentableRef<'_> {
    pub fn name(&self) -> &str {
        match self {
            CommentableRef::Project(project) => &project.name,
            CommentableRef::Task(task) => &task.name,
        }
    }
}

/// A resolved attachment target.
#[derive(Clone, Copy, Debug)]
pub enum AttachableRef<'a> {
    Project(&'a Project),
    Task(&'a Task),
    Comment(&'a Comment),
}

/// What a cascading removal took with it. Attachments are returned whole so
/// the caller can release their stored files.
#[derive(Default, Debug)]
pub struct Removed {
    pub projects: Vec<ProjectId>,
    pub tasks: Vec<TaskId>,
    pub comments: Vec<CommentId>,
    pub attachments: Vec<Attachment>,
}

impl Removed {
    fn absorb(&mut self, other: Removed) {
        self.projects.extend(other.projects);
        self.tasks.extend(other.tasks);
        self.comments.extend(other.comments);
        self.attachments.extend(other.attachments);
    }
}

impl Store {
    // Users and credentials

    pub fn add_user(&mut self, mut user: User) -> UserId {
        self.sequences.users += 1;
        user.id = self.sequences.users;
        let id = user.id;
        self.users.insert(id, user);
        id
    }

    pub fn get_user(&self, id: UserId) -> Option<&User> {
        self.users.get(&id)
    }

    pub fn find_user_by_email(&self, email: &str) -> Option<&User> {
        self.users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
    }

    pub fn add_token(&mut self, token: AccessToken) {
        self.tokens.push(token);
    }

    pub fn find_token(&self, token: &str) -> Option<&AccessToken> {
        self.tokens.iter().find(|t| t.token == token)
    }

    pub fn revoke_token(&mut self, token: &str) -> bool {
        let before = self.tokens.len();
        self.tokens.retain(|t| t.token != token);
        before != self.tokens.len()
    }

    pub fn revoke_tokens_for(&mut self, user_id: UserId) -> usize {
        let before = self.tokens.len();
        self.tokens.retain(|t| t.user_id != user_id);
        before - self.tokens.len()
    }

    // Teams

    pub fn add_team(&mut self, mut team: Team) -> TeamId {
        self.sequences.teams += 1;
        team.id = self.sequences.teams;
        let id = team.id;
        self.teams.insert(id, team);
        id
    }

    pub fn get_team(&self, id: TeamId) -> Option<&Team> {
        self.teams.get(&id)
    }

    pub fn get_team_mut(&mut self, id: TeamId) -> Option<&mut Team> {
        self.teams.get_mut(&id)
    }

    pub fn find_team_by_slug(&self, slug: &str) -> Option<&Team> {
        self.teams.values().find(|t| t.slug == slug)
    }

    pub fn owned_teams(&self, user_id: UserId) -> impl Iterator<Item = &Team> {
        self.teams.values().filter(move |t| t.owner_id == user_id)
    }

    /// Teams the user holds a membership edge in, whatever the role.
    pub fn member_teams(&self, user_id: UserId) -> impl Iterator<Item = &Team> {
        self.team_members
            .iter()
            .filter(move |m| m.user_id == user_id)
            .filter_map(|m| self.teams.get(&m.team_id))
    }

    pub fn team_members(&self, team_id: TeamId) -> impl Iterator<Item = &TeamMember> {
        self.team_members.iter().filter(move |m| m.team_id == team_id)
    }

    pub fn team_member(&self, team_id: TeamId, user_id: UserId) -> Option<&TeamMember> {
        self.team_members
            .iter()
            .find(|m| m.team_id == team_id && m.user_id == user_id)
    }

    pub fn team_member_mut(&mut self, team_id: TeamId, user_id: UserId) -> Option<&mut TeamMember> {
        self.team_members
            .iter_mut()
            .find(|m| m.team_id == team_id && m.user_id == user_id)
    }

    pub fn add_team_member(&mut self, member: TeamMember) {
        self.team_members.push(member);
    }

    pub fn remove_team_member(&mut self, team_id: TeamId, user_id: UserId) -> bool {
        let before = self.team_members.len();
        self.team_members
            .retain(|m| !(m.team_id == team_id && m.user_id == user_id));
        before != self.team_members.len()
    }

    pub fn owns_team(&self, user_id: UserId, team_id: TeamId) -> bool {
        self.get_team(team_id).is_some_and(|t| t.owner_id == user_id)
    }

    pub fn is_team_member(&self, user_id: UserId, team_id: TeamId) -> bool {
        self.team_member(team_id, user_id).is_some()
    }

    pub fn has_team_role(&self, user_id: UserId, team_id: TeamId, role: TeamRole) -> bool {
        self.team_member(team_id, user_id).is_some_and(|m| m.role == role)
    }

    pub fn owns_any_team(&self, user_id: UserId) -> bool {
        self.owned_teams(user_id).next().is_some()
    }

    pub fn is_team_admin_anywhere(&self, user_id: UserId) -> bool {
        self.team_members
            .iter()
            .any(|m| m.user_id == user_id && m.role == TeamRole::TeamAdmin)
    }

    // Projects

    pub fn add_project(&mut self, mut project: Project) -> ProjectId {
        self.sequences.projects += 1;
        project.id = self.sequences.projects;
        let id = project.id;
        self.projects.insert(id, project);
        id
    }

    pub fn get_project(&self, id: ProjectId) -> Option<&Project> {
        self.projects.get(&id)
    }

    pub fn get_project_mut(&mut self, id: ProjectId) -> Option<&mut Project> {
        self.projects.get_mut(&id)
    }

    pub fn team_projects(&self, team_id: TeamId) -> impl Iterator<Item = &Project> {
        self.projects.values().filter(move |p| p.team_id == team_id)
    }

    pub fn project_members(&self, project_id: ProjectId) -> impl Iterator<Item = &ProjectMember> {
        self.project_members
            .iter()
            .filter(move |m| m.project_id == project_id)
    }

    pub fn project_member(&self, project_id: ProjectId, user_id: UserId) -> Option<&ProjectMember> {
        self.project_members
            .iter()
            .find(|m| m.project_id == project_id && m.user_id == user_id)
    }

    pub fn project_member_mut(
        &mut self,
        project_id: ProjectId,
        user_id: UserId,
    ) -> Option<&mut ProjectMember> {
        self.project_members
            .iter_mut()
            .find(|m| m.project_id == project_id && m.user_id == user_id)
    }

    pub fn add_project_member(&mut self, member: ProjectMember) {
        self.project_members.push(member);
    }

    pub fn remove_project_member(&mut self, project_id: ProjectId, user_id: UserId) -> bool {
        let before = self.project_members.len();
        self.project_members
            .retain(|m| !(m.project_id == project_id && m.user_id == user_id));
        before != self.project_members.len()
    }

    pub fn is_project_member(&self, user_id: UserId, project_id: ProjectId) -> bool {
        self.project_member(project_id, user_id).is_some()
    }

    pub fn has_project_role(&self, user_id: UserId, project_id: ProjectId, role: ProjectRole) -> bool {
        self.project_member(project_id, user_id)
            .is_some_and(|m| m.role == role)
    }

    pub fn project_managers(&self, project_id: ProjectId) -> impl Iterator<Item = &ProjectMember> {
        self.project_members(project_id)
            .filter(|m| m.role == ProjectRole::ProjectManager)
    }

    /// Owner of the team the project belongs to.
    pub fn project_team_owner(&self, project: &Project) -> Option<UserId> {
        self.get_team(project.team_id).map(|t| t.owner_id)
    }

    // Tasks

    pub fn add_task(&mut self, mut task: Task) -> TaskId {
        self.sequences.tasks += 1;
        task.id = self.sequences.tasks;
        let id = task.id;
        self.tasks.insert(id, task);
        id
    }

    pub fn get_task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(&id)
    }

    pub fn get_task_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        self.tasks.get_mut(&id)
    }

    pub fn project_tasks(&self, project_id: ProjectId) -> impl Iterator<Item = &Task> {
        self.tasks.values().filter(move |t| t.project_id == project_id)
    }

    // Comments

    pub fn add_comment(&mut self, mut comment: Comment) -> CommentId {
        self.sequences.comments += 1;
        comment.id = self.sequences.comments;
        let id = comment.id;
        self.comments.insert(id, comment);
        id
    }

    pub fn get_comment(&self, id: CommentId) -> Option<&Comment> {
        self.comments.get(&id)
    }

    pub fn get_comment_mut(&mut self, id: CommentId) -> Option<&mut Comment> {
        self.comments.get_mut(&id)
    }

    pub fn comments_on(&self, commentable: Commentable) -> impl Iterator<Item = &Comment> {
        self.comments
            .values()
            .filter(move |c| c.commentable == commentable)
    }

    // Attachments

    pub fn add_attachment(&mut self, mut attachment: Attachment) -> AttachmentId {
        self.sequences.attachments += 1;
        attachment.id = self.sequences.attachments;
        let id = attachment.id;
        self.attachments.insert(id, attachment);
        id
    }

    pub fn get_attachment(&self, id: AttachmentId) -> Option<&Attachment> {
        self.attachments.get(&id)
    }

    pub fn get_attachment_mut(&mut self, id: AttachmentId) -> Option<&mut Attachment> {
        self.attachments.get_mut(&id)
    }

    pub fn attachments_on(&self, attachable: Attachable) -> impl Iterator<Item = &Attachment> {
        self.attachments
            .values()
            .filter(move |a| a.attachable == attachable)
    }

    // Notifications

    pub fn add_notification(&mut self, notification: Notification) {
        self.notifications.push(notification);
    }

    pub fn get_notification(&self, id: Uuid) -> Option<&Notification> {
        self.notifications.iter().find(|n| n.id == id)
    }

    pub fn get_notification_mut(&mut self, id: Uuid) -> Option<&mut Notification> {
        self.notifications.iter_mut().find(|n| n.id == id)
    }

    pub fn user_notifications(&self, user_id: UserId) -> impl Iterator<Item = &Notification> {
        self.notifications.iter().filter(move |n| n.user_id == user_id)
    }

    pub fn remove_notification(&mut self, id: Uuid) -> bool {
        let before = self.notifications.len();
        self.notifications.retain(|n| n.id != id);
        before != self.notifications.len()
    }

    // Polymorphic targets

    pub fn resolve_commentable(&self, commentable: Commentable) -> Option<CommentableRef<'_>> {
        match commentable {
            Commentable::Project(id) => self.get_project(id).map(CommentableRef::Project),
            Commentable::Task(id) => self.get_task(id).map(CommentableRef::Task),
        }
    }

    pub fn resolve_attachable(&self, attachable: Attachable) -> Option<AttachableRef<'_>> {
        match attachable {
            Attachable::Project(id) => self.get_project(id).map(AttachableRef::Project),
            Attachable::Task(id) => self.get_task(id).map(AttachableRef::Task),
            Attachable::Comment(id) => self.get_comment(id).map(AttachableRef::Comment),
        }
    }

    /// The project a comment target lives in.
    pub fn commentable_project(&self, commentable: Commentable) -> Option<&Project> {
        match self.resolve_commentable(commentable)? {
            CommentableRef::Project(project) => Some(project),
            CommentableRef::Task(task) => self.get_project(task.project_id),
        }
    }

    /// The project an attachment target lives in.
    pub fn attachable_project(&self, attachable: Attachable) -> Option<&Project> {
        match self.resolve_attachable(attachable)? {
            AttachableRef::Project(project) => Some(project),
            AttachableRef::Task(task) => self.get_project(task.project_id),
            AttachableRef::Comment(comment) => self.commentable_project(comment.commentable),
        }
    }

    // Cascading removal

    pub fn remove_attachment(&mut self, id: AttachmentId) -> Option<Attachment> {
        self.attachments.remove(&id)
    }

    fn remove_attachments_on(&mut self, attachable: Attachable) -> Vec<Attachment> {
        let ids: Vec<AttachmentId> = self.attachments_on(attachable).map(|a| a.id).collect();
        ids.into_iter()
            .filter_map(|id| self.attachments.remove(&id))
            .collect()
    }

    pub fn remove_comment(&mut self, id: CommentId) -> Removed {
        let mut removed = Removed::default();
        if self.comments.remove(&id).is_some() {
            removed.comments.push(id);
            removed.attachments = self.remove_attachments_on(Attachable::Comment(id));
        }
        removed
    }

    fn remove_comments_on(&mut self, commentable: Commentable) -> Removed {
        let ids: Vec<CommentId> = self.comments_on(commentable).map(|c| c.id).collect();
        let mut removed = Removed::default();
        for id in ids {
            removed.absorb(self.remove_comment(id));
        }
        removed
    }

    pub fn remove_task(&mut self, id: TaskId) -> Removed {
        let mut removed = Removed::default();
        if self.tasks.remove(&id).is_none() {
            return removed;
        }
        removed.tasks.push(id);
        removed.absorb(self.remove_comments_on(Commentable::Task(id)));
        removed
            .attachments
            .extend(self.remove_attachments_on(Attachable::Task(id)));
        removed
    }

    pub fn remove_project(&mut self, id: ProjectId) -> Removed {
        let mut removed = Removed::default();
        if self.projects.remove(&id).is_none() {
            return removed;
        }
        removed.projects.push(id);
        let task_ids: Vec<TaskId> = self.project_tasks(id).map(|t| t.id).collect();
        for task_id in task_ids {
            removed.absorb(self.remove_task(task_id));
        }
        removed.absorb(self.remove_comments_on(Commentable::Project(id)));
        removed
            .attachments
            .extend(self.remove_attachments_on(Attachable::Project(id)));
        self.project_members.retain(|m| m.project_id != id);
        removed
    }

    pub fn remove_team(&mut self, id: TeamId) -> Removed {
        let mut removed = Removed::default();
        if self.teams.remove(&id).is_none() {
            return removed;
        }
        let project_ids: Vec<ProjectId> = self.team_projects(id).map(|p| p.id).collect();
        for project_id in project_ids {
            removed.absorb(self.remove_project(project_id));
        }
        self.team_members.retain(|m| m.team_id != id);
        removed
    }
}
