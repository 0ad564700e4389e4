use std::collections::BTreeSet;

use jiff::{Timestamp, civil::Date};
use tracing::info;

use crate::{
    cache::{self, project_detail_key},
    events::DomainEvent,
    models::{
        ProjectId, TeamId, UserId,
        project::{Project, ProjectDetail, ProjectMember, ProjectRole, ProjectStatus, ProjectSummary},
        store::Store,
        user::User,
    },
    policy::{Action, Target},
    services::{
        Context, ServiceError, authorize, due_date_not_past, max_length, project_viewers,
        release_files, required, team_viewers, views,
    },
};

const ALREADY_MEMBER: &str = "User is already a member of this project.";
const NOT_MEMBER: &str = "User is not a member of this project.";
const SOLE_MANAGER_REMOVAL: &str =
    "Cannot remove the sole project manager. Assign another manager first or delete the project.";
const SOLE_MANAGER_DEMOTION: &str =
    "Cannot demote the sole project manager. Assign another manager first.";

fn find_project(store: &Store, project_id: ProjectId) -> Result<Project, ServiceError> {
    store
        .get_project(project_id)
        .cloned()
        .ok_or_else(|| ServiceError::not_found("Project", project_id))
}

/// Projects the user reaches through membership, authorship, team ownership
/// or team membership, each once.
pub(crate) fn accessible_project_ids(store: &Store, user_id: UserId) -> BTreeSet<ProjectId> {
    let mut ids: BTreeSet<ProjectId> = store
        .project_members
        .iter()
        .filter(|m| m.user_id == user_id)
        .map(|m| m.project_id)
        .collect();
    ids.extend(
        store
            .projects
            .values()
            .filter(|p| p.created_by_user_id == user_id)
            .map(|p| p.id),
    );
    let team_ids: BTreeSet<TeamId> = store
        .owned_teams(user_id)
        .chain(store.member_teams(user_id))
        .map(|t| t.id)
        .collect();
    for team_id in team_ids {
        ids.extend(store.team_projects(team_id).map(|p| p.id));
    }
    ids
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProjectFilter {
    #[default]
    All,
    /// Anything not completed
    Active,
    Status(ProjectStatus),
}

impl ProjectFilter {
    fn matches(&self, project: &Project) -> bool {
        match self {
            ProjectFilter::All => true,
            ProjectFilter::Active => project.status != ProjectStatus::Completed,
            ProjectFilter::Status(status) => project.status == *status,
        }
    }
}

pub fn list_projects(
    ctx: &Context<'_>,
    actor: &User,
    filter: ProjectFilter,
) -> Result<Vec<ProjectSummary>, ServiceError> {
    let store = &*ctx.store;
    let ids: Vec<ProjectId> = if actor.is_admin() {
        store.projects.keys().copied().collect()
    } else {
        accessible_project_ids(store, actor.id).into_iter().collect()
    };
    Ok(ids
        .into_iter()
        .filter_map(|id| store.get_project(id))
        .filter(|p| filter.matches(p))
        .map(|p| views::project_summary(store, p))
        .collect())
}

/// Detail view, memoized per (project, viewer) for non-admins.
pub fn show_project(
    ctx: &mut Context<'_>,
    actor: &User,
    project_id: ProjectId,
) -> Result<ProjectDetail, ServiceError> {
    let project = find_project(ctx.store, project_id)?;
    authorize(ctx.store, actor, Action::View, Target::Project(&project))?;
    let store = &*ctx.store;
    if actor.is_admin() {
        return Ok(views::project_detail(store, &project));
    }
    cache::remember(
        ctx.cache,
        &project_detail_key(project_id, actor.id),
        ctx.settings.project_detail_ttl(),
        || Ok::<_, ServiceError>(views::project_detail(store, &project)),
    )
}

#[derive(Debug, Clone)]
pub struct ProjectMemberParameters {
    pub user_id: UserId,
    pub role: ProjectRole,
}

pub struct CreateProjectParameters {
    pub team_id: TeamId,
    pub name: String,
    pub description: Option<String>,
    pub status: Option<ProjectStatus>,
    pub due_date: Option<Date>,
    /// Joined next to the creator, who always becomes a project manager
    pub members: Vec<ProjectMemberParameters>,
}

pub fn create_project(
    ctx: &mut Context<'_>,
    actor: &User,
    parameters: CreateProjectParameters,
) -> Result<ProjectDetail, ServiceError> {
    let team = ctx
        .store
        .get_team(parameters.team_id)
        .cloned()
        .ok_or_else(|| ServiceError::not_found("Team", parameters.team_id))?;
    authorize(ctx.store, actor, Action::Create, Target::ProjectIn(&team))?;
    required("name", &parameters.name)?;
    max_length("name", &parameters.name, 255)?;
    due_date_not_past(parameters.due_date)?;
    for member in &parameters.members {
        if ctx.store.get_user(member.user_id).is_none() {
            return Err(ServiceError::not_found("User", member.user_id));
        }
    }

    let now = Timestamp::now();
    let project_id = ctx.store.add_project(Project {
        id: 0,
        team_id: team.id,
        name: parameters.name.trim().to_string(),
        description: parameters.description,
        status: parameters.status.unwrap_or_default(),
        due_date: parameters.due_date,
        created_by_user_id: actor.id,
        created_at: now,
        updated_at: now,
    });
    ctx.store.add_project_member(ProjectMember {
        project_id,
        user_id: actor.id,
        role: ProjectRole::ProjectManager,
        joined_at: now,
    });
    for member in parameters.members {
        if ctx.store.is_project_member(member.user_id, project_id) {
            continue;
        }
        ctx.store.add_project_member(ProjectMember {
            project_id,
            user_id: member.user_id,
            role: member.role,
            joined_at: now,
        });
    }
    ctx.save()?;
    info!(project_id, team_id = team.id, user_id = actor.id, "project created");

    let mut viewers = team_viewers(ctx.store, team.id);
    viewers.insert(actor.id);
    ctx.forget_team_listings(&viewers);

    let project = find_project(ctx.store, project_id)?;
    Ok(views::project_detail(ctx.store, &project))
}

#[derive(Default)]
pub struct UpdateProjectParameters {
    pub name: Option<String>,
    /// `Some(None)` clears the description
    pub description: Option<Option<String>>,
    pub status: Option<ProjectStatus>,
    pub due_date: Option<Option<Date>>,
}

/// Drops cached views that show the project, for `extra` users as well as
/// everyone currently related to it.
fn forget_project_views(ctx: &mut Context<'_>, project: &Project, extra: &[UserId]) {
    let mut viewers = project_viewers(ctx.store, project.id);
    viewers.extend(extra.iter().copied());
    ctx.forget_project_detail(project.id, &viewers);

    let mut listing_viewers = team_viewers(ctx.store, project.team_id);
    listing_viewers.extend(extra.iter().copied());
    ctx.forget_team_listings(&listing_viewers);
}

pub fn update_project(
    ctx: &mut Context<'_>,
    actor: &User,
    project_id: ProjectId,
    parameters: UpdateProjectParameters,
) -> Result<ProjectDetail, ServiceError> {
    let before = find_project(ctx.store, project_id)?;
    authorize(ctx.store, actor, Action::Update, Target::Project(&before))?;
    if let Some(name) = &parameters.name {
        required("name", name)?;
        max_length("name", name, 255)?;
    }
    if let Some(due_date) = parameters.due_date {
        due_date_not_past(due_date)?;
    }

    let Some(project) = ctx.store.get_project_mut(project_id) else {
        return Err(ServiceError::not_found("Project", project_id));
    };
    if let Some(name) = parameters.name {
        project.name = name.trim().to_string();
    }
    if let Some(description) = parameters.description {
        project.description = description;
    }
    if let Some(status) = parameters.status {
        project.status = status;
    }
    if let Some(due_date) = parameters.due_date {
        project.due_date = due_date;
    }
    project.updated_at = Timestamp::now();
    let after = project.clone();
    ctx.save()?;
    info!(project_id, user_id = actor.id, "project updated");

    if before.status != ProjectStatus::Completed && after.status == ProjectStatus::Completed {
        info!(project_id, "project completed");
        ctx.raise(DomainEvent::ProjectCompleted {
            project_id,
            completer_id: actor.id,
        });
    }
    forget_project_views(ctx, &after, &[actor.id]);

    Ok(views::project_detail(ctx.store, &after))
}

/// Deletes the project with its tasks, comments and attachments.
pub fn delete_project(
    ctx: &mut Context<'_>,
    actor: &User,
    project_id: ProjectId,
) -> Result<(), ServiceError> {
    let project = find_project(ctx.store, project_id)?;
    authorize(ctx.store, actor, Action::Delete, Target::Project(&project))?;

    // collect viewers while the memberships still exist
    forget_project_views(ctx, &project, &[actor.id]);
    let removed = ctx.store.remove_project(project_id);
    ctx.save()?;
    release_files(ctx.blobs, &removed.attachments);
    info!(
        project_id,
        user_id = actor.id,
        tasks = removed.tasks.len(),
        comments = removed.comments.len(),
        attachments = removed.attachments.len(),
        "project deleted"
    );
    Ok(())
}

pub fn add_member(
    ctx: &mut Context<'_>,
    actor: &User,
    project_id: ProjectId,
    parameters: ProjectMemberParameters,
) -> Result<ProjectDetail, ServiceError> {
    let project = find_project(ctx.store, project_id)?;
    authorize(ctx.store, actor, Action::AddMember, Target::Project(&project))?;
    if ctx.store.get_user(parameters.user_id).is_none() {
        return Err(ServiceError::not_found("User", parameters.user_id));
    }
    if ctx.store.is_project_member(parameters.user_id, project_id) {
        return Err(ServiceError::Conflict(ALREADY_MEMBER.to_string()));
    }

    ctx.store.add_project_member(ProjectMember {
        project_id,
        user_id: parameters.user_id,
        role: parameters.role,
        joined_at: Timestamp::now(),
    });
    ctx.save()?;
    info!(project_id, user_id = parameters.user_id, role = %parameters.role, "project member added");

    forget_project_views(ctx, &project, &[actor.id, parameters.user_id]);
    Ok(views::project_detail(ctx.store, &project))
}

fn manager_count(store: &Store, project_id: ProjectId) -> usize {
    store.project_managers(project_id).count()
}

pub fn update_member(
    ctx: &mut Context<'_>,
    actor: &User,
    project_id: ProjectId,
    parameters: ProjectMemberParameters,
) -> Result<ProjectDetail, ServiceError> {
    let project = find_project(ctx.store, project_id)?;
    authorize(ctx.store, actor, Action::ManageMembers, Target::Project(&project))?;
    let current = ctx
        .store
        .project_member(project_id, parameters.user_id)
        .map(|m| m.role)
        .ok_or_else(|| ServiceError::NotFound(NOT_MEMBER.to_string()))?;
    if current == ProjectRole::ProjectManager
        && parameters.role != ProjectRole::ProjectManager
        && manager_count(ctx.store, project_id) == 1
    {
        return Err(ServiceError::InvariantViolation(SOLE_MANAGER_DEMOTION.to_string()));
    }

    if let Some(member) = ctx.store.project_member_mut(project_id, parameters.user_id) {
        member.role = parameters.role;
    }
    ctx.save()?;
    info!(project_id, user_id = parameters.user_id, role = %parameters.role, "project member role updated");

    forget_project_views(ctx, &project, &[actor.id, parameters.user_id]);
    Ok(views::project_detail(ctx.store, &project))
}

pub fn remove_member(
    ctx: &mut Context<'_>,
    actor: &User,
    project_id: ProjectId,
    user_id: UserId,
) -> Result<ProjectDetail, ServiceError> {
    let project = find_project(ctx.store, project_id)?;
    authorize(ctx.store, actor, Action::ManageMembers, Target::Project(&project))?;
    let role = ctx
        .store
        .project_member(project_id, user_id)
        .map(|m| m.role)
        .ok_or_else(|| ServiceError::NotFound(NOT_MEMBER.to_string()))?;
    if role == ProjectRole::ProjectManager && manager_count(ctx.store, project_id) == 1 {
        return Err(ServiceError::InvariantViolation(SOLE_MANAGER_REMOVAL.to_string()));
    }

    forget_project_views(ctx, &project, &[actor.id, user_id]);
    ctx.store.remove_project_member(project_id, user_id);
    ctx.save()?;
    info!(project_id, user_id, "project member removed");

    Ok(views::project_detail(ctx.store, &project))
}
