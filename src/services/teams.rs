use std::collections::BTreeSet;

use jiff::Timestamp;
use slug::slugify;
use tracing::info;

use crate::{
    cache::{self, team_listing_key},
    models::{
        TeamId, UserId,
        store::Store,
        team::{Team, TeamMember, TeamRole, TeamView},
        user::User,
    },
    policy::{Action, Target},
    services::{
        Context, ServiceError, authorize, max_length, project_viewers, release_files, required,
        team_viewers, views,
    },
};

const NAME_TAKEN: &str = "The team name has already been taken.";
const ALREADY_MEMBER: &str = "User is already a member of this team.";
const NOT_MEMBER: &str = "User is not a member of this team.";
const OWNER_REMOVAL: &str =
    "Team owner cannot be removed as a member. Transfer ownership first or delete the team.";

fn find_team(store: &Store, team_id: TeamId) -> Result<Team, ServiceError> {
    store
        .get_team(team_id)
        .cloned()
        .ok_or_else(|| ServiceError::not_found("Team", team_id))
}

fn validate_name(store: &Store, name: &str, except: Option<TeamId>) -> Result<String, ServiceError> {
    required("name", name)?;
    max_length("name", name, 255)?;
    let slug = slugify(name);
    let taken = store
        .find_team_by_slug(&slug)
        .is_some_and(|t| Some(t.id) != except);
    if taken {
        return Err(ServiceError::Conflict(NAME_TAKEN.to_string()));
    }
    Ok(slug)
}

/// Owned teams plus teams the user is a member of, each once.
fn accessible_teams(store: &Store, user_id: UserId) -> Vec<TeamView> {
    let ids: BTreeSet<TeamId> = store
        .owned_teams(user_id)
        .chain(store.member_teams(user_id))
        .map(|t| t.id)
        .collect();
    ids.into_iter()
        .filter_map(|id| store.get_team(id))
        .map(|t| views::team_view(store, t))
        .collect()
}

pub fn list_teams(ctx: &mut Context<'_>, actor: &User) -> Result<Vec<TeamView>, ServiceError> {
    if actor.is_admin() {
        let store = &*ctx.store;
        return Ok(store.teams.values().map(|t| views::team_view(store, t)).collect());
    }
    let store = &*ctx.store;
    cache::remember(
        ctx.cache,
        &team_listing_key(actor.id),
        ctx.settings.team_listing_ttl(),
        || Ok::<_, ServiceError>(accessible_teams(store, actor.id)),
    )
}

pub fn show_team(ctx: &Context<'_>, actor: &User, team_id: TeamId) -> Result<TeamView, ServiceError> {
    let team = find_team(ctx.store, team_id)?;
    authorize(ctx.store, actor, Action::View, Target::Team(&team))?;
    Ok(views::team_view(ctx.store, &team))
}

pub struct CreateTeamParameters {
    pub name: String,
}

/// Creates a team owned by the actor, who also joins it as team admin.
pub fn create_team(
    ctx: &mut Context<'_>,
    actor: &User,
    parameters: CreateTeamParameters,
) -> Result<TeamView, ServiceError> {
    authorize(ctx.store, actor, Action::Create, Target::NewTeam)?;
    let slug = validate_name(ctx.store, &parameters.name, None)?;

    let now = Timestamp::now();
    let team_id = ctx.store.add_team(Team {
        id: 0,
        name: parameters.name.trim().to_string(),
        slug,
        owner_id: actor.id,
        created_at: now,
    });
    ctx.store.add_team_member(TeamMember {
        team_id,
        user_id: actor.id,
        role: TeamRole::TeamAdmin,
        joined_at: now,
    });
    ctx.save()?;
    info!(team_id, owner_id = actor.id, "team created");

    ctx.forget_team_listings(&BTreeSet::from([actor.id]));
    let team = find_team(ctx.store, team_id)?;
    Ok(views::team_view(ctx.store, &team))
}

pub struct UpdateTeamParameters {
    pub name: Option<String>,
}

pub fn update_team(
    ctx: &mut Context<'_>,
    actor: &User,
    team_id: TeamId,
    parameters: UpdateTeamParameters,
) -> Result<TeamView, ServiceError> {
    let team = find_team(ctx.store, team_id)?;
    authorize(ctx.store, actor, Action::Update, Target::Team(&team))?;

    if let Some(name) = parameters.name {
        let slug = validate_name(ctx.store, &name, Some(team_id))?;
        if let Some(team) = ctx.store.get_team_mut(team_id) {
            team.name = name.trim().to_string();
            team.slug = slug;
        }
    }
    ctx.save()?;
    info!(team_id, user_id = actor.id, "team updated");

    let mut viewers = team_viewers(ctx.store, team_id);
    viewers.insert(actor.id);
    ctx.forget_team_listings(&viewers);
    // project detail views embed the team
    let project_ids: Vec<_> = ctx.store.team_projects(team_id).map(|p| p.id).collect();
    for project_id in project_ids {
        let viewers = project_viewers(ctx.store, project_id);
        ctx.forget_project_detail(project_id, &viewers);
    }

    let team = find_team(ctx.store, team_id)?;
    Ok(views::team_view(ctx.store, &team))
}

/// Deletes the team with everything below it.
pub fn delete_team(ctx: &mut Context<'_>, actor: &User, team_id: TeamId) -> Result<(), ServiceError> {
    let team = find_team(ctx.store, team_id)?;
    authorize(ctx.store, actor, Action::Delete, Target::Team(&team))?;

    let mut viewers = team_viewers(ctx.store, team_id);
    viewers.insert(actor.id);
    let project_views: Vec<_> = ctx
        .store
        .team_projects(team_id)
        .map(|p| (p.id, project_viewers(ctx.store, p.id)))
        .collect();

    let removed = ctx.store.remove_team(team_id);
    ctx.save()?;
    release_files(ctx.blobs, &removed.attachments);
    info!(
        team_id,
        user_id = actor.id,
        projects = removed.projects.len(),
        tasks = removed.tasks.len(),
        "team deleted"
    );

    ctx.forget_team_listings(&viewers);
    for (project_id, viewers) in &project_views {
        ctx.forget_project_detail(*project_id, viewers);
    }
    Ok(())
}

pub struct TeamMemberParameters {
    pub user_id: UserId,
    pub role: TeamRole,
}

fn forget_membership_views(ctx: &mut Context<'_>, team_id: TeamId, actor: &User, user_id: UserId) {
    let mut viewers = team_viewers(ctx.store, team_id);
    viewers.extend([actor.id, user_id]);
    ctx.forget_team_listings(&viewers);
}

pub fn add_member(
    ctx: &mut Context<'_>,
    actor: &User,
    team_id: TeamId,
    parameters: TeamMemberParameters,
) -> Result<TeamView, ServiceError> {
    let team = find_team(ctx.store, team_id)?;
    authorize(ctx.store, actor, Action::AddMember, Target::Team(&team))?;
    if ctx.store.get_user(parameters.user_id).is_none() {
        return Err(ServiceError::not_found("User", parameters.user_id));
    }
    if ctx.store.is_team_member(parameters.user_id, team_id) {
        return Err(ServiceError::Conflict(ALREADY_MEMBER.to_string()));
    }

    ctx.store.add_team_member(TeamMember {
        team_id,
        user_id: parameters.user_id,
        role: parameters.role,
        joined_at: Timestamp::now(),
    });
    ctx.save()?;
    info!(team_id, user_id = parameters.user_id, role = %parameters.role, "team member added");

    forget_membership_views(ctx, team_id, actor, parameters.user_id);
    Ok(views::team_view(ctx.store, &team))
}

pub fn update_member(
    ctx: &mut Context<'_>,
    actor: &User,
    team_id: TeamId,
    parameters: TeamMemberParameters,
) -> Result<TeamView, ServiceError> {
    let team = find_team(ctx.store, team_id)?;
    authorize(ctx.store, actor, Action::ManageMembers, Target::Team(&team))?;
    let Some(member) = ctx.store.team_member_mut(team_id, parameters.user_id) else {
        return Err(ServiceError::NotFound(NOT_MEMBER.to_string()));
    };
    member.role = parameters.role;
    ctx.save()?;
    info!(team_id, user_id = parameters.user_id, role = %parameters.role, "team member role updated");

    forget_membership_views(ctx, team_id, actor, parameters.user_id);
    Ok(views::team_view(ctx.store, &team))
}

pub fn remove_member(
    ctx: &mut Context<'_>,
    actor: &User,
    team_id: TeamId,
    user_id: UserId,
) -> Result<TeamView, ServiceError> {
    let team = find_team(ctx.store, team_id)?;
    authorize(ctx.store, actor, Action::ManageMembers, Target::Team(&team))?;
    if team.owner_id == user_id {
        return Err(ServiceError::InvariantViolation(OWNER_REMOVAL.to_string()));
    }
    // the former member must lose the cached listing too
    forget_membership_views(ctx, team_id, actor, user_id);
    if !ctx.store.remove_team_member(team_id, user_id) {
        return Err(ServiceError::NotFound(NOT_MEMBER.to_string()));
    }
    ctx.save()?;
    info!(team_id, user_id, "team member removed");

    Ok(views::team_view(ctx.store, &team))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::user::GlobalRole,
        services::{ErrorKind, testing::Harness},
    };

    fn setup() -> (Harness, User, TeamId) {
        let mut h = Harness::new();
        let owner = h.user("olga", GlobalRole::ProjectManager);
        let team = create_team(
            &mut h.ctx(),
            &owner,
            CreateTeamParameters {
                name: "Platform Crew".to_string(),
            },
        )
        .unwrap();
        (h, owner, team.team.id)
    }

    #[test]
    fn test_create_attaches_owner_as_team_admin() {
        let (h, owner, team_id) = setup();
        let team = &h.store.teams[&team_id];
        assert_eq!(team.owner_id, owner.id);
        assert_eq!(team.slug, "platform-crew");
        assert!(h.store.has_team_role(owner.id, team_id, TeamRole::TeamAdmin));
        assert_eq!(h.storage.saves.get(), 1);
    }

    #[test]
    fn test_name_collision_is_a_conflict() {
        let (mut h, owner, _) = setup();
        let err = create_team(
            &mut h.ctx(),
            &owner,
            CreateTeamParameters {
                name: "platform crew".to_string(),
            },
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(err.to_string(), NAME_TAKEN);
    }

    #[test]
    fn test_plain_member_cannot_create_team() {
        let mut h = Harness::new();
        let nobody = h.member("nobody");
        let err = create_team(
            &mut h.ctx(),
            &nobody,
            CreateTeamParameters {
                name: "Mine".to_string(),
            },
        )
        .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized));
        assert!(h.store.teams.is_empty());
    }

    #[test]
    fn test_duplicate_member_add_is_a_conflict_and_changes_nothing() {
        let (mut h, owner, team_id) = setup();
        let dev = h.member("dev");
        let add = |role| TeamMemberParameters {
            user_id: dev.id,
            role,
        };
        add_member(&mut h.ctx(), &owner, team_id, add(TeamRole::Member)).unwrap();
        let before = h.store.team_members(team_id).count();

        let err = add_member(&mut h.ctx(), &owner, team_id, add(TeamRole::TeamAdmin)).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(err.to_string(), ALREADY_MEMBER);
        assert_eq!(h.store.team_members(team_id).count(), before);
    }

    #[test]
    fn test_owner_cannot_be_removed() {
        let (mut h, owner, team_id) = setup();
        let err = remove_member(&mut h.ctx(), &owner, team_id, owner.id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvariantViolation);
        assert_eq!(err.to_string(), OWNER_REMOVAL);
        assert!(h.store.is_team_member(owner.id, team_id));
    }

    #[test]
    fn test_update_and_remove_need_existing_membership() {
        let (mut h, owner, team_id) = setup();
        let stranger = h.member("stranger");
        let err = update_member(
            &mut h.ctx(),
            &owner,
            team_id,
            TeamMemberParameters {
                user_id: stranger.id,
                role: TeamRole::TeamAdmin,
            },
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.to_string(), NOT_MEMBER);

        let err = remove_member(&mut h.ctx(), &owner, team_id, stranger.id).unwrap_err();
        assert_eq!(err.to_string(), NOT_MEMBER);
    }

    #[test]
    fn test_listing_is_cached_and_membership_changes_invalidate_it() {
        let (mut h, owner, team_id) = setup();
        let dev = h.member("dev");
        assert!(list_teams(&mut h.ctx(), &dev).unwrap().is_empty());
        assert!(h.cache.contains(&team_listing_key(dev.id)));

        add_member(
            &mut h.ctx(),
            &owner,
            team_id,
            TeamMemberParameters {
                user_id: dev.id,
                role: TeamRole::Member,
            },
        )
        .unwrap();
        assert!(!h.cache.contains(&team_listing_key(dev.id)));
        assert_eq!(list_teams(&mut h.ctx(), &dev).unwrap().len(), 1);

        list_teams(&mut h.ctx(), &dev).unwrap();
        remove_member(&mut h.ctx(), &owner, team_id, dev.id).unwrap();
        assert!(list_teams(&mut h.ctx(), &dev).unwrap().is_empty());
    }

    #[test]
    fn test_team_admin_manages_members_but_cannot_rename() {
        let (mut h, owner, team_id) = setup();
        let lead = h.member("lead");
        let dev = h.member("dev");
        add_member(
            &mut h.ctx(),
            &owner,
            team_id,
            TeamMemberParameters {
                user_id: lead.id,
                role: TeamRole::TeamAdmin,
            },
        )
        .unwrap();

        add_member(
            &mut h.ctx(),
            &lead,
            team_id,
            TeamMemberParameters {
                user_id: dev.id,
                role: TeamRole::Member,
            },
        )
        .unwrap();
        let err = update_team(
            &mut h.ctx(),
            &lead,
            team_id,
            UpdateTeamParameters {
                name: Some("Renamed".to_string()),
            },
        )
        .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized));
    }

    #[test]
    fn test_delete_is_owner_only() {
        let (mut h, owner, team_id) = setup();
        let admin = h.user("root", GlobalRole::Admin);
        let dev = h.member("dev");
        let err = delete_team(&mut h.ctx(), &dev, team_id).unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized));

        delete_team(&mut h.ctx(), &admin, team_id).unwrap();
        assert!(h.store.teams.is_empty());
        assert!(h.store.team_members.is_empty());
        assert!(show_team(&h.ctx(), &owner, team_id).is_err());
    }
}
