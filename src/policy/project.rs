use crate::models::{
    project::{Project, ProjectRole},
    store::Store,
    team::Team,
    user::{GlobalRole, User},
};

use super::Action;

/// The actor may create projects at all, and `team` takes them.
pub(super) fn can_create(store: &Store, actor: &User, team: &Team) -> bool {
    let may_create = actor.has_role(GlobalRole::ProjectManager) || store.owns_any_team(actor.id);
    let team_accepts = team.owner_id == actor.id || store.is_team_member(actor.id, team.id);
    may_create && team_accepts
}

/// Global manager role, team ownership, project manager role or authorship.
pub(super) fn is_manager(store: &Store, actor: &User, project: &Project) -> bool {
    actor.has_role(GlobalRole::ProjectManager)
        || store.owns_team(actor.id, project.team_id)
        || store.has_project_role(actor.id, project.id, ProjectRole::ProjectManager)
        || project.created_by_user_id == actor.id
}

pub(super) fn allows(store: &Store, actor: &User, action: Action, project: &Project) -> bool {
    match action {
        Action::View => {
            project.created_by_user_id == actor.id
                || store.owns_team(actor.id, project.team_id)
                || store.is_team_member(actor.id, project.team_id)
                || store.is_project_member(actor.id, project.id)
        }
        Action::Create => store
            .get_team(project.team_id)
            .is_some_and(|team| can_create(store, actor, team)),
        Action::Update | Action::Delete | Action::AddMember | Action::ManageMembers => {
            is_manager(store, actor, project)
        }
        Action::Restore => store.owns_team(actor.id, project.team_id),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use crate::policy::{Action, Target, can, fixtures::World};

    #[rstest]
    #[case("global_pm", true)]
    #[case("owner", true)]
    #[case("project_pm", true)]
    #[case("creator", true)]
    #[case("team_admin", false)]
    #[case("project_member", false)]
    #[case("outsider", false)]
    fn test_manager_tier_actions(#[case] who: &str, #[case] expected: bool) {
        let world = World::new();
        let actor = world.user(who);
        for action in [Action::Update, Action::Delete, Action::AddMember, Action::ManageMembers] {
            assert_eq!(
                can(&world.store, actor, action, Target::Project(&world.project)),
                expected,
                "{who} {action}"
            );
        }
    }

    #[rstest]
    #[case("owner", true)]
    #[case("global_pm", false)]
    #[case("team_member", true)]
    #[case("outsider", false)]
    fn test_create_requires_role_and_an_accepting_team(#[case] who: &str, #[case] expected: bool) {
        let mut world = World::new();
        // team_member holds the global manager role only in this test
        if let Some(user) = world.store.users.get_mut(&world.team_member.id) {
            user.role = crate::models::user::GlobalRole::ProjectManager;
        }
        let actor = world.store.users[&world.user(who).id].clone();
        assert_eq!(
            can(&world.store, &actor, Action::Create, Target::ProjectIn(&world.team)),
            expected
        );
    }
}
