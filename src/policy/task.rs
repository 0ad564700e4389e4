use crate::models::{
    project::Project,
    store::Store,
    task::Task,
    user::{GlobalRole, User},
};

use super::{Action, project::is_manager};

pub(super) fn can_create(store: &Store, actor: &User, project: &Project) -> bool {
    actor.has_role(GlobalRole::ProjectManager)
        || store.owns_team(actor.id, project.team_id)
        || store.is_project_member(actor.id, project.id)
}

pub(super) fn can_view(store: &Store, actor: &User, task: &Task, project: &Project) -> bool {
    store.is_project_member(actor.id, project.id)
        || store.owns_team(actor.id, project.team_id)
        || project.created_by_user_id == actor.id
        || task.assigned_to_user_id == Some(actor.id)
}

pub(super) fn can_update(store: &Store, actor: &User, task: &Task, project: &Project) -> bool {
    actor.has_role(GlobalRole::ProjectManager)
        || store.owns_team(actor.id, project.team_id)
        || store.is_project_member(actor.id, project.id)
        || task.assigned_to_user_id == Some(actor.id)
}

pub(super) fn allows(store: &Store, actor: &User, action: Action, task: &Task) -> bool {
    let Some(project) = store.get_project(task.project_id) else {
        return false;
    };
    match action {
        Action::View => can_view(store, actor, task, project),
        Action::Create => can_create(store, actor, project),
        Action::Update => can_update(store, actor, task, project),
        Action::Delete => is_manager(store, actor, project),
        Action::Restore => store.owns_team(actor.id, project.team_id),
        Action::AddMember | Action::ManageMembers => false,
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use crate::policy::{Action, Target, can, fixtures::World};

    #[rstest]
    #[case("project_member", true)]
    #[case("project_pm", true)]
    #[case("owner", true)]
    #[case("creator", true)]
    #[case("assignee", true)]
    #[case("team_member", false)]
    #[case("global_pm", false)]
    #[case("outsider", false)]
    fn test_view(#[case] who: &str, #[case] expected: bool) {
        let world = World::new();
        let actor = world.user(who);
        assert_eq!(can(&world.store, actor, Action::View, Target::Task(&world.task)), expected);
    }

    #[rstest]
    #[case("global_pm", true)]
    #[case("owner", true)]
    #[case("project_member", true)]
    #[case("assignee", true)]
    #[case("creator", false)]
    #[case("team_member", false)]
    fn test_update(#[case] who: &str, #[case] expected: bool) {
        let world = World::new();
        let actor = world.user(who);
        assert_eq!(can(&world.store, actor, Action::Update, Target::Task(&world.task)), expected);
    }

    #[rstest]
    #[case("global_pm", true)]
    #[case("owner", true)]
    #[case("project_pm", true)]
    #[case("creator", true)]
    #[case("project_member", false)]
    #[case("assignee", false)]
    fn test_delete(#[case] who: &str, #[case] expected: bool) {
        let world = World::new();
        let actor = world.user(who);
        assert_eq!(can(&world.store, actor, Action::Delete, Target::Task(&world.task)), expected);
    }

    #[rstest]
    #[case("project_member", true)]
    #[case("owner", true)]
    #[case("global_pm", true)]
    #[case("creator", false)]
    #[case("outsider", false)]
    fn test_create_in_project(#[case] who: &str, #[case] expected: bool) {
        let world = World::new();
        let actor = world.user(who);
        assert_eq!(
            can(&world.store, actor, Action::Create, Target::TaskIn(&world.project)),
            expected
        );
    }
}
