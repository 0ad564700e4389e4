use crate::models::{
    store::Store,
    team::{Team, TeamRole},
    user::{GlobalRole, User},
};

use super::Action;

pub(super) fn can_create(store: &Store, actor: &User) -> bool {
    actor.has_role(GlobalRole::ProjectManager)
        || store.owns_any_team(actor.id)
        || store.is_team_admin_anywhere(actor.id)
}

pub(super) fn allows(store: &Store, actor: &User, action: Action, team: &Team) -> bool {
    let owns = team.owner_id == actor.id;
    match action {
        Action::View => owns || store.is_team_member(actor.id, team.id),
        Action::Create => can_create(store, actor),
        Action::Update | Action::Delete | Action::Restore => owns,
        Action::AddMember | Action::ManageMembers => {
            owns || store.has_team_role(actor.id, team.id, TeamRole::TeamAdmin)
        }
    }
}
