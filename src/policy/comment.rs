use crate::models::{
    comment::Comment,
    project::ProjectRole,
    store::{CommentableRef, Store},
    user::User,
};

use super::{Action, project, task};

pub(super) fn can_view_on(store: &Store, actor: &User, on: CommentableRef<'_>) -> bool {
    match on {
        CommentableRef::Project(p) => {
            store.is_project_member(actor.id, p.id)
                || store.owns_team(actor.id, p.team_id)
                || p.created_by_user_id == actor.id
        }
        CommentableRef::Task(t) => store
            .get_project(t.project_id)
            .is_some_and(|p| task::can_view(store, actor, t, p)),
    }
}

pub(super) fn can_create_on(store: &Store, actor: &User, on: CommentableRef<'_>) -> bool {
    let project = match on {
        CommentableRef::Project(p) => Some(p),
        CommentableRef::Task(t) => store.get_project(t.project_id),
    };
    let Some(project) = project else {
        return false;
    };
    can_view_on(store, actor, on)
        || store.has_project_role(actor.id, project.id, ProjectRole::ProjectManager)
}

pub(super) fn allows(store: &Store, actor: &User, action: Action, comment: &Comment) -> bool {
    let Some(on) = store.resolve_commentable(comment.commentable) else {
        return false;
    };
    match action {
        Action::View => can_view_on(store, actor, on),
        Action::Create => can_create_on(store, actor, on),
        Action::Update | Action::Delete => {
            comment.user_id == actor.id
                || store
                    .commentable_project(comment.commentable)
                    .is_some_and(|p| project::is_manager(store, actor, p))
        }
        Action::Restore | Action::AddMember | Action::ManageMembers => false,
    }
}
