//! Authorization engine.
//!
//! `can` answers whether an actor may perform an action on a target. The
//! admin override is checked once, here, in front of every per-entity rule
//! set; the rule sets themselves never look at the admin role. Every rule is
//! a pure function of the actor, the target and relation lookups in the
//! store.

use std::fmt;

use crate::models::{
    attachment::Attachment,
    comment::Comment,
    notification::Notification,
    project::Project,
    store::{AttachableRef, CommentableRef, Store},
    task::Task,
    team::Team,
    user::User,
};

mod attachment;
mod comment;
mod notification;
mod project;
mod task;
mod team;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    View,
    Create,
    Update,
    Delete,
    // TODO: wire up once teams and projects are soft-deleted; deletes are final for now
    Restore,
    AddMember,
    ManageMembers,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::View => "view",
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::Restore => "restore",
            Action::AddMember => "addMember",
            Action::ManageMembers => "manageMembers",
        };
        f.write_str(name)
    }
}

/// What an action is performed on. The `*In` / `*On` variants stand for a
/// not-yet-existing entity and carry the parent it would be created under.
/// `*On` also answers `View`, meaning the comments or files hanging off that
/// parent may be listed.
#[derive(Debug, Clone, Copy)]
pub enum Target<'a> {
    NewTeam,
    Team(&'a Team),
    ProjectIn(&'a Team),
    Project(&'a Project),
    TaskIn(&'a Project),
    Task(&'a Task),
    CommentOn(CommentableRef<'a>),
    Comment(&'a Comment),
    AttachmentOn(AttachableRef<'a>),
    Attachment(&'a Attachment),
    Notification(&'a Notification),
}

impl Target<'_> {
    pub fn kind(&self) -> &'static str {
        match self {
            Target::NewTeam | Target::Team(_) => "team",
            Target::ProjectIn(_) | Target::Project(_) => "project",
            Target::TaskIn(_) | Target::Task(_) => "task",
            Target::CommentOn(_) | Target::Comment(_) => "comment",
            Target::AttachmentOn(_) | Target::Attachment(_) => "attachment",
            Target::Notification(_) => "notification",
        }
    }
}

/// Global override: admins may do anything, and nothing else is evaluated.
pub fn admin_override(actor: &User) -> bool {
    actor.is_admin()
}

pub fn can(store: &Store, actor: &User, action: Action, target: Target<'_>) -> bool {
    admin_override(actor) || evaluate(store, actor, action, target)
}

/// The per-entity rule sets, without the override. Delegating rules call
/// back into this rather than `can` since the override already ran.
fn evaluate(store: &Store, actor: &User, action: Action, target: Target<'_>) -> bool {
    match target {
        Target::NewTeam => action == Action::Create && team::can_create(store, actor),
        Target::Team(t) => team::allows(store, actor, action, t),
        Target::ProjectIn(t) => action == Action::Create && project::can_create(store, actor, t),
        Target::Project(p) => project::allows(store, actor, action, p),
        Target::TaskIn(p) => action == Action::Create && task::can_create(store, actor, p),
        Target::Task(t) => task::allows(store, actor, action, t),
        Target::CommentOn(on) => match action {
            Action::View => comment::can_view_on(store, actor, on),
            Action::Create => comment::can_create_on(store, actor, on),
            _ => false,
        },
        Target::Comment(c) => comment::allows(store, actor, action, c),
        Target::AttachmentOn(on) => match action {
            Action::View => attachment::can_view_on(store, actor, on),
            Action::Create => attachment::can_create_on(store, actor, on),
            _ => false,
        },
        Target::Attachment(a) => attachment::allows(store, actor, action, a),
        Target::Notification(n) => notification::allows(actor, action, n),
    }
}
