use crate::models::{
    attachment::Attachment,
    store::{AttachableRef, Store},
    user::User,
};

use super::{Action, Target, evaluate};

fn target_of(on: AttachableRef<'_>) -> Target<'_> {
    match on {
        AttachableRef::Project(p) => Target::Project(p),
        AttachableRef::Task(t) => Target::Task(t),
        AttachableRef::Comment(c) => Target::Comment(c),
    }
}

/// Uploading needs update rights on whatever the file is attached to.
pub(super) fn can_create_on(store: &Store, actor: &User, on: AttachableRef<'_>) -> bool {
    evaluate(store, actor, Action::Update, target_of(on))
}

pub(super) fn can_view_on(store: &Store, actor: &User, on: AttachableRef<'_>) -> bool {
    evaluate(store, actor, Action::View, target_of(on))
}

pub(super) fn allows(store: &Store, actor: &User, action: Action, attachment: &Attachment) -> bool {
    let Some(on) = store.resolve_attachable(attachment.attachable) else {
        return false;
    };
    let uploader = attachment.user_id == actor.id;
    match action {
        Action::View => uploader || can_view_on(store, actor, on),
        Action::Create => can_create_on(store, actor, on),
        Action::Update | Action::Delete => {
            uploader || evaluate(store, actor, Action::Update, target_of(on))
        }
        Action::Restore | Action::AddMember | Action::ManageMembers => false,
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use crate::{
        models::{
            attachment::{Attachable, Attachment},
            store::AttachableRef,
        },
        policy::{Action, Target, can, fixtures::World},
    };

    fn attachment(user_id: u64, attachable: Attachable) -> Attachment {
        Attachment {
            id: 1,
            user_id,
            attachable,
            disk: "local".to_string(),
            path: "attachments/spec.pdf".to_string(),
            file_name: "plan.pdf".to_string(),
            file_size: 10,
            mime_type: "application/pdf".to_string(),
            created_at: jiff::Timestamp::UNIX_EPOCH,
            updated_at: jiff::Timestamp::UNIX_EPOCH,
        }
    }

    #[rstest]
    #[case("project_member", true, false)]
    #[case("project_pm", true, true)]
    #[case("team_member", true, false)]
    #[case("creator", true, true)]
    #[case("outsider", false, false)]
    fn test_project_attachment_delegates(
        #[case] who: &str,
        #[case] view: bool,
        #[case] delete: bool,
    ) {
        let world = World::new();
        let file = attachment(world.owner.id, Attachable::Project(world.project.id));
        let actor = world.user(who);
        assert_eq!(can(&world.store, actor, Action::View, Target::Attachment(&file)), view);
        assert_eq!(can(&world.store, actor, Action::Delete, Target::Attachment(&file)), delete);
    }

    #[test]
    fn test_uploader_keeps_control_of_own_file() {
        let world = World::new();
        let file = attachment(world.team_member.id, Attachable::Task(world.task.id));
        for action in [Action::View, Action::Update, Action::Delete] {
            assert!(can(&world.store, &world.team_member, action, Target::Attachment(&file)));
        }
    }

    #[test]
    fn test_comment_attachment_follows_comment_update_rule() {
        let world = World::new();
        let file = attachment(world.owner.id, Attachable::Comment(world.task_comment.id));
        // the comment author may update the comment; the assignee may only see it
        assert!(can(&world.store, &world.project_member, Action::Update, Target::Attachment(&file)));
        assert!(can(&world.store, &world.assignee, Action::View, Target::Attachment(&file)));
        assert!(!can(&world.store, &world.assignee, Action::Update, Target::Attachment(&file)));
    }

    #[test]
    fn test_upload_requires_update_on_target() {
        let world = World::new();
        let on_task = Target::AttachmentOn(AttachableRef::Task(&world.task));
        assert!(can(&world.store, &world.assignee, Action::Create, on_task));
        assert!(!can(&world.store, &world.team_member, Action::Create, on_task));
    }
}
