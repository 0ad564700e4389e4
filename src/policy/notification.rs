use crate::models::{notification::Notification, user::User};

use super::Action;

/// Only the recipient touches a notification; nobody creates one by hand.
pub(super) fn allows(actor: &User, action: Action, notification: &Notification) -> bool {
    match action {
        Action::View | Action::Update | Action::Delete => notification.user_id == actor.id,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        models::notification::{Notification, NotificationKind},
        policy::{Action, Target, can, fixtures::World},
    };

    #[test]
    fn test_only_recipient_may_touch_a_notification() {
        let world = World::new();
        let notification = Notification {
            id: uuid::Uuid::new_v4(),
            user_id: world.assignee.id,
            kind: NotificationKind::TaskAssigned,
            data: serde_json::json!({"task_id": world.task.id}),
            read_at: None,
            created_at: jiff::Timestamp::UNIX_EPOCH,
        };
        let target = Target::Notification(&notification);

        for action in [Action::View, Action::Update, Action::Delete] {
            assert!(can(&world.store, &world.assignee, action, target));
            assert!(!can(&world.store, &world.owner, action, target));
        }
        assert!(!can(&world.store, &world.assignee, Action::Create, target));
    }
}
