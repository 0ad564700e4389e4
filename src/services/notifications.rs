use jiff::Timestamp;
use tracing::info;
use uuid::Uuid;

use crate::{
    models::{notification::Notification, store::Store, user::User},
    policy::{Action, Target},
    services::{Context, ServiceError, authorize},
};

fn find_notification(store: &Store, id: Uuid) -> Result<Notification, ServiceError> {
    store
        .get_notification(id)
        .cloned()
        .ok_or_else(|| ServiceError::not_found("Notification", id))
}

/// Newest first. Administrators see everyone's.
pub fn list_notifications(ctx: &Context<'_>, actor: &User, unread_only: bool) -> Vec<Notification> {
    let mut notifications: Vec<Notification> = ctx
        .store
        .notifications
        .iter()
        .filter(|n| actor.is_admin() || n.user_id == actor.id)
        .filter(|n| !unread_only || n.is_unread())
        .cloned()
        .collect();
    notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    notifications
}

pub fn show_notification(ctx: &Context<'_>, actor: &User, id: Uuid) -> Result<Notification, ServiceError> {
    let notification = find_notification(ctx.store, id)?;
    authorize(ctx.store, actor, Action::View, Target::Notification(&notification))?;
    Ok(notification)
}

/// Marks one notification read. Reading it again keeps the first timestamp.
pub fn mark_read(ctx: &mut Context<'_>, actor: &User, id: Uuid) -> Result<Notification, ServiceError> {
    let notification = find_notification(ctx.store, id)?;
    authorize(ctx.store, actor, Action::Update, Target::Notification(&notification))?;
    if !notification.is_unread() {
        return Ok(notification);
    }

    let Some(stored) = ctx.store.get_notification_mut(id) else {
        return Err(ServiceError::not_found("Notification", id));
    };
    stored.read_at = Some(Timestamp::now());
    let updated = stored.clone();
    ctx.save()?;
    info!(%id, user_id = actor.id, "notification read");
    Ok(updated)
}

/// Marks every unread notification of the actor read and returns how many.
pub fn mark_all_read(ctx: &mut Context<'_>, actor: &User) -> Result<usize, ServiceError> {
    let now = Timestamp::now();
    let mut count = 0;
    for notification in ctx
        .store
        .notifications
        .iter_mut()
        .filter(|n| n.user_id == actor.id && n.is_unread())
    {
        notification.read_at = Some(now);
        count += 1;
    }
    if count > 0 {
        ctx.save()?;
    }
    info!(user_id = actor.id, count, "notifications read");
    Ok(count)
}

pub fn delete_notification(ctx: &mut Context<'_>, actor: &User, id: Uuid) -> Result<(), ServiceError> {
    let notification = find_notification(ctx.store, id)?;
    authorize(ctx.store, actor, Action::Delete, Target::Notification(&notification))?;
    ctx.store.remove_notification(id);
    ctx.save()?;
    info!(%id, user_id = actor.id, "notification deleted");
    Ok(())
}

pub fn unread_count(ctx: &Context<'_>, actor: &User) -> usize {
    ctx.store
        .user_notifications(actor.id)
        .filter(|n| n.is_unread())
        .count()
}
