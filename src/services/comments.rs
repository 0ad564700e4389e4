use jiff::Timestamp;
use tracing::info;

use crate::{
    events::DomainEvent,
    models::{
        CommentId, UserId,
        comment::{Comment, CommentView, Commentable},
        store::Store,
        user::User,
    },
    policy::{Action, Target},
    services::{Context, ServiceError, authorize, project_viewers, release_files, views},
};

fn find_comment(store: &Store, comment_id: CommentId) -> Result<Comment, ServiceError> {
    store
        .get_comment(comment_id)
        .cloned()
        .ok_or_else(|| ServiceError::not_found("Comment", comment_id))
}

fn missing(commentable: Commentable) -> ServiceError {
    let entity = match commentable {
        Commentable::Project(_) => "Project",
        Commentable::Task(_) => "Task",
    };
    ServiceError::not_found(entity, commentable.id())
}

/// Sanitized content, rejected when nothing survives.
fn clean_content(ctx: &Context<'_>, raw: &str) -> Result<String, ServiceError> {
    let content = ctx.sanitizer.clean(raw);
    if content.trim().is_empty() {
        return Err(ServiceError::Validation("The content field is required.".to_string()));
    }
    Ok(content)
}

/// A comment shows up in the detail view of its project, directly or through
/// the comment count of a task.
fn forget_project_detail(ctx: &mut Context<'_>, commentable: Commentable, extra: &[UserId]) {
    let Some(project_id) = ctx.store.commentable_project(commentable).map(|p| p.id) else {
        return;
    };
    let mut viewers = project_viewers(ctx.store, project_id);
    viewers.extend(extra.iter().copied());
    ctx.forget_project_detail(project_id, &viewers);
}

pub fn list_comments(
    ctx: &Context<'_>,
    actor: &User,
    commentable: Commentable,
) -> Result<Vec<CommentView>, ServiceError> {
    let store = &*ctx.store;
    let on = store
        .resolve_commentable(commentable)
        .ok_or_else(|| missing(commentable))?;
    authorize(store, actor, Action::View, Target::CommentOn(on))?;
    Ok(store
        .comments_on(commentable)
        .map(|c| views::comment_view(store, c))
        .collect())
}

pub fn show_comment(ctx: &Context<'_>, actor: &User, comment_id: CommentId) -> Result<CommentView, ServiceError> {
    let comment = find_comment(ctx.store, comment_id)?;
    authorize(ctx.store, actor, Action::View, Target::Comment(&comment))?;
    Ok(views::comment_view(ctx.store, &comment))
}

pub struct CreateCommentParameters {
    pub commentable: Commentable,
    pub content: String,
}

pub fn create_comment(
    ctx: &mut Context<'_>,
    actor: &User,
    parameters: CreateCommentParameters,
) -> Result<CommentView, ServiceError> {
    let commentable = parameters.commentable;
    let on = ctx
        .store
        .resolve_commentable(commentable)
        .ok_or_else(|| missing(commentable))?;
    authorize(ctx.store, actor, Action::Create, Target::CommentOn(on))?;
    let content = clean_content(ctx, &parameters.content)?;

    let now = Timestamp::now();
    let comment_id = ctx.store.add_comment(Comment {
        id: 0,
        content,
        user_id: actor.id,
        commentable,
        created_at: now,
        updated_at: now,
    });
    ctx.save()?;
    info!(comment_id, on = %commentable, user_id = actor.id, "comment created");

    ctx.raise(DomainEvent::CommentCreated { comment_id });
    forget_project_detail(ctx, commentable, &[actor.id]);

    let comment = find_comment(ctx.store, comment_id)?;
    Ok(views::comment_view(ctx.store, &comment))
}

pub struct UpdateCommentParameters {
    pub content: String,
}

pub fn update_comment(
    ctx: &mut Context<'_>,
    actor: &User,
    comment_id: CommentId,
    parameters: UpdateCommentParameters,
) -> Result<CommentView, ServiceError> {
    let comment = find_comment(ctx.store, comment_id)?;
    authorize(ctx.store, actor, Action::Update, Target::Comment(&comment))?;
    let content = clean_content(ctx, &parameters.content)?;

    let Some(stored) = ctx.store.get_comment_mut(comment_id) else {
        return Err(ServiceError::not_found("Comment", comment_id));
    };
    stored.content = content;
    stored.updated_at = Timestamp::now();
    let updated = stored.clone();
    ctx.save()?;
    info!(comment_id, user_id = actor.id, "comment updated");

    forget_project_detail(ctx, comment.commentable, &[actor.id]);
    Ok(views::comment_view(ctx.store, &updated))
}

/// Deletes the comment and the files attached to it.
pub fn delete_comment(ctx: &mut Context<'_>, actor: &User, comment_id: CommentId) -> Result<(), ServiceError> {
    let comment = find_comment(ctx.store, comment_id)?;
    authorize(ctx.store, actor, Action::Delete, Target::Comment(&comment))?;

    forget_project_detail(ctx, comment.commentable, &[actor.id]);
    let removed = ctx.store.remove_comment(comment_id);
    ctx.save()?;
    release_files(ctx.blobs, &removed.attachments);
    info!(
        comment_id,
        user_id = actor.id,
        attachments = removed.attachments.len(),
        "comment deleted"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        blobs::BlobStorage,
        cache::project_detail_key,
        models::{
            ProjectId, TaskId,
            attachment::{Attachable, Attachment},
            notification::NotificationKind,
            project::{Project, ProjectMember, ProjectRole},
            task::Task,
            team::Team,
        },
        services::{ErrorKind, projects::show_project, testing::Harness},
    };

    struct Setup {
        h: Harness,
        creator: User,
        member: User,
        assignee: User,
        project_id: ProjectId,
        task_id: TaskId,
    }

    fn setup() -> Setup {
        let mut h = Harness::new();
        let owner = h.member("owner");
        let creator = h.member("creator");
        let member = h.member("member");
        let assignee = h.member("assignee");
        let team_id = h.store.add_team(Team {
            name: "Core".to_string(),
            slug: "core".to_string(),
            owner_id: owner.id,
            ..Team::default()
        });
        let project_id = h.store.add_project(Project {
            team_id,
            name: "Launch".to_string(),
            created_by_user_id: creator.id,
            ..Project::default()
        });
        for (user, role) in [
            (&creator, ProjectRole::ProjectManager),
            (&member, ProjectRole::Member),
            (&assignee, ProjectRole::Member),
        ] {
            h.store.add_project_member(ProjectMember {
                project_id,
                user_id: user.id,
                role,
                joined_at: Timestamp::UNIX_EPOCH,
            });
        }
        let task_id = h.store.add_task(Task {
            project_id,
            name: "Ship it".to_string(),
            assigned_to_user_id: Some(assignee.id),
            ..Task::default()
        });
        Setup {
            h,
            creator,
            member,
            assignee,
            project_id,
            task_id,
        }
    }

    fn comment_on(commentable: Commentable, content: &str) -> CreateCommentParameters {
        CreateCommentParameters {
            commentable,
            content: content.to_string(),
        }
    }

    #[test]
    fn test_content_is_sanitized_before_it_is_stored() {
        let Setup {
            mut h,
            member,
            project_id,
            ..
        } = setup();

        let view = create_comment(
            &mut h.ctx(),
            &member,
            comment_on(
                Commentable::Project(project_id),
                "<p onclick=\"steal()\">Looks <b>good</b></p><script>alert(1)</script>",
            ),
        )
        .unwrap();

        assert_eq!(view.comment.content, "<p>Looks <b>good</b></p>");
        assert_eq!(h.store.comments[&view.comment.id].content, view.comment.content);
        assert_eq!(view.author.unwrap().id, member.id);
    }

    #[test]
    fn test_markup_only_content_is_rejected() {
        let Setup {
            mut h,
            member,
            project_id,
            ..
        } = setup();
        let err = create_comment(
            &mut h.ctx(),
            &member,
            comment_on(Commentable::Project(project_id), "<script>x()</script>"),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(h.store.comments.is_empty());
    }

    #[test]
    fn test_task_comment_notifies_assignee_then_members_but_not_the_author() {
        let Setup {
            mut h,
            creator,
            member,
            assignee,
            task_id,
            ..
        } = setup();

        create_comment(&mut h.ctx(), &member, comment_on(Commentable::Task(task_id), "Done?")).unwrap();
        let queued: Vec<UserId> = h.queue.jobs().map(|j| j.recipient_id).collect();
        assert_eq!(queued, vec![assignee.id, creator.id]);

        let report = h.drain();
        assert_eq!(report.notifications, 2);
        assert_eq!(report.emails, 2);
        let note = h.store.user_notifications(assignee.id).next().unwrap();
        assert_eq!(note.kind, NotificationKind::NewComment);
        assert_eq!(note.data["commentable_type"], "task");
        assert_eq!(note.data["commentable_name"], "Ship it");
        assert_eq!(h.store.user_notifications(member.id).count(), 0);
    }

    #[test]
    fn test_missing_target_and_outsiders() {
        let Setup {
            mut h, project_id, ..
        } = setup();
        let outsider = h.member("outsider");

        let err = create_comment(&mut h.ctx(), &outsider, comment_on(Commentable::Task(404), "hi")).unwrap_err();
        assert_eq!(err.to_string(), "Task #404 not found.");

        let err = create_comment(
            &mut h.ctx(),
            &outsider,
            comment_on(Commentable::Project(project_id), "hi"),
        )
        .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized));
        let err = list_comments(&h.ctx(), &outsider, Commentable::Project(project_id)).unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized));
    }

    #[test]
    fn test_only_author_or_managers_edit() {
        let Setup {
            mut h,
            creator,
            member,
            assignee,
            project_id,
            ..
        } = setup();
        let id = create_comment(&mut h.ctx(), &member, comment_on(Commentable::Project(project_id), "v1"))
            .unwrap()
            .comment
            .id;
        let edit = |content: &str| UpdateCommentParameters {
            content: content.to_string(),
        };

        let err = update_comment(&mut h.ctx(), &assignee, id, edit("hijack")).unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized));

        let view = update_comment(&mut h.ctx(), &member, id, edit("<i>v2</i><img src=x>")).unwrap();
        assert_eq!(view.comment.content, "<i>v2</i>");

        update_comment(&mut h.ctx(), &creator, id, edit("moderated")).unwrap();
        let listed = list_comments(&h.ctx(), &assignee, Commentable::Project(project_id)).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].comment.content, "moderated");
    }

    #[test]
    fn test_delete_releases_attached_files_and_refreshes_detail() {
        let Setup {
            mut h,
            creator,
            member,
            project_id,
            ..
        } = setup();
        let id = create_comment(&mut h.ctx(), &member, comment_on(Commentable::Project(project_id), "see file"))
            .unwrap()
            .comment
            .id;
        let stored = h.blobs.store(b"notes", "notes.txt").unwrap();
        h.store.add_attachment(Attachment {
            id: 0,
            user_id: member.id,
            attachable: Attachable::Comment(id),
            disk: stored.disk,
            path: stored.path.clone(),
            file_name: "notes.txt".to_string(),
            file_size: 5,
            mime_type: "text/plain".to_string(),
            created_at: Timestamp::UNIX_EPOCH,
            updated_at: Timestamp::UNIX_EPOCH,
        });
        let before = show_project(&mut h.ctx(), &creator, project_id).unwrap();
        assert_eq!(before.comments_count, 1);

        delete_comment(&mut h.ctx(), &creator, id).unwrap();

        assert!(h.store.attachments.is_empty());
        assert!(!h.blobs.exists("local", &stored.path));
        assert!(!h.cache.contains(&project_detail_key(project_id, creator.id)));
        let after = show_project(&mut h.ctx(), &creator, project_id).unwrap();
        assert_eq!(after.comments_count, 0);
    }
}
