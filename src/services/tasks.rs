use jiff::{Timestamp, civil::Date};
use tracing::{debug, info};

use crate::{
    events::DomainEvent,
    models::{
        InvalidChoice, ProjectId, TaskId, UserId,
        project::Project,
        store::Store,
        task::{Task, TaskPriority, TaskStatus, TaskView},
        user::User,
    },
    policy::{self, Action, Target},
    services::{
        Context, ServiceError, authorize, due_date_not_past, max_length, project_viewers,
        release_files, required, today, views,
    },
};

fn find_task(store: &Store, task_id: TaskId) -> Result<Task, ServiceError> {
    store
        .get_task(task_id)
        .cloned()
        .ok_or_else(|| ServiceError::not_found("Task", task_id))
}

fn find_project(store: &Store, project_id: ProjectId) -> Result<Project, ServiceError> {
    store
        .get_project(project_id)
        .cloned()
        .ok_or_else(|| ServiceError::not_found("Project", project_id))
}

/// `overdue` is only ever set by the sweep.
fn settable_status(status: TaskStatus) -> Result<TaskStatus, ServiceError> {
    if status == TaskStatus::Overdue {
        return Err(InvalidChoice::new("status", status.as_str()).into());
    }
    Ok(status)
}

fn check_assignee(
    store: &Store,
    project_id: ProjectId,
    user_id: UserId,
    message: &str,
) -> Result<(), ServiceError> {
    if store.get_user(user_id).is_none() {
        return Err(ServiceError::Validation(
            "The selected assigned user is invalid.".to_string(),
        ));
    }
    if !store.is_project_member(user_id, project_id) {
        return Err(ServiceError::Validation(message.to_string()));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TaskFilter {
    pub project_id: Option<ProjectId>,
    /// Only tasks past their due date that are not completed yet
    pub overdue: bool,
}

/// Tasks the actor may view, optionally narrowed to one project. Visibility
/// is the task view rule, so team members outside the project see none and
/// an assignee keeps seeing their task after leaving the project.
pub fn list_tasks(ctx: &Context<'_>, actor: &User, filter: TaskFilter) -> Result<Vec<TaskView>, ServiceError> {
    let store = &*ctx.store;
    let today = today();
    if let Some(project_id) = filter.project_id {
        let project = find_project(store, project_id)?;
        authorize(store, actor, Action::View, Target::Project(&project))?;
    }
    Ok(store
        .tasks
        .values()
        .filter(|t| filter.project_id.is_none_or(|id| t.project_id == id))
        .filter(|t| {
            !filter.overdue
                || (t.status != TaskStatus::Completed && t.due_date.is_some_and(|d| d < today))
        })
        .filter(|t| policy::can(store, actor, Action::View, Target::Task(t)))
        .map(|t| views::task_view(store, t))
        .collect())
}

pub fn show_task(ctx: &Context<'_>, actor: &User, task_id: TaskId) -> Result<TaskView, ServiceError> {
    let task = find_task(ctx.store, task_id)?;
    authorize(ctx.store, actor, Action::View, Target::Task(&task))?;
    Ok(views::task_view(ctx.store, &task))
}

pub struct CreateTaskParameters {
    pub project_id: ProjectId,
    pub name: String,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub due_date: Option<Date>,
    pub assigned_to_user_id: Option<UserId>,
}

pub fn create_task(
    ctx: &mut Context<'_>,
    actor: &User,
    parameters: CreateTaskParameters,
) -> Result<TaskView, ServiceError> {
    let project = find_project(ctx.store, parameters.project_id)?;
    authorize(ctx.store, actor, Action::Create, Target::TaskIn(&project))?;
    required("name", &parameters.name)?;
    max_length("name", &parameters.name, 255)?;
    let status = settable_status(parameters.status.unwrap_or_default())?;
    due_date_not_past(parameters.due_date)?;
    if let Some(assignee_id) = parameters.assigned_to_user_id {
        check_assignee(
            ctx.store,
            project.id,
            assignee_id,
            "Assigned user must be a member of the project.",
        )?;
    }

    let now = Timestamp::now();
    let task_id = ctx.store.add_task(Task {
        id: 0,
        project_id: project.id,
        name: parameters.name.trim().to_string(),
        description: parameters.description,
        status,
        priority: parameters.priority.unwrap_or_default(),
        due_date: parameters.due_date,
        assigned_to_user_id: parameters.assigned_to_user_id,
        created_at: now,
        updated_at: now,
    });
    ctx.save()?;
    info!(task_id, project_id = project.id, user_id = actor.id, "task created");

    if let Some(assignee_id) = parameters.assigned_to_user_id {
        ctx.raise(DomainEvent::TaskAssigned {
            task_id,
            assignee_id,
            assigner_id: actor.id,
        });
    }
    forget_project_detail(ctx, project.id, &[actor.id]);

    let task = find_task(ctx.store, task_id)?;
    Ok(views::task_view(ctx.store, &task))
}

#[derive(Default)]
pub struct UpdateTaskParameters {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub due_date: Option<Option<Date>>,
    /// `Some(None)` unassigns
    pub assigned_to_user_id: Option<Option<UserId>>,
}

pub fn update_task(
    ctx: &mut Context<'_>,
    actor: &User,
    task_id: TaskId,
    parameters: UpdateTaskParameters,
) -> Result<TaskView, ServiceError> {
    let before = find_task(ctx.store, task_id)?;
    authorize(ctx.store, actor, Action::Update, Target::Task(&before))?;
    if let Some(name) = &parameters.name {
        required("name", name)?;
        max_length("name", name, 255)?;
    }
    if let Some(status) = parameters.status {
        settable_status(status)?;
    }
    if let Some(due_date) = parameters.due_date {
        due_date_not_past(due_date)?;
    }
    if let Some(Some(assignee_id)) = parameters.assigned_to_user_id {
        check_assignee(
            ctx.store,
            before.project_id,
            assignee_id,
            "New assigned user must be a member of the project.",
        )?;
    }

    let Some(task) = ctx.store.get_task_mut(task_id) else {
        return Err(ServiceError::not_found("Task", task_id));
    };
    if let Some(name) = parameters.name {
        task.name = name.trim().to_string();
    }
    if let Some(description) = parameters.description {
        task.description = description;
    }
    if let Some(status) = parameters.status {
        task.status = status;
    }
    if let Some(priority) = parameters.priority {
        task.priority = priority;
    }
    if let Some(due_date) = parameters.due_date {
        task.due_date = due_date;
    }
    if let Some(assignee) = parameters.assigned_to_user_id {
        task.assigned_to_user_id = assignee;
    }
    task.updated_at = Timestamp::now();
    let after = task.clone();
    ctx.save()?;
    info!(task_id, user_id = actor.id, "task updated");

    if let Some(assignee_id) = after.assigned_to_user_id
        && before.assigned_to_user_id != Some(assignee_id)
    {
        ctx.raise(DomainEvent::TaskAssigned {
            task_id,
            assignee_id,
            assigner_id: actor.id,
        });
    }
    if before.status != TaskStatus::Completed && after.status == TaskStatus::Completed {
        info!(task_id, "task completed");
        ctx.raise(DomainEvent::TaskCompleted {
            task_id,
            completer_id: actor.id,
        });
    }
    let mut extra = vec![actor.id];
    extra.extend(before.assigned_to_user_id);
    forget_project_detail(ctx, after.project_id, &extra);

    Ok(views::task_view(ctx.store, &after))
}

/// Deletes the task with its comments and attachments.
pub fn delete_task(ctx: &mut Context<'_>, actor: &User, task_id: TaskId) -> Result<(), ServiceError> {
    let task = find_task(ctx.store, task_id)?;
    authorize(ctx.store, actor, Action::Delete, Target::Task(&task))?;

    let removed = ctx.store.remove_task(task_id);
    ctx.save()?;
    release_files(ctx.blobs, &removed.attachments);
    info!(
        task_id,
        user_id = actor.id,
        comments = removed.comments.len(),
        attachments = removed.attachments.len(),
        "task deleted"
    );
    forget_project_detail(ctx, task.project_id, &[actor.id]);
    Ok(())
}

/// Marks every open task whose due date lies before `today` as overdue and
/// returns how many changed. Running it twice on the same day changes
/// nothing the second time.
pub fn sweep_overdue(ctx: &mut Context<'_>, today: Date) -> Result<usize, ServiceError> {
    let now = Timestamp::now();
    let mut touched: Vec<ProjectId> = Vec::new();
    for task in ctx.store.tasks.values_mut() {
        if task.status == TaskStatus::Overdue || !task.is_past_due(today) {
            continue;
        }
        debug!(task_id = task.id, due_date = ?task.due_date, "task overdue");
        task.status = TaskStatus::Overdue;
        task.updated_at = now;
        touched.push(task.project_id);
    }
    let count = touched.len();
    if count == 0 {
        info!(%today, "no overdue tasks");
        return Ok(0);
    }

    ctx.save()?;
    touched.sort_unstable();
    touched.dedup();
    for project_id in touched {
        forget_project_detail(ctx, project_id, &[]);
    }
    info!(%today, count, "marked tasks overdue");
    Ok(count)
}

fn forget_project_detail(ctx: &mut Context<'_>, project_id: ProjectId, extra: &[UserId]) {
    let mut viewers = project_viewers(ctx.store, project_id);
    viewers.extend(extra.iter().copied());
    ctx.forget_project_detail(project_id, &viewers);
}

#[cfg(test)]
mod tests {
    use jiff::civil::date;
    use rstest::rstest;

    use super::*;
    use crate::{
        cache::project_detail_key,
        events::JobQueue,
        models::{
            notification::NotificationKind,
            project::{ProjectMember, ProjectRole, ProjectStatus},
            team::{Team, TeamMember, TeamRole},
            user::GlobalRole,
        },
        services::{ErrorKind, projects::show_project, testing::Harness},
    };

    struct Setup {
        h: Harness,
        manager: User,
        member: User,
        owner: User,
        project_id: ProjectId,
    }

    fn setup() -> Setup {
        let mut h = Harness::new();
        let owner = h.member("owner");
        let manager = h.member("manager");
        let member = h.member("member");
        let team_id = h.store.add_team(Team {
            name: "Core".to_string(),
            slug: "core".to_string(),
            owner_id: owner.id,
            ..Team::default()
        });
        let project_id = h.store.add_project(Project {
            team_id,
            name: "Launch".to_string(),
            status: ProjectStatus::InProgress,
            created_by_user_id: manager.id,
            ..Project::default()
        });
        for (user, role) in [(&manager, ProjectRole::ProjectManager), (&member, ProjectRole::Member)] {
            h.store.add_project_member(ProjectMember {
                project_id,
                user_id: user.id,
                role,
                joined_at: Timestamp::UNIX_EPOCH,
            });
        }
        Setup {
            h,
            manager,
            member,
            owner,
            project_id,
        }
    }

    fn new_task(project_id: ProjectId, assignee: Option<UserId>) -> CreateTaskParameters {
        CreateTaskParameters {
            project_id,
            name: "Write docs".to_string(),
            description: None,
            status: None,
            priority: Some(TaskPriority::High),
            due_date: None,
            assigned_to_user_id: assignee,
        }
    }

    fn seed_task(h: &mut Harness, project_id: ProjectId, status: TaskStatus, due: Option<Date>) -> TaskId {
        h.store.add_task(Task {
            project_id,
            name: format!("{status} task"),
            status,
            due_date: due,
            ..Task::default()
        })
    }

    #[test]
    fn test_create_notifies_the_assignee() {
        let Setup {
            mut h,
            manager,
            member,
            project_id,
            ..
        } = setup();

        let view = create_task(&mut h.ctx(), &manager, new_task(project_id, Some(member.id))).unwrap();

        assert_eq!(view.task.status, TaskStatus::Open);
        assert_eq!(view.assignee.unwrap().id, member.id);
        h.drain();
        let notes: Vec<_> = h.store.user_notifications(member.id).collect();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].kind, NotificationKind::TaskAssigned);
        assert_eq!(notes[0].data["task_id"], view.task.id);
        assert_eq!(h.mailer.sent.borrow().len(), 1);
    }

    #[test]
    fn test_assignee_must_be_a_project_member() {
        let Setup {
            mut h,
            manager,
            project_id,
            ..
        } = setup();
        let stranger = h.member("stranger");

        let err = create_task(&mut h.ctx(), &manager, new_task(project_id, Some(stranger.id))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.to_string(), "Assigned user must be a member of the project.");

        let task = create_task(&mut h.ctx(), &manager, new_task(project_id, None)).unwrap();
        let err = update_task(
            &mut h.ctx(),
            &manager,
            task.task.id,
            UpdateTaskParameters {
                assigned_to_user_id: Some(Some(stranger.id)),
                ..UpdateTaskParameters::default()
            },
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "New assigned user must be a member of the project.");
        assert_eq!(h.store.tasks.len(), 1);
        assert!(h.queue.is_empty());
    }

    #[rstest]
    #[case(TaskStatus::Open, true)]
    #[case(TaskStatus::Cancelled, true)]
    #[case(TaskStatus::Overdue, false)]
    fn test_overdue_is_not_a_settable_status(#[case] status: TaskStatus, #[case] accepted: bool) {
        let Setup {
            mut h,
            manager,
            project_id,
            ..
        } = setup();
        let mut parameters = new_task(project_id, None);
        parameters.status = Some(status);
        let result = create_task(&mut h.ctx(), &manager, parameters);
        assert_eq!(result.is_ok(), accepted);
        if let Err(err) = result {
            assert_eq!(err.to_string(), "The selected status is invalid.");
        }
    }

    #[test]
    fn test_reassignment_fires_only_on_a_new_assignee() {
        let Setup {
            mut h,
            manager,
            member,
            project_id,
            ..
        } = setup();
        let task_id = create_task(&mut h.ctx(), &manager, new_task(project_id, Some(member.id)))
            .unwrap()
            .task
            .id;
        assert_eq!(h.queue.len(), 1);

        let same = || UpdateTaskParameters {
            assigned_to_user_id: Some(Some(member.id)),
            ..UpdateTaskParameters::default()
        };
        update_task(&mut h.ctx(), &manager, task_id, same()).unwrap();
        assert_eq!(h.queue.len(), 1);

        let unassign = UpdateTaskParameters {
            assigned_to_user_id: Some(None),
            ..UpdateTaskParameters::default()
        };
        update_task(&mut h.ctx(), &manager, task_id, unassign).unwrap();
        assert_eq!(h.queue.len(), 1);

        let to_manager = UpdateTaskParameters {
            assigned_to_user_id: Some(Some(manager.id)),
            ..UpdateTaskParameters::default()
        };
        update_task(&mut h.ctx(), &member, task_id, to_manager).unwrap();
        assert_eq!(h.queue.len(), 2);
    }

    #[test]
    fn test_completion_reaches_creator_and_owner_but_not_the_completer() {
        let Setup {
            mut h,
            manager,
            member,
            owner,
            project_id,
        } = setup();
        let task_id = create_task(&mut h.ctx(), &manager, new_task(project_id, Some(member.id)))
            .unwrap()
            .task
            .id;
        h.drain();

        let complete = || UpdateTaskParameters {
            status: Some(TaskStatus::Completed),
            ..UpdateTaskParameters::default()
        };
        update_task(&mut h.ctx(), &member, task_id, complete()).unwrap();
        update_task(&mut h.ctx(), &member, task_id, complete()).unwrap();
        h.drain();

        let completed_for = |user: UserId| {
            h.store
                .user_notifications(user)
                .filter(|n| n.kind == NotificationKind::TaskCompleted)
                .count()
        };
        assert_eq!(completed_for(manager.id), 1);
        assert_eq!(completed_for(owner.id), 1);
        assert_eq!(completed_for(member.id), 0);
    }

    #[test]
    fn test_update_invalidates_cached_project_detail() {
        let Setup {
            mut h,
            manager,
            project_id,
            ..
        } = setup();
        let task_id = create_task(&mut h.ctx(), &manager, new_task(project_id, None))
            .unwrap()
            .task
            .id;
        show_project(&mut h.ctx(), &manager, project_id).unwrap();
        assert!(h.cache.contains(&project_detail_key(project_id, manager.id)));

        update_task(
            &mut h.ctx(),
            &manager,
            task_id,
            UpdateTaskParameters {
                status: Some(TaskStatus::Completed),
                ..UpdateTaskParameters::default()
            },
        )
        .unwrap();

        assert!(!h.cache.contains(&project_detail_key(project_id, manager.id)));
        let detail = show_project(&mut h.ctx(), &manager, project_id).unwrap();
        assert_eq!(detail.completed_tasks_count, 1);
    }

    #[test]
    fn test_members_update_but_only_managers_delete() {
        let Setup {
            mut h,
            manager,
            member,
            project_id,
            ..
        } = setup();
        let task_id = create_task(&mut h.ctx(), &member, new_task(project_id, None))
            .unwrap()
            .task
            .id;

        let err = delete_task(&mut h.ctx(), &member, task_id).unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized));

        delete_task(&mut h.ctx(), &manager, task_id).unwrap();
        assert!(h.store.tasks.is_empty());
        let err = show_task(&h.ctx(), &manager, task_id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_listing_follows_task_visibility() {
        let Setup {
            mut h,
            manager,
            project_id,
            ..
        } = setup();
        let outsider = h.user("pm", GlobalRole::ProjectManager);
        let overdue = seed_task(&mut h, project_id, TaskStatus::Overdue, Some(date(2020, 1, 1)));
        seed_task(&mut h, project_id, TaskStatus::Open, None);

        assert_eq!(list_tasks(&h.ctx(), &manager, TaskFilter::default()).unwrap().len(), 2);
        let only_overdue = list_tasks(
            &h.ctx(),
            &manager,
            TaskFilter {
                overdue: true,
                ..TaskFilter::default()
            },
        )
        .unwrap();
        assert_eq!(only_overdue.len(), 1);
        assert_eq!(only_overdue[0].task.id, overdue);

        assert!(list_tasks(&h.ctx(), &outsider, TaskFilter::default()).unwrap().is_empty());
        let err = list_tasks(
            &h.ctx(),
            &outsider,
            TaskFilter {
                project_id: Some(project_id),
                ..TaskFilter::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized));
    }

    #[test]
    fn test_listing_skips_team_only_members_and_keeps_former_assignees() {
        let Setup {
            mut h,
            member,
            project_id,
            ..
        } = setup();
        let team_id = h.store.projects[&project_id].team_id;
        let colleague = h.member("colleague");
        h.store.add_team_member(TeamMember {
            team_id,
            user_id: colleague.id,
            role: TeamRole::Member,
            joined_at: Timestamp::UNIX_EPOCH,
        });
        let task_id = h.store.add_task(Task {
            project_id,
            name: "Handover".to_string(),
            assigned_to_user_id: Some(member.id),
            ..Task::default()
        });
        h.store.remove_project_member(project_id, member.id);

        assert!(list_tasks(&h.ctx(), &colleague, TaskFilter::default()).unwrap().is_empty());
        let listed = list_tasks(&h.ctx(), &member, TaskFilter::default()).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].task.id, task_id);
    }

    #[test]
    fn test_sweep_marks_past_due_open_tasks_once() {
        let Setup { mut h, project_id, .. } = setup();
        let today = date(2025, 6, 15);
        let late = seed_task(&mut h, project_id, TaskStatus::InProgress, Some(date(2025, 6, 14)));
        let due_today = seed_task(&mut h, project_id, TaskStatus::Open, Some(today));
        let done = seed_task(&mut h, project_id, TaskStatus::Completed, Some(date(2025, 1, 1)));
        let dropped = seed_task(&mut h, project_id, TaskStatus::Cancelled, Some(date(2025, 1, 1)));

        assert_eq!(sweep_overdue(&mut h.ctx(), today).unwrap(), 1);
        assert_eq!(sweep_overdue(&mut h.ctx(), today).unwrap(), 0);

        assert_eq!(h.store.tasks[&late].status, TaskStatus::Overdue);
        assert_eq!(h.store.tasks[&due_today].status, TaskStatus::Open);
        assert_eq!(h.store.tasks[&done].status, TaskStatus::Completed);
        assert_eq!(h.store.tasks[&dropped].status, TaskStatus::Cancelled);
        assert_eq!(h.storage.saves.get(), 1);
        assert!(h.queue.is_empty(), "the sweep raises no events");
    }
}
