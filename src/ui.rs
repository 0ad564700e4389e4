use colored::*;
use jiff::{Timestamp, Zoned, civil::Date, tz::TimeZone};

use crate::models::{
    attachment::AttachmentView,
    comment::CommentView,
    notification::Notification,
    project::{ProjectDetail, ProjectStatus, ProjectSummary},
    task::{TaskPriority, TaskStatus, TaskView},
    team::TeamView,
    user::{User, UserSummary},
};

/// Get the terminal width, defaulting to 80 if unavailable
fn get_terminal_width() -> usize {
    term_size::dimensions().map(|(w, _)| w).unwrap_or(80)
}

/// Glyph for a task status
pub fn get_status_glyph(status: TaskStatus) -> ColoredString {
    match status {
        TaskStatus::Completed => "✓".dimmed(),
        TaskStatus::Overdue => "●".red(),
        TaskStatus::InProgress => "◐".yellow(),
        TaskStatus::Cancelled => "✗".dimmed(),
        TaskStatus::Open => "○".normal(),
    }
}

fn project_status_label(status: ProjectStatus) -> ColoredString {
    match status {
        ProjectStatus::Pending => status.as_str().normal(),
        ProjectStatus::InProgress => status.as_str().yellow(),
        ProjectStatus::Completed => status.as_str().green(),
    }
}

fn priority_label(priority: TaskPriority) -> ColoredString {
    match priority {
        TaskPriority::High => "high".red(),
        TaskPriority::Medium => "medium".normal(),
        TaskPriority::Low => "low".dimmed(),
    }
}

/// Print `left` with `right` right-aligned and dimmed when it fits.
/// `left_visible` is the width of `left` without color codes.
fn render_aligned(left: ColoredString, left_visible: usize, right: &str) {
    let terminal_width = get_terminal_width();
    let right_visible = right.chars().count();
    if right.is_empty() || left_visible + right_visible + 4 >= terminal_width {
        println!("{}", left);
        if !right.is_empty() {
            println!("       {}", right.dimmed());
        }
        return;
    }
    let padding = terminal_width - left_visible - right_visible - 2;
    println!("{}{}{}", left, " ".repeat(padding), right.dimmed());
}

fn user_label(user: Option<&UserSummary>) -> String {
    user.map(|u| u.name.clone())
        .unwrap_or_else(|| "unknown user".to_string())
}

/// Render a view header with title and count
pub fn render_view_header(title: &str, count: usize, noun: &str) {
    let word = if count == 1 {
        noun.to_string()
    } else {
        format!("{noun}s")
    };
    println!("\n  {} ({} {})\n", title.cyan().bold(), count, word);
}

/// Render a section header (e.g., "Members", "Tasks")
pub fn render_section_header(title: &str) {
    println!("\n  ─── {} ───\n", title.bold());
}

/// Format a due date for display (e.g., "Today", "Tomorrow", "Mar 01")
pub fn format_due_date(date: Date) -> String {
    let today = Zoned::now().date();
    if date == today {
        "Today".to_string()
    } else if today.tomorrow().is_ok_and(|t| t == date) {
        "Tomorrow".to_string()
    } else if date.year() == today.year() {
        date.strftime("%b %d").to_string()
    } else {
        date.strftime("%b %d %Y").to_string()
    }
}

/// Format a timestamp in the local zone (e.g., "Today 14:05", "Feb 15")
pub fn format_timestamp(timestamp: Timestamp) -> String {
    let zoned = Zoned::new(timestamp, TimeZone::system());
    let today = Zoned::now().date();
    if zoned.date() == today {
        zoned.strftime("Today %H:%M").to_string()
    } else if today.yesterday().is_ok_and(|y| y == zoned.date()) {
        zoned.strftime("Yesterday %H:%M").to_string()
    } else {
        zoned.strftime("%b %d").to_string()
    }
}

pub fn render_user(user: &User) {
    println!("  {} {}", user.name.bold(), format!("<{}>", user.email).dimmed());
    println!("  {} {}", "role:".dimmed(), user.role);
}

pub fn render_team_list(teams: &[TeamView]) {
    if teams.is_empty() {
        println!("No teams found");
        return;
    }
    render_view_header("TEAMS", teams.len(), "team");
    for view in teams {
        let left = format!("  {:>3}  {}", view.team.id, view.team.name);
        let right = format!(
            "{} · {} members · {} projects",
            user_label(view.owner.as_ref()),
            view.members.len(),
            view.projects.len()
        );
        render_aligned(left.bold(), left.chars().count(), &right);
    }
}

pub fn render_team(view: &TeamView) {
    println!(
        "\n  {} {}",
        view.team.name.cyan().bold(),
        format!("({})", view.team.slug).dimmed()
    );
    println!("  {} {}", "owner:".dimmed(), user_label(view.owner.as_ref()));

    render_section_header(&format!("Members ({})", view.members.len()));
    for member in &view.members {
        let left = format!("  {:>3}  {}", member.user.id, member.user.name);
        render_aligned(left.normal(), left.chars().count(), member.role.as_str());
    }

    if !view.projects.is_empty() {
        render_section_header(&format!("Projects ({})", view.projects.len()));
        for project in &view.projects {
            println!(
                "  {:>3}  {}  {}",
                project.id,
                project.name,
                project_status_label(project.status)
            );
        }
    }
}

pub fn render_project_list(projects: &[ProjectSummary]) {
    if projects.is_empty() {
        println!("No projects found");
        return;
    }
    render_view_header("PROJECTS", projects.len(), "project");
    for summary in projects {
        let project = &summary.project;
        let left = format!("  {:>3}  {}", project.id, project.name);
        let mut right = vec![project.status.as_str().to_string()];
        if let Some(team) = &summary.team {
            right.push(team.name.clone());
        }
        right.push(format!("{} tasks", summary.tasks_count));
        if let Some(due) = project.due_date {
            right.push(format!("due {}", format_due_date(due)));
        }
        let styled = if project.status == ProjectStatus::Completed {
            left.dimmed()
        } else {
            left.bold()
        };
        render_aligned(styled, left.chars().count(), &right.join(" · "));
    }
}

pub fn render_project(detail: &ProjectDetail) {
    let project = &detail.project;
    println!(
        "\n  {} {}  {}",
        format!("#{}", project.id).dimmed(),
        project.name.cyan().bold(),
        project_status_label(project.status)
    );
    if let Some(team) = &detail.team {
        println!(
            "  {} {} (owner {})",
            "team:".dimmed(),
            team.name,
            user_label(detail.team_owner.as_ref())
        );
    }
    println!("  {} {}", "creator:".dimmed(), user_label(detail.creator.as_ref()));
    if let Some(due) = project.due_date {
        println!("  {} {}", "due:".dimmed(), format_due_date(due));
    }
    if let Some(description) = &project.description {
        println!("\n  {}", description);
    }

    render_section_header(&format!("Members ({})", detail.members.len()));
    for member in &detail.members {
        let left = format!("  {:>3}  {}", member.user.id, member.user.name);
        render_aligned(left.normal(), left.chars().count(), member.role.as_str());
    }

    render_section_header(&format!(
        "Tasks ({}/{} completed)",
        detail.completed_tasks_count, detail.tasks_count
    ));
    if detail.tasks.is_empty() {
        println!("  No tasks yet");
    }
    for view in &detail.tasks {
        render_task_line(view);
    }

    if !detail.comments.is_empty() {
        render_section_header(&format!("Comments ({})", detail.comments_count));
        for comment in &detail.comments {
            render_comment(comment);
        }
    }
    if !detail.attachments.is_empty() {
        render_section_header(&format!("Attachments ({})", detail.attachments.len()));
        render_attachment_lines(&detail.attachments);
    }
}

/// Render a single task line with ID, glyph, name and right-aligned context
pub fn render_task_line(view: &TaskView) {
    let task = &view.task;
    let left = format!("  {:>3}  {}  {}", task.id, get_status_glyph(task.status), task.name);
    let visible = format!("  {:>3}  {}  {}", task.id, " ", task.name).chars().count();
    let styled = if task.status.is_closed() {
        left.dimmed()
    } else {
        left.bold()
    };

    let mut right = vec![];
    if let Some(project) = &view.project {
        right.push(project.name.clone());
    }
    if let Some(assignee) = &view.assignee {
        right.push(format!("@{}", assignee.name));
    }
    if let Some(due) = task.due_date {
        right.push(format!("due {}", format_due_date(due)));
    }
    render_aligned(styled, visible, &right.join(" · "));
}

pub fn render_task_list(tasks: &[TaskView]) {
    if tasks.is_empty() {
        println!("No tasks found");
        return;
    }
    render_view_header("TASKS", tasks.len(), "task");
    for view in tasks {
        render_task_line(view);
    }
}

pub fn render_task(view: &TaskView) {
    let task = &view.task;
    println!(
        "\n  {} {} {}",
        get_status_glyph(task.status),
        format!("#{}", task.id).dimmed(),
        task.name.bold()
    );
    if let Some(project) = &view.project {
        println!("  {} {}", "project:".dimmed(), project.name);
    }
    println!("  {} {}", "status:".dimmed(), task.status);
    println!("  {} {}", "priority:".dimmed(), priority_label(task.priority));
    if let Some(assignee) = &view.assignee {
        println!("  {} {}", "assignee:".dimmed(), assignee.name);
    }
    if let Some(due) = task.due_date {
        println!("  {} {}", "due:".dimmed(), format_due_date(due));
    }
    println!("  {} {}", "comments:".dimmed(), view.comments_count);
    if let Some(description) = &task.description {
        println!("\n  {}", description);
    }
}

pub fn render_comment(view: &CommentView) {
    let comment = &view.comment;
    println!(
        "  {} {} {}",
        format!("#{}", comment.id).dimmed(),
        user_label(view.author.as_ref()).bold(),
        format_timestamp(comment.created_at).dimmed()
    );
    for line in comment.content.lines() {
        println!("      {}", line);
    }
    println!();
}

pub fn render_comment_list(comments: &[CommentView]) {
    if comments.is_empty() {
        println!("No comments yet");
        return;
    }
    render_view_header("COMMENTS", comments.len(), "comment");
    for view in comments {
        render_comment(view);
    }
}

fn format_size(bytes: u64) -> String {
    match bytes {
        b if b >= 1024 * 1024 => format!("{:.1} MB", b as f64 / (1024.0 * 1024.0)),
        b if b >= 1024 => format!("{:.1} KB", b as f64 / 1024.0),
        b => format!("{b} B"),
    }
}

fn render_attachment_lines(attachments: &[AttachmentView]) {
    for view in attachments {
        let attachment = &view.attachment;
        let left = format!("  {:>3}  {}", attachment.id, attachment.file_name);
        let right = format!(
            "{} · {} · {}",
            format_size(attachment.file_size),
            attachment.mime_type,
            user_label(view.uploader.as_ref())
        );
        render_aligned(left.normal(), left.chars().count(), &right);
    }
}

pub fn render_attachment_list(attachments: &[AttachmentView]) {
    if attachments.is_empty() {
        println!("No attachments");
        return;
    }
    render_view_header("ATTACHMENTS", attachments.len(), "attachment");
    render_attachment_lines(attachments);
}

pub fn render_attachment(view: &AttachmentView) {
    let attachment = &view.attachment;
    println!("\n  {}", attachment.file_name.bold());
    println!("  {} {}", "on:".dimmed(), attachment.attachable);
    println!("  {} {}", "size:".dimmed(), format_size(attachment.file_size));
    println!("  {} {}", "type:".dimmed(), attachment.mime_type);
    println!("  {} {}", "uploaded by:".dimmed(), user_label(view.uploader.as_ref()));
    println!("  {} {}", "uploaded:".dimmed(), format_timestamp(attachment.created_at));
}

fn notification_message(notification: &Notification) -> String {
    notification
        .data
        .get("message")
        .and_then(|m| m.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| notification.kind.to_string())
}

pub fn render_notification_list(notifications: &[Notification]) {
    if notifications.is_empty() {
        println!("No notifications");
        return;
    }
    render_view_header("NOTIFICATIONS", notifications.len(), "notification");
    for notification in notifications {
        let glyph = if notification.is_unread() {
            "●".cyan()
        } else {
            " ".normal()
        };
        let message = notification_message(notification);
        let left = format!("  {}  {}", glyph, message);
        let visible = format!("  {}  {}", " ", message).chars().count();
        let styled = if notification.is_unread() {
            left.bold()
        } else {
            left.dimmed()
        };
        let right = format!(
            "{} · {}",
            format_timestamp(notification.created_at),
            &notification.id.to_string()[..8]
        );
        render_aligned(styled, visible, &right);
    }
}

pub fn render_notification(notification: &Notification) {
    println!("\n  {}", notification_message(notification).bold());
    println!("  {} {}", "id:".dimmed(), notification.id);
    println!("  {} {}", "type:".dimmed(), notification.kind);
    println!("  {} {}", "received:".dimmed(), format_timestamp(notification.created_at));
    match notification.read_at {
        Some(read_at) => println!("  {} {}", "read:".dimmed(), format_timestamp(read_at)),
        None => println!("  {} {}", "read:".dimmed(), "no".cyan()),
    }
}

/// Print a success line
pub fn render_success(message: &str) {
    println!("{} {}", "✓".green(), message);
}

/// Print an error line on stderr
pub fn render_error(message: &str) {
    eprintln!("{} {}", "Error:".red().bold(), message);
}
