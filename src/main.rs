use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    process, thread,
    time::Duration,
};

use clap::{Parser, Subcommand};
use colored::*;
use jiff::civil::Date;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use uuid::Uuid;

use crate::{
    blobs::LocalDisk,
    cache::MemoryCache,
    config::{ConfigError, Settings},
    delivery::{LogMailer, StoreSink},
    events::{JobQueue, MemoryQueue},
    models::{
        InvalidChoice, ProjectId, TaskId, TeamId, UserId,
        attachment::Attachable,
        comment::Commentable,
        project::{ProjectRole, ProjectStatus},
        store::Store,
        task::{TaskPriority, TaskStatus},
        team::TeamRole,
        user::{GlobalRole, User, UserSummary},
    },
    sanitize::MarkupSanitizer,
    services::{
        Context, ErrorKind, GENERIC_FAILURE, ServiceError, attachments, auth, comments,
        notifications, projects, tasks, teams,
    },
    storage::{Storage, StorageError, json::JsonFileStorage},
};

mod blobs;
mod cache;
mod config;
mod delivery;
mod events;
mod models;
mod policy;
mod sanitize;
mod services;
mod storage;
mod ui;

const SWEEP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Parser)]
#[command(
    name = "taskhub",
    about = "Teams, projects and tasks with roles, comments, files and notifications"
)]
struct Cli {
    /// Config file (defaults to <config dir>/taskhub/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Where the store, session and files live
    #[arg(long, global = true, env = "TASKHUB_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Access token (defaults to the one saved by `login`)
    #[arg(long, global = true, env = "TASKHUB_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and save the access token
    Login {
        email: String,
        #[arg(long, env = "TASKHUB_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Show the logged in user
    Whoami,

    /// Revoke the current access token
    Logout,

    /// Create an administrator account
    CreateAdmin {
        name: String,
        email: String,
        #[arg(long, env = "TASKHUB_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Manage users
    #[command(subcommand)]
    User(UserCommands),

    /// Manage teams
    #[command(subcommand)]
    Team(TeamCommands),

    /// Manage projects
    #[command(subcommand)]
    Project(ProjectCommands),

    /// Manage tasks
    #[command(subcommand)]
    Task(TaskCommands),

    /// Manage comments on projects and tasks
    #[command(subcommand)]
    Comment(CommentCommands),

    /// Manage files attached to projects, tasks and comments
    #[command(subcommand)]
    Attachment(AttachmentCommands),

    /// Read and manage your notifications
    #[command(subcommand)]
    Notification(NotificationCommands),

    /// Mark past-due tasks overdue
    SweepOverdue {
        /// Keep running and sweep again every 24 hours
        #[arg(long)]
        daemon: bool,
    },
}

#[derive(Debug, Subcommand)]
enum UserCommands {
    /// Create a user (administrators only)
    Create {
        name: String,
        email: String,
        #[arg(long, env = "TASKHUB_NEW_PASSWORD", hide_env_values = true)]
        password: String,
        /// admin, project_manager or member
        #[arg(long, default_value = "member")]
        role: String,
    },
}

#[derive(Debug, Subcommand)]
enum TeamCommands {
    /// List your teams
    List,
    /// Create a team you own
    Create { name: String },
    /// Show a team with its members and projects
    Show { id: TeamId },
    /// Rename a team
    Update {
        id: TeamId,
        #[arg(long)]
        name: Option<String>,
    },
    /// Delete a team and everything in it
    Delete { id: TeamId },
    /// Add a user to a team
    AddMember {
        team_id: TeamId,
        user_id: UserId,
        /// team_admin or member
        #[arg(long, default_value = "member")]
        role: String,
    },
    /// Change the role of a team member
    UpdateMember {
        team_id: TeamId,
        user_id: UserId,
        role: String,
    },
    /// Remove a user from a team
    RemoveMember { team_id: TeamId, user_id: UserId },
}

#[derive(Debug, Subcommand)]
enum ProjectCommands {
    /// List projects you can see
    List {
        /// Only projects that are not completed
        #[arg(long, conflicts_with = "status")]
        active: bool,
        /// pending, in_progress or completed
        #[arg(long)]
        status: Option<String>,
    },
    /// Create a project in a team
    Create {
        team_id: TeamId,
        name: String,
        #[arg(short, long)]
        description: Option<String>,
        #[arg(long)]
        status: Option<String>,
        /// Due date (YYYY-MM-DD)
        #[arg(long)]
        due: Option<String>,
        /// Extra member as USER_ID[:ROLE] (can be used multiple times)
        #[arg(short, long, action = clap::ArgAction::Append)]
        member: Vec<String>,
    },
    /// Show a project with members, tasks, comments and files
    Show { id: ProjectId },
    /// Change a project
    Update {
        id: ProjectId,
        #[arg(long)]
        name: Option<String>,
        #[arg(short, long)]
        description: Option<String>,
        #[arg(long, conflicts_with = "description")]
        clear_description: bool,
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        due: Option<String>,
        #[arg(long, conflicts_with = "due")]
        clear_due: bool,
    },
    /// Delete a project with its tasks, comments and files
    Delete { id: ProjectId },
    /// Add a user to a project
    AddMember {
        project_id: ProjectId,
        user_id: UserId,
        /// project_manager or member
        #[arg(long, default_value = "member")]
        role: String,
    },
    /// Change the role of a project member
    UpdateMember {
        project_id: ProjectId,
        user_id: UserId,
        role: String,
    },
    /// Remove a user from a project
    RemoveMember { project_id: ProjectId, user_id: UserId },
}

#[derive(Debug, Subcommand)]
enum TaskCommands {
    /// List tasks you can see
    List {
        #[arg(short, long)]
        project: Option<ProjectId>,
        /// Only tasks past their due date
        #[arg(long)]
        overdue: bool,
    },
    /// Create a task in a project
    Create {
        project_id: ProjectId,
        name: String,
        #[arg(short, long)]
        description: Option<String>,
        /// open, in_progress, completed or cancelled
        #[arg(long)]
        status: Option<String>,
        /// low, medium or high
        #[arg(long)]
        priority: Option<String>,
        #[arg(long)]
        due: Option<String>,
        /// Assignee user id
        #[arg(short, long)]
        assign: Option<UserId>,
    },
    /// Show a task
    Show { id: TaskId },
    /// Change a task
    Update {
        id: TaskId,
        #[arg(long)]
        name: Option<String>,
        #[arg(short, long)]
        description: Option<String>,
        #[arg(long, conflicts_with = "description")]
        clear_description: bool,
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        priority: Option<String>,
        #[arg(long)]
        due: Option<String>,
        #[arg(long, conflicts_with = "due")]
        clear_due: bool,
        #[arg(short, long)]
        assign: Option<UserId>,
        #[arg(long, conflicts_with = "assign")]
        unassign: bool,
    },
    /// Delete a task with its comments and files
    Delete { id: TaskId },
}

#[derive(Debug, Subcommand)]
enum CommentCommands {
    /// List comments on a project or task
    List { target_type: String, target_id: u64 },
    /// Comment on a project or task
    Create {
        target_type: String,
        target_id: u64,
        content: String,
    },
    /// Show a comment
    Show { id: u64 },
    /// Edit a comment
    Update { id: u64, content: String },
    /// Delete a comment with its files
    Delete { id: u64 },
}

#[derive(Debug, Subcommand)]
enum AttachmentCommands {
    /// List files on a project, task or comment
    List { target_type: String, target_id: u64 },
    /// Upload a file
    Upload {
        target_type: String,
        target_id: u64,
        file: PathBuf,
        /// Name to show instead of the file's own
        #[arg(long)]
        name: Option<String>,
    },
    /// Show file metadata
    Show { id: u64 },
    /// Save the stored file locally
    Download {
        id: u64,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Change the displayed file name
    Rename { id: u64, name: String },
    /// Delete a file
    Delete { id: u64 },
}

#[derive(Debug, Subcommand)]
enum NotificationCommands {
    /// List notifications, newest first
    List {
        #[arg(long)]
        unread: bool,
    },
    /// Show a notification
    Show { id: Uuid },
    /// Mark a notification read
    Read { id: Uuid },
    /// Delete a notification
    Delete { id: Uuid },
    /// Mark all your notifications read
    ReadAll,
    /// Count your unread notifications
    UnreadCount,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("{0}")]
    Input(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Failed to access '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode output: {0}")]
    Output(#[from] serde_json::Error),
}

impl From<InvalidChoice> for CliError {
    fn from(e: InvalidChoice) -> Self {
        CliError::Service(e.into())
    }
}

impl CliError {
    fn exit_code(&self) -> i32 {
        match self {
            CliError::Service(e) => match e.kind() {
                ErrorKind::Validation => 2,
                ErrorKind::Unauthenticated | ErrorKind::Unauthorized => 3,
                ErrorKind::NotFound => 4,
                ErrorKind::Conflict | ErrorKind::InvariantViolation => 5,
                ErrorKind::Failure => 1,
            },
            CliError::Input(_) => 2,
            _ => 1,
        }
    }

    fn message(&self) -> String {
        match self {
            CliError::Service(e) => e.user_message(),
            CliError::Storage(e) => {
                error!(error = %e, "storage failure");
                GENERIC_FAILURE.to_string()
            }
            other => other.to_string(),
        }
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> CliError + '_ {
    move |source| CliError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Saves the bearer token readable by the owner only.
fn write_session(path: &Path, token: &str) -> Result<(), CliError> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
        options.mode(0o600);
        let mut file = options.open(path).map_err(io_error(path))?;
        // mode only applies on creation
        fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(io_error(path))?;
        file.write_all(token.as_bytes()).map_err(io_error(path))
    }
    #[cfg(not(unix))]
    {
        let mut file = options.open(path).map_err(io_error(path))?;
        file.write_all(token.as_bytes()).map_err(io_error(path))
    }
}

fn parse_date(value: &str) -> Result<Date, CliError> {
    value.parse::<Date>().map_err(|_| {
        CliError::Input(format!(
            "Invalid date '{value}'. Expected format: YYYY-MM-DD (e.g., 2025-03-01)"
        ))
    })
}

fn parse_optional<T>(value: Option<String>) -> Result<Option<T>, CliError>
where
    T: std::str::FromStr<Err = InvalidChoice>,
{
    Ok(value.map(|v| v.parse::<T>()).transpose()?)
}

/// `USER_ID[:ROLE]`, role defaulting to member.
fn parse_project_member(value: &str) -> Result<projects::ProjectMemberParameters, CliError> {
    let (id, role) = value.split_once(':').unwrap_or((value, "member"));
    let user_id = id
        .trim()
        .parse::<UserId>()
        .map_err(|_| CliError::Input(format!("Invalid member '{value}'. Expected USER_ID[:ROLE]")))?;
    Ok(projects::ProjectMemberParameters {
        user_id,
        role: role.trim().parse()?,
    })
}

/// Clears with `clear`, sets with `value`, otherwise leaves the field alone.
fn field_change<T>(value: Option<T>, clear: bool) -> Option<Option<T>> {
    if clear { Some(None) } else { value.map(Some) }
}

/// Everything one invocation works with.
struct App {
    settings: Settings,
    storage: JsonFileStorage,
    store: Store,
    cache: MemoryCache,
    queue: MemoryQueue,
    blobs: LocalDisk,
    sanitizer: MarkupSanitizer,
    token: Option<String>,
    json: bool,
}

impl App {
    fn open(settings: Settings, token: Option<String>, json: bool) -> Result<Self, CliError> {
        fs::create_dir_all(&settings.data_dir).map_err(io_error(&settings.data_dir))?;
        let storage =
            JsonFileStorage::new(settings.store_path()).with_kept_backups(settings.kept_backups);
        let store = storage.load()?;
        let token = token.or_else(|| {
            fs::read_to_string(settings.session_path())
                .ok()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
        });
        Ok(Self {
            blobs: LocalDisk::new(settings.attachments_dir()),
            storage,
            store,
            cache: MemoryCache::new(),
            queue: MemoryQueue::new(),
            sanitizer: MarkupSanitizer,
            settings,
            token,
            json,
        })
    }

    fn ctx(&mut self) -> Context<'_> {
        Context {
            store: &mut self.store,
            storage: &self.storage,
            cache: &mut self.cache,
            queue: &mut self.queue,
            blobs: &self.blobs,
            sanitizer: &self.sanitizer,
            settings: &self.settings,
        }
    }

    fn actor(&self) -> Result<User, CliError> {
        Ok(auth::current_user(&self.store, self.token.as_deref())?.clone())
    }

    /// Runs queued notification jobs and persists the notifications they
    /// produced.
    fn deliver(&mut self) -> Result<(), CliError> {
        if self.queue.is_empty() {
            return Ok(());
        }
        let report = delivery::drain(
            &mut self.queue,
            &mut StoreSink::new(&mut self.store),
            &LogMailer,
        );
        info!(
            notifications = report.notifications,
            emails = report.emails,
            failures = report.failures,
            "queued jobs delivered"
        );
        if report.notifications > 0 {
            self.storage.save(&self.store)?;
        }
        Ok(())
    }

    fn reload(&mut self) -> Result<(), CliError> {
        self.store = self.storage.load()?;
        Ok(())
    }

    fn emit<T: Serialize + ?Sized>(&self, value: &T, render: impl FnOnce(&T)) -> Result<(), CliError> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            render(value);
        }
        Ok(())
    }

    fn done(&self, message: &str) -> Result<(), CliError> {
        self.emit(&serde_json::json!({ "message": message }), |_| {
            ui::render_success(message)
        })
    }
}

fn setup_logging(settings: &Settings, verbose: bool) {
    let default = if verbose {
        "taskhub=debug"
    } else {
        settings.log_filter.as_str()
    };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default))
        .unwrap_or_else(|_| EnvFilter::new("taskhub=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn main() {
    let cli = Cli::parse();

    let mut settings = match Settings::load(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            ui::render_error(&e.to_string());
            process::exit(1);
        }
    };
    if let Some(data_dir) = cli.data_dir.clone() {
        settings.data_dir = data_dir;
    }
    setup_logging(&settings, cli.verbose);

    let result =
        App::open(settings, cli.token.clone(), cli.json).and_then(|mut app| run(&mut app, cli.command));
    if let Err(e) = result {
        ui::render_error(&e.message());
        process::exit(e.exit_code());
    }
}

fn run(app: &mut App, command: Commands) -> Result<(), CliError> {
    match command {
        Commands::Login { email, password } => {
            let result = auth::login(&mut app.ctx(), auth::LoginParameters { email, password })?;
            let session = app.settings.session_path();
            write_session(&session, &result.token)?;
            let summary = UserSummary::from(&result.user);
            app.emit(
                &serde_json::json!({ "token": result.token, "user": summary }),
                |_| ui::render_success(&format!("Logged in as {}", summary.name)),
            )?;
        }
        Commands::Whoami => {
            let actor = app.actor()?;
            let summary = serde_json::json!({
                "user": UserSummary::from(&actor),
                "role": actor.role,
            });
            app.emit(&summary, |_| ui::render_user(&actor))?;
        }
        Commands::Logout => {
            let token = app.token.clone().ok_or(ServiceError::Unauthenticated)?;
            auth::logout(&mut app.ctx(), &token)?;
            let session = app.settings.session_path();
            match fs::remove_file(&session) {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                    return Err(io_error(&session)(e));
                }
                _ => {}
            }
            app.done("Logged out")?;
        }
        Commands::CreateAdmin {
            name,
            email,
            password,
        } => {
            let user = auth::create_admin(
                &mut app.ctx(),
                auth::CreateUserParameters {
                    name,
                    email,
                    password,
                    role: GlobalRole::Admin,
                },
            )?;
            app.emit(&UserSummary::from(&user), |u| {
                ui::render_success(&format!("Administrator {} created (#{})", u.name, u.id))
            })?;
        }
        Commands::User(command) => run_user(app, command)?,
        Commands::Team(command) => run_team(app, command)?,
        Commands::Project(command) => run_project(app, command)?,
        Commands::Task(command) => run_task(app, command)?,
        Commands::Comment(command) => run_comment(app, command)?,
        Commands::Attachment(command) => run_attachment(app, command)?,
        Commands::Notification(command) => run_notification(app, command)?,
        Commands::SweepOverdue { daemon } => loop {
            let today = services::today();
            let count = tasks::sweep_overdue(&mut app.ctx(), today)?;
            app.deliver()?;
            app.emit(&serde_json::json!({ "date": today, "marked_overdue": count }), |_| {
                ui::render_success(&format!("{count} task(s) marked overdue on {today}"))
            })?;
            if !daemon {
                break;
            }
            info!(hours = SWEEP_INTERVAL.as_secs() / 3600, "waiting for the next sweep");
            thread::sleep(SWEEP_INTERVAL);
            // other invocations may have written in the meantime
            app.reload()?;
        },
    }
    app.deliver()?;
    if !app.cache.is_empty() {
        let (hits, misses) = app.cache.stats();
        debug!(entries = app.cache.len(), hits, misses, "view cache");
    }
    Ok(())
}

fn run_user(app: &mut App, command: UserCommands) -> Result<(), CliError> {
    let actor = app.actor()?;
    match command {
        UserCommands::Create {
            name,
            email,
            password,
            role,
        } => {
            let user = auth::create_user(
                &mut app.ctx(),
                &actor,
                auth::CreateUserParameters {
                    name,
                    email,
                    password,
                    role: role.parse()?,
                },
            )?;
            app.emit(&UserSummary::from(&user), |u| {
                ui::render_success(&format!("User {} created (#{})", u.name, u.id))
            })?;
        }
    }
    Ok(())
}

fn run_team(app: &mut App, command: TeamCommands) -> Result<(), CliError> {
    let actor = app.actor()?;
    match command {
        TeamCommands::List => {
            let teams = teams::list_teams(&mut app.ctx(), &actor)?;
            app.emit(&teams, |t| ui::render_team_list(t))?;
        }
        TeamCommands::Create { name } => {
            let view = teams::create_team(&mut app.ctx(), &actor, teams::CreateTeamParameters { name })?;
            app.emit(&view, |v| {
                ui::render_success(&format!("Team {} created with slug {}", v.team.name, v.team.slug))
            })?;
        }
        TeamCommands::Show { id } => {
            let view = teams::show_team(&app.ctx(), &actor, id)?;
            app.emit(&view, ui::render_team)?;
        }
        TeamCommands::Update { id, name } => {
            let view = teams::update_team(&mut app.ctx(), &actor, id, teams::UpdateTeamParameters { name })?;
            app.emit(&view, ui::render_team)?;
        }
        TeamCommands::Delete { id } => {
            teams::delete_team(&mut app.ctx(), &actor, id)?;
            app.done(&format!("Team #{id} deleted"))?;
        }
        TeamCommands::AddMember {
            team_id,
            user_id,
            role,
        } => {
            let parameters = teams::TeamMemberParameters {
                user_id,
                role: role.parse::<TeamRole>()?,
            };
            let view = teams::add_member(&mut app.ctx(), &actor, team_id, parameters)?;
            app.emit(&view, ui::render_team)?;
        }
        TeamCommands::UpdateMember {
            team_id,
            user_id,
            role,
        } => {
            let parameters = teams::TeamMemberParameters {
                user_id,
                role: role.parse::<TeamRole>()?,
            };
            let view = teams::update_member(&mut app.ctx(), &actor, team_id, parameters)?;
            app.emit(&view, ui::render_team)?;
        }
        TeamCommands::RemoveMember { team_id, user_id } => {
            let view = teams::remove_member(&mut app.ctx(), &actor, team_id, user_id)?;
            app.emit(&view, ui::render_team)?;
        }
    }
    Ok(())
}

fn run_project(app: &mut App, command: ProjectCommands) -> Result<(), CliError> {
    let actor = app.actor()?;
    match command {
        ProjectCommands::List { active, status } => {
            let filter = match parse_optional::<ProjectStatus>(status)? {
                Some(status) => projects::ProjectFilter::Status(status),
                None if active => projects::ProjectFilter::Active,
                None => projects::ProjectFilter::All,
            };
            let summaries = projects::list_projects(&app.ctx(), &actor, filter)?;
            app.emit(&summaries, |s| ui::render_project_list(s))?;
        }
        ProjectCommands::Create {
            team_id,
            name,
            description,
            status,
            due,
            member,
        } => {
            let parameters = projects::CreateProjectParameters {
                team_id,
                name,
                description,
                status: parse_optional(status)?,
                due_date: due.as_deref().map(parse_date).transpose()?,
                members: member
                    .iter()
                    .map(|m| parse_project_member(m))
                    .collect::<Result<_, _>>()?,
            };
            let detail = projects::create_project(&mut app.ctx(), &actor, parameters)?;
            app.emit(&detail, |d| {
                ui::render_success(&format!("Project {} created (#{})", d.project.name, d.project.id))
            })?;
        }
        ProjectCommands::Show { id } => {
            let detail = projects::show_project(&mut app.ctx(), &actor, id)?;
            app.emit(&detail, ui::render_project)?;
        }
        ProjectCommands::Update {
            id,
            name,
            description,
            clear_description,
            status,
            due,
            clear_due,
        } => {
            let parameters = projects::UpdateProjectParameters {
                name,
                description: field_change(description, clear_description),
                status: parse_optional(status)?,
                due_date: field_change(due.as_deref().map(parse_date).transpose()?, clear_due),
            };
            let detail = projects::update_project(&mut app.ctx(), &actor, id, parameters)?;
            app.emit(&detail, ui::render_project)?;
        }
        ProjectCommands::Delete { id } => {
            projects::delete_project(&mut app.ctx(), &actor, id)?;
            app.done(&format!("Project #{id} deleted"))?;
        }
        ProjectCommands::AddMember {
            project_id,
            user_id,
            role,
        } => {
            let parameters = projects::ProjectMemberParameters {
                user_id,
                role: role.parse::<ProjectRole>()?,
            };
            let detail = projects::add_member(&mut app.ctx(), &actor, project_id, parameters)?;
            app.emit(&detail, ui::render_project)?;
        }
        ProjectCommands::UpdateMember {
            project_id,
            user_id,
            role,
        } => {
            let parameters = projects::ProjectMemberParameters {
                user_id,
                role: role.parse::<ProjectRole>()?,
            };
            let detail = projects::update_member(&mut app.ctx(), &actor, project_id, parameters)?;
            app.emit(&detail, ui::render_project)?;
        }
        ProjectCommands::RemoveMember {
            project_id,
            user_id,
        } => {
            let detail = projects::remove_member(&mut app.ctx(), &actor, project_id, user_id)?;
            app.emit(&detail, ui::render_project)?;
        }
    }
    Ok(())
}

fn run_task(app: &mut App, command: TaskCommands) -> Result<(), CliError> {
    let actor = app.actor()?;
    match command {
        TaskCommands::List { project, overdue } => {
            let filter = tasks::TaskFilter {
                project_id: project,
                overdue,
            };
            let views = tasks::list_tasks(&app.ctx(), &actor, filter)?;
            app.emit(&views, |v| ui::render_task_list(v))?;
        }
        TaskCommands::Create {
            project_id,
            name,
            description,
            status,
            priority,
            due,
            assign,
        } => {
            let parameters = tasks::CreateTaskParameters {
                project_id,
                name,
                description,
                status: parse_optional::<TaskStatus>(status)?,
                priority: parse_optional::<TaskPriority>(priority)?,
                due_date: due.as_deref().map(parse_date).transpose()?,
                assigned_to_user_id: assign,
            };
            let view = tasks::create_task(&mut app.ctx(), &actor, parameters)?;
            app.emit(&view, |v| {
                ui::render_success(&format!("Task added: {}", v.task.name));
                println!("  #{}", v.task.id);
            })?;
        }
        TaskCommands::Show { id } => {
            let view = tasks::show_task(&app.ctx(), &actor, id)?;
            app.emit(&view, ui::render_task)?;
        }
        TaskCommands::Update {
            id,
            name,
            description,
            clear_description,
            status,
            priority,
            due,
            clear_due,
            assign,
            unassign,
        } => {
            let parameters = tasks::UpdateTaskParameters {
                name,
                description: field_change(description, clear_description),
                status: parse_optional(status)?,
                priority: parse_optional(priority)?,
                due_date: field_change(due.as_deref().map(parse_date).transpose()?, clear_due),
                assigned_to_user_id: field_change(assign, unassign),
            };
            let view = tasks::update_task(&mut app.ctx(), &actor, id, parameters)?;
            app.emit(&view, ui::render_task)?;
        }
        TaskCommands::Delete { id } => {
            tasks::delete_task(&mut app.ctx(), &actor, id)?;
            app.done(&format!("Task #{id} deleted"))?;
        }
    }
    Ok(())
}

fn run_comment(app: &mut App, command: CommentCommands) -> Result<(), CliError> {
    let actor = app.actor()?;
    match command {
        CommentCommands::List {
            target_type,
            target_id,
        } => {
            let on = Commentable::parse(&target_type, target_id)?;
            let views = comments::list_comments(&app.ctx(), &actor, on)?;
            app.emit(&views, |v| ui::render_comment_list(v))?;
        }
        CommentCommands::Create {
            target_type,
            target_id,
            content,
        } => {
            let parameters = comments::CreateCommentParameters {
                commentable: Commentable::parse(&target_type, target_id)?,
                content,
            };
            let view = comments::create_comment(&mut app.ctx(), &actor, parameters)?;
            app.emit(&view, |v| {
                ui::render_success(&format!("Comment #{} added to {}", v.comment.id, v.comment.commentable))
            })?;
        }
        CommentCommands::Show { id } => {
            let view = comments::show_comment(&app.ctx(), &actor, id)?;
            app.emit(&view, ui::render_comment)?;
        }
        CommentCommands::Update { id, content } => {
            let parameters = comments::UpdateCommentParameters { content };
            let view = comments::update_comment(&mut app.ctx(), &actor, id, parameters)?;
            app.emit(&view, ui::render_comment)?;
        }
        CommentCommands::Delete { id } => {
            comments::delete_comment(&mut app.ctx(), &actor, id)?;
            app.done(&format!("Comment #{id} deleted"))?;
        }
    }
    Ok(())
}

fn run_attachment(app: &mut App, command: AttachmentCommands) -> Result<(), CliError> {
    let actor = app.actor()?;
    match command {
        AttachmentCommands::List {
            target_type,
            target_id,
        } => {
            let on = Attachable::parse(&target_type, target_id)?;
            let views = attachments::list_attachments(&app.ctx(), &actor, on)?;
            app.emit(&views, |v| ui::render_attachment_list(v))?;
        }
        AttachmentCommands::Upload {
            target_type,
            target_id,
            file,
            name,
        } => {
            let attachable = Attachable::parse(&target_type, target_id)?;
            let bytes = fs::read(&file).map_err(io_error(&file))?;
            let file_name = name
                .or_else(|| {
                    file.file_name()
                        .and_then(|n| n.to_str())
                        .map(str::to_string)
                })
                .unwrap_or_default();
            let parameters = attachments::UploadParameters {
                attachable,
                file_name,
                bytes,
            };
            let view = attachments::upload_attachment(&mut app.ctx(), &actor, parameters)?;
            app.emit(&view, |v| {
                ui::render_success(&format!(
                    "Uploaded {} to {} (#{})",
                    v.attachment.file_name, v.attachment.attachable, v.attachment.id
                ))
            })?;
        }
        AttachmentCommands::Show { id } => {
            let view = attachments::show_attachment(&app.ctx(), &actor, id)?;
            app.emit(&view, ui::render_attachment)?;
        }
        AttachmentCommands::Download { id, output } => {
            let (view, bytes) = attachments::download_attachment(&app.ctx(), &actor, id)?;
            let target = output.unwrap_or_else(|| PathBuf::from(&view.attachment.file_name));
            fs::write(&target, &bytes).map_err(io_error(&target))?;
            app.done(&format!("Saved {} ({} bytes)", target.display(), bytes.len()))?;
        }
        AttachmentCommands::Rename { id, name } => {
            let parameters = attachments::UpdateAttachmentParameters {
                file_name: Some(name),
            };
            let view = attachments::update_attachment(&mut app.ctx(), &actor, id, parameters)?;
            app.emit(&view, ui::render_attachment)?;
        }
        AttachmentCommands::Delete { id } => {
            attachments::delete_attachment(&mut app.ctx(), &actor, id)?;
            app.done(&format!("Attachment #{id} deleted"))?;
        }
    }
    Ok(())
}

fn run_notification(app: &mut App, command: NotificationCommands) -> Result<(), CliError> {
    let actor = app.actor()?;
    match command {
        NotificationCommands::List { unread } => {
            let list = notifications::list_notifications(&app.ctx(), &actor, unread);
            app.emit(&list, |l| ui::render_notification_list(l))?;
        }
        NotificationCommands::Show { id } => {
            let notification = notifications::show_notification(&app.ctx(), &actor, id)?;
            app.emit(&notification, ui::render_notification)?;
        }
        NotificationCommands::Read { id } => {
            let notification = notifications::mark_read(&mut app.ctx(), &actor, id)?;
            app.emit(&notification, ui::render_notification)?;
        }
        NotificationCommands::Delete { id } => {
            notifications::delete_notification(&mut app.ctx(), &actor, id)?;
            app.done("Notification deleted")?;
        }
        NotificationCommands::ReadAll => {
            let count = notifications::mark_all_read(&mut app.ctx(), &actor)?;
            app.done(&format!("{count} notification(s) marked read"))?;
        }
        NotificationCommands::UnreadCount => {
            let count = notifications::unread_count(&app.ctx(), &actor);
            app.emit(&serde_json::json!({ "unread": count }), |_| {
                println!("{} unread", count.to_string().cyan().bold())
            })?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[rstest]
    #[case(ServiceError::Validation("x".into()), 2)]
    #[case(ServiceError::Unauthenticated, 3)]
    #[case(ServiceError::Unauthorized, 3)]
    #[case(ServiceError::NotFound("x".into()), 4)]
    #[case(ServiceError::Conflict("x".into()), 5)]
    #[case(ServiceError::InvariantViolation("x".into()), 5)]
    #[case(ServiceError::Storage(StorageError::FutureVersion(9)), 1)]
    fn test_exit_codes(#[case] error: ServiceError, #[case] code: i32) {
        assert_eq!(CliError::from(error).exit_code(), code);
    }

    #[test]
    fn test_project_member_argument() {
        let parsed = parse_project_member("7:project_manager").unwrap();
        assert_eq!(parsed.user_id, 7);
        assert_eq!(parsed.role, ProjectRole::ProjectManager);
        assert_eq!(parse_project_member("8").unwrap().role, ProjectRole::Member);
        assert_eq!(parse_project_member("x:member").unwrap_err().exit_code(), 2);
        assert_eq!(parse_project_member("9:owner").unwrap_err().exit_code(), 2);
    }

    #[cfg(unix)]
    #[test]
    fn test_session_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session");
        fs::write(&path, "stale").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

        write_session(&path, "fresh-token").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "fresh-token");
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_field_change() {
        assert_eq!(field_change(Some(3), false), Some(Some(3)));
        assert_eq!(field_change::<u64>(None, true), Some(None));
        assert_eq!(field_change::<u64>(None, false), None);
    }

    #[test]
    fn test_dates_and_flags_parse() {
        assert_eq!(parse_date("2025-03-01").unwrap(), jiff::civil::date(2025, 3, 1));
        assert_eq!(parse_date("next friday").unwrap_err().exit_code(), 2);

        let cli = Cli::try_parse_from([
            "taskhub", "--json", "task", "update", "4", "--status", "completed", "--unassign",
        ])
        .unwrap();
        assert!(cli.json);
        assert!(matches!(
            cli.command,
            Commands::Task(TaskCommands::Update { id: 4, unassign: true, .. })
        ));
        assert!(Cli::try_parse_from(["taskhub", "task", "update", "4", "--assign", "2", "--unassign"]).is_err());
    }
}
