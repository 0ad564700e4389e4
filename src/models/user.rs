use std::{fmt, str::FromStr};

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::models::{InvalidChoice, UserId};

#[derive(Serialize, Deserialize, Default, Clone, Debug)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    /// PHC string produced by the password hasher, never rendered
    #[serde(default)]
    pub password_hash: String,
    pub role: GlobalRole,
    pub created_at: Timestamp,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == GlobalRole::Admin
    }

    pub fn has_role(&self, role: GlobalRole) -> bool {
        self.role == role
    }
}

/// System-wide role carried by every user.
#[derive(Serialize, Deserialize, Default, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GlobalRole {
    Admin,
    ProjectManager,
    #[default]
    Member,
}

impl GlobalRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            GlobalRole::Admin => "admin",
            GlobalRole::ProjectManager => "project_manager",
            GlobalRole::Member => "member",
        }
    }
}

impl fmt::Display for GlobalRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GlobalRole {
    type Err = InvalidChoice;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(GlobalRole::Admin),
            "project_manager" => Ok(GlobalRole::ProjectManager),
            "member" => Ok(GlobalRole::Member),
            other => Err(InvalidChoice::new("role", other)),
        }
    }
}

/// Bearer credential issued at login.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AccessToken {
    pub token: String,
    pub user_id: UserId,
    pub created_at: Timestamp,
}

/// The public face of a user inside hydrated views.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct UserSummary {
    pub id: UserId,
    pub name: String,
    pub email: String,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
        }
    }
}
