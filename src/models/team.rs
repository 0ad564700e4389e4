use std::{fmt, str::FromStr};

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::models::{InvalidChoice, TeamId, UserId, project::Project, user::UserSummary};

#[derive(Serialize, Deserialize, Default, Clone, Debug, PartialEq)]
pub struct Team {
    /// Numeric id of the team
    pub id: TeamId,
    /// Display name, unique across teams (compared by slug)
    pub name: String,
    /// Slug of the name, used for the uniqueness check
    pub slug: String,
    /// The single owner of the team
    pub owner_id: UserId,
    /// Created at timestamp of the team
    pub created_at: Timestamp,
}

#[derive(Serialize, Deserialize, Default, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TeamRole {
    TeamAdmin,
    #[default]
    Member,
}

impl TeamRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TeamRole::TeamAdmin => "team_admin",
            TeamRole::Member => "member",
        }
    }
}

impl fmt::Display for TeamRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TeamRole {
    type Err = InvalidChoice;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "team_admin" => Ok(TeamRole::TeamAdmin),
            "member" => Ok(TeamRole::Member),
            other => Err(InvalidChoice::new("role", other)),
        }
    }
}

/// Membership edge between a user and a team.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TeamMember {
    pub team_id: TeamId,
    pub user_id: UserId,
    pub role: TeamRole,
    pub joined_at: Timestamp,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TeamMemberView {
    pub user: UserSummary,
    pub role: TeamRole,
}

/// A team hydrated with its owner, members and projects.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct TeamView {
    pub team: Team,
    pub owner: Option<UserSummary>,
    pub members: Vec<TeamMemberView>,
    pub projects: Vec<Project>,
}
