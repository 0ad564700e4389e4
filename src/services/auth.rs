use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use jiff::Timestamp;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::{
    models::{
        store::Store,
        user::{AccessToken, GlobalRole, User},
    },
    services::{Context, ServiceError, max_length, required},
};

#[derive(Error, Debug)]
pub enum PasswordError {
    #[error("Failed to hash password: {0}")]
    HashingFailed(String),

    #[error("Failed to verify password: {0}")]
    VerificationFailed(String),

    #[error("Invalid password hash format: {0}")]
    InvalidHashFormat(String),
}

/// Argon2id hash in PHC string format.
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PasswordError::HashingFailed(e.to_string()))
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, PasswordError> {
    let parsed =
        PasswordHash::new(hash).map_err(|e| PasswordError::InvalidHashFormat(e.to_string()))?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(PasswordError::VerificationFailed(e.to_string())),
    }
}

const MIN_PASSWORD_LENGTH: usize = 8;

pub struct CreateUserParameters {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: GlobalRole,
}

fn validate_new_user(store: &Store, parameters: &CreateUserParameters) -> Result<(), ServiceError> {
    required("name", &parameters.name)?;
    max_length("name", &parameters.name, 255)?;
    required("email", &parameters.email)?;
    max_length("email", &parameters.email, 255)?;
    if !parameters.email.contains('@') {
        return Err(ServiceError::Validation(
            "The email field must be a valid email address.".to_string(),
        ));
    }
    if parameters.password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ServiceError::Validation(format!(
            "The password field must be at least {MIN_PASSWORD_LENGTH} characters."
        )));
    }
    if store.find_user_by_email(&parameters.email).is_some() {
        return Err(ServiceError::Conflict(
            "The email has already been taken.".to_string(),
        ));
    }
    Ok(())
}

fn insert_user(ctx: &mut Context<'_>, parameters: CreateUserParameters) -> Result<User, ServiceError> {
    validate_new_user(ctx.store, &parameters)?;
    let password_hash = hash_password(&parameters.password)?;
    let id = ctx.store.add_user(User {
        id: 0,
        name: parameters.name.trim().to_string(),
        email: parameters.email.trim().to_lowercase(),
        password_hash,
        role: parameters.role,
        created_at: Timestamp::now(),
    });
    ctx.save()?;
    info!(user_id = id, role = %parameters.role, "user created");
    ctx.store
        .get_user(id)
        .cloned()
        .ok_or_else(|| ServiceError::not_found("User", id))
}

/// Creates a user on behalf of an administrator.
pub fn create_user(
    ctx: &mut Context<'_>,
    actor: &User,
    parameters: CreateUserParameters,
) -> Result<User, ServiceError> {
    if !actor.is_admin() {
        return Err(ServiceError::Unauthorized);
    }
    insert_user(ctx, parameters)
}

/// Console bootstrap of an administrator account; there is no actor yet.
pub fn create_admin(
    ctx: &mut Context<'_>,
    parameters: CreateUserParameters,
) -> Result<User, ServiceError> {
    insert_user(
        ctx,
        CreateUserParameters {
            role: GlobalRole::Admin,
            ..parameters
        },
    )
}

pub struct LoginParameters {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct LoginResult {
    pub token: String,
    pub user: User,
}

/// Verifies credentials and issues a fresh token. Earlier tokens of the user
/// stop working.
pub fn login(ctx: &mut Context<'_>, parameters: LoginParameters) -> Result<LoginResult, ServiceError> {
    let user = ctx
        .store
        .find_user_by_email(parameters.email.trim())
        .cloned()
        .ok_or(ServiceError::InvalidCredentials)?;
    if user.password_hash.is_empty() || !verify_password(&parameters.password, &user.password_hash)? {
        info!(user_id = user.id, "login rejected");
        return Err(ServiceError::InvalidCredentials);
    }

    let revoked = ctx.store.revoke_tokens_for(user.id);
    let token = Uuid::new_v4().to_string();
    ctx.store.add_token(AccessToken {
        token: token.clone(),
        user_id: user.id,
        created_at: Timestamp::now(),
    });
    ctx.save()?;
    info!(user_id = user.id, revoked, "user logged in");

    Ok(LoginResult { token, user })
}

pub fn logout(ctx: &mut Context<'_>, token: &str) -> Result<(), ServiceError> {
    if !ctx.store.revoke_token(token) {
        return Err(ServiceError::Unauthenticated);
    }
    ctx.save()?;
    info!("user logged out");
    Ok(())
}

/// Resolves the actor behind a bearer token.
pub fn current_user<'s>(store: &'s Store, token: Option<&str>) -> Result<&'s User, ServiceError> {
    let token = token.ok_or(ServiceError::Unauthenticated)?;
    let access = store.find_token(token).ok_or(ServiceError::Unauthenticated)?;
    store
        .get_user(access.user_id)
        .ok_or(ServiceError::Unauthenticated)
}
