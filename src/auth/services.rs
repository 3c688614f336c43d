use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    auth::{
        dto::{AuthResponse, LoginRequest, PublicUser, RegisterRequest},
        jwt::JwtKeys,
        password::{hash_password, verify_password},
        repo::UserStore,
        repo_types::{NewUser, User},
    },
    error::{is_unique_violation, AuthError},
};

pub const MIN_PASSWORD_LEN: usize = 8;

lazy_static! {
    // Stand-in verified for unknown emails; both login failures cost one argon2 run.
    static ref DUMMY_HASH: Option<String> = hash_password("login-timing-equalizer").ok();
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn issue(keys: &JwtKeys, user: User) -> Result<AuthResponse, AuthError> {
    let access_token = keys.sign(user.id, &user.email)?;
    Ok(AuthResponse {
        user: user.into(),
        access_token,
    })
}

/// Creates an account and signs a token for it.
///
/// Email uniqueness is checked before the insert; a concurrent insert that
/// slips past the check is caught by the unique index and reported the same way.
pub async fn register(
    users: &dyn UserStore,
    keys: &JwtKeys,
    req: RegisterRequest,
) -> Result<AuthResponse, AuthError> {
    let name = req.name.trim().to_string();
    let email = normalize_email(&req.email);

    if name.is_empty() {
        return Err(AuthError::Validation("Name is required".into()));
    }
    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(AuthError::Validation("Invalid email".into()));
    }
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        warn!("password too short");
        return Err(AuthError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    if users.find_by_email(&email).await?.is_some() {
        warn!(email = %email, "email already registered");
        return Err(AuthError::Conflict);
    }

    let password_hash = hash_password(&req.password)?;

    let user = match users
        .create(NewUser {
            email,
            name,
            password_hash,
        })
        .await
    {
        Ok(u) => u,
        Err(e) if is_unique_violation(&e) => {
            warn!("email registered concurrently");
            return Err(AuthError::Conflict);
        }
        Err(e) => return Err(e.into()),
    };

    info!(user_id = %user.id, email = %user.email, "user registered");
    issue(keys, user)
}

/// Unknown email and wrong password produce the same error.
pub async fn login(
    users: &dyn UserStore,
    keys: &JwtKeys,
    req: LoginRequest,
) -> Result<AuthResponse, AuthError> {
    let email = normalize_email(&req.email);

    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(AuthError::Validation("Invalid email".into()));
    }
    if req.password.is_empty() {
        return Err(AuthError::Validation("Password is required".into()));
    }

    let Some(user) = users.find_by_email(&email).await? else {
        if let Some(hash) = DUMMY_HASH.as_deref() {
            let _ = verify_password(&req.password, hash);
        }
        warn!(email = %email, "login unknown email");
        return Err(AuthError::InvalidCredentials);
    };

    if !verify_password(&req.password, &user.password_hash)? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(AuthError::InvalidCredentials);
    }

    info!(user_id = %user.id, email = %user.email, "user logged in");
    issue(keys, user)
}

/// Resolves the user behind a token subject.
pub async fn validate_user_by_id(users: &dyn UserStore, id: Uuid) -> Result<PublicUser, AuthError> {
    match users.find_by_id(id).await? {
        Some(user) => Ok(user.into()),
        None => {
            warn!(user_id = %id, "token subject not found");
            Err(AuthError::UserNotFound)
        }
    }
}
