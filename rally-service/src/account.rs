// Copyright 2023 Rally Contributors
// SPDX-License-Identifier: Apache-2.0

//! Accounts: registration, email confirmation, login, token rotation and the profile surface.
//!
//! Registration creates an inactive user; only the signed confirmation token activates it.
//! Access tokens carry the `api` audience, refresh tokens `refresh`, confirmation tokens
//! `confirm`. One signing secret, disjoint audiences.

use rally_common::auth::{jwt::JsonWebToken, password};
use rally_model::{dto::ProfileDto, User, UserId};
use rally_storage::Store;

use crate::{
    error::Error,
    mailer::{DynMailer, OutgoingEmail},
};

/// Issuer claim of every token.
const TOKEN_ISSUER: &str = "rally";
/// Lifetime of an access token.
const ACCESS_TTL_SECS: u64 = 15 * 60;
/// Lifetime of a refresh token.
const REFRESH_TTL_SECS: u64 = 14 * 24 * 60 * 60;
/// Lifetime of a confirmation token.
const CONFIRM_TTL_SECS: u64 = 48 * 60 * 60;

/// Audience of access tokens.
pub const AUDIENCE_API: &str = "api";
/// Audience of refresh tokens.
pub const AUDIENCE_REFRESH: &str = "refresh";
/// Audience of confirmation tokens.
pub const AUDIENCE_CONFIRM: &str = "confirm";

const PASSWORD_MIN: usize = 8;

/// A freshly issued access/refresh pair.
#[derive(Debug, Clone)]
pub struct TokenPair {
    /// Bearer token for requests.
    pub access: String,
    /// Token for rotation.
    pub refresh: String,
}

/// Input of registration.
#[derive(Debug, Clone)]
pub struct RegisterInput {
    /// Email address; unique case-insensitively.
    pub email: String,
    /// Password; at least 8 chars with a letter and a digit.
    pub password: String,
    /// Optional display name.
    pub name: Option<String>,
}

/// Partial profile update.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    /// New display name; `Some(None)` clears it.
    pub name: Option<Option<String>>,
    /// New notification opt-in.
    pub email_notifications_enabled: Option<bool>,
}

/// The accounts service.
#[derive(Clone)]
pub struct AccountService {
    store: Store,
    mailer: DynMailer,
    secret: Vec<u8>,
    front_url: String,
}

fn validate_email(email: &str) -> Result<String, Error> {
    let email = email.trim().to_lowercase();
    let well_formed = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        None => false,
    };
    if !well_formed {
        return Err(Error::validation("email", "A valid email address is required."));
    }
    Ok(email)
}

fn validate_password(password: &str) -> Result<(), Error> {
    if password.chars().count() < PASSWORD_MIN {
        return Err(Error::validation(
            "password",
            "Password must be at least 8 characters long.",
        ));
    }
    let has_letter = password.chars().any(|c| c.is_alphabetic());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    if !has_letter || !has_digit {
        return Err(Error::validation(
            "password",
            "Password must contain at least one letter and one digit.",
        ));
    }
    Ok(())
}

impl AccountService {
    /// Creates the service.
    pub fn new(store: Store, mailer: DynMailer, secret: Vec<u8>, front_url: String) -> Self {
        Self {
            store,
            mailer,
            secret,
            front_url: front_url.trim_end_matches('/').to_string(),
        }
    }

    fn issue(&self, user: UserId, audience: &str, ttl: u64) -> Result<String, Error> {
        JsonWebToken::new(
            TOKEN_ISSUER.to_string(),
            user.to_string(),
            audience.to_string(),
            ttl,
            &self.secret,
        )
        .map(|jwt| jwt.to_string())
        .map_err(|_| Error::Unauthorized)
    }

    fn decode(&self, token: &str, audience: &str) -> Option<UserId> {
        JsonWebToken::from(token.to_string())
            .validate(TOKEN_ISSUER.to_string(), audience.to_string(), &self.secret)
            .ok()
            .and_then(|data| data.claims.subject().parse().ok())
    }

    fn token_pair(&self, user: UserId) -> Result<TokenPair, Error> {
        Ok(TokenPair {
            access: self.issue(user, AUDIENCE_API, ACCESS_TTL_SECS)?,
            refresh: self.issue(user, AUDIENCE_REFRESH, REFRESH_TTL_SECS)?,
        })
    }

    async fn send_confirmation(&self, user: UserId, email: &str) {
        let token = match self.issue(user, AUDIENCE_CONFIRM, CONFIRM_TTL_SECS) {
            Ok(token) => token,
            Err(_) => {
                log::error!("signing confirmation token for `{}` failed", email);
                return;
            }
        };
        let link = format!("{}/confirm?token={}", self.front_url, token);
        if let Err(e) = self
            .mailer
            .send(OutgoingEmail {
                to: email.to_string(),
                subject: "Confirm your account".to_string(),
                body: format!("Welcome! Confirm your account within 48 hours: {}", link),
            })
            .await
        {
            // Registration stands; the user can ask for a resend.
            log::warn!("sending confirmation to `{}` failed: {}", email, e);
        }
    }

    /// Registers an inactive account and dispatches the confirmation email.
    pub async fn register(&self, input: RegisterInput) -> Result<ProfileDto, Error> {
        let email = validate_email(&input.email)?;
        validate_password(&input.password)?;
        let now = rally_common::time::now_utc();

        let salt = password::generate_salt();
        let hash = password::password_hash(input.password.as_bytes(), &salt)
            .map_err(|_| Error::invalid("Hashing the password failed."))?;

        let profile = self
            .store
            .transaction(|tables| {
                if tables.user_by_email(&email).is_some() {
                    return Err(Error::validation("email", "An account with this email already exists."));
                }
                let id = tables.users.next_id();
                tables.users.insert(
                    id,
                    User {
                        id,
                        email: email.clone(),
                        name: input.name.clone().filter(|n| !n.trim().is_empty()),
                        avatar_url: None,
                        is_active: false,
                        is_staff: false,
                        is_superuser: false,
                        email_notifications_enabled: true,
                        password_hash: hash.clone(),
                        password_salt: salt.to_vec(),
                        created_at: now,
                    },
                );
                Ok(ProfileDto::from_user(tables.users.get(id).expect("just inserted")))
            })
            .await?;

        self.send_confirmation(profile.id, &profile.email).await;
        Ok(profile)
    }

    /// Re-sends the confirmation email. Answers uniformly so accounts cannot be probed.
    pub async fn resend_confirmation(&self, email: &str) -> Result<(), Error> {
        let email = validate_email(email)?;
        let pending = self
            .store
            .view(|tables| {
                tables
                    .user_by_email(&email)
                    .filter(|u| !u.is_active)
                    .map(|u| (u.id, u.email.clone()))
            })
            .await;

        if let Some((id, email)) = pending {
            self.send_confirmation(id, &email).await;
        }
        Ok(())
    }

    /// Activates the account a confirmation token was issued for.
    pub async fn confirm(&self, token: &str) -> Result<(), Error> {
        let user = self
            .decode(token, AUDIENCE_CONFIRM)
            .ok_or_else(|| Error::Token("The confirmation link is invalid or has expired.".to_string()))?;

        self.store
            .transaction(|tables| {
                let row = tables
                    .users
                    .get_mut(user)
                    .ok_or_else(|| Error::Token("The confirmation link is invalid or has expired.".to_string()))?;
                row.is_active = true;
                Ok(())
            })
            .await
    }

    /// Issues a token pair for valid credentials. Inactive accounts are rejected with a
    /// validation error, wrong credentials with 401.
    pub async fn login(&self, email: &str, password_input: &str) -> Result<(TokenPair, ProfileDto), Error> {
        let email = validate_email(email)?;

        let user = self
            .store
            .view(|tables| tables.user_by_email(&email).cloned())
            .await
            .ok_or(Error::Unauthorized)?;

        let matches = password::password_verify(password_input.as_bytes(), &user.password_salt, &user.password_hash)
            .map_err(|_| Error::Unauthorized)?;
        if !matches {
            return Err(Error::Unauthorized);
        }
        if !user.is_active {
            return Err(Error::validation("email", "The account is not confirmed yet."));
        }

        Ok((self.token_pair(user.id)?, ProfileDto::from_user(&user)))
    }

    /// Rotates a refresh token into a fresh pair.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, Error> {
        let user = self.decode(refresh_token, AUDIENCE_REFRESH).ok_or(Error::Unauthorized)?;
        let active = self
            .store
            .view(|tables| tables.users.get(user).map(|u| u.is_active).unwrap_or(false))
            .await;
        if !active {
            return Err(Error::Unauthorized);
        }
        self.token_pair(user)
    }

    /// Resolves a bearer access token to an active user. Used by HTTP auth and the WebSocket
    /// handshake alike.
    pub async fn authenticate(&self, access_token: &str) -> Result<UserId, Error> {
        let user = self.decode(access_token, AUDIENCE_API).ok_or(Error::Unauthorized)?;
        let active = self
            .store
            .view(|tables| tables.users.get(user).map(|u| u.is_active).unwrap_or(false))
            .await;
        if !active {
            return Err(Error::Unauthorized);
        }
        Ok(user)
    }

    /// Serves the caller's profile.
    pub async fn profile(&self, user: UserId) -> Result<ProfileDto, Error> {
        self.store
            .view(|tables| tables.users.get(user).map(ProfileDto::from_user))
            .await
            .ok_or(Error::Unauthorized)
    }

    /// Applies a partial profile update.
    pub async fn update_profile(&self, user: UserId, update: ProfileUpdate) -> Result<ProfileDto, Error> {
        self.store
            .transaction(|tables| {
                let row = tables.users.get_mut(user).ok_or(Error::Unauthorized)?;
                if let Some(name) = update.name.clone() {
                    row.name = name.filter(|n| !n.trim().is_empty());
                }
                if let Some(enabled) = update.email_notifications_enabled {
                    row.email_notifications_enabled = enabled;
                }
                Ok(ProfileDto::from_user(row))
            })
            .await
    }

    /// Changes the caller's password.
    pub async fn change_password(&self, user: UserId, old: &str, new: &str) -> Result<(), Error> {
        validate_password(new)?;
        if old == new {
            return Err(Error::validation(
                "new_password",
                "New password must be different from the current password.",
            ));
        }

        let salt = password::generate_salt();
        let hash = password::password_hash(new.as_bytes(), &salt)
            .map_err(|_| Error::invalid("Hashing the password failed."))?;

        let old = old.to_string();
        self.store
            .transaction(move |tables| {
                let row = tables.users.get_mut(user).ok_or(Error::Unauthorized)?;
                let matches = password::password_verify(old.as_bytes(), &row.password_salt, &row.password_hash)
                    .map_err(|_| Error::Unauthorized)?;
                if !matches {
                    return Err(Error::validation("old_password", "Current password is incorrect."));
                }
                row.password_hash = hash.clone();
                row.password_salt = salt.to_vec();
                Ok(())
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_validation_normalizes_case() {
        assert_eq!(validate_email(" Ada@Example.COM ").unwrap(), "ada@example.com");
        assert!(validate_email("nope").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("ada@nodot").is_err());
    }

    #[test]
    fn password_policy() {
        assert!(validate_password("abc123def").is_ok());
        assert!(validate_password("short1").is_err());
        assert!(validate_password("allletters").is_err());
        assert!(validate_password("123456789").is_err());
    }
}
