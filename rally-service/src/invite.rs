// Copyright 2023 Rally Contributors
// SPDX-License-Identifier: Apache-2.0

//! The invite service.
//!
//! Tokens are opaque, URL-safe and carry 256 bits of entropy. `uses_count` only ever grows,
//! under the write lock, and re-checking the derived status inside the accept transaction is
//! what makes concurrent exhaustion races resolve to exactly one winner.

use rand::RngCore;
use time::Duration;

use rally_model::{
    dto::{EventSnippet, InviteDto, InviteValidationDto},
    EventId, Invite, InviteStatus, Participant, Role, UserId,
};
use rally_storage::Store;

use crate::{
    error::Error,
    policy::{Action, Viewer},
};

/// Bounds of `expires_in_hours`.
pub const EXPIRES_HOURS_MIN: i64 = 1;
/// Upper bound of `expires_in_hours` (one week).
pub const EXPIRES_HOURS_MAX: i64 = 168;
/// Upper bound of `max_uses`.
pub const MAX_USES_MAX: u32 = 1000;

/// Input of invite creation.
#[derive(Debug, Clone, Copy)]
pub struct InviteInput {
    /// Validity window in hours, within `[1, 168]`.
    pub expires_in_hours: i64,
    /// Maximum uses within `[0, 1000]`; 0 means unlimited.
    pub max_uses: u32,
}

/// Result of accepting an invite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptOutcome {
    /// The caller joined the event as member.
    Joined(EventId),
    /// The caller already participates; `uses_count` was left untouched.
    AlreadyMember(EventId),
}

/// The invites service.
#[derive(Clone)]
pub struct InviteService {
    store: Store,
    front_url: String,
}

fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    base64::encode_config(bytes, base64::URL_SAFE_NO_PAD)
}

fn status_code(status: InviteStatus) -> &'static str {
    match status {
        InviteStatus::Ok => "ok",
        InviteStatus::Expired => "expired",
        InviteStatus::Revoked => "revoked",
        InviteStatus::Exhausted => "exhausted",
        InviteStatus::NotFound => "not_found",
    }
}

impl InviteService {
    /// Creates the service; `front_url` is the base the join URL is built from.
    pub fn new(store: Store, front_url: String) -> Self {
        Self {
            store,
            front_url: front_url.trim_end_matches('/').to_string(),
        }
    }

    fn invite_url(&self, token: &str) -> String {
        format!("{}/join?token={}", self.front_url, token)
    }

    fn dto(&self, invite: &Invite) -> InviteDto {
        InviteDto {
            id: invite.id,
            event: invite.event,
            token: invite.token.clone(),
            invite_url: self.invite_url(&invite.token),
            expires_at: invite.expires_at,
            max_uses: invite.max_uses,
            uses_count: invite.uses_count,
            is_revoked: invite.is_revoked,
            created_at: invite.created_at,
        }
    }

    /// Creates an invite; owner-gated.
    pub async fn create(&self, event: EventId, user: UserId, input: InviteInput) -> Result<InviteDto, Error> {
        if !(EXPIRES_HOURS_MIN..=EXPIRES_HOURS_MAX).contains(&input.expires_in_hours) {
            return Err(Error::validation(
                "expires_in_hours",
                "Expiry must be between 1 and 168 hours.",
            ));
        }
        if input.max_uses > MAX_USES_MAX {
            return Err(Error::validation("max_uses", "At most 1000 uses are allowed."));
        }
        let now = rally_common::time::now_utc();
        let expires_at = now + Duration::hours(input.expires_in_hours);

        let invite = self
            .store
            .transaction(|tables| {
                Viewer::resolve(tables, event, user)?.require(Action::Own)?;

                let mut token = generate_token();
                while tables.invite_by_token(&token).is_some() {
                    token = generate_token();
                }

                let id = tables.invites.next_id();
                tables.invites.insert(
                    id,
                    Invite {
                        id,
                        event,
                        token,
                        created_by: user,
                        expires_at,
                        max_uses: input.max_uses,
                        uses_count: 0,
                        is_revoked: false,
                        created_at: now,
                        updated_at: now,
                    },
                );
                Ok(tables.invites.get(id).expect("just inserted").clone())
            })
            .await?;

        Ok(self.dto(&invite))
    }

    /// Public validation by token; unknown tokens yield the `not_found` shape, never an error.
    pub async fn validate(&self, token: Option<&str>) -> InviteValidationDto {
        let token = match token {
            Some(token) if !token.is_empty() => token.to_string(),
            _ => return InviteValidationDto::not_found(),
        };
        let now = rally_common::time::now_utc();

        self.store
            .view(move |tables| {
                let invite = match tables.invite_by_token(&token) {
                    Some(invite) => invite,
                    None => return InviteValidationDto::not_found(),
                };
                let event = tables.events.get(invite.event);

                InviteValidationDto {
                    status: invite.status(now),
                    event: event.map(|e| EventSnippet {
                        id: e.id,
                        title: e.title.clone(),
                        location: e.location.clone(),
                        start_at: e.start_at,
                    }),
                    uses_left: invite.uses_left(),
                    expires_at: Some(invite.expires_at),
                }
            })
            .await
    }

    /// Accepts an invite for the calling user.
    ///
    /// Status and membership are re-checked under the write lock; joining inserts the member
    /// row and increments `uses_count` in the same transaction.
    pub async fn accept(&self, token: &str, user: UserId) -> Result<AcceptOutcome, Error> {
        if token.is_empty() {
            return Err(Error::validation("token", "An invite token is required."));
        }
        let now = rally_common::time::now_utc();
        let token = token.to_string();

        self.store
            .transaction(move |tables| {
                let invite = tables
                    .invite_by_token(&token)
                    .ok_or_else(|| Error::not_found("invite"))?;
                let invite_id = invite.id;
                let event = invite.event;

                if tables.participant_of(event, user).is_some() {
                    return Ok(AcceptOutcome::AlreadyMember(event));
                }

                let status = tables
                    .invites
                    .get(invite_id)
                    .expect("resolved above")
                    .status(now);
                if status != InviteStatus::Ok {
                    return Err(Error::InviteUnusable {
                        code: status_code(status),
                    });
                }

                let participant_id = tables.participants.next_id();
                tables.participants.insert(
                    participant_id,
                    Participant {
                        id: participant_id,
                        user,
                        event,
                        role: Role::Member,
                        joined_at: now,
                    },
                );
                let invite = tables.invites.get_mut(invite_id).expect("resolved above");
                invite.uses_count += 1;
                invite.updated_at = now;

                Ok(AcceptOutcome::Joined(event))
            })
            .await
    }

    /// Revokes an invite; owner-gated and idempotent.
    pub async fn revoke(&self, token: &str, user: UserId) -> Result<(), Error> {
        if token.is_empty() {
            return Err(Error::validation("token", "An invite token is required."));
        }
        let now = rally_common::time::now_utc();
        let token = token.to_string();

        self.store
            .transaction(move |tables| {
                let invite = tables
                    .invite_by_token(&token)
                    .ok_or_else(|| Error::not_found("invite"))?;
                let invite_id = invite.id;
                Viewer::resolve(tables, invite.event, user)?.require(Action::Own)?;

                let invite = tables.invites.get_mut(invite_id).expect("resolved above");
                if !invite.is_revoked {
                    invite.is_revoked = true;
                    invite.updated_at = now;
                }
                Ok(())
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_url_safe_and_long_enough() {
        let token = generate_token();

        // 32 random bytes in unpadded base64.
        assert_eq!(token.len(), 43);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn tokens_do_not_repeat() {
        let first = generate_token();
        let second = generate_token();

        assert_ne!(first, second);
    }
}
