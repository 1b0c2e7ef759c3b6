// Copyright 2023 Rally Contributors
// SPDX-License-Identifier: Apache-2.0

mod common;

use common::backend;

use std::sync::Arc;

use rally_service::{
    account::{AccountService, ProfileUpdate, RegisterInput},
    mailer::RecordingMailer,
    Error,
};

const SECRET: &[u8] = b"unit-test-secret";

struct Accounts {
    service: AccountService,
    mailer: Arc<RecordingMailer>,
}

fn accounts() -> Accounts {
    let backend = backend();
    let mailer = Arc::new(RecordingMailer::new());
    let service = AccountService::new(
        backend.store.clone(),
        mailer.clone(),
        SECRET.to_vec(),
        "http://front.test".to_string(),
    );
    Accounts { service, mailer }
}

fn register_input(email: &str) -> RegisterInput {
    RegisterInput {
        email: email.to_string(),
        password: "sup3rsecret".to_string(),
        name: Some("Ada".to_string()),
    }
}

fn confirmation_token(mailer: &RecordingMailer, to: &str) -> String {
    let email = mailer
        .sent()
        .into_iter()
        .rev()
        .find(|m| m.to == to)
        .expect("confirmation email was sent");
    let (_, token) = email.body.rsplit_once("token=").expect("body carries the link");
    token.trim().to_string()
}

#[tokio::test]
async fn register_confirm_login_round_trip() {
    let accounts = accounts();

    let profile = accounts.service.register(register_input("ada@example.com")).await.unwrap();
    assert_eq!(profile.email, "ada@example.com");

    // Unconfirmed accounts cannot log in.
    assert!(matches!(
        accounts.service.login("ada@example.com", "sup3rsecret").await,
        Err(Error::Validation { .. })
    ));

    let token = confirmation_token(&accounts.mailer, "ada@example.com");
    accounts.service.confirm(&token).await.unwrap();

    let (pair, user) = accounts.service.login("ada@example.com", "sup3rsecret").await.unwrap();
    assert_eq!(user.id, profile.id);

    // The access token authenticates; the refresh token rotates.
    let authenticated = accounts.service.authenticate(&pair.access).await.unwrap();
    assert_eq!(authenticated, profile.id);
    assert!(accounts.service.refresh(&pair.refresh).await.is_ok());

    // Tokens are not interchangeable across audiences.
    assert!(matches!(
        accounts.service.authenticate(&pair.refresh).await,
        Err(Error::Unauthorized)
    ));
    assert!(matches!(
        accounts.service.refresh(&pair.access).await,
        Err(Error::Unauthorized)
    ));
}

#[tokio::test]
async fn registration_enforces_unique_email_and_password_policy() {
    let accounts = accounts();

    accounts.service.register(register_input("ada@example.com")).await.unwrap();

    // The duplicate check is case-insensitive.
    assert!(matches!(
        accounts.service.register(register_input("ADA@example.com")).await,
        Err(Error::Validation { .. })
    ));

    let mut weak = register_input("bob@example.com");
    weak.password = "short1".to_string();
    assert!(matches!(
        accounts.service.register(weak).await,
        Err(Error::Validation { .. })
    ));

    let mut lettersonly = register_input("bob@example.com");
    lettersonly.password = "allletters".to_string();
    assert!(matches!(
        accounts.service.register(lettersonly).await,
        Err(Error::Validation { .. })
    ));
}

#[tokio::test]
async fn wrong_credentials_are_unauthorized() {
    let accounts = accounts();

    accounts.service.register(register_input("ada@example.com")).await.unwrap();
    let token = confirmation_token(&accounts.mailer, "ada@example.com");
    accounts.service.confirm(&token).await.unwrap();

    assert!(matches!(
        accounts.service.login("ada@example.com", "wrong-pass1").await,
        Err(Error::Unauthorized)
    ));
    assert!(matches!(
        accounts.service.login("nobody@example.com", "sup3rsecret").await,
        Err(Error::Unauthorized)
    ));
}

#[tokio::test]
async fn resend_answers_uniformly() {
    let accounts = accounts();

    accounts.service.register(register_input("ada@example.com")).await.unwrap();
    let before = accounts.mailer.sent().len();

    accounts.service.resend_confirmation("ada@example.com").await.unwrap();
    assert_eq!(accounts.mailer.sent().len(), before + 1);

    // Unknown addresses get the same 200 and no email.
    accounts.service.resend_confirmation("nobody@example.com").await.unwrap();
    assert_eq!(accounts.mailer.sent().len(), before + 1);
}

#[tokio::test]
async fn bad_confirmation_tokens_are_rejected() {
    let accounts = accounts();

    assert!(matches!(
        accounts.service.confirm("garbage").await,
        Err(Error::Token(_))
    ));
}

#[tokio::test]
async fn profile_update_and_password_change() {
    let accounts = accounts();

    let profile = accounts.service.register(register_input("ada@example.com")).await.unwrap();
    let token = confirmation_token(&accounts.mailer, "ada@example.com");
    accounts.service.confirm(&token).await.unwrap();

    let updated = accounts
        .service
        .update_profile(
            profile.id,
            ProfileUpdate {
                name: Some(Some("Countess".to_string())),
                email_notifications_enabled: Some(false),
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.name.as_deref(), Some("Countess"));
    assert!(!updated.email_notifications_enabled);

    // Wrong current password, weak replacement, and same-again all fail.
    assert!(matches!(
        accounts.service.change_password(profile.id, "wrong", "n3wpassword").await,
        Err(Error::Validation { .. })
    ));
    assert!(matches!(
        accounts.service.change_password(profile.id, "sup3rsecret", "weak").await,
        Err(Error::Validation { .. })
    ));
    assert!(matches!(
        accounts.service.change_password(profile.id, "sup3rsecret", "sup3rsecret").await,
        Err(Error::Validation { .. })
    ));

    accounts
        .service
        .change_password(profile.id, "sup3rsecret", "n3wpassword")
        .await
        .unwrap();
    assert!(accounts.service.login("ada@example.com", "n3wpassword").await.is_ok());
    assert!(matches!(
        accounts.service.login("ada@example.com", "sup3rsecret").await,
        Err(Error::Unauthorized)
    ));
}
