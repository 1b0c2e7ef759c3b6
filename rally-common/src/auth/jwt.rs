// Copyright 2023 Rally Contributors
// SPDX-License-Identifier: Apache-2.0

//! A module that provides JSON Web Token utilities.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
pub use jsonwebtoken::{
    errors::{Error, ErrorKind},
    TokenData,
};
use serde::{Deserialize, Serialize};

use std::time::{SystemTime, UNIX_EPOCH};

/// Represents registered JSON Web Token Claims.
/// https://tools.ietf.org/html/rfc7519#section-4.1
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Issuer.
    /// Identifies the principal that issued the JWT.
    iss: String,
    /// Subject.
    /// Identifies the principal that is the subject of the JWT.
    sub: String,
    /// Audience.
    /// Identifies the recipients that the JWT is intended for.
    aud: String,
    /// Expiration Time.
    /// Identifies the expiration time on or after which the JWT MUST NOT be accepted for
    /// processing.
    exp: u64,
    /// Not Before.
    /// Identifies the time before which the JWT MUST NOT be accepted for processing.
    nbf: u64,
    /// Issued At.
    /// Identifies the time at which the JWT was issued.
    iat: u64,
}

impl Claims {
    /// Creates a new set of claims.
    fn new(iss: String, sub: String, aud: String, exp: u64, nbf: u64) -> Self {
        Self {
            iss,
            sub,
            aud,
            exp,
            nbf,
            iat: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("Clock may have gone backwards")
                .as_secs(),
        }
    }

    /// Returns the subject of the claims.
    pub fn subject(&self) -> &str {
        &self.sub
    }

    /// Returns the audience of the claims.
    pub fn audience(&self) -> &str {
        &self.aud
    }
}

/// Represents a JSON Web Token.
/// https://tools.ietf.org/html/rfc7519
#[derive(Clone, Debug)]
pub struct JsonWebToken(String);

impl From<String> for JsonWebToken {
    fn from(inner: String) -> Self {
        JsonWebToken(inner)
    }
}

impl std::fmt::Display for JsonWebToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl JsonWebToken {
    /// Creates a new JSON Web Token.
    pub fn new(
        issuer: String,
        subject: String,
        audience: String,
        session_timeout: u64,
        secret: &[u8],
    ) -> Result<Self, Error> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("Clock may have gone backwards")
            .as_secs();
        let claims = Claims::new(issuer, subject, audience, now + session_timeout, now);
        let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(secret))?;

        Ok(Self(token))
    }

    /// Validates a JSON Web Token against an expected issuer and audience and returns its claims.
    pub fn validate(&self, issuer: String, audience: String, secret: &[u8]) -> Result<TokenData<Claims>, Error> {
        let mut validation = Validation {
            iss: Some(issuer),
            ..Default::default()
        };
        validation.set_audience(&[audience]);

        decode::<Claims>(&self.0, &DecodingKey::from_secret(secret), &validation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"top-secret-signing-key";

    #[test]
    fn valid_token_round_trip() {
        let jwt = JsonWebToken::new("rally".to_string(), "42".to_string(), "api".to_string(), 60, SECRET).unwrap();

        let data = jwt.validate("rally".to_string(), "api".to_string(), SECRET).unwrap();

        assert_eq!(data.claims.subject(), "42");
        assert_eq!(data.claims.audience(), "api");
    }

    #[test]
    fn audience_mismatch_is_rejected() {
        let jwt = JsonWebToken::new("rally".to_string(), "42".to_string(), "refresh".to_string(), 60, SECRET).unwrap();

        assert!(jwt.validate("rally".to_string(), "api".to_string(), SECRET).is_err());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let jwt = JsonWebToken::new("rally".to_string(), "42".to_string(), "api".to_string(), 60, SECRET).unwrap();

        assert!(jwt.validate("rally".to_string(), "api".to_string(), b"other-secret").is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let jwt = JsonWebToken::new("rally".to_string(), "42".to_string(), "api".to_string(), 0, SECRET).unwrap();

        // `exp == iat`; the default validation applies no leeway.
        std::thread::sleep(std::time::Duration::from_millis(1100));
        let result = jwt.validate("rally".to_string(), "api".to_string(), SECRET);

        assert!(result.is_err());
    }
}
