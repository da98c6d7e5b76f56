//! Authentication: bearer credential → subject → registered user.
//!
//! Identity verification is an external collaborator: given a bearer
//! credential it either returns a stable subject identifier or the request is
//! unauthenticated. Role lookup then maps the subject to a registered
//! [`User`] row; the role on that row is the only authorization attribute the
//! rest of the service consults.
//!
//! Two verifier flavors: [`TokenVerifier::Remote`] posts the token to a
//! verification endpoint, [`TokenVerifier::Static`] resolves from a fixed
//! token map (development and tests).

use std::collections::HashMap;
use std::time::Duration;

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ApiError;
use crate::model::User;
use crate::storage::Storage;

/// Timeout for the remote verification call.
const VERIFY_TIMEOUT: Duration = Duration::from_secs(5);

/// External identity verification collaborator.
#[derive(Clone)]
pub enum TokenVerifier {
    Remote(RemoteVerifier),
    /// Fixed token → subject map.
    Static(HashMap<String, String>),
}

/// Verifies tokens against an HTTP identity provider.
#[derive(Clone)]
pub struct RemoteVerifier {
    client: reqwest::Client,
    verify_url: String,
}

#[derive(Serialize)]
struct VerifyRequest<'a> {
    token: &'a str,
}

#[derive(Deserialize)]
struct VerifyResponse {
    subject: String,
}

impl TokenVerifier {
    pub fn remote(verify_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(VERIFY_TIMEOUT)
            .build()
            .unwrap_or_default();
        TokenVerifier::Remote(RemoteVerifier {
            client,
            verify_url: verify_url.to_string(),
        })
    }

    pub fn static_tokens(tokens: HashMap<String, String>) -> Self {
        TokenVerifier::Static(tokens)
    }

    /// Resolve a bearer token to a subject identifier.
    ///
    /// Any failure, including an unreachable provider, is surfaced as
    /// `Unauthenticated`: the contract is subject-or-nothing, and a caller
    /// cannot act on the distinction.
    pub async fn verify(&self, token: &str) -> Result<String, ApiError> {
        match self {
            TokenVerifier::Remote(remote) => {
                let response = remote
                    .client
                    .post(&remote.verify_url)
                    .json(&VerifyRequest { token })
                    .send()
                    .await
                    .map_err(|err| {
                        warn!(error = %err, "identity provider unreachable");
                        ApiError::Unauthenticated
                    })?;

                if !response.status().is_success() {
                    return Err(ApiError::Unauthenticated);
                }

                let body: VerifyResponse = response.json().await.map_err(|err| {
                    warn!(error = %err, "malformed identity provider response");
                    ApiError::Unauthenticated
                })?;

                Ok(body.subject)
            }
            TokenVerifier::Static(tokens) => tokens
                .get(token)
                .cloned()
                .ok_or(ApiError::Unauthenticated),
        }
    }
}

/// Extract the bearer token from the Authorization header.
///
/// Tolerates a doubled "Bearer " prefix, which some clients send.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or(ApiError::Unauthenticated)?
        .to_str()
        .map_err(|_| ApiError::Unauthenticated)?;

    let token = value.strip_prefix("Bearer ").unwrap_or(value);
    let token = token.strip_prefix("Bearer ").unwrap_or(token);

    if token.is_empty() {
        return Err(ApiError::Unauthenticated);
    }
    Ok(token)
}

/// Full authentication path: header → token → subject → active user row.
///
/// A verified subject with no registered (or deactivated) user resolves to
/// `NotFound`, matching the role-lookup contract.
pub async fn authenticate(
    storage: &Storage,
    verifier: &TokenVerifier,
    headers: &HeaderMap,
) -> Result<User, ApiError> {
    let token = bearer_token(headers)?;
    let subject = verifier.verify(token).await?;

    storage
        .select_user_by_subject(&subject)
        .await?
        .ok_or(ApiError::NotFound("user"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use chrono::Utc;

    use crate::model::Role;

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn bearer_token_extraction() {
        assert_eq!(bearer_token(&headers_with("Bearer abc")).unwrap(), "abc");
        // Doubled prefix is tolerated.
        assert_eq!(
            bearer_token(&headers_with("Bearer Bearer abc")).unwrap(),
            "abc"
        );
        // Raw token without the scheme still works.
        assert_eq!(bearer_token(&headers_with("abc")).unwrap(), "abc");

        assert!(matches!(
            bearer_token(&HeaderMap::new()),
            Err(ApiError::Unauthenticated)
        ));
        assert!(matches!(
            bearer_token(&headers_with("Bearer ")),
            Err(ApiError::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn static_verifier_resolves_known_tokens() {
        let verifier = TokenVerifier::static_tokens(HashMap::from([(
            "tok-1".to_string(),
            "uid-1".to_string(),
        )]));

        assert_eq!(verifier.verify("tok-1").await.unwrap(), "uid-1");
        assert!(matches!(
            verifier.verify("tok-2").await,
            Err(ApiError::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn authenticate_requires_a_registered_user() {
        let storage = Storage::new("sqlite::memory:").await.unwrap();
        let verifier = TokenVerifier::static_tokens(HashMap::from([(
            "tok-1".to_string(),
            "uid-1".to_string(),
        )]));

        // Verified subject, but nobody signed up.
        let err = authenticate(&storage, &verifier, &headers_with("Bearer tok-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound("user")));

        storage
            .insert_user("uid-1", "Asha", "asha@example.com", Role::Citizen, Utc::now())
            .await
            .unwrap();

        let user = authenticate(&storage, &verifier, &headers_with("Bearer tok-1"))
            .await
            .unwrap();
        assert_eq!(user.subject, "uid-1");
        assert_eq!(user.role, Role::Citizen);
    }
}
