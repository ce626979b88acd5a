/// Session identity: credential decoding and authenticated request contexts
use crate::{
    admin::Role,
    api::middleware::extract_bearer_token,
    config::AuthConfig,
    context::ModerationContext,
    db::users::{Identity, UserStore},
    error::{ModError, ModResult},
};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};

/// Access token claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Account id
    pub sub: i64,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

/// Issues and verifies HS256 access tokens
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
    leeway: u64,
}

impl TokenService {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            ttl: Duration::seconds(config.token_ttl_seconds),
            leeway: config.leeway_seconds,
        }
    }

    /// Sign an access token for an account
    pub fn issue(&self, identity: &Identity) -> ModResult<String> {
        self.issue_with_ttl(identity, self.ttl)
    }

    pub fn issue_with_ttl(&self, identity: &Identity, ttl: Duration) -> ModResult<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: identity.id,
            email: identity.email.clone(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| ModError::Internal(format!("Failed to sign token: {}", e)))
    }

    /// Verify a token and classify the failure
    pub fn decode(&self, token: &str) -> ModResult<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = self.leeway;

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!("Token verification failed: {}", e);
                match e.kind() {
                    ErrorKind::ExpiredSignature => {
                        ModError::CredentialExpired("Token has expired".to_string())
                    }
                    ErrorKind::InvalidToken
                    | ErrorKind::Base64(_)
                    | ErrorKind::Json(_)
                    | ErrorKind::Utf8(_) => {
                        ModError::Unauthenticated("Malformed token".to_string())
                    }
                    _ => ModError::CredentialInvalid(format!("Invalid token: {}", e)),
                }
            })
    }
}

/// Minimal identity attached to an authenticated request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    pub user_id: i64,
    pub email: String,
}

/// Validates bearer credentials against current account state
#[derive(Clone)]
pub struct SessionIdentity {
    tokens: TokenService,
    users: UserStore,
}

impl SessionIdentity {
    pub fn new(tokens: TokenService, users: UserStore) -> Self {
        Self { tokens, users }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Decode the credential, then re-read the account it names
    pub async fn authenticate(&self, bearer: Option<&str>) -> ModResult<AuthContext> {
        let token = bearer
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ModError::Unauthenticated("Missing authorization header".to_string()))?;

        let claims = self.tokens.decode(token)?;

        let identity = self
            .users
            .get_user(claims.sub)
            .await?
            .ok_or_else(|| ModError::NotFound(format!("User {} not found", claims.sub)))?;

        if !identity.is_active {
            tracing::warn!("SessionIdentity: rejected disabled account {}", identity.id);
            return Err(ModError::Forbidden("Account is disabled".to_string()));
        }

        Ok(AuthContext {
            user_id: identity.id,
            email: identity.email,
        })
    }

    /// Same checks, but any failure degrades to no identity
    pub async fn authenticate_optional(&self, bearer: Option<&str>) -> Option<AuthContext> {
        bearer?;
        match self.authenticate(bearer).await {
            Ok(auth) => Some(auth),
            Err(e) => {
                tracing::debug!("SessionIdentity: optional auth dropped: {}", e);
                None
            }
        }
    }
}

#[async_trait]
impl FromRequestParts<ModerationContext> for AuthContext {
    type Rejection = ModError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ModerationContext,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers);
        state.session.authenticate(token.as_deref()).await
    }
}

/// Optional authenticated context - does not fail if no auth provided
#[derive(Debug, Clone)]
pub struct OptionalAuthContext {
    pub auth: Option<AuthContext>,
}

#[async_trait]
impl FromRequestParts<ModerationContext> for OptionalAuthContext {
    type Rejection = ModError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ModerationContext,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers);
        let auth = state.session.authenticate_optional(token.as_deref()).await;
        Ok(OptionalAuthContext { auth })
    }
}

/// Admin authentication context - requires admin or super_admin
#[derive(Debug, Clone)]
pub struct AdminAuthContext {
    pub user_id: i64,
    pub email: String,
    pub role: Role,
}

#[async_trait]
impl FromRequestParts<ModerationContext> for AdminAuthContext {
    type Rejection = ModError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ModerationContext,
    ) -> Result<Self, Self::Rejection> {
        let auth = AuthContext::from_request_parts(parts, state).await?;
        let identity = state.gate.require_privileged(auth.user_id).await?;

        Ok(AdminAuthContext {
            user_id: identity.id,
            email: identity.email,
            role: identity.role,
        })
    }
}

/// Super admin authentication context
#[derive(Debug, Clone)]
pub struct SuperAdminAuthContext {
    pub user_id: i64,
    pub email: String,
}

#[async_trait]
impl FromRequestParts<ModerationContext> for SuperAdminAuthContext {
    type Rejection = ModError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ModerationContext,
    ) -> Result<Self, Self::Rejection> {
        let auth = AuthContext::from_request_parts(parts, state).await?;
        let identity = state.gate.require_super_privileged(auth.user_id).await?;

        Ok(SuperAdminAuthContext {
            user_id: identity.id,
            email: identity.email,
        })
    }
}
