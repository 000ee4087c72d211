//! Member session state.
//!
//! The session is derived entirely from the bearer token: `member` comes
//! from the token's claims and `is_authenticated` tracks whether a token is
//! held. Only the token is persisted; everything else is rederived on
//! [`SessionStore::restore`].
//!
//! Network and server failures on the member endpoints never escape as
//! errors. Login and registration return an [`AuthFailure`]; the
//! availability and verification checks fall back to `false`.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::{ApiClient, Envelope};
use crate::storage::KeyValueStore;
use crate::token::{self, Claims, TokenError};

/// Storage key the session token is persisted under.
pub const TOKEN_KEY: &str = "token";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub member_id: String,
    pub member_name: String,
    /// Anything else the profile endpoint returns (email, phone, ...).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl From<Claims> for Member {
    fn from(claims: Claims) -> Self {
        Self {
            member_id: claims.member_id,
            member_name: claims.member_name,
            extra: Default::default(),
        }
    }
}

/// Sign-up form. Fields beyond the required four are forwarded as-is.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberRegistration {
    pub member_id: String,
    pub password: String,
    pub member_name: String,
    pub email: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Session {
    pub token: Option<String>,
    pub member: Option<Member>,
    pub is_authenticated: bool,
}

/// Why a login or registration did not go through.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthFailure {
    /// The server answered `success: false`; carries its message.
    #[error("{0}")]
    Rejected(String),
    /// Transport error, bad status, or a success body without a usable token.
    #[error("{0}")]
    RequestFailed(String),
}

impl AuthFailure {
    pub fn message(&self) -> &str {
        match self {
            AuthFailure::Rejected(m) | AuthFailure::RequestFailed(m) => m,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest<'a> {
    member_id: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenData {
    access_token: String,
}

#[derive(Deserialize)]
struct MyPageResponse {
    #[serde(default)]
    success: bool,
    member: Option<Member>,
}

pub struct SessionStore {
    api: Arc<ApiClient>,
    storage: Arc<dyn KeyValueStore>,
    session: Session,
}

impl SessionStore {
    /// An empty, logged-out store. Nothing is read from storage.
    pub fn new(api: Arc<ApiClient>, storage: Arc<dyn KeyValueStore>) -> Self {
        Self {
            api,
            storage,
            session: Session::default(),
        }
    }

    /// Build a store from the persisted token, if any.
    ///
    /// A stored token that no longer decodes, or whose `exp` has passed, is
    /// dropped from storage and the store starts logged out.
    pub fn restore(api: Arc<ApiClient>, storage: Arc<dyn KeyValueStore>) -> Self {
        let mut store = Self::new(api, storage);
        let stored = match store.storage.get(TOKEN_KEY) {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!("Can't read stored session token: {e}");
                None
            }
        };
        let Some(token) = stored else {
            return store;
        };
        match token::decode(&token) {
            Ok(claims) if claims.is_expired_at(Utc::now()) => {
                tracing::info!("Stored session token has expired, discarding");
                store.forget_persisted_token();
            }
            Ok(claims) => {
                tracing::info!("Restored session for {}", claims.member_id);
                store.api.set_bearer(&token);
                store.session = Session {
                    token: Some(token),
                    member: Some(claims.into()),
                    is_authenticated: true,
                };
            }
            Err(e) => {
                tracing::warn!("Discarding unreadable stored token: {e}");
                store.forget_persisted_token();
            }
        }
        store
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn token(&self) -> Option<&str> {
        self.session.token.as_deref()
    }

    pub fn member(&self) -> Option<&Member> {
        self.session.member.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_authenticated
    }

    pub fn is_logged_in(&self) -> bool {
        self.is_authenticated()
    }

    /// Claims of the held token, if there is one and it decodes.
    pub fn claims(&self) -> Option<Claims> {
        self.token().and_then(|t| token::decode(t).ok())
    }

    pub async fn login(&mut self, member_id: &str, password: &str) -> Result<(), AuthFailure> {
        let body = LoginRequest { member_id, password };
        self.authenticate("login", "/member/login", &body).await
    }

    /// Create an account. A successful registration logs the new member in.
    pub async fn register(&mut self, member: &MemberRegistration) -> Result<(), AuthFailure> {
        self.authenticate("register", "/member/register", member).await
    }

    async fn authenticate<B: Serialize + ?Sized>(
        &mut self,
        action: &'static str,
        path: &str,
        body: &B,
    ) -> Result<(), AuthFailure> {
        let failed = || AuthFailure::RequestFailed(format!("{action} failed"));

        let env: Envelope<TokenData> = match self.api.post_json(path, body).await {
            Ok(env) => env,
            Err(e) => {
                tracing::error!("{action} request error: {e}");
                return Err(failed());
            }
        };
        if !env.success {
            let message = env.message.unwrap_or_else(|| format!("{action} rejected"));
            tracing::warn!("{action} rejected: {message}");
            return Err(AuthFailure::Rejected(message));
        }
        let token = match env.into_data(action) {
            Ok(data) => data.access_token,
            Err(e) => {
                tracing::error!("{action} response error: {e}");
                return Err(failed());
            }
        };
        // Decode before touching state so a bad token leaves the session as it was.
        let claims = match token::decode(&token) {
            Ok(claims) => claims,
            Err(e) => {
                tracing::error!("{action} returned an undecodable token: {e}");
                return Err(failed());
            }
        };

        tracing::info!("{action} succeeded for {}", claims.member_id);
        self.api.set_bearer(&token);
        if let Err(e) = self.storage.set(TOKEN_KEY, &token) {
            tracing::warn!("Can't persist session token: {e}");
        }
        self.session = Session {
            token: Some(token),
            member: Some(claims.into()),
            is_authenticated: true,
        };
        Ok(())
    }

    /// Overwrite `member` from the held token's claims.
    pub fn set_member_from_token(&mut self) -> Result<(), TokenError> {
        let token = self.session.token.as_deref().ok_or(TokenError::Missing)?;
        let claims = token::decode(token)?;
        self.session.member = Some(claims.into());
        Ok(())
    }

    /// True only when the server reports the id as not taken.
    pub async fn check_member_id(&self, member_id: &str) -> bool {
        self.is_unused("/member/checkMemberId", "memberId", member_id).await
    }

    /// True only when the server reports the email as not taken.
    pub async fn check_email_duplicate(&self, email: &str) -> bool {
        self.is_unused("/member/checkEmail", "email", email).await
    }

    async fn is_unused(&self, path: &str, param: &str, value: &str) -> bool {
        match self
            .api
            .get_json_query::<Value, _>(path, &[(param, value)])
            .await
        {
            // The endpoint answers "is it taken?", so `false` means available.
            Ok(body) => body == Value::Bool(false),
            Err(e) => {
                tracing::error!("Availability check {path} failed: {e}");
                false
            }
        }
    }

    pub async fn send_email_verification(&self, email: &str) -> bool {
        let body = serde_json::json!({ "email": email });
        match self
            .api
            .post_json::<Value, _>("/member/email/sendVerification", &body)
            .await
        {
            Ok(resp) => resp
                .get("success")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            Err(e) => {
                tracing::error!("Sending verification code failed: {e}");
                false
            }
        }
    }

    pub async fn verify_email_code(&self, email: &str, code: &str) -> bool {
        let body = serde_json::json!({ "email": email, "code": code });
        match self
            .api
            .post_json::<Value, _>("/member/email/verifyEmailCode", &body)
            .await
        {
            Ok(resp) => resp == Value::Bool(true),
            Err(e) => {
                tracing::error!("Verifying email code failed: {e}");
                false
            }
        }
    }

    /// Drop the session, the persisted token and the bearer header.
    pub fn logout(&mut self) {
        let was_authenticated = self.session.is_authenticated;
        self.session = Session::default();
        self.forget_persisted_token();
        self.api.clear_bearer();
        if was_authenticated {
            tracing::info!("Logged out");
        }
    }

    /// Refresh `member` from the profile endpoint. Returns whether it was
    /// replaced; on any failure the current member is kept.
    pub async fn fetch_my_page(&mut self) -> bool {
        match self.api.get_json::<MyPageResponse>("/member/mypage").await {
            Ok(MyPageResponse {
                success: true,
                member: Some(member),
            }) => {
                self.session.member = Some(member);
                true
            }
            Ok(_) => {
                tracing::error!("Profile request did not return a member");
                false
            }
            Err(e) => {
                tracing::error!("Profile request error: {e}");
                false
            }
        }
    }

    fn forget_persisted_token(&self) {
        if let Err(e) = self.storage.remove(TOKEN_KEY) {
            tracing::warn!("Can't remove stored session token: {e}");
        }
    }
}
