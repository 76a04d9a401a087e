use crate::pricing::MembershipTier;
use axum_extra::extract::cookie::CookieJar;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

pub const SESSION_COOKIE: &str = "SESSION-COOKIE";
pub const DEMO_USER_ID: &str = "demo-user";
pub const DEMO_USER_EMAIL: &str = "demo@deskbook.local";

const TOKEN_BYTES: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub membership_tier: MembershipTier,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct LoginPayload {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPayload {
    pub name: String,
    pub email: String,
    pub password: String,
    pub membership_tier: MembershipTier,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct SessionToken {
    pub user: User,
    /// Unix timestamp in seconds.
    pub expiry: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TokenId(String);

impl TryFrom<&str> for TokenId {
    type Error = AuthError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let bytes = URL_SAFE_NO_PAD
            .decode(value)
            .map_err(|_| AuthError::InvalidToken)?;
        if bytes.len() != TOKEN_BYTES {
            return Err(AuthError::InvalidToken);
        }
        Ok(Self(value.to_string()))
    }
}

impl TokenId {
    fn generate() -> Self {
        let bytes: [u8; TOKEN_BYTES] = rand::random();
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    MissingField(&'static str),
    EmailTaken,
    InvalidCredentials,
    NoSession,
    InvalidToken,
    SessionExpired,
    UnknownUser,
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingField(field) => write!(f, "Missing {}", field),
            Self::EmailTaken => write!(f, "Email is already in use"),
            Self::InvalidCredentials => write!(f, "Invalid email or password"),
            Self::NoSession => write!(f, "No session cookie found"),
            Self::InvalidToken => write!(f, "Malformed session token"),
            Self::SessionExpired => write!(f, "Session expired"),
            Self::UnknownUser => write!(f, "User does not exist"),
        }
    }
}

impl std::error::Error for AuthError {}

struct Account {
    user: User,
    salt: [u8; 16],
    digest: Vec<u8>,
}

fn password_digest(salt: &[u8], password: &str) -> Vec<u8> {
    let mut hasher = Sha1::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hasher.finalize().to_vec()
}

impl Account {
    fn new(user: User, password: &str) -> Self {
        let salt: [u8; 16] = rand::random();
        Self {
            digest: password_digest(&salt, password),
            user,
            salt,
        }
    }

    fn verify(&self, password: &str) -> bool {
        password_digest(&self.salt, password) == self.digest
    }
}

struct Session {
    user_id: String,
    expiry: i64,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub struct AuthApp {
    accounts: HashMap<String, Account>,
    tokens: HashMap<TokenId, Session>,
    ttl: Duration,
}

impl AuthApp {
    pub fn new(ttl: Duration) -> AuthApp {
        AuthApp {
            accounts: HashMap::new(),
            tokens: HashMap::new(),
            ttl,
        }
    }

    /// Seed the Basic-tier demo account that owns the demo bookings.
    pub fn with_demo_account(mut self, password: &str) -> Self {
        let user = User {
            id: DEMO_USER_ID.to_string(),
            name: "Demo User".to_string(),
            email: DEMO_USER_EMAIL.to_string(),
            membership_tier: MembershipTier::Basic,
        };
        info!("Seeding demo account {}", user.email);
        self.accounts
            .insert(user.id.clone(), Account::new(user, password));
        self
    }

    fn find_by_email(&self, email: &str) -> Option<&Account> {
        let email = normalize_email(email);
        self.accounts
            .values()
            .find(|account| account.user.email == email)
    }

    pub fn user(&self, id: &str) -> Option<&User> {
        self.accounts.get(id).map(|account| &account.user)
    }

    fn session_cookie(&self, token: &TokenId) -> String {
        format!(
            "{}={}; Path=/; HttpOnly; SameSite=Strict; Max-Age={}",
            SESSION_COOKIE,
            token.as_str(),
            self.ttl_secs()
        )
    }

    fn ttl_secs(&self) -> i64 {
        i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX)
    }

    fn expiry(&self) -> i64 {
        Utc::now().timestamp().saturating_add(self.ttl_secs())
    }

    fn purge_expired(&mut self) {
        let now = Utc::now().timestamp();
        self.tokens.retain(|_, session| session.expiry > now);
    }

    fn start_session(&mut self, user: User) -> (String, SessionToken) {
        self.purge_expired();
        let token = TokenId::generate();
        let expiry = self.expiry();
        self.tokens.insert(
            token.clone(),
            Session {
                user_id: user.id.clone(),
                expiry,
            },
        );
        (self.session_cookie(&token), SessionToken { user, expiry })
    }

    /// Create an account and log it in. Emails are unique, ignoring case.
    pub fn register(&mut self, payload: RegisterPayload) -> Result<(String, SessionToken), AuthError> {
        let name = payload.name.trim();
        let email = normalize_email(&payload.email);
        if name.is_empty() {
            return Err(AuthError::MissingField("name"));
        }
        if email.is_empty() {
            return Err(AuthError::MissingField("email"));
        }
        if payload.password.is_empty() {
            return Err(AuthError::MissingField("password"));
        }
        if self.find_by_email(&email).is_some() {
            debug!("Registration rejected, {} already exists", email);
            return Err(AuthError::EmailTaken);
        }

        let user = User {
            id: (self.accounts.len() + 1).to_string(),
            name: name.to_string(),
            email,
            membership_tier: payload.membership_tier,
        };
        info!("Registered {} ({})", user.email, user.membership_tier);
        self.accounts
            .insert(user.id.clone(), Account::new(user.clone(), &payload.password));
        Ok(self.start_session(user))
    }

    pub fn authenticate_user(
        &mut self,
        email: &str,
        password: &str,
    ) -> Result<(String, SessionToken), AuthError> {
        let user = self
            .find_by_email(email)
            .filter(|account| account.verify(password))
            .map(|account| account.user.clone())
            .ok_or(AuthError::InvalidCredentials)?;
        debug!("{} logged in", user.email);
        Ok(self.start_session(user))
    }

    fn session(&self, token: &TokenId) -> Result<&Session, AuthError> {
        let session = self.tokens.get(token).ok_or(AuthError::NoSession)?;
        if session.expiry <= Utc::now().timestamp() {
            return Err(AuthError::SessionExpired);
        }
        Ok(session)
    }

    pub fn assert_login(&self, cookies: &CookieJar) -> Result<SessionToken, AuthError> {
        let cookie = cookies.get(SESSION_COOKIE).ok_or(AuthError::NoSession)?;
        let token = TokenId::try_from(cookie.value())?;
        let session = self.session(&token)?;
        let user = self
            .user(&session.user_id)
            .ok_or(AuthError::UnknownUser)?
            .clone();
        Ok(SessionToken {
            user,
            expiry: session.expiry,
        })
    }

    /// Push the expiry of a live session forward. Returns the refreshed cookie.
    pub fn update_token(&mut self, token: &TokenId) -> Result<String, AuthError> {
        self.session(token)?;
        let expiry = self.expiry();
        if let Some(session) = self.tokens.get_mut(token) {
            session.expiry = expiry;
        }
        Ok(self.session_cookie(token))
    }

    pub fn logout(&mut self, token: &TokenId) -> Result<(), AuthError> {
        self.tokens
            .remove(token)
            .map(|_| ())
            .ok_or(AuthError::NoSession)
    }

    pub fn update_membership(
        &mut self,
        user_id: &str,
        tier: MembershipTier,
    ) -> Result<User, AuthError> {
        let account = self
            .accounts
            .get_mut(user_id)
            .ok_or(AuthError::UnknownUser)?;
        info!(
            "Membership of {} changed {} -> {}",
            account.user.email, account.user.membership_tier, tier
        );
        account.user.membership_tier = tier;
        Ok(account.user.clone())
    }
}
