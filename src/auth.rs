// src/auth.rs
use crate::db::LedgerStore;
use crate::error::AuthError;
use crate::models::{LoginRequest, RegisterRequest, TokenResponse};
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{Error as PasswordHashError, PasswordHash, SaltString};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use log::{info, warn};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Serialize, Deserialize)]
struct Claims {
    sub: String,
    iat: usize,
    exp: usize,
}

/// Issues and validates HS256 bearer tokens whose subject is the user id.
pub struct TokenIssuer {
    secret: Vec<u8>,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            ttl,
        }
    }

    pub fn create_token(&self, user_id: &str) -> Result<String, AuthError> {
        let now = Utc::now().timestamp() as usize;
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now,
            exp: now.saturating_add(usize::try_from(self.ttl.as_secs()).unwrap_or(usize::MAX)),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(&self.secret),
        )
        .map_err(|e| AuthError::Internal(format!("failed to sign token: {}", e)))
    }

    /// Returns the user id carried by a valid, unexpired token.
    pub fn verify(&self, token: &str) -> Result<String, AuthError> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(&self.secret),
            &Validation::default(),
        )
        .map(|data| data.claims.sub)
        .map_err(|e| {
            warn!("Rejected bearer token: {}", e);
            AuthError::Unauthorized
        })
    }

    pub fn expires_in(&self) -> Duration {
        self.ttl
    }
}

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Internal(format!("failed to hash password: {}", e)))
}

pub fn verify_password(password_hash: &str, candidate: &str) -> Result<(), AuthError> {
    let parsed = PasswordHash::new(password_hash)
        .map_err(|e| AuthError::Internal(format!("stored hash is unreadable: {}", e)))?;
    Argon2::default()
        .verify_password(candidate.as_bytes(), &parsed)
        .map_err(|err| match err {
            PasswordHashError::Password => AuthError::InvalidCredentials,
            other => AuthError::Internal(format!("password verification failed: {}", other)),
        })
}

pub struct AuthService {
    store: Arc<dyn LedgerStore>,
    tokens: TokenIssuer,
    starting_cash: Decimal,
}

impl AuthService {
    pub fn new(store: Arc<dyn LedgerStore>, tokens: TokenIssuer, starting_cash: Decimal) -> Self {
        Self {
            store,
            tokens,
            starting_cash,
        }
    }

    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    pub async fn register(&self, request: RegisterRequest) -> Result<TokenResponse, AuthError> {
        let username = request.username.trim();
        if username.is_empty() {
            return Err(AuthError::MissingUsername);
        }
        if request.password.is_empty() {
            return Err(AuthError::MissingPassword);
        }
        if request.password != request.confirmation {
            return Err(AuthError::PasswordMismatch);
        }

        let password_hash = hash_password(&request.password)?;
        let user = self
            .store
            .create_user(username, &password_hash, self.starting_cash)
            .await?
            .ok_or(AuthError::UsernameTaken)?;
        info!("Registered user {} ({}).", user.username, user.id);
        self.token_response(user.id)
    }

    pub async fn login(&self, request: LoginRequest) -> Result<TokenResponse, AuthError> {
        let username = request.username.trim();
        if username.is_empty() {
            return Err(AuthError::MissingUsername);
        }
        if request.password.is_empty() {
            return Err(AuthError::MissingPassword);
        }

        let user = self
            .store
            .find_user_by_name(username)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;
        verify_password(&user.password_hash, &request.password)?;
        info!("User {} logged in.", user.username);
        self.token_response(user.id)
    }

    fn token_response(&self, user_id: String) -> Result<TokenResponse, AuthError> {
        let access_token = self.tokens.create_token(&user_id)?;
        Ok(TokenResponse {
            user_id,
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.tokens.expires_in().as_secs(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryLedgerStore;
    use rust_decimal_macros::dec;

    fn service() -> (AuthService, Arc<MemoryLedgerStore>) {
        let store = Arc::new(MemoryLedgerStore::new());
        let tokens = TokenIssuer::new("test-secret", Duration::from_secs(600));
        (AuthService::new(store.clone(), tokens, dec!(10000)), store)
    }

    fn register_request(username: &str, password: &str, confirmation: &str) -> RegisterRequest {
        RegisterRequest {
            username: username.to_string(),
            password: password.to_string(),
            confirmation: confirmation.to_string(),
        }
    }

    #[test]
    fn tokens_round_trip_the_user_id() {
        let tokens = TokenIssuer::new("secret", Duration::from_secs(60));
        let token = tokens.create_token("user-42").unwrap();
        assert_eq!(tokens.verify(&token).unwrap(), "user-42");
    }

    #[test]
    fn tokens_signed_with_another_secret_are_rejected() {
        let token = TokenIssuer::new("one", Duration::from_secs(60))
            .create_token("u")
            .unwrap();
        let other = TokenIssuer::new("two", Duration::from_secs(60));
        assert!(matches!(other.verify(&token), Err(AuthError::Unauthorized)));
        assert!(matches!(other.verify("garbage"), Err(AuthError::Unauthorized)));
    }

    #[test]
    fn huge_ttl_saturates_instead_of_overflowing() {
        let tokens = TokenIssuer::new("secret", Duration::from_secs(u64::MAX));
        let token = tokens.create_token("user-7").unwrap();
        assert_eq!(tokens.verify(&token).unwrap(), "user-7");
    }

    #[test]
    fn password_hash_verifies_only_its_own_password() {
        let hash = hash_password("hunter2").unwrap();
        assert!(verify_password(&hash, "hunter2").is_ok());
        assert!(matches!(
            verify_password(&hash, "hunter3"),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn register_credits_starting_cash_and_issues_token() {
        let (auth, store) = service();
        let response = auth
            .register(register_request("erin", "pw", "pw"))
            .await
            .unwrap();

        assert_eq!(response.token_type, "Bearer");
        assert_eq!(
            auth.tokens().verify(&response.access_token).unwrap(),
            response.user_id
        );
        assert_eq!(
            store.read_balance(&response.user_id).await.unwrap(),
            dec!(10000)
        );
    }

    #[tokio::test]
    async fn register_validates_input_in_order() {
        let (auth, _) = service();
        assert!(matches!(
            auth.register(register_request(" ", "pw", "pw")).await,
            Err(AuthError::MissingUsername)
        ));
        assert!(matches!(
            auth.register(register_request("erin", "", "")).await,
            Err(AuthError::MissingPassword)
        ));
        assert!(matches!(
            auth.register(register_request("erin", "pw", "wp")).await,
            Err(AuthError::PasswordMismatch)
        ));
    }

    #[tokio::test]
    async fn duplicate_username_is_rejected() {
        let (auth, _) = service();
        auth.register(register_request("erin", "pw", "pw"))
            .await
            .unwrap();
        assert!(matches!(
            auth.register(register_request("erin", "x", "x")).await,
            Err(AuthError::UsernameTaken)
        ));
    }

    #[tokio::test]
    async fn login_checks_credentials() {
        let (auth, _) = service();
        let registered = auth
            .register(register_request("frank", "secret", "secret"))
            .await
            .unwrap();

        let login = auth
            .login(LoginRequest {
                username: "frank".to_string(),
                password: "secret".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(login.user_id, registered.user_id);

        assert!(matches!(
            auth.login(LoginRequest {
                username: "frank".to_string(),
                password: "wrong".to_string(),
            })
            .await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            auth.login(LoginRequest {
                username: "nobody".to_string(),
                password: "secret".to_string(),
            })
            .await,
            Err(AuthError::InvalidCredentials)
        ));
    }
}
