//! Authentication: dashboard login against the configured credentials
//!
//! The password is never stored, only a salted Argon2 PHC string. Sessions
//! live in memory and vanish on restart.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::config::AuthConfig;

pub const SESSION_COOKIE: &str = "hostdash_session";

/// Active session
struct Session {
    username: String,
    created: Instant,
}

/// Session manager
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Session>>,
    lifetime: Duration,
}

impl SessionManager {
    pub fn new(lifetime: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            lifetime,
        }
    }

    /// Create a new session for a user, returns the session token
    pub fn create_session(&self, username: &str) -> String {
        let token = uuid::Uuid::new_v4().to_string();
        if let Ok(mut sessions) = self.sessions.write() {
            sessions.insert(token.clone(), Session {
                username: username.to_string(),
                created: Instant::now(),
            });
        }
        info!("Session created for user '{}'", username);
        token
    }

    /// Validate a session token, returns the username if valid
    pub fn validate(&self, token: &str) -> Option<String> {
        let sessions = self.sessions.read().ok()?;
        sessions.get(token)
            .filter(|s| s.created.elapsed() < self.lifetime)
            .map(|s| s.username.clone())
    }

    pub fn destroy(&self, token: &str) {
        if let Ok(mut sessions) = self.sessions.write() {
            if let Some(session) = sessions.remove(token) {
                info!("Session destroyed for user '{}'", session.username);
            }
        }
    }

    /// Drop expired sessions
    pub fn cleanup(&self) {
        if let Ok(mut sessions) = self.sessions.write() {
            sessions.retain(|_, s| s.created.elapsed() < self.lifetime);
        }
    }
}

/// Hash a password into the PHC string stored in `auth.password_hash`
pub fn hash_password(password: &str) -> Result<String, String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| format!("Failed to hash password: {}", e))
}

fn verify_password(password: &str, phc: &str) -> bool {
    match PasswordHash::new(phc) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            warn!("auth.password_hash is not a valid PHC string: {}", e);
            false
        }
    }
}

/// Compare without short-circuiting on the first differing byte
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len()
        && a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Check a login attempt against the configured user
pub fn authenticate_user(config: &AuthConfig, username: &str, password: &str) -> bool {
    let phc = config.password_hash.trim();
    if username.is_empty() || password.is_empty() || phc.is_empty() {
        return false;
    }

    let user_ok = constant_time_eq(username.as_bytes(), config.username.as_bytes());
    // Verified even when the username is wrong
    let pass_ok = verify_password(password, phc);

    if user_ok && pass_ok {
        info!("Successful login for user '{}'", username);
        true
    } else {
        warn!("Failed login attempt for user '{}'", username);
        false
    }
}
