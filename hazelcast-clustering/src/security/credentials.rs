//! Credentials presented during the connection handshake.

use crate::config::SecurityConfig;

/// Credentials used for authentication.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// No credentials; accepted by clusters without security enabled.
    Anonymous,
    /// Username and password credentials.
    UsernamePassword {
        /// The username.
        username: String,
        /// The password.
        password: String,
    },
    /// Token-based credentials (e.g., JWT).
    Token(String),
}

impl Credentials {
    /// Returns the username, if these are username/password credentials.
    pub fn username(&self) -> Option<&str> {
        match self {
            Self::UsernamePassword { username, .. } => Some(username),
            _ => None,
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Anonymous => f.write_str("Anonymous"),
            Self::UsernamePassword { username, .. } => f
                .debug_struct("UsernamePassword")
                .field("username", username)
                .field("password", &"***")
                .finish(),
            Self::Token(_) => f.write_str("Token(***)"),
        }
    }
}

/// Source of the credentials used to authenticate new connections.
///
/// The cluster asks for fresh credentials before every handshake. When a
/// member rejects the credentials, [`reset`](Self::reset) is called and the
/// handshake is retried once.
pub trait CredentialsFactory: Send + Sync {
    /// Returns the credentials for the next handshake.
    fn new_credentials(&self) -> Credentials;

    /// Discards any cached credentials after a rejection.
    fn reset(&self) {}
}

impl std::fmt::Debug for dyn CredentialsFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CredentialsFactory")
    }
}

/// Always hands out the same credentials.
#[derive(Debug, Clone)]
pub struct StaticCredentialsFactory {
    credentials: Credentials,
}

impl StaticCredentialsFactory {
    /// Creates a factory for the given credentials.
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }

    /// Creates a factory from the security configuration.
    pub fn from_config(config: &SecurityConfig) -> Self {
        let credentials = match (config.username(), config.password(), config.token()) {
            (Some(username), Some(password), _) => Credentials::UsernamePassword {
                username: username.to_string(),
                password: password.to_string(),
            },
            (_, _, Some(token)) => Credentials::Token(token.to_string()),
            _ => Credentials::Anonymous,
        };
        Self::new(credentials)
    }
}

impl Default for StaticCredentialsFactory {
    fn default() -> Self {
        Self::new(Credentials::Anonymous)
    }
}

impl CredentialsFactory for StaticCredentialsFactory {
    fn new_credentials(&self) -> Credentials {
        self.credentials.clone()
    }
}
