// ── Bearer credential providers ──
//
// The push endpoint carries an optional bearer token. It is looked up at
// connect time through `CredentialProvider`, so the engine never reaches
// into a particular storage mechanism itself.

use secrecy::{ExposeSecret, SecretString};

/// Supplies the bearer token for the next connection attempt.
///
/// Returning `None` is not an error: the connection proceeds
/// unauthenticated.
pub trait CredentialProvider: Send + Sync {
    fn bearer_token(&self) -> Option<SecretString>;
}

/// Any `Fn() -> Option<SecretString>` is a provider.
impl<F> CredentialProvider for F
where
    F: Fn() -> Option<SecretString> + Send + Sync,
{
    fn bearer_token(&self) -> Option<SecretString> {
        self()
    }
}

/// Never supplies a token.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCredentials;

impl CredentialProvider for NoCredentials {
    fn bearer_token(&self) -> Option<SecretString> {
        None
    }
}

/// A fixed token, e.g. resolved once from a config file.
#[derive(Debug, Clone)]
pub struct StaticToken(SecretString);

impl StaticToken {
    pub fn new(token: SecretString) -> Self {
        Self(token)
    }
}

impl CredentialProvider for StaticToken {
    fn bearer_token(&self) -> Option<SecretString> {
        Some(self.0.clone())
    }
}

/// Reads the token from an environment variable on every connect, so a
/// token refreshed by another process is picked up on the next `start()`.
#[derive(Debug, Clone)]
pub struct EnvToken {
    var: String,
}

impl EnvToken {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl CredentialProvider for EnvToken {
    fn bearer_token(&self) -> Option<SecretString> {
        std::env::var(&self.var)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(SecretString::from)
    }
}

/// Returns `true` if `provider` currently yields a non-empty token.
pub fn has_token(provider: &dyn CredentialProvider) -> bool {
    provider
        .bearer_token()
        .is_some_and(|t| !t.expose_secret().is_empty())
}
