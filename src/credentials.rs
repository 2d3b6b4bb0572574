use anyhow::Result;
use std::env;

const ENV_PASSWORD: &str = "MAILKEEP_PASSWORD";
const KEYRING_SERVICE: &str = "mailkeep";

/// Looks up the IMAP password for one account.
pub struct CredentialStore {
    key: String,
}

impl CredentialStore {
    pub fn new(username: &str, server: &str) -> Self {
        Self {
            key: format!("imap:{}@{}", username, server),
        }
    }

    /// Check for password in environment variable
    fn env_password() -> Option<String> {
        env::var(ENV_PASSWORD).ok().filter(|s| !s.is_empty())
    }

    /// Try to get password from keyring
    fn keyring_get(&self) -> Option<String> {
        let entry = keyring::Entry::new(KEYRING_SERVICE, &self.key).ok()?;
        entry.get_password().ok()
    }

    /// Resolve the password: explicit value, then environment, then OS keyring.
    pub fn get_password(&self, explicit: Option<&str>) -> Result<String> {
        // 1. Command line or config file
        if let Some(pwd) = explicit.filter(|s| !s.is_empty()) {
            return Ok(pwd.to_string());
        }

        // 2. Environment variable
        if let Some(pwd) = Self::env_password() {
            return Ok(pwd);
        }

        // 3. Keyring
        if let Some(pwd) = self.keyring_get() {
            tracing::debug!("Using password from keyring entry {}", self.key);
            return Ok(pwd);
        }

        anyhow::bail!(
            "Password not found. Pass --password, set {} or store it in the keyring \
             (service '{}', user '{}').",
            ENV_PASSWORD,
            KEYRING_SERVICE,
            self.key
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Mutex to prevent parallel test interference with env vars
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    #[test]
    fn test_keyring_key_includes_server() {
        let store = CredentialStore::new("me@example.com", "imap.example.com");
        assert_eq!(store.key, "imap:me@example.com@imap.example.com");
    }

    #[test]
    fn test_explicit_password_takes_priority() {
        let _guard = ENV_MUTEX.lock().unwrap();
        // SAFETY: serialized by ENV_MUTEX
        unsafe { env::set_var(ENV_PASSWORD, "env_password") };

        let store = CredentialStore::new("priority_test", "imap.invalid");
        assert_eq!(store.get_password(Some("cli_password")).unwrap(), "cli_password");
        assert_eq!(store.get_password(None).unwrap(), "env_password");
        assert_eq!(store.get_password(Some("")).unwrap(), "env_password");

        unsafe { env::remove_var(ENV_PASSWORD) };
    }
}
