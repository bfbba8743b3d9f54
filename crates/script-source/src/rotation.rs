//! API credential rotation.
//!
//! A generation request is tried once per key, in shuffled order, with an
//! exponential pause between attempts. It fails only when every key has
//! failed, and the error lists each (masked) key with its failure.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use rand::seq::SliceRandom;
use shortreel_common::error::ReelError;

/// Errors from credential rotation.
#[derive(Debug, thiserror::Error)]
pub enum RotationError {
    #[error("No API keys found; set at least one environment variable starting with {prefix}")]
    NoCredentials { prefix: String },

    #[error("Credential pool is empty")]
    EmptyPool,

    #[error("All {attempts} API keys failed: {}", .failures.join("; "))]
    Exhausted {
        attempts: usize,
        /// `masked_key: message`, in attempt order.
        failures: Vec<String>,
    },
}

impl From<RotationError> for ReelError {
    fn from(err: RotationError) -> Self {
        ReelError::script_source(err.to_string())
    }
}

/// Mask a secret for logs: first and last four characters only.
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "***".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

/// A deduplicated set of API keys.
#[derive(Clone)]
pub struct CredentialPool {
    keys: Vec<String>,
}

impl CredentialPool {
    /// Keys in the given order, with blanks and duplicates removed.
    pub fn new(keys: impl IntoIterator<Item = String>) -> Self {
        let mut unique: Vec<String> = Vec::new();
        for key in keys {
            let key = key.trim().to_string();
            if !key.is_empty() && !unique.contains(&key) {
                unique.push(key);
            }
        }
        Self { keys: unique }
    }

    /// Every non-empty environment variable whose name starts with `prefix`.
    pub fn from_env(prefix: &str) -> Result<Self, RotationError> {
        Self::from_vars(prefix, std::env::vars())
    }

    /// Like [`from_env`](Self::from_env) over an explicit variable list.
    /// Variables are taken in name order so discovery is deterministic.
    pub fn from_vars(
        prefix: &str,
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> Result<Self, RotationError> {
        let mut matching: Vec<(String, String)> = vars
            .into_iter()
            .filter(|(name, _)| name.starts_with(prefix))
            .collect();
        matching.sort();
        let pool = Self::new(matching.into_iter().map(|(_, value)| value));
        if pool.is_empty() {
            return Err(RotationError::NoCredentials {
                prefix: prefix.to_string(),
            });
        }
        tracing::info!(keys = pool.len(), prefix, "Loaded API keys");
        Ok(pool)
    }

    /// Put `key` first, ahead of any discovered keys.
    pub fn with_primary(self, key: impl Into<String>) -> Self {
        Self::new(std::iter::once(key.into()).chain(self.keys))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }
}

impl fmt::Debug for CredentialPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let masked: Vec<String> = self.keys.iter().map(|k| mask_key(k)).collect();
        f.debug_struct("CredentialPool").field("keys", &masked).finish()
    }
}

/// Pause schedule between key attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: u32,
    /// Try keys in pool order instead of shuffling.
    pub preserve_order: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(8),
            multiplier: 2,
            preserve_order: false,
        }
    }
}

impl RetryPolicy {
    /// No pauses, pool order. For tests and local tools.
    pub fn immediate() -> Self {
        Self {
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            multiplier: 1,
            preserve_order: true,
        }
    }

    /// Pause before attempt `attempt` (0-based; attempt 0 never waits).
    pub fn backoff(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = self
            .multiplier
            .saturating_pow(u32::try_from(attempt - 1).unwrap_or(u32::MAX));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Run `attempt` with each key at most once until one succeeds.
    pub async fn run<T, E, F, Fut>(&self, pool: &CredentialPool, mut attempt: F) -> Result<T, RotationError>
    where
        E: fmt::Display,
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if pool.is_empty() {
            return Err(RotationError::EmptyPool);
        }

        let order = self.order(pool);
        let total = order.len();
        let mut failures = Vec::with_capacity(total);

        for (index, key) in order.into_iter().enumerate() {
            let delay = self.backoff(index);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let masked = mask_key(&key);
            tracing::debug!(key = %masked, attempt = index + 1, total, "Trying API key");
            match attempt(key).await {
                Ok(value) => {
                    if index > 0 {
                        tracing::info!(key = %masked, attempt = index + 1, "Succeeded after rotating keys");
                    }
                    return Ok(value);
                }
                Err(e) => {
                    tracing::warn!(key = %masked, attempt = index + 1, total, error = %e, "API key attempt failed");
                    failures.push(format!("{masked}: {e}"));
                }
            }
        }

        tracing::error!(attempts = total, "All API keys exhausted");
        Err(RotationError::Exhausted {
            attempts: total,
            failures,
        })
    }

    fn order(&self, pool: &CredentialPool) -> Vec<String> {
        let mut keys = pool.keys().to_vec();
        if !self.preserve_order {
            keys.shuffle(&mut rand::thread_rng());
        }
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_mask_key() {
        assert_eq!(mask_key("AIzaSyExample1234"), "AIza...1234");
        assert_eq!(mask_key("short"), "***");
        assert_eq!(mask_key("12345678"), "***");
    }

    #[test]
    fn test_pool_discovery_dedups_and_filters() {
        let pool = CredentialPool::from_vars(
            "GEMINI_API_",
            vars(&[
                ("GEMINI_API_KEY_2", "key-bbbbbbbbbb"),
                ("GEMINI_API_KEY", "key-aaaaaaaaaa"),
                ("GEMINI_API_KEY_3", "key-aaaaaaaaaa"),
                ("GEMINI_API_EMPTY", ""),
                ("OTHER_KEY", "key-cccccccccc"),
            ]),
        )
        .unwrap();
        assert_eq!(pool.keys(), ["key-aaaaaaaaaa", "key-bbbbbbbbbb"]);
    }

    #[test]
    fn test_pool_without_keys_is_error() {
        let err = CredentialPool::from_vars("GEMINI_API_", vars(&[("PATH", "/bin")])).unwrap_err();
        assert!(err.to_string().contains("GEMINI_API_"));
    }

    #[test]
    fn test_primary_key_goes_first() {
        let pool = CredentialPool::new(["b-key".to_string(), "a-key".to_string()]).with_primary("a-key");
        assert_eq!(pool.keys(), ["a-key", "b-key"]);
    }

    #[test]
    fn test_debug_masks_keys() {
        let pool = CredentialPool::new(["supersecretvalue".to_string()]);
        let shown = format!("{pool:?}");
        assert!(!shown.contains("supersecretvalue"));
        assert!(shown.contains("supe...alue"));
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0), Duration::ZERO);
        assert_eq!(policy.backoff(1), Duration::from_secs(1));
        assert_eq!(policy.backoff(2), Duration::from_secs(2));
        assert_eq!(policy.backoff(3), Duration::from_secs(4));
        assert_eq!(policy.backoff(10), Duration::from_secs(8));
    }

    #[tokio::test]
    async fn test_rotates_until_success() {
        let pool = CredentialPool::new(["key-one-xxxx".to_string(), "key-two-xxxx".to_string(), "key-three-xx".to_string()]);
        let tried = Arc::new(Mutex::new(Vec::new()));
        let log = tried.clone();

        let result = RetryPolicy::immediate()
            .run(&pool, |key| {
                let log = log.clone();
                async move {
                    log.lock().unwrap().push(key.clone());
                    if key == "key-three-xx" {
                        Ok(42)
                    } else {
                        Err(format!("quota exceeded for {}", key.len()))
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(result, 42);
        assert_eq!(tried.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_each_key_tried_once_then_exhausted() {
        let pool = CredentialPool::new(["secret-alpha-1".to_string(), "secret-beta-22".to_string()]);
        let calls = Arc::new(Mutex::new(0usize));
        let counter = calls.clone();

        let policy = RetryPolicy {
            preserve_order: false,
            ..RetryPolicy::immediate()
        };
        let err = policy
            .run(&pool, |_key| {
                let counter = counter.clone();
                async move {
                    *counter.lock().unwrap() += 1;
                    Err::<(), _>("boom")
                }
            })
            .await
            .unwrap_err();

        assert_eq!(*calls.lock().unwrap(), 2);
        match &err {
            RotationError::Exhausted { attempts, failures } => {
                assert_eq!(*attempts, 2);
                assert_eq!(failures.len(), 2);
            }
            other => panic!("unexpected {other:?}"),
        }
        let msg = err.to_string();
        assert!(!msg.contains("secret-alpha-1"));
        assert!(msg.contains("secr...ha-1") || msg.contains("secr...a-22"));
    }
}
