use std::time::Duration;

use pushcloud_core::{Backoff, RetryPolicy};

const DEFAULT_MAX_ATTEMPTS: u64 = 50;
const DEFAULT_BACKOFF_BASE_MS: u64 = 1_000;
const DEFAULT_BACKOFF_MAX_MS: u64 = 64_000;
const DEFAULT_HTTP_IDLE_TIMEOUT_SECS: u64 = 120;

/// Retry and timeout knobs for the upload, read from the environment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadTuning {
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub backoff_jitter: bool,
    /// How long an exchange may go without moving a byte.
    pub http_idle_timeout: Duration,
}

impl UploadTuning {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let max_attempts = read_u64(&lookup, "PUSHCLOUD_UPLOAD_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS);
        Self {
            max_attempts: u32::try_from(max_attempts).unwrap_or(u32::MAX),
            backoff_base: Duration::from_millis(read_u64(
                &lookup,
                "PUSHCLOUD_BACKOFF_BASE_MS",
                DEFAULT_BACKOFF_BASE_MS,
            )),
            backoff_max: Duration::from_millis(read_u64(
                &lookup,
                "PUSHCLOUD_BACKOFF_MAX_MS",
                DEFAULT_BACKOFF_MAX_MS,
            )),
            backoff_jitter: read_bool(&lookup, "PUSHCLOUD_BACKOFF_JITTER", true),
            http_idle_timeout: Duration::from_secs(read_u64(
                &lookup,
                "PUSHCLOUD_HTTP_IDLE_TIMEOUT_SECS",
                DEFAULT_HTTP_IDLE_TIMEOUT_SECS,
            )),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            Backoff::new(self.backoff_base, self.backoff_max, self.backoff_jitter),
            self.max_attempts,
        )
    }
}

fn read_u64<F>(lookup: &F, name: &str, default: u64) -> u64
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

fn read_bool<F>(lookup: &F, name: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|value| match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        })
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn defaults_apply_without_environment() {
        let tuning = UploadTuning::from_lookup(lookup(&[]));
        assert_eq!(tuning.max_attempts, 50);
        assert_eq!(tuning.backoff_base, Duration::from_secs(1));
        assert_eq!(tuning.backoff_max, Duration::from_secs(64));
        assert!(tuning.backoff_jitter);
        assert_eq!(tuning.http_idle_timeout, Duration::from_secs(120));
    }

    #[test]
    fn reads_overrides() {
        let tuning = UploadTuning::from_lookup(lookup(&[
            ("PUSHCLOUD_UPLOAD_MAX_ATTEMPTS", "7"),
            ("PUSHCLOUD_BACKOFF_BASE_MS", "10"),
            ("PUSHCLOUD_BACKOFF_JITTER", "off"),
            ("PUSHCLOUD_HTTP_IDLE_TIMEOUT_SECS", " 30 "),
        ]));
        assert_eq!(tuning.max_attempts, 7);
        assert_eq!(tuning.backoff_base, Duration::from_millis(10));
        assert!(!tuning.backoff_jitter);
        assert_eq!(tuning.http_idle_timeout, Duration::from_secs(30));
        assert_eq!(tuning.retry_policy().max_attempts, 7);
    }

    #[test]
    fn invalid_or_zero_values_fall_back() {
        let tuning = UploadTuning::from_lookup(lookup(&[
            ("PUSHCLOUD_UPLOAD_MAX_ATTEMPTS", "0"),
            ("PUSHCLOUD_BACKOFF_MAX_MS", "soon"),
            ("PUSHCLOUD_BACKOFF_JITTER", "maybe"),
        ]));
        assert_eq!(tuning.max_attempts, 50);
        assert_eq!(tuning.backoff_max, Duration::from_secs(64));
        assert!(tuning.backoff_jitter);
    }

    #[test]
    fn huge_attempt_ceiling_is_clamped_by_policy() {
        let tuning = UploadTuning::from_lookup(lookup(&[(
            "PUSHCLOUD_UPLOAD_MAX_ATTEMPTS",
            "99999999999",
        )]));
        assert_eq!(tuning.max_attempts, u32::MAX);
        assert_eq!(tuning.retry_policy().max_attempts, 10_000);
    }
}
