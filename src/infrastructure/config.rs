use crate::domain::time_grid::{
    TimeGrid, DEFAULT_DAY_END_HOUR, DEFAULT_DAY_START_HOUR, DEFAULT_SLOT_MINUTES,
};
use crate::infrastructure::error::InfraError;
use serde_json::Value;
use std::fs;
use std::path::Path;

const CLIENT_JSON: &str = "client.json";
const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";
const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 15;
const DEFAULT_RETRY_MAX_ATTEMPTS: u8 = 3;
const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 200;
const DEFAULT_MAX_CREATE_ATTEMPTS_PER_SLOT: u8 = 3;
const DEFAULT_HORIZON_DAYS: u32 = 14;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u8,
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    pub grid: TimeGrid,
    pub request_timeout_seconds: u64,
    pub retry: RetryPolicy,
    pub max_create_attempts_per_slot: u8,
    pub horizon_days: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            grid: TimeGrid::default(),
            request_timeout_seconds: DEFAULT_REQUEST_TIMEOUT_SECONDS,
            retry: RetryPolicy::default(),
            max_create_attempts_per_slot: DEFAULT_MAX_CREATE_ATTEMPTS_PER_SLOT,
            horizon_days: DEFAULT_HORIZON_DAYS,
        }
    }
}

fn default_client_json() -> Value {
    serde_json::json!({
        "schema": 1,
        "baseUrl": DEFAULT_BASE_URL,
        "dayStartHour": DEFAULT_DAY_START_HOUR,
        "dayEndHour": DEFAULT_DAY_END_HOUR,
        "slotMinutes": DEFAULT_SLOT_MINUTES,
        "requestTimeoutSeconds": DEFAULT_REQUEST_TIMEOUT_SECONDS,
        "retry": {
            "maxAttempts": DEFAULT_RETRY_MAX_ATTEMPTS,
            "baseDelayMs": DEFAULT_RETRY_BASE_DELAY_MS
        },
        "scheduler": {
            "maxCreateAttemptsPerSlot": DEFAULT_MAX_CREATE_ATTEMPTS_PER_SLOT,
            "horizonDays": DEFAULT_HORIZON_DAYS
        }
    })
}

pub fn ensure_default_config(config_dir: &Path) -> Result<(), InfraError> {
    let path = config_dir.join(CLIENT_JSON);
    if !path.exists() {
        let formatted = serde_json::to_string_pretty(&default_client_json())?;
        fs::write(path, format!("{formatted}\n"))?;
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != 1 {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

pub fn load_client_config(config_dir: &Path) -> Result<ClientConfig, InfraError> {
    let parsed = read_config(&config_dir.join(CLIENT_JSON))?;
    client_config_from_value(&parsed)
}

/// Malformed individual values keep their defaults; an unusable grid is an error.
pub fn client_config_from_value(parsed: &Value) -> Result<ClientConfig, InfraError> {
    let mut config = ClientConfig::default();

    if let Some(base_url) = parsed
        .get("baseUrl")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        config.base_url = base_url.to_string();
    }

    let hour = |key: &str, fallback: u32| {
        parsed
            .get(key)
            .and_then(Value::as_u64)
            .and_then(|value| u32::try_from(value).ok())
            .unwrap_or(fallback)
    };
    config.grid = TimeGrid::new(
        hour("dayStartHour", DEFAULT_DAY_START_HOUR),
        hour("dayEndHour", DEFAULT_DAY_END_HOUR),
        hour("slotMinutes", DEFAULT_SLOT_MINUTES),
    )
    .map_err(InfraError::InvalidConfig)?;

    if let Some(value) = parsed.get("requestTimeoutSeconds").and_then(Value::as_u64) {
        config.request_timeout_seconds = value.max(1);
    }

    if let Some(retry) = parsed.get("retry") {
        if let Some(value) = retry
            .get("maxAttempts")
            .and_then(Value::as_u64)
            .and_then(|value| u8::try_from(value).ok())
        {
            config.retry.max_attempts = value.max(1);
        }
        if let Some(value) = retry.get("baseDelayMs").and_then(Value::as_u64) {
            config.retry.base_delay_ms = value;
        }
    }

    if let Some(scheduler) = parsed.get("scheduler") {
        if let Some(value) = scheduler
            .get("maxCreateAttemptsPerSlot")
            .and_then(Value::as_u64)
            .and_then(|value| u8::try_from(value).ok())
        {
            config.max_create_attempts_per_slot = value.max(1);
        }
        if let Some(value) = scheduler
            .get("horizonDays")
            .and_then(Value::as_u64)
            .and_then(|value| u32::try_from(value).ok())
        {
            config.horizon_days = value;
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_TEMP_DIR: AtomicUsize = AtomicUsize::new(0);

    struct TempDir {
        path: PathBuf,
    }

    impl TempDir {
        fn new() -> Self {
            let sequence = NEXT_TEMP_DIR.fetch_add(1, Ordering::Relaxed);
            let path = std::env::temp_dir().join(format!(
                "studyblock-config-tests-{}-{}",
                std::process::id(),
                sequence
            ));
            fs::create_dir_all(&path).expect("create temp dir");
            Self { path }
        }
    }

    impl Drop for TempDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.path);
        }
    }

    #[test]
    fn default_file_is_written_once_and_loads_as_defaults() {
        let dir = TempDir::new();
        ensure_default_config(&dir.path).expect("write defaults");
        let loaded = load_client_config(&dir.path).expect("load defaults");
        assert_eq!(loaded, ClientConfig::default());

        fs::write(
            dir.path.join(CLIENT_JSON),
            "{\"schema\": 1, \"baseUrl\": \"http://planner.local\"}\n",
        )
        .expect("overwrite config");
        ensure_default_config(&dir.path).expect("keep existing");
        let loaded = load_client_config(&dir.path).expect("load custom");
        assert_eq!(loaded.base_url, "http://planner.local");
    }

    #[test]
    fn schema_mismatch_is_rejected() {
        let dir = TempDir::new();
        fs::write(dir.path.join(CLIENT_JSON), "{\"schema\": 2}").expect("write config");
        match load_client_config(&dir.path) {
            Err(InfraError::InvalidConfig(message)) => {
                assert!(message.contains("unsupported schema"))
            }
            other => panic!("expected invalid config, got {other:?}"),
        }

        fs::write(dir.path.join(CLIENT_JSON), "{}").expect("write config");
        assert!(load_client_config(&dir.path).is_err());
    }

    #[test]
    fn malformed_values_fall_back_to_defaults() {
        let parsed = serde_json::json!({
            "schema": 1,
            "baseUrl": "  ",
            "requestTimeoutSeconds": "soon",
            "retry": { "maxAttempts": 0, "baseDelayMs": 5 },
            "scheduler": { "maxCreateAttemptsPerSlot": 900, "horizonDays": 30 }
        });
        let config = client_config_from_value(&parsed).expect("tolerant parse");
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.request_timeout_seconds, DEFAULT_REQUEST_TIMEOUT_SECONDS);
        assert_eq!(config.retry.max_attempts, 1);
        assert_eq!(config.retry.base_delay_ms, 5);
        assert_eq!(config.max_create_attempts_per_slot, DEFAULT_MAX_CREATE_ATTEMPTS_PER_SLOT);
        assert_eq!(config.horizon_days, 30);
    }

    #[test]
    fn invalid_grid_is_an_error() {
        let parsed = serde_json::json!({ "schema": 1, "dayStartHour": 8, "slotMinutes": 45 });
        assert!(matches!(
            client_config_from_value(&parsed),
            Err(InfraError::InvalidConfig(_))
        ));
    }
}
