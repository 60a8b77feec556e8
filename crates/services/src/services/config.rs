use std::env;
use std::time::Duration;

/// Process configuration, read once at startup. Every knob has a default so
/// a bare environment still boots.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub expiry_sweep_interval: Duration,
    pub effect_retry_interval: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:rewards.db".to_string()),
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3001),
            expiry_sweep_interval: Duration::from_secs(env_u64(
                "REFERRAL_EXPIRY_SWEEP_INTERVAL_SECS",
                3600,
            )),
            effect_retry_interval: Duration::from_secs(env_u64(
                "SIDE_EFFECT_RETRY_INTERVAL_SECS",
                30,
            )),
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
