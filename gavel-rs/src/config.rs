use crate::signing::MIN_SECRET_LEN;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::net::Ipv4Addr;
use std::time::Duration;
use std::{env, fmt, fs, path::Path};

pub const DEFAULT_CREDENTIAL_LIFETIME_HOURS: u32 = 24;
pub const DEFAULT_LISTEN_PORT: u16 = 3010;
pub const DEFAULT_EXPIRY_TICK_MS: u64 = 5_000;
pub const DEFAULT_LOCK_TTL_MS: u64 = 5_000;

/// Deadline applied to individual store and coordinator calls.
pub const OP_DEADLINE: Duration = Duration::from_secs(2);

fn default_host() -> Ipv4Addr {
    Ipv4Addr::UNSPECIFIED
}

fn default_credential_lifetime_hours() -> u32 {
    DEFAULT_CREDENTIAL_LIFETIME_HOURS
}

fn default_listen_port() -> u16 {
    DEFAULT_LISTEN_PORT
}

fn default_expiry_tick_ms() -> u64 {
    DEFAULT_EXPIRY_TICK_MS
}

fn default_lock_ttl_ms() -> u64 {
    DEFAULT_LOCK_TTL_MS
}

#[derive(Clone, Deserialize)]
pub struct Config {
    pub store_url: String,
    pub coordinator_url: String,
    pub credential_secret: String,
    #[serde(default = "default_credential_lifetime_hours")]
    pub credential_lifetime_hours: u32,
    #[serde(default = "default_host")]
    pub host: Ipv4Addr,
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    pub allowed_origin: String,
    #[serde(default = "default_expiry_tick_ms")]
    pub expiry_tick_ms: u64,
    #[serde(default = "default_lock_ttl_ms")]
    pub lock_ttl_ms: u64,
}

fn required(name: &str) -> Result<String> {
    env::var(name).with_context(|| format!("missing required environment variable `{name}`"))
}

fn optional_parsed<T: std::str::FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("could not parse environment variable `{name}`")),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Resolve the configuration from the environment. Every knob has an
    /// enumerated variable; anything optional falls back to its default.
    pub fn from_env() -> Result<Self> {
        let config = Self {
            store_url: required("STORE_URL")?,
            coordinator_url: required("COORDINATOR_URL")?,
            credential_secret: required("CREDENTIAL_SECRET")?,
            credential_lifetime_hours: optional_parsed(
                "CREDENTIAL_LIFETIME_HOURS",
                DEFAULT_CREDENTIAL_LIFETIME_HOURS,
            )?,
            host: default_host(),
            listen_port: optional_parsed("LISTEN_PORT", DEFAULT_LISTEN_PORT)?,
            allowed_origin: required("ALLOWED_ORIGIN")?,
            expiry_tick_ms: optional_parsed("EXPIRY_TICK_MS", DEFAULT_EXPIRY_TICK_MS)?,
            lock_ttl_ms: optional_parsed("LOCK_TTL_MS", DEFAULT_LOCK_TTL_MS)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file<P: AsRef<Path> + fmt::Display>(path: P) -> Result<Self> {
        tracing::info!("loading config from `{path}`...");
        let config_data = fs::read_to_string(path.as_ref())
            .with_context(|| format!("could not read config from `{path}`"))?;
        let config: Self = toml::from_str(&config_data).context("could not parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.credential_secret.len() < MIN_SECRET_LEN {
            bail!("CREDENTIAL_SECRET must be at least {MIN_SECRET_LEN} bytes");
        }
        if !(1..=168).contains(&self.credential_lifetime_hours) {
            bail!("CREDENTIAL_LIFETIME_HOURS must be within 1..=168");
        }
        if self.listen_port < 1024 {
            bail!("LISTEN_PORT must be within 1024..=65535");
        }
        url::Url::parse(&self.allowed_origin).context("ALLOWED_ORIGIN must be a valid origin")?;
        if self.expiry_tick_ms == 0 {
            bail!("EXPIRY_TICK_MS must be positive");
        }
        if self.lock_ttl_ms == 0 {
            bail!("LOCK_TTL_MS must be positive");
        }
        Ok(())
    }

    pub fn credential_lifetime(&self) -> Duration {
        Duration::from_secs(u64::from(self.credential_lifetime_hours) * 3_600)
    }

    pub fn expiry_tick(&self) -> Duration {
        Duration::from_millis(self.expiry_tick_ms)
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_millis(self.lock_ttl_ms)
    }
}

// Manual Debug keeps the signing secret out of logs and `gavel config` output.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("store_url", &self.store_url)
            .field("coordinator_url", &self.coordinator_url)
            .field("credential_secret", &"<redacted>")
            .field("credential_lifetime_hours", &self.credential_lifetime_hours)
            .field("host", &self.host)
            .field("listen_port", &self.listen_port)
            .field("allowed_origin", &self.allowed_origin)
            .field("expiry_tick_ms", &self.expiry_tick_ms)
            .field("lock_ttl_ms", &self.lock_ttl_ms)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            store_url: "sqlite::memory:".into(),
            coordinator_url: "mem:".into(),
            credential_secret: "0123456789abcdef0123456789abcdef".into(),
            credential_lifetime_hours: DEFAULT_CREDENTIAL_LIFETIME_HOURS,
            host: Ipv4Addr::LOCALHOST,
            listen_port: DEFAULT_LISTEN_PORT,
            allowed_origin: "http://localhost:5173".into(),
            expiry_tick_ms: DEFAULT_EXPIRY_TICK_MS,
            lock_ttl_ms: DEFAULT_LOCK_TTL_MS,
        }
    }

    #[test]
    fn defaults_are_valid() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn short_secret_is_refused() {
        let mut config = config();
        config.credential_secret = "too-short".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn lifetime_bounds() {
        let mut config = config();
        config.credential_lifetime_hours = 0;
        assert!(config.validate().is_err());
        config.credential_lifetime_hours = 169;
        assert!(config.validate().is_err());
        config.credential_lifetime_hours = 168;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn privileged_ports_are_refused() {
        let mut config = config();
        config.listen_port = 80;
        assert!(config.validate().is_err());
    }

    #[test]
    fn debug_redacts_the_secret() {
        let rendered = format!("{:?}", config());
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("0123456789abcdef"));
    }

    #[test]
    fn toml_roundtrip_with_defaults() {
        let raw = r#"
            store_url = "postgres://localhost/gavel"
            coordinator_url = "mem:"
            credential_secret = "0123456789abcdef0123456789abcdef"
            allowed_origin = "https://bids.example.com"
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.listen_port, DEFAULT_LISTEN_PORT);
        assert_eq!(config.expiry_tick_ms, DEFAULT_EXPIRY_TICK_MS);
        assert!(config.validate().is_ok());
    }
}
