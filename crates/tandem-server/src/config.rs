use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use tandem_chat::ChatSettings;
use tandem_gateway::GatewaySettings;

/// Server configuration, read from `TANDEM_*` environment variables.
/// Every variable has a default suitable for local development.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub chat: ChatSettings,
    pub gateway: GatewaySettings,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let port: u16 = parse(&get("TANDEM_PORT", "3000"), "TANDEM_PORT")?;
        let history_page_size: u32 = parse(&get("TANDEM_HISTORY_PAGE_SIZE", "20"), "TANDEM_HISTORY_PAGE_SIZE")?;
        let history_max_page: u32 = parse(&get("TANDEM_HISTORY_MAX_PAGE", "100"), "TANDEM_HISTORY_MAX_PAGE")?;
        let outbound_queue: usize = parse(&get("TANDEM_OUTBOUND_QUEUE", "256"), "TANDEM_OUTBOUND_QUEUE")?;
        let heartbeat_secs: u64 = parse(&get("TANDEM_HEARTBEAT_SECS", "15"), "TANDEM_HEARTBEAT_SECS")?;

        if outbound_queue == 0 {
            anyhow::bail!("TANDEM_OUTBOUND_QUEUE must be at least 1");
        }
        if heartbeat_secs == 0 {
            anyhow::bail!("TANDEM_HEARTBEAT_SECS must be at least 1");
        }

        Ok(Self {
            host: get("TANDEM_HOST", "0.0.0.0"),
            port,
            db_path: PathBuf::from(get("TANDEM_DB_PATH", "tandem.db")),
            jwt_secret: get("TANDEM_JWT_SECRET", "dev-secret-change-me"),
            chat: ChatSettings {
                history_page_size,
                history_max_page: history_max_page.max(history_page_size),
            },
            gateway: GatewaySettings {
                outbound_queue,
                heartbeat_interval: Duration::from_secs(heartbeat_secs),
            },
        })
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}

fn parse<T>(value: &str, key: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("{key} has invalid value {value:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.db_path, PathBuf::from("tandem.db"));
        assert_eq!(cfg.chat.history_page_size, 20);
        assert_eq!(cfg.chat.history_max_page, 100);
        assert_eq!(cfg.gateway.outbound_queue, 256);
        assert_eq!(cfg.gateway.heartbeat_interval, Duration::from_secs(15));
        assert_eq!(cfg.addr().unwrap().port(), 3000);
    }

    #[test]
    fn overrides_and_bad_values() {
        let cfg = config(&[
            ("TANDEM_PORT", "8080"),
            ("TANDEM_HISTORY_PAGE_SIZE", "50"),
            ("TANDEM_HISTORY_MAX_PAGE", "10"),
        ])
        .unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.chat.history_max_page, 50);

        assert!(config(&[("TANDEM_PORT", "eighty")]).is_err());
        assert!(config(&[("TANDEM_OUTBOUND_QUEUE", "0")]).is_err());
        assert!(config(&[("TANDEM_HOST", "not a host")]).unwrap().addr().is_err());
    }
}
