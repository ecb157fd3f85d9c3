use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Connection settings for the MICO broker and its Marmotta SPARQL endpoint.
#[derive(Debug, Clone)]
pub struct MicoConfig {
    /// Broker root, always ending in `/` (e.g. `http://demo/broker/`).
    pub broker_url: String,
    pub sparql_select_url: String,
    pub username: String,
    pub password: String,
    pub route_id: String,
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
}

/// Credentials HelixWare expects when we fetch an asset's media.
#[derive(Debug, Clone)]
pub struct HelixWareConfig {
    pub application_key: String,
    pub application_secret: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub mico: MicoConfig,
    pub helixware: HelixWareConfig,
    pub db_path: PathBuf,
    pub cache_dir: PathBuf,
    pub addr: SocketAddr,
    pub max_workers: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| {
            get(key)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| anyhow::anyhow!("{} environment variable not set", key))
        };
        let or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());
        let parsed = |key: &str, default: &str| -> Result<u64> {
            let raw = or(key, default);
            u64::from_str(&raw).with_context(|| format!("{} is not a number: {}", key, raw))
        };

        let server = required("MICO_SERVER")?;
        let path = or("MICO_PATH", "broker/");
        let broker_url = broker_url(&server, &path);
        let sparql_select_url = get("MICO_SPARQL_SELECT_URL")
            .unwrap_or_else(|| format!("http://{}/marmotta/sparql/select", server));

        let mico = MicoConfig {
            broker_url,
            sparql_select_url,
            username: required("MICO_USERNAME")?,
            password: required("MICO_PASSWORD")?,
            route_id: or("MICO_ROUTE_ID", "6"),
            poll_interval: Duration::from_millis(parsed("MICO_POLL_INTERVAL_MS", "1000")?),
            poll_timeout: Duration::from_secs(parsed("MICO_POLL_TIMEOUT_SECS", "3600")?),
        };

        let helixware = HelixWareConfig {
            application_key: required("HELIXWARE_APPLICATION_KEY")?,
            application_secret: required("HELIXWARE_APPLICATION_SECRET")?,
        };

        let addr_raw = or("GATEWAY_ADDR", "127.0.0.1:8080");
        let addr = addr_raw
            .parse()
            .with_context(|| format!("GATEWAY_ADDR is not a socket address: {}", addr_raw))?;

        let max_workers = parsed("GATEWAY_MAX_WORKERS", "10")?.max(1) as usize;

        Ok(Config {
            mico,
            helixware,
            db_path: PathBuf::from(or("GATEWAY_DB_PATH", ".cache/mico-gateway.db")),
            cache_dir: PathBuf::from(or("GATEWAY_CACHE_DIR", ".cache/downloads")),
            addr,
            max_workers,
        })
    }
}

/// `http://{server}/{path}/`, accepting a server given with its scheme.
fn broker_url(server: &str, path: &str) -> String {
    let base = if server.starts_with("http://") || server.starts_with("https://") {
        server.trim_end_matches('/').to_string()
    } else {
        format!("http://{}", server.trim_end_matches('/'))
    };
    let path = path.trim_matches('/');
    if path.is_empty() {
        format!("{}/", base)
    } else {
        format!("{}/{}/", base, path)
    }
}
