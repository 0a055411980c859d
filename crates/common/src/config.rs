use std::time::Duration;

use serde::Deserialize;

/// Default collection endpoint for alert payloads.
pub const DEFAULT_COLLECTOR_URL: &str = "https://apialert.c-centralizador.com/api/yape";

/// Global agent configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Collection endpoint that receives one POST per payload
    pub collector_url: String,

    /// Redis connection string for the durable store
    pub redis_url: String,

    /// Namespace prepended to every store key (default: "bipe:")
    pub store_key_prefix: String,

    /// TCP connect timeout for payload delivery in seconds (default: 15)
    pub delivery_connect_timeout_secs: u64,

    /// Response read timeout for payload delivery in seconds (default: 15)
    pub delivery_read_timeout_secs: u64,

    /// Period of the recurring health job in minutes (default: 15)
    pub health_interval_minutes: u64,

    /// Overall flush cycle deadline in seconds; `None` when disabled with 0 (default: 600)
    pub cycle_deadline_secs: Option<u64>,

    /// API level reported by the host platform, gates the rebind request (default: 33)
    pub platform_api_level: u32,

    /// Shell command asking the capture service to reconnect
    pub capture_reconnect_cmd: Option<String>,

    /// Shell command asking the platform to rebind the listener
    pub capture_rebind_cmd: Option<String>,

    /// Shell command sending the readiness signal to the capture service
    pub capture_ready_cmd: Option<String>,

    /// Upper bound for each capture-service command in seconds (default: 5)
    pub capture_command_timeout_secs: u64,

    /// `host:port` checked before jobs with a network constraint fire
    pub connectivity_probe_addr: String,

    /// Listen address of the control API (default: 0.0.0.0:3000)
    pub api_bind_addr: String,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let collector_url =
            std::env::var("COLLECTOR_URL").unwrap_or_else(|_| DEFAULT_COLLECTOR_URL.to_string());

        let connectivity_probe_addr = match std::env::var("CONNECTIVITY_PROBE_ADDR") {
            Ok(addr) => addr,
            Err(_) => probe_addr_for(&collector_url).ok_or_else(|| {
                anyhow::anyhow!("COLLECTOR_URL must be an absolute http(s) URL with a host")
            })?,
        };

        let cycle_deadline_secs: u64 = std::env::var("CYCLE_DEADLINE_SECS")
            .unwrap_or_else(|_| "600".to_string())
            .parse()
            .map_err(|_| anyhow::anyhow!("CYCLE_DEADLINE_SECS must be a valid u64"))?;

        Ok(Self {
            collector_url,
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            store_key_prefix: std::env::var("STORE_KEY_PREFIX")
                .unwrap_or_else(|_| "bipe:".to_string()),
            delivery_connect_timeout_secs: std::env::var("DELIVERY_CONNECT_TIMEOUT_SECS")
                .unwrap_or_else(|_| "15".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DELIVERY_CONNECT_TIMEOUT_SECS must be a valid u64"))?,
            delivery_read_timeout_secs: std::env::var("DELIVERY_READ_TIMEOUT_SECS")
                .unwrap_or_else(|_| "15".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DELIVERY_READ_TIMEOUT_SECS must be a valid u64"))?,
            health_interval_minutes: std::env::var("HEALTH_INTERVAL_MINUTES")
                .unwrap_or_else(|_| "15".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("HEALTH_INTERVAL_MINUTES must be a valid u64"))?,
            cycle_deadline_secs: (cycle_deadline_secs > 0).then_some(cycle_deadline_secs),
            platform_api_level: std::env::var("PLATFORM_API_LEVEL")
                .unwrap_or_else(|_| "33".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PLATFORM_API_LEVEL must be a valid u32"))?,
            capture_reconnect_cmd: std::env::var("CAPTURE_RECONNECT_CMD").ok(),
            capture_rebind_cmd: std::env::var("CAPTURE_REBIND_CMD").ok(),
            capture_ready_cmd: std::env::var("CAPTURE_READY_CMD").ok(),
            capture_command_timeout_secs: std::env::var("CAPTURE_COMMAND_TIMEOUT_SECS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("CAPTURE_COMMAND_TIMEOUT_SECS must be a valid u64"))?,
            connectivity_probe_addr,
            api_bind_addr: std::env::var("API_BIND_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
        })
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval_minutes * 60)
    }

    pub fn cycle_deadline(&self) -> Option<Duration> {
        self.cycle_deadline_secs.map(Duration::from_secs)
    }
}

/// Derive a `host:port` probe target from an http(s) URL.
fn probe_addr_for(url: &str) -> Option<String> {
    let (scheme, rest) = url.split_once("://")?;
    let default_port = match scheme {
        "https" => 443,
        "http" => 80,
        _ => return None,
    };

    let authority = rest.split(['/', '?', '#']).next()?;
    let authority = authority.rsplit('@').next()?;
    if authority.is_empty() {
        return None;
    }

    if authority.contains(':') {
        Some(authority.to_string())
    } else {
        Some(format!("{}:{}", authority, default_port))
    }
}
