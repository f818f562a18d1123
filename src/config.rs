use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::state::ArtifactPaths;

/// Artifacts shipped next to the crate manifest.
pub const DEFAULT_ARTIFACTS_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/artifacts");

#[derive(Debug, Clone, Parser)]
#[command(name = "forest-server", version, about = "Random forest inference server")]
pub struct ServerConfig {
    /// Address to bind the HTTP listener to
    #[arg(long, env = "SERVER_HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// Port to bind the HTTP listener to
    #[arg(long, env = "SERVER_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Directory holding random_forest.json and, optionally, feature_order.json
    #[arg(long, env = "ARTIFACTS_DIR", default_value = DEFAULT_ARTIFACTS_DIR)]
    pub artifacts_dir: PathBuf,

    /// Emit logs as JSON lines instead of human readable text
    #[arg(long, env = "LOG_JSON")]
    pub log_json: bool,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn artifact_paths(&self) -> ArtifactPaths {
        ArtifactPaths::in_dir(&self.artifacts_dir)
    }
}

/// Install the global tracing subscriber. `RUST_LOG` overrides the default filter.
pub fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_bundled_layout() {
        let config = ServerConfig::try_parse_from(["forest-server"]).unwrap();
        assert_eq!(config.socket_addr(), "0.0.0.0:8000".parse::<SocketAddr>().unwrap());
        assert!(config.artifacts_dir.ends_with("artifacts"));
        assert!(!config.log_json);
        assert!(config.artifact_paths().model.ends_with("artifacts/random_forest.json"));
    }

    #[test]
    fn flags_override_defaults() {
        let config = ServerConfig::try_parse_from([
            "forest-server",
            "--host",
            "127.0.0.1",
            "--port",
            "9090",
            "--artifacts-dir",
            "/srv/models",
            "--log-json",
        ])
        .unwrap();

        assert_eq!(config.socket_addr(), "127.0.0.1:9090".parse::<SocketAddr>().unwrap());
        assert_eq!(config.artifact_paths().feature_order, PathBuf::from("/srv/models/feature_order.json"));
        assert!(config.log_json);
    }
}
