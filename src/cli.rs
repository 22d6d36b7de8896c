//! Command-line flags.
//!
//! Flags override the matching config file values. `--routes` replaces the
//! file's `[[routes]]` entirely, and any `--shard` replaces `[[shards]]`.

use std::path::PathBuf;

use clap::Parser;

use crate::config::loader::{load_routes, read_config};
use crate::config::{ConfigError, DispatcherConfig, ShardConfig};

#[derive(Debug, Parser)]
#[command(name = "shard-dispatcher")]
#[command(about = "Routes HTTP requests to backend shards by request content", long_about = None)]
pub struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// JSON routes file
    #[arg(short, long)]
    pub routes: Option<PathBuf>,

    /// Shard backend address; repeat once per shard, in index order. The table
    /// size is the number of addresses given; there is no separate shard count
    #[arg(long = "shard", value_name = "ADDR")]
    pub shards: Vec<String>,

    /// Listen address, e.g. 0.0.0.0:8080
    #[arg(long)]
    pub http_address: Option<String>,

    /// URL receiving error reports
    #[arg(long)]
    pub report_url: Option<String>,

    /// URL receiving metric summaries
    #[arg(long)]
    pub metric_url: Option<String>,

    /// Mirror target receiving a copy of every sharded request
    #[arg(long)]
    pub repeat_url: Option<String>,
}

impl Cli {
    /// Load the config file (or defaults), then apply the routes file and flags.
    /// The result is not validated yet.
    pub fn load(&self) -> Result<DispatcherConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => read_config(path)?,
            None => DispatcherConfig::default(),
        };
        if let Some(path) = &self.routes {
            config.routes = load_routes(path)?;
        }
        self.apply(&mut config);
        Ok(config)
    }

    pub fn apply(&self, config: &mut DispatcherConfig) {
        if !self.shards.is_empty() {
            config.shards = self
                .shards
                .iter()
                .map(|address| ShardConfig {
                    address: address.clone(),
                })
                .collect();
        }
        if let Some(address) = &self.http_address {
            config.listener.bind_address = address.clone();
        }
        if let Some(url) = &self.report_url {
            config.reporter.url = Some(url.clone());
        }
        if let Some(url) = &self.metric_url {
            config.monitor.url = Some(url.clone());
        }
        if let Some(url) = &self.repeat_url {
            config.mirror.url = Some(url.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_shard_help_explains_table_size() {
        let command = Cli::command();
        let shard = command
            .get_arguments()
            .find(|arg| arg.get_long() == Some("shard"))
            .unwrap();
        let help = shard.get_help().unwrap().to_string();
        assert!(help.contains("table size is the number of addresses"), "{}", help);
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::try_parse_from([
            "shard-dispatcher",
            "--http-address",
            "127.0.0.1:9000",
            "--report-url",
            "http://reports:8000/",
            "--repeat-url",
            "http://mirror:7000",
            "--shard",
            "10.0.0.1:9001",
            "--shard",
            "10.0.0.2:9001",
        ])
        .unwrap();

        let mut config = DispatcherConfig::default();
        config.monitor.url = Some("http://metrics:8000/".into());
        cli.apply(&mut config);

        assert_eq!(config.listener.bind_address, "127.0.0.1:9000");
        assert_eq!(config.reporter.url.as_deref(), Some("http://reports:8000/"));
        assert_eq!(config.monitor.url.as_deref(), Some("http://metrics:8000/"));
        assert_eq!(config.mirror.url.as_deref(), Some("http://mirror:7000"));
        let shards: Vec<_> = config.shards.iter().map(|s| s.address.as_str()).collect();
        assert_eq!(shards, vec!["10.0.0.1:9001", "10.0.0.2:9001"]);
    }

    #[test]
    fn test_routes_file_replaces_config_routes() {
        let dir = std::env::temp_dir();
        let config_path = dir.join(format!("dispatcher-{}.toml", uuid::Uuid::new_v4()));
        let routes_path = dir.join(format!("routes-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(
            &config_path,
            r#"
[[shards]]
address = "127.0.0.1:9001"

[[routes]]
name = "from-toml"
pattern = "/toml"
kind = "content-field"
sharder = { field = "id" }
"#,
        )
        .unwrap();
        std::fs::write(
            &routes_path,
            r#"[{"Name":"orders","Pattern":"/orders","Kind":"json","Sharder":{"field":"customer_id"}}]"#,
        )
        .unwrap();

        let cli = Cli::try_parse_from([
            "shard-dispatcher",
            "--config",
            config_path.to_str().unwrap(),
            "--routes",
            routes_path.to_str().unwrap(),
        ])
        .unwrap();
        let config = cli.load().unwrap();

        assert_eq!(config.shards.len(), 1);
        assert_eq!(config.routes.len(), 1);
        assert_eq!(config.routes[0].name, "orders");
        assert_eq!(config.routes[0].kind, "json");

        let _ = std::fs::remove_file(config_path);
        let _ = std::fs::remove_file(routes_path);
    }
}
