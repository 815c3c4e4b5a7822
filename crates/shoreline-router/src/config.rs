//! Process configuration (spec.md §6.3).

use clap::Parser;

/// Flags accepted by the bootstrap binary: `-h`, `-redis`, `-db`, `-port`.
#[derive(Debug, Parser)]
#[command(name = "shoreline-router", about = "Session-scoped message router")]
pub struct Cli {
    /// Redis host:port to connect to.
    #[arg(short = 'r', long = "redis", default_value = "127.0.0.1:6379")]
    pub redis: String,

    /// Redis logical database index.
    #[arg(short = 'd', long = "db", default_value_t = 0)]
    pub db: i64,

    /// TCP port to accept WebSocket connections on.
    #[arg(short = 'p', long = "port", default_value_t = 8080)]
    pub port: u16,
}

/// Plain in-process construction counterpart to [`Cli`], for tests and
/// embedders that don't go through the command line.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub redis_host: String,
    pub redis_db: i64,
    pub port: u16,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            redis_host: "127.0.0.1:6379".to_string(),
            redis_db: 0,
            port: 8080,
        }
    }
}

impl From<Cli> for RouterConfig {
    fn from(cli: Cli) -> Self {
        Self {
            redis_host: cli.redis,
            redis_db: cli.db,
            port: cli.port,
        }
    }
}
