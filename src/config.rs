use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Tradewire realtime messaging server
#[derive(Parser, Serialize, Deserialize, Clone, Debug)]
#[command(
    name = "tradewire-server",
    version,
    about = "Tradewire realtime messaging server"
)]
pub struct Config {
    /// Port to listen on
    #[arg(long, env = "TRADEWIRE_PORT", default_value = "4100")]
    pub port: u16,

    /// Bind address
    #[arg(long, env = "TRADEWIRE_BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: String,

    /// Path to TOML config file
    #[arg(long, default_value = "./tradewire.toml")]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long, env = "TRADEWIRE_JSON_LOGS")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    pub generate_config: bool,

    /// Data directory for persistent state (SQLite database)
    #[arg(long, env = "TRADEWIRE_DATA_DIR", default_value = "./data")]
    pub data_dir: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 4100,
            bind_address: "0.0.0.0".to_string(),
            config: "./tradewire.toml".to_string(),
            json_logs: false,
            generate_config: false,
            data_dir: "./data".to_string(),
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (TRADEWIRE_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        let cli = Config::parse();
        let config_path = cli.config.clone();

        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed("TRADEWIRE_"))
            .merge(Serialized::defaults(cli))
            .extract()
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Tradewire Realtime Messaging Server Configuration
# Place this file at ./tradewire.toml or specify with --config <path>
# All settings can be overridden via environment variables (TRADEWIRE_PORT, etc.)
# or CLI flags (--port, etc.)

# Server port (default: 4100)
# port = 4100

# Bind address (default: 0.0.0.0 — all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# Data directory for the SQLite database
# data_dir = "./data"
"#
    .to_string()
}
