use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Self-hosted manga and comic library server for CBZ archives.
#[derive(Parser, Debug, Clone)]
#[command(name = "tankobon")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file.
    #[arg(short, long, env = "TANKOBON_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Start the server (default if no command given).
    Serve {
        /// Address to bind the server to.
        #[arg(short, long)]
        bind: Option<SocketAddr>,
    },

    /// Initialize database and create default config.
    Init {
        /// Force overwrite existing config.
        #[arg(short, long)]
        force: bool,
    },
}

/// Main configuration from TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Authentication configuration.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to.
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,

    /// Library title.
    #[serde(default = "default_title")]
    pub title: String,

    /// Set the Secure flag on session cookies (enable behind HTTPS).
    #[serde(default)]
    pub secure_cookies: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            title: default_title(),
            secure_cookies: false,
        }
    }
}

fn default_bind() -> SocketAddr {
    SocketAddr::new(
        std::net::IpAddr::V4(std::net::Ipv4Addr::new(0, 0, 0, 0)),
        8080,
    )
}

fn default_title() -> String {
    "Tankobon".to_string()
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/tankobon.db")
}

/// Authentication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Session token duration in days.
    #[serde(default = "default_session_days")]
    pub session_days: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_days: default_session_days(),
        }
    }
}

fn default_session_days() -> u32 {
    7
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for generated cover thumbnails.
    #[serde(default = "default_thumbnails_dir")]
    pub thumbnails_dir: PathBuf,

    /// Directory for uploaded profile images, served statically.
    #[serde(default = "default_public_dir")]
    pub public_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            thumbnails_dir: default_thumbnails_dir(),
            public_dir: default_public_dir(),
        }
    }
}

fn default_thumbnails_dir() -> PathBuf {
    PathBuf::from("data/thumbnails")
}

fn default_public_dir() -> PathBuf {
    PathBuf::from("public")
}

impl StorageConfig {
    /// Directory for uploaded avatars.
    pub fn avatars_dir(&self) -> PathBuf {
        self.public_dir.join("avatars")
    }

    /// Directory for uploaded profile headers.
    pub fn headers_dir(&self) -> PathBuf {
        self.public_dir.join("headers")
    }
}

impl Config {
    /// Load configuration from file.
    pub fn load(path: &PathBuf) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::error::AppError::Config(format!("Failed to read config file: {}", e))
        })?;

        toml::from_str(&content).map_err(|e| {
            crate::error::AppError::Config(format!("Failed to parse config file: {}", e))
        })
    }

    /// Find config file in default locations.
    pub fn find_config_file() -> Option<PathBuf> {
        let candidates = [
            PathBuf::from("config.toml"),
            PathBuf::from("tankobon.toml"),
            dirs::config_dir()
                .map(|p| p.join("tankobon").join("config.toml"))
                .unwrap_or_default(),
            PathBuf::from("/etc/tankobon/config.toml"),
        ];

        candidates.into_iter().find(|p| p.exists())
    }

    /// Generate default config file content.
    pub fn generate_default() -> String {
        r#"# tankobon configuration

[server]
bind = "0.0.0.0:8080"
title = "Tankobon"
# Set to true when serving behind HTTPS
secure_cookies = false

[database]
# path = "/var/lib/tankobon/tankobon.db"

[auth]
# Session duration in days
session_days = 7

[storage]
# thumbnails_dir = "/var/lib/tankobon/thumbnails"
# public_dir = "/var/lib/tankobon/public"
"#
        .to_string()
    }
}
