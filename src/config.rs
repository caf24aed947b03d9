use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Optional file layer, read from ~/.sessionview/config.toml unless a path is given.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    pub dashboard: Option<DashboardConfig>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct DashboardConfig {
    pub url: Option<String>,
    pub username: Option<String>,
    pub token: Option<String>,
    pub company_id: Option<String>,
}

impl Config {
    /// Load the config file. A missing default file yields an empty config;
    /// a missing explicit file is an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let config_path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let path = Self::config_path()?;
                if !path.exists() {
                    return Ok(Config::default());
                }
                path
            }
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config from {}", config_path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", config_path.display()))?;

        log::debug!("Loaded config from {}", config_path.display());
        Ok(config)
    }

    fn config_path() -> Result<PathBuf> {
        let home = std::env::var("USERPROFILE")
            .or_else(|_| std::env::var("HOME"))
            .context("Neither USERPROFILE nor HOME environment variable is set")?;

        Ok(PathBuf::from(home).join(".sessionview").join("config.toml"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Orientation {
    Landscape,
    Portrait,
}

impl Orientation {
    /// Wider than tall is landscape; square counts as portrait.
    pub fn from_dimensions(width: u32, height: u32) -> Self {
        if width > height {
            Orientation::Landscape
        } else {
            Orientation::Portrait
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Orientation::Landscape => "landscape",
            Orientation::Portrait => "portrait",
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Command-line flags, merged over the config file.
#[derive(Debug, Clone, Args)]
pub struct SessionArgs {
    /// Base URL of the web dashboard
    #[arg(long)]
    pub web_dashboard_url: Option<String>,

    /// Dashboard API username
    #[arg(long)]
    pub api_username: Option<String>,

    /// Dashboard API token
    #[arg(long)]
    pub api_token: Option<String>,

    /// Company the session belongs to
    #[arg(long)]
    pub company_id: Option<String>,

    /// Session to fetch and display
    #[arg(long)]
    pub session_id: Option<String>,

    /// Report orientation used when the session has no screenshots
    #[arg(long, value_enum, default_value_t = Orientation::Landscape)]
    pub orientation: Orientation,

    /// Port for the local log server
    #[arg(long, default_value_t = 3333)]
    pub port: u16,

    /// Directory sessions are extracted into
    #[arg(long, default_value = "sessions")]
    pub sessions_dir: PathBuf,

    /// Where to write the HTML report
    #[arg(long, default_value = "output.html")]
    pub output: PathBuf,

    /// Config file to use instead of ~/.sessionview/config.toml
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be specified")]
    Missing(&'static str),

    #[error("Session ID {0:?} is not a valid directory name")]
    InvalidSessionId(String),
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub dashboard_url: String,
    pub api_username: String,
    pub api_token: String,
    pub company_id: String,
    pub session_id: String,
    pub orientation: Orientation,
    pub port: u16,
    pub sessions_dir: PathBuf,
    pub output: PathBuf,
}

impl Settings {
    pub fn resolve(args: SessionArgs, config: Config) -> Result<Self, ConfigError> {
        let file = config.dashboard.unwrap_or_default();

        let dashboard_url = required("Web Dashboard URL", args.web_dashboard_url, file.url)?;
        let api_username = required("API username", args.api_username, file.username)?;
        let api_token = required("API token", args.api_token, file.token)?;
        let company_id = required("Company ID", args.company_id, file.company_id)?;
        let session_id = required("Session ID", args.session_id, None)?;

        if !is_single_component(&session_id) {
            return Err(ConfigError::InvalidSessionId(session_id));
        }

        Ok(Settings {
            dashboard_url,
            api_username,
            api_token,
            company_id,
            session_id,
            orientation: args.orientation,
            port: args.port,
            sessions_dir: args.sessions_dir,
            output: args.output,
        })
    }

    /// Extraction root for this session: `{sessions_dir}/{session_id}`.
    pub fn session_dir(&self) -> PathBuf {
        self.sessions_dir.join(&self.session_id)
    }
}

fn required(
    field: &'static str,
    flag: Option<String>,
    file: Option<String>,
) -> Result<String, ConfigError> {
    flag.or(file)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or(ConfigError::Missing(field))
}

fn is_single_component(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(|c| c == '/' || c == '\\')
}
