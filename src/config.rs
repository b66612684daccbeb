use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reqwest::Url;
use std::path::PathBuf;

/// Quizzard Gateway - authenticated client for the Quizzard API
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Base URL of the Quizzard API
    #[arg(
        short = 'u',
        long,
        env = "QUIZZARD_API_URL",
        default_value = "http://localhost:5000"
    )]
    pub base_url: String,

    /// Path to the session SQLite database
    #[arg(short = 's', long, env = "QUIZZARD_SESSION_DB")]
    pub session_db: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// HTTP request timeout in seconds
    #[arg(long, env = "HTTP_REQUEST_TIMEOUT", default_value = "30")]
    pub http_timeout: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Log in and store the session credential
    Login {
        #[arg(short, long)]
        email: String,
        /// Prompted for when omitted
        #[arg(short, long)]
        password: Option<String>,
    },
    /// Create an account
    Register {
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: Option<String>,
    },
    /// End the session and forget the stored credential
    Logout,
    /// Show whether a credential is stored
    Status,
    /// Send an authenticated request and print the JSON response
    Request {
        /// HTTP method
        #[arg(short = 'X', long, default_value = "GET")]
        method: String,
        /// Path relative to the base URL, e.g. /api/groups
        path: String,
        /// JSON request body
        #[arg(short, long)]
        data: Option<String>,
    },
}

/// Paths of the backend's authentication endpoints
#[derive(Clone, Debug, PartialEq)]
pub struct AuthEndpoints {
    pub login: String,
    pub register: String,
    pub refresh: String,
    pub logout: String,
}

impl Default for AuthEndpoints {
    fn default() -> Self {
        Self {
            login: "/api/auth/login".to_string(),
            register: "/api/auth/register".to_string(),
            refresh: "/api/auth/refresh-token".to_string(),
            logout: "/api/auth/logout".to_string(),
        }
    }
}

impl AuthEndpoints {
    /// Requests to these paths fail on their own terms and never trigger a refresh
    pub fn is_excluded(&self, path: &str) -> bool {
        let path = path.trim_end_matches('/');
        [&self.login, &self.register, &self.refresh]
            .iter()
            .any(|endpoint| {
                let endpoint = endpoint.trim_end_matches('/');
                !endpoint.is_empty() && path.ends_with(endpoint)
            })
    }

    fn all(&self) -> [(&'static str, &str); 4] {
        [
            ("AUTH_LOGIN_PATH", self.login.as_str()),
            ("AUTH_REGISTER_PATH", self.register.as_str()),
            ("AUTH_REFRESH_PATH", self.refresh.as_str()),
            ("AUTH_LOGOUT_PATH", self.logout.as_str()),
        ]
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    // Backend
    pub base_url: String,
    pub endpoints: AuthEndpoints,

    // Session persistence
    pub session_db: PathBuf,
    pub token_key: String,

    // HTTP client
    pub http_max_connections: usize,
    pub http_connect_timeout: u64,
    pub http_request_timeout: u64,

    // Logging
    pub log_level: String,
    pub log_format: LogFormat,
}

#[derive(Clone, Debug, PartialEq)]
pub enum LogFormat {
    Text,
    Json,
}

impl Config {
    /// Load configuration from all sources with priority: CLI > ENV > defaults
    pub fn load() -> Result<(Self, Command)> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let args = CliArgs::parse();
        let config = Self::from_args(&args)?;

        Ok((config, args.command))
    }

    /// Build configuration from parsed arguments plus env-only settings
    pub fn from_args(args: &CliArgs) -> Result<Self> {
        let session_db = match args.session_db {
            Some(ref path) => expand_tilde(path),
            None => default_session_db().context(
                "Could not determine a data directory (use -s or set QUIZZARD_SESSION_DB)",
            )?,
        };

        let defaults = AuthEndpoints::default();

        Ok(Config {
            base_url: args.base_url.clone(),

            endpoints: AuthEndpoints {
                login: std::env::var("AUTH_LOGIN_PATH").unwrap_or(defaults.login),
                register: std::env::var("AUTH_REGISTER_PATH").unwrap_or(defaults.register),
                refresh: std::env::var("AUTH_REFRESH_PATH").unwrap_or(defaults.refresh),
                logout: std::env::var("AUTH_LOGOUT_PATH").unwrap_or(defaults.logout),
            },

            session_db,

            token_key: std::env::var("QUIZZARD_TOKEN_KEY")
                .unwrap_or_else(|_| crate::auth::TOKEN_FIELD.to_string()),

            http_max_connections: std::env::var("HTTP_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(20),

            http_connect_timeout: std::env::var("HTTP_CONNECT_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),

            http_request_timeout: args.http_timeout,

            log_level: args.log_level.clone(),
            log_format: parse_log_format(&args.log_format),
        })
    }

    /// Configuration pointing at `base_url` with defaults everywhere else
    pub fn with_base_url(base_url: impl Into<String>, session_db: PathBuf) -> Self {
        Config {
            base_url: base_url.into(),
            endpoints: AuthEndpoints::default(),
            session_db,
            token_key: crate::auth::TOKEN_FIELD.to_string(),
            http_max_connections: 20,
            http_connect_timeout: 10,
            http_request_timeout: 30,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let url = self.parsed_base_url()?;
        if url.scheme() != "http" && url.scheme() != "https" {
            anyhow::bail!(
                "QUIZZARD_API_URL must be an http(s) URL, got: {}",
                self.base_url
            );
        }

        for (name, path) in self.endpoints.all() {
            if !path.starts_with('/') {
                anyhow::bail!("{} must start with '/': {}", name, path);
            }
        }

        if self.http_request_timeout == 0 {
            anyhow::bail!("HTTP_REQUEST_TIMEOUT must be greater than zero");
        }
        if self.http_connect_timeout == 0 {
            anyhow::bail!("HTTP_CONNECT_TIMEOUT must be greater than zero");
        }
        if self.token_key.is_empty() {
            anyhow::bail!("QUIZZARD_TOKEN_KEY cannot be empty");
        }

        Ok(())
    }

    /// Base URL with a trailing slash so relative joins keep its path
    pub fn parsed_base_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .with_context(|| format!("Invalid QUIZZARD_API_URL: {}", self.base_url))?;
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }
}

/// Default session database location in the user's data directory
fn default_session_db() -> Option<PathBuf> {
    dirs::data_local_dir().map(|dir| dir.join("quizzard").join("session.sqlite3"))
}

/// Expand tilde (~) in file paths to user's home directory
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Parse log format from string
fn parse_log_format(s: &str) -> LogFormat {
    match s.to_lowercase().as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Text,
    }
}
