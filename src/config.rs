use std::env;
use std::time::Duration;
use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database: DatabaseConfig,
    pub environment: Environment,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_size: usize,
    pub connection_timeout: Duration,
    pub echo: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Local,
    Production,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists (for local development)
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    /// `from_env` passes the process environment; tests pass a map.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = lookup("PORT")
            .unwrap_or_else(|| "8080".to_string())
            .parse::<u16>()
            .context("PORT must be a valid port number")?;

        let environment = match lookup("ENV").unwrap_or_else(|| "local".to_string()).as_str() {
            "production" | "prod" => Environment::Production,
            _ => Environment::Local,
        };

        let database = DatabaseConfig::from_lookup(&lookup, &environment)?;

        // Validate configuration values
        Self::validate_config(&database, port)?;

        Ok(Config {
            port,
            database,
            environment,
        })
    }

    fn validate_config(database: &DatabaseConfig, port: u16) -> Result<()> {
        if port == 0 {
            anyhow::bail!("PORT must be greater than 0");
        }

        database.validate()?;

        Ok(())
    }
}

impl DatabaseConfig {
    /// Default pool size; the pool never grows past it.
    pub const DEFAULT_POOL_SIZE: usize = 20;

    pub fn from_lookup<F>(lookup: F, environment: &Environment) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup("DB_URL")
            .filter(|url| !url.trim().is_empty())
            .context("DB_URL environment variable is required")?;

        let pool_size = match lookup("DB_POOL_SIZE") {
            Some(value) => value
                .parse::<usize>()
                .context("DB_POOL_SIZE must be a valid number")?,
            None => Self::DEFAULT_POOL_SIZE,
        };

        let connection_timeout_secs = lookup("DB_CONNECTION_TIMEOUT")
            .unwrap_or_else(|| "30".to_string())
            .parse::<u64>()
            .context("DB_CONNECTION_TIMEOUT must be a valid number of seconds")?;

        // Statement echo is on for local development unless turned off
        let echo = match lookup("DB_ECHO") {
            Some(value) => parse_flag(&value).context("DB_ECHO must be true or false")?,
            None => environment.is_local(),
        };

        Ok(DatabaseConfig {
            url: url.trim().to_string(),
            pool_size,
            connection_timeout: Duration::from_secs(connection_timeout_secs),
            echo,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if !self.url.starts_with("postgresql://") && !self.url.starts_with("postgres://") {
            anyhow::bail!("DB_URL must start with 'postgresql://' or 'postgres://'");
        }

        let pg_config = self.pg_config()?;

        if pg_config.get_hosts().is_empty() {
            anyhow::bail!("DB_URL must name a database host");
        }

        if self.pool_size == 0 {
            anyhow::bail!("DB_POOL_SIZE must be greater than 0");
        }

        if self.connection_timeout.as_secs() == 0 {
            anyhow::bail!("DB_CONNECTION_TIMEOUT must be greater than 0");
        }

        Ok(())
    }

    /// Parse the connection string into a driver configuration.
    pub fn pg_config(&self) -> Result<tokio_postgres::Config> {
        self.url
            .parse::<tokio_postgres::Config>()
            .context("DB_URL is not a valid PostgreSQL connection string")
    }
}

impl Environment {
    pub fn is_local(&self) -> bool {
        matches!(self, Environment::Local)
    }
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("unrecognised flag value '{}'", other),
    }
}
