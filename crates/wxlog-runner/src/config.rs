//! Database settings from environment variables

use anyhow::{Context, Result};
use std::env;
use wxlog_db::{DbClient, DbConnectionBuilder};

/// Where the PostgreSQL database lives
#[derive(Debug, Clone)]
pub enum DatabaseTarget {
    /// Full connection string from DATABASE_URL
    Url(String),
    /// Individual DATABASE_* settings; TLS is always required
    Parts {
        host: String,
        port: u16,
        name: String,
        user: String,
        password: Option<String>,
    },
}

impl DatabaseTarget {
    /// Load from DATABASE_URL, else DATABASE_HOST/PORT/NAME/USER/PASSWORD
    pub fn from_env() -> Result<Self> {
        if let Ok(url) = env::var("DATABASE_URL") {
            return Ok(DatabaseTarget::Url(url));
        }

        let host = env::var("DATABASE_HOST")
            .context("neither DATABASE_URL nor DATABASE_HOST environment variable set")?;
        let port = env::var("DATABASE_PORT")
            .unwrap_or_else(|_| "5432".to_string())
            .parse()
            .context("Invalid DATABASE_PORT")?;
        let name = env::var("DATABASE_NAME").context("DATABASE_NAME environment variable not set")?;
        let user = env::var("DATABASE_USER").context("DATABASE_USER environment variable not set")?;
        let password = env::var("DATABASE_PASSWORD").ok();

        Ok(DatabaseTarget::Parts {
            host,
            port,
            name,
            user,
            password,
        })
    }

    pub async fn connect(&self) -> Result<DbClient> {
        let client = match self {
            DatabaseTarget::Url(url) => DbClient::new(url).await,
            DatabaseTarget::Parts {
                host,
                port,
                name,
                user,
                password,
            } => {
                let mut builder = DbConnectionBuilder::new(name.as_str())
                    .host(host.as_str())
                    .port(*port)
                    .username(user.as_str());
                if let Some(password) = password {
                    builder = builder.password(password.as_str());
                }
                DbClient::with_options(builder.build()).await
            }
        };
        client.context("Failed to connect to database")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_env() {
        // One test touches these variables so parallel tests cannot race.
        env::set_var("DATABASE_URL", "postgres://localhost/weather");
        let target = DatabaseTarget::from_env().unwrap();
        assert!(matches!(target, DatabaseTarget::Url(ref u) if u == "postgres://localhost/weather"));
        env::remove_var("DATABASE_URL");

        env::set_var("DATABASE_HOST", "db.example.com");
        env::set_var("DATABASE_NAME", "weather");
        env::set_var("DATABASE_USER", "logger");
        let target = DatabaseTarget::from_env().unwrap();
        match target {
            DatabaseTarget::Parts {
                host, port, name, ..
            } => {
                assert_eq!(host, "db.example.com");
                assert_eq!(port, 5432);
                assert_eq!(name, "weather");
            }
            other => panic!("expected parts, got {:?}", other),
        }

        env::set_var("DATABASE_PORT", "not-a-port");
        assert!(DatabaseTarget::from_env().is_err());

        for var in ["DATABASE_HOST", "DATABASE_NAME", "DATABASE_USER", "DATABASE_PORT"] {
            env::remove_var(var);
        }
    }
}
