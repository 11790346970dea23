use std::net::SocketAddr;
use std::path::PathBuf;

use tracing::warn;

const DEV_SECRET: &str = "dev-secret-change-me";

/// Server settings, read from `LARDER_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub image_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let jwt_secret = var_or("LARDER_JWT_SECRET", DEV_SECRET);
        if jwt_secret == DEV_SECRET {
            warn!("LARDER_JWT_SECRET not set, using the development secret");
        }

        let port = var_or("LARDER_PORT", "3000")
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid LARDER_PORT: {}", e))?;

        Ok(Self {
            jwt_secret,
            db_path: PathBuf::from(var_or("LARDER_DB_PATH", "larder.db")),
            host: var_or("LARDER_HOST", "0.0.0.0"),
            port,
            image_dir: PathBuf::from(var_or("LARDER_IMAGE_DIR", "./images")),
        })
    }

    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

fn var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addr_joins_host_and_port() {
        let config = Config {
            jwt_secret: "s".into(),
            db_path: PathBuf::from("larder.db"),
            host: "127.0.0.1".into(),
            port: 8080,
            image_dir: PathBuf::from("./images"),
        };
        assert_eq!(config.addr().unwrap().to_string(), "127.0.0.1:8080");
    }

    #[test]
    fn bad_host_is_an_error() {
        let config = Config {
            jwt_secret: "s".into(),
            db_path: PathBuf::from("larder.db"),
            host: "not a host".into(),
            port: 8080,
            image_dir: PathBuf::from("./images"),
        };
        assert!(config.addr().is_err());
    }
}
