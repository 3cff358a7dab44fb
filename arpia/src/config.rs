//! Environment-driven server configuration.

use std::net::{AddrParseError, IpAddr, SocketAddr};

/// Bind configuration read from `ARPIA_HOST` / `ARPIA_PORT`, with a
/// `.env` file honored when present.
#[derive(Debug, Clone)]
pub struct ArpiaConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ArpiaConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

impl ArpiaConfig {
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();
        let host = std::env::var("ARPIA_HOST").unwrap_or(defaults.host);
        let port = std::env::var("ARPIA_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(defaults.port);
        Self { host, port }
    }

    pub fn addr(&self) -> Result<SocketAddr, AddrParseError> {
        let ip: IpAddr = self.host.parse()?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    #[test]
    #[serial]
    fn test_defaults_when_env_unset() {
        unsafe {
            std::env::remove_var("ARPIA_HOST");
            std::env::remove_var("ARPIA_PORT");
        }
        let config = ArpiaConfig::from_env();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8000);
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        unsafe {
            std::env::set_var("ARPIA_HOST", "0.0.0.0");
            std::env::set_var("ARPIA_PORT", "9090");
        }
        let config = ArpiaConfig::from_env();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9090);
        unsafe {
            std::env::remove_var("ARPIA_HOST");
            std::env::remove_var("ARPIA_PORT");
        }
    }

    #[test]
    fn test_addr_parses() {
        let config = ArpiaConfig {
            host: "0.0.0.0".to_string(),
            port: 3000,
        };
        assert_eq!(config.addr().unwrap().to_string(), "0.0.0.0:3000");
    }
}
