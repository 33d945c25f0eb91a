use std::net::SocketAddr;
use std::path::PathBuf;

use crate::error::{InventoryError, Result};

// Constants
pub const DEFAULT_DATA_DIR: &str = "database";
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Runtime configuration of the inventory server
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Directory holding one JSON file per storage key
    pub data_dir: PathBuf,
    pub bind_addr: SocketAddr,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
        }
    }
}

impl Config {
    /// Whether the server only accepts connections from this machine
    ///
    /// The login session is one shared marker, so anyone who can reach the
    /// server shares it.
    pub fn is_loopback(&self) -> bool {
        self.bind_addr.ip().is_loopback()
    }

    /// Build a configuration from positional arguments
    ///
    /// Usage: `inventory [DATA_DIR] [BIND_ADDR]`. The program name must
    /// already be stripped. Missing arguments keep their defaults.
    ///
    /// # Examples
    /// ```
    /// use inventory::config::Config;
    ///
    /// let config = Config::from_args(["stock".to_string()]).unwrap();
    /// assert_eq!(config.data_dir.to_str(), Some("stock"));
    /// assert_eq!(config.bind_addr.port(), 3000);
    /// ```
    pub fn from_args<I>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut config = Config::default();
        let mut args = args.into_iter();

        if let Some(dir) = args.next() {
            if dir.is_empty() {
                return Err(InventoryError::Config("data directory is empty".to_string()));
            }
            config.data_dir = PathBuf::from(dir);
        }

        if let Some(addr) = args.next() {
            config.bind_addr = addr
                .parse()
                .map_err(|e| InventoryError::Config(format!("bad bind address {}: {}", addr, e)))?;
        }

        if let Some(extra) = args.next() {
            return Err(InventoryError::Config(format!("unexpected argument {}", extra)));
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_constants() {
        let config = Config::from_args(Vec::new()).unwrap();
        assert_eq!(config.data_dir, PathBuf::from(DEFAULT_DATA_DIR));
        assert_eq!(config.bind_addr.to_string(), DEFAULT_BIND_ADDR);
    }

    #[test]
    fn bad_address_is_rejected() {
        let args = vec!["db".to_string(), "localhost".to_string()];
        assert!(matches!(Config::from_args(args), Err(InventoryError::Config(_))));

        let args = vec!["db".to_string(), "0.0.0.0:8080".to_string()];
        assert_eq!(Config::from_args(args).unwrap().bind_addr.port(), 8080);
    }

    #[test]
    fn only_loopback_addresses_are_private() {
        assert!(Config::default().is_loopback());

        let args = ["db", "[::1]:3000"].map(String::from);
        assert!(Config::from_args(args).unwrap().is_loopback());

        let args = ["db", "0.0.0.0:3000"].map(String::from);
        assert!(!Config::from_args(args).unwrap().is_loopback());
    }

    #[test]
    fn extra_arguments_are_rejected() {
        let args = ["a", "127.0.0.1:1", "b"].map(String::from);
        assert!(Config::from_args(args).is_err());
    }
}
