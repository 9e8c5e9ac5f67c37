//! Facilitator server configuration.
//!
//! Loads configuration from a TOML file with support for environment
//! variable expansion in string values. Variables use `$VAR` or `${VAR}`
//! syntax.
//!
//! # Example Configuration
//!
//! ```toml
//! host = "0.0.0.0"
//! port = 4021
//!
//! [chains."eip155:8453"]
//! rpc_url = "https://mainnet.base.org"
//! signer_private_key = "$SIGNER_KEY_BASE"
//!
//! [chains."solana:5eykt4UsFv8P8NJdTREpY1vzqKqZKvdpKuc9bQDLXDTH"]
//! rpc_url = "https://api.mainnet-beta.solana.com"
//! signer_private_key = "$SIGNER_KEY_SOLANA"
//! ```
//!
//! # Environment Variables
//!
//! - `CONFIG` — path to the configuration file (default: `config.toml`)
//! - `HOST` — overrides the server bind address
//! - `PORT` — overrides the server port
//! - chain-specific signer keys referenced by `$VAR` in the config file

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Top-level facilitator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacilitatorConfig {
    /// Server bind address (default: `0.0.0.0`).
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Server port (default: `4021`).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Chain configurations keyed by CAIP-2 network identifier
    /// (`"eip155:8453"`, `"solana:<genesis-hash>"`, ...).
    #[serde(default)]
    pub chains: HashMap<String, ChainConfig>,
}

/// Per-chain configuration: an RPC endpoint and the facilitator's own
/// signing key on that chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// HTTP RPC endpoint URL.
    pub rpc_url: String,

    /// Facilitator signer key: hex (EVM, with or without `0x`) or base58
    /// (Solana). Supports `$VAR` / `${VAR}` environment variable expansion.
    pub signer_private_key: String,
}

fn default_host() -> IpAddr {
    IpAddr::V4(std::net::Ipv4Addr::new(0, 0, 0, 0))
}

const fn default_port() -> u16 {
    4021
}

impl FacilitatorConfig {
    /// Loads configuration from the path given by the `CONFIG` environment
    /// variable, falling back to `config.toml` in the current directory.
    ///
    /// After loading, all string values with `$VAR` / `${VAR}` references
    /// are expanded from the process environment. `HOST` and `PORT` env
    /// vars override the file values.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let path = std::env::var("CONFIG").unwrap_or_else(|_| "config.toml".to_owned());
        Self::load_from(&path)
    }

    /// Loads configuration from a specific file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let content = if Path::new(path).exists() {
            std::fs::read_to_string(path)?
        } else {
            String::new()
        };

        let expanded = expand_env_vars(&content);
        let mut config: Self = toml::from_str(&expanded)?;

        if let Ok(host) = std::env::var("HOST") {
            if let Ok(addr) = host.parse() {
                config.host = addr;
            }
        }
        if let Ok(port) = std::env::var("PORT") {
            if let Ok(p) = port.parse() {
                config.port = p;
            }
        }

        Ok(config)
    }
}

/// Expands `$VAR` and `${VAR}` patterns in a string from environment
/// variables. Unresolved variables are left as-is.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' {
            let braced = chars.peek() == Some(&'{');
            if braced {
                chars.next();
            }

            let mut var_name = String::new();
            while let Some(&c) = chars.peek() {
                if braced {
                    if c == '}' {
                        chars.next();
                        break;
                    }
                } else if !c.is_ascii_alphanumeric() && c != '_' {
                    break;
                }
                var_name.push(c);
                chars.next();
            }

            if var_name.is_empty() {
                result.push('$');
                if braced {
                    result.push('{');
                }
            } else if let Ok(val) = std::env::var(&var_name) {
                result.push_str(&val);
            } else {
                result.push('$');
                if braced {
                    result.push('{');
                }
                result.push_str(&var_name);
                if braced {
                    result.push('}');
                }
            }
        } else {
            result.push(ch);
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env_vars_braced_and_bare() {
        // SAFETY: tests run single-threaded within this module's harness;
        // no other test observes these vars.
        unsafe {
            std::env::set_var("X402_TEST_VAR", "resolved");
        }
        assert_eq!(expand_env_vars("prefix-${X402_TEST_VAR}-suffix"), "prefix-resolved-suffix");
        assert_eq!(expand_env_vars("$X402_TEST_VAR"), "resolved");
        unsafe {
            std::env::remove_var("X402_TEST_VAR");
        }
    }

    #[test]
    fn test_expand_env_vars_leaves_unresolved_as_is() {
        assert_eq!(expand_env_vars("$DOES_NOT_EXIST_XYZ"), "$DOES_NOT_EXIST_XYZ");
        assert_eq!(expand_env_vars("${ALSO_MISSING_XYZ}"), "${ALSO_MISSING_XYZ}");
    }

    #[test]
    fn test_load_from_missing_file_uses_defaults() {
        let config = FacilitatorConfig::load_from("/nonexistent/x402-facilitator-config.toml").unwrap();
        assert_eq!(config.port, 4021);
        assert!(config.chains.is_empty());
    }

    #[test]
    fn test_load_from_parses_chains() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("x402-facilitator-test-{}.toml", std::process::id()));
        std::fs::write(
            &path,
            r#"
            host = "127.0.0.1"
            port = 9000

            [chains."eip155:84532"]
            rpc_url = "https://sepolia.base.org"
            signer_private_key = "0xabc123"
            "#,
        )
        .unwrap();

        let config = FacilitatorConfig::load_from(path.to_str().unwrap()).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.port, 9000);
        assert_eq!(config.chains.len(), 1);
        assert_eq!(config.chains["eip155:84532"].rpc_url, "https://sepolia.base.org");
    }
}
