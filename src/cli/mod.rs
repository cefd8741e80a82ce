//! CLI module for keygate
//!
//! - `serve`: HTTP server (default deployment)
//! - `migrate`: apply PostgreSQL migrations
//! - `hash`: print the digest of a root key for `auth.root_keys`

pub mod migrate;
pub mod serve;

use clap::{Parser, Subcommand};

use crate::infrastructure::key::digest;

/// Keygate - API key verification and rate limiting
#[derive(Parser)]
#[command(name = "keygate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the HTTP server
    Serve,

    /// Apply database migrations
    Migrate,

    /// Print the digest to configure for a root key
    Hash {
        /// Plaintext root key
        secret: String,
    },
}

/// Digest line printed by `keygate hash`
pub fn hash(secret: &str) -> String {
    digest(secret)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hash_command() {
        let cli = Cli::try_parse_from(["keygate", "hash", "hello"]).unwrap();

        match cli.command {
            Command::Hash { secret } => {
                assert_eq!(hash(&secret), "LPJNul+wow4m6DsqxbninhsWHlwfp0JecwQzYpOLmCQ=");
            }
            _ => panic!("expected hash command"),
        }
    }

    #[test]
    fn test_parse_serve_and_migrate() {
        assert!(matches!(
            Cli::try_parse_from(["keygate", "serve"]).unwrap().command,
            Command::Serve
        ));
        assert!(matches!(
            Cli::try_parse_from(["keygate", "migrate"]).unwrap().command,
            Command::Migrate
        ));
    }
}
