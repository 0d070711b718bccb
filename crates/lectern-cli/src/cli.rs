use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// CLI surface definition: operational commands around the encrypted
/// document store. The HTTP application links the library crates directly.
#[derive(Parser, Debug)]
#[command(
    name = "lectern",
    about = "Encrypted document store tooling for the Lectern backend",
    version,
    propagate_version = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run a write/read probe against the encrypted store.
    Health,
    /// Generate an encryption key and print it hex-encoded.
    Keygen,
    /// Re-encrypt legacy plaintext .json files under a data directory.
    Migrate {
        /// Directory holding the collection files.
        dir: PathBuf,
    },
    /// Report whether a file is plaintext or an envelope and print the
    /// decrypted document.
    Inspect {
        /// Collection file to examine.
        file: PathBuf,
    },
    /// Manage CLI configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version and exit.
    Version,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Create a default config file if one does not exist.
    Init,
}
