//! Command-line argument parsing

use crate::config::ClientConfig;
use crate::error::{RegistryError, Result};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "registry-client")]
#[command(about = "Talk to Docker/OCI registries over the v2 HTTP API")]
#[command(version, author)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Registry username
    #[arg(
        long = "username",
        short = 'u',
        global = true,
        env = "REGISTRY_USERNAME",
        help = "Username for registry authentication"
    )]
    pub username: Option<String>,

    /// Registry password
    #[arg(
        long = "password",
        short = 'p',
        global = true,
        env = "REGISTRY_PASSWORD",
        hide_env_values = true,
        help = "Password for registry authentication"
    )]
    pub password: Option<String>,

    /// Skip TLS verification
    #[arg(
        long = "insecure",
        short = 'k',
        global = true,
        help = "Skip TLS certificate verification"
    )]
    pub insecure: bool,

    /// Timeout in seconds for network operations
    #[arg(
        long = "timeout",
        short = 't',
        global = true,
        help = "Timeout for network operations in seconds"
    )]
    pub timeout: Option<u64>,

    /// Verbose output
    #[arg(long = "verbose", short = 'v', global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Quiet mode
    #[arg(long = "quiet", short = 'q', global = true, help = "Only print results and errors")]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Check that a registry speaks the v2 API
    Ping {
        /// Any repository on the registry, e.g. `localhost:5000/foo`
        repo: String,
    },
    /// List the tags of a repository
    Tags { repo: String },
    /// Fetch a manifest and print it
    Manifest {
        /// Image reference, e.g. `busybox:latest` or `repo@sha256:...`
        image: String,

        #[arg(long = "lists", help = "Accept manifest lists")]
        lists: bool,

        #[arg(long = "oci", help = "Accept OCI manifests")]
        oci: bool,
    },
    /// Download a blob, verifying its digest
    Blob {
        repo: String,
        digest: String,

        #[arg(long = "output", short = 'o', help = "Write the blob to this file instead of stdout")]
        output: Option<String>,
    },
    /// Print the digest of a manifest file
    Digest { file: String },
}

impl Args {
    pub fn parse_args() -> Self {
        Args::parse()
    }

    /// Validate arguments
    pub fn validate(&self) -> Result<()> {
        if self.verbose && self.quiet {
            return Err(RegistryError::Validation(
                "--verbose and --quiet cannot be used together".to_string(),
            ));
        }
        self.client_config().validate()
    }

    pub fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::from_env().with_insecure(self.insecure);
        if let Some(username) = &self.username {
            config.username = Some(username.clone());
        }
        if let Some(password) = &self.password {
            config.password = Some(password.clone());
        }
        if let Some(timeout) = self.timeout {
            config = config.with_timeout(timeout);
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_manifest_command() {
        let args = Args::try_parse_from(["registry-client", "manifest", "busybox:latest", "--lists", "-k"]).unwrap();
        assert!(args.insecure);
        match args.command {
            Command::Manifest { image, lists, oci } => {
                assert_eq!(image, "busybox:latest");
                assert!(lists);
                assert!(!oci);
            }
            _ => panic!("expected manifest command"),
        }
    }

    #[test]
    fn test_verbose_and_quiet_conflict() {
        let args = Args::try_parse_from(["registry-client", "tags", "busybox", "-v", "-q"]).unwrap();
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_client_config_from_flags() {
        let args = Args::try_parse_from([
            "registry-client",
            "ping",
            "localhost:5000/foo",
            "-u",
            "alice",
            "-p",
            "secret",
            "-t",
            "30",
        ])
        .unwrap();
        let config = args.client_config();
        assert_eq!(config.username.as_deref(), Some("alice"));
        assert_eq!(config.password.as_deref(), Some("secret"));
        assert_eq!(config.timeout, Some(30));
    }
}
