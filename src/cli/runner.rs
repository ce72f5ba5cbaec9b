//! Runs one CLI command against a registry

use crate::cli::args::{Args, Command};
use crate::error::{RegistryError, Result};
use crate::image::manifest::digest_from_manifest_str;
use crate::image::parse_repo_and_ref;
use crate::logging::{Logger, short_digest};
use crate::registry::{GetManifestOptions, RegistryClient};
use futures_util::StreamExt;
use std::time::Instant;
use tokio::io::AsyncWriteExt;

pub struct Runner {
    args: Args,
    output: Logger,
}

impl Runner {
    pub fn new(args: Args) -> Result<Self> {
        args.validate()?;
        let output = if args.quiet {
            Logger::new_quiet()
        } else {
            Logger::new()
        };
        Ok(Self { args, output })
    }

    pub async fn run(&self) -> Result<()> {
        let start_time = Instant::now();

        match &self.args.command {
            Command::Ping { repo } => self.ping(repo).await?,
            Command::Tags { repo } => self.tags(repo).await?,
            Command::Manifest { image, lists, oci } => self.manifest(image, *lists, *oci).await?,
            Command::Blob { repo, digest, output } => self.blob(repo, digest, output.as_deref()).await?,
            Command::Digest { file } => self.digest(file).await?,
        }

        self.output.detail(&format!(
            "Completed in {}",
            self.output.format_duration(start_time.elapsed())
        ));
        Ok(())
    }

    fn client(&self, repo: &str) -> Result<RegistryClient> {
        RegistryClient::builder(repo)
            .with_config(self.args.client_config())
            .with_logger(self.output.clone())
            .build()
    }

    async fn ping(&self, repo: &str) -> Result<()> {
        let client = self.client(repo)?;
        if client.supports_v2().await? {
            println!("{} supports the v2 API", client.base_url());
            Ok(())
        } else {
            Err(RegistryError::Unsupported(format!(
                "{} does not support the v2 API",
                client.base_url()
            )))
        }
    }

    async fn tags(&self, repo: &str) -> Result<()> {
        let client = self.client(repo)?;
        let tags = client.list_tags().await?;
        println!("{}", serde_json::to_string_pretty(&tags)?);
        Ok(())
    }

    async fn manifest(&self, image: &str, lists: bool, oci: bool) -> Result<()> {
        let image_ref = parse_repo_and_ref(image, None)?;
        let client = RegistryClient::from_repository(
            image_ref.repo.clone(),
            self.args.client_config(),
            self.output.clone(),
        )?;
        let options = GetManifestOptions::new(image_ref.reference())
            .with_manifest_lists(lists)
            .with_oci_manifests(oci);

        let response = client.get_manifest(&options).await?;
        self.output.info(&format!(
            "{} {} ({})",
            image_ref,
            response.manifest.media_type(),
            response.digest
        ));
        println!("{}", String::from_utf8_lossy(&response.raw));
        Ok(())
    }

    async fn blob(&self, repo: &str, digest: &str, path: Option<&str>) -> Result<()> {
        let client = self.client(repo)?;
        let mut reader = client.create_blob_read_stream(digest).await?;
        if let Some(len) = reader.content_length() {
            self.output.verbose(&format!(
                "Blob {} is {}",
                short_digest(digest),
                self.output.format_size(len)
            ));
        }

        match path {
            Some(path) => {
                let mut file = tokio::fs::File::create(path).await?;
                while let Some(chunk) = reader.next().await {
                    match chunk {
                        Ok(chunk) => file.write_all(&chunk).await?,
                        Err(e) => {
                            drop(file);
                            // a failed verification invalidates everything written
                            let _ = tokio::fs::remove_file(path).await;
                            return Err(e);
                        }
                    }
                }
                file.flush().await?;
                self.output.success(&format!(
                    "Wrote {} to {}",
                    self.output.format_size(reader.received()),
                    path
                ));
            }
            None => {
                let mut stdout = tokio::io::stdout();
                while let Some(chunk) = reader.next().await {
                    stdout.write_all(&chunk?).await?;
                }
                stdout.flush().await?;
            }
        }
        Ok(())
    }

    async fn digest(&self, file: &str) -> Result<()> {
        let manifest = tokio::fs::read_to_string(file).await?;
        println!("{}", digest_from_manifest_str(&manifest)?);
        Ok(())
    }
}
