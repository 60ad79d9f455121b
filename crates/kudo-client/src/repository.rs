//! KUDO repository HTTP client

use crate::error::KudoError;
use crate::models::{IndexFile, PackageArtifact, PackageRef};
use crate::package::{read_archive, select_version};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};

/// Fetches repository indexes and package archives
#[derive(Clone)]
pub struct RepositoryClient {
    client: Client,
}

impl RepositoryClient {
    pub fn new() -> Result<Self, KudoError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client })
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, KudoError> {
        debug!("Fetching {}", url);
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(KudoError::Repository(format!(
                "GET {} failed: {} - {}",
                url,
                status,
                body.chars().take(200).collect::<String>()
            )));
        }
        Ok(response.bytes().await?.to_vec())
    }

    /// Download and parse `<repository>/index.yaml`
    pub async fn fetch_index(&self, repository_url: &str) -> Result<IndexFile, KudoError> {
        let bytes = self.fetch(&format!("{repository_url}/index.yaml")).await?;
        Ok(serde_yaml::from_slice(&bytes)?)
    }

    /// Resolve `package` against its repository and read the archive
    pub async fn resolve(&self, package: &PackageRef) -> Result<PackageArtifact, KudoError> {
        let repository_url = package.repository_url();
        let index = self.fetch_index(repository_url).await?;
        let version = select_version(&index, package)?;
        let url = version.urls.first().ok_or_else(|| {
            KudoError::InvalidPackage(format!(
                "{} {} has no download URL",
                version.name, version.operator_version
            ))
        })?;
        let url = absolute_url(repository_url, url);

        info!(
            package = %package.name,
            operator_version = %version.operator_version,
            "Downloading package {}",
            url
        );
        let archive = self.fetch(&url).await?;
        read_archive(&archive)
    }
}

/// Index URLs may be relative to the repository
fn absolute_url(repository_url: &str, url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("{}/{}", repository_url, url.trim_start_matches('/'))
    }
}
