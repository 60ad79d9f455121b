//! KUDO Client
//!
//! Resolves operator packages from a KUDO repository and installs them into
//! the cluster as `Operator`, `OperatorVersion` and `Instance` resources.
//!
//! # Example
//!
//! ```no_run
//! use kudo_client::{KudoClient, PackageBackend, PackageRef, InstallOptions, InstallTarget};
//! use std::collections::BTreeMap;
//!
//! # async fn example(client: kube::Client) -> Result<(), Box<dyn std::error::Error>> {
//! let kudo = KudoClient::new(client)?;
//! let package = PackageRef::new("kafka").with_operator_version("1.3.1");
//! let artifact = kudo.resolve(&package, "default").await?;
//!
//! let target = InstallTarget::new("default", "my-kafka");
//! kudo.install(&artifact, &target, &BTreeMap::new(), InstallOptions { skip_instance: true }).await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod models;
pub mod package;
pub mod repository;
#[path = "trait.rs"]
pub mod backend_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use backend_trait::PackageBackend;
pub use client::KudoClient;
pub use error::KudoError;
pub use models::*;
pub use repository::RepositoryClient;
#[cfg(feature = "test-util")]
pub use mock::MockPackageBackend;
