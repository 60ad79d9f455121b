//! Bridge Runtime
//!
//! Building blocks shared by both bridge controllers:
//!
//! - [`ReconcileLoop`]: watch stream -> reflector cache -> `kube_runtime::Controller`
//!   with a single worker and per-key retry budget
//! - [`ClusterApi`]: the cluster operations a reconciler needs, implemented on
//!   `kube::Client` and, behind the `test-util` feature, in memory

pub mod backoff;
pub mod cluster;
pub mod config;
pub mod error;
pub mod key;
pub mod reconcile_loop;
pub mod signal;

#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use backoff::ItemBackoff;
pub use cluster::{ClusterApi, KubeClusterApi};
pub use config::LoopConfig;
pub use error::{ClusterError, LoopError};
pub use key::ObjectKey;
pub use reconcile_loop::{DroppedKey, Reconcile, ReconcileLoop};
pub use signal::cancel_on_signal;

#[cfg(any(test, feature = "test-util"))]
pub use mock::MockClusterApi;
