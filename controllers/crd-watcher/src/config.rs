//! Command-line configuration

use crate::error::ControllerError;
use bridge_runtime::LoopConfig;
use clap::Parser;
use crds::split_api_version;
use kube::api::GroupVersionKind;

/// Watches one custom resource kind and manages a KUDO Instance per resource
#[derive(Debug, Clone, Parser)]
#[command(name = "crd-controller", version, about)]
pub struct Args {
    /// apiVersion of the watched kind, e.g. `kafka.example.dev/v1`
    #[arg(long = "group-version", env = "GROUP_VERSION")]
    pub group_version: String,

    /// Kind to watch
    #[arg(long, env = "KIND")]
    pub kind: String,

    /// Namespace to watch; all namespaces when absent
    #[arg(long = "ns", env = "WATCH_NAMESPACE")]
    pub namespace: Option<String>,

    /// Requeues of a failing resource before it is dropped
    #[arg(long, default_value_t = 1)]
    pub max_retries: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatcherConfig {
    pub gvk: GroupVersionKind,
    pub namespace: Option<String>,
    pub loop_config: LoopConfig,
}

impl TryFrom<Args> for WatcherConfig {
    type Error = ControllerError;

    fn try_from(args: Args) -> Result<Self, Self::Error> {
        let (group, version) = split_api_version(&args.group_version)
            .map_err(|e| ControllerError::InvalidConfig(e.to_string()))?;
        if args.kind.is_empty() {
            return Err(ControllerError::InvalidConfig("kind must not be empty".to_string()));
        }
        Ok(Self {
            gvk: GroupVersionKind::gvk(group, version, &args.kind),
            namespace: args.namespace.filter(|ns| !ns.is_empty()),
            loop_config: LoopConfig::default().with_max_retries(args.max_retries),
        })
    }
}
