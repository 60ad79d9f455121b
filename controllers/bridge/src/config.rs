//! Environment configuration

use crate::error::ControllerError;
use bridge_runtime::LoopConfig;

/// Image of the per-kind CRD watcher
pub const DEFAULT_WATCHER_IMAGE: &str = "zmalikshxil/kudo-crd-controller:0.0.1-alpha";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Namespace to watch; `None` watches all namespaces
    pub namespace: Option<String>,
    pub watcher_image: String,
    pub loop_config: LoopConfig,
}

impl BridgeConfig {
    /// Read `WATCH_NAMESPACE`, `CRD_CONTROLLER_IMAGE` and `MAX_RETRIES`
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|value| !value.is_empty());

        let mut loop_config = LoopConfig::default();
        if let Some(raw) = non_empty("MAX_RETRIES") {
            let max_retries = raw.parse().map_err(|_| {
                ControllerError::InvalidConfig(format!(
                    "MAX_RETRIES must be a non-negative integer, got {:?}",
                    raw
                ))
            })?;
            loop_config = loop_config.with_max_retries(max_retries);
        }

        Ok(Self {
            namespace: non_empty("WATCH_NAMESPACE"),
            watcher_image: non_empty("CRD_CONTROLLER_IMAGE")
                .unwrap_or_else(|| DEFAULT_WATCHER_IMAGE.to_string()),
            loop_config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.namespace, None);
        assert_eq!(config.watcher_image, DEFAULT_WATCHER_IMAGE);
        assert_eq!(config.loop_config.max_retries, 1);
    }

    #[test]
    fn test_overrides() {
        let config = BridgeConfig::from_lookup(lookup(&[
            ("WATCH_NAMESPACE", "kudo"),
            ("CRD_CONTROLLER_IMAGE", "registry.local/crd-watcher:dev"),
            ("MAX_RETRIES", "4"),
        ]))
        .unwrap();
        assert_eq!(config.namespace.as_deref(), Some("kudo"));
        assert_eq!(config.watcher_image, "registry.local/crd-watcher:dev");
        assert_eq!(config.loop_config.max_retries, 4);
    }

    #[test]
    fn test_invalid_max_retries() {
        let result = BridgeConfig::from_lookup(lookup(&[("MAX_RETRIES", "many")]));
        assert!(matches!(result, Err(ControllerError::InvalidConfig(_))));
    }
}
