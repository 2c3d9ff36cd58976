//! Controller configuration.
//!
//! Read once from environment variables at startup. vCenter settings accept
//! the `GOVMOMI_*` names as fallbacks so existing deployments keep working.

use crate::error::ControllerError;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Startup configuration of the HostInfo controller
#[derive(Clone)]
pub struct ControllerConfig {
    /// vCenter endpoint, bare host or full URL
    pub vcenter_url: String,
    /// vCenter login name
    pub vcenter_username: String,
    /// vCenter password, never logged
    pub vcenter_password: String,
    /// Accept invalid TLS certificates from vCenter
    pub vcenter_insecure: bool,
    /// vim25 JSON API release segment, e.g. `8.0.1.0`
    pub api_release: String,
    /// `None` watches all namespaces
    pub namespace: Option<String>,
    /// Listen address of the metrics and probe server
    pub metrics_addr: SocketAddr,
    /// Requeue delay after a successful reconcile
    pub resync_interval: Duration,
    /// Upper bound for each vCenter or API server call
    pub call_timeout: Duration,
    /// HostInfo resources reconciled in parallel
    pub concurrency: u16,
    /// Host summaries fetched in parallel during one enumeration
    pub max_concurrent_requests: usize,
    /// Quiet period before a changed resource is reconciled
    pub debounce: Duration,
}

impl std::fmt::Debug for ControllerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerConfig")
            .field("vcenter_url", &self.vcenter_url)
            .field("vcenter_username", &self.vcenter_username)
            .field("vcenter_password", &"<redacted>")
            .field("vcenter_insecure", &self.vcenter_insecure)
            .field("api_release", &self.api_release)
            .field("namespace", &self.namespace)
            .field("metrics_addr", &self.metrics_addr)
            .field("resync_interval", &self.resync_interval)
            .field("call_timeout", &self.call_timeout)
            .field("concurrency", &self.concurrency)
            .field("max_concurrent_requests", &self.max_concurrent_requests)
            .field("debounce", &self.debounce)
            .finish()
    }
}

impl ControllerConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to
    /// its value
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let required = |name: &str, fallback: &str| {
            var(name).or_else(|| var(fallback)).ok_or_else(|| {
                ControllerError::InvalidConfig(format!(
                    "{} (or {}) environment variable is required",
                    name, fallback
                ))
            })
        };

        let vcenter_url = required("VC_URL", "GOVMOMI_URL")?;
        let vcenter_username = required("VC_USERNAME", "GOVMOMI_USERNAME")?;
        let vcenter_password = required("VC_PASSWORD", "GOVMOMI_PASSWORD")?;

        let vcenter_insecure = match var("VC_INSECURE") {
            Some(value) => parse_bool("VC_INSECURE", &value)?,
            None => false,
        };
        let api_release = var("VC_API_RELEASE").unwrap_or_else(|| "8.0.1.0".to_string());
        let namespace = var("WATCH_NAMESPACE");

        let metrics_addr = parse_or("METRICS_ADDR", var("METRICS_ADDR"), SocketAddr::from(([0, 0, 0, 0], 8080)))?;
        let resync_secs: u64 = parse_or("RESYNC_INTERVAL_SECS", var("RESYNC_INTERVAL_SECS"), 300)?;
        let timeout_secs: u64 = parse_or("CALL_TIMEOUT_SECS", var("CALL_TIMEOUT_SECS"), 30)?;
        let concurrency: u16 = parse_or("RECONCILE_CONCURRENCY", var("RECONCILE_CONCURRENCY"), 4)?;
        let max_concurrent_requests: usize =
            parse_or("VC_MAX_CONCURRENT_REQUESTS", var("VC_MAX_CONCURRENT_REQUESTS"), 8)?;
        let debounce_secs: u64 = parse_or("DEBOUNCE_SECS", var("DEBOUNCE_SECS"), 1)?;

        if timeout_secs == 0 {
            return Err(ControllerError::InvalidConfig(
                "CALL_TIMEOUT_SECS must be greater than zero".to_string(),
            ));
        }
        if resync_secs == 0 {
            return Err(ControllerError::InvalidConfig(
                "RESYNC_INTERVAL_SECS must be greater than zero".to_string(),
            ));
        }
        if max_concurrent_requests == 0 {
            return Err(ControllerError::InvalidConfig(
                "VC_MAX_CONCURRENT_REQUESTS must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            vcenter_url,
            vcenter_username,
            vcenter_password,
            vcenter_insecure,
            api_release,
            namespace,
            metrics_addr,
            resync_interval: Duration::from_secs(resync_secs),
            call_timeout: Duration::from_secs(timeout_secs),
            concurrency,
            max_concurrent_requests,
            debounce: Duration::from_secs(debounce_secs),
        })
    }
}

fn parse_or<T>(name: &str, value: Option<String>, default: T) -> Result<T, ControllerError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(raw) => raw.trim().parse().map_err(|e| {
            ControllerError::InvalidConfig(format!("{} has invalid value {:?}: {}", name, raw, e))
        }),
        None => Ok(default),
    }
}

fn parse_bool(name: &str, raw: &str) -> Result<bool, ControllerError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ControllerError::InvalidConfig(format!(
            "{} has invalid value {:?}, expected true or false",
            name, raw
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<ControllerConfig, ControllerError> {
        let env: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ControllerConfig::from_lookup(|name| env.get(name).cloned())
    }

    const CREDENTIALS: [(&str, &str); 3] = [
        ("VC_URL", "https://vcenter.lab/sdk"),
        ("VC_USERNAME", "administrator@vsphere.local"),
        ("VC_PASSWORD", "secret"),
    ];

    #[test]
    fn test_defaults() {
        let config = load(&CREDENTIALS).unwrap();

        assert_eq!(config.vcenter_url, "https://vcenter.lab/sdk");
        assert!(!config.vcenter_insecure);
        assert_eq!(config.api_release, "8.0.1.0");
        assert_eq!(config.namespace, None);
        assert_eq!(config.metrics_addr, "0.0.0.0:8080".parse::<SocketAddr>().unwrap());
        assert_eq!(config.resync_interval, Duration::from_secs(300));
        assert_eq!(config.call_timeout, Duration::from_secs(30));
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.max_concurrent_requests, 8);
        assert_eq!(config.debounce, Duration::from_secs(1));
    }

    #[test]
    fn test_govmomi_fallbacks() {
        let config = load(&[
            ("GOVMOMI_URL", "vcenter.lab"),
            ("GOVMOMI_USERNAME", "admin"),
            ("GOVMOMI_PASSWORD", "pw"),
        ])
        .unwrap();

        assert_eq!(config.vcenter_url, "vcenter.lab");
        assert_eq!(config.vcenter_username, "admin");
        assert_eq!(config.vcenter_password, "pw");
    }

    #[test]
    fn test_vc_names_take_precedence() {
        let mut vars = CREDENTIALS.to_vec();
        vars.push(("GOVMOMI_URL", "other.lab"));
        assert_eq!(load(&vars).unwrap().vcenter_url, "https://vcenter.lab/sdk");
    }

    #[test]
    fn test_missing_password_is_rejected() {
        let result = load(&[("VC_URL", "vcenter.lab"), ("VC_USERNAME", "admin"), ("VC_PASSWORD", " ")]);
        assert!(matches!(result, Err(ControllerError::InvalidConfig(msg)) if msg.contains("VC_PASSWORD")));
    }

    #[test]
    fn test_overrides() {
        let mut vars = CREDENTIALS.to_vec();
        vars.extend([
            ("VC_INSECURE", "true"),
            ("VC_API_RELEASE", "7.0.3.0"),
            ("WATCH_NAMESPACE", "infra"),
            ("METRICS_ADDR", "127.0.0.1:9100"),
            ("RESYNC_INTERVAL_SECS", "60"),
            ("CALL_TIMEOUT_SECS", "5"),
            ("RECONCILE_CONCURRENCY", "8"),
            ("VC_MAX_CONCURRENT_REQUESTS", "2"),
            ("DEBOUNCE_SECS", "0"),
        ]);

        let config = load(&vars).unwrap();

        assert!(config.vcenter_insecure);
        assert_eq!(config.api_release, "7.0.3.0");
        assert_eq!(config.namespace.as_deref(), Some("infra"));
        assert_eq!(config.metrics_addr, "127.0.0.1:9100".parse::<SocketAddr>().unwrap());
        assert_eq!(config.resync_interval, Duration::from_secs(60));
        assert_eq!(config.call_timeout, Duration::from_secs(5));
        assert_eq!(config.concurrency, 8);
        assert_eq!(config.max_concurrent_requests, 2);
        assert_eq!(config.debounce, Duration::ZERO);
    }

    #[test]
    fn test_invalid_numbers_are_rejected() {
        for (name, value) in [
            ("RESYNC_INTERVAL_SECS", "soon"),
            ("CALL_TIMEOUT_SECS", "-1"),
            ("CALL_TIMEOUT_SECS", "0"),
            ("RECONCILE_CONCURRENCY", "70000"),
            ("VC_MAX_CONCURRENT_REQUESTS", "0"),
            ("VC_MAX_CONCURRENT_REQUESTS", "many"),
            ("METRICS_ADDR", "localhost"),
            ("VC_INSECURE", "maybe"),
        ] {
            let mut vars = CREDENTIALS.to_vec();
            vars.push((name, value));
            assert!(
                matches!(load(&vars), Err(ControllerError::InvalidConfig(_))),
                "{}={} should be rejected",
                name,
                value
            );
        }
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = load(&CREDENTIALS).unwrap();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
