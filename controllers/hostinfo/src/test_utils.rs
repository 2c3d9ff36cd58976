//! Test utilities for unit testing the reconciler
//!
//! This module provides helpers for creating test data and an in-memory
//! `ResourceStore` that behaves like the API server with respect to
//! resourceVersion checks.

use crate::error::ControllerError;
use crate::store::{ResourceKey, ResourceStore};
use crds::{HostInfo, HostInfoSpec, HostInfoStatus};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Helper to create a test HostInfo without status
pub fn create_test_host_info(namespace: &str, name: &str, hostname: &str) -> HostInfo {
    HostInfo {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            resource_version: Some("1".to_string()),
            ..Default::default()
        },
        spec: HostInfoSpec {
            hostname: hostname.to_string(),
        },
        status: None,
    }
}

/// In-memory HostInfo store
///
/// Every accepted status write bumps the object's resourceVersion, and a
/// write carrying an older version is rejected with `Conflict`.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    objects: Arc<Mutex<HashMap<ResourceKey, HostInfo>>>,
    pending_conflicts: Arc<AtomicUsize>,
    get_failure: Arc<Mutex<Option<String>>>,
    updates: Arc<AtomicUsize>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `host_info` as if it was created through the API
    pub fn insert(&self, host_info: HostInfo) -> ResourceKey {
        let key = ResourceKey::from_resource(&host_info).unwrap();
        self.objects.lock().unwrap().insert(key.clone(), host_info);
        key
    }

    pub fn status_of(&self, key: &ResourceKey) -> Option<HostInfoStatus> {
        self.objects.lock().unwrap().get(key).and_then(|h| h.status)
    }

    pub fn resource_version_of(&self, key: &ResourceKey) -> Option<String> {
        self.objects.lock().unwrap().get(key).and_then(|h| h.metadata.resource_version.clone())
    }

    /// Simulate another writer touching the object
    pub fn touch(&self, key: &ResourceKey) {
        if let Some(host_info) = self.objects.lock().unwrap().get_mut(key) {
            bump_version(host_info);
        }
    }

    /// Reject the next `count` status writes as if someone else wrote first
    pub fn inject_conflicts(&self, count: usize) {
        self.pending_conflicts.store(count, Ordering::SeqCst);
    }

    /// Make every following `get` fail
    pub fn fail_gets(&self, message: impl Into<String>) {
        *self.get_failure.lock().unwrap() = Some(message.into());
    }

    /// Number of accepted status writes
    pub fn update_calls(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

fn bump_version(host_info: &mut HostInfo) {
    let next = host_info
        .metadata
        .resource_version
        .as_deref()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0)
        + 1;
    host_info.metadata.resource_version = Some(next.to_string());
}

#[async_trait::async_trait]
impl ResourceStore for InMemoryStore {
    async fn get(&self, key: &ResourceKey) -> Result<Option<HostInfo>, ControllerError> {
        if let Some(message) = self.get_failure.lock().unwrap().clone() {
            return Err(ControllerError::Kube(kube::Error::Service(message.into())));
        }
        Ok(self.objects.lock().unwrap().get(key).cloned())
    }

    async fn update_status(&self, host_info: &HostInfo, status: &HostInfoStatus) -> Result<(), ControllerError> {
        let key = ResourceKey::from_resource(host_info)?;
        let mut objects = self.objects.lock().unwrap();
        let stored = objects
            .get_mut(&key)
            .ok_or_else(|| ControllerError::Conflict(format!("HostInfo {} no longer exists", key)))?;

        let injected = self
            .pending_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            bump_version(stored);
        }

        if stored.metadata.resource_version != host_info.metadata.resource_version {
            return Err(ControllerError::Conflict(format!(
                "HostInfo {} is at resourceVersion {:?}, write was based on {:?}",
                key, stored.metadata.resource_version, host_info.metadata.resource_version
            )));
        }

        stored.status = Some(*status);
        bump_version(stored);
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_rejects_stale_write() {
        let store = InMemoryStore::new();
        let key = store.insert(create_test_host_info("infra", "esx-01", "esx01.lab"));
        let read = store.get(&key).await.unwrap().unwrap();

        store.touch(&key);

        let result = store.update_status(&read, &HostInfoStatus::default()).await;
        assert!(matches!(result, Err(ControllerError::Conflict(_))));
        assert_eq!(store.status_of(&key), None);
        assert_eq!(store.update_calls(), 0);
    }

    #[tokio::test]
    async fn test_store_bumps_version_on_write() {
        let store = InMemoryStore::new();
        let key = store.insert(create_test_host_info("infra", "esx-01", "esx01.lab"));
        let read = store.get(&key).await.unwrap().unwrap();

        let status = HostInfoStatus { total_cpu: 10, free_cpu: 5 };
        store.update_status(&read, &status).await.unwrap();

        assert_eq!(store.status_of(&key), Some(status));
        assert_eq!(store.resource_version_of(&key).as_deref(), Some("2"));
    }
}
