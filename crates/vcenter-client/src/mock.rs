//! Mock inventory client for unit testing
//!
//! Stores hosts in memory and can be told to fail or stall, so reconcilers
//! can be tested without a running vCenter.

use crate::error::InventoryError;
use crate::inventory_trait::InventoryClientTrait;
use crate::models::HostSummary;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Mock inventory for testing
///
/// Clones share state, so a test can keep one handle and give another to
/// the code under test.
#[derive(Clone, Default)]
pub struct MockInventoryClient {
    hosts: Arc<Mutex<Vec<HostSummary>>>,
    failure: Arc<Mutex<Option<String>>>,
    delay: Arc<Mutex<Option<Duration>>>,
    calls: Arc<AtomicUsize>,
}

impl MockInventoryClient {
    /// Create an empty inventory
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an inventory holding `hosts` in the given order
    pub fn with_hosts(hosts: Vec<HostSummary>) -> Self {
        let mock = Self::new();
        mock.set_hosts(hosts);
        mock
    }

    /// Replace the inventory contents (for test setup)
    pub fn set_hosts(&self, hosts: Vec<HostSummary>) {
        *self.hosts.lock().unwrap() = hosts;
    }

    /// Make every following enumeration fail with an API error
    pub fn fail_with(&self, message: impl Into<String>) {
        *self.failure.lock().unwrap() = Some(message.into());
    }

    /// Clear an injected failure
    pub fn recover(&self) {
        *self.failure.lock().unwrap() = None;
    }

    /// Stall every enumeration by `delay` before answering
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Number of enumerations performed so far
    pub fn enumerate_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl InventoryClientTrait for MockInventoryClient {
    fn endpoint(&self) -> &str {
        "mock://vcenter"
    }

    async fn enumerate_hosts(&self) -> Result<Vec<HostSummary>, InventoryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(message) = self.failure.lock().unwrap().clone() {
            return Err(InventoryError::Api(message));
        }
        Ok(self.hosts.lock().unwrap().clone())
    }
}
