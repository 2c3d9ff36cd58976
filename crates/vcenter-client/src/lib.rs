//! vCenter Inventory Client
//!
//! A small client for the vSphere Web Services JSON API (`/sdk/vim25/...`),
//! exposing the host inventory the HostInfo controller reconciles against.
//!
//! # Example
//!
//! ```no_run
//! use vcenter_client::{ClientOptions, InventoryClientTrait, VCenterClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = VCenterClient::new(
//!     "https://vcenter.lab/sdk",
//!     "administrator@vsphere.local".to_string(),
//!     "secret".to_string(),
//!     ClientOptions::default(),
//! )?;
//!
//! client.login().await?;
//! for host in client.enumerate_hosts().await? {
//!     println!("{}: {} MHz x {} cores", host.name, host.cpu_mhz, host.num_cpu_cores);
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod models;
#[path = "trait.rs"]
pub mod inventory_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::{normalize_endpoint, ClientOptions, VCenterClient};
pub use error::InventoryError;
pub use models::*;
pub use inventory_trait::InventoryClientTrait;
#[cfg(feature = "test-util")]
pub use mock::MockInventoryClient;
