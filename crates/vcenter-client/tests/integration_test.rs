//! Integration tests for the vCenter client
//!
//! These tests require a reachable vCenter (or vcsim with the JSON API).
//! Set VC_URL, VC_USERNAME and VC_PASSWORD environment variables to run.

use vcenter_client::{ClientOptions, InventoryClientTrait, VCenterClient};

fn client_from_env() -> VCenterClient {
    let url = std::env::var("VC_URL")
        .unwrap_or_else(|_| "https://127.0.0.1:8989/sdk".to_string());
    let username = std::env::var("VC_USERNAME")
        .expect("VC_USERNAME environment variable must be set");
    let password = std::env::var("VC_PASSWORD")
        .expect("VC_PASSWORD environment variable must be set");

    let options = ClientOptions {
        insecure: std::env::var("VC_INSECURE").map(|v| v == "true").unwrap_or(true),
        ..ClientOptions::default()
    };

    VCenterClient::new(&url, username, password, options).expect("Failed to create client")
}

#[tokio::test]
#[ignore] // Requires running vCenter instance
async fn test_login() {
    let client = client_from_env();
    client.login().await.expect("Failed to log in");
}

#[tokio::test]
#[ignore]
async fn test_enumerate_hosts() {
    let client = client_from_env();

    let hosts = client.enumerate_hosts().await
        .expect("Failed to enumerate hosts");

    println!("Found {} hosts at {}", hosts.len(), InventoryClientTrait::endpoint(&client));
    for host in &hosts {
        assert!(!host.name.is_empty(), "Host without name");
        assert!(host.num_cpu_cores > 0, "Host {} reports no cores", host.name);
        println!(
            "  {}: {} MHz x {} cores, {} MHz used",
            host.name, host.cpu_mhz, host.num_cpu_cores, host.overall_cpu_usage
        );
    }
}

#[tokio::test]
#[ignore]
async fn test_enumeration_is_stable() {
    let client = client_from_env();

    let first: Vec<String> = client.enumerate_hosts().await
        .expect("Failed to enumerate hosts")
        .into_iter()
        .map(|h| h.name)
        .collect();
    let second: Vec<String> = client.enumerate_hosts().await
        .expect("Failed to enumerate hosts")
        .into_iter()
        .map(|h| h.name)
        .collect();

    assert_eq!(first, second, "Host order changed between enumerations");
}
