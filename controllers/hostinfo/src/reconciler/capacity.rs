//! Host lookup and CPU capacity arithmetic.

use crate::error::ControllerError;
use crds::HostInfoStatus;
use vcenter_client::HostSummary;

/// Result of looking a hostname up in an inventory snapshot
#[derive(Debug, PartialEq, Eq)]
pub enum HostMatch<'a> {
    /// No host carries the name
    Missing,
    /// First host with the name, plus how many further hosts share it
    Found {
        host: &'a HostSummary,
        duplicates: usize,
    },
}

/// Find `hostname` in `hosts` by exact, case-sensitive name.
///
/// The first host in enumeration order wins when names repeat.
pub fn find_host<'a>(hosts: &'a [HostSummary], hostname: &str) -> HostMatch<'a> {
    let mut matches = hosts.iter().filter(|host| host.name == hostname);
    match matches.next() {
        Some(host) => HostMatch::Found {
            host,
            duplicates: matches.count(),
        },
        None => HostMatch::Missing,
    }
}

/// CPU capacity of one host in MHz
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuCapacity {
    /// Clock speed per core times logical cores
    pub total_mhz: i64,
    /// Total minus live usage; negative when overcommitted
    pub free_mhz: i64,
}

impl CpuCapacity {
    /// Derive capacity from an inventory record.
    ///
    /// Negative inputs and overflow mark the record as malformed rather than
    /// being clamped or wrapped.
    pub fn of(host: &HostSummary) -> Result<Self, ControllerError> {
        if host.cpu_mhz < 0 || host.num_cpu_cores < 0 || host.overall_cpu_usage < 0 {
            return Err(ControllerError::MalformedHost(format!(
                "host {} reports cpuMhz={} numCpuCores={} overallCpuUsage={}",
                host.name, host.cpu_mhz, host.num_cpu_cores, host.overall_cpu_usage
            )));
        }

        let total_mhz = host.cpu_mhz.checked_mul(host.num_cpu_cores).ok_or_else(|| {
            ControllerError::MalformedHost(format!(
                "host {}: {} MHz x {} cores overflows",
                host.name, host.cpu_mhz, host.num_cpu_cores
            ))
        })?;
        let free_mhz = total_mhz.checked_sub(host.overall_cpu_usage).ok_or_else(|| {
            ControllerError::MalformedHost(format!(
                "host {}: free capacity {} - {} overflows",
                host.name, total_mhz, host.overall_cpu_usage
            ))
        })?;

        Ok(Self { total_mhz, free_mhz })
    }

    pub fn to_status(self) -> HostInfoStatus {
        HostInfoStatus {
            total_cpu: self.total_mhz,
            free_cpu: self.free_mhz,
        }
    }
}
