//! Host metrics sampling via `sysinfo`.
//!
//! Every reading is optional: a value the host cannot provide is left out of
//! the snapshot rather than reported as zero.

use std::path::Path;
use sysinfo::{Components, Disks, System};
use tracing::debug;

/// One round of host readings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostSample {
    pub cpu_usage_percent: Option<f64>,
    pub memory_usage_percent: Option<f64>,
    pub swap_usage_percent: Option<f64>,
    pub disk_usage_percent: Option<f64>,
    pub load_average_1m: Option<f64>,
    pub cpu_temperature_celsius: Option<f64>,
    pub uptime_seconds: Option<i64>,
    pub process_count: Option<i64>,
    pub os_version: Option<String>,
    pub kernel_version: Option<String>,
}

/// Keeps the `sysinfo` handles alive between samples so CPU usage is measured
/// over the sampling interval.
pub struct Sampler {
    sys: System,
    disks: Disks,
    components: Components,
}

impl Sampler {
    pub fn new() -> Self {
        let mut sys = System::new();
        sys.refresh_cpu_usage();
        Self {
            sys,
            disks: Disks::new_with_refreshed_list(),
            components: Components::new_with_refreshed_list(),
        }
    }

    pub fn sample(&mut self) -> HostSample {
        self.sys.refresh_cpu_usage();
        self.sys.refresh_memory();
        self.sys.refresh_processes();
        self.disks.refresh();
        self.components.refresh();

        let root = self
            .disks
            .list()
            .iter()
            .find(|d| d.mount_point() == Path::new("/"))
            .map(|d| (d.total_space(), d.total_space().saturating_sub(d.available_space())));

        let cpu_temperature = self
            .components
            .list()
            .iter()
            .find(|c| {
                let label = c.label().to_lowercase();
                label.contains("package") || label.contains("cpu") || label.contains("tctl")
            })
            .map(|c| c.temperature());

        let load = System::load_average();
        let sample = HostSample {
            cpu_usage_percent: Some(round1(self.sys.global_cpu_info().cpu_usage() as f64)),
            memory_usage_percent: percent(self.sys.used_memory(), self.sys.total_memory()),
            swap_usage_percent: percent(self.sys.used_swap(), self.sys.total_swap()),
            disk_usage_percent: root.and_then(|(total, used)| percent(used, total)),
            load_average_1m: Some(round2(load.one)),
            cpu_temperature_celsius: cpu_temperature
                .filter(|t| t.is_finite())
                .map(|t| round1(t as f64)),
            uptime_seconds: i64::try_from(System::uptime()).ok(),
            process_count: i64::try_from(self.sys.processes().len()).ok(),
            os_version: System::long_os_version(),
            kernel_version: System::kernel_version(),
        };
        debug!(?sample, "host sampled");
        sample
    }
}

impl Default for Sampler {
    fn default() -> Self {
        Self::new()
    }
}

/// `used / total` in percent, rounded to 0.1; `None` when `total` is zero.
pub fn percent(used: u64, total: u64) -> Option<f64> {
    if total == 0 {
        return None;
    }
    Some(round1(used as f64 / total as f64 * 100.0))
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
