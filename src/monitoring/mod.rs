//! System monitoring: raw host readings for the dashboard
//!
//! `SystemMonitor` is the only provider in production. It keeps sysinfo
//! state between polls and fills the gaps sysinfo leaves (memory breakdown,
//! block device counters, logged-in users, sockets) from /proc and a few
//! standard tools.

pub mod procfs;

use serde::Serialize;
use serde_json::{json, Value};
use std::path::Path;
use std::process::Command;
use sysinfo::{Disks, Networks, System, Users};

use crate::sampler::Reading;

/// One raw number the charts are built from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quantity {
    /// MiB
    MemoryFree,
    MemoryUsed,
    MemoryBuffers,
    MemoryCached,
    /// 1-minute load average
    LoadAverage,
    /// Cumulative bytes on the watched interface
    NetworkBytesIn,
    NetworkBytesOut,
    /// Cumulative sectors on the watched disk
    DiskSectorsRead,
    DiskSectorsWritten,
    /// Percent across all cores
    CpuUsed,
}

/// Host facts served as-is, without windowing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoTopic {
    Uptime,
    Hostname,
    OsName,
    Kernel,
    CpuModel,
    CpuCount,
    Disks,
    Addresses,
    Users,
    Connections,
    Processes,
}

/// Source of raw host readings
pub trait MetricsProvider: Send {
    /// A failed read is `Reading::Unavailable`, never a panic
    fn read_metric(&mut self, quantity: Quantity) -> Reading;

    /// Read several quantities for one poll, one reading per quantity in order.
    /// Providers that can should serve related quantities from one snapshot.
    fn read_metrics(&mut self, quantities: &[Quantity]) -> Vec<Reading> {
        quantities.iter().map(|q| self.read_metric(*q)).collect()
    }

    fn host_info(&mut self, topic: InfoTopic) -> Result<Value, String>;
}

/// Which interface and disk to watch; `None` picks the first sensible one
#[derive(Debug, Clone, Default)]
pub struct MonitorTargets {
    pub interface: Option<String>,
    pub disk: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessRow {
    pub user: String,
    pub pid: u32,
    pub cpu_percent: f32,
    pub memory_percent: f32,
    pub rss_kib: u64,
    pub status: String,
    pub name: String,
}

/// Sources read at most once per batch
#[derive(Default)]
struct Snapshot {
    meminfo: Option<Result<procfs::MemInfo, String>>,
    interface: Option<Result<(u64, u64), String>>,
    disk: Option<Result<procfs::DiskCounters, String>>,
}

/// System monitor that maintains state between polls
pub struct SystemMonitor {
    sys: System,
    disks: Disks,
    networks: Networks,
    users: Users,
    targets: MonitorTargets,
}

impl SystemMonitor {
    pub fn new(targets: MonitorTargets) -> Self {
        let mut sys = System::new_all();
        sys.refresh_all();

        Self {
            sys,
            disks: Disks::new_with_refreshed_list(),
            networks: Networks::new_with_refreshed_list(),
            users: Users::new_with_refreshed_list(),
            targets,
        }
    }

    fn meminfo(&self) -> Result<procfs::MemInfo, String> {
        let content = std::fs::read_to_string("/proc/meminfo")
            .map_err(|e| format!("Failed to read /proc/meminfo: {}", e))?;
        procfs::parse_meminfo(&content)
    }

    /// Cumulative (received, transmitted) bytes for the watched interface
    fn interface_totals(&mut self) -> Result<(u64, u64), String> {
        self.networks.refresh();
        let found = match self.targets.interface.as_deref() {
            Some(wanted) => self.networks.iter().find(|(name, _)| name.as_str() == wanted),
            None => {
                let mut candidates: Vec<_> = self.networks.iter()
                    .filter(|(name, _)| name.as_str() != "lo")
                    .collect();
                candidates.sort_by(|a, b| a.0.cmp(b.0));
                candidates.into_iter().next()
            }
        };
        found
            .map(|(_, data)| (data.total_received(), data.total_transmitted()))
            .ok_or_else(|| "No network interface to watch".to_string())
    }

    fn disk_counters(&self) -> Result<procfs::DiskCounters, String> {
        let content = std::fs::read_to_string("/proc/diskstats")
            .map_err(|e| format!("Failed to read /proc/diskstats: {}", e))?;
        let stats = procfs::parse_diskstats(&content);
        let whole_disk = |name: &str| Path::new("/sys/block").join(name).exists();
        procfs::pick_disk(&stats, self.targets.disk.as_deref(), whole_disk)
            .cloned()
            .ok_or_else(|| "No block device to watch".to_string())
    }

    fn cpu_used(&mut self) -> f64 {
        self.sys.refresh_cpu_usage();
        self.sys.global_cpu_usage() as f64
    }

    fn disk_rows(&mut self) -> Vec<[String; 6]> {
        self.disks.refresh();
        self.disks.iter()
            .filter(|d| d.total_space() > 0)
            .map(|d| {
                let total = d.total_space();
                let available = d.available_space();
                let used = total.saturating_sub(available);
                let percent = (used as f64 / total as f64) * 100.0;
                [
                    d.name().to_string_lossy().to_string(),
                    procfs::human_size(total),
                    procfs::human_size(used),
                    procfs::human_size(available),
                    format!("{:.0}%", percent),
                    d.mount_point().to_string_lossy().to_string(),
                ]
            })
            .collect()
    }

    fn process_rows(&mut self) -> Vec<ProcessRow> {
        self.sys.refresh_all();
        let total_memory = self.sys.total_memory().max(1) as f64;
        let mut rows: Vec<ProcessRow> = self.sys.processes().values()
            .map(|p| ProcessRow {
                user: p.user_id()
                    .and_then(|uid| self.users.get_user_by_id(uid))
                    .map(|u| u.name().to_string())
                    .unwrap_or_else(|| "?".to_string()),
                pid: p.pid().as_u32(),
                cpu_percent: p.cpu_usage(),
                memory_percent: ((p.memory() as f64 / total_memory) * 100.0) as f32,
                rss_kib: p.memory() / 1024,
                status: p.status().to_string(),
                name: p.name().to_string_lossy().to_string(),
            })
            .collect();
        rows.sort_by(|a, b| b.cpu_percent.total_cmp(&a.cpu_percent));
        rows
    }

    fn snapshot_meminfo(&self, snap: &mut Snapshot) -> Result<procfs::MemInfo, String> {
        snap.meminfo.get_or_insert_with(|| self.meminfo()).clone()
    }

    fn snapshot_interface(&mut self, snap: &mut Snapshot) -> Result<(u64, u64), String> {
        match &snap.interface {
            Some(totals) => totals.clone(),
            None => {
                let totals = self.interface_totals();
                snap.interface = Some(totals.clone());
                totals
            }
        }
    }

    fn snapshot_disk(&self, snap: &mut Snapshot) -> Result<procfs::DiskCounters, String> {
        snap.disk.get_or_insert_with(|| self.disk_counters()).clone()
    }

    fn read_from(&mut self, quantity: Quantity, snap: &mut Snapshot) -> Reading {
        let value: Result<f64, String> = match quantity {
            Quantity::MemoryFree => self.snapshot_meminfo(snap).map(|m| m.free as f64),
            Quantity::MemoryUsed => self.snapshot_meminfo(snap).map(|m| m.used as f64),
            Quantity::MemoryBuffers => self.snapshot_meminfo(snap).map(|m| m.buffers as f64),
            Quantity::MemoryCached => self.snapshot_meminfo(snap).map(|m| m.cached as f64),
            Quantity::LoadAverage => Ok(System::load_average().one),
            Quantity::NetworkBytesIn => self.snapshot_interface(snap).map(|(rx, _)| rx as f64),
            Quantity::NetworkBytesOut => self.snapshot_interface(snap).map(|(_, tx)| tx as f64),
            Quantity::DiskSectorsRead => self.snapshot_disk(snap).map(|d| d.sectors_read as f64),
            Quantity::DiskSectorsWritten => self.snapshot_disk(snap).map(|d| d.sectors_written as f64),
            Quantity::CpuUsed => Ok(self.cpu_used()),
        };
        if let Err(e) = &value {
            tracing::warn!("Reading {:?} failed: {}", quantity, e);
        }
        value.into()
    }
}

impl MetricsProvider for SystemMonitor {
    fn read_metric(&mut self, quantity: Quantity) -> Reading {
        self.read_from(quantity, &mut Snapshot::default())
    }

    fn read_metrics(&mut self, quantities: &[Quantity]) -> Vec<Reading> {
        let mut snap = Snapshot::default();
        quantities.iter().map(|q| self.read_from(*q, &mut snap)).collect()
    }

    fn host_info(&mut self, topic: InfoTopic) -> Result<Value, String> {
        let value = match topic {
            InfoTopic::Uptime => json!(procfs::format_uptime(System::uptime())),
            InfoTopic::Hostname => json!(System::host_name().unwrap_or_else(|| "unknown".to_string())),
            InfoTopic::OsName => json!(System::long_os_version()
                .or_else(System::name)
                .unwrap_or_else(|| "unknown".to_string())),
            InfoTopic::Kernel => json!(System::kernel_version().unwrap_or_else(|| "unknown".to_string())),
            InfoTopic::CpuModel => json!(self.sys.cpus().first()
                .map(|c| c.brand().trim().to_string())
                .unwrap_or_else(|| "Unknown".to_string())),
            InfoTopic::CpuCount => json!(self.sys.cpus().len()),
            InfoTopic::Disks => json!(self.disk_rows()),
            InfoTopic::Addresses => json!(procfs::parse_ip_addr_json(&run_command("ip", &["-j", "addr", "show"])?)?),
            InfoTopic::Users => json!(procfs::parse_who(&run_command("who", &[])?)),
            InfoTopic::Connections => json!(procfs::parse_ss(&run_command("ss", &["-tun"])?)),
            InfoTopic::Processes => json!(self.process_rows()),
        };
        Ok(value)
    }
}

/// Run a tool and return its stdout
fn run_command(program: &str, args: &[&str]) -> Result<String, String> {
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| format!("Failed to run {}: {}", program, e))?;
    if !output.status.success() {
        return Err(format!(
            "{} exited with {}: {}",
            program,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}
