//! Parsers for the handful of /proc files and command outputs sysinfo doesn't cover

use std::collections::HashMap;

/// Memory breakdown in MiB
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MemInfo {
    pub free: u64,
    pub used: u64,
    pub buffers: u64,
    pub cached: u64,
}

/// Parse /proc/meminfo. Used memory excludes buffers and page cache.
pub fn parse_meminfo(content: &str) -> Result<MemInfo, String> {
    let mut fields: HashMap<&str, u64> = HashMap::new();
    for line in content.lines() {
        let Some((key, rest)) = line.split_once(':') else { continue };
        let kb = rest.split_whitespace().next()
            .and_then(|v| v.parse::<u64>().ok());
        if let Some(kb) = kb {
            fields.insert(key.trim(), kb);
        }
    }

    let get = |key: &str| fields.get(key).copied()
        .ok_or_else(|| format!("meminfo has no {} field", key));
    let total = get("MemTotal")?;
    let free = get("MemFree")?;
    let buffers = get("Buffers").unwrap_or(0);
    let cached = get("Cached").unwrap_or(0);
    let used = total.saturating_sub(free).saturating_sub(buffers).saturating_sub(cached);

    Ok(MemInfo {
        free: free / 1024,
        used: used / 1024,
        buffers: buffers / 1024,
        cached: cached / 1024,
    })
}

/// Cumulative sector counters for one block device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskCounters {
    pub device: String,
    pub sectors_read: u64,
    pub sectors_written: u64,
}

pub fn parse_diskstats(content: &str) -> Vec<DiskCounters> {
    content.lines()
        .filter_map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() < 10 {
                return None;
            }
            Some(DiskCounters {
                device: cols[2].to_string(),
                sectors_read: cols[5].parse().ok()?,
                sectors_written: cols[9].parse().ok()?,
            })
        })
        .collect()
}

/// Devices that never make sense as "the disk" on the dashboard
fn is_virtual_device(name: &str) -> bool {
    ["loop", "ram", "zram", "sr", "fd", "dm-", "md"].iter().any(|p| name.starts_with(p))
}

/// The configured device, or else the first physical whole disk
pub fn pick_disk<'a>(
    stats: &'a [DiskCounters],
    preferred: Option<&str>,
    is_whole_disk: impl Fn(&str) -> bool,
) -> Option<&'a DiskCounters> {
    if let Some(name) = preferred {
        return stats.iter().find(|d| d.device == name);
    }
    stats.iter().find(|d| !is_virtual_device(&d.device) && is_whole_disk(&d.device))
}

/// `[interface, address]` rows from `ip -j addr show`, loopback excluded
pub fn parse_ip_addr_json(json: &str) -> Result<Vec<[String; 2]>, String> {
    let entries: Vec<serde_json::Value> = serde_json::from_str(json)
        .map_err(|e| format!("Failed to parse ip output: {}", e))?;

    let mut rows = Vec::new();
    for entry in entries {
        let name = entry["ifname"].as_str().unwrap_or("");
        if name.is_empty() || name == "lo" { continue; }
        if let Some(addrs) = entry["addr_info"].as_array() {
            for addr in addrs {
                if addr["family"].as_str() != Some("inet") { continue; }
                if let Some(local) = addr["local"].as_str() {
                    rows.push([name.to_string(), local.to_string()]);
                }
            }
        }
    }
    Ok(rows)
}

/// `[user, tty, host, login time]` rows from `who`; local logins have an empty host
pub fn parse_who(output: &str) -> Vec<[String; 4]> {
    output.lines()
        .filter_map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() < 4 {
                return None;
            }
            let host = cols.iter()
                .find(|c| c.starts_with('('))
                .map(|c| c.trim_matches(|ch| ch == '(' || ch == ')').to_string())
                .unwrap_or_default();
            Some([
                cols[0].to_string(),
                cols[1].to_string(),
                host,
                format!("{} {}", cols[2], cols[3]),
            ])
        })
        .collect()
}

/// Connection counts per remote address and state from `ss -tun`, busiest first
pub fn parse_ss(output: &str) -> Vec<(u64, String, String)> {
    let mut counts: HashMap<(String, String), u64> = HashMap::new();
    for line in output.lines().skip(1) {
        let cols: Vec<&str> = line.split_whitespace().collect();
        if cols.len() < 6 {
            continue;
        }
        let state = cols[1].to_string();
        let peer = cols[5];
        let host = peer.rsplit_once(':').map(|(h, _)| h).unwrap_or(peer);
        let host = host.trim_start_matches('[').trim_end_matches(']');
        *counts.entry((host.to_string(), state)).or_insert(0) += 1;
    }

    let mut rows: Vec<(u64, String, String)> = counts.into_iter()
        .map(|((host, state), n)| (n, host, state))
        .collect();
    rows.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    rows
}

/// Same layout Python's timedelta prints: `2 days, 3:04:05`
pub fn format_uptime(secs: u64) -> String {
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    let clock = format!("{}:{:02}:{:02}", hours, minutes, seconds);
    match days {
        0 => clock,
        1 => format!("1 day, {}", clock),
        n => format!("{} days, {}", n, clock),
    }
}

/// df -h style size: 1024-based, one decimal below 10
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["B", "K", "M", "G", "T", "P"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{}B", bytes)
    } else if value < 10.0 {
        format!("{:.1}{}", value, UNITS[unit])
    } else {
        format!("{:.0}{}", value, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MEMINFO: &str = "\
MemTotal:        8192000 kB
MemFree:         2048000 kB
MemAvailable:    4096000 kB
Buffers:          102400 kB
Cached:          1024000 kB
SwapCached:            0 kB
";

    #[test]
    fn meminfo_breakdown_in_mib() {
        let mem = parse_meminfo(MEMINFO).unwrap();
        assert_eq!(mem.free, 2000);
        assert_eq!(mem.buffers, 100);
        assert_eq!(mem.cached, 1000);
        assert_eq!(mem.used, 4900);
    }

    #[test]
    fn meminfo_without_totals_is_an_error() {
        assert!(parse_meminfo("Buffers: 10 kB\n").is_err());
    }

    const DISKSTATS: &str = "\
   7       0 loop0 50 0 400 10 0 0 0 0 0 20 10 0 0 0 0
   8       0 sda 1200 30 96000 500 800 40 64000 900 0 1000 1400 0 0 0 0
   8       1 sda1 1100 30 90000 450 790 40 63000 880 0 950 1330 0 0 0 0
 259       0 nvme0n1 10 0 80 1 5 0 40 1 0 2 2 0 0 0 0
";

    #[test]
    fn diskstats_sector_columns() {
        let stats = parse_diskstats(DISKSTATS);
        assert_eq!(stats.len(), 4);
        assert_eq!(stats[1], DiskCounters {
            device: "sda".into(),
            sectors_read: 96000,
            sectors_written: 64000,
        });
    }

    #[test]
    fn picks_first_physical_whole_disk() {
        let stats = parse_diskstats(DISKSTATS);
        let whole = |name: &str| !name.ends_with('1') || name.starts_with("nvme");
        assert_eq!(pick_disk(&stats, None, whole).unwrap().device, "sda");
        assert_eq!(pick_disk(&stats, Some("nvme0n1"), whole).unwrap().sectors_written, 40);
        assert!(pick_disk(&stats, Some("sdz"), whole).is_none());
    }

    #[test]
    fn ip_json_rows_skip_loopback_and_ipv6() {
        let json = r#"[
            {"ifname":"lo","addr_info":[{"family":"inet","local":"127.0.0.1"}]},
            {"ifname":"eth0","addr_info":[
                {"family":"inet","local":"10.0.0.5"},
                {"family":"inet6","local":"fe80::1"}
            ]}
        ]"#;
        let rows = parse_ip_addr_json(json).unwrap();
        assert_eq!(rows, vec![["eth0".to_string(), "10.0.0.5".to_string()]]);
        assert!(parse_ip_addr_json("nope").is_err());
    }

    #[test]
    fn who_rows() {
        let out = "alice    pts/0        2024-03-01 09:15 (192.168.1.20)\nbob      tty1         2024-03-01 08:00\n";
        let rows = parse_who(out);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], [
            "alice".to_string(),
            "pts/0".to_string(),
            "192.168.1.20".to_string(),
            "2024-03-01 09:15".to_string(),
        ]);
        assert_eq!(rows[1][2], "");
        assert_eq!(rows[1][3], "2024-03-01 08:00");
    }

    #[test]
    fn ss_counts_by_peer_and_state() {
        let out = "\
Netid State Recv-Q Send-Q Local Address:Port Peer Address:Port
tcp   ESTAB 0      0      10.0.0.5:22        10.0.0.9:50122
tcp   ESTAB 0      0      10.0.0.5:22        10.0.0.9:50123
tcp   ESTAB 0      0      10.0.0.5:443       [2001:db8::2]:40000
udp   UNCONN 0     0      0.0.0.0:68         0.0.0.0:*
";
        let rows = parse_ss(out);
        assert_eq!(rows[0], (2, "10.0.0.9".to_string(), "ESTAB".to_string()));
        assert!(rows.contains(&(1, "2001:db8::2".to_string(), "ESTAB".to_string())));
        assert!(rows.contains(&(1, "0.0.0.0".to_string(), "UNCONN".to_string())));
    }

    #[test]
    fn uptime_like_timedelta() {
        assert_eq!(format_uptime(59), "0:00:59");
        assert_eq!(format_uptime(86_400 + 3_725), "1 day, 1:02:05");
        assert_eq!(format_uptime(3 * 86_400), "3 days, 0:00:00");
    }

    #[test]
    fn human_sizes() {
        assert_eq!(human_size(512), "512B");
        assert_eq!(human_size(1536), "1.5K");
        assert_eq!(human_size(20 * 1024 * 1024 * 1024), "20G");
    }
}
