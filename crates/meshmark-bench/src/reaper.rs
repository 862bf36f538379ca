//! Port reclamation
//!
//! Finds the OS process currently bound to a local port and terminates it,
//! so the port can be rebound before a failed node is retried. Socket
//! ownership is resolved through `/proc` on Linux; the kill itself goes
//! through sysinfo.

use crate::Result;
use sysinfo::{Pid, System};

/// Terminate whatever process is bound locally to `port`
///
/// Returns the pid that was signalled, or `None` when nothing is bound.
/// The harness's own process is never signalled.
pub fn reap_port(port: u16) -> Result<Option<u32>> {
    let Some(inode) = socket_inode_for_port(port)? else {
        println!("No process using port {} found.", port);
        return Ok(None);
    };
    let Some(pid) = pid_owning_socket(inode)? else {
        println!("No process using port {} found.", port);
        return Ok(None);
    };

    if pid == std::process::id() {
        tracing::warn!("port {} is bound by this process, not terminating it", port);
        return Ok(None);
    }

    let system = System::new_all();
    match system.process(Pid::from_u32(pid)) {
        Some(process) => {
            process.kill();
            println!("Process using port {} terminated.", port);
            Ok(Some(pid))
        }
        None => {
            println!("No process using port {} found.", port);
            Ok(None)
        }
    }
}

/// Find the inode of a socket bound locally to `port`
#[cfg(target_os = "linux")]
fn socket_inode_for_port(port: u16) -> Result<Option<u64>> {
    const TABLES: [&str; 4] = [
        "/proc/net/udp",
        "/proc/net/udp6",
        "/proc/net/tcp",
        "/proc/net/tcp6",
    ];

    for table in TABLES {
        let Ok(content) = std::fs::read_to_string(table) else {
            continue;
        };
        for line in content.lines().skip(1) {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 10 {
                continue;
            }
            // local_address is "ADDR:PORT" with both parts in hex
            let Some((_, port_hex)) = fields[1].split_once(':') else {
                continue;
            };
            let Ok(local_port) = u16::from_str_radix(port_hex, 16) else {
                continue;
            };
            if local_port != port {
                continue;
            }
            if let Ok(inode) = fields[9].parse::<u64>() {
                return Ok(Some(inode));
            }
        }
    }
    Ok(None)
}

/// Walk `/proc/<pid>/fd` tables looking for the process holding a socket inode
#[cfg(target_os = "linux")]
fn pid_owning_socket(inode: u64) -> Result<Option<u32>> {
    let target = format!("socket:[{}]", inode);

    for entry in std::fs::read_dir("/proc")?.flatten() {
        let name = entry.file_name();
        let Some(pid) = name.to_str().and_then(|s| s.parse::<u32>().ok()) else {
            continue;
        };
        let Ok(fds) = std::fs::read_dir(entry.path().join("fd")) else {
            continue;
        };
        for fd in fds.flatten() {
            if let Ok(link) = std::fs::read_link(fd.path()) {
                if link.to_string_lossy() == target {
                    return Ok(Some(pid));
                }
            }
        }
    }
    Ok(None)
}

#[cfg(not(target_os = "linux"))]
fn socket_inode_for_port(port: u16) -> Result<Option<u64>> {
    tracing::debug!("socket enumeration not supported on this platform (port {})", port);
    Ok(None)
}

#[cfg(not(target_os = "linux"))]
fn pid_owning_socket(_inode: u64) -> Result<Option<u32>> {
    Ok(None)
}
