//! `/proc` lookups used to label and size the entities found in the tables
//!
//! Nothing here runs on the event path: these helpers are used by readers
//! after a window closes.

use anyhow::{anyhow, Context, Result};
use log::debug;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::PathBuf;

/// procfs mount point
const PROC_ROOT: &str = "/proc";

/// Page size used when the platform cannot report one
const FALLBACK_PAGE_SIZE: u64 = 4096;

/// Reads process metadata from a procfs tree
#[derive(Debug, Clone)]
pub struct ProcFs {
    root: PathBuf,
}

impl ProcFs {
    /// Create a reader over the host `/proc`
    pub fn new() -> Self {
        Self {
            root: PathBuf::from(PROC_ROOT),
        }
    }

    /// Create a reader over a custom root (for testing)
    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    /// Task name for `pid`, memoized in `cache`.
    ///
    /// pid 0 is reported as `idle`. A missing or blank `comm` file yields
    /// `pid-<pid>`, which is cached as well so each pid is read at most once.
    pub fn comm_for_pid(&self, pid: u32, cache: &mut HashMap<u32, String>) -> String {
        if pid == 0 {
            return "idle".to_string();
        }
        if let Some(name) = cache.get(&pid) {
            return name.clone();
        }

        let path = self.root.join(pid.to_string()).join("comm");
        let name = match fs::read_to_string(&path) {
            Ok(data) => {
                let comm = data.trim();
                if comm.is_empty() {
                    format!("pid-{}", pid)
                } else {
                    comm.to_string()
                }
            }
            Err(e) => {
                debug!("Could not read {}: {}", path.display(), e);
                format!("pid-{}", pid)
            }
        };

        cache.insert(pid, name.clone());
        name
    }

    /// Resident set size of `pid` in bytes, from `statm`.
    pub fn rss_bytes(&self, pid: u32) -> Result<u64> {
        if pid == 0 {
            return Err(anyhow!("invalid pid {}", pid));
        }

        let path = self.root.join(pid.to_string()).join("statm");
        let data = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let rss_pages: u64 = data
            .split_whitespace()
            .nth(1)
            .ok_or_else(|| anyhow!("unexpected statm format for pid {}", pid))?
            .parse()
            .context(format!("Invalid resident page count for pid {}", pid))?;

        rss_pages
            .checked_mul(page_size())
            .ok_or_else(|| anyhow!("page count overflows for pid {}", pid))
    }

    /// RSS for every distinct non-zero pid that can be read.
    pub fn rss_for_pids(&self, pids: &[u32]) -> HashMap<u32, u64> {
        let mut seen = HashSet::with_capacity(pids.len());
        let mut result = HashMap::with_capacity(pids.len());

        for &pid in pids {
            if pid == 0 || !seen.insert(pid) {
                continue;
            }
            match self.rss_bytes(pid) {
                Ok(rss) => {
                    result.insert(pid, rss);
                }
                Err(e) => debug!("Skipping RSS for pid {}: {}", pid, e),
            }
        }

        result
    }

    /// Total system memory in bytes, from `MemTotal` in `meminfo`.
    pub fn total_memory_bytes(&self) -> Result<u64> {
        let path = self.root.join("meminfo");
        let data = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        for line in data.lines() {
            if let Some(rest) = line.strip_prefix("MemTotal:") {
                let kb: u64 = rest
                    .split_whitespace()
                    .next()
                    .ok_or_else(|| anyhow!("unexpected format for MemTotal"))?
                    .parse()
                    .context("Invalid MemTotal value")?;
                return kb
                    .checked_mul(1024)
                    .ok_or_else(|| anyhow!("MemTotal of {} kB overflows", kb));
            }
        }

        Err(anyhow!("MemTotal not found in {}", path.display()))
    }
}

impl Default for ProcFs {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
fn page_size() -> u64 {
    // SAFETY: sysconf has no preconditions
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as u64
    } else {
        FALLBACK_PAGE_SIZE
    }
}

#[cfg(not(unix))]
fn page_size() -> u64 {
    FALLBACK_PAGE_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &TempDir, rel: &str, contents: &str) {
        let path = root.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create fixture dir");
        }
        fs::write(path, contents).expect("write fixture");
    }

    #[test]
    fn test_comm_for_pid_trims_and_caches() {
        let root = TempDir::new().expect("tempdir");
        write(&root, "42/comm", "db\n");
        let procfs = ProcFs::with_root(root.path().to_path_buf());
        let mut cache = HashMap::new();

        assert_eq!(procfs.comm_for_pid(42, &mut cache), "db");

        // Served from cache even after the file changes.
        write(&root, "42/comm", "renamed\n");
        assert_eq!(procfs.comm_for_pid(42, &mut cache), "db");
    }

    #[test]
    fn test_comm_for_pid_fallbacks() {
        let root = TempDir::new().expect("tempdir");
        write(&root, "77/comm", "   \n");
        let procfs = ProcFs::with_root(root.path().to_path_buf());
        let mut cache = HashMap::new();

        assert_eq!(procfs.comm_for_pid(0, &mut cache), "idle");
        assert_eq!(procfs.comm_for_pid(77, &mut cache), "pid-77");
        assert_eq!(cache.get(&77).map(String::as_str), Some("pid-77"));
        assert_eq!(procfs.comm_for_pid(88, &mut cache), "pid-88");
    }

    #[test]
    fn test_rss_bytes_reads_resident_pages() {
        let root = TempDir::new().expect("tempdir");
        write(&root, "10/statm", "1000 250 40 1 0 300 0\n");
        let procfs = ProcFs::with_root(root.path().to_path_buf());

        assert_eq!(procfs.rss_bytes(10).expect("rss"), 250 * page_size());
        assert!(procfs.rss_bytes(0).is_err());
        assert!(procfs.rss_bytes(11).is_err());
    }

    #[test]
    fn test_rss_bytes_rejects_short_statm() {
        let root = TempDir::new().expect("tempdir");
        write(&root, "10/statm", "1000\n");
        let procfs = ProcFs::with_root(root.path().to_path_buf());

        assert!(procfs.rss_bytes(10).is_err());
    }

    #[test]
    fn test_rss_bytes_rejects_overflowing_page_count() {
        let root = TempDir::new().expect("tempdir");
        write(&root, "10/statm", &format!("1 {} 0 0 0 0 0\n", u64::MAX));
        let procfs = ProcFs::with_root(root.path().to_path_buf());

        let err = procfs.rss_bytes(10).unwrap_err();
        assert!(err.to_string().contains("overflows"));
        assert!(procfs.rss_for_pids(&[10]).is_empty());
    }

    #[test]
    fn test_rss_for_pids_skips_duplicates_and_missing() {
        let root = TempDir::new().expect("tempdir");
        write(&root, "1/statm", "10 2 0 0 0 0 0\n");
        write(&root, "2/statm", "10 3 0 0 0 0 0\n");
        let procfs = ProcFs::with_root(root.path().to_path_buf());

        let rss = procfs.rss_for_pids(&[0, 1, 1, 2, 3]);
        assert_eq!(rss.len(), 2);
        assert_eq!(rss.get(&1), Some(&(2 * page_size())));
        assert_eq!(rss.get(&2), Some(&(3 * page_size())));
    }

    #[test]
    fn test_total_memory_bytes() {
        let root = TempDir::new().expect("tempdir");
        write(
            &root,
            "meminfo",
            "MemFree:         1000 kB\nMemTotal:       16384 kB\n",
        );
        let procfs = ProcFs::with_root(root.path().to_path_buf());

        assert_eq!(procfs.total_memory_bytes().expect("meminfo"), 16384 * 1024);
    }

    #[test]
    fn test_total_memory_bytes_rejects_overflow() {
        let root = TempDir::new().expect("tempdir");
        write(&root, "meminfo", &format!("MemTotal: {} kB\n", u64::MAX / 2));
        let procfs = ProcFs::with_root(root.path().to_path_buf());

        let err = procfs.total_memory_bytes().unwrap_err();
        assert!(err.to_string().contains("overflows"));
    }

    #[test]
    fn test_total_memory_bytes_missing_field() {
        let root = TempDir::new().expect("tempdir");
        write(&root, "meminfo", "MemFree: 1 kB\n");
        let procfs = ProcFs::with_root(root.path().to_path_buf());

        assert!(procfs.total_memory_bytes().is_err());
    }
}
