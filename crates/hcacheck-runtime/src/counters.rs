//! Concurrent port counter collection.
//!
//! Each counter family is a directory of small files, one value per file.
//! Families are read by independent blocking tasks; the coordinator merges
//! each partial map into its own result as soon as the task completes.

use std::path::{Path, PathBuf};

use hcacheck_core::CounterMap;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::host::{HostPaths, list_dir, read_attr};

/// A directory of counter files under `ports/1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterFamily {
    /// IB port counters (`counters/`).
    Basic,
    /// Driver-specific counters (`hw_counters/`).
    Extended,
}

impl CounterFamily {
    pub const ALL: [Self; 2] = [Self::Basic, Self::Extended];

    pub const fn dir_name(self) -> &'static str {
        match self {
            Self::Basic => "counters",
            Self::Extended => "hw_counters",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CounterCollector {
    paths: HostPaths,
}

impl CounterCollector {
    pub const fn new(paths: HostPaths) -> Self {
        Self { paths }
    }

    fn family_dir(&self, ib_dev: &str, family: CounterFamily) -> PathBuf {
        self.paths
            .ib_dev(ib_dev)
            .join("ports/1")
            .join(family.dir_name())
    }

    /// Union of every readable counter of `ib_dev`.
    ///
    /// A family that cannot be read is logged and contributes nothing.
    pub async fn collect(&self, ib_dev: &str) -> CounterMap {
        let mut merged = CounterMap::new();
        let mut workers = JoinSet::new();
        for family in CounterFamily::ALL {
            let dir = self.family_dir(ib_dev, family);
            workers.spawn_blocking(move || (family, read_family(&dir)));
        }

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((family, Ok(partial))) => {
                    debug!(%ib_dev, family = family.dir_name(), count = partial.len(), "counters read");
                    for (name, value) in partial {
                        merged.entry(name).or_insert(value);
                    }
                }
                Ok((family, Err(e))) => {
                    warn!(%ib_dev, family = family.dir_name(), error = %e, "failed to read counters");
                }
                Err(e) => warn!(%ib_dev, error = %e, "counter task failed"),
            }
        }

        merged
    }
}

/// Read every counter file in `dir`. Files that do not hold an integer are skipped.
fn read_family(dir: &Path) -> std::io::Result<CounterMap> {
    let mut partial = CounterMap::new();
    for name in list_dir(dir)? {
        let path = dir.join(&name);
        match read_attr(&path).map(|text| text.parse::<u64>()) {
            Ok(Ok(value)) => {
                partial.insert(name, value);
            }
            Ok(Err(e)) => debug!(counter = %name, error = %e, "not a counter value"),
            Err(e) => debug!(counter = %name, error = %e, "unreadable counter"),
        }
    }
    Ok(partial)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::fake::FakeHost;
    use std::sync::Arc;

    const PORT: &str = "sys/class/infiniband/mlx5_0/ports/1";

    fn host_with_counters(basic: usize, extended: usize) -> FakeHost {
        let host = FakeHost::new();
        for i in 0..basic {
            host.write(&format!("{PORT}/counters/port_counter_{i}"), &format!("{i}\n"));
        }
        for i in 0..extended {
            host.write(&format!("{PORT}/hw_counters/hw_counter_{i}"), &format!("{}\n", i * 10));
        }
        host
    }

    #[tokio::test]
    async fn test_merges_both_families() {
        let host = host_with_counters(3, 2);
        let counters = CounterCollector::new(host.paths()).collect("mlx5_0").await;
        assert_eq!(counters.len(), 5);
        assert_eq!(counters["port_counter_2"], 2);
        assert_eq!(counters["hw_counter_1"], 10);
    }

    #[tokio::test]
    async fn test_missing_family_gives_partial_result() {
        let host = host_with_counters(4, 0);
        let counters = CounterCollector::new(host.paths()).collect("mlx5_0").await;
        assert_eq!(counters.len(), 4);
    }

    #[tokio::test]
    async fn test_non_numeric_files_skipped() {
        let host = host_with_counters(1, 1);
        host.write(&format!("{PORT}/hw_counters/lifespan"), "oops\n");
        let counters = CounterCollector::new(host.paths()).collect("mlx5_0").await;
        assert_eq!(counters.len(), 2);
        assert!(!counters.contains_key("lifespan"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_collections_are_complete() {
        let host = host_with_counters(64, 64);
        let collector = Arc::new(CounterCollector::new(host.paths()));

        let mut runs = JoinSet::new();
        for _ in 0..8 {
            let collector = Arc::clone(&collector);
            runs.spawn(async move { collector.collect("mlx5_0").await });
        }
        while let Some(counters) = runs.join_next().await {
            assert_eq!(counters.unwrap().len(), 128);
        }
    }
}
