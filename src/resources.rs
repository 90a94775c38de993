//! Device memory and storage introspection.

use std::path::PathBuf;

use tracing::debug;

/// What the host device can spare for the index and its cache.
pub trait DeviceResources: Send + Sync {
    /// Memory, in bytes, the application may use in total.
    fn total_available_memory(&self) -> u64;

    /// Free space, in bytes, on the volume holding the search indexes.
    fn free_disk_space(&self) -> u64;
}

/// Resources of the machine the process runs on.
///
/// Free space is read from the filesystem holding `data_dir`; memory comes
/// from configuration since the host application knows its own budget best.
#[derive(Debug, Clone)]
pub struct HostResources {
    data_dir: PathBuf,
    memory: u64,
}

impl HostResources {
    pub fn new(data_dir: impl Into<PathBuf>, memory: u64) -> Self {
        Self {
            data_dir: data_dir.into(),
            memory,
        }
    }
}

impl DeviceResources for HostResources {
    fn total_available_memory(&self) -> u64 {
        self.memory
    }

    fn free_disk_space(&self) -> u64 {
        // The data directory may not exist yet; measure the nearest ancestor.
        let mut dir = self.data_dir.as_path();
        loop {
            match fs2::available_space(dir) {
                Ok(space) => return space,
                Err(e) => match dir.parent() {
                    Some(parent) => dir = parent,
                    None => {
                        debug!(path = %self.data_dir.display(), error = %e, "Cannot query free space");
                        return 0;
                    }
                },
            }
        }
    }
}

/// Fixed numbers, for tests and for hosts that compute their own budget.
#[derive(Debug, Clone, Copy)]
pub struct FixedResources {
    pub memory: u64,
    pub disk: u64,
}

impl DeviceResources for FixedResources {
    fn total_available_memory(&self) -> u64 {
        self.memory
    }

    fn free_disk_space(&self) -> u64 {
        self.disk
    }
}
