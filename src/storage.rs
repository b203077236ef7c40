use crate::config::StorageConfig;
use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// One possible recording destination, captured at selection time.
///
/// Candidates are rebuilt on every selection call and never cached;
/// media can be pulled or filled between any two checks.
#[derive(Debug, Clone)]
pub struct StorageCandidate {
    pub mount_path: PathBuf,
    pub free_bytes: u64,
}

impl StorageCandidate {
    pub fn free_gb(&self) -> f64 {
        self.free_bytes as f64 / 1e9
    }
}

/// Read-only free-space query, separated so tests can control the numbers.
pub trait FreeSpaceProbe: Send + Sync {
    /// Free bytes available to unprivileged writers at `path`; 0 when the
    /// path is gone or the query fails.
    fn free_bytes(&self, path: &Path) -> u64;
}

/// Live filesystem statistics via statvfs.
pub struct StatvfsProbe;

impl FreeSpaceProbe for StatvfsProbe {
    fn free_bytes(&self, path: &Path) -> u64 {
        let Ok(c_path) = CString::new(path.as_os_str().as_bytes()) else {
            return 0;
        };

        let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
        let result = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };

        if result == 0 {
            stat.f_bavail as u64 * stat.f_frsize as u64
        } else {
            0
        }
    }
}

/// Picks a recording destination among removable media mounts, falling
/// back to the home directory when no stick qualifies.
pub struct StorageSelector {
    media_root: PathBuf,
    home_dir: PathBuf,
    probe: Box<dyn FreeSpaceProbe>,
}

impl StorageSelector {
    pub fn new(media_root: impl Into<PathBuf>, home_dir: impl Into<PathBuf>) -> Self {
        Self::with_probe(media_root, home_dir, Box::new(StatvfsProbe))
    }

    pub fn with_probe(
        media_root: impl Into<PathBuf>,
        home_dir: impl Into<PathBuf>,
        probe: Box<dyn FreeSpaceProbe>,
    ) -> Self {
        Self {
            media_root: media_root.into(),
            home_dir: home_dir.into(),
            probe,
        }
    }

    /// Build a selector from configuration, resolving empty paths to the
    /// OS conventions: /media/<user> and $HOME.
    pub fn from_config(config: &StorageConfig) -> Self {
        let home_dir = if config.home_dir.is_empty() {
            default_home_dir()
        } else {
            PathBuf::from(&config.home_dir)
        };

        let media_root = if config.media_root.is_empty() {
            PathBuf::from("/media").join(current_username(&home_dir))
        } else {
            PathBuf::from(&config.media_root)
        };

        debug!(
            "Storage selector watching {} with fallback {}",
            media_root.display(),
            home_dir.display()
        );

        Self::new(media_root, home_dir)
    }

    pub fn media_root(&self) -> &Path {
        &self.media_root
    }

    pub fn home_dir(&self) -> &Path {
        &self.home_dir
    }

    /// Enumerate removable media mounts, sorted by name so selection
    /// order is reproducible across boots. A missing or unreadable media
    /// root is zero candidates, not an error.
    pub fn candidates(&self) -> Vec<StorageCandidate> {
        let entries = match std::fs::read_dir(&self.media_root) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(
                    "Media root {} not readable ({}), no removable candidates",
                    self.media_root.display(),
                    e
                );
                return Vec::new();
            }
        };

        let mut candidates: Vec<StorageCandidate> = entries
            .flatten()
            .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .map(|entry| {
                let mount_path = entry.path();
                let free_bytes = self.probe.free_bytes(&mount_path);
                StorageCandidate {
                    mount_path,
                    free_bytes,
                }
            })
            .collect();

        candidates.sort_by(|a, b| a.mount_path.cmp(&b.mount_path));
        candidates
    }

    /// Pick the destination for the next segment.
    ///
    /// Scans removable mounts in name order and takes the first with at
    /// least `required_gb` free. When none qualifies the home directory
    /// is considered, but it must additionally keep `reserved_home_gb`
    /// of headroom for the OS. `None` means recording does not start
    /// this cycle; the caller retries on its next tick.
    pub fn select(&self, required_gb: f64, reserved_home_gb: f64) -> Option<PathBuf> {
        let candidates = self.candidates();
        debug!(
            "Scanning {} removable candidate(s) for {:.2} GB",
            candidates.len(),
            required_gb
        );

        for candidate in &candidates {
            if candidate.free_gb() >= required_gb {
                info!(
                    "Selected removable destination {} ({:.2} GB free)",
                    candidate.mount_path.display(),
                    candidate.free_gb()
                );
                return Some(candidate.mount_path.clone());
            }
            debug!(
                "Skipping {} ({:.2} GB free)",
                candidate.mount_path.display(),
                candidate.free_gb()
            );
        }

        let home_free_gb = self.free_gb(&self.home_dir);
        if home_free_gb >= required_gb + reserved_home_gb {
            info!(
                "Falling back to home directory {} ({:.2} GB free)",
                self.home_dir.display(),
                home_free_gb
            );
            return Some(self.home_dir.clone());
        }

        warn!(
            "No destination meets the free-space requirement ({:.2} GB, home has {:.2} GB)",
            required_gb, home_free_gb
        );
        None
    }

    /// Free space at `path` in GB; 0 when the path has vanished.
    pub fn free_gb(&self, path: &Path) -> f64 {
        self.probe.free_bytes(path) as f64 / 1e9
    }
}

fn default_home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/home"))
}

fn current_username(home_dir: &Path) -> String {
    if let Ok(user) = std::env::var("USER") {
        if !user.is_empty() {
            return user;
        }
    }

    home_dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "root".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    /// Probe with scripted per-path free space; unknown paths read as gone.
    struct FixedProbe {
        spaces: HashMap<PathBuf, u64>,
    }

    impl FixedProbe {
        fn new(spaces: &[(&Path, f64)]) -> Box<Self> {
            Box::new(Self {
                spaces: spaces
                    .iter()
                    .map(|(path, gb)| (path.to_path_buf(), (gb * 1e9) as u64))
                    .collect(),
            })
        }
    }

    impl FreeSpaceProbe for FixedProbe {
        fn free_bytes(&self, path: &Path) -> u64 {
            self.spaces.get(path).copied().unwrap_or(0)
        }
    }

    fn media_with_mounts(names: &[&str]) -> (TempDir, Vec<PathBuf>) {
        let root = TempDir::new().unwrap();
        let paths = names
            .iter()
            .map(|name| {
                let path = root.path().join(name);
                std::fs::create_dir(&path).unwrap();
                path
            })
            .collect();
        (root, paths)
    }

    #[test]
    fn test_selects_first_sufficient_by_name() {
        // Created in reverse order on purpose; sort order must win.
        let (root, paths) = media_with_mounts(&["B", "A"]);
        let home = TempDir::new().unwrap();

        let probe = FixedProbe::new(&[(&paths[0], 0.1), (&paths[1], 10.0)]);
        let selector = StorageSelector::with_probe(root.path(), home.path(), probe);

        let selected = selector.select(1.0, 5.0).unwrap();
        assert_eq!(selected, paths[1]);
        assert!(selected.ends_with("A"));
    }

    #[test]
    fn test_name_order_beats_free_space() {
        let (root, paths) = media_with_mounts(&["B", "A"]);
        let home = TempDir::new().unwrap();

        // Both qualify; B has far more space but A sorts first.
        let probe = FixedProbe::new(&[(&paths[0], 100.0), (&paths[1], 2.0)]);
        let selector = StorageSelector::with_probe(root.path(), home.path(), probe);

        assert!(selector.select(1.0, 5.0).unwrap().ends_with("A"));
    }

    #[test]
    fn test_home_requires_reserved_headroom() {
        let (root, _paths) = media_with_mounts(&[]);
        let home = TempDir::new().unwrap();

        // Home has exactly the required amount and nothing more.
        let probe = FixedProbe::new(&[(home.path(), 1.0)]);
        let selector = StorageSelector::with_probe(root.path(), home.path(), probe);
        assert!(selector.select(1.0, 5.0).is_none());

        let probe = FixedProbe::new(&[(home.path(), 1.0)]);
        let selector = StorageSelector::with_probe(root.path(), home.path(), probe);
        assert_eq!(selector.select(1.0, 0.0), Some(home.path().to_path_buf()));
    }

    #[test]
    fn test_missing_media_root_falls_back_to_home() {
        let home = TempDir::new().unwrap();
        let probe = FixedProbe::new(&[(home.path(), 50.0)]);
        let selector =
            StorageSelector::with_probe("/nonexistent/media/nobody", home.path(), probe);

        assert_eq!(selector.select(1.0, 5.0), Some(home.path().to_path_buf()));
    }

    #[test]
    fn test_insufficient_everywhere_returns_none() {
        let (root, paths) = media_with_mounts(&["stick"]);
        let home = TempDir::new().unwrap();

        let probe = FixedProbe::new(&[(&paths[0], 0.05), (home.path(), 0.5)]);
        let selector = StorageSelector::with_probe(root.path(), home.path(), probe);

        assert!(selector.select(1.0, 5.0).is_none());
    }

    #[test]
    fn test_vanished_candidate_reads_as_zero() {
        let (root, paths) = media_with_mounts(&["gone", "ok"]);
        let home = TempDir::new().unwrap();

        // "gone" is absent from the probe, as if unplugged mid-scan.
        let probe = FixedProbe::new(&[(&paths[1], 10.0)]);
        let selector = StorageSelector::with_probe(root.path(), home.path(), probe);

        assert!(selector.select(1.0, 5.0).unwrap().ends_with("ok"));
    }

    #[test]
    fn test_statvfs_probe_live_paths() {
        let dir = TempDir::new().unwrap();
        let probe = StatvfsProbe;

        assert!(probe.free_bytes(dir.path()) > 0);
        assert_eq!(probe.free_bytes(Path::new("/nonexistent/fieldcam/path")), 0);
    }

    #[test]
    fn test_candidates_sorted_and_dirs_only() {
        let (root, _paths) = media_with_mounts(&["delta", "alpha", "charlie"]);
        std::fs::write(root.path().join("not-a-mount.txt"), b"x").unwrap();

        let home = TempDir::new().unwrap();
        let selector = StorageSelector::new(root.path(), home.path());

        let names: Vec<String> = selector
            .candidates()
            .iter()
            .map(|c| {
                c.mount_path
                    .file_name()
                    .unwrap()
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();
        assert_eq!(names, vec!["alpha", "charlie", "delta"]);
    }
}
