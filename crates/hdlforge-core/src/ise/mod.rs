//! The Xilinx ISE toolchain backend.
//!
//! This module provides:
//! - Install discovery and version fingerprinting
//! - Tool invocation inside the ISE environment
//! - XST synthesis, FPGA implementation, and ISim simulation backends
//! - partgen-based device catalog loading

pub mod diagnostics;
pub mod implement;
pub mod partlist;
pub mod process;
pub mod simulation;
pub mod synthesis;
pub mod vector;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use crate::device::{cache, DeviceManager};
use crate::error::{Error, Result};
use crate::toolchain::{Implementor, Simulator, Synthesizer, Toolchain, ToolchainVersion};

#[cfg(windows)]
const DEFAULT_INSTALL_ROOT: &str = "C:\\Xilinx";
#[cfg(not(windows))]
const DEFAULT_INSTALL_ROOT: &str = "/opt/Xilinx";

/// One located ISE install: version identity plus the search paths
/// every tool invocation needs.
#[derive(Debug)]
pub struct IseEnv {
    pub version: ToolchainVersion,
    binary_paths: Vec<PathBuf>,
    library_paths: Vec<PathBuf>,
}

impl IseEnv {
    /// Locate an install: the `XILINX` environment variable wins,
    /// otherwise the highest version under the platform default root.
    pub fn locate() -> Result<Arc<Self>> {
        if let Some(var) = std::env::var_os("XILINX") {
            // XILINX conventionally points at <root>/ISE.
            let ise_dir = PathBuf::from(var);
            let root = ise_dir.parent().map(Path::to_path_buf).unwrap_or(ise_dir);
            return Self::from_root(root);
        }

        let default_root = PathBuf::from(DEFAULT_INSTALL_ROOT);
        let mut best: Option<(f32, PathBuf)> = None;
        for entry in fs::read_dir(&default_root).map_err(|_| {
            Error::Toolchain(
                "unable to locate an ISE install; set the XILINX variable".to_string(),
            )
        })? {
            let entry = entry?;
            let name = entry.file_name();
            let Ok(value) = name.to_string_lossy().parse::<f32>() else {
                continue;
            };
            if best.as_ref().map_or(true, |(current, _)| value > *current) {
                best = Some((value, entry.path()));
            }
        }

        let (value, mut root) = best.ok_or_else(|| {
            Error::Toolchain(
                "unable to locate an ISE install; set the XILINX variable".to_string(),
            )
        })?;
        // From 12.1 on the install nests one directory deeper.
        if value >= 12.1 {
            root = root.join("ISE_DS");
        }
        tracing::debug!("located ISE root at '{}'", root.display());
        Self::from_root(root)
    }

    /// Probe an install root: read the version from `common/fileset.txt`
    /// and resolve the platform binary/library paths.
    pub fn from_root(root: PathBuf) -> Result<Arc<Self>> {
        let (major, minor) = read_fileset_version(&root).ok_or_else(|| {
            Error::Toolchain(format!(
                "'{}' does not look like an ISE install (no version in common/fileset.txt)",
                root.display(),
            ))
        })?;
        let version = ToolchainVersion::new(root, major, minor);
        tracing::debug!("probed ISE toolchain version {}", version);

        let arch = platform_arch_dir(&version.root)?;
        let binary_paths = vec![
            version.root.join("ISE").join("bin").join(arch),
            version.root.join("EDK").join("bin").join(arch),
            version.root.join("common").join("bin").join(arch),
        ];
        let library_paths = vec![
            version.root.join("ISE").join("lib").join(arch),
            version.root.join("EDK").join("lib").join(arch),
            version.root.join("common").join("lib").join(arch),
        ];

        Ok(Arc::new(Self {
            version,
            binary_paths,
            library_paths,
        }))
    }

    /// Full path to a tool executable, searching the install's binary
    /// paths first and the system `PATH` as a fallback.
    pub fn find_tool_path(&self, tool: &str) -> Option<PathBuf> {
        let file_name = if cfg!(windows) {
            format!("{}.exe", tool)
        } else {
            tool.to_string()
        };
        for path in &self.binary_paths {
            let candidate = path.join(&file_name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        which::which(tool).ok()
    }

    /// Configure a command to run inside the ISE environment: binary
    /// paths prepended to `PATH`, library paths to `LD_LIBRARY_PATH`
    /// on Linux, and the `XILINX` variable pointing into the install.
    pub fn apply_environment(&self, command: &mut Command) {
        let mut paths = self.binary_paths.clone();
        if let Some(existing) = std::env::var_os("PATH") {
            paths.extend(std::env::split_paths(&existing));
        }
        if let Ok(joined) = std::env::join_paths(paths) {
            command.env("PATH", joined);
        }

        #[cfg(all(unix, not(target_os = "macos")))]
        {
            let mut paths = self.library_paths.clone();
            if let Some(existing) = std::env::var_os("LD_LIBRARY_PATH") {
                paths.extend(std::env::split_paths(&existing));
            }
            if let Ok(joined) = std::env::join_paths(paths) {
                command.env("LD_LIBRARY_PATH", joined);
            }
        }

        command.env("XILINX", self.version.root.join("ISE"));
    }

    pub fn library_paths(&self) -> &[PathBuf] {
        &self.library_paths
    }
}

fn read_fileset_version(root: &Path) -> Option<(u32, u32)> {
    let fileset = fs::read_to_string(root.join("common").join("fileset.txt")).ok()?;
    let version = regex::Regex::new(r"(?m)^\s*version=(\d+)\.(\d+)").ok()?;
    let captures = version.captures(&fileset)?;
    Some((captures[1].parse().ok()?, captures[2].parse().ok()?))
}

fn platform_arch_dir(root: &Path) -> Result<&'static str> {
    let candidates: &[&str] = if cfg!(windows) {
        &["nt64", "nt"]
    } else {
        &["lin64", "lin"]
    };
    for arch in candidates {
        if root.join("ISE").join("bin").join(arch).is_dir() {
            return Ok(arch);
        }
    }
    Err(Error::Toolchain(format!(
        "ISE install at '{}' does not support this platform",
        root.display(),
    )))
}

/// The ISE toolchain: one XST synthesizer, one FPGA implementor, one
/// ISim simulator.
pub struct IseToolchain {
    env: Arc<IseEnv>,
    synthesizers: Vec<Box<dyn Synthesizer>>,
    implementors: Vec<Box<dyn Implementor>>,
    simulators: Vec<Box<dyn Simulator>>,
}

impl IseToolchain {
    pub fn new(env: Arc<IseEnv>) -> Self {
        let synthesizers: Vec<Box<dyn Synthesizer>> =
            vec![Box::new(synthesis::XstSynthesizer::new(Arc::clone(&env)))];
        let implementors: Vec<Box<dyn Implementor>> =
            vec![Box::new(implement::FpgaImplementor::new(Arc::clone(&env)))];
        let simulators: Vec<Box<dyn Simulator>> =
            vec![Box::new(simulation::IsimSimulator::new(Arc::clone(&env)))];
        Self {
            env,
            synthesizers,
            implementors,
            simulators,
        }
    }

    pub fn env(&self) -> &Arc<IseEnv> {
        &self.env
    }

    /// Merge this toolchain's device data into the catalog, using the
    /// on-disk cache when it is valid for this install.
    ///
    /// A toolchain already recorded in the catalog is skipped without
    /// touching the tool.
    pub fn load_devices(&self, manager: &mut DeviceManager, cache_dir: &Path) -> Result<()> {
        let id = self.env.version.unique_id.clone();
        if manager.has_cached_toolchain(&id) {
            tracing::debug!("device catalog already contains toolchain {}", id);
            return Ok(());
        }

        let cache_file = cache_dir.join(format!("devices-{}.xml", id));
        // The cache can only stand in for the whole catalog; once other
        // toolchains have merged data in memory, fall through to a live
        // query rather than discard them.
        if cache_file.is_file() && manager.manufactures.is_empty() {
            let cached = cache::load(&cache_file)?;
            if cached.has_cached_toolchain(&id) {
                tracing::debug!("loaded device catalog for toolchain {} from cache", id);
                *manager = cached;
                return Ok(());
            }
        }

        tracing::info!(
            "loading ISE {} part library (this may take several minutes)",
            self.env.version,
        );
        manager.note_cached_toolchain(&id);
        partlist::load_catalog(&self.env, manager)?;
        cache::save(&cache_file, manager)?;
        Ok(())
    }
}

impl Toolchain for IseToolchain {
    fn version(&self) -> &ToolchainVersion {
        &self.env.version
    }

    fn synthesizers(&self) -> &[Box<dyn Synthesizer>] {
        &self.synthesizers
    }

    fn implementors(&self) -> &[Box<dyn Implementor>] {
        &self.implementors
    }

    fn simulators(&self) -> &[Box<dyn Simulator>] {
        &self.simulators
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fake_install(root: &Path, version: &str) {
        fs::create_dir_all(root.join("common")).expect("common dir");
        fs::write(
            root.join("common").join("fileset.txt"),
            format!("fileset\n  version={}\n", version),
        )
        .expect("fileset");
        let arch = if cfg!(windows) { "nt64" } else { "lin64" };
        fs::create_dir_all(root.join("ISE").join("bin").join(arch)).expect("bin dir");
        fs::create_dir_all(root.join("ISE").join("lib").join(arch)).expect("lib dir");
    }

    #[test]
    fn probes_version_from_fileset() {
        let temp = TempDir::new().expect("temp dir");
        fake_install(temp.path(), "13.2");

        let env = IseEnv::from_root(temp.path().to_path_buf()).expect("probe");
        assert_eq!(env.version.major, 13);
        assert_eq!(env.version.minor, 2);
        assert!(!env.version.unique_id.is_empty());
    }

    #[test]
    fn rejects_root_without_fileset() {
        let temp = TempDir::new().expect("temp dir");
        let err = IseEnv::from_root(temp.path().to_path_buf()).expect_err("must fail");
        assert!(matches!(err, Error::Toolchain(_)));
    }

    #[test]
    fn toolchain_exposes_one_backend_of_each_kind() {
        let temp = TempDir::new().expect("temp dir");
        fake_install(temp.path(), "13.2");
        let env = IseEnv::from_root(temp.path().to_path_buf()).expect("probe");

        let toolchain = IseToolchain::new(env);
        assert_eq!(toolchain.synthesizers().len(), 1);
        assert_eq!(toolchain.implementors().len(), 1);
        assert_eq!(toolchain.simulators().len(), 1);
    }
}
