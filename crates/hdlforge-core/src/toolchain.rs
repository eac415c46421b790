//! The toolchain capability model.
//!
//! A toolchain exposes zero-or-more synthesizer, implementor, and
//! simulator backends. Callers pick the first available backend of the
//! needed kind; there is no cost-based negotiation. Each backend, given
//! an output location and a configuration, yields a stateful build
//! instance scoped to that location.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use crate::device::{DeviceManager, TargetPart};
use crate::error::Result;
use crate::paths::OutputPath;
use crate::repository::{ModuleId, Repository};

/// Identity of one installed toolchain version.
///
/// The unique id fingerprints the version, the install path, and the
/// install timestamp, so two installs of the same version do not
/// collide and an upgraded install invalidates cached data.
#[derive(Debug, Clone)]
pub struct ToolchainVersion {
    pub root: PathBuf,
    pub major: u32,
    pub minor: u32,
    pub unique_id: String,
}

impl ToolchainVersion {
    pub fn new(root: PathBuf, major: u32, minor: u32) -> Self {
        let unique_id = fingerprint(&root, major, minor);
        Self {
            root,
            major,
            minor,
            unique_id,
        }
    }
}

impl std::fmt::Display for ToolchainVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{} [{}]", self.major, self.minor, self.unique_id)
    }
}

/// Hash of version + path + install timestamp.
fn fingerprint(root: &Path, major: u32, minor: u32) -> String {
    let created = std::fs::metadata(root)
        .and_then(|meta| meta.created().or_else(|_| meta.modified()))
        .ok()
        .and_then(|time| time.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|duration| duration.as_secs())
        .unwrap_or(0);

    let mut hasher = DefaultHasher::new();
    format!("{}.{} at '{}', {}", major, minor, root.display(), created).hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

/// Synthesis input: one module plus the device it targets.
#[derive(Debug, Clone)]
pub struct SynthesisConfig {
    pub module: ModuleId,
    pub device: TargetPart,
}

/// Implementation input: a netlist, optional constraints, and the
/// device it targets.
#[derive(Debug, Clone)]
pub struct ImplementationConfig {
    pub netlist: PathBuf,
    pub constraints: Option<PathBuf>,
    pub device: TargetPart,
}

/// Simulation input: a module set and the top-level module to elaborate.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub modules: Vec<ModuleId>,
    pub top: ModuleId,
}

/// A stateful synthesis run scoped to one output location.
pub trait SynthesizerInstance {
    /// Run the synthesis flow. `Ok(false)` is a stage failure; `Err` is
    /// reserved for missing inputs and environment problems.
    fn build(&mut self, repo: &mut Repository) -> Result<bool>;
}

/// A stateful implementation run scoped to one output location.
pub trait ImplementorInstance {
    /// Run translate (when needed), map, and place-and-route. The first
    /// failing stage aborts the rest.
    fn build(&mut self) -> Result<bool>;

    /// Follow-on: generate the configuration bitstream from the routed
    /// design. Depends on a successful [`build`](Self::build).
    fn generate_bitstream(&mut self) -> Result<bool>;

    /// Follow-on: inject memory contents into the generated bitstream.
    /// Depends on a successful
    /// [`generate_bitstream`](Self::generate_bitstream).
    fn inject_data(&mut self, memory_map: &Path, data_file: &Path) -> Result<bool>;
}

/// A stateful simulation build scoped to one output location.
pub trait SimulatorInstance {
    fn build(&mut self, repo: &mut Repository) -> Result<bool>;

    /// Path of the simulation executable produced by a successful build.
    fn executable(&self) -> Option<&Path>;
}

pub trait Synthesizer {
    fn create(
        &self,
        output: &OutputPath,
        config: SynthesisConfig,
    ) -> Result<Box<dyn SynthesizerInstance>>;
}

pub trait Implementor {
    fn create(
        &self,
        output: &OutputPath,
        config: ImplementationConfig,
    ) -> Result<Box<dyn ImplementorInstance>>;
}

pub trait Simulator {
    fn create(
        &self,
        output: &OutputPath,
        config: SimulationConfig,
    ) -> Result<Box<dyn SimulatorInstance>>;
}

/// One installed toolchain and its backends.
pub trait Toolchain {
    fn version(&self) -> &ToolchainVersion;

    fn unique_id(&self) -> &str {
        &self.version().unique_id
    }

    fn synthesizers(&self) -> &[Box<dyn Synthesizer>];
    fn implementors(&self) -> &[Box<dyn Implementor>];
    fn simulators(&self) -> &[Box<dyn Simulator>];
}

/// Registry of toolchains plus the shared device catalog.
#[derive(Default)]
pub struct ToolchainManager {
    toolchains: Vec<Box<dyn Toolchain>>,
    pub devices: DeviceManager,
}

impl ToolchainManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_toolchain(&mut self, toolchain: Box<dyn Toolchain>) {
        self.toolchains.push(toolchain);
    }

    pub fn toolchains(&self) -> &[Box<dyn Toolchain>] {
        &self.toolchains
    }

    pub fn find_toolchain_by_id(&self, id: &str) -> Option<&dyn Toolchain> {
        self.toolchains
            .iter()
            .find(|toolchain| toolchain.unique_id().eq_ignore_ascii_case(id))
            .map(|toolchain| toolchain.as_ref())
    }
}
