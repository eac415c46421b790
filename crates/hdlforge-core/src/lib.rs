//! Core engine for the hdlforge HDL build environment.
//!
//! This crate provides:
//! - The core repository: lazily loaded libraries, modules, and their
//!   reference graph
//! - Reference-order sorting and project manifest generation
//! - The device catalog with on-disk caching and two-tier name lookup
//! - The pluggable toolchain model (synthesize / implement / simulate)
//!   and the Xilinx ISE backend driving the staged build pipeline
//! - Synchronous command/response driving of prompt-driven simulators

pub mod device;
pub mod error;
pub mod ise;
pub mod paths;
pub mod project;
pub mod repository;
pub mod session;
pub mod toolchain;

pub use error::{Error, Result};
pub use paths::OutputPath;
pub use project::ProjectFile;
pub use repository::{
    sort_modules_by_reference, Applicability, HdlLanguage, Library, LibraryId, Module, ModuleId,
    Repository,
};
pub use device::{DeviceCategory, DeviceManager, PartMatch, TargetPart, ToolchainRef};
pub use session::InteractiveSession;
pub use toolchain::{
    ImplementationConfig, Implementor, ImplementorInstance, SimulationConfig, Simulator,
    SimulatorInstance, SynthesisConfig, Synthesizer, SynthesizerInstance, Toolchain,
    ToolchainManager, ToolchainVersion,
};
