//! ISim simulation backend.
//!
//! Building elaborates the simulation-only project with `fuse`, which
//! links a standalone simulation executable. Launching drives that
//! executable through the interactive session protocol: ISim reads one
//! Tcl-like command per line and marks its returned prompt with the
//! deterministic error the reserved `echo` command produces.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::paths::OutputPath;
use crate::project::ProjectFile;
use crate::repository::{Applicability, Repository};
use crate::session::InteractiveSession;
use crate::toolchain::{SimulationConfig, Simulator, SimulatorInstance};
use crate::ise::process::IseProcess;
use crate::ise::vector::StdLogicVector;
use crate::ise::IseEnv;

/// The reserved no-op command injected after every real command.
const SENTINEL_COMMAND: &str = "echo";
/// The exact error line ISim prints for the sentinel.
const SENTINEL_ERROR: &str = "invalid command name \"echo\"";

pub struct IsimSimulator {
    env: Arc<IseEnv>,
}

impl IsimSimulator {
    pub fn new(env: Arc<IseEnv>) -> Self {
        Self { env }
    }
}

impl Simulator for IsimSimulator {
    fn create(
        &self,
        output: &OutputPath,
        config: SimulationConfig,
    ) -> Result<Box<dyn SimulatorInstance>> {
        Ok(Box::new(IsimInstance {
            env: Arc::clone(&self.env),
            output: output.clone(),
            config,
            executable: None,
        }))
    }
}

/// One simulation build plus its launched sessions.
pub struct IsimInstance {
    env: Arc<IseEnv>,
    output: OutputPath,
    config: SimulationConfig,
    executable: Option<PathBuf>,
}

impl SimulatorInstance for IsimInstance {
    fn build(&mut self, repo: &mut Repository) -> Result<bool> {
        let mut project = ProjectFile::new();
        for &module in &self.config.modules {
            project.add_module(module);
        }

        let project_path = self.output.temporary_dir.join("projectfile.prj");
        fs::write(
            &project_path,
            project.render(repo, Applicability::SimulationOnly)?,
        )?;

        let top = repo.module(self.config.top);
        let top_name = format!("{}.{}", repo.library(top.library).name, top.name());
        let executable = self
            .output
            .temporary_dir
            .join(if cfg!(windows) { "x.exe" } else { "x" });

        let result = IseProcess::new(&self.env, "fuse", &self.output.temporary_dir)
            .args(["--prj", &*project_path.to_string_lossy()])
            .args(["-o", &*executable.to_string_lossy()])
            .arg(top_name)
            .run()?;

        self.output
            .copy_log_file(&self.output.temporary_dir.join("fuse.log"))?;
        fs::remove_file(&project_path)?;

        if result.success() && executable.is_file() {
            self.executable = Some(executable);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn executable(&self) -> Option<&Path> {
        self.executable.as_deref()
    }
}

impl IsimInstance {
    /// Start a simulator session over the built executable.
    pub fn launch(&self, gui: bool) -> Result<IsimSession> {
        let executable = self.executable.as_ref().ok_or_else(|| {
            Error::Session("simulation executable has not been built".to_string())
        })?;

        let mut command = Command::new(executable);
        if gui {
            command.arg("-gui");
        }
        command.current_dir(&self.output.temporary_dir);
        self.env.apply_environment(&mut command);

        tracing::debug!("ISim session starting");
        let session = InteractiveSession::spawn(command, SENTINEL_COMMAND, SENTINEL_ERROR)?;
        Ok(IsimSession { session, gui })
    }
}

/// A value read back from a simulated signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalValue {
    Vector(StdLogicVector),
    Boolean(bool),
    Integer(i64),
}

impl SignalValue {
    fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if let Some(vector) = StdLogicVector::parse(text) {
            return Some(Self::Vector(vector));
        }
        if let Ok(boolean) = text.parse::<bool>() {
            return Some(Self::Boolean(boolean));
        }
        if let Ok(integer) = text.parse::<i64>() {
            return Some(Self::Integer(integer));
        }
        None
    }
}

/// A running ISim session with the simulator command set on top of the
/// raw submit API.
pub struct IsimSession {
    session: InteractiveSession,
    gui: bool,
}

impl IsimSession {
    /// Advance the simulation by a number of nanoseconds.
    pub fn run_for(&mut self, nanoseconds: u64) -> Result<String> {
        self.session.submit(&format!("run {} ns", nanoseconds))
    }

    /// Restart the simulation from time zero.
    pub fn restart(&mut self) -> Result<String> {
        self.session.submit("restart")
    }

    /// The simulator's current time, as reported by the tool.
    pub fn current_time(&mut self) -> Result<String> {
        Ok(self.session.submit("show time")?.trim().to_string())
    }

    /// Read one signal's current value.
    ///
    /// Arrays and record types are not supported; index the object
    /// manually to read an element.
    pub fn signal_value(&mut self, path: &str) -> Result<SignalValue> {
        let response = self.session.submit(&format!("show value {}", path))?;
        if response.contains("No such HDL Object") {
            return Err(Error::Session(format!(
                "no HDL object at path '{}'",
                path
            )));
        }
        SignalValue::parse(&response).ok_or_else(|| {
            Error::Session(format!("unable to parse signal value '{}'", response.trim()))
        })
    }

    /// Submit a raw simulator command.
    pub fn submit(&mut self, command: &str) -> Result<String> {
        self.session.submit(command)
    }

    pub fn is_alive(&mut self) -> bool {
        self.session.is_alive()
    }

    /// End the session: ask the console variant to quit, fall back to a
    /// kill in GUI mode where the prompt belongs to the user interface.
    pub fn close(mut self) -> Result<()> {
        if self.gui {
            self.session.kill()
        } else {
            self.session.close("quit")
        }
    }

    /// Forcibly terminate the simulator.
    pub fn kill(&mut self) -> Result<()> {
        self.session.kill()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ise::vector::StdLogic;

    #[test]
    fn parses_vector_values() {
        let value = SignalValue::parse("1010").expect("parse");
        match value {
            SignalValue::Vector(vector) => {
                assert_eq!(vector.width(), 4);
                assert_eq!(vector.bit(0), Some(StdLogic::Zero));
            }
            other => panic!("expected vector, got {:?}", other),
        }
    }

    #[test]
    fn parses_boolean_and_integer_values() {
        assert_eq!(SignalValue::parse("true"), Some(SignalValue::Boolean(true)));
        assert_eq!(SignalValue::parse("42"), Some(SignalValue::Integer(42)));
        assert_eq!(SignalValue::parse("-7"), Some(SignalValue::Integer(-7)));
    }

    #[test]
    fn rejects_composite_values() {
        assert_eq!(SignalValue::parse("(a, b)"), None);
    }
}
