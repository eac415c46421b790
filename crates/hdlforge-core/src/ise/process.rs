//! Blocking invocation of one ISE tool.
//!
//! Each invocation resolves the tool executable inside the install
//! (raised as an error before anything is spawned), runs it in the
//! caller's working directory with the ISE environment applied, and
//! drains stdout/stderr line-by-line through the diagnostic scanner
//! while the caller blocks on process exit.

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;

use crate::error::{Error, Result};
use crate::ise::diagnostics::{MessageParser, ToolMessage};
use crate::ise::IseEnv;

/// Captured outcome of one tool invocation.
#[derive(Debug)]
pub struct ExecutionResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// Diagnostics classified from the combined output.
    pub messages: Vec<ToolMessage>,
}

impl ExecutionResult {
    /// Whether the process exited with the toolchain's success code.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

enum Stream {
    Out,
    Err,
}

/// One pending tool invocation.
pub struct IseProcess<'a> {
    env: &'a IseEnv,
    tool: String,
    args: Vec<String>,
    working_dir: PathBuf,
}

impl<'a> IseProcess<'a> {
    pub fn new(env: &'a IseEnv, tool: impl Into<String>, working_dir: &Path) -> Self {
        Self {
            env,
            tool: tool.into(),
            args: Vec::new(),
            working_dir: working_dir.to_path_buf(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run the tool to completion.
    pub fn run(&self) -> Result<ExecutionResult> {
        let tool_path = self
            .env
            .find_tool_path(&self.tool)
            .ok_or_else(|| Error::ToolNotFound(self.tool.clone()))?;

        let mut command = Command::new(&tool_path);
        command
            .args(&self.args)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        self.env.apply_environment(&mut command);

        tracing::debug!(
            "running '{}' with {} arguments in {}",
            tool_path.display(),
            self.args.len(),
            self.working_dir.display(),
        );

        let mut child = command.spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Toolchain("failed to take tool stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Toolchain("failed to take tool stderr".to_string()))?;

        let (sender, receiver) = mpsc::channel::<(Stream, String)>();
        let stdout_sender = sender.clone();
        let stdout_reader = thread::spawn(move || {
            for line in BufReader::new(stdout).lines() {
                let Ok(line) = line else { break };
                if stdout_sender.send((Stream::Out, line)).is_err() {
                    break;
                }
            }
        });
        let stderr_reader = thread::spawn(move || {
            for line in BufReader::new(stderr).lines() {
                let Ok(line) = line else { break };
                if sender.send((Stream::Err, line)).is_err() {
                    break;
                }
            }
        });

        let mut parser = MessageParser::new();
        let mut stdout_text = String::new();
        let mut stderr_text = String::new();
        for (stream, line) in receiver {
            parser.parse_line(&line);
            let buffer = match stream {
                Stream::Out => &mut stdout_text,
                Stream::Err => &mut stderr_text,
            };
            buffer.push_str(&line);
            buffer.push('\n');
        }

        let _ = stdout_reader.join();
        let _ = stderr_reader.join();
        let status = child.wait()?;
        let exit_code = status.code().unwrap_or(-1);
        tracing::debug!("'{}' exited with code {}", self.tool, exit_code);

        Ok(ExecutionResult {
            exit_code,
            stdout: stdout_text,
            stderr: stderr_text,
            messages: parser.into_messages(),
        })
    }
}
