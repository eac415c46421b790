//! Synchronous command/response driving of a prompt-driven subprocess.
//!
//! The external tools read one command per input line and write results
//! to stdout/stderr with no end-of-output marker. The driver injects a
//! reserved sentinel command after every real command; the sentinel is
//! guaranteed to produce a deterministic, recognizable error line, and
//! observing that line means the prompt has returned. Output received
//! between submitting a command and the sentinel's error line is that
//! command's response.
//!
//! Two locks synchronize the foreground caller with the background
//! reader threads: a prompt-ready flag and the transcript buffer. One
//! command is in flight at a time; `submit` taking `&mut self` enforces
//! that.

use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::{Error, Result};

const PROMPT_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Shared state between the submitting caller and the reader threads.
struct SessionState {
    prompt_ready: Mutex<bool>,
    transcript: Mutex<Transcript>,
}

/// Response accumulation. `current` is `None` until the first sentinel
/// fires, which drops everything the process printed on startup.
struct Transcript {
    current: Option<String>,
    completed: Vec<String>,
}

/// A running interactive subprocess session.
pub struct InteractiveSession {
    child: Child,
    stdin: ChildStdin,
    state: Arc<SessionState>,
    sentinel: String,
    readers: Vec<JoinHandle<()>>,
    killed: bool,
}

impl InteractiveSession {
    /// Spawn the process and synchronize on its first prompt.
    ///
    /// `sentinel` is the reserved no-op command; `sentinel_error` is the
    /// exact error line the process prints in response to it. Detection
    /// is keyed to that specific text, so submitting the sentinel word
    /// as a real command cannot desynchronize the prompt flag.
    pub fn spawn(mut command: Command, sentinel: &str, sentinel_error: &str) -> Result<Self> {
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command
            .spawn()
            .map_err(|e| Error::Session(format!("failed to spawn session process: {}", e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Session("failed to take session stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Session("failed to take session stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Session("failed to take session stderr".to_string()))?;

        let state = Arc::new(SessionState {
            prompt_ready: Mutex::new(false),
            transcript: Mutex::new(Transcript {
                current: None,
                completed: Vec::new(),
            }),
        });

        let stdout_state = Arc::clone(&state);
        let stdout_reader = thread::spawn(move || {
            for line in BufReader::new(stdout).lines() {
                let Ok(line) = line else { break };
                let mut transcript = stdout_state.transcript.lock().unwrap();
                if let Some(current) = &mut transcript.current {
                    current.push_str(&line);
                    current.push('\n');
                }
            }
        });

        let marker = sentinel_error.to_string();
        let stderr_state = Arc::clone(&state);
        let stderr_reader = thread::spawn(move || {
            for line in BufReader::new(stderr).lines() {
                let Ok(line) = line else { break };
                if line == marker {
                    let mut transcript = stderr_state.transcript.lock().unwrap();
                    if let Some(finished) = transcript.current.take() {
                        transcript.completed.push(finished);
                    }
                    transcript.current = Some(String::new());
                    drop(transcript);
                    *stderr_state.prompt_ready.lock().unwrap() = true;
                } else {
                    let mut transcript = stderr_state.transcript.lock().unwrap();
                    if let Some(current) = &mut transcript.current {
                        current.push_str("stderr:");
                        current.push_str(&line);
                        current.push('\n');
                    }
                }
            }
        });

        let mut session = Self {
            child,
            stdin,
            state,
            sentinel: sentinel.to_string(),
            readers: vec![stdout_reader, stderr_reader],
            killed: false,
        };

        // Prime the prompt flag: the first sentinel response also
        // discards whatever the process printed while starting up.
        let prime = session.sentinel.clone();
        session.inject_no_wait(&prime)?;
        session.wait_for_prompt();
        if !session.is_alive() {
            return Err(Error::Session(
                "session process exited before its first prompt".to_string(),
            ));
        }

        Ok(session)
    }

    /// Whether the child process is still running.
    pub fn is_alive(&mut self) -> bool {
        if self.killed {
            return false;
        }
        matches!(self.child.try_wait(), Ok(None))
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Submit one command and block until its full response is
    /// available.
    ///
    /// Fatal to this call only when the process is not running. There
    /// is no timeout: the prompt wait is bounded by process liveness,
    /// so a dead process unblocks the caller.
    pub fn submit(&mut self, command: &str) -> Result<String> {
        if !self.is_alive() {
            return Err(Error::Session("process is not running".to_string()));
        }

        self.wait_for_prompt();

        self.inject_no_wait(command)?;
        let sentinel = self.sentinel.clone();
        self.inject_no_wait(&sentinel)?;

        self.wait_for_prompt();

        let mut transcript = self.state.transcript.lock().unwrap();
        let response = transcript.completed.join("\n");
        transcript.completed.clear();
        Ok(response)
    }

    /// Write one command line without waiting; clears the prompt flag.
    fn inject_no_wait(&mut self, command: &str) -> Result<()> {
        *self.state.prompt_ready.lock().unwrap() = false;
        writeln!(self.stdin, "{}", command)
            .and_then(|_| self.stdin.flush())
            .map_err(|e| Error::Session(format!("failed to write session command: {}", e)))
    }

    /// Spin-poll the prompt flag with a short sleep, bounded by process
    /// liveness.
    fn wait_for_prompt(&mut self) {
        loop {
            if !self.is_alive() {
                break;
            }
            if *self.state.prompt_ready.lock().unwrap() {
                break;
            }
            thread::sleep(PROMPT_POLL_INTERVAL);
        }
    }

    /// Ask the process to exit by submitting `exit_command`, then wait
    /// for it; falls back to a kill when the write fails.
    pub fn close(mut self, exit_command: &str) -> Result<()> {
        if !self.is_alive() {
            return Ok(());
        }

        self.wait_for_prompt();
        if self.inject_no_wait(exit_command).is_err() {
            return self.kill();
        }

        let status = self
            .child
            .wait()
            .map_err(|e| Error::Session(format!("failed to wait for session exit: {}", e)))?;
        self.killed = true;
        self.join_readers();
        tracing::debug!("session exited with status {}", status);
        Ok(())
    }

    /// Forcibly terminate the process. The only supported cancellation
    /// path; a submitted command cannot be cancelled individually.
    pub fn kill(&mut self) -> Result<()> {
        if self.killed {
            return Ok(());
        }
        self.killed = true;

        if let Err(e) = self.child.kill() {
            if e.kind() != std::io::ErrorKind::InvalidInput {
                tracing::warn!("failed to kill session process: {}", e);
            }
        }
        let _ = self.child.wait();
        self.join_readers();
        Ok(())
    }

    fn join_readers(&mut self) {
        for reader in self.readers.drain(..) {
            let _ = reader.join();
        }
    }
}

impl Drop for InteractiveSession {
    fn drop(&mut self) {
        let _ = self.kill();
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    /// A stand-in for the vendor REPL: reads commands, answers known
    /// ones on stdout, and prints the recognizable error line on stderr
    /// for anything it does not understand.
    fn stub_repl() -> Command {
        let script = r#"
echo "startup banner"
while IFS= read -r line; do
  case "$line" in
    echo) printf 'invalid command name "echo"\n' >&2 ;;
    time) echo "100 ns" ;;
    quit) exit 0 ;;
    *) echo "ran: $line" ;;
  esac
done
"#;
        let mut command = Command::new("sh");
        command.arg("-c").arg(script);
        command
    }

    #[test]
    fn submit_returns_command_output() {
        let mut session =
            InteractiveSession::spawn(stub_repl(), "echo", r#"invalid command name "echo""#)
                .expect("spawn session");

        let response = session.submit("time").expect("submit");
        assert!(response.contains("100 ns"));
        assert!(
            !response.contains("startup banner"),
            "startup output must be discarded by the priming sentinel"
        );

        let response = session.submit("step").expect("submit");
        assert!(response.contains("ran: step"));

        session.close("quit").expect("close");
    }

    #[test]
    fn responses_stay_ordered_across_submissions() {
        let mut session =
            InteractiveSession::spawn(stub_repl(), "echo", r#"invalid command name "echo""#)
                .expect("spawn session");

        let first = session.submit("one").expect("submit");
        let second = session.submit("two").expect("submit");
        assert!(first.contains("ran: one"));
        assert!(!first.contains("ran: two"));
        assert!(second.contains("ran: two"));

        session.kill().expect("kill");
    }

    #[test]
    fn sentinel_as_real_command_does_not_desynchronize() {
        let mut session =
            InteractiveSession::spawn(stub_repl(), "echo", r#"invalid command name "echo""#)
                .expect("spawn session");

        // The submitted "echo" produces the sentinel error itself; the
        // injected sentinel produces a second one. The flag must be set
        // by text match, so the session stays usable afterwards.
        let _ = session.submit("echo").expect("submit sentinel as command");
        let response = session.submit("time").expect("session still in sync");
        assert!(response.contains("100 ns"));

        session.kill().expect("kill");
    }

    #[test]
    fn submit_after_exit_is_a_protocol_error() {
        let mut session =
            InteractiveSession::spawn(stub_repl(), "echo", r#"invalid command name "echo""#)
                .expect("spawn session");

        session.submit("quit").ok();
        // Give the process a moment to go away.
        for _ in 0..100 {
            if !session.is_alive() {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }

        let err = session.submit("time").expect_err("must fail");
        assert!(matches!(err, Error::Session(_)));
    }
}
