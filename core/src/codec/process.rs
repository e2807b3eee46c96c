//! External stage processes.
//!
//! A `StageProcess` is one spawned tool with all three standard streams
//! piped. Pipes are taken out and handed to pump tasks; the process handle
//! itself stays with the supervisor so it can be terminated and reaped from
//! one place. `ProcessGroup` is the per-job teardown unit.

use std::fmt;
use std::io::{self, Read};
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, warn};
use serde::Serialize;

use crate::codec::error::CodecError;
use crate::constants::STDERR_TAIL_BYTES;

const REAP_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StageRole {
    Probe,
    Decoder,
    Encoder,
}

impl fmt::Display for StageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StageRole::Probe => "probe",
            StageRole::Decoder => "decoder",
            StageRole::Encoder => "encoder",
        })
    }
}

pub struct StageProcess {
    role: StageRole,
    program: String,
    child: Child,
    status: Option<ExitStatus>,
    /// Set when we killed it while it was still running.
    terminated: bool,
}

impl fmt::Debug for StageProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageProcess")
            .field("role", &self.role)
            .field("program", &self.program)
            .field("pid", &self.child.id())
            .field("status", &self.status)
            .field("terminated", &self.terminated)
            .finish()
    }
}

impl StageProcess {
    pub fn spawn(role: StageRole, mut command: Command) -> Result<Self, CodecError> {
        let program = command.get_program().to_string_lossy().into_owned();
        command.stdin(Stdio::piped()).stdout(Stdio::piped()).stderr(Stdio::piped());

        let child = command.spawn().map_err(|source| CodecError::Spawn {
            role,
            program: program.clone(),
            source,
        })?;
        debug!("[{}] spawned `{}` pid={}", role, program, child.id());

        Ok(Self { role, program, child, status: None, terminated: false })
    }

    pub fn role(&self) -> StageRole {
        self.role
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }

    pub fn take_stdin(&mut self) -> Result<ChildStdin, CodecError> {
        self.child.stdin.take().ok_or(CodecError::MissingPipe { role: self.role, pipe: "stdin" })
    }

    pub fn take_stdout(&mut self) -> Result<ChildStdout, CodecError> {
        self.child.stdout.take().ok_or(CodecError::MissingPipe { role: self.role, pipe: "stdout" })
    }

    pub fn take_stderr(&mut self) -> Result<ChildStderr, CodecError> {
        self.child.stderr.take().ok_or(CodecError::MissingPipe { role: self.role, pipe: "stderr" })
    }

    fn poll(&mut self) -> io::Result<Option<ExitStatus>> {
        if self.status.is_none() {
            self.status = self.child.try_wait()?;
        }
        Ok(self.status)
    }

    /// Kill the process if it is still running. Already-exited processes keep
    /// their natural status.
    pub fn terminate(&mut self) {
        match self.poll() {
            Ok(Some(_)) => {}
            _ => {
                if let Err(e) = self.child.kill() {
                    debug!("[{}] kill pid={} failed: {}", self.role, self.child.id(), e);
                } else {
                    debug!("[{}] killed pid={}", self.role, self.child.id());
                    self.terminated = true;
                }
            }
        }
    }

    /// Wait for exit until `deadline`; kill and reap if it is still running then.
    pub fn reap(&mut self, deadline: Instant) -> io::Result<ExitStatus> {
        loop {
            if let Some(status) = self.poll()? {
                return Ok(status);
            }
            if Instant::now() >= deadline {
                warn!("[{}] pid={} still running at reap deadline, killing", self.role, self.child.id());
                self.terminate();
                let status = self.child.wait()?;
                self.status = Some(status);
                return Ok(status);
            }
            thread::sleep(REAP_POLL);
        }
    }

    pub fn was_terminated(&self) -> bool {
        self.terminated
    }
}

impl Drop for StageProcess {
    fn drop(&mut self) {
        // Never leave a zombie behind, whatever path dropped us.
        if self.status.is_none() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// How one stage process ended.
#[derive(Debug, Clone, Copy)]
pub struct ExitReport {
    pub role: StageRole,
    pub status: ExitStatus,
    pub terminated: bool,
}

impl ExitReport {
    /// Non-zero exit that we did not cause.
    pub fn failed_on_its_own(&self) -> bool {
        !self.terminated && !self.status.success()
    }
}

/// Every process of one job. Torn down together.
#[derive(Debug, Default)]
pub struct ProcessGroup {
    members: Vec<StageProcess>,
    torn_down: bool,
}

impl ProcessGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn(&mut self, role: StageRole, command: Command) -> Result<&mut StageProcess, CodecError> {
        let process = StageProcess::spawn(role, command)?;
        self.members.push(process);
        let last = self.members.len() - 1;
        Ok(&mut self.members[last])
    }

    pub fn get_mut(&mut self, role: StageRole) -> Option<&mut StageProcess> {
        self.members.iter_mut().find(|p| p.role == role)
    }

    pub fn terminate_all(&mut self) {
        if !self.torn_down {
            debug!("[GROUP] terminating {} process(es)", self.members.len());
        }
        self.torn_down = true;
        for member in &mut self.members {
            member.terminate();
        }
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Reap every member, killing whatever outlives `deadline`.
    pub fn reap_all(&mut self, deadline: Instant) -> Result<Vec<ExitReport>, CodecError> {
        let mut reports = Vec::with_capacity(self.members.len());
        for member in &mut self.members {
            let status = member.reap(deadline)?;
            debug!("[{}] pid={} exited: {}", member.role, member.id(), status);
            reports.push(ExitReport { role: member.role, status, terminated: member.terminated });
        }
        Ok(reports)
    }
}

/// Drain a stderr pipe to EOF, keeping only the last `STDERR_TAIL_BYTES`.
/// A stage whose stderr nobody reads blocks once the pipe buffer fills.
pub fn read_stderr_tail<R: Read>(mut stderr: R) -> String {
    let mut tail: Vec<u8> = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        match stderr.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                tail.extend_from_slice(&buf[..n]);
                if tail.len() > STDERR_TAIL_BYTES {
                    let cut = tail.len() - STDERR_TAIL_BYTES;
                    tail.drain(..cut);
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
    String::from_utf8_lossy(&tail).into_owned()
}

/// Map an exit report to a `ProcessFailed` error when it failed on its own.
pub fn check_exit(report: &ExitReport, stderr: &str) -> Result<(), CodecError> {
    if report.failed_on_its_own() {
        return Err(CodecError::ProcessFailed {
            role: report.role,
            code: report.status.code(),
            stderr: stderr.to_string(),
        });
    }
    Ok(())
}
