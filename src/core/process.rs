//! Child process runner
//!
//! Spawns one command at a time with stderr merged into stdout. An output
//! thread copies the merged pipe into the transcript line by line; a
//! supervisor thread reaps the child, closes the transcript status and sends
//! one exit event through the console's event channel.

use std::io::{self, BufRead, BufReader, ErrorKind, PipeReader, Read, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::session::ConsoleEvent;
use super::stream::take_utf8;
use super::transcript::{ProcessStatus, Transcript, MAX_LINE_BYTES};
use crate::error::{ConsoleError, Result};

/// Identifier of a started process, unique per runner
pub type ProcessId = u64;

/// How long the supervisor sleeps between exit polls
const REAP_POLL: Duration = Duration::from_millis(10);

/// How long output may stay open after the command exited. A background job
/// that inherited the pipe keeps writing after this, but no longer holds the
/// console in the running state.
const OUTPUT_LINGER: Duration = Duration::from_millis(250);

/// A running child process
struct RunningProcess {
    id: ProcessId,
    command: String,
    /// Leader pid; the child leads its own process group on Unix
    pid: u32,
    child: Arc<Mutex<Child>>,
    stdin: Option<ChildStdin>,
    worker: Option<JoinHandle<()>>,
}

/// Spawns and controls the session's child process
pub struct ProcessRunner {
    use_shell_interpreter: bool,
    next_id: ProcessId,
    active: Option<RunningProcess>,
}

impl ProcessRunner {
    pub fn new(use_shell_interpreter: bool) -> Self {
        Self {
            use_shell_interpreter,
            next_id: 1,
            active: None,
        }
    }

    /// Start `command_line` in `cwd`. Output goes straight into `transcript`,
    /// whose status is `Started` until the command ends; the exit
    /// notification is delivered through `events`.
    pub fn start(
        &mut self,
        command_line: &str,
        cwd: &Path,
        transcript: &Arc<Transcript>,
        events: Sender<ConsoleEvent>,
    ) -> Result<ProcessId> {
        if self.active.is_some() {
            return Err(ConsoleError::Busy);
        }

        let mut command = self.build_command(command_line)?;
        let (reader, writer) = io::pipe()?;
        command
            .current_dir(cwd)
            .stdin(Stdio::piped())
            .stdout(writer.try_clone()?)
            .stderr(writer);

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let mut child = command.spawn().map_err(ConsoleError::Spawn)?;
        // The command still holds copies of the pipe's write end
        drop(command);

        let id = self.next_id;
        self.next_id += 1;

        let pid = child.id();
        let stdin = child.stdin.take();
        let child = Arc::new(Mutex::new(child));
        transcript.set_status(ProcessStatus::Started);

        let output = {
            let transcript = transcript.clone();
            thread::Builder::new()
                .name(format!("rconsole-out-{}", id))
                .spawn(move || forward_output(id, reader, &transcript))
        };
        let worker = output.and_then(|output| {
            let child = child.clone();
            let transcript = transcript.clone();
            thread::Builder::new()
                .name(format!("rconsole-proc-{}", id))
                .spawn(move || supervise(id, output, child, transcript, events))
        });
        let worker = match worker {
            Ok(worker) => worker,
            Err(e) => {
                signal(&child, pid, Signal::Kill);
                transcript.set_status(ProcessStatus::Closed);
                return Err(e.into());
            }
        };

        info!("Started process {}: {}", id, command_line);
        self.active = Some(RunningProcess {
            id,
            command: command_line.to_string(),
            pid,
            child,
            stdin,
            worker: Some(worker),
        });
        Ok(id)
    }

    fn build_command(&self, command_line: &str) -> Result<Command> {
        if self.use_shell_interpreter {
            #[cfg(windows)]
            let command = {
                let mut command = Command::new("cmd");
                command.args(["/C", command_line]);
                command
            };
            #[cfg(not(windows))]
            let command = {
                let mut command = Command::new("sh");
                command.args(["-c", command_line]);
                command
            };
            return Ok(command);
        }

        let words = shlex::split(command_line).ok_or(ConsoleError::CommandSyntax)?;
        let (program, args) = words.split_first().ok_or(ConsoleError::CommandSyntax)?;
        let mut command = Command::new(program);
        command.args(args);
        Ok(command)
    }

    /// Forward a line to the child's stdin. No-op without a child.
    pub fn interact(&mut self, line: &str) {
        let Some(process) = self.active.as_mut() else {
            return;
        };
        let Some(stdin) = process.stdin.as_mut() else {
            return;
        };
        let result = stdin
            .write_all(line.as_bytes())
            .and_then(|_| stdin.write_all(b"\n"))
            .and_then(|_| stdin.flush());
        if let Err(e) = result {
            debug!("Process {} stdin closed: {}", process.id, e);
            process.stdin = None;
        }
    }

    /// Forcibly terminate the running command and everything in its process
    /// group, even if the command itself already exited
    pub fn kill(&mut self) -> bool {
        let Some(process) = self.active.as_ref() else {
            return false;
        };
        info!("Killing process {}: {}", process.id, process.command);
        signal(&process.child, process.pid, Signal::Kill);
        true
    }

    /// Interrupt the running command (SIGINT to its group on Unix, kill
    /// elsewhere)
    pub fn interrupt(&mut self) -> bool {
        let Some(process) = self.active.as_ref() else {
            return false;
        };
        debug!("Interrupting process {}", process.id);
        signal(&process.child, process.pid, Signal::Interrupt);
        true
    }

    /// Release the process once its supervisor reported the exit.
    ///
    /// Returns true only for the first call with the active process id.
    pub fn finish(&mut self, id: ProcessId) -> bool {
        match self.active.as_ref() {
            Some(process) if process.id == id => {}
            _ => return false,
        }
        if let Some(mut process) = self.active.take() {
            if let Some(worker) = process.worker.take() {
                if worker.join().is_err() {
                    warn!("Supervisor for process {} panicked", id);
                }
            }
        }
        true
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    pub fn active_id(&self) -> Option<ProcessId> {
        self.active.as_ref().map(|p| p.id)
    }

    pub fn active_command(&self) -> Option<&str> {
        self.active.as_ref().map(|p| p.command.as_str())
    }
}

impl Drop for ProcessRunner {
    fn drop(&mut self) {
        if let Some(mut process) = self.active.take() {
            signal(&process.child, process.pid, Signal::Kill);
            process.stdin = None;
            if let Some(worker) = process.worker.take() {
                if worker.is_finished() {
                    let _ = worker.join();
                }
            }
        }
    }
}

/// Output thread body: copy the merged pipe into the transcript until every
/// write end is closed
fn forward_output(id: ProcessId, reader: PipeReader, transcript: &Transcript) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::with_capacity(256);

    loop {
        // Bounded, so output without newlines cannot grow one buffer forever
        match (&mut reader)
            .take(MAX_LINE_BYTES as u64)
            .read_until(b'\n', &mut buf)
        {
            Ok(0) => break,
            Ok(_) => transcript.append(&take_utf8(&mut buf)),
            Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!("Process {} output read failed: {}", id, e);
                break;
            }
        }
    }
    if !buf.is_empty() {
        transcript.append(&String::from_utf8_lossy(&buf));
    }
    debug!("Process {} output closed", id);
}

/// Supervisor body: reap the child, let its output drain, then report
fn supervise(
    id: ProcessId,
    output: JoinHandle<()>,
    child: Arc<Mutex<Child>>,
    transcript: Arc<Transcript>,
    events: Sender<ConsoleEvent>,
) {
    let status = reap(&child);
    debug!("Process {} exited: {:?}", id, status);

    let deadline = Instant::now() + OUTPUT_LINGER;
    while !output.is_finished() && Instant::now() < deadline {
        thread::sleep(REAP_POLL);
    }
    if output.is_finished() {
        if output.join().is_err() {
            warn!("Output thread for process {} panicked", id);
        }
    } else {
        debug!("Process {} exited with its output still open; detaching", id);
    }

    transcript.set_status(ProcessStatus::Closed);
    let _ = events.send(ConsoleEvent::ProcessExited {
        id,
        code: status.and_then(|s| s.code()),
    });
}

/// Wait for the child without holding its lock across a blocking wait, so
/// `kill` stays usable.
fn reap(child: &Mutex<Child>) -> Option<ExitStatus> {
    loop {
        match child.lock().try_wait() {
            Ok(Some(status)) => return Some(status),
            Ok(None) => {}
            Err(e) => {
                warn!("Failed to wait for child: {}", e);
                return None;
            }
        }
        thread::sleep(REAP_POLL);
    }
}

#[derive(Clone, Copy)]
enum Signal {
    Kill,
    Interrupt,
}

/// Signal the process group led by `pid`. The leader may already be reaped
/// while other members still hold the output pipe.
fn signal(child: &Mutex<Child>, pid: u32, sig: Signal) {
    #[cfg(unix)]
    {
        let signo = match sig {
            Signal::Kill => libc::SIGKILL,
            Signal::Interrupt => libc::SIGINT,
        };
        if unsafe { libc::killpg(pid as libc::pid_t, signo) } == 0 {
            return;
        }
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ESRCH) {
            debug!("Process group {} already gone", pid);
            return;
        }
        debug!("killpg({}) failed: {}", pid, err);
    }

    #[cfg(not(unix))]
    let _ = (pid, sig);

    if let Err(e) = child.lock().kill() {
        if e.kind() != ErrorKind::InvalidInput {
            debug!("Failed to kill child: {}", e);
        }
    }
}
