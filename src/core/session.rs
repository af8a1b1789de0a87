//! Console session
//!
//! [`Console`] is the session controller. It owns the prompt, the working
//! directory, the input line and the command history, and starts commands
//! through the [`ProcessRunner`].
//!
//! Worker threads never touch the session. The running command's output
//! thread writes the transcript directly and its supervisor closes the
//! transcript status, so `read(0)` on a virtual stream returns without a
//! pump. Everything else arrives as [`ConsoleEvent`]s, which
//! [`Console::pump`] applies on the owner's thread:
//!
//! ```text
//! keys ──► KeyMapper ──► Console::apply ──► history / completion / runner
//!
//! process output ──────────────────────────────► Transcript
//! process supervisor ─┐                              ▲
//! stdout drain ───────┼──► mpsc ──► Console::pump ───┴──► Display
//! stdin drain ────────┘
//! ```

use std::collections::VecDeque;
use std::fs;
use std::io::{self, ErrorKind};
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tracing::{debug, info};

use super::display::{Display, InputMode, NullDisplay};
use super::input::PendingInput;
use super::process::{ProcessId, ProcessRunner};
use super::prompt::PromptIdentity;
use super::stream::{StreamMode, VirtualStream};
use super::transcript::{ProcessStatus, Transcript};
use crate::completion::{self, Completion};
use crate::config::ConsoleConfig;
use crate::error::{ConsoleError, Result};
use crate::history::{CommandHistory, SearchDirection};
use crate::ui::keymapper::{EditAction, KeyMapper};

/// Messages from worker threads to the console
#[derive(Debug)]
pub enum ConsoleEvent {
    /// Text for the transcript
    Output(String),
    /// The running process ended; sent once per process
    ProcessExited { id: ProcessId, code: Option<i32> },
    /// A command line written to the stdin stream, without prompt
    Submit(String),
}

/// Input field state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleState {
    /// Command line visible and focused
    Idle,
    /// Bookkeeping for a submitted line
    Submitting,
    /// A command runs; keys go to the interaction line
    Running,
}

/// What happened to a keystroke
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOutcome {
    /// Applied by the console
    Handled,
    /// Not a console key; left to the caller
    PassThrough,
    /// The console does not hold input focus
    Unfocused,
}

/// Input waiting for the console to become idle
#[derive(Debug)]
enum Queued {
    /// A full line including a prompt
    Line(String),
    /// A bare command; the prompt is added when it is replayed
    Command(String),
}

/// The console session controller
pub struct Console<D: Display = NullDisplay> {
    config: ConsoleConfig,
    identity: PromptIdentity,
    cwd: PathBuf,
    prompt: String,
    input: PendingInput,
    interaction: PendingInput,
    history: CommandHistory,
    runner: ProcessRunner,
    state: ConsoleState,
    transcript: Arc<Transcript>,
    events_tx: Sender<ConsoleEvent>,
    events_rx: Receiver<ConsoleEvent>,
    queued: VecDeque<Queued>,
    stdout: Arc<VirtualStream>,
    stdin: Arc<VirtualStream>,
    display: D,
    focused: bool,
    last_render: Option<Instant>,
    rendered_revision: u64,
}

impl<D: Display> Console<D> {
    /// Create a console, detecting user and host for the prompt
    pub fn new(config: ConsoleConfig, display: D) -> Result<Self> {
        Self::with_identity(config, display, PromptIdentity::detect())
    }

    pub fn with_identity(
        config: ConsoleConfig,
        display: D,
        identity: PromptIdentity,
    ) -> Result<Self> {
        let cwd = match &config.start_directory {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()?,
        };
        let cwd = fs::canonicalize(&cwd).unwrap_or(cwd);
        let prompt = identity.render(config.prompt_style, &cwd);

        let transcript = Arc::new(Transcript::new(config.cached_history_lines));
        let (events_tx, events_rx) = mpsc::channel();
        let stdout = Arc::new(VirtualStream::open(
            StreamMode::Stdout,
            transcript.clone(),
            events_tx.clone(),
        )?);
        let stdin = Arc::new(VirtualStream::open(
            StreamMode::Stdin,
            transcript.clone(),
            events_tx.clone(),
        )?);

        info!("Console started in {}", cwd.display());

        Ok(Self {
            history: CommandHistory::new(config.cached_commands_limit),
            runner: ProcessRunner::new(config.use_shell_interpreter),
            input: PendingInput::new(prompt.clone()),
            interaction: PendingInput::default(),
            config,
            identity,
            cwd,
            prompt,
            state: ConsoleState::Idle,
            transcript,
            events_tx,
            events_rx,
            queued: VecDeque::new(),
            stdout,
            stdin,
            display,
            focused: false,
            last_render: None,
            rendered_revision: 0,
        })
    }

    /// Take input focus. Keystrokes are routed only while the returned
    /// guard is alive.
    pub fn focus(&mut self) -> Focused<'_, D> {
        self.focused = true;
        Focused { console: self }
    }

    /// Route a raw keystroke
    pub fn on_keystroke(&mut self, code: KeyCode, modifiers: KeyModifiers) -> KeyOutcome {
        if !self.focused {
            return KeyOutcome::Unfocused;
        }
        match KeyMapper::map(&KeyEvent::new(code, modifiers), self.input_mode()) {
            Some(action) => self.apply(action),
            None => KeyOutcome::PassThrough,
        }
    }

    /// Apply a logical editing action
    pub fn apply(&mut self, action: EditAction) -> KeyOutcome {
        let outcome = match self.state {
            ConsoleState::Running => self.apply_interaction(action),
            _ => self.apply_command(action),
        };
        self.refresh_display(false);
        outcome
    }

    fn apply_command(&mut self, action: EditAction) -> KeyOutcome {
        match action {
            EditAction::HistoryUp => {
                if let Some(command) = self.history.previous() {
                    let command = command.to_string();
                    self.input.set_text(&command, usize::MAX);
                }
            }
            EditAction::HistoryNext => match self.history.next() {
                Some(command) => {
                    let command = command.to_string();
                    self.input.set_text(&command, usize::MAX);
                }
                None => self.input.reset(&self.prompt),
            },
            EditAction::SearchPrev => self.search_history(SearchDirection::Older),
            EditAction::SearchNext => self.search_history(SearchDirection::Newer),
            EditAction::Complete => self.complete(),
            EditAction::LineHome { select } => self.input.home(select),
            EditAction::LineEnd => self.input.end(),
            EditAction::DeleteLeft => {
                self.input.delete_left();
            }
            EditAction::DeleteRight => {
                self.input.delete_right();
            }
            EditAction::CursorLeft => {
                self.input.move_left();
            }
            EditAction::CursorRight => {
                self.input.move_right();
            }
            EditAction::Insert(ch) => self.input.insert_char(ch),
            EditAction::Submit => {
                let line = self.input.line();
                self.on_submit(&line);
            }
            EditAction::Interrupt => {
                self.transcript.append(&format!("{}^C\n", self.input.line()));
                self.input.reset(&self.prompt);
                self.history.reset_cursor();
            }
            EditAction::Kill => return KeyOutcome::PassThrough,
        }
        KeyOutcome::Handled
    }

    fn apply_interaction(&mut self, action: EditAction) -> KeyOutcome {
        match action {
            EditAction::Insert(ch) => self.interaction.insert_char(ch),
            EditAction::DeleteLeft => {
                self.interaction.delete_left();
            }
            EditAction::DeleteRight => {
                self.interaction.delete_right();
            }
            EditAction::CursorLeft => {
                self.interaction.move_left();
            }
            EditAction::CursorRight => {
                self.interaction.move_right();
            }
            EditAction::LineHome { select } => self.interaction.home(select),
            EditAction::LineEnd => self.interaction.end(),
            EditAction::Submit => {
                let line = self.interaction.text().to_string();
                self.interaction.reset("");
                self.interact(&line);
            }
            EditAction::Interrupt => self.interrupt(),
            EditAction::Kill => self.kill(),
            EditAction::HistoryUp
            | EditAction::HistoryNext
            | EditAction::SearchPrev
            | EditAction::SearchNext
            | EditAction::Complete => return KeyOutcome::PassThrough,
        }
        KeyOutcome::Handled
    }

    /// Handle a submitted line. `line` includes the prompt.
    pub fn on_submit(&mut self, line: &str) {
        if self.state == ConsoleState::Running {
            debug!("Queueing submission while a command runs");
            self.queued.push_back(Queued::Line(line.to_string()));
            return;
        }

        self.state = ConsoleState::Submitting;
        self.transcript.append(&format!("{}\n", line));
        let command = self.strip_prompt(line).to_string();

        if command.trim().is_empty() {
            self.input.reset(&self.prompt);
            self.state = ConsoleState::Idle;
            self.display.scroll_to_end();
            self.refresh_display(false);
            return;
        }

        self.history.append(&command);

        if let Some(target) = cd_target(&command) {
            self.change_directory(target);
            self.input.reset(&self.prompt);
            self.state = ConsoleState::Idle;
            self.refresh_display(false);
            return;
        }

        self.input.reset(&self.prompt);
        self.run(&command);
        self.refresh_display(false);
    }

    fn strip_prompt<'a>(&self, line: &'a str) -> &'a str {
        if let Some(command) = line.strip_prefix(self.prompt.as_str()) {
            return command;
        }
        // Not our prompt: drop the same number of leading chars
        let skip = self.prompt.chars().count();
        line.char_indices()
            .nth(skip)
            .map(|(i, _)| &line[i..])
            .unwrap_or("")
    }

    fn change_directory(&mut self, target: &str) {
        match self.resolve_directory(target) {
            Ok(dir) => {
                info!("Changed directory to {}", dir.display());
                self.prompt = self.identity.render(self.config.prompt_style, &dir);
                self.cwd = dir;
            }
            Err(e) => {
                debug!("cd {} failed: {}", target, e);
                self.transcript.append(&format!("{}\n", e));
            }
        }
    }

    fn resolve_directory(&self, target: &str) -> Result<PathBuf> {
        let target = match shlex::split(target) {
            Some(words) if words.len() == 1 => words.into_iter().next().unwrap_or_default(),
            _ => target.trim().to_string(),
        };
        let path = expand_home(&self.cwd, &target);
        let to_error = |source: io::Error| ConsoleError::DirectoryChange {
            path: path.clone(),
            source,
        };

        let dir = fs::canonicalize(&path).map_err(to_error)?;
        if !fs::metadata(&dir).map_err(to_error)?.is_dir() {
            return Err(to_error(io::Error::new(
                ErrorKind::NotADirectory,
                "Not a directory",
            )));
        }
        Ok(dir)
    }

    fn run(&mut self, command: &str) {
        match self
            .runner
            .start(command, &self.cwd, &self.transcript, self.events_tx.clone())
        {
            Ok(_) => {
                self.state = ConsoleState::Running;
                self.interaction.reset("");
                self.display.set_input_mode(InputMode::Interact);
            }
            // Submissions queue while Running, so the runner is never busy here
            Err(e) => {
                debug!("Command failed to start: {}", e);
                self.transcript.append(&format!("{} < {} >\n", e, command));
                self.state = ConsoleState::Idle;
            }
        }
    }

    fn search_history(&mut self, direction: SearchDirection) {
        let prefix = self.input.before_cursor().to_string();
        let cursor = self.input.cursor();
        if let Some(command) = self.history.search_prefix(direction, &prefix) {
            let command = command.to_string();
            self.input.set_text(&command, cursor);
        }
    }

    fn complete(&mut self) {
        let search_path = if self.config.complete_from_path {
            std::env::var_os("PATH")
        } else {
            None
        };
        let completion = completion::complete(
            &self.cwd,
            self.input.before_cursor(),
            self.input.after_cursor(),
            search_path.as_deref(),
        );
        match completion {
            Completion::Insert(text) => self.input.insert_str(&text),
            other => {
                if let Some(text) = other.display_text() {
                    self.transcript.append(&text);
                }
            }
        }
    }

    /// Send a line to the running command's stdin
    pub fn interact(&mut self, line: &str) {
        self.runner.interact(line);
    }

    /// Forcibly stop the running command
    pub fn kill(&mut self) {
        self.runner.kill();
    }

    /// Interrupt the running command
    pub fn interrupt(&mut self) {
        self.runner.interrupt();
    }

    /// Apply pending worker events, replay queued input once idle and
    /// refresh the display. Returns true if anything changed.
    pub fn pump(&mut self) -> bool {
        let revision = self.transcript.revision();
        let mut changed = false;
        loop {
            match self.events_rx.try_recv() {
                Ok(event) => changed |= self.handle_event(event),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        changed |= self.replay_queued();
        self.refresh_display(false);
        changed || self.transcript.revision() != revision
    }

    /// Pump until no command runs and nothing is queued, or `timeout`
    /// passes. Returns true if the console became idle.
    pub fn wait_idle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.pump();
            if self.is_idle() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            match self.events_rx.recv_timeout(deadline - now) {
                Ok(event) => {
                    self.handle_event(event);
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {}
            }
        }
    }

    fn handle_event(&mut self, event: ConsoleEvent) -> bool {
        match event {
            ConsoleEvent::Output(text) => {
                self.transcript.append(&text);
                true
            }
            ConsoleEvent::ProcessExited { id, code } => self.finish_process(id, code),
            ConsoleEvent::Submit(command) => {
                self.queued.push_back(Queued::Command(command));
                true
            }
        }
    }

    /// Cleanup after a process ended. Runs once per started process.
    fn finish_process(&mut self, id: ProcessId, code: Option<i32>) -> bool {
        if !self.runner.finish(id) {
            return false;
        }
        debug!("Process {} finished with {:?}", id, code);
        self.state = ConsoleState::Idle;
        self.interaction.reset("");
        self.display.set_input_mode(InputMode::Command);
        self.display.scroll_to_end();
        true
    }

    fn replay_queued(&mut self) -> bool {
        let mut replayed = false;
        while self.state == ConsoleState::Idle {
            let Some(next) = self.queued.pop_front() else {
                break;
            };
            let line = match next {
                Queued::Line(line) => line,
                Queued::Command(command) => format!("{}{}", self.prompt, command),
            };
            self.on_submit(&line);
            replayed = true;
        }
        replayed
    }

    /// Push the transcript to the display now
    pub fn refresh(&mut self) {
        self.refresh_display(true);
    }

    fn refresh_display(&mut self, force: bool) {
        let revision = self.transcript.revision();
        let now = Instant::now();
        if !force {
            if revision == self.rendered_revision {
                return;
            }
            if let Some(last) = self.last_render {
                if now.duration_since(last) < self.config.refresh_interval() {
                    return;
                }
            }
        }
        self.display.render(&self.transcript.snapshot());
        self.display.scroll_to_end();
        self.last_render = Some(now);
        self.rendered_revision = revision;
    }

    pub fn is_idle(&self) -> bool {
        self.state == ConsoleState::Idle && self.queued.is_empty()
    }

    pub fn state(&self) -> ConsoleState {
        self.state
    }

    pub fn status(&self) -> ProcessStatus {
        self.transcript.status()
    }

    pub fn input_mode(&self) -> InputMode {
        match self.state {
            ConsoleState::Running => InputMode::Interact,
            _ => InputMode::Command,
        }
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn current_directory(&self) -> &Path {
        &self.cwd
    }

    pub fn input(&self) -> &PendingInput {
        &self.input
    }

    /// Line forwarded to the running command on submit
    pub fn interaction(&self) -> &PendingInput {
        &self.interaction
    }

    pub fn history(&self) -> &CommandHistory {
        &self.history
    }

    pub fn running_command(&self) -> Option<&str> {
        self.runner.active_command()
    }

    /// Current transcript text
    pub fn text(&self) -> String {
        self.transcript.snapshot()
    }

    pub fn transcript(&self) -> &Arc<Transcript> {
        &self.transcript
    }

    pub fn stdout(&self) -> Arc<VirtualStream> {
        self.stdout.clone()
    }

    pub fn stdin(&self) -> Arc<VirtualStream> {
        self.stdin.clone()
    }

    pub fn config(&self) -> &ConsoleConfig {
        &self.config
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn display_mut(&mut self) -> &mut D {
        &mut self.display
    }
}

impl<D: Display> Drop for Console<D> {
    fn drop(&mut self) {
        let _ = self.stdout.close();
        let _ = self.stdin.close();
        self.runner.kill();
        // Nothing will pump anymore; release blocked readers
        self.transcript.set_status(ProcessStatus::Closed);
    }
}

/// Input focus held by the console; dropping it blurs
pub struct Focused<'a, D: Display> {
    console: &'a mut Console<D>,
}

impl<D: Display> Deref for Focused<'_, D> {
    type Target = Console<D>;

    fn deref(&self) -> &Console<D> {
        &*self.console
    }
}

impl<D: Display> DerefMut for Focused<'_, D> {
    fn deref_mut(&mut self) -> &mut Console<D> {
        &mut *self.console
    }
}

impl<D: Display> Drop for Focused<'_, D> {
    fn drop(&mut self) {
        self.console.focused = false;
    }
}

/// The argument of a `cd` command, or `None` for other commands
fn cd_target(command: &str) -> Option<&str> {
    if command == "cd" {
        return Some("");
    }
    command.strip_prefix("cd ")
}

/// Resolve `target` against `cwd`, expanding a leading `~`. An empty target
/// means the home directory.
fn expand_home(cwd: &Path, target: &str) -> PathBuf {
    let home = dirs::home_dir();
    match (target, home) {
        ("", Some(home)) | ("~", Some(home)) => home,
        ("", None) => cwd.to_path_buf(),
        (t, Some(home)) if t.starts_with("~/") => home.join(&t[2..]),
        (t, _) => cwd.join(t),
    }
}
