//! Virtual standard streams
//!
//! Each stream owns an OS pipe. Writers put bytes into the pipe; a drain
//! worker reads them back out and hands them to the console as events:
//! output text for a stdout stream, complete command lines for a stdin
//! stream. Reads are served from a snapshot of the console transcript.

use std::io::{self, ErrorKind, PipeReader, PipeWriter, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::session::ConsoleEvent;
use super::transcript::Transcript;
use crate::error::{ConsoleError, Result};

/// Direction of a virtual stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    /// Text written lands in the transcript
    Stdout,
    /// Lines written are submitted as commands
    Stdin,
}

/// Unread transcript text and the absolute offset it was pulled up to
#[derive(Default)]
struct Snapshot {
    pending: String,
    offset: u64,
}

/// Pipe-backed stream attached to a console
pub struct VirtualStream {
    mode: StreamMode,
    writer: Mutex<Option<PipeWriter>>,
    drain: Mutex<Option<JoinHandle<()>>>,
    transcript: Arc<Transcript>,
    snapshot: Mutex<Snapshot>,
    closed: AtomicBool,
}

impl VirtualStream {
    pub(crate) fn open(
        mode: StreamMode,
        transcript: Arc<Transcript>,
        events: Sender<ConsoleEvent>,
    ) -> Result<Self> {
        let (reader, writer) = io::pipe()?;
        let name = match mode {
            StreamMode::Stdout => "rconsole-stdout",
            StreamMode::Stdin => "rconsole-stdin",
        };
        let drain = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || drain_pipe(mode, reader, events))?;

        let offset = transcript.end_offset();
        Ok(Self {
            mode,
            writer: Mutex::new(Some(writer)),
            drain: Mutex::new(Some(drain)),
            transcript,
            snapshot: Mutex::new(Snapshot {
                pending: String::new(),
                offset,
            }),
            closed: AtomicBool::new(false),
        })
    }

    pub fn mode(&self) -> StreamMode {
        self.mode
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Write bytes into the stream's pipe
    pub fn write(&self, bytes: &[u8]) -> Result<usize> {
        let mut writer = self.writer.lock();
        let writer = writer.as_mut().ok_or(ConsoleError::ClosedStream)?;
        writer.write_all(bytes)?;
        writer.flush()?;
        Ok(bytes.len())
    }

    /// Read from the transcript snapshot.
    ///
    /// `n == 0` blocks until no command is running, then returns everything
    /// not read yet. The running command's output is in the transcript by
    /// the time it ends, so no concurrent `Console::pump` is needed.
    /// `n > 0` returns up to `n` bytes of the current snapshot.
    pub fn read(&self, n: usize) -> Result<String> {
        self.ensure_readable()?;

        if n == 0 {
            self.transcript.wait_closed();
            self.flush()?;
            return Ok(std::mem::take(&mut self.snapshot.lock().pending));
        }

        let mut snapshot = self.snapshot.lock();
        let cut = char_boundary_at_most(&snapshot.pending, n);
        let rest = snapshot.pending.split_off(cut);
        Ok(std::mem::replace(&mut snapshot.pending, rest))
    }

    /// Next line of the snapshot including its newline, or `None` if the
    /// snapshot holds no complete line. Never blocks.
    pub fn readline(&self) -> Result<Option<String>> {
        self.ensure_readable()?;

        let mut snapshot = self.snapshot.lock();
        let Some(pos) = snapshot.pending.find('\n') else {
            return Ok(None);
        };
        let rest = snapshot.pending.split_off(pos + 1);
        Ok(Some(std::mem::replace(&mut snapshot.pending, rest)))
    }

    /// Pull transcript text appended since the last pull into the snapshot
    pub fn flush(&self) -> Result<()> {
        if self.is_closed() {
            return Err(ConsoleError::ClosedStream);
        }
        if let Some(writer) = self.writer.lock().as_mut() {
            writer.flush()?;
        }
        if self.mode == StreamMode::Stdout {
            let mut snapshot = self.snapshot.lock();
            let (text, end) = self.transcript.since(snapshot.offset);
            snapshot.pending.push_str(&text);
            snapshot.offset = end;
        }
        Ok(())
    }

    /// Close the write end. The drain worker sees end of stream and exits,
    /// dropping the read end. Closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        drop(self.writer.lock().take());

        if let Some(drain) = self.drain.lock().take() {
            // Writers cloned through `try_clone_writer` keep the pipe open
            // and the worker alive; it finishes on its own when they go.
            if drain.is_finished() {
                let _ = drain.join();
            } else {
                debug!("{:?} stream closed with writers still attached", self.mode);
            }
        }
        Ok(())
    }

    /// Another handle to the write end, e.g. to redirect a child's output:
    /// `Command::new("make").stdout(console.stdout().try_clone_writer()?)`.
    pub fn try_clone_writer(&self) -> Result<PipeWriter> {
        let writer = self.writer.lock();
        let writer = writer.as_ref().ok_or(ConsoleError::ClosedStream)?;
        Ok(writer.try_clone()?)
    }

    /// Raw descriptor of the write end
    #[cfg(unix)]
    pub fn as_raw_fd(&self) -> Option<std::os::unix::io::RawFd> {
        use std::os::unix::io::AsRawFd;
        self.writer.lock().as_ref().map(|w| w.as_raw_fd())
    }

    fn ensure_readable(&self) -> Result<()> {
        if self.is_closed() {
            return Err(ConsoleError::ClosedStream);
        }
        if self.mode == StreamMode::Stdin {
            warn!("Rejected read on stdin stream");
            return Err(ConsoleError::UnsupportedOperation);
        }
        Ok(())
    }
}

impl Drop for VirtualStream {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Drain worker body; runs until every write end is closed
fn drain_pipe(mode: StreamMode, mut reader: PipeReader, events: Sender<ConsoleEvent>) {
    let mut buf = [0u8; 4096];
    let mut carry: Vec<u8> = Vec::new();

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!("{:?} pipe read failed: {}", mode, e);
                break;
            }
        };
        carry.extend_from_slice(&buf[..n]);

        let sent = match mode {
            StreamMode::Stdout => {
                let text = take_utf8(&mut carry);
                text.is_empty() || events.send(ConsoleEvent::Output(text)).is_ok()
            }
            StreamMode::Stdin => take_lines(&mut carry)
                .into_iter()
                .all(|line| events.send(ConsoleEvent::Submit(line)).is_ok()),
        };
        if !sent {
            break;
        }
    }

    // Whatever is left at end of stream
    if !carry.is_empty() {
        let text = String::from_utf8_lossy(&carry).into_owned();
        let event = match mode {
            StreamMode::Stdout => ConsoleEvent::Output(text),
            StreamMode::Stdin => ConsoleEvent::Submit(text.trim_end_matches('\r').to_string()),
        };
        let _ = events.send(event);
    }
    debug!("{:?} drain worker finished", mode);
}

/// Decode the longest valid UTF-8 prefix of `carry`, keeping an incomplete
/// trailing sequence for the next read
pub(super) fn take_utf8(carry: &mut Vec<u8>) -> String {
    let valid = match std::str::from_utf8(&carry[..]) {
        Ok(_) => carry.len(),
        Err(e) if e.error_len().is_none() => e.valid_up_to(),
        Err(_) => {
            let text = String::from_utf8_lossy(&carry[..]).into_owned();
            carry.clear();
            return text;
        }
    };
    let rest = carry.split_off(valid);
    let text = String::from_utf8_lossy(&carry[..]).into_owned();
    *carry = rest;
    text
}

/// Split off every complete line, without terminators
fn take_lines(carry: &mut Vec<u8>) -> Vec<String> {
    let mut lines = Vec::new();
    while let Some(pos) = carry.iter().position(|&b| b == b'\n') {
        let rest = carry.split_off(pos + 1);
        let line = String::from_utf8_lossy(&carry[..pos]);
        lines.push(line.trim_end_matches('\r').to_string());
        *carry = rest;
    }
    lines
}

fn char_boundary_at_most(s: &str, n: usize) -> usize {
    if n >= s.len() {
        return s.len();
    }
    let mut cut = n;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    if cut == 0 {
        // Always hand out at least one char
        s.chars().next().map(char::len_utf8).unwrap_or(0)
    } else {
        cut
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_take_utf8_keeps_split_sequence() {
        let bytes = "é".as_bytes();
        let mut carry = vec![b'a', bytes[0]];
        assert_eq!(take_utf8(&mut carry), "a");
        assert_eq!(carry, vec![bytes[0]]);
        carry.push(bytes[1]);
        assert_eq!(take_utf8(&mut carry), "é");
        assert!(carry.is_empty());
    }

    #[test]
    fn test_take_lines() {
        let mut carry = b"ls\r\npwd\npart".to_vec();
        assert_eq!(take_lines(&mut carry), vec!["ls", "pwd"]);
        assert_eq!(carry, b"part".to_vec());
    }

    #[test]
    fn test_char_boundary() {
        assert_eq!(char_boundary_at_most("héllo", 2), 1);
        assert_eq!(char_boundary_at_most("éa", 1), 2);
        assert_eq!(char_boundary_at_most("abc", 10), 3);
    }

    #[test]
    fn test_stdin_stream_submits_complete_lines() {
        let transcript = Arc::new(Transcript::new(10));
        let (tx, rx) = mpsc::channel();
        let stream = VirtualStream::open(StreamMode::Stdin, transcript, tx).unwrap();

        stream.write(b"who").unwrap();
        stream.write(b"ami\n").unwrap();
        match rx.recv_timeout(Duration::from_secs(5)).unwrap() {
            ConsoleEvent::Submit(line) => assert_eq!(line, "whoami"),
            other => panic!("unexpected event {other:?}"),
        }

        assert!(matches!(stream.read(0), Err(ConsoleError::UnsupportedOperation)));
        assert!(matches!(stream.readline(), Err(ConsoleError::UnsupportedOperation)));
    }

    #[test]
    fn test_reads_from_flushed_snapshot() {
        let transcript = Arc::new(Transcript::new(10));
        let (tx, _rx) = mpsc::channel();
        let stream = VirtualStream::open(StreamMode::Stdout, transcript.clone(), tx).unwrap();

        transcript.append("first\nsecond\nthi");
        assert_eq!(stream.readline().unwrap(), None);

        stream.flush().unwrap();
        assert_eq!(stream.readline().unwrap().as_deref(), Some("first\n"));
        assert_eq!(stream.read(3).unwrap(), "sec");
        assert_eq!(stream.readline().unwrap().as_deref(), Some("ond\n"));
        assert_eq!(stream.readline().unwrap(), None);
        assert_eq!(stream.read(0).unwrap(), "thi");
    }

    #[test]
    fn test_closed_stream_rejects_everything() {
        let transcript = Arc::new(Transcript::new(10));
        let (tx, _rx) = mpsc::channel();
        let stream = VirtualStream::open(StreamMode::Stdout, transcript, tx).unwrap();

        stream.close().unwrap();
        stream.close().unwrap();
        assert!(matches!(stream.write(b"x"), Err(ConsoleError::ClosedStream)));
        assert!(matches!(stream.read(1), Err(ConsoleError::ClosedStream)));
        assert!(matches!(stream.readline(), Err(ConsoleError::ClosedStream)));
        assert!(matches!(stream.flush(), Err(ConsoleError::ClosedStream)));
        assert!(stream.try_clone_writer().is_err());
    }
}
