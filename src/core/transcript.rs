//! Transcript: the console's bounded text cache and process status
//!
//! The console and the running command's output worker write a transcript.
//! Other threads read snapshots from it and may block until the running
//! command finishes.

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

/// Whether a child process is running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    /// No child process
    Closed,
    /// A child process is running
    Started,
}

/// Longest line kept in one piece. Longer output (e.g. `\r` progress bars)
/// continues on a new line, so memory stays bounded by the line limit.
pub const MAX_LINE_BYTES: usize = 16 * 1024;

/// Line-bounded text buffer.
///
/// Text is kept as lines; the last one may be partial (no terminator yet),
/// and the next append continues it until it reaches [`MAX_LINE_BYTES`].
#[derive(Debug, Clone)]
pub struct TextCache {
    lines: VecDeque<String>,
    max_lines: usize,
    /// Total bytes ever trimmed from the front
    trimmed: u64,
    /// Total bytes ever appended
    appended: u64,
}

impl TextCache {
    pub fn new(max_lines: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            max_lines,
            trimmed: 0,
            appended: 0,
        }
    }

    pub fn append(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.appended += text.len() as u64;

        let mut rest = text;
        while !rest.is_empty() {
            let line_end = rest.find('\n').map(|i| i + 1).unwrap_or(rest.len());
            if let Some(last) = self.lines.back_mut().filter(|l| !l.ends_with('\n')) {
                let room = MAX_LINE_BYTES.saturating_sub(last.len());
                let take = floor_char_boundary(rest, line_end.min(room));
                if take > 0 {
                    last.push_str(&rest[..take]);
                    rest = &rest[take..];
                    continue;
                }
            }
            let take = floor_char_boundary(rest, line_end.min(MAX_LINE_BYTES));
            self.lines.push_back(rest[..take].to_string());
            rest = &rest[take..];
        }

        while self.lines.len() > self.max_lines {
            if let Some(line) = self.lines.pop_front() {
                self.trimmed += line.len() as u64;
            }
        }
    }

    pub fn text(&self) -> String {
        let mut out = String::with_capacity(self.lines.iter().map(String::len).sum());
        for line in &self.lines {
            out.push_str(line);
        }
        out
    }

    /// Text appended after absolute byte offset `pos`, and the new end offset.
    ///
    /// If part of that range was already trimmed, only what survives is
    /// returned.
    pub fn since(&self, pos: u64) -> (String, u64) {
        let mut skip = pos.saturating_sub(self.trimmed);
        let mut out = String::new();
        for line in &self.lines {
            let len = line.len() as u64;
            if skip >= len {
                skip -= len;
                continue;
            }
            let start = skip as usize;
            skip = 0;
            match line.get(start..) {
                Some(tail) => out.push_str(tail),
                None => out.push_str(&String::from_utf8_lossy(&line.as_bytes()[start..])),
            }
        }
        (out, self.appended)
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn end_offset(&self) -> u64 {
        self.appended
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Largest char boundary of `s` not above `n`
fn floor_char_boundary(s: &str, n: usize) -> usize {
    let mut i = n.min(s.len());
    while !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

struct TranscriptState {
    cache: TextCache,
    status: ProcessStatus,
    revision: u64,
}

/// Shared text cache plus process status
pub struct Transcript {
    state: Mutex<TranscriptState>,
    closed: Condvar,
}

impl Transcript {
    pub fn new(max_lines: usize) -> Self {
        Self {
            state: Mutex::new(TranscriptState {
                cache: TextCache::new(max_lines),
                status: ProcessStatus::Closed,
                revision: 0,
            }),
            closed: Condvar::new(),
        }
    }

    pub(crate) fn append(&self, text: &str) {
        if text.is_empty() {
            return;
        }
        let mut state = self.state.lock();
        state.cache.append(text);
        state.revision += 1;
    }

    pub(crate) fn set_status(&self, status: ProcessStatus) {
        let mut state = self.state.lock();
        state.status = status;
        if status == ProcessStatus::Closed {
            self.closed.notify_all();
        }
    }

    pub fn status(&self) -> ProcessStatus {
        self.state.lock().status
    }

    pub fn snapshot(&self) -> String {
        self.state.lock().cache.text()
    }

    /// Text appended after absolute offset `pos`, and the new end offset
    pub fn since(&self, pos: u64) -> (String, u64) {
        self.state.lock().cache.since(pos)
    }

    pub fn end_offset(&self) -> u64 {
        self.state.lock().cache.end_offset()
    }

    /// Incremented on every append; used to coalesce redraws
    pub fn revision(&self) -> u64 {
        self.state.lock().revision
    }

    pub fn line_count(&self) -> usize {
        self.state.lock().cache.line_count()
    }

    /// Block until no child process is running
    pub fn wait_closed(&self) {
        let mut state = self.state.lock();
        while state.status != ProcessStatus::Closed {
            self.closed.wait(&mut state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_partial_lines_are_joined() {
        let mut cache = TextCache::new(10);
        cache.append("hel");
        cache.append("lo\nwor");
        cache.append("ld\n");
        assert_eq!(cache.text(), "hello\nworld\n");
        assert_eq!(cache.line_count(), 2);
    }

    #[test]
    fn test_trims_oldest_lines() {
        let mut cache = TextCache::new(3);
        for i in 0..6 {
            cache.append(&format!("line {}\n", i));
        }
        assert_eq!(cache.text(), "line 3\nline 4\nline 5\n");
    }

    #[test]
    fn test_unterminated_output_is_split() {
        let mut cache = TextCache::new(2);
        let bar = "#".repeat(MAX_LINE_BYTES + 10);
        cache.append(&bar);
        assert_eq!(cache.line_count(), 2);
        assert_eq!(cache.text(), bar);

        // Endless output without newlines stays within the line limit
        for _ in 0..5 {
            cache.append(&"=".repeat(MAX_LINE_BYTES));
        }
        assert_eq!(cache.line_count(), 2);
        assert!(cache.text().len() <= 2 * MAX_LINE_BYTES);
        assert_eq!(cache.end_offset(), (6 * MAX_LINE_BYTES + 10) as u64);
    }

    #[test]
    fn test_split_respects_char_boundaries() {
        let mut cache = TextCache::new(10);
        cache.append(&"a".repeat(MAX_LINE_BYTES - 1));
        cache.append("é\n");
        // "é" does not fit in the one byte left; it starts the next line
        assert_eq!(cache.line_count(), 2);
        assert_eq!(cache.text(), format!("{}é\n", "a".repeat(MAX_LINE_BYTES - 1)));
    }

    #[test]
    fn test_since_tracks_absolute_offsets() {
        let mut cache = TextCache::new(2);
        cache.append("a\n");
        let (text, pos) = cache.since(0);
        assert_eq!(text, "a\n");

        cache.append("b\nc\nd\n");
        let (text, end) = cache.since(pos);
        // "b\n" was trimmed before it could be read
        assert_eq!(text, "c\nd\n");
        assert_eq!(end, 8);
        assert_eq!(cache.since(end).0, "");
    }

    #[test]
    fn test_wait_closed_wakes_on_status_change() {
        let transcript = Arc::new(Transcript::new(10));
        transcript.set_status(ProcessStatus::Started);

        let waiter = {
            let transcript = transcript.clone();
            thread::spawn(move || {
                transcript.wait_closed();
                transcript.snapshot()
            })
        };

        thread::sleep(Duration::from_millis(20));
        transcript.append("done\n");
        transcript.set_status(ProcessStatus::Closed);
        assert_eq!(waiter.join().unwrap(), "done\n");
    }
}
