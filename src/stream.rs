//! Incremental reasoning/answer splitter.
//!
//! Reasoning models wrap their intermediate thinking in
//! `<think>…</think>` before the actual answer. Deltas arrive with no
//! alignment guarantee, so a delimiter can straddle any number of
//! events; the decoder owns the full accumulated buffer and re-scans it
//! on every push. Incremental output holds back any buffer tail that
//! could still turn into a delimiter, and `finish` flushes the rest.

pub const THINK_OPEN: &str = "<think>";
pub const THINK_CLOSE: &str = "</think>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// No opening delimiter seen; everything is answer so far.
    Plain,
    /// Inside the reasoning block.
    Opened,
    /// Reasoning closed; the rest is answer.
    Closed,
}

/// Newly stable text per channel produced by one push.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedDelta {
    pub thought: String,
    pub answer: String,
}

impl DecodedDelta {
    pub fn is_empty(&self) -> bool {
        self.thought.is_empty() && self.answer.is_empty()
    }
}

#[derive(Debug)]
pub struct StreamDecoder {
    buf: String,
    phase: Phase,
    /// Byte offset of the opening delimiter, once seen.
    open_start: usize,
    /// Byte offset just past the opening delimiter.
    open_end: usize,
    /// Byte offsets around the closing delimiter, once seen.
    close_start: usize,
    close_end: usize,
    emitted_thought: usize,
    emitted_answer: usize,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self {
            buf: String::new(),
            phase: Phase::Plain,
            open_start: 0,
            open_end: 0,
            close_start: 0,
            close_end: 0,
            emitted_thought: 0,
            emitted_answer: 0,
        }
    }

    /// Appends one delta and returns whatever became stable.
    pub fn push(&mut self, delta: &str) -> DecodedDelta {
        self.buf.push_str(delta);
        self.advance();
        self.drain_stable(false)
    }

    /// Flushes text held back as a possible delimiter prefix. Call at
    /// end of stream, when nothing can complete a delimiter anymore.
    pub fn flush(&mut self) -> DecodedDelta {
        self.advance();
        self.drain_stable(true)
    }

    /// Ends the stream: flushes held-back text and returns the final
    /// `(thought, answer)` pair.
    pub fn finish(&mut self) -> (String, String) {
        let _ = self.flush();
        (self.thought().to_string(), self.answer())
    }

    /// Thought text accumulated so far (final once closed).
    pub fn thought(&self) -> &str {
        match self.phase {
            Phase::Plain => "",
            Phase::Opened => &self.buf[self.open_end..],
            Phase::Closed => &self.buf[self.open_end..self.close_start],
        }
    }

    /// Answer text accumulated so far: everything outside the
    /// reasoning block, in order.
    pub fn answer(&self) -> String {
        match self.phase {
            Phase::Plain => self.buf.clone(),
            Phase::Opened => self.buf[..self.open_start].to_string(),
            Phase::Closed => {
                let mut out = String::with_capacity(self.buf.len());
                out.push_str(&self.buf[..self.open_start]);
                out.push_str(&self.buf[self.close_end..]);
                out
            }
        }
    }

    /// Runs delimiter detection over the accumulated buffer. Each
    /// delimiter binds at its first occurrence and stays bound.
    fn advance(&mut self) {
        if self.phase == Phase::Plain {
            if let Some(pos) = self.buf.find(THINK_OPEN) {
                self.phase = Phase::Opened;
                self.open_start = pos;
                self.open_end = pos + THINK_OPEN.len();
            }
        }
        if self.phase == Phase::Opened {
            if let Some(pos) = self.buf[self.open_end..].find(THINK_CLOSE) {
                self.phase = Phase::Closed;
                self.close_start = self.open_end + pos;
                self.close_end = self.close_start + THINK_CLOSE.len();
            }
        }
    }

    fn drain_stable(&mut self, flush: bool) -> DecodedDelta {
        let thought = self.thought().to_string();
        let answer = self.answer();

        let (stable_thought, stable_answer) = match self.phase {
            Phase::Plain => {
                let hold = if flush {
                    0
                } else {
                    partial_delim_suffix(&answer, THINK_OPEN)
                };
                (0, answer.len() - hold)
            }
            Phase::Opened => {
                let hold = if flush {
                    0
                } else {
                    partial_delim_suffix(&thought, THINK_CLOSE)
                };
                (thought.len() - hold, answer.len())
            }
            Phase::Closed => (thought.len(), answer.len()),
        };

        let mut out = DecodedDelta::default();
        if stable_thought > self.emitted_thought {
            out.thought = thought[self.emitted_thought..stable_thought].to_string();
            self.emitted_thought = stable_thought;
        }
        if stable_answer > self.emitted_answer {
            out.answer = answer[self.emitted_answer..stable_answer].to_string();
            self.emitted_answer = stable_answer;
        }
        out
    }
}

impl Default for StreamDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Length of the longest proper prefix of `delim` that ends `text`.
/// That tail cannot be classified yet: the next delta may complete the
/// delimiter.
fn partial_delim_suffix(text: &str, delim: &str) -> usize {
    let max = delim.len().saturating_sub(1).min(text.len());
    for len in (1..=max).rev() {
        if text.ends_with(&delim[..len]) {
            return len;
        }
    }
    0
}

/// Removes one leading reasoning block from a completed response.
/// Used to normalize classifier output before matching.
pub fn strip_reasoning(text: &str) -> String {
    let mut decoder = StreamDecoder::new();
    decoder.push(text);
    let (_, answer) = decoder.finish();
    answer
}
