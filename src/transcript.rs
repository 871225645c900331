use std::collections::VecDeque;

use chrono::{DateTime, Local};

pub const SPIRIT_TAG: &str = "[KAISEL] —";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineKind { User, Status, Reply, Error, System }

#[derive(Clone, Debug)]
pub struct TranscriptLine {
    pub kind: LineKind,
    pub text: String,
    pub at:   DateTime<Local>,
}
impl TranscriptLine {
    pub fn display(&self) -> String {
        match self.kind {
            LineKind::User => format!("You: {}", self.text),
            _              => format!("{SPIRIT_TAG} {}", self.text),
        }
    }
}

/// Append-only console log, capped at `max_lines`.
#[derive(Debug)]
pub struct Transcript {
    lines:     VecDeque<TranscriptLine>,
    max_lines: usize,
}
impl Transcript {
    pub fn new(max_lines: usize) -> Self {
        Self { lines: VecDeque::new(), max_lines: max_lines.max(1) }
    }

    pub fn push(&mut self, kind: LineKind, text: impl Into<String>) {
        self.lines.push_back(TranscriptLine { kind, text: text.into(), at: Local::now() });
        while self.lines.len() > self.max_lines {
            self.lines.pop_front();
        }
    }

    pub fn lines(&self) -> impl Iterator<Item = &TranscriptLine> { self.lines.iter() }
    #[cfg(test)]
    pub fn len(&self) -> usize { self.lines.len() }
    #[cfg(test)]
    pub fn is_empty(&self) -> bool { self.lines.is_empty() }
    #[cfg(test)]
    pub fn last(&self) -> Option<&TranscriptLine> { self.lines.back() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_by_kind() {
        let mut t = Transcript::new(10);
        t.push(LineKind::User, "hello");
        t.push(LineKind::Status, "processing...");
        let shown: Vec<_> = t.lines().map(|l| l.display()).collect();
        assert_eq!(shown, ["You: hello", "[KAISEL] — processing..."]);
    }

    #[test]
    fn oldest_lines_drop_past_the_cap() {
        let mut t = Transcript::new(3);
        for i in 0..5 {
            t.push(LineKind::System, i.to_string());
        }
        let texts: Vec<_> = t.lines().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, ["2", "3", "4"]);
    }
}
