use serde::{Deserialize, Serialize};

/// How the renderer should style a trace line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Top-level step of the algorithm
    Info,
    /// Sub-step of the previous line (relaxations, per-replica tallies)
    Detail,
    /// Fault designation notices
    Warning,
    /// A phase or the whole run succeeded
    Success,
    /// Terminal failure of the run
    Failure,
}

/// A single line of the step log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    /// Position in the trace, starting at 0
    pub seq: usize,
    pub line: String,
    pub kind: StepKind,
}

/// Append-only, ordered step log. Only [`Trace::clear`] removes entries.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Trace {
    entries: Vec<TraceEntry>,
}

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, kind: StepKind, line: impl Into<String>) {
        let entry = TraceEntry {
            seq: self.entries.len(),
            line: line.into(),
            kind,
        };
        self.entries.push(entry);
    }

    pub fn info(&mut self, line: impl Into<String>) {
        self.push(StepKind::Info, line);
    }

    pub fn detail(&mut self, line: impl Into<String>) {
        self.push(StepKind::Detail, line);
    }

    pub fn warn(&mut self, line: impl Into<String>) {
        self.push(StepKind::Warning, line);
    }

    pub fn success(&mut self, line: impl Into<String>) {
        self.push(StepKind::Success, line);
    }

    pub fn failure(&mut self, line: impl Into<String>) {
        self.push(StepKind::Failure, line);
    }

    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    /// Entries appended at or after position `from`
    pub fn since(&self, from: usize) -> &[TraceEntry] {
        self.entries.get(from..).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&TraceEntry> {
        self.entries.last()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
