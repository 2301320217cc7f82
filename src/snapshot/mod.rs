// Backtracking checkpoints and captured output

use crate::compiler::node::ResumptionPoint;
use crate::memory::heap::GenerationId;
use crate::memory::stack::StackEntry;

/// Captured `print` output
#[derive(Debug, Clone, Default)]
pub struct Output {
    text: String,
}

impl Output {
    pub fn new() -> Self {
        Output {
            text: String::new(),
        }
    }

    pub fn print(&mut self, text: &str) {
        self.text.push_str(text);
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Drop everything printed after a checkpoint
    pub fn truncate(&mut self, len: usize) {
        self.text.truncate(len);
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Output split into lines, without a trailing empty line
    pub fn lines(&self) -> Vec<&str> {
        self.text.lines().collect()
    }
}

/// An untried way forward: the generation to roll back to, a copy of the
/// execution stack and where to resume
#[derive(Debug, Clone)]
pub struct FrozenAlternative {
    pub generation: GenerationId,
    pub stack: Vec<StackEntry>,
    pub resume: ResumptionPoint,
    pub output_len: usize,
}

impl FrozenAlternative {
    /// Rough size used for the debugger's memory readout
    pub fn estimated_size(&self) -> usize {
        std::mem::size_of::<Self>() + self.stack.len() * std::mem::size_of::<StackEntry>()
    }
}

/// Pending alternatives, most recent last
#[derive(Debug)]
pub struct AlternativeStack {
    alternatives: Vec<FrozenAlternative>,
    limit: usize,
}

impl AlternativeStack {
    pub fn new(limit: usize) -> Self {
        AlternativeStack {
            alternatives: Vec::new(),
            limit,
        }
    }

    /// Add an alternative; fails once `limit` alternatives are pending
    pub fn push(&mut self, alternative: FrozenAlternative) -> Result<(), FrozenAlternative> {
        if self.alternatives.len() >= self.limit {
            return Err(alternative);
        }
        self.alternatives.push(alternative);
        Ok(())
    }

    pub fn pop(&mut self) -> Option<FrozenAlternative> {
        self.alternatives.pop()
    }

    /// Drop every alternative above `mark`
    pub fn cut(&mut self, mark: usize) -> usize {
        let dropped = self.alternatives.len().saturating_sub(mark);
        self.alternatives.truncate(mark);
        dropped
    }

    pub fn clear(&mut self) {
        self.alternatives.clear();
    }

    pub fn len(&self) -> usize {
        self.alternatives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alternatives.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Newest generation any pending alternative would roll back to
    pub fn newest_generation(&self) -> Option<GenerationId> {
        self.alternatives.iter().map(|a| a.generation).max()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FrozenAlternative> {
        self.alternatives.iter()
    }

    pub fn memory_usage(&self) -> usize {
        self.alternatives.iter().map(|a| a.estimated_size()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::node::{NodeId, Signal};

    fn alternative(generation: u64) -> FrozenAlternative {
        FrozenAlternative {
            generation: GenerationId(generation),
            stack: Vec::new(),
            resume: ResumptionPoint::new(NodeId(0), Signal::Alternative(0)),
            output_len: 0,
        }
    }

    #[test]
    fn test_limit() {
        let mut alternatives = AlternativeStack::new(1);
        assert!(alternatives.push(alternative(1)).is_ok());
        assert!(alternatives.push(alternative(2)).is_err());
        assert_eq!(alternatives.len(), 1);
    }

    #[test]
    fn test_most_recent_first() {
        let mut alternatives = AlternativeStack::new(10);
        alternatives.push(alternative(1)).unwrap();
        alternatives.push(alternative(2)).unwrap();
        assert_eq!(alternatives.pop().map(|a| a.generation), Some(GenerationId(2)));
    }

    #[test]
    fn test_cut() {
        let mut alternatives = AlternativeStack::new(10);
        for g in 1..=4 {
            alternatives.push(alternative(g)).unwrap();
        }
        assert_eq!(alternatives.cut(1), 3);
        assert_eq!(alternatives.newest_generation(), Some(GenerationId(1)));
    }

    #[test]
    fn test_output_truncate() {
        let mut output = Output::new();
        output.print("a\n");
        let mark = output.len();
        output.print("b\n");
        output.truncate(mark);
        assert_eq!(output.lines(), vec!["a"]);
    }
}
