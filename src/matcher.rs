use serde::Serialize;

use crate::config::TieBreak;

/// Outcome of matching a terminal, ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ParsingState {
    Successful,
    EndOfInput,
    Failed,
    NotParsed,
}

impl ParsingState {
    pub fn is_better_than(self, other: ParsingState) -> bool {
        self < other
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Matcher {
    pub state: ParsingState,
    pub pos: usize,
    pub parsed: String,
}

impl Matcher {
    pub fn new(state: ParsingState, pos: usize, parsed: impl Into<String>) -> Self {
        Self {
            state,
            pos,
            parsed: parsed.into(),
        }
    }

    pub fn not_parsed(pos: usize) -> Self {
        Self::new(ParsingState::NotParsed, pos, String::new())
    }

    /// Offset right after the matched text.
    pub fn end(&self) -> usize {
        self.pos + self.parsed.len()
    }

    pub fn is_better_than(&self, other: &Matcher, tie_break: TieBreak) -> bool {
        if self.state != other.state {
            return self.state.is_better_than(other.state);
        }
        match tie_break {
            TieBreak::PreferLater => self.end() >= other.end(),
            TieBreak::PreferEarlier => self.end() > other.end(),
        }
    }
}
