/// How two partial results with the same state and the same end offset are ranked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TieBreak {
    /// The alternative tried later replaces the current best.
    #[default]
    PreferLater,
    /// The alternative tried first keeps its place.
    PreferEarlier,
}

#[derive(Debug, Clone)]
pub struct ParserConfig {
    pub tie_break: TieBreak,
    /// Maximum number of nested non-terminal expansions along one branch without consuming input,
    /// which bounds left recursion. A branch reaching it is reported as failed.
    pub max_depth: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            tie_break: TieBreak::default(),
            max_depth: 4096,
        }
    }
}
