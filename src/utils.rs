use std::fmt::Display;

use serde::Serialize;

/// An inclusive range of admissible entry counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct IntRange {
    pub lower: usize,
    pub upper: usize,
}

impl IntRange {
    pub const MAX: usize = i32::MAX as usize;
    pub const STAR: IntRange = IntRange::new(0, Self::MAX);
    pub const PLUS: IntRange = IntRange::new(1, Self::MAX);
    pub const OPTIONAL: IntRange = IntRange::new(0, 1);

    pub const fn new(lower: usize, upper: usize) -> Self {
        Self { lower, upper }
    }

    pub const fn exactly(n: usize) -> Self {
        Self::new(n, n)
    }

    pub fn contains(&self, n: usize) -> bool {
        self.lower <= n && n <= self.upper
    }
}

impl Display for IntRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::STAR => write!(f, "*"),
            Self::PLUS => write!(f, "+"),
            Self::OPTIONAL => write!(f, "?"),
            IntRange { lower, upper } if lower == upper => write!(f, "{lower}"),
            IntRange { lower, upper } => write!(f, "{lower}-{upper}"),
        }
    }
}
