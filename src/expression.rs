use serde::Serialize;

use crate::utils::IntRange;

/// One piece of a sentence pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PatternItem {
    /// Text matched verbatim. Never starts or ends with a blank.
    Literal(String),
    /// A run of blanks between two items.
    Whitespace,
    Variable(Variable),
}

/// `{name[:type][:quantifier]}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Variable {
    pub name: String,
    pub ty: Option<TypeSpec>,
    pub quantifier: Option<IntRange>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TypeSpec {
    /// A type defined in the language, e.g. `int`.
    Named(String),
    /// `[...]`, kept with its brackets.
    CharacterClass(String),
    /// `list<entry>`
    List(String),
    /// `tuple<entry, name1, name2, ...>`
    Tuple { entry: String, names: Vec<String> },
}
