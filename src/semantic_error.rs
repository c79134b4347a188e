use thiserror::Error;

#[derive(Error, Debug)]
pub enum SemanticError {
    #[error("the nonterminal `{0}` is used but not defined.")]
    UndefinedNonTerminal(String),
    #[error("the type `{0}` is not defined.")]
    UnknownType(String),
    #[error("a join must have both an opening and a closing symbol or neither of them.")]
    UnbalancedJoin,
    #[error("a repetition rule needs a child symbol.")]
    MissingChild,
    #[error("the range {lower}-{upper} is empty.")]
    InvalidRange { lower: usize, upper: usize },
    #[error("invalid character class `{pattern}`")]
    InvalidCharacterClass {
        pattern: String,
        #[source]
        source: regex_lite::Error,
    },
    #[error("invalid pattern:\n{0}")]
    InvalidPattern(String),
}
