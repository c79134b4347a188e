//! sentence-grammar - Controlled natural languages from sentence patterns with typed placeholders,
//! with a backtracking parser that also tells what may come next.
//!
//! ## How does a language look like?
//!
//! A language is a set of sentence patterns. Text in a pattern is matched literally, `{name:type}`
//! is a placeholder of a known type:
//!
//! ```text
//! Excite with {power:int}% at {wavelength:int}nm.
//! Wait for {t:time}.
//! Use channels {c:list<int>:1-4}.
//! ```
//!
//! Patterns are lowered to EBNF [rules](rule::Rule), which are lowered to plain [BNF](bnf::Bnf)
//! and parsed by a [backtracking recursive-descent parser](rd_parser::RdParser). When the input
//! ends early, the parser proposes [completions](autocompletion::Autocompletion) for what is
//! missing.
//!
//! ## How to use this library?
//!
//! ```rust
//! use sentence_grammar::{Language, Purpose, Value};
//!
//! let mut language = Language::new();
//! language
//!     .define_sentence("Wake me up at {t:time}.")?
//!     .evaluator(|node| node.evaluate_named(&["t"]));
//!
//! let program = language.parse("Wake me up at 7:30.", None)?;
//! assert_eq!(
//!     program.evaluate()?,
//!     Value::List(vec![Value::Time { hour: 7, minute: 30 }])
//! );
//!
//! let mut autocompletions = Vec::new();
//! language.parse("Wake me up at ", Some(&mut autocompletions))?;
//! assert_eq!(autocompletions[0].completion(Purpose::ForMenu), "${HH}:${MM}");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod autocompletion;
pub mod bnf;
pub mod builtins;
pub mod config;
pub mod evaluator;
pub mod expression;
pub mod grammar;
pub mod language;
pub mod lexer;
pub mod matcher;
pub mod node;
pub mod parse_error;
mod parser;
pub mod rd_parser;
pub mod regex;
pub mod rule;
pub mod semantic_error;
pub mod symbol;
pub mod utils;

pub use autocompletion::{Autocompleter, Autocompletion, Purpose};
pub use config::{ParserConfig, TieBreak};
pub use evaluator::{EvaluationError, Value};
pub use grammar::{Grammar, RuleMut};
pub use language::{Language, LanguageError};
pub use matcher::ParsingState;
pub use node::{NodeRef, ParseTree};
pub use parse_error::ParseError;
pub use rd_parser::RdParser;
pub use semantic_error::SemanticError;
pub use symbol::{Nameable, NonTerminal, Symbol, Terminal};
pub use utils::IntRange;
