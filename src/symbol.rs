use std::rc::Rc;

use rustc_hash::FxHashMap;
use string_interner::{backend::StringBackend, symbol::SymbolU32, StringInterner};

use crate::{
    evaluator::Value,
    lexer::Lexer,
    matcher::{Matcher, ParsingState},
    regex::CharacterClass,
    semantic_error::SemanticError,
};

/// A symbol defined by productions, identified by its interned name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NonTerminal(pub(crate) SymbolU32);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Terminal {
    Epsilon,
    EndOfInput,
    Digit,
    Letter,
    /// A space or a tab.
    Whitespace,
    Literal(Rc<str>),
    CharacterClass(CharacterClass),
}

impl Terminal {
    pub fn literal(text: &str) -> Self {
        Self::Literal(Rc::from(text))
    }

    pub fn character_class(pattern: &str) -> Result<Self, SemanticError> {
        CharacterClass::new(pattern).map(Self::CharacterClass)
    }

    pub fn name(&self) -> &str {
        match self {
            Terminal::Epsilon => "epsilon",
            Terminal::EndOfInput => "EOI",
            Terminal::Digit => "digit",
            Terminal::Letter => "letter",
            Terminal::Whitespace => "whitespace",
            Terminal::Literal(text) => text,
            Terminal::CharacterClass(class) => class.pattern(),
        }
    }

    pub fn matches(&self, lexer: &Lexer<'_>) -> Matcher {
        let pos = lexer.position();
        match self {
            Terminal::Epsilon => Matcher::new(ParsingState::Successful, pos, ""),
            Terminal::EndOfInput => {
                let state = if lexer.is_at_end() {
                    ParsingState::Successful
                } else {
                    ParsingState::Failed
                };
                Matcher::new(state, pos, "")
            }
            Terminal::Literal(text) => {
                let remaining = lexer.remaining();
                let mut input = remaining.char_indices();
                for expected in text.chars() {
                    match input.next() {
                        None => {
                            return Matcher::new(ParsingState::EndOfInput, pos, remaining);
                        }
                        Some((i, c)) if c != expected => {
                            return Matcher::new(
                                ParsingState::Failed,
                                pos,
                                &remaining[..i + c.len_utf8()],
                            );
                        }
                        Some(_) => {}
                    }
                }
                Matcher::new(ParsingState::Successful, pos, &**text)
            }
            Terminal::Digit
            | Terminal::Letter
            | Terminal::Whitespace
            | Terminal::CharacterClass(_) => {
                let Some(c) = lexer.peek() else {
                    return Matcher::new(ParsingState::EndOfInput, pos, "");
                };
                let state = if self.accepts(c) {
                    ParsingState::Successful
                } else {
                    ParsingState::Failed
                };
                Matcher::new(state, pos, c)
            }
        }
    }

    fn accepts(&self, c: char) -> bool {
        match self {
            Terminal::Digit => c.is_ascii_digit(),
            Terminal::Letter => c.is_alphabetic(),
            Terminal::Whitespace => c == ' ' || c == '\t',
            Terminal::CharacterClass(class) => class.is_match(c),
            Terminal::Epsilon | Terminal::EndOfInput | Terminal::Literal(_) => false,
        }
    }

    pub fn evaluate(&self, matcher: &Matcher) -> Value {
        match self {
            Terminal::Epsilon | Terminal::EndOfInput => Value::Null,
            Terminal::Literal(_) => Value::Str(matcher.parsed.clone()),
            _ => matcher
                .parsed
                .chars()
                .next()
                .map_or(Value::Null, |c| Value::Str(c.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Symbol {
    Terminal(Terminal),
    NonTerminal(NonTerminal),
}

impl Symbol {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Symbol::Terminal(_))
    }

    pub fn is_epsilon(&self) -> bool {
        matches!(self, Symbol::Terminal(Terminal::Epsilon))
    }

    pub fn as_non_terminal(&self) -> Option<NonTerminal> {
        match self {
            Symbol::NonTerminal(nonterminal) => Some(*nonterminal),
            Symbol::Terminal(_) => None,
        }
    }
}

impl From<Terminal> for Symbol {
    fn from(terminal: Terminal) -> Self {
        Symbol::Terminal(terminal)
    }
}

impl From<NonTerminal> for Symbol {
    fn from(nonterminal: NonTerminal) -> Self {
        Symbol::NonTerminal(nonterminal)
    }
}

/// A symbol together with the name its occurrence gets inside a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Named {
    pub symbol: Symbol,
    pub name: Option<String>,
}

pub trait Nameable: Into<Symbol> {
    fn named(self, name: &str) -> Named {
        Named {
            symbol: self.into(),
            name: Some(name.to_string()),
        }
    }

    fn unnamed(self) -> Named {
        Named {
            symbol: self.into(),
            name: None,
        }
    }
}

impl Nameable for Symbol {}
impl Nameable for Terminal {}
impl Nameable for NonTerminal {}

/// Interned non-terminal names plus the symbols registered under a name.
#[derive(Debug, Clone)]
pub struct SymbolTable {
    names: StringInterner<StringBackend<SymbolU32>>,
    symbols: FxHashMap<SymbolU32, Symbol>,
    start: NonTerminal,
}

impl SymbolTable {
    pub const START: &'static str = "S'";

    pub fn new() -> Self {
        let mut names = StringInterner::<StringBackend<SymbolU32>>::new();
        let start = NonTerminal(names.get_or_intern(Self::START));
        let mut symbols = FxHashMap::default();
        symbols.insert(start.0, Symbol::NonTerminal(start));
        Self {
            names,
            symbols,
            start,
        }
    }

    pub fn start_symbol(&self) -> NonTerminal {
        self.start
    }

    pub fn non_terminal(&mut self, name: &str) -> NonTerminal {
        let nonterminal = NonTerminal(self.names.get_or_intern(name));
        let entry = self
            .symbols
            .entry(nonterminal.0)
            .or_insert(Symbol::NonTerminal(nonterminal));
        // a type name always refers to the non-terminal
        if entry.is_terminal() {
            *entry = Symbol::NonTerminal(nonterminal);
        }
        nonterminal
    }

    /// Interns `{base}_{i}` for the first `i` not taken yet.
    pub fn fresh_non_terminal(&mut self, base: &str) -> NonTerminal {
        let mut i = 0;
        loop {
            let name = format!("{base}_{i}");
            if self.names.get(&name).is_none() {
                return self.non_terminal(&name);
            }
            i += 1;
        }
    }

    /// Registers `symbol` under its name unless the name is taken.
    pub fn register(&mut self, symbol: &Symbol) {
        let key = match symbol {
            Symbol::NonTerminal(nonterminal) => nonterminal.0,
            Symbol::Terminal(Terminal::Epsilon) => return,
            Symbol::Terminal(terminal) => self.names.get_or_intern(terminal.name()),
        };
        self.symbols.entry(key).or_insert_with(|| symbol.clone());
    }

    pub fn get(&self, name: &str) -> Option<&Symbol> {
        self.names.get(name).and_then(|key| self.symbols.get(&key))
    }

    pub fn resolve(&self, nonterminal: NonTerminal) -> &str {
        self.names.resolve(nonterminal.0).unwrap_or_default()
    }

    pub fn name<'a>(&'a self, symbol: &'a Symbol) -> &'a str {
        match symbol {
            Symbol::Terminal(terminal) => terminal.name(),
            Symbol::NonTerminal(nonterminal) => self.resolve(*nonterminal),
        }
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn lexer_at<'a>(input: &'a str, pos: usize) -> Lexer<'a> {
        let mut lexer = Lexer::new(input);
        lexer.set_position(pos);
        lexer
    }

    #[test]
    fn literal_matching() {
        let literal = Terminal::literal("five");
        let m = literal.matches(&lexer_at("onefive", 3));
        assert_eq!(m, Matcher::new(ParsingState::Successful, 3, "five"));
        let m = literal.matches(&lexer_at("onefi", 3));
        assert_eq!(m, Matcher::new(ParsingState::EndOfInput, 3, "fi"));
        let m = literal.matches(&lexer_at("onefo", 3));
        assert_eq!(m, Matcher::new(ParsingState::Failed, 3, "fo"));
        let m = literal.matches(&lexer_at("one", 3));
        assert_eq!(m, Matcher::new(ParsingState::EndOfInput, 3, ""));
    }

    #[test]
    fn single_character_terminals() {
        assert_eq!(
            Terminal::Digit.matches(&lexer_at("a1", 1)),
            Matcher::new(ParsingState::Successful, 1, "1")
        );
        assert_eq!(
            Terminal::Letter.matches(&lexer_at("a1", 1)),
            Matcher::new(ParsingState::Failed, 1, "1")
        );
        assert_eq!(
            Terminal::Whitespace.matches(&lexer_at("a1", 2)),
            Matcher::new(ParsingState::EndOfInput, 2, "")
        );
        assert_eq!(
            Terminal::Whitespace.matches(&lexer_at("\tx", 0)).state,
            ParsingState::Successful
        );
    }

    #[test]
    fn end_of_input() {
        assert_eq!(
            Terminal::EndOfInput.matches(&lexer_at("ab", 2)).state,
            ParsingState::Successful
        );
        assert_eq!(
            Terminal::EndOfInput.matches(&lexer_at("ab", 1)),
            Matcher::new(ParsingState::Failed, 1, "")
        );
    }

    #[test]
    fn evaluation() {
        let m = Matcher::new(ParsingState::Successful, 0, "7");
        assert_eq!(Terminal::Digit.evaluate(&m), Value::Str("7".to_string()));
        assert_eq!(Terminal::EndOfInput.evaluate(&m), Value::Null);
    }

    #[test]
    fn fresh_names_skip_taken_ones() {
        let mut table = SymbolTable::new();
        table.non_terminal("star_0");
        let fresh = table.fresh_non_terminal("star");
        assert_eq!(table.resolve(fresh), "star_1");
        assert_eq!(table.resolve(table.start_symbol()), "S'");
    }

    #[test]
    fn first_registration_wins() {
        let mut table = SymbolTable::new();
        let int = table.non_terminal("int");
        table.register(&Symbol::Terminal(Terminal::literal("int")));
        assert_eq!(table.get("int"), Some(&Symbol::NonTerminal(int)));
        table.register(&Symbol::Terminal(Terminal::literal("five")));
        assert_eq!(
            table.get("five"),
            Some(&Symbol::Terminal(Terminal::literal("five")))
        );
    }
}
