use std::rc::Rc;

use thiserror::Error;

use crate::{
    autocompletion::Autocompletion,
    builtins,
    config::ParserConfig,
    expression::{PatternItem, TypeSpec, Variable},
    grammar::{Grammar, RuleMut},
    node::ParseTree,
    parse_error::ParseError,
    parser::parse_pattern,
    rd_parser::ParseStartListener,
    rule::Join,
    semantic_error::SemanticError,
    symbol::{Nameable, Named, NonTerminal, Symbol, Terminal},
    utils::IntRange,
};

#[derive(Error, Debug)]
pub enum LanguageError {
    #[error(transparent)]
    Semantic(#[from] SemanticError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// A language of sentences, each described by a pattern such as `Set the speed to {s:int}.`.
///
/// A program is any number of sentences, optionally separated by line breaks.
pub struct Language {
    grammar: Grammar,
    whitespace_plus: NonTerminal,
    program: NonTerminal,
    config: ParserConfig,
    start_listeners: Vec<ParseStartListener>,
}

impl Language {
    pub const SENTENCE: &'static str = "sentence";
    pub const PROGRAM: &'static str = "program";

    pub fn new() -> Self {
        let mut grammar = Grammar::new();
        builtins::register(&mut grammar);
        let whitespace_plus = grammar.non_terminal(builtins::WHITESPACE_PLUS);
        let linebreaks: Symbol = grammar.non_terminal(builtins::LINEBREAK_STAR).into();
        let sentence = grammar.non_terminal(Self::SENTENCE);
        let program = grammar
            .join(
                Some(Self::PROGRAM),
                sentence.named(Self::SENTENCE),
                Join {
                    open: Some(linebreaks.clone()),
                    close: Some(linebreaks.clone()),
                    delimiter: Some(linebreaks),
                    only_keep_entries: true,
                    cardinality: IntRange::STAR,
                },
            )
            .target();
        Self {
            grammar,
            whitespace_plus,
            program,
            config: ParserConfig::default(),
            start_listeners: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: ParserConfig) -> Self {
        self.config = config;
        self
    }

    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    /// Direct access for rules a pattern cannot express.
    pub fn grammar_mut(&mut self) -> &mut Grammar {
        &mut self.grammar
    }

    /// Adds an alternative for the type `name`. Types used in `pattern` must already be known.
    pub fn define_type(&mut self, name: &str, pattern: &str) -> Result<RuleMut<'_>, SemanticError> {
        let items = parse_pattern(pattern)?;
        let children = items
            .into_iter()
            .map(|item| self.lower_item(item))
            .collect::<Result<Vec<_>, _>>()?;
        log::debug!("defined `{name}` as {pattern:?}");
        Ok(self.grammar.sequence(Some(name), children))
    }

    pub fn define_sentence(&mut self, pattern: &str) -> Result<RuleMut<'_>, SemanticError> {
        self.define_type(Self::SENTENCE, pattern)
    }

    /// Registers a listener fired before each tree a parse builds. Parse listeners of rules fire
    /// after it, so this is the place to reset state they accumulate.
    pub fn add_parse_start_listener(&mut self, listener: impl Fn() + 'static) {
        self.start_listeners.push(Rc::new(listener));
    }

    pub fn compile(&mut self) -> Result<(), SemanticError> {
        self.grammar.compile(self.program.into())
    }

    /// Parses a program, compiling first if a definition changed since the last compile.
    pub fn parse(
        &mut self,
        text: &str,
        autocompletions: Option<&mut Vec<Autocompletion>>,
    ) -> Result<ParseTree, LanguageError> {
        if !self.grammar.is_compiled() {
            self.compile()?;
        }
        let mut parser = self.grammar.parser(text).with_config(self.config.clone());
        for listener in &self.start_listeners {
            parser.on_parse_start(Rc::clone(listener));
        }
        Ok(parser.parse(autocompletions)?)
    }

    fn type_symbol(&self, name: &str) -> Result<Symbol, SemanticError> {
        self.grammar
            .symbol(name)
            .cloned()
            .ok_or_else(|| SemanticError::UnknownType(name.to_string()))
    }

    fn lower_item(&mut self, item: PatternItem) -> Result<Named, SemanticError> {
        match item {
            PatternItem::Literal(text) => Ok(Terminal::literal(&text).unnamed()),
            PatternItem::Whitespace => Ok(self.whitespace_plus.named("ws+")),
            PatternItem::Variable(variable) => self.lower_variable(variable),
        }
    }

    fn lower_variable(&mut self, variable: Variable) -> Result<Named, SemanticError> {
        let Variable {
            name,
            ty,
            quantifier,
        } = variable;
        let symbol: Symbol = match ty {
            None => Terminal::literal(&name).into(),
            Some(TypeSpec::Named(ty)) => self.type_symbol(&ty)?,
            Some(TypeSpec::CharacterClass(pattern)) => Terminal::character_class(&pattern)?.into(),
            Some(TypeSpec::List(entry)) => {
                // the quantifier bounds the entries instead of repeating the list
                let entry_symbol = self.type_symbol(&entry)?;
                let list = self
                    .grammar
                    .list(
                        None,
                        entry_symbol.named(&entry),
                        quantifier.unwrap_or(IntRange::STAR),
                    )
                    .target();
                return Ok(list.named(&name));
            }
            Some(TypeSpec::Tuple { entry, names }) => {
                let entry = self.type_symbol(&entry)?;
                let names: Vec<&str> = names.iter().map(String::as_str).collect();
                self.grammar.tuple(None, entry, &names).target().into()
            }
        };
        let named = symbol.named(&name);
        let repeated = match quantifier {
            None => return Ok(named),
            Some(IntRange::STAR) => self.grammar.star(None, named),
            Some(IntRange::PLUS) => self.grammar.plus(None, named),
            Some(IntRange::OPTIONAL) => self.grammar.optional(None, named),
            Some(IntRange { lower, upper }) => self.grammar.repeat(None, named, lower, upper),
        };
        Ok(repeated.named(&name))
    }
}

impl Default for Language {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use std::cell::RefCell;

    use super::*;
    use crate::{
        autocompletion::Purpose,
        evaluator::Value,
        matcher::ParsingState,
    };

    fn complete(language: &mut Language, text: &str) -> (ParsingState, Vec<String>) {
        let mut autocompletions = Vec::new();
        let tree = language.parse(text, Some(&mut autocompletions)).unwrap();
        let completions = autocompletions
            .iter()
            .map(|a| a.completion(Purpose::ForMenu))
            .collect();
        (tree.state(), completions)
    }

    #[test]
    fn placeholder_for_a_typed_variable() {
        let mut language = Language::new();
        language
            .define_sentence("The first digit of the number is {first:digit}.")
            .unwrap();
        let mut autocompletions = Vec::new();
        language
            .parse("The first digit of the number is ", Some(&mut autocompletions))
            .unwrap();
        assert_eq!(autocompletions.len(), 1);
        assert_eq!(autocompletions[0].completion(Purpose::ForMenu), "${first}");
        assert_eq!(autocompletions[0].already_entered(), "");
    }

    #[test]
    fn listeners_see_every_sentence() {
        let parsed = Rc::new(RefCell::new(Vec::new()));
        let mut language = Language::new();
        let cleared = Rc::clone(&parsed);
        language.add_parse_start_listener(move || cleared.borrow_mut().clear());
        let sink = Rc::clone(&parsed);
        language
            .define_sentence("{d:digit:+}.")
            .unwrap()
            .on_successful_parsed(move |node| sink.borrow_mut().push(node.parsed_str().to_string()));
        let mut autocompletions = Vec::new();
        language
            .parse("1.22.333.", Some(&mut autocompletions))
            .unwrap();
        assert_eq!(*parsed.borrow(), vec!["1.", "22.", "333."]);
    }

    #[test]
    fn long_programs() {
        let mut language = Language::new();
        language.define_sentence("Go {n:int}.").unwrap();
        let program = "Go 1.\n".repeat(1000);
        let tree = language.parse(&program, None).unwrap();
        assert_eq!(tree.state(), ParsingState::Successful);
        let sentences = tree.evaluate().unwrap();
        assert_eq!(sentences.as_list().map(<[Value]>::len), Some(1000));
    }

    #[test]
    fn completions_from_earlier_sentences() {
        let channels = Rc::new(RefCell::new(Vec::<String>::new()));
        let mut language = Language::new();
        let cleared = Rc::clone(&channels);
        language.add_parse_start_listener(move || cleared.borrow_mut().clear());
        let defined = Rc::clone(&channels);
        language
            .define_sentence("Define channel {channel-name:[A-Za-z0-9]:+}.")
            .unwrap()
            .on_successful_parsed(move |node| {
                if let Ok(name) = node.parsed_str_named(&["channel-name"]) {
                    defined.borrow_mut().push(name.to_string());
                }
            });
        let offered = Rc::clone(&channels);
        language
            .define_type("defined-channels", "'{channel:[A-Za-z0-9]:+}'")
            .unwrap()
            .autocompleter_fn(move |_, _| {
                Some(offered.borrow().iter().map(Autocompletion::literal).collect())
            });
        language
            .define_sentence("Use channel {channel:defined-channels}.")
            .unwrap();

        let (state, completions) = complete(
            &mut language,
            "Define channel DAPI.\n\
             Define channel A488.\n\
             Use channel 'DAPI'.\n\
             Use channel 'A488'.\n\
             Use channel ",
        );
        assert_eq!(state, ParsingState::EndOfInput);
        assert_eq!(completions, vec!["DAPI", "A488"]);
    }

    #[test]
    fn entire_sequences_step_aside_for_typed_text() {
        let mut language = Language::new();
        for led in ["385nm", "470nm", "567nm", "625nm"] {
            language
                .define_type("led", led)
                .unwrap()
                .autocompleter_fn(move |_, _| Some(vec![Autocompletion::literal(led)]));
        }
        language
            .define_type("led-power", "{<led-power>:int}%")
            .unwrap()
            .entire_sequence();
        language
            .define_type("led-setting", "{led-power:led-power} at {wavelength:led}")
            .unwrap()
            .entire_sequence();
        language
            .define_sentence("Excite with {led-setting:led-setting}.")
            .unwrap();

        let (state, completions) = complete(&mut language, "Excite with 10% at 3");
        assert_eq!(state, ParsingState::EndOfInput);
        assert_eq!(completions, vec!["385nm"]);
    }

    #[test]
    fn alternatives_of_a_type() {
        let mut language = Language::new();
        language.define_type("my-color", "blue").unwrap();
        language.define_type("my-color", "green").unwrap();
        language
            .define_type("my-color", "({r:int}, {g:int}, {b:int})")
            .unwrap()
            .entire_sequence();
        language
            .define_sentence("My favorite color is {color:my-color}.")
            .unwrap();

        let (state, completions) = complete(&mut language, "My favorite color is ");
        assert_eq!(state, ParsingState::EndOfInput);
        assert_eq!(completions, vec!["blue", "green", "(${r}, ${g}, ${b})"]);
    }

    #[test]
    fn sentences_evaluate() {
        let mut language = Language::new();
        language
            .define_sentence("My birthday is in {m:month}.")
            .unwrap()
            .evaluator(|node| node.evaluate_named(&["m"]));
        language
            .define_sentence("The pizza comes at {t:time}.")
            .unwrap()
            .evaluator(|node| node.evaluate_named(&["t"]));
        language
            .define_sentence("Two characters: {c:[a-z0-9]:2}.")
            .unwrap()
            .evaluator(|node| node.evaluate_named(&["c"]));

        let tree = language
            .parse(
                "My birthday is in May.\nThe pizza comes at 12:30.\n\nTwo characters: a1.\n",
                None,
            )
            .unwrap();
        assert_eq!(
            tree.evaluate().unwrap(),
            Value::List(vec![
                Value::Int(4),
                Value::Time {
                    hour: 12,
                    minute: 30
                },
                Value::List(vec![
                    Value::Str("a".to_string()),
                    Value::Str("1".to_string())
                ]),
            ])
        );
    }

    #[test]
    fn lists_and_tuples_in_patterns() {
        let mut language = Language::new();
        language
            .define_sentence("Sum {xs:list<int>:1-3}.")
            .unwrap()
            .evaluator(|node| node.evaluate_named(&["xs"]));
        language
            .define_sentence("Point {p:tuple<int, x, y>}.")
            .unwrap()
            .evaluator(|node| node.evaluate_named(&["p"]));

        let tree = language.parse("Sum 1, 2 ,3.Point (4, 5).", None).unwrap();
        let ints = |values: &[i64]| Value::List(values.iter().copied().map(Value::Int).collect());
        assert_eq!(
            tree.evaluate().unwrap(),
            Value::List(vec![ints(&[1, 2, 3]), ints(&[4, 5])])
        );
        assert!(language.parse("Sum 1, 2, 3, 4.", None).is_err());
    }

    #[test]
    fn untyped_variables_match_their_name() {
        let mut language = Language::new();
        language.define_sentence("Start {From frame} on.").unwrap();
        assert!(language.parse("Start From frame on.", None).is_ok());
        assert!(language.parse("Start frame on.", None).is_err());
    }

    #[test]
    fn definitions_are_checked() {
        let mut language = Language::new();
        assert!(matches!(
            language.define_sentence("Use {x:nothing}."),
            Err(SemanticError::UnknownType(ty)) if ty == "nothing"
        ));
        assert!(matches!(
            language.define_sentence("Use {x:int"),
            Err(SemanticError::InvalidPattern(_))
        ));
        assert!(matches!(
            language.parse("", None),
            Err(LanguageError::Semantic(SemanticError::UndefinedNonTerminal(name))) if name == "sentence"
        ));
    }

    #[test]
    fn errors_point_at_the_offending_character() {
        let mut language = Language::new();
        language
            .define_sentence("Now there are only {p:int}% left.")
            .unwrap();
        let Err(LanguageError::Parse(error)) = language.parse("Now there are only 5% lift.", None)
        else {
            panic!("expected a parse error");
        };
        assert_eq!(error.offset(), 23);
        let location = error.location().unwrap();
        assert_eq!(location.line, 1);
        assert_eq!(location.caret, format!("{}^", " ".repeat(23)));
    }
}
