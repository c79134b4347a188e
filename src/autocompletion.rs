use std::{ops::Range, rc::Rc};

use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::{
    bnf::{Bnf, Production},
    config::ParserConfig,
    node::NodeRef,
    rd_parser::RdParser,
    rule::{Rule, RuleId, RuleKind},
    symbol::{Named, Symbol},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    ForMenu,
    ForInsertion,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum AutocompletionKind {
    Literal(String),
    Parameterized(String),
    /// Suppresses every candidate of the parse.
    Veto,
    /// Answer to an eligibility probe, never a real candidate.
    DoesAutocomplete,
    EntireSequence(Vec<Autocompletion>),
}

/// One completion candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Autocompletion {
    kind: AutocompletionKind,
    #[serde(skip)]
    symbol: Option<Symbol>,
    already_entered: String,
}

/// Insertion text with the byte ranges of its placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Insertion {
    pub text: String,
    pub parameters: Vec<Parameter>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Parameter {
    pub name: String,
    pub range: Range<usize>,
}

impl Autocompletion {
    fn new(kind: AutocompletionKind) -> Self {
        Self {
            kind,
            symbol: None,
            already_entered: String::new(),
        }
    }

    pub fn literal(text: impl Into<String>) -> Self {
        Self::new(AutocompletionKind::Literal(text.into()))
    }

    pub fn parameterized(name: impl Into<String>) -> Self {
        Self::new(AutocompletionKind::Parameterized(name.into()))
    }

    pub fn veto() -> Self {
        Self::new(AutocompletionKind::Veto)
    }

    pub fn does_autocomplete() -> Self {
        Self::new(AutocompletionKind::DoesAutocomplete)
    }

    pub fn entire_sequence(parts: Vec<Autocompletion>) -> Self {
        Self::new(AutocompletionKind::EntireSequence(parts))
    }

    pub fn kind(&self) -> &AutocompletionKind {
        &self.kind
    }

    /// The symbol of the node that produced this candidate.
    pub fn symbol(&self) -> Option<&Symbol> {
        self.symbol.as_ref()
    }

    /// The input typed since the start of the producing node; a consumer replaces it.
    pub fn already_entered(&self) -> &str {
        &self.already_entered
    }

    pub fn is_veto(&self) -> bool {
        self.kind == AutocompletionKind::Veto
    }

    pub(crate) fn attach(mut self, symbol: &Symbol, already_entered: &str) -> Self {
        self.symbol = Some(symbol.clone());
        self.already_entered = already_entered.to_string();
        self
    }

    pub fn completion(&self, purpose: Purpose) -> String {
        match &self.kind {
            AutocompletionKind::Literal(text) => text.clone(),
            AutocompletionKind::Parameterized(name) => format!("${{{name}}}"),
            AutocompletionKind::Veto | AutocompletionKind::DoesAutocomplete => String::new(),
            AutocompletionKind::EntireSequence(parts) => {
                parts.iter().map(|part| part.completion(purpose)).collect()
            }
        }
    }

    /// Resolves every placeholder to its name and records where it sits.
    pub fn insertion(&self) -> Insertion {
        fn fill(completion: &Autocompletion, insertion: &mut Insertion) {
            match &completion.kind {
                AutocompletionKind::Literal(text) => insertion.text.push_str(text),
                AutocompletionKind::Parameterized(name) => {
                    let start = insertion.text.len();
                    insertion.text.push_str(name);
                    insertion.parameters.push(Parameter {
                        name: name.clone(),
                        range: start..insertion.text.len(),
                    });
                }
                AutocompletionKind::Veto | AutocompletionKind::DoesAutocomplete => {}
                AutocompletionKind::EntireSequence(parts) => {
                    for part in parts {
                        fill(part, insertion);
                    }
                }
            }
        }
        let mut insertion = Insertion {
            text: String::new(),
            parameters: Vec::new(),
        };
        fill(self, &mut insertion);
        insertion
    }

    /// Appends the literal text up to the first placeholder. Returns `false` once one was hit.
    fn leading_literal(&self, out: &mut String) -> bool {
        match &self.kind {
            AutocompletionKind::Literal(text) => {
                out.push_str(text);
                true
            }
            AutocompletionKind::Parameterized(_) => false,
            AutocompletionKind::Veto | AutocompletionKind::DoesAutocomplete => true,
            AutocompletionKind::EntireSequence(parts) => {
                parts.iter().all(|part| part.leading_literal(out))
            }
        }
    }
}

/// State shared by all autocompleters during one top-level parse.
#[derive(Debug, Default)]
pub struct CompletionContext {
    cache: FxHashMap<(Symbol, Option<String>), Option<Autocompletion>>,
    config: ParserConfig,
}

impl CompletionContext {
    pub fn new(config: ParserConfig) -> Self {
        Self {
            cache: FxHashMap::default(),
            config,
        }
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Completes `symbol` on its own by parsing the empty string against a grammar whose start
    /// derives only `symbol`.
    pub fn complete_in_isolation(
        &mut self,
        bnf: &Bnf,
        symbol: &Symbol,
        name: Option<&str>,
    ) -> Option<Autocompletion> {
        let key = (symbol.clone(), name.map(str::to_string));
        if let Some(cached) = self.cache.get(&key) {
            return cached.clone();
        }
        // entered before the sub-parse so that a sequence containing itself terminates
        self.cache.insert(key.clone(), None);

        let mut scratch = bnf.clone();
        let target = scratch.symbols_mut().fresh_non_terminal("entire_sequence");
        let sequence = Rule::new(
            RuleId::DETACHED,
            RuleKind::Sequence,
            target,
            vec![Named {
                symbol: symbol.clone(),
                name: name.map(str::to_string),
            }],
        );
        if let Err(error) = sequence.create_bnf(&mut scratch) {
            log::debug!("cannot complete {} in isolation: {error}", bnf.symbol_name(symbol));
            return None;
        }
        scratch.remove_start_production();
        scratch.add_production(Production::new(scratch.start_symbol(), vec![target.into()]));

        let mut found = Vec::new();
        let mut parser = RdParser::new(Rc::new(scratch), "")
            .with_config(self.config.clone())
            .nested();
        if let Err(error) = parser.parse_in_context(Some(&mut found), self) {
            log::trace!("isolated parse of {} failed: {error}", bnf.symbol_name(symbol));
        }
        let part = match found.len() {
            0 => None,
            1 => found.pop(),
            _ => Some(Autocompletion::parameterized(
                name.unwrap_or_else(|| bnf.symbol_name(symbol)),
            )),
        };
        self.cache.insert(key, part.clone());
        part
    }
}

/// Produces the candidates of a node governed by a rule.
///
/// `None` means the node does not autocomplete, so a node closer to the input is asked instead.
/// With `just_check` set the caller only wants to know whether the node autocompletes.
pub trait Autocompleter {
    fn autocomplete(
        &self,
        node: &NodeRef<'_>,
        context: &mut CompletionContext,
        just_check: bool,
    ) -> Option<Vec<Autocompletion>>;
}

/// A placeholder named after the node, vetoed as soon as something is typed.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineAutocompleter;

impl Autocompleter for InlineAutocompleter {
    fn autocomplete(
        &self,
        node: &NodeRef<'_>,
        _context: &mut CompletionContext,
        _just_check: bool,
    ) -> Option<Vec<Autocompletion>> {
        if node.parsed_str().is_empty() {
            Some(vec![Autocompletion::parameterized(node.name())])
        } else {
            Some(vec![Autocompletion::veto()])
        }
    }
}

/// Offers a fixed text while the node is still empty.
#[derive(Debug, Clone)]
pub struct IfNothingYetEntered(pub String);

impl IfNothingYetEntered {
    pub fn new(text: &str) -> Self {
        Self(text.to_string())
    }
}

impl Autocompleter for IfNothingYetEntered {
    fn autocomplete(
        &self,
        node: &NodeRef<'_>,
        _context: &mut CompletionContext,
        _just_check: bool,
    ) -> Option<Vec<Autocompletion>> {
        if node.parsed_str().is_empty() {
            Some(vec![Autocompletion::literal(self.0.clone())])
        } else {
            Some(Vec::new())
        }
    }
}

/// Completes all children of the node's sequence at once, as a template.
#[derive(Debug, Clone, Copy, Default)]
pub struct EntireSequenceAutocompleter;

impl Autocompleter for EntireSequenceAutocompleter {
    fn autocomplete(
        &self,
        node: &NodeRef<'_>,
        context: &mut CompletionContext,
        just_check: bool,
    ) -> Option<Vec<Autocompletion>> {
        let entered = node.parsed_str();
        if just_check && entered.is_empty() {
            return Some(vec![Autocompletion::does_autocomplete()]);
        }
        let rule = node.rule()?;
        let bnf = node.tree().bnf();
        let parts = rule
            .children()
            .iter()
            .enumerate()
            .filter_map(|(i, child)| {
                context.complete_in_isolation(bnf, child, rule.name_for_child(i))
            })
            .collect();
        let candidate = Autocompletion::entire_sequence(parts);
        let mut leading = String::new();
        candidate.leading_literal(&mut leading);
        if !leading.starts_with(entered) {
            // free text typed beyond the template's fixed start
            return None;
        }
        Some(vec![candidate])
    }
}

/// `(${a}, ${b}, ...)` for an empty tuple.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct TupleAutocompleter;

impl Autocompleter for TupleAutocompleter {
    fn autocomplete(
        &self,
        node: &NodeRef<'_>,
        _context: &mut CompletionContext,
        just_check: bool,
    ) -> Option<Vec<Autocompletion>> {
        if !node.parsed_str().is_empty() {
            return None;
        }
        if just_check {
            return Some(vec![Autocompletion::does_autocomplete()]);
        }
        let rule = node.rule()?;
        let RuleKind::Join(join) = rule.kind() else {
            return None;
        };
        let mut parts = vec![Autocompletion::literal("(")];
        for i in 0..join.cardinality.lower {
            if i > 0 {
                parts.push(Autocompletion::literal(", "));
            }
            parts.push(Autocompletion::parameterized(
                rule.name_for_child(i).unwrap_or_else(|| node.name()),
            ));
        }
        parts.push(Autocompletion::literal(")"));
        Some(vec![Autocompletion::entire_sequence(parts)])
    }
}

pub struct FnAutocompleter<F>(pub F);

impl<F> Autocompleter for FnAutocompleter<F>
where
    F: Fn(&NodeRef<'_>, bool) -> Option<Vec<Autocompletion>>,
{
    fn autocomplete(
        &self,
        node: &NodeRef<'_>,
        _context: &mut CompletionContext,
        just_check: bool,
    ) -> Option<Vec<Autocompletion>> {
        (self.0)(node, just_check)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn tuple_template() -> Autocompletion {
        Autocompletion::entire_sequence(vec![
            Autocompletion::literal("("),
            Autocompletion::parameterized("r"),
            Autocompletion::literal(", "),
            Autocompletion::parameterized("g"),
            Autocompletion::literal(")"),
        ])
    }

    #[test]
    fn renderings() {
        let template = tuple_template();
        assert_eq!(template.completion(Purpose::ForMenu), "(${r}, ${g})");
        assert_eq!(template.completion(Purpose::ForInsertion), "(${r}, ${g})");
        assert_eq!(Autocompletion::veto().completion(Purpose::ForMenu), "");
        assert_eq!(
            Autocompletion::parameterized("x").completion(Purpose::ForMenu),
            "${x}"
        );
    }

    #[test]
    fn insertion_ranges() {
        let insertion = tuple_template().insertion();
        assert_eq!(insertion.text, "(r, g)");
        assert_eq!(
            insertion.parameters,
            vec![
                Parameter {
                    name: "r".to_string(),
                    range: 1..2
                },
                Parameter {
                    name: "g".to_string(),
                    range: 4..5
                },
            ]
        );
    }

    #[test]
    fn leading_literal_stops_at_placeholder() {
        let mut leading = String::new();
        let complete = tuple_template().leading_literal(&mut leading);
        assert!(!complete);
        assert_eq!(leading, "(");
        let nested = Autocompletion::entire_sequence(vec![
            Autocompletion::literal("My color is "),
            tuple_template(),
        ]);
        let mut leading = String::new();
        nested.leading_literal(&mut leading);
        assert_eq!(leading, "My color is (");
    }
}
