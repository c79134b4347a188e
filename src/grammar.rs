use std::rc::Rc;

use crate::{
    autocompletion::{
        Autocompleter, Autocompletion, EntireSequenceAutocompleter, FnAutocompleter,
        IfNothingYetEntered, InlineAutocompleter, TupleAutocompleter,
    },
    bnf::Bnf,
    evaluator::{self, EvaluationError, Evaluator, Value},
    node::NodeRef,
    rd_parser::RdParser,
    rule::{ChildNames, Join, ParseListener, Rule, RuleId, RuleKind},
    semantic_error::SemanticError,
    symbol::{Nameable, Named, NonTerminal, Symbol, SymbolTable, Terminal},
    utils::IntRange,
};

/// The registry of rules a [`Bnf`] is compiled from.
///
/// Rules for the same target are alternatives of each other, tried in registration order.
/// Builders take an optional target name; anonymous rules get a fresh `{kind}_{i}` target.
#[derive(Debug, Clone)]
pub struct Grammar {
    symbols: SymbolTable,
    rules: Vec<Rule>,
    bnf: Rc<Bnf>,
    compiled: bool,
    next_rule_id: usize,
}

impl Grammar {
    pub fn new() -> Self {
        let symbols = SymbolTable::new();
        Self {
            bnf: Rc::new(Bnf::new(symbols.clone())),
            symbols,
            rules: Vec::new(),
            compiled: false,
            next_rule_id: 0,
        }
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// The symbol registered under `name`, either a rule target or a terminal used by a rule.
    pub fn symbol(&self, name: &str) -> Option<&Symbol> {
        self.symbols.get(name)
    }

    pub fn non_terminal(&mut self, name: &str) -> NonTerminal {
        self.symbols.non_terminal(name)
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn rule(&self, id: RuleId) -> Option<&Rule> {
        self.rules.iter().find(|rule| rule.id() == id)
    }

    pub fn rule_mut(&mut self, id: RuleId) -> Option<RuleMut<'_>> {
        let index = self.rules.iter().position(|rule| rule.id() == id)?;
        self.compiled = false;
        Some(RuleMut {
            grammar: self,
            index,
        })
    }

    pub fn rules_for(&self, target: NonTerminal) -> impl Iterator<Item = &Rule> {
        self.rules.iter().filter(move |rule| rule.target() == target)
    }

    pub fn remove_rules(&mut self, target: NonTerminal) {
        self.rules.retain(|rule| rule.target() != target);
        self.compiled = false;
    }

    fn target(&mut self, name: Option<&str>, kind: &str) -> NonTerminal {
        match name {
            Some(name) => self.symbols.non_terminal(name),
            None => self.symbols.fresh_non_terminal(kind),
        }
    }

    fn add_rule(
        &mut self,
        kind: RuleKind,
        name: Option<&str>,
        kind_name: &str,
        children: Vec<Named>,
    ) -> RuleMut<'_> {
        let target = self.target(name, kind_name);
        for child in &children {
            self.symbols.register(&child.symbol);
        }
        let id = RuleId(self.next_rule_id);
        self.next_rule_id += 1;
        self.rules.push(Rule::new(id, kind, target, children));
        self.compiled = false;
        let index = self.rules.len() - 1;
        RuleMut {
            grammar: self,
            index,
        }
    }

    pub fn sequence(&mut self, name: Option<&str>, children: Vec<Named>) -> RuleMut<'_> {
        self.add_rule(RuleKind::Sequence, name, "sequence", children)
    }

    pub fn or(&mut self, name: Option<&str>, options: Vec<Named>) -> RuleMut<'_> {
        self.add_rule(RuleKind::Or, name, "or", options)
    }

    pub fn optional(&mut self, name: Option<&str>, child: Named) -> RuleMut<'_> {
        self.add_rule(RuleKind::Optional, name, "optional", vec![child])
    }

    pub fn star(&mut self, name: Option<&str>, child: Named) -> RuleMut<'_> {
        self.add_rule(RuleKind::Star, name, "star", vec![child])
    }

    pub fn plus(&mut self, name: Option<&str>, child: Named) -> RuleMut<'_> {
        self.add_rule(RuleKind::Plus, name, "plus", vec![child])
    }

    /// Between `from` and `to` occurrences of `child`, inclusive. An empty range is reported by
    /// [`Grammar::compile`].
    pub fn repeat(&mut self, name: Option<&str>, child: Named, from: usize, to: usize) -> RuleMut<'_> {
        self.add_rule(RuleKind::Repeat { from, to }, name, "repeat", vec![child])
    }

    /// Entries separated by `join.delimiter`, optionally wrapped in `join.open` and `join.close`.
    pub fn join(&mut self, name: Option<&str>, entry: Named, join: Join) -> RuleMut<'_> {
        for symbol in [&join.open, &join.close, &join.delimiter].into_iter().flatten() {
            self.symbols.register(symbol);
        }
        self.add_rule(RuleKind::Join(join), name, "join", vec![entry])
    }

    /// A join with exactly one entry per name, each entry named accordingly.
    pub fn join_with_names(
        &mut self,
        name: Option<&str>,
        entry: Symbol,
        join: Join,
        names: &[&str],
    ) -> RuleMut<'_> {
        let join = Join {
            cardinality: IntRange::exactly(names.len()),
            ..join
        };
        let mut rule = self.join(name, entry.unnamed(), join);
        rule.rule().set_child_names(ChildNames::new(
            names.iter().map(|name| Some(name.to_string())).collect(),
        ));
        rule
    }

    fn whitespace_star(&mut self) -> NonTerminal {
        self.star(None, Terminal::Whitespace.unnamed()).target()
    }

    /// `entry ws* "," ws* entry ...`; the delimiter completes to `", "`.
    pub fn list(&mut self, name: Option<&str>, entry: Named, cardinality: IntRange) -> RuleMut<'_> {
        let ws = self.whitespace_star();
        let delimiter = self
            .sequence(
                None,
                vec![
                    ws.named("ws*"),
                    Terminal::literal(",").unnamed(),
                    ws.named("ws*"),
                ],
            )
            .autocompleter(IfNothingYetEntered::new(", "))
            .target();
        self.join(
            name,
            entry,
            Join {
                open: None,
                close: None,
                delimiter: Some(delimiter.into()),
                only_keep_entries: true,
                cardinality,
            },
        )
    }

    /// `"(" n1 "," n2 ... ")"` with one `entry` per name; completes to `(${n1}, ${n2}, ...)`.
    pub fn tuple(&mut self, name: Option<&str>, entry: Symbol, names: &[&str]) -> RuleMut<'_> {
        let ws = self
            .star(None, Terminal::Whitespace.unnamed())
            .autocompleter_fn(|_, _| Some(Vec::new()))
            .target();
        let open = self
            .sequence(
                None,
                vec![Terminal::literal("(").named("open"), ws.named("ws*")],
            )
            .target();
        let close = self
            .sequence(
                None,
                vec![ws.named("ws*"), Terminal::literal(")").named("close")],
            )
            .target();
        let delimiter = self
            .sequence(
                None,
                vec![
                    ws.named("ws*"),
                    Terminal::literal(",").named("delimiter"),
                    ws.named("ws*"),
                ],
            )
            .target();
        self.join_with_names(
            name,
            entry,
            Join {
                open: Some(open.into()),
                close: Some(close.into()),
                delimiter: Some(delimiter.into()),
                only_keep_entries: true,
                cardinality: IntRange::exactly(names.len()),
            },
            names,
        )
        .autocompleter(TupleAutocompleter)
    }

    /// A single character matching the `[...]` class `pattern`, evaluating to that character.
    pub fn character_class(
        &mut self,
        name: Option<&str>,
        pattern: &str,
    ) -> Result<RuleMut<'_>, SemanticError> {
        let class = Terminal::character_class(pattern)?;
        Ok(self
            .sequence(name, vec![class.named("character-class")])
            .evaluator(evaluator::parsed_string))
    }

    /// Lowers every rule into a fresh [`Bnf`] deriving `top` followed by the end of input.
    pub fn compile(&mut self, top: Symbol) -> Result<(), SemanticError> {
        let start = self.symbols.start_symbol();
        self.remove_rules(start);
        self.sequence(
            Some(SymbolTable::START),
            vec![top.unnamed(), Terminal::EndOfInput.unnamed()],
        )
        .evaluator(evaluator::first_child);

        let mut bnf = Bnf::new(self.symbols.clone());
        for rule in &self.rules {
            rule.create_bnf(&mut bnf)?;
        }
        bnf.check_undefined_non_terminals()?;
        log::debug!(
            "compiled {} rules into {} productions",
            self.rules.len(),
            bnf.productions().len()
        );
        self.bnf = Rc::new(bnf);
        self.compiled = true;
        Ok(())
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled
    }

    /// The grammar of the last successful [`Grammar::compile`].
    pub fn bnf(&self) -> &Rc<Bnf> {
        &self.bnf
    }

    pub fn parser<'a>(&self, input: &'a str) -> RdParser<'a> {
        RdParser::new(Rc::clone(&self.bnf), input)
    }
}

impl Default for Grammar {
    fn default() -> Self {
        Self::new()
    }
}

/// A rule just registered in a [`Grammar`], to attach behavior to.
pub struct RuleMut<'g> {
    grammar: &'g mut Grammar,
    index: usize,
}

impl RuleMut<'_> {
    fn rule(&mut self) -> &mut Rule {
        &mut self.grammar.rules[self.index]
    }

    pub fn id(&self) -> RuleId {
        self.grammar.rules[self.index].id()
    }

    pub fn target(&self) -> NonTerminal {
        self.grammar.rules[self.index].target()
    }

    pub fn evaluator<F>(mut self, evaluator: F) -> Self
    where
        F: Fn(&NodeRef<'_>) -> Result<Value, EvaluationError> + 'static,
    {
        let evaluator: Evaluator = Rc::new(evaluator);
        self.rule().set_evaluator(evaluator);
        self
    }

    pub fn autocompleter<A: Autocompleter + 'static>(mut self, autocompleter: A) -> Self {
        self.rule().set_autocompleter(Rc::new(autocompleter));
        self
    }

    pub fn autocompleter_fn<F>(self, autocompleter: F) -> Self
    where
        F: Fn(&NodeRef<'_>, bool) -> Option<Vec<Autocompletion>> + 'static,
    {
        self.autocompleter(FnAutocompleter(autocompleter))
    }

    /// Completes to a placeholder named after the node.
    pub fn inline(self) -> Self {
        self.autocompleter(InlineAutocompleter)
    }

    /// Completes all children at once as a template.
    pub fn entire_sequence(self) -> Self {
        self.autocompleter(EntireSequenceAutocompleter)
    }

    pub fn on_successful_parsed<F>(mut self, listener: F) -> Self
    where
        F: Fn(&NodeRef<'_>) + 'static,
    {
        let listener: ParseListener = Rc::new(listener);
        self.rule().set_on_successful_parsed(listener);
        self
    }

    /// Changes the entry count of a join.
    pub fn cardinality(mut self, cardinality: IntRange) -> Self {
        self.rule().set_cardinality(cardinality);
        self
    }

    pub fn named(self, name: &str) -> Named {
        self.target().named(name)
    }

    pub fn unnamed(self) -> Named {
        self.target().unnamed()
    }
}
