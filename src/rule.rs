use std::{fmt::Debug, rc::Rc};

use crate::{
    autocompletion::Autocompleter,
    bnf::{Bnf, Production, ProductionId, RuleIndex, TreeCallback},
    evaluator::{self, Evaluator},
    node::{NodeId, NodeRef, ParseTree},
    semantic_error::SemanticError,
    symbol::{Named, NonTerminal, Symbol},
    utils::IntRange,
};

/// Called with every node a rule governs once the node parsed (at least up to the end of input).
pub type ParseListener = Rc<dyn Fn(&NodeRef<'_>)>;

/// Stable identity of a rule inside its [`Grammar`](crate::grammar::Grammar).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleId(pub(crate) usize);

impl RuleId {
    /// Rules built on the fly that never belong to a grammar.
    pub(crate) const DETACHED: RuleId = RuleId(usize::MAX);
}

/// The names a rule gives to the nodes of its children.
#[derive(Debug, Clone, Default)]
pub struct ChildNames(Rc<[Option<String>]>);

impl ChildNames {
    pub fn new(names: Vec<Option<String>>) -> Self {
        Self(names.into())
    }

    /// A single name applies to every child. Indices past the declared names get `"no name"`.
    pub fn get(&self, index: usize) -> Option<&str> {
        match self.0.len() {
            0 => None,
            1 => self.0[0].as_deref(),
            n if index >= n => Some("no name"),
            _ => self.0[index].as_deref(),
        }
    }

    fn name_of(&self, index: usize) -> Option<Rc<str>> {
        self.get(index).map(Rc::from)
    }
}

#[derive(Debug, Clone)]
pub struct Join {
    pub open: Option<Symbol>,
    pub close: Option<Symbol>,
    pub delimiter: Option<Symbol>,
    pub only_keep_entries: bool,
    pub cardinality: IntRange,
}

#[derive(Debug, Clone)]
pub enum RuleKind {
    Sequence,
    Or,
    Optional,
    Star,
    Plus,
    Repeat { from: usize, to: usize },
    Join(Join),
}

#[derive(Clone)]
pub struct Rule {
    id: RuleId,
    kind: RuleKind,
    target: NonTerminal,
    children: Vec<Symbol>,
    child_names: ChildNames,
    evaluator: Option<Evaluator>,
    autocompleter: Option<Rc<dyn Autocompleter>>,
    on_successful_parsed: Option<ParseListener>,
}

impl Rule {
    pub(crate) fn new(id: RuleId, kind: RuleKind, target: NonTerminal, children: Vec<Named>) -> Self {
        let evaluator: Option<Evaluator> = match kind {
            RuleKind::Sequence => None,
            RuleKind::Or => Some(Rc::new(evaluator::first_child)),
            _ => Some(Rc::new(evaluator::all_children)),
        };
        let (children, names): (Vec<_>, Vec<_>) =
            children.into_iter().map(|c| (c.symbol, c.name)).unzip();
        Self {
            id,
            kind,
            target,
            children,
            child_names: ChildNames::new(names),
            evaluator,
            autocompleter: None,
            on_successful_parsed: None,
        }
    }

    pub fn id(&self) -> RuleId {
        self.id
    }

    pub fn kind(&self) -> &RuleKind {
        &self.kind
    }

    pub fn target(&self) -> NonTerminal {
        self.target
    }

    pub fn children(&self) -> &[Symbol] {
        &self.children
    }

    pub fn child_names(&self) -> &ChildNames {
        &self.child_names
    }

    pub fn name_for_child(&self, index: usize) -> Option<&str> {
        self.child_names.get(index)
    }

    pub fn evaluator(&self) -> Option<&Evaluator> {
        self.evaluator.as_ref()
    }

    pub fn autocompleter(&self) -> Option<&Rc<dyn Autocompleter>> {
        self.autocompleter.as_ref()
    }

    pub fn on_successful_parsed(&self) -> Option<&ParseListener> {
        self.on_successful_parsed.as_ref()
    }

    pub(crate) fn set_evaluator(&mut self, evaluator: Evaluator) {
        self.evaluator = Some(evaluator);
    }

    pub(crate) fn set_autocompleter(&mut self, autocompleter: Rc<dyn Autocompleter>) {
        self.autocompleter = Some(autocompleter);
    }

    pub(crate) fn set_on_successful_parsed(&mut self, listener: ParseListener) {
        self.on_successful_parsed = Some(listener);
    }

    pub(crate) fn set_child_names(&mut self, names: ChildNames) {
        self.child_names = names;
    }

    pub(crate) fn set_cardinality(&mut self, cardinality: IntRange) {
        if let RuleKind::Join(join) = &mut self.kind {
            join.cardinality = cardinality;
        }
    }

    /// Lowers the rule into productions of `bnf`.
    pub(crate) fn create_bnf(&self, bnf: &mut Bnf) -> Result<(), SemanticError> {
        let index = bnf.register_rule(self.clone());
        match &self.kind {
            RuleKind::Sequence => {
                let id = self.add_production(bnf, index, self.target, self.children.clone());
                let names = self.child_names.clone();
                listen(bnf, id, move |tree, _, children| {
                    for (c, &child) in children.iter().enumerate() {
                        tree.set_nth_entry(child, c);
                        tree.set_name(child, names.name_of(c));
                    }
                });
            }
            RuleKind::Or => {
                for (io, option) in self.children.iter().enumerate() {
                    let id = self.add_production(bnf, index, self.target, vec![option.clone()]);
                    let names = self.child_names.clone();
                    listen(bnf, id, move |tree, _, children| {
                        if let Some(&child) = children.first() {
                            tree.set_nth_entry(child, io);
                            tree.set_name(child, names.name_of(io));
                        }
                    });
                }
            }
            RuleKind::Optional => {
                let child = self.single_child()?;
                let id = self.add_production(bnf, index, self.target, vec![child]);
                let names = self.child_names.clone();
                listen(bnf, id, move |tree, _, children| {
                    if let Some(&child) = children.first() {
                        tree.set_name(child, names.name_of(0));
                    }
                });
                self.add_production(bnf, index, self.target, vec![]);
            }
            RuleKind::Star => {
                let child = self.single_child()?;
                self.add_repetition(bnf, index, child);
                self.add_production(bnf, index, self.target, vec![]);
            }
            RuleKind::Plus => {
                let child = self.single_child()?;
                self.add_repetition(bnf, index, child.clone());
                let id = self.add_production(bnf, index, self.target, vec![child]);
                let names = self.child_names.clone();
                listen(bnf, id, move |tree, parent, children| {
                    if let Some(&child) = children.first() {
                        let nth = entry_index(tree, parent);
                        tree.set_nth_entry(child, nth);
                        tree.set_name(child, names.name_of(nth));
                    }
                });
            }
            RuleKind::Repeat { from, to } => {
                if from > to {
                    return Err(SemanticError::InvalidRange {
                        lower: *from,
                        upper: *to,
                    });
                }
                let child = self.single_child()?;
                // longest first so that the maximal match is tried before shorter ones
                for len in (*from..=*to).rev() {
                    let id = self.add_production(bnf, index, self.target, vec![child.clone(); len]);
                    let names = self.child_names.clone();
                    listen(bnf, id, move |tree, _, children| {
                        for (c, &child) in children.iter().enumerate() {
                            tree.set_nth_entry(child, c);
                            tree.set_name(child, names.name_of(c));
                        }
                    });
                }
            }
            RuleKind::Join(join) => self.lower_join(bnf, index, join)?,
        }
        Ok(())
    }

    fn single_child(&self) -> Result<Symbol, SemanticError> {
        self.children
            .first()
            .cloned()
            .ok_or(SemanticError::MissingChild)
    }

    fn add_production(
        &self,
        bnf: &mut Bnf,
        index: RuleIndex,
        left: NonTerminal,
        right: Vec<Symbol>,
    ) -> ProductionId {
        bnf.add_production(Production::for_rule(left, right, index))
    }

    /// `target -> child target`, flattened so repeated entries end up side by side.
    fn add_repetition(&self, bnf: &mut Bnf, index: RuleIndex, child: Symbol) {
        let id = self.add_production(
            bnf,
            index,
            self.target,
            vec![child, Symbol::NonTerminal(self.target)],
        );
        let names = self.child_names.clone();
        listen(bnf, id, move |tree, parent, children| {
            if let [entry, tail] = *children {
                let nth = entry_index(tree, parent);
                tree.set_nth_entry(entry, nth);
                tree.set_name(entry, names.name_of(nth));
                tree.set_nth_entry(tail, nth + 1);
                let name = tree.raw_name(parent);
                tree.set_name(tail, name);
            }
        });
        build(bnf, id, |tree, parent, children| {
            if let [entry, tail] = *children {
                tree.add_child(parent, entry);
                let rest = tree.take_children(tail);
                tree.add_children(parent, &rest);
            }
        });
    }

    fn lower_join(&self, bnf: &mut Bnf, index: RuleIndex, join: &Join) -> Result<(), SemanticError> {
        if join.open.is_some() != join.close.is_some() {
            return Err(SemanticError::UnbalancedJoin);
        }
        let first = self.single_child()?;
        let IntRange { lower, upper } = join.cardinality;
        if lower > upper {
            return Err(SemanticError::InvalidRange { lower, upper });
        }
        let target_name = bnf.symbols().resolve(self.target).to_string();
        let names = self.child_names.clone();

        // next -> delimiter entry
        let next = bnf
            .symbols_mut()
            .fresh_non_terminal(&format!("{target_name}_next"));
        match &join.delimiter {
            Some(delimiter) => {
                let id = self.add_production(bnf, index, next, vec![delimiter.clone(), first.clone()]);
                let names = names.clone();
                listen(bnf, id, move |tree, parent, children| {
                    if let [delimiter, entry] = *children {
                        tree.set_name(delimiter, Some(Rc::from("delimiter")));
                        let nth = tree.nth_entry(parent);
                        tree.set_name(entry, names.name_of(nth + 1));
                    }
                });
                if join.only_keep_entries {
                    build(bnf, id, |tree, parent, children| {
                        if let [_, entry] = *children {
                            tree.add_child(parent, entry);
                        }
                    });
                }
            }
            None => {
                let id = self.add_production(bnf, index, next, vec![first.clone()]);
                let names = names.clone();
                listen(bnf, id, move |tree, parent, children| {
                    if let Some(&entry) = children.first() {
                        let nth = tree.nth_entry(parent);
                        tree.set_name(entry, names.name_of(nth + 1));
                    }
                });
            }
        }

        // repetition -> first next*
        let repetition = bnf
            .symbols_mut()
            .fresh_non_terminal(&format!("{target_name}_repetition"));
        let first_only = |bnf: &mut Bnf| {
            let id = self.add_production(bnf, index, repetition, vec![first.clone()]);
            let names = names.clone();
            listen(bnf, id, move |tree, _, children| {
                if let Some(&entry) = children.first() {
                    tree.set_name(entry, names.name_of(0));
                }
            });
        };
        let first_then = |bnf: &mut Bnf, rest: NonTerminal, rest_name: &'static str| {
            let id = self.add_production(
                bnf,
                index,
                repetition,
                vec![first.clone(), Symbol::NonTerminal(rest)],
            );
            let names = names.clone();
            listen(bnf, id, move |tree, _, children| {
                if let [entry, rest] = *children {
                    tree.set_name(entry, names.name_of(0));
                    tree.set_name(rest, Some(Rc::from(rest_name)));
                }
            });
            build(bnf, id, |tree, parent, children| {
                if let [entry, rest] = *children {
                    tree.add_child(parent, entry);
                    for next in tree.take_children(rest) {
                        let entries = tree.take_children(next);
                        tree.add_children(parent, &entries);
                    }
                }
            });
        };
        let next = Symbol::NonTerminal(next);
        match join.cardinality {
            IntRange::PLUS | IntRange::STAR => {
                let star = bnf
                    .symbols_mut()
                    .fresh_non_terminal(&format!("{target_name}_star"));
                Rule::new(self.id, RuleKind::Star, star, vec![Named {
                    symbol: next,
                    name: Some("next".to_string()),
                }])
                .create_bnf(bnf)?;
                first_then(bnf, star, "star");
                if join.cardinality == IntRange::STAR {
                    self.add_production(bnf, index, repetition, vec![]);
                }
            }
            IntRange::OPTIONAL => {
                first_only(bnf);
                self.add_production(bnf, index, repetition, vec![]);
            }
            IntRange { lower: 0, upper: 0 } => {
                self.add_production(bnf, index, repetition, vec![]);
            }
            IntRange { lower: 1, upper: 1 } => first_only(bnf),
            IntRange {
                lower,
                upper: IntRange::MAX,
            } => {
                // rest -> next{lower - 1} next*
                let star = bnf
                    .symbols_mut()
                    .fresh_non_terminal(&format!("{target_name}_star"));
                Rule::new(self.id, RuleKind::Star, star, vec![Named {
                    symbol: next.clone(),
                    name: Some("next".to_string()),
                }])
                .create_bnf(bnf)?;
                let rest = bnf
                    .symbols_mut()
                    .fresh_non_terminal(&format!("{target_name}_rest"));
                let mut right = vec![next.clone(); lower - 1];
                right.push(Symbol::NonTerminal(star));
                let id = self.add_production(bnf, index, rest, right);
                listen(bnf, id, |tree, _, children| {
                    for (c, &child) in children.iter().enumerate() {
                        tree.set_nth_entry(child, c);
                    }
                });
                build(bnf, id, |tree, parent, children| {
                    if let Some((&star, fixed)) = children.split_last() {
                        tree.add_children(parent, fixed);
                        let more = tree.take_children(star);
                        tree.add_children(parent, &more);
                    }
                });
                first_then(bnf, rest, "rest");
            }
            IntRange { lower, upper } => {
                let repeat = bnf
                    .symbols_mut()
                    .fresh_non_terminal(&format!("{target_name}_repeat"));
                Rule::new(
                    self.id,
                    RuleKind::Repeat {
                        from: lower.saturating_sub(1),
                        to: upper - 1,
                    },
                    repeat,
                    vec![Named {
                        symbol: next,
                        name: Some("next".to_string()),
                    }],
                )
                .create_bnf(bnf)?;
                first_then(bnf, repeat, "repeat");
                if lower == 0 {
                    self.add_production(bnf, index, repetition, vec![]);
                }
            }
        }

        let only_keep_entries = join.only_keep_entries;
        match (&join.open, &join.close) {
            (Some(open), Some(close)) => {
                let id = self.add_production(
                    bnf,
                    index,
                    self.target,
                    vec![open.clone(), Symbol::NonTerminal(repetition), close.clone()],
                );
                listen(bnf, id, move |tree, _, children| {
                    if let [open, repetition, close] = *children {
                        if !only_keep_entries {
                            tree.set_name(open, Some(Rc::from("open")));
                            tree.set_name(close, Some(Rc::from("close")));
                        }
                        tree.set_name(repetition, Some(Rc::from("repetition")));
                    }
                });
                build(bnf, id, move |tree, parent, children| {
                    if let [open, repetition, close] = *children {
                        if !only_keep_entries {
                            tree.add_child(parent, open);
                        }
                        let entries = tree.take_children(repetition);
                        tree.add_children(parent, &entries);
                        if !only_keep_entries {
                            tree.add_child(parent, close);
                        }
                    }
                });
            }
            _ => {
                let id = self.add_production(
                    bnf,
                    index,
                    self.target,
                    vec![Symbol::NonTerminal(repetition)],
                );
                listen(bnf, id, |tree, _, children| {
                    if let Some(&repetition) = children.first() {
                        tree.set_name(repetition, Some(Rc::from("repetition")));
                    }
                });
                build(bnf, id, |tree, parent, children| {
                    if let Some(&repetition) = children.first() {
                        let entries = tree.take_children(repetition);
                        tree.add_children(parent, &entries);
                    }
                });
            }
        }
        Ok(())
    }
}

/// Index of the entry `node` starts with. Only tails of the same repetition carry a count.
fn entry_index(tree: &ParseTree, node: NodeId) -> usize {
    if tree.node(node).parent_has_same_rule() {
        tree.nth_entry(node)
    } else {
        0
    }
}

fn listen(
    bnf: &mut Bnf,
    id: ProductionId,
    listener: impl Fn(&mut ParseTree, NodeId, &[NodeId]) + 'static,
) {
    let listener: TreeCallback = Rc::new(listener);
    bnf.production_mut(id).set_extension_listener(listener);
}

fn build(
    bnf: &mut Bnf,
    id: ProductionId,
    builder: impl Fn(&mut ParseTree, NodeId, &[NodeId]) + 'static,
) {
    let builder: TreeCallback = Rc::new(builder);
    bnf.production_mut(id).set_ast_builder(builder);
}

impl Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("target", &self.target)
            .field("children", &self.children)
            .field("child_names", &self.child_names)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod test {
    use insta::assert_snapshot;

    use super::*;
    use crate::symbol::{Nameable, SymbolTable, Terminal};

    fn lower(kind: RuleKind, children: Vec<Named>) -> Result<Bnf, SemanticError> {
        let mut symbols = SymbolTable::new();
        let target = symbols.non_terminal("r");
        let mut bnf = Bnf::new(symbols);
        Rule::new(RuleId(0), kind, target, children).create_bnf(&mut bnf)?;
        Ok(bnf)
    }

    #[test]
    fn child_names() {
        let none = ChildNames::default();
        assert_eq!(none.get(3), None);
        let single = ChildNames::new(vec![Some("x".to_string())]);
        assert_eq!(single.get(0), Some("x"));
        assert_eq!(single.get(5), Some("x"));
        let several = ChildNames::new(vec![Some("a".to_string()), None]);
        assert_eq!(several.get(0), Some("a"));
        assert_eq!(several.get(1), None);
        assert_eq!(several.get(2), Some("no name"));
    }

    #[test]
    fn repetitions() {
        let digit = || vec![Terminal::Digit.unnamed()];
        let bnf = lower(RuleKind::Repeat { from: 1, to: 3 }, digit()).unwrap();
        assert_snapshot!(bnf.to_string(), @"r ::= digit digit digit | digit digit | digit;");
        let bnf = lower(RuleKind::Plus, digit()).unwrap();
        assert_snapshot!(bnf.to_string(), @"r ::= digit r | digit;");
        let bnf = lower(RuleKind::Optional, digit()).unwrap();
        assert_snapshot!(bnf.to_string(), @"r ::= digit | ε;");
    }

    #[test]
    fn bracketed_join() {
        let join = Join {
            open: Some(Terminal::literal("(").into()),
            close: Some(Terminal::literal(")").into()),
            delimiter: Some(Terminal::literal(",").into()),
            only_keep_entries: true,
            cardinality: IntRange::new(1, 2),
        };
        let bnf = lower(RuleKind::Join(join), vec![Terminal::Digit.unnamed()]).unwrap();
        assert_snapshot!(bnf.to_string(), @r###"
        r_next_0 ::= ',' digit;
        r_repeat_0 ::= r_next_0 | ε;
        r_repetition_0 ::= digit r_repeat_0;
        r ::= '(' r_repetition_0 ')';
        "###);
    }

    #[test]
    fn open_ended_join() {
        let join = Join {
            open: None,
            close: None,
            delimiter: Some(Terminal::literal(",").into()),
            only_keep_entries: true,
            cardinality: IntRange::new(3, IntRange::MAX),
        };
        let bnf = lower(RuleKind::Join(join), vec![Terminal::Digit.unnamed()]).unwrap();
        assert_snapshot!(bnf.to_string(), @r###"
        r_next_0 ::= ',' digit;
        r_star_0 ::= r_next_0 r_star_0 | ε;
        r_rest_0 ::= r_next_0 r_next_0 r_star_0;
        r_repetition_0 ::= digit r_rest_0;
        r ::= r_repetition_0;
        "###);
    }

    #[test]
    fn invalid_rules() {
        assert!(matches!(
            lower(RuleKind::Star, vec![]),
            Err(SemanticError::MissingChild)
        ));
        assert!(matches!(
            lower(RuleKind::Repeat { from: 2, to: 1 }, vec![Terminal::Digit.unnamed()]),
            Err(SemanticError::InvalidRange { lower: 2, upper: 1 })
        ));
        let join = Join {
            open: None,
            close: Some(Terminal::literal(")").into()),
            delimiter: None,
            only_keep_entries: false,
            cardinality: IntRange::STAR,
        };
        assert!(matches!(
            lower(RuleKind::Join(join), vec![Terminal::Digit.unnamed()]),
            Err(SemanticError::UnbalancedJoin)
        ));
    }
}
