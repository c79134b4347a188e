use std::{fmt::Display, rc::Rc};

use crate::{
    autocompletion::{Autocompletion, CompletionContext},
    bnf::{Bnf, Production, ProductionId},
    evaluator::{EvaluationError, Value},
    matcher::{Matcher, ParsingState},
    rule::Rule,
    symbol::{Symbol, Terminal},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
pub struct ParsedNode {
    symbol: Symbol,
    production: Option<ProductionId>,
    matcher: Matcher,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
    name: Option<Rc<str>>,
    nth_entry_in_parent: usize,
}

impl ParsedNode {
    pub(crate) fn new(symbol: Symbol, production: Option<ProductionId>, matcher: Matcher) -> Self {
        Self {
            symbol,
            production,
            matcher,
            children: Vec::new(),
            parent: None,
            name: None,
            nth_entry_in_parent: 0,
        }
    }
}

/// Nodes of one materialized parse, addressed by [`NodeId`].
///
/// Nodes dropped while the tree is reshaped stay in the arena but are no longer reachable from
/// the root.
#[derive(Debug, Clone)]
pub struct ParseTree {
    bnf: Rc<Bnf>,
    nodes: Vec<ParsedNode>,
    root: NodeId,
}

impl ParseTree {
    pub(crate) fn new(bnf: Rc<Bnf>) -> Self {
        Self {
            bnf,
            nodes: Vec::new(),
            root: NodeId(0),
        }
    }

    pub fn bnf(&self) -> &Rc<Bnf> {
        &self.bnf
    }

    pub fn root(&self) -> NodeRef<'_> {
        self.node(self.root)
    }

    pub fn node(&self, id: NodeId) -> NodeRef<'_> {
        NodeRef { tree: self, id }
    }

    pub fn state(&self) -> ParsingState {
        self.root().matcher().state
    }

    pub fn evaluate(&self) -> Result<Value, EvaluationError> {
        self.root().evaluate()
    }

    pub(crate) fn push(&mut self, node: ParsedNode) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    pub(crate) fn set_root(&mut self, root: NodeId) {
        self.root = root;
    }

    pub(crate) fn set_name(&mut self, id: NodeId, name: Option<Rc<str>>) {
        self.nodes[id.0].name = name;
    }

    pub(crate) fn raw_name(&self, id: NodeId) -> Option<Rc<str>> {
        self.nodes[id.0].name.clone()
    }

    pub(crate) fn set_nth_entry(&mut self, id: NodeId, nth: usize) {
        self.nodes[id.0].nth_entry_in_parent = nth;
    }

    pub(crate) fn nth_entry(&self, id: NodeId) -> usize {
        self.nodes[id.0].nth_entry_in_parent
    }

    pub(crate) fn add_child(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    pub(crate) fn add_children(&mut self, parent: NodeId, children: &[NodeId]) {
        for &child in children {
            self.add_child(parent, child);
        }
    }

    pub(crate) fn take_children(&mut self, id: NodeId) -> Vec<NodeId> {
        let children = std::mem::take(&mut self.nodes[id.0].children);
        for child in &children {
            self.nodes[child.0].parent = None;
        }
        children
    }

    fn production_of(&self, id: NodeId) -> Option<&Production> {
        self.nodes[id.0].production.map(|p| self.bnf.production(p))
    }

    /// Fires the extension listeners top-down, so a node always sees its parent's naming.
    pub(crate) fn notify_extension_listeners(&mut self) {
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let children = self.nodes[id.0].children.clone();
            if let Some(listener) = self.production_of(id).and_then(|p| p.extension_listener()).cloned() {
                listener(self, id, &children);
            }
            stack.extend(children.into_iter().rev());
        }
    }

    /// Every node reachable from the root, children before parents.
    fn post_order(&self) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.nodes[id.0].children.iter().copied());
        }
        order.reverse();
        order
    }

    /// Fires the rules' parse listeners, children before parents.
    pub(crate) fn notify_parse_listeners(&self) {
        for id in self.post_order() {
            let node = self.node(id);
            let state = node.matcher().state;
            if state != ParsingState::Successful && state != ParsingState::EndOfInput {
                continue;
            }
            if node.parent_has_same_rule() {
                continue;
            }
            if let Some(listener) = node.rule().and_then(Rule::on_successful_parsed) {
                listener(&node);
            }
        }
    }

    /// Reshapes the tree bottom-up with the productions' AST builders.
    pub(crate) fn build_ast(&mut self) {
        // a builder only touches its node and the node's children, which are built by then
        for id in self.post_order() {
            let children = self.take_children(id);
            match self.production_of(id).and_then(|p| p.ast_builder()).cloned() {
                Some(builder) => builder(self, id, &children),
                None => self.add_children(id, &children),
            }
        }
    }
}

impl Display for ParseTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut stack = vec![(self.root, 0)];
        while let Some((id, depth)) = stack.pop() {
            let node = self.node(id);
            writeln!(
                f,
                "{:indent$}{} {:?} {:?}",
                "",
                node.name(),
                node.parsed_str(),
                node.matcher().state,
                indent = depth * 2
            )?;
            stack.extend(node.children().rev().map(|child| (child.id(), depth + 1)));
        }
        Ok(())
    }
}

/// A borrowed view of one node of a [`ParseTree`].
#[derive(Clone, Copy)]
pub struct NodeRef<'t> {
    tree: &'t ParseTree,
    id: NodeId,
}

impl<'t> NodeRef<'t> {
    fn data(&self) -> &'t ParsedNode {
        &self.tree.nodes[self.id.0]
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn tree(&self) -> &'t ParseTree {
        self.tree
    }

    pub fn symbol(&self) -> &'t Symbol {
        &self.data().symbol
    }

    pub fn matcher(&self) -> &'t Matcher {
        &self.data().matcher
    }

    pub fn parsed_str(&self) -> &'t str {
        &self.data().matcher.parsed
    }

    pub fn production(&self) -> Option<&'t Production> {
        self.data().production.map(|p| self.tree.bnf.production(p))
    }

    pub fn rule(&self) -> Option<&'t Rule> {
        self.production()
            .and_then(Production::rule)
            .and_then(|r| self.tree.bnf.rule(r))
    }

    /// The assigned name, or the symbol's name for unnamed nodes.
    pub fn name(&self) -> &'t str {
        match &self.data().name {
            Some(name) => name,
            None => self.tree.bnf.symbol_name(self.symbol()),
        }
    }

    pub fn nth_entry_in_parent(&self) -> usize {
        self.data().nth_entry_in_parent
    }

    pub fn parent(&self) -> Option<NodeRef<'t>> {
        self.data().parent.map(|id| self.tree.node(id))
    }

    pub fn children(&self) -> impl DoubleEndedIterator<Item = NodeRef<'t>> + 't {
        let tree = self.tree;
        self.data().children.iter().map(move |&id| tree.node(id))
    }

    pub fn num_children(&self) -> usize {
        self.data().children.len()
    }

    pub fn child(&self, index: usize) -> Option<NodeRef<'t>> {
        self.data()
            .children
            .get(index)
            .map(|&id| self.tree.node(id))
    }

    /// The first child carrying `name`.
    pub fn child_by_name(&self, name: &str) -> Option<NodeRef<'t>> {
        self.children().find(|child| child.name() == name)
    }

    /// Follows `names` through the children, one name per level.
    pub fn descendant(&self, names: &[&str]) -> Result<NodeRef<'t>, EvaluationError> {
        names.iter().try_fold(*self, |node, name| {
            node.child_by_name(name)
                .ok_or_else(|| EvaluationError::NoSuchChild(name.to_string()))
        })
    }

    pub fn parsed_str_named(&self, names: &[&str]) -> Result<&'t str, EvaluationError> {
        self.descendant(names).map(|node| node.parsed_str())
    }

    pub fn evaluate(&self) -> Result<Value, EvaluationError> {
        if let Some(evaluator) = self.rule().and_then(Rule::evaluator) {
            return evaluator(self);
        }
        match self.symbol() {
            Symbol::Terminal(terminal) => Ok(terminal.evaluate(self.matcher())),
            Symbol::NonTerminal(_) => Ok(Value::Str(self.parsed_str().to_string())),
        }
    }

    pub fn evaluate_child(&self, index: usize) -> Result<Value, EvaluationError> {
        self.child(index)
            .ok_or(EvaluationError::NoSuchIndex(index))?
            .evaluate()
    }

    pub fn evaluate_named(&self, names: &[&str]) -> Result<Value, EvaluationError> {
        self.descendant(names)?.evaluate()
    }

    pub fn parent_has_same_rule(&self) -> bool {
        let rule = self.production().and_then(Production::rule);
        let parent_rule = self
            .parent()
            .and_then(|p| p.production())
            .and_then(Production::rule);
        rule.is_some() && rule == parent_rule
    }

    /// What this node offers for autocompletion, `None` if it does not autocomplete.
    pub fn autocompletion(
        &self,
        context: &mut CompletionContext,
        just_check: bool,
    ) -> Option<Vec<Autocompletion>> {
        if let Some(autocompleter) = self.rule().and_then(Rule::autocompleter) {
            if !self.parent_has_same_rule() {
                return autocompleter.autocomplete(self, context, just_check);
            }
        }
        match self.symbol() {
            Symbol::Terminal(Terminal::Literal(text)) => {
                Some(vec![Autocompletion::literal(text.to_string())])
            }
            Symbol::Terminal(_) if self.parsed_str().is_empty() => {
                Some(vec![Autocompletion::parameterized(self.name())])
            }
            Symbol::Terminal(_) => Some(vec![Autocompletion::veto()]),
            Symbol::NonTerminal(_) => None,
        }
    }

    pub fn does_autocomplete(&self, context: &mut CompletionContext) -> bool {
        self.autocompletion(context, true).is_some()
    }
}

#[cfg(test)]
mod test {
    use std::{cell::RefCell, rc::Rc};

    use insta::assert_snapshot;

    use crate::{
        evaluator::{EvaluationError, Value},
        grammar::Grammar,
        symbol::{Nameable, Terminal},
    };

    fn pair_grammar() -> Grammar {
        let mut grammar = Grammar::new();
        let pair = grammar
            .sequence(
                Some("pair"),
                vec![
                    Terminal::Digit.named("a"),
                    Terminal::literal("-").unnamed(),
                    Terminal::Letter.named("b"),
                ],
            )
            .target();
        grammar.compile(pair.into()).unwrap();
        grammar
    }

    #[test]
    fn outline() {
        let tree = pair_grammar().parser("3-x").parse(None).unwrap();
        assert_snapshot!(tree.to_string(), @r###"
        S' "3-x" Successful
          pair "3-x" Successful
            a "3" Successful
            - "-" Successful
            b "x" Successful
          EOI "" Successful
        "###);
    }

    #[test]
    fn navigation_by_name() {
        let tree = pair_grammar().parser("3-x").parse(None).unwrap();
        let root = tree.root();
        let pair = root.child_by_name("pair").unwrap();
        assert_eq!(pair.num_children(), 3);
        assert_eq!(pair.child(2).unwrap().nth_entry_in_parent(), 2);
        assert_eq!(root.parsed_str_named(&["pair", "b"]).unwrap(), "x");
        let a = root.descendant(&["pair", "a"]).unwrap();
        assert_eq!(a.parent().unwrap().name(), "pair");
        assert_eq!(a.evaluate().unwrap(), Value::Str("3".to_string()));
        assert_eq!(tree.evaluate().unwrap(), Value::Str("3-x".to_string()));
        assert!(matches!(
            root.evaluate_named(&["pair", "c"]),
            Err(EvaluationError::NoSuchChild(name)) if name == "c"
        ));
        assert!(matches!(
            pair.evaluate_child(5),
            Err(EvaluationError::NoSuchIndex(5))
        ));
    }

    /// `pair := a:digit b:("x" | letter)` with the alternatives in the given order.
    fn pair_with_alternatives(letter_first: bool, extra_rule: bool) -> Grammar {
        let mut grammar = Grammar::new();
        if extra_rule {
            grammar.sequence(Some("noise"), vec![Terminal::literal("x").named("x")]);
        }
        let mut alternatives = vec![
            Terminal::literal("x").named("ex"),
            Terminal::Letter.named("letter"),
        ];
        if letter_first {
            alternatives.reverse();
        }
        let item = grammar.or(None, alternatives).target();
        let pair = grammar
            .sequence(
                Some("pair"),
                vec![Terminal::Digit.named("a"), item.named("b")],
            )
            .target();
        grammar.compile(pair.into()).unwrap();
        grammar
    }

    #[test]
    fn named_values_ignore_declaration_order() {
        let values: Vec<_> = [(false, false), (true, true)]
            .into_iter()
            .map(|(letter_first, extra_rule)| {
                let grammar = pair_with_alternatives(letter_first, extra_rule);
                let tree = grammar.parser("3x").parse(None).unwrap();
                let root = tree.root();
                (
                    root.evaluate_named(&["pair", "b"]).unwrap(),
                    root.evaluate_named(&["pair", "a"]).unwrap(),
                    root.parsed_str_named(&["pair", "b"]).unwrap().to_string(),
                )
            })
            .collect();
        assert_eq!(values[0], values[1]);
        assert_eq!(values[0].0, Value::Str("x".to_string()));
    }

    #[test]
    fn repetitions_notify_once() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut grammar = Grammar::new();
        let sink = Rc::clone(&seen);
        let digits = grammar
            .star(Some("digits"), Terminal::Digit.unnamed())
            .on_successful_parsed(move |node| {
                sink.borrow_mut().push(node.parsed_str().to_string());
            })
            .target();
        grammar.compile(digits.into()).unwrap();
        let tree = grammar.parser("123").parse(None).unwrap();
        assert_eq!(*seen.borrow(), vec!["123".to_string()]);
        assert_eq!(tree.root().child(0).unwrap().num_children(), 3);
    }
}
