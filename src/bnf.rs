use std::{
    fmt::{Debug, Display},
    rc::Rc,
};

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    node::{NodeId, ParseTree},
    rule::Rule,
    semantic_error::SemanticError,
    symbol::{NonTerminal, Symbol, SymbolTable, Terminal},
};

/// A callback run on a freshly materialized node with the nodes its production matched.
pub(crate) type TreeCallback = Rc<dyn Fn(&mut ParseTree, NodeId, &[NodeId])>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProductionId(pub(crate) usize);

/// Position of a lowered rule inside one [`Bnf`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuleIndex(pub(crate) usize);

#[derive(Clone)]
pub struct Production {
    left: NonTerminal,
    right: Vec<Symbol>,
    rule: Option<RuleIndex>,
    extension_listener: Option<TreeCallback>,
    ast_builder: Option<TreeCallback>,
}

impl Production {
    pub fn new(left: NonTerminal, right: Vec<Symbol>) -> Self {
        Self {
            left,
            right: right.into_iter().filter(|s| !s.is_epsilon()).collect(),
            rule: None,
            extension_listener: None,
            ast_builder: None,
        }
    }

    pub(crate) fn for_rule(left: NonTerminal, right: Vec<Symbol>, rule: RuleIndex) -> Self {
        Self {
            rule: Some(rule),
            ..Self::new(left, right)
        }
    }

    pub fn left(&self) -> NonTerminal {
        self.left
    }

    pub fn right(&self) -> &[Symbol] {
        &self.right
    }

    pub fn rule(&self) -> Option<RuleIndex> {
        self.rule
    }

    pub(crate) fn set_extension_listener(&mut self, listener: TreeCallback) {
        self.extension_listener = Some(listener);
    }

    pub(crate) fn set_ast_builder(&mut self, builder: TreeCallback) {
        self.ast_builder = Some(builder);
    }

    pub(crate) fn extension_listener(&self) -> Option<&TreeCallback> {
        self.extension_listener.as_ref()
    }

    pub(crate) fn ast_builder(&self) -> Option<&TreeCallback> {
        self.ast_builder.as_ref()
    }
}

impl Debug for Production {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Production")
            .field("left", &self.left)
            .field("right", &self.right)
            .field("rule", &self.rule)
            .finish_non_exhaustive()
    }
}

/// The flat grammar the parser runs on.
#[derive(Clone)]
pub struct Bnf {
    symbols: SymbolTable,
    productions: Vec<Production>,
    by_left: FxHashMap<NonTerminal, Vec<ProductionId>>,
    rules: Vec<Rule>,
}

impl Bnf {
    pub fn new(symbols: SymbolTable) -> Self {
        Self {
            symbols,
            productions: Vec::new(),
            by_left: FxHashMap::default(),
            rules: Vec::new(),
        }
    }

    pub fn start_symbol(&self) -> NonTerminal {
        self.symbols.start_symbol()
    }

    pub fn stop_symbol(&self) -> Terminal {
        Terminal::EndOfInput
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub(crate) fn symbols_mut(&mut self) -> &mut SymbolTable {
        &mut self.symbols
    }

    pub fn symbol_name<'a>(&'a self, symbol: &'a Symbol) -> &'a str {
        self.symbols.name(symbol)
    }

    /// Adds `production` unless an equal one exists, returning the id of the stored production.
    pub fn add_production(&mut self, production: Production) -> ProductionId {
        let existing = self.by_left.get(&production.left).and_then(|ids| {
            ids.iter()
                .copied()
                .find(|id| self.productions[id.0].right == production.right)
        });
        if let Some(id) = existing {
            log::debug!(
                "skipping duplicate production {}",
                self.display_production(&production)
            );
            return id;
        }
        let id = ProductionId(self.productions.len());
        self.by_left.entry(production.left).or_default().push(id);
        self.productions.push(production);
        id
    }

    pub fn productions(&self) -> &[Production] {
        &self.productions
    }

    /// The productions of `left` in declaration order.
    pub fn productions_for(&self, left: NonTerminal) -> &[ProductionId] {
        self.by_left
            .get(&left)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn production(&self, id: ProductionId) -> &Production {
        &self.productions[id.0]
    }

    pub(crate) fn production_mut(&mut self, id: ProductionId) -> &mut Production {
        &mut self.productions[id.0]
    }

    pub fn remove_start_production(&mut self) {
        let start = self.start_symbol();
        self.productions.retain(|p| p.left != start);
        self.by_left.clear();
        for (i, production) in self.productions.iter().enumerate() {
            self.by_left
                .entry(production.left)
                .or_default()
                .push(ProductionId(i));
        }
    }

    pub(crate) fn register_rule(&mut self, rule: Rule) -> RuleIndex {
        self.rules.push(rule);
        RuleIndex(self.rules.len() - 1)
    }

    pub fn rule(&self, index: RuleIndex) -> Option<&Rule> {
        self.rules.get(index.0)
    }

    pub(crate) fn check_undefined_non_terminals(&self) -> Result<(), SemanticError> {
        let defined: FxHashSet<NonTerminal> = self.by_left.keys().copied().collect();
        for production in &self.productions {
            for symbol in &production.right {
                if let Symbol::NonTerminal(nonterminal) = symbol {
                    if !defined.contains(nonterminal) {
                        return Err(SemanticError::UndefinedNonTerminal(
                            self.symbols.resolve(*nonterminal).to_string(),
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    fn display_symbol(&self, symbol: &Symbol) -> String {
        match symbol {
            Symbol::Terminal(Terminal::Literal(text)) => format!("'{text}'"),
            _ => self.symbol_name(symbol).to_string(),
        }
    }

    pub(crate) fn display_production(&self, production: &Production) -> String {
        let right = if production.right.is_empty() {
            "ε".to_string()
        } else {
            production
                .right
                .iter()
                .map(|s| self.display_symbol(s))
                .collect::<Vec<_>>()
                .join(" ")
        };
        format!("{} -> {right}", self.symbols.resolve(production.left))
    }
}

impl Debug for Bnf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.productions.iter().map(|p| self.display_production(p)))
            .finish()
    }
}

impl Display for Bnf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut lefts: Vec<NonTerminal> = Vec::new();
        for production in &self.productions {
            if !lefts.contains(&production.left) {
                lefts.push(production.left);
            }
        }
        for left in lefts {
            write!(f, "{} ::= ", self.symbols.resolve(left))?;
            for (j, id) in self.productions_for(left).iter().enumerate() {
                if j > 0 {
                    write!(f, " | ")?;
                }
                let right = &self.production(*id).right;
                if right.is_empty() {
                    write!(f, "ε")?;
                }
                for (i, symbol) in right.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", self.display_symbol(symbol))?;
                }
            }
            writeln!(f, ";")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use insta::assert_snapshot;

    use super::*;

    fn bnf() -> (Bnf, NonTerminal, NonTerminal) {
        let mut symbols = SymbolTable::new();
        let expr = symbols.non_terminal("expr");
        let term = symbols.non_terminal("term");
        (Bnf::new(symbols), expr, term)
    }

    #[test]
    fn epsilon_is_filtered() {
        let (_, expr, _) = bnf();
        let production = Production::new(
            expr,
            vec![
                Terminal::Epsilon.into(),
                Terminal::Digit.into(),
                Terminal::Epsilon.into(),
            ],
        );
        assert_eq!(production.right(), &[Symbol::Terminal(Terminal::Digit)]);
    }

    #[test]
    fn duplicates_are_merged() {
        let (mut bnf, expr, term) = bnf();
        let a = bnf.add_production(Production::new(expr, vec![term.into()]));
        let b = bnf.add_production(Production::new(expr, vec![Terminal::literal("x").into()]));
        let c = bnf.add_production(Production::new(expr, vec![term.into()]));
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(bnf.productions_for(expr), &[a, b]);
    }

    #[test]
    fn undefined_non_terminal() {
        let (mut bnf, expr, term) = bnf();
        bnf.add_production(Production::new(expr, vec![term.into()]));
        let result = bnf.check_undefined_non_terminals();
        assert!(matches!(result, Err(SemanticError::UndefinedNonTerminal(name)) if name == "term"));
        bnf.add_production(Production::new(term, vec![]));
        assert!(bnf.check_undefined_non_terminals().is_ok());
    }

    #[test]
    fn start_production_removal() {
        let (mut bnf, expr, term) = bnf();
        let start = bnf.start_symbol();
        bnf.add_production(Production::new(
            start,
            vec![expr.into(), Terminal::EndOfInput.into()],
        ));
        bnf.add_production(Production::new(expr, vec![term.into(), Terminal::Digit.into()]));
        bnf.add_production(Production::new(term, vec![Terminal::literal("t").into()]));
        bnf.remove_start_production();
        assert!(bnf.productions_for(start).is_empty());
        assert_eq!(bnf.productions_for(term), &[ProductionId(1)]);
        assert_snapshot!(bnf.to_string(), @r###"
        expr ::= term digit;
        term ::= 't';
        "###);
    }

    #[test]
    fn display() {
        let (mut bnf, expr, term) = bnf();
        let start = bnf.start_symbol();
        bnf.add_production(Production::new(
            start,
            vec![expr.into(), Terminal::EndOfInput.into()],
        ));
        bnf.add_production(Production::new(expr, vec![term.into(), expr.into()]));
        bnf.add_production(Production::new(expr, vec![]));
        bnf.add_production(Production::new(term, vec![Terminal::Whitespace.into()]));
        assert_snapshot!(bnf.to_string(), @r###"
        S' ::= expr EOI;
        expr ::= term expr | ε;
        term ::= whitespace;
        "###);
    }
}
