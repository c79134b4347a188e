use std::{iter::successors, ops::ControlFlow, rc::Rc};

use crate::{
    autocompletion::{Autocompletion, CompletionContext, Purpose},
    bnf::{Bnf, ProductionId},
    config::{ParserConfig, TieBreak},
    lexer::Lexer,
    matcher::{Matcher, ParsingState},
    node::{NodeId, NodeRef, ParseTree, ParsedNode},
    parse_error::{ErrorLocation, ParseError},
    symbol::{NonTerminal, Symbol},
};

pub type ParseStartListener = Rc<dyn Fn()>;

/// A terminal matched by a derivation, linked to the one matched before it.
#[derive(Debug)]
struct MatchedTerminal {
    symbol: Symbol,
    matcher: Matcher,
    previous: Option<usize>,
}

/// A symbol still to be matched, linked to the one after it.
#[derive(Debug)]
struct PendingSymbol {
    symbol: Symbol,
    next: Option<usize>,
}

/// `production` replaced the current symbol of a derivation that had matched `pos` terminals.
#[derive(Debug)]
struct Expansion {
    parent: Option<usize>,
    production: ProductionId,
    pos: usize,
}

/// Storage shared by all derivations explored during one parse.
///
/// Matched and pending symbols are linked lists whose tails are shared, so expanding a derivation
/// only stores the right-hand side of the production.
#[derive(Debug, Default)]
struct Derivations {
    matched: Vec<MatchedTerminal>,
    pending: Vec<PendingSymbol>,
    expansions: Vec<Expansion>,
}

/// A partially expanded derivation.
///
/// `pending` starts with the current symbol. `stuck` holds the matcher of a current symbol that did
/// not match, in which case the derivation ends there.
#[derive(Debug, Clone)]
struct SymbolSequence {
    matched: Option<usize>,
    pending: Option<usize>,
    /// Number of matched terminals.
    pos: usize,
    /// Where the unmatched rest of the sequence starts.
    offset: usize,
    expansion: Option<usize>,
    stuck: Option<Matcher>,
    /// Expansions since input was last consumed.
    idle: usize,
}

impl SymbolSequence {
    fn is_complete(&self) -> bool {
        self.pending.is_none()
    }
}

impl Derivations {
    fn start(&mut self, start: NonTerminal) -> SymbolSequence {
        self.pending.push(PendingSymbol {
            symbol: Symbol::NonTerminal(start),
            next: None,
        });
        SymbolSequence {
            matched: None,
            pending: Some(self.pending.len() - 1),
            pos: 0,
            offset: 0,
            expansion: None,
            stuck: None,
            idle: 0,
        }
    }

    fn current<'d>(&'d self, sequence: &SymbolSequence) -> Option<&'d Symbol> {
        sequence.pending.map(|i| &self.pending[i].symbol)
    }

    fn last_matcher<'d>(&'d self, sequence: &'d SymbolSequence) -> Option<&'d Matcher> {
        sequence
            .stuck
            .as_ref()
            .or_else(|| sequence.matched.map(|i| &self.matched[i].matcher))
    }

    fn expand(
        &mut self,
        sequence: &SymbolSequence,
        production: ProductionId,
        right: &[Symbol],
    ) -> SymbolSequence {
        let mut pending = sequence.pending.and_then(|i| self.pending[i].next);
        for symbol in right.iter().rev() {
            self.pending.push(PendingSymbol {
                symbol: symbol.clone(),
                next: pending,
            });
            pending = Some(self.pending.len() - 1);
        }
        self.expansions.push(Expansion {
            parent: sequence.expansion,
            production,
            pos: sequence.pos,
        });
        SymbolSequence {
            pending,
            expansion: Some(self.expansions.len() - 1),
            stuck: None,
            idle: sequence.idle + 1,
            ..sequence.clone()
        }
    }

    /// The symbols of `sequence` in input order, with the matchers of those that have one.
    fn flatten(&self, sequence: &SymbolSequence) -> Vec<(Symbol, Option<Matcher>)> {
        let mut symbols = Vec::new();
        let mut cursor = sequence.matched;
        while let Some(i) = cursor {
            let terminal = &self.matched[i];
            symbols.push((terminal.symbol.clone(), Some(terminal.matcher.clone())));
            cursor = terminal.previous;
        }
        symbols.reverse();
        let mut stuck = sequence.stuck.clone();
        let mut cursor = sequence.pending;
        while let Some(i) = cursor {
            let pending = &self.pending[i];
            symbols.push((pending.symbol.clone(), stuck.take()));
            cursor = pending.next;
        }
        symbols
    }
}

/// A non-terminal whose alternatives are being tried.
struct Frame {
    sequence: SymbolSequence,
    nonterminal: NonTerminal,
    next: usize,
    best: Option<SymbolSequence>,
}

impl Frame {
    fn next_alternative(
        &mut self,
        bnf: &Bnf,
        derivations: &mut Derivations,
    ) -> Option<SymbolSequence> {
        let &id = bnf.productions_for(self.nonterminal).get(self.next)?;
        self.next += 1;
        let production = bnf.production(id);
        log::trace!(
            "trying {} at {}",
            bnf.display_production(production),
            self.sequence.offset
        );
        Some(derivations.expand(&self.sequence, id, production.right()))
    }

    fn offer(&mut self, result: SymbolSequence, derivations: &Derivations, tie_break: TieBreak) {
        let better = match derivations.last_matcher(&result) {
            None => false,
            Some(matcher) => match self.best.as_ref().and_then(|b| derivations.last_matcher(b)) {
                Some(current) => matcher.is_better_than(current, tie_break),
                None => true,
            },
        };
        if better {
            self.best = Some(result);
        }
    }

    fn finish(self) -> SymbolSequence {
        self.best.unwrap_or(self.sequence)
    }
}

enum Step {
    Done(SymbolSequence),
    Expand(Frame),
}

/// Backtracking recursive-descent parser over a compiled [`Bnf`].
///
/// Alternatives are tried in declaration order and the first one that derives the whole input
/// wins. Without memoization the running time is exponential for grammars with many overlapping
/// alternatives.
pub struct RdParser<'a> {
    bnf: Rc<Bnf>,
    lexer: Lexer<'a>,
    config: ParserConfig,
    start_listeners: Vec<ParseStartListener>,
    nested: bool,
}

impl<'a> RdParser<'a> {
    pub fn new(bnf: Rc<Bnf>, input: &'a str) -> Self {
        Self {
            bnf,
            lexer: Lexer::new(input),
            config: ParserConfig::default(),
            start_listeners: Vec::new(),
            nested: false,
        }
    }

    pub fn with_config(mut self, config: ParserConfig) -> Self {
        self.config = config;
        self
    }

    /// Registers a listener fired before every tree this parser materializes.
    pub fn on_parse_start(&mut self, listener: ParseStartListener) {
        self.start_listeners.push(listener);
    }

    /// Marks a sub-parse run on behalf of another parse: no listeners fire and errors carry no
    /// expectations.
    pub(crate) fn nested(mut self) -> Self {
        self.nested = true;
        self
    }

    pub fn bnf(&self) -> &Rc<Bnf> {
        &self.bnf
    }

    pub fn lexer(&self) -> &Lexer<'a> {
        &self.lexer
    }

    /// Parses the whole input.
    ///
    /// With `autocompletions` given, the candidates for the end of the input are appended to it.
    pub fn parse(
        &mut self,
        autocompletions: Option<&mut Vec<Autocompletion>>,
    ) -> Result<ParseTree, ParseError> {
        let mut context = CompletionContext::new(self.config.clone());
        self.parse_in_context(autocompletions, &mut context)
    }

    pub(crate) fn parse_in_context(
        &mut self,
        autocompletions: Option<&mut Vec<Autocompletion>>,
        context: &mut CompletionContext,
    ) -> Result<ParseTree, ParseError> {
        let mut derivations = Derivations::default();
        let mut end_of_input = Vec::new();
        let start = derivations.start(self.bnf.start_symbol());
        let parsed = self.derive(&mut derivations, start, &mut end_of_input);
        if let Some(autocompletions) = autocompletions {
            for sequence in &end_of_input {
                if self
                    .add_autocompletions(&derivations, sequence, autocompletions, context)
                    .is_break()
                {
                    break;
                }
            }
        }
        let (mut tree, last) = self.create_parsed_tree(&derivations, &parsed);
        tree.build_ast();
        if tree.state() == ParsingState::Failed {
            return Err(self.parse_error(tree, last, context));
        }
        Ok(tree)
    }

    /// Tries the alternatives of every non-terminal depth first from an explicit stack of frames.
    /// Returns the first derivation of the whole input, or the best partial one.
    fn derive(
        &mut self,
        derivations: &mut Derivations,
        start: SymbolSequence,
        end_of_input: &mut Vec<SymbolSequence>,
    ) -> SymbolSequence {
        let fallback = start.clone();
        let mut frames: Vec<Frame> = Vec::new();
        let mut done: Option<SymbolSequence> = match self.advance(derivations, start, end_of_input) {
            Step::Done(result) => return result,
            Step::Expand(frame) => {
                frames.push(frame);
                None
            }
        };
        let bnf = Rc::clone(&self.bnf);
        while let Some(frame) = frames.last_mut() {
            if let Some(result) = done.take() {
                if result.is_complete() {
                    return result;
                }
                frame.offer(result, derivations, self.config.tie_break);
            }
            match frame.next_alternative(&bnf, derivations) {
                Some(expanded) => match self.advance(derivations, expanded, end_of_input) {
                    Step::Done(result) => done = Some(result),
                    Step::Expand(inner) => frames.push(inner),
                },
                None => done = frames.pop().map(Frame::finish),
            }
        }
        done.unwrap_or(fallback)
    }

    /// Matches the leading terminals of `sequence` and stops at the first non-terminal.
    fn advance(
        &mut self,
        derivations: &mut Derivations,
        mut sequence: SymbolSequence,
        end_of_input: &mut Vec<SymbolSequence>,
    ) -> Step {
        while let Some(index) = sequence.pending {
            let pending = &derivations.pending[index];
            let Symbol::Terminal(terminal) = &pending.symbol else {
                break;
            };
            self.lexer.set_position(sequence.offset);
            let matcher = terminal.matches(&self.lexer);
            let (symbol, next) = (pending.symbol.clone(), pending.next);
            if matcher.state != ParsingState::Successful {
                let state = matcher.state;
                sequence.stuck = Some(matcher);
                if state == ParsingState::EndOfInput {
                    end_of_input.push(sequence.clone());
                }
                return Step::Done(sequence);
            }
            let len = matcher.parsed.len();
            derivations.matched.push(MatchedTerminal {
                symbol,
                matcher,
                previous: sequence.matched,
            });
            sequence.matched = Some(derivations.matched.len() - 1);
            sequence.pending = next;
            sequence.pos += 1;
            sequence.offset += len;
            if len > 0 {
                sequence.idle = 0;
            }
        }

        let Some(nonterminal) = derivations
            .current(&sequence)
            .and_then(Symbol::as_non_terminal)
        else {
            return Step::Done(sequence);
        };
        let alternatives = self.bnf.productions_for(nonterminal);
        if alternatives.is_empty() || sequence.idle >= self.config.max_depth {
            if !alternatives.is_empty() {
                log::warn!(
                    "giving up on `{}` at offset {}: {} expansions without progress",
                    self.bnf.symbols().resolve(nonterminal),
                    sequence.offset,
                    sequence.idle
                );
            }
            sequence.stuck = Some(Matcher::new(ParsingState::Failed, sequence.offset, ""));
            return Step::Done(sequence);
        }
        Step::Expand(Frame {
            sequence,
            nonterminal,
            next: 0,
            best: None,
        })
    }

    /// Materializes the derivation ending in `leaf`. Also returns the node of the last matched
    /// symbol.
    fn create_parsed_tree(
        &self,
        derivations: &Derivations,
        leaf: &SymbolSequence,
    ) -> (ParseTree, Option<NodeId>) {
        if !self.nested {
            for listener in &self.start_listeners {
                listener();
            }
        }
        let mut tree = ParseTree::new(Rc::clone(&self.bnf));
        let stop = leaf.offset;
        let mut sequence: Vec<NodeId> = derivations
            .flatten(leaf)
            .into_iter()
            .map(|(symbol, matcher)| {
                let matcher = matcher.unwrap_or_else(|| Matcher::not_parsed(stop));
                tree.push(ParsedNode::new(symbol, None, matcher))
            })
            .collect();
        let last = (leaf.pos + usize::from(leaf.stuck.is_some()))
            .checked_sub(1)
            .and_then(|i| sequence.get(i).copied());

        let mut cursor = leaf.expansion;
        while let Some(index) = cursor {
            let expansion = &derivations.expansions[index];
            let production = self.bnf.production(expansion.production);
            let start = expansion.pos.min(sequence.len());
            let end = (start + production.right().len()).min(sequence.len());
            let children: Vec<NodeId> = sequence.drain(start..end).collect();
            let empty_pos = sequence
                .get(start)
                .map_or(stop, |&next| tree.node(next).matcher().pos);
            let matcher = aggregate(&tree, &children, empty_pos);
            let node = tree.push(ParsedNode::new(
                Symbol::NonTerminal(production.left()),
                Some(expansion.production),
                matcher,
            ));
            tree.add_children(node, &children);
            sequence.insert(start, node);
            cursor = expansion.parent;
        }

        if let Some(&root) = sequence.first() {
            tree.set_root(root);
        }
        tree.notify_extension_listeners();
        if !self.nested {
            tree.notify_parse_listeners();
        }
        (tree, last)
    }

    /// Adds the candidates of one trace that ran out of input. Breaks once a veto cleared them.
    fn add_autocompletions(
        &self,
        derivations: &Derivations,
        sequence: &SymbolSequence,
        autocompletions: &mut Vec<Autocompletion>,
        context: &mut CompletionContext,
    ) -> ControlFlow<()> {
        let (tree, last) = self.create_parsed_tree(derivations, sequence);
        let Some(last) = last else {
            return ControlFlow::Continue(());
        };
        let mut path: Vec<NodeRef<'_>> =
            successors(Some(tree.node(last)), NodeRef::parent).collect();
        path.reverse();

        for node in path {
            if !node.does_autocomplete(context) {
                continue;
            }
            let Some(candidates) = node.autocompletion(context, false) else {
                continue;
            };
            let already_entered = self.lexer.substring_from(node.matcher().pos);
            for candidate in candidates {
                if candidate.is_veto() {
                    autocompletions.clear();
                    return ControlFlow::Break(());
                }
                let candidate = candidate.attach(node.symbol(), already_entered);
                if !autocompletions.contains(&candidate) {
                    autocompletions.push(candidate);
                }
            }
            break;
        }
        ControlFlow::Continue(())
    }

    fn parse_error(
        &self,
        root: ParseTree,
        failed: Option<NodeId>,
        context: &mut CompletionContext,
    ) -> ParseError {
        let ancestor = failed.and_then(|id| {
            successors(Some(root.node(id)), NodeRef::parent)
                .find(|node| node.does_autocomplete(context))
                .map(|node| node.id())
        });
        let (offset, valid_until) = match failed {
            Some(id) => {
                let matcher = root.node(id).matcher();
                let last_len = matcher.parsed.chars().next_back().map_or(0, char::len_utf8);
                (matcher.end() - last_len, matcher.pos)
            }
            None => (0, 0),
        };

        let location = if self.nested {
            None
        } else {
            // everything before the failing terminal parsed, so its candidates are what was expected
            let mut expectations = Vec::new();
            let prefix = self.lexer.substring(0, valid_until);
            let mut reparse = RdParser::new(Rc::clone(&self.bnf), prefix)
                .with_config(self.config.clone())
                .nested();
            match reparse.parse_in_context(Some(&mut expectations), context) {
                Ok(_) => Some(ErrorLocation::new(
                    self.lexer.input(),
                    offset,
                    expectations
                        .iter()
                        .map(|e| e.completion(Purpose::ForInsertion))
                        .collect(),
                )),
                Err(error) => {
                    log::debug!("no expectations for the error at {offset}: {error}");
                    None
                }
            }
        };
        ParseError::new(root, failed, ancestor, offset, location)
    }
}

/// The matcher of a node derived from `children`: their texts concatenated, the state of the
/// first child that did not match successfully.
fn aggregate(tree: &ParseTree, children: &[NodeId], empty_pos: usize) -> Matcher {
    let pos = children
        .first()
        .map_or(empty_pos, |&child| tree.node(child).matcher().pos);
    let mut state = ParsingState::NotParsed;
    let mut parsed = String::new();
    for &child in children {
        if matches!(state, ParsingState::EndOfInput | ParsingState::Failed) {
            break;
        }
        let matcher = tree.node(child).matcher();
        if matcher.state != ParsingState::NotParsed
            && (state == ParsingState::NotParsed || !matcher.state.is_better_than(state))
        {
            state = matcher.state;
        }
        parsed.push_str(&matcher.parsed);
    }
    Matcher::new(state, pos, parsed)
}
