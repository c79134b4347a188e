use thiserror::Error;

use crate::node::{NodeId, NodeRef, ParseTree};

/// Where a parse failed, with what would have been accepted there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorLocation {
    /// 1-based.
    pub line: usize,
    pub line_text: String,
    /// Spaces up to the offending character, then `^`.
    pub caret: String,
    pub expectations: Vec<String>,
}

impl ErrorLocation {
    pub(crate) fn new(input: &str, offset: usize, expectations: Vec<String>) -> Self {
        let offset = offset.min(input.len());
        let before = input.get(..offset).unwrap_or_default();
        let line = 1 + before.matches('\n').count() + before.matches('\r').count()
            - before.matches("\r\n").count();
        let line_start = before.rfind(['\n', '\r']).map_or(0, |i| i + 1);
        let line_end = input
            .get(offset..)
            .and_then(|rest| rest.find(['\n', '\r']))
            .map_or(input.len(), |i| offset + i);
        let column = before.get(line_start..).map_or(0, |s| s.chars().count());
        Self {
            line,
            line_text: input.get(line_start..line_end).unwrap_or_default().to_string(),
            caret: format!("{}^", " ".repeat(column)),
            expectations,
        }
    }
}

/// The input could not be derived from the grammar.
///
/// The tree built from the best partial derivation stays available through [`ParseError::root`].
#[derive(Error, Debug)]
#[error("{message}")]
pub struct ParseError {
    root: ParseTree,
    failed_terminal: Option<NodeId>,
    autocompleting_ancestor: Option<NodeId>,
    offset: usize,
    location: Option<ErrorLocation>,
    message: String,
}

impl ParseError {
    pub(crate) fn new(
        root: ParseTree,
        failed_terminal: Option<NodeId>,
        autocompleting_ancestor: Option<NodeId>,
        offset: usize,
        location: Option<ErrorLocation>,
    ) -> Self {
        let message = match &location {
            Some(location) => format!(
                "Error at position {offset} in line {}:\n{}\n{}\nExpected {}",
                location.line,
                location.line_text,
                location.caret,
                location.expectations.join(", ")
            ),
            None => format!("Error at position {offset}"),
        };
        Self {
            root,
            failed_terminal,
            autocompleting_ancestor,
            offset,
            location,
            message,
        }
    }

    pub fn root(&self) -> &ParseTree {
        &self.root
    }

    pub fn into_root(self) -> ParseTree {
        self.root
    }

    pub fn failed_terminal(&self) -> Option<NodeRef<'_>> {
        self.failed_terminal.map(|id| self.root.node(id))
    }

    /// The closest ancestor of the failed terminal that autocompletes.
    pub fn autocompleting_ancestor(&self) -> Option<NodeRef<'_>> {
        self.autocompleting_ancestor.map(|id| self.root.node(id))
    }

    /// Byte offset of the offending character.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn location(&self) -> Option<&ErrorLocation> {
        self.location.as_ref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn location_in_first_line() {
        let location = ErrorLocation::new("abc", 1, vec!["x".to_string()]);
        assert_eq!(location.line, 1);
        assert_eq!(location.line_text, "abc");
        assert_eq!(location.caret, " ^");
    }

    #[test]
    fn windows_line_breaks_count_once() {
        let location = ErrorLocation::new("a\r\nb\rcd\n", 6, Vec::new());
        assert_eq!(location.line, 3);
        assert_eq!(location.line_text, "cd");
        assert_eq!(location.caret, " ^");
    }

    #[test]
    fn caret_counts_characters() {
        let location = ErrorLocation::new("\u{e9}\u{e9}x", 4, Vec::new());
        assert_eq!(location.caret, "  ^");
    }
}
