/// A cursor over the input text. Positions are byte offsets on character boundaries.
#[derive(Debug, Clone)]
pub struct Lexer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    pub fn input(&self) -> &'a str {
        self.input
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn set_position(&mut self, pos: usize) {
        self.pos = pos.min(self.input.len());
    }

    pub fn fwd(&mut self, len: usize) {
        self.set_position(self.pos + len);
    }

    pub fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    pub fn remaining(&self) -> &'a str {
        self.input.get(self.pos..).unwrap_or_default()
    }

    pub fn is_at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    /// The text in `from..to`, clamped to the input.
    pub fn substring(&self, from: usize, to: usize) -> &'a str {
        let to = to.min(self.input.len());
        self.input.get(from.min(to)..to).unwrap_or_default()
    }

    pub fn substring_from(&self, from: usize) -> &'a str {
        self.substring(from, self.input.len())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn cursor() {
        let mut lexer = Lexer::new("één");
        assert_eq!(lexer.peek(), Some('é'));
        lexer.fwd('é'.len_utf8());
        assert_eq!(lexer.remaining(), "én");
        lexer.fwd(100);
        assert!(lexer.is_at_end());
        assert_eq!(lexer.peek(), None);
        assert_eq!(lexer.substring(2, 100), "én");
        assert_eq!(lexer.substring_from(7), "");
    }
}
