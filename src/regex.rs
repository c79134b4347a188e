use std::{
    fmt::Debug,
    hash::{Hash, Hasher},
    rc::Rc,
};

use regex_lite::Regex;

use crate::semantic_error::SemanticError;

/// An inline `[...]` class matching exactly one character.
#[derive(Clone)]
pub struct CharacterClass {
    pattern: Rc<str>,
    regex: Regex,
}

impl CharacterClass {
    pub fn new(pattern: &str) -> Result<Self, SemanticError> {
        // anchored so that a class only ever accepts one whole character
        let regex = Regex::new(&format!("^(?:{pattern})$")).map_err(|source| {
            SemanticError::InvalidCharacterClass {
                pattern: pattern.to_string(),
                source,
            }
        })?;
        Ok(Self {
            pattern: Rc::from(pattern),
            regex,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn is_match(&self, c: char) -> bool {
        let mut buffer = [0u8; 4];
        self.regex.is_match(c.encode_utf8(&mut buffer))
    }
}

impl PartialEq for CharacterClass {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern
    }
}

impl Eq for CharacterClass {}

impl Hash for CharacterClass {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.pattern.hash(state);
    }
}

impl Debug for CharacterClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("CharacterClass").field(&self.pattern).finish()
    }
}
