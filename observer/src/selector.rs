//! A small CSS selector dialect over [`Element`]s.
//!
//! Supported: type selectors (`td`), the universal selector (`*`), ids
//! (`#main`), classes (`.code`), attribute presence (`[data-sha]`) and
//! equality (`[data-sha="abc"]`), compounds of those (`td.code[data-sha]`),
//! and comma-separated lists. Combinators (descendant, `>`, `+`, `~`) are
//! rejected with a typed error.

use crate::tree::Element;
use std::iter::Peekable;
use std::str::{CharIndices, FromStr};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectorError {
    #[error("empty selector")]
    Empty,
    #[error("unexpected `{found}` at byte {at}")]
    Unexpected { found: char, at: usize },
    #[error("expected an identifier at byte {at}")]
    ExpectedIdent { at: usize },
    #[error("unterminated attribute selector")]
    UnterminatedAttribute,
    #[error("combinators are not supported (`{found}` at byte {at})")]
    UnsupportedCombinator { found: char, at: usize },
}

/// A parsed comma-separated selector list. Matches when any alternative
/// matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorList {
    compounds: Vec<Compound>,
}

impl SelectorList {
    pub fn parse(input: &str) -> Result<Self, SelectorError> {
        let mut parser = Parser::new(input);
        let mut compounds = Vec::new();

        loop {
            parser.skip_whitespace();
            compounds.push(parser.parse_compound()?);
            let spaced = parser.skip_whitespace();
            match parser.peek() {
                None => break,
                Some((_, ',')) => {
                    parser.bump();
                }
                Some((at, found @ ('>' | '+' | '~'))) => {
                    return Err(SelectorError::UnsupportedCombinator { found, at });
                }
                Some((at, found)) => {
                    if spaced {
                        return Err(SelectorError::UnsupportedCombinator { found: ' ', at });
                    }
                    return Err(SelectorError::Unexpected { found, at });
                }
            }
        }

        Ok(Self { compounds })
    }

    /// Whether any alternative in the list matches `element`.
    #[must_use]
    pub fn matches(&self, element: &Element) -> bool {
        self.compounds.iter().any(|compound| compound.matches(element))
    }
}

impl FromStr for SelectorList {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, SelectorError> {
        Self::parse(s)
    }
}

/// One compound: every listed condition must hold on the same element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attributes: Vec<AttrSelector>,
}

impl Compound {
    fn matches(&self, element: &Element) -> bool {
        if let Some(tag) = &self.tag
            && !tag.eq_ignore_ascii_case(element.tag())
        {
            return false;
        }
        if let Some(id) = &self.id
            && element.id() != Some(id.as_str())
        {
            return false;
        }
        if !self.classes.iter().all(|class| element.has_class(class)) {
            return false;
        }
        self.attributes.iter().all(|attr| {
            match (&attr.value, element.attribute(&attr.name)) {
                (None, found) => found.is_some(),
                (Some(want), found) => found == Some(want.as_str()),
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttrSelector {
    name: String,
    value: Option<String>,
}

struct Parser<'a> {
    input: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().peekable(),
        }
    }

    fn peek(&mut self) -> Option<(usize, char)> {
        self.chars.peek().copied()
    }

    fn bump(&mut self) {
        self.chars.next();
    }

    fn skip_whitespace(&mut self) -> bool {
        let mut skipped = false;
        while let Some((_, c)) = self.peek() {
            if !c.is_whitespace() {
                break;
            }
            self.bump();
            skipped = true;
        }
        skipped
    }

    fn parse_compound(&mut self) -> Result<Compound, SelectorError> {
        let mut compound = Compound::default();
        let mut any = false;

        match self.peek() {
            Some((_, '*')) => {
                self.bump();
                any = true;
            }
            Some((_, c)) if is_ident_start(c) => {
                compound.tag = Some(self.parse_ident()?);
                any = true;
            }
            _ => {}
        }

        loop {
            match self.peek() {
                Some((_, '#')) => {
                    self.bump();
                    compound.id = Some(self.parse_ident()?);
                }
                Some((_, '.')) => {
                    self.bump();
                    compound.classes.push(self.parse_ident()?);
                }
                Some((_, '[')) => {
                    self.bump();
                    compound.attributes.push(self.parse_attribute()?);
                }
                _ => break,
            }
            any = true;
        }

        if any {
            Ok(compound)
        } else {
            match self.peek() {
                Some((at, found)) => Err(SelectorError::Unexpected { found, at }),
                None => Err(SelectorError::Empty),
            }
        }
    }

    fn parse_attribute(&mut self) -> Result<AttrSelector, SelectorError> {
        self.skip_whitespace();
        let name = self.parse_ident()?;
        self.skip_whitespace();

        match self.peek() {
            Some((_, ']')) => {
                self.bump();
                Ok(AttrSelector { name, value: None })
            }
            Some((_, '=')) => {
                self.bump();
                self.skip_whitespace();
                let value = self.parse_attr_value()?;
                self.skip_whitespace();
                match self.peek() {
                    Some((_, ']')) => {
                        self.bump();
                        Ok(AttrSelector { name, value: Some(value) })
                    }
                    Some((at, found)) => Err(SelectorError::Unexpected { found, at }),
                    None => Err(SelectorError::UnterminatedAttribute),
                }
            }
            Some((at, found)) => Err(SelectorError::Unexpected { found, at }),
            None => Err(SelectorError::UnterminatedAttribute),
        }
    }

    fn parse_attr_value(&mut self) -> Result<String, SelectorError> {
        let Some((_, quote @ ('"' | '\''))) = self.peek() else {
            return self.parse_ident();
        };
        self.bump();

        let mut value = String::new();
        loop {
            match self.peek() {
                Some((_, c)) if c == quote => {
                    self.bump();
                    return Ok(value);
                }
                Some((_, c)) => {
                    value.push(c);
                    self.bump();
                }
                None => return Err(SelectorError::UnterminatedAttribute),
            }
        }
    }

    fn parse_ident(&mut self) -> Result<String, SelectorError> {
        let mut ident = String::new();
        while let Some((_, c)) = self.peek() {
            if !is_ident_char(c) {
                break;
            }
            ident.push(c);
            self.bump();
        }
        if ident.is_empty() {
            let at = self.peek().map_or(self.input.len(), |(at, _)| at);
            return Err(SelectorError::ExpectedIdent { at });
        }
        Ok(ident)
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '-'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-'
}
