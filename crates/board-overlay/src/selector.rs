//! CSS-style selector subset used to address the host tree.
//!
//! Supported: type selectors, `#id`, `.class` (compounded, e.g.
//! `wc-chess-board#board-play.board`), the descendant combinator
//! (whitespace) and selector lists (`a, b`).

use std::str::FromStr;

use crate::dom::{Document, Element, NodeId};
use crate::error::OverlayError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    alternatives: Vec<Vec<Compound>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
}

impl Compound {
    fn parse(raw: &str) -> Result<Self, OverlayError> {
        let mut compound = Compound::default();
        // Split into the leading type part and '#'/'.' prefixed segments
        let mut segments: Vec<(char, String)> = Vec::new();
        let mut current = (' ', String::new());
        for c in raw.chars() {
            match c {
                '#' | '.' => {
                    segments.push(std::mem::replace(&mut current, (c, String::new())));
                }
                c if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '*' => {
                    current.1.push(c);
                }
                _ => return Err(OverlayError::InvalidSelector(raw.to_string())),
            }
        }
        segments.push(current);

        for (prefix, name) in segments {
            match prefix {
                ' ' if name.is_empty() || name == "*" => {}
                ' ' => compound.tag = Some(name.to_ascii_lowercase()),
                _ if name.is_empty() || name.contains('*') => {
                    return Err(OverlayError::InvalidSelector(raw.to_string()));
                }
                '#' => compound.id = Some(name),
                _ => compound.classes.push(name),
            }
        }
        Ok(compound)
    }

    fn matches(&self, element: &Element) -> bool {
        if let Some(tag) = &self.tag {
            if !element.tag.eq_ignore_ascii_case(tag) {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if element.id.as_deref() != Some(id.as_str()) {
                return false;
            }
        }
        self.classes
            .iter()
            .all(|class| element.classes.iter().any(|c| c == class))
    }
}

impl FromStr for Selector {
    type Err = OverlayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut alternatives = Vec::new();
        for alternative in s.split(',') {
            let chain = alternative
                .split_whitespace()
                .map(Compound::parse)
                .collect::<Result<Vec<_>, _>>()?;
            if chain.is_empty() {
                return Err(OverlayError::InvalidSelector(s.to_string()));
            }
            alternatives.push(chain);
        }
        Ok(Self { alternatives })
    }
}

impl Selector {
    /// Parse a selector literal known at compile time.
    pub(crate) fn fixed(s: &str) -> Self {
        s.parse().expect("static selector literal")
    }

    /// Whether `node` matches any alternative. Ancestors outside any query
    /// scope still take part in descendant matching, as in the DOM.
    pub fn matches(&self, doc: &Document, node: NodeId) -> bool {
        self.alternatives
            .iter()
            .any(|chain| matches_chain(doc, node, chain))
    }
}

fn matches_chain(doc: &Document, node: NodeId, chain: &[Compound]) -> bool {
    let Some((last, ancestors)) = chain.split_last() else {
        return false;
    };
    match doc.element(node) {
        Some(element) if last.matches(element) => {}
        _ => return false,
    }

    // Right-to-left, greedy nearest-ancestor match
    let mut cursor = doc.parent(node);
    for compound in ancestors.iter().rev() {
        loop {
            let Some(ancestor) = cursor else {
                return false;
            };
            cursor = doc.parent(ancestor);
            if doc.element(ancestor).is_some_and(|e| compound.matches(e)) {
                break;
            }
        }
    }
    true
}
