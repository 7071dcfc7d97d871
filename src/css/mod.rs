//! Positional style sheet model
//!
//! A small CSS tree: top-level rules, each holding its declarations and
//! comments in source order, every node tagged with 1-indexed line/column positions
//! into the original text. Comment nodes are kept because their adjacency to a
//! declaration carries `@meta` directives.

pub mod parser;

pub use parser::{comment_ranges, parse_stylesheet, ParseOutput, ParseWarning};

/// A 1-indexed location in the source text. Columns count characters, not bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

impl Location {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

/// Inclusive source range of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub start: Location,
    pub end: Location,
}

/// A `property: value` pair inside a rule body.
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    /// Lowercased property name
    pub property: String,
    /// Trimmed value text as written, with comments removed
    pub value: String,
    /// Span from the first character of the property through the terminating `;`
    /// (or the last character of the value when the `;` is omitted)
    pub position: Position,
}

/// A `/* ... */` comment; `comment` holds the text between the delimiters.
#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    pub comment: String,
    pub position: Position,
}

/// One entry of a rule body.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Declaration(Declaration),
    Comment(Comment),
}

impl Node {
    pub fn position(&self) -> &Position {
        match self {
            Node::Declaration(decl) => &decl.position,
            Node::Comment(comment) => &comment.position,
        }
    }

    pub fn as_declaration(&self) -> Option<&Declaration> {
        match self {
            Node::Declaration(decl) => Some(decl),
            Node::Comment(_) => None,
        }
    }

    pub fn as_comment(&self) -> Option<&Comment> {
        match self {
            Node::Comment(comment) => Some(comment),
            Node::Declaration(_) => None,
        }
    }
}

/// What kind of top-level construct a [`Rule`] is.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleKind {
    /// `selector { declarations }`
    Style,
    /// `@name prelude { ... }` or `@name prelude;`. The body is kept opaque.
    AtRule { name: String, prelude: String },
    /// A comment at sheet level
    Comment { text: String },
}

/// A top-level entry of a style sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub kind: RuleKind,
    /// Comma-separated selectors of a style rule; empty for other kinds
    pub selectors: Vec<String>,
    /// Declarations and comments of a style rule in source order
    pub nodes: Vec<Node>,
    pub position: Position,
}

impl Rule {
    pub fn is_style(&self) -> bool {
        matches!(self.kind, RuleKind::Style)
    }
}

/// Root of a parsed chunk.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StyleSheet {
    pub rules: Vec<Rule>,
}

impl StyleSheet {
    /// Iterate over the style rules only.
    pub fn style_rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter().filter(|rule| rule.is_style())
    }
}
