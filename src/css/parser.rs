//! Lenient CSS parser producing a positional [`StyleSheet`]
//!
//! Tokens come from `cssparser`, including whitespace and comments. The walker here
//! keeps only the structure the spriter needs: style rules with their declarations
//! and comments, sheet-level comments, and at-rules (kept opaque). Byte offsets
//! from the tokenizer are mapped back to 1-indexed, char-counted locations.
//! Malformed input produces [`ParseWarning`]s and parsing continues.

use super::{Comment, Declaration, Location, Node, Position, Rule, RuleKind, StyleSheet};
use cssparser::{ParseError, Parser as CssParser, ParserInput, Token};
use std::ops::Range;
use thiserror::Error;

/// A recoverable problem found while parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}, column {column}: {message}")]
pub struct ParseWarning {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

/// Result of parsing one chunk of CSS.
#[derive(Debug, Clone, Default)]
pub struct ParseOutput {
    pub stylesheet: StyleSheet,
    pub warnings: Vec<ParseWarning>,
}

/// Parse CSS source text into a [`StyleSheet`].
///
/// Never fails; anything the parser has to skip is reported in
/// [`ParseOutput::warnings`].
///
/// # Example
///
/// ```
/// use css_spriter::css::parse_stylesheet;
///
/// let output = parse_stylesheet(".a { background: url(a.png); }");
/// assert!(output.warnings.is_empty());
///
/// let rule = &output.stylesheet.rules[0];
/// let decl = rule.nodes[0].as_declaration().unwrap();
/// assert_eq!(decl.property, "background");
/// assert_eq!(decl.value, "url(a.png)");
/// assert_eq!(decl.position.start.column, 6);
/// assert_eq!(decl.position.end.column, 28);
/// ```
pub fn parse_stylesheet(source: &str) -> ParseOutput {
    let mut input = ParserInput::new(source);
    let mut tokens = CssParser::new(&mut input);
    let mut walker = Walker::new(source);
    let rules = walker.parse_rules(&mut tokens);
    ParseOutput { stylesheet: StyleSheet { rules }, warnings: walker.warnings }
}

/// Byte ranges of the `/* ... */` comments in `text`.
///
/// Comment-like text inside strings, `url()` tokens or brackets is not reported.
pub fn comment_ranges(text: &str) -> Vec<Range<usize>> {
    let mut input = ParserInput::new(text);
    let mut tokens = CssParser::new(&mut input);
    let mut ranges = Vec::new();
    while let Some(item) = next_spanned(&mut tokens) {
        match item.token {
            Token::Comment(_) => ranges.push(item.start..item.end),
            Token::CurlyBracketBlock => skip_block(&mut tokens),
            _ => {}
        }
    }
    ranges
}

/// A token with the byte range it covers in the source.
struct Spanned<'i> {
    token: Token<'i>,
    start: usize,
    end: usize,
}

/// Next token including whitespace and comments.
///
/// `(...)`, `[...]` and function blocks are consumed whole so that `end` covers the
/// closing bracket. `{...}` blocks are left to the caller.
fn next_spanned<'i>(input: &mut CssParser<'i, '_>) -> Option<Spanned<'i>> {
    let start = input.position().byte_index();
    let token = input.next_including_whitespace_and_comments().ok()?.clone();
    if matches!(token, Token::Function(_) | Token::ParenthesisBlock | Token::SquareBracketBlock) {
        skip_block(input);
    }
    let end = input.position().byte_index();
    Some(Spanned { token, start, end })
}

/// Consume the contents of the block just opened, through its closing token.
fn skip_block(input: &mut CssParser<'_, '_>) {
    input
        .parse_nested_block(|nested| {
            while nested.next_including_whitespace_and_comments().is_ok() {}
            Ok::<_, ParseError<'_, ()>>(())
        })
        .ok();
}

struct Walker<'s> {
    source: &'s str,
    /// Byte offset of the start of each line
    line_starts: Vec<usize>,
    warnings: Vec<ParseWarning>,
}

impl<'s> Walker<'s> {
    fn new(source: &'s str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self { source, line_starts, warnings: Vec::new() }
    }

    fn location(&self, offset: usize) -> Location {
        let line = self.line_starts.partition_point(|&start| start <= offset);
        let line_start = self.line_starts[line - 1];
        let column = self.source[line_start..offset].chars().count() + 1;
        Location::new(line, column)
    }

    /// Inclusive position of the bytes `start..end`.
    fn span(&self, start: usize, end: usize) -> Position {
        let width = self.source[start..end].chars().next_back().map_or(0, char::len_utf8);
        Position { start: self.location(start), end: self.location(end - width) }
    }

    fn warn(&mut self, message: impl Into<String>, offset: usize) {
        let at = self.location(offset);
        self.warnings.push(ParseWarning {
            message: message.into(),
            line: at.line,
            column: at.column,
        });
    }

    fn comment(&mut self, start: usize, end: usize) -> Comment {
        let source = self.source;
        let raw = &source[start..end];
        let text = match raw.strip_prefix("/*").and_then(|rest| rest.strip_suffix("*/")) {
            Some(text) => text,
            None => {
                self.warn("unterminated comment", start);
                raw.get(2..).unwrap_or_default()
            }
        };
        Comment { comment: text.to_string(), position: self.span(start, end) }
    }

    /// Append the text of a token to `out`. Comments are dropped.
    fn push_text(&mut self, out: &mut String, item: &Spanned<'_>) {
        match item.token {
            Token::Comment(_) => {
                self.comment(item.start, item.end);
                return;
            }
            Token::BadString(_) => self.warn("unterminated string", item.start),
            Token::BadUrl(_) => self.warn("malformed `url()`", item.start),
            _ => {}
        }
        out.push_str(&self.source[item.start..item.end]);
    }

    /// Warn when the `{...}` block ending at `end` was cut off by the end of input.
    fn check_closed(&mut self, end: usize) {
        if !self.source[..end].ends_with('}') {
            self.warn("missing `}`", end);
        }
    }

    fn parse_rules(&mut self, input: &mut CssParser<'_, '_>) -> Vec<Rule> {
        let mut rules = Vec::new();

        while let Some(item) = next_spanned(input) {
            match item.token {
                Token::WhiteSpace(_) | Token::CDO | Token::CDC => {}
                Token::Comment(_) => {
                    let comment = self.comment(item.start, item.end);
                    rules.push(Rule {
                        kind: RuleKind::Comment { text: comment.comment },
                        selectors: Vec::new(),
                        nodes: Vec::new(),
                        position: comment.position,
                    });
                }
                Token::CloseCurlyBracket => self.warn("unexpected `}`", item.start),
                Token::AtKeyword(ref name) => {
                    let name = name.to_ascii_lowercase();
                    rules.push(self.parse_at_rule(input, name, item.start));
                }
                _ => {
                    if let Some(rule) = self.parse_style_rule(input, item) {
                        rules.push(rule);
                    }
                }
            }
        }

        rules
    }

    fn parse_style_rule(&mut self, input: &mut CssParser<'_, '_>, first: Spanned<'_>) -> Option<Rule> {
        let start = first.start;
        let mut prelude = String::new();
        let mut next = Some(first);

        loop {
            let Some(item) = next else {
                self.warn("selector missing `{`", start);
                return None;
            };
            match item.token {
                Token::CurlyBracketBlock => break,
                Token::CloseCurlyBracket => {
                    self.warn("selector missing `{`", start);
                    return None;
                }
                _ => self.push_text(&mut prelude, &item),
            }
            next = next_spanned(input);
        }

        let nodes = input
            .parse_nested_block(|body| Ok::<_, ParseError<'_, ()>>(self.parse_body(body)))
            .unwrap_or_default();
        let end = input.position().byte_index();
        self.check_closed(end);

        let selectors = prelude
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Some(Rule {
            kind: RuleKind::Style,
            selectors,
            nodes,
            position: self.span(start, end),
        })
    }

    fn parse_body(&mut self, input: &mut CssParser<'_, '_>) -> Vec<Node> {
        let mut nodes = Vec::new();

        while let Some(item) = next_spanned(input) {
            match item.token {
                Token::WhiteSpace(_) | Token::Semicolon => {}
                Token::Comment(_) => nodes.push(Node::Comment(self.comment(item.start, item.end))),
                _ => {
                    if let Some(decl) = self.parse_declaration(input, item) {
                        nodes.push(Node::Declaration(decl));
                    }
                }
            }
        }

        nodes
    }

    fn parse_declaration(&mut self, input: &mut CssParser<'_, '_>, first: Spanned<'_>) -> Option<Declaration> {
        let start = first.start;

        let mut property = String::new();
        let mut next = Some(first);
        loop {
            let Some(item) = next else {
                self.warn("declaration missing `:`", start);
                return None;
            };
            match item.token {
                Token::Colon => break,
                Token::Semicolon => {
                    self.warn("declaration missing `:`", start);
                    return None;
                }
                Token::CurlyBracketBlock => {
                    skip_block(input);
                    self.warn("declaration missing `:`", start);
                    self.recover(input);
                    return None;
                }
                _ => self.push_text(&mut property, &item),
            }
            next = next_spanned(input);
        }

        // Comments are dropped from the value but still belong to the span
        let mut value = String::new();
        let mut value_end = None;
        let mut semicolon_end = None;
        while let Some(item) = next_spanned(input) {
            match item.token {
                Token::Semicolon => {
                    semicolon_end = Some(item.end);
                    break;
                }
                Token::WhiteSpace(_) => value.push_str(&self.source[item.start..item.end]),
                Token::CurlyBracketBlock => {
                    skip_block(input);
                    let end = input.position().byte_index();
                    value.push_str(&self.source[item.start..end]);
                    value_end = Some(end);
                }
                _ => {
                    self.push_text(&mut value, &item);
                    value_end = Some(item.end);
                }
            }
        }

        let end = semicolon_end.or(value_end).unwrap_or_else(|| input.position().byte_index());

        Some(Declaration {
            property: property.trim().to_ascii_lowercase(),
            value: value.trim().to_string(),
            position: self.span(start, end),
        })
    }

    /// Skip past the rest of a broken declaration.
    fn recover(&mut self, input: &mut CssParser<'_, '_>) {
        while let Some(item) = next_spanned(input) {
            match item.token {
                Token::Semicolon => return,
                Token::CurlyBracketBlock => skip_block(input),
                _ => {}
            }
        }
    }

    fn parse_at_rule(&mut self, input: &mut CssParser<'_, '_>, name: String, start: usize) -> Rule {
        let mut prelude = String::new();
        let mut end = input.position().byte_index();

        loop {
            let Some(item) = next_spanned(input) else {
                self.warn(format!("`@{name}` missing `;` or `{{`"), start);
                break;
            };
            match item.token {
                Token::Semicolon => {
                    end = item.end;
                    break;
                }
                Token::CurlyBracketBlock => {
                    skip_block(input);
                    end = input.position().byte_index();
                    self.check_closed(end);
                    break;
                }
                Token::WhiteSpace(_) => prelude.push_str(&self.source[item.start..item.end]),
                _ => {
                    self.push_text(&mut prelude, &item);
                    end = item.end;
                }
            }
        }

        Rule {
            kind: RuleKind::AtRule { name, prelude: prelude.trim().to_string() },
            selectors: Vec::new(),
            nodes: Vec::new(),
            position: self.span(start, end),
        }
    }
}
