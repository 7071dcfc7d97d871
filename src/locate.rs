//! Finding background declarations in a parsed style sheet

use crate::css::{Declaration, Rule, StyleSheet};
use crate::filter::{should_include, IncludeMode};
use crate::meta::{resolve_meta, DeclarationMeta};
use crate::url::has_url;

/// A background declaration together with where it sits in its rule.
#[derive(Debug, Clone, Copy)]
pub struct LocatedDeclaration<'a> {
    pub rule: &'a Rule,
    /// Index of the declaration within `rule.nodes`
    pub index: usize,
    pub declaration: &'a Declaration,
}

impl LocatedDeclaration<'_> {
    /// Copy the declaration out of the tree with its resolved metadata attached.
    pub fn resolve(&self) -> ImageDeclaration {
        ImageDeclaration {
            declaration: self.declaration.clone(),
            meta: resolve_meta(self.rule, self.index),
        }
    }
}

/// A background declaration copied out of the parse tree, plus its metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageDeclaration {
    pub declaration: Declaration,
    pub meta: DeclarationMeta,
}

/// Whether a declaration references a background image.
///
/// `background-image` always counts; the `background` shorthand only when its
/// value contains a `url(...)`.
pub fn is_background_declaration(declaration: &Declaration) -> bool {
    match declaration.property.as_str() {
        "background-image" => true,
        "background" => has_url(&declaration.value),
        _ => false,
    }
}

/// Every background declaration of the sheet's top-level style rules, in source order.
pub fn locate_background_declarations(sheet: &StyleSheet) -> Vec<LocatedDeclaration<'_>> {
    let mut located = Vec::new();

    for rule in sheet.style_rules() {
        for (index, node) in rule.nodes.iter().enumerate() {
            if let Some(declaration) = node.as_declaration() {
                if is_background_declaration(declaration) {
                    located.push(LocatedDeclaration { rule, index, declaration });
                }
            }
        }
    }

    located
}

/// Located, metadata-resolved and filtered background declarations.
pub fn background_image_declarations(sheet: &StyleSheet, mode: IncludeMode) -> Vec<ImageDeclaration> {
    locate_background_declarations(sheet)
        .iter()
        .map(LocatedDeclaration::resolve)
        .filter(|decl| should_include(&decl.meta, mode))
        .collect()
}
