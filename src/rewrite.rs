//! Rewriting background declarations to point at the sprite sheet
//!
//! Only the text span of each qualifying declaration is touched. Inside a span,
//! every `url(...)` whose image made it into the sheet gets the sheet reference
//! instead, and a `background-position` with the matching offsets is appended.
//! Splices on one line shift the columns of later declarations on that line; the
//! accumulated shift is tracked per line.

use crate::collect::resolve_image_path;
use crate::css::{comment_ranges, Position};
use crate::locate::ImageDeclaration;
use crate::pack::CoordinateMap;
use crate::url::replace_urls;
use std::collections::HashMap;
use std::path::Path;

/// Accumulated column drift per 0-indexed line, in characters.
#[derive(Debug, Default)]
struct ColumnOffsets(HashMap<usize, isize>);

impl ColumnOffsets {
    fn get(&self, line: usize) -> isize {
        self.0.get(&line).copied().unwrap_or(0)
    }

    fn shift(&mut self, line: usize, delta: isize) {
        *self.0.entry(line).or_insert(0) += delta;
    }
}

/// Rewrites chunks against one packed sheet.
#[derive(Debug, Clone, Copy)]
pub struct Rewriter<'a> {
    pub coordinates: &'a CoordinateMap,
    /// What replaces each sprited URL, as seen from the CSS file
    pub sheet_reference: &'a str,
}

impl<'a> Rewriter<'a> {
    pub fn new(coordinates: &'a CoordinateMap, sheet_reference: &'a str) -> Self {
        Self { coordinates, sheet_reference }
    }

    fn is_sheet_reference(&self, url: &str, chunk_dir: &Path) -> bool {
        url == self.sheet_reference
            || resolve_image_path(chunk_dir, url) == resolve_image_path(chunk_dir, self.sheet_reference)
    }

    /// Rewrite the source text of a single declaration.
    ///
    /// URLs pointing at the sheet itself or at images missing from the coordinate map
    /// are left as written. Returns the text unchanged when nothing was sprited.
    pub fn rewrite_declaration(&self, text: &str, chunk_dir: &Path) -> String {
        let mut offsets = Vec::new();
        let mut rewritten = String::with_capacity(text.len());
        let mut cursor = 0;

        // Only the text between comments is live
        let end = text.len()..text.len();
        for comment in comment_ranges(text).into_iter().chain(std::iter::once(end)) {
            rewritten.push_str(&replace_urls(&text[cursor..comment.start], |found| {
                if self.is_sheet_reference(found.path, chunk_dir) {
                    return None;
                }
                let rect = self.coordinates.get(&resolve_image_path(chunk_dir, found.path))?;
                offsets.push(format!("-{}px -{}px", rect.x, rect.y));
                Some(format!("{}{}{}", found.prefix, self.sheet_reference, found.suffix))
            }));
            rewritten.push_str(&text[comment.clone()]);
            cursor = comment.end;
        }

        if !offsets.is_empty() {
            if !rewritten.ends_with(';') {
                rewritten.push(';');
            }
            rewritten.push_str(" background-position: ");
            rewritten.push_str(&offsets.join(", "));
            rewritten.push(';');
        }

        rewritten
    }

    /// Rewrite every declaration of one chunk and return the new chunk text.
    ///
    /// `declarations` must be in source order, with positions relative to `source`.
    /// The line count of the output always equals that of the input.
    pub fn rewrite_chunk(&self, source: &str, chunk_dir: &Path, declarations: &[ImageDeclaration]) -> String {
        let mut lines: Vec<String> = source.split('\n').map(str::to_string).collect();
        let mut offsets = ColumnOffsets::default();

        for decl in declarations {
            if !self.splice(&mut lines, &mut offsets, &decl.declaration.position, chunk_dir) {
                log::debug!(
                    "skipping declaration at {}:{} with a span outside the chunk",
                    decl.declaration.position.start.line,
                    decl.declaration.position.start.column
                );
            }
        }

        lines.join("\n")
    }

    /// Rewrite one declaration span in place. Returns `false` if the span does not
    /// fit the current text.
    fn splice(&self, lines: &mut [String], offsets: &mut ColumnOffsets, position: &Position, chunk_dir: &Path) -> bool {
        let (Some(start_line), Some(end_line)) =
            (position.start.line.checked_sub(1), position.end.line.checked_sub(1))
        else {
            return false;
        };
        if start_line > end_line || end_line >= lines.len() {
            return false;
        }

        let start_col = position.start.column as isize - 1 + offsets.get(start_line);
        // Inclusive end column -> exclusive 0-indexed column
        let end_col = position.end.column as isize + offsets.get(end_line);
        if start_col < 0 || end_col < 0 {
            return false;
        }

        let head = &lines[start_line];
        let tail = &lines[end_line];
        let (Some(start), Some(end)) = (byte_index(head, start_col as usize), byte_index(tail, end_col as usize)) else {
            return false;
        };

        if start_line == end_line {
            if start > end {
                return false;
            }
            let old = &head[start..end];
            let new = self.rewrite_declaration(old, chunk_dir);
            let delta = char_len(&new) - char_len(old);
            lines[start_line] = format!("{}{}{}", &head[..start], new, &head[end..]);
            offsets.shift(start_line, delta);
            return true;
        }

        // Span crosses lines: rewrite it as one piece, then split it back
        let mut old = head[start..].to_string();
        for line in &lines[start_line + 1..end_line] {
            old.push('\n');
            old.push_str(line);
        }
        old.push('\n');
        old.push_str(&tail[..end]);

        let new = self.rewrite_declaration(&old, chunk_dir);
        let parts: Vec<&str> = new.split('\n').collect();
        if parts.len() != end_line - start_line + 1 {
            return false;
        }

        let old_tail_len = char_len(&tail[..end]);
        let new_head = format!("{}{}", &head[..start], parts[0]);
        let new_tail = format!("{}{}", parts[parts.len() - 1], &tail[end..]);

        lines[start_line] = new_head;
        for (offset, part) in parts[1..parts.len() - 1].iter().enumerate() {
            lines[start_line + 1 + offset] = (*part).to_string();
        }
        lines[end_line] = new_tail;
        offsets.shift(end_line, char_len(parts[parts.len() - 1]) - old_tail_len);

        true
    }
}

/// Byte index of the character at `column` (0-indexed); the line length for a
/// column just past the end.
fn byte_index(line: &str, column: usize) -> Option<usize> {
    if column == line.chars().count() {
        return Some(line.len());
    }
    line.char_indices().nth(column).map(|(i, _)| i)
}

fn char_len(text: &str) -> isize {
    text.chars().count() as isize
}
