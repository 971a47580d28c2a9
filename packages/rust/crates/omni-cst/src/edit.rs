//! Byte-span edits recorded against an unchanged source text.
//!
//! Edits never overlap; rendering splices them into the original text in
//! position order so every byte outside an edit is reproduced verbatim.

use std::ops::Range;

use crate::error::SyntaxError;

/// Half-open byte range into the original source text.
pub type Span = Range<usize>;

/// A single replacement of `span` with `text` (empty span = insertion).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEdit {
    /// Replaced byte range of the original text.
    pub span: Span,
    /// Text written in place of the range.
    pub text: String,
}

impl TextEdit {
    fn is_insertion(&self) -> bool {
        self.span.start == self.span.end
    }

    fn overlaps(&self, other: &Span) -> bool {
        let (a, b) = (&self.span, other);
        match (a.start == a.end, b.start == b.end) {
            (true, true) => false,
            (true, false) => b.start < a.start && a.start < b.end,
            (false, true) => a.start < b.start && b.start < a.end,
            (false, false) => a.start < b.end && b.start < a.end,
        }
    }
}

/// Ordered, non-overlapping set of edits.
#[derive(Debug, Clone, Default)]
pub struct EditSet {
    edits: Vec<TextEdit>,
}

impl EditSet {
    /// Record an edit, rejecting any intersection with recorded edits.
    ///
    /// Insertions at the same offset keep their recording order.
    pub(crate) fn push(&mut self, source: &str, edit: TextEdit) -> Result<(), SyntaxError> {
        check_bounds(source, &edit.span)?;
        if self.edits.iter().any(|e| e.overlaps(&edit.span)) {
            return Err(SyntaxError::OverlappingEdit {
                start: edit.span.start,
                end: edit.span.end,
            });
        }
        // Insertions sort before a replacement starting at the same byte.
        let pos = self.edits.partition_point(|e| {
            e.span.start < edit.span.start
                || (e.span.start == edit.span.start && (e.is_insertion() || !edit.is_insertion()))
        });
        self.edits.insert(pos, edit);
        Ok(())
    }

    /// Replace `span`, dropping recorded edits strictly contained in it.
    ///
    /// Edits that straddle the boundary of `span` are still rejected.
    pub(crate) fn push_enclosing(
        &mut self,
        source: &str,
        edit: TextEdit,
    ) -> Result<(), SyntaxError> {
        check_bounds(source, &edit.span)?;
        let span = edit.span.clone();
        self.edits
            .retain(|e| !(span.start <= e.span.start && e.span.end <= span.end));
        self.push(source, edit)
    }

    /// Recorded edits in position order.
    #[must_use]
    pub fn as_slice(&self) -> &[TextEdit] {
        &self.edits
    }

    /// True when no edit has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    /// Discard every recorded edit.
    pub fn clear(&mut self) {
        self.edits.clear();
    }

    /// Splice the edits inside `range` into `source[range]`.
    #[must_use]
    pub fn apply_within(&self, source: &str, range: Span) -> String {
        let mut out = String::with_capacity(range.end.saturating_sub(range.start));
        let mut cursor = range.start;
        for edit in self
            .edits
            .iter()
            .filter(|e| range.start <= e.span.start && e.span.end <= range.end)
        {
            out.push_str(&source[cursor..edit.span.start]);
            out.push_str(&edit.text);
            cursor = edit.span.end;
        }
        out.push_str(&source[cursor..range.end]);
        out
    }
}

fn check_bounds(source: &str, span: &Span) -> Result<(), SyntaxError> {
    if span.start > span.end
        || span.end > source.len()
        || !source.is_char_boundary(span.start)
        || !source.is_char_boundary(span.end)
    {
        return Err(SyntaxError::OutOfBounds {
            start: span.start,
            end: span.end,
        });
    }
    Ok(())
}
