//! Conversion between LSP positions (UTF-16 based) and byte offsets.

use tower_lsp_server::ls_types::{Position, Range};

/// Maps LSP positions to byte offsets of one text snapshot and back.
///
/// Line starts are computed once; every lookup is a binary search plus a
/// scan of a single line.
pub struct PositionMapper<'a> {
    text: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> PositionMapper<'a> {
    /// Create a new PositionMapper with pre-computed line starts
    pub fn new(text: &'a str) -> Self {
        let line_starts = compute_line_starts(text);
        Self { text, line_starts }
    }

    fn line_bounds(&self, line: usize) -> Option<(usize, usize)> {
        let start = *self.line_starts.get(line)?;
        let end = match self.line_starts.get(line + 1) {
            Some(next) => next - 1, // Exclude the newline
            None => self.text.len(),
        };
        Some((start, end))
    }

    /// Convert LSP Position to byte offset in the text.
    ///
    /// Characters past the end of a line clamp to the line end; lines past
    /// the end of the text return None.
    pub fn position_to_byte(&self, position: Position) -> Option<usize> {
        let (line_start, line_end) = self.line_bounds(position.line as usize)?;
        let line_text = &self.text[line_start..line_end];

        match convert_utf16_to_byte_in_line(line_text, position.character as usize) {
            Some(byte_offset) => Some(line_start + byte_offset),
            None => Some(line_end),
        }
    }

    /// Convert byte offset to LSP Position.
    pub fn byte_to_position(&self, offset: usize) -> Option<Position> {
        if offset > self.text.len() {
            return None;
        }

        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(line) => line.saturating_sub(1),
        };
        let (line_start, line_end) = self.line_bounds(line)?;
        let line_text = &self.text[line_start..line_end.max(line_start)];

        // Offsets inside a multi-byte character snap back to its start
        let mut line_offset = offset.saturating_sub(line_start).min(line_text.len());
        loop {
            if let Some(character) = convert_byte_to_utf16_in_line(line_text, line_offset) {
                return Some(Position {
                    line: line as u32,
                    character: character as u32,
                });
            }
            if line_offset == 0 {
                return Some(Position { line: line as u32, character: 0 });
            }
            line_offset -= 1;
        }
    }

    /// Convert an LSP Range to a byte range, ordered start..end.
    pub fn range_to_bytes(&self, range: Range) -> Option<(usize, usize)> {
        let start = self.position_to_byte(range.start)?;
        let end = self.position_to_byte(range.end)?;
        Some((start.min(end), start.max(end)))
    }
}

/// Compute line start offsets for efficient position mapping
pub fn compute_line_starts(text: &str) -> Vec<usize> {
    let mut line_starts = vec![0];
    line_starts.extend(
        text.char_indices()
            .filter(|(_, ch)| *ch == '\n')
            .map(|(idx, _)| idx + 1),
    );
    line_starts
}

/// Convert UTF-16 position to byte position within a line
/// Returns None if the UTF-16 position is beyond the end of the line
#[inline(always)]
pub fn convert_utf16_to_byte_in_line(line_text: &str, utf16_pos: usize) -> Option<usize> {
    let mut byte_offset = 0;
    let mut utf16_offset = 0;

    for ch in line_text.chars() {
        if utf16_offset >= utf16_pos {
            return Some(byte_offset);
        }
        utf16_offset += ch.len_utf16();
        byte_offset += ch.len_utf8();
    }

    (utf16_offset == utf16_pos).then_some(byte_offset)
}

/// Convert byte position to UTF-16 position within a line
/// Returns None if the byte position is in the middle of a multi-byte character
#[inline(always)]
pub fn convert_byte_to_utf16_in_line(line_text: &str, byte_pos: usize) -> Option<usize> {
    let mut utf16_offset = 0;
    let mut byte_count = 0;

    for ch in line_text.chars() {
        if byte_count == byte_pos {
            return Some(utf16_offset);
        }
        let ch_bytes = ch.len_utf8();
        if byte_count + ch_bytes > byte_pos {
            return None;
        }
        byte_count += ch_bytes;
        utf16_offset += ch.len_utf16();
    }

    (byte_count == byte_pos).then_some(utf16_offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(line: u32, character: u32) -> Position {
        Position { line, character }
    }

    #[test]
    fn position_to_byte_handles_multiple_lines() {
        let text = "<div>\n    @code\n</div>";
        let mapper = PositionMapper::new(text);

        assert_eq!(mapper.position_to_byte(pos(0, 0)), Some(0));
        assert_eq!(mapper.position_to_byte(pos(1, 4)), Some(10));
        assert_eq!(mapper.position_to_byte(pos(2, 6)), Some(22));
        assert_eq!(mapper.position_to_byte(pos(3, 0)), None);
    }

    #[test]
    fn position_past_line_end_clamps_to_line_end() {
        let mapper = PositionMapper::new("ab\ncd");
        assert_eq!(mapper.position_to_byte(pos(0, 10)), Some(2));
    }

    #[test]
    fn utf16_surrogates_are_counted_as_two_units() {
        // "😀" is 4 bytes in UTF-8 and 2 code units in UTF-16
        let text = "a😀b";
        let mapper = PositionMapper::new(text);

        assert_eq!(mapper.position_to_byte(pos(0, 3)), Some(5));
        assert_eq!(mapper.byte_to_position(5), Some(pos(0, 3)));
    }

    #[test]
    fn byte_inside_multibyte_char_snaps_to_char_start() {
        let mapper = PositionMapper::new("a😀b");
        assert_eq!(mapper.byte_to_position(2), Some(pos(0, 1)));
    }

    #[test]
    fn byte_to_position_rejects_offsets_past_end() {
        let mapper = PositionMapper::new("abc");
        assert_eq!(mapper.byte_to_position(3), Some(pos(0, 3)));
        assert_eq!(mapper.byte_to_position(4), None);
    }

    #[test]
    fn range_to_bytes_orders_endpoints() {
        let mapper = PositionMapper::new("hello\nworld");
        let range = Range {
            start: pos(1, 2),
            end: pos(0, 1),
        };
        assert_eq!(mapper.range_to_bytes(range), Some((1, 8)));
    }
}
