//! Text measurement and word wrapping.
//!
//! Widths come from the Adobe Font Metrics of the standard Helvetica faces,
//! which are the faces the vector backend places. Every backend receives
//! the same line breaks; raster faces with other widths squeeze each line
//! into the width it was fitted to.

use crate::field::Weight;

/// Millimetres per PostScript point
pub const MM_PER_PT: f32 = 25.4 / 72.0;

/// Baseline-to-baseline distance as a multiple of the font size
pub const LINE_HEIGHT_FACTOR: f32 = 1.15;

/// Marker appended to a line that had to be cut short
pub const ELLIPSIS: char = '…';

/// Advance width used for glyphs outside the tables
const FALLBACK_WIDTH: u16 = 556;

/// Helvetica advance widths for ASCII 32..=126, in 1/1000 em
#[rustfmt::skip]
const HELVETICA: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556,
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556,
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556,
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

/// Helvetica-Bold advance widths for ASCII 32..=126, in 1/1000 em
#[rustfmt::skip]
const HELVETICA_BOLD: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611,
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556,
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611,
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584,
];

/// Map an accented Latin letter to its unaccented base.
///
/// Accents do not change advance widths in Helvetica, and the bitmap font
/// of the synthetic backend only carries base letters.
pub fn fold_accent(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ä' | 'ã' | 'å' => 'a',
        'Á' | 'À' | 'Â' | 'Ä' | 'Ã' | 'Å' => 'A',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'É' | 'È' | 'Ê' | 'Ë' => 'E',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
        'ó' | 'ò' | 'ô' | 'ö' | 'õ' => 'o',
        'Ó' | 'Ò' | 'Ô' | 'Ö' | 'Õ' => 'O',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'Ú' | 'Ù' | 'Û' | 'Ü' => 'U',
        'ñ' => 'n',
        'Ñ' => 'N',
        'ç' => 'c',
        'Ç' => 'C',
        _ => c,
    }
}

/// Advance width of one character in 1/1000 em
pub fn char_width(c: char, weight: Weight) -> u16 {
    let table = match weight {
        Weight::Normal => &HELVETICA,
        Weight::Bold => &HELVETICA_BOLD,
    };
    let c = fold_accent(c);
    match c {
        ' '..='~' => table[c as usize - 32],
        '—' | '…' => 1000,
        '–' => 556,
        '°' => 400,
        'º' => 365,
        'ª' => 370,
        '¡' => 333,
        '¿' => 611,
        '\u{a0}' => 278,
        _ => FALLBACK_WIDTH,
    }
}

/// Rendered width of a single line, in millimetres
pub fn text_width_mm(text: &str, weight: Weight, size_pt: f32) -> f32 {
    let units: u32 = text.chars().map(|c| u32::from(char_width(c, weight))).sum();
    units as f32 / 1000.0 * size_pt * MM_PER_PT
}

/// Baseline advance between wrapped lines, in millimetres
pub fn line_height_mm(size_pt: f32) -> f32 {
    size_pt * LINE_HEIGHT_FACTOR * MM_PER_PT
}

/// Smallest wrap box that can always hold one glyph plus margin
pub fn min_wrap_width_mm(size_pt: f32) -> f32 {
    1.2 * size_pt * MM_PER_PT
}

/// Greedy word wrap.
///
/// Explicit newlines start a new line, runs of whitespace collapse, and
/// words longer than the box are broken between characters. Every returned
/// line fits in `max_width_mm` as long as the box is at least
/// [`min_wrap_width_mm`] wide.
pub fn wrap_text(text: &str, max_width_mm: f32, weight: Weight, size_pt: f32) -> Vec<String> {
    let fits = |s: &str| text_width_mm(s, weight, size_pt) <= max_width_mm;
    let mut lines = Vec::new();

    for paragraph in text.lines() {
        let mut current = String::new();

        for word in paragraph.split_whitespace() {
            let candidate = if current.is_empty() {
                word.to_string()
            } else {
                format!("{} {}", current, word)
            };

            if fits(&candidate) {
                current = candidate;
                continue;
            }

            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }

            if fits(word) {
                current = word.to_string();
                continue;
            }

            // Hard-break a word wider than the whole box
            for c in word.chars() {
                current.push(c);
                if !fits(&current) && current.chars().count() > 1 {
                    current.pop();
                    lines.push(std::mem::take(&mut current));
                    current.push(c);
                }
            }
        }

        if !current.is_empty() {
            lines.push(current);
        }
    }

    lines
}

/// Cut a single line down to `max_width_mm`, marking the cut with an ellipsis
pub fn fit_line(text: &str, max_width_mm: f32, weight: Weight, size_pt: f32) -> String {
    if text_width_mm(text, weight, size_pt) <= max_width_mm {
        return text.to_string();
    }
    let mut kept: Vec<char> = text.chars().collect();
    loop {
        let candidate: String = kept.iter().collect::<String>().trim_end().to_string();
        let candidate = format!("{}{}", candidate, ELLIPSIS);
        if text_width_mm(&candidate, weight, size_pt) <= max_width_mm {
            return candidate;
        }
        if kept.pop().is_none() {
            return String::new();
        }
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn wrapped_lines_never_exceed_box(
            text in "[a-zA-Z0-9 áéíóúñ,.@—\\n-]{0,5000}",
            size in 6.0f32..14.0,
            extra in 0.0f32..150.0,
        ) {
            let width = min_wrap_width_mm(size) + extra;
            for line in wrap_text(&text, width, Weight::Normal, size) {
                prop_assert!(text_width_mm(&line, Weight::Normal, size) <= width);
            }
        }

        #[test]
        fn wrap_preserves_non_space_content(text in "[a-z ]{0,400}") {
            let lines = wrap_text(&text, 40.0, Weight::Bold, 10.0);
            let original: String = text.split_whitespace().collect();
            let wrapped: String = lines.iter().flat_map(|l| l.split_whitespace()).collect();
            prop_assert_eq!(original, wrapped);
        }
    }
}
