//! WinAnsiEncoding for the standard Helvetica fonts.
//!
//! Latin-1 maps straight through; the 0x80..0x9F block carries typographic
//! punctuation. Anything else becomes `?`.

const HIGH_BLOCK: [(u8, char); 27] = [
    (0x80, '€'),
    (0x82, '‚'),
    (0x83, 'ƒ'),
    (0x84, '„'),
    (0x85, '…'),
    (0x86, '†'),
    (0x87, '‡'),
    (0x88, 'ˆ'),
    (0x89, '‰'),
    (0x8A, 'Š'),
    (0x8B, '‹'),
    (0x8C, 'Œ'),
    (0x8E, 'Ž'),
    (0x91, '\u{2018}'),
    (0x92, '\u{2019}'),
    (0x93, '\u{201C}'),
    (0x94, '\u{201D}'),
    (0x95, '•'),
    (0x96, '–'),
    (0x97, '—'),
    (0x98, '˜'),
    (0x99, '™'),
    (0x9A, 'š'),
    (0x9B, '›'),
    (0x9C, 'œ'),
    (0x9E, 'ž'),
    (0x9F, 'Ÿ'),
];

pub fn encode_char(c: char) -> u8 {
    let code = c as u32;
    if (0x20..=0x7E).contains(&code) || (0xA0..=0xFF).contains(&code) {
        return code as u8;
    }
    HIGH_BLOCK
        .iter()
        .find(|(_, ch)| *ch == c)
        .map(|(byte, _)| *byte)
        .unwrap_or(b'?')
}

pub fn encode(text: &str) -> Vec<u8> {
    text.chars().map(encode_char).collect()
}

pub fn decode(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| match b {
            0x80..=0x9F => HIGH_BLOCK
                .iter()
                .find(|(byte, _)| *byte == b)
                .map(|(_, c)| *c)
                .unwrap_or('?'),
            _ => b as char,
        })
        .collect()
}
