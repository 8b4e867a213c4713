//! Luminance to glyph mapping.

/// Glyphs ordered from densest to lightest. Dark samples map to the front.
pub const PALETTE: [char; 14] = [
    '#', '@', '0', '$', '%', '/', '(', '!', ';', ',', '-', '.', '`', ' ',
];

/// Index into [`PALETTE`] for an 8-bit luminance sample.
///
/// `floor(sample * len / 256)`, which always lands in `0..len` for a `u8`.
pub fn glyph_index(sample: u8) -> usize {
    let idx = (sample as usize * PALETTE.len()) / 256;
    idx.min(PALETTE.len() - 1)
}

/// Glyph for an 8-bit luminance sample.
pub fn char_for(sample: u8) -> char {
    PALETTE[glyph_index(sample)]
}
