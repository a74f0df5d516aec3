//! IBM code page 437, the legacy encoding of ZIP entry names.

/// Characters for bytes 0x80..=0xFF; the lower half is ASCII.
const HIGH: [char; 128] = [
    'Ç', 'ü', 'é', 'â', 'ä', 'à', 'å', 'ç', 'ê', 'ë', 'è', 'ï', 'î', 'ì', 'Ä', 'Å', //
    'É', 'æ', 'Æ', 'ô', 'ö', 'ò', 'û', 'ù', 'ÿ', 'Ö', 'Ü', '¢', '£', '¥', '₧', 'ƒ', //
    'á', 'í', 'ó', 'ú', 'ñ', 'Ñ', 'ª', 'º', '¿', '⌐', '¬', '½', '¼', '¡', '«', '»', //
    '░', '▒', '▓', '│', '┤', '╡', '╢', '╖', '╕', '╣', '║', '╗', '╝', '╜', '╛', '┐', //
    '└', '┴', '┬', '├', '─', '┼', '╞', '╟', '╚', '╔', '╩', '╦', '╠', '═', '╬', '╧', //
    '╨', '╤', '╥', '╙', '╘', '╒', '╓', '╫', '╪', '┘', '┌', '█', '▄', '▌', '▐', '▀', //
    'α', 'ß', 'Γ', 'π', 'Σ', 'σ', 'µ', 'τ', 'Φ', 'Θ', 'Ω', 'δ', '∞', 'φ', 'ε', '∩', //
    '≡', '±', '≥', '≤', '⌠', '⌡', '÷', '≈', '°', '∙', '·', '√', 'ⁿ', '²', '■', '\u{a0}',
];

/// Decode CP437 bytes.
pub fn decode(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| {
            if b < 0x80 {
                b as char
            } else {
                HIGH[(b - 0x80) as usize]
            }
        })
        .collect()
}

/// Decode an entry name: UTF-8 when flagged or when the bytes are valid
/// UTF-8, CP437 otherwise.
pub fn decode_name(bytes: &[u8], utf8_flag: bool) -> String {
    if utf8_flag {
        return String::from_utf8_lossy(bytes).into_owned();
    }
    match std::str::from_utf8(bytes) {
        Ok(name) => name.to_string(),
        Err(_) => decode(bytes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_passes_through() {
        assert_eq!(decode(b"META-INF/MANIFEST.MF"), "META-INF/MANIFEST.MF");
    }

    #[test]
    fn test_high_half() {
        assert_eq!(decode(&[b'c', b'a', b'f', 0x82]), "café");
        assert_eq!(decode(&[0x80, 0x9E, 0xE1, 0xFF]), "Ç₧ß\u{a0}");
    }

    #[test]
    fn test_name_prefers_utf8() {
        assert_eq!(decode_name("café".as_bytes(), false), "café");
        assert_eq!(decode_name(&[b'a', 0x82], false), "aé");
        assert_eq!(decode_name(&[b'a', 0x82], true), "a\u{fffd}");
    }
}
