//! Line-ending normalization and BOM sniffing, applied to every file before
//! it is handed to the builder.

/// Detects a UTF-16/UTF-32 BOM and transcodes to UTF-8; otherwise strips a
/// UTF-8 BOM if present and returns the bytes unchanged.
pub fn decode_to_utf8(bytes: &[u8]) -> Vec<u8> {
    if bytes.starts_with(&[0xFF, 0xFE, 0x00, 0x00]) {
        return utf32_to_utf8(bytes[4..].chunks_exact(4), u32::from_le_bytes);
    }
    if bytes.starts_with(&[0x00, 0x00, 0xFE, 0xFF]) {
        return utf32_to_utf8(bytes[4..].chunks_exact(4), u32::from_be_bytes);
    }
    if bytes.starts_with(&[0xFF, 0xFE]) {
        return utf16_to_utf8(bytes[2..].chunks_exact(2), u16::from_le_bytes);
    }
    if bytes.starts_with(&[0xFE, 0xFF]) {
        return utf16_to_utf8(bytes[2..].chunks_exact(2), u16::from_be_bytes);
    }
    if let Some(rest) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        return rest.to_vec();
    }
    bytes.to_vec()
}

fn utf16_to_utf8<'a>(
    chunks: std::slice::ChunksExact<'a, u8>,
    conv: fn([u8; 2]) -> u16,
) -> Vec<u8> {
    let units: Vec<u16> = chunks.map(|c| conv([c[0], c[1]])).collect();
    String::from_utf16_lossy(&units).into_bytes()
}

fn utf32_to_utf8<'a>(
    chunks: std::slice::ChunksExact<'a, u8>,
    conv: fn([u8; 4]) -> u32,
) -> Vec<u8> {
    let mut out = String::new();
    for c in chunks {
        let code = conv([c[0], c[1], c[2], c[3]]);
        out.push(char::from_u32(code).unwrap_or('\u{FFFD}'));
    }
    out.into_bytes()
}

/// `\r\n -> \n`, lone `\r -> \n`. Idempotent on already-normalized input.
pub fn normalize_eol(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\r' => {
                out.push(b'\n');
                if i + 1 < bytes.len() && bytes[i + 1] == b'\n' {
                    i += 1;
                }
            }
            b => out.push(b),
        }
        i += 1;
    }
    out
}

/// Number of `\n` bytes in `bytes`.
pub fn newline_count(bytes: &[u8]) -> u32 {
    bytes.iter().filter(|&&b| b == b'\n').count() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_all_eol_styles() {
        let mixed = b"a\r\nb\rc\nd";
        assert_eq!(normalize_eol(mixed), b"a\nb\nc\nd");
    }

    #[test]
    fn strips_utf8_bom() {
        let bom = [0xEF, 0xBB, 0xBF, b'h', b'i'];
        assert_eq!(decode_to_utf8(&bom), b"hi");
    }

    #[test]
    fn decodes_utf16_le() {
        let mut bytes = vec![0xFF, 0xFE];
        bytes.extend_from_slice(&(b'h' as u16).to_le_bytes());
        bytes.extend_from_slice(&(b'i' as u16).to_le_bytes());
        assert_eq!(decode_to_utf8(&bytes), b"hi");
    }

    #[test]
    fn newline_count_excludes_trailing_partial_line() {
        assert_eq!(newline_count(b"a\nb\nc"), 2);
        assert_eq!(newline_count(b"no newline"), 0);
    }
}
