//! Modified UTF-8 as used by dex string data and class-file `Utf8` constants.

/// Decode modified UTF-8 bytes (no terminator) into a `String`.
///
/// Supplementary characters arrive as surrogate pairs and are joined through
/// UTF-16. Returns `None` on a malformed byte sequence.
pub fn decode(bytes: &[u8]) -> Option<String> {
    if bytes.is_ascii() {
        return std::str::from_utf8(bytes).ok().map(str::to_string);
    }

    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let a = u16::from(bytes[i]);
        if a & 0x80 == 0 {
            units.push(a);
            i += 1;
        } else if a & 0xE0 == 0xC0 {
            let b = continuation(bytes, i + 1)?;
            units.push(((a & 0x1F) << 6) | b);
            i += 2;
        } else if a & 0xF0 == 0xE0 {
            let b = continuation(bytes, i + 1)?;
            let c = continuation(bytes, i + 2)?;
            units.push(((a & 0x0F) << 12) | (b << 6) | c);
            i += 3;
        } else {
            return None;
        }
    }
    Some(String::from_utf16_lossy(&units))
}

fn continuation(bytes: &[u8], index: usize) -> Option<u16> {
    let byte = *bytes.get(index)?;
    (byte & 0xC0 == 0x80).then_some(u16::from(byte & 0x3F))
}
