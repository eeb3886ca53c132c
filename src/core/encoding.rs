//! Byte encodings of document files
//!
//! Files are read as UTF-16 (BOM or a `<` next to a zero byte), UTF-8, or
//! ISO-8859-1 one byte per character. Undeclared files that are not valid
//! UTF-8 are read as ISO-8859-1. Saved files use the declared encoding.

/// Code unit width and order, from the first two bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XmlEncoding {
    Utf8,
    Utf16Le,
    Utf16Be,
}

impl XmlEncoding {
    pub fn detect(input: &[u8]) -> Self {
        match input {
            [0xFF, 0xFE, ..] | [b'<', 0x00, ..] => XmlEncoding::Utf16Le,
            [0xFE, 0xFF, ..] | [0x00, b'<', ..] => XmlEncoding::Utf16Be,
            _ => XmlEncoding::Utf8,
        }
    }
}

/// What an `encoding="..."` label asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    Latin1,
}

impl TextEncoding {
    /// Labels other than the Latin-1 aliases mean UTF-8.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "iso-8859-1" | "iso8859-1" | "iso_8859-1" | "latin1" | "latin-1" | "l1"
            | "cp819" | "ibm819" | "iso-ir-100" | "windows-1252" | "cp1252" => {
                TextEncoding::Latin1
            }
            _ => TextEncoding::Utf8,
        }
    }
}

pub fn decode_document(input: &[u8]) -> Result<String, String> {
    match XmlEncoding::detect(input) {
        XmlEncoding::Utf16Le => decode_utf16(input, [0xFF, 0xFE], u16::from_le_bytes),
        XmlEncoding::Utf16Be => decode_utf16(input, [0xFE, 0xFF], u16::from_be_bytes),
        XmlEncoding::Utf8 => {
            if let Some(rest) = input.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
                return Ok(String::from_utf8_lossy(rest).into_owned());
            }
            if declared_encoding(input).map(TextEncoding::from_label) == Some(TextEncoding::Latin1) {
                return Ok(decode_latin1(input));
            }
            match std::str::from_utf8(input) {
                Ok(text) => Ok(text.to_string()),
                Err(_) => Ok(decode_latin1(input)),
            }
        }
    }
}

fn decode_utf16(input: &[u8], bom: [u8; 2], unit: fn([u8; 2]) -> u16) -> Result<String, String> {
    let bytes = input.strip_prefix(&bom).unwrap_or(input);
    let pairs = bytes.chunks_exact(2);
    if !pairs.remainder().is_empty() {
        return Err("truncated UTF-16 input".to_string());
    }
    let units: Vec<u16> = pairs.map(|pair| unit([pair[0], pair[1]])).collect();
    String::from_utf16(&units).map_err(|e| format!("bad UTF-16 input: {e}"))
}

pub fn decode_latin1(input: &[u8]) -> String {
    input.iter().map(|&b| b as char).collect()
}

/// Encode serialized text for writing. Latin-1 output replaces anything
/// unrepresentable with `?`; callers escape where markup allows it.
pub fn encode_document(text: &str, encoding: TextEncoding) -> Vec<u8> {
    match encoding {
        TextEncoding::Utf8 => text.as_bytes().to_vec(),
        TextEncoding::Latin1 => text
            .chars()
            .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
            .collect(),
    }
}

/// Pull the `encoding` pseudo-attribute out of a leading `<?xml ... ?>`.
fn declared_encoding(input: &[u8]) -> Option<&str> {
    let start = input.iter().position(|b| !b.is_ascii_whitespace())?;
    let decl = input[start..].strip_prefix(b"<?xml")?;
    let end = memchr::memmem::find(decl, b"?>")?;
    let decl = std::str::from_utf8(&decl[..end]).ok()?;

    let after = &decl[decl.find("encoding")? + "encoding".len()..];
    let after = after.trim_start().strip_prefix('=')?.trim_start();
    let quote = after.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let value = &after[1..];
    value.find(quote).map(|close| &value[..close])
}
