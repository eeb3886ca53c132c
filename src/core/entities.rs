//! Character references in, escapes out
//!
//! Only the five predefined entities and `&#..;` references are known;
//! anything else passes through as written.

use memchr::memchr;
use std::borrow::Cow;

/// Replace references in text or attribute content. Borrowed when the
/// input has no `&` at all.
pub fn decode_text(input: &str) -> Cow<'_, str> {
    if memchr(b'&', input.as_bytes()).is_none() {
        return Cow::Borrowed(input);
    }
    Cow::Owned(decode_entities(input))
}

fn decode_entities(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(amp) = memchr(b'&', rest.as_bytes()) {
        result.push_str(&rest[..amp]);
        rest = &rest[amp..];

        let decoded = memchr(b';', rest.as_bytes())
            .and_then(|semi| decode_entity(&rest[1..semi]).map(|c| (c, semi)));
        match decoded {
            Some((c, semi)) => {
                result.push(c);
                rest = &rest[semi + 1..];
            }
            None => {
                result.push('&');
                rest = &rest[1..];
            }
        }
    }
    result.push_str(rest);
    result
}

/// `name` is the text between `&` and `;`
fn decode_entity(name: &str) -> Option<char> {
    match name {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "amp" => Some('&'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => decode_char_ref(name.strip_prefix('#')?),
    }
}

fn decode_char_ref(digits: &str) -> Option<char> {
    let codepoint = match digits.strip_prefix(['x', 'X']) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => digits.parse(),
    }
    .ok()?;
    char::from_u32(codepoint).filter(|_| is_valid_xml_char(codepoint))
}

/// The XML 1.0 `Char` production
pub fn is_valid_xml_char(codepoint: u32) -> bool {
    matches!(codepoint, 0x9 | 0xA | 0xD | 0x20..=0xD7FF | 0xE000..=0xFFFD | 0x10000..=0x10FFFF)
}

/// Escape text for XML output.
///
/// The five markup characters become named entities and control characters
/// become `&#xHH;`. With `latin1` set, characters outside ISO-8859-1 are
/// written as numeric references so the output stays representable.
pub fn encode_text(input: &str, latin1: bool) -> Cow<'_, str> {
    let needs_escape = |c: char| {
        matches!(c, '<' | '>' | '&' | '"' | '\'') || (c as u32) < 0x20 || (latin1 && (c as u32) > 0xFF)
    };
    if !input.chars().any(needs_escape) {
        return Cow::Borrowed(input);
    }

    let mut result = String::with_capacity(input.len() + 16);
    for c in input.chars() {
        match c {
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '&' => result.push_str("&amp;"),
            '"' => result.push_str("&quot;"),
            '\'' => result.push_str("&apos;"),
            c if (c as u32) < 0x20 => result.push_str(&format!("&#x{:02X};", c as u32)),
            c if latin1 && (c as u32) > 0xFF => result.push_str(&format!("&#x{:X};", c as u32)),
            c => result.push(c),
        }
    }
    Cow::Owned(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_borrowed() {
        let result = decode_text("Hello, World!");
        assert!(matches!(result, Cow::Borrowed(_)));
        assert_eq!(result, "Hello, World!");
    }

    #[test]
    fn predefined_entities() {
        assert_eq!(
            decode_text("&lt;hello&gt; &amp; &quot;world&quot;"),
            "<hello> & \"world\""
        );
    }

    #[test]
    fn character_references() {
        assert_eq!(decode_text("&#65;&#x42;&#X43;"), "ABC");
        assert_eq!(decode_text("&#xE9;t&#233;"), "été");
    }

    #[test]
    fn unknown_references_pass_through() {
        assert_eq!(decode_text("&unknown;"), "&unknown;");
        assert_eq!(decode_text("a & b"), "a & b");
        assert_eq!(decode_text("&#0;"), "&#0;");
    }

    #[test]
    fn escaping_for_output() {
        assert_eq!(
            encode_text("<hello> & \"world\"", false),
            "&lt;hello&gt; &amp; &quot;world&quot;"
        );
        assert_eq!(encode_text("tab\there", false), "tab&#x09;here");
        assert!(matches!(encode_text("plain é", true), Cow::Borrowed(_)));
        assert_eq!(encode_text("€", true), "&#x20AC;");
        assert_eq!(encode_text("€", false), "€");
    }
}
