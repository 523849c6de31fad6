//! String sanitization applied to every value sent to the engine. Solr's
//! XML parser rejects documents containing code points outside the XML 1.0
//! character ranges, so they are stripped at load time.

/// XML 1.0 legal characters:
/// `#x9 | #xA | #xD | [#x20-#xD7FF] | [#xE000-#xFFFD] | [#x10000-#x10FFFF]`
fn is_valid_xml_char(c: char) -> bool {
    matches!(c,
        '\u{20}'..='\u{D7FF}'
        | '\u{9}'
        | '\u{A}'
        | '\u{D}'
        | '\u{E000}'..='\u{FFFD}'
        | '\u{10000}'..='\u{10FFFF}')
}

/// Strips XML-invalid code points, returning the input unchanged (and
/// unallocated) when it is already clean.
pub fn clean_xml_string(s: &str) -> std::borrow::Cow<'_, str> {
    if s.chars().all(is_valid_xml_char) {
        std::borrow::Cow::Borrowed(s)
    } else {
        std::borrow::Cow::Owned(s.chars().filter(|c| is_valid_xml_char(*c)).collect())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn clean_strings_borrow() {
        let s = "Horizon 2020 proposal — κλπ";
        assert!(matches!(
            clean_xml_string(s),
            std::borrow::Cow::Borrowed(_)
        ));
    }

    #[test]
    fn control_characters_are_stripped() {
        assert_eq!(clean_xml_string("a\u{0}b\u{B}c"), "abc");
        // Tab, newline and carriage return survive.
        assert_eq!(clean_xml_string("a\tb\nc\rd"), "a\tb\nc\rd");
    }

    #[test]
    fn surrogate_gap_is_stripped() {
        assert_eq!(clean_xml_string("x\u{FFFE}y"), "xy");
    }
}
