//! CSS Style Attributes: `style="..."` attribute processing.
//! Spec: <https://www.w3.org/TR/css-style-attr/>

use crate::syntax::parse_declaration_list;
use std::collections::HashMap;

/// A single CSS declaration from a style attribute or a rule block.
///
/// Spec: <https://www.w3.org/TR/css-style-attr/#interpreting>
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Declaration {
    /// Property name normalized to ASCII lowercase as per CSS case-insensitivity.
    pub property: String,
    /// Value trimmed of surrounding whitespace with any `!important` removed.
    pub value: String,
    /// Whether the declaration carried `!important`.
    pub important: bool,
}

/// Parse a declaration block (the body of a rule or a `style` attribute).
///
/// Items without a colon, with an empty property, or with an empty value are
/// skipped. A trailing `!important` is stripped and recorded on the
/// declaration. Strings, blocks, and functions such as
/// `url(data:...;base64,...)` are tokenized, so their contents never split
/// items.
pub fn parse_style_attribute(input: &str) -> Vec<Declaration> {
    parse_declaration_list(input)
}

/// Convenience: parse into a map keyed by property name.
///
/// If a property appears multiple times, the last one wins, matching standard
/// source-order behavior for duplicate declarations within the same block.
pub fn parse_style_attribute_into_map(input: &str) -> HashMap<String, String> {
    let mut map: HashMap<String, String> = HashMap::new();
    for decl in parse_style_attribute(input) {
        map.insert(decl.property, decl.value);
    }
    map
}

/// Serialise declarations back into `style` attribute text.
pub fn serialize_declarations(declarations: &[Declaration]) -> String {
    let mut out = String::new();
    for decl in declarations {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(&decl.property);
        out.push_str(": ");
        out.push_str(&decl.value);
        if decl.important {
            out.push_str(" !important");
        }
        out.push(';');
    }
    out
}

/// Split `input` on `separator` outside of parentheses and quotes.
pub(crate) fn split_top_level(input: &str, separator: char) -> Vec<&str> {
    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0usize;
    for (index, character) in input.char_indices() {
        if let Some(open) = quote {
            if character == open {
                quote = None;
            }
            continue;
        }
        match character {
            '"' | '\'' => quote = Some(character),
            '(' | '[' => depth = depth.saturating_add(1),
            ')' | ']' => depth = depth.saturating_sub(1),
            _ if character == separator && depth == 0 => {
                items.push(&input[start..index]);
                start = index + character.len_utf8();
            }
            _ => {}
        }
    }
    items.push(&input[start..]);
    items
}

/// Remove a trailing `!important` (case-insensitive, optional inner space).
pub(crate) fn strip_important(value: &str) -> (&str, bool) {
    let Some(bang) = value.rfind('!') else {
        return (value, false);
    };
    let keyword = value[bang + 1..].trim_matches(is_ascii_whitespace);
    if keyword.eq_ignore_ascii_case("important") {
        (value[..bang].trim_matches(is_ascii_whitespace), true)
    } else {
        (value, false)
    }
}

/// ASCII whitespace per CSS Syntax (TAB, LF, FF, CR, SPACE).
///
/// Spec: <https://www.w3.org/TR/css-syntax-3/#whitespace>
const fn is_ascii_whitespace(character: char) -> bool {
    matches!(
        character,
        '\u{0009}' | '\u{000A}' | '\u{000C}' | '\u{000D}' | '\u{0020}'
    )
}
