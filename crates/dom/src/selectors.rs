//! Selector parsing, matching, and specificity.
//!
//! Supports the subset the engine and its hosts rely on: type, universal,
//! `#id`, `.class`, attribute presence and `=`, `*=`, `^=`, `$=`, `~=`
//! operators, `:root`, `:is()`/`:where()`, descendant and child combinators,
//! and comma-separated lists. Selectors using anything else are discarded.

use crate::NodeKey;
use crate::style_attr::split_top_level;
use core::iter::Peekable;
use core::mem::take;

/// Read-only element access needed to match selectors.
pub(crate) trait ElementView {
    /// Lowercase tag name of an element.
    fn local_name(&self, node: NodeKey) -> Option<&str>;
    /// Attribute value by lowercase name.
    fn attr(&self, node: NodeKey, name: &str) -> Option<&str>;
    /// Parent element within the same tree scope.
    fn scoped_parent(&self, node: NodeKey) -> Option<NodeKey>;
    /// Whether `node` is the document's root element.
    fn is_root(&self, node: NodeKey) -> bool;
}

/// Combinator between two selector parts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Combinator {
    /// Descendant combinator (whitespace).
    Descendant,
    /// Child combinator (`>`).
    Child,
}

/// Attribute selector operator.
///
/// Reference: Selectors Level 4: 6. Attribute selectors
/// <https://www.w3.org/TR/selectors-4/#attribute-selectors>
#[derive(Clone, Debug, PartialEq, Eq)]
enum AttrOperator {
    /// `[attr]`
    Exists,
    /// `[attr="v"]`
    Equals(String),
    /// `[attr*="v"]`
    Contains(String),
    /// `[attr^="v"]`
    Prefix(String),
    /// `[attr$="v"]`
    Suffix(String),
    /// `[attr~="v"]`
    Includes(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct AttrSelector {
    name: String,
    operator: AttrOperator,
}

impl AttrSelector {
    fn matches(&self, value: Option<&str>) -> bool {
        let Some(value) = value else {
            return false;
        };
        match &self.operator {
            AttrOperator::Exists => true,
            AttrOperator::Equals(expected) => value == expected,
            AttrOperator::Contains(needle) => !needle.is_empty() && value.contains(needle.as_str()),
            AttrOperator::Prefix(needle) => {
                !needle.is_empty() && value.starts_with(needle.as_str())
            }
            AttrOperator::Suffix(needle) => !needle.is_empty() && value.ends_with(needle.as_str()),
            AttrOperator::Includes(word) => value
                .split_ascii_whitespace()
                .any(|token| token == word),
        }
    }
}

/// A compound selector: everything between two combinators.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct Compound {
    /// Optional tag name, lower-cased, for type selectors.
    tag: Option<String>,
    /// Optional element id, for `#id` selectors.
    element_id: Option<String>,
    /// Class list for `.class` selectors.
    classes: Vec<String>,
    /// Attribute selectors.
    attrs: Vec<AttrSelector>,
    /// Nested `:is()` / `:where()` lists; the flag is true for `:where()`.
    nested: Vec<(SelectorList, bool)>,
    /// `:root` pseudo-class.
    root: bool,
    /// Whether this selector is the universal selector ('*').
    universal: bool,
}

impl Compound {
    fn has_content(&self) -> bool {
        self.universal
            || self.root
            || self.tag.is_some()
            || self.element_id.is_some()
            || !self.classes.is_empty()
            || !self.attrs.is_empty()
            || !self.nested.is_empty()
    }

    fn matches<V: ElementView>(&self, node: NodeKey, view: &V) -> bool {
        let Some(local_name) = view.local_name(node) else {
            return false;
        };
        if self.tag.as_deref().is_some_and(|tag| tag != local_name) {
            return false;
        }
        if self.root && !view.is_root(node) {
            return false;
        }
        if let Some(expected) = &self.element_id
            && view.attr(node, "id") != Some(expected.as_str())
        {
            return false;
        }
        if !self.classes.is_empty() {
            let class_attr = view.attr(node, "class").unwrap_or_default();
            let has_all = self
                .classes
                .iter()
                .all(|class| class_attr.split_ascii_whitespace().any(|token| token == class));
            if !has_all {
                return false;
            }
        }
        if !self
            .attrs
            .iter()
            .all(|attr| attr.matches(view.attr(node, &attr.name)))
        {
            return false;
        }
        self.nested
            .iter()
            .all(|(list, _)| list.matches_with(node, view))
    }

    fn specificity(&self) -> Specificity {
        let mut ids = u32::from(self.element_id.is_some());
        let mut classes = count(self.classes.len())
            .saturating_add(count(self.attrs.len()))
            .saturating_add(u32::from(self.root));
        let mut tags = u32::from(self.tag.is_some());
        for (list, is_where) in &self.nested {
            if *is_where {
                continue;
            }
            let Specificity(nested_ids, nested_classes, nested_tags) = list.max_specificity();
            ids = ids.saturating_add(nested_ids);
            classes = classes.saturating_add(nested_classes);
            tags = tags.saturating_add(nested_tags);
        }
        Specificity(ids, classes, tags)
    }
}

fn count(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

/// One compound selector part and the combinator to the next (if any).
#[derive(Clone, Debug, PartialEq, Eq)]
struct SelectorPart {
    compound: Compound,
    combinator_to_next: Option<Combinator>,
}

/// A complex selector: compounds joined by combinators, subject last.
#[derive(Clone, Debug, PartialEq, Eq)]
struct Selector(Vec<SelectorPart>);

impl Selector {
    fn matches<V: ElementView>(&self, node: NodeKey, view: &V) -> bool {
        self.0
            .len()
            .checked_sub(1)
            .is_some_and(|last| self.matches_from(last, node, view))
    }

    fn matches_from<V: ElementView>(&self, index: usize, node: NodeKey, view: &V) -> bool {
        let Some(part) = self.0.get(index) else {
            return false;
        };
        if !part.compound.matches(node, view) {
            return false;
        }
        let Some(previous_index) = index.checked_sub(1) else {
            return true;
        };
        let combinator = self
            .0
            .get(previous_index)
            .and_then(|previous| previous.combinator_to_next)
            .unwrap_or(Combinator::Descendant);
        let mut ancestor = view.scoped_parent(node);
        while let Some(candidate) = ancestor {
            if self.matches_from(previous_index, candidate, view) {
                return true;
            }
            if combinator == Combinator::Child {
                return false;
            }
            ancestor = view.scoped_parent(candidate);
        }
        false
    }

    fn specificity(&self) -> Specificity {
        self.0.iter().fold(Specificity::default(), |acc, part| {
            let Specificity(ids, classes, tags) = part.compound.specificity();
            Specificity(
                acc.0.saturating_add(ids),
                acc.1.saturating_add(classes),
                acc.2.saturating_add(tags),
            )
        })
    }
}

/// Specificity represented as (ids, classes, tags).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Specificity(pub u32, pub u32, pub u32);

/// A parsed, comma-separated selector list.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SelectorList(Vec<Selector>);

impl SelectorList {
    /// Parse a selector list. Unsupported members are dropped; `None` when
    /// nothing usable remains.
    pub fn parse(input: &str) -> Option<Self> {
        let selectors: Vec<Selector> = split_top_level(input, ',')
            .into_iter()
            .filter_map(parse_single_selector)
            .collect();
        if selectors.is_empty() {
            None
        } else {
            Some(Self(selectors))
        }
    }

    /// Highest specificity among members matching `node`, if any match.
    pub(crate) fn matching_specificity<V: ElementView>(
        &self,
        node: NodeKey,
        view: &V,
    ) -> Option<Specificity> {
        self.0
            .iter()
            .filter(|selector| selector.matches(node, view))
            .map(Selector::specificity)
            .max()
    }

    pub(crate) fn matches_with<V: ElementView>(&self, node: NodeKey, view: &V) -> bool {
        self.0.iter().any(|selector| selector.matches(node, view))
    }

    fn max_specificity(&self) -> Specificity {
        self.0
            .iter()
            .map(Selector::specificity)
            .max()
            .unwrap_or_default()
    }
}

/// Consume an identifier from a character iterator.
fn consume_ident<I>(chars: &mut Peekable<I>) -> String
where
    I: Iterator<Item = char>,
{
    let mut out = String::new();
    while let Some(&character) = chars.peek() {
        if !(character.is_alphanumeric() || character == '-' || character == '_') {
            break;
        }
        out.push(character);
        chars.next();
    }
    out
}

fn skip_whitespace<I>(chars: &mut Peekable<I>) -> bool
where
    I: Iterator<Item = char>,
{
    let mut skipped = false;
    while chars.peek().is_some_and(char::is_ascii_whitespace) {
        chars.next();
        skipped = true;
    }
    skipped
}

/// Collect the text inside balanced parentheses; the opening '(' is consumed here.
fn consume_parenthesized<I>(chars: &mut Peekable<I>) -> Option<String>
where
    I: Iterator<Item = char>,
{
    if chars.next() != Some('(') {
        return None;
    }
    let mut depth = 1usize;
    let mut out = String::new();
    for character in chars.by_ref() {
        match character {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(out);
                }
            }
            _ => {}
        }
        out.push(character);
    }
    None
}

/// Parse an attribute value (quoted or unquoted) from a character iterator.
fn parse_attr_value<I>(chars: &mut Peekable<I>) -> String
where
    I: Iterator<Item = char>,
{
    let Some(quote) = chars.peek().copied() else {
        return String::new();
    };
    if quote == '"' || quote == '\'' {
        chars.next();
        let mut value = String::new();
        for character in chars.by_ref() {
            if character == quote {
                break;
            }
            value.push(character);
        }
        value
    } else {
        consume_ident(chars)
    }
}

/// Parse an attribute selector body; the opening '[' has already been consumed.
fn parse_attribute_selector<I>(chars: &mut Peekable<I>) -> Option<AttrSelector>
where
    I: Iterator<Item = char>,
{
    skip_whitespace(chars);
    let name = consume_ident(chars).to_ascii_lowercase();
    if name.is_empty() {
        return None;
    }
    skip_whitespace(chars);
    let operator = match chars.next()? {
        ']' => return Some(AttrSelector { name, operator: AttrOperator::Exists }),
        '=' => None,
        modifier @ ('*' | '^' | '$' | '~') => {
            if chars.next()? != '=' {
                return None;
            }
            Some(modifier)
        }
        _ => return None,
    };
    skip_whitespace(chars);
    let value = parse_attr_value(chars);
    skip_whitespace(chars);
    // Tolerate case flags (`i`/`s`) before the closing bracket.
    while chars.peek().is_some_and(|&character| character != ']') {
        chars.next();
    }
    if chars.next() != Some(']') {
        return None;
    }
    let operator = match operator {
        None => AttrOperator::Equals(value),
        Some('*') => AttrOperator::Contains(value),
        Some('^') => AttrOperator::Prefix(value),
        Some('$') => AttrOperator::Suffix(value),
        Some(_) => AttrOperator::Includes(value),
    };
    Some(AttrSelector { name, operator })
}

/// Parse one simple-selector component into `current`.
/// Returns `None` if the selector should be discarded.
fn parse_component<I>(chars: &mut Peekable<I>, current: &mut Compound) -> Option<()>
where
    I: Iterator<Item = char>,
{
    match chars.peek().copied()? {
        '*' => {
            chars.next();
            current.universal = true;
        }
        '#' => {
            chars.next();
            let ident = consume_ident(chars);
            if ident.is_empty() {
                return None;
            }
            current.element_id = Some(ident);
        }
        '.' => {
            chars.next();
            let ident = consume_ident(chars);
            if ident.is_empty() {
                return None;
            }
            current.classes.push(ident);
        }
        '[' => {
            chars.next();
            current.attrs.push(parse_attribute_selector(chars)?);
        }
        ':' => {
            chars.next();
            let pseudo = consume_ident(chars).to_ascii_lowercase();
            match pseudo.as_str() {
                "root" => current.root = true,
                "is" | "where" | "matches" => {
                    let inner = consume_parenthesized(chars)?;
                    let list = SelectorList::parse(&inner)?;
                    current.nested.push((list, pseudo == "where"));
                }
                _ => return None,
            }
        }
        character if character.is_alphanumeric() => {
            current.tag = Some(consume_ident(chars).to_ascii_lowercase());
        }
        _ => return None,
    }
    Some(())
}

/// Parse a single complex selector.
fn parse_single_selector(selector_str: &str) -> Option<Selector> {
    let mut chars = selector_str.trim().chars().peekable();
    let mut parts: Vec<SelectorPart> = Vec::new();
    let mut current = Compound::default();
    let mut pending: Option<Combinator> = None;

    loop {
        let saw_whitespace = skip_whitespace(&mut chars);
        let Some(character) = chars.peek().copied() else {
            break;
        };
        if character == '>' {
            chars.next();
            if !current.has_content() {
                return None;
            }
            pending = Some(Combinator::Child);
            continue;
        }
        if (saw_whitespace || pending.is_some()) && current.has_content() {
            parts.push(SelectorPart {
                compound: take(&mut current),
                combinator_to_next: Some(pending.take().unwrap_or(Combinator::Descendant)),
            });
        }
        parse_component(&mut chars, &mut current)?;
    }
    if pending.is_some() || !current.has_content() {
        return None;
    }
    parts.push(SelectorPart {
        compound: current,
        combinator_to_next: None,
    });
    Some(Selector(parts))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn specificity_counts_ids_classes_and_tags() {
        let list = SelectorList::parse("html[data-mode=\"on\"] #main .a.b").expect("parses");
        assert_eq!(list.max_specificity(), Specificity(1, 3, 1));
    }

    #[test]
    fn is_contributes_its_most_specific_argument() {
        let list = SelectorList::parse("html.pending :is(img, #hero)").expect("parses");
        assert_eq!(list.max_specificity(), Specificity(1, 1, 1));
        let where_list = SelectorList::parse(":where(#hero) img").expect("parses");
        assert_eq!(where_list.max_specificity(), Specificity(0, 0, 1));
    }

    #[test]
    fn commas_inside_is_do_not_split_the_list() {
        let list = SelectorList::parse("a :is(img, video), canvas").expect("parses");
        assert_eq!(list.0.len(), 2);
    }

    #[test]
    fn unsupported_pseudo_classes_are_discarded() {
        assert!(SelectorList::parse("a:hover").is_none());
        let list = SelectorList::parse("a:hover, video").expect("video survives");
        assert_eq!(list.0.len(), 1);
    }

    #[test]
    fn dangling_combinators_are_rejected() {
        assert!(SelectorList::parse("div >").is_none());
        assert!(SelectorList::parse("> div").is_none());
    }
}
