//! CSS selectors evaluated against snapshots
//!
//! Parsing is done by the `selectors` crate with scraper's selector dialect,
//! so anything `scraper::Selector` accepts is accepted here. Matching runs
//! over [`DomSnapshot`] nodes through the [`Element`] impl on [`DomElement`].

use std::fmt;

use html5ever::Namespace;
use scraper::error::SelectorErrorKind;
use scraper::selector::{CssLocalName, CssString, NonTSPseudoClass, Parser, PseudoElement, Simple};
use selectors::attr::{AttrSelectorOperation, CaseSensitivity, NamespaceConstraint};
use selectors::bloom::BloomFilter;
use selectors::matching::{self, ElementSelectorFlags, MatchingContext};
use selectors::parser::{ParseRelative, SelectorList};
use selectors::{Element, OpaqueElement};

use crate::dom::{DomNode, DomSnapshot, NodeId, Segment};
use crate::errors::{HarnessError, Result};

const XHTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

/// Parsed selector list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    source: String,
    selectors: SelectorList<Simple>,
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

impl Selector {
    pub fn parse(source: &str) -> Result<Self> {
        let source = source.trim();
        let mut input = cssparser::ParserInput::new(source);
        let mut parser = cssparser::Parser::new(&mut input);
        let selectors = SelectorList::parse(&Parser, &mut parser, ParseRelative::No).map_err(|e| {
            HarnessError::InvalidLocator(format!(
                "{} in selector '{}'",
                SelectorErrorKind::from(e),
                source
            ))
        })?;
        Ok(Selector {
            source: source.to_string(),
            selectors,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether `node` matches any selector in the list, evaluated against the whole document
    pub fn matches(&self, dom: &DomSnapshot, node: NodeId) -> bool {
        let Some(element) = DomElement::new(dom, node) else {
            return false;
        };
        let mut caches = matching::SelectorCaches::default();
        let mut context = MatchingContext::new(
            matching::MatchingMode::Normal,
            None,
            &mut caches,
            matching::QuirksMode::NoQuirks,
            matching::NeedsSelectorFlags::No,
            matching::MatchingForInvalidation::No,
        );
        self.selectors
            .slice()
            .iter()
            .any(|s| matching::matches_selector(s, 0, None, &element, &mut context))
    }
}

/// A snapshot node seen through the `selectors` element tree interface
#[derive(Debug, Clone, Copy)]
pub struct DomElement<'a> {
    dom: &'a DomSnapshot,
    id: NodeId,
    node: &'a DomNode,
}

impl<'a> DomElement<'a> {
    pub fn new(dom: &'a DomSnapshot, id: NodeId) -> Option<Self> {
        dom.node(id).map(|node| DomElement { dom, id, node })
    }

    fn at(&self, id: NodeId) -> Option<Self> {
        DomElement::new(self.dom, id)
    }

    fn sibling(&self, offset: isize) -> Option<Self> {
        let siblings = self.dom.element_siblings(self.id);
        let position = siblings.iter().position(|s| *s == self.id)?;
        let target = position.checked_add_signed(offset)?;
        siblings.get(target).and_then(|id| self.at(*id))
    }
}

/// Never matches non-tree-structural pseudo-classes; the dialect has none.
impl Element for DomElement<'_> {
    type Impl = Simple;

    fn opaque(&self) -> OpaqueElement {
        OpaqueElement::new(self.node)
    }

    fn parent_element(&self) -> Option<Self> {
        self.node.parent.and_then(|parent| self.at(parent))
    }

    fn parent_node_is_shadow_root(&self) -> bool {
        false
    }

    fn containing_shadow_host(&self) -> Option<Self> {
        None
    }

    fn is_pseudo_element(&self) -> bool {
        false
    }

    fn prev_sibling_element(&self) -> Option<Self> {
        self.sibling(-1)
    }

    fn next_sibling_element(&self) -> Option<Self> {
        self.sibling(1)
    }

    fn first_element_child(&self) -> Option<Self> {
        self.node.children().next().and_then(|child| self.at(child))
    }

    fn is_html_element_in_html_document(&self) -> bool {
        true
    }

    fn has_local_name(&self, name: &CssLocalName) -> bool {
        self.node.tag.as_str() == &*name.0
    }

    fn has_namespace(&self, namespace: &Namespace) -> bool {
        &**namespace == XHTML_NAMESPACE
    }

    fn is_same_type(&self, other: &Self) -> bool {
        self.node.tag == other.node.tag
    }

    fn attr_matches(
        &self,
        ns: &NamespaceConstraint<&Namespace>,
        local_name: &CssLocalName,
        operation: &AttrSelectorOperation<&CssString>,
    ) -> bool {
        // Captured attributes carry no namespace
        if matches!(*ns, NamespaceConstraint::Specific(url) if !url.is_empty()) {
            return false;
        }
        self.node
            .attr(&local_name.0)
            .is_some_and(|value| operation.eval_str(value))
    }

    fn match_non_ts_pseudo_class(
        &self,
        _pc: &NonTSPseudoClass,
        _context: &mut MatchingContext<'_, Self::Impl>,
    ) -> bool {
        false
    }

    fn match_pseudo_element(
        &self,
        _pe: &PseudoElement,
        _context: &mut MatchingContext<'_, Self::Impl>,
    ) -> bool {
        false
    }

    fn apply_selector_flags(&self, _flags: ElementSelectorFlags) {}

    fn is_link(&self) -> bool {
        matches!(self.node.tag.as_str(), "a" | "area") && self.node.has_attr("href")
    }

    fn is_html_slot_element(&self) -> bool {
        self.node.tag == "slot"
    }

    fn has_id(&self, id: &CssLocalName, case_sensitivity: CaseSensitivity) -> bool {
        self.node
            .attr("id")
            .is_some_and(|value| case_sensitivity.eq(id.0.as_bytes(), value.as_bytes()))
    }

    fn has_class(&self, name: &CssLocalName, case_sensitivity: CaseSensitivity) -> bool {
        self.node.attr("class").is_some_and(|classes| {
            classes
                .split_whitespace()
                .any(|class| case_sensitivity.eq(class.as_bytes(), name.0.as_bytes()))
        })
    }

    fn has_custom_state(&self, _name: &CssLocalName) -> bool {
        false
    }

    fn imported_part(&self, _name: &CssLocalName) -> Option<CssLocalName> {
        None
    }

    fn is_part(&self, _name: &CssLocalName) -> bool {
        false
    }

    fn is_empty(&self) -> bool {
        self.node
            .content
            .iter()
            .all(|segment| matches!(segment, Segment::Text(text) if text.is_empty()))
    }

    fn is_root(&self) -> bool {
        self.node.parent.is_none()
    }

    fn add_element_unique_hashes(&self, _filter: &mut BloomFilter) -> bool {
        false
    }
}

#[cfg(test)]
#[path = "selector_test.rs"]
mod selector_test;
