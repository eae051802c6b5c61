//! Accessible roles and names
//!
//! Role/name locators must agree with what a screen reader announces, so
//! this follows the accessible-name computation order: `aria-labelledby`,
//! `aria-label`, native labelling (`<label>`, `alt`, button values), name
//! from content, `title`, and finally `placeholder`.

use std::borrow::Cow;

use crate::dom::{DomNode, DomSnapshot, NodeId, Segment, normalize_whitespace};

/// Roles whose accessible name may come from their content
const NAME_FROM_CONTENT: &[&str] = &[
    "button",
    "cell",
    "checkbox",
    "columnheader",
    "gridcell",
    "heading",
    "link",
    "menuitem",
    "menuitemcheckbox",
    "menuitemradio",
    "option",
    "radio",
    "row",
    "rowheader",
    "switch",
    "tab",
    "tooltip",
    "treeitem",
];

/// Elements rendered inline; content of other elements is space-separated
const INLINE_TAGS: &[&str] = &[
    "a", "abbr", "b", "bdi", "bdo", "cite", "code", "em", "i", "kbd", "label", "mark", "q", "s",
    "samp", "small", "span", "strong", "sub", "sup", "time", "u", "var",
];

const LABELABLE_TAGS: &[&str] = &["input", "textarea", "select", "button", "meter", "output", "progress"];

/// Role of a node: explicit `role` attribute first, then the implicit HTML role
pub fn role_of<'a>(dom: &DomSnapshot, node: &'a DomNode) -> Option<Cow<'a, str>> {
    if let Some(explicit) = node.attr("role").and_then(|r| r.split_whitespace().next()) {
        return Some(Cow::Borrowed(explicit));
    }
    implicit_role(dom, node).map(Cow::Borrowed)
}

fn implicit_role(dom: &DomSnapshot, node: &DomNode) -> Option<&'static str> {
    let role = match node.tag.as_str() {
        "a" | "area" if node.has_attr("href") => "link",
        "article" => "article",
        "aside" => "complementary",
        "button" => "button",
        "dialog" => "dialog",
        "fieldset" => "group",
        "footer" => "contentinfo",
        "form" if has_own_name(node) => "form",
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => "heading",
        "header" => "banner",
        "hr" => "separator",
        "img" if node.attr("alt") == Some("") => "presentation",
        "img" => "img",
        "input" => return input_role(node),
        "li" => "listitem",
        "main" => "main",
        "nav" => "navigation",
        "ol" | "ul" | "menu" => "list",
        "option" => "option",
        "progress" => "progressbar",
        "section" if has_own_name(node) => "region",
        "select" if node.has_attr("multiple") => "listbox",
        "select" => "combobox",
        "table" => "table",
        "tbody" | "thead" | "tfoot" => "rowgroup",
        "td" => "cell",
        "textarea" => "textbox",
        "th" => {
            let in_head = dom
                .parent(node.id)
                .and_then(|p| dom.node(p))
                .and_then(|row| row.parent)
                .and_then(|g| dom.node(g))
                .is_some_and(|group| group.tag == "thead");
            if in_head || node.attr("scope") == Some("col") {
                "columnheader"
            } else {
                "rowheader"
            }
        }
        "tr" => "row",
        _ => return None,
    };
    Some(role)
}

fn input_role(node: &DomNode) -> Option<&'static str> {
    let kind = node.attr("type").unwrap_or("text").to_ascii_lowercase();
    let role = match kind.as_str() {
        "button" | "submit" | "reset" | "image" => "button",
        "checkbox" => "checkbox",
        "radio" => "radio",
        "range" => "slider",
        "number" => "spinbutton",
        "search" if node.has_attr("list") => "combobox",
        "search" => "searchbox",
        "hidden" => return None,
        _ if node.has_attr("list") => "combobox",
        _ => "textbox",
    };
    Some(role)
}

fn has_own_name(node: &DomNode) -> bool {
    ["aria-label", "aria-labelledby", "title"]
        .iter()
        .any(|attr| node.attr(attr).is_some_and(|v| !v.trim().is_empty()))
}

/// Whether the node is excluded from the accessibility tree
pub fn is_hidden(dom: &DomSnapshot, id: NodeId) -> bool {
    let Some(node) = dom.node(id) else {
        return true;
    };
    if !node.rendered {
        return true;
    }
    std::iter::once(id)
        .chain(dom.ancestors(id))
        .filter_map(|n| dom.node(n))
        .any(|n| n.attr("aria-hidden") == Some("true"))
}

/// Accessible name of a node, whitespace normalised
pub fn accessible_name(dom: &DomSnapshot, id: NodeId) -> String {
    let Some(node) = dom.node(id) else {
        return String::new();
    };

    if let Some(ids) = node.attr("aria-labelledby") {
        let name = ids
            .split_whitespace()
            .filter_map(|target| dom.by_dom_id(target))
            .map(|target| content_name(dom, target, true))
            .collect::<Vec<_>>()
            .join(" ");
        let name = normalize_whitespace(&name);
        if !name.is_empty() {
            return name;
        }
    }

    if let Some(label) = node.attr("aria-label") {
        let label = normalize_whitespace(label);
        if !label.is_empty() {
            return label;
        }
    }

    if let Some(native) = native_name(dom, node) {
        return native;
    }

    let role = role_of(dom, node);
    if role.as_deref().is_some_and(|r| NAME_FROM_CONTENT.contains(&r)) {
        let name = normalize_whitespace(&content_name(dom, id, false));
        if !name.is_empty() {
            return name;
        }
    }

    for fallback in ["title", "placeholder"] {
        if let Some(value) = node.attr(fallback) {
            let value = normalize_whitespace(value);
            if !value.is_empty() {
                return value;
            }
        }
    }

    String::new()
}

fn native_name(dom: &DomSnapshot, node: &DomNode) -> Option<String> {
    let non_empty = |s: String| if s.is_empty() { None } else { Some(s) };

    match node.tag.as_str() {
        "img" | "area" => return node.attr("alt").map(normalize_whitespace).and_then(non_empty),
        "input" => {
            let kind = node.attr("type").unwrap_or("text").to_ascii_lowercase();
            match kind.as_str() {
                "button" | "submit" | "reset" => {
                    let value = node
                        .value
                        .as_deref()
                        .or(node.attr("value"))
                        .map(normalize_whitespace)
                        .and_then(non_empty);
                    return value.or_else(|| match kind.as_str() {
                        "submit" => Some("Submit".to_string()),
                        "reset" => Some("Reset".to_string()),
                        _ => None,
                    });
                }
                "image" => return node.attr("alt").map(normalize_whitespace).and_then(non_empty),
                _ => {}
            }
        }
        _ => {}
    }

    if !LABELABLE_TAGS.contains(&node.tag.as_str()) {
        return None;
    }

    let mut labels: Vec<NodeId> = Vec::new();
    if let Some(dom_id) = node.attr("id") {
        labels.extend(dom.nodes().iter().filter(|candidate| {
            candidate.tag == "label" && candidate.attr("for") == Some(dom_id)
        }).map(|label| label.id));
    }
    if let Some(wrapping) = dom
        .ancestors(node.id)
        .find(|a| dom.node(*a).is_some_and(|n| n.tag == "label"))
        && !labels.contains(&wrapping)
    {
        labels.push(wrapping);
    }

    let name = labels
        .into_iter()
        .map(|label| label_text(dom, label, node.id))
        .collect::<Vec<_>>()
        .join(" ");
    non_empty(normalize_whitespace(&name))
}

/// Text of a label, leaving out the control it labels
fn label_text(dom: &DomSnapshot, label: NodeId, control: NodeId) -> String {
    let mut out = String::new();
    let Some(node) = dom.node(label) else {
        return out;
    };
    for segment in &node.content {
        match segment {
            Segment::Text(text) => out.push_str(text),
            Segment::Node(child) if *child == control => {}
            Segment::Node(child) => out.push_str(&label_text(dom, *child, control)),
        }
    }
    out
}

/// Name computed from a subtree's content.
///
/// `referenced` is set when the subtree was reached through
/// `aria-labelledby`, in which case a hidden target still contributes.
fn content_name(dom: &DomSnapshot, id: NodeId, referenced: bool) -> String {
    let Some(node) = dom.node(id) else {
        return String::new();
    };
    if !referenced && is_hidden(dom, id) {
        return String::new();
    }

    let mut out = String::new();
    for segment in &node.content {
        match segment {
            Segment::Text(text) => out.push_str(text),
            Segment::Node(child) => {
                let Some(child_node) = dom.node(*child) else {
                    continue;
                };
                if is_hidden(dom, *child) {
                    continue;
                }
                let part = match child_node.attr("aria-label") {
                    Some(label) if !label.trim().is_empty() => label.to_string(),
                    _ => match child_node.tag.as_str() {
                        "img" => child_node.attr("alt").unwrap_or("").to_string(),
                        "input" | "textarea" | "select" => child_node.value.clone().unwrap_or_default(),
                        _ => content_name(dom, *child, false),
                    },
                };
                if INLINE_TAGS.contains(&child_node.tag.as_str()) {
                    out.push_str(&part);
                } else {
                    out.push(' ');
                    out.push_str(&part);
                    out.push(' ');
                }
            }
        }
    }
    out
}

#[cfg(test)]
#[path = "aria_test.rs"]
mod aria_test;
