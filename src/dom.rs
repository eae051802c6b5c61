//! DOM snapshot model
//!
//! A [`DomSnapshot`] is a flat, pre-order capture of the element tree of a
//! live page taken in a single browser round trip. Locators are evaluated
//! against snapshots, never against live nodes, so a locator stays valid
//! across re-renders while an [`ElementHandle`](crate::locator::ElementHandle)
//! is only meaningful for the generation it was resolved in.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Index of a node inside a snapshot
pub type NodeId = usize;

/// One piece of an element's content, in document order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Segment {
    /// Child element
    Node(NodeId),
    /// Text run
    Text(String),
}

/// A captured element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomNode {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    /// Lowercase tag name
    pub tag: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub content: Vec<Segment>,
    /// Live value of form controls (may differ from the `value` attribute)
    #[serde(default)]
    pub value: Option<String>,
    /// Not removed from rendering by `display: none` or `visibility: hidden`
    #[serde(default)]
    pub rendered: bool,
    /// Rendered with a non-empty box and non-zero opacity
    #[serde(default)]
    pub visible: bool,
    #[serde(default)]
    pub disabled: bool,
}

impl DomNode {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// `contenteditable` set to an editing state on this element itself
    pub fn is_content_editable(&self) -> bool {
        self.attr("contenteditable").is_some_and(|v| {
            v.is_empty() || v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("plaintext-only")
        })
    }

    /// Child element ids in document order
    pub fn children(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.content.iter().filter_map(|segment| match segment {
            Segment::Node(id) => Some(*id),
            Segment::Text(_) => None,
        })
    }
}

#[derive(Deserialize)]
struct RawSnapshot {
    generation: u64,
    #[serde(default)]
    url: String,
    nodes: Vec<DomNode>,
}

/// Immutable capture of a page's element tree
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawSnapshot")]
pub struct DomSnapshot {
    generation: u64,
    url: String,
    nodes: Vec<DomNode>,
    #[serde(skip)]
    by_dom_id: HashMap<String, NodeId>,
}

impl TryFrom<RawSnapshot> for DomSnapshot {
    type Error = anyhow::Error;

    fn try_from(raw: RawSnapshot) -> Result<Self> {
        DomSnapshot::new(raw.generation, raw.url, raw.nodes)
    }
}

impl DomSnapshot {
    /// Validate and index a list of captured nodes
    pub fn new(generation: u64, url: impl Into<String>, nodes: Vec<DomNode>) -> Result<Self> {
        let mut by_dom_id = HashMap::new();
        for (index, node) in nodes.iter().enumerate() {
            if node.id != index {
                anyhow::bail!("Snapshot node {} is stored at position {}", node.id, index);
            }
            if let Some(parent) = node.parent
                && parent >= index
            {
                anyhow::bail!("Snapshot node {} precedes its parent {}", index, parent);
            }
            for child in node.children() {
                if child >= nodes.len() || nodes[child].parent != Some(index) {
                    anyhow::bail!("Snapshot node {} lists unknown child {}", index, child);
                }
            }
            if let Some(dom_id) = node.attr("id") {
                // First occurrence wins, like getElementById
                by_dom_id.entry(dom_id.to_string()).or_insert(index);
            }
        }

        check_pre_order(&nodes)?;

        Ok(DomSnapshot {
            generation,
            url: url.into(),
            nodes,
            by_dom_id,
        })
    }

    /// Build a snapshot from an element tree, without a browser
    pub fn from_tree(generation: u64, url: impl Into<String>, root: ElementBuilder) -> Self {
        let mut nodes = Vec::new();
        root.flatten(None, true, &mut nodes);
        let url = url.into();
        // Builder output is well formed by construction
        DomSnapshot::new(generation, url.clone(), nodes).unwrap_or_else(|_| DomSnapshot {
            generation,
            url,
            nodes: Vec::new(),
            by_dom_id: HashMap::new(),
        })
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> Option<&DomNode> {
        self.nodes.get(id)
    }

    pub fn nodes(&self) -> &[DomNode] {
        &self.nodes
    }

    /// Root element (the first captured node)
    pub fn root(&self) -> Option<NodeId> {
        if self.nodes.is_empty() { None } else { Some(0) }
    }

    /// Element with the given `id` attribute
    pub fn by_dom_id(&self, dom_id: &str) -> Option<NodeId> {
        self.by_dom_id.get(dom_id).copied()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|node| node.parent)
    }

    /// Proper ancestors, nearest first
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |current| self.parent(*current))
    }

    pub fn is_descendant_of(&self, id: NodeId, ancestor: NodeId) -> bool {
        self.ancestors(id).any(|a| a == ancestor)
    }

    /// Proper descendants in document order.
    ///
    /// Pre-order capture means a subtree is a contiguous id range.
    pub fn descendants(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let start = id + 1;
        let end = (start..self.nodes.len())
            .find(|candidate| !self.is_descendant_of(*candidate, id))
            .unwrap_or(self.nodes.len());
        start..end
    }

    /// Siblings that are elements, including the node itself
    pub fn element_siblings(&self, id: NodeId) -> Vec<NodeId> {
        match self.parent(id).and_then(|parent| self.node(parent)) {
            Some(parent) => parent.children().collect(),
            None => vec![id],
        }
    }

    /// Full text content of a subtree, whitespace normalised
    pub fn text_content(&self, id: NodeId) -> String {
        let mut raw = String::new();
        self.collect_text(id, &mut raw);
        normalize_whitespace(&raw)
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        collect_text(&self.nodes, id, out);
    }
}

fn collect_text(nodes: &[DomNode], id: NodeId, out: &mut String) {
    let Some(node) = nodes.get(id) else {
        return;
    };
    for segment in &node.content {
        match segment {
            Segment::Text(text) => out.push_str(text),
            Segment::Node(child) => collect_text(nodes, *child, out),
        }
    }
}

/// Walk from the root and require every node to be visited exactly once,
/// in id order. Subtree lookups rely on this contiguous layout.
fn check_pre_order(nodes: &[DomNode]) -> Result<()> {
    if nodes.is_empty() {
        return Ok(());
    }
    if nodes[0].parent.is_some() {
        anyhow::bail!("Snapshot root has a parent");
    }
    let mut next = 0;
    let mut stack = vec![0];
    while let Some(id) = stack.pop() {
        if id != next {
            anyhow::bail!("Snapshot node {} is out of document order (expected {})", id, next);
        }
        next += 1;
        stack.extend(nodes[id].children().collect::<Vec<_>>().into_iter().rev());
    }
    if next != nodes.len() {
        anyhow::bail!("Snapshot node {} is not reachable from the root", next);
    }
    Ok(())
}

/// Collapse runs of whitespace and trim
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

enum BuilderContent {
    Text(String),
    Element(ElementBuilder),
}

/// Declarative element tree used to build snapshots for offline backends
pub struct ElementBuilder {
    tag: String,
    attributes: BTreeMap<String, String>,
    content: Vec<BuilderContent>,
    value: Option<String>,
    rendered: bool,
    has_box: bool,
    disabled: bool,
}

impl ElementBuilder {
    pub fn new(tag: &str) -> Self {
        ElementBuilder {
            tag: tag.to_ascii_lowercase(),
            attributes: BTreeMap::new(),
            content: Vec::new(),
            value: None,
            rendered: true,
            has_box: true,
            disabled: false,
        }
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.content.push(BuilderContent::Text(text.to_string()));
        self
    }

    pub fn child(mut self, child: ElementBuilder) -> Self {
        self.content.push(BuilderContent::Element(child));
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = ElementBuilder>) -> Self {
        self.content
            .extend(children.into_iter().map(BuilderContent::Element));
        self
    }

    /// Live form-control value; contenteditable elements default to their text
    pub fn value(mut self, value: &str) -> Self {
        self.value = Some(value.to_string());
        self
    }

    /// `display: none`
    pub fn hidden(mut self) -> Self {
        self.rendered = false;
        self
    }

    /// Rendered but with an empty box
    pub fn collapsed(mut self) -> Self {
        self.has_box = false;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    fn flatten(self, parent: Option<NodeId>, parent_rendered: bool, out: &mut Vec<DomNode>) -> NodeId {
        let id = out.len();
        let rendered = parent_rendered && self.rendered;
        out.push(DomNode {
            id,
            parent,
            tag: self.tag,
            attributes: self.attributes,
            content: Vec::new(),
            value: self.value,
            rendered,
            visible: rendered && self.has_box,
            disabled: self.disabled,
        });

        let mut content = Vec::with_capacity(self.content.len());
        for item in self.content {
            match item {
                BuilderContent::Text(text) => content.push(Segment::Text(text)),
                BuilderContent::Element(child) => {
                    content.push(Segment::Node(child.flatten(Some(id), rendered, out)));
                }
            }
        }
        out[id].content = content;
        if out[id].value.is_none() && out[id].is_content_editable() {
            let mut text = String::new();
            collect_text(out, id, &mut text);
            out[id].value = Some(text);
        }
        id
    }
}

#[cfg(test)]
#[path = "dom_test.rs"]
mod dom_test;
