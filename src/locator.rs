//! Locator resolution
//!
//! A [`Locator`] is an immutable query descriptor. It never holds a live
//! reference: every use re-evaluates it against a fresh [`DomSnapshot`],
//! which keeps it valid across re-renders such as a tab switch remounting a
//! panel. Resolution yields [`ElementHandle`]s that are only meaningful for
//! the snapshot generation they came from.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::aria;
use crate::dom::{DomSnapshot, NodeId, normalize_whitespace};
use crate::errors::{HarnessError, Result};
use crate::selector::Selector;

/// How a locator compares text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "TextMatchDef")]
pub enum TextMatch {
    /// Equal after whitespace normalisation, case-sensitive
    Exact(String),
    /// Substring after whitespace normalisation, case-sensitive
    Contains(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TextMatchDef {
    Plain(String),
    Tagged(TaggedTextMatch),
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
enum TaggedTextMatch {
    Exact(String),
    Contains(String),
}

impl From<TextMatchDef> for TextMatch {
    fn from(def: TextMatchDef) -> Self {
        match def {
            TextMatchDef::Plain(text) | TextMatchDef::Tagged(TaggedTextMatch::Exact(text)) => {
                TextMatch::Exact(text)
            }
            TextMatchDef::Tagged(TaggedTextMatch::Contains(text)) => TextMatch::Contains(text),
        }
    }
}

impl TextMatch {
    pub fn exact(text: impl Into<String>) -> Self {
        TextMatch::Exact(text.into())
    }

    pub fn contains(text: impl Into<String>) -> Self {
        TextMatch::Contains(text.into())
    }

    pub fn matches(&self, actual: &str) -> bool {
        let actual = normalize_whitespace(actual);
        match self {
            TextMatch::Exact(expected) => actual == normalize_whitespace(expected),
            TextMatch::Contains(expected) => actual.contains(&normalize_whitespace(expected)),
        }
    }
}

impl From<&str> for TextMatch {
    fn from(text: &str) -> Self {
        TextMatch::Exact(text.to_string())
    }
}

impl From<String> for TextMatch {
    fn from(text: String) -> Self {
        TextMatch::Exact(text)
    }
}

impl fmt::Display for TextMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextMatch::Exact(text) => write!(f, "{:?}", text),
            TextMatch::Contains(text) => write!(f, "*{:?}", text),
        }
    }
}

/// What a locator searches for
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    Role {
        role: String,
        name: Option<TextMatch>,
    },
    Placeholder(TextMatch),
    Css(Selector),
    Text(TextMatch),
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::Role { role, name: None } => write!(f, "role={}", role),
            Query::Role {
                role,
                name: Some(name),
            } => write!(f, "role={}[name={}]", role, name),
            Query::Placeholder(text) => write!(f, "placeholder={}", text),
            Query::Css(selector) => write!(f, "css={}", selector),
            Query::Text(text) => write!(f, "text={}", text),
        }
    }
}

/// Declarative, re-evaluatable element query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "LocatorDef", into = "LocatorDef")]
pub struct Locator {
    scope: Option<Arc<Locator>>,
    query: Query,
    nth: Option<usize>,
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(scope) = &self.scope {
            write!(f, "{} >> ", scope)?;
        }
        write!(f, "{}", self.query)?;
        if let Some(n) = self.nth {
            write!(f, " >> nth={}", n)?;
        }
        Ok(())
    }
}

impl Locator {
    fn from_query(query: Query) -> Self {
        Locator {
            scope: None,
            query,
            nth: None,
        }
    }

    /// Elements with the given ARIA role, any name
    pub fn role(role: &str) -> Self {
        Self::from_query(Query::Role {
            role: role.to_ascii_lowercase(),
            name: None,
        })
    }

    /// Elements with the given ARIA role and accessible name
    pub fn role_named(role: &str, name: impl Into<TextMatch>) -> Self {
        Self::from_query(Query::Role {
            role: role.to_ascii_lowercase(),
            name: Some(name.into()),
        })
    }

    pub fn placeholder(text: impl Into<TextMatch>) -> Self {
        Self::from_query(Query::Placeholder(text.into()))
    }

    /// Structural path; rejected here if it does not parse
    pub fn css(selector: &str) -> Result<Self> {
        Ok(Self::from_query(Query::Css(Selector::parse(selector)?)))
    }

    /// Innermost elements whose text content matches
    pub fn text(text: impl Into<TextMatch>) -> Self {
        Self::from_query(Query::Text(text.into()))
    }

    /// Restrict `inner` to descendants of this locator's matches
    pub fn within(&self, inner: Locator) -> Locator {
        let scope = match inner.scope {
            None => self.clone(),
            Some(existing) => self.within(Arc::unwrap_or_clone(existing)),
        };
        Locator {
            scope: Some(Arc::new(scope)),
            query: inner.query,
            nth: inner.nth,
        }
    }

    pub fn get_by_role(&self, role: &str) -> Locator {
        self.within(Locator::role(role))
    }

    pub fn get_by_role_named(&self, role: &str, name: impl Into<TextMatch>) -> Locator {
        self.within(Locator::role_named(role, name))
    }

    pub fn get_by_placeholder(&self, text: impl Into<TextMatch>) -> Locator {
        self.within(Locator::placeholder(text))
    }

    pub fn get_by_text(&self, text: impl Into<TextMatch>) -> Locator {
        self.within(Locator::text(text))
    }

    pub fn locator(&self, selector: &str) -> Result<Locator> {
        Ok(self.within(Locator::css(selector)?))
    }

    pub fn first(&self) -> Locator {
        self.nth(0)
    }

    pub fn nth(&self, index: usize) -> Locator {
        Locator {
            nth: Some(index),
            ..self.clone()
        }
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn scope(&self) -> Option<&Locator> {
        self.scope.as_deref()
    }

    /// Resolve against a snapshot, optionally below an already resolved handle
    pub fn resolve(&self, dom: &DomSnapshot, scope: Option<&ElementHandle>) -> Vec<ElementHandle> {
        Resolver { dom }.resolve(self, scope)
    }
}

/// Reference to a node at the instant of resolution.
///
/// Valid only for the snapshot generation it was resolved in; re-resolve
/// through the [`Locator`] after anything that may re-render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ElementHandle {
    node: NodeId,
    generation: u64,
}

impl ElementHandle {
    pub fn new(node: NodeId, generation: u64) -> Self {
        ElementHandle { node, generation }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Evaluates locators against one snapshot
struct Resolver<'a> {
    dom: &'a DomSnapshot,
}

impl Resolver<'_> {
    fn resolve(&self, locator: &Locator, scope: Option<&ElementHandle>) -> Vec<ElementHandle> {
        let generation = self.dom.generation();
        let roots: Vec<NodeId> = match scope {
            Some(handle) if handle.generation != generation => {
                debug!("Scope handle from generation {} is stale", handle.generation);
                return Vec::new();
            }
            Some(handle) => vec![handle.node],
            None => Vec::new(),
        };
        let nodes = self.resolve_nodes(locator, if scope.is_some() { Some(&roots) } else { None });
        debug!("{} resolved to {} node(s)", locator, nodes.len());
        nodes
            .into_iter()
            .map(|node| ElementHandle::new(node, generation))
            .collect()
    }

    fn resolve_nodes(&self, locator: &Locator, roots: Option<&[NodeId]>) -> Vec<NodeId> {
        let scoped_roots = match &locator.scope {
            Some(outer) => Some(self.resolve_nodes(outer, roots)),
            None => roots.map(<[NodeId]>::to_vec),
        };

        let candidates: Vec<NodeId> = match scoped_roots {
            None => (0..self.dom.len()).collect(),
            Some(roots) => {
                let mut within: Vec<NodeId> = roots
                    .iter()
                    .flat_map(|root| self.dom.descendants(*root))
                    .collect();
                within.sort_unstable();
                within.dedup();
                within
            }
        };

        let mut matches: Vec<NodeId> = candidates
            .into_iter()
            .filter(|id| self.matches(&locator.query, *id))
            .collect();

        if let Query::Text(_) = locator.query {
            // Keep innermost matches only
            let all = matches.clone();
            matches.retain(|id| !all.iter().any(|other| self.dom.is_descendant_of(*other, *id)));
        }

        match locator.nth {
            Some(n) => matches.get(n).map(|id| vec![*id]).unwrap_or_default(),
            None => matches,
        }
    }

    fn matches(&self, query: &Query, id: NodeId) -> bool {
        let Some(node) = self.dom.node(id) else {
            return false;
        };
        match query {
            Query::Role { role, name } => {
                if aria::is_hidden(self.dom, id) {
                    return false;
                }
                if aria::role_of(self.dom, node).as_deref() != Some(role.as_str()) {
                    return false;
                }
                name.as_ref()
                    .is_none_or(|name| name.matches(&aria::accessible_name(self.dom, id)))
            }
            Query::Placeholder(text) => node.attr("placeholder").is_some_and(|p| text.matches(p)),
            Query::Css(selector) => selector.matches(self.dom, id),
            Query::Text(text) => text.matches(&self.dom.text_content(id)),
        }
    }
}

/// Serialized locator form used by scenario files
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct LocatorDef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<TextMatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    placeholder: Option<TextMatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    css: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<TextMatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    nth: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    within: Option<Box<LocatorDef>>,
}

impl TryFrom<LocatorDef> for Locator {
    type Error = HarnessError;

    fn try_from(def: LocatorDef) -> Result<Self> {
        let kinds = [
            def.role.is_some(),
            def.placeholder.is_some(),
            def.css.is_some(),
            def.text.is_some(),
        ];
        if kinds.iter().filter(|k| **k).count() != 1 {
            return Err(HarnessError::InvalidLocator(
                "exactly one of role, placeholder, css or text is required".to_string(),
            ));
        }
        if def.name.is_some() && def.role.is_none() {
            return Err(HarnessError::InvalidLocator(
                "name is only valid together with role".to_string(),
            ));
        }

        let mut locator = if let Some(role) = def.role {
            match def.name {
                Some(name) => Locator::role_named(&role, name),
                None => Locator::role(&role),
            }
        } else if let Some(text) = def.placeholder {
            Locator::placeholder(text)
        } else if let Some(css) = def.css {
            Locator::css(&css)?
        } else if let Some(text) = def.text {
            Locator::text(text)
        } else {
            unreachable!("one query kind is present")
        };
        if let Some(n) = def.nth {
            locator = locator.nth(n);
        }

        match def.within {
            Some(outer) => Ok(Locator::try_from(*outer)?.within(locator)),
            None => Ok(locator),
        }
    }
}

impl From<Locator> for LocatorDef {
    fn from(locator: Locator) -> Self {
        let mut def = LocatorDef {
            nth: locator.nth,
            within: locator
                .scope
                .map(|scope| Box::new(LocatorDef::from(Arc::unwrap_or_clone(scope)))),
            ..LocatorDef::default()
        };
        match locator.query {
            Query::Role { role, name } => {
                def.role = Some(role);
                def.name = name;
            }
            Query::Placeholder(text) => def.placeholder = Some(text),
            Query::Css(selector) => def.css = Some(selector.source().to_string()),
            Query::Text(text) => def.text = Some(text),
        }
        def
    }
}

#[cfg(test)]
#[path = "locator_test.rs"]
mod locator_test;
