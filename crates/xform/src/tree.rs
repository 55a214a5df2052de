//! Minimal in-memory tree materialized by [`crate::event::TreeBuilder`].
//!
//! The production tree storage lives outside this crate; this model only has
//! to be good enough to check what a pipeline produced and to feed nodes into
//! sort expressions.
//!
//! ```
//! use xform::event::{Receiver, TreeBuilder, PipelineConfiguration};
//! use xform::model::NodeName;
//! use xform::location::Location;
//! use xform::event::ReceiverOptions;
//!
//! let mut b = TreeBuilder::new(PipelineConfiguration::default());
//! b.open().unwrap();
//! b.start_document(ReceiverOptions::empty()).unwrap();
//! b.start_element(&NodeName::local("root"), None, &Location::unknown(), ReceiverOptions::empty()).unwrap();
//! b.start_content().unwrap();
//! b.characters("Hi", &Location::unknown(), ReceiverOptions::empty()).unwrap();
//! b.end_element().unwrap();
//! b.end_document().unwrap();
//! b.close().unwrap();
//! let doc = b.document().unwrap();
//! assert_eq!(doc.string_value(), "Hi");
//! ```
use std::fmt;
use std::sync::{Arc, RwLock, Weak};

use crate::model::{NamespaceBinding, NodeKind, NodeName};

#[derive(Debug)]
pub(crate) struct Inner {
    kind: NodeKind,
    name: Option<NodeName>,
    value: Option<String>, // text / attribute / comment / PI content
    parent: RwLock<Option<Weak<Inner>>>,
    attributes: RwLock<Vec<Node>>,
    namespaces: RwLock<Vec<NamespaceBinding>>,
    children: RwLock<Vec<Node>>,
}

/// An Arc-backed node; equality is identity.
#[derive(Clone)]
pub struct Node(pub(crate) Arc<Inner>);

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for Node {}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node").field("kind", &self.0.kind).field("name", &self.0.name).field("value", &self.0.value).finish()
    }
}

impl Node {
    pub(crate) fn new(kind: NodeKind, name: Option<NodeName>, value: Option<String>) -> Self {
        Node(Arc::new(Inner {
            kind,
            name,
            value,
            parent: RwLock::new(None),
            attributes: RwLock::new(Vec::new()),
            namespaces: RwLock::new(Vec::new()),
            children: RwLock::new(Vec::new()),
        }))
    }

    pub(crate) fn append_child(&self, child: &Node) {
        if let Ok(mut parent) = child.0.parent.write() {
            *parent = Some(Arc::downgrade(&self.0));
        }
        if let Ok(mut ch) = self.0.children.write() {
            ch.push(child.clone());
        }
    }

    pub(crate) fn append_attribute(&self, attr: &Node) {
        if let Ok(mut parent) = attr.0.parent.write() {
            *parent = Some(Arc::downgrade(&self.0));
        }
        if let Ok(mut attrs) = self.0.attributes.write() {
            attrs.push(attr.clone());
        }
    }

    /// Add `attr`, replacing an existing attribute of the same expanded name.
    /// Returns whether one was replaced.
    pub(crate) fn set_attribute(&self, attr: &Node) -> bool {
        let same_name = |a: &Node| match (a.name(), attr.name()) {
            (Some(x), Some(y)) => x.uri == y.uri && x.local == y.local,
            _ => false,
        };
        let replaced = match self.0.attributes.write() {
            Ok(mut attrs) => match attrs.iter_mut().find(|a| same_name(a)) {
                Some(slot) => {
                    *slot = attr.clone();
                    true
                }
                None => false,
            },
            Err(_) => false,
        };
        if replaced {
            if let Ok(mut parent) = attr.0.parent.write() {
                *parent = Some(Arc::downgrade(&self.0));
            }
        } else {
            self.append_attribute(attr);
        }
        replaced
    }

    pub(crate) fn has_attribute(&self, name: &NodeName) -> bool {
        self.attributes().iter().any(|a| a.name().is_some_and(|n| n.is(&name.uri, &name.local)))
    }

    pub(crate) fn append_namespace(&self, binding: NamespaceBinding) {
        if let Ok(mut nss) = self.0.namespaces.write() {
            nss.push(binding);
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.0.kind
    }

    pub fn name(&self) -> Option<&NodeName> {
        self.0.name.as_ref()
    }

    pub fn parent(&self) -> Option<Node> {
        self.0.parent.read().ok()?.as_ref().and_then(Weak::upgrade).map(Node)
    }

    pub fn children(&self) -> Vec<Node> {
        self.0.children.read().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn attributes(&self) -> Vec<Node> {
        self.0.attributes.read().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn namespaces(&self) -> Vec<NamespaceBinding> {
        self.0.namespaces.read().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn attribute_value(&self, uri: &str, local: &str) -> Option<String> {
        self.attributes()
            .into_iter()
            .find(|a| a.name().is_some_and(|n| n.is(uri, local)))
            .and_then(|a| a.0.value.clone())
    }

    /// Resolve a namespace prefix by walking the ancestor chain (including self).
    pub fn lookup_namespace_uri(&self, prefix: &str) -> Option<String> {
        let mut cur = Some(self.clone());
        while let Some(n) = cur {
            if let Some(b) = n.namespaces().into_iter().find(|b| &*b.prefix == prefix) {
                return Some(b.uri.to_string());
            }
            cur = n.parent();
        }
        None
    }

    pub fn string_value(&self) -> String {
        match self.kind() {
            NodeKind::Text | NodeKind::Attribute | NodeKind::Comment | NodeKind::ProcessingInstruction | NodeKind::Namespace => {
                self.0.value.clone().unwrap_or_default()
            }
            NodeKind::Element | NodeKind::Document => {
                fn dfs(n: &Node, out: &mut String) {
                    if n.kind() == NodeKind::Text
                        && let Some(v) = &n.0.value
                    {
                        out.push_str(v);
                    }
                    if matches!(n.kind(), NodeKind::Element | NodeKind::Document) {
                        for c in n.children() {
                            dfs(&c, out);
                        }
                    }
                }
                let mut out = String::new();
                dfs(self, &mut out);
                out
            }
        }
    }
}
