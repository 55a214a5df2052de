use core::fmt;
use string_cache::DefaultAtom;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Document,
    Element,
    Attribute,
    Text,
    Comment,
    ProcessingInstruction,
    Namespace,
}

impl NodeKind {
    pub fn describe(self) -> &'static str {
        match self {
            NodeKind::Document => "document",
            NodeKind::Element => "element",
            NodeKind::Attribute => "attribute",
            NodeKind::Text => "text",
            NodeKind::Comment => "comment",
            NodeKind::ProcessingInstruction => "processing-instruction",
            NodeKind::Namespace => "namespace",
        }
    }
}

/// Name of an element or attribute as it travels down a pipeline.
///
/// Parts are interned atoms: the same few names recur on every start tag of a
/// document, so equality checks reduce to pointer comparisons.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeName {
    pub prefix: DefaultAtom,
    pub uri: DefaultAtom,
    pub local: DefaultAtom,
}

impl NodeName {
    pub fn new(prefix: &str, uri: &str, local: &str) -> Self {
        Self { prefix: DefaultAtom::from(prefix), uri: DefaultAtom::from(uri), local: DefaultAtom::from(local) }
    }

    /// A name in no namespace.
    pub fn local(local: &str) -> Self {
        Self::new("", "", local)
    }

    pub fn has_uri(&self, uri: &str) -> bool {
        &*self.uri == uri
    }

    pub fn is(&self, uri: &str, local: &str) -> bool {
        &*self.uri == uri && &*self.local == local
    }

    pub fn namespace_binding(&self) -> NamespaceBinding {
        NamespaceBinding { prefix: self.prefix.clone(), uri: self.uri.clone() }
    }

    pub fn display_name(&self) -> String {
        if self.prefix.is_empty() { self.local.to_string() } else { format!("{}:{}", self.prefix, self.local) }
    }
}

impl fmt::Display for NodeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name())
    }
}

/// A prefix to URI binding. An empty URI with an empty prefix undeclares the
/// default namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamespaceBinding {
    pub prefix: DefaultAtom,
    pub uri: DefaultAtom,
}

impl NamespaceBinding {
    pub fn new(prefix: &str, uri: &str) -> Self {
        Self { prefix: DefaultAtom::from(prefix), uri: DefaultAtom::from(uri) }
    }

    pub fn is_default_undeclaration(&self) -> bool {
        self.prefix.is_empty() && self.uri.is_empty()
    }
}

impl fmt::Display for NamespaceBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.prefix.is_empty() {
            write!(f, "xmlns=\"{}\"", self.uri)
        } else {
            write!(f, "xmlns:{}=\"{}\"", self.prefix, self.uri)
        }
    }
}
