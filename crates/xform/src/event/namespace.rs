use super::pipeline::{Emitter, Filter};
use super::receiver::ReceiverOptions;
use super::record::Event;
use crate::error::Error;
use crate::model::{NamespaceBinding, NodeName};

/// Removes redundant namespace declarations and adds missing ones.
///
/// A declaration is dropped when an identical binding is already in scope.
/// Bindings needed by the element name and by attribute names are declared
/// if no ancestor declares them; an unprefixed element in no namespace under
/// a non-empty default namespace gets a default undeclaration. An attribute
/// whose prefix is already bound to a different URI on the same element is
/// renamed to a fresh prefix.
#[derive(Debug, Default)]
pub struct NamespaceReducer {
    bindings: Vec<NamespaceBinding>,
    // number of bindings declared by each open element
    counts: Vec<usize>,
}

impl NamespaceReducer {
    pub fn new() -> Self {
        Self::default()
    }

    fn in_scope(&self, prefix: &str) -> Option<&NamespaceBinding> {
        self.bindings.iter().rev().find(|b| &*b.prefix == prefix)
    }

    fn is_needed(&self, binding: &NamespaceBinding) -> bool {
        if &*binding.prefix == "xml" {
            return false;
        }
        match self.in_scope(&binding.prefix) {
            Some(existing) => existing.uri != binding.uri,
            // An undeclaration is only needed if some default namespace is in scope.
            None => !binding.is_default_undeclaration(),
        }
    }

    /// Bindings declared by the element whose start tag is open.
    fn declared_here(&self) -> &[NamespaceBinding] {
        let n = self.counts.last().copied().unwrap_or(0);
        &self.bindings[self.bindings.len() - n..]
    }

    fn declare(&mut self, binding: NamespaceBinding, properties: ReceiverOptions, out: &mut Emitter<'_>) -> Result<(), Error> {
        if !self.is_needed(&binding) {
            return Ok(());
        }
        if self.declared_here().iter().any(|b| b.prefix == binding.prefix) {
            // the first binding of a prefix on an element wins
            tracing::debug!(binding = %binding, "conflicting namespace declaration dropped");
            return Ok(());
        }
        self.bindings.push(binding.clone());
        if let Some(count) = self.counts.last_mut() {
            *count += 1;
        }
        out.emit(Event::Namespace { binding, properties })
    }

    fn substitute_prefix(&self, name: &NodeName) -> NodeName {
        let mut n = 1;
        loop {
            let candidate = format!("{}_{n}", name.prefix);
            match self.in_scope(&candidate) {
                Some(b) if b.uri != name.uri => n += 1,
                _ => return NodeName::new(&candidate, &name.uri, &name.local),
            }
        }
    }
}

impl Filter for NamespaceReducer {
    fn name(&self) -> &'static str {
        "namespace-reducer"
    }

    fn handle(&mut self, event: Event, out: &mut Emitter<'_>) -> Result<(), Error> {
        match event {
            Event::StartElement { ref name, .. } => {
                let binding = name.namespace_binding();
                self.counts.push(0);
                out.emit(event)?;
                self.declare(binding, ReceiverOptions::empty(), out)
            }
            Event::Namespace { binding, properties } => self.declare(binding, properties, out),
            Event::Attribute { name, type_annotation, value, location, properties } => {
                let name = if name.prefix.is_empty() {
                    name
                } else if self.declared_here().iter().any(|b| b.prefix == name.prefix && b.uri != name.uri) {
                    self.substitute_prefix(&name)
                } else {
                    name
                };
                if !name.prefix.is_empty() {
                    self.declare(name.namespace_binding(), ReceiverOptions::empty(), out)?;
                }
                out.emit(Event::Attribute { name, type_annotation, value, location, properties })
            }
            Event::EndElement => {
                if let Some(n) = self.counts.pop() {
                    self.bindings.truncate(self.bindings.len().saturating_sub(n));
                }
                out.emit(event)
            }
            other => out.emit(other),
        }
    }
}
