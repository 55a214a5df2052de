use super::checker::NestingState;
use super::config::PipelineConfiguration;
use super::receiver::{Receiver, ReceiverOptions};
use super::record::Event;
use crate::error::{Error, ErrorCode};
use crate::location::Location;
use crate::model::{NamespaceBinding, NodeKind, NodeName};
use crate::tree::Node;

/// Terminal receiver that materializes the event stream as a [`Node`] tree.
///
/// Adjacent text events are merged into one text node. An attribute that
/// repeats a name already present on the element replaces it, unless the
/// event carries [`ReceiverOptions::REJECT_DUPLICATES`].
#[derive(Debug, Default)]
pub struct TreeBuilder {
    config: PipelineConfiguration,
    state: NestingState,
    stack: Vec<Node>,
    roots: Vec<Node>,
    pending_text: String,
}

impl TreeBuilder {
    pub fn new(config: PipelineConfiguration) -> Self {
        Self { config, ..Default::default() }
    }

    /// The document node, or the first parentless node when no document was
    /// started.
    pub fn document(&self) -> Option<Node> {
        self.roots.first().cloned()
    }

    /// Every parentless node built so far, in order.
    pub fn roots(&self) -> &[Node] {
        &self.roots
    }

    fn flush_text(&mut self) {
        if self.pending_text.is_empty() {
            return;
        }
        let text = Node::new(NodeKind::Text, None, Some(std::mem::take(&mut self.pending_text)));
        self.attach(text);
    }

    fn attach(&mut self, node: Node) {
        match self.stack.last() {
            Some(parent) => parent.append_child(&node),
            None => self.roots.push(node),
        }
    }

    fn apply(&mut self, event: Event) -> Result<(), Error> {
        self.state.check(&event, self.config.host_language())?;
        if !matches!(event, Event::Characters { .. }) {
            self.flush_text();
        }
        match event {
            Event::Open | Event::StartContent | Event::Close => {}
            Event::StartDocument { .. } => {
                let doc = Node::new(NodeKind::Document, None, None);
                self.attach(doc.clone());
                self.stack.push(doc);
            }
            Event::EndDocument | Event::EndElement => {
                self.stack.pop();
            }
            Event::StartElement { name, .. } => {
                let element = Node::new(NodeKind::Element, Some(name), None);
                self.attach(element.clone());
                self.stack.push(element);
            }
            Event::Namespace { binding, .. } => {
                if let Some(element) = self.stack.last() {
                    element.append_namespace(binding);
                }
            }
            Event::Attribute { name, value, location, properties, .. } => {
                if let Some(element) = self.stack.last() {
                    if properties.contains(ReceiverOptions::REJECT_DUPLICATES) && element.has_attribute(&name) {
                        return Err(Error::from_code(
                            ErrorCode::XQDY0025,
                            format!("Cannot create an element having two attributes with the same name: {name}"),
                        )
                        .with_location(location));
                    }
                    let attr = Node::new(NodeKind::Attribute, Some(name), Some(value));
                    if element.set_attribute(&attr) {
                        tracing::trace!(attribute = ?attr.name(), "duplicate attribute replaced");
                    }
                }
            }
            Event::Characters { text, .. } => self.pending_text.push_str(&text),
            Event::ProcessingInstruction { target, data, .. } => {
                self.attach(Node::new(NodeKind::ProcessingInstruction, Some(NodeName::local(&target)), Some(data)));
            }
            Event::Comment { text, .. } => self.attach(Node::new(NodeKind::Comment, None, Some(text))),
        }
        Ok(())
    }
}

impl Receiver for TreeBuilder {
    fn set_pipeline_configuration(&mut self, config: PipelineConfiguration) {
        self.config = config;
    }

    fn pipeline_configuration(&self) -> &PipelineConfiguration {
        &self.config
    }

    fn open(&mut self) -> Result<(), Error> {
        self.apply(Event::Open)
    }

    fn start_document(&mut self, properties: ReceiverOptions) -> Result<(), Error> {
        self.apply(Event::StartDocument { properties })
    }

    fn end_document(&mut self) -> Result<(), Error> {
        self.apply(Event::EndDocument)
    }

    fn start_element(
        &mut self,
        name: &NodeName,
        type_annotation: Option<&NodeName>,
        location: &Location,
        properties: ReceiverOptions,
    ) -> Result<(), Error> {
        self.apply(Event::StartElement {
            name: name.clone(),
            type_annotation: type_annotation.cloned(),
            location: location.clone(),
            properties,
        })
    }

    fn namespace(&mut self, binding: &NamespaceBinding, properties: ReceiverOptions) -> Result<(), Error> {
        self.apply(Event::Namespace { binding: binding.clone(), properties })
    }

    fn attribute(
        &mut self,
        name: &NodeName,
        type_annotation: Option<&NodeName>,
        value: &str,
        location: &Location,
        properties: ReceiverOptions,
    ) -> Result<(), Error> {
        self.apply(Event::Attribute {
            name: name.clone(),
            type_annotation: type_annotation.cloned(),
            value: value.to_string(),
            location: location.clone(),
            properties,
        })
    }

    fn start_content(&mut self) -> Result<(), Error> {
        self.apply(Event::StartContent)
    }

    fn end_element(&mut self) -> Result<(), Error> {
        self.apply(Event::EndElement)
    }

    fn characters(&mut self, text: &str, location: &Location, properties: ReceiverOptions) -> Result<(), Error> {
        self.apply(Event::Characters { text: text.to_string(), location: location.clone(), properties })
    }

    fn processing_instruction(
        &mut self,
        target: &str,
        data: &str,
        location: &Location,
        properties: ReceiverOptions,
    ) -> Result<(), Error> {
        self.apply(Event::ProcessingInstruction {
            target: target.to_string(),
            data: data.to_string(),
            location: location.clone(),
            properties,
        })
    }

    fn comment(&mut self, text: &str, location: &Location, properties: ReceiverOptions) -> Result<(), Error> {
        self.apply(Event::Comment { text: text.to_string(), location: location.clone(), properties })
    }

    fn close(&mut self) -> Result<(), Error> {
        self.apply(Event::Close)
    }
}
