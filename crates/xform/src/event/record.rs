use super::config::PipelineConfiguration;
use super::receiver::{Receiver, ReceiverOptions};
use crate::error::Error;
use crate::location::Location;
use crate::model::{NamespaceBinding, NodeName};
use core::fmt;

/// One call of the [`Receiver`] protocol, as a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Open,
    StartDocument {
        properties: ReceiverOptions,
    },
    EndDocument,
    StartElement {
        name: NodeName,
        type_annotation: Option<NodeName>,
        location: Location,
        properties: ReceiverOptions,
    },
    Namespace {
        binding: NamespaceBinding,
        properties: ReceiverOptions,
    },
    Attribute {
        name: NodeName,
        type_annotation: Option<NodeName>,
        value: String,
        location: Location,
        properties: ReceiverOptions,
    },
    StartContent,
    EndElement,
    Characters {
        text: String,
        location: Location,
        properties: ReceiverOptions,
    },
    ProcessingInstruction {
        target: String,
        data: String,
        location: Location,
        properties: ReceiverOptions,
    },
    Comment {
        text: String,
        location: Location,
        properties: ReceiverOptions,
    },
    Close,
}

impl Event {
    pub fn start_element(name: NodeName) -> Self {
        Event::StartElement {
            name,
            type_annotation: None,
            location: Location::unknown(),
            properties: ReceiverOptions::empty(),
        }
    }

    pub fn attribute(name: NodeName, value: impl Into<String>) -> Self {
        Event::Attribute {
            name,
            type_annotation: None,
            value: value.into(),
            location: Location::unknown(),
            properties: ReceiverOptions::empty(),
        }
    }

    pub fn namespace(binding: NamespaceBinding) -> Self {
        Event::Namespace { binding, properties: ReceiverOptions::empty() }
    }

    pub fn characters(text: impl Into<String>) -> Self {
        Event::Characters { text: text.into(), location: Location::unknown(), properties: ReceiverOptions::empty() }
    }

    pub fn comment(text: impl Into<String>) -> Self {
        Event::Comment { text: text.into(), location: Location::unknown(), properties: ReceiverOptions::empty() }
    }

    pub fn processing_instruction(target: impl Into<String>, data: impl Into<String>) -> Self {
        Event::ProcessingInstruction {
            target: target.into(),
            data: data.into(),
            location: Location::unknown(),
            properties: ReceiverOptions::empty(),
        }
    }

    /// Replay this event against a receiver.
    pub fn deliver(&self, receiver: &mut dyn Receiver) -> Result<(), Error> {
        match self {
            Event::Open => receiver.open(),
            Event::StartDocument { properties } => receiver.start_document(*properties),
            Event::EndDocument => receiver.end_document(),
            Event::StartElement { name, type_annotation, location, properties } => {
                receiver.start_element(name, type_annotation.as_ref(), location, *properties)
            }
            Event::Namespace { binding, properties } => receiver.namespace(binding, *properties),
            Event::Attribute { name, type_annotation, value, location, properties } => {
                receiver.attribute(name, type_annotation.as_ref(), value, location, *properties)
            }
            Event::StartContent => receiver.start_content(),
            Event::EndElement => receiver.end_element(),
            Event::Characters { text, location, properties } => receiver.characters(text, location, *properties),
            Event::ProcessingInstruction { target, data, location, properties } => {
                receiver.processing_instruction(target, data, location, *properties)
            }
            Event::Comment { text, location, properties } => receiver.comment(text, location, *properties),
            Event::Close => receiver.close(),
        }
    }

    /// Location carried by the event, if any.
    pub fn location(&self) -> Option<&Location> {
        match self {
            Event::StartElement { location, .. }
            | Event::Attribute { location, .. }
            | Event::Characters { location, .. }
            | Event::ProcessingInstruction { location, .. }
            | Event::Comment { location, .. } => Some(location),
            _ => None,
        }
    }

    pub fn is_content(&self) -> bool {
        matches!(
            self,
            Event::StartElement { .. }
                | Event::Characters { .. }
                | Event::ProcessingInstruction { .. }
                | Event::Comment { .. }
        )
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Open => f.write_str("open"),
            Event::StartDocument { .. } => f.write_str("startDocument"),
            Event::EndDocument => f.write_str("endDocument"),
            Event::StartElement { name, .. } => write!(f, "startElement {name}"),
            Event::Namespace { binding, .. } => write!(f, "namespace {binding}"),
            Event::Attribute { name, value, .. } => write!(f, "attribute {name}=\"{value}\""),
            Event::StartContent => f.write_str("startContent"),
            Event::EndElement => f.write_str("endElement"),
            Event::Characters { text, .. } => write!(f, "characters {text:?}"),
            Event::ProcessingInstruction { target, data, .. } => write!(f, "processingInstruction {target} {data:?}"),
            Event::Comment { text, .. } => write!(f, "comment {text:?}"),
            Event::Close => f.write_str("close"),
        }
    }
}

/// Terminal receiver keeping every event it is sent, in order.
#[derive(Default)]
pub struct EventRecorder {
    config: PipelineConfiguration,
    events: Vec<Event>,
}

impl EventRecorder {
    pub fn new(config: PipelineConfiguration) -> Self {
        Self { config, events: Vec::new() }
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    /// Replay everything recorded so far into another receiver.
    pub fn replay(&self, receiver: &mut dyn Receiver) -> Result<(), Error> {
        self.events.iter().try_for_each(|e| e.deliver(receiver))
    }
}

impl Receiver for EventRecorder {
    fn set_pipeline_configuration(&mut self, config: PipelineConfiguration) {
        self.config = config;
    }
    fn pipeline_configuration(&self) -> &PipelineConfiguration {
        &self.config
    }
    fn open(&mut self) -> Result<(), Error> {
        self.events.push(Event::Open);
        Ok(())
    }
    fn start_document(&mut self, properties: ReceiverOptions) -> Result<(), Error> {
        self.events.push(Event::StartDocument { properties });
        Ok(())
    }
    fn end_document(&mut self) -> Result<(), Error> {
        self.events.push(Event::EndDocument);
        Ok(())
    }
    fn start_element(
        &mut self,
        name: &NodeName,
        type_annotation: Option<&NodeName>,
        location: &Location,
        properties: ReceiverOptions,
    ) -> Result<(), Error> {
        self.events.push(Event::StartElement {
            name: name.clone(),
            type_annotation: type_annotation.cloned(),
            location: location.clone(),
            properties,
        });
        Ok(())
    }
    fn namespace(&mut self, binding: &NamespaceBinding, properties: ReceiverOptions) -> Result<(), Error> {
        self.events.push(Event::Namespace { binding: binding.clone(), properties });
        Ok(())
    }
    fn attribute(
        &mut self,
        name: &NodeName,
        type_annotation: Option<&NodeName>,
        value: &str,
        location: &Location,
        properties: ReceiverOptions,
    ) -> Result<(), Error> {
        self.events.push(Event::Attribute {
            name: name.clone(),
            type_annotation: type_annotation.cloned(),
            value: value.to_string(),
            location: location.clone(),
            properties,
        });
        Ok(())
    }
    fn start_content(&mut self) -> Result<(), Error> {
        self.events.push(Event::StartContent);
        Ok(())
    }
    fn end_element(&mut self) -> Result<(), Error> {
        self.events.push(Event::EndElement);
        Ok(())
    }
    fn characters(&mut self, text: &str, location: &Location, properties: ReceiverOptions) -> Result<(), Error> {
        self.events.push(Event::Characters { text: text.to_string(), location: location.clone(), properties });
        Ok(())
    }
    fn processing_instruction(
        &mut self,
        target: &str,
        data: &str,
        location: &Location,
        properties: ReceiverOptions,
    ) -> Result<(), Error> {
        self.events.push(Event::ProcessingInstruction {
            target: target.to_string(),
            data: data.to_string(),
            location: location.clone(),
            properties,
        });
        Ok(())
    }
    fn comment(&mut self, text: &str, location: &Location, properties: ReceiverOptions) -> Result<(), Error> {
        self.events.push(Event::Comment { text: text.to_string(), location: location.clone(), properties });
        Ok(())
    }
    fn close(&mut self) -> Result<(), Error> {
        self.events.push(Event::Close);
        Ok(())
    }
    fn uses_type_annotations(&self) -> bool {
        true
    }
}
