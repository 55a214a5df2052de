use super::config::PipelineConfiguration;
use crate::error::Error;
use crate::location::Location;
use crate::model::{NamespaceBinding, NodeName};
use bitflags::bitflags;

bitflags! {
    /// Per-event property bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ReceiverOptions: u32 {
        /// Text or attribute value must be written without escaping.
        const DISABLE_ESCAPING = 1;
        /// The value is known to contain no characters needing escaping.
        const NO_SPECIAL_CHARS = 1 << 1;
        /// A second attribute with the same name is an error rather than a replacement.
        const REJECT_DUPLICATES = 1 << 2;
        /// The namespace binding is known to be needed and consistent.
        const NAMESPACE_OK = 1 << 3;
        /// The message being written terminates the run.
        const TERMINATE = 1 << 4;
        /// The element is known to have children.
        const HAS_CHILDREN = 1 << 5;
    }
}

/// Push consumer of tree-construction events.
///
/// Calls must respect the nesting rules of the event stream: `start_element`
/// and `end_element` balance, `namespace` and `attribute` arrive only between
/// `start_element` and `start_content`, and content arrives only after
/// `start_content`. Receivers that check these rules raise structural errors;
/// the others may assume them.
pub trait Receiver {
    fn set_pipeline_configuration(&mut self, config: PipelineConfiguration);

    fn pipeline_configuration(&self) -> &PipelineConfiguration;

    fn open(&mut self) -> Result<(), Error>;

    fn start_document(&mut self, properties: ReceiverOptions) -> Result<(), Error>;

    fn end_document(&mut self) -> Result<(), Error>;

    fn start_element(
        &mut self,
        name: &NodeName,
        type_annotation: Option<&NodeName>,
        location: &Location,
        properties: ReceiverOptions,
    ) -> Result<(), Error>;

    fn namespace(&mut self, binding: &NamespaceBinding, properties: ReceiverOptions) -> Result<(), Error>;

    fn attribute(
        &mut self,
        name: &NodeName,
        type_annotation: Option<&NodeName>,
        value: &str,
        location: &Location,
        properties: ReceiverOptions,
    ) -> Result<(), Error>;

    fn start_content(&mut self) -> Result<(), Error>;

    fn end_element(&mut self) -> Result<(), Error>;

    fn characters(&mut self, text: &str, location: &Location, properties: ReceiverOptions) -> Result<(), Error>;

    fn processing_instruction(
        &mut self,
        target: &str,
        data: &str,
        location: &Location,
        properties: ReceiverOptions,
    ) -> Result<(), Error>;

    fn comment(&mut self, text: &str, location: &Location, properties: ReceiverOptions) -> Result<(), Error>;

    /// No events are accepted after `close`; closing twice is harmless.
    fn close(&mut self) -> Result<(), Error>;

    /// Whether this receiver looks at type annotations. Upstream stages may
    /// skip computing them when it does not.
    fn uses_type_annotations(&self) -> bool {
        false
    }
}

impl<R: Receiver + ?Sized> Receiver for Box<R> {
    fn set_pipeline_configuration(&mut self, config: PipelineConfiguration) {
        (**self).set_pipeline_configuration(config)
    }
    fn pipeline_configuration(&self) -> &PipelineConfiguration {
        (**self).pipeline_configuration()
    }
    fn open(&mut self) -> Result<(), Error> {
        (**self).open()
    }
    fn start_document(&mut self, properties: ReceiverOptions) -> Result<(), Error> {
        (**self).start_document(properties)
    }
    fn end_document(&mut self) -> Result<(), Error> {
        (**self).end_document()
    }
    fn start_element(
        &mut self,
        name: &NodeName,
        type_annotation: Option<&NodeName>,
        location: &Location,
        properties: ReceiverOptions,
    ) -> Result<(), Error> {
        (**self).start_element(name, type_annotation, location, properties)
    }
    fn namespace(&mut self, binding: &NamespaceBinding, properties: ReceiverOptions) -> Result<(), Error> {
        (**self).namespace(binding, properties)
    }
    fn attribute(
        &mut self,
        name: &NodeName,
        type_annotation: Option<&NodeName>,
        value: &str,
        location: &Location,
        properties: ReceiverOptions,
    ) -> Result<(), Error> {
        (**self).attribute(name, type_annotation, value, location, properties)
    }
    fn start_content(&mut self) -> Result<(), Error> {
        (**self).start_content()
    }
    fn end_element(&mut self) -> Result<(), Error> {
        (**self).end_element()
    }
    fn characters(&mut self, text: &str, location: &Location, properties: ReceiverOptions) -> Result<(), Error> {
        (**self).characters(text, location, properties)
    }
    fn processing_instruction(
        &mut self,
        target: &str,
        data: &str,
        location: &Location,
        properties: ReceiverOptions,
    ) -> Result<(), Error> {
        (**self).processing_instruction(target, data, location, properties)
    }
    fn comment(&mut self, text: &str, location: &Location, properties: ReceiverOptions) -> Result<(), Error> {
        (**self).comment(text, location, properties)
    }
    fn close(&mut self) -> Result<(), Error> {
        (**self).close()
    }
    fn uses_type_annotations(&self) -> bool {
        (**self).uses_type_annotations()
    }
}
