use super::config::PipelineConfiguration;
use super::receiver::{Receiver, ReceiverOptions};
use crate::error::Error;
use crate::location::Location;
use crate::model::{NamespaceBinding, NodeName};

/// Receiver that discards everything. Used to drive a pipeline for the side
/// effects of its stages alone.
#[derive(Debug, Default)]
pub struct Sink {
    config: PipelineConfiguration,
}

impl Sink {
    pub fn new(config: PipelineConfiguration) -> Self {
        Self { config }
    }
}

impl Receiver for Sink {
    fn set_pipeline_configuration(&mut self, config: PipelineConfiguration) {
        self.config = config;
    }

    fn pipeline_configuration(&self) -> &PipelineConfiguration {
        &self.config
    }

    fn open(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn start_document(&mut self, _properties: ReceiverOptions) -> Result<(), Error> {
        Ok(())
    }

    fn end_document(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn start_element(
        &mut self,
        _name: &NodeName,
        _type_annotation: Option<&NodeName>,
        _location: &Location,
        _properties: ReceiverOptions,
    ) -> Result<(), Error> {
        Ok(())
    }

    fn namespace(&mut self, _binding: &NamespaceBinding, _properties: ReceiverOptions) -> Result<(), Error> {
        Ok(())
    }

    fn attribute(
        &mut self,
        _name: &NodeName,
        _type_annotation: Option<&NodeName>,
        _value: &str,
        _location: &Location,
        _properties: ReceiverOptions,
    ) -> Result<(), Error> {
        Ok(())
    }

    fn start_content(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn end_element(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn characters(&mut self, _text: &str, _location: &Location, _properties: ReceiverOptions) -> Result<(), Error> {
        Ok(())
    }

    fn processing_instruction(
        &mut self,
        _target: &str,
        _data: &str,
        _location: &Location,
        _properties: ReceiverOptions,
    ) -> Result<(), Error> {
        Ok(())
    }

    fn comment(&mut self, _text: &str, _location: &Location, _properties: ReceiverOptions) -> Result<(), Error> {
        Ok(())
    }

    fn close(&mut self) -> Result<(), Error> {
        Ok(())
    }
}
