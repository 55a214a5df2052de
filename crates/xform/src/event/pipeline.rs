use super::config::PipelineConfiguration;
use super::receiver::{Receiver, ReceiverOptions};
use super::record::Event;
use crate::error::Error;
use crate::location::Location;
use crate::model::{NamespaceBinding, NodeName};
use itertools::Itertools;

/// One stage of a [`Pipeline`].
///
/// A stage sees every event that reaches it and decides what the rest of the
/// pipeline sees: it may forward the event, forward something else in its
/// place, forward several events, or nothing at all.
pub trait Filter {
    /// Short name used in traces.
    fn name(&self) -> &'static str;

    /// Called once when the pipeline is assembled.
    fn set_pipeline_configuration(&mut self, _config: &PipelineConfiguration) {}

    fn handle(&mut self, event: Event, out: &mut Emitter<'_>) -> Result<(), Error>;

    /// Whether this stage, or anything after it, needs type annotations.
    fn uses_type_annotations(&self, downstream: bool) -> bool {
        downstream
    }
}

/// The remainder of a pipeline, as seen from one stage.
pub struct Emitter<'a> {
    rest: &'a mut [Box<dyn Filter>],
    terminal: &'a mut dyn Receiver,
}

impl<'a> Emitter<'a> {
    pub fn new(rest: &'a mut [Box<dyn Filter>], terminal: &'a mut dyn Receiver) -> Self {
        Self { rest, terminal }
    }

    /// Pass `event` to the next stage, or to the terminal receiver.
    pub fn emit(&mut self, event: Event) -> Result<(), Error> {
        match self.rest.split_first_mut() {
            Some((stage, rest)) => {
                let mut next = Emitter { rest, terminal: &mut *self.terminal };
                stage.handle(event, &mut next)
            }
            None => event.deliver(self.terminal),
        }
    }

    pub fn emit_all(&mut self, events: impl IntoIterator<Item = Event>) -> Result<(), Error> {
        events.into_iter().try_for_each(|e| self.emit(e))
    }

    pub fn pipeline_configuration(&self) -> &PipelineConfiguration {
        self.terminal.pipeline_configuration()
    }
}

/// An ordered list of filter stages in front of a terminal receiver.
///
/// The pipeline is itself a [`Receiver`]: every call is turned into an
/// [`Event`] and routed through the stages in order.
pub struct Pipeline<R: Receiver> {
    config: PipelineConfiguration,
    stages: Vec<Box<dyn Filter>>,
    terminal: R,
}

impl<R: Receiver> Pipeline<R> {
    pub fn builder(config: PipelineConfiguration) -> PipelineBuilder {
        PipelineBuilder::new(config)
    }

    pub fn send(&mut self, event: Event) -> Result<(), Error> {
        Emitter::new(&mut self.stages, &mut self.terminal).emit(event)
    }

    pub fn send_all(&mut self, events: impl IntoIterator<Item = Event>) -> Result<(), Error> {
        events.into_iter().try_for_each(|e| self.send(e))
    }

    pub fn terminal(&self) -> &R {
        &self.terminal
    }

    pub fn terminal_mut(&mut self) -> &mut R {
        &mut self.terminal
    }

    pub fn into_terminal(self) -> R {
        self.terminal
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }
}

impl<R: Receiver> Receiver for Pipeline<R> {
    fn set_pipeline_configuration(&mut self, config: PipelineConfiguration) {
        for stage in &mut self.stages {
            stage.set_pipeline_configuration(&config);
        }
        self.terminal.set_pipeline_configuration(config.clone());
        self.config = config;
    }

    fn pipeline_configuration(&self) -> &PipelineConfiguration {
        &self.config
    }

    fn open(&mut self) -> Result<(), Error> {
        self.send(Event::Open)
    }

    fn start_document(&mut self, properties: ReceiverOptions) -> Result<(), Error> {
        self.send(Event::StartDocument { properties })
    }

    fn end_document(&mut self) -> Result<(), Error> {
        self.send(Event::EndDocument)
    }

    fn start_element(
        &mut self,
        name: &NodeName,
        type_annotation: Option<&NodeName>,
        location: &Location,
        properties: ReceiverOptions,
    ) -> Result<(), Error> {
        self.send(Event::StartElement {
            name: name.clone(),
            type_annotation: type_annotation.cloned(),
            location: location.clone(),
            properties,
        })
    }

    fn namespace(&mut self, binding: &NamespaceBinding, properties: ReceiverOptions) -> Result<(), Error> {
        self.send(Event::Namespace { binding: binding.clone(), properties })
    }

    fn attribute(
        &mut self,
        name: &NodeName,
        type_annotation: Option<&NodeName>,
        value: &str,
        location: &Location,
        properties: ReceiverOptions,
    ) -> Result<(), Error> {
        self.send(Event::Attribute {
            name: name.clone(),
            type_annotation: type_annotation.cloned(),
            value: value.to_string(),
            location: location.clone(),
            properties,
        })
    }

    fn start_content(&mut self) -> Result<(), Error> {
        self.send(Event::StartContent)
    }

    fn end_element(&mut self) -> Result<(), Error> {
        self.send(Event::EndElement)
    }

    fn characters(&mut self, text: &str, location: &Location, properties: ReceiverOptions) -> Result<(), Error> {
        self.send(Event::Characters { text: text.to_string(), location: location.clone(), properties })
    }

    fn processing_instruction(
        &mut self,
        target: &str,
        data: &str,
        location: &Location,
        properties: ReceiverOptions,
    ) -> Result<(), Error> {
        self.send(Event::ProcessingInstruction {
            target: target.to_string(),
            data: data.to_string(),
            location: location.clone(),
            properties,
        })
    }

    fn comment(&mut self, text: &str, location: &Location, properties: ReceiverOptions) -> Result<(), Error> {
        self.send(Event::Comment { text: text.to_string(), location: location.clone(), properties })
    }

    fn close(&mut self) -> Result<(), Error> {
        self.send(Event::Close)
    }

    fn uses_type_annotations(&self) -> bool {
        self.stages.iter().rev().fold(self.terminal.uses_type_annotations(), |downstream, stage| {
            stage.uses_type_annotations(downstream)
        })
    }
}

/// Composes filter stages and a terminal receiver into a [`Pipeline`].
pub struct PipelineBuilder {
    config: PipelineConfiguration,
    stages: Vec<Box<dyn Filter>>,
}

impl PipelineBuilder {
    pub fn new(config: PipelineConfiguration) -> Self {
        Self { config, stages: Vec::new() }
    }

    /// Append a stage; events pass through stages in the order they were added.
    pub fn stage(mut self, filter: impl Filter + 'static) -> Self {
        self.stages.push(Box::new(filter));
        self
    }

    pub fn boxed_stage(mut self, filter: Box<dyn Filter>) -> Self {
        self.stages.push(filter);
        self
    }

    pub fn build<R: Receiver>(self, terminal: R) -> Pipeline<R> {
        tracing::debug!(
            stages = %self.stages.iter().map(|s| s.name()).join(" -> "),
            host_language = ?self.config.host_language(),
            "pipeline assembled"
        );
        let mut pipeline = Pipeline { config: self.config.clone(), stages: self.stages, terminal };
        pipeline.set_pipeline_configuration(self.config);
        pipeline
    }
}
