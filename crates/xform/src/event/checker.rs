use super::config::PipelineConfiguration;
use super::pipeline::{Emitter, Filter};
use super::record::Event;
use crate::context::HostLanguage;
use crate::error::{Error, ErrorCategory, ErrorCode};
use crate::location::Location;
use crate::model::{NodeKind, NodeName};

#[derive(Debug, Clone)]
struct Frame {
    name: NodeName,
    location: Location,
    content_started: bool,
}

/// Tracks the nesting rules of an event stream.
///
/// Shared by [`ContentChecker`] and the tree builder. `check` must see every
/// event in order; it updates the state only for events it accepts.
#[derive(Debug, Default)]
pub struct NestingState {
    frames: Vec<Frame>,
    document_open: bool,
    closed: bool,
    last_start_tag: Option<Location>,
}

impl NestingState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Whether attributes and namespaces may currently be added.
    pub fn start_tag_open(&self) -> bool {
        self.frames.last().is_some_and(|f| !f.content_started)
    }

    pub fn check(&mut self, event: &Event, host: HostLanguage) -> Result<(), Error> {
        if self.closed {
            // a second close is accepted and ignored
            if matches!(event, Event::Close) {
                return Ok(());
            }
            return Err(Error::unbalanced(format!("{event} received after close")));
        }
        match event {
            Event::Open => Ok(()),
            Event::StartDocument { .. } => {
                if self.document_open || !self.frames.is_empty() {
                    return Err(self.structural("nested document nodes are not supported"));
                }
                self.document_open = true;
                Ok(())
            }
            Event::EndDocument => {
                if !self.document_open {
                    return Err(self.structural("endDocument without startDocument"));
                }
                if let Some(frame) = self.frames.last() {
                    return Err(self.structural(format!("endDocument while element {} is still open", frame.name)));
                }
                self.document_open = false;
                Ok(())
            }
            Event::StartElement { name, location, .. } => {
                self.require_content_allowed(event)?;
                self.last_start_tag = Some(location.clone());
                self.frames.push(Frame { name: name.clone(), location: location.clone(), content_started: false });
                Ok(())
            }
            Event::Namespace { binding, .. } => {
                if self.start_tag_open() {
                    Ok(())
                } else {
                    Err(self.no_open_start_tag(NodeKind::Namespace, &binding.prefix, host))
                }
            }
            Event::Attribute { name, .. } => {
                if self.start_tag_open() {
                    Ok(())
                } else {
                    Err(self.no_open_start_tag(NodeKind::Attribute, &name.display_name(), host))
                }
            }
            Event::StartContent => match self.frames.last_mut() {
                Some(frame) if !frame.content_started => {
                    frame.content_started = true;
                    Ok(())
                }
                Some(_) => Err(self.structural("startContent called twice for one element")),
                None => Err(self.structural("startContent without an open element")),
            },
            Event::EndElement => match self.frames.pop() {
                Some(_) => Ok(()),
                None => Err(self.structural("endElement without matching startElement")),
            },
            Event::Characters { .. } | Event::ProcessingInstruction { .. } | Event::Comment { .. } => {
                self.require_content_allowed(event)
            }
            Event::Close => {
                if let Some(frame) = self.frames.last() {
                    return Err(self.structural(format!("close while element {} is still open", frame.name)));
                }
                if self.document_open {
                    return Err(self.structural("close while the document is still open"));
                }
                self.closed = true;
                Ok(())
            }
        }
    }

    fn require_content_allowed(&self, event: &Event) -> Result<(), Error> {
        match self.frames.last() {
            Some(frame) if !frame.content_started => {
                Err(self.structural(format!("{event} before startContent of element {}", frame.name)))
            }
            _ => Ok(()),
        }
    }

    fn structural(&self, msg: impl Into<String>) -> Error {
        let err = Error::unbalanced(msg);
        match &self.last_start_tag {
            Some(loc) => err.with_location(loc.clone()),
            None => err,
        }
    }

    /// The attribute or namespace arrived after the element's children started,
    /// or there is no element at all.
    fn no_open_start_tag(&self, kind: NodeKind, name: &str, host: HostLanguage) -> Error {
        let xslt = host == HostLanguage::Xslt;
        let (code, message) = match self.frames.last() {
            Some(frame) => (
                if xslt { ErrorCode::XTDE0410 } else { ErrorCode::XQTY0024 },
                format!(
                    "Cannot create {} node ({name}) after creating children of the containing element {}",
                    article(kind),
                    frame.name
                ),
            ),
            None => (
                if xslt { ErrorCode::XTDE0420 } else { ErrorCode::XPTY0004 },
                format!("Cannot create {} node ({name}) whose parent is a document node", article(kind)),
            ),
        };
        let err = Error::from_code(code, message).with_category(ErrorCategory::StructuralPipeline);
        match self.frames.last().map(|f| &f.location).or(self.last_start_tag.as_ref()) {
            Some(loc) => err.with_location(loc.clone()),
            None => err,
        }
    }
}

fn article(kind: NodeKind) -> String {
    match kind {
        NodeKind::Attribute => "an attribute".to_string(),
        other => format!("a {}", other.describe()),
    }
}

/// Pass-through stage enforcing the nesting rules of the event stream.
#[derive(Debug, Default)]
pub struct ContentChecker {
    state: NestingState,
    host: HostLanguage,
}

impl ContentChecker {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Filter for ContentChecker {
    fn name(&self) -> &'static str {
        "content-checker"
    }

    fn set_pipeline_configuration(&mut self, config: &PipelineConfiguration) {
        self.host = config.host_language();
    }

    fn handle(&mut self, event: Event, out: &mut Emitter<'_>) -> Result<(), Error> {
        self.state.check(&event, self.host)?;
        out.emit(event)
    }
}
