use super::config::PipelineConfiguration;
use super::pipeline::{Emitter, Filter};
use super::record::Event;
use crate::consts::XML_NS;
use crate::error::Error;
use crate::model::NodeName;

/// Element name pattern of an `xsl:strip-space` / `xsl:preserve-space` list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameTest {
    /// `*`
    Any,
    /// `prefix:*`
    Namespace(String),
    /// `*:local`
    Local(String),
    /// `prefix:local`
    Name { uri: String, local: String },
}

impl NameTest {
    pub fn name(uri: &str, local: &str) -> Self {
        NameTest::Name { uri: uri.to_string(), local: local.to_string() }
    }

    fn matches(&self, name: &NodeName) -> bool {
        match self {
            NameTest::Any => true,
            NameTest::Namespace(uri) => name.has_uri(uri),
            NameTest::Local(local) => &*name.local == local,
            NameTest::Name { uri, local } => name.is(uri, local),
        }
    }

    fn priority(&self) -> i8 {
        match self {
            NameTest::Any => -1,
            NameTest::Namespace(_) | NameTest::Local(_) => 0,
            NameTest::Name { .. } => 1,
        }
    }
}

/// Which whitespace-only text nodes to remove.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SpaceStrippingRule {
    #[default]
    None,
    All,
    /// The most specific matching test decides; on a tie, preserve wins.
    Selected { strip: Vec<NameTest>, preserve: Vec<NameTest> },
}

impl SpaceStrippingRule {
    pub fn strips(&self, element: &NodeName) -> bool {
        match self {
            SpaceStrippingRule::None => false,
            SpaceStrippingRule::All => true,
            SpaceStrippingRule::Selected { strip, preserve } => {
                let best = |tests: &[NameTest]| tests.iter().filter(|t| t.matches(element)).map(NameTest::priority).max();
                match (best(strip), best(preserve)) {
                    (Some(s), Some(p)) => s > p,
                    (Some(_), None) => true,
                    _ => false,
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    by_rule: bool,
    // Some(true) for xml:space="preserve", Some(false) for "default"
    xml_space: Option<bool>,
}

impl Frame {
    fn strips(&self) -> bool {
        match self.xml_space {
            Some(true) => false,
            _ => self.by_rule,
        }
    }
}

/// Drops whitespace-only text according to a [`SpaceStrippingRule`],
/// honouring `xml:space`.
///
/// Adjacent character events form one text node, so they are joined before
/// the whitespace test and passed on as a single event.
#[derive(Debug, Default)]
pub struct Stripper {
    rule: Option<SpaceStrippingRule>,
    active: SpaceStrippingRule,
    frames: Vec<Frame>,
    pending: Option<Event>,
}

impl Stripper {
    /// Strip with the rule from the pipeline's parse options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Strip with an explicit rule, ignoring the parse options.
    pub fn with_rule(rule: SpaceStrippingRule) -> Self {
        Self { active: rule.clone(), rule: Some(rule), frames: Vec::new(), pending: None }
    }

    fn flush(&mut self, out: &mut Emitter<'_>) -> Result<(), Error> {
        let Some(event) = self.pending.take() else {
            return Ok(());
        };
        if let Event::Characters { text, .. } = &event
            && is_xml_whitespace(text)
            && self.frames.last().is_some_and(Frame::strips)
        {
            return Ok(());
        }
        out.emit(event)
    }
}

fn is_xml_whitespace(text: &str) -> bool {
    text.chars().all(|c| matches!(c, ' ' | '\t' | '\r' | '\n'))
}

impl Filter for Stripper {
    fn name(&self) -> &'static str {
        "stripper"
    }

    fn set_pipeline_configuration(&mut self, config: &PipelineConfiguration) {
        if self.rule.is_none() {
            self.active = config.parse_options().strip_space.clone();
        }
    }

    fn handle(&mut self, event: Event, out: &mut Emitter<'_>) -> Result<(), Error> {
        if let Event::Characters { text, .. } = &event {
            if let Some(Event::Characters { text: buffered, .. }) = &mut self.pending {
                buffered.push_str(text);
            } else {
                self.pending = Some(event);
            }
            return Ok(());
        }
        self.flush(out)?;
        match &event {
            Event::StartElement { name, .. } => {
                let inherited = self.frames.last().and_then(|f| f.xml_space);
                self.frames.push(Frame { by_rule: self.active.strips(name), xml_space: inherited });
            }
            Event::Attribute { name, value, .. } if name.is(XML_NS, "space") => {
                if let Some(frame) = self.frames.last_mut() {
                    match value.trim() {
                        "preserve" => frame.xml_space = Some(true),
                        "default" => frame.xml_space = Some(false),
                        _ => {}
                    }
                }
            }
            Event::EndElement => {
                self.frames.pop();
            }
            _ => {}
        }
        out.emit(event)
    }
}
