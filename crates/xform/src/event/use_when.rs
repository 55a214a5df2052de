use super::config::{PipelineConfiguration, Severity};
use super::pipeline::{Emitter, Filter};
use super::receiver::ReceiverOptions;
use super::record::Event;
use crate::consts::{XML_NS, XSLT_NS};
use crate::error::{Error, ErrorCode};
use crate::location::Location;
use crate::model::{NamespaceBinding, NodeName};
use crate::xdm::{AtomicValue, ExpandedName, Item, Sequence};
use core::str::FromStr;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::collections::HashMap;
use url::Url;

/// What a `use-when` guard can see of the element carrying it.
#[derive(Debug)]
pub struct GuardContext<'a> {
    pub element: &'a NodeName,
    pub attributes: &'a [(NodeName, String)],
    /// Bindings in scope, innermost first.
    pub namespaces: &'a [NamespaceBinding],
    /// Nearest `xpath-default-namespace` in scope.
    pub default_element_namespace: Option<&'a str>,
    pub base_uri: Option<&'a Url>,
    pub location: &'a Location,
    /// Static variables and parameters declared so far, in declaration order.
    pub static_variables: &'a [(ExpandedName, Sequence)],
}

impl<'a> GuardContext<'a> {
    pub fn static_variable(&self, name: &ExpandedName) -> Option<&'a Sequence> {
        self.static_variables.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}

/// Evaluates the expressions found during the use-when pass.
pub trait GuardEvaluator: Send + Sync {
    /// Effective boolean value of a `use-when` expression.
    fn evaluate(&self, expression: &str, ctx: &GuardContext<'_>) -> Result<bool, Error>;

    /// Value of a static `select` expression or of one `{...}` part of a
    /// shadow attribute. Evaluators that only know effective boolean values
    /// yield them as a single `xs:boolean`.
    fn evaluate_static(&self, expression: &str, ctx: &GuardContext<'_>) -> Result<Sequence, Error> {
        Ok(vec![Item::Atomic(AtomicValue::Boolean(self.evaluate(expression, ctx)?))])
    }
}

impl<F> GuardEvaluator for F
where
    F: Fn(&str, &GuardContext<'_>) -> Result<bool, Error> + Send + Sync,
{
    fn evaluate(&self, expression: &str, ctx: &GuardContext<'_>) -> Result<bool, Error> {
        self(expression, ctx)
    }
}

#[derive(Debug)]
struct StartTag {
    name: NodeName,
    type_annotation: Option<NodeName>,
    location: Location,
    properties: ReceiverOptions,
    namespaces: Vec<(NamespaceBinding, ReceiverOptions)>,
    attributes: Vec<Event>,
}

impl StartTag {
    fn attribute(&self, uri: &str, local: &str) -> Option<&str> {
        self.attributes.iter().find_map(|a| match a {
            Event::Attribute { name, value, .. } if name.is(uri, local) => Some(value.as_str()),
            _ => None,
        })
    }

    fn attribute_pairs(&self) -> Vec<(NodeName, String)> {
        self.attributes
            .iter()
            .filter_map(|a| match a {
                Event::Attribute { name, value, .. } => Some((name.clone(), value.clone())),
                _ => None,
            })
            .collect()
    }
}

fn is_yes(value: Option<&str>) -> bool {
    matches!(value.map(str::trim), Some("yes" | "true" | "1"))
}

/// Byte offset of the `}` closing an expression, skipping string literals.
fn closing_brace(expr: &str) -> Option<usize> {
    let mut quote = None;
    for (i, c) in expr.char_indices() {
        match (quote, c) {
            (Some(q), _) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '}') => return Some(i),
            _ => {}
        }
    }
    None
}

/// Removes stylesheet elements whose `use-when` guard is false.
///
/// Each start tag is held back until `start_content`, so the guard can see
/// all of the element's attributes. A false guard opens a hole: the element
/// and everything inside it are swallowed. On the outermost
/// `xsl:stylesheet`, `xsl:transform` or `xsl:package` element a false guard
/// keeps the element but empties it. Comments and processing instructions
/// are always dropped.
///
/// For XSLT 3.0 the filter also expands shadow attributes (`_name`) and
/// evaluates top-level static variables and parameters, whose values are
/// visible to every later guard.
pub struct UseWhenFilter {
    evaluator: Box<dyn GuardEvaluator>,
    config: Option<PipelineConfiguration>,
    system_id: Option<String>,
    pending: Option<StartTag>,
    depth_of_hole: usize,
    empty_stylesheet_element: bool,
    default_namespace_stack: Vec<Option<String>>,
    namespace_stack: Vec<Vec<NamespaceBinding>>,
    system_id_stack: Vec<Option<String>>,
    base_uri_stack: Vec<Option<Url>>,
    /// Requested XSLT version times ten; `None` until a version is seen.
    processor_version: Option<u32>,
    static_params: HashMap<ExpandedName, Sequence>,
    static_variables: Vec<(ExpandedName, Sequence)>,
}

impl core::fmt::Debug for UseWhenFilter {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("UseWhenFilter")
            .field("system_id", &self.system_id)
            .field("depth_of_hole", &self.depth_of_hole)
            .field("empty_stylesheet_element", &self.empty_stylesheet_element)
            .field("processor_version", &self.processor_version)
            .field("static_variables", &self.static_variables)
            .finish_non_exhaustive()
    }
}

impl UseWhenFilter {
    pub fn new(evaluator: impl GuardEvaluator + 'static) -> Self {
        Self {
            evaluator: Box::new(evaluator),
            config: None,
            system_id: None,
            pending: None,
            depth_of_hole: 0,
            empty_stylesheet_element: false,
            default_namespace_stack: Vec::new(),
            namespace_stack: Vec::new(),
            system_id_stack: Vec::new(),
            base_uri_stack: Vec::new(),
            processor_version: None,
            static_params: HashMap::new(),
            static_variables: Vec::new(),
        }
    }

    /// System id of the stylesheet module; the initial base URI.
    pub fn with_system_id(mut self, system_id: impl Into<String>) -> Self {
        self.system_id = Some(system_id.into());
        self
    }

    /// Fix the XSLT version (times ten, so `30` is 3.0) instead of taking it
    /// from the stylesheet's `version` attribute.
    pub fn with_processor_version(mut self, version: u32) -> Self {
        self.processor_version = Some(version);
        self
    }

    /// Value supplied for a static parameter. It wins over the parameter's
    /// `select` expression.
    pub fn with_static_param(mut self, name: ExpandedName, value: Sequence) -> Self {
        self.static_params.insert(name, value);
        self
    }

    pub fn depth_of_hole(&self) -> usize {
        self.depth_of_hole
    }

    pub fn processor_version(&self) -> Option<u32> {
        self.processor_version
    }

    pub fn static_variables(&self) -> &[(ExpandedName, Sequence)] {
        &self.static_variables
    }

    fn default_element_namespace(&self) -> Option<&str> {
        self.default_namespace_stack.iter().rev().find_map(|ns| ns.as_deref())
    }

    fn guard_context<'a>(
        &'a self,
        tag: &'a StartTag,
        attributes: &'a [(NodeName, String)],
        base_uri: Option<&'a Url>,
    ) -> GuardContext<'a> {
        GuardContext {
            element: &tag.name,
            attributes,
            namespaces: self.namespace_stack.last().map(Vec::as_slice).unwrap_or_default(),
            default_element_namespace: self.default_element_namespace(),
            base_uri,
            location: &tag.location,
            static_variables: &self.static_variables,
        }
    }

    fn compute_base_uri(&self, tag: &StartTag) -> Result<Option<Url>, Error> {
        let system_id = tag.location.system_id.as_deref().map(str::to_string).or_else(|| self.system_id.clone());
        let same_entity = system_id == self.system_id_stack.last().cloned().flatten();
        let entity_base = || -> Result<Option<Url>, Error> {
            if same_entity {
                Ok(self.base_uri_stack.last().cloned().flatten())
            } else {
                match &system_id {
                    Some(sys) => Url::parse(sys)
                        .map(Some)
                        .map_err(|e| Error::from(e).with_location(tag.location.clone())),
                    None => Ok(None),
                }
            }
        };
        match tag.attribute(XML_NS, "base") {
            Some(href) => match entity_base()? {
                Some(base) => Ok(Some(base.join(href)?)),
                None => match Url::parse(href) {
                    Ok(url) => Ok(Some(url)),
                    Err(url::ParseError::RelativeUrlWithoutBase) => Ok(None),
                    Err(e) => Err(e.into()),
                },
            },
            None => entity_base(),
        }
    }

    fn report(&self, err: &Error) {
        if let Some(config) = &self.config {
            config.error_reporter().report(err, Severity::Fatal);
        }
    }

    /// Located, reported error raised by this filter.
    fn fail(&self, code: ErrorCode, message: String, location: &Location) -> Error {
        let err = Error::from_code(code, message).with_location(location.clone());
        self.report(&err);
        err
    }

    /// Re-raise an evaluator error with a prefix naming what was evaluated.
    fn wrap(&self, e: Error, what: &str, location: &Location) -> Error {
        let mut err = Error::new_qname(e.code.clone(), format!("Error in {what}. {}", e.message))
            .with_category(e.category)
            .with_location(location.clone());
        err.source = e.source.clone();
        self.report(&err);
        err
    }

    /// Expand an attribute value template, evaluating each `{...}` part.
    fn expand_template(&self, template: &str, ctx: &GuardContext<'_>) -> Result<String, Error> {
        let unmatched = || {
            Error::from_code(ErrorCode::XTSE0350, format!("Unmatched brace in attribute value template '{template}'"))
        };
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(i) = rest.find(['{', '}']) {
            out.push_str(&rest[..i]);
            let tail = &rest[i..];
            if let Some(after) = tail.strip_prefix("{{") {
                out.push('{');
                rest = after;
            } else if let Some(after) = tail.strip_prefix("}}") {
                out.push('}');
                rest = after;
            } else if tail.starts_with('}') {
                return Err(unmatched());
            } else {
                let body = &tail[1..];
                let end = closing_brace(body).ok_or_else(unmatched)?;
                let value = self.evaluator.evaluate_static(&body[..end], ctx)?;
                let parts: Vec<String> = value.iter().map(Item::string_value).collect();
                out.push_str(&parts.join(" "));
                rest = &body[end + 1..];
            }
        }
        out.push_str(rest);
        Ok(out)
    }

    /// Replace each `_name` attribute by `name`, with its value template
    /// expanded. An existing `name` attribute is overwritten.
    fn expand_shadow_attributes(&mut self, tag: &mut StartTag, base_uri: Option<&Url>) -> Result<(), Error> {
        let shadows: Vec<(usize, String, String)> = tag
            .attributes
            .iter()
            .enumerate()
            .filter_map(|(i, a)| match a {
                Event::Attribute { name, value, .. } if name.uri.is_empty() => name
                    .local
                    .strip_prefix('_')
                    .filter(|plain| !plain.is_empty())
                    .map(|plain| (i, plain.to_string(), value.clone())),
                _ => None,
            })
            .collect();
        if shadows.is_empty() {
            return Ok(());
        }
        // a shadow attribute asks for a 3.0 processor
        self.processor_version.get_or_insert(30);

        let mut expanded = Vec::with_capacity(shadows.len());
        {
            let attributes = tag.attribute_pairs();
            let ctx = self.guard_context(tag, &attributes, base_uri);
            for (i, plain, template) in shadows {
                let value = self
                    .expand_template(&template, &ctx)
                    .map_err(|e| self.wrap(e, &format!("shadow attribute _{plain}"), &tag.location))?;
                expanded.push((i, plain, value));
            }
        }

        let mut dropped = Vec::new();
        for (i, plain, new_value) in expanded {
            let target = tag.attributes.iter().position(|a| {
                matches!(a, Event::Attribute { name, .. } if name.uri.is_empty() && &*name.local == plain)
            });
            let index = match target {
                Some(j) => {
                    dropped.push(i);
                    j
                }
                None => i,
            };
            if let Some(Event::Attribute { name, value, .. }) = tag.attributes.get_mut(index) {
                *name = NodeName::local(&plain);
                *value = new_value;
            }
            tracing::trace!(element = %tag.name, attribute = %plain, "shadow attribute expanded");
        }
        dropped.sort_unstable_by(|a, b| b.cmp(a));
        for i in dropped {
            tag.attributes.remove(i);
        }
        Ok(())
    }

    /// Take the XSLT version from `version` on the stylesheet element, or
    /// from `xsl:version` on a literal result element used as a stylesheet.
    fn process_version(&mut self, tag: &StartTag, is_stylesheet_element: bool) -> Result<(), Error> {
        let version = if is_stylesheet_element { tag.attribute("", "version") } else { tag.attribute(XSLT_NS, "version") };
        let Some(version) = version else {
            return Ok(());
        };
        let tenths = Decimal::from_str(version.trim())
            .ok()
            .filter(|d| !d.is_sign_negative())
            .and_then(|d| (d * Decimal::TEN).trunc().to_u32());
        match tenths {
            Some(v) => {
                tracing::debug!(version = v, "stylesheet version");
                self.processor_version = Some(v);
                Ok(())
            }
            None => Err(self.fail(ErrorCode::XTSE0110, format!("Invalid version number: {version}"), &tag.location)),
        }
    }

    /// Resolve a lexical QName against the namespaces in scope. An unprefixed
    /// variable name is in no namespace.
    fn variable_name(&self, lexical: &str, location: &Location) -> Result<ExpandedName, Error> {
        let lexical = lexical.trim();
        let (prefix, local) = lexical.split_once(':').unwrap_or(("", lexical));
        if local.is_empty() || local.contains(':') {
            return Err(self.fail(ErrorCode::XTSE0020, format!("Invalid variable name: {lexical}"), location));
        }
        if prefix.is_empty() {
            return Ok(ExpandedName::local(local));
        }
        let in_scope = self.namespace_stack.last().map(Vec::as_slice).unwrap_or_default();
        match in_scope.iter().find(|b| &*b.prefix == prefix) {
            Some(binding) => Ok(ExpandedName::new(Some(binding.uri.to_string()), local)),
            None => Err(self.fail(
                ErrorCode::XTSE0280,
                format!("Invalid variable name: {lexical}. Namespace prefix {prefix} has not been declared"),
                location,
            )),
        }
    }

    /// Evaluate and record a top-level `xsl:variable` or `xsl:param` marked
    /// `static="yes"`.
    fn declare_static(&mut self, tag: &StartTag, base_uri: Option<&Url>) -> Result<(), Error> {
        let kind = &*tag.name.local;
        let is_param = kind == "param";
        if !(is_param || kind == "variable") || self.default_namespace_stack.len() != 2 {
            return Ok(());
        }
        if !is_yes(tag.attribute("", "static")) {
            return Ok(());
        }
        let name = self.variable_name(tag.attribute("", "name").unwrap_or_default(), &tag.location)?;
        let supplied = if is_param { self.static_params.get(&name).cloned() } else { None };
        if is_param && supplied.is_none() && is_yes(tag.attribute("", "required")) {
            return Err(self.fail(
                ErrorCode::XTDE0050,
                format!("No value was supplied for the required static parameter ${name}"),
                &tag.location,
            ));
        }
        let value = match (supplied, tag.attribute("", "select")) {
            (Some(value), _) => value,
            (None, Some(select)) => {
                let attributes = tag.attribute_pairs();
                let ctx = self.guard_context(tag, &attributes, base_uri);
                self.evaluator
                    .evaluate_static(select, &ctx)
                    .map_err(|e| self.wrap(e, &format!("{kind} expression"), &tag.location))?
            }
            (None, None) if !is_param => {
                return Err(self.fail(
                    ErrorCode::XTSE0010,
                    "The select attribute is required for a static global variable".to_string(),
                    &tag.location,
                ));
            }
            (None, None) if tag.attribute("", "as").is_some() => Vec::new(),
            (None, None) => vec![Item::Atomic(AtomicValue::string(""))],
        };
        if self.static_variables.iter().any(|(n, _)| *n == name) {
            return Err(self.fail(
                ErrorCode::XTSE3450,
                format!("Static variable ${name} is declared more than once"),
                &tag.location,
            ));
        }
        tracing::debug!(name = %name, items = value.len(), "static {kind} declared");
        self.static_variables.push((name, value));
        Ok(())
    }

    /// Decide the fate of a buffered start tag. Called on `start_content`.
    fn release(&mut self, mut tag: StartTag, out: &mut Emitter<'_>) -> Result<(), Error> {
        let in_xslt = tag.name.has_uri(XSLT_NS);
        let std_att_uri = if in_xslt { "" } else { XSLT_NS };
        let xpath_default_ns = tag.attribute(std_att_uri, "xpath-default-namespace").map(str::to_string);
        self.default_namespace_stack.push(xpath_default_ns);
        let mut in_scope: Vec<NamespaceBinding> = tag.namespaces.iter().map(|(b, _)| b.clone()).collect();
        in_scope.extend(self.namespace_stack.last().into_iter().flatten().cloned());
        self.namespace_stack.push(in_scope);

        let base_uri = self.compute_base_uri(&tag)?;
        let is_stylesheet_element =
            in_xslt && matches!(&*tag.name.local, "stylesheet" | "transform" | "package");

        if in_xslt && self.processor_version.is_none_or(|v| v == 30) {
            self.expand_shadow_attributes(&mut tag, base_uri.as_ref())?;
        }
        if self.processor_version.is_none() {
            self.process_version(&tag, is_stylesheet_element)?;
        }

        if let Some(expression) = tag.attribute(std_att_uri, "use-when") {
            let attributes = tag.attribute_pairs();
            let ctx = self.guard_context(&tag, &attributes, base_uri.as_ref());
            let keep = self
                .evaluator
                .evaluate(expression, &ctx)
                .map_err(|e| self.wrap(e, "use-when expression", &tag.location))?;
            tracing::debug!(element = %tag.name, expression, keep, "use-when evaluated");
            if !keep {
                if is_stylesheet_element {
                    self.empty_stylesheet_element = true;
                } else {
                    self.depth_of_hole = 1;
                    return Ok(());
                }
            }
        }

        if in_xslt && self.processor_version.is_some_and(|v| v >= 30) {
            self.declare_static(&tag, base_uri.as_ref())?;
        }

        self.system_id_stack.push(tag.location.system_id.as_deref().map(str::to_string).or_else(|| self.system_id.clone()));
        self.base_uri_stack.push(base_uri);
        out.emit(Event::StartElement {
            name: tag.name,
            type_annotation: tag.type_annotation,
            location: tag.location,
            properties: tag.properties,
        })?;
        for (binding, properties) in tag.namespaces {
            out.emit(Event::Namespace { binding, properties })?;
        }
        out.emit_all(tag.attributes)?;
        out.emit(Event::StartContent)
    }
}

impl Filter for UseWhenFilter {
    fn name(&self) -> &'static str {
        "use-when"
    }

    fn set_pipeline_configuration(&mut self, config: &PipelineConfiguration) {
        self.config = Some(config.clone());
    }

    fn handle(&mut self, event: Event, out: &mut Emitter<'_>) -> Result<(), Error> {
        match event {
            Event::Open => {
                let base = match self.system_id.as_deref() {
                    Some(sys) => Some(Url::parse(sys)?),
                    None => None,
                };
                self.system_id_stack.push(self.system_id.clone());
                self.base_uri_stack.push(base);
                out.emit(Event::Open)
            }
            Event::StartElement { name, type_annotation, location, properties } => {
                if self.depth_of_hole > 0 || self.empty_stylesheet_element {
                    self.default_namespace_stack.push(None);
                    self.namespace_stack.push(Vec::new());
                    self.depth_of_hole += 1;
                    return Ok(());
                }
                self.pending = Some(StartTag {
                    name,
                    type_annotation,
                    location,
                    properties,
                    namespaces: Vec::new(),
                    attributes: Vec::new(),
                });
                Ok(())
            }
            Event::Namespace { binding, properties } => {
                if let Some(tag) = self.pending.as_mut() {
                    tag.namespaces.push((binding, properties));
                    Ok(())
                } else if self.depth_of_hole > 0 {
                    Ok(())
                } else {
                    out.emit(Event::Namespace { binding, properties })
                }
            }
            Event::Attribute { .. } => {
                if let Some(tag) = self.pending.as_mut() {
                    tag.attributes.push(event);
                    Ok(())
                } else if self.depth_of_hole > 0 {
                    Ok(())
                } else {
                    out.emit(event)
                }
            }
            Event::StartContent => match self.pending.take() {
                Some(tag) => self.release(tag, out),
                None if self.depth_of_hole > 0 => Ok(()),
                None => out.emit(event),
            },
            Event::EndElement => {
                if let Some(tag) = self.pending.take() {
                    // start tag closed without startContent
                    self.release(tag, out)?;
                }
                self.default_namespace_stack.pop();
                self.namespace_stack.pop();
                if self.depth_of_hole > 0 {
                    self.depth_of_hole -= 1;
                    Ok(())
                } else {
                    self.system_id_stack.pop();
                    self.base_uri_stack.pop();
                    out.emit(event)
                }
            }
            Event::Characters { .. } => {
                if self.depth_of_hole == 0 && !self.empty_stylesheet_element {
                    out.emit(event)
                } else {
                    Ok(())
                }
            }
            Event::ProcessingInstruction { .. } | Event::Comment { .. } => Ok(()),
            other => out.emit(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventRecorder, PipelineBuilder};
    use rstest::rstest;

    fn xsl(local: &str) -> NodeName {
        NodeName::new("xsl", XSLT_NS, local)
    }

    fn guarded(name: NodeName, guard: &str) -> Vec<Event> {
        vec![
            Event::start_element(name),
            Event::attribute(NodeName::local("use-when"), guard),
            Event::StartContent,
        ]
    }

    fn evaluator(expr: &str, _ctx: &GuardContext<'_>) -> Result<bool, Error> {
        match expr {
            "true()" => Ok(true),
            "false()" => Ok(false),
            other => Err(Error::from_code(ErrorCode::XPST0008, format!("cannot evaluate {other}"))),
        }
    }

    fn run(events: Vec<Event>) -> Result<Vec<Event>, Error> {
        run_filter(UseWhenFilter::new(evaluator), events)
    }

    fn run_filter(filter: UseWhenFilter, events: Vec<Event>) -> Result<Vec<Event>, Error> {
        let mut p = PipelineBuilder::new(PipelineConfiguration::default()).stage(filter).build(EventRecorder::default());
        p.send_all(events)?;
        Ok(p.terminal_mut().take_events())
    }

    /// Understands `true()`, `false()`, quoted strings and `$name`.
    struct StaticEvaluator;

    impl GuardEvaluator for StaticEvaluator {
        fn evaluate(&self, expression: &str, ctx: &GuardContext<'_>) -> Result<bool, Error> {
            Ok(match self.evaluate_static(expression, ctx)?.as_slice() {
                [Item::Atomic(AtomicValue::Boolean(b))] => *b,
                [Item::Atomic(AtomicValue::String(s))] => !s.is_empty(),
                other => !other.is_empty(),
            })
        }

        fn evaluate_static(&self, expression: &str, ctx: &GuardContext<'_>) -> Result<Sequence, Error> {
            let expression = expression.trim();
            if let Some(var) = expression.strip_prefix('$') {
                return ctx
                    .static_variable(&ExpandedName::local(var))
                    .cloned()
                    .ok_or_else(|| Error::from_code(ErrorCode::XPST0008, format!("undeclared variable ${var}")));
            }
            if let Some(text) = expression.strip_prefix('\'').and_then(|e| e.strip_suffix('\'')) {
                return Ok(vec![Item::Atomic(AtomicValue::string(text))]);
            }
            match expression {
                "true()" => Ok(vec![Item::Atomic(AtomicValue::Boolean(true))]),
                "false()" => Ok(vec![Item::Atomic(AtomicValue::Boolean(false))]),
                other => Err(Error::from_code(ErrorCode::XPST0008, format!("cannot evaluate {other}"))),
            }
        }
    }

    fn stylesheet(version: Option<&str>, children: Vec<Vec<Event>>) -> Vec<Event> {
        let mut events = vec![Event::start_element(xsl("stylesheet"))];
        events.extend(version.map(|v| Event::attribute(NodeName::local("version"), v)));
        events.push(Event::StartContent);
        events.extend(children.into_iter().flatten());
        events.push(Event::EndElement);
        events
    }

    fn declaration(local: &str, attributes: &[(&str, &str)]) -> Vec<Event> {
        let mut events = vec![Event::start_element(xsl(local))];
        events.extend(attributes.iter().map(|(n, v)| Event::attribute(NodeName::local(n), *v)));
        events.extend([Event::StartContent, Event::EndElement]);
        events
    }

    fn static_run(filter: UseWhenFilter, version: Option<&str>, children: Vec<Vec<Event>>) -> Result<Vec<Event>, Error> {
        run_filter(filter, stylesheet(version, children))
    }

    fn attributes_of(events: &[Event]) -> Vec<(String, String)> {
        events
            .iter()
            .filter_map(|e| match e {
                Event::Attribute { name, value, .. } => Some((name.display_name(), value.clone())),
                _ => None,
            })
            .collect()
    }

    fn element_names(events: &[Event]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                Event::StartElement { name, .. } => Some(name.display_name()),
                _ => None,
            })
            .collect()
    }

    #[rstest]
    fn false_guard_swallows_subtree() {
        let mut events = guarded(xsl("template"), "true()");
        events.extend(guarded(xsl("if"), "false()"));
        events.extend([
            Event::start_element(xsl("value-of")),
            Event::StartContent,
            Event::characters("hidden"),
            Event::EndElement,
            Event::EndElement,
            Event::characters("shown"),
            Event::EndElement,
        ]);
        let out = run(events).unwrap();
        assert_eq!(element_names(&out), vec!["xsl:template"]);
        let ends = out.iter().filter(|e| matches!(e, Event::EndElement)).count();
        assert_eq!(ends, 1);
        assert!(out.iter().any(|e| matches!(e, Event::Characters { text, .. } if text == "shown")));
        assert!(!out.iter().any(|e| matches!(e, Event::Characters { text, .. } if text == "hidden")));
    }

    #[rstest]
    fn false_guard_on_stylesheet_keeps_empty_element() {
        let mut events = guarded(xsl("stylesheet"), "false()");
        events.extend([
            Event::start_element(xsl("template")),
            Event::StartContent,
            Event::EndElement,
            Event::characters("text"),
            Event::EndElement,
        ]);
        let out = run(events).unwrap();
        assert_eq!(element_names(&out), vec!["xsl:stylesheet"]);
        assert_eq!(out.iter().filter(|e| matches!(e, Event::EndElement)).count(), 1);
        assert!(!out.iter().any(|e| matches!(e, Event::Characters { .. })));
    }

    #[rstest]
    fn comments_and_pis_are_dropped() {
        let out = run(vec![
            Event::start_element(xsl("stylesheet")),
            Event::StartContent,
            Event::comment("c"),
            Event::processing_instruction("pi", "data"),
            Event::EndElement,
        ])
        .unwrap();
        assert_eq!(out.len(), 3);
    }

    #[rstest]
    fn guard_on_literal_result_element_uses_xsl_attribute() {
        let events = vec![
            Event::start_element(NodeName::local("out")),
            Event::attribute(NodeName::local("use-when"), "false()"),
            Event::attribute(xsl("use-when"), "true()"),
            Event::StartContent,
            Event::EndElement,
        ];
        let out = run(events).unwrap();
        assert_eq!(element_names(&out), vec!["out"]);
    }

    #[rstest]
    fn guard_error_is_located_and_nothing_is_forwarded() {
        let mut events = vec![Event::StartElement {
            name: xsl("template"),
            type_annotation: None,
            location: Location::new("file:///s.xsl", 3, 1),
            properties: ReceiverOptions::empty(),
        }];
        events.push(Event::attribute(NodeName::local("use-when"), "$undeclared"));
        events.push(Event::StartContent);
        let mut p = PipelineBuilder::new(PipelineConfiguration::default())
            .stage(UseWhenFilter::new(evaluator))
            .build(EventRecorder::default());
        let err = p.send_all(events).unwrap_err();
        assert_eq!(err.code_enum(), ErrorCode::XPST0008);
        assert!(err.message.starts_with("Error in use-when expression."));
        assert_eq!(err.location.as_ref().and_then(|l| l.line), Some(3));
        assert!(p.terminal().events().is_empty());
    }

    #[rstest]
    fn guard_sees_default_namespace_and_base_uri() {
        let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let filter = UseWhenFilter::new(move |_: &str, ctx: &GuardContext<'_>| -> Result<bool, Error> {
            sink.lock().unwrap().push((
                ctx.default_element_namespace.map(str::to_string),
                ctx.base_uri.map(|u| u.to_string()),
            ));
            Ok(true)
        })
        .with_system_id("http://example.com/styles/main.xsl");
        let mut p = PipelineBuilder::new(PipelineConfiguration::default()).stage(filter).build(EventRecorder::default());
        p.send_all([
            Event::Open,
            Event::start_element(xsl("stylesheet")),
            Event::attribute(NodeName::local("xpath-default-namespace"), "urn:d"),
            Event::StartContent,
            Event::start_element(xsl("template")),
            Event::attribute(NodeName::new("xml", XML_NS, "base"), "sub/"),
            Event::attribute(NodeName::local("use-when"), "true()"),
            Event::StartContent,
            Event::EndElement,
            Event::EndElement,
        ])
        .unwrap();
        let seen = seen.lock().unwrap();
        assert_eq!(
            seen.as_slice(),
            &[(Some("urn:d".to_string()), Some("http://example.com/styles/sub/".to_string()))]
        );
    }

    #[rstest]
    fn static_variables_feed_later_guards() {
        let out = static_run(
            UseWhenFilter::new(StaticEvaluator),
            Some("3.0"),
            vec![
                declaration("variable", &[("name", "debug"), ("static", "yes"), ("select", "true()")]),
                declaration("param", &[("name", "off"), ("static", "true"), ("select", "false()")]),
                declaration("template", &[("use-when", "$debug")]),
                declaration("function", &[("use-when", "$off")]),
            ],
        )
        .unwrap();
        assert_eq!(element_names(&out), vec!["xsl:stylesheet", "xsl:variable", "xsl:param", "xsl:template"]);
    }

    #[rstest]
    fn supplied_parameter_wins_over_select() {
        let filter = UseWhenFilter::new(StaticEvaluator)
            .with_static_param(ExpandedName::local("mode"), vec![Item::Atomic(AtomicValue::Boolean(false))]);
        let out = static_run(
            filter,
            Some("3.0"),
            vec![
                declaration("param", &[("name", "mode"), ("static", "yes"), ("select", "true()")]),
                declaration("template", &[("use-when", "$mode")]),
            ],
        )
        .unwrap();
        assert_eq!(element_names(&out), vec!["xsl:stylesheet", "xsl:param"]);
    }

    #[rstest]
    #[case(&[], vec![Item::Atomic(AtomicValue::string(""))])]
    #[case(&[("as", "xs:string?")], vec![])]
    fn parameter_without_select_defaults(#[case] extra: &[(&str, &str)], #[case] expected: Sequence) {
        let seen = std::sync::Arc::new(std::sync::Mutex::new(None));
        let sink = seen.clone();
        let filter = UseWhenFilter::new(move |_: &str, ctx: &GuardContext<'_>| -> Result<bool, Error> {
            *sink.lock().unwrap() = ctx.static_variable(&ExpandedName::local("p")).cloned();
            Ok(true)
        });
        let mut attributes = vec![("name", "p"), ("static", "yes")];
        attributes.extend_from_slice(extra);
        static_run(
            filter,
            Some("3.0"),
            vec![declaration("param", &attributes), declaration("template", &[("use-when", "$p")])],
        )
        .unwrap();
        assert_eq!(seen.lock().unwrap().as_ref(), Some(&expected));
    }

    #[rstest]
    #[case(vec![declaration("param", &[("name", "p"), ("static", "yes"), ("required", "yes")])], ErrorCode::XTDE0050)]
    #[case(vec![declaration("variable", &[("name", "v"), ("static", "yes")])], ErrorCode::XTSE0010)]
    #[case(
        vec![
            declaration("variable", &[("name", "v"), ("static", "yes"), ("select", "true()")]),
            declaration("variable", &[("name", "v"), ("static", "yes"), ("select", "false()")]),
        ],
        ErrorCode::XTSE3450
    )]
    #[case(vec![declaration("variable", &[("name", "q:v"), ("static", "yes"), ("select", "true()")])], ErrorCode::XTSE0280)]
    fn invalid_static_declarations(#[case] children: Vec<Vec<Event>>, #[case] code: ErrorCode) {
        let err = static_run(UseWhenFilter::new(StaticEvaluator), Some("3.0"), children).unwrap_err();
        assert_eq!(err.code_enum(), code);
    }

    #[rstest]
    fn prefixed_static_name_uses_namespaces_in_scope() {
        let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let filter = UseWhenFilter::new(move |_: &str, ctx: &GuardContext<'_>| -> Result<bool, Error> {
            sink.lock().unwrap().extend(ctx.static_variables.iter().map(|(n, _)| n.clone()));
            Ok(true)
        });
        let mut events = vec![
            Event::start_element(xsl("stylesheet")),
            Event::Namespace { binding: NamespaceBinding::new("p", "urn:p"), properties: ReceiverOptions::empty() },
            Event::attribute(NodeName::local("version"), "3.0"),
            Event::StartContent,
        ];
        events.extend(declaration("variable", &[("name", "p:v"), ("static", "yes"), ("select", "true()")]));
        events.extend(declaration("template", &[("use-when", "true()")]));
        events.push(Event::EndElement);
        run_filter(filter, events).unwrap();
        assert_eq!(seen.lock().unwrap().as_slice(), &[ExpandedName::new(Some("urn:p".into()), "v")]);
    }

    #[rstest]
    fn closure_evaluators_yield_boolean_statics() {
        let filter = UseWhenFilter::new(|expr: &str, ctx: &GuardContext<'_>| -> Result<bool, Error> {
            match expr {
                "$flag" => Ok(matches!(
                    ctx.static_variable(&ExpandedName::local("flag")).map(Vec::as_slice),
                    Some([Item::Atomic(AtomicValue::Boolean(true))])
                )),
                other => evaluator(other, ctx),
            }
        });
        let out = static_run(
            filter,
            Some("3.0"),
            vec![
                declaration("variable", &[("name", "flag"), ("static", "yes"), ("select", "true()")]),
                declaration("template", &[("use-when", "$flag")]),
            ],
        )
        .unwrap();
        assert_eq!(element_names(&out).len(), 3);
    }

    #[rstest]
    #[case(Some("2.0"))]
    #[case(None)]
    fn static_declarations_need_version_three(#[case] version: Option<&str>) {
        let err = static_run(
            UseWhenFilter::new(StaticEvaluator),
            version,
            vec![
                declaration("variable", &[("name", "debug"), ("static", "yes"), ("select", "true()")]),
                declaration("template", &[("use-when", "$debug")]),
            ],
        )
        .unwrap_err();
        assert_eq!(err.code_enum(), ErrorCode::XPST0008);
    }

    #[rstest]
    fn nested_static_variable_is_not_declared() {
        let mut template = vec![Event::start_element(xsl("template")), Event::StartContent];
        template.extend(declaration("variable", &[("name", "inner"), ("static", "yes"), ("select", "true()")]));
        template.extend(declaration("if", &[("use-when", "$inner")]));
        template.push(Event::EndElement);
        let err = static_run(UseWhenFilter::new(StaticEvaluator), Some("3.0"), vec![template]).unwrap_err();
        assert_eq!(err.code_enum(), ErrorCode::XPST0008);
    }

    #[rstest]
    fn shadow_attributes_replace_their_plain_twins() {
        let out = static_run(
            UseWhenFilter::new(StaticEvaluator),
            Some("3.0"),
            vec![
                declaration("variable", &[("name", "m"), ("static", "yes"), ("select", "'main'")]),
                declaration("template", &[("match", "old"), ("_match", "{'x'}-{{y}}"), ("_mode", "{$m}")]),
            ],
        )
        .unwrap();
        let template_attributes: Vec<(String, String)> = attributes_of(&out)
            .into_iter()
            .filter(|(n, _)| matches!(n.as_str(), "match" | "mode" | "_match" | "_mode"))
            .collect();
        assert_eq!(
            template_attributes,
            vec![("match".to_string(), "x-{y}".to_string()), ("mode".to_string(), "main".to_string())]
        );
    }

    #[rstest]
    fn shadow_attribute_implies_version_three() {
        let out = static_run(
            UseWhenFilter::new(StaticEvaluator),
            None,
            vec![
                declaration("template", &[("_name", "{'t'}")]),
                declaration("variable", &[("name", "v"), ("static", "yes"), ("select", "true()")]),
                declaration("function", &[("use-when", "$v")]),
            ],
        )
        .unwrap();
        assert_eq!(element_names(&out).last().map(String::as_str), Some("xsl:function"));
    }

    #[rstest]
    #[case("{'a'")]
    #[case("a}b")]
    fn unmatched_braces_in_shadow_attributes(#[case] template: &str) {
        let err = static_run(
            UseWhenFilter::new(StaticEvaluator),
            Some("3.0"),
            vec![declaration("template", &[("_name", template)])],
        )
        .unwrap_err();
        assert_eq!(err.code_enum(), ErrorCode::XTSE0350);
        assert!(err.message.starts_with("Error in shadow attribute _name."));
    }

    #[rstest]
    #[case("three")]
    #[case("-1.0")]
    fn invalid_version_is_a_static_error(#[case] version: &str) {
        let err = static_run(UseWhenFilter::new(StaticEvaluator), Some(version), vec![]).unwrap_err();
        assert_eq!(err.code_enum(), ErrorCode::XTSE0110);
    }

    #[rstest]
    #[case("{'a}b'}", "a}b")]
    #[case("x{{}}", "x{}")]
    #[case("plain", "plain")]
    fn template_expansion(#[case] template: &str, #[case] expected: &str) {
        let filter = UseWhenFilter::new(StaticEvaluator);
        let tag = StartTag {
            name: xsl("template"),
            type_annotation: None,
            location: Location::unknown(),
            properties: ReceiverOptions::empty(),
            namespaces: Vec::new(),
            attributes: Vec::new(),
        };
        let ctx = filter.guard_context(&tag, &[], None);
        assert_eq!(filter.expand_template(template, &ctx).unwrap(), expected);
    }
}
