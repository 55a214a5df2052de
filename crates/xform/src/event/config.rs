use super::strip::SpaceStrippingRule;
use crate::context::{Configuration, HostLanguage};
use crate::error::{Error, ErrorCode};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
    Fatal,
}

/// Receives diagnostics raised while a pipeline runs.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, error: &Error, severity: Severity);
}

/// Reports through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorReporter;

impl ErrorReporter for TracingErrorReporter {
    fn report(&self, error: &Error, severity: Severity) {
        match severity {
            Severity::Warning => tracing::warn!(code = %error.format_code(), "{}", error.message),
            Severity::Error | Severity::Fatal => {
                let fatal = severity == Severity::Fatal;
                tracing::error!(code = %error.format_code(), fatal, "{}", error.message)
            }
        }
    }
}

/// Resolves an `href` against a base URI.
pub trait UriResolver: Send + Sync {
    fn resolve(&self, href: &str, base: Option<&str>) -> Result<Url, Error>;
}

/// Plain RFC 3986 reference resolution.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardUriResolver;

impl UriResolver for StandardUriResolver {
    fn resolve(&self, href: &str, base: Option<&str>) -> Result<Url, Error> {
        match Url::parse(href) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let base = base.ok_or_else(|| {
                    Error::from_code(ErrorCode::XTSE0020, format!("relative URI {href} and no base URI is known"))
                })?;
                Ok(Url::parse(base)?.join(href)?)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Locates schema documents for a target namespace.
pub trait SchemaUriResolver: Send + Sync {
    fn resolve(&self, target_namespace: &str, base: Option<&str>, location_hints: &[String]) -> Result<Vec<Url>, Error>;
}

/// Options controlling how a source document is turned into events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseOptions {
    pub strip_space: SpaceStrippingRule,
    pub expand_attribute_defaults: bool,
    pub line_numbering: bool,
    pub recover_from_validation_errors: bool,
}

/// State shared by all stages of one pipeline run.
///
/// `clone` copies the handles, the parse options and the component map, so a
/// branch can override options or components without affecting the original.
/// The configuration, resolvers and reporter stay shared.
#[derive(Clone)]
pub struct PipelineConfiguration {
    config: Arc<Configuration>,
    error_reporter: Arc<dyn ErrorReporter>,
    uri_resolver: Arc<dyn UriResolver>,
    schema_uri_resolver: Option<Arc<dyn SchemaUriResolver>>,
    host_language: HostLanguage,
    serializing: bool,
    parse_options: ParseOptions,
    components: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl Default for PipelineConfiguration {
    fn default() -> Self {
        Self::new(Arc::new(Configuration::default()))
    }
}

impl core::fmt::Debug for PipelineConfiguration {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PipelineConfiguration")
            .field("config", &self.config)
            .field("host_language", &self.host_language)
            .field("serializing", &self.serializing)
            .field("parse_options", &self.parse_options)
            .field("components", &self.components.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl PipelineConfiguration {
    pub fn new(config: Arc<Configuration>) -> Self {
        let parse_options = ParseOptions {
            strip_space: if config.strip_whitespace { SpaceStrippingRule::All } else { SpaceStrippingRule::None },
            ..ParseOptions::default()
        };
        Self {
            host_language: config.host_language,
            config,
            error_reporter: Arc::new(TracingErrorReporter),
            uri_resolver: Arc::new(StandardUriResolver),
            schema_uri_resolver: None,
            serializing: false,
            parse_options,
            components: HashMap::new(),
        }
    }

    pub fn configuration(&self) -> &Arc<Configuration> {
        &self.config
    }

    pub fn error_reporter(&self) -> &dyn ErrorReporter {
        self.error_reporter.as_ref()
    }

    pub fn uri_resolver(&self) -> &dyn UriResolver {
        self.uri_resolver.as_ref()
    }

    pub fn schema_uri_resolver(&self) -> Option<&dyn SchemaUriResolver> {
        self.schema_uri_resolver.as_deref()
    }

    pub fn host_language(&self) -> HostLanguage {
        self.host_language
    }

    pub fn is_xslt(&self) -> bool {
        self.host_language == HostLanguage::Xslt
    }

    pub fn is_serializing(&self) -> bool {
        self.serializing
    }

    pub fn parse_options(&self) -> &ParseOptions {
        &self.parse_options
    }

    pub fn parse_options_mut(&mut self) -> &mut ParseOptions {
        &mut self.parse_options
    }

    pub fn with_error_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.error_reporter = reporter;
        self
    }

    pub fn with_uri_resolver(mut self, resolver: Arc<dyn UriResolver>) -> Self {
        self.uri_resolver = resolver;
        self
    }

    pub fn with_schema_uri_resolver(mut self, resolver: Arc<dyn SchemaUriResolver>) -> Self {
        self.schema_uri_resolver = Some(resolver);
        self
    }

    pub fn with_host_language(mut self, language: HostLanguage) -> Self {
        self.host_language = language;
        self
    }

    pub fn with_serializing(mut self, serializing: bool) -> Self {
        self.serializing = serializing;
        self
    }

    pub fn with_parse_options(mut self, options: ParseOptions) -> Self {
        self.parse_options = options;
        self
    }

    pub fn set_component(&mut self, name: impl Into<String>, value: Arc<dyn Any + Send + Sync>) {
        self.components.insert(name.into(), value);
    }

    /// Named component downcast to `T`; `None` if absent or of another type.
    pub fn component<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.components.get(name).cloned()?.downcast::<T>().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ConfigurationBuilder;
    use rstest::rstest;

    #[rstest]
    fn clone_isolates_options_and_components() {
        let mut base = PipelineConfiguration::default();
        base.set_component("limit", Arc::new(10usize));
        let mut branch = base.clone();
        branch.parse_options_mut().line_numbering = true;
        branch.set_component("limit", Arc::new(20usize));
        assert!(!base.parse_options().line_numbering);
        assert_eq!(*base.component::<usize>("limit").unwrap(), 10);
        assert_eq!(*branch.component::<usize>("limit").unwrap(), 20);
        assert!(Arc::ptr_eq(base.configuration(), branch.configuration()));
    }

    #[rstest]
    fn component_of_wrong_type_is_none() {
        let mut pc = PipelineConfiguration::default();
        pc.set_component("x", Arc::new("text"));
        assert!(pc.component::<usize>("x").is_none());
        assert!(pc.component::<usize>("missing").is_none());
    }

    #[rstest]
    fn strip_default_comes_from_configuration() {
        let config = ConfigurationBuilder::new().with_strip_whitespace(true).build();
        assert_eq!(PipelineConfiguration::new(config).parse_options().strip_space, SpaceStrippingRule::All);
    }

    #[rstest]
    #[case("b.xml", Some("http://example.com/a/x.xml"), "http://example.com/a/b.xml")]
    #[case("http://other.org/c", None, "http://other.org/c")]
    fn standard_resolver(#[case] href: &str, #[case] base: Option<&str>, #[case] expected: &str) {
        assert_eq!(StandardUriResolver.resolve(href, base).unwrap().as_str(), expected);
    }

    #[rstest]
    fn relative_without_base_fails() {
        assert!(StandardUriResolver.resolve("b.xml", None).is_err());
    }
}
