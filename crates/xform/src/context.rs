use crate::collation::{CODEPOINT_URI, Collation, CollationRegistry};
use crate::error::{Error, ErrorCode};
use crate::xdm::{ExpandedName, Item, Sequence};
use chrono::{FixedOffset, Offset, Utc};
use std::collections::HashMap;
use std::sync::Arc;

/// Language whose rules govern error codes raised by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HostLanguage {
    #[default]
    Xslt,
    XQuery,
    XPath,
}

/// Which XSD lexical rules apply when strings are converted to numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum XsdVersion {
    V10,
    #[default]
    V11,
}

/// Process-wide settings shared by every pipeline and sort of a run.
pub struct Configuration {
    pub collations: Arc<CollationRegistry>,
    pub default_collation: String,
    pub implicit_timezone: FixedOffset,
    pub xsd_version: XsdVersion,
    pub host_language: HostLanguage,
    pub strip_whitespace: bool,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            collations: Arc::new(CollationRegistry::default()),
            default_collation: CODEPOINT_URI.to_string(),
            implicit_timezone: Utc.fix(),
            xsd_version: XsdVersion::default(),
            host_language: HostLanguage::default(),
            strip_whitespace: false,
        }
    }
}

impl core::fmt::Debug for Configuration {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Configuration")
            .field("default_collation", &self.default_collation)
            .field("implicit_timezone", &self.implicit_timezone)
            .field("xsd_version", &self.xsd_version)
            .field("host_language", &self.host_language)
            .field("strip_whitespace", &self.strip_whitespace)
            .finish()
    }
}

impl Configuration {
    pub fn builder() -> ConfigurationBuilder {
        ConfigurationBuilder::new()
    }

    pub fn collation(&self, uri: &str) -> Option<Arc<dyn Collation>> {
        self.collations.get(uri)
    }
}

pub struct ConfigurationBuilder {
    config: Configuration,
}

impl Default for ConfigurationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigurationBuilder {
    pub fn new() -> Self {
        Self { config: Configuration::default() }
    }

    pub fn with_collations(mut self, reg: CollationRegistry) -> Self {
        self.config.collations = Arc::new(reg);
        self
    }

    pub fn with_default_collation(mut self, uri: impl Into<String>) -> Self {
        self.config.default_collation = uri.into();
        self
    }

    /// Implicit timezone in minutes east of UTC; out-of-range offsets are ignored.
    pub fn with_implicit_timezone(mut self, offset_minutes: i32) -> Self {
        if let Some(tz) = FixedOffset::east_opt(offset_minutes * 60) {
            self.config.implicit_timezone = tz;
        }
        self
    }

    pub fn with_xsd_version(mut self, version: XsdVersion) -> Self {
        self.config.xsd_version = version;
        self
    }

    pub fn with_host_language(mut self, language: HostLanguage) -> Self {
        self.config.host_language = language;
        self
    }

    pub fn with_strip_whitespace(mut self, strip: bool) -> Self {
        self.config.strip_whitespace = strip;
        self
    }

    pub fn build(self) -> Arc<Configuration> {
        Arc::new(self.config)
    }
}

/// Compile-time view: what a sort key or guard sees while a stylesheet or
/// query is being analysed.
#[derive(Debug, Clone)]
pub struct StaticContext {
    pub config: Arc<Configuration>,
    pub base_uri: Option<String>,
    pub default_collation: String,
    pub host_language: HostLanguage,
}

impl Default for StaticContext {
    fn default() -> Self {
        StaticContextBuilder::new().build()
    }
}

pub struct StaticContextBuilder {
    ctx: StaticContext,
}

impl Default for StaticContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StaticContextBuilder {
    pub fn new() -> Self {
        Self::with_configuration(Arc::new(Configuration::default()))
    }

    /// Start from a shared configuration; default collation and host language
    /// are inherited from it.
    pub fn with_configuration(config: Arc<Configuration>) -> Self {
        let ctx = StaticContext {
            base_uri: None,
            default_collation: config.default_collation.clone(),
            host_language: config.host_language,
            config,
        };
        Self { ctx }
    }

    pub fn with_base_uri(mut self, uri: impl Into<String>) -> Self {
        self.ctx.base_uri = Some(uri.into());
        self
    }

    pub fn with_default_collation(mut self, uri: impl Into<String>) -> Self {
        self.ctx.default_collation = uri.into();
        self
    }

    pub fn with_host_language(mut self, language: HostLanguage) -> Self {
        self.ctx.host_language = language;
        self
    }

    pub fn build(self) -> StaticContext {
        self.ctx
    }
}

/// Run-time evaluation context.
///
/// Cloning is cheap: variables are shared behind an `Arc`, so setting a new
/// focus per sorted item does not copy the variable bindings.
#[derive(Debug, Clone)]
pub struct DynamicContext {
    pub config: Arc<Configuration>,
    pub context_item: Option<Item>,
    pub position: usize,
    pub size: usize,
    pub variables: Arc<HashMap<ExpandedName, Sequence>>,
    pub timezone_override: Option<FixedOffset>,
    pub base_uri: Option<String>,
    early: bool,
}

impl Default for DynamicContext {
    fn default() -> Self {
        DynamicContextBuilder::new().build()
    }
}

impl DynamicContext {
    /// Context used to evaluate expressions during static analysis. Errors
    /// raised while it is active are reported with static error codes.
    pub fn early(static_ctx: &StaticContext) -> Self {
        let mut ctx = DynamicContextBuilder::with_configuration(static_ctx.config.clone()).build();
        ctx.base_uri = static_ctx.base_uri.clone();
        ctx.early = true;
        ctx
    }

    pub fn is_early(&self) -> bool {
        self.early
    }

    pub fn implicit_timezone(&self) -> FixedOffset {
        self.timezone_override.unwrap_or(self.config.implicit_timezone)
    }

    pub fn collations(&self) -> &CollationRegistry {
        &self.config.collations
    }

    /// Copy of this context focused on `item` at 1-based `position`.
    pub fn with_focus(&self, item: Item, position: usize, size: usize) -> Self {
        let mut ctx = self.clone();
        ctx.context_item = Some(item);
        ctx.position = position;
        ctx.size = size;
        ctx
    }

    pub fn context_item(&self) -> Result<&Item, Error> {
        self.context_item.as_ref().ok_or_else(|| Error::from_code(ErrorCode::XPDY0002, "context item is absent"))
    }

    pub fn variable(&self, name: &ExpandedName) -> Result<&Sequence, Error> {
        self.variables
            .get(name)
            .ok_or_else(|| Error::from_code(ErrorCode::XPST0008, format!("variable ${name} is not declared")))
    }
}

pub struct DynamicContextBuilder {
    ctx: DynamicContext,
    variables: HashMap<ExpandedName, Sequence>,
}

impl Default for DynamicContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DynamicContextBuilder {
    pub fn new() -> Self {
        Self::with_configuration(Arc::new(Configuration::default()))
    }

    pub fn with_configuration(config: Arc<Configuration>) -> Self {
        let ctx = DynamicContext {
            config,
            context_item: None,
            position: 0,
            size: 0,
            variables: Arc::new(HashMap::new()),
            timezone_override: None,
            base_uri: None,
            early: false,
        };
        Self { ctx, variables: HashMap::new() }
    }

    pub fn with_context_item(mut self, item: impl Into<Item>) -> Self {
        self.ctx.context_item = Some(item.into());
        self.ctx.position = 1;
        self.ctx.size = 1;
        self
    }

    pub fn with_variable(mut self, name: ExpandedName, value: impl Into<Sequence>) -> Self {
        self.variables.insert(name, value.into());
        self
    }

    pub fn with_base_uri(mut self, uri: impl Into<String>) -> Self {
        self.ctx.base_uri = Some(uri.into());
        self
    }

    // Override the configured implicit timezone for this evaluation only
    pub fn with_timezone(mut self, offset_minutes: i32) -> Self {
        if let Some(tz) = FixedOffset::east_opt(offset_minutes * 60) {
            self.ctx.timezone_override = Some(tz);
        }
        self
    }

    pub fn build(mut self) -> DynamicContext {
        self.ctx.variables = Arc::new(self.variables);
        self.ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xdm::AtomicValue;
    use rstest::rstest;

    #[rstest]
    fn early_context_inherits_static_base_uri() {
        let sc = StaticContextBuilder::new().with_base_uri("http://example.com/a/").build();
        let ctx = DynamicContext::early(&sc);
        assert!(ctx.is_early());
        assert_eq!(ctx.base_uri.as_deref(), Some("http://example.com/a/"));
    }

    #[rstest]
    fn timezone_override_wins() {
        let config = ConfigurationBuilder::new().with_implicit_timezone(60).build();
        let ctx = DynamicContextBuilder::with_configuration(config.clone()).build();
        assert_eq!(ctx.implicit_timezone().local_minus_utc(), 3600);
        let ctx = DynamicContextBuilder::with_configuration(config).with_timezone(-300).build();
        assert_eq!(ctx.implicit_timezone().local_minus_utc(), -18000);
    }

    #[rstest]
    fn missing_variable_and_focus() {
        let ctx = DynamicContextBuilder::new()
            .with_variable(ExpandedName::local("x"), vec![Item::Atomic(AtomicValue::Integer(1))])
            .build();
        assert!(ctx.variable(&ExpandedName::local("x")).is_ok());
        assert_eq!(ctx.variable(&ExpandedName::local("y")).unwrap_err().code_enum(), ErrorCode::XPST0008);
        assert_eq!(ctx.context_item().unwrap_err().code_enum(), ErrorCode::XPDY0002);
    }
}
