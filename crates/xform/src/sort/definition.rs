use super::comparer::{
    AtomicComparer, DescendingComparer, EmptyGreatestComparer, NumericComparer, TextComparer, make_sort_comparer,
};
use crate::collation::{Collation, CollationParams};
use crate::context::{DynamicContext, XsdVersion};
use crate::error::{Error, ErrorCode};
use crate::expr::{ContextItem, Expression};
use crate::xdm::{Item, PrimitiveType};
use std::sync::Arc;
use url::Url;

/// An `xsl:sort` attribute: either known when the key is compiled, or an
/// expression evaluated each time a comparator is built.
#[derive(Debug, Clone)]
pub enum Setting<T> {
    Literal(T),
    Deferred(Arc<dyn Expression>),
}

impl<T: Clone> Setting<T> {
    pub fn is_literal(&self) -> bool {
        matches!(self, Setting::Literal(_))
    }

    /// Parse a literal expression now; keep anything else for later.
    fn from_expression(expr: Arc<dyn Expression>, parse: impl Fn(&str) -> Result<T, Error>) -> Result<Self, Error> {
        match expr.as_literal() {
            Some(value) => Ok(Setting::Literal(parse(&sequence_string(value))?)),
            None => Ok(Setting::Deferred(expr)),
        }
    }

    fn resolve(&self, ctx: &DynamicContext, parse: impl Fn(&str) -> Result<T, Error>) -> Result<T, Error> {
        match self {
            Setting::Literal(v) => Ok(v.clone()),
            Setting::Deferred(expr) => parse(&expr.evaluate_as_string(ctx)?),
        }
    }
}

fn sequence_string(value: &[Item]) -> String {
    value.first().map(Item::string_value).unwrap_or_default()
}

fn invalid(attribute: &str, value: &str, allowed: &str) -> Error {
    Error::from_code(ErrorCode::XTDE0030, format!("Invalid value for {attribute}: '{value}' (expected {allowed})"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

impl SortOrder {
    pub fn parse(s: &str) -> Result<Self, Error> {
        match s.trim() {
            "ascending" => Ok(SortOrder::Ascending),
            "descending" => Ok(SortOrder::Descending),
            other => Err(invalid("order", other, "ascending or descending")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Text,
    Number,
}

impl DataType {
    pub fn parse(s: &str) -> Result<Self, Error> {
        match s.trim() {
            "text" => Ok(DataType::Text),
            "number" => Ok(DataType::Number),
            other => Err(invalid("data-type", other, "text or number")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaseOrder {
    UpperFirst,
    LowerFirst,
    #[default]
    Default,
}

impl CaseOrder {
    pub fn parse(s: &str) -> Result<Self, Error> {
        match s.trim() {
            "upper-first" => Ok(CaseOrder::UpperFirst),
            "lower-first" => Ok(CaseOrder::LowerFirst),
            "#default" => Ok(CaseOrder::Default),
            other => Err(invalid("case-order", other, "upper-first, lower-first or #default")),
        }
    }

    fn as_param(self) -> Option<String> {
        match self {
            CaseOrder::UpperFirst => Some("upper-first".to_string()),
            CaseOrder::LowerFirst => Some("lower-first".to_string()),
            CaseOrder::Default => None,
        }
    }
}

fn parse_stable(s: &str) -> Result<bool, Error> {
    match s.trim() {
        "yes" | "true" | "1" => Ok(true),
        "no" | "false" | "0" => Ok(false),
        other => Err(invalid("stable", other, "yes or no")),
    }
}

/// Language tag of the `lang` attribute. The empty string selects the default.
fn parse_lang(s: &str) -> Result<String, Error> {
    let s = s.trim();
    let well_formed = s.split('-').enumerate().all(|(i, part)| {
        (1..=8).contains(&part.len())
            && if i == 0 {
                part.chars().all(|c| c.is_ascii_alphabetic())
            } else {
                part.chars().all(|c| c.is_ascii_alphanumeric())
            }
    });
    if s.is_empty() || well_formed { Ok(s.to_string()) } else { Err(invalid("lang", s, "a language tag")) }
}

/// Static error while the stylesheet is being compiled, dynamic afterwards.
fn collation_not_found(ctx: &DynamicContext, uri: &str) -> Error {
    let code = if ctx.is_early() { ErrorCode::XTSE1210 } else { ErrorCode::XTDE1035 };
    Error::from_code(code, format!("Unknown collation {uri}"))
}

fn parse_uri(s: &str) -> Result<String, Error> {
    Ok(s.trim().to_string())
}

/// One key of a multi-key sort.
///
/// Attributes given as literals are validated when set. [`make_comparator`]
/// evaluates the remaining attributes and layers the resulting comparer:
/// the type-specific comparer, then text or number conversion, then
/// empty-greatest handling when no data type is given, then descending order.
///
/// [`make_comparator`]: SortKeyDefinition::make_comparator
#[derive(Debug, Clone)]
pub struct SortKeyDefinition {
    sort_key: Arc<dyn Expression>,
    set_context_for_sort_key: bool,
    order: Setting<SortOrder>,
    data_type: Option<Setting<DataType>>,
    case_order: Setting<CaseOrder>,
    lang: Option<Setting<String>>,
    collation_name: Option<Setting<String>>,
    stable: Setting<bool>,
    collation: Option<Arc<dyn Collation>>,
    base_uri: Option<String>,
    empty_least: bool,
    fixed: bool,
    final_comparator: Option<Arc<dyn AtomicComparer>>,
}

impl SortKeyDefinition {
    /// A key evaluated with each item to be sorted as the context item.
    pub fn new(sort_key: Arc<dyn Expression>) -> Self {
        Self {
            sort_key,
            set_context_for_sort_key: true,
            order: Setting::Literal(SortOrder::Ascending),
            data_type: None,
            case_order: Setting::Literal(CaseOrder::Default),
            lang: None,
            collation_name: None,
            stable: Setting::Literal(true),
            collation: None,
            base_uri: None,
            empty_least: true,
            fixed: true,
            final_comparator: None,
        }
    }

    pub fn sort_key(&self) -> &Arc<dyn Expression> {
        &self.sort_key
    }

    /// Replace the key expression. With `set_context` false the key is
    /// evaluated in the caller's focus rather than each item's.
    pub fn set_sort_key(&mut self, sort_key: Arc<dyn Expression>, set_context: bool) {
        self.sort_key = sort_key;
        self.set_context_for_sort_key = set_context;
        self.final_comparator = None;
    }

    pub fn is_setting_context_for_sort_key(&self) -> bool {
        self.set_context_for_sort_key
    }

    pub fn with_order(mut self, order: SortOrder) -> Self {
        self.order = Setting::Literal(order);
        self.changed();
        self
    }

    pub fn set_order(&mut self, expr: Arc<dyn Expression>) -> Result<(), Error> {
        self.order = Setting::from_expression(expr, SortOrder::parse)?;
        self.changed();
        Ok(())
    }

    /// The order, if known without evaluation.
    pub fn order(&self) -> Option<SortOrder> {
        match &self.order {
            Setting::Literal(o) => Some(*o),
            Setting::Deferred(_) => None,
        }
    }

    pub fn with_data_type(mut self, data_type: DataType) -> Self {
        self.data_type = Some(Setting::Literal(data_type));
        self.changed();
        self
    }

    pub fn set_data_type(&mut self, expr: Arc<dyn Expression>) -> Result<(), Error> {
        self.data_type = Some(Setting::from_expression(expr, DataType::parse)?);
        self.changed();
        Ok(())
    }

    pub fn with_case_order(mut self, case_order: CaseOrder) -> Self {
        self.case_order = Setting::Literal(case_order);
        self.changed();
        self
    }

    pub fn set_case_order(&mut self, expr: Arc<dyn Expression>) -> Result<(), Error> {
        self.case_order = Setting::from_expression(expr, CaseOrder::parse)?;
        self.changed();
        Ok(())
    }

    pub fn with_language(mut self, lang: &str) -> Result<Self, Error> {
        self.lang = Some(Setting::Literal(parse_lang(lang)?));
        self.changed();
        Ok(self)
    }

    pub fn set_language(&mut self, expr: Arc<dyn Expression>) -> Result<(), Error> {
        self.lang = Some(Setting::from_expression(expr, parse_lang)?);
        self.changed();
        Ok(())
    }

    pub fn with_collation_name(mut self, uri: &str) -> Self {
        self.collation_name = Some(Setting::Literal(uri.trim().to_string()));
        self.changed();
        self
    }

    pub fn set_collation_name(&mut self, expr: Arc<dyn Expression>) -> Result<(), Error> {
        self.collation_name = Some(Setting::from_expression(expr, parse_uri)?);
        self.changed();
        Ok(())
    }

    pub fn set_stable(&mut self, expr: Arc<dyn Expression>) -> Result<(), Error> {
        self.stable = Setting::from_expression(expr, parse_stable)?;
        self.changed();
        Ok(())
    }

    /// Use this collation, ignoring `collation`, `lang` and `case-order`.
    pub fn with_collation(mut self, collation: Arc<dyn Collation>) -> Self {
        self.collation = Some(collation);
        self.changed();
        self
    }

    pub fn collation(&self) -> Option<&Arc<dyn Collation>> {
        self.collation.as_ref()
    }

    /// Base URI against which a relative collation URI is resolved.
    pub fn with_base_uri(mut self, base_uri: impl Into<String>) -> Self {
        self.base_uri = Some(base_uri.into());
        self.changed();
        self
    }

    pub fn with_empty_least(mut self, empty_least: bool) -> Self {
        self.empty_least = empty_least;
        self.changed();
        self
    }

    pub fn is_empty_least(&self) -> bool {
        self.empty_least
    }

    /// Whether every attribute is a literal, so that the comparator can be
    /// built once at compile time.
    pub fn is_fixed(&self) -> bool {
        self.fixed
    }

    pub fn final_comparator(&self) -> Option<&Arc<dyn AtomicComparer>> {
        self.final_comparator.as_ref()
    }

    pub fn set_final_comparator(&mut self, comparator: Arc<dyn AtomicComparer>) {
        self.final_comparator = Some(comparator);
    }

    fn changed(&mut self) {
        self.fixed = self.order.is_literal()
            && self.case_order.is_literal()
            && self.stable.is_literal()
            && self.data_type.as_ref().is_none_or(Setting::is_literal)
            && self.lang.as_ref().is_none_or(Setting::is_literal)
            && self.collation_name.as_ref().is_none_or(Setting::is_literal);
        self.final_comparator = None;
    }

    /// Build the comparator for this key, evaluating deferred attributes in
    /// `ctx`.
    pub fn make_comparator(&self, ctx: &DynamicContext) -> Result<Arc<dyn AtomicComparer>, Error> {
        let order = self.order.resolve(ctx, SortOrder::parse)?;
        // validated only: the sort is always stable
        let _stable = self.stable.resolve(ctx, parse_stable)?;
        let data_type = self.data_type.as_ref().map(|s| s.resolve(ctx, DataType::parse)).transpose()?;
        let collation = self.resolve_collation(ctx)?;

        let base: Arc<dyn AtomicComparer> = match data_type {
            None => {
                let c = make_sort_comparer(Some(collation), self.sort_key.static_type(), ctx);
                if self.empty_least { c } else { Arc::new(EmptyGreatestComparer::new(c)) }
            }
            Some(DataType::Text) => {
                Arc::new(TextComparer::new(make_sort_comparer(Some(collation), PrimitiveType::String, ctx)))
            }
            Some(DataType::Number) => match ctx.config.xsd_version {
                XsdVersion::V10 => NumericComparer::instance(),
                XsdVersion::V11 => NumericComparer::instance_11(),
            },
        };
        let comparer: Arc<dyn AtomicComparer> = match order {
            SortOrder::Ascending => base,
            SortOrder::Descending => Arc::new(DescendingComparer::new(base)),
        };
        tracing::debug!(comparer = %comparer.describe(), fixed = self.fixed, early = ctx.is_early(), "sort key comparator resolved");
        Ok(comparer)
    }

    fn resolve_collation(&self, ctx: &DynamicContext) -> Result<Arc<dyn Collation>, Error> {
        if let Some(collation) = &self.collation {
            return Ok(collation.clone());
        }
        if let Some(name) = &self.collation_name {
            let uri = self.absolute_collation_uri(&name.resolve(ctx, parse_uri)?, ctx)?;
            return ctx.collations().get(&uri).ok_or_else(|| collation_not_found(ctx, &uri));
        }
        let case_order = self.case_order.resolve(ctx, CaseOrder::parse)?;
        let lang = self.lang.as_ref().map(|s| s.resolve(ctx, parse_lang)).transpose()?.filter(|l| !l.is_empty());
        if lang.is_none() && case_order == CaseOrder::Default {
            return ctx.collations().resolve(&ctx.config.default_collation);
        }
        let params = CollationParams { lang, case_order: case_order.as_param(), strength: None };
        ctx.collations().parameterized(&params).ok_or_else(|| collation_not_found(ctx, &params.to_uri()))
    }

    fn absolute_collation_uri(&self, uri: &str, ctx: &DynamicContext) -> Result<String, Error> {
        match Url::parse(uri) {
            Ok(_) => Ok(uri.to_string()),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                match self.base_uri.as_deref().or(ctx.base_uri.as_deref()) {
                    Some(base) => Ok(Url::parse(base)?.join(uri)?.to_string()),
                    None => Ok(uri.to_string()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Copy of this key with every attribute evaluated, keyed on the context
    /// item. Used where the key values have already been computed.
    pub fn fix(&self, ctx: &DynamicContext) -> Result<SortKeyDefinition, Error> {
        let mut fixed = SortKeyDefinition::new(Arc::new(ContextItem));
        fixed.order = Setting::Literal(self.order.resolve(ctx, SortOrder::parse)?);
        fixed.case_order = Setting::Literal(self.case_order.resolve(ctx, CaseOrder::parse)?);
        fixed.stable = Setting::Literal(self.stable.resolve(ctx, parse_stable)?);
        fixed.data_type =
            self.data_type.as_ref().map(|s| s.resolve(ctx, DataType::parse)).transpose()?.map(Setting::Literal);
        fixed.lang = self.lang.as_ref().map(|s| s.resolve(ctx, parse_lang)).transpose()?.map(Setting::Literal);
        fixed.collation_name =
            self.collation_name.as_ref().map(|s| s.resolve(ctx, parse_uri)).transpose()?.map(Setting::Literal);
        fixed.collation = self.collation.clone();
        fixed.base_uri = self.base_uri.clone();
        fixed.empty_least = self.empty_least;
        fixed.changed();
        Ok(fixed)
    }
}

impl Default for SortKeyDefinition {
    fn default() -> Self {
        Self::new(Arc::new(ContextItem))
    }
}
