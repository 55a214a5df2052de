//! The slice of the expression machinery the sort engine depends on.
//!
//! Sort keys and `xsl:sort` attribute value templates are compiled elsewhere;
//! here they are only evaluated. The implementations below cover literals,
//! the context item, variable references and closures, which is enough for
//! callers that build sort keys programmatically.

use crate::context::DynamicContext;
use crate::error::{Error, ErrorCode};
use crate::xdm::{AtomicValue, ExpandedName, Item, PrimitiveType, Sequence};
use core::fmt;
use std::sync::Arc;

pub trait Expression: Send + Sync + fmt::Debug {
    fn evaluate(&self, ctx: &DynamicContext) -> Result<Sequence, Error>;

    /// Evaluate to at most one item; more than one is a type error.
    fn evaluate_item(&self, ctx: &DynamicContext) -> Result<Option<Item>, Error> {
        let mut seq = self.evaluate(ctx)?;
        match seq.len() {
            0 => Ok(None),
            1 => Ok(seq.pop()),
            n => Err(Error::from_code(ErrorCode::XPTY0004, format!("expected at most one item, got {n}"))),
        }
    }

    /// String value of the single item, or the empty string for `()`.
    fn evaluate_as_string(&self, ctx: &DynamicContext) -> Result<String, Error> {
        Ok(self.evaluate_item(ctx)?.map(|i| i.string_value()).unwrap_or_default())
    }

    /// The value this expression always yields, if known without evaluation.
    fn as_literal(&self) -> Option<&Sequence> {
        None
    }

    /// Static item type of the result, when known.
    fn static_type(&self) -> PrimitiveType {
        PrimitiveType::AnyAtomic
    }

    /// Whether evaluation reads the context item, position or size.
    fn depends_on_focus(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone)]
pub struct Literal {
    value: Sequence,
}

impl Literal {
    pub fn new(value: impl Into<AtomicValue>) -> Self {
        Self { value: vec![Item::Atomic(value.into())] }
    }

    pub fn string(s: impl Into<String>) -> Self {
        Self::new(AtomicValue::String(s.into()))
    }

    pub fn sequence(value: Sequence) -> Self {
        Self { value }
    }

    pub fn empty() -> Self {
        Self { value: Vec::new() }
    }

    pub fn value(&self) -> &Sequence {
        &self.value
    }

    pub fn shared(self) -> Arc<dyn Expression> {
        Arc::new(self)
    }
}

impl Expression for Literal {
    fn evaluate(&self, _ctx: &DynamicContext) -> Result<Sequence, Error> {
        Ok(self.value.clone())
    }

    fn as_literal(&self) -> Option<&Sequence> {
        Some(&self.value)
    }

    fn static_type(&self) -> PrimitiveType {
        match self.value.as_slice() {
            [Item::Atomic(a)] => a.primitive_type(),
            [Item::Node(_)] => PrimitiveType::UntypedAtomic,
            _ => PrimitiveType::AnyAtomic,
        }
    }

    fn depends_on_focus(&self) -> bool {
        false
    }
}

/// The context item `.`
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextItem;

impl Expression for ContextItem {
    fn evaluate(&self, ctx: &DynamicContext) -> Result<Sequence, Error> {
        Ok(vec![ctx.context_item()?.clone()])
    }
}

#[derive(Debug, Clone)]
pub struct VariableRef {
    pub name: ExpandedName,
}

impl VariableRef {
    pub fn new(name: ExpandedName) -> Self {
        Self { name }
    }
}

impl Expression for VariableRef {
    fn evaluate(&self, ctx: &DynamicContext) -> Result<Sequence, Error> {
        Ok(ctx.variable(&self.name)?.clone())
    }

    fn depends_on_focus(&self) -> bool {
        false
    }
}

type EvalFn = dyn Fn(&DynamicContext) -> Result<Sequence, Error> + Send + Sync;

/// Expression backed by a closure.
#[derive(Clone)]
pub struct FnExpression {
    f: Arc<EvalFn>,
    static_type: PrimitiveType,
    depends_on_focus: bool,
}

impl FnExpression {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&DynamicContext) -> Result<Sequence, Error> + Send + Sync + 'static,
    {
        Self { f: Arc::new(f), static_type: PrimitiveType::AnyAtomic, depends_on_focus: true }
    }

    /// A closure over the context item's atomized value.
    pub fn atomized<F>(f: F) -> Self
    where
        F: Fn(&AtomicValue) -> Result<Option<AtomicValue>, Error> + Send + Sync + 'static,
    {
        Self::new(move |ctx| {
            let value = ctx.context_item()?.atomize();
            Ok(f(&value)?.map(Item::Atomic).into_iter().collect())
        })
    }

    pub fn with_static_type(mut self, ty: PrimitiveType) -> Self {
        self.static_type = ty;
        self
    }

    pub fn focus_independent(mut self) -> Self {
        self.depends_on_focus = false;
        self
    }
}

impl fmt::Debug for FnExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnExpression").field("static_type", &self.static_type).finish_non_exhaustive()
    }
}

impl Expression for FnExpression {
    fn evaluate(&self, ctx: &DynamicContext) -> Result<Sequence, Error> {
        (self.f)(ctx)
    }

    fn static_type(&self) -> PrimitiveType {
        self.static_type
    }

    fn depends_on_focus(&self) -> bool {
        self.depends_on_focus
    }
}
