//! Push-based tree-construction events.
//!
//! A [`Receiver`] consumes the events that describe a tree: documents,
//! elements with their namespaces and attributes, and leaf content. A
//! [`Pipeline`] routes events through an ordered list of [`Filter`] stages
//! before they reach a terminal receiver such as [`TreeBuilder`], [`Sink`]
//! or [`EventRecorder`].

mod builder;
mod checker;
mod config;
mod namespace;
mod pipeline;
mod receiver;
mod record;
mod sink;
mod strip;
mod trace;
mod use_when;

pub use builder::TreeBuilder;
pub use checker::{ContentChecker, NestingState};
pub use config::{
    ErrorReporter, ParseOptions, PipelineConfiguration, SchemaUriResolver, Severity, StandardUriResolver,
    TracingErrorReporter, UriResolver,
};
pub use namespace::NamespaceReducer;
pub use pipeline::{Emitter, Filter, Pipeline, PipelineBuilder};
pub use receiver::{Receiver, ReceiverOptions};
pub use record::{Event, EventRecorder};
pub use sink::Sink;
pub use strip::{NameTest, SpaceStrippingRule, Stripper};
pub use trace::TracingFilter;
pub use use_when::{GuardContext, GuardEvaluator, UseWhenFilter};

pub use crate::context::HostLanguage;
