//! # Transformation Pipeline
//!
//! Push-based chain of stages turning readings into tagged, publishable values.
//!
//! This module handles:
//! - Multicast subscription points ([`Provider`])
//! - The single stage capability ([`Stage`]) and its wiring ([`attach`])
//! - Channel extractors, derived processors and finalizers
//! - The standard graph used by every run mode ([`TelemetryGraph`])
//!
//! Stages run synchronously on whichever task publishes into their upstream.
//! There is no thread per stage and no buffering between stages, so each chain
//! publishes in the order it was invoked.

pub mod provider;
pub mod stage;
pub mod extractors;
pub mod processors;
pub mod finalizer;
pub mod graph;

pub use finalizer::{Finalizer, FinalizerSet};
pub use graph::{tags, TelemetryGraph};
pub use provider::{Provider, SubscriptionId};
pub use stage::{attach, Stage};
