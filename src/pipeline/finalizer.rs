//! Terminal stages attaching a stable tag to a scalar, and the tag registry
//! sinks subscribe through.

use std::sync::Arc;

use super::provider::Provider;
use super::stage::Stage;
use crate::error::Result;
use crate::telemetry::{Event, TaggedValue};

/// Wraps every upstream value as `(tag, value)`
#[derive(Debug, Clone, Copy)]
pub struct Finalizer {
    tag: &'static str,
}

impl Finalizer {
    pub fn new(tag: &'static str) -> Self {
        Self { tag }
    }

    pub fn tag(&self) -> &'static str {
        self.tag
    }
}

impl Stage<f32, TaggedValue> for Finalizer {
    fn name(&self) -> &str {
        self.tag
    }

    fn process(&self, event: &Event<f32>) -> Result<Event<TaggedValue>> {
        Ok(Event::new(
            event.stamp,
            TaggedValue {
                tag: self.tag,
                value: event.data,
            },
        ))
    }
}

/// Ordered registry of finalizer outputs keyed by tag
#[derive(Debug, Default, Clone)]
pub struct FinalizerSet {
    entries: Vec<(&'static str, Arc<Provider<TaggedValue>>)>,
}

impl FinalizerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a finalizer output; a tag registered twice keeps the latest
    pub fn insert(&mut self, tag: &'static str, provider: Arc<Provider<TaggedValue>>) {
        match self.entries.iter_mut().find(|(t, _)| *t == tag) {
            Some(entry) => entry.1 = provider,
            None => self.entries.push((tag, provider)),
        }
    }

    pub fn get(&self, tag: &str) -> Option<&Arc<Provider<TaggedValue>>> {
        self.entries.iter().find(|(t, _)| *t == tag).map(|(_, p)| p)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Arc<Provider<TaggedValue>>)> + '_ {
        self.entries.iter().map(|(t, p)| (*t, p))
    }

    pub fn tags(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|(t, _)| *t)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
