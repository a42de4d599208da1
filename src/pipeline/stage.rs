//! The single stage capability and the wiring helper.

use std::sync::Arc;

use tracing::warn;

use super::provider::Provider;
use crate::error::Result;
use crate::telemetry::Event;

/// One pipeline stage: consumes `Event<In>`, produces `Event<Out>`
///
/// `process` must not mutate the event it is given. It may consult its own
/// state (guarded internally, since a stage can be reached from several root
/// providers at once).
pub trait Stage<In, Out>: Send + Sync + 'static {
    /// Name used in logs and as the downstream provider's name
    fn name(&self) -> &str;

    fn process(&self, event: &Event<In>) -> Result<Event<Out>>;
}

/// Subscribe `stage` to `upstream` and return the provider it republishes on
///
/// The stage runs for every upstream event even if nothing subscribes
/// downstream. A failing event is logged and dropped; it never reaches the
/// upstream publisher.
///
/// # Examples
///
/// ```
/// use groundlink::pipeline::{attach, Provider};
/// use groundlink::pipeline::processors::VelocityProcessor;
///
/// let altitude = Provider::<f32>::new("altitude");
/// let velocity = attach(&altitude, VelocityProcessor::new());
/// assert_eq!(altitude.subscriber_count(), 1);
/// assert_eq!(velocity.name(), "velocity");
/// ```
pub fn attach<In, Out, S>(upstream: &Provider<In>, stage: S) -> Arc<Provider<Out>>
where
    In: 'static,
    Out: 'static,
    S: Stage<In, Out>,
{
    let downstream = Arc::new(Provider::new(stage.name()));
    let output = Arc::clone(&downstream);

    upstream.subscribe(move |event: &Event<In>| match stage.process(event) {
        Ok(processed) => {
            output.publish(&processed);
        }
        Err(e) => {
            warn!(stage = stage.name(), "Dropping event: {}", e);
        }
    });

    downstream
}
