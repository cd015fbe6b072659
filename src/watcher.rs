use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{Instrument, debug, error, info, info_span};

use crate::error::WatchError;
use crate::publisher::Publisher;
use crate::resolver::Resolver;
use crate::runtime::{Connector, EventFilter, EventStream, Runtime, RuntimeEvent};

pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);

/// Delays applied when the runtime connection or subscription is lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Wait before resubscribing, and the first wait after a failed connect
    pub delay: Duration,
    /// Upper bound for the doubling wait between failed connects
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay: DEFAULT_RECONNECT_DELAY,
            max_delay: DEFAULT_MAX_RECONNECT_DELAY,
        }
    }
}

impl ReconnectPolicy {
    fn next_delay(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max_delay)
    }
}

/// Follows the runtime's image events and registers every pushed image with
/// the catalog.
pub struct Watcher<C: Connector> {
    connector: Arc<C>,
    resolver: Resolver<C>,
    publisher: Arc<Publisher>,
    filter: EventFilter,
    reconnect: ReconnectPolicy,
}

impl<C: Connector> Watcher<C> {
    pub fn new(connector: Arc<C>, publisher: Publisher, reconnect: ReconnectPolicy) -> Self {
        Self {
            resolver: Resolver::new(Arc::clone(&connector)),
            connector,
            publisher: Arc::new(publisher),
            filter: EventFilter::images(),
            reconnect,
        }
    }

    /// Runs forever. A lost subscription is re-established on a fresh
    /// connection after the reconnect delay.
    pub async fn run(&self) {
        loop {
            let runtime = self.connect().await;
            info!("subscribed to runtime events {:?}", self.filter.kinds());

            match self.process_events(runtime.events(&self.filter)).await {
                Ok(()) => info!("runtime closed the event stream"),
                Err(e) => error!("{}", e),
            }
            drop(runtime);

            sleep(self.reconnect.delay).await;
        }
    }

    /// Connects to the runtime, retrying with a doubling delay until it
    /// answers.
    async fn connect(&self) -> C::Runtime {
        let mut delay = self.reconnect.delay;
        loop {
            match self.connector.connect().await {
                Ok(runtime) => return runtime,
                Err(e) => {
                    error!("runtime connection failed: {}, retrying in {:?}", e, delay);
                    sleep(delay).await;
                    delay = self.reconnect.next_delay(delay);
                }
            }
        }
    }

    /// Handles events one at a time until the stream fails or ends. A clean
    /// end of stream is not an error.
    pub async fn process_events(&self, mut events: EventStream) -> Result<(), WatchError> {
        while let Some(event) = events.next().await {
            match event {
                Ok(event) => self.handle_event(event),
                Err(e) => return Err(WatchError::EventStream(e)),
            }
        }
        Ok(())
    }

    fn handle_event(&self, event: RuntimeEvent) {
        if !event.is_image_push() {
            debug!("ignoring {} {} event for {}", event.kind, event.action, event.id);
            return;
        }

        info!("image {} pushed", event.id);
        self.dispatch(event.id);
    }

    /// Resolves and publishes `image` in the background. Every resulting
    /// record is published by its own task. Neither kind of task is joined
    /// by the event loop.
    pub fn dispatch(&self, image: String) -> JoinHandle<()> {
        let resolver = self.resolver.clone();
        let publisher = Arc::clone(&self.publisher);
        let span = info_span!("push", image = %image);

        tokio::spawn(push_image(resolver, publisher, image).instrument(span))
    }
}

async fn push_image<C: Connector>(
    resolver: Resolver<C>,
    publisher: Arc<Publisher>,
    image: String,
) {
    let records = match resolver.resolve(&image).await {
        Ok(records) => records,
        Err(e) => {
            error!("{}", e);
            return;
        }
    };

    for record in records {
        let publisher = Arc::clone(&publisher);
        let span = info_span!("publish", digest = %record.digest);
        tokio::spawn(
            async move {
                publisher.publish(&record).await;
            }
            .instrument(span),
        );
    }
}
