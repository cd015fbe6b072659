//! The container runtime as seen by the watcher: an image event stream and
//! image inspection.

use std::collections::HashMap;

use async_trait::async_trait;
use bollard::Docker;
use bollard::models::EventMessage;
use bollard::system::EventsOptions;
use futures::StreamExt;
use futures::stream::BoxStream;
use tracing::debug;

use crate::error::RuntimeError;

pub const IMAGE_EVENT: &str = "image";
pub const PUSH_ACTION: &str = "push";

/// One message from the runtime event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeEvent {
    /// Event category, e.g. `image` or `container`
    pub kind: String,
    pub action: String,
    /// Actor identifier. For image events this is the image reference.
    pub id: String,
}

impl RuntimeEvent {
    pub fn new(kind: impl Into<String>, action: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            action: action.into(),
            id: id.into(),
        }
    }

    pub fn is_image_push(&self) -> bool {
        self.kind == IMAGE_EVENT && self.action == PUSH_ACTION
    }
}

impl From<EventMessage> for RuntimeEvent {
    fn from(message: EventMessage) -> Self {
        Self {
            kind: message.typ.map(|typ| typ.to_string()).unwrap_or_default(),
            action: message.action.unwrap_or_default(),
            id: message.actor.and_then(|actor| actor.id).unwrap_or_default(),
        }
    }
}

/// Local metadata of an image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageInspection {
    /// `repository:tag` entries
    pub repo_tags: Vec<String>,
    /// `repository@algorithm:hash` entries
    pub repo_digests: Vec<String>,
}

/// Restricts an event subscription to a set of event categories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFilter {
    kinds: Vec<String>,
}

impl EventFilter {
    /// Image events only.
    pub fn images() -> Self {
        Self {
            kinds: vec![IMAGE_EVENT.to_string()],
        }
    }

    pub fn kinds(&self) -> &[String] {
        &self.kinds
    }

    pub fn matches(&self, event: &RuntimeEvent) -> bool {
        self.kinds.iter().any(|kind| *kind == event.kind)
    }

    fn to_docker_filters(&self) -> HashMap<String, Vec<String>> {
        HashMap::from([("type".to_string(), self.kinds.clone())])
    }
}

pub type EventStream = BoxStream<'static, Result<RuntimeEvent, RuntimeError>>;

/// A live connection to the container runtime.
#[async_trait]
pub trait Runtime: Send + Sync {
    async fn inspect_image(&self, name: &str) -> Result<ImageInspection, RuntimeError>;

    /// Subscribes to runtime events. The stream ends when the runtime closes
    /// the subscription.
    fn events(&self, filter: &EventFilter) -> EventStream;
}

/// Opens runtime connections. Every call yields a fresh, independent handle.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Runtime: Runtime + 'static;

    async fn connect(&self) -> Result<Self::Runtime, RuntimeError>;
}

/// Connects to the local Docker daemon, honouring `DOCKER_HOST`.
#[derive(Debug, Clone, Default)]
pub struct DockerConnector;

#[async_trait]
impl Connector for DockerConnector {
    type Runtime = DockerRuntime;

    async fn connect(&self) -> Result<DockerRuntime, RuntimeError> {
        let docker = Docker::connect_with_local_defaults()?;
        // the client is lazy, so make sure the daemon actually answers
        let version = docker.ping().await?;
        debug!("connected to docker daemon: {}", version);
        Ok(DockerRuntime { docker })
    }
}

pub struct DockerRuntime {
    docker: Docker,
}

#[async_trait]
impl Runtime for DockerRuntime {
    async fn inspect_image(&self, name: &str) -> Result<ImageInspection, RuntimeError> {
        let image = self.docker.inspect_image(name).await?;
        Ok(ImageInspection {
            repo_tags: image.repo_tags.unwrap_or_default(),
            repo_digests: image.repo_digests.unwrap_or_default(),
        })
    }

    fn events(&self, filter: &EventFilter) -> EventStream {
        let docker = self.docker.clone();
        let options = EventsOptions::<String> {
            filters: filter.to_docker_filters(),
            ..Default::default()
        };

        Box::pin(async_stream::stream! {
            let mut messages = Box::pin(docker.events(Some(options)));
            while let Some(message) = messages.next().await {
                yield message.map(RuntimeEvent::from).map_err(RuntimeError::from);
            }
        })
    }
}
