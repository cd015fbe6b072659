pub mod config;
pub mod error;
pub mod publisher;
pub mod reference;
pub mod resolver;
pub mod runtime;
pub mod watcher;

pub use publisher::{PublishOutcome, PublishPolicy, Publisher};
pub use resolver::{ImageRecord, Resolver};
pub use runtime::{Connector, DockerConnector, EventFilter, ImageInspection, Runtime, RuntimeEvent};
pub use watcher::{ReconnectPolicy, Watcher};
