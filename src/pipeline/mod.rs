pub mod applier;
pub mod dispatcher;
pub mod ingest;
pub mod queue;

pub use applier::ConfigApplier;
pub use dispatcher::Dispatcher;
pub use ingest::EventIngest;
pub use queue::{EventQueue, QueueStats};
