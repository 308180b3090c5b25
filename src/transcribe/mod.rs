pub mod backend;
pub mod descriptor;
pub mod dispatcher;
pub mod facade;
pub mod lifecycle;
pub mod registry;
pub mod sink;

pub use backend::{BackendKind, RemoteTranscriptionBackend};
pub use dispatcher::{BatchDispatcher, BatchReport, FileOutcome};
pub use facade::TranscriptionFacade;
pub use registry::{BackendRegistry, BackendResolver};
