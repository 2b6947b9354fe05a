//! Import pipeline services
//!
//! normalizer → diff_engine → batch_dispatcher, driven by
//! import_orchestrator, with progress kept in progress_store and swept by
//! session_gc.

pub mod batch_dispatcher;
pub mod diff_engine;
pub mod import_orchestrator;
pub mod normalizer;
pub mod progress_store;
pub mod remote_store;
pub mod session_gc;

pub use batch_dispatcher::{BatchDispatcher, DispatchOutcome, DispatchSettings};
pub use diff_engine::{Classification, ExistingRecordIndex, SyncPlan};
pub use import_orchestrator::{fail_session, ImportOrchestrator};
pub use normalizer::{normalize_all, NormalizeError, Normalized};
pub use progress_store::{InMemoryProgressStore, ProgressStore, SessionInfo};
pub use remote_store::{HttpRemoteStore, RecordUpdate, RemoteError, RemoteRecord, RemoteStore};
pub use session_gc::{collect_garbage, GcPolicy, SessionGc};
