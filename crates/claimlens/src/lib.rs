pub mod config;
pub mod error;
pub mod isolate;
pub mod ops;
pub mod pipeline;
pub mod queue;
pub mod store;
pub mod watcher;
pub mod worker;
pub mod workspace;

pub use config::{load_config, Config};
pub use error::{ClaimlensError, ConfigError, OpsError, QueueError, Result, WatchError};
pub use isolate::{IsolateError, IsolatedCall};
pub use ops::QueryOps;
pub use pipeline::{Collaborators, EvidenceHit, PipelineError, QueryPipeline};
pub use queue::{JobQueue, JobTicket};
pub use store::{derive_status, Database, QueryRecord, QueryStatus, Stage, StageMap, StageState, StoreError};
pub use watcher::QueryWatcher;
pub use worker::Worker;
pub use workspace::WorkspaceLayout;
