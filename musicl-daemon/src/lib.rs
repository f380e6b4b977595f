//! Long-running scheduler: per-feed timers, config watcher, control socket.

mod error;
pub mod paths;
pub mod protocol;
mod runtime;
pub mod scheduler;

pub use error::DaemonError;
pub use protocol::{
    request_status, request_stop, request_sync, send_request, DaemonRequest, DaemonResponse,
};
pub use runtime::{init_tracing, run, start_blocking, DaemonState};
pub use scheduler::{FeedCheck, FeedScheduler, FeedState, FeedStatus, Trigger};
