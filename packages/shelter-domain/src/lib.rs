pub mod change;
pub mod duration_nanos;
pub mod log;
pub mod query;
pub mod retention;
pub mod time_serde;

pub use change::{ChangeError, ChangeEvent, ChangeOp, IndexAction};
pub use log::{AppendRequest, LogRecord, NotifyIntent};
pub use query::{ListQuery, Order, QueryError, Selector, TimelineQuery, TimelineWindow};
pub use retention::RetentionPolicy;
