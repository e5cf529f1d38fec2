//! Work queue, topics and jobs. Check out [`WorkQueue`] as a starting point.
mod job;
mod publishing;
mod topic;
mod work_queue;

pub use job::Job;
pub use publishing::{Publishing, PERSISTENT, TRANSIENT};
pub use topic::Topic;
pub use work_queue::WorkQueue;
