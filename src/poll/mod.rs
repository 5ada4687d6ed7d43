//! Job polling - single and batched.

mod batch;
mod poller;

pub use batch::*;
pub use poller::*;
