mod buffer;
mod dispatch;
mod error;
mod kernel;
mod scheduler;
mod thread;
mod util;

pub use buffer::*;
pub use dispatch::*;
pub use error::RuntimeError;
pub use kernel::*;
pub use thread::ThreadContext;
pub use util::ThreadPool;
