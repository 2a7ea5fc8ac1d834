mod accountant;
mod stream;
mod watchdog;

pub use accountant::{ProgressAccountant, MIN_INCREMENT};
pub use stream::ProgressStream;
pub use watchdog::StallWatchdog;
