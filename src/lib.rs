pub mod app;
pub mod shutdown;

pub use app::{Application, RunOptions};
pub use shutdown::{wait_for_shutdown_signal, ShutdownManager, SHUTDOWN_GRACE_PERIOD};
