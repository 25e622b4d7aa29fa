pub mod exit;
pub mod log_assert;
pub mod net;
pub mod process_tree;
pub mod terminate_notify;
pub mod time;

#[doc(hidden)]
pub use tracing;
