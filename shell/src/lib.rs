//! Client-side half of the seat-desk access gate.
//!
//! [`machine`] decides, [`runtime`] performs. [`api`] and [`storage`] are the
//! collaborators the runtime talks to.

pub mod api;
pub mod machine;
pub mod runtime;
pub mod storage;

pub use api::{ApiError, HttpSessionApi, SessionApi};
pub use machine::{ShellGuard, View};
pub use runtime::{RuntimeOptions, ShellCommand, ShellRuntime};
