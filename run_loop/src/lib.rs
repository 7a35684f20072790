#![allow(clippy::new_without_default)]

mod run_loop;
mod run_loop_sender;
mod task;
mod thread_id;

pub use run_loop::*;
pub use run_loop_sender::*;
pub use task::*;
pub use thread_id::*;

// Note: These modules are public but there are no API stability guarantees
pub mod platform;
pub mod util;
