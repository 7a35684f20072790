#![allow(clippy::new_without_default)]
#![allow(clippy::missing_safety_doc)]

mod config;
mod dispatcher;
mod error;
mod handle;
mod managed;
mod module;
mod registry;
mod signature;
mod value;

pub use config::*;
pub use dispatcher::*;
pub use error::*;
pub use handle::*;
pub use managed::*;
pub use module::*;
pub use registry::*;
pub use signature::*;
pub use value::*;

/// Types shared with native code. Native modules written in Rust depend on
/// this crate for [`abi::run_entry`] and [`abi::NativeCall`].
pub mod abi;
