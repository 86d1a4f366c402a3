// Allow uninlined format args for cleaner bail!/anyhow! macros
#![allow(clippy::uninlined_format_args)]
#![doc = include_str!("../README.md")]

pub mod graph;
pub mod loader;
pub mod minify;
pub mod packager;
pub mod resolver;
pub mod runtime;
pub mod text;
pub mod transform;

#[macro_use]
extern crate lazy_static;

pub use anyhow;
pub use minify::{Minifiers, Minify};
pub use packager::{bundle, BundleOptions};
pub use resolver::{OverrideResolution, ResolveOverride};
