//! Stack machine module for GASP

mod frame;
#[allow(clippy::module_inception)]
mod machine;

pub(crate) use frame::*;
pub(crate) use machine::*;
