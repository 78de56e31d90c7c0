//! Interpreter for the IPPcode23 instruction language.
//!
//! A program document is loaded ([`program::load`]) into an ordered
//! instruction vector with a resolved label table, then run to completion by
//! [`vm::Vm`]. `document` is the XML-shaped tree adapter the loader is built
//! against; `opcode`/`operand`/`value`/`frame`/`operators`/`io` are the data
//! model and stateless helpers the VM composes.

pub mod document;
pub mod error;
pub mod frame;
pub mod io;
pub mod opcode;
pub mod operand;
pub mod operators;
pub mod program;
pub mod value;
pub mod vm;

pub use error::{Error, Result};
