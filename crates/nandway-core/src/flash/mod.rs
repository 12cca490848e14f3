//! NAND flash operations
//!
//! This module provides the device abstraction, the block programming
//! protocol and the bulk operations (dump, program, diff program) built on
//! top of it.

mod device;
mod diff;
mod operations;

pub use device::{check_page_len, NandDevice};
pub use diff::{parse_diff, DiffEntry};
pub use operations::*;
