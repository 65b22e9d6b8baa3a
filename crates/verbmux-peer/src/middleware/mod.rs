//! Ready-made middleware.

mod logger;
mod wrap_writer;

pub use logger::{logger, Logger};
pub use wrap_writer::WrapWriter;
