pub mod add;
pub mod common;
pub mod config;
pub mod conflicts;
pub mod queue;
pub mod sync;
