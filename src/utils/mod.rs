//! Small helpers shared across modules.

pub mod text;
pub mod time;
