pub mod common;
pub mod completions;
pub mod photos;
pub mod records;
pub mod sync;
