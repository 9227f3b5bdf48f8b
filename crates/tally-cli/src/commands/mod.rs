pub mod common;
pub mod completions;
pub mod dead_letters;
pub mod enqueue;
pub mod list;
pub mod requeue;
pub mod reset;
pub mod sync;
