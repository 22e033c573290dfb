// markshelf state managers
// Managers own the in-memory working set and the pure ordering logic over it.

pub mod collection;
pub mod query;
pub mod reorder;
pub mod sync_controller;
