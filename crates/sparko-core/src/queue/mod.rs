//! Swipe queue: card lifecycle, refills and decision settlement

mod manager;
mod state;
pub mod types;

pub use manager::QueueManager;
pub use types::*;
