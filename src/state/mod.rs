//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `PageStatus`: lifecycle status of a page record (waiting, processing)
//! - `PageLeases`: in-process exclusive holds so one record is walked by one spider at a time

mod lease;
mod page_status;

// Re-export main types
pub use lease::{PageLease, PageLeases};
pub use page_status::PageStatus;
