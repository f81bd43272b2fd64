//! Directory scanning.

mod scan;

pub use scan::scan;
