//! Display titles for category and subcategory directories.

pub mod default;
pub mod load;
pub mod types;

pub use load::*;
pub use types::*;
