//! Agent domain types: naming, lineages, parsed records and navigation.

pub mod nav;
pub mod naming;
pub mod source;
pub mod types;

pub use nav::*;
pub use naming::*;
pub use source::*;
pub use types::*;
