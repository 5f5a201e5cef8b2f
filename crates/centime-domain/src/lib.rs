//! centime-domain
//!
//! Pure domain models (spending records, allocation lines and documents,
//! category and bank reference data). No I/O, no storage. Only data types
//! and the shared money rounding policy.

pub mod allocation;
pub mod category;
pub mod money;
pub mod spending;

pub use allocation::*;
pub use category::*;
pub use money::*;
pub use spending::*;
