//! Strongly-typed domain types and shared constants.
//!
//! # Example
//!
//! ```
//! use icesheet_rs::types::{DomainExtent, FieldId, SECONDS_PER_YEAR};
//!
//! let extent = DomainExtent::centered(800e3, 800e3);
//! assert_eq!(extent.width(), 1600e3);
//! assert_eq!(FieldId::new(3).to_string(), "F3");
//! assert!((SECONDS_PER_YEAR - 3.15569259747e7).abs() < 1e-3);
//! ```

mod bounds;
mod indices;
mod physical;
mod sides;

pub use bounds::DomainExtent;
pub use indices::FieldId;
pub use physical::{SECONDS_PER_DAY, SECONDS_PER_YEAR};
pub use sides::SideNeighbors;
