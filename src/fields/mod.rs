//! Named distributed fields.
//!
//! The [`FieldStore`] owns every field's storage. Components hold
//! [`FieldId`](crate::types::FieldId) handles and borrow scoped accessors:
//! a [`FieldWrite`] marks the field's ghosts stale when it is dropped
//! after writing, and [`FieldStore::stencil`] refuses cross-cell reads
//! until [`FieldStore::update_ghosts`] has run.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use icesheet_rs::fields::{FieldStore, Var};
//! use icesheet_rs::grid::{Grid, GridParameters};
//!
//! let grid = Arc::new(Grid::serial(GridParameters::new(11, 11, 10e3, 10e3)).unwrap());
//! let mut store = FieldStore::new(grid);
//! let thk = store.ensure(Var::Thickness).unwrap();
//!
//! store.access_mut(thk).unwrap().set(5, 5, 100.0);
//! assert!(store.stencil(thk).is_err());
//! store.update_ghosts(thk).unwrap();
//! assert_eq!(store.stencil(thk).unwrap().get(5, 5), 100.0);
//! assert_eq!(store.range(thk).unwrap(), (0.0, 100.0));
//! ```

mod metadata;
mod regrid;
mod store;
mod units;
mod vars;

pub use metadata::{FILL_VALUE, FieldMetadata, FieldShape};
pub use regrid::{SourceField, regrid_into};
pub use store::{Field, FieldRead, FieldStore, FieldView, FieldWrite};
pub use units::{Unit, convert_in_place};
pub use vars::Var;
