//! Strongly-typed index newtypes.
//!
//! Field handles are plain `usize` underneath; the wrapper keeps them
//! apart from grid and level indices.

use std::fmt;

/// Macro to generate index newtypes with common functionality.
macro_rules! define_index {
    (
        $(#[$meta:meta])*
        $name:ident, $display_prefix:literal
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[derive(serde::Serialize, serde::Deserialize)]
        #[repr(transparent)]
        pub struct $name(usize);

        impl $name {
            /// Create a new index.
            #[inline]
            pub const fn new(index: usize) -> Self {
                Self(index)
            }

            /// Get the raw index value.
            #[inline]
            pub const fn get(self) -> usize {
                self.0
            }

            /// Create an iterator over [0, n).
            pub fn iter(n: usize) -> impl ExactSizeIterator<Item = $name> {
                (0..n).map($name)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}{}", $display_prefix, self.0)
            }
        }

        impl From<usize> for $name {
            #[inline]
            fn from(index: usize) -> Self {
                Self(index)
            }
        }

        impl From<$name> for usize {
            #[inline]
            fn from(idx: $name) -> usize {
                idx.0
            }
        }

        impl<T> std::ops::Index<$name> for Vec<T> {
            type Output = T;
            #[inline]
            fn index(&self, idx: $name) -> &T {
                &self[idx.0]
            }
        }

        impl<T> std::ops::IndexMut<$name> for Vec<T> {
            #[inline]
            fn index_mut(&mut self, idx: $name) -> &mut T {
                &mut self[idx.0]
            }
        }
    };
}

define_index!(
    /// Handle to a field registered in a [`FieldStore`](crate::fields::FieldStore).
    ///
    /// # Example
    ///
    /// ```
    /// use icesheet_rs::types::FieldId;
    ///
    /// let id = FieldId::new(3);
    /// assert_eq!(id.get(), 3);
    /// assert_eq!(id.to_string(), "F3");
    /// ```
    FieldId,
    "F"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_indexing() {
        let mut data = vec![10, 20, 30];
        let idx = FieldId::new(1);
        assert_eq!(data[idx], 20);
        data[idx] = 25;
        assert_eq!(data[1], 25);
    }

    #[test]
    fn test_iter_and_display() {
        let ids: Vec<_> = FieldId::iter(4).collect();
        assert_eq!(ids.len(), 4);
        assert_eq!(ids[3].get(), 3);
        assert_eq!(FieldId::new(2).to_string(), "F2");
    }

    #[test]
    fn test_from_conversions() {
        let id: FieldId = 7.into();
        let back: usize = id.into();
        assert_eq!(back, 7);
    }
}
