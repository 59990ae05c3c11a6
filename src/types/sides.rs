//! Per-side values with named fields.

/// A value for each side of a rectangular patch.
///
/// Used for the neighbouring ranks of a patch in the horizontal
/// partition: `None` marks a non-periodic outer edge.
///
/// # Example
///
/// ```
/// use icesheet_rs::types::SideNeighbors;
///
/// let n = SideNeighbors::new(Some(1), None, Some(2), None);
/// assert_eq!(n.south, Some(1));
/// assert_eq!(n.iter().filter(|s| s.is_some()).count(), 2);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct SideNeighbors<T> {
    /// Toward decreasing y
    pub south: T,
    /// Toward increasing x
    pub east: T,
    /// Toward increasing y
    pub north: T,
    /// Toward decreasing x
    pub west: T,
}

impl<T> SideNeighbors<T> {
    /// Order: south, east, north, west.
    pub fn new(south: T, east: T, north: T, west: T) -> Self {
        Self {
            south,
            east,
            north,
            west,
        }
    }

    /// Map a function over all sides.
    pub fn map<U, F: FnMut(T) -> U>(self, mut f: F) -> SideNeighbors<U> {
        SideNeighbors {
            south: f(self.south),
            east: f(self.east),
            north: f(self.north),
            west: f(self.west),
        }
    }

    /// Iterate in order: south, east, north, west.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        [&self.south, &self.east, &self.north, &self.west].into_iter()
    }
}
