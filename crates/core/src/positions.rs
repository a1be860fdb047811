//! Map positions for range-sensitive script effects

use serde::{Deserialize, Serialize};

/// Cell position on a named map
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapPosition {
    pub map: String,
    pub x: i32,
    pub y: i32,
}

impl MapPosition {
    pub fn new(map: impl Into<String>, x: i32, y: i32) -> Self {
        Self { map: map.into(), x, y }
    }

    /// Chebyshev distance in cells, `None` when the maps differ
    pub fn distance_to(&self, other: &MapPosition) -> Option<u32> {
        if self.map != other.map {
            return None;
        }
        let dx = (self.x - other.x).unsigned_abs();
        let dy = (self.y - other.y).unsigned_abs();
        Some(dx.max(dy))
    }

    /// True when both positions share a map and lie within `range` cells
    pub fn within(&self, other: &MapPosition, range: u32) -> bool {
        self.distance_to(other).map_or(false, |d| d <= range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_same_map() {
        let a = MapPosition::new("prontera", 150, 150);
        let b = MapPosition::new("prontera", 153, 146);
        assert_eq!(a.distance_to(&b), Some(4));
        assert!(a.within(&b, 4));
        assert!(!a.within(&b, 3));
    }

    #[test]
    fn test_distance_other_map() {
        let a = MapPosition::new("prontera", 0, 0);
        let b = MapPosition::new("geffen", 0, 0);
        assert_eq!(a.distance_to(&b), None);
        assert!(!a.within(&b, 100));
    }
}
