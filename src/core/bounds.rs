use crate::core::geo::Point;
use serde::{Deserialize, Serialize};

/// Axis-aligned box in projected coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: Point,
    pub max: Point,
}

impl Bounds {
    /// Creates new bounds from two points
    pub fn new(min: Point, max: Point) -> Self {
        Self { min, max }
    }

    /// Creates bounds from individual coordinates
    pub fn from_coords(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self::new(Point::new(min_x, min_y), Point::new(max_x, max_y))
    }

    /// Creates bounds from a center point and size
    pub fn from_center_and_size(center: Point, width: f64, height: f64) -> Self {
        let half_width = width / 2.0;
        let half_height = height / 2.0;
        Self::new(
            Point::new(center.x - half_width, center.y - half_height),
            Point::new(center.x + half_width, center.y + half_height),
        )
    }

    /// Formats as a WMS `BBOX` value, `minx,miny,maxx,maxy`
    pub fn to_bbox_param(&self) -> String {
        format!("{},{},{},{}", self.min.x, self.min.y, self.max.x, self.max.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_from_center() {
        let bounds = Bounds::from_center_and_size(Point::new(10.0, 20.0), 4.0, 2.0);
        assert_eq!(bounds.min, Point::new(8.0, 19.0));
        assert_eq!(bounds.max, Point::new(12.0, 21.0));
    }

    #[test]
    fn test_bbox_param() {
        let bounds = Bounds::from_coords(1.5, -2.0, 3.0, 4.25);
        assert_eq!(bounds.to_bbox_param(), "1.5,-2,3,4.25");
    }
}
