use crate::{
    core::{bounds::Bounds, geo::Point},
    data::geojson::GeoJsonFeature,
};

use rstar::{RTree, RTreeObject, AABB};

/// A spatial item that can be indexed via an R-tree
#[derive(Debug, Clone)]
pub struct SpatialItem<T> {
    pub id: String,
    pub bounds: Bounds,
    pub data: T,
}

impl<T> SpatialItem<T> {
    pub fn new(id: String, bounds: Bounds, data: T) -> Self {
        Self { id, bounds, data }
    }
}

impl<T> PartialEq for SpatialItem<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> RTreeObject for SpatialItem<T> {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(
            [self.bounds.min.x, self.bounds.min.y],
            [self.bounds.max.x, self.bounds.max.y],
        )
    }
}

/// R-tree over items in projected coordinates
#[derive(Debug)]
pub struct SpatialIndex<T> {
    rtree: RTree<SpatialItem<T>>,
}

impl<T> SpatialIndex<T> {
    pub fn new() -> Self {
        Self { rtree: RTree::new() }
    }

    /// Builds a balanced tree from all items at once.
    pub fn bulk_load(items: Vec<SpatialItem<T>>) -> Self {
        Self {
            rtree: RTree::bulk_load(items),
        }
    }

    pub fn insert(&mut self, item: SpatialItem<T>) {
        self.rtree.insert(item);
    }

    /// Items whose bounds intersect `bounds`.
    pub fn query(&self, bounds: &Bounds) -> Vec<&SpatialItem<T>> {
        let envelope = AABB::from_corners([bounds.min.x, bounds.min.y], [bounds.max.x, bounds.max.y]);
        self.rtree.locate_in_envelope_intersecting(&envelope).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.rtree.size() == 0
    }

    pub fn len(&self) -> usize {
        self.rtree.size()
    }
}

impl<T> Default for SpatialIndex<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Geometry used to hit-test a locally held feature.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape {
    Point(Point),
    Segment(Point, Point),
}

impl Shape {
    pub fn bounds(&self) -> Bounds {
        match self {
            Shape::Point(p) => Bounds::new(*p, *p),
            Shape::Segment(a, b) => Bounds::from_coords(a.x.min(b.x), a.y.min(b.y), a.x.max(b.x), a.y.max(b.y)),
        }
    }

    pub fn distance_to(&self, point: &Point) -> f64 {
        match self {
            Shape::Point(p) => p.distance_to(point),
            Shape::Segment(a, b) => point.distance_to_segment(a, b),
        }
    }
}

/// Features held in memory (street-image points, connection lines) indexed
/// for click hit-testing.
#[derive(Debug, Default)]
pub struct FeatureIndex {
    features: Vec<GeoJsonFeature>,
    shapes: Vec<Shape>,
    index: SpatialIndex<usize>,
}

impl FeatureIndex {
    pub fn new(entries: Vec<(Shape, GeoJsonFeature)>) -> Self {
        let (shapes, features): (Vec<_>, Vec<_>) = entries.into_iter().unzip();
        let items = shapes
            .iter()
            .enumerate()
            .map(|(i, shape)| SpatialItem::new(i.to_string(), shape.bounds(), i))
            .collect();
        Self {
            features,
            shapes,
            index: SpatialIndex::bulk_load(items),
        }
    }

    /// Features within `tolerance` of `at`, nearest first. Equal distances
    /// keep insertion order.
    pub fn hit_test(&self, at: &Point, tolerance: f64) -> Vec<&GeoJsonFeature> {
        let window = Bounds::from_center_and_size(*at, tolerance * 2.0, tolerance * 2.0);
        let mut hits: Vec<(f64, usize)> = self
            .index
            .query(&window)
            .into_iter()
            .map(|item| item.data)
            .filter_map(|i| {
                let distance = self.shapes[i].distance_to(at);
                (distance <= tolerance).then_some((distance, i))
            })
            .collect();
        hits.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        hits.into_iter().map(|(_, i)| &self.features[i]).collect()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::geojson::GeoJsonGeometry;
    use crate::core::geo::LatLng;

    fn feature(id: &str) -> GeoJsonFeature {
        GeoJsonFeature::new(id, GeoJsonGeometry::point(LatLng::default()), Default::default())
    }

    #[test]
    fn test_query_returns_intersecting_items() {
        let mut index = SpatialIndex::new();
        index.insert(SpatialItem::new("a".into(), Bounds::from_coords(0.0, 0.0, 1.0, 1.0), 1));
        index.insert(SpatialItem::new("b".into(), Bounds::from_coords(3.0, 4.0, 3.0, 4.0), 2));
        assert_eq!(index.len(), 2);

        let hits = index.query(&Bounds::from_coords(0.5, 0.5, 2.0, 2.0));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a");
        assert!(index.query(&Bounds::from_coords(10.0, 10.0, 11.0, 11.0)).is_empty());
    }

    #[test]
    fn test_hit_test_points_and_segments() {
        let index = FeatureIndex::new(vec![
            (Shape::Point(Point::new(10.0, 10.0)), feature("p")),
            (Shape::Segment(Point::new(0.0, 0.0), Point::new(100.0, 0.0)), feature("s")),
        ]);

        let hits = index.hit_test(&Point::new(50.0, 3.0), 5.0);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, Some("s".into()));

        let hits = index.hit_test(&Point::new(10.0, 6.0), 8.0);
        let ids: Vec<_> = hits.iter().map(|f| f.id.clone().unwrap()).collect();
        assert_eq!(ids, vec![serde_json::Value::from("p"), serde_json::Value::from("s")]);

        assert!(index.hit_test(&Point::new(500.0, 500.0), 8.0).is_empty());
    }
}
