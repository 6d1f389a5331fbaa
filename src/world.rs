use std::collections::HashMap;

use serde_json::Value;

use crate::constants::{OFFICE_WIDTH, ROAD_HALF_WIDTH};
use crate::geom::Point2D;
use crate::rng::Rng;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GridPoint {
    pub x: i32,
    pub y: i32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn contains(&self, point: Point2D) -> bool {
        point.x >= self.min_x
            && point.x <= self.max_x
            && point.y >= self.min_y
            && point.y <= self.max_y
    }

    /// Liang-Barsky slab clip. A degenerate segment degrades to a
    /// containment check.
    pub fn intersects_segment(&self, a: Point2D, b: Point2D) -> bool {
        let mut t0: f64 = 0.0;
        let mut t1: f64 = 1.0;
        let axes = [
            (a.x, b.x - a.x, self.min_x, self.max_x),
            (a.y, b.y - a.y, self.min_y, self.max_y),
        ];
        for (start, delta, min, max) in axes {
            if delta.abs() < f64::EPSILON {
                if start < min || start > max {
                    return false;
                }
            } else {
                let mut near = (min - start) / delta;
                let mut far = (max - start) / delta;
                if near > far {
                    std::mem::swap(&mut near, &mut far);
                }
                t0 = t0.max(near);
                t1 = t1.min(far);
                if t0 > t1 {
                    return false;
                }
            }
        }
        true
    }
}

#[derive(Clone, Debug)]
pub struct Road {
    start: GridPoint,
    end: GridPoint,
    bounding_box: BoundingBox,
}

impl Road {
    pub fn horizontal(start: GridPoint, end_x: i32) -> Self {
        Self::build(start, GridPoint { x: end_x, y: start.y })
    }

    pub fn vertical(start: GridPoint, end_y: i32) -> Self {
        Self::build(start, GridPoint { x: start.x, y: end_y })
    }

    fn build(start: GridPoint, end: GridPoint) -> Self {
        let min_x = start.x.min(end.x) as f64 - ROAD_HALF_WIDTH;
        let max_x = start.x.max(end.x) as f64 + ROAD_HALF_WIDTH;
        let min_y = start.y.min(end.y) as f64 - ROAD_HALF_WIDTH;
        let max_y = start.y.max(end.y) as f64 + ROAD_HALF_WIDTH;
        Self {
            start,
            end,
            bounding_box: BoundingBox {
                min_x,
                min_y,
                max_x,
                max_y,
            },
        }
    }

    pub fn is_horizontal(&self) -> bool {
        self.start.y == self.end.y
    }

    pub fn is_vertical(&self) -> bool {
        self.start.x == self.end.x
    }

    pub fn start(&self) -> GridPoint {
        self.start
    }

    pub fn end(&self) -> GridPoint {
        self.end
    }

    pub fn bounding_box(&self) -> BoundingBox {
        self.bounding_box
    }

    /// Whether a point lies within the walkable strip, endpoint caps
    /// extended by the half width on the road axis as well.
    pub fn contains_point(&self, point: Point2D) -> bool {
        self.bounding_box.contains(point)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Building {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

#[derive(Clone, Debug)]
pub struct Office {
    pub id: String,
    pub position: GridPoint,
    pub offset_x: i32,
    pub offset_y: i32,
    pub width: f64,
}

impl Office {
    pub fn new(id: String, position: GridPoint, offset_x: i32, offset_y: i32) -> Self {
        Self {
            id,
            position,
            offset_x,
            offset_y,
            width: OFFICE_WIDTH,
        }
    }

    /// Offices carry string ids like "o0"; collision items need a number.
    /// The leading sigil is dropped and the remainder parsed.
    pub fn numeric_id(&self) -> Option<u32> {
        let mut chars = self.id.chars();
        chars.next()?;
        chars.as_str().parse().ok()
    }
}

/// Spatial index over road bounding boxes. Returns a superset of the roads
/// that could affect a move; exact containment is re-checked by the motion
/// rules. A linear scan is plenty at map-catalog road counts.
#[derive(Clone, Debug, Default)]
pub struct RoadIndex {
    boxes: Vec<BoundingBox>,
}

impl RoadIndex {
    pub fn build(roads: &[Road]) -> Self {
        Self {
            boxes: roads.iter().map(|road| road.bounding_box()).collect(),
        }
    }

    pub fn query(&self, from: Point2D, to: Point2D) -> Vec<usize> {
        self.boxes
            .iter()
            .enumerate()
            .filter(|(_, bb)| bb.intersects_segment(from, to) || bb.contains(from))
            .map(|(idx, _)| idx)
            .collect()
    }
}

#[derive(Clone, Debug)]
pub struct Map {
    pub id: String,
    pub name: String,
    pub dog_speed: f64,
    pub bag_capacity: u32,
    roads: Vec<Road>,
    buildings: Vec<Building>,
    offices: Vec<Office>,
    office_index: HashMap<String, usize>,
    road_index: RoadIndex,
    loot_types: Vec<Value>,
    loot_values: Vec<u32>,
}

impl Map {
    pub fn new(id: String, name: String, dog_speed: f64, bag_capacity: u32) -> Self {
        Self {
            id,
            name,
            dog_speed,
            bag_capacity,
            roads: Vec::new(),
            buildings: Vec::new(),
            offices: Vec::new(),
            office_index: HashMap::new(),
            road_index: RoadIndex::default(),
            loot_types: Vec::new(),
            loot_values: Vec::new(),
        }
    }

    pub fn add_road(&mut self, road: Road) {
        self.roads.push(road);
    }

    pub fn add_building(&mut self, building: Building) {
        self.buildings.push(building);
    }

    pub fn add_office(&mut self, office: Office) -> Result<(), String> {
        if self.office_index.contains_key(&office.id) {
            return Err(format!("duplicate office id '{}'", office.id));
        }
        self.office_index.insert(office.id.clone(), self.offices.len());
        self.offices.push(office);
        Ok(())
    }

    pub fn add_loot_type(&mut self, descriptor: Value, value: u32) {
        self.loot_types.push(descriptor);
        self.loot_values.push(value);
    }

    pub fn build_road_index(&mut self) {
        self.road_index = RoadIndex::build(&self.roads);
    }

    pub fn roads(&self) -> &[Road] {
        &self.roads
    }

    pub fn buildings(&self) -> &[Building] {
        &self.buildings
    }

    pub fn offices(&self) -> &[Office] {
        &self.offices
    }

    pub fn road_index(&self) -> &RoadIndex {
        &self.road_index
    }

    pub fn loot_types(&self) -> &[Value] {
        &self.loot_types
    }

    pub fn loot_types_count(&self) -> usize {
        self.loot_types.len()
    }

    pub fn loot_value(&self, index: usize) -> Option<u32> {
        self.loot_values.get(index).copied()
    }

    /// Uniform road, then uniform integer point along its extent.
    pub fn random_point_on_road(&self, rng: &mut Rng) -> GridPoint {
        let road = &self.roads[rng.pick_index(self.roads.len())];
        let x1 = road.start().x.min(road.end().x);
        let x2 = road.start().x.max(road.end().x);
        let y1 = road.start().y.min(road.end().y);
        let y2 = road.start().y.max(road.end().y);
        GridPoint {
            x: rng.int(x1, x2),
            y: rng.int(y1, y2),
        }
    }
}
