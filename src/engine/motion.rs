use crate::constants::ROAD_HALF_WIDTH;
use crate::geom::{Point2D, Vec2D};
use crate::types::Direction;
use crate::world::{Map, Road};

use super::Dog;

/// Computes where the dog ends up after `delta_s` seconds, constrained to
/// the road graph. Transitions between intersecting roads are possible
/// because every road containing the current position is a candidate. On a
/// boundary hit the dog halts at the wall and its velocity is zeroed.
pub(super) fn move_dog(dog: &mut Dog, map: &Map, delta_s: f64) -> Point2D {
    let position = dog.position;

    if dog.direction == Direction::None
        || (dog.speed.x.abs() < f64::EPSILON && dog.speed.y.abs() < f64::EPSILON)
    {
        return position;
    }

    let target = Point2D::new(
        position.x + dog.speed.x * delta_s,
        position.y + dog.speed.y * delta_s,
    );

    let candidates = map.road_index().query(position, target);
    if candidates.is_empty() {
        return position;
    }

    let roads = map.roads();
    if candidates.iter().any(|&idx| roads[idx].contains_point(target)) {
        return target;
    }

    let mut stop = position;
    let mut best_distance = f64::MIN;
    for &idx in &candidates {
        let road = &roads[idx];
        if !road.contains_point(position) {
            continue;
        }
        let candidate = find_stop_point(position, target, road, dog.direction);
        let distance = position.distance_to(candidate);
        if distance > best_distance {
            best_distance = distance;
            stop = candidate;
        }
    }

    dog.speed = Vec2D::ZERO;
    stop
}

/// The farthest point along the move direction still on `road`: the target
/// clamped to the road extent plus the walkable half width.
fn find_stop_point(from: Point2D, to: Point2D, road: &Road, direction: Direction) -> Point2D {
    let min_x = road.start().x.min(road.end().x) as f64;
    let max_x = road.start().x.max(road.end().x) as f64;
    let min_y = road.start().y.min(road.end().y) as f64;
    let max_y = road.start().y.max(road.end().y) as f64;

    match direction {
        Direction::East => Point2D::new(to.x.min(max_x + ROAD_HALF_WIDTH), from.y),
        Direction::West => Point2D::new(to.x.max(min_x - ROAD_HALF_WIDTH), from.y),
        Direction::North => Point2D::new(from.x, to.y.max(min_y - ROAD_HALF_WIDTH)),
        Direction::South => Point2D::new(from.x, to.y.min(max_y + ROAD_HALF_WIDTH)),
        Direction::None => from,
    }
}
