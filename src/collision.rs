use crate::geom::Point2D;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ItemKind {
    Loot,
    Office,
}

#[derive(Clone, Copy, Debug)]
pub struct Item {
    pub position: Point2D,
    pub width: f64,
    pub id: u32,
    pub kind: ItemKind,
}

#[derive(Clone, Copy, Debug)]
pub struct Gatherer {
    pub start_pos: Point2D,
    pub end_pos: Point2D,
    pub width: f64,
    pub id: u32,
}

#[derive(Clone, Copy, Debug)]
pub struct GatheringEvent {
    pub item_id: u32,
    pub gatherer_id: u32,
    pub sq_distance: f64,
    pub time: f64,
    pub kind: ItemKind,
}

#[derive(Clone, Copy, Debug)]
pub struct CollectionResult {
    pub sq_distance: f64,
    pub proj_ratio: f64,
}

impl CollectionResult {
    pub fn is_collected(&self, collect_radius: f64) -> bool {
        self.proj_ratio >= 0.0
            && self.proj_ratio <= 1.0
            && self.sq_distance <= collect_radius * collect_radius
    }
}

/// Projects item position `c` onto the segment `a -> b`. The caller must
/// guarantee `a != b`.
pub fn try_collect_point(a: Point2D, b: Point2D, c: Point2D) -> CollectionResult {
    let ux = c.x - a.x;
    let uy = c.y - a.y;
    let vx = b.x - a.x;
    let vy = b.y - a.y;
    let u_dot_v = ux * vx + uy * vy;
    let v_len2 = vx * vx + vy * vy;
    let proj_ratio = u_dot_v / v_len2;

    let proj_x = a.x + proj_ratio * vx;
    let proj_y = a.y + proj_ratio * vy;
    let dx = c.x - proj_x;
    let dy = c.y - proj_y;

    CollectionResult {
        sq_distance: dx * dx + dy * dy,
        proj_ratio,
    }
}

/// Accumulates the moving gatherers and stationary items of one tick.
#[derive(Clone, Debug, Default)]
pub struct GathererProvider {
    items: Vec<Item>,
    gatherers: Vec<Gatherer>,
}

impl GathererProvider {
    pub fn add_item(&mut self, item: Item) {
        self.items.push(item);
    }

    pub fn add_gatherer(&mut self, gatherer: Gatherer) {
        self.gatherers.push(gatherer);
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn gatherers(&self) -> &[Gatherer] {
        &self.gatherers
    }
}

/// Sweeps every gatherer against every item and returns the collisions
/// ordered by the moment they happen within the tick. A gatherer that did
/// not move produces no events. One item may appear in several events; the
/// caller decides who actually takes it.
pub fn find_gather_events(provider: &GathererProvider) -> Vec<GatheringEvent> {
    let mut events = Vec::new();

    for gatherer in provider.gatherers() {
        if gatherer.start_pos == gatherer.end_pos {
            continue;
        }
        for item in provider.items() {
            let result = try_collect_point(gatherer.start_pos, gatherer.end_pos, item.position);
            if result.is_collected(gatherer.width + item.width) {
                events.push(GatheringEvent {
                    item_id: item.id,
                    gatherer_id: gatherer.id,
                    sq_distance: result.sq_distance,
                    time: result.proj_ratio,
                    kind: item.kind,
                });
            }
        }
    }

    events.sort_by(|a, b| a.time.partial_cmp(&b.time).unwrap_or(std::cmp::Ordering::Equal));
    events
}
