use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Instant;

use uuid::Uuid;

use crate::collision::{find_gather_events, Gatherer, GathererProvider, Item, ItemKind};
use crate::constants::{DEFAULT_RETIREMENT_TIME_S, DOG_WIDTH, LOOT_WIDTH, MS_IN_SECOND};
use crate::geom::{Point2D, Vec2D};
use crate::players::{Player, Players};
use crate::rng::Rng;
use crate::state_store::{self, StateError};
use crate::types::{Direction, DogStatus, GameMode, SpawnMode};
use crate::world::Map;

pub mod loot_gen;
mod motion;

use loot_gen::LootGenerator;

#[derive(Clone, Debug)]
pub struct Loot {
    pub id: u32,
    pub type_index: u32,
    pub position: Point2D,
    pub width: f64,
    pub value: u32,
}

impl Loot {
    pub fn new(id: u32, type_index: u32, position: Point2D, value: u32) -> Self {
        Self {
            id,
            type_index,
            position,
            width: LOOT_WIDTH,
            value,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Dog {
    pub id: u32,
    pub uuid: String,
    pub name: String,
    pub position: Point2D,
    pub speed: Vec2D,
    pub direction: Direction,
    pub bag: Vec<Loot>,
    pub width: f64,
    pub score: u32,
    pub join_time_ms: u64,
    pub inactivity_time_s: f64,
    pub status: DogStatus,
}

impl Dog {
    pub fn new(id: u32, name: String, position: Point2D, join_time_ms: u64) -> Self {
        Self {
            id,
            uuid: Uuid::new_v4().to_string(),
            name,
            position,
            speed: Vec2D::ZERO,
            direction: Direction::North,
            bag: Vec::new(),
            width: DOG_WIDTH,
            score: 0,
            join_time_ms,
            inactivity_time_s: 0.0,
            status: DogStatus::Active,
        }
    }

    /// Applies a movement command. Any command, including "stop", counts as
    /// activity and resets the retirement timer.
    pub fn apply_move(&mut self, direction: Direction, speed: f64) {
        self.speed = match direction {
            Direction::North => Vec2D::new(0.0, -speed),
            Direction::South => Vec2D::new(0.0, speed),
            Direction::West => Vec2D::new(-speed, 0.0),
            Direction::East => Vec2D::new(speed, 0.0),
            Direction::None => Vec2D::ZERO,
        };
        self.direction = direction;
        self.status = DogStatus::Active;
        self.inactivity_time_s = 0.0;
    }

    /// Deposits the bag at an office: the item values are scored, the bag
    /// empties.
    pub fn release_loot(&mut self) {
        for item in &self.bag {
            self.score += item.value;
        }
        self.bag.clear();
    }
}

#[derive(Clone, Debug)]
pub struct GameSession {
    pub id: u32,
    pub map_id: String,
    pub dogs: Vec<Dog>,
    pub loot: Vec<Loot>,
}

impl GameSession {
    pub fn new(id: u32, map_id: String) -> Self {
        Self {
            id,
            map_id,
            dogs: Vec::new(),
            loot: Vec::new(),
        }
    }

    pub fn dog_by_id(&self, dog_id: u32) -> Option<&Dog> {
        self.dogs.iter().find(|dog| dog.id == dog_id)
    }

    pub fn dog_by_id_mut(&mut self, dog_id: u32) -> Option<&mut Dog> {
        self.dogs.iter_mut().find(|dog| dog.id == dog_id)
    }

    pub fn remove_dog(&mut self, dog_id: u32) {
        self.dogs.retain(|dog| dog.id != dog_id);
    }

    /// Detaches a free loot item from the session; `None` when another
    /// gatherer already swept it.
    pub fn take_loot(&mut self, loot_id: u32) -> Option<Loot> {
        let index = self.loot.iter().position(|loot| loot.id == loot_id)?;
        Some(self.loot.remove(index))
    }
}

/// Monotonic id watermarks for every entity kind. Restored from checkpoints
/// so allocations after a reload do not collide with saved ids.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Counters {
    pub dog: u32,
    pub loot: u32,
    pub session: u32,
    pub player: u32,
}

impl Counters {
    pub fn next_dog(&mut self) -> u32 {
        let id = self.dog;
        self.dog += 1;
        id
    }

    pub fn next_loot(&mut self) -> u32 {
        let id = self.loot;
        self.loot += 1;
        id
    }

    pub fn next_session(&mut self) -> u32 {
        let id = self.session;
        self.session += 1;
        id
    }

    pub fn next_player(&mut self) -> u32 {
        let id = self.player;
        self.player += 1;
        id
    }
}

/// A dog whose inactivity crossed the retirement threshold. The record is
/// persisted first; only a successful write removes the dog from the game.
#[derive(Clone, Debug)]
pub struct RetiredDog {
    pub dog_id: u32,
    pub uuid: String,
    pub name: String,
    pub score: u32,
    pub play_time_ms: u64,
}

#[derive(Clone, Debug)]
pub struct JoinInfo {
    pub token: String,
    pub player_id: u32,
}

pub struct Game {
    maps: Vec<Map>,
    map_index: HashMap<String, usize>,
    sessions: HashMap<String, GameSession>,
    players: Players,
    counters: Counters,
    mode: GameMode,
    spawn_mode: SpawnMode,
    loot_generator: LootGenerator,
    dog_retirement_time_s: f64,
    rng: Rng,
    save_file_path: Option<PathBuf>,
    save_interval_ms: Option<u64>,
    save_timer_ms: u64,
    started_at: Option<Instant>,
    test_clock_ms: u64,
}

impl Game {
    pub fn new(loot_generator: LootGenerator) -> Self {
        Self {
            maps: Vec::new(),
            map_index: HashMap::new(),
            sessions: HashMap::new(),
            players: Players::new(),
            counters: Counters::default(),
            mode: GameMode::Test,
            spawn_mode: SpawnMode::Fix,
            loot_generator,
            dog_retirement_time_s: DEFAULT_RETIREMENT_TIME_S,
            rng: Rng::new(rand::random()),
            save_file_path: None,
            save_interval_ms: None,
            save_timer_ms: 0,
            started_at: None,
            test_clock_ms: 0,
        }
    }

    pub fn add_map(&mut self, map: Map) -> Result<(), String> {
        if self.map_index.contains_key(&map.id) {
            return Err(map.id.clone());
        }
        self.map_index.insert(map.id.clone(), self.maps.len());
        self.maps.push(map);
        Ok(())
    }

    pub fn maps(&self) -> &[Map] {
        &self.maps
    }

    pub fn find_map(&self, map_id: &str) -> Option<&Map> {
        self.map_index.get(map_id).map(|&idx| &self.maps[idx])
    }

    pub fn mode(&self) -> GameMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: GameMode) {
        self.mode = mode;
    }

    pub fn set_spawn_mode(&mut self, spawn_mode: SpawnMode) {
        self.spawn_mode = spawn_mode;
    }

    pub fn set_dog_retirement_time(&mut self, seconds: f64) {
        self.dog_retirement_time_s = seconds;
    }

    pub fn dog_retirement_time(&self) -> f64 {
        self.dog_retirement_time_s
    }

    pub fn set_rng_seed(&mut self, seed: u64) {
        self.rng = Rng::new(seed);
    }

    pub fn set_save_file(&mut self, path: PathBuf) {
        self.save_file_path = Some(path);
    }

    /// Enables periodic checkpoints driven by the tick accumulator.
    pub fn set_save_period(&mut self, interval_ms: u64) {
        self.save_interval_ms = Some(interval_ms);
        self.save_timer_ms = 0;
    }

    /// Anchors the NORMAL-mode clock; call once when the server starts.
    pub fn mark_started(&mut self) {
        self.started_at = Some(Instant::now());
    }

    /// TEST mode only; the request-driven clock ignores it otherwise.
    pub fn add_test_time(&mut self, delta_ms: u64) {
        if self.mode == GameMode::Test {
            self.test_clock_ms = self.test_clock_ms.saturating_add(delta_ms);
        }
    }

    pub fn current_time_ms(&self) -> u64 {
        match self.mode {
            GameMode::Test => self.test_clock_ms,
            GameMode::Normal => self
                .started_at
                .map(|started| started.elapsed().as_millis() as u64)
                .unwrap_or(0),
        }
    }

    pub fn players(&self) -> &Players {
        &self.players
    }

    pub fn session_by_id(&self, session_id: u32) -> Option<&GameSession> {
        self.sessions.values().find(|session| session.id == session_id)
    }

    fn session_by_id_mut(&mut self, session_id: u32) -> Option<&mut GameSession> {
        self.sessions
            .values_mut()
            .find(|session| session.id == session_id)
    }

    pub fn session_of_token(&self, token: &str) -> Option<&GameSession> {
        let player = self.players.find_by_token(token)?;
        self.session_by_id(player.session_id)
    }

    pub fn players_in_session(&self, token: &str) -> Vec<&Player> {
        self.players.in_session_of(token)
    }

    /// Appends the dog to the map's session, creating the session on first
    /// join. Returns the session id.
    pub fn add_dog_to_session(&mut self, dog: Dog, map_id: &str) -> u32 {
        let counters = &mut self.counters;
        let session = self
            .sessions
            .entry(map_id.to_string())
            .or_insert_with(|| GameSession::new(counters.next_session(), map_id.to_string()));
        session.dogs.push(dog);
        session.id
    }

    /// Spawns a dog for `user_name` on `map_id` and registers the player.
    /// `None` when the map does not exist.
    pub fn join_game(&mut self, user_name: &str, map_id: &str) -> Option<JoinInfo> {
        let map_idx = *self.map_index.get(map_id)?;
        let spawn = match self.spawn_mode {
            SpawnMode::Random => self.maps[map_idx].random_point_on_road(&mut self.rng),
            SpawnMode::Fix => self.maps[map_idx].roads().first()?.start(),
        };
        let position = Point2D::new(spawn.x as f64, spawn.y as f64);

        let dog_id = self.counters.next_dog();
        let dog = Dog::new(dog_id, user_name.to_string(), position, self.current_time_ms());
        let session_id = self.add_dog_to_session(dog, map_id);

        let player_id = self.counters.next_player();
        let token = self.players.add(player_id, session_id, dog_id);

        Some(JoinInfo { token, player_id })
    }

    /// Applies a movement command for the token's dog at the map's speed.
    pub fn make_action(&mut self, token: &str, direction: Direction) -> bool {
        let Some(player) = self.players.find_by_token(token) else {
            return false;
        };
        let (session_id, dog_id) = (player.session_id, player.dog_id);

        let speed = {
            let Some(session) = self.session_by_id(session_id) else {
                return false;
            };
            match self.find_map(&session.map_id) {
                Some(map) => map.dog_speed,
                None => return false,
            }
        };

        let Some(session) = self.session_by_id_mut(session_id) else {
            return false;
        };
        let Some(dog) = session.dog_by_id_mut(dog_id) else {
            return false;
        };
        dog.apply_move(direction, speed);
        true
    }

    /// Advances every session by `delta_ms`: movement, loot spawning,
    /// gathering, inventory effects. Returns the dogs due for retirement;
    /// the caller persists them and calls [`Game::retire_dog`] for each
    /// successful write. Also drives the periodic checkpoint.
    pub fn update(&mut self, delta_ms: u64) -> Result<Vec<RetiredDog>, StateError> {
        let now_ms = self.current_time_ms();
        let retirement_s = self.dog_retirement_time_s;
        let mut retirees = Vec::new();

        let Game {
            maps,
            map_index,
            sessions,
            rng,
            loot_generator,
            counters,
            ..
        } = self;

        for (map_id, session) in sessions.iter_mut() {
            let Some(&map_idx) = map_index.get(map_id) else {
                continue;
            };
            let map = &maps[map_idx];

            let mut provider = GathererProvider::default();
            move_dogs(session, map, delta_ms, &mut provider);
            spawn_loot(session, map, loot_generator, rng, counters, delta_ms);
            register_items(session, map, &mut provider);
            apply_gather_events(session, map, &provider);
            collect_retirees(session, retirement_s, now_ms, &mut retirees);
        }

        self.save_timer_ms = self.save_timer_ms.saturating_add(delta_ms);
        if let Some(interval) = self.save_interval_ms {
            if self.save_timer_ms >= interval {
                self.save_state()?;
                self.save_timer_ms = 0;
            }
        }

        Ok(retirees)
    }

    /// Removes the retired dog and its player from the live game.
    pub fn retire_dog(&mut self, dog_id: u32) {
        self.players.remove_by_dog_id(dog_id);
        for session in self.sessions.values_mut() {
            session.remove_dog(dog_id);
        }
    }

    /// Checkpoints the full live state when a state file is configured.
    pub fn save_state(&self) -> Result<(), StateError> {
        match &self.save_file_path {
            Some(path) => state_store::save_state(self, path),
            None => Ok(()),
        }
    }

    // ---- checkpoint plumbing -------------------------------------------

    pub fn sessions(&self) -> impl Iterator<Item = &GameSession> {
        self.sessions.values()
    }

    pub fn counters(&self) -> Counters {
        self.counters
    }

    pub fn set_counters(&mut self, counters: Counters) {
        self.counters = counters;
    }

    pub fn clear_live_state(&mut self) {
        self.sessions.clear();
        self.players.clear();
    }

    pub fn restore_session(&mut self, session: GameSession) {
        self.sessions.insert(session.map_id.clone(), session);
    }

    pub fn restore_player(&mut self, player: Player) {
        self.players.insert_restored(player);
    }
}

fn move_dogs(session: &mut GameSession, map: &Map, delta_ms: u64, provider: &mut GathererProvider) {
    let delta_s = delta_ms as f64 / MS_IN_SECOND;

    for dog in &mut session.dogs {
        let old_position = dog.position;
        let new_position = motion::move_dog(dog, map, delta_s);
        dog.position = new_position;

        provider.add_gatherer(Gatherer {
            start_pos: old_position,
            end_pos: new_position,
            width: dog.width,
            id: dog.id,
        });

        if old_position == new_position {
            dog.status = DogStatus::Inactive;
            dog.inactivity_time_s += delta_s;
        } else {
            dog.status = DogStatus::Active;
            dog.inactivity_time_s = 0.0;
        }
    }
}

fn spawn_loot(
    session: &mut GameSession,
    map: &Map,
    generator: &mut LootGenerator,
    rng: &mut Rng,
    counters: &mut Counters,
    delta_ms: u64,
) {
    if map.loot_types_count() == 0 {
        return;
    }

    let spawn_count = generator.generate(
        delta_ms,
        session.loot.len() as u32,
        session.dogs.len() as u32,
        rng,
    );

    for _ in 0..spawn_count {
        let point = map.random_point_on_road(rng);
        let type_index = rng.int(0, map.loot_types_count() as i32 - 1) as u32;
        let Some(value) = map.loot_value(type_index as usize) else {
            continue;
        };
        session.loot.push(Loot::new(
            counters.next_loot(),
            type_index,
            Point2D::new(point.x as f64, point.y as f64),
            value,
        ));
    }
}

fn register_items(session: &GameSession, map: &Map, provider: &mut GathererProvider) {
    for loot in &session.loot {
        provider.add_item(Item {
            position: loot.position,
            width: loot.width,
            id: loot.id,
            kind: ItemKind::Loot,
        });
    }

    for office in map.offices() {
        let Some(numeric_id) = office.numeric_id() else {
            log::warn!("office '{}' has no numeric id, skipped for gathering", office.id);
            continue;
        };
        provider.add_item(Item {
            position: Point2D::new(office.position.x as f64, office.position.y as f64),
            width: office.width,
            id: numeric_id,
            kind: ItemKind::Office,
        });
    }
}

fn apply_gather_events(session: &mut GameSession, map: &Map, provider: &GathererProvider) {
    let events = find_gather_events(provider);
    let mut claimed: Vec<u32> = Vec::new();

    for event in events {
        match event.kind {
            ItemKind::Office => {
                if let Some(dog) = session.dog_by_id_mut(event.gatherer_id) {
                    dog.release_loot();
                }
            }
            ItemKind::Loot => {
                if claimed.contains(&event.item_id) {
                    continue;
                }
                let Some(dog) = session.dog_by_id(event.gatherer_id) else {
                    continue;
                };
                if dog.bag.len() >= map.bag_capacity as usize {
                    continue;
                }
                let Some(loot) = session.take_loot(event.item_id) else {
                    continue;
                };
                if let Some(dog) = session.dog_by_id_mut(event.gatherer_id) {
                    dog.bag.push(loot);
                    claimed.push(event.item_id);
                }
            }
        }
    }
}

fn collect_retirees(
    session: &GameSession,
    retirement_s: f64,
    now_ms: u64,
    retirees: &mut Vec<RetiredDog>,
) {
    for dog in &session.dogs {
        if dog.inactivity_time_s >= retirement_s {
            retirees.push(RetiredDog {
                dog_id: dog.id,
                uuid: dog.uuid.clone(),
                name: dog.name.clone(),
                score: dog.score,
                play_time_ms: now_ms.saturating_sub(dog.join_time_ms),
            });
        }
    }
}
