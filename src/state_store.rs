use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::constants::STATE_FILE_VERSION;
use crate::engine::{Counters, Dog, Game, GameSession, Loot};
use crate::geom::{Point2D, Vec2D};
use crate::players::Player;
use crate::types::{Direction, DogStatus};

#[derive(Debug, Error)]
pub enum StateError {
    #[error("state file io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("state file serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported state file version {0}")]
    UnsupportedVersion(u8),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LootRepr {
    #[serde(rename = "type")]
    type_index: u32,
    id: u32,
    value: u32,
    position: Point2D,
    width: f64,
    loot_counter: u32,
}

impl LootRepr {
    fn capture(loot: &Loot, counters: Counters) -> Self {
        Self {
            type_index: loot.type_index,
            id: loot.id,
            value: loot.value,
            position: loot.position,
            width: loot.width,
            loot_counter: counters.loot,
        }
    }

    fn restore(&self) -> Loot {
        let mut loot = Loot::new(self.id, self.type_index, self.position, self.value);
        loot.width = self.width;
        loot
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DogRepr {
    id: u32,
    name: String,
    position: Point2D,
    speed: Vec2D,
    direction: Direction,
    bag: Vec<LootRepr>,
    width: f64,
    score: u32,
    dog_counter: u32,
}

impl DogRepr {
    fn capture(dog: &Dog, counters: Counters) -> Self {
        Self {
            id: dog.id,
            name: dog.name.clone(),
            position: dog.position,
            speed: dog.speed,
            direction: dog.direction,
            bag: dog.bag.iter().map(|loot| LootRepr::capture(loot, counters)).collect(),
            width: dog.width,
            score: dog.score,
            dog_counter: counters.dog,
        }
    }

    fn restore(&self) -> Dog {
        Dog {
            id: self.id,
            uuid: Uuid::new_v4().to_string(),
            name: self.name.clone(),
            position: self.position,
            speed: self.speed,
            direction: self.direction,
            bag: self.bag.iter().map(LootRepr::restore).collect(),
            width: self.width,
            score: self.score,
            join_time_ms: 0,
            inactivity_time_s: 0.0,
            status: DogStatus::Active,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GameSessionRepr {
    map_id: String,
    dogs: Vec<DogRepr>,
    loot: Vec<LootRepr>,
    session_id: u32,
    session_counter: u32,
}

impl GameSessionRepr {
    fn capture(session: &GameSession, counters: Counters) -> Self {
        Self {
            map_id: session.map_id.clone(),
            dogs: session
                .dogs
                .iter()
                .map(|dog| DogRepr::capture(dog, counters))
                .collect(),
            loot: session
                .loot
                .iter()
                .map(|loot| LootRepr::capture(loot, counters))
                .collect(),
            session_id: session.id,
            session_counter: counters.session,
        }
    }

    fn restore(&self) -> GameSession {
        let mut session = GameSession::new(self.session_id, self.map_id.clone());
        session.dogs = self.dogs.iter().map(DogRepr::restore).collect();
        session.loot = self.loot.iter().map(LootRepr::restore).collect();
        session
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayerRepr {
    session_id: u32,
    dog_id: u32,
    token: String,
    id: u32,
    player_counter: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct Section {
    tag: String,
    count: usize,
    items: Vec<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StateFile {
    version: u8,
    sessions: Section,
    players: Section,
}

/// Serializes the full live game to `path`: tmp file, sync, atomic rename.
/// On any failure the temp file is removed and the error surfaces.
pub fn save_state(game: &Game, path: &Path) -> Result<(), StateError> {
    let counters = game.counters();

    let session_items: Vec<Value> = game
        .sessions()
        .map(|session| serde_json::to_value(GameSessionRepr::capture(session, counters)))
        .collect::<Result<_, _>>()?;

    let player_items: Vec<Value> = game
        .players()
        .iter()
        .map(|player| {
            serde_json::to_value(PlayerRepr {
                session_id: player.session_id,
                dog_id: player.dog_id,
                token: player.token.clone(),
                id: player.id,
                player_counter: counters.player,
            })
        })
        .collect::<Result<_, _>>()?;

    let file = StateFile {
        version: STATE_FILE_VERSION,
        sessions: Section {
            tag: "sessions".to_string(),
            count: session_items.len(),
            items: session_items,
        },
        players: Section {
            tag: "players".to_string(),
            count: player_items.len(),
            items: player_items,
        },
    };
    let payload = serde_json::to_string_pretty(&file)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let temp_path = temp_path_for(path);
    match write_and_rename(&temp_path, path, &payload) {
        Ok(()) => {
            log::info!("game state saved to {}", path.display());
            Ok(())
        }
        Err(error) => {
            let _ = fs::remove_file(&temp_path);
            Err(error.into())
        }
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

fn write_and_rename(temp_path: &Path, path: &Path, payload: &str) -> std::io::Result<()> {
    let mut file = fs::File::create(temp_path)?;
    file.write_all(payload.as_bytes())?;
    file.sync_all()?;
    drop(file);
    fs::rename(temp_path, path)
}

/// Restores the archive into `game`. Sub-records are parsed one by one; an
/// unreadable record stops its section cleanly with a warning, keeping
/// whatever loaded before it. Counter watermarks resume id allocation past
/// the saved values.
pub fn load_state(game: &mut Game, path: &Path) -> Result<(), StateError> {
    let content = fs::read_to_string(path)?;
    let file: StateFile = serde_json::from_str(&content)?;
    if file.version != STATE_FILE_VERSION {
        return Err(StateError::UnsupportedVersion(file.version));
    }

    game.clear_live_state();
    let mut counters = game.counters();

    let mut restored_sessions = 0usize;
    for item in file.sessions.items {
        let repr: GameSessionRepr = match serde_json::from_value(item) {
            Ok(repr) => repr,
            Err(error) => {
                log::warn!("failed to load session from state file: {error}");
                break;
            }
        };
        if game.find_map(&repr.map_id).is_none() {
            log::warn!("state file references unknown map '{}'", repr.map_id);
            break;
        }

        counters.session = counters.session.max(repr.session_counter);
        for dog in &repr.dogs {
            counters.dog = counters.dog.max(dog.dog_counter);
            for loot in &dog.bag {
                counters.loot = counters.loot.max(loot.loot_counter);
            }
        }
        for loot in &repr.loot {
            counters.loot = counters.loot.max(loot.loot_counter);
        }

        game.restore_session(repr.restore());
        restored_sessions += 1;
    }
    if restored_sessions != file.sessions.count {
        log::warn!(
            "state file declared {} sessions, restored {}",
            file.sessions.count,
            restored_sessions
        );
    }

    let mut restored_players = 0usize;
    for item in file.players.items {
        let repr: PlayerRepr = match serde_json::from_value(item) {
            Ok(repr) => repr,
            Err(error) => {
                log::warn!("failed to load player from state file: {error}");
                break;
            }
        };
        let dog_attached = game
            .session_by_id(repr.session_id)
            .and_then(|session| session.dog_by_id(repr.dog_id))
            .is_some();
        if !dog_attached {
            log::warn!(
                "state file player {} references missing session {} / dog {}",
                repr.id,
                repr.session_id,
                repr.dog_id
            );
            break;
        }

        counters.player = counters.player.max(repr.player_counter);
        game.restore_player(Player {
            id: repr.id,
            token: repr.token,
            session_id: repr.session_id,
            dog_id: repr.dog_id,
        });
        restored_players += 1;
    }
    if restored_players != file.players.count {
        log::warn!(
            "state file declared {} players, restored {}",
            file.players.count,
            restored_players
        );
    }

    game.set_counters(counters);
    log::info!("game state loaded from {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_game_from_str;
    use crate::types::SpawnMode;

    const CONFIG: &str = r#"{
        "lootGeneratorConfig": { "period": 5.0, "probability": 0.0 },
        "maps": [
            {
                "id": "map1", "name": "Village", "dogSpeed": 3.0,
                "roads": [ { "x0": 0, "y0": 0, "x1": 20 } ],
                "buildings": [],
                "offices": [ { "id": "o0", "x": 10, "y": 0, "offsetX": 0, "offsetY": 0 } ],
                "lootTypes": [ { "value": 10 }, { "value": 30 } ]
            },
            {
                "id": "map2", "name": "Town",
                "roads": [ { "x0": 0, "y0": 0, "y1": 15 } ],
                "buildings": [], "offices": [],
                "lootTypes": [ { "value": 1 } ]
            }
        ]
    }"#;

    fn populated_game() -> Game {
        let mut game = load_game_from_str(CONFIG).expect("config parses");
        game.set_rng_seed(5);
        game.set_spawn_mode(SpawnMode::Fix);
        game.join_game("Alice", "map1").expect("join map1");
        game.join_game("Bob", "map1").expect("join map1");
        game.join_game("Carol", "map2").expect("join map2");
        game
    }

    #[test]
    fn save_and_load_round_trip_preserves_everything() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("state.json");

        let mut game = populated_game();
        {
            // mutate one dog and drop loot into a session
            let token = game.players().iter().next().expect("player").token.clone();
            game.make_action(&token, crate::types::Direction::East);
        }
        game.add_test_time(500);
        game.update(500).expect("update");

        save_state(&game, &path).expect("state saves");

        let mut restored = load_game_from_str(CONFIG).expect("config parses");
        load_state(&mut restored, &path).expect("state loads");

        assert_eq!(restored.counters(), game.counters());
        assert_eq!(restored.players().len(), game.players().len());

        for player in game.players().iter() {
            let twin = restored
                .players()
                .find_by_token(&player.token)
                .expect("player restored with same token");
            assert_eq!(twin.id, player.id);
            assert_eq!(twin.session_id, player.session_id);
            assert_eq!(twin.dog_id, player.dog_id);
        }

        for session in game.sessions() {
            let twin = restored
                .session_by_id(session.id)
                .expect("session restored");
            assert_eq!(twin.map_id, session.map_id);
            assert_eq!(twin.dogs.len(), session.dogs.len());
            assert_eq!(twin.loot.len(), session.loot.len());
            for dog in &session.dogs {
                let restored_dog = twin.dog_by_id(dog.id).expect("dog restored");
                assert_eq!(restored_dog.name, dog.name);
                assert_eq!(restored_dog.position, dog.position);
                assert_eq!(restored_dog.speed, dog.speed);
                assert_eq!(restored_dog.direction, dog.direction);
                assert_eq!(restored_dog.score, dog.score);
                assert_eq!(restored_dog.bag.len(), dog.bag.len());
            }
        }
    }

    #[test]
    fn allocations_resume_past_the_saved_watermarks() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("state.json");

        let game = populated_game();
        let saved_counters = game.counters();
        save_state(&game, &path).expect("state saves");

        let mut restored = load_game_from_str(CONFIG).expect("config parses");
        load_state(&mut restored, &path).expect("state loads");

        let join = restored.join_game("Dave", "map1").expect("join succeeds");
        assert_eq!(join.player_id, saved_counters.player);
        let session = restored.session_of_token(&join.token).expect("session");
        let new_dog = session.dogs.last().expect("dog");
        assert_eq!(new_dog.id, saved_counters.dog);
    }

    #[test]
    fn save_writes_tagged_sections_and_no_temp_leftover() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("state.json");

        let game = populated_game();
        save_state(&game, &path).expect("state saves");

        assert!(!temp_path_for(&path).exists());

        let raw: Value =
            serde_json::from_str(&fs::read_to_string(&path).expect("file readable")).expect("json");
        assert_eq!(raw["version"], Value::from(STATE_FILE_VERSION));
        assert_eq!(raw["sessions"]["tag"], Value::from("sessions"));
        assert_eq!(raw["sessions"]["count"], Value::from(2));
        assert_eq!(raw["players"]["tag"], Value::from("players"));
        assert_eq!(raw["players"]["count"], Value::from(3));
    }

    #[test]
    fn unreadable_player_record_stops_cleanly_keeping_earlier_ones() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("state.json");

        let game = populated_game();
        save_state(&game, &path).expect("state saves");

        // corrupt the second player record
        let mut raw: Value =
            serde_json::from_str(&fs::read_to_string(&path).expect("file readable")).expect("json");
        raw["players"]["items"][1] = serde_json::json!({"broken": true});
        fs::write(&path, serde_json::to_string(&raw).expect("json")).expect("rewrite");

        let mut restored = load_game_from_str(CONFIG).expect("config parses");
        load_state(&mut restored, &path).expect("load still succeeds");

        // sessions fully loaded, players stopped after the first record
        assert_eq!(restored.sessions().count(), 2);
        assert_eq!(restored.players().len(), 1);
    }

    #[test]
    fn unknown_map_stops_the_session_section() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("state.json");

        let game = populated_game();
        save_state(&game, &path).expect("state saves");

        let mut raw: Value =
            serde_json::from_str(&fs::read_to_string(&path).expect("file readable")).expect("json");
        raw["sessions"]["items"][0]["mapId"] = Value::from("gone");
        fs::write(&path, serde_json::to_string(&raw).expect("json")).expect("rewrite");

        let mut restored = load_game_from_str(CONFIG).expect("config parses");
        load_state(&mut restored, &path).expect("load still succeeds");
        assert_eq!(restored.sessions().count(), 0);
    }

    #[test]
    fn version_mismatch_is_an_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("state.json");

        let game = populated_game();
        save_state(&game, &path).expect("state saves");

        let mut raw: Value =
            serde_json::from_str(&fs::read_to_string(&path).expect("file readable")).expect("json");
        raw["version"] = Value::from(99);
        fs::write(&path, serde_json::to_string(&raw).expect("json")).expect("rewrite");

        let mut restored = load_game_from_str(CONFIG).expect("config parses");
        assert!(matches!(
            load_state(&mut restored, &path),
            Err(StateError::UnsupportedVersion(99))
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let mut game = load_game_from_str(CONFIG).expect("config parses");
        let result = load_state(&mut game, Path::new("/nonexistent/state.json"));
        assert!(matches!(result, Err(StateError::Io(_))));
    }
}
