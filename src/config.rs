use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::constants::{DEFAULT_BAG_CAPACITY, DEFAULT_DOG_SPEED, MS_IN_SECOND};
use crate::engine::loot_gen::LootGenerator;
use crate::engine::Game;
use crate::world::{Building, GridPoint, Map, Office, Road};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("map '{map_id}': {message}")]
    InvalidMap { map_id: String, message: String },
    #[error("duplicate map id '{0}'")]
    DuplicateMap(String),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GameConfigFile {
    default_dog_speed: Option<f64>,
    default_bag_capacity: Option<u32>,
    dog_retirement_time: Option<f64>,
    loot_generator_config: LootGeneratorConfig,
    maps: Vec<MapConfig>,
}

#[derive(Debug, Deserialize)]
struct LootGeneratorConfig {
    period: f64,
    probability: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MapConfig {
    id: String,
    name: String,
    dog_speed: Option<f64>,
    bag_capacity: Option<u32>,
    roads: Vec<RoadConfig>,
    buildings: Vec<BuildingConfig>,
    offices: Vec<OfficeConfig>,
    loot_types: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct RoadConfig {
    x0: i32,
    y0: i32,
    x1: Option<i32>,
    y1: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct BuildingConfig {
    x: i32,
    y: i32,
    w: i32,
    h: i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OfficeConfig {
    id: String,
    x: i32,
    y: i32,
    offset_x: i32,
    offset_y: i32,
}

pub fn load_game(path: &Path) -> Result<Game, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    load_game_from_str(&content)
}

pub fn load_game_from_str(content: &str) -> Result<Game, ConfigError> {
    let file: GameConfigFile = serde_json::from_str(content)?;

    let default_dog_speed = file.default_dog_speed.unwrap_or(DEFAULT_DOG_SPEED);
    let default_bag_capacity = file.default_bag_capacity.unwrap_or(DEFAULT_BAG_CAPACITY);

    let generator = LootGenerator::new(
        (file.loot_generator_config.period * MS_IN_SECOND) as u64,
        file.loot_generator_config.probability,
    );

    let mut game = Game::new(generator);
    if let Some(retirement) = file.dog_retirement_time {
        game.set_dog_retirement_time(retirement);
    }

    for map_config in file.maps {
        let map = build_map(map_config, default_dog_speed, default_bag_capacity)?;
        game.add_map(map)
            .map_err(|id| ConfigError::DuplicateMap(id))?;
    }

    Ok(game)
}

fn build_map(
    config: MapConfig,
    default_dog_speed: f64,
    default_bag_capacity: u32,
) -> Result<Map, ConfigError> {
    // per-map override wins over the catalog default
    let dog_speed = config.dog_speed.unwrap_or(default_dog_speed);
    let bag_capacity = config.bag_capacity.unwrap_or(default_bag_capacity);

    let mut map = Map::new(config.id.clone(), config.name, dog_speed, bag_capacity);

    if config.roads.is_empty() {
        return Err(ConfigError::InvalidMap {
            map_id: config.id,
            message: "map has no roads".to_string(),
        });
    }

    for road in &config.roads {
        let start = GridPoint {
            x: road.x0,
            y: road.y0,
        };
        match (road.x1, road.y1) {
            (Some(end_x), _) => map.add_road(Road::horizontal(start, end_x)),
            (None, Some(end_y)) => map.add_road(Road::vertical(start, end_y)),
            (None, None) => {
                return Err(ConfigError::InvalidMap {
                    map_id: config.id,
                    message: "road needs x1 or y1".to_string(),
                })
            }
        }
    }

    for building in &config.buildings {
        map.add_building(Building {
            x: building.x,
            y: building.y,
            width: building.w,
            height: building.h,
        });
    }

    for office in config.offices {
        map.add_office(Office::new(
            office.id,
            GridPoint {
                x: office.x,
                y: office.y,
            },
            office.offset_x,
            office.offset_y,
        ))
        .map_err(|message| ConfigError::InvalidMap {
            map_id: config.id.clone(),
            message,
        })?;
    }

    for descriptor in config.loot_types {
        let value = descriptor
            .get("value")
            .and_then(Value::as_u64)
            .ok_or_else(|| ConfigError::InvalidMap {
                map_id: config.id.clone(),
                message: "loot type is missing an integer 'value'".to_string(),
            })?;
        map.add_loot_type(descriptor, value as u32);
    }

    map.build_road_index();
    Ok(map)
}
