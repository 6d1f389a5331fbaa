use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    North,
    South,
    West,
    East,
    None,
}

impl Direction {
    /// Parses the `move` field of an action request. The empty string is a
    /// valid move and means "stop".
    pub fn parse_move(value: &str) -> Option<Self> {
        match value {
            "U" => Some(Self::North),
            "D" => Some(Self::South),
            "L" => Some(Self::West),
            "R" => Some(Self::East),
            "" => Some(Self::None),
            _ => None,
        }
    }

    pub fn as_move_str(&self) -> &'static str {
        match self {
            Self::North => "U",
            Self::South => "D",
            Self::West => "L",
            Self::East => "R",
            Self::None => "",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DogStatus {
    Active,
    Inactive,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GameMode {
    Normal,
    Test,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpawnMode {
    Random,
    Fix,
}
