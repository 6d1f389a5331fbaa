pub const DOG_WIDTH: f64 = 0.6;
pub const LOOT_WIDTH: f64 = 0.0;
pub const OFFICE_WIDTH: f64 = 0.5;
pub const ROAD_HALF_WIDTH: f64 = 0.4;

pub const DEFAULT_DOG_SPEED: f64 = 1.0;
pub const DEFAULT_BAG_CAPACITY: u32 = 3;
pub const DEFAULT_RETIREMENT_TIME_S: f64 = 60.0;

pub const MS_IN_SECOND: f64 = 1000.0;

pub const SERVER_PORT: u16 = 8080;
pub const DEFAULT_DB_POOL_SIZE: u32 = 1;

pub const DEFAULT_RECORD_ROWS: i64 = 100;
pub const MAX_RECORD_ROWS: i64 = 100;

pub const STATE_FILE_VERSION: u8 = 1;
