use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{Path as PathParam, Query, Request, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Map as JsonMap, Value};
use tokio::sync::Mutex;
use tower_http::services::ServeDir;
use tower_http::timeout::TimeoutLayer;

use crate::constants::{DEFAULT_RECORD_ROWS, MAX_RECORD_ROWS, MS_IN_SECOND};
use crate::db::{PlayerRecord, RecordsDb};
use crate::engine::{Game, RetiredDog};
use crate::players::is_valid_token;
use crate::types::{Direction, GameMode};
use crate::world::Map;

pub type SharedGame = Arc<Mutex<Game>>;

#[derive(Clone)]
pub struct AppContext {
    pub game: SharedGame,
    pub db: RecordsDb,
}

const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// The API router plus the static-file fallback. Every game-mutating
/// handler funnels through the shared mutex, so the simulation behaves as
/// single-threaded no matter how many connections are in flight.
pub fn build_router(ctx: AppContext, www_root: &Path) -> Router {
    let api = Router::new()
        .route("/v1/maps", get(maps_list).fallback(get_head_only))
        .route("/v1/maps/{id}", get(map_info).fallback(get_head_only))
        .route("/v1/game/join", post(join_game).fallback(post_only))
        .route("/v1/game/players", get(session_players).fallback(get_head_only))
        .route("/v1/game/state", get(session_state).fallback(get_head_only))
        .route("/v1/game/player/action", post(player_action).fallback(post_only))
        .route("/v1/game/tick", post(game_tick).fallback(post_only))
        .route("/v1/game/records", get(game_records).fallback(get_head_only))
        .fallback(unknown_api)
        .with_state(ctx);

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/api", api)
        .fallback_service(ServeDir::new(www_root))
        .layer(middleware::from_fn(log_requests))
        .layer(TimeoutLayer::new(READ_TIMEOUT))
}

/// Persists retirement records and removes each dog only after its record
/// hit the database. A write failure leaves the dog in place; the next
/// tick retries it.
pub async fn persist_retirees(ctx: &AppContext, retirees: Vec<RetiredDog>) {
    for retiree in retirees {
        let record = match PlayerRecord::from_retiree(&retiree) {
            Ok(record) => record,
            Err(error) => {
                log::warn!("retired dog {} has a malformed uuid: {error}", retiree.dog_id);
                continue;
            }
        };
        match ctx.db.save_record(&record).await {
            Ok(()) => {
                ctx.game.lock().await.retire_dog(retiree.dog_id);
                log::info!(
                    "dog {} ('{}') retired with score {}",
                    retiree.dog_id,
                    retiree.name,
                    retiree.score
                );
            }
            Err(error) => {
                log::warn!(
                    "failed to persist retirement of dog {} ('{}'): {error}",
                    retiree.dog_id,
                    retiree.name
                );
            }
        }
    }
}

async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let started = Instant::now();
    let response = next.run(request).await;
    log::info!(
        "{method} {uri} -> {} in {} ms",
        response.status().as_u16(),
        started.elapsed().as_millis()
    );
    response
}

async fn healthz() -> Response {
    Json(json!({ "ok": true })).into_response()
}

async fn maps_list(State(ctx): State<AppContext>) -> Response {
    let game = ctx.game.lock().await;
    let list: Vec<Value> = game
        .maps()
        .iter()
        .map(|map| json!({ "id": map.id, "name": map.name }))
        .collect();
    json_ok(Value::Array(list))
}

async fn map_info(State(ctx): State<AppContext>, PathParam(id): PathParam<String>) -> Response {
    let game = ctx.game.lock().await;
    match game.find_map(&id) {
        Some(map) => json_ok(map_to_json(map)),
        None => map_not_found(),
    }
}

fn map_to_json(map: &Map) -> Value {
    let roads: Vec<Value> = map
        .roads()
        .iter()
        .map(|road| {
            let start = road.start();
            let end = road.end();
            if road.is_horizontal() {
                json!({ "x0": start.x, "y0": start.y, "x1": end.x })
            } else {
                json!({ "x0": start.x, "y0": start.y, "y1": end.y })
            }
        })
        .collect();

    let buildings: Vec<Value> = map
        .buildings()
        .iter()
        .map(|b| json!({ "x": b.x, "y": b.y, "w": b.width, "h": b.height }))
        .collect();

    let offices: Vec<Value> = map
        .offices()
        .iter()
        .map(|office| {
            json!({
                "id": office.id,
                "x": office.position.x,
                "y": office.position.y,
                "offsetX": office.offset_x,
                "offsetY": office.offset_y,
            })
        })
        .collect();

    json!({
        "id": map.id,
        "name": map.name,
        "roads": roads,
        "buildings": buildings,
        "offices": offices,
        "lootTypes": map.loot_types(),
    })
}

async fn join_game(State(ctx): State<AppContext>, body: String) -> Response {
    let Ok(parsed) = serde_json::from_str::<Value>(&body) else {
        return api_error(
            StatusCode::BAD_REQUEST,
            "invalidArgument",
            "Join game request parse error",
        );
    };
    let (Some(user_name), Some(map_id)) = (
        parsed.get("userName").and_then(Value::as_str),
        parsed.get("mapId").and_then(Value::as_str),
    ) else {
        return api_error(
            StatusCode::BAD_REQUEST,
            "invalidArgument",
            "Join game request parse error",
        );
    };

    if user_name.is_empty() {
        return api_error(
            StatusCode::BAD_REQUEST,
            "invalidArgument",
            "Invalid player name",
        );
    }

    let mut game = ctx.game.lock().await;
    if game.find_map(map_id).is_none() {
        return map_not_found();
    }
    match game.join_game(user_name, map_id) {
        Some(join) => json_ok(json!({ "authToken": join.token, "playerId": join.player_id })),
        None => api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internalError",
            "Internal server error",
        ),
    }
}

async fn session_players(State(ctx): State<AppContext>, headers: HeaderMap) -> Response {
    let Some(token) = extract_bearer_token(&headers) else {
        return invalid_token();
    };

    let game = ctx.game.lock().await;
    if game.players().find_by_token(&token).is_none() {
        return unknown_token();
    }

    let mut body = JsonMap::new();
    for player in game.players_in_session(&token) {
        let name = game
            .session_by_id(player.session_id)
            .and_then(|session| session.dog_by_id(player.dog_id))
            .map(|dog| dog.name.clone())
            .unwrap_or_default();
        body.insert(player.id.to_string(), json!({ "name": name }));
    }
    json_ok(Value::Object(body))
}

async fn session_state(State(ctx): State<AppContext>, headers: HeaderMap) -> Response {
    let Some(token) = extract_bearer_token(&headers) else {
        return invalid_token();
    };

    let game = ctx.game.lock().await;
    if game.players().find_by_token(&token).is_none() {
        return unknown_token();
    }

    let mut players_body = JsonMap::new();
    for player in game.players_in_session(&token) {
        let Some(session) = game.session_by_id(player.session_id) else {
            continue;
        };
        let Some(dog) = session.dog_by_id(player.dog_id) else {
            continue;
        };
        let bag: Vec<Value> = dog
            .bag
            .iter()
            .map(|loot| json!({ "id": loot.id, "type": loot.type_index }))
            .collect();
        players_body.insert(
            player.id.to_string(),
            json!({
                "pos": [dog.position.x, dog.position.y],
                "speed": [dog.speed.x, dog.speed.y],
                "dir": dog.direction.as_move_str(),
                "bag": bag,
                "score": dog.score,
            }),
        );
    }

    let mut loot_body = JsonMap::new();
    if let Some(session) = game.session_of_token(&token) {
        for loot in &session.loot {
            loot_body.insert(
                loot.id.to_string(),
                json!({
                    "type": loot.type_index,
                    "pos": [loot.position.x, loot.position.y],
                }),
            );
        }
    }

    json_ok(json!({ "players": players_body, "lostObjects": loot_body }))
}

async fn player_action(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let Some(token) = extract_bearer_token(&headers) else {
        return invalid_token();
    };

    if !has_json_content_type(&headers) {
        return api_error(
            StatusCode::BAD_REQUEST,
            "invalidArgument",
            "Invalid content type",
        );
    }

    let mut game = ctx.game.lock().await;
    if game.players().find_by_token(&token).is_none() {
        return unknown_token();
    }

    let direction = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|parsed| {
            parsed
                .get("move")
                .and_then(Value::as_str)
                .and_then(Direction::parse_move)
        });
    let Some(direction) = direction else {
        return api_error(
            StatusCode::BAD_REQUEST,
            "invalidArgument",
            "Failed to parse action",
        );
    };

    if !game.make_action(&token, direction) {
        return unknown_token();
    }
    json_ok(json!({}))
}

async fn game_tick(State(ctx): State<AppContext>, body: String) -> Response {
    let retirees = {
        let mut game = ctx.game.lock().await;

        // outside TEST mode the endpoint behaves like an unknown API path
        if game.mode() != GameMode::Test {
            return bad_request();
        }

        let delta = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|parsed| parsed.get("timeDelta").and_then(Value::as_i64));
        let Some(delta) = delta else {
            return api_error(
                StatusCode::BAD_REQUEST,
                "invalidArgument",
                "Failed to parse tick request JSON",
            );
        };
        if delta < 0 {
            return api_error(
                StatusCode::BAD_REQUEST,
                "invalidArgument",
                "Failed to parse tick request JSON",
            );
        }

        let delta = delta as u64;
        game.add_test_time(delta);
        match game.update(delta) {
            Ok(retirees) => retirees,
            Err(error) => {
                log::error!("test tick failed: {error}");
                return api_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internalError",
                    "Internal server error",
                );
            }
        }
    };

    persist_retirees(&ctx, retirees).await;
    json_ok(json!({}))
}

#[derive(Debug, Deserialize)]
struct RecordsQuery {
    start: Option<String>,
    #[serde(rename = "maxItems")]
    max_items: Option<String>,
}

async fn game_records(
    State(ctx): State<AppContext>,
    Query(query): Query<RecordsQuery>,
) -> Response {
    let start = parse_start(query.start.as_deref());
    let max_items = match parse_max_items(query.max_items.as_deref()) {
        Ok(value) => value,
        Err(()) => {
            return api_error(
                StatusCode::BAD_REQUEST,
                "invalidArgument",
                "maxItems cannot exceed 100",
            )
        }
    };

    match ctx.db.get_records(start, max_items).await {
        Ok(records) => {
            let body: Vec<Value> = records
                .iter()
                .map(|record| {
                    json!({
                        "name": record.name,
                        "score": record.score,
                        "playTime": record.play_time_ms as f64 / MS_IN_SECOND,
                    })
                })
                .collect();
            json_ok(Value::Array(body))
        }
        Err(error) => {
            log::error!("failed to read retirement records: {error}");
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internalError",
                "Failed to retrieve records",
            )
        }
    }
}

fn parse_start(raw: Option<&str>) -> i64 {
    match raw {
        None => 0,
        Some(value) => match value.parse::<i64>() {
            Ok(start) => start.max(0),
            Err(_) => {
                log::warn!("failed to parse start parameter '{value}'");
                0
            }
        },
    }
}

fn parse_max_items(raw: Option<&str>) -> Result<i64, ()> {
    match raw {
        None => Ok(DEFAULT_RECORD_ROWS),
        Some(value) => match value.parse::<i64>() {
            Ok(max_items) if max_items > MAX_RECORD_ROWS => Err(()),
            Ok(max_items) => Ok(max_items.max(0)),
            Err(_) => {
                log::warn!("failed to parse maxItems parameter '{value}'");
                Ok(DEFAULT_RECORD_ROWS)
            }
        },
    }
}

/// Header presence is checked before anything is read from it; then the
/// scheme, then the token shape.
fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = raw.strip_prefix("Bearer ")?.trim();
    if is_valid_token(token) {
        Some(token.to_string())
    } else {
        None
    }
}

fn has_json_content_type(headers: &HeaderMap) -> bool {
    let Some(value) = headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    let Some(essence) = value.split(';').next() else {
        return false;
    };
    essence.trim().eq_ignore_ascii_case("application/json")
}

fn json_response(status: StatusCode, body: Value) -> Response {
    let mut response = (status, Json(body)).into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response
}

fn json_ok(body: Value) -> Response {
    json_response(StatusCode::OK, body)
}

fn api_error(status: StatusCode, code: &str, message: &str) -> Response {
    json_response(status, json!({ "code": code, "message": message }))
}

fn bad_request() -> Response {
    api_error(StatusCode::BAD_REQUEST, "badRequest", "Bad request")
}

fn invalid_token() -> Response {
    api_error(
        StatusCode::UNAUTHORIZED,
        "invalidToken",
        "Authorization header is missing",
    )
}

fn unknown_token() -> Response {
    api_error(
        StatusCode::UNAUTHORIZED,
        "unknownToken",
        "Player token has not been found",
    )
}

fn map_not_found() -> Response {
    api_error(StatusCode::NOT_FOUND, "mapNotFound", "Map not found")
}

fn method_not_allowed(allow: &'static str, message: &str) -> Response {
    let mut response = api_error(StatusCode::METHOD_NOT_ALLOWED, "invalidMethod", message);
    response
        .headers_mut()
        .insert(header::ALLOW, HeaderValue::from_static(allow));
    response
}

async fn get_head_only() -> Response {
    method_not_allowed("GET, HEAD", "Only GET & HEAD method is expected")
}

async fn post_only() -> Response {
    method_not_allowed("POST", "Only POST method is expected")
}

async fn unknown_api() -> Response {
    bad_request()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_with_auth(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn bearer_token_is_extracted_from_a_wellformed_header() {
        let headers = headers_with_auth("Bearer 0123456789abcdef0123456789abcdef");
        assert_eq!(
            extract_bearer_token(&headers).as_deref(),
            Some("0123456789abcdef0123456789abcdef")
        );
    }

    #[test]
    fn missing_header_scheme_or_shape_yields_none() {
        assert_eq!(extract_bearer_token(&HeaderMap::new()), None);
        assert_eq!(
            extract_bearer_token(&headers_with_auth("0123456789abcdef0123456789abcdef")),
            None
        );
        assert_eq!(
            extract_bearer_token(&headers_with_auth("Basic 0123456789abcdef0123456789abcdef")),
            None
        );
        assert_eq!(extract_bearer_token(&headers_with_auth("Bearer short")), None);
        assert_eq!(
            extract_bearer_token(&headers_with_auth(
                "Bearer 0123456789abcdef0123456789abcdeg"
            )),
            None
        );
    }

    #[test]
    fn content_type_check_allows_parameters() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        assert!(has_json_content_type(&headers));

        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
        assert!(has_json_content_type(&headers));

        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        assert!(!has_json_content_type(&headers));

        assert!(!has_json_content_type(&HeaderMap::new()));
    }

    #[test]
    fn records_query_parsing_mirrors_the_service_rules() {
        assert_eq!(parse_start(None), 0);
        assert_eq!(parse_start(Some("25")), 25);
        assert_eq!(parse_start(Some("-3")), 0);
        assert_eq!(parse_start(Some("junk")), 0);

        assert_eq!(parse_max_items(None), Ok(DEFAULT_RECORD_ROWS));
        assert_eq!(parse_max_items(Some("10")), Ok(10));
        assert_eq!(parse_max_items(Some("0")), Ok(0));
        assert_eq!(parse_max_items(Some("-5")), Ok(0));
        assert_eq!(parse_max_items(Some("100")), Ok(100));
        assert_eq!(parse_max_items(Some("101")), Err(()));
        assert_eq!(parse_max_items(Some("junk")), Ok(DEFAULT_RECORD_ROWS));
    }

    #[test]
    fn error_responses_carry_the_envelope_headers() {
        let response = bad_request();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL).unwrap(),
            "no-cache"
        );

        let response = method_not_allowed("POST", "Only POST method is expected");
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers().get(header::ALLOW).unwrap(), "POST");
    }
}
