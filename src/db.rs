use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::engine::RetiredDog;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlayerRecord {
    pub id: Uuid,
    pub name: String,
    pub score: i32,
    pub play_time_ms: i64,
}

impl PlayerRecord {
    pub fn from_retiree(retiree: &RetiredDog) -> Result<Self, uuid::Error> {
        Ok(Self {
            id: Uuid::parse_str(&retiree.uuid)?,
            name: retiree.name.clone(),
            score: retiree.score as i32,
            play_time_ms: retiree.play_time_ms as i64,
        })
    }
}

/// Retired-player records behind a bounded Postgres pool. Callers queue on
/// the pool's acquire; one connection is enough for short upserts and
/// paged selects.
#[derive(Clone, Debug)]
pub struct RecordsDb {
    pool: PgPool,
}

impl RecordsDb {
    /// Builds the pool without connecting; the first query dials out.
    pub fn connect_lazy(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_lazy(url)?;
        Ok(Self { pool })
    }

    /// Idempotent schema setup. The index matches the leaderboard order so
    /// paged reads walk it directly.
    pub async fn initialize(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS retired_players (
                id UUID PRIMARY KEY,
                name VARCHAR(100),
                score INT,
                play_time_ms INT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_retired_players_score_playtime_name
            ON retired_players (score DESC, play_time_ms ASC, name ASC)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Upserts by UUID, so retrying a failed retirement is harmless.
    pub async fn save_record(&self, record: &PlayerRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO retired_players (id, name, score, play_time_ms)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id)
            DO UPDATE SET name = excluded.name,
                          score = excluded.score,
                          play_time_ms = excluded.play_time_ms
            "#,
        )
        .bind(record.id)
        .bind(&record.name)
        .bind(record.score)
        .bind(record.play_time_ms as i32)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_records(
        &self,
        start: i64,
        max_items: i64,
    ) -> Result<Vec<PlayerRecord>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, score, play_time_ms
            FROM retired_players
            ORDER BY score DESC, play_time_ms ASC, name ASC
            OFFSET $1 LIMIT $2
            "#,
        )
        .bind(start)
        .bind(max_items)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| PlayerRecord {
                id: row.get("id"),
                name: row.get("name"),
                score: row.get("score"),
                play_time_ms: row.get::<i32, _>("play_time_ms") as i64,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::Point2D;

    #[test]
    fn record_is_built_from_a_retiree() {
        let dog = crate::engine::Dog::new(7, "Rex".to_string(), Point2D::new(0.0, 0.0), 0);
        let retiree = RetiredDog {
            dog_id: dog.id,
            uuid: dog.uuid.clone(),
            name: dog.name.clone(),
            score: 42,
            play_time_ms: 61_000,
        };

        let record = PlayerRecord::from_retiree(&retiree).expect("dog uuid parses");
        assert_eq!(record.id.to_string(), dog.uuid);
        assert_eq!(record.name, "Rex");
        assert_eq!(record.score, 42);
        assert_eq!(record.play_time_ms, 61_000);
    }

    #[test]
    fn malformed_uuid_is_rejected() {
        let retiree = RetiredDog {
            dog_id: 0,
            uuid: "not-a-uuid".to_string(),
            name: "Rex".to_string(),
            score: 0,
            play_time_ms: 0,
        };
        assert!(PlayerRecord::from_retiree(&retiree).is_err());
    }

    #[tokio::test]
    async fn lazy_pool_builds_without_a_live_database() {
        assert!(RecordsDb::connect_lazy("postgres://localhost/none", 1).is_ok());
    }
}
