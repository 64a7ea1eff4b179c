//! Cache store: every persisted row of the service lives here, keyed as the
//! upstream data is keyed, with per-entity staleness rules enforced at read
//! time. All multi-row writes for one entity group happen inside a single
//! transaction so a failure never leaves partial stat rows behind.

use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::error::Result;
use crate::models::{
    Consensus, OddsBoard, OddsQuote, QbStatLine, QbStatSnapshot, ScheduledGame, TeamRecord,
    TeamStatLine, TeamStatSnapshot,
};

/// How long a cached prediction stays servable.
pub const PREDICTION_TTL_HOURS: i64 = 6;
/// How long a resolved game row stays servable.
pub const GAME_DATA_TTL_HOURS: i64 = 24;

#[derive(Clone)]
pub struct CacheStore {
    pool: SqlitePool,
}

impl CacheStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn init_schema(&self) -> Result<()> {
        let statements = [
            "CREATE TABLE IF NOT EXISTS team_mapping (
                team_identifier TEXT PRIMARY KEY,
                team_id INTEGER NOT NULL,
                team_name TEXT NOT NULL,
                last_updated TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS team_stats (
                game_id INTEGER NOT NULL,
                team_id INTEGER NOT NULL,
                stat_name TEXT NOT NULL,
                stat_value REAL NOT NULL,
                PRIMARY KEY (game_id, team_id, stat_name)
            )",
            "CREATE TABLE IF NOT EXISTS qb_stats (
                game_id INTEGER NOT NULL,
                team_id INTEGER NOT NULL,
                player_id INTEGER NOT NULL,
                player_name TEXT NOT NULL,
                stat_name TEXT NOT NULL,
                stat_value REAL NOT NULL,
                PRIMARY KEY (game_id, team_id, player_id, stat_name)
            )",
            "CREATE TABLE IF NOT EXISTS weekly_schedule (
                game_id INTEGER PRIMARY KEY,
                date TEXT NOT NULL,
                time TEXT NOT NULL DEFAULT '',
                home_team TEXT NOT NULL,
                away_team TEXT NOT NULL,
                stadium TEXT NOT NULL DEFAULT '',
                city TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL DEFAULT '',
                last_updated TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS market_odds (
                game_id INTEGER NOT NULL,
                bookmaker_id INTEGER NOT NULL,
                bet_type TEXT NOT NULL,
                bet_value TEXT NOT NULL,
                odds REAL NOT NULL,
                last_updated TEXT NOT NULL,
                PRIMARY KEY (game_id, bookmaker_id, bet_type, bet_value)
            )",
            "CREATE TABLE IF NOT EXISTS consensus_lines (
                game_id INTEGER NOT NULL,
                line_type TEXT NOT NULL,
                consensus_value TEXT NOT NULL,
                avg_odds REAL NOT NULL,
                book_count INTEGER NOT NULL,
                last_updated TEXT NOT NULL,
                PRIMARY KEY (game_id, line_type)
            )",
            "CREATE TABLE IF NOT EXISTS data_updates (
                update_type TEXT PRIMARY KEY,
                last_update TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS game_predictions_cache (
                game_id INTEGER PRIMARY KEY,
                prediction_data TEXT,
                game_data TEXT,
                last_updated TEXT,
                expiry TEXT
            )",
        ];
        for sql in statements {
            sqlx::query(sql).execute(&self.pool).await?;
        }
        info!("Cache store schema ready");
        Ok(())
    }

    // -- team mapping -------------------------------------------------------

    /// Lookup is case-insensitive: identifiers are stored lowercased.
    pub async fn team_by_identifier(&self, identifier: &str) -> Result<Option<TeamRecord>> {
        let row: Option<(String, i64, String)> = sqlx::query_as(
            "SELECT team_identifier, team_id, team_name
             FROM team_mapping
             WHERE team_identifier = ?",
        )
        .bind(identifier.to_lowercase())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(identifier, api_id, name)| TeamRecord {
            identifier,
            api_id,
            name,
        }))
    }

    pub async fn team_mapping_count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM team_mapping")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Replace the whole mapping table in one transaction.
    pub async fn replace_team_mapping(&self, teams: &[TeamRecord], now: DateTime<Utc>) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM team_mapping").execute(&mut *tx).await?;
        for team in teams {
            sqlx::query(
                "INSERT OR REPLACE INTO team_mapping
                 (team_identifier, team_id, team_name, last_updated)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(team.identifier.to_lowercase())
            .bind(team.api_id)
            .bind(&team.name)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    // -- team stat snapshots ------------------------------------------------

    /// Up to `num_games` most recent per-game snapshots, game_id descending.
    pub async fn team_stats(&self, team_id: i64, num_games: usize) -> Result<Vec<TeamStatSnapshot>> {
        let rows: Vec<(i64, String, f64)> = sqlx::query_as(
            "SELECT game_id, stat_name, stat_value
             FROM team_stats
             WHERE team_id = ?
             ORDER BY game_id DESC",
        )
        .bind(team_id)
        .fetch_all(&self.pool)
        .await?;

        let mut snapshots: Vec<TeamStatSnapshot> = Vec::new();
        let mut pending: Vec<(String, f64)> = Vec::new();
        let mut current: Option<i64> = None;

        for (game_id, name, value) in rows {
            if current != Some(game_id) {
                if let Some(id) = current {
                    snapshots.push(TeamStatSnapshot {
                        game_id: id,
                        stats: TeamStatLine::from_pairs(
                            pending.iter().map(|(n, v)| (n.as_str(), *v)),
                        ),
                    });
                    pending.clear();
                    if snapshots.len() == num_games {
                        return Ok(snapshots);
                    }
                }
                current = Some(game_id);
            }
            pending.push((name, value));
        }
        if let Some(id) = current {
            snapshots.push(TeamStatSnapshot {
                game_id: id,
                stats: TeamStatLine::from_pairs(pending.iter().map(|(n, v)| (n.as_str(), *v))),
            });
        }
        snapshots.truncate(num_games);
        Ok(snapshots)
    }

    pub async fn has_game_stats(&self, game_id: i64, team_id: i64) -> Result<bool> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM team_stats WHERE game_id = ? AND team_id = ?")
                .bind(game_id)
                .bind(team_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count > 0)
    }

    /// All-or-nothing write of one game's stat rows for one team.
    pub async fn put_team_stats(&self, team_id: i64, snapshot: &TeamStatSnapshot) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for (name, value) in snapshot.stats.to_pairs() {
            sqlx::query(
                "INSERT OR REPLACE INTO team_stats (game_id, team_id, stat_name, stat_value)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(snapshot.game_id)
            .bind(team_id)
            .bind(name)
            .bind(value)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    // -- quarterback snapshots ----------------------------------------------

    pub async fn qb_stats(&self, team_id: i64, num_games: usize) -> Result<Vec<QbStatSnapshot>> {
        let rows: Vec<(i64, i64, String, String, f64)> = sqlx::query_as(
            "SELECT game_id, player_id, player_name, stat_name, stat_value
             FROM qb_stats
             WHERE team_id = ?
             ORDER BY game_id DESC",
        )
        .bind(team_id)
        .fetch_all(&self.pool)
        .await?;

        let mut snapshots: Vec<QbStatSnapshot> = Vec::new();
        let mut pending: Vec<(String, f64)> = Vec::new();
        let mut header: Option<(i64, i64, String)> = None;

        let flush = |header: &Option<(i64, i64, String)>,
                     pending: &[(String, f64)],
                     snapshots: &mut Vec<QbStatSnapshot>| {
            if let Some((game_id, player_id, player_name)) = header {
                let mut line =
                    QbStatLine::from_pairs(pending.iter().map(|(n, v)| (n.as_str(), *v)));
                line.player_id = *player_id;
                line.player_name = player_name.clone();
                snapshots.push(QbStatSnapshot {
                    game_id: *game_id,
                    line,
                });
            }
        };

        for (game_id, player_id, player_name, name, value) in rows {
            if header.as_ref().map(|h| h.0) != Some(game_id) {
                flush(&header, &pending, &mut snapshots);
                pending.clear();
                if snapshots.len() == num_games {
                    return Ok(snapshots);
                }
                header = Some((game_id, player_id, player_name));
            }
            pending.push((name, value));
        }
        flush(&header, &pending, &mut snapshots);
        snapshots.truncate(num_games);
        Ok(snapshots)
    }

    /// Replaces the team's QB rows wholesale: stale quarterbacks are not
    /// mixed with current ones.
    pub async fn put_qb_stats(&self, team_id: i64, snapshots: &[QbStatSnapshot]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM qb_stats WHERE team_id = ?")
            .bind(team_id)
            .execute(&mut *tx)
            .await?;
        for snapshot in snapshots {
            for (name, value) in snapshot.line.to_pairs() {
                sqlx::query(
                    "INSERT OR REPLACE INTO qb_stats
                     (game_id, team_id, player_id, player_name, stat_name, stat_value)
                     VALUES (?, ?, ?, ?, ?, ?)",
                )
                .bind(snapshot.game_id)
                .bind(team_id)
                .bind(snapshot.line.player_id)
                .bind(&snapshot.line.player_name)
                .bind(name)
                .bind(value)
                .execute(&mut *tx)
                .await?;
            }
        }
        tx.commit().await?;
        Ok(())
    }

    // -- weekly schedule ----------------------------------------------------

    /// Games at or after `now`, ordered ascending by date then time.
    pub async fn upcoming_schedule(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledGame>> {
        let rows: Vec<(i64, String, String, String, String, String, String, String)> =
            sqlx::query_as(
                "SELECT game_id, date, time, home_team, away_team, stadium, city, status
                 FROM weekly_schedule
                 WHERE datetime(date || ' ' || COALESCE(NULLIF(time, ''), '00:00')) >= datetime(?)
                 ORDER BY date, time",
            )
            .bind(now.format("%Y-%m-%d %H:%M:%S").to_string())
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(
                |(id, date, time, home_team, away_team, stadium, city, status)| ScheduledGame {
                    id,
                    date,
                    time,
                    home_team,
                    away_team,
                    stadium,
                    city,
                    status,
                },
            )
            .collect())
    }

    pub async fn game_from_schedule(&self, game_id: i64) -> Result<Option<ScheduledGame>> {
        let row: Option<(i64, String, String, String, String, String, String, String)> =
            sqlx::query_as(
                "SELECT game_id, date, time, home_team, away_team, stadium, city, status
                 FROM weekly_schedule
                 WHERE game_id = ?",
            )
            .bind(game_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(
            |(id, date, time, home_team, away_team, stadium, city, status)| ScheduledGame {
                id,
                date,
                time,
                home_team,
                away_team,
                stadium,
                city,
                status,
            },
        ))
    }

    /// Delete-then-repopulate inside one transaction, together with the
    /// weekly update marker; an interrupted refresh rolls back to the prior
    /// schedule rather than a mixed one.
    pub async fn replace_schedule(&self, games: &[ScheduledGame], now: DateTime<Utc>) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM weekly_schedule").execute(&mut *tx).await?;
        for game in games {
            sqlx::query(
                "INSERT OR REPLACE INTO weekly_schedule
                 (game_id, date, time, home_team, away_team, stadium, city, status, last_updated)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(game.id)
            .bind(&game.date)
            .bind(&game.time)
            .bind(&game.home_team)
            .bind(&game.away_team)
            .bind(&game.stadium)
            .bind(&game.city)
            .bind(&game.status)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        sqlx::query(
            "INSERT OR REPLACE INTO data_updates (update_type, last_update) VALUES ('weekly', ?)",
        )
        .bind(now)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn last_update(&self, update_type: &str) -> Result<Option<DateTime<Utc>>> {
        let row: Option<(DateTime<Utc>,)> =
            sqlx::query_as("SELECT last_update FROM data_updates WHERE update_type = ?")
                .bind(update_type)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(ts,)| ts))
    }

    // -- market odds --------------------------------------------------------

    /// Cached processed odds for one bookmaker, `None` when nothing is
    /// cached. Quote order follows insertion order.
    pub async fn odds(&self, game_id: i64, bookmaker_id: i64) -> Result<Option<OddsBoard>> {
        let rows: Vec<(String, String, f64)> = sqlx::query_as(
            "SELECT bet_type, bet_value, odds
             FROM market_odds
             WHERE game_id = ? AND bookmaker_id = ?
             ORDER BY rowid",
        )
        .bind(game_id)
        .bind(bookmaker_id)
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            return Ok(None);
        }
        let mut board = OddsBoard::default();
        for (bet_type, bet_value, odd) in rows {
            board.push(&bet_type, OddsQuote { line: bet_value, odd });
        }
        Ok(Some(board))
    }

    pub async fn put_odds(
        &self,
        game_id: i64,
        bookmaker_id: i64,
        board: &OddsBoard,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for (bet_type, quote) in board.iter_all() {
            sqlx::query(
                "INSERT OR REPLACE INTO market_odds
                 (game_id, bookmaker_id, bet_type, bet_value, odds, last_updated)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(game_id)
            .bind(bookmaker_id)
            .bind(bet_type)
            .bind(&quote.line)
            .bind(quote.odd)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    // -- consensus lines ----------------------------------------------------

    pub async fn consensus(&self, game_id: i64) -> Result<Vec<(String, Consensus)>> {
        let rows: Vec<(String, String, f64, i64)> = sqlx::query_as(
            "SELECT line_type, consensus_value, avg_odds, book_count
             FROM consensus_lines
             WHERE game_id = ?",
        )
        .bind(game_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(line_type, line, avg_odd, book_count)| {
                (
                    line_type,
                    Consensus {
                        line,
                        avg_odd,
                        book_count,
                    },
                )
            })
            .collect())
    }

    /// When the cached consensus for a game was last written.
    pub async fn consensus_updated_at(&self, game_id: i64) -> Result<Option<DateTime<Utc>>> {
        let row: Option<(Option<DateTime<Utc>>,)> =
            sqlx::query_as("SELECT MAX(last_updated) FROM consensus_lines WHERE game_id = ?")
                .bind(game_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.and_then(|(ts,)| ts))
    }

    pub async fn put_consensus(
        &self,
        game_id: i64,
        entries: &[(String, Consensus)],
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for (line_type, consensus) in entries {
            sqlx::query(
                "INSERT OR REPLACE INTO consensus_lines
                 (game_id, line_type, consensus_value, avg_odds, book_count, last_updated)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(game_id)
            .bind(line_type)
            .bind(&consensus.line)
            .bind(consensus.avg_odd)
            .bind(consensus.book_count)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    // -- prediction / game caches -------------------------------------------

    /// Cached prediction, never served past its expiry. Malformed cached
    /// JSON counts as a miss, not an error.
    pub async fn cached_prediction(
        &self,
        game_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<serde_json::Value>> {
        let row: Option<(Option<String>,)> = sqlx::query_as(
            "SELECT prediction_data
             FROM game_predictions_cache
             WHERE game_id = ? AND expiry > ?",
        )
        .bind(game_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        let Some((Some(payload),)) = row else {
            return Ok(None);
        };
        match serde_json::from_str(&payload) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(game_id, "Discarding corrupt cached prediction: {e}");
                Ok(None)
            }
        }
    }

    pub async fn put_prediction(
        &self,
        game_id: i64,
        prediction: &serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let expiry = now + Duration::hours(PREDICTION_TTL_HOURS);
        sqlx::query(
            "INSERT INTO game_predictions_cache (game_id, prediction_data, last_updated, expiry)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(game_id) DO UPDATE SET
                prediction_data = excluded.prediction_data,
                last_updated = excluded.last_updated,
                expiry = excluded.expiry",
        )
        .bind(game_id)
        .bind(prediction.to_string())
        .bind(now)
        .bind(expiry)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Resolved game payload, fresh for 24 hours.
    pub async fn cached_game_data(
        &self,
        game_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<serde_json::Value>> {
        let row: Option<(Option<String>, Option<DateTime<Utc>>)> = sqlx::query_as(
            "SELECT game_data, last_updated
             FROM game_predictions_cache
             WHERE game_id = ?",
        )
        .bind(game_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some((Some(payload), Some(updated))) = row else {
            return Ok(None);
        };
        if now - updated >= Duration::hours(GAME_DATA_TTL_HOURS) {
            return Ok(None);
        }
        match serde_json::from_str(&payload) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(game_id, "Discarding corrupt cached game data: {e}");
                Ok(None)
            }
        }
    }

    pub async fn put_game_data(
        &self,
        game_id: i64,
        game: &serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO game_predictions_cache (game_id, game_data, last_updated)
             VALUES (?, ?, ?)
             ON CONFLICT(game_id) DO UPDATE SET
                game_data = excluded.game_data,
                last_updated = excluded.last_updated",
        )
        .bind(game_id)
        .bind(game.to_string())
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
