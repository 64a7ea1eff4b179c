//! Data fetcher: a thin typed client for the sports-data API plus the
//! cache-through composition that backfills the store on miss.
//!
//! Every outbound call is attempted exactly once; a failed call degrades to
//! an empty result for best-effort paths rather than blocking or retrying.

use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{GridironError, Result};
use crate::models::{
    ApiResponse, QbStatSnapshot, RawGame, RawGameOdds, RawPlayersTeam, RawTeam, RawTeamGameStats,
    RawTeamMeta, TeamRecord, TeamStatSnapshot,
};
use crate::stats;
use crate::store::CacheStore;

/// How many recent games feed a matchup analysis.
pub const RECENT_GAMES: usize = 3;
/// Forward window for the by-date fallback search.
pub const LOOKAHEAD_DAYS: i64 = 7;

/// Status code the API uses for a finished game.
const STATUS_FINAL: &str = "FT";

/// Typed client for the external API. Holds the credential header pair, a
/// direct rate limiter, and a monotone call counter for external quota
/// guards.
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    host: String,
    api_key: String,
    league: String,
    season: String,
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    calls: AtomicU64,
}

impl ApiClient {
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(5)
            .build()?;

        // 10 requests per minute matches the free-tier quota
        let limiter = RateLimiter::direct(Quota::per_minute(NonZeroU32::new(10).unwrap()));

        Ok(Self {
            client,
            base_url: config.api_base_url.clone(),
            host: config.api_host.clone(),
            api_key: config.api_key.clone(),
            league: config.league.clone(),
            season: config.season.clone(),
            limiter,
            calls: AtomicU64::new(0),
        })
    }

    /// Total outbound API calls made so far.
    pub fn calls_made(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        self.limiter.until_ready().await;
        let call_no = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
        let url = format!("{}{}", self.base_url, path);
        debug!(call_no, %url, "API call");

        let response = self
            .client
            .get(&url)
            .header("x-rapidapi-host", &self.host)
            .header("x-rapidapi-key", &self.api_key)
            .query(query)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(GridironError::Upstream(format!(
                "{} returned status {}: {}",
                path, status, body
            )));
        }
        Ok(serde_json::from_str(&body)?)
    }

    pub async fn fetch_teams(&self) -> Result<Vec<RawTeam>> {
        let payload: ApiResponse<RawTeam> = self
            .get_json(
                "/teams",
                &[("league", self.league.clone()), ("season", self.season.clone())],
            )
            .await?;
        Ok(payload.response)
    }

    pub async fn fetch_team_games(&self, team_id: i64) -> Result<Vec<RawGame>> {
        let payload: ApiResponse<RawGame> = self
            .get_json(
                "/games",
                &[
                    ("league", self.league.clone()),
                    ("season", self.season.clone()),
                    ("team", team_id.to_string()),
                ],
            )
            .await?;
        Ok(payload.response)
    }

    pub async fn fetch_game_by_id(&self, game_id: i64) -> Result<Option<RawGame>> {
        let payload: ApiResponse<RawGame> = self
            .get_json(
                "/games",
                &[
                    ("id", game_id.to_string()),
                    ("league", self.league.clone()),
                    ("season", self.season.clone()),
                ],
            )
            .await?;
        Ok(payload.response.into_iter().next())
    }

    pub async fn fetch_games_by_date(&self, date: &str) -> Result<Vec<RawGame>> {
        let payload: ApiResponse<RawGame> = self
            .get_json(
                "/games",
                &[
                    ("league", self.league.clone()),
                    ("season", self.season.clone()),
                    ("date", date.to_string()),
                ],
            )
            .await?;
        Ok(payload.response)
    }

    pub async fn fetch_game_stats(&self, game_id: i64) -> Result<Vec<RawTeamGameStats>> {
        let payload: ApiResponse<RawTeamGameStats> = self
            .get_json("/games/statistics/teams", &[("id", game_id.to_string())])
            .await?;
        Ok(payload.response)
    }

    pub async fn fetch_passing_stats(&self, game_id: i64) -> Result<Vec<RawPlayersTeam>> {
        let payload: ApiResponse<RawPlayersTeam> = self
            .get_json(
                "/games/statistics/players",
                &[("id", game_id.to_string()), ("group", "Passing".to_string())],
            )
            .await?;
        Ok(payload.response)
    }

    pub async fn fetch_odds(&self, game_id: i64, bookmaker_id: i64) -> Result<Option<RawGameOdds>> {
        let payload: ApiResponse<RawGameOdds> = self
            .get_json(
                "/odds",
                &[
                    ("game", game_id.to_string()),
                    ("bookmaker", bookmaker_id.to_string()),
                ],
            )
            .await?;
        Ok(payload.response.into_iter().next())
    }
}

/// Cache-through fetcher over the API client and the cache store.
#[derive(Clone)]
pub struct DataFetcher {
    api: Arc<ApiClient>,
    store: CacheStore,
}

impl DataFetcher {
    pub fn new(api: Arc<ApiClient>, store: CacheStore) -> Self {
        Self { api, store }
    }

    /// Resolve a team by identifier. A mapping miss (or an empty mapping
    /// table) triggers a full refresh from the API before giving up.
    pub async fn team_info(&self, identifier: &str) -> Result<Option<TeamRecord>> {
        if let Some(team) = self.store.team_by_identifier(identifier).await? {
            return Ok(Some(team));
        }

        info!(identifier, "Team mapping miss, refreshing from API");
        match self.api.fetch_teams().await {
            Ok(teams) if !teams.is_empty() => {
                let records: Vec<TeamRecord> = teams
                    .into_iter()
                    .map(|t| TeamRecord {
                        identifier: t.name.to_lowercase(),
                        api_id: t.id,
                        name: t.name,
                    })
                    .collect();
                self.store.replace_team_mapping(&records, Utc::now()).await?;
            }
            Ok(_) => warn!("Team list from API was empty"),
            Err(e) => warn!("Team mapping refresh failed: {e}"),
        }

        self.store.team_by_identifier(identifier).await
    }

    /// All completed games for a team, newest first. API failures degrade
    /// to an empty list.
    pub async fn completed_games(&self, team_id: i64) -> Result<Vec<RawGame>> {
        let games = match self.api.fetch_team_games(team_id).await {
            Ok(games) => games,
            Err(e) => {
                warn!(team_id, "Failed to fetch team games: {e}");
                return Ok(Vec::new());
            }
        };

        let mut completed: Vec<RawGame> = games
            .into_iter()
            .filter(|g| g.game.status.short == STATUS_FINAL)
            .collect();
        completed.sort_by(|a, b| b.game.date.date.cmp(&a.game.date.date));
        Ok(completed)
    }

    /// Most recent completed game ids for a team, newest first.
    pub async fn recent_game_ids(&self, team_id: i64, limit: usize) -> Result<Vec<i64>> {
        let completed = self.completed_games(team_id).await?;
        Ok(completed.iter().take(limit).map(|g| g.game.id).collect())
    }

    /// Last `num_games` team stat snapshots, from cache when it holds at
    /// least that many distinct games, otherwise backfilled from the API.
    pub async fn team_recent_stats(
        &self,
        identifier: &str,
        num_games: usize,
    ) -> Result<Vec<TeamStatSnapshot>> {
        let team = self
            .team_info(identifier)
            .await?
            .ok_or_else(|| GridironError::TeamNotFound(identifier.to_string()))?;

        let cached = self.store.team_stats(team.api_id, num_games).await?;
        if cached.len() >= num_games {
            debug!(team = %team.name, games = cached.len(), "Team stats cache hit");
            return Ok(cached);
        }

        self.fetch_and_cache_team_stats(team.api_id, num_games).await
    }

    /// Backfill: recent-game lookup + per-game stat fetch + normalization +
    /// cache write, returning the assembled snapshots.
    pub async fn fetch_and_cache_team_stats(
        &self,
        team_id: i64,
        num_games: usize,
    ) -> Result<Vec<TeamStatSnapshot>> {
        let game_ids = self.recent_game_ids(team_id, num_games).await?;
        let mut snapshots = Vec::with_capacity(game_ids.len());

        for game_id in game_ids {
            if self.store.has_game_stats(game_id, team_id).await? {
                if let Some(snapshot) = self
                    .store
                    .team_stats(team_id, num_games)
                    .await?
                    .into_iter()
                    .find(|s| s.game_id == game_id)
                {
                    snapshots.push(snapshot);
                }
                continue;
            }

            let blocks = match self.api.fetch_game_stats(game_id).await {
                Ok(blocks) => blocks,
                Err(e) => {
                    warn!(game_id, "Failed to fetch game stats: {e}");
                    continue;
                }
            };
            let Some(block) = blocks.iter().find(|b| b.team.id == team_id) else {
                continue;
            };

            let snapshot = TeamStatSnapshot {
                game_id,
                stats: stats::normalize_team_stats(&block.statistics),
            };
            self.store.put_team_stats(team_id, &snapshot).await?;
            snapshots.push(snapshot);
        }

        Ok(snapshots)
    }

    /// Metadata block of the opposing team in one game's statistics payload.
    pub async fn opponent_meta(&self, game_id: i64, team_id: i64) -> Result<Option<RawTeamMeta>> {
        let blocks = self.api.fetch_game_stats(game_id).await?;
        Ok(blocks.into_iter().map(|b| b.team).find(|t| t.id != team_id))
    }

    /// Last `num_games` quarterback snapshots for a team, cache-through.
    pub async fn qb_recent_stats(
        &self,
        identifier: &str,
        num_games: usize,
    ) -> Result<Vec<QbStatSnapshot>> {
        let team = self
            .team_info(identifier)
            .await?
            .ok_or_else(|| GridironError::TeamNotFound(identifier.to_string()))?;

        let cached = self.store.qb_stats(team.api_id, num_games).await?;
        if !cached.is_empty() {
            return Ok(cached);
        }

        self.fetch_and_cache_qb_stats(&team, num_games).await
    }

    pub async fn fetch_and_cache_qb_stats(
        &self,
        team: &TeamRecord,
        num_games: usize,
    ) -> Result<Vec<QbStatSnapshot>> {
        let game_ids = self.recent_game_ids(team.api_id, num_games).await?;
        let mut snapshots = Vec::with_capacity(game_ids.len());

        for game_id in game_ids {
            let teams = match self.api.fetch_passing_stats(game_id).await {
                Ok(teams) => teams,
                Err(e) => {
                    warn!(game_id, "Failed to fetch passing stats: {e}");
                    continue;
                }
            };

            // First listed player of the passing group is taken as the
            // primary quarterback (documented simplification).
            let qb = teams
                .iter()
                .find(|t| t.team.name == team.name)
                .and_then(|t| t.groups.first())
                .and_then(|g| g.players.first());

            if let Some(player) = qb {
                snapshots.push(QbStatSnapshot {
                    game_id,
                    line: stats::normalize_qb_stats(player),
                });
            }
        }

        self.store.put_qb_stats(team.api_id, &snapshots).await?;
        Ok(snapshots)
    }

    /// Resolve a game by id: 24h game cache, then direct lookup, then a
    /// 7-day forward date scan. `Ok(None)` means genuinely not found.
    pub async fn resolve_game(&self, game_id: i64) -> Result<Option<RawGame>> {
        let now = Utc::now();
        if let Some(cached) = self.store.cached_game_data(game_id, now).await? {
            if let Ok(game) = serde_json::from_value::<RawGame>(cached) {
                debug!(game_id, "Game cache hit");
                return Ok(Some(game));
            }
        }

        if let Some(game) = self.api.fetch_game_by_id(game_id).await? {
            self.store
                .put_game_data(game_id, &serde_json::to_value(&game)?, now)
                .await?;
            return Ok(Some(game));
        }

        // Direct lookup missed; walk the next week of schedules.
        for offset in 0..LOOKAHEAD_DAYS {
            let date = (now + chrono::Duration::days(offset))
                .format("%Y-%m-%d")
                .to_string();
            let games = match self.api.fetch_games_by_date(&date).await {
                Ok(games) => games,
                Err(e) => {
                    warn!(%date, "Date-range game lookup failed: {e}");
                    continue;
                }
            };
            if let Some(game) = games.into_iter().find(|g| g.game.id == game_id) {
                self.store
                    .put_game_data(game_id, &serde_json::to_value(&game)?, now)
                    .await?;
                return Ok(Some(game));
            }
        }

        Ok(None)
    }
}
