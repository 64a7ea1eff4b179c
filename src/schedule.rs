//! Schedule manager: keeps a rolling week of upcoming games cached, refreshed
//! at most once every seven days.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::error::{GridironError, Result};
use crate::fetcher::{ApiClient, LOOKAHEAD_DAYS};
use crate::models::ScheduledGame;
use crate::store::CacheStore;

/// Minimum age of the weekly marker before a refresh runs again.
pub const REFRESH_INTERVAL_DAYS: i64 = 7;

pub struct ScheduleManager {
    api: Arc<ApiClient>,
    store: CacheStore,
}

impl ScheduleManager {
    pub fn new(api: Arc<ApiClient>, store: CacheStore) -> Self {
        Self { api, store }
    }

    /// A refresh is due when no weekly marker exists or the last one is at
    /// least seven days old.
    pub async fn needs_update(&self, now: DateTime<Utc>) -> Result<bool> {
        match self.store.last_update("weekly").await? {
            None => Ok(true),
            Some(last) => Ok(now - last >= Duration::days(REFRESH_INTERVAL_DAYS)),
        }
    }

    /// Fetch the next week of games day by day, then swap the cached
    /// schedule in a single transaction. Individual bad days are skipped;
    /// the refresh only fails when every day fails.
    pub async fn update_weekly(&self, now: DateTime<Utc>) -> Result<()> {
        let mut games: Vec<ScheduledGame> = Vec::new();
        let mut fetched_any = false;

        for offset in 0..LOOKAHEAD_DAYS {
            let date = (now + Duration::days(offset)).format("%Y-%m-%d").to_string();
            match self.api.fetch_games_by_date(&date).await {
                Ok(day_games) => {
                    fetched_any = true;
                    for raw in day_games {
                        games.push(ScheduledGame {
                            id: raw.game.id,
                            date: raw.game.date.date.clone(),
                            time: raw.game.date.time.clone(),
                            home_team: raw.teams.home.name.clone(),
                            away_team: raw.teams.away.name.clone(),
                            stadium: raw.game.venue.name.clone(),
                            city: raw.game.venue.city.clone(),
                            status: raw.game.status.long.clone(),
                        });
                    }
                }
                Err(e) => warn!(%date, "Schedule fetch failed for day: {e}"),
            }
        }

        if !fetched_any {
            return Err(GridironError::Upstream(
                "schedule refresh failed for every day in the window".to_string(),
            ));
        }

        info!(games = games.len(), "Replacing weekly schedule");
        self.store.replace_schedule(&games, now).await
    }

    /// Upcoming games, refreshing the cache first when it is due.
    pub async fn schedule(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledGame>> {
        if self.needs_update(now).await? {
            if let Err(e) = self.update_weekly(now).await {
                warn!("Weekly schedule refresh failed, serving cached rows: {e}");
            }
        }
        self.store.upcoming_schedule(now).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn test_api() -> Arc<ApiClient> {
        let config = Config {
            api_key: "test".into(),
            api_base_url: "http://127.0.0.1:0".into(),
            api_host: "localhost".into(),
            database_url: "sqlite::memory:".into(),
            listen_port: 0,
            league: "1".into(),
            season: "2024".into(),
        };
        Arc::new(ApiClient::new(&config).unwrap())
    }

    #[tokio::test]
    async fn refresh_is_due_without_a_marker() {
        let store = CacheStore::connect("sqlite::memory:").await.unwrap();
        let manager = ScheduleManager::new(test_api(), store);
        assert!(manager.needs_update(Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn refresh_waits_a_full_week() {
        let store = CacheStore::connect("sqlite::memory:").await.unwrap();
        let written_at: DateTime<Utc> = "2024-11-01T12:00:00Z".parse().unwrap();
        store.replace_schedule(&[], written_at).await.unwrap();

        let manager = ScheduleManager::new(test_api(), store);
        assert!(!manager
            .needs_update(written_at + Duration::days(3))
            .await
            .unwrap());
        assert!(manager
            .needs_update(written_at + Duration::days(7))
            .await
            .unwrap());
    }
}
