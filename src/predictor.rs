//! Prediction pipeline: resolve the game, analyze the matchup, score it,
//! attach odds and recommendations, and cache the assembled payload.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::{info, warn};

use crate::analyzer::MatchupAnalyzer;
use crate::error::{GridironError, Result};
use crate::fetcher::{ApiClient, DataFetcher};
use crate::market::{self, OddsEngine};
use crate::models::{AdjustedConfidence, Prediction, RawGame, TeamRecord};
use crate::scoring::calculate_confidence_scores;
use crate::store::CacheStore;

/// Opponents counted as "recent" for the schedule-strength factor.
const SOS_RECENT_GAMES: usize = 3;
/// Season-long opponent window for the same factor.
const SOS_SEASON_GAMES: usize = 10;
/// The situational adjustment never moves a score by more than this.
const MAX_ADJUSTMENT: i32 = 5;

/// Neutral stand-ins when an opponent's record is missing from the payload.
const DEFAULT_WIN_PCT: f64 = 0.5;
const DEFAULT_POINTS_PER_GAME: f64 = 20.0;

/// One past opponent's quality, read from the game-stats payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OpponentStrength {
    pub win_pct: f64,
    pub points_per_game: f64,
}

impl Default for OpponentStrength {
    fn default() -> Self {
        Self {
            win_pct: DEFAULT_WIN_PCT,
            points_per_game: DEFAULT_POINTS_PER_GAME,
        }
    }
}

pub struct Predictor {
    fetcher: DataFetcher,
    analyzer: MatchupAnalyzer,
    odds: OddsEngine,
    store: CacheStore,
}

impl Predictor {
    pub fn new(api: Arc<ApiClient>, store: CacheStore) -> Self {
        let fetcher = DataFetcher::new(api.clone(), store.clone());
        Self {
            analyzer: MatchupAnalyzer::new(fetcher.clone()),
            odds: OddsEngine::new(api, store.clone()),
            fetcher,
            store,
        }
    }

    /// Full prediction for one game, served from cache when a fresh one
    /// exists.
    pub async fn predict(&self, game_id: i64) -> Result<serde_json::Value> {
        let now = Utc::now();
        if let Some(cached) = self.store.cached_prediction(game_id, now).await? {
            info!(game_id, "Serving cached prediction");
            return Ok(cached);
        }

        let game = self
            .fetcher
            .resolve_game(game_id)
            .await?
            .ok_or(GridironError::GameNotFound(game_id))?;

        let home_team = game.teams.home.name.clone();
        let away_team = game.teams.away.name.clone();
        info!(game_id, home = %home_team, away = %away_team, "Building prediction");

        let analysis = self.analyzer.analyze(&home_team, &away_team).await?;
        let confidence_scores = calculate_confidence_scores(&analysis.advantages);

        let adjusted_confidence = self
            .adjusted_confidence(&confidence_scores, &home_team, &away_team, &game.game.date.date)
            .await;

        let odds = self.odds.game_odds(game_id).await?;
        let betting_recommendations = market::find_best_odds(&analysis, &confidence_scores, &odds);

        let prediction = Prediction {
            matchup: format!("{} vs {}", home_team, away_team),
            date: game.game.date.date.clone(),
            statistical_analysis: analysis,
            confidence_scores,
            adjusted_confidence,
            odds,
            betting_recommendations,
        };

        let payload = serde_json::to_value(&prediction)?;
        self.store.put_prediction(game_id, &payload, now).await?;
        Ok(payload)
    }

    /// Situational adjustment of the favorite's confidence: schedule
    /// strength plus rest ahead of the given kickoff date. Purely
    /// informational; recommendations stay on the base scores. Any failure
    /// here degrades to no adjustment.
    async fn adjusted_confidence(
        &self,
        scores: &std::collections::BTreeMap<String, u32>,
        home_team: &str,
        away_team: &str,
        game_date: &str,
    ) -> Option<AdjustedConfidence> {
        let (favorite, base) = scores.iter().max_by_key(|(_, score)| **score)?;
        let is_home = favorite == home_team;
        let identifier = if is_home { home_team } else { away_team };

        let confidence = match self.fetcher.team_info(identifier).await {
            Ok(Some(team)) => {
                let delta = self
                    .situational_delta(&team, is_home, kickoff_day(game_date))
                    .await;
                apply_adjustment(*base as i32, delta)
            }
            Ok(None) => *base as i32,
            Err(e) => {
                warn!(team = identifier, "Adjustment lookup failed: {e}");
                *base as i32
            }
        };
        Some(AdjustedConfidence {
            team: favorite.clone(),
            confidence,
        })
    }

    async fn situational_delta(&self, team: &TeamRecord, is_home: bool, kickoff: NaiveDate) -> i32 {
        let games = match self.fetcher.completed_games(team.api_id).await {
            Ok(games) => games,
            Err(e) => {
                warn!(team = %team.name, "Form lookup failed: {e}");
                return 0;
            }
        };
        let season = self.opponent_strengths(&games, team.api_id).await;
        let recent = &season[..season.len().min(SOS_RECENT_GAMES)];
        schedule_strength_adjustment(recent, &season, is_home)
            + rest_adjustment(last_game_date(&games), kickoff)
    }

    /// Opponent quality for each recent game, newest first. A missing or
    /// unfetchable opponent block counts as a league-average opponent.
    async fn opponent_strengths(&self, games: &[RawGame], team_id: i64) -> Vec<OpponentStrength> {
        let mut strengths = Vec::new();
        for game in games.iter().take(SOS_SEASON_GAMES) {
            let strength = match self.fetcher.opponent_meta(game.game.id, team_id).await {
                Ok(Some(meta)) => OpponentStrength {
                    win_pct: meta.win_pct.unwrap_or(DEFAULT_WIN_PCT),
                    points_per_game: meta.points_per_game.unwrap_or(DEFAULT_POINTS_PER_GAME),
                },
                Ok(None) => OpponentStrength::default(),
                Err(e) => {
                    warn!(game_id = game.game.id, "Opponent lookup failed: {e}");
                    OpponentStrength::default()
                }
            };
            strengths.push(strength);
        }
        strengths
    }
}

/// Kickoff calendar day from the schedule's date string. Unparseable input
/// falls back to today.
fn kickoff_day(raw: &str) -> NaiveDate {
    raw.get(..10)
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        .unwrap_or_else(|| Utc::now().date_naive())
}

fn last_game_date(games: &[RawGame]) -> Option<NaiveDate> {
    games
        .first()
        .and_then(|g| NaiveDate::parse_from_str(&g.game.date.date, "%Y-%m-%d").ok())
}

/// Blended opponent quality over a window: average win% plus average
/// points-per-game against a 30-point baseline.
fn window_factor(opponents: &[OpponentStrength], win_weight: f64, points_weight: f64) -> f64 {
    if opponents.is_empty() {
        return 0.0;
    }
    let n = opponents.len() as f64;
    let avg_win: f64 = opponents.iter().map(|o| o.win_pct).sum::<f64>() / n;
    let avg_ppg: f64 = opponents.iter().map(|o| o.points_per_game).sum::<f64>() / n;
    avg_win * win_weight + (avg_ppg / 30.0) * points_weight
}

/// +3 for a team coming off strong opposition, -3 for a soft slate, with an
/// extra point shaved off when the battle-tested team plays on the road.
pub fn schedule_strength_adjustment(
    recent: &[OpponentStrength],
    season: &[OpponentStrength],
    is_home: bool,
) -> i32 {
    if season.is_empty() {
        return 0;
    }
    let total = window_factor(recent, 0.30, 0.15) + window_factor(season, 0.15, 0.15);

    let mut delta = if total > 0.6 {
        3
    } else if total < 0.4 {
        -3
    } else {
        0
    };
    if !is_home && total > 0.6 {
        delta -= 1;
    }
    delta
}

/// Rest bonus or short-week penalty from days between the last game and the
/// upcoming kickoff. An unknown last game means no adjustment.
pub fn rest_adjustment(last_game: Option<NaiveDate>, kickoff: NaiveDate) -> i32 {
    let Some(last_game) = last_game else { return 0 };
    let days = (kickoff - last_game).num_days();
    if days >= 14 {
        4
    } else if days >= 7 {
        2
    } else if days < 6 {
        -3
    } else {
        0
    }
}

fn apply_adjustment(base: i32, delta: i32) -> i32 {
    (base + delta).clamp(base - MAX_ADJUSTMENT, base + MAX_ADJUSTMENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RawGameDate, RawGameInfo, RawGameStatus};

    fn opponents(win_pct: f64, points_per_game: f64, count: usize) -> Vec<OpponentStrength> {
        vec![
            OpponentStrength {
                win_pct,
                points_per_game,
            };
            count
        ]
    }

    #[test]
    fn strong_opposition_earns_a_bonus() {
        let season = opponents(0.8, 27.0, 5);
        let recent = &season[..3];
        assert_eq!(schedule_strength_adjustment(recent, &season, true), 3);
        // A battle-tested team on the road gets one point less
        assert_eq!(schedule_strength_adjustment(recent, &season, false), 2);
    }

    #[test]
    fn soft_slate_earns_a_penalty() {
        let season = opponents(0.2, 14.0, 5);
        let recent = &season[..3];
        assert_eq!(schedule_strength_adjustment(recent, &season, true), -3);
    }

    #[test]
    fn average_opposition_is_neutral() {
        let season = opponents(0.5, 20.0, 5);
        let recent = &season[..3];
        assert_eq!(schedule_strength_adjustment(recent, &season, true), 0);
        assert_eq!(schedule_strength_adjustment(recent, &season, false), 0);
    }

    #[test]
    fn missing_opponent_data_defaults_to_neutral() {
        let season = vec![OpponentStrength::default(); 4];
        assert_eq!(schedule_strength_adjustment(&season[..3], &season, true), 0);
    }

    #[test]
    fn no_games_means_no_adjustment() {
        assert_eq!(schedule_strength_adjustment(&[], &[], true), 0);
    }

    #[test]
    fn rest_adjustment_brackets() {
        let kickoff = NaiveDate::from_ymd_opt(2024, 11, 10).unwrap();
        let at = |d: u32| Some(NaiveDate::from_ymd_opt(2024, 11, d).unwrap());
        assert_eq!(rest_adjustment(at(7), kickoff), -3); // 3 days, short week
        assert_eq!(rest_adjustment(at(4), kickoff), 0); // 6 days, normal
        assert_eq!(rest_adjustment(at(3), kickoff), 2); // full week off
        assert_eq!(
            rest_adjustment(Some(NaiveDate::from_ymd_opt(2024, 10, 25).unwrap()), kickoff),
            4
        );
        assert_eq!(rest_adjustment(None, kickoff), 0);
    }

    #[test]
    fn rest_counts_days_to_kickoff_not_request_time() {
        // Last game Sunday Nov 3, next kickoff Sunday Nov 10. A midweek
        // request date must not turn a full week of rest into a short week.
        let last = NaiveDate::from_ymd_opt(2024, 11, 3).unwrap();
        let kickoff = kickoff_day("2024-11-10");
        assert_eq!(kickoff, NaiveDate::from_ymd_opt(2024, 11, 10).unwrap());
        assert_eq!(rest_adjustment(Some(last), kickoff), 2);

        let midweek = NaiveDate::from_ymd_opt(2024, 11, 6).unwrap();
        assert_eq!(rest_adjustment(Some(last), midweek), -3);
    }

    #[test]
    fn kickoff_day_accepts_timestamps() {
        assert_eq!(
            kickoff_day("2024-11-10T18:00:00+00:00"),
            NaiveDate::from_ymd_opt(2024, 11, 10).unwrap()
        );
    }

    #[test]
    fn last_game_date_reads_the_newest_game() {
        let game = RawGame {
            game: RawGameInfo {
                id: 1,
                date: RawGameDate {
                    date: "2024-11-03".into(),
                    time: "18:00".into(),
                },
                status: RawGameStatus {
                    short: "FT".into(),
                    long: "Finished".into(),
                },
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(
            last_game_date(&[game]),
            NaiveDate::from_ymd_opt(2024, 11, 3)
        );
    }

    #[test]
    fn adjustment_never_exceeds_five_points() {
        assert_eq!(apply_adjustment(60, 7), 65);
        assert_eq!(apply_adjustment(60, -9), 55);
        assert_eq!(apply_adjustment(60, 3), 63);
    }
}
