//! Matchup analyzer: averages each side's recent per-game stat lines and
//! turns threshold-beating differences into ordered advantage strings.

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::{GridironError, Result};
use crate::fetcher::{DataFetcher, RECENT_GAMES};
use crate::models::{MatchupAnalysis, QbAverages, QbSummary, TeamStatLine};

/// Offensive metrics with their advantage thresholds. Ordering is load
/// bearing: recommendation text quotes the first advantages found.
const OFFENSE_METRICS: &[(&str, &str, f64)] = &[
    ("yards_per_play", "Yards per Play", 0.5),
    ("third_down_pct", "Third Down %", 5.0),
    ("redzone_pct", "Red Zone %", 10.0),
    ("possession_time", "Possession Time", 2.0),
    ("yards_per_pass", "Yards per Pass", 0.5),
    ("yards_per_rush", "Yards per Rush", 0.3),
];

/// Defensive metrics. `points_against` is lower-is-better, flagged by the
/// bool.
const DEFENSE_METRICS: &[(&str, &str, f64, bool)] = &[
    ("sacks", "Sacks", 1.0, false),
    ("turnovers", "Turnovers", 0.5, false),
    ("points_against", "Points Against", 3.0, true),
];

/// Quarterback metrics, compared only when both sides have QB data.
const QB_METRICS: &[(&str, &str, f64)] = &[
    ("completion_pct", "Completion %", 5.0),
    ("yards_per_attempt", "Yards Per Attempt", 0.5),
    ("passer_rating", "Passer Rating", 10.0),
];

pub struct MatchupAnalyzer {
    fetcher: DataFetcher,
}

impl MatchupAnalyzer {
    pub fn new(fetcher: DataFetcher) -> Self {
        Self { fetcher }
    }

    /// Analyze a matchup from each team's recent form. Fails with
    /// `StatsUnavailable` when either side has no cached or fetchable stats.
    pub async fn analyze(&self, home_team: &str, away_team: &str) -> Result<MatchupAnalysis> {
        let home_snapshots = self.fetcher.team_recent_stats(home_team, RECENT_GAMES).await?;
        let away_snapshots = self.fetcher.team_recent_stats(away_team, RECENT_GAMES).await?;

        if home_snapshots.is_empty() || away_snapshots.is_empty() {
            return Err(GridironError::StatsUnavailable(format!(
                "insufficient recent stats for {} vs {}",
                home_team, away_team
            )));
        }

        let home_avg = TeamStatLine::average(
            &home_snapshots.iter().map(|s| s.stats.clone()).collect::<Vec<_>>(),
        );
        let away_avg = TeamStatLine::average(
            &away_snapshots.iter().map(|s| s.stats.clone()).collect::<Vec<_>>(),
        );

        let home_qb = self.qb_summary(home_team).await?;
        let away_qb = self.qb_summary(away_team).await?;

        let advantages = compare_teams(
            home_team,
            away_team,
            &home_avg,
            &away_avg,
            home_qb.as_ref().map(|q| &q.averages),
            away_qb.as_ref().map(|q| &q.averages),
        );
        debug!(
            home = home_team,
            away = away_team,
            home_advantages = advantages.get(home_team).map_or(0, Vec::len),
            away_advantages = advantages.get(away_team).map_or(0, Vec::len),
            "Matchup analyzed"
        );

        let mut team_stats = BTreeMap::new();
        team_stats.insert(home_team.to_string(), home_avg);
        team_stats.insert(away_team.to_string(), away_avg);

        let mut qb_stats = BTreeMap::new();
        if let Some(qb) = home_qb {
            qb_stats.insert(home_team.to_string(), qb);
        }
        if let Some(qb) = away_qb {
            qb_stats.insert(away_team.to_string(), qb);
        }

        Ok(MatchupAnalysis {
            home_team: home_team.to_string(),
            away_team: away_team.to_string(),
            team_stats,
            qb_stats,
            advantages,
        })
    }

    async fn qb_summary(&self, team: &str) -> Result<Option<QbSummary>> {
        let snapshots = self.fetcher.qb_recent_stats(team, RECENT_GAMES).await?;
        if snapshots.is_empty() {
            return Ok(None);
        }
        let name = snapshots[0].line.player_name.clone();
        Ok(Some(QbSummary {
            name,
            averages: QbAverages::from_snapshots(&snapshots),
        }))
    }
}

/// Compare two averaged stat lines (and optional QB averages) and collect
/// per-team advantage strings. Each team's list keeps table order.
pub fn compare_teams(
    home_team: &str,
    away_team: &str,
    home: &TeamStatLine,
    away: &TeamStatLine,
    home_qb: Option<&QbAverages>,
    away_qb: Option<&QbAverages>,
) -> BTreeMap<String, Vec<String>> {
    let mut advantages: BTreeMap<String, Vec<String>> = BTreeMap::new();
    advantages.insert(home_team.to_string(), Vec::new());
    advantages.insert(away_team.to_string(), Vec::new());

    let mut record = |team: &str, text: String| {
        if let Some(list) = advantages.get_mut(team) {
            list.push(text);
        }
    };

    for &(field, label, threshold) in OFFENSE_METRICS {
        let (h, a) = match (home.get(field), away.get(field)) {
            (Some(h), Some(a)) => (h, a),
            _ => continue,
        };
        let diff = h - a;
        if diff > threshold {
            record(home_team, format!("Better {}: {:.1} vs {:.1}", label, h, a));
        } else if diff < -threshold {
            record(away_team, format!("Better {}: {:.1} vs {:.1}", label, a, h));
        }
    }

    for &(field, label, threshold, lower_better) in DEFENSE_METRICS {
        let (h, a) = match (home.get(field), away.get(field)) {
            (Some(h), Some(a)) => (h, a),
            _ => continue,
        };
        let diff = if lower_better { a - h } else { h - a };
        if diff > threshold {
            record(home_team, format!("Better Defense - {}: {:.1} vs {:.1}", label, h, a));
        } else if diff < -threshold {
            record(away_team, format!("Better Defense - {}: {:.1} vs {:.1}", label, a, h));
        }
    }

    if let (Some(home_qb), Some(away_qb)) = (home_qb, away_qb) {
        for &(field, label, threshold) in QB_METRICS {
            let (h, a) = match (home_qb.get(field), away_qb.get(field)) {
                (Some(h), Some(a)) => (h, a),
                _ => continue,
            };
            let diff = h - a;
            if diff > threshold {
                record(home_team, format!("QB Better {}: {:.1} vs {:.1}", label, h, a));
            } else if diff < -threshold {
                record(away_team, format!("QB Better {}: {:.1} vs {:.1}", label, a, h));
            }
        }
    }

    advantages
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(yards_per_play: f64, points_against: f64) -> TeamStatLine {
        TeamStatLine {
            yards_per_play,
            points_against,
            ..Default::default()
        }
    }

    #[test]
    fn offensive_edge_beyond_threshold_is_flagged() {
        let home = line(5.5, 20.0);
        let away = line(4.7, 20.0);
        let advantages = compare_teams("Chiefs", "Raiders", &home, &away, None, None);
        assert_eq!(
            advantages["Chiefs"],
            vec!["Better Yards per Play: 5.5 vs 4.7".to_string()]
        );
        assert!(advantages["Raiders"].is_empty());
    }

    #[test]
    fn edge_inside_threshold_is_ignored() {
        let home = line(5.0, 20.0);
        let away = line(4.7, 20.0);
        let advantages = compare_teams("Chiefs", "Raiders", &home, &away, None, None);
        assert!(advantages["Chiefs"].is_empty());
        assert!(advantages["Raiders"].is_empty());
    }

    #[test]
    fn points_against_favors_lower_value() {
        let home = line(5.0, 16.0);
        let away = line(5.0, 24.0);
        let advantages = compare_teams("Bills", "Jets", &home, &away, None, None);
        assert_eq!(
            advantages["Bills"],
            vec!["Better Defense - Points Against: 16.0 vs 24.0".to_string()]
        );
    }

    #[test]
    fn qb_metrics_need_both_sides() {
        let home = line(5.0, 20.0);
        let away = line(5.0, 20.0);
        let qb = QbAverages {
            passer_rating: 115.0,
            ..Default::default()
        };

        // One-sided QB data contributes nothing
        let advantages = compare_teams("Bills", "Jets", &home, &away, Some(&qb), None);
        assert!(advantages["Bills"].is_empty());

        let weak = QbAverages {
            passer_rating: 82.0,
            ..Default::default()
        };
        let advantages = compare_teams("Bills", "Jets", &home, &away, Some(&qb), Some(&weak));
        assert!(advantages["Bills"]
            .iter()
            .any(|a| a == "QB Better Passer Rating: 115.0 vs 82.0"));
    }

    #[test]
    fn identical_inputs_give_identical_output() {
        let home = TeamStatLine {
            yards_per_play: 6.0,
            third_down_pct: 48.0,
            ..Default::default()
        };
        let away = line(4.5, 20.0);
        let first = compare_teams("Chiefs", "Raiders", &home, &away, None, None);
        let second = compare_teams("Chiefs", "Raiders", &home, &away, None, None);
        assert_eq!(first, second);
    }

    #[test]
    fn swapping_sides_swaps_the_advantage() {
        let strong = line(6.0, 20.0);
        let weak = line(4.5, 20.0);
        let forward = compare_teams("A", "B", &strong, &weak, None, None);
        let reverse = compare_teams("A", "B", &weak, &strong, None, None);
        assert_eq!(forward["A"], reverse["B"]);
        assert_eq!(forward["B"], reverse["A"]);
    }

    #[test]
    fn advantage_order_follows_metric_tables() {
        let home = TeamStatLine {
            yards_per_play: 6.0,
            third_down_pct: 48.0,
            sacks: 3.5,
            ..Default::default()
        };
        let away = TeamStatLine {
            yards_per_play: 4.5,
            third_down_pct: 35.0,
            sacks: 1.5,
            ..Default::default()
        };
        let advantages = compare_teams("Eagles", "Giants", &home, &away, None, None);
        assert_eq!(
            advantages["Eagles"],
            vec![
                "Better Yards per Play: 6.0 vs 4.5".to_string(),
                "Better Third Down %: 48.0 vs 35.0".to_string(),
                "Better Defense - Sacks: 3.5 vs 1.5".to_string(),
            ]
        );
    }
}
