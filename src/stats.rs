//! Stat normalizer: converts the API's textual per-game statistics (ratio
//! strings like `"4-13"`, clock strings like `"29:20"`) into flat numeric
//! records.

use crate::models::{QbStatLine, RawPlayer, RawStatistics, TeamStatLine};

/// Parse a ratio stat like `"4-13"` or `"19/24"` into `(made, attempted)`.
/// Anything unparseable is `(0, 0)`.
pub fn parse_ratio(raw: &str) -> (i64, i64) {
    if raw.is_empty() {
        return (0, 0);
    }
    let parts: Vec<&str> = if raw.contains('-') {
        raw.splitn(2, '-').collect()
    } else if raw.contains('/') {
        raw.splitn(2, '/').collect()
    } else {
        return (0, 0);
    };
    match (
        parts.first().and_then(|p| p.trim().parse::<i64>().ok()),
        parts.get(1).and_then(|p| p.trim().parse::<i64>().ok()),
    ) {
        (Some(a), Some(b)) => (a, b),
        _ => (0, 0),
    }
}

/// Convert a clock string like `"29:20"` to decimal minutes (29.33).
/// Malformed input yields 0.0.
pub fn parse_clock(raw: &str) -> f64 {
    let mut parts = raw.splitn(2, ':');
    match (
        parts.next().and_then(|p| p.trim().parse::<f64>().ok()),
        parts.next().and_then(|p| p.trim().parse::<f64>().ok()),
    ) {
        (Some(minutes), Some(seconds)) => minutes + seconds / 60.0,
        _ => 0.0,
    }
}

/// `made / attempts * 100` rounded to 2 decimals; a zero denominator is a
/// defined 0, not an error.
fn pct(made: i64, attempts: i64) -> f64 {
    if attempts == 0 {
        return 0.0;
    }
    (made as f64 / attempts as f64 * 10_000.0).round() / 100.0
}

/// Flatten a raw per-team statistics block into a numeric stat line.
pub fn normalize_team_stats(raw: &RawStatistics) -> TeamStatLine {
    let third_down = parse_ratio(&raw.first_downs.third_down_efficiency);
    let fourth_down = parse_ratio(&raw.first_downs.fourth_down_efficiency);
    let comp_att = parse_ratio(&raw.passing.comp_att);
    let penalties = parse_ratio(&raw.penalties.total);
    let redzone = parse_ratio(&raw.red_zone.made_att);
    let sacks = parse_ratio(&raw.passing.sacks_yards_lost);

    TeamStatLine {
        first_downs_total: raw.first_downs.total,
        first_downs_passing: raw.first_downs.passing,
        first_downs_rushing: raw.first_downs.rushing,
        first_downs_penalties: raw.first_downs.from_penalties,
        third_down_attempts: third_down.1 as f64,
        third_down_conversions: third_down.0 as f64,
        third_down_pct: pct(third_down.0, third_down.1),
        fourth_down_attempts: fourth_down.1 as f64,
        fourth_down_conversions: fourth_down.0 as f64,
        fourth_down_pct: pct(fourth_down.0, fourth_down.1),
        total_plays: raw.plays.total,
        total_yards: raw.yards.total,
        yards_per_play: raw.yards.yards_per_play,
        passing_yards: raw.passing.total,
        passing_attempts: comp_att.1 as f64,
        passing_completions: comp_att.0 as f64,
        completion_pct: pct(comp_att.0, comp_att.1),
        yards_per_pass: raw.passing.yards_per_pass,
        sacks: sacks.0 as f64,
        sacks_yards_lost: sacks.1 as f64,
        rushing_yards: raw.rushings.total,
        rushing_attempts: raw.rushings.attempts,
        yards_per_rush: raw.rushings.yards_per_rush,
        redzone_attempts: redzone.1 as f64,
        redzone_scores: redzone.0 as f64,
        redzone_pct: pct(redzone.0, redzone.1),
        penalties: penalties.0 as f64,
        penalty_yards: penalties.1 as f64,
        turnovers: raw.turnovers.total,
        possession_time: parse_clock(&raw.posession.total),
        points_against: raw.points_against.total,
    }
}

/// Map a quarterback's named stat entries onto a flat record.
///
/// Recognized names are converted to numeric fields; unknown names are kept
/// verbatim in `extra` rather than rejected.
pub fn normalize_qb_stats(player: &RawPlayer) -> QbStatLine {
    let mut line = QbStatLine {
        player_id: player.player.id,
        player_name: player.player.name.clone(),
        ..Default::default()
    };

    for stat in &player.statistics {
        let value = stat.value.trim();
        match stat.name.as_str() {
            "comp att" => {
                let (comp, att) = parse_ratio(value);
                line.completions = comp as f64;
                line.attempts = att as f64;
                line.completion_pct = pct(comp, att);
            }
            "sacks" => {
                let (sacks, yards) = parse_ratio(value);
                line.sacks = sacks as f64;
                line.sack_yards = yards as f64;
            }
            "yards" => line.yards = value.parse().unwrap_or(0.0),
            "passing touch downs" => line.passing_touch_downs = value.parse().unwrap_or(0.0),
            "interceptions" => line.interceptions = value.parse().unwrap_or(0.0),
            "two pt" => line.two_pt = value.parse().unwrap_or(0.0),
            "average" => line.yards_per_attempt = value.parse().unwrap_or(0.0),
            "rating" => line.passer_rating = value.parse().unwrap_or(0.0),
            other => {
                line.extra.insert(other.replace(' ', "_"), stat.value.clone());
            }
        }
    }

    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RawNamedStat, RawPlayerMeta};

    #[test]
    fn ratio_parses_dash_and_slash() {
        assert_eq!(parse_ratio("4-13"), (4, 13));
        assert_eq!(parse_ratio("19/24"), (19, 24));
    }

    #[test]
    fn ratio_defaults_on_bad_input() {
        assert_eq!(parse_ratio(""), (0, 0));
        assert_eq!(parse_ratio("bad"), (0, 0));
        assert_eq!(parse_ratio("4-"), (0, 0));
        assert_eq!(parse_ratio("x-y"), (0, 0));
    }

    #[test]
    fn clock_converts_to_decimal_minutes() {
        let value = parse_clock("29:20");
        assert!((value - 29.333333).abs() < 1e-4);
        assert_eq!(parse_clock(""), 0.0);
        assert_eq!(parse_clock("29"), 0.0);
    }

    #[test]
    fn zero_denominator_percentage_is_zero() {
        let raw = RawStatistics {
            first_downs: crate::models::RawFirstDowns {
                third_down_efficiency: "0-0".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        let line = normalize_team_stats(&raw);
        assert_eq!(line.third_down_pct, 0.0);
        assert_eq!(line.third_down_attempts, 0.0);
    }

    #[test]
    fn team_stats_flatten() {
        let raw = RawStatistics {
            first_downs: crate::models::RawFirstDowns {
                total: 22.0,
                passing: 12.0,
                rushing: 8.0,
                from_penalties: 2.0,
                third_down_efficiency: "4-13".to_string(),
                fourth_down_efficiency: "1-2".to_string(),
            },
            plays: crate::models::RawPlays { total: 61.0 },
            yards: crate::models::RawYards {
                total: 342.0,
                yards_per_play: 5.6,
            },
            passing: crate::models::RawPassing {
                total: 240.0,
                comp_att: "19/24".to_string(),
                yards_per_pass: 7.2,
                sacks_yards_lost: "3-21".to_string(),
            },
            rushings: crate::models::RawRushings {
                total: 102.0,
                attempts: 28.0,
                yards_per_rush: 3.6,
            },
            red_zone: crate::models::RawRedZone {
                made_att: "2-4".to_string(),
            },
            penalties: crate::models::RawPenalties {
                total: "6-45".to_string(),
            },
            turnovers: crate::models::RawTurnovers { total: 1.0 },
            posession: crate::models::RawPossession {
                total: "29:20".to_string(),
            },
            points_against: crate::models::RawPointsAgainst { total: 17.0 },
        };

        let line = normalize_team_stats(&raw);
        assert_eq!(line.third_down_conversions, 4.0);
        assert_eq!(line.third_down_attempts, 13.0);
        assert!((line.third_down_pct - 30.77).abs() < 1e-9);
        assert_eq!(line.passing_completions, 19.0);
        assert!((line.completion_pct - 79.17).abs() < 1e-9);
        assert_eq!(line.sacks, 3.0);
        assert_eq!(line.sacks_yards_lost, 21.0);
        assert!((line.possession_time - 29.333333).abs() < 1e-4);
        assert_eq!(line.penalties, 6.0);
        assert_eq!(line.penalty_yards, 45.0);
    }

    #[test]
    fn qb_stats_map_named_entries() {
        let player = RawPlayer {
            player: RawPlayerMeta {
                id: 42,
                name: "P. Mahomes".to_string(),
            },
            statistics: vec![
                RawNamedStat {
                    name: "comp att".into(),
                    value: "24/31".into(),
                },
                RawNamedStat {
                    name: "yards".into(),
                    value: "291".into(),
                },
                RawNamedStat {
                    name: "average".into(),
                    value: "9.4".into(),
                },
                RawNamedStat {
                    name: "rating".into(),
                    value: "118.3".into(),
                },
                RawNamedStat {
                    name: "sacks".into(),
                    value: "2-14".into(),
                },
                RawNamedStat {
                    name: "longest pass".into(),
                    value: "44".into(),
                },
            ],
        };

        let line = normalize_qb_stats(&player);
        assert_eq!(line.completions, 24.0);
        assert_eq!(line.attempts, 31.0);
        assert!((line.completion_pct - 77.42).abs() < 1e-9);
        assert_eq!(line.yards, 291.0);
        assert_eq!(line.yards_per_attempt, 9.4);
        assert_eq!(line.passer_rating, 118.3);
        assert_eq!(line.sacks, 2.0);
        assert_eq!(line.sack_yards, 14.0);
        // Unrecognized names pass through untouched
        assert_eq!(line.extra.get("longest_pass").map(String::as_str), Some("44"));
    }

    #[test]
    fn stat_line_round_trips_through_pairs() {
        let mut line = TeamStatLine::default();
        line.yards_per_play = 5.5;
        line.turnovers = 2.0;
        let rebuilt = TeamStatLine::from_pairs(line.to_pairs());
        assert_eq!(line, rebuilt);
    }
}
