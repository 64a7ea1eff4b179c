//! Market engine: turns raw bookmaker feeds into filtered odds boards,
//! multi-book consensus lines, key-number alerts, and bet recommendations.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::error::Result;
use crate::fetcher::ApiClient;
use crate::models::{
    BookOdd, Consensus, LineQuotes, MarketData, MatchupAnalysis, OddsBoard, OddsQuote,
    RawBookmaker, Recommendation,
};
use crate::store::CacheStore;

/// Bookmaker whose board is served as the game's reference odds.
pub const REFERENCE_BOOKMAKER: i64 = 18;
/// Id range polled when building market consensus.
pub const CONSENSUS_BOOKMAKERS: std::ops::RangeInclusive<i64> = 2..=18;

/// Spreads wider than this are noise for NFL purposes.
const MAX_SPREAD: f64 = 14.0;
/// Plausible full-game total band.
const TOTAL_MIN: f64 = 35.0;
const TOTAL_MAX: f64 = 55.0;

/// Key margins of victory. Distance to a key number is inclusive of the
/// margin itself, so a half-point off still alerts.
const KEY_SPREADS_PRIMARY: &[f64] = &[3.0, 7.0];
const KEY_SPREADS_SECONDARY: &[f64] = &[4.0, 6.0, 10.0, 14.0];
const KEY_TOTALS: &[f64] = &[41.0, 44.0, 47.0, 51.0];
const KEY_NUMBER_MARGIN: f64 = 0.5;

/// How long a cached consensus suppresses re-polling the bookmaker range.
const CONSENSUS_TTL_HOURS: i64 = 6;

/// Totals markets considered for recommendations, with their plausible line
/// bands.
const TOTALS_MARKETS: &[(&str, &str, f64, f64)] = &[
    ("total", "Full Game", 35.0, 55.0),
    ("first_half_total", "First Half", 17.0, 28.0),
    ("second_half_total", "Second Half", 17.0, 28.0),
];

pub struct OddsEngine {
    api: Arc<ApiClient>,
    store: CacheStore,
}

impl OddsEngine {
    pub fn new(api: Arc<ApiClient>, store: CacheStore) -> Self {
        Self { api, store }
    }

    /// Reference-bookmaker odds for a game, cache-through. An empty board
    /// means the book has not posted usable lines yet.
    pub async fn game_odds(&self, game_id: i64) -> Result<OddsBoard> {
        if let Some(board) = self.store.odds(game_id, REFERENCE_BOOKMAKER).await? {
            debug!(game_id, "Odds cache hit");
            return Ok(board);
        }

        let raw = match self.api.fetch_odds(game_id, REFERENCE_BOOKMAKER).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(game_id, "Odds fetch failed: {e}");
                return Ok(OddsBoard::default());
            }
        };

        let board = raw
            .as_ref()
            .and_then(|odds| {
                odds.bookmakers
                    .iter()
                    .find(|b| b.id == REFERENCE_BOOKMAKER)
            })
            .map(process_bookmaker)
            .unwrap_or_default();

        if !board.is_empty() {
            self.store
                .put_odds(game_id, REFERENCE_BOOKMAKER, &board, Utc::now())
                .await?;
        }
        Ok(board)
    }

    /// Aggregated market view: per-line quote lists, modal consensus, and
    /// key-number alerts. A fresh cached consensus short-circuits the
    /// bookmaker polling loop.
    pub async fn market_data(&self, game_id: i64) -> Result<MarketData> {
        let now = Utc::now();
        if let Some(updated) = self.store.consensus_updated_at(game_id).await? {
            if now - updated < chrono::Duration::hours(CONSENSUS_TTL_HOURS) {
                debug!(game_id, "Consensus cache hit");
                let mut consensus_spread = None;
                let mut consensus_total = None;
                for (line_type, consensus) in self.store.consensus(game_id).await? {
                    match line_type.as_str() {
                        "spread" => consensus_spread = Some(consensus),
                        "total" => consensus_total = Some(consensus),
                        _ => {}
                    }
                }
                let key_number_alerts =
                    analyze_key_numbers(consensus_spread.as_ref(), consensus_total.as_ref());
                return Ok(MarketData {
                    spread: Vec::new(),
                    total: Vec::new(),
                    consensus_spread,
                    consensus_total,
                    key_number_alerts,
                });
            }
        }

        let mut spread: Vec<LineQuotes> = Vec::new();
        let mut total: Vec<LineQuotes> = Vec::new();

        for bookmaker_id in CONSENSUS_BOOKMAKERS {
            let raw = match self.api.fetch_odds(game_id, bookmaker_id).await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(game_id, bookmaker_id, "Consensus poll failed: {e}");
                    continue;
                }
            };
            let Some(book) = raw
                .as_ref()
                .and_then(|odds| odds.bookmakers.iter().find(|b| b.id == bookmaker_id))
            else {
                continue;
            };

            let board = process_bookmaker(book);
            for quote in &board.spread {
                accumulate(&mut spread, &quote.line, &book.name, quote.odd);
            }
            for quote in &board.total {
                accumulate(&mut total, &quote.line, &book.name, quote.odd);
            }
        }

        let consensus_spread = consensus_of(&spread);
        let consensus_total = consensus_of(&total);
        let key_number_alerts =
            analyze_key_numbers(consensus_spread.as_ref(), consensus_total.as_ref());

        let mut entries = Vec::new();
        if let Some(c) = &consensus_spread {
            entries.push(("spread".to_string(), c.clone()));
        }
        if let Some(c) = &consensus_total {
            entries.push(("total".to_string(), c.clone()));
        }
        if !entries.is_empty() {
            self.store.put_consensus(game_id, &entries, now).await?;
        }

        Ok(MarketData {
            spread,
            total,
            consensus_spread,
            consensus_total,
            key_number_alerts,
        })
    }
}

/// Filter one bookmaker's bets down to the markets the service understands.
/// Spreads outside +-14 and totals outside the plausible band are dropped.
pub fn process_bookmaker(book: &RawBookmaker) -> OddsBoard {
    let mut board = OddsBoard::default();
    for bet in &book.bets {
        match bet.name.as_str() {
            "Asian Handicap" => {
                for value in &bet.values {
                    let Some((side, points)) = parse_handicap(&value.value) else {
                        continue;
                    };
                    if points.abs() > MAX_SPREAD {
                        continue;
                    }
                    let sign = if points < 0.0 { "-" } else { "+" };
                    board.push(
                        "spread",
                        OddsQuote {
                            line: format!("{} {}{}", side, sign, fmt_points(points.abs())),
                            odd: value.odd.parse().unwrap_or(0.0),
                        },
                    );
                }
            }
            "Over/Under" => {
                for value in &bet.values {
                    let Some(points) = parse_line_points(&value.value) else {
                        continue;
                    };
                    if !(TOTAL_MIN..=TOTAL_MAX).contains(&points) {
                        continue;
                    }
                    board.push(
                        "total",
                        OddsQuote {
                            line: value.value.clone(),
                            odd: value.odd.parse().unwrap_or(0.0),
                        },
                    );
                }
            }
            "Home/Away" => {
                for value in &bet.values {
                    board.push(
                        "moneyline",
                        OddsQuote {
                            line: value.value.clone(),
                            odd: value.odd.parse().unwrap_or(0.0),
                        },
                    );
                }
            }
            _ => {}
        }
    }
    board
}

/// `"Home -7.5"` -> `("Home", -7.5)`.
fn parse_handicap(raw: &str) -> Option<(&str, f64)> {
    let mut parts = raw.split_whitespace();
    let side = parts.next()?;
    let points = parse_line_points(raw)?;
    Some((side, points))
}

/// Numeric tail of a quoted line (`"Over 47.5"` -> 47.5).
fn parse_line_points(raw: &str) -> Option<f64> {
    raw.split_whitespace()
        .last()?
        .trim_start_matches('+')
        .parse()
        .ok()
}

/// Render a line value without a trailing `.0`.
fn fmt_points(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

fn accumulate(lines: &mut Vec<LineQuotes>, line: &str, bookmaker: &str, odd: f64) {
    let book = BookOdd {
        bookmaker: bookmaker.to_string(),
        odd,
    };
    if let Some(existing) = lines.iter_mut().find(|l| l.line == line) {
        existing.books.push(book);
    } else {
        lines.push(LineQuotes {
            line: line.to_string(),
            books: vec![book],
        });
    }
}

/// Modal line across books. Ties keep the line encountered first.
pub fn consensus_of(lines: &[LineQuotes]) -> Option<Consensus> {
    let mut best: Option<&LineQuotes> = None;
    for candidate in lines {
        if best.map_or(true, |b| candidate.books.len() > b.books.len()) {
            best = Some(candidate);
        }
    }
    best.map(|line| {
        let count = line.books.len();
        Consensus {
            line: line.line.clone(),
            avg_odd: line.books.iter().map(|b| b.odd).sum::<f64>() / count as f64,
            book_count: count as i64,
        }
    })
}

/// Alert when a consensus line sits within half a point of a key number,
/// boundary inclusive.
pub fn analyze_key_numbers(
    spread: Option<&Consensus>,
    total: Option<&Consensus>,
) -> Vec<String> {
    let mut alerts = Vec::new();

    if let Some(points) = spread.and_then(|c| parse_line_points(&c.line)) {
        let magnitude = points.abs();
        for &key in KEY_SPREADS_PRIMARY {
            if (magnitude - key).abs() <= KEY_NUMBER_MARGIN {
                alerts.push(format!(
                    "Spread {} is near key number {}",
                    fmt_points(magnitude),
                    fmt_points(key)
                ));
            }
        }
        for &key in KEY_SPREADS_SECONDARY {
            if (magnitude - key).abs() <= KEY_NUMBER_MARGIN {
                alerts.push(format!(
                    "Spread {} is near secondary key number {}",
                    fmt_points(magnitude),
                    fmt_points(key)
                ));
            }
        }
    }

    if let Some(points) = total.and_then(|c| parse_line_points(&c.line)) {
        for &key in KEY_TOTALS {
            if (points - key).abs() <= KEY_NUMBER_MARGIN {
                alerts.push(format!(
                    "Total {} is near key number {}",
                    fmt_points(points),
                    fmt_points(key)
                ));
            }
        }
    }

    alerts
}

/// Build bet recommendations from an analyzed matchup, its confidence
/// scores, and the reference odds board.
pub fn find_best_odds(
    analysis: &MatchupAnalysis,
    scores: &BTreeMap<String, u32>,
    board: &OddsBoard,
) -> Vec<Recommendation> {
    let mut recommendations = Vec::new();
    if let Some(rec) = spread_recommendation(analysis, scores, board) {
        recommendations.push(rec);
    }
    if let Some(rec) = totals_recommendation(analysis, board) {
        recommendations.push(rec);
    }
    recommendations
}

fn spread_recommendation(
    analysis: &MatchupAnalysis,
    scores: &BTreeMap<String, u32>,
    board: &OddsBoard,
) -> Option<Recommendation> {
    let home = analysis.home_team.as_str();
    let away = analysis.away_team.as_str();
    let home_score = scores.get(home).copied().unwrap_or(0);
    let away_score = scores.get(away).copied().unwrap_or(0);

    let (favorite, favorite_score, favorite_is_home) = if home_score >= away_score {
        (home, home_score, true)
    } else {
        (away, away_score, false)
    };

    // Back the favorite only with real separation; otherwise take the
    // points with the underdog.
    let (team, side, confidence) = if favorite_score > 55 {
        let side = if favorite_is_home { "Home" } else { "Away" };
        (favorite, side, favorite_score.min(75))
    } else {
        let (underdog, underdog_score) = if favorite_is_home {
            (away, away_score)
        } else {
            (home, home_score)
        };
        let side = if favorite_is_home { "Away" } else { "Home" };
        (underdog, side, (underdog_score + 5).min(65))
    };

    let quote = board
        .spread
        .iter()
        .filter(|q| q.line.contains(side))
        .max_by(|a, b| a.odd.total_cmp(&b.odd))?;

    Some(Recommendation {
        kind: "spread".to_string(),
        bet: quote.line.clone(),
        odds: quote.odd,
        confidence,
        explanation: spread_explanation(team, analysis.advantages.get(team)),
    })
}

fn spread_explanation(team: &str, advantages: Option<&Vec<String>>) -> String {
    let leading: Vec<String> = advantages
        .map(|list| {
            list.iter()
                .take(2)
                .map(|a| a.split(':').next().unwrap_or(a).to_lowercase())
                .collect()
        })
        .unwrap_or_default();

    if leading.is_empty() {
        return format!("Value found backing {} at current line", team);
    }
    let verb = if team.to_lowercase().ends_with('s') {
        "show"
    } else {
        "shows"
    };
    format!(
        "{} {} significant advantages in {}",
        team,
        verb,
        leading.join(", ")
    )
}

fn totals_recommendation(analysis: &MatchupAnalysis, board: &OddsBoard) -> Option<Recommendation> {
    let lines: Vec<_> = analysis.team_stats.values().collect();
    let offensive = if lines.is_empty() {
        0.5
    } else {
        let sum: f64 = lines
            .iter()
            .map(|l| {
                (l.yards_per_play / 10.0
                    + l.third_down_pct / 100.0
                    + l.redzone_pct / 100.0
                    + l.yards_per_pass / 15.0)
                    / 4.0
            })
            .sum();
        sum / lines.len() as f64
    };
    let defensive = if lines.is_empty() {
        0.5
    } else {
        let sum: f64 = lines
            .iter()
            .map(|l| {
                ((100.0 - l.points_against) / 100.0 + l.turnovers / 4.0 + l.sacks / 5.0) / 3.0
            })
            .sum();
        sum / lines.len() as f64
    };

    if offensive == defensive {
        return None;
    }
    let over = offensive > defensive;
    let direction = if over { "Over" } else { "Under" };
    let raw_confidence = if over {
        offensive * 70.0 + defensive * 30.0
    } else {
        defensive * 70.0 + (1.0 - offensive) * 30.0
    };
    let confidence = (raw_confidence as u32).clamp(45, 75);

    let mut best: Option<Recommendation> = None;
    let mut best_confidence = 45u32;
    for &(bet_type, period, min_line, max_line) in TOTALS_MARKETS {
        let quote = board
            .market(bet_type)
            .iter()
            .filter(|q| {
                q.line.starts_with(direction)
                    && parse_line_points(&q.line)
                        .map_or(false, |p| (min_line..=max_line).contains(&p))
            })
            .max_by(|a, b| a.odd.total_cmp(&b.odd));
        let Some(quote) = quote else { continue };

        if confidence > best_confidence {
            best_confidence = confidence;
            best = Some(Recommendation {
                kind: bet_type.to_string(),
                bet: quote.line.clone(),
                odds: quote.odd,
                confidence,
                explanation: totals_explanation(over, confidence, period),
            });
        }
    }
    best
}

fn totals_explanation(over: bool, confidence: u32, period: &str) -> String {
    match (over, confidence > 60) {
        (true, true) => format!(
            "Strong offensive efficiency metrics suggest high-scoring {}",
            period
        ),
        (true, false) => format!(
            "Teams showing enough offensive efficiency to justify the {} over",
            period
        ),
        (false, true) => format!(
            "Strong defensive metrics suggest low-scoring {}",
            period
        ),
        (false, false) => format!(
            "Teams showing enough defensive strength to justify the {} under",
            period
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RawBet, RawBetValue, TeamStatLine};

    fn bookmaker(bets: Vec<RawBet>) -> RawBookmaker {
        RawBookmaker {
            id: REFERENCE_BOOKMAKER,
            name: "Bet365".to_string(),
            bets,
        }
    }

    fn bet(name: &str, values: &[(&str, &str)]) -> RawBet {
        RawBet {
            name: name.to_string(),
            values: values
                .iter()
                .map(|(value, odd)| RawBetValue {
                    value: value.to_string(),
                    odd: odd.to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn wide_spreads_are_dropped_and_lines_reformatted() {
        let book = bookmaker(vec![bet(
            "Asian Handicap",
            &[
                ("Home -7.0", "1.90"),
                ("Home +16", "1.80"),
                ("Away +6.5", "1.95"),
            ],
        )]);
        let board = process_bookmaker(&book);
        let lines: Vec<&str> = board.spread.iter().map(|q| q.line.as_str()).collect();
        assert_eq!(lines, vec!["Home -7", "Away +6.5"]);
    }

    #[test]
    fn implausible_totals_are_dropped() {
        let book = bookmaker(vec![bet(
            "Over/Under",
            &[
                ("Over 47.5", "1.87"),
                ("Under 33", "1.90"),
                ("Over 58.5", "1.85"),
                ("Under 44", "1.92"),
            ],
        )]);
        let board = process_bookmaker(&book);
        let lines: Vec<&str> = board.total.iter().map(|q| q.line.as_str()).collect();
        assert_eq!(lines, vec!["Over 47.5", "Under 44"]);
    }

    #[test]
    fn moneyline_passes_through_untouched() {
        let book = bookmaker(vec![bet("Home/Away", &[("Home", "1.55"), ("Away", "2.45")])]);
        let board = process_bookmaker(&book);
        assert_eq!(board.moneyline.len(), 2);
        assert_eq!(board.moneyline[0].line, "Home");
        assert_eq!(board.moneyline[0].odd, 1.55);
    }

    #[test]
    fn consensus_is_modal_with_first_seen_tie_break() {
        let mut lines = Vec::new();
        accumulate(&mut lines, "Home -3", "BookA", 1.90);
        accumulate(&mut lines, "Home -3.5", "BookB", 1.85);
        accumulate(&mut lines, "Home -3", "BookC", 1.92);
        accumulate(&mut lines, "Home -3.5", "BookD", 1.88);

        let consensus = consensus_of(&lines).unwrap();
        assert_eq!(consensus.line, "Home -3");
        assert_eq!(consensus.book_count, 2);
        assert!((consensus.avg_odd - 1.91).abs() < 1e-9);
    }

    #[test]
    fn key_number_alerts_are_boundary_inclusive() {
        let spread = Consensus {
            line: "Home -7.5".into(),
            avg_odd: 1.9,
            book_count: 5,
        };
        let total = Consensus {
            line: "Over 47".into(),
            avg_odd: 1.88,
            book_count: 5,
        };
        let alerts = analyze_key_numbers(Some(&spread), Some(&total));
        assert_eq!(
            alerts,
            vec![
                "Spread 7.5 is near key number 7".to_string(),
                "Total 47 is near key number 47".to_string(),
            ]
        );
    }

    #[test]
    fn secondary_key_numbers_get_their_own_alert() {
        let spread = Consensus {
            line: "Away +10".into(),
            avg_odd: 1.9,
            book_count: 5,
        };
        let alerts = analyze_key_numbers(Some(&spread), None);
        assert_eq!(
            alerts,
            vec!["Spread 10 is near secondary key number 10".to_string()]
        );
    }

    #[test]
    fn spread_far_from_keys_raises_nothing() {
        let spread = Consensus {
            line: "Home -8.5".into(),
            avg_odd: 1.9,
            book_count: 5,
        };
        assert!(analyze_key_numbers(Some(&spread), None).is_empty());
    }

    fn analysis_with(
        home_advantages: &[&str],
        home_stats: TeamStatLine,
        away_stats: TeamStatLine,
    ) -> MatchupAnalysis {
        let mut advantages = BTreeMap::new();
        advantages.insert(
            "Chiefs".to_string(),
            home_advantages.iter().map(|s| s.to_string()).collect(),
        );
        advantages.insert("Raiders".to_string(), Vec::new());
        let mut team_stats = BTreeMap::new();
        team_stats.insert("Chiefs".to_string(), home_stats);
        team_stats.insert("Raiders".to_string(), away_stats);
        MatchupAnalysis {
            home_team: "Chiefs".to_string(),
            away_team: "Raiders".to_string(),
            team_stats,
            qb_stats: BTreeMap::new(),
            advantages,
        }
    }

    fn spread_board() -> OddsBoard {
        OddsBoard {
            spread: vec![
                OddsQuote { line: "Home -6.5".into(), odd: 1.90 },
                OddsQuote { line: "Home -7".into(), odd: 1.95 },
                OddsQuote { line: "Away +7".into(), odd: 1.87 },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn confident_favorite_is_backed_at_best_price() {
        let analysis = analysis_with(
            &[
                "Better Yards per Play: 5.5 vs 4.7",
                "Better Defense - Sacks: 3.0 vs 1.5",
            ],
            TeamStatLine::default(),
            TeamStatLine::default(),
        );
        let mut scores = BTreeMap::new();
        scores.insert("Chiefs".to_string(), 70u32);
        scores.insert("Raiders".to_string(), 20u32);

        let recs = find_best_odds(&analysis, &scores, &spread_board());
        assert_eq!(recs.len(), 1);
        let rec = &recs[0];
        assert_eq!(rec.kind, "spread");
        // Best-priced Home quote
        assert_eq!(rec.bet, "Home -7");
        assert_eq!(rec.odds, 1.95);
        assert_eq!(rec.confidence, 70);
        assert_eq!(
            rec.explanation,
            "Chiefs show significant advantages in better yards per play, better defense - sacks"
        );
    }

    #[test]
    fn weak_favorite_means_taking_the_points() {
        let analysis = analysis_with(&[], TeamStatLine::default(), TeamStatLine::default());
        let mut scores = BTreeMap::new();
        scores.insert("Chiefs".to_string(), 52u32);
        scores.insert("Raiders".to_string(), 40u32);

        let recs = find_best_odds(&analysis, &scores, &spread_board());
        assert_eq!(recs.len(), 1);
        let rec = &recs[0];
        assert_eq!(rec.bet, "Away +7");
        assert_eq!(rec.confidence, 45); // min(65, 40 + 5)
        assert_eq!(
            rec.explanation,
            "Value found backing Raiders at current line"
        );
    }

    #[test]
    fn favorite_confidence_is_capped_at_seventy_five() {
        let analysis = analysis_with(
            &["Better Yards per Play: 6.0 vs 4.0"],
            TeamStatLine::default(),
            TeamStatLine::default(),
        );
        let mut scores = BTreeMap::new();
        scores.insert("Chiefs".to_string(), 85u32);
        scores.insert("Raiders".to_string(), 10u32);

        let recs = find_best_odds(&analysis, &scores, &spread_board());
        assert_eq!(recs[0].confidence, 75);
    }

    #[test]
    fn efficient_offenses_produce_an_over_recommendation() {
        let strong_offense = TeamStatLine {
            yards_per_play: 6.5,
            third_down_pct: 50.0,
            redzone_pct: 65.0,
            yards_per_pass: 8.5,
            points_against: 27.0,
            turnovers: 0.5,
            sacks: 1.0,
            ..Default::default()
        };
        let analysis = analysis_with(&[], strong_offense.clone(), strong_offense);
        let board = OddsBoard {
            total: vec![
                OddsQuote { line: "Over 47.5".into(), odd: 1.87 },
                OddsQuote { line: "Under 47.5".into(), odd: 1.93 },
            ],
            ..Default::default()
        };
        let scores = BTreeMap::new();

        let recs = find_best_odds(&analysis, &scores, &board);
        let totals: Vec<_> = recs.iter().filter(|r| r.kind == "total").collect();
        assert_eq!(totals.len(), 1);
        let rec = totals[0];
        assert_eq!(rec.bet, "Over 47.5");
        assert!(rec.confidence >= 45 && rec.confidence <= 75);
        assert!(rec.explanation.contains("Full Game"));
    }

    #[test]
    fn totals_quote_outside_band_is_skipped() {
        let strong_offense = TeamStatLine {
            yards_per_play: 6.5,
            third_down_pct: 50.0,
            redzone_pct: 65.0,
            yards_per_pass: 8.5,
            points_against: 27.0,
            ..Default::default()
        };
        let analysis = analysis_with(&[], strong_offense.clone(), strong_offense);
        let board = OddsBoard {
            total: vec![OddsQuote { line: "Over 58.5".into(), odd: 1.87 }],
            ..Default::default()
        };
        let recs = find_best_odds(&analysis, &BTreeMap::new(), &board);
        assert!(recs.iter().all(|r| r.kind != "total"));
    }
}
