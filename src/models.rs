//! Typed records for the external API payloads and the domain entities
//! derived from them.
//!
//! Raw payload structs mirror the sports-data API's nested JSON and are
//! converted into flat domain records at the fetcher boundary; nothing past
//! the fetcher sees a raw nested shape.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

/// The API wraps every payload in a `response` array.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(default)]
    pub response: Vec<T>,
}

/// The API is inconsistent about numbers: totals arrive as JSON numbers,
/// per-play averages as strings. Anything unparseable becomes 0.
fn flex_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_f64().unwrap_or(0.0),
        serde_json::Value::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    })
}

fn flex_opt_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

// ---------------------------------------------------------------------------
// Raw API payload shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct RawTeam {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct RawGameDate {
    pub date: String,
    pub time: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct RawGameStatus {
    pub short: String,
    pub long: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct RawVenue {
    pub name: String,
    pub city: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct RawGameInfo {
    pub id: i64,
    pub date: RawGameDate,
    pub status: RawGameStatus,
    pub venue: RawVenue,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct RawGameSide {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct RawGameTeams {
    pub home: RawGameSide,
    pub away: RawGameSide,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct RawScoreSide {
    #[serde(deserialize_with = "flex_opt_f64")]
    pub total: Option<f64>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct RawGameScores {
    pub home: RawScoreSide,
    pub away: RawScoreSide,
}

/// One entry of the `/games` response.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct RawGame {
    pub game: RawGameInfo,
    pub teams: RawGameTeams,
    pub scores: RawGameScores,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct RawTeamMeta {
    pub id: i64,
    pub name: String,
    #[serde(deserialize_with = "flex_opt_f64")]
    pub win_pct: Option<f64>,
    #[serde(deserialize_with = "flex_opt_f64")]
    pub points_per_game: Option<f64>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct RawFirstDowns {
    #[serde(deserialize_with = "flex_f64")]
    pub total: f64,
    #[serde(deserialize_with = "flex_f64")]
    pub passing: f64,
    #[serde(deserialize_with = "flex_f64")]
    pub rushing: f64,
    #[serde(deserialize_with = "flex_f64")]
    pub from_penalties: f64,
    pub third_down_efficiency: String,
    pub fourth_down_efficiency: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct RawPlays {
    #[serde(deserialize_with = "flex_f64")]
    pub total: f64,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct RawYards {
    #[serde(deserialize_with = "flex_f64")]
    pub total: f64,
    #[serde(deserialize_with = "flex_f64")]
    pub yards_per_play: f64,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct RawPassing {
    #[serde(deserialize_with = "flex_f64")]
    pub total: f64,
    pub comp_att: String,
    #[serde(deserialize_with = "flex_f64")]
    pub yards_per_pass: f64,
    pub sacks_yards_lost: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct RawRushings {
    #[serde(deserialize_with = "flex_f64")]
    pub total: f64,
    #[serde(deserialize_with = "flex_f64")]
    pub attempts: f64,
    #[serde(deserialize_with = "flex_f64")]
    pub yards_per_rush: f64,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct RawRedZone {
    pub made_att: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct RawPenalties {
    pub total: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct RawTurnovers {
    #[serde(deserialize_with = "flex_f64")]
    pub total: f64,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct RawPossession {
    pub total: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct RawPointsAgainst {
    #[serde(deserialize_with = "flex_f64")]
    pub total: f64,
}

/// Per-team statistics block of `/games/statistics/teams`. Field names match
/// the upstream payload, including its `posession` misspelling.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct RawStatistics {
    pub first_downs: RawFirstDowns,
    pub plays: RawPlays,
    pub yards: RawYards,
    pub passing: RawPassing,
    pub rushings: RawRushings,
    pub red_zone: RawRedZone,
    pub penalties: RawPenalties,
    pub turnovers: RawTurnovers,
    pub posession: RawPossession,
    pub points_against: RawPointsAgainst,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct RawTeamGameStats {
    pub team: RawTeamMeta,
    pub statistics: RawStatistics,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct RawNamedStat {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct RawPlayerMeta {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct RawPlayer {
    pub player: RawPlayerMeta,
    pub statistics: Vec<RawNamedStat>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct RawPlayerGroup {
    pub name: String,
    pub players: Vec<RawPlayer>,
}

/// One entry of the `/games/statistics/players` response.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct RawPlayersTeam {
    pub team: RawTeam,
    pub groups: Vec<RawPlayerGroup>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct RawBetValue {
    pub value: String,
    pub odd: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct RawBet {
    pub name: String,
    pub values: Vec<RawBetValue>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct RawBookmaker {
    pub id: i64,
    pub name: String,
    pub bets: Vec<RawBet>,
}

/// One entry of the `/odds` response.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct RawGameOdds {
    pub bookmakers: Vec<RawBookmaker>,
}

// ---------------------------------------------------------------------------
// Domain records
// ---------------------------------------------------------------------------

/// Team mapping row. `identifier` is the lowercased lookup key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamRecord {
    pub identifier: String,
    pub api_id: i64,
    pub name: String,
}

/// Flat numeric per-game team statistics produced by the stat normalizer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamStatLine {
    pub first_downs_total: f64,
    pub first_downs_passing: f64,
    pub first_downs_rushing: f64,
    pub first_downs_penalties: f64,
    pub third_down_attempts: f64,
    pub third_down_conversions: f64,
    pub third_down_pct: f64,
    pub fourth_down_attempts: f64,
    pub fourth_down_conversions: f64,
    pub fourth_down_pct: f64,
    pub total_plays: f64,
    pub total_yards: f64,
    pub yards_per_play: f64,
    pub passing_yards: f64,
    pub passing_attempts: f64,
    pub passing_completions: f64,
    pub completion_pct: f64,
    pub yards_per_pass: f64,
    pub sacks: f64,
    pub sacks_yards_lost: f64,
    pub rushing_yards: f64,
    pub rushing_attempts: f64,
    pub yards_per_rush: f64,
    pub redzone_attempts: f64,
    pub redzone_scores: f64,
    pub redzone_pct: f64,
    pub penalties: f64,
    pub penalty_yards: f64,
    pub turnovers: f64,
    pub possession_time: f64,
    pub points_against: f64,
}

macro_rules! stat_line_fields {
    ($macro:ident) => {
        $macro!(
            first_downs_total,
            first_downs_passing,
            first_downs_rushing,
            first_downs_penalties,
            third_down_attempts,
            third_down_conversions,
            third_down_pct,
            fourth_down_attempts,
            fourth_down_conversions,
            fourth_down_pct,
            total_plays,
            total_yards,
            yards_per_play,
            passing_yards,
            passing_attempts,
            passing_completions,
            completion_pct,
            yards_per_pass,
            sacks,
            sacks_yards_lost,
            rushing_yards,
            rushing_attempts,
            yards_per_rush,
            redzone_attempts,
            redzone_scores,
            redzone_pct,
            penalties,
            penalty_yards,
            turnovers,
            possession_time,
            points_against
        )
    };
}

impl TeamStatLine {
    /// (stat_name, value) view used by the cache store's row layout.
    pub fn to_pairs(&self) -> Vec<(&'static str, f64)> {
        macro_rules! pairs {
            ($($field:ident),*) => {
                vec![$((stringify!($field), self.$field)),*]
            };
        }
        stat_line_fields!(pairs)
    }

    /// Rebuild a line from cached (stat_name, value) rows. Unknown names are
    /// ignored.
    pub fn from_pairs<'a, I>(rows: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        let mut line = Self::default();
        for (name, value) in rows {
            macro_rules! assign {
                ($($field:ident),*) => {
                    match name {
                        $(stringify!($field) => line.$field = value,)*
                        _ => {}
                    }
                };
            }
            stat_line_fields!(assign);
        }
        line
    }

    /// Metric lookup by name, used by the advantage tables.
    pub fn get(&self, name: &str) -> Option<f64> {
        macro_rules! lookup {
            ($($field:ident),*) => {
                match name {
                    $(stringify!($field) => Some(self.$field),)*
                    _ => None,
                }
            };
        }
        stat_line_fields!(lookup)
    }

    /// Field-wise average over a set of per-game lines.
    pub fn average(lines: &[TeamStatLine]) -> TeamStatLine {
        if lines.is_empty() {
            return TeamStatLine::default();
        }
        let n = lines.len() as f64;
        let mut avg = TeamStatLine::default();
        macro_rules! acc {
            ($($field:ident),*) => {
                $(avg.$field = lines.iter().map(|l| l.$field).sum::<f64>() / n;)*
            };
        }
        stat_line_fields!(acc);
        avg
    }
}

/// Immutable per-game team snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct TeamStatSnapshot {
    pub game_id: i64,
    pub stats: TeamStatLine,
}

/// Flat numeric per-game quarterback statistics. Stat names the normalizer
/// does not recognize are retained verbatim in `extra`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QbStatLine {
    pub player_id: i64,
    pub player_name: String,
    pub completions: f64,
    pub attempts: f64,
    pub completion_pct: f64,
    pub yards: f64,
    pub yards_per_attempt: f64,
    pub passing_touch_downs: f64,
    pub interceptions: f64,
    pub two_pt: f64,
    pub sacks: f64,
    pub sack_yards: f64,
    pub passer_rating: f64,
    pub extra: BTreeMap<String, String>,
}

macro_rules! qb_numeric_fields {
    ($macro:ident) => {
        $macro!(
            completions,
            attempts,
            completion_pct,
            yards,
            yards_per_attempt,
            passing_touch_downs,
            interceptions,
            two_pt,
            sacks,
            sack_yards,
            passer_rating
        )
    };
}

impl QbStatLine {
    pub fn to_pairs(&self) -> Vec<(&'static str, f64)> {
        macro_rules! pairs {
            ($($field:ident),*) => {
                vec![$((stringify!($field), self.$field)),*]
            };
        }
        qb_numeric_fields!(pairs)
    }

    pub fn from_pairs<'a, I>(rows: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        let mut line = Self::default();
        for (name, value) in rows {
            macro_rules! assign {
                ($($field:ident),*) => {
                    match name {
                        $(stringify!($field) => line.$field = value,)*
                        _ => {}
                    }
                };
            }
            qb_numeric_fields!(assign);
        }
        line
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QbStatSnapshot {
    pub game_id: i64,
    pub line: QbStatLine,
}

/// Averaged quarterback numbers over recent games.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QbAverages {
    pub completions: f64,
    pub attempts: f64,
    pub completion_pct: f64,
    pub yards: f64,
    pub yards_per_attempt: f64,
    pub passing_touch_downs: f64,
    pub interceptions: f64,
    pub sacks: f64,
    pub sack_yards: f64,
    pub passer_rating: f64,
}

impl QbAverages {
    pub fn from_snapshots(snapshots: &[QbStatSnapshot]) -> Self {
        if snapshots.is_empty() {
            return Self::default();
        }
        let n = snapshots.len() as f64;
        macro_rules! mean {
            ($field:ident) => {
                snapshots.iter().map(|s| s.line.$field).sum::<f64>() / n
            };
        }
        Self {
            completions: mean!(completions),
            attempts: mean!(attempts),
            completion_pct: mean!(completion_pct),
            yards: mean!(yards),
            yards_per_attempt: mean!(yards_per_attempt),
            passing_touch_downs: mean!(passing_touch_downs),
            interceptions: mean!(interceptions),
            sacks: mean!(sacks),
            sack_yards: mean!(sack_yards),
            passer_rating: mean!(passer_rating),
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        match name {
            "completion_pct" => Some(self.completion_pct),
            "yards_per_attempt" => Some(self.yards_per_attempt),
            "passer_rating" => Some(self.passer_rating),
            _ => None,
        }
    }
}

/// A row of the weekly schedule cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledGame {
    pub id: i64,
    pub date: String,
    pub time: String,
    pub home_team: String,
    pub away_team: String,
    pub stadium: String,
    pub city: String,
    pub status: String,
}

/// A single quoted line at one price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OddsQuote {
    pub line: String,
    pub odd: f64,
}

/// Processed odds for one game from the reference bookmaker, bucketed by
/// bet type. Half-time totals only appear when previously cached.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OddsBoard {
    pub spread: Vec<OddsQuote>,
    pub total: Vec<OddsQuote>,
    pub moneyline: Vec<OddsQuote>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub first_half_total: Vec<OddsQuote>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub second_half_total: Vec<OddsQuote>,
}

impl OddsBoard {
    pub fn is_empty(&self) -> bool {
        self.spread.is_empty()
            && self.total.is_empty()
            && self.moneyline.is_empty()
            && self.first_half_total.is_empty()
            && self.second_half_total.is_empty()
    }

    pub fn market(&self, bet_type: &str) -> &[OddsQuote] {
        match bet_type {
            "spread" => &self.spread,
            "total" => &self.total,
            "moneyline" => &self.moneyline,
            "first_half_total" => &self.first_half_total,
            "second_half_total" => &self.second_half_total,
            _ => &[],
        }
    }

    pub fn push(&mut self, bet_type: &str, quote: OddsQuote) {
        match bet_type {
            "spread" => self.spread.push(quote),
            "total" => self.total.push(quote),
            "moneyline" => self.moneyline.push(quote),
            "first_half_total" => self.first_half_total.push(quote),
            "second_half_total" => self.second_half_total.push(quote),
            _ => {}
        }
    }

    pub fn iter_all(&self) -> impl Iterator<Item = (&'static str, &OddsQuote)> {
        self.spread
            .iter()
            .map(|q| ("spread", q))
            .chain(self.total.iter().map(|q| ("total", q)))
            .chain(self.moneyline.iter().map(|q| ("moneyline", q)))
            .chain(self.first_half_total.iter().map(|q| ("first_half_total", q)))
            .chain(self.second_half_total.iter().map(|q| ("second_half_total", q)))
    }
}

/// One bookmaker's price on a line, accumulated during consensus polling.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookOdd {
    pub bookmaker: String,
    pub odd: f64,
}

/// All prices collected for one quoted line, in encounter order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineQuotes {
    pub line: String,
    pub books: Vec<BookOdd>,
}

/// The modal line across polled bookmakers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Consensus {
    pub line: String,
    pub avg_odd: f64,
    pub book_count: i64,
}

/// Aggregated multi-book market view for one game.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MarketData {
    pub spread: Vec<LineQuotes>,
    pub total: Vec<LineQuotes>,
    pub consensus_spread: Option<Consensus>,
    pub consensus_total: Option<Consensus>,
    pub key_number_alerts: Vec<String>,
}

/// Quarterback summary attached to a matchup analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QbSummary {
    pub name: String,
    #[serde(flatten)]
    pub averages: QbAverages,
}

/// Output of the matchup analyzer. Advantage ordering within each team's
/// list is significant: explanation text takes the first two entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchupAnalysis {
    pub home_team: String,
    pub away_team: String,
    pub team_stats: BTreeMap<String, TeamStatLine>,
    pub qb_stats: BTreeMap<String, QbSummary>,
    pub advantages: BTreeMap<String, Vec<String>>,
}

/// A recommended bet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    #[serde(rename = "type")]
    pub kind: String,
    pub bet: String,
    pub odds: f64,
    pub confidence: u32,
    pub explanation: String,
}

/// Situational adjustment of the favorite's base confidence (schedule
/// strength + rest), named so the payload says which team it applies to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustedConfidence {
    pub team: String,
    pub confidence: i32,
}

/// Fully assembled prediction, as served and as cached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub matchup: String,
    pub date: String,
    pub statistical_analysis: MatchupAnalysis,
    pub confidence_scores: BTreeMap<String, u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adjusted_confidence: Option<AdjustedConfidence>,
    pub odds: OddsBoard,
    pub betting_recommendations: Vec<Recommendation>,
}
