//! Confidence scorer: collapses each team's advantage list into a 0-85
//! score. Quarterback edges weigh heaviest, defensive edges next.

use std::collections::BTreeMap;

const QB_WEIGHT: f64 = 1.5;
const DEFENSE_WEIGHT: f64 = 1.2;
const BASE_WEIGHT: f64 = 1.0;

/// Hard ceiling on any single team's confidence.
pub const CONFIDENCE_CAP: f64 = 85.0;

fn advantage_weight(text: &str) -> f64 {
    if text.contains("QB") {
        QB_WEIGHT
    } else if text.contains("Defense") {
        DEFENSE_WEIGHT
    } else {
        BASE_WEIGHT
    }
}

/// Score each team from its weighted advantage share.
///
/// `score = weighted / (total_advantages * max_weight) * 100`, capped at 85.
/// The scores are deliberately not complementary; a lopsided list leaves the
/// other side at 0, and no advantages at all reads as a 50/50 toss-up.
pub fn calculate_confidence_scores(
    advantages: &BTreeMap<String, Vec<String>>,
) -> BTreeMap<String, u32> {
    let total: usize = advantages.values().map(Vec::len).sum();
    if total == 0 {
        return advantages.keys().map(|team| (team.clone(), 50)).collect();
    }

    let denominator = total as f64 * QB_WEIGHT;
    advantages
        .iter()
        .map(|(team, list)| {
            let weighted: f64 = list.iter().map(|a| advantage_weight(a)).sum();
            let score = (weighted / denominator * 100.0).min(CONFIDENCE_CAP);
            (team.clone(), score.round() as u32)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn advantages(pairs: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
        pairs
            .iter()
            .map(|(team, list)| {
                (
                    team.to_string(),
                    list.iter().map(|s| s.to_string()).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn no_advantages_is_a_toss_up() {
        let scores = calculate_confidence_scores(&advantages(&[
            ("Chiefs", &[]),
            ("Raiders", &[]),
        ]));
        assert_eq!(scores["Chiefs"], 50);
        assert_eq!(scores["Raiders"], 50);
    }

    #[test]
    fn one_sided_list_leaves_other_side_at_zero() {
        let scores = calculate_confidence_scores(&advantages(&[
            ("Chiefs", &["Better Yards Per Play: 5.5 vs 4.7"]),
            ("Raiders", &[]),
        ]));
        // 1.0 / (1 * 1.5) * 100 = 66.67 -> 67
        assert_eq!(scores["Chiefs"], 67);
        assert_eq!(scores["Raiders"], 0);
        // The two scores do not sum to 100
        assert_ne!(scores["Chiefs"] + scores["Raiders"], 100);
    }

    #[test]
    fn qb_and_defense_edges_weigh_more() {
        let scores = calculate_confidence_scores(&advantages(&[
            (
                "Bills",
                &[
                    "QB Better Passer Rating: 115.0 vs 82.0",
                    "Better Defense - Sacks: 3.5 vs 1.5",
                ],
            ),
            ("Jets", &["Better Yards Per Rush: 4.8 vs 4.1"]),
        ]));
        // Bills: (1.5 + 1.2) / (3 * 1.5) * 100 = 60
        // Jets: 1.0 / 4.5 * 100 = 22.2 -> 22
        assert_eq!(scores["Bills"], 60);
        assert_eq!(scores["Jets"], 22);
    }

    #[test]
    fn scores_cap_at_eighty_five() {
        let list: Vec<String> = (0..6)
            .map(|i| format!("QB Better Metric {i}: 1.0 vs 0.0"))
            .collect();
        let mut map = BTreeMap::new();
        map.insert("Packers".to_string(), list);
        map.insert("Bears".to_string(), Vec::new());
        let scores = calculate_confidence_scores(&map);
        // 9.0 / 9.0 * 100 = 100, capped
        assert_eq!(scores["Packers"], 85);
    }
}
