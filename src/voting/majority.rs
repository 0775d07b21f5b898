use serde::{Deserialize, Serialize};

use crate::voting::TallyEntry;

/// What the count of a closed round means for the position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    /// Absolute majority of the members present, before the final round.
    Elected { candidate_id: String },
    /// No majority yet; everyone contests the next round.
    NextScrutiny,
    /// Final round; the single leader wins regardless of majority.
    DecidedByPlurality { candidate_id: String },
    /// Nobody can be declared. Needs the chair to step in.
    TieUnresolved { tied: Vec<String> },
}

/// Votes needed for an absolute majority of `present_count`.
pub fn majority_threshold(present_count: u32) -> u32 {
    present_count / 2 + 1
}

/// Decide a round from its tally.
///
/// `tally` must be ordered the way `count_ballots` orders it.
pub fn resolve(tally: &[TallyEntry], present_count: u32, scrutiny_round: u32, final_round: u32) -> Decision {
    let Some(leader) = tally.first() else {
        return Decision::TieUnresolved { tied: Vec::new() };
    };

    if present_count == 0 {
        return Decision::TieUnresolved { tied: leaders(tally) };
    }

    let runner_up_votes = tally.get(1).map_or(0, |entry| entry.votes);
    let sole_leader = tally.len() == 1 || leader.votes > runner_up_votes;

    // The final round is settled by plurality whatever the margin
    if scrutiny_round >= final_round {
        return if sole_leader && leader.votes > 0 {
            Decision::DecidedByPlurality {
                candidate_id: leader.candidate_id.clone(),
            }
        } else {
            Decision::TieUnresolved { tied: leaders(tally) }
        };
    }

    if sole_leader && leader.votes >= majority_threshold(present_count) {
        Decision::Elected {
            candidate_id: leader.candidate_id.clone(),
        }
    } else {
        Decision::NextScrutiny
    }
}

// Everyone sharing the top count.
fn leaders(tally: &[TallyEntry]) -> Vec<String> {
    let top = tally.first().map_or(0, |entry| entry.votes);
    tally
        .iter()
        .take_while(|entry| entry.votes == top)
        .map(|entry| entry.candidate_id.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FINAL: u32 = 3;

    fn tally(counts: &[(&str, u32)]) -> Vec<TallyEntry> {
        let mut entries: Vec<TallyEntry> = counts
            .iter()
            .enumerate()
            .map(|(i, (id, votes))| TallyEntry {
                candidate_id: id.to_string(),
                candidate_name: id.to_uppercase(),
                ballot_order: i as u32,
                votes: *votes,
            })
            .collect();
        entries.sort_by(|a, b| b.votes.cmp(&a.votes).then(a.ballot_order.cmp(&b.ballot_order)));
        entries
    }

    fn elected(id: &str) -> Decision {
        Decision::Elected { candidate_id: id.to_string() }
    }

    #[test]
    fn threshold_is_floor_half_plus_one() {
        assert_eq!(majority_threshold(0), 1);
        assert_eq!(majority_threshold(1), 1);
        assert_eq!(majority_threshold(9), 5);
        assert_eq!(majority_threshold(10), 6);
        assert_eq!(majority_threshold(11), 6);
    }

    #[test]
    fn clear_majority_elects_in_first_round() {
        assert_eq!(resolve(&tally(&[("a", 6), ("b", 4)]), 10, 1, FINAL), elected("a"));
    }

    #[test]
    fn exact_half_is_not_a_majority() {
        for round in 1..FINAL {
            assert_eq!(resolve(&tally(&[("a", 5), ("b", 4)]), 10, round, FINAL), Decision::NextScrutiny);
        }
    }

    #[test]
    fn majority_holds_for_every_present_count() {
        for present in 1..=40u32 {
            let half = present / 2;
            let winning = tally(&[("a", half + 1), ("b", present - half - 1)]);
            assert_eq!(resolve(&winning, present, 1, FINAL), elected("a"), "present={}", present);

            let short = tally(&[("a", half), ("b", 0)]);
            assert_ne!(resolve(&short, present, 1, FINAL), elected("a"), "present={}", present);
        }
    }

    #[test]
    fn rounds_never_go_past_the_final_one() {
        let split = tally(&[("a", 5), ("b", 5)]);
        assert_eq!(resolve(&split, 10, 1, FINAL), Decision::NextScrutiny);
        assert_eq!(resolve(&split, 10, 2, FINAL), Decision::NextScrutiny);
        assert_ne!(resolve(&split, 10, 3, FINAL), Decision::NextScrutiny);
        assert_ne!(resolve(&split, 10, 4, FINAL), Decision::NextScrutiny);
    }

    #[test]
    fn final_round_goes_to_plurality() {
        let decision = resolve(&tally(&[("a", 4), ("b", 3), ("c", 3)]), 10, 3, FINAL);
        assert_eq!(decision, Decision::DecidedByPlurality { candidate_id: "a".to_string() });
    }

    #[test]
    fn final_round_is_plurality_even_with_a_majority() {
        assert_eq!(
            resolve(&tally(&[("a", 6), ("b", 4)]), 10, 3, FINAL),
            Decision::DecidedByPlurality { candidate_id: "a".to_string() }
        );
    }

    #[test]
    fn final_round_tie_is_unresolved() {
        let decision = resolve(&tally(&[("a", 5), ("b", 5)]), 10, 3, FINAL);
        assert_eq!(
            decision,
            Decision::TieUnresolved { tied: vec!["a".to_string(), "b".to_string()] }
        );
    }

    #[test]
    fn nobody_present_cannot_elect() {
        let decision = resolve(&tally(&[("a", 0), ("b", 0)]), 0, 1, FINAL);
        assert!(matches!(decision, Decision::TieUnresolved { .. }));
    }

    #[test]
    fn no_candidates_cannot_elect() {
        assert_eq!(resolve(&[], 10, 1, FINAL), Decision::TieUnresolved { tied: Vec::new() });
    }

    #[test]
    fn unopposed_candidate_needs_a_majority_of_present() {
        assert_eq!(resolve(&tally(&[("solo", 1)]), 1, 1, FINAL), elected("solo"));
        assert_eq!(resolve(&tally(&[("solo", 2)]), 3, 1, FINAL), elected("solo"));
        assert_eq!(resolve(&tally(&[("solo", 1)]), 3, 1, FINAL), Decision::NextScrutiny);
        assert_eq!(resolve(&tally(&[("solo", 0)]), 3, 3, FINAL), Decision::TieUnresolved {
            tied: vec!["solo".to_string()]
        });
    }

    #[test]
    fn tied_leaders_above_threshold_are_not_elected() {
        // Attendance dropped after the ballots were cast
        let decision = resolve(&tally(&[("a", 3), ("b", 3)]), 4, 1, FINAL);
        assert_eq!(decision, Decision::NextScrutiny);
    }

    #[test]
    fn single_round_rules_decide_immediately() {
        assert_eq!(
            resolve(&tally(&[("a", 4), ("b", 3)]), 10, 1, 1),
            Decision::DecidedByPlurality { candidate_id: "a".to_string() }
        );
    }
}
