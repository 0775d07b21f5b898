use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::{Candidate, Vote};

/// One line of a round's count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallyEntry {
    pub candidate_id: String,
    pub candidate_name: String,
    pub ballot_order: u32,
    pub votes: u32,
}

/// Count one round's ballots for the given candidates.
///
/// Every candidate gets a line, including those with no votes. Lines are
/// ordered by votes, most first; equal counts keep ballot order, so the same
/// ballots always produce the same tally. Ballots for anyone outside
/// `candidates` are ignored.
pub fn count_ballots(candidates: &[Candidate], ballots: &[Vote]) -> Vec<TallyEntry> {
    // Count votes per candidate id
    let mut counts: HashMap<&str, u32> = HashMap::new();
    for ballot in ballots {
        *counts.entry(ballot.candidate_id.as_str()).or_insert(0) += 1;
    }

    let mut tally: Vec<TallyEntry> = candidates
        .iter()
        .map(|candidate| TallyEntry {
            candidate_id: candidate.id.clone(),
            candidate_name: candidate.name.clone(),
            ballot_order: candidate.ballot_order,
            votes: counts.get(candidate.id.as_str()).copied().unwrap_or(0),
        })
        .collect();

    tally.sort_by(|a, b| b.votes.cmp(&a.votes).then(a.ballot_order.cmp(&b.ballot_order)));
    tally
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn candidate(id: &str, ballot_order: u32) -> Candidate {
        Candidate {
            id: id.to_string(),
            election_id: "election".to_string(),
            position_id: "treasurer".to_string(),
            member_id: format!("member-{}", id),
            name: id.to_uppercase(),
            email: format!("{}@example.org", id),
            ballot_order,
            nominated_at: Utc::now(),
        }
    }

    fn ballot(voter: &str, candidate_id: &str) -> Vote {
        Vote {
            id: format!("{}-{}", voter, candidate_id),
            election_id: "election".to_string(),
            position_id: "treasurer".to_string(),
            election_position_id: "ep".to_string(),
            voter_id: voter.to_string(),
            candidate_id: candidate_id.to_string(),
            scrutiny_round: 1,
            cast_at: Utc::now(),
        }
    }

    #[test]
    fn counts_and_orders_by_votes() {
        let candidates = vec![candidate("a", 0), candidate("b", 1), candidate("c", 2)];
        let ballots = vec![ballot("v1", "b"), ballot("v2", "b"), ballot("v3", "a")];

        let tally = count_ballots(&candidates, &ballots);
        let summary: Vec<(&str, u32)> = tally.iter().map(|e| (e.candidate_id.as_str(), e.votes)).collect();
        assert_eq!(summary, vec![("b", 2), ("a", 1), ("c", 0)]);
    }

    #[test]
    fn ties_keep_ballot_order() {
        // Candidates listed out of ballot order on purpose
        let candidates = vec![candidate("late", 5), candidate("early", 1), candidate("mid", 3)];
        let ballots = vec![ballot("v1", "late"), ballot("v2", "early"), ballot("v3", "mid")];

        let tally = count_ballots(&candidates, &ballots);
        let order: Vec<&str> = tally.iter().map(|e| e.candidate_id.as_str()).collect();
        assert_eq!(order, vec!["early", "mid", "late"]);
    }

    #[test]
    fn ignores_ballots_for_unknown_candidates() {
        let candidates = vec![candidate("a", 0)];
        let ballots = vec![ballot("v1", "a"), ballot("v2", "ghost")];

        let tally = count_ballots(&candidates, &ballots);
        assert_eq!(tally.len(), 1);
        assert_eq!(tally[0].votes, 1);
    }
}
