//! Read-only results and audit view of an election.
//!
//! Everything here is rebuilt from stored rows on each call inside a single
//! read transaction. Lists are explicitly ordered, so unchanged rows always
//! project to the same bytes.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::db::{self, Database};
use crate::election::ballot_box::tally_round;
use crate::error::Result;
use crate::models::{AdminAction, Election, ElectionWinner, PositionStatus};
use crate::voting::{majority_threshold, TallyEntry};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ElectionReport {
    pub election: Election,
    pub positions: Vec<PositionReport>,
    pub timeline: Vec<VoteEvent>,
    pub voters: Vec<VoterSummary>,
    pub admin_actions: Vec<AdminAction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PositionReport {
    pub election_position_id: String,
    pub position_id: String,
    pub position_name: String,
    pub order_index: u32,
    pub status: PositionStatus,
    pub scrutiny_round: u32,
    pub opened_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub present_count: u32,
    pub majority_threshold: u32,
    pub present_members: Vec<String>,
    pub rounds: Vec<RoundTally>,
    pub candidates: Vec<CandidateResult>,
    pub winner: Option<ElectionWinner>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoundTally {
    pub scrutiny_round: u32,
    pub ballots_cast: u32,
    pub tally: Vec<TallyEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateResult {
    pub candidate_id: String,
    pub member_id: String,
    pub name: String,
    pub email: String,
    pub ballot_order: u32,
    /// Votes in the deciding round, or in the current round while undecided.
    pub votes: u32,
    pub is_elected: bool,
    pub elected_in_scrutiny: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoteEvent {
    pub vote_id: String,
    pub voter_id: String,
    pub position_id: String,
    pub position_name: String,
    pub candidate_id: String,
    pub candidate_name: String,
    pub scrutiny_round: u32,
    pub cast_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoterSummary {
    pub voter_id: String,
    pub first_vote_at: DateTime<Utc>,
    pub last_vote_at: DateTime<Utc>,
    pub total_votes: u32,
    pub positions_voted: u32,
}

impl ElectionReport {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn position(&self, position_name: &str) -> Option<&PositionReport> {
        self.positions.iter().find(|p| p.position_name == position_name)
    }
}

/// Build the full results and audit view of an election.
pub async fn project(database: &Database, election_id: &str) -> Result<ElectionReport> {
    let mut tx = database.pool().begin().await?;

    let election = db::load_election(&mut tx, election_id).await?;
    let election_positions = db::list_election_positions(&mut tx, election_id).await?;

    let mut positions = Vec::with_capacity(election_positions.len());
    let mut candidate_names: HashMap<String, String> = HashMap::new();

    for position in &election_positions {
        let present_count = db::count_present(&mut tx, &position.id).await?;
        let present_members = db::list_attendance(&mut tx, &position.id)
            .await?
            .into_iter()
            .filter(|a| a.present)
            .map(|a| a.member_id)
            .collect();

        let candidates = db::list_candidates(&mut tx, &position.election_id, &position.position_id).await?;
        for candidate in &candidates {
            candidate_names.insert(candidate.id.clone(), candidate.name.clone());
        }

        // A pending position has not been voted on yet
        let mut rounds = Vec::new();
        if position.status != PositionStatus::Pending {
            for round in 1..=position.scrutiny_round {
                let tally = tally_round(&mut tx, position, round).await?;
                let ballots_cast = tally.iter().map(|entry| entry.votes).sum();
                rounds.push(RoundTally {
                    scrutiny_round: round,
                    ballots_cast,
                    tally,
                });
            }
        }

        let winner = db::find_winner(&mut tx, &position.id).await?;
        let deciding_round = winner
            .as_ref()
            .map_or(position.scrutiny_round, |w| w.won_at_scrutiny);
        let deciding_votes: HashMap<&str, u32> = rounds
            .iter()
            .find(|r| r.scrutiny_round == deciding_round)
            .map(|r| {
                r.tally
                    .iter()
                    .map(|entry| (entry.candidate_id.as_str(), entry.votes))
                    .collect()
            })
            .unwrap_or_default();

        let candidates = candidates
            .iter()
            .map(|candidate| {
                let elected = winner.as_ref().filter(|w| w.candidate_id == candidate.id);
                CandidateResult {
                    candidate_id: candidate.id.clone(),
                    member_id: candidate.member_id.clone(),
                    name: candidate.name.clone(),
                    email: candidate.email.clone(),
                    ballot_order: candidate.ballot_order,
                    votes: deciding_votes.get(candidate.id.as_str()).copied().unwrap_or(0),
                    is_elected: elected.is_some(),
                    elected_in_scrutiny: elected.map(|w| w.won_at_scrutiny),
                }
            })
            .collect();

        positions.push(PositionReport {
            election_position_id: position.id.clone(),
            position_id: position.position_id.clone(),
            position_name: position.position_name.clone(),
            order_index: position.order_index,
            status: position.status,
            scrutiny_round: position.scrutiny_round,
            opened_at: position.opened_at,
            closed_at: position.closed_at,
            present_count,
            majority_threshold: majority_threshold(present_count),
            present_members,
            rounds,
            candidates,
            winner,
        });
    }

    let position_names: HashMap<&str, &str> = election_positions
        .iter()
        .map(|p| (p.position_id.as_str(), p.position_name.as_str()))
        .collect();

    let timeline: Vec<VoteEvent> = db::list_election_votes(&mut tx, election_id)
        .await?
        .into_iter()
        .map(|vote| VoteEvent {
            position_name: position_names
                .get(vote.position_id.as_str())
                .map(|name| name.to_string())
                .unwrap_or_default(),
            candidate_name: candidate_names.get(&vote.candidate_id).cloned().unwrap_or_default(),
            vote_id: vote.id,
            voter_id: vote.voter_id,
            position_id: vote.position_id,
            candidate_id: vote.candidate_id,
            scrutiny_round: vote.scrutiny_round,
            cast_at: vote.cast_at,
        })
        .collect();

    let voters = summarize_voters(&timeline);
    let admin_actions = db::list_admin_actions(&mut tx, election_id).await?;

    tx.rollback().await?;

    Ok(ElectionReport {
        election,
        positions,
        timeline,
        voters,
        admin_actions,
    })
}

// Timeline is chronological, so the first event seen per voter is the earliest.
fn summarize_voters(timeline: &[VoteEvent]) -> Vec<VoterSummary> {
    let mut by_voter: BTreeMap<&str, (VoterSummary, BTreeSet<&str>)> = BTreeMap::new();

    for event in timeline {
        let (summary, positions) = by_voter.entry(event.voter_id.as_str()).or_insert_with(|| {
            (
                VoterSummary {
                    voter_id: event.voter_id.clone(),
                    first_vote_at: event.cast_at,
                    last_vote_at: event.cast_at,
                    total_votes: 0,
                    positions_voted: 0,
                },
                BTreeSet::new(),
            )
        });
        summary.total_votes += 1;
        summary.last_vote_at = event.cast_at;
        positions.insert(event.position_id.as_str());
    }

    by_voter
        .into_values()
        .map(|(mut summary, positions)| {
            summary.positions_voted = positions.len() as u32;
            summary
        })
        .collect()
}
