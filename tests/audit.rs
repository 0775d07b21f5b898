mod common;

use common::{member_id, setup, Fixture};
use trusty_elect::election::{self, ElectionReport};
use trusty_elect::models::{DecidedBy, PositionStatus};

// President decided in round 2 (member 9 sat out round 1), Treasurer
// still open in round 1, Secretary not started.
async fn half_run_election() -> Fixture {
    let fx = setup(&["President", "Treasurer", "Secretary"]).await;

    let (president, a, b) = fx.open_two_way_race(9).await;
    fx.cast(&president, &a, 1..=4).await;
    fx.cast(&president, &b, 5..=8).await;
    election::close_scrutiny_round(&fx.database, &fx.rules, &president.id, 1)
        .await
        .unwrap();
    fx.cast(&president, &a, 1..=3).await;
    fx.cast(&president, &b, 4..=9).await;
    election::close_scrutiny_round(&fx.database, &fx.rules, &president.id, 2)
        .await
        .unwrap();

    let treasurer = election::advance(&fx.database, &fx.election.id).await.unwrap();
    let c = fx.nominate(&treasurer, 2).await;
    fx.nominate(&treasurer, 3).await;
    fx.cast(&treasurer, &c, [7, 1]).await;

    fx
}

async fn report(fx: &Fixture) -> ElectionReport {
    election::project(&fx.database, &fx.election.id).await.unwrap()
}

#[tokio::test]
async fn projection_reports_rounds_and_the_elected_candidate() {
    let fx = half_run_election().await;
    let report = report(&fx).await;

    assert_eq!(report.election.name, "Annual Assembly");
    assert!(report.election.is_active);
    let names: Vec<_> = report.positions.iter().map(|p| p.position_name.as_str()).collect();
    assert_eq!(names, vec!["President", "Treasurer", "Secretary"]);

    let president = report.position("President").unwrap();
    assert_eq!(president.status, PositionStatus::Completed);
    assert_eq!(president.present_count, 9);
    assert_eq!(president.majority_threshold, 5);
    assert_eq!(president.present_members.len(), 9);
    assert_eq!(president.rounds.len(), 2);
    assert_eq!(president.rounds[0].ballots_cast, 8);
    assert_eq!(president.rounds[0].tally[0].votes, 4);
    assert_eq!(president.rounds[0].tally[1].votes, 4);
    assert_eq!(president.rounds[1].tally[0].votes, 6);

    let winner = president.winner.as_ref().unwrap();
    assert_eq!(winner.won_at_scrutiny, 2);
    assert_eq!(winner.decided_by, DecidedBy::Majority);

    let elected: Vec<_> = president.candidates.iter().filter(|c| c.is_elected).collect();
    assert_eq!(elected.len(), 1);
    assert_eq!(elected[0].member_id, member_id(12));
    assert_eq!(elected[0].votes, 6);
    assert_eq!(elected[0].elected_in_scrutiny, Some(2));

    let runner_up = president.candidates.iter().find(|c| !c.is_elected).unwrap();
    assert_eq!(runner_up.votes, 3);
    assert_eq!(runner_up.elected_in_scrutiny, None);
}

#[tokio::test]
async fn open_and_pending_positions_are_reported_as_they_stand() {
    let fx = half_run_election().await;
    let report = report(&fx).await;

    let treasurer = report.position("Treasurer").unwrap();
    assert_eq!(treasurer.status, PositionStatus::Active);
    assert!(treasurer.winner.is_none());
    assert_eq!(treasurer.present_count, 9);
    assert_eq!(treasurer.rounds.len(), 1);
    assert_eq!(treasurer.candidates[0].votes, 2);
    assert!(treasurer.candidates.iter().all(|c| !c.is_elected));

    let secretary = report.position("Secretary").unwrap();
    assert_eq!(secretary.status, PositionStatus::Pending);
    assert!(secretary.rounds.is_empty());
    assert!(secretary.candidates.is_empty());
    assert_eq!(secretary.present_count, 0);
}

#[tokio::test]
async fn timeline_and_voter_summaries_follow_cast_order() {
    let fx = half_run_election().await;
    let report = report(&fx).await;

    assert_eq!(report.timeline.len(), 8 + 9 + 2);
    assert!(report.timeline.windows(2).all(|pair| pair[0].cast_at <= pair[1].cast_at));
    let last = report.timeline.last().unwrap();
    assert_eq!(last.voter_id, member_id(1));
    assert_eq!(last.position_name, "Treasurer");
    assert_eq!(last.candidate_name, "Member 02");

    let voters: Vec<_> = report.voters.iter().map(|v| v.voter_id.as_str()).collect();
    assert_eq!(voters, (1..=9).map(member_id).collect::<Vec<_>>());

    let first = &report.voters[0];
    assert_eq!(first.total_votes, 3);
    assert_eq!(first.positions_voted, 2);
    assert!(first.first_vote_at < first.last_vote_at);

    let quiet = report.voters.iter().find(|v| v.voter_id == member_id(9)).unwrap();
    assert_eq!(quiet.total_votes, 1);
    assert_eq!(quiet.positions_voted, 1);
}

#[tokio::test]
async fn projecting_twice_gives_identical_output() {
    let fx = half_run_election().await;

    let first = report(&fx).await;
    let second = report(&fx).await;
    assert_eq!(first, second);
    assert_eq!(first.to_json().unwrap(), second.to_json().unwrap());

    // Projection never writes
    let after = election::votes_for_round(&fx.database, &fx.position("Treasurer").await.id, 1)
        .await
        .unwrap();
    assert_eq!(after.len(), 2);
}

#[tokio::test]
async fn report_json_carries_decision_kinds() {
    let fx = half_run_election().await;
    let json = report(&fx).await.to_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();

    let president = &value["positions"][0];
    assert_eq!(president["status"], "completed");
    assert_eq!(president["winner"]["decided_by"], "majority");
    assert_eq!(president["winner"]["won_at_scrutiny"], 2);
    assert_eq!(value["positions"][2]["status"], "pending");
}

#[tokio::test]
async fn unknown_election_is_not_found() {
    let fx = setup(&["President"]).await;
    let result = election::project(&fx.database, "no-such-election").await;
    assert!(matches!(result, Err(trusty_elect::ElectionError::NotFound(_))), "{:?}", result);
}
