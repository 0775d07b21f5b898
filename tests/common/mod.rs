#![allow(dead_code)]

use std::time::Duration;
use tempfile::TempDir;
use trusty_elect::election;
use trusty_elect::models::{Candidate, Election, ElectionPosition, Vote};
use trusty_elect::{Database, DatabaseConfig, ElectionRules, StaticDirectory};

pub const ROSTER_SIZE: usize = 12;

/// An open election over the given positions, with a roster of members
/// `m01..m12` in the directory and nothing opened yet.
pub struct Fixture {
    pub database: Database,
    pub directory: StaticDirectory,
    pub rules: ElectionRules,
    pub election: Election,
    // Keeps an on-disk store alive for the fixture's lifetime
    _store_dir: Option<TempDir>,
}

pub fn member_id(n: usize) -> String {
    format!("m{:02}", n)
}

pub fn roster() -> StaticDirectory {
    (1..=ROSTER_SIZE).fold(StaticDirectory::new(), |directory, n| {
        directory.with_member(
            &member_id(n),
            &format!("Member {:02}", n),
            &format!("member{:02}@example.org", n),
        )
    })
}

pub async fn setup(position_names: &[&str]) -> Fixture {
    let database = Database::in_memory().await.expect("in-memory store");
    setup_with(database, None, position_names).await
}

/// Same as `setup`, but on a WAL database file with a pool of several
/// connections, so concurrent calls really run side by side.
pub async fn setup_on_disk(position_names: &[&str]) -> Fixture {
    let dir = TempDir::new().expect("create temp dir");
    let config = DatabaseConfig {
        url: format!("sqlite:{}", dir.path().join("elections.db").display()),
        max_connections: 5,
        busy_timeout: Duration::from_secs(10),
    };
    let database = Database::connect(&config).await.expect("on-disk store");
    setup_with(database, Some(dir), position_names).await
}

async fn setup_with(database: Database, store_dir: Option<TempDir>, position_names: &[&str]) -> Fixture {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut position_ids = Vec::new();
    for name in position_names {
        let position = election::create_position(&database, name).await.expect("create position");
        position_ids.push(position.id);
    }
    let ids: Vec<&str> = position_ids.iter().map(String::as_str).collect();
    let opened = election::open_election(&database, "Annual Assembly", &ids)
        .await
        .expect("open election");

    Fixture {
        database,
        directory: roster(),
        rules: ElectionRules::default(),
        election: opened,
        _store_dir: store_dir,
    }
}

impl Fixture {
    pub async fn positions(&self) -> Vec<ElectionPosition> {
        election::election_positions(&self.database, &self.election.id)
            .await
            .expect("positions")
    }

    pub async fn position(&self, name: &str) -> ElectionPosition {
        self.positions()
            .await
            .into_iter()
            .find(|p| p.position_name == name)
            .expect("position in election")
    }

    pub async fn nominate(&self, position: &ElectionPosition, member: usize) -> Candidate {
        election::nominate(
            &self.database,
            &self.directory,
            &self.election.id,
            &position.position_id,
            &member_id(member),
        )
        .await
        .expect("nominate")
    }

    /// Mark members `1..=count` present.
    pub async fn seat(&self, position: &ElectionPosition, count: usize) {
        for n in 1..=count {
            election::mark_present(&self.database, &self.directory, &position.id, &member_id(n), true)
                .await
                .expect("mark present");
        }
    }

    /// Cast one ballot per listed voter for `candidate`.
    pub async fn cast(&self, position: &ElectionPosition, candidate: &Candidate, voters: impl IntoIterator<Item = usize>) -> Vec<Vote> {
        let mut votes = Vec::new();
        for n in voters {
            let vote = election::cast_vote(&self.database, &position.id, &member_id(n), &candidate.id)
                .await
                .expect("cast vote");
            votes.push(vote);
        }
        votes
    }

    /// Open the next position, seat `present` members and nominate two
    /// candidates (members 11 and 12, who are not seated).
    pub async fn open_two_way_race(&self, present: usize) -> (ElectionPosition, Candidate, Candidate) {
        let position = election::advance(&self.database, &self.election.id)
            .await
            .expect("advance");
        self.seat(&position, present).await;
        let a = self.nominate(&position, 11).await;
        let b = self.nominate(&position, 12).await;
        (position, a, b)
    }
}
