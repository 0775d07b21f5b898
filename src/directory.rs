use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{ElectionError, Result};

/// Identity of a member as the directory knows it right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberProfile {
    pub id: String,
    pub name: String,
    pub email: String,
    pub is_member: bool,
    /// Carried through for the caller that authorises overrides and resets;
    /// the engine itself only records the acting member's id.
    pub is_admin: bool,
}

/// Read-only view of the platform's member directory.
#[async_trait]
pub trait MemberDirectory: Send + Sync {
    async fn find_member(&self, member_id: &str) -> Result<Option<MemberProfile>>;
}

/// Directory held in memory, for seeding and tests.
#[derive(Debug, Default, Clone)]
pub struct StaticDirectory {
    members: HashMap<String, MemberProfile>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, profile: MemberProfile) {
        self.members.insert(profile.id.clone(), profile);
    }

    pub fn with_member(mut self, id: &str, name: &str, email: &str) -> Self {
        self.insert(MemberProfile {
            id: id.to_string(),
            name: name.to_string(),
            email: email.to_string(),
            is_member: true,
            is_admin: false,
        });
        self
    }
}

#[async_trait]
impl MemberDirectory for StaticDirectory {
    async fn find_member(&self, member_id: &str) -> Result<Option<MemberProfile>> {
        Ok(self.members.get(member_id).cloned())
    }
}

/// Look up a member who is entitled to take part, or explain why not.
pub(crate) async fn require_member(
    directory: &dyn MemberDirectory,
    member_id: &str,
) -> Result<MemberProfile> {
    match directory.find_member(member_id).await? {
        Some(profile) if profile.is_member => Ok(profile),
        Some(_) => Err(ElectionError::NotEligible(format!(
            "{} is not an active member",
            member_id
        ))),
        None => Err(ElectionError::NotEligible(format!(
            "{} is not in the member directory",
            member_id
        ))),
    }
}
