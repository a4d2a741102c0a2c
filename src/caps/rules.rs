//! User auto-grant rules.
//!
//! A rule says whether requests from one requester that are offered against
//! a given authorizing credential should be granted without waiting for an
//! assigner. The latest rule for a (credential, requester) pair wins.

use super::model::{CapabilityId, PrincipalId};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoGrantRule {
    #[serde(rename = "userGrantPolicyID", default = "AutoGrantRule::new_id")]
    pub id: String,
    /// Authorizing credential the rule applies to.
    #[serde(rename = "capabilityID")]
    pub credential: CapabilityId,
    #[serde(rename = "requesterID", alias = "targetAppID")]
    pub requester: PrincipalId,
    pub grant: bool,
}

impl AutoGrantRule {
    fn new_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

#[derive(Default)]
pub struct AutoGrantRules {
    rules: RwLock<Vec<AutoGrantRule>>,
}

impl AutoGrantRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `rule`, replacing any rule for the same credential and requester.
    pub fn upsert(&self, rule: AutoGrantRule) {
        let mut rules = self.rules.write();
        rules.retain(|r| !(r.credential == rule.credential && r.requester == rule.requester));
        rules.push(rule);
    }

    /// Whether requests from `requester` against `credential` auto-grant.
    pub fn allows(&self, credential: &CapabilityId, requester: &PrincipalId) -> bool {
        self.rules
            .read()
            .iter()
            .any(|r| r.grant && &r.credential == credential && &r.requester == requester)
    }

    pub fn list(&self) -> Vec<AutoGrantRule> {
        self.rules.read().clone()
    }
}
