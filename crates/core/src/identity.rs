//! User identity and access principals
//!
//! Every retrieval request carries a `UserContext`. The set of principals
//! derived from it drives both the pre-search payload filter and the
//! post-search ACL re-check.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

/// Principal identifier granted to every user.
pub const PUBLIC_PRINCIPAL: &str = "public";

/// Identity of the requesting user.
///
/// `tenant_id` must be non-empty; `group_ids` may be empty. An optional
/// `group_hierarchy` maps a group to its parent groups; when present, the
/// principal set includes the transitive closure of the user's groups.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserContext {
    pub user_id: String,
    pub tenant_id: String,
    #[serde(default)]
    pub group_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_hierarchy: Option<HashMap<String, Vec<String>>>,
}

impl UserContext {
    pub fn new(
        user_id: impl Into<String>,
        tenant_id: impl Into<String>,
        group_ids: Vec<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            tenant_id: tenant_id.into(),
            group_ids,
            language: None,
            group_hierarchy: None,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_group_hierarchy(mut self, hierarchy: HashMap<String, Vec<String>>) -> Self {
        self.group_hierarchy = Some(hierarchy);
        self
    }

    /// Full principal set: `{user_id} ∪ groups ∪ {"public"}`.
    ///
    /// With a group hierarchy configured, membership is closed over parent
    /// groups (BFS with a visited set, so a malformed cyclic hierarchy
    /// cannot loop).
    pub fn principals(&self) -> Vec<String> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut out: Vec<String> = Vec::with_capacity(self.group_ids.len() + 2);

        let mut push = |p: String, out: &mut Vec<String>, seen: &mut HashSet<String>| {
            if seen.insert(p.clone()) {
                out.push(p);
            }
        };

        push(self.user_id.clone(), &mut out, &mut seen);

        let mut queue: VecDeque<String> = self.group_ids.iter().cloned().collect();
        while let Some(group) = queue.pop_front() {
            if seen.contains(&group) {
                continue;
            }
            if let Some(hierarchy) = &self.group_hierarchy {
                if let Some(parents) = hierarchy.get(&group) {
                    queue.extend(parents.iter().cloned());
                }
            }
            push(group, &mut out, &mut seen);
        }

        push(PUBLIC_PRINCIPAL.to_string(), &mut out, &mut seen);
        out
    }

    /// Placeholder admin policy: membership in `admin`/`system`, or a user
    /// id containing `admin`. Deployments should replace this with an
    /// explicit capability claim; keeping it in one method makes that a
    /// one-line change.
    pub fn is_admin(&self) -> bool {
        self.group_ids.iter().any(|g| g == "admin" || g == "system")
            || self.user_id.contains("admin")
    }

    /// Short, log-safe summary for audit records.
    pub fn summary(&self) -> String {
        format!("{}@{} ({} groups)", self.user_id, self.tenant_id, self.group_ids.len())
    }
}
