//! Access filter builder
//!
//! Translates the user identity into the payload filter enforced inside the
//! vector store: same tenant, ACL overlap with the user's principal set and
//! an optional language restriction. Request-level extras (e.g. a `docId`
//! pin) merge into the same conjunction.

use rag_agent_core::{FilterCondition, PayloadFilter, UserContext};

use crate::RetrievalError;

/// Build the row-level access filter for `user`.
///
/// The emitted filter is a conjunction of:
/// - `tenant == user.tenant_id`
/// - `acl` matching any of `{user_id} ∪ groups ∪ {"public"}` (closed over
///   the group hierarchy when configured)
/// - `lang == user.language` when set and non-empty
///
/// Fails when the tenant id is empty; no query may run without a tenant
/// boundary.
pub fn build_filter(
    user: &UserContext,
    extra: Option<PayloadFilter>,
) -> Result<PayloadFilter, RetrievalError> {
    if user.tenant_id.is_empty() {
        return Err(RetrievalError::InvalidUser(
            "tenantId must be non-empty".to_string(),
        ));
    }

    let mut filter = PayloadFilter::new()
        .must(FilterCondition::keyword("tenant", user.tenant_id.clone()))
        .must(FilterCondition::any_of("acl", user.principals()));

    if let Some(lang) = user.language.as_deref() {
        if !lang.is_empty() {
            filter = filter.must(FilterCondition::keyword("lang", lang));
        }
    }

    if let Some(extra) = extra {
        filter = filter.merge(extra);
    }

    Ok(filter)
}
