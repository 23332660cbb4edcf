//! Subscription specs: what a caller wants to watch.

use crate::wire::ProjectSubscriptionSpec;

/// Filter criteria for project records.
///
/// Each filter is optional; an unset filter matches everything. Builder
/// methods accept either a single id or any iterator of ids, so scalar
/// filters normalize to one-element lists.
#[derive(Clone, Debug, Default)]
pub struct ProjectSpec {
    workspace_ids: Option<Vec<i64>>,
    project_ids: Option<Vec<i64>>,
}

impl ProjectSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Watch a single workspace.
    pub fn workspace(self, id: i64) -> Self {
        self.workspaces([id])
    }

    /// Watch a set of workspaces.
    pub fn workspaces(mut self, ids: impl IntoIterator<Item = i64>) -> Self {
        self.workspace_ids = Some(ids.into_iter().collect());
        self
    }

    /// Watch a single project.
    pub fn project(self, id: i64) -> Self {
        self.projects([id])
    }

    /// Watch a set of projects.
    pub fn projects(mut self, ids: impl IntoIterator<Item = i64>) -> Self {
        self.project_ids = Some(ids.into_iter().collect());
        self
    }

    /// Render the wire form, attaching `since` only when the cache has
    /// already observed a non-zero sequence (a resubscribe, not a cold start).
    pub(crate) fn to_wire(&self, since: u64) -> ProjectSubscriptionSpec {
        ProjectSubscriptionSpec {
            workspace_ids: self.workspace_ids.clone(),
            project_ids: self.project_ids.clone(),
            since: (since != 0).then_some(since),
        }
    }
}

/// One subscription request: at most one filter per entity type.
///
/// Specs are stateless and copyable; `since` and `known` cursors are filled
/// in from the key caches at the moment the subscribe frame is sent, never
/// at enqueue time.
#[derive(Clone, Debug, Default)]
pub struct SubscriptionSpec {
    pub(crate) projects: Option<ProjectSpec>,
}

impl SubscriptionSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to project records matching `spec`.
    pub fn with_projects(mut self, spec: ProjectSpec) -> Self {
        self.projects = Some(spec);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_normalizes_to_list() {
        let spec = ProjectSpec::new().workspace(3);
        let wire = spec.to_wire(0);
        assert_eq!(wire.workspace_ids, Some(vec![3]));
        assert_eq!(wire.project_ids, None);
    }

    #[test]
    fn test_since_only_on_resubscribe() {
        let spec = ProjectSpec::new().projects([1, 2]);
        assert_eq!(spec.to_wire(0).since, None);
        assert_eq!(spec.to_wire(17).since, Some(17));
    }
}
