//! Wire types exchanged with the streaming endpoint.
//!
//! All frames are JSON text. Outbound there is a single frame shape, the
//! subscribe frame. Inbound frames are either a sync marker (carries a
//! `sync_id`) or a data frame keyed by entity type.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::ranges;

/// Outbound subscribe frame.
///
/// `known` maps entity type to the range-encoded ids the client already
/// holds; entity types with empty caches are omitted entirely.
#[derive(Debug, Serialize)]
pub struct SubscribeFrame {
    pub sync_id: String,
    pub known: BTreeMap<String, String>,
    pub subscribe: SubscribeBlock,
}

/// Per-entity-type subscription filters within a subscribe frame.
#[derive(Debug, Default, Serialize)]
pub struct SubscribeBlock {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projects: Option<ProjectSubscriptionSpec>,
}

/// Wire form of a project filter.
///
/// `since` is present only on resubscribes, where the cache already holds a
/// non-zero sequence high-water mark.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSubscriptionSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_ids: Option<Vec<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_ids: Option<Vec<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<u64>,
}

/// Inbound sync marker frame.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncFrame {
    pub sync_id: String,
    #[serde(default)]
    pub complete: bool,
}

/// One upserted project record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectMsg {
    pub id: i64,
    pub seq: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub workspace_id: i64,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub state: Option<String>,
}

/// A deletion notice: range-encoded ids that no longer exist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectsDeleted(pub String);

impl ProjectsDeleted {
    /// Decode into explicit ids.
    pub fn ids(&self) -> Result<Vec<i64>> {
        ranges::decode(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_subscribe_frame_shape() {
        let frame = SubscribeFrame {
            sync_id: "1".to_string(),
            known: BTreeMap::from([("projects".to_string(), "1-3,9".to_string())]),
            subscribe: SubscribeBlock {
                projects: Some(ProjectSubscriptionSpec {
                    workspace_ids: Some(vec![2]),
                    project_ids: None,
                    since: Some(42),
                }),
            },
        };
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(
            value,
            json!({
                "sync_id": "1",
                "known": {"projects": "1-3,9"},
                "subscribe": {"projects": {"workspace_ids": [2], "since": 42}},
            })
        );
    }

    #[test]
    fn test_cold_start_omits_since_and_known() {
        let frame = SubscribeFrame {
            sync_id: "1".to_string(),
            known: BTreeMap::new(),
            subscribe: SubscribeBlock {
                projects: Some(ProjectSubscriptionSpec {
                    workspace_ids: None,
                    project_ids: Some(vec![7]),
                    since: None,
                }),
            },
        };
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(
            value,
            json!({
                "sync_id": "1",
                "known": {},
                "subscribe": {"projects": {"project_ids": [7]}},
            })
        );
    }

    #[test]
    fn test_sync_frame_parse() {
        let frame: SyncFrame =
            serde_json::from_value(json!({"sync_id": "3", "complete": true})).unwrap();
        assert_eq!(frame.sync_id, "3");
        assert!(frame.complete);

        let frame: SyncFrame = serde_json::from_value(json!({"sync_id": "4"})).unwrap();
        assert!(!frame.complete);
    }

    #[test]
    fn test_project_msg_parse_ignores_unknown_fields() {
        let msg: ProjectMsg = serde_json::from_value(json!({
            "id": 5,
            "seq": 12,
            "name": "demo",
            "workspace_id": 2,
            "notes": [{"name": "n", "contents": "c"}],
        }))
        .unwrap();
        assert_eq!(msg.id, 5);
        assert_eq!(msg.seq, 12);
        assert_eq!(msg.name, "demo");
        assert!(!msg.archived);
    }

    #[test]
    fn test_projects_deleted_ids() {
        let deleted = ProjectsDeleted("1-3,7".to_string());
        assert_eq!(deleted.ids().unwrap(), vec![1, 2, 3, 7]);
    }
}
