//! Core domain model for the automation engine.
//!
//! An `Automation` is the in-memory form of an `automations` row: the
//! JSONB `nodes` column decoded into the closed [`Node`] union.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use db::models::{AutomationRow, NewAutomation};
use nodes::Node;

use crate::EngineError;

/// A complete automation definition. Read-only to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Automation {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub is_active: bool,
    #[serde(default)]
    pub created_by: Option<Uuid>,
    pub nodes: Vec<Node>,
}

impl Automation {
    /// Convenience constructor for testing: an active automation.
    pub fn new(organization_id: Uuid, name: impl Into<String>, nodes: Vec<Node>) -> Self {
        Self {
            id: Uuid::new_v4(),
            organization_id,
            name: name.into(),
            is_active: true,
            created_by: None,
            nodes,
        }
    }

    /// Trigger nodes in declaration order.
    pub fn triggers(&self) -> Vec<&Node> {
        self.nodes.iter().filter(|n| n.is_trigger()).collect()
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// The row to insert for this definition.
    pub fn to_new_row(&self) -> Result<NewAutomation, EngineError> {
        let nodes = serde_json::to_value(&self.nodes)
            .map_err(|e| EngineError::InvalidDefinition(e.to_string()))?;
        Ok(NewAutomation {
            organization_id: self.organization_id,
            name: self.name.clone(),
            is_active: self.is_active,
            created_by: self.created_by,
            nodes,
        })
    }
}

impl TryFrom<AutomationRow> for Automation {
    type Error = EngineError;

    fn try_from(row: AutomationRow) -> Result<Self, Self::Error> {
        let nodes: Vec<Node> = serde_json::from_value(row.nodes)
            .map_err(|e| EngineError::InvalidDefinition(e.to_string()))?;
        Ok(Self {
            id: row.id,
            organization_id: row.organization_id,
            name: row.name,
            is_active: row.is_active,
            created_by: row.created_by,
            nodes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn row(nodes: serde_json::Value) -> AutomationRow {
        AutomationRow {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            name: "welcome".into(),
            is_active: false,
            created_by: None,
            nodes,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn row_nodes_decode_into_the_node_union() {
        let automation = Automation::try_from(row(json!([
            { "id": "t", "type": "trigger", "next": ["d"] },
            { "id": "d", "type": "delay", "delayMinutes": 5 }
        ])))
        .expect("valid row");

        assert!(!automation.is_active);
        assert_eq!(automation.triggers().len(), 1);
        assert_eq!(automation.node("d").map(|n| n.kind.name()), Some("delay"));
    }

    #[test]
    fn unknown_node_type_is_an_invalid_definition() {
        let err = Automation::try_from(row(json!([{ "id": "x", "type": "teleport" }]))).unwrap_err();
        assert!(matches!(err, EngineError::InvalidDefinition(_)));
    }
}
