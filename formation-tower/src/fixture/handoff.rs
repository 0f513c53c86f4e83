//! Signals delivered to a fixture's workflow through its mailboxes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::recipe::RecipeStep;

/// Advance notice that a tray is on its way to a fixture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub tray: String,
    /// Full fixture barcode or a bare `CC-LL` id
    pub fixture: String,
    #[serde(default = "Utc::now")]
    pub received_at: DateTime<Utc>,
}

impl Reservation {
    pub fn new(tray: impl Into<String>, fixture: impl Into<String>) -> Self {
        Self {
            tray: tray.into(),
            fixture: fixture.into(),
            received_at: Utc::now(),
        }
    }
}

/// Confirmation that a tray is seated in a fixture, with the recipe to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadRequest {
    pub transaction_id: String,
    pub column: u8,
    pub level: u8,
    pub tray: String,
    pub recipe_name: String,
    #[serde(rename = "recipe_ver", default)]
    pub recipe_version: u32,
    #[serde(default)]
    pub step_type: String,
    #[serde(default)]
    pub steps: Vec<RecipeStep>,
}

/// Operator request to cancel an outstanding reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unreserve;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_request_wire_names() {
        let json = r#"{
            "transaction_id": "abc",
            "column": 1,
            "level": 2,
            "tray": "11223344A",
            "recipe_name": "FORM_CYCLE",
            "recipe_ver": 3
        }"#;
        let load: LoadRequest = serde_json::from_str(json).unwrap();
        assert_eq!(load.recipe_version, 3);
        assert!(load.steps.is_empty());
        assert!(load.step_type.is_empty());
    }
}
