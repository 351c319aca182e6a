//! Entity DTOs for the handful of endpoints this crate calls itself.
//!
//! # Design
//! Only the fields the client reads are modelled; unknown fields are
//! ignored on decode. The mock server defines its own copies, and the
//! integration tests catch drift between the two.

use serde::{Deserialize, Serialize};

/// An account as returned by `GET /accounts/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccountInfo {
    #[serde(rename = "_account_id")]
    pub account_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// A project as returned by `GET /projects/{name}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectInfo {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

/// Body of `PUT /projects/{name}/description`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectDescriptionInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_message: Option<String>,
}

/// Query options for `GET /projects/`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProjectOptions {
    /// Include descriptions (`d`).
    #[serde(rename = "d", skip_serializing_if = "std::ops::Not::not")]
    pub description: bool,
    /// Limit the number of results (`n`).
    #[serde(rename = "n", skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    /// Only names starting with this prefix (`p`).
    #[serde(rename = "p", skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    /// Skip this many results (`S`).
    #[serde(rename = "S", skip_serializing_if = "Option::is_none")]
    pub skip: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_ignores_unknown_fields() {
        let account: AccountInfo = serde_json::from_str(
            r#"{"_account_id":1000000,"name":"Administrator","avatars":[],"registered_on":"2024-01-01"}"#,
        )
        .unwrap();
        assert_eq!(account.account_id, 1000000);
        assert_eq!(account.name.as_deref(), Some("Administrator"));
        assert!(account.username.is_none());
    }

    #[test]
    fn description_input_omits_absent_fields() {
        let input = ProjectDescriptionInput {
            description: Some("Plugin to delete projects".to_string()),
            commit_message: None,
        };
        let json = serde_json::to_value(&input).unwrap();
        assert_eq!(json, serde_json::json!({"description": "Plugin to delete projects"}));
    }
}
