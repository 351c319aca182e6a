//! Thin service calls built on the pipeline.
//!
//! Each one formats a path, escaping names that may contain `/`, and hands
//! it to `Client`. `get_account("self")` doubles as the credential probe.

use std::collections::BTreeMap;
use std::io::Write;

use crate::client::Client;
use crate::endpoint::{add_options, escape_segment};
use crate::error::ApiError;
use crate::http::Transport;
use crate::response::Response;
use crate::types::{AccountInfo, ProjectDescriptionInput, ProjectInfo, ProjectOptions};

impl<T: Transport> Client<T> {
    /// `account` is an id, a username, an email, or `self`.
    pub fn get_account(&self, account: &str) -> Result<(AccountInfo, Response), ApiError> {
        self.get(&format!("accounts/{}", escape_segment(account)))
    }

    pub fn get_project(&self, name: &str) -> Result<(ProjectInfo, Response), ApiError> {
        self.get(&format!("projects/{}", escape_segment(name)))
    }

    pub fn list_projects(
        &self,
        options: Option<&ProjectOptions>,
    ) -> Result<(BTreeMap<String, ProjectInfo>, Response), ApiError> {
        self.get(&add_options("projects/", options)?)
    }

    /// Returns the description as stored by the server.
    pub fn set_project_description(
        &self,
        name: &str,
        input: &ProjectDescriptionInput,
    ) -> Result<(String, Response), ApiError> {
        self.put(&format!("projects/{}/description", escape_segment(name)), input)
    }

    /// Version string of the server, e.g. `3.10.0`.
    pub fn get_version(&self) -> Result<(String, Response), ApiError> {
        self.get_string("config/server/version")
    }

    /// Copy the base64-encoded patch of a revision into `sink`.
    pub fn get_patch(&self, change: &str, revision: &str, sink: &mut dyn Write) -> Result<Response, ApiError> {
        self.get_raw(
            &format!(
                "changes/{}/revisions/{}/patch",
                escape_segment(change),
                escape_segment(revision)
            ),
            sink,
        )
    }
}
