//! Request DTOs for Web API.

use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

/// How a search word is matched against names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Name equals the word.
    Exact,
    /// Name contains the word.
    Contains,
}

/// Query parameters for search endpoints.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SearchQuery {
    /// Match mode; the default depends on the endpoint.
    pub mode: Option<SearchMode>,
}

impl SearchQuery {
    /// Match mode, or `default` when not given.
    pub fn mode_or(&self, default: SearchMode) -> SearchMode {
        self.mode.unwrap_or(default)
    }
}
