//! Runner metadata read out of a loaded context.

use crate::error::{RuntimeError, RuntimeResult};
use crate::value::{decode, DecodeError, DynamicValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Content rating a runner declares for its catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CatalogRating {
    Safe,
    Mixed,
    Nsfw,
}

/// Identity and version, decoded from the runner's `info` object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerInfo {
    pub id: String,
    pub name: String,
    pub version: f64,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default, alias = "minSupportedHostVersion")]
    pub min_supported_app_version: Option<String>,
    #[serde(default)]
    pub supported_languages: Option<Vec<String>>,
    #[serde(default)]
    pub rating: Option<CatalogRating>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthenticationMethod {
    #[default]
    None,
    Basic,
    Webview,
    Oauth,
}

/// What the basic-auth username field holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BasicAuthLabel {
    Email,
    Username,
    UserId,
}

/// Optional protocol methods a runner declares it implements.
///
/// Flags left out of the declaration are false.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunnerIntents {
    pub page_link_resolver: bool,
    pub library_page_link_provider: bool,
    pub browse_page_link_provider: bool,
    pub image_request_handler: bool,
    pub page_read_handler: bool,
    pub chapter_event_handler: bool,
    pub content_event_handler: bool,
    pub library_sync_handler: bool,
    pub provides_reader_context: bool,
    pub can_refresh_highlight: bool,
    pub is_authenticatable: bool,
    pub authentication_method: AuthenticationMethod,
    pub basic_auth_label: Option<BasicAuthLabel>,
    pub advanced_tracker: bool,
    pub has_tags_view: bool,
}

impl RunnerIntents {
    pub fn uses_basic_auth(&self) -> bool {
        self.is_authenticatable && self.authentication_method == AuthenticationMethod::Basic
    }
}

/// Optional runner-supplied settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerConfig {
    /// Alternate endpoint used to verify the runner's site.
    #[serde(default)]
    pub verification_url: Option<String>,
    #[serde(default)]
    pub known_link_keys: Vec<String>,
    #[serde(default)]
    pub disable_library_actions: bool,
    #[serde(flatten)]
    pub extra: BTreeMap<String, DynamicValue>,
}

/// Everything a runner declares about itself. Immutable once extracted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerDescriptor {
    pub info: RunnerInfo,
    pub intents: RunnerIntents,
    pub config: Option<RunnerConfig>,
}

fn located(root: &str, err: &DecodeError) -> String {
    let path = err.path();
    if path.is_empty() {
        format!("{}: {}", root, err.message())
    } else {
        format!("{}.{}: {}", root, path, err.message())
    }
}

/// Decode the three raw declarations into a descriptor.
pub fn assemble(
    runner_id: &str,
    info: DynamicValue,
    intents: DynamicValue,
    config: Option<DynamicValue>,
) -> RuntimeResult<RunnerDescriptor> {
    let info: RunnerInfo = decode(&info)
        .map_err(|e| RuntimeError::RunnerInfoInitFailed(located("info", &e)))?;
    let intents: RunnerIntents = decode(&intents)
        .map_err(|e| RuntimeError::FailedToParseRunnerIntents(located("intents", &e)))?;

    let config = config.and_then(|raw| match decode::<RunnerConfig>(&raw) {
        Ok(config) => Some(config),
        Err(e) => {
            warn!(runner = %runner_id, "Ignoring malformed config: {}", e);
            None
        }
    });

    debug!(
        runner = %runner_id,
        name = %info.name,
        version = info.version,
        has_config = config.is_some(),
        "Descriptor extracted"
    );
    Ok(RunnerDescriptor {
        info,
        intents,
        config,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dynamic(value: serde_json::Value) -> DynamicValue {
        DynamicValue::from(value)
    }

    #[test]
    fn test_assemble_with_partial_intents() {
        let descriptor = assemble(
            "x",
            dynamic(json!({"id": "x", "name": "X", "version": 1.0, "website": "https://x"})),
            dynamic(json!({"pageLinkResolver": true, "authenticationMethod": "basic"})),
            None,
        )
        .unwrap();

        assert_eq!(descriptor.info.id, "x");
        assert_eq!(descriptor.info.website.as_deref(), Some("https://x"));
        assert!(descriptor.intents.page_link_resolver);
        assert!(!descriptor.intents.image_request_handler);
        assert_eq!(
            descriptor.intents.authentication_method,
            AuthenticationMethod::Basic
        );
        assert!(descriptor.config.is_none());
    }

    #[test]
    fn test_bad_info_names_the_field() {
        let err = assemble(
            "x",
            dynamic(json!({"id": "x", "name": "X", "version": "one"})),
            dynamic(json!({})),
            None,
        )
        .unwrap_err();

        match err {
            RuntimeError::RunnerInfoInitFailed(message) => {
                assert!(message.starts_with("info.version"), "{}", message)
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_malformed_config_is_dropped() {
        let descriptor = assemble(
            "x",
            dynamic(json!({"id": "x", "name": "X", "version": 2})),
            dynamic(json!({})),
            Some(dynamic(json!({"knownLinkKeys": "not-a-list"}))),
        )
        .unwrap();
        assert!(descriptor.config.is_none());
    }

    #[test]
    fn test_config_keeps_extra_keys() {
        let descriptor = assemble(
            "x",
            dynamic(json!({"id": "x", "name": "X", "version": 2, "rating": "MIXED"})),
            dynamic(json!({})),
            Some(dynamic(json!({"verificationUrl": "https://x/verify", "pageSize": 20}))),
        )
        .unwrap();

        assert_eq!(descriptor.info.rating, Some(CatalogRating::Mixed));
        let config = descriptor.config.unwrap();
        assert_eq!(config.verification_url.as_deref(), Some("https://x/verify"));
        assert_eq!(config.extra.get("pageSize"), Some(&DynamicValue::from(20.0)));
    }
}
