//! Layered settings: optional `config/default.toml`, an optional explicit
//! file, then `BENEFITS__*` environment variables (double underscore nests,
//! e.g. `BENEFITS__PORTAL__COOKIE`).

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::retry::RetryPolicy;

const ENV_PREFIX: &str = "BENEFITS";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub portal: PortalSection,
    pub retry: RetryPolicy,
    pub layout: PortalLayout,
}

/// Where the portal lives and how the authenticated session reaches it.
/// The cookie comes from an external login step.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PortalSection {
    pub page_url: String,
    pub cookie: String,
    pub view_state: Option<String>,
    pub request_timeout_secs: u64,
    pub connect_retries: u32,
    pub connect_backoff_ms: u64,
    pub user_agent: String,
}

impl Default for PortalSection {
    fn default() -> Self {
        Self {
            page_url: "https://www.unitedconcordia.com/tuctpi/subscriber.xhtml".to_string(),
            cookie: String::new(),
            view_state: None,
            request_timeout_secs: 30,
            connect_retries: 2,
            connect_backoff_ms: 2_000,
            user_agent: concat!("benefits_walker/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl PortalSection {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_backoff(&self) -> Duration {
        Duration::from_millis(self.connect_backoff_ms)
    }
}

/// Component ids and render regions of the benefits view.
///
/// JSF assigns these per deployment, so they live in config rather than in
/// code. Item links are addressed by position:
/// `<category prefix>:<item_list_segment>:<item>:<item_link_segment>`,
/// where the category prefix is the category header id minus its last
/// segment.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PortalLayout {
    pub reset_source: String,
    pub category_ref_pattern: String,
    pub category_render: String,
    pub detail_render: String,
    pub reset_render: String,
    pub related_render: String,
    pub item_list_segment: String,
    pub item_link_segment: String,
}

impl Default for PortalLayout {
    fn default() -> Self {
        Self {
            reset_source: "j_id_oo:j_id_op".to_string(),
            category_ref_pattern: r"^[\w-]+:[\w-]+:\d+:[\w-]+$".to_string(),
            category_render: "errorContainer printSelectionForm printSelectionChooserModalFooter \
                servicesGroup benefitsDetailsSearch:hiddenTriggerForLoadingAllowances"
                .to_string(),
            detail_render: "ben-summary-2".to_string(),
            reset_render: "ben-summary-2".to_string(),
            related_render: "proc-related-procedures".to_string(),
            item_list_segment: "j_id_ni".to_string(),
            item_link_segment: "j_id_nm".to_string(),
        }
    }
}

impl PortalLayout {
    /// Index-based id of the `item`-th procedure link under the category
    /// whose header currently has id `category_ref`.
    pub fn item_source(&self, category_ref: &str, item: usize) -> String {
        let prefix = category_ref
            .rsplit_once(':')
            .map(|(head, _)| head)
            .unwrap_or(category_ref);
        format!(
            "{prefix}:{}:{item}:{}",
            self.item_list_segment, self.item_link_segment
        )
    }
}

pub fn load_settings(config_path: Option<PathBuf>) -> Result<Settings, config::ConfigError> {
    let mut builder = config::Config::builder();

    for name in ["config/default", "default"] {
        if std::path::Path::new(&format!("{name}.toml")).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(path) = config_path {
        builder = builder.add_source(config::File::from(path).required(true));
    }

    builder = builder.add_source(
        config::Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}
