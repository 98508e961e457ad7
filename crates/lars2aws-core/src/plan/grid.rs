//! Version lookup for `grid-installer.jar`.
//!
//! The catalog serves the jar's contents as a directory tree, so the embedded
//! Maven `pom.properties` can be fetched directly.

use std::time::Duration;

use tracing::{debug, warn};

use crate::http::HttpSource;

pub const GRID_POM_PATH: &str =
    "grid-installer.jar/META-INF/maven/grid.runtime/installer-code/pom.properties";

pub const GRID_VERSION_TIMEOUT: Duration = Duration::from_secs(30);

/// URL of the grid installer's `pom.properties` under an `.../Any` base.
pub fn pom_properties_url(any_base: &str) -> String {
    format!("{}/{}", any_base.trim_end_matches('/'), GRID_POM_PATH)
}

/// Value of the first `version=` line, if non-empty.
pub fn parse_pom_version(text: &str) -> Option<String> {
    text.lines()
        .find_map(|line| line.strip_prefix("version="))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Best-effort: any fetch or parse failure yields `None`.
pub async fn fetch_grid_version(http: &dyn HttpSource, any_base: &str) -> Option<String> {
    let url = pom_properties_url(any_base);
    match http.get_text(&url, GRID_VERSION_TIMEOUT).await {
        Ok(text) => {
            let version = parse_pom_version(&text);
            if version.is_none() {
                warn!(url = %url, "grid installer pom.properties has no version");
            }
            debug!(url = %url, ?version, "grid installer version read");
            version
        }
        Err(e) => {
            warn!(url = %url, error = %e, "grid installer pom.properties fetch failed");
            None
        }
    }
}
