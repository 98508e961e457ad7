//! Upload plans: which catalog files land where in the bucket.
//!
//! Every destination key is `LARS/<suffix>/<file>`: one flat directory per
//! suffix, with no application/stream/build subfolders.

pub mod grid;

use std::sync::Arc;

use tracing::info;

use crate::http::HttpSource;
use crate::types::{Application, ArtifactMetadata, ArtifactPlanItem};

/// Fixed root every destination key lives under.
pub const DESTINATION_ROOT: &str = "LARS/";

/// Where an artifact's `version` metadata comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionSource {
    None,
    Build,
    GridInstaller,
}

/// One file copied for an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtifactRule {
    pub source_file: &'static str,
    pub destination_file: &'static str,
    pub version: VersionSource,
}

const fn rule(
    source_file: &'static str,
    destination_file: &'static str,
    version: VersionSource,
) -> ArtifactRule {
    ArtifactRule {
        source_file,
        destination_file,
        version,
    }
}

const MIG_RULES: [ArtifactRule; 2] = [
    rule("scripts.jar", "MIG_scripts.jar", VersionSource::None),
    rule("Install-LMMIG.jar", "Install-LMMIG.jar", VersionSource::Build),
];
const HCM_RULES: [ArtifactRule; 1] = [rule(
    "Install-LMHCM.jar",
    "Install-LMHCM.jar",
    VersionSource::Build,
)];
const IEFIN_RULES: [ArtifactRule; 1] = [rule(
    "Install-LMIEFIN.jar",
    "Install-LMIEFIN.jar",
    VersionSource::Build,
)];
const LANDMARK_RULES: [ArtifactRule; 3] = [
    rule("LANDMARK.jar", "LANDMARK.jar", VersionSource::Build),
    rule(
        "grid-installer.jar",
        "grid-installer.jar",
        VersionSource::GridInstaller,
    ),
    rule("mt_dependencies.txt", "mt_dependencies.txt", VersionSource::None),
];

impl Application {
    /// Files copied for this application, in plan order.
    pub fn artifact_rules(self) -> &'static [ArtifactRule] {
        match self {
            Self::Mig => &MIG_RULES,
            Self::Hcm => &HCM_RULES,
            Self::IeFin => &IEFIN_RULES,
            Self::Landmark => &LANDMARK_RULES,
        }
    }

    /// Platform directory inside a build: `Landmark` for app installers,
    /// `Any` for the Landmark runtime itself.
    pub fn source_flavor(self) -> &'static str {
        match self {
            Self::Mig | Self::Hcm | Self::IeFin => "Landmark",
            Self::Landmark => "Any",
        }
    }
}

/// Normalize an operator-supplied suffix into a prefix under `LARS/`.
///
/// Only surrounding whitespace and slashes are dropped. Interior segments
/// are kept as typed, so `"MT /AUG"` lands under `LARS/MT /AUG/`.
pub fn sanitize_suffix(suffix: &str) -> String {
    let trimmed = suffix.trim().trim_matches('/');
    if trimmed.is_empty() {
        DESTINATION_ROOT.to_string()
    } else {
        format!("{}{}/", DESTINATION_ROOT, trimmed)
    }
}

/// Pure plan construction.
#[derive(Debug, Clone)]
pub struct PlanBuilder {
    base_url: String,
    bucket: String,
}

impl PlanBuilder {
    pub fn new(base_url: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Catalog directory holding `app`'s files for one build.
    pub fn source_base(&self, app: Application, stream: &str, build: &str) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            self.base_url,
            app.catalog_name(),
            stream,
            build,
            app.source_flavor()
        )
    }

    /// Plan by catalog application name; unknown names plan nothing.
    pub fn plan(
        &self,
        application: &str,
        stream: &str,
        build: &str,
        suffix: &str,
        grid_version: Option<&str>,
    ) -> Vec<ArtifactPlanItem> {
        match Application::from_catalog_name(application) {
            Some(app) => self.plan_for(app, stream, build, suffix, grid_version),
            None => Vec::new(),
        }
    }

    pub fn plan_for(
        &self,
        app: Application,
        stream: &str,
        build: &str,
        suffix: &str,
        grid_version: Option<&str>,
    ) -> Vec<ArtifactPlanItem> {
        let prefix = sanitize_suffix(suffix);
        let source_base = self.source_base(app, stream, build);

        app.artifact_rules()
            .iter()
            .map(|rule| ArtifactPlanItem {
                application: app,
                stream: stream.to_string(),
                build: build.to_string(),
                source_url: format!("{}/{}", source_base, rule.source_file),
                destination_bucket: self.bucket.clone(),
                destination_key: format!("{}{}", prefix, rule.destination_file),
                metadata: match rule.version {
                    VersionSource::None => None,
                    VersionSource::Build => Some(version_metadata(build)),
                    VersionSource::GridInstaller => grid_version.map(version_metadata),
                },
            })
            .collect()
    }
}

fn version_metadata(version: &str) -> ArtifactMetadata {
    ArtifactMetadata::from([("version".to_string(), version.to_string())])
}

/// Plan builder plus the one network lookup a plan can need: the grid
/// installer version for Landmark.
pub struct Planner {
    builder: PlanBuilder,
    http: Arc<dyn HttpSource>,
}

impl Planner {
    pub fn new(builder: PlanBuilder, http: Arc<dyn HttpSource>) -> Self {
        Self { builder, http }
    }

    pub async fn plan(
        &self,
        application: &str,
        stream: &str,
        build: &str,
        suffix: &str,
    ) -> Vec<ArtifactPlanItem> {
        let Some(app) = Application::from_catalog_name(application) else {
            info!(application, "no plan for unknown application");
            return Vec::new();
        };

        let needs_grid = app
            .artifact_rules()
            .iter()
            .any(|rule| rule.version == VersionSource::GridInstaller);
        let grid_version = if needs_grid {
            let any_base = self.builder.source_base(app, stream, build);
            grid::fetch_grid_version(self.http.as_ref(), &any_base).await
        } else {
            None
        };

        let plan = self
            .builder
            .plan_for(app, stream, build, suffix, grid_version.as_deref());
        info!(
            application,
            stream,
            build,
            prefix = %sanitize_suffix(suffix),
            count = plan.len(),
            "upload plan built"
        );
        plan
    }
}
