//! Shared core types used across the catalog, plan, upload and inject layers.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Applications known to the catalog.
///
/// Each variant owns its artifact naming rules (see [`crate::plan`]); adding an
/// application means adding a variant and handling it in every `match`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Application {
    #[serde(rename = "MIG")]
    Mig,
    #[serde(rename = "HCM")]
    Hcm,
    #[serde(rename = "IEFin")]
    IeFin,
    Landmark,
}

impl Application {
    pub const ALL: [Application; 4] = [
        Application::Mig,
        Application::Hcm,
        Application::IeFin,
        Application::Landmark,
    ];

    /// Parse the catalog spelling of an application name.
    ///
    /// Names are matched exactly; the catalog is case-sensitive about them.
    pub fn from_catalog_name(name: &str) -> Option<Self> {
        match name {
            "MIG" => Some(Self::Mig),
            "HCM" => Some(Self::Hcm),
            "IEFin" => Some(Self::IeFin),
            "Landmark" => Some(Self::Landmark),
            _ => None,
        }
    }

    pub fn catalog_name(self) -> &'static str {
        match self {
            Self::Mig => "MIG",
            Self::Hcm => "HCM",
            Self::IeFin => "IEFin",
            Self::Landmark => "Landmark",
        }
    }
}

impl fmt::Display for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.catalog_name())
    }
}

/// Build qualification stage reported by the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Maturity {
    Released,
    UpgradeTested,
    SmokeTested,
    AppQualified,
    Built,
    TurnedOver,
    JunitTested,
    Unknown,
}

impl Maturity {
    /// Map a `Maturity.Name` column value to a maturity.
    ///
    /// Matching is case-insensitive on the long name; anything else is
    /// [`Maturity::Unknown`].
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "released" => Self::Released,
            "upgradetested" => Self::UpgradeTested,
            "smoketested" => Self::SmokeTested,
            "appqualified" => Self::AppQualified,
            "built" => Self::Built,
            "turnedover" => Self::TurnedOver,
            "junittested" => Self::JunitTested,
            _ => Self::Unknown,
        }
    }

    /// Short code shown next to a release id, e.g. `R--10.0.1.2`.
    pub fn code(self) -> &'static str {
        match self {
            Self::Released => "R",
            Self::UpgradeTested => "UT",
            Self::SmokeTested => "ST",
            Self::AppQualified => "AQ",
            Self::Built => "B",
            Self::TurnedOver => "TO",
            Self::JunitTested => "JT",
            Self::Unknown => "N",
        }
    }
}

/// One build of a stream as listed by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildEntry {
    pub release_id: String,
    pub code: String,
}

impl BuildEntry {
    pub fn new(release_id: impl Into<String>, maturity: Maturity) -> Self {
        Self {
            release_id: release_id.into(),
            code: maturity.code().to_string(),
        }
    }

    /// Display label used by selectors.
    pub fn label(&self) -> String {
        format!("{}--{}", self.code, self.release_id)
    }
}

/// Object metadata attached to an uploaded artifact. Only `version` is used.
pub type ArtifactMetadata = BTreeMap<String, String>;

/// A single source → destination transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactPlanItem {
    pub application: Application,
    pub stream: String,
    pub build: String,
    pub source_url: String,
    pub destination_bucket: String,
    pub destination_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ArtifactMetadata>,
}

impl ArtifactPlanItem {
    /// `s3://bucket/key` form of the destination.
    pub fn destination_uri(&self) -> String {
        format!("s3://{}/{}", self.destination_bucket, self.destination_key)
    }

    /// Final path segment of the destination key.
    pub fn file_name(&self) -> &str {
        self.destination_key
            .rsplit('/')
            .next()
            .unwrap_or(&self.destination_key)
    }
}

/// Outcome of transferring one [`ArtifactPlanItem`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResult {
    pub source_url: String,
    pub bucket: String,
    pub key: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UploadResult {
    pub fn succeeded(item: &ArtifactPlanItem) -> Self {
        Self {
            source_url: item.source_url.clone(),
            bucket: item.destination_bucket.clone(),
            key: item.destination_key.clone(),
            ok: true,
            error: None,
        }
    }

    pub fn failed(item: &ArtifactPlanItem, error: impl Into<String>) -> Self {
        Self {
            source_url: item.source_url.clone(),
            bucket: item.destination_bucket.clone(),
            key: item.destination_key.clone(),
            ok: false,
            error: Some(error.into()),
        }
    }
}
