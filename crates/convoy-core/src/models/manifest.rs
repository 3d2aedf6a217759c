use std::collections::BTreeMap;

use semver::Version;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub url: String,
    #[serde(default)]
    pub entry: Option<String>,
    #[serde(default)]
    pub yanked: bool,
}

/// Version metadata for a single component. Fetching and decoding are left to
/// callers; the context only caches the decoded value.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct VersionManifest {
    pub description: String,
    #[serde(default)]
    pub modified: Option<String>,
    #[serde(default)]
    pub versions: BTreeMap<String, VersionInfo>,
}

impl VersionManifest {
    /// Highest non-yanked release by semantic version. Keys may carry a
    /// leading `v`; keys that are not versions (such as `nightly`) are never
    /// picked.
    pub fn latest(&self) -> Option<(&str, &VersionInfo)> {
        self.versions
            .iter()
            .filter(|(_, info)| !info.yanked)
            .filter_map(|(key, info)| parse_version(key).map(|version| (version, key, info)))
            .max_by(|(left, ..), (right, ..)| left.cmp(right))
            .map(|(_, key, info)| (key.as_str(), info))
    }

    pub fn contains(&self, version: &str) -> bool {
        self.versions.contains_key(version)
    }
}

fn parse_version(key: &str) -> Option<Version> {
    Version::parse(key.strip_prefix('v').unwrap_or(key)).ok()
}

#[cfg(test)]
mod tests {
    use super::{VersionInfo, VersionManifest};

    #[test]
    fn latest_skips_yanked_versions() {
        let mut manifest = VersionManifest {
            description: "storage node".to_string(),
            ..VersionManifest::default()
        };
        manifest.versions.insert(
            "v4.0.1".to_string(),
            VersionInfo {
                url: "store-v4.0.1.tar.gz".to_string(),
                ..VersionInfo::default()
            },
        );
        manifest.versions.insert(
            "v4.0.2".to_string(),
            VersionInfo {
                url: "store-v4.0.2.tar.gz".to_string(),
                entry: None,
                yanked: true,
            },
        );

        let (version, info) = manifest.latest().expect("expected a usable version");
        assert_eq!(version, "v4.0.1");
        assert_eq!(info.url, "store-v4.0.1.tar.gz");
        assert!(manifest.contains("v4.0.2"));
    }

    #[test]
    fn latest_orders_by_version_not_text() {
        let manifest: VersionManifest = serde_json::from_str(
            r#"{
                "description": "placement driver",
                "versions": {
                    "v4.0.9": {"url": "pd-v4.0.9.tar.gz"},
                    "v4.0.10": {"url": "pd-v4.0.10.tar.gz"},
                    "v4.1.0-rc.1": {"url": "pd-v4.1.0-rc.1.tar.gz", "yanked": true},
                    "nightly": {"url": "pd-nightly.tar.gz"}
                }
            }"#,
        )
        .expect("manifest should decode");

        let (version, info) = manifest.latest().expect("expected a usable version");
        assert_eq!(version, "v4.0.10");
        assert_eq!(info.url, "pd-v4.0.10.tar.gz");
    }

    #[test]
    fn decodes_from_json_with_missing_optional_fields() {
        let manifest: VersionManifest = serde_json::from_str(
            r#"{"description":"placement driver","versions":{"v1.0.0":{"url":"pd.tar.gz"}}}"#,
        )
        .expect("manifest should decode");

        assert_eq!(manifest.modified, None);
        assert_eq!(manifest.latest().map(|(v, _)| v), Some("v1.0.0"));
    }
}
