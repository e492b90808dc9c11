//! Directed compatibility graph between schema versions.

use std::cmp::Ordering;

use indexmap::IndexMap;
use petgraph::algo::astar;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;

use super::{CompatibilityEdge, Relationship, ReleaseStatus, VersionConfig};

/// Outcome of looking up the edge between two versions
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompatibilityReport {
    pub compatible: bool,
    pub relationship: Relationship,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpgradeRecommendation {
    pub version: String,
    pub name: String,
    pub status: ReleaseStatus,
    pub features: Vec<String>,
    pub can_convert: bool,
    pub conversion_path: Vec<String>,
    pub recommended: bool,
}

/// Versions a given version can move to, split by edge kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompatibleVersions {
    pub forward: Vec<String>,
    pub backward: Vec<String>,
}

/// Release features gained, lost and kept between two versions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FeatureComparison {
    pub from: String,
    pub to: String,
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub common: Vec<String>,
}

pub struct VersionCompatibility {
    config: VersionConfig,
    /// Every configured edge, incompatible ones included
    edges: Vec<CompatibilityEdge>,
    /// Traversable edges only
    graph: DiGraph<String, Relationship>,
    nodes: IndexMap<String, NodeIndex>,
}

impl VersionCompatibility {
    pub fn new(config: &VersionConfig) -> Self {
        let mut graph = DiGraph::new();
        let mut nodes: IndexMap<String, NodeIndex> = IndexMap::new();

        for version in &config.supported_versions {
            let idx = graph.add_node(version.clone());
            nodes.insert(version.clone(), idx);
        }

        for edge in &config.compatibility {
            if !edge.relationship.is_traversable() {
                continue;
            }
            let from = *nodes
                .entry(edge.from.clone())
                .or_insert_with(|| graph.add_node(edge.from.clone()));
            let to = *nodes
                .entry(edge.to.clone())
                .or_insert_with(|| graph.add_node(edge.to.clone()));
            graph.add_edge(from, to, edge.relationship);
        }

        Self {
            config: config.clone(),
            edges: config.compatibility.clone(),
            graph,
            nodes,
        }
    }

    /// Configured relationship for the directed pair, if any
    pub fn relationship(&self, from: &str, to: &str) -> Option<Relationship> {
        self.edges
            .iter()
            .find(|e| e.from == from && e.to == to)
            .map(|e| e.relationship)
    }

    pub fn can_convert(&self, from: &str, to: &str) -> bool {
        if from == to {
            return true;
        }
        self.relationship(from, to)
            .is_some_and(Relationship::is_traversable)
    }

    pub fn check_compatibility(&self, v1: &str, v2: &str) -> CompatibilityReport {
        if let Some(rel) = self.relationship(v1, v2) {
            return CompatibilityReport {
                compatible: rel.is_traversable(),
                relationship: rel,
                from: v1.to_string(),
                to: v2.to_string(),
            };
        }

        if let Some(rel) = self.relationship(v2, v1) {
            return CompatibilityReport {
                compatible: rel.is_traversable(),
                relationship: rel,
                from: v2.to_string(),
                to: v1.to_string(),
            };
        }

        CompatibilityReport {
            compatible: false,
            relationship: Relationship::Incompatible,
            from: v1.to_string(),
            to: v2.to_string(),
        }
    }

    /// Empty for equal versions and for unreachable targets.
    pub fn get_conversion_path(&self, from: &str, to: &str) -> Vec<String> {
        if from == to {
            return Vec::new();
        }

        if self.can_convert(from, to) {
            return vec![from.to_string(), to.to_string()];
        }

        let (Some(&start), Some(&goal)) = (self.nodes.get(from), self.nodes.get(to)) else {
            return Vec::new();
        };

        astar(&self.graph, start, |n| n == goal, |_| 1u32, |_| 0u32)
            .map(|(_, path)| {
                path.into_iter()
                    .map(|idx| self.graph[idx].clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Dotted-numeric comparison; missing or non-numeric parts count as 0.
    pub fn compare(v1: &str, v2: &str) -> Ordering {
        let parse = |v: &str| -> Vec<u64> {
            v.split('.')
                .map(|part| part.trim().parse::<u64>().unwrap_or(0))
                .collect()
        };
        let a = parse(v1);
        let b = parse(v2);

        for i in 0..a.len().max(b.len()) {
            let x = a.get(i).copied().unwrap_or(0);
            let y = b.get(i).copied().unwrap_or(0);
            match x.cmp(&y) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
        Ordering::Equal
    }

    /// Supported, or shaped like `X.Y` / `X.Y.Z`
    pub fn is_valid_version(&self, version: &str) -> bool {
        if self.config.is_supported(version) {
            return true;
        }
        let parts: Vec<&str> = version.split('.').collect();
        (2..=3).contains(&parts.len())
            && parts
                .iter()
                .all(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()))
    }

    pub fn latest_version(&self) -> Option<&str> {
        self.config
            .supported_versions
            .iter()
            .max_by(|a, b| Self::compare(a, b))
            .map(String::as_str)
    }

    pub fn compatible_versions(&self, version: &str) -> CompatibleVersions {
        let mut out = CompatibleVersions::default();
        for edge in self.edges.iter().filter(|e| e.from == version) {
            match edge.relationship {
                Relationship::Convertible => out.forward.push(edge.to.clone()),
                Relationship::BackwardCompatible => out.backward.push(edge.to.clone()),
                Relationship::Incompatible => {}
            }
        }
        out
    }

    pub fn is_current(&self, version: &str) -> bool {
        self.config
            .releases
            .get(version)
            .is_some_and(|r| r.status == ReleaseStatus::Current)
    }

    pub fn is_deprecated(&self, version: &str) -> bool {
        self.config
            .releases
            .get(version)
            .is_some_and(|r| r.status == ReleaseStatus::Deprecated)
    }

    /// Empty for versions without release info
    pub fn features(&self, version: &str) -> &[String] {
        self.config
            .releases
            .get(version)
            .map(|r| r.features.as_slice())
            .unwrap_or_default()
    }

    /// Features keep the order they have in their own release.
    pub fn compare_features(&self, from: &str, to: &str) -> FeatureComparison {
        let (old, new) = (self.features(from), self.features(to));
        FeatureComparison {
            from: from.to_string(),
            to: to.to_string(),
            added: new.iter().filter(|f| !old.contains(f)).cloned().collect(),
            removed: old.iter().filter(|f| !new.contains(f)).cloned().collect(),
            common: old.iter().filter(|f| new.contains(f)).cloned().collect(),
        }
    }

    /// Newer supported versions with release info, oldest first
    pub fn upgrade_recommendations(&self, current: &str) -> Vec<UpgradeRecommendation> {
        let mut newer: Vec<&String> = self
            .config
            .supported_versions
            .iter()
            .filter(|v| Self::compare(v, current) == Ordering::Greater)
            .collect();
        newer.sort_by(|a, b| Self::compare(a, b));

        newer
            .into_iter()
            .filter_map(|version| {
                let info = self.config.releases.get(version)?;
                Some(UpgradeRecommendation {
                    version: version.clone(),
                    name: info.name.clone(),
                    status: info.status,
                    features: info.features.clone(),
                    can_convert: self.can_convert(current, version),
                    conversion_path: self.get_conversion_path(current, version),
                    recommended: info.status == ReleaseStatus::Current,
                })
            })
            .collect()
    }

    /// True when the major number increases
    pub fn has_breaking_changes(from: &str, to: &str) -> bool {
        let major = |v: &str| {
            v.split('.')
                .next()
                .and_then(|p| p.trim().parse::<u64>().ok())
                .unwrap_or(0)
        };
        major(to) > major(from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn compat() -> VersionCompatibility {
        VersionCompatibility::new(&VersionConfig::default())
    }

    #[test]
    fn direct_edges_and_identity() {
        let c = compat();
        assert!(c.can_convert("4.2", "4.2"));
        assert!(c.can_convert("3.0", "4.3"));
        assert!(c.can_convert("4.3", "4.2"));
        assert!(!c.can_convert("4.1", "3.0"));
        assert!(!c.can_convert("4.3", "4.1"));
    }

    #[test]
    fn conversion_paths() {
        let c = compat();
        assert!(c.get_conversion_path("4.2", "4.2").is_empty());
        assert_eq!(c.get_conversion_path("4.1", "4.3"), ["4.1", "4.3"]);
        assert_eq!(c.get_conversion_path("4.3", "4.1"), ["4.3", "4.2", "4.1"]);
        assert!(c.get_conversion_path("4.1", "3.0").is_empty());
        assert!(c.get_conversion_path("4.3", "9.9").is_empty());
    }

    #[test]
    fn compatibility_lookup_swaps_direction() {
        let c = compat();

        let r = c.check_compatibility("4.3", "4.1");
        assert!(r.compatible);
        assert_eq!(r.relationship, Relationship::Convertible);
        assert_eq!((r.from.as_str(), r.to.as_str()), ("4.1", "4.3"));

        let r = c.check_compatibility("4.1", "3.0");
        assert!(!r.compatible);
        assert_eq!(r.relationship, Relationship::Incompatible);

        let r = c.check_compatibility("1.0", "2.0");
        assert!(!r.compatible);
    }

    #[test]
    fn compare_is_numeric() {
        assert_eq!(VersionCompatibility::compare("4.10", "4.2"), Ordering::Greater);
        assert_eq!(VersionCompatibility::compare("4", "4.0"), Ordering::Equal);
        assert_eq!(VersionCompatibility::compare("4.x", "4.0"), Ordering::Equal);
        assert_eq!(VersionCompatibility::compare("3.0", "4.1"), Ordering::Less);
    }

    #[test]
    fn release_queries() {
        let c = compat();
        assert!(c.is_current("4.3"));
        assert!(c.is_deprecated("3.0"));
        assert!(!c.is_deprecated("9.0"));
        assert_eq!(c.latest_version(), Some("4.3"));
        assert!(c.is_valid_version("5.0.1"));
        assert!(!c.is_valid_version("v5"));

        let recs = c.upgrade_recommendations("4.1");
        let versions: Vec<_> = recs.iter().map(|r| r.version.as_str()).collect();
        assert_eq!(versions, ["4.2", "4.3"]);
        assert!(recs[1].recommended);

        let cv = c.compatible_versions("4.2");
        assert_eq!(cv.forward, ["4.3"]);
        assert_eq!(cv.backward, ["4.1"]);

        assert!(VersionCompatibility::has_breaking_changes("3.0", "4.1"));
        assert!(!VersionCompatibility::has_breaking_changes("4.1", "4.3"));
    }

    #[test]
    fn feature_sets_per_release() {
        let c = compat();
        assert_eq!(c.features("4.1"), ["Multi-domain", "REF-IDs"]);
        assert!(c.features("9.9").is_empty());

        let diff = c.compare_features("4.2", "4.3");
        assert_eq!(diff.added, ["Documentation integration", "Enhanced indexes"]);
        assert_eq!(diff.removed, ["Language support", "Enhanced navigation"]);
        assert!(diff.common.is_empty());
    }

    #[test]
    fn shared_features_are_common() {
        let mut config = VersionConfig::default();
        if let Some(r) = config.releases.get_mut("4.3") {
            r.features = vec!["REF-IDs".into(), "Enhanced indexes".into()];
        }
        let c = VersionCompatibility::new(&config);

        let diff = c.compare_features("4.1", "4.3");
        assert_eq!(diff.common, ["REF-IDs"]);
        assert_eq!(diff.added, ["Enhanced indexes"]);
        assert_eq!(diff.removed, ["Multi-domain"]);

        let unknown = c.compare_features("4.1", "7.0");
        assert!(unknown.added.is_empty());
        assert_eq!(unknown.removed.len(), 2);
    }

    proptest! {
        #[test]
        fn compare_is_antisymmetric(a in "[0-9]{1,2}(\\.[0-9]{1,2}){0,2}", b in "[0-9]{1,2}(\\.[0-9]{1,2}){0,2}") {
            let ab = VersionCompatibility::compare(&a, &b);
            let ba = VersionCompatibility::compare(&b, &a);
            prop_assert_eq!(ab, ba.reverse());
        }

        #[test]
        fn compare_is_transitive(
            a in "[0-9](\\.[0-9]){0,2}",
            b in "[0-9](\\.[0-9]){0,2}",
            c in "[0-9](\\.[0-9]){0,2}",
        ) {
            use Ordering::*;
            let ab = VersionCompatibility::compare(&a, &b);
            let bc = VersionCompatibility::compare(&b, &c);
            if ab != Greater && bc != Greater {
                prop_assert_ne!(VersionCompatibility::compare(&a, &c), Greater);
            }
        }
    }
}
