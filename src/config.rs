//! Configuration of an RR-tree
//!
//! All settings are serializable so a tree setup can be kept next to the
//! data it indexes.

use crate::disk::DiskRepresentation;
use crate::geometry::SpatialData;
use crate::strategy::{
    DeletionsAsInsertionsGroupMaker, DivideByConstantBelowRootStrategy,
    DivideByFanoutBelowRootStrategy, InsertionsOnlyGroupMaker, LargestGroupSplitDeletesStrategy,
    LargestGroupStrategy, OperationGroupMaker, PushDownAllStrategy, PushDownGroupsStrategy,
    RootLevelThresholdStrategy, ThresholdBelowRootStrategy, ThresholdStrategy, TrivialGroupMaker,
};
use serde::de::Error;
use serde::{Deserialize, Serialize};

/// How operations are grouped by child during a group update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupingConfig {
    /// Deletions are copied to every child that may hold their data
    Trivial,
    #[default]
    DeletionsAsInsertions,
    /// Deletions stay buffered until a full emptying
    InsertionsOnly,
}

impl GroupingConfig {
    pub fn build<E: SpatialData>(&self) -> Box<dyn OperationGroupMaker<E>> {
        match self {
            GroupingConfig::Trivial => Box::new(TrivialGroupMaker),
            GroupingConfig::DeletionsAsInsertions => Box::new(DeletionsAsInsertionsGroupMaker),
            GroupingConfig::InsertionsOnly => Box::new(InsertionsOnlyGroupMaker),
        }
    }
}

/// Which operation groups descend during a group update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushDownConfig {
    PushDownAll,
    Threshold {
        threshold: usize,
        #[serde(default)]
        by_insertions: bool,
    },
    RootLevelThreshold {
        threshold: usize,
        #[serde(default)]
        by_insertions: bool,
    },
    LargestGroup {
        #[serde(default)]
        by_insertions: bool,
    },
    /// Largest group at the root, taking split deletions along
    LargestGroupSplitDeletes {
        #[serde(default)]
        by_insertions: bool,
    },
    ThresholdBelowRoot {
        root: Box<PushDownConfig>,
        threshold: usize,
        #[serde(default)]
        by_insertions: bool,
    },
    DivideByFanoutBelowRoot {
        root: Box<PushDownConfig>,
        constant: f64,
        #[serde(default)]
        by_insertions: bool,
    },
    /// Below the root, the threshold is the total size over
    /// `coefficient * (min + max) / 2`
    DivideByConstantBelowRoot {
        root: Box<PushDownConfig>,
        coefficient: f64,
        #[serde(default)]
        by_insertions: bool,
    },
}

impl Default for PushDownConfig {
    fn default() -> Self {
        PushDownConfig::LargestGroup {
            by_insertions: false,
        }
    }
}

impl PushDownConfig {
    pub fn build<E: SpatialData>(&self) -> Box<dyn PushDownGroupsStrategy<E>> {
        match self {
            PushDownConfig::PushDownAll => Box::new(PushDownAllStrategy),
            PushDownConfig::Threshold {
                threshold,
                by_insertions,
            } => Box::new(ThresholdStrategy {
                threshold: *threshold,
                by_insertions: *by_insertions,
            }),
            PushDownConfig::RootLevelThreshold {
                threshold,
                by_insertions,
            } => Box::new(RootLevelThresholdStrategy {
                threshold: *threshold,
                by_insertions: *by_insertions,
            }),
            PushDownConfig::LargestGroup { by_insertions } => Box::new(LargestGroupStrategy {
                by_insertions: *by_insertions,
            }),
            PushDownConfig::LargestGroupSplitDeletes { by_insertions } => {
                Box::new(LargestGroupSplitDeletesStrategy {
                    by_insertions: *by_insertions,
                })
            }
            PushDownConfig::ThresholdBelowRoot {
                root,
                threshold,
                by_insertions,
            } => Box::new(ThresholdBelowRootStrategy {
                root: root.build(),
                threshold: *threshold,
                by_insertions: *by_insertions,
            }),
            PushDownConfig::DivideByFanoutBelowRoot {
                root,
                constant,
                by_insertions,
            } => Box::new(DivideByFanoutBelowRootStrategy {
                root: root.build(),
                constant: *constant,
                by_insertions: *by_insertions,
            }),
            PushDownConfig::DivideByConstantBelowRoot {
                root,
                coefficient,
                by_insertions,
            } => Box::new(DivideByConstantBelowRootStrategy {
                root: root.build(),
                coefficient: *coefficient,
                by_insertions: *by_insertions,
            }),
        }
    }

    fn validate(&self) -> Result<(), String> {
        match self {
            PushDownConfig::ThresholdBelowRoot { root, .. } => root.validate(),
            PushDownConfig::DivideByFanoutBelowRoot { root, constant, .. } => {
                if !constant.is_finite() || *constant <= 0.0 {
                    return Err("Fan-out divisor constant must be finite and positive".to_string());
                }
                root.validate()
            }
            PushDownConfig::DivideByConstantBelowRoot {
                root, coefficient, ..
            } => {
                if !coefficient.is_finite() || *coefficient <= 0.0 {
                    return Err("Capacity coefficient must be finite and positive".to_string());
                }
                root.validate()
            }
            _ => Ok(()),
        }
    }
}

/// Configuration for [`RRTree`](crate::RRTree)
///
/// # Examples
///
/// ```
/// use rrtree::{DiskRepresentation, RRTreeConfig};
///
/// let config = RRTreeConfig::default()
///     .with_node_capacity(4, 16)
///     .with_max_buffer_size(64)
///     .with_representation(DiskRepresentation::Physical);
/// assert!(config.validate().is_ok());
///
/// let json = r#"{
///     "max_node_capacity": 8,
///     "min_node_capacity": 3,
///     "push_down": { "type": "threshold", "threshold": 10 }
/// }"#;
/// let config = RRTreeConfig::from_json(json).unwrap();
/// assert_eq!(config.max_buffer_size, 256);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RRTreeConfig {
    /// Minimum number of entries of every non-root node
    #[serde(default = "RRTreeConfig::default_min_node_capacity")]
    pub min_node_capacity: usize,

    /// Maximum number of entries of every node
    #[serde(default = "RRTreeConfig::default_max_node_capacity")]
    pub max_node_capacity: usize,

    /// Number of buffered operations that triggers an emptying
    #[serde(default = "RRTreeConfig::default_max_buffer_size")]
    pub max_buffer_size: usize,

    #[serde(default)]
    pub representation: DiskRepresentation,

    #[serde(default)]
    pub grouping: GroupingConfig,

    #[serde(default)]
    pub push_down: PushDownConfig,

    /// Pull nearby buffered operations into groups descending to a child
    #[serde(default = "RRTreeConfig::default_enabled")]
    pub index_piggybacking: bool,

    /// Pull nearby buffered operations into updated leaves
    #[serde(default = "RRTreeConfig::default_enabled")]
    pub leaf_piggybacking: bool,

    /// Pull buffered operations into leaves visited by queries
    #[serde(default = "RRTreeConfig::default_enabled")]
    pub query_piggybacking: bool,

    /// Relative growth of piggybacking areas (0 keeps them tight)
    #[serde(default)]
    pub piggyback_epsilon: f64,

    /// Index nodes kept resident while garbage collecting
    #[serde(default = "RRTreeConfig::default_gc_index_cache_size")]
    pub gc_index_cache_size: usize,
}

impl RRTreeConfig {
    const fn default_min_node_capacity() -> usize {
        12
    }

    const fn default_max_node_capacity() -> usize {
        32
    }

    const fn default_max_buffer_size() -> usize {
        256
    }

    const fn default_enabled() -> bool {
        true
    }

    const fn default_gc_index_cache_size() -> usize {
        16
    }

    pub fn with_node_capacity(mut self, min: usize, max: usize) -> Self {
        self.min_node_capacity = min;
        self.max_node_capacity = max;
        self
    }

    pub fn with_max_buffer_size(mut self, size: usize) -> Self {
        self.max_buffer_size = size;
        self
    }

    pub fn with_representation(mut self, representation: DiskRepresentation) -> Self {
        self.representation = representation;
        self
    }

    pub fn with_grouping(mut self, grouping: GroupingConfig) -> Self {
        self.grouping = grouping;
        self
    }

    pub fn with_push_down(mut self, push_down: PushDownConfig) -> Self {
        self.push_down = push_down;
        self
    }

    /// Toggle index, leaf and query piggybacking together.
    pub fn with_piggybacking(mut self, enabled: bool) -> Self {
        self.index_piggybacking = enabled;
        self.leaf_piggybacking = enabled;
        self.query_piggybacking = enabled;
        self
    }

    pub fn with_piggyback_epsilon(mut self, epsilon: f64) -> Self {
        self.piggyback_epsilon = epsilon;
        self
    }

    pub fn with_gc_index_cache_size(mut self, size: usize) -> Self {
        self.gc_index_cache_size = size;
        self
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.min_node_capacity < 2 {
            return Err("Minimum node capacity must be at least 2".to_string());
        }
        if self.min_node_capacity * 2 > self.max_node_capacity {
            return Err(format!(
                "Minimum node capacity {} exceeds half the maximum {}",
                self.min_node_capacity, self.max_node_capacity
            ));
        }
        if self.max_buffer_size == 0 {
            return Err("Buffer size must be greater than zero".to_string());
        }
        if !self.piggyback_epsilon.is_finite() || self.piggyback_epsilon < 0.0 {
            return Err("Piggybacking epsilon must be finite and non-negative".to_string());
        }
        if self.gc_index_cache_size == 0 {
            return Err("GC index cache size must be greater than zero".to_string());
        }
        self.push_down.validate()
    }

    /// Load configuration from JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let config: RRTreeConfig = serde_json::from_str(json)?;
        if let Err(e) = config.validate() {
            return Err(Error::custom(e));
        }
        Ok(config)
    }

    /// Save configuration as JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Load configuration from TOML string (requires toml feature)
    #[cfg(feature = "toml")]
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        let config: RRTreeConfig = toml::from_str(toml_str)?;
        if let Err(e) = config.validate() {
            return Err(toml::de::Error::custom(e));
        }
        Ok(config)
    }

    /// Save configuration as TOML string (requires toml feature)
    #[cfg(feature = "toml")]
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

impl Default for RRTreeConfig {
    fn default() -> Self {
        Self {
            min_node_capacity: Self::default_min_node_capacity(),
            max_node_capacity: Self::default_max_node_capacity(),
            max_buffer_size: Self::default_max_buffer_size(),
            representation: DiskRepresentation::default(),
            grouping: GroupingConfig::default(),
            push_down: PushDownConfig::default(),
            index_piggybacking: true,
            leaf_piggybacking: true,
            query_piggybacking: true,
            piggyback_epsilon: 0.0,
            gc_index_cache_size: Self::default_gc_index_cache_size(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = RRTreeConfig::default();
        assert_eq!(config.max_node_capacity, 32);
        assert_eq!(config.min_node_capacity, 12);
        assert_eq!(config.max_buffer_size, 256);
        assert_eq!(config.representation, DiskRepresentation::Tombstones);
        assert_eq!(config.grouping, GroupingConfig::DeletionsAsInsertions);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = RRTreeConfig::default().with_node_capacity(5, 8);
        assert!(config.validate().is_err());

        config = RRTreeConfig::default().with_node_capacity(1, 8);
        assert!(config.validate().is_err());

        config = RRTreeConfig::default().with_node_capacity(4, 8);
        assert!(config.validate().is_ok());

        config.max_buffer_size = 0;
        assert!(config.validate().is_err());

        config.max_buffer_size = 10;
        config.piggyback_epsilon = f64::NAN;
        assert!(config.validate().is_err());

        config.piggyback_epsilon = -0.5;
        assert!(config.validate().is_err());

        config.piggyback_epsilon = 0.25;
        config.gc_index_cache_size = 0;
        assert!(config.validate().is_err());

        config.gc_index_cache_size = 1;
        config.push_down = PushDownConfig::DivideByFanoutBelowRoot {
            root: Box::new(PushDownConfig::PushDownAll),
            constant: f64::INFINITY,
            by_insertions: false,
        };
        assert!(config.validate().is_err());

        config.push_down = PushDownConfig::DivideByConstantBelowRoot {
            root: Box::new(PushDownConfig::LargestGroupSplitDeletes {
                by_insertions: false,
            }),
            coefficient: 0.0,
            by_insertions: false,
        };
        assert!(config.validate().is_err());

        config.push_down = PushDownConfig::DivideByConstantBelowRoot {
            root: Box::new(PushDownConfig::LargestGroupSplitDeletes {
                by_insertions: false,
            }),
            coefficient: 5.0 / 7.0,
            by_insertions: false,
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = RRTreeConfig::default()
            .with_node_capacity(3, 8)
            .with_max_buffer_size(40)
            .with_grouping(GroupingConfig::Trivial)
            .with_push_down(PushDownConfig::ThresholdBelowRoot {
                root: Box::new(PushDownConfig::LargestGroup {
                    by_insertions: true,
                }),
                threshold: 7,
                by_insertions: false,
            })
            .with_piggybacking(false)
            .with_piggyback_epsilon(0.1);

        let json = config.to_json().unwrap();
        let deserialized = RRTreeConfig::from_json(&json).unwrap();
        assert_eq!(deserialized, config);
    }

    #[test]
    fn test_config_from_partial_json() {
        let json = r#"{ "representation": "physical", "grouping": "insertions_only" }"#;
        let config = RRTreeConfig::from_json(json).unwrap();
        assert_eq!(config.representation, DiskRepresentation::Physical);
        assert_eq!(config.grouping, GroupingConfig::InsertionsOnly);
        assert!(config.leaf_piggybacking);

        let invalid = r#"{ "min_node_capacity": 20 }"#;
        assert!(RRTreeConfig::from_json(invalid).is_err());
    }

    #[test]
    fn test_nested_push_down_from_json() {
        let json = r#"{
            "push_down": {
                "type": "divide_by_constant_below_root",
                "root": { "type": "largest_group_split_deletes" },
                "coefficient": 1.0
            }
        }"#;
        let config = RRTreeConfig::from_json(json).unwrap();
        assert_eq!(
            config.push_down,
            PushDownConfig::DivideByConstantBelowRoot {
                root: Box::new(PushDownConfig::LargestGroupSplitDeletes {
                    by_insertions: false
                }),
                coefficient: 1.0,
                by_insertions: false,
            }
        );
    }

    #[cfg(feature = "toml")]
    #[test]
    fn test_config_toml() {
        let toml_str = r#"
            max_node_capacity = 10
            min_node_capacity = 4

            [push_down]
            type = "threshold"
            threshold = 6
        "#;
        let config = RRTreeConfig::from_toml(toml_str).unwrap();
        assert_eq!(
            config.push_down,
            PushDownConfig::Threshold {
                threshold: 6,
                by_insertions: false
            }
        );
        let round_trip = RRTreeConfig::from_toml(&config.to_toml().unwrap()).unwrap();
        assert_eq!(round_trip, config);
    }
}
