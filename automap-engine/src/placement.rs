//! Device placement heuristic.
//!
//! Devices are laid out on a grid: `groupx` follows the device's function
//! (switch, router, ...) and `groupy` its location, both read from the device
//! name. Names like `sw12-core` give function `sw` and location `12`.

use std::collections::{BTreeMap, HashMap};

use automap_types::{Node, UNDETERMINED_GROUP};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::EngineError;

/// Column for devices whose function is not recognized.
pub const UNKNOWN_GROUPX: u32 = 7;

/// Placement configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementSettings {
    /// Pattern with two capture groups: function, then location.
    /// Matched case-insensitively.
    pub device_pattern: String,

    /// Pattern for synthetic fabric devices. The first capture is the stage.
    pub synthetic_pattern: String,

    /// Function prefix to column.
    pub functions: BTreeMap<String, u32>,
}

impl Default for PlacementSettings {
    fn default() -> Self {
        Self {
            device_pattern: "^([a-z]{2})([0-9]+).*".to_string(),
            synthetic_pattern: "^fake_device_stage([0-9]+)_([0-9]+)$".to_string(),
            functions: BTreeMap::from([("sw".to_string(), 1), ("rtr".to_string(), 2)]),
        }
    }
}

/// Compiled placement patterns.
#[derive(Debug, Clone)]
pub struct PlacementRules {
    device: Regex,
    synthetic: Regex,
    functions: BTreeMap<String, u32>,
}

impl PlacementRules {
    pub fn compile(settings: &PlacementSettings) -> Result<Self, EngineError> {
        Ok(Self {
            device: RegexBuilder::new(&settings.device_pattern)
                .case_insensitive(true)
                .build()?,
            synthetic: RegexBuilder::new(&settings.synthetic_pattern)
                .case_insensitive(true)
                .build()?,
            functions: settings
                .functions
                .iter()
                .map(|(k, v)| (k.to_lowercase(), *v))
                .collect(),
        })
    }

    /// Start a registry for one graph build.
    pub fn registry(&self) -> GroupingRegistry<'_> {
        GroupingRegistry {
            rules: self,
            locations: HashMap::new(),
            next_location: 1,
        }
    }
}

/// Whether a stored node should go through the heuristic.
pub fn needs_placement(node: &Node) -> bool {
    node.groupx == 0 || node.groupy == 0 || node.has_undetermined_placement()
}

/// Location slots handed out during one graph build.
///
/// Slots are assigned from 1 upward in the order locations are first seen.
#[derive(Debug)]
pub struct GroupingRegistry<'a> {
    rules: &'a PlacementRules,
    locations: HashMap<String, u32>,
    next_location: u32,
}

impl GroupingRegistry<'_> {
    /// Deduce `(groupx, groupy)` for a device name.
    pub fn deduce_grouping(&mut self, device_name: &str) -> (u32, u32) {
        let Some(caps) = self.rules.device.captures(device_name) else {
            return self.synthetic_grouping(device_name);
        };
        let function = caps.get(1).map(|m| m.as_str().to_lowercase());
        let location = caps.get(2).map(|m| m.as_str().to_string());
        let (Some(function), Some(location)) = (function, location) else {
            return (UNKNOWN_GROUPX, 1);
        };

        let Some(&groupx) = self.rules.functions.get(&function) else {
            return (UNKNOWN_GROUPX, 1);
        };

        let next = &mut self.next_location;
        let groupy = *self.locations.entry(location).or_insert_with(|| {
            let slot = *next;
            *next += 1;
            slot
        });
        (groupx, groupy)
    }

    fn synthetic_grouping(&self, device_name: &str) -> (u32, u32) {
        self.rules
            .synthetic
            .captures(device_name)
            .and_then(|caps| caps.get(1))
            .and_then(|stage| stage.as_str().parse::<u32>().ok())
            .map(|stage| (stage, 1))
            .unwrap_or((UNKNOWN_GROUPX, 1))
    }

    /// Coordinates for a node: stored ones, or deduced when undetermined.
    pub fn place(&mut self, node: &Node) -> (u32, u32) {
        if needs_placement(node) {
            self.deduce_grouping(&node.device_name)
        } else {
            (node.groupx, node.groupy)
        }
    }
}
