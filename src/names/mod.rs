//! Control name database.
//!
//! Maps Linux input event codes to human-readable names for keys/buttons
//! and axes, with aliases and per-axis raw ranges. The core compiler only
//! carries codes; this database is the external collaborator it consults
//! for diagnostics, document serialization, and axis bounds.

use crate::constants::DEFAULT_AXIS_RANGE;
use crate::models::{Control, ControlKind};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One key/button entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEntry {
    /// Event code (KEY_*/BTN_* value).
    pub code: i32,
    /// Canonical name (e.g. "`BTN_TRIGGER`").
    pub name: String,
    /// Alternative names accepted in documents.
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// One absolute-axis entry with its raw range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisEntry {
    /// Event code (ABS_* value).
    pub code: i32,
    /// Canonical name (e.g. "`ABS_X`").
    pub name: String,
    /// Alternative names accepted in documents.
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Raw minimum.
    pub min: i32,
    /// Raw maximum.
    pub max: i32,
}

/// Database schema from names.json.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct NameDatabase {
    version: String,
    keys: Vec<KeyEntry>,
    axes: Vec<AxisEntry>,
}

/// Name/code lookup for keys and axes, loaded from the embedded database.
#[derive(Debug, Clone)]
pub struct NameDb {
    keys: Vec<KeyEntry>,
    axes: Vec<AxisEntry>,
    key_by_name: HashMap<String, usize>,
    key_by_code: HashMap<i32, usize>,
    axis_by_name: HashMap<String, usize>,
    axis_by_code: HashMap<i32, usize>,
}

impl NameDb {
    /// Loads the embedded name database.
    pub fn load() -> Result<Self> {
        let json_data = include_str!("names.json");
        let db: NameDatabase =
            serde_json::from_str(json_data).context("Failed to parse embedded names.json")?;

        let mut key_by_name = HashMap::new();
        let mut key_by_code = HashMap::new();
        for (index, entry) in db.keys.iter().enumerate() {
            key_by_name.insert(entry.name.clone(), index);
            for alias in &entry.aliases {
                key_by_name.insert(alias.clone(), index);
            }
            key_by_code.insert(entry.code, index);
        }

        let mut axis_by_name = HashMap::new();
        let mut axis_by_code = HashMap::new();
        for (index, entry) in db.axes.iter().enumerate() {
            axis_by_name.insert(entry.name.clone(), index);
            for alias in &entry.aliases {
                axis_by_name.insert(alias.clone(), index);
            }
            axis_by_code.insert(entry.code, index);
        }

        Ok(Self {
            keys: db.keys,
            axes: db.axes,
            key_by_name,
            key_by_code,
            axis_by_name,
            axis_by_code,
        })
    }

    /// All key entries, in database order.
    #[must_use]
    pub fn keys(&self) -> &[KeyEntry] {
        &self.keys
    }

    /// All axis entries, in database order.
    #[must_use]
    pub fn axes(&self) -> &[AxisEntry] {
        &self.axes
    }

    /// Resolves a key/button name or alias to its code.
    #[must_use]
    pub fn key_code(&self, name: &str) -> Option<i32> {
        self.key_by_name.get(name).map(|&idx| self.keys[idx].code)
    }

    /// Resolves an axis name or alias to its code.
    #[must_use]
    pub fn axis_code(&self, name: &str) -> Option<i32> {
        self.axis_by_name.get(name).map(|&idx| self.axes[idx].code)
    }

    /// The display name of a raw control, when known.
    #[must_use]
    pub fn name_for(&self, control: Control) -> Option<&str> {
        match control.kind {
            ControlKind::Key => self
                .key_by_code
                .get(&control.code)
                .map(|&idx| self.keys[idx].name.as_str()),
            ControlKind::Axis => self
                .axis_by_code
                .get(&control.code)
                .map(|&idx| self.axes[idx].name.as_str()),
            ControlKind::Virtual => None,
        }
    }

    /// The raw value bounds for a control: {0, 1} for keys, the database
    /// range (or the conventional default) for axes.
    ///
    /// Virtual control bounds depend on the declared state count and are
    /// not answered here.
    #[must_use]
    pub fn bounds_for(&self, control: Control) -> Option<(i32, i32)> {
        match control.kind {
            ControlKind::Key => Some((0, 1)),
            ControlKind::Axis => Some(
                self.axis_by_code
                    .get(&control.code)
                    .map_or(DEFAULT_AXIS_RANGE, |&idx| {
                        (self.axes[idx].min, self.axes[idx].max)
                    }),
            ),
            ControlKind::Virtual => None,
        }
    }

    /// Case-insensitive substring search over names and aliases.
    #[must_use]
    pub fn search(&self, query: &str) -> Vec<(ControlKind, i32, &str)> {
        let query = query.to_lowercase();
        let mut results = Vec::new();
        for entry in &self.keys {
            if entry.name.to_lowercase().contains(&query)
                || entry.aliases.iter().any(|a| a.to_lowercase().contains(&query))
            {
                results.push((ControlKind::Key, entry.code, entry.name.as_str()));
            }
        }
        for entry in &self.axes {
            if entry.name.to_lowercase().contains(&query)
                || entry.aliases.iter().any(|a| a.to_lowercase().contains(&query))
            {
                results.push((ControlKind::Axis, entry.code, entry.name.as_str()));
            }
        }
        results
    }
}
