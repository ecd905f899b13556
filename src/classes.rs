use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use image::Rgb;
use serde::Deserialize;

use crate::errors::{LandCoverError, Result};

pub const UNKNOWN_LABEL: &str = "Unknown";

/// Label and color lookup for every class index the model can emit.
///
/// Built once at startup and shared read-only between requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassTable {
    labels: BTreeMap<u32, String>,
    colors: BTreeMap<u32, Rgb<u8>>,
}

#[derive(Debug, Deserialize)]
struct ClassEntry {
    index: u32,
    label: String,
    color: [u8; 3],
}

impl ClassTable {
    /// Classes of the land-cover UNet.
    pub fn landcover() -> Self {
        Self::from_entries([
            (0, "Background", [0, 0, 0]),
            (1, "Road", [255, 0, 0]),
            (2, "Water", [0, 0, 255]),
            (3, "Woodlands", [0, 255, 0]),
            (4, "Buildings", [255, 255, 0]),
        ])
    }

    fn from_entries<'a, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (u32, &'a str, [u8; 3])>,
    {
        let mut labels = BTreeMap::new();
        let mut colors = BTreeMap::new();
        for (index, label, color) in entries {
            labels.insert(index, label.to_string());
            colors.insert(index, Rgb(color));
        }
        Self { labels, colors }
    }

    /// Loads a table from a JSON array of `{"index", "label", "color"}` objects.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| LandCoverError::FileSystem {
            path: path.to_path_buf(),
            operation: "read class table".to_string(),
            source: e,
        })?;
        Self::from_json_str(&contents)
    }

    pub fn from_json_str(contents: &str) -> Result<Self> {
        let entries: Vec<ClassEntry> = serde_json::from_str(contents)?;
        if entries.is_empty() {
            return Err(LandCoverError::configuration("class table is empty"));
        }

        let mut labels = BTreeMap::new();
        let mut colors = BTreeMap::new();
        for entry in entries {
            if labels.insert(entry.index, entry.label).is_some() {
                return Err(LandCoverError::configuration(format!(
                    "class index {} appears more than once",
                    entry.index
                )));
            }
            colors.insert(entry.index, Rgb(entry.color));
        }
        Ok(Self { labels, colors })
    }

    pub fn label(&self, index: u32) -> &str {
        self.labels
            .get(&index)
            .map_or(UNKNOWN_LABEL, String::as_str)
    }

    pub fn color(&self, index: u32) -> Option<Rgb<u8>> {
        self.colors.get(&index).copied()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Maps each class index to its display label.
    pub fn classify<I>(&self, classes: I) -> BTreeMap<u32, String>
    where
        I: IntoIterator<Item = u32>,
    {
        classes
            .into_iter()
            .map(|index| (index, self.label(index).to_string()))
            .collect()
    }
}
