use serde::{Deserialize, Serialize};

// https://learn.microsoft.com/en-us/graph/api/resources/drive
#[derive(Debug, Deserialize)]
pub(super) struct Drive {
    pub(super) id: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct Collection<T> {
    #[serde(default = "Vec::new")]
    pub(super) value: Vec<T>,
}

// https://learn.microsoft.com/en-us/graph/api/resources/driveitem
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DriveItem {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub parent_reference: Option<ItemReference>,
    #[serde(default)]
    pub folder: Option<serde_json::Value>,
    #[serde(default)]
    pub file: Option<serde_json::Value>,
}

impl DriveItem {
    pub fn kind(&self) -> &'static str {
        match (&self.folder, &self.file) {
            (Some(_), _) => "Folder",
            (None, Some(_)) => "File",
            (None, None) => "Item",
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ItemReference {
    #[serde(default)]
    pub path: Option<String>,
}

// https://learn.microsoft.com/en-us/graph/api/resources/range
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub(super) struct UsedRange {
    #[serde(default)]
    pub(super) address: Option<String>,
    #[serde(default)]
    pub(super) row_count: Option<u32>,
    #[serde(default)]
    pub(super) text: Option<Vec<Vec<String>>>,
}

#[derive(Debug, Serialize)]
pub(super) struct RangeUpdate<'a> {
    pub(super) values: &'a [Vec<String>],
}
