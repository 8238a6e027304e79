use crate::graph::types::DriveItem;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResolvedVia {
    DirectPath,
    Search,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedFile {
    pub item_id: String,
    /// Configured path for direct hits, search-reported path otherwise
    pub path: String,
    pub via: ResolvedVia,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum FileResolution {
    #[default]
    Unresolved,
    Resolved(ResolvedFile),
    /// A later operation reported the item missing; resolve again on next use
    Stale(ResolvedFile),
}

/// Configured workbook location plus its lazily resolved drive item
#[derive(Debug, Clone)]
pub struct DriveFileReference {
    pub configured_path: String,
    state: FileResolution,
}

impl DriveFileReference {
    pub fn new(configured_path: impl Into<String>) -> Self {
        Self {
            configured_path: configured_path.into(),
            state: FileResolution::Unresolved,
        }
    }

    pub fn state(&self) -> &FileResolution {
        &self.state
    }

    pub fn resolved(&self) -> Option<&ResolvedFile> {
        match &self.state {
            FileResolution::Resolved(file) => Some(file),
            _ => None,
        }
    }

    pub fn set_resolved(&mut self, file: ResolvedFile) {
        self.state = FileResolution::Resolved(file);
    }

    pub fn set_unresolved(&mut self) {
        self.state = FileResolution::Unresolved;
    }

    /// Mark the resolution stale if it still points at `item_id`.
    /// Returns whether the state changed.
    pub fn invalidate(&mut self, item_id: &str) -> bool {
        match &self.state {
            FileResolution::Resolved(file) if file.item_id == item_id => {
                self.state = FileResolution::Stale(file.clone());
                true
            }
            _ => false,
        }
    }

    /// Path relative to the drive root, with `\` separators normalised
    pub fn graph_path(&self) -> Option<String> {
        let path = self.configured_path.replace('\\', "/");
        let trimmed = path.trim_start_matches('/');
        match trimmed.is_empty() {
            true => None,
            false => Some(trimmed.to_string()),
        }
    }
}

/// First item whose name equals `filename` ignoring case
pub fn pick_exact_match(items: &[DriveItem], filename: &str) -> Option<ResolvedFile> {
    let wanted = filename.to_lowercase();
    items
        .iter()
        .find(|item| item.name.to_lowercase() == wanted)
        .map(|item| ResolvedFile {
            item_id: item.id.clone(),
            path: search_reported_path(item),
            via: ResolvedVia::Search,
        })
}

fn search_reported_path(item: &DriveItem) -> String {
    let parent = item
        .parent_reference
        .as_ref()
        .and_then(|r| r.path.as_deref())
        .unwrap_or("UnknownPath");
    let full = format!("{}/{}", parent, item.name);
    match full.strip_prefix("/drive/root:") {
        Some(stripped) => stripped.to_string(),
        None => full,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::types::ItemReference;

    fn item(id: &str, name: &str, parent: Option<&str>) -> DriveItem {
        DriveItem {
            id: id.to_string(),
            name: name.to_string(),
            parent_reference: Some(ItemReference {
                path: parent.map(str::to_string),
            }),
            folder: None,
            file: Some(serde_json::json!({})),
        }
    }

    #[test]
    fn test_exact_match_ignores_case_and_partial_hits() {
        let items = vec![
            item("1", "Deals backup.xlsx", Some("/drive/root:/Archive")),
            item("2", "DEALS.XLSX", Some("/drive/root:/Sales")),
            item("3", "Deals.xlsx", Some("/drive/root:/Other")),
        ];

        let found = pick_exact_match(&items, "deals.xlsx").unwrap();
        assert_eq!(
            found,
            ResolvedFile {
                item_id: "2".to_string(),
                path: "/Sales/DEALS.XLSX".to_string(),
                via: ResolvedVia::Search,
            }
        );
    }

    #[test]
    fn test_no_exact_match() {
        let items = vec![item("1", "Deals 2024.xlsx", None)];
        assert_eq!(pick_exact_match(&items, "Deals.xlsx"), None);
        assert_eq!(pick_exact_match(&[], "Deals.xlsx"), None);
    }

    #[test]
    fn test_reported_path_without_drive_prefix() {
        let found = pick_exact_match(&[item("1", "Deals.xlsx", None)], "Deals.xlsx").unwrap();
        assert_eq!(found.path, "UnknownPath/Deals.xlsx");
    }

    #[test]
    fn test_invalidate_only_matching_item() {
        let mut reference = DriveFileReference::new("/Sales/Deals.xlsx");
        let file = ResolvedFile {
            item_id: "item-1".to_string(),
            path: "/Sales/Deals.xlsx".to_string(),
            via: ResolvedVia::DirectPath,
        };
        reference.set_resolved(file.clone());
        assert_eq!(reference.resolved().map(|f| f.item_id.as_str()), Some("item-1"));

        assert!(!reference.invalidate("item-2"));
        assert_eq!(reference.resolved(), Some(&file));

        assert!(reference.invalidate("item-1"));
        assert_eq!(reference.state(), &FileResolution::Stale(file));
        assert_eq!(reference.resolved(), None);
    }

    #[test]
    fn test_graph_path() {
        assert_eq!(
            DriveFileReference::new("/Sales/Deals.xlsx").graph_path().as_deref(),
            Some("Sales/Deals.xlsx")
        );
        assert_eq!(
            DriveFileReference::new(r"\Sales\Deals.xlsx").graph_path().as_deref(),
            Some("Sales/Deals.xlsx")
        );
        assert_eq!(DriveFileReference::new("/").graph_path(), None);
    }
}
