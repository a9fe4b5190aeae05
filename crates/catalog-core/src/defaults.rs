//! Built-in catalog served when neither the remote nor local storage has
//! anything usable.

use chrono::{DateTime, TimeZone, Utc};

use crate::asset::{Asset, AssetType};

const SEED_OWNER: &str = "Catalog Admin";
const SEED_QUALITY: u8 = 82;

fn day(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 11, d, 0, 0, 0)
        .single()
        .unwrap_or_default()
}

fn seed(id: &str, name: &str, asset_type: AssetType, location: &str, modified: u32) -> Asset {
    let mut asset = Asset::new(id, name, asset_type)
        .with_owner(SEED_OWNER)
        .with_modified(day(modified));
    asset.location = Some(location.to_string());
    if !asset_type.is_container() {
        asset.quality = Some(SEED_QUALITY);
    }
    asset
}

/// The seed forest:
///
/// ```text
/// ws1  Workspace 1
/// ├── folder1  Folder 1
/// │   ├── app1       Analytics App 1
/// │   └── pipeline1  Data Pipeline 1
/// └── app2  Analytics App 2
/// ws2  Workspace 2
/// └── kb1  Knowledge Base 1
/// ```
pub fn default_assets() -> Vec<Asset> {
    let business = "Serious Business";
    let personal = "Personal";

    let mut folder1 = seed("folder1", "Folder 1", AssetType::Folder, business, 16).with_parent("ws1");
    folder1.children = vec![
        seed("app1", "Analytics App 1", AssetType::AnalyticsApp, business, 15).with_parent("folder1"),
        seed("pipeline1", "Data Pipeline 1", AssetType::Pipeline, business, 14)
            .with_parent("folder1"),
    ];

    let mut ws1 = seed("ws1", "Workspace 1", AssetType::Workspace, business, 17);
    ws1.children = vec![
        folder1,
        seed("app2", "Analytics App 2", AssetType::AnalyticsApp, business, 13).with_parent("ws1"),
    ];

    let mut ws2 = seed("ws2", "Workspace 2", AssetType::Workspace, personal, 12);
    ws2.children =
        vec![seed("kb1", "Knowledge Base 1", AssetType::KnowledgeBase, personal, 11).with_parent("ws2")];

    vec![ws1, ws2]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::{build_hierarchy, count, find, flatten};

    #[test]
    fn seed_shape() {
        let roots = default_assets();
        assert_eq!(roots.len(), 2);
        assert_eq!(count(&roots), 7);
        assert_eq!(find(&roots, "pipeline1").unwrap().parent_id.as_deref(), Some("folder1"));
        assert_eq!(find(&roots, "kb1").unwrap().quality, Some(82));
        assert_eq!(find(&roots, "ws1").unwrap().quality, None);
    }

    #[test]
    fn seed_is_a_consistent_tree() {
        let roots = default_assets();
        assert_eq!(build_hierarchy(flatten(&roots)), roots);
    }
}
