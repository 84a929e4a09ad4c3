//! Sync categories.
//!
//! Records name one of four record-level categories. The backend groups
//! them into three server-side collections; site settings and devices share
//! `PREFERENCES`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::SyncError;

/// The record-level sync domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Category {
    /// Bookmarks and bookmark folders.
    Bookmark,
    /// Browsing history entries.
    HistorySite,
    /// Per-site preferences.
    SiteSetting,
    /// Devices in the sync chain.
    Device,
}

impl Category {
    /// All record-level categories.
    pub const ALL: [Category; 4] = [
        Category::Bookmark,
        Category::HistorySite,
        Category::SiteSetting,
        Category::Device,
    ];

    /// The wire name of this category.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Bookmark => "bookmark",
            Category::HistorySite => "historySite",
            Category::SiteSetting => "siteSetting",
            Category::Device => "device",
        }
    }

    /// The server-side collection that stores records of this category.
    pub fn server_category(&self) -> ServerCategory {
        match self {
            Category::Bookmark => ServerCategory::Bookmarks,
            Category::HistorySite => ServerCategory::HistorySites,
            Category::SiteSetting | Category::Device => ServerCategory::Preferences,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bookmark" => Ok(Category::Bookmark),
            "historySite" => Ok(Category::HistorySite),
            "siteSetting" => Ok(Category::SiteSetting),
            "device" => Ok(Category::Device),
            other => Err(SyncError::UnknownCategory(other.to_string())),
        }
    }
}

/// A server-side record collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerCategory {
    /// `BOOKMARKS`
    Bookmarks,
    /// `HISTORY_SITES`
    HistorySites,
    /// `PREFERENCES`: site settings and devices.
    Preferences,
}

impl ServerCategory {
    /// All server-side collections.
    pub const ALL: [ServerCategory; 3] = [
        ServerCategory::Bookmarks,
        ServerCategory::HistorySites,
        ServerCategory::Preferences,
    ];

    /// The wire name of this collection.
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerCategory::Bookmarks => "BOOKMARKS",
            ServerCategory::HistorySites => "HISTORY_SITES",
            ServerCategory::Preferences => "PREFERENCES",
        }
    }

    /// Record-level categories stored in this collection.
    pub fn categories(&self) -> &'static [Category] {
        match self {
            ServerCategory::Bookmarks => &[Category::Bookmark],
            ServerCategory::HistorySites => &[Category::HistorySite],
            ServerCategory::Preferences => &[Category::SiteSetting, Category::Device],
        }
    }
}

impl fmt::Display for ServerCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServerCategory {
    type Err = SyncError;

    /// Parses a collection name. Record-level names are accepted too and map
    /// to the collection that stores them.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BOOKMARKS" => Ok(ServerCategory::Bookmarks),
            "HISTORY_SITES" => Ok(ServerCategory::HistorySites),
            "PREFERENCES" => Ok(ServerCategory::Preferences),
            other => other.parse::<Category>().map(|c| c.server_category()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_names_roundtrip() {
        for category in Category::ALL {
            assert_eq!(category.as_str().parse::<Category>().unwrap(), category);
        }
    }

    #[test]
    fn server_category_names_roundtrip() {
        for category in ServerCategory::ALL {
            assert_eq!(
                category.as_str().parse::<ServerCategory>().unwrap(),
                category
            );
        }
    }

    #[test]
    fn preferences_holds_settings_and_devices() {
        assert_eq!(
            Category::SiteSetting.server_category(),
            ServerCategory::Preferences
        );
        assert_eq!(
            Category::Device.server_category(),
            ServerCategory::Preferences
        );
        assert_eq!(ServerCategory::Preferences.categories().len(), 2);
    }

    #[test]
    fn record_level_name_parses_as_server_category() {
        assert_eq!(
            "historySite".parse::<ServerCategory>().unwrap(),
            ServerCategory::HistorySites
        );
    }

    #[test]
    fn unknown_category_rejected() {
        let err = "TABS".parse::<ServerCategory>().unwrap_err();
        assert!(matches!(err, SyncError::UnknownCategory(ref name) if name == "TABS"));
        assert!("bookmarks".parse::<Category>().is_err());
    }

    #[test]
    fn serde_uses_wire_names() {
        assert_eq!(
            serde_json::to_string(&Category::HistorySite).unwrap(),
            "\"historySite\""
        );
        assert_eq!(
            serde_json::to_string(&ServerCategory::HistorySites).unwrap(),
            "\"HISTORY_SITES\""
        );
    }
}
