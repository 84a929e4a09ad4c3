//! Fetch watermark tracking.
//!
//! Each poll asks the backend for records newer than the stored watermark,
//! then moves the watermark to the poll time. The move happens when the
//! request is issued, not when its answer arrives: a response lost in
//! transit is not re-requested on the next poll.

use serde::{Deserialize, Serialize};
use sitesync_types::{Category, FetchRecords, ServerCategory, Watermark};

/// Per-category sync switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryFilter {
    /// Sync bookmarks.
    pub bookmarks: bool,
    /// Sync history.
    pub history: bool,
    /// Sync site settings.
    pub site_settings: bool,
}

impl Default for CategoryFilter {
    fn default() -> Self {
        Self {
            bookmarks: true,
            history: false,
            site_settings: true,
        }
    }
}

impl CategoryFilter {
    /// Whether records of `category` are sent. Devices always are.
    pub fn allows(&self, category: Category) -> bool {
        match category {
            Category::Bookmark => self.bookmarks,
            Category::HistorySite => self.history,
            Category::SiteSetting => self.site_settings,
            Category::Device => true,
        }
    }

    /// Server categories to fetch. `PREFERENCES` is always included since
    /// it carries device records.
    pub fn fetch_categories(&self) -> Vec<ServerCategory> {
        ServerCategory::ALL
            .into_iter()
            .filter(|server| server.categories().iter().any(|c| self.allows(*c)))
            .collect()
    }
}

/// Owns the watermark and issues fetch requests.
#[derive(Debug, Clone)]
pub struct WatermarkTracker {
    watermark: Watermark,
    categories: Vec<ServerCategory>,
}

impl WatermarkTracker {
    /// Resume from a stored watermark.
    pub fn new(stored: Watermark, categories: Vec<ServerCategory>) -> Self {
        Self {
            watermark: stored,
            categories,
        }
    }

    /// Build the fetch request for a poll at `now` and advance to `now`.
    pub fn issue(&mut self, now: Watermark) -> FetchRecords {
        let request = FetchRecords::new(&self.categories, self.watermark);
        self.watermark = now;
        request
    }

    /// The current watermark.
    pub fn current(&self) -> Watermark {
        self.watermark
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_issue_uses_stored_watermark() {
        let mut tracker =
            WatermarkTracker::new(Watermark::new(100), vec![ServerCategory::Bookmarks]);

        let request = tracker.issue(Watermark::new(160));

        assert_eq!(request.since, Watermark::new(100));
        assert_eq!(request.categories, vec!["BOOKMARKS"]);
        assert_eq!(tracker.current(), Watermark::new(160));
    }

    #[test]
    fn watermark_follows_each_issue() {
        let mut tracker = WatermarkTracker::new(Watermark::zero(), ServerCategory::ALL.to_vec());

        for k in 0..4u64 {
            let now = Watermark::new(1_000 + k * 60);
            let request = tracker.issue(now);
            if k > 0 {
                assert_eq!(request.since, Watermark::new(1_000 + (k - 1) * 60));
            }
            assert_eq!(tracker.current(), now);
        }
    }

    #[test]
    fn default_filter_skips_history() {
        let filter = CategoryFilter::default();
        assert!(filter.allows(Category::Bookmark));
        assert!(!filter.allows(Category::HistorySite));
        assert!(filter.allows(Category::Device));
        assert_eq!(
            filter.fetch_categories(),
            vec![ServerCategory::Bookmarks, ServerCategory::Preferences]
        );
    }

    #[test]
    fn preferences_fetched_even_with_everything_off() {
        let filter = CategoryFilter {
            bookmarks: false,
            history: false,
            site_settings: false,
        };
        assert_eq!(filter.fetch_categories(), vec![ServerCategory::Preferences]);
    }
}
