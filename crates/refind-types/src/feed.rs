use crate::api::ItemResponse;
use crate::models::{Category, ItemType};

/// Client-facing feed filter: free-text search OR-ed across title,
/// description and location, AND-ed with an exact category match.
/// `category: None` is the "All Categories" pass-through.
///
/// Pure and synchronous — recomputed on every keystroke over the full
/// in-memory item set, which is hundreds of rows at campus scale.
#[derive(Debug, Clone, Default)]
pub struct FeedFilter {
    pub query: String,
    pub category: Option<Category>,
    pub item_type: Option<ItemType>,
}

impl FeedFilter {
    pub fn matches(&self, item: &ItemResponse) -> bool {
        if let Some(category) = self.category {
            if item.category != category {
                return false;
            }
        }

        if let Some(item_type) = self.item_type {
            if item.item_type != item_type {
                return false;
            }
        }

        let needle = self.query.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }

        item.title.to_lowercase().contains(&needle)
            || item.description.to_lowercase().contains(&needle)
            || item.location.to_lowercase().contains(&needle)
    }

    pub fn apply(&self, items: Vec<ItemResponse>) -> Vec<ItemResponse> {
        items.into_iter().filter(|item| self.matches(item)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ItemStatus;
    use uuid::Uuid;

    fn hydro_flask() -> ItemResponse {
        ItemResponse {
            id: Uuid::new_v4(),
            title: "Blue Hydro Flask".to_string(),
            description: "32oz, blue with stickers. Lost near the library.".to_string(),
            category: Category::Accessories,
            location: "Library".to_string(),
            latitude: None,
            longitude: None,
            date_lost_found: chrono::NaiveDate::from_ymd_opt(2023, 10, 25).unwrap(),
            image_url: None,
            item_type: ItemType::Lost,
            status: ItemStatus::Active,
            user_id: Uuid::new_v4(),
            created_at: chrono::Utc::now(),
            owner: None,
        }
    }

    #[test]
    fn query_matches_any_category() {
        let filter = FeedFilter {
            query: "hydro".to_string(),
            ..Default::default()
        };
        assert!(filter.matches(&hydro_flask()));
    }

    #[test]
    fn query_with_wrong_category_excludes() {
        let filter = FeedFilter {
            query: "hydro".to_string(),
            category: Some(Category::Books),
            ..Default::default()
        };
        assert!(!filter.matches(&hydro_flask()));
    }

    #[test]
    fn empty_query_with_matching_category_includes() {
        let filter = FeedFilter {
            query: String::new(),
            category: Some(Category::Accessories),
            ..Default::default()
        };
        assert!(filter.matches(&hydro_flask()));
    }

    #[test]
    fn search_is_case_insensitive_across_fields() {
        let location = FeedFilter {
            query: "LIBRARY".to_string(),
            ..Default::default()
        };
        assert!(location.matches(&hydro_flask()));

        let description = FeedFilter {
            query: "Stickers".to_string(),
            ..Default::default()
        };
        assert!(description.matches(&hydro_flask()));
    }

    #[test]
    fn type_filter_splits_lost_and_found() {
        let found_only = FeedFilter {
            item_type: Some(ItemType::Found),
            ..Default::default()
        };
        assert!(!found_only.matches(&hydro_flask()));
    }
}
