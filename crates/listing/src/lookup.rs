use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{collaborators::LookupSource, error::ListingError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupCategory {
    Categories,
    Brands,
    Warehouses,
    Customers,
}

impl LookupCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Categories => "categories",
            Self::Brands => "brands",
            Self::Warehouses => "warehouses",
            Self::Customers => "customers",
        }
    }
}

/// Id to display name tables for select inputs, loaded once per mount.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct LookupCache {
    lists: BTreeMap<LookupCategory, BTreeMap<i64, String>>,
}

impl LookupCache {
    pub async fn load(
        source: &dyn LookupSource,
        categories: &[LookupCategory],
    ) -> Result<Self, ListingError> {
        let mut lists = BTreeMap::new();
        for category in categories {
            let entries = source.lookup(*category).await.map_err(|source| {
                ListingError::persistence(format!("failed to load {} list", category.as_str()), source)
            })?;
            lists.insert(*category, entries);
        }
        Ok(Self { lists })
    }

    pub fn list(&self, category: LookupCategory) -> Option<&BTreeMap<i64, String>> {
        self.lists.get(&category)
    }

    pub fn display_name(&self, category: LookupCategory, id: i64) -> Option<&str> {
        self.lists.get(&category)?.get(&id).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }
}
