use serde::{Deserialize, Serialize};
use url::form_urlencoded;

pub const DEFAULT_SORT_FIELD: &str = "id";

const SEARCH_KEY: &str = "search";
const SORT_BY_KEY: &str = "sortBy";
const SORT_DIRECTION_KEY: &str = "sortDirection";
const PAGE_KEY: &str = "page";
const PER_PAGE_KEY: &str = "perPage";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }

    pub fn flipped(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        if raw.eq_ignore_ascii_case("asc") {
            Some(Self::Asc)
        } else if raw.eq_ignore_ascii_case("desc") {
            Some(Self::Desc)
        } else {
            None
        }
    }
}

/// Search, sort and pagination state of one index screen.
///
/// Fields are private so that `sort_field` stays inside the entity's
/// orderable set and `page_size`/`current_page` stay positive; mutation goes
/// through [`crate::ListQueryController`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListQueryState {
    search: String,
    sort_field: String,
    sort_direction: SortDirection,
    page_size: u32,
    current_page: u32,
}

impl ListQueryState {
    pub fn new(default_page_size: u32) -> Self {
        Self {
            search: String::new(),
            sort_field: DEFAULT_SORT_FIELD.to_string(),
            sort_direction: SortDirection::Desc,
            page_size: default_page_size.max(1),
            current_page: 1,
        }
    }

    pub fn search(&self) -> &str {
        &self.search
    }

    pub fn sort_field(&self) -> &str {
        &self.sort_field
    }

    pub fn sort_direction(&self) -> SortDirection {
        self.sort_direction
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    pub(crate) fn set_search(&mut self, search: String) {
        self.search = search;
        self.current_page = 1;
    }

    pub(crate) fn set_page_size(&mut self, page_size: u32) {
        debug_assert!(page_size > 0);
        self.page_size = page_size;
        self.current_page = 1;
    }

    pub(crate) fn set_sort(&mut self, field: &str, direction: SortDirection) {
        self.sort_field = field.to_string();
        self.sort_direction = direction;
    }

    pub(crate) fn set_page(&mut self, page: u32) {
        self.current_page = page.max(1);
    }

    /// Encodes the state as query parameters, leaving out values that equal
    /// their defaults.
    pub fn to_query_string(&self, default_page_size: u32) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        if !self.search.is_empty() {
            serializer.append_pair(SEARCH_KEY, &self.search);
        }
        if self.sort_field != DEFAULT_SORT_FIELD {
            serializer.append_pair(SORT_BY_KEY, &self.sort_field);
        }
        if self.sort_direction != SortDirection::Desc {
            serializer.append_pair(SORT_DIRECTION_KEY, self.sort_direction.as_str());
        }
        if self.current_page != 1 {
            serializer.append_pair(PAGE_KEY, &self.current_page.to_string());
        }
        if self.page_size != default_page_size {
            serializer.append_pair(PER_PAGE_KEY, &self.page_size.to_string());
        }
        serializer.finish()
    }

    /// Decodes query parameters. Unknown keys are ignored. Values that
    /// would break an invariant (unorderable sort field, zero page size)
    /// fall back to the defaults.
    pub fn from_query_string(raw: &str, orderable: &[&str], default_page_size: u32) -> Self {
        let mut state = Self::new(default_page_size);
        let raw = raw.strip_prefix('?').unwrap_or(raw);
        for (key, value) in form_urlencoded::parse(raw.as_bytes()) {
            match key.as_ref() {
                SEARCH_KEY => state.search = value.into_owned(),
                SORT_BY_KEY => {
                    if orderable.contains(&value.as_ref()) {
                        state.sort_field = value.into_owned();
                    }
                }
                SORT_DIRECTION_KEY => {
                    if let Some(direction) = SortDirection::parse(&value) {
                        state.sort_direction = direction;
                    }
                }
                PAGE_KEY => {
                    if let Ok(page) = value.parse::<u32>() {
                        state.current_page = page.max(1);
                    }
                }
                PER_PAGE_KEY => {
                    if let Ok(page_size) = value.parse::<u32>() {
                        if page_size > 0 {
                            state.page_size = page_size;
                        }
                    }
                }
                _ => {}
            }
        }
        state
    }
}

/// Filter and ordering handed to a [`crate::Repository`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    /// `None` means no filter; an empty search never reaches the store.
    pub search: Option<String>,
    pub sort_field: String,
    pub sort_direction: SortDirection,
    /// Equality constraint on the entity's scope column, e.g. the sale of a
    /// payments list.
    pub scope: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.page_size)
    }

    pub fn limit(&self) -> u64 {
        u64::from(self.page_size)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PagedResult<E> {
    pub items: Vec<E>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

impl<E> PagedResult<E> {
    pub fn last_page(&self) -> u32 {
        if self.total == 0 {
            return 1;
        }
        let pages = self.total.div_ceil(u64::from(self.page_size.max(1)));
        u32::try_from(pages).unwrap_or(u32::MAX)
    }

    pub fn map<T>(self, f: impl FnMut(E) -> T) -> PagedResult<T> {
        PagedResult {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            page_size: self.page_size,
        }
    }
}

#[cfg(test)]
#[path = "tests/query_tests.rs"]
mod tests;
