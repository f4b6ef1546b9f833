/// Property name diverted to a row's link instead of being stored
pub const DEFAULT_LINK_KEY: &str = "@__link__";

/// Configuration for a document session
#[derive(Debug, Clone)]
pub struct DocumentConfig {
    /// Reserved property name that sets a row's link when fed
    pub link_key: String,

    /// Maximum nesting depth accepted by a single feed
    pub max_depth: usize,

    /// Number of compiled path expressions kept per session
    pub path_cache_capacity: usize,

    /// Truncate existing storage at the address when creating a document
    pub overwrite: bool,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        DocumentConfig {
            link_key: String::from(DEFAULT_LINK_KEY),
            max_depth: 128,
            path_cache_capacity: 256,
            overwrite: true,
        }
    }
}

impl DocumentConfig {
    pub fn link_key(mut self, link_key: impl Into<String>) -> Self {
        self.link_key = link_key.into();
        self
    }

    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn path_cache_capacity(mut self, capacity: usize) -> Self {
        self.path_cache_capacity = capacity;
        self
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }
}
