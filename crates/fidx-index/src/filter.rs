//! Query filters and the permissive validation of raw request parameters.
//!
//! Malformed numeric parameters never fail a request. [`FilterParams::validate`]
//! substitutes a safe default and reports each substitution so callers and
//! tests can see exactly what was replaced.

use fidx_types::keys::{is_direct_child, normalize_directory};
use fidx_types::FileRecord;
use serde::Deserialize;

/// A validated, normalized listing query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryFilter {
    /// Case-insensitive substring matched against record ids. Empty = any.
    pub search: String,
    /// Normalized directory prefix (`""` or ending in `/`).
    pub directory: String,
    /// Zero-based offset into the ordered result set.
    pub start: usize,
    /// Maximum number of returned records; `None` is unbounded (wire value `-1`).
    pub count: Option<usize>,
    pub channel: String,
    pub list_type: String,
    /// Every tag listed here must be present.
    pub include_tags: Vec<String>,
    /// No tag listed here may be present.
    pub exclude_tags: Vec<String>,
    /// Match the whole subtree under `directory` instead of direct children.
    pub include_subdir_files: bool,
    /// Skip materializing records; only totals are reported.
    pub count_only: bool,
}

impl Default for QueryFilter {
    fn default() -> Self {
        Self {
            search: String::new(),
            directory: String::new(),
            start: 0,
            count: Some(50),
            channel: String::new(),
            list_type: String::new(),
            include_tags: Vec::new(),
            exclude_tags: Vec::new(),
            include_subdir_files: false,
            count_only: false,
        }
    }
}

impl QueryFilter {
    pub fn in_directory(mut self, directory: &str) -> Self {
        self.directory = normalize_directory(directory);
        self
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.include_subdir_files = recursive;
        self
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = search.into();
        self
    }

    pub fn page(mut self, start: usize, count: Option<usize>) -> Self {
        self.start = start;
        self.count = count;
        self
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    pub fn with_list_type(mut self, list_type: impl Into<String>) -> Self {
        self.list_type = list_type.into();
        self
    }

    pub fn include_tags<I: IntoIterator<Item = S>, S: Into<String>>(mut self, tags: I) -> Self {
        self.include_tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn exclude_tags<I: IntoIterator<Item = S>, S: Into<String>>(mut self, tags: I) -> Self {
        self.exclude_tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Count-only query: no records, just totals.
    pub fn counting(mut self) -> Self {
        self.count = None;
        self.count_only = true;
        self
    }

    /// Whether `id` lies in the directory scope of this filter.
    pub fn in_scope(&self, id: &str) -> bool {
        if self.include_subdir_files {
            id.starts_with(&self.directory)
        } else {
            is_direct_child(id, &self.directory)
        }
    }

    /// Whether `record` passes every non-directory predicate.
    pub fn matches(&self, record: &FileRecord) -> bool {
        let meta = &record.metadata;
        if !self.search.is_empty()
            && !record.id.to_lowercase().contains(&self.search.to_lowercase())
        {
            return false;
        }
        if !self.channel.is_empty() && meta.channel.as_deref() != Some(self.channel.as_str()) {
            return false;
        }
        if !self.list_type.is_empty()
            && meta.list_type.as_deref() != Some(self.list_type.as_str())
        {
            return false;
        }
        self.include_tags.iter().all(|tag| record.has_tag(tag))
            && !self.exclude_tags.iter().any(|tag| record.has_tag(tag))
    }
}

/// One default substituted for a malformed parameter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Substitution {
    pub field: &'static str,
    pub raw: String,
    pub substituted: String,
}

/// A validated value plus the substitutions made while producing it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Validated<T> {
    pub value: T,
    pub substitutions: Vec<Substitution>,
}

impl<T> Validated<T> {
    /// Returns `true` if any default was substituted.
    pub fn was_substituted(&self) -> bool {
        !self.substitutions.is_empty()
    }
}

/// Raw listing parameters as they arrive on the query string.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterParams {
    pub search: Option<String>,
    pub dir: Option<String>,
    pub start: Option<String>,
    pub count: Option<String>,
    pub sum: Option<String>,
    pub recursive: Option<String>,
    pub channel: Option<String>,
    pub list_type: Option<String>,
    pub include_tags: Option<String>,
    pub exclude_tags: Option<String>,
}

impl FilterParams {
    /// Turn raw parameters into a [`QueryFilter`], substituting defaults for
    /// malformed numbers instead of failing.
    pub fn validate(&self, default_count: usize) -> Validated<QueryFilter> {
        let mut substitutions = Vec::new();

        let start = match non_empty(&self.start) {
            None => 0,
            Some(raw) => match raw.parse::<usize>() {
                Ok(start) => start,
                Err(_) => {
                    substitutions.push(Substitution {
                        field: "start",
                        raw: raw.to_string(),
                        substituted: "0".into(),
                    });
                    0
                }
            },
        };

        let mut unbounded = false;
        let count = match non_empty(&self.count) {
            None => Some(default_count),
            Some(raw) => match raw.parse::<i64>() {
                Ok(-1) => {
                    unbounded = true;
                    None
                }
                Ok(n) if n > 0 => Some(usize::try_from(n).unwrap_or(usize::MAX)),
                _ => {
                    substitutions.push(Substitution {
                        field: "count",
                        raw: raw.to_string(),
                        substituted: default_count.to_string(),
                    });
                    Some(default_count)
                }
            },
        };

        let value = QueryFilter {
            search: self.search.as_deref().unwrap_or_default().trim().to_string(),
            directory: normalize_directory(self.dir.as_deref().unwrap_or_default()),
            start,
            count,
            channel: self.channel.clone().unwrap_or_default(),
            list_type: self.list_type.clone().unwrap_or_default(),
            include_tags: split_tags(&self.include_tags),
            exclude_tags: split_tags(&self.exclude_tags),
            include_subdir_files: is_true(&self.recursive),
            count_only: unbounded && is_true(&self.sum),
        };

        Validated {
            value,
            substitutions,
        }
    }
}

fn non_empty(raw: &Option<String>) -> Option<&str> {
    raw.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn is_true(raw: &Option<String>) -> bool {
    non_empty(raw).is_some_and(|s| s.eq_ignore_ascii_case("true"))
}

fn split_tags(raw: &Option<String>) -> Vec<String> {
    raw.as_deref()
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}
