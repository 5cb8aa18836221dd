//! Selection of the node records to export
//!
//! Candidates are collected in every source context (one per allowed
//! dimension combination of the source language), collapsed to one record
//! per identifier, filtered for visibility and sorted into document order.

use crate::error::{Result, TradukiError};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use std::cmp::Ordering;
use tracing::{debug, warn};
use traduki_core::{ContentContext, ContextOptions, DimensionValues, NodeData, NodeTypeFilter, paths};

/// Which records below a path are candidates
#[derive(Debug, Clone, Copy)]
pub enum SelectionMode<'a> {
    /// The starting node and all its descendants
    WholeTree,
    /// The starting node and all descendants matching a document filter
    Documents(&'a NodeTypeFilter),
    /// Direct children matching a content filter
    Content(&'a NodeTypeFilter),
}

impl SelectionMode<'_> {
    fn sorts_by_tree(&self) -> bool {
        !matches!(self, Self::Content(_))
    }
}

/// Open one context per dimension combination, sharing the pivot's
/// workspace and visibility flags
pub fn open_source_contexts(
    pivot: &ContentContext,
    combinations: Vec<DimensionValues>,
) -> Result<Vec<ContentContext>> {
    combinations
        .into_iter()
        .map(|dimensions| {
            let options = ContextOptions::new(pivot.workspace_name())
                .with_dimensions(dimensions)
                .invisible_content_shown(pivot.is_invisible_content_shown())
                .removed_content_shown(false)
                .inaccessible_content_shown(pivot.is_inaccessible_content_shown());
            pivot.derive(options).map_err(TradukiError::from)
        })
        .collect()
}

/// Collapse records to one per identifier.
///
/// Records in the source language are moved last before the collapse, so
/// they replace any other variant of their identifier. Each identifier keeps
/// the position of its first occurrence.
pub fn deduplicate(records: Vec<NodeData>, language_dimension: &str, source_language: &str) -> Vec<NodeData> {
    let mut records = records;
    records.sort_by_key(|record| record.dimension(language_dimension) == Some(source_language));

    let mut unique: IndexMap<String, NodeData> = IndexMap::with_capacity(records.len());
    for record in records {
        unique.insert(record.identifier.clone(), record);
    }
    unique.into_values().collect()
}

/// Compare parent paths with `/` ordered before every other path character
fn compare_parent_paths(a: &str, b: &str) -> Ordering {
    let key = |path: &str| -> Vec<u8> {
        path.bytes()
            .map(|byte| if byte == b'/' { b'!' } else { byte })
            .collect()
    };
    key(a).cmp(&key(b))
}

/// Sort selected records into document order.
///
/// Tree order groups siblings by parent path and orders each group by
/// sorting index; otherwise records are ordered by sorting index only.
pub fn sort_selection(records: &mut [NodeData], tree_order: bool) {
    records.sort_by_key(|record| record.index);
    if tree_order {
        records.sort_by(|a, b| compare_parent_paths(a.parent_path(), b.parent_path()));
    }
}

/// Selects node records for export
pub struct Selector<'a> {
    pivot: &'a ContentContext,
    source_contexts: &'a [ContentContext],
    language_dimension: &'a str,
    source_language: &'a str,
    modified_after: Option<DateTime<Utc>>,
}

impl<'a> Selector<'a> {
    pub fn new(
        pivot: &'a ContentContext,
        source_contexts: &'a [ContentContext],
        language_dimension: &'a str,
        source_language: &'a str,
    ) -> Self {
        Self {
            pivot,
            source_contexts,
            language_dimension,
            source_language,
            modified_after: None,
        }
    }

    /// Keep only records changed at or after `modified_after`, directly or below
    pub fn modified_after(mut self, modified_after: Option<DateTime<Utc>>) -> Self {
        self.modified_after = modified_after;
        self
    }

    /// Resolve a starting point given as identifier or as path below `/sites`
    pub fn resolve_starting_point(&self, starting_point: &str) -> Result<NodeData> {
        if let Some(node) = self.pivot.node_by_identifier(starting_point)? {
            return Ok(node);
        }
        self.pivot
            .node(&paths::site_path(starting_point))?
            .ok_or_else(|| TradukiError::StartingPointNotFound(starting_point.to_string()))
    }

    /// Ordered, deduplicated records to export below `path`
    pub fn select(&self, path: &str, mode: SelectionMode<'_>) -> Result<Vec<NodeData>> {
        let mut candidates = Vec::new();
        for context in self.source_contexts {
            match mode {
                SelectionMode::WholeTree => {
                    candidates.extend(context.node_data(path)?);
                    candidates.extend(context.find_children(path, None, true)?);
                }
                SelectionMode::Documents(filter) => {
                    candidates.extend(context.node_data(path)?);
                    candidates.extend(context.find_children(path, Some(filter), true)?);
                }
                SelectionMode::Content(filter) => {
                    candidates.extend(context.find_children(path, Some(filter), false)?);
                }
            }
        }

        let unique = deduplicate(candidates, self.language_dimension, self.source_language);
        let mut selected = Vec::with_capacity(unique.len());
        for record in unique {
            if !self.is_visible(&record)? {
                continue;
            }
            if let Some(cutoff) = &self.modified_after {
                if !self.pivot.modified_since(&record, cutoff)? {
                    debug!("Skipping {}: not modified since {}", record.path, cutoff);
                    continue;
                }
            }
            selected.push(record);
        }

        sort_selection(&mut selected, mode.sorts_by_tree());
        Ok(selected)
    }

    /// Whether a record survives every source-language context
    fn is_visible(&self, record: &NodeData) -> Result<bool> {
        for context in self.source_contexts {
            if context.dimensions().first(self.language_dimension) != Some(self.source_language) {
                continue;
            }

            let resolved = if record.dimension(self.language_dimension) == Some(self.source_language) {
                record.clone()
            } else {
                match context.node_by_identifier(&record.identifier)? {
                    Some(node) => node,
                    None => {
                        warn!(
                            "Dropping {} ({}): no variant in {}",
                            record.path,
                            record.identifier,
                            context.dimensions()
                        );
                        return Ok(false);
                    }
                }
            };

            if !context.is_invisible_content_shown() && Self::is_hidden_in(context, &resolved)? {
                debug!("Dropping {}: hidden or below a hidden node", resolved.path);
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Whether the record or one of its dimensioned ancestors is hidden
    fn is_hidden_in(context: &ContentContext, record: &NodeData) -> Result<bool> {
        let mut current = record.clone();
        loop {
            if current.hidden {
                return Ok(true);
            }
            let parent_path = current.parent_path();
            if parent_path.is_empty() {
                return Ok(false);
            }
            match context.node_data(parent_path)? {
                Some(parent) if parent.path != "/" && !parent.dimensions.is_empty() => {
                    current = parent;
                }
                _ => return Ok(false),
            }
        }
    }
}
