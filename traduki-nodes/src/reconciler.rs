//! Reconciliation of imported variants against the target workspace

use crate::error::Result;
use crate::reader::ParsedVariant;
use std::collections::BTreeMap;
use tracing::debug;
use traduki_core::{Adoption, ContentContext, ContextOptions, DimensionValues, NodeData, PropertyValue};

/// What happened to one parsed variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The node has no variants in the source workspace
    NoExistingNode,
    /// Neither a target nor a source language variant matched
    NoMatchingVariant,
    /// Nothing changed and the target language inherits through fallback
    SkippedUnchangedFallback,
    /// The target variant already holds every value
    Unchanged,
    /// The target variant was updated in place
    Updated { properties: usize },
    /// A target variant was created or copied into the target workspace
    Adopted { properties: usize },
}

impl ReconcileOutcome {
    /// Number of properties written
    pub fn properties_written(&self) -> usize {
        match self {
            Self::Updated { properties } | Self::Adopted { properties } => *properties,
            _ => 0,
        }
    }

    /// Reason label for skipped variants
    pub fn skip_reason(&self) -> Option<&'static str> {
        match self {
            Self::NoExistingNode => Some("no-existing-node"),
            Self::NoMatchingVariant => Some("no-matching-variant"),
            Self::SkippedUnchangedFallback => Some("unchanged-with-fallback"),
            Self::Unchanged => Some("unchanged"),
            Self::Updated { .. } | Self::Adopted { .. } => None,
        }
    }
}

/// Writes translated variants into the target workspace
pub struct Reconciler {
    base: ContentContext,
    target_workspace: String,
    language_dimension: String,
    source_language: String,
    target_language: String,
    fallback_chain: Vec<String>,
}

impl Reconciler {
    /// `base` is any context over the store; target contexts are derived from it
    pub fn new(
        base: ContentContext,
        target_workspace: impl Into<String>,
        language_dimension: impl Into<String>,
        source_language: impl Into<String>,
        target_language: impl Into<String>,
        fallback_chain: Vec<String>,
    ) -> Self {
        Self {
            base,
            target_workspace: target_workspace.into(),
            language_dimension: language_dimension.into(),
            source_language: source_language.into(),
            target_language: target_language.into(),
            fallback_chain,
        }
    }

    pub fn target_language(&self) -> &str {
        &self.target_language
    }

    pub fn target_workspace(&self) -> &str {
        &self.target_workspace
    }

    fn with_language(&self, dimensions: &DimensionValues, language: &str) -> DimensionValues {
        dimensions.with(self.language_dimension.clone(), vec![language.to_string()])
    }

    /// Pick the variant to translate: the target language copy, else the source one
    fn choose<'v>(&self, existing: &'v [NodeData], parsed: &DimensionValues) -> Option<&'v NodeData> {
        let target = self.with_language(parsed, &self.target_language);
        let source = self.with_language(parsed, &self.source_language);
        existing
            .iter()
            .find(|variant| variant.dimensions == target)
            .or_else(|| existing.iter().find(|variant| variant.dimensions == source))
    }

    /// Apply one parsed variant of the node `identifier`
    pub fn reconcile(
        &self,
        identifier: &str,
        existing: &[NodeData],
        parsed: &ParsedVariant,
    ) -> Result<ReconcileOutcome> {
        if existing.is_empty() {
            debug!("Node {} does not exist in the source workspace", identifier);
            return Ok(ReconcileOutcome::NoExistingNode);
        }

        let dimensions = parsed.dimensions.without(&self.language_dimension);
        let Some(chosen) = self.choose(existing, &dimensions) else {
            debug!("No variant of {} matches {}", identifier, dimensions);
            return Ok(ReconcileOutcome::NoMatchingVariant);
        };

        let changed: Vec<(&String, &String)> = parsed
            .properties
            .iter()
            .filter(|(name, value)| differs(chosen.property(name), value))
            .collect();

        if changed.is_empty() && self.fallback_chain.len() > 1 {
            debug!(
                "Skipping {}: unchanged and {} falls back to {:?}",
                identifier, self.target_language, self.fallback_chain
            );
            return Ok(ReconcileOutcome::SkippedUnchangedFallback);
        }

        let mut target_dimensions: BTreeMap<String, String> = dimensions.first_values();
        target_dimensions.insert(self.language_dimension.clone(), self.target_language.clone());
        let options = ContextOptions::new(self.target_workspace.clone())
            .with_dimensions(dimensions.with(self.language_dimension.clone(), self.fallback_chain.clone()))
            .with_target_dimensions(target_dimensions)
            .invisible_content_shown(true);
        let context = self.base.derive(options)?;

        let adopted = context.adopt_node(chosen)?;
        let mut node = adopted.node;
        for (name, value) in &changed {
            context.set_property(&mut node, name, PropertyValue::String((*value).clone()))?;
        }

        let properties = changed.len();
        let outcome = match adopted.adoption {
            Adoption::Existing if properties == 0 => ReconcileOutcome::Unchanged,
            Adoption::Existing => ReconcileOutcome::Updated { properties },
            Adoption::Materialized | Adoption::Created => ReconcileOutcome::Adopted { properties },
        };
        debug!("Reconciled {} ({}): {:?}", node.path, identifier, outcome);
        Ok(outcome)
    }
}

/// A stored null is exported as an empty element, so it equals `""`
fn differs(current: Option<&PropertyValue>, value: &str) -> bool {
    match current {
        Some(PropertyValue::String(text)) => text.as_str() != value,
        Some(PropertyValue::Null) => !value.is_empty(),
        _ => true,
    }
}
