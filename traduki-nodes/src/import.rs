//! Import of translated XML into a target workspace

use crate::error::{Result, TradukiError};
use crate::format::FormatVersion;
use crate::reader::{ReaderEvent, TreeReader};
use crate::reconciler::{ReconcileOutcome, Reconciler};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};
use traduki_core::{
    ContentContext, ContentStore, ContextOptions, LIVE_WORKSPACE, NodeData, NodeTypeManager,
    SecurityContext, Settings, Workspace,
};

/// Counters of a finished import
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    pub format: FormatVersion,
    pub source_language: String,
    pub target_language: String,
    pub source_workspace: String,
    pub target_workspace: String,
    pub nodes_seen: usize,
    pub variants_seen: usize,
    pub variants_updated: usize,
    pub variants_adopted: usize,
    pub properties_written: usize,
    /// Skip reason -> number of variants
    pub skipped: BTreeMap<&'static str, usize>,
}

impl ImportSummary {
    fn record(&mut self, outcome: ReconcileOutcome) {
        match outcome {
            ReconcileOutcome::Updated { .. } => self.variants_updated += 1,
            ReconcileOutcome::Adopted { .. } => self.variants_adopted += 1,
            _ => {}
        }
        self.properties_written += outcome.properties_written();
        if let Some(reason) = outcome.skip_reason() {
            *self.skipped.entry(reason).or_default() += 1;
        }
    }
}

/// Imports translated trees into a content store
pub struct ImportService {
    store: Arc<dyn ContentStore>,
    settings: Settings,
    node_types: Arc<NodeTypeManager>,
    security: Arc<SecurityContext>,
}

impl ImportService {
    pub fn new(store: Arc<dyn ContentStore>, settings: Settings, security: Arc<SecurityContext>) -> Self {
        let node_types = Arc::new(settings.node_type_manager());
        Self {
            store,
            settings,
            node_types,
            security,
        }
    }

    /// Import a file; relative paths resolve below the import directory
    pub fn import_from_file(
        &self,
        path: &Path,
        workspace: Option<&str>,
        target_language: Option<&str>,
    ) -> Result<ImportSummary> {
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.settings.import.directory.join(path)
        };
        info!("Importing {}", path.display());
        let file = File::open(&path)?;
        self.import_from_reader(BufReader::new(file), workspace, target_language)
    }

    /// Import from any buffered reader.
    ///
    /// `workspace` defaults to the source workspace named in the file and
    /// `target_language` to the file's target language.
    pub fn import_from_reader<R: BufRead>(
        &self,
        reader: R,
        workspace: Option<&str>,
        target_language: Option<&str>,
    ) -> Result<ImportSummary> {
        let mut tree = TreeReader::new(reader);
        let header = tree.read_header()?;

        let target_language = target_language
            .map(str::to_string)
            .or_else(|| header.target_language.clone())
            .ok_or(TradukiError::NoTargetLanguage)?;
        let fallback_chain = self
            .settings
            .combinator()
            .fallback_chain_for_language(&target_language)
            .ok_or_else(|| TradukiError::NoDimensionPresetForLanguage(target_language.clone()))?;

        if self
            .store
            .find_site_by_package_key(&header.site_package_key)?
            .is_none()
        {
            return Err(TradukiError::SitePackageUnknown(header.site_package_key));
        }

        let source_workspace = header
            .source_workspace
            .clone()
            .unwrap_or_else(|| LIVE_WORKSPACE.to_string());
        let source = ContentContext::new(
            self.store.clone(),
            self.node_types.clone(),
            self.security.clone(),
            ContextOptions::new(source_workspace.clone()).invisible_content_shown(true),
        )?;

        let target_workspace = workspace
            .map(str::to_string)
            .unwrap_or_else(|| source_workspace.clone());
        if self.store.find_workspace(&target_workspace)?.is_none() {
            self.store
                .add_workspace(Workspace::new(target_workspace.clone(), Some(LIVE_WORKSPACE)))?;
            info!("Created workspace {} based on {}", target_workspace, LIVE_WORKSPACE);
        }

        if let Some(modified_after) = &header.modified_after {
            debug!("File was exported with modifiedAfter {}", modified_after);
        }
        info!(
            "Importing {} into {} ({} -> {}, fallback {:?}, format {})",
            header.site_package_key,
            target_workspace,
            header.source_language,
            target_language,
            fallback_chain,
            header.format
        );

        let reconciler = Reconciler::new(
            source.clone(),
            target_workspace.clone(),
            self.settings.language_dimension.clone(),
            header.source_language.clone(),
            target_language.clone(),
            fallback_chain,
        );
        let mut summary = ImportSummary {
            format: header.format,
            source_language: header.source_language,
            target_language,
            source_workspace,
            target_workspace,
            nodes_seen: 0,
            variants_seen: 0,
            variants_updated: 0,
            variants_adopted: 0,
            properties_written: 0,
            skipped: BTreeMap::new(),
        };

        self.security.without_authorization_checks(|| {
            let mut open: Vec<(String, Vec<NodeData>)> = Vec::new();
            while let Some(event) = tree.next_event()? {
                match event {
                    ReaderEvent::NodeStart { identifier } => {
                        let existing = source.node_variants_by_identifier(&identifier)?;
                        summary.nodes_seen += 1;
                        open.push((identifier, existing));
                    }
                    ReaderEvent::Variant(parsed) => {
                        summary.variants_seen += 1;
                        let Some((identifier, existing)) = open.last() else {
                            continue;
                        };
                        let outcome = reconciler.reconcile(identifier, existing, &parsed)?;
                        if matches!(
                            outcome,
                            ReconcileOutcome::NoExistingNode | ReconcileOutcome::NoMatchingVariant
                        ) {
                            warn!("Skipping variant of {}: {:?}", identifier, outcome);
                        }
                        summary.record(outcome);
                    }
                    ReaderEvent::NodeEnd => {
                        open.pop();
                    }
                }
            }
            Ok::<(), TradukiError>(())
        })?;

        info!(
            "Imported {} nodes: {} variants updated, {} adopted, {} properties written",
            summary.nodes_seen,
            summary.variants_updated,
            summary.variants_adopted,
            summary.properties_written
        );
        Ok(summary)
    }
}
