//! Export of a content tree into the XML format

use crate::error::{Result, TradukiError};
use crate::format::FormatVersion;
use crate::selector::{SelectionMode, Selector, open_source_contexts};
use crate::writer::{DocumentHeader, TreeWriter};
use chrono::{DateTime, Utc};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use traduki_core::{
    ContentContext, ContentStore, ContextOptions, DEFAULT_PRESET, NodeData, NodeTypeFilter,
    NodeTypeManager, SecurityContext, Settings, Site, paths,
};

/// Parameters of one export run
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Node identifier, or path relative to `/sites`
    pub starting_point: String,
    /// Defaults to the configured source language
    pub source_language: Option<String>,
    pub target_language: Option<String>,
    pub modified_after: Option<DateTime<Utc>>,
    pub ignore_hidden: bool,
    pub document_filter_preset: String,
    pub content_filter_preset: String,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            starting_point: String::new(),
            source_language: None,
            target_language: None,
            modified_after: None,
            ignore_hidden: true,
            document_filter_preset: DEFAULT_PRESET.to_string(),
            content_filter_preset: DEFAULT_PRESET.to_string(),
        }
    }
}

impl ExportOptions {
    pub fn new(starting_point: impl Into<String>) -> Self {
        Self {
            starting_point: starting_point.into(),
            ..Default::default()
        }
    }
}

/// Counters of a finished export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub format: FormatVersion,
    pub starting_point: String,
    pub source_language: String,
    pub nodes_written: usize,
    pub variants_written: usize,
}

/// Everything resolved before the first byte is written
pub struct ExportPlan {
    pub format: FormatVersion,
    pub header: DocumentHeader,
    pub starting_point: NodeData,
    pub site: Site,
    document_filter: NodeTypeFilter,
    content_filter: NodeTypeFilter,
    pivot: ContentContext,
    source_contexts: Vec<ContentContext>,
    modified_after: Option<DateTime<Utc>>,
}

/// Exports trees of a content store
pub struct ExportService {
    store: Arc<dyn ContentStore>,
    settings: Settings,
    node_types: Arc<NodeTypeManager>,
    security: Arc<SecurityContext>,
}

impl ExportService {
    pub fn new(store: Arc<dyn ContentStore>, settings: Settings, security: Arc<SecurityContext>) -> Self {
        let node_types = Arc::new(settings.node_type_manager());
        Self {
            store,
            settings,
            node_types,
            security,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Run every pre-flight check and open the contexts of the export
    pub fn plan(&self, options: &ExportOptions) -> Result<ExportPlan> {
        let format = FormatVersion::parse(&self.settings.format_version)?;

        let document_filter = self
            .settings
            .document_type_filter(&options.document_filter_preset)
            .ok_or_else(|| TradukiError::FilterPresetUnknown {
                kind: "document",
                preset: options.document_filter_preset.clone(),
            })?;
        let content_filter = self
            .settings
            .content_type_filter(&options.content_filter_preset)
            .ok_or_else(|| TradukiError::FilterPresetUnknown {
                kind: "content",
                preset: options.content_filter_preset.clone(),
            })?;

        let workspace = self.settings.export.workspace.clone();
        if self.store.find_workspace(&workspace)?.is_none() {
            return Err(TradukiError::WorkspaceNotFound(workspace));
        }

        let source_language = options
            .source_language
            .clone()
            .unwrap_or_else(|| self.settings.source_language.clone());
        let combinations = self
            .settings
            .combinator()
            .allowed_combinations_for_language(&source_language);
        let Some(first) = combinations.first().cloned() else {
            return Err(TradukiError::NoDimensionPresetForLanguage(source_language));
        };

        let pivot = ContentContext::new(
            self.store.clone(),
            self.node_types.clone(),
            self.security.clone(),
            ContextOptions::new(workspace.clone())
                .with_dimensions(first)
                .invisible_content_shown(!options.ignore_hidden)
                .inaccessible_content_shown(!options.ignore_hidden),
        )?;
        let source_contexts = open_source_contexts(&pivot, combinations)?;

        let selector = Selector::new(
            &pivot,
            &source_contexts,
            &self.settings.language_dimension,
            &source_language,
        );
        let starting_point = selector.resolve_starting_point(&options.starting_point)?;

        let site = match paths::site_node_name(&starting_point.path) {
            Some(node_name) => self.store.find_site(node_name)?,
            None => None,
        }
        .ok_or_else(|| TradukiError::SiteNotFound(starting_point.path.clone()))?;

        let header = DocumentHeader {
            site_name: site.name.clone(),
            site_package_key: site.site_package_key.clone(),
            workspace,
            source_language,
            target_language: options.target_language.clone(),
            modified_after: options.modified_after,
        };

        Ok(ExportPlan {
            format,
            header,
            starting_point,
            site,
            document_filter,
            content_filter,
            pivot,
            source_contexts,
            modified_after: options.modified_after,
        })
    }

    /// Export into any sink
    pub fn export_to_writer<W: Write>(&self, options: &ExportOptions, sink: W) -> Result<(W, ExportSummary)> {
        let plan = self.plan(options)?;
        self.write_plan(&plan, sink)
    }

    /// Write an already checked plan into a sink
    pub fn write_plan<W: Write>(&self, plan: &ExportPlan, sink: W) -> Result<(W, ExportSummary)> {
        info!(
            "Exporting {} ({}) from workspace {} in {} using format {}",
            plan.starting_point.path,
            plan.starting_point.identifier,
            plan.header.workspace,
            plan.header.source_language,
            plan.format
        );

        let mut writer = TreeWriter::new(
            sink,
            plan.format,
            self.settings.language_dimension.clone(),
            self.settings.debug,
        );
        writer.start_document(&plan.header)?;

        let selector = Selector::new(
            &plan.pivot,
            &plan.source_contexts,
            &self.settings.language_dimension,
            &plan.header.source_language,
        )
        .modified_after(plan.modified_after);
        let run = ExportRun {
            plan,
            selector,
            language_dimension: &self.settings.language_dimension,
            node_types: &self.node_types,
        };
        self.security
            .without_authorization_checks(|| run.write_tree(&mut writer))?;

        let summary = ExportSummary {
            format: plan.format,
            starting_point: plan.starting_point.path.clone(),
            source_language: plan.header.source_language.clone(),
            nodes_written: writer.nodes_written(),
            variants_written: writer.variants_written(),
        };
        let sink = writer.finish()?;
        info!(
            "Exported {} nodes with {} variants",
            summary.nodes_written, summary.variants_written
        );
        Ok((sink, summary))
    }

    /// Export into a string
    pub fn export_to_string(&self, options: &ExportOptions) -> Result<(String, ExportSummary)> {
        let (bytes, summary) = self.export_to_writer(options, Vec::new())?;
        let xml = String::from_utf8(bytes).map_err(|e| TradukiError::MalformedXml(e.to_string()))?;
        Ok((xml, summary))
    }

    /// Export into a file; relative paths and the default name resolve below
    /// the export directory
    pub fn export_to_file(
        &self,
        options: &ExportOptions,
        filename: Option<&Path>,
    ) -> Result<(PathBuf, ExportSummary)> {
        let plan = self.plan(options)?;
        let relative = match filename {
            Some(filename) => filename.to_path_buf(),
            None => self.default_filename(&plan, options),
        };
        let path = if relative.is_absolute() {
            relative
        } else {
            self.settings.export.directory.join(relative)
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = File::create(&path)?;
        let (mut sink, summary) = self.write_plan(&plan, BufWriter::new(file))?;
        sink.flush()?;
        info!("Wrote {}", path.display());
        Ok((path, summary))
    }

    /// `Nodes/<target>/<preset_><uriPathSegment|nodeName>.xml`
    pub fn default_filename(&self, plan: &ExportPlan, options: &ExportOptions) -> PathBuf {
        let name = plan
            .starting_point
            .string_property("uriPathSegment")
            .filter(|segment| !segment.is_empty())
            .unwrap_or_else(|| plan.starting_point.name());
        let file = if options.document_filter_preset == DEFAULT_PRESET {
            format!("{}.xml", name)
        } else {
            format!("{}_{}.xml", options.document_filter_preset, name)
        };
        match &options.target_language {
            Some(target) => Path::new("Nodes").join(target).join(file),
            None => Path::new("Nodes").join(file),
        }
    }
}

/// State of one export while nodes are written
struct ExportRun<'a> {
    plan: &'a ExportPlan,
    selector: Selector<'a>,
    language_dimension: &'a str,
    node_types: &'a NodeTypeManager,
}

impl ExportRun<'_> {
    fn write_tree<W: Write>(&self, writer: &mut TreeWriter<W>) -> Result<()> {
        let root = &self.plan.starting_point.path;
        if !self.plan.format.is_nested() {
            for record in self.selector.select(root, SelectionMode::WholeTree)? {
                writer.start_node(&record)?;
                self.write_variants(writer, &record)?;
                writer.end_node()?;
            }
            return Ok(());
        }

        let documents = self
            .selector
            .select(root, SelectionMode::Documents(&self.plan.document_filter))?;
        self.ensure_disjoint(&documents, &self.plan.content_filter)?;
        for document in &documents {
            self.write_nested(writer, document)?;
        }
        Ok(())
    }

    /// Write a node, then its content children inside `<childNodes>`
    fn write_nested<W: Write>(&self, writer: &mut TreeWriter<W>, record: &NodeData) -> Result<()> {
        writer.start_node(record)?;
        self.write_variants(writer, record)?;

        let children = self
            .selector
            .select(&record.path, SelectionMode::Content(&self.plan.content_filter))?;
        self.ensure_disjoint(&children, &self.plan.document_filter)?;
        if children.is_empty() {
            writer.empty_child_nodes()?;
        } else {
            writer.start_child_nodes()?;
            for child in &children {
                self.write_nested(writer, child)?;
            }
            writer.end_child_nodes()?;
        }
        writer.end_node()
    }

    /// Reject records that also match the other filter
    fn ensure_disjoint(&self, records: &[NodeData], other: &NodeTypeFilter) -> Result<()> {
        for record in records {
            if record.identifier == self.plan.starting_point.identifier {
                continue;
            }
            if other.matches(&record.node_type, self.node_types) {
                return Err(TradukiError::TypeFilterOverlap {
                    path: record.path.clone(),
                    node_type: record.node_type.clone(),
                });
            }
        }
        Ok(())
    }

    /// Every distinct source language variant the source contexts resolve
    fn write_variants<W: Write>(&self, writer: &mut TreeWriter<W>, record: &NodeData) -> Result<()> {
        let source_language = self.plan.header.source_language.as_str();
        let mut written: Vec<String> = Vec::new();
        for context in &self.plan.source_contexts {
            let Some(variant) = context.node_by_identifier(&record.identifier)? else {
                continue;
            };
            let language = variant.dimension(self.language_dimension);
            if language.is_some_and(|language| language != source_language) {
                continue;
            }
            let hash = variant.dimensions_hash();
            if written.contains(&hash) {
                continue;
            }
            writer.write_variant(&variant, self.node_types)?;
            written.push(hash);
        }
        if written.is_empty() {
            debug!("No {} variant of {} resolved", source_language, record.path);
        }
        Ok(())
    }
}
