//! Comparison orchestration.
//!
//! Drives the full pipeline over file sets: bounded parallel loading and
//! parsing (one task per file, continue-on-error), then a single-threaded
//! match/diff/aggregate phase. Cancellation is honored at file-task
//! boundaries during the parallel phase only; the sequential phase always
//! runs to completion. All diagnostics are returned values, so one pipeline
//! instance can serve concurrent runs.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::diagnostics::Diagnostic;
use crate::diff::canonical::diff_canonical;
use crate::diff::{diff_trees, non_equivalent_leaves};
use crate::discovery::{discover_files, SourceFileKind};
use crate::error::DriftResult;
use crate::matching::{Matcher, StrategyKind};
use crate::normalize::{CanonicalPolicy, SourceFormat};
use crate::parser::{self, ConfigDocument, ParseError};
use crate::resolve::ReferenceResolver;
use crate::settings::{ComparisonSettings, SettingsError};
use crate::tree;

/// Progress signal: (completed files, total files).
pub type ProgressFn = dyn Fn(usize, usize) + Send + Sync;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The top-level export root is missing or unusable. Unlike per-file
    /// conditions this is fatal: there is nothing to compare against.
    #[error("invalid export root: {reason}")]
    InvalidExport { reason: String },
}

/// Terminal classification of one source/reference pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchStatus {
    SourceOnly,
    ReferenceOnly,
    Identical,
    SemanticallyEquivalent,
    Different,
}

/// One pairing result. Exactly one of `source`/`reference` is `None` for the
/// `SourceOnly`/`ReferenceOnly` statuses; both are present otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchOutcome {
    pub source: Option<CanonicalPolicy>,
    pub reference: Option<CanonicalPolicy>,
    pub status: MatchStatus,
    pub differences: Vec<String>,
    pub strategy: Option<StrategyKind>,
}

/// Aggregated outcomes of one comparison run, in source order followed by
/// unclaimed references in reference order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComparisonAggregate {
    pub outcomes: Vec<MatchOutcome>,
    pub identical: usize,
    pub semantically_equivalent: usize,
    pub different: usize,
    pub source_only: usize,
    pub reference_only: usize,
}

impl ComparisonAggregate {
    fn record(&mut self, outcome: MatchOutcome) {
        match outcome.status {
            MatchStatus::Identical => self.identical += 1,
            MatchStatus::SemanticallyEquivalent => self.semantically_equivalent += 1,
            MatchStatus::Different => self.different += 1,
            MatchStatus::SourceOnly => self.source_only += 1,
            MatchStatus::ReferenceOnly => self.reference_only += 1,
        }
        self.outcomes.push(outcome);
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    /// True when any outcome describes real drift: a difference, or a policy
    /// present on only one side.
    pub fn has_drift(&self) -> bool {
        self.different + self.source_only + self.reference_only > 0
    }
}

/// The parsed source export: tenant plus normalized policies.
#[derive(Debug, Clone)]
pub struct ExportDocument {
    pub tenant_id: Option<String>,
    pub policies: Vec<CanonicalPolicy>,
    pub diagnostics: Vec<Diagnostic>,
}

/// How the source export is supplied.
#[derive(Debug, Clone)]
pub enum ExportInput {
    Value(Value),
    Text(String),
    File(PathBuf),
}

/// Result of a full comparison run.
#[derive(Debug, Clone)]
pub struct ComparisonRun {
    pub tenant_id: Option<String>,
    pub aggregate: ComparisonAggregate,
    pub diagnostics: Vec<Diagnostic>,
}

/// The comparison pipeline. Holds validated settings and no mutable state.
#[derive(Debug, Clone)]
pub struct ComparisonPipeline {
    settings: ComparisonSettings,
}

impl ComparisonPipeline {
    pub fn new(settings: ComparisonSettings) -> Result<Self, SettingsError> {
        settings.validate()?;
        Ok(Self { settings })
    }

    pub fn settings(&self) -> &ComparisonSettings {
        &self.settings
    }

    /// Parse the source export into normalized policies. An unusable root is
    /// fatal; individual malformed policy entries are skipped with an error
    /// diagnostic.
    pub async fn parse_export(&self, input: ExportInput) -> DriftResult<ExportDocument> {
        let root: Value = match input {
            ExportInput::Value(value) => value,
            ExportInput::Text(text) => {
                serde_json::from_str(&text).map_err(|e| PipelineError::InvalidExport {
                    reason: e.to_string(),
                })?
            }
            ExportInput::File(path) => {
                let text = tokio::fs::read_to_string(&path).await?;
                serde_json::from_str(&text).map_err(|e| PipelineError::InvalidExport {
                    reason: format!("{}: {}", path.display(), e),
                })?
            }
        };
        if !root.is_object() {
            return Err(PipelineError::InvalidExport {
                reason: format!("expected a JSON object, found {}", tree::type_name(&root)),
            }
            .into());
        }

        let mut diagnostics = Vec::new();
        let tenant_id = match tree::opt_str(&root, "TenantId") {
            Ok(tenant) => tenant.map(str::to_string),
            Err(e) => {
                diagnostics.push(Diagnostic::warning("export", e.to_string()));
                None
            }
        };

        let entries = tree::get(&root, "Policies")
            .and_then(|v| tree::as_array(v, "Policies"))
            .map_err(|e| PipelineError::InvalidExport {
                reason: e.to_string(),
            })?;

        let mut policies = Vec::new();
        for (index, entry) in entries.iter().enumerate() {
            if !entry.is_object() {
                diagnostics.push(Diagnostic::error(
                    format!("Policies[{}]", index),
                    format!("expected object, found {}", tree::type_name(entry)),
                ));
                continue;
            }
            let identifier = entry
                .get("Id")
                .and_then(Value::as_str)
                .or_else(|| entry.get("DisplayName").and_then(Value::as_str))
                .map(str::to_string)
                .unwrap_or_else(|| format!("Policies[{}]", index));
            let (policy, mut diags) = CanonicalPolicy::from_json(entry, &identifier);
            policies.push(policy);
            diagnostics.append(&mut diags);
        }

        tracing::debug!(
            "Parsed export: tenant {:?}, {} policies",
            tenant_id,
            policies.len()
        );
        Ok(ExportDocument {
            tenant_id,
            policies,
            diagnostics,
        })
    }

    /// Load every reference policy file under `dir`. One bounded task per
    /// file; failures stay per-file.
    pub async fn load_reference_policies(
        &self,
        dir: &Path,
        cancel: &CancellationToken,
        progress: Option<&ProgressFn>,
    ) -> (Vec<CanonicalPolicy>, Vec<Diagnostic>) {
        let (files, mut diagnostics) = discover_files(dir, self.settings.recursive_discovery);
        let json_files: Vec<_> = files
            .into_iter()
            .filter(|f| f.kind == SourceFileKind::Json)
            .collect();
        let total = json_files.len();

        let semaphore = Arc::new(Semaphore::new(self.settings.max_parallel_loads));
        let mut tasks = JoinSet::new();
        for file in json_files {
            if cancel.is_cancelled() {
                diagnostics.push(Diagnostic::warning(
                    dir.display().to_string(),
                    "cancellation requested; remaining reference files skipped",
                ));
                break;
            }
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok()?;
                if cancel.is_cancelled() {
                    return None;
                }
                let origin = file.path.display().to_string();
                let stem = file
                    .path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("reference")
                    .to_string();
                let outcome = match tokio::fs::read_to_string(&file.path).await {
                    Err(e) => Err(Diagnostic::error(
                        origin,
                        format!("failed to read file: {}", e),
                    )),
                    Ok(text) => match serde_json::from_str::<Value>(&text) {
                        Err(e) => Err(Diagnostic::error(
                            origin,
                            format!(
                                "malformed JSON at line {}, column {}: {}",
                                e.line(),
                                e.column(),
                                e
                            ),
                        )),
                        Ok(value) => Ok(CanonicalPolicy::from_json(&value, &stem)),
                    },
                };
                Some((file.path, outcome))
            });
        }

        let mut loaded = Vec::new();
        let mut completed = 0usize;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Some(item)) => loaded.push(item),
                Ok(None) => {}
                Err(e) => diagnostics.push(Diagnostic::error(
                    dir.display().to_string(),
                    format!("worker task failed: {}", e),
                )),
            }
            completed += 1;
            if let Some(report) = progress {
                if completed % self.settings.progress_interval == 0 || completed == total {
                    report(completed, total);
                }
            }
        }

        // Task completion order is nondeterministic; path order keeps runs
        // reproducible.
        loaded.sort_by(|a, b| a.0.cmp(&b.0));
        let mut policies = Vec::new();
        for (_, outcome) in loaded {
            match outcome {
                Ok((policy, mut diags)) => {
                    policies.push(policy);
                    diagnostics.append(&mut diags);
                }
                Err(diag) => {
                    tracing::warn!("{}", diag);
                    diagnostics.push(diag);
                }
            }
        }
        tracing::debug!("Loaded {} reference policies from {:?}", policies.len(), dir);
        (policies, diagnostics)
    }

    /// Load declared policies under `dir`: configuration text and applied
    /// state files. Parsing runs per file in the pool; reference resolution
    /// and normalization run afterwards, once every file's variables and
    /// locals are known.
    pub async fn load_declared_policies(
        &self,
        dir: &Path,
        cancel: &CancellationToken,
        progress: Option<&ProgressFn>,
    ) -> (Vec<CanonicalPolicy>, Vec<Diagnostic>) {
        let (files, mut diagnostics) = discover_files(dir, self.settings.recursive_discovery);
        let total = files.len();

        let semaphore = Arc::new(Semaphore::new(self.settings.max_parallel_loads));
        let mut tasks = JoinSet::new();
        for file in files {
            if cancel.is_cancelled() {
                diagnostics.push(Diagnostic::warning(
                    dir.display().to_string(),
                    "cancellation requested; remaining configuration files skipped",
                ));
                break;
            }
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            let resource_type = self.settings.resource_type.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok()?;
                if cancel.is_cancelled() {
                    return None;
                }
                let origin = file.path.display().to_string();
                let text = match tokio::fs::read_to_string(&file.path).await {
                    Ok(text) => text,
                    Err(e) => {
                        return Some((
                            file.path,
                            ConfigDocument::default(),
                            vec![Diagnostic::error(
                                origin,
                                format!("failed to read file: {}", e),
                            )],
                        ));
                    }
                };
                let (document, diags) = match file.kind {
                    SourceFileKind::ConfigText => {
                        parser::parse_configuration_text(&text, &resource_type, &origin)
                    }
                    SourceFileKind::Json => {
                        match parser::parse_state_document(&text, &resource_type, &origin) {
                            Ok((policies, diags)) => (
                                ConfigDocument {
                                    policies,
                                    ..Default::default()
                                },
                                diags,
                            ),
                            Err(ParseError::InvalidDocument { reason }) => (
                                ConfigDocument::default(),
                                vec![Diagnostic::warning(origin, reason)],
                            ),
                            Err(ParseError::Json(e)) => (
                                ConfigDocument::default(),
                                vec![Diagnostic::error(
                                    origin,
                                    format!(
                                        "malformed JSON at line {}, column {}: {}",
                                        e.line(),
                                        e.column(),
                                        e
                                    ),
                                )],
                            ),
                        }
                    }
                };
                Some((file.path, document, diags))
            });
        }

        let mut parsed = Vec::new();
        let mut completed = 0usize;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Some((path, document, diags))) => parsed.push((path, document, diags)),
                Ok(None) => {}
                Err(e) => diagnostics.push(Diagnostic::error(
                    dir.display().to_string(),
                    format!("worker task failed: {}", e),
                )),
            }
            completed += 1;
            if let Some(report) = progress {
                if completed % self.settings.progress_interval == 0 || completed == total {
                    report(completed, total);
                }
            }
        }
        parsed.sort_by(|a, b| a.0.cmp(&b.0));

        // Variables and locals resolve across file boundaries, so the
        // resolver is built from the whole directory before normalizing.
        let mut variables = Vec::new();
        let mut locals = Vec::new();
        for (_, document, _) in &parsed {
            variables.extend(document.variables.iter().cloned());
            locals.extend(document.locals.iter().cloned());
        }
        let resolver = ReferenceResolver::new(variables, locals);

        let mut policies = Vec::new();
        for (path, document, mut diags) in parsed {
            diagnostics.append(&mut diags);
            let identifier = path
                .file_name()
                .and_then(|s| s.to_str())
                .unwrap_or("configuration")
                .to_string();
            for config in &document.policies {
                let (policy, mut diags) =
                    CanonicalPolicy::from_config(config, &resolver, &identifier);
                policies.push(policy);
                diagnostics.append(&mut diags);
            }
        }
        tracing::debug!("Loaded {} declared policies from {:?}", policies.len(), dir);
        (policies, diagnostics)
    }

    /// Sequential match/diff/aggregate phase. Every source policy yields
    /// exactly one outcome; every unclaimed reference yields exactly one
    /// `ReferenceOnly` outcome.
    pub fn compare(
        &self,
        sources: &[CanonicalPolicy],
        references: &[CanonicalPolicy],
    ) -> ComparisonAggregate {
        let matcher = Matcher::new(self.settings.strategy.clone());
        let mut aggregate = ComparisonAggregate::default();
        let mut claimed: HashSet<usize> = HashSet::new();

        for source in sources {
            match matcher.find_match(source, references, &claimed) {
                None => aggregate.record(MatchOutcome {
                    source: Some(source.clone()),
                    reference: None,
                    status: MatchStatus::SourceOnly,
                    differences: Vec::new(),
                    strategy: None,
                }),
                Some(index) => {
                    claimed.insert(index);
                    let reference = &references[index];
                    let (status, differences) = classify_pair(source, reference);
                    aggregate.record(MatchOutcome {
                        source: Some(source.clone()),
                        reference: Some(reference.clone()),
                        status,
                        differences,
                        strategy: Some(matcher.strategy_kind()),
                    });
                }
            }
        }

        for (index, reference) in references.iter().enumerate() {
            if !claimed.contains(&index) {
                aggregate.record(MatchOutcome {
                    source: None,
                    reference: Some(reference.clone()),
                    status: MatchStatus::ReferenceOnly,
                    differences: Vec::new(),
                    strategy: None,
                });
            }
        }

        aggregate
    }

    /// Compare a source export against a directory of reference files.
    pub async fn run_export_comparison(
        &self,
        export: ExportInput,
        reference_dir: &Path,
        cancel: &CancellationToken,
        progress: Option<&ProgressFn>,
    ) -> DriftResult<ComparisonRun> {
        let mut export = self.parse_export(export).await?;
        let (references, mut diags) = self
            .load_reference_policies(reference_dir, cancel, progress)
            .await;
        export.diagnostics.append(&mut diags);
        let aggregate = self.compare(&export.policies, &references);
        Ok(ComparisonRun {
            tenant_id: export.tenant_id,
            aggregate,
            diagnostics: export.diagnostics,
        })
    }

    /// Compare declared configuration against a directory of reference files.
    pub async fn run_config_comparison(
        &self,
        config_dir: &Path,
        reference_dir: &Path,
        cancel: &CancellationToken,
        progress: Option<&ProgressFn>,
    ) -> DriftResult<ComparisonRun> {
        let (sources, mut diagnostics) = self
            .load_declared_policies(config_dir, cancel, progress)
            .await;
        let (references, mut diags) = self
            .load_reference_policies(reference_dir, cancel, progress)
            .await;
        diagnostics.append(&mut diags);
        let aggregate = self.compare(&sources, &references);
        Ok(ComparisonRun {
            tenant_id: None,
            aggregate,
            diagnostics,
        })
    }

    /// Compare a source export against declared configuration directly: the
    /// drift check between what the tenant runs and what the code says.
    pub async fn run_export_vs_config(
        &self,
        export: ExportInput,
        config_dir: &Path,
        cancel: &CancellationToken,
        progress: Option<&ProgressFn>,
    ) -> DriftResult<ComparisonRun> {
        let mut export = self.parse_export(export).await?;
        let (references, mut diags) = self
            .load_declared_policies(config_dir, cancel, progress)
            .await;
        export.diagnostics.append(&mut diags);
        let aggregate = self.compare(&export.policies, &references);
        Ok(ComparisonRun {
            tenant_id: export.tenant_id,
            aggregate,
            diagnostics: export.diagnostics,
        })
    }
}

/// Same-format pairs diff on the raw payload trees (`Identical` when the
/// patch is semantically empty); cross-format pairs diff on the canonical
/// model (`SemanticallyEquivalent` when no section differs).
fn classify_pair(
    source: &CanonicalPolicy,
    reference: &CanonicalPolicy,
) -> (MatchStatus, Vec<String>) {
    let same_format = source.source_format == SourceFormat::Json
        && reference.source_format == SourceFormat::Json;
    if same_format {
        let patch = diff_trees(&source.original_payload, &reference.original_payload);
        let differences = non_equivalent_leaves(&patch);
        if differences.is_empty() {
            (MatchStatus::Identical, differences)
        } else {
            (MatchStatus::Different, differences)
        }
    } else {
        let differences = diff_canonical(source, reference);
        if differences.is_empty() {
            (MatchStatus::SemanticallyEquivalent, differences)
        } else {
            (MatchStatus::Different, differences)
        }
    }
}
