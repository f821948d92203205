//! Tree building service
//!
//! Loads flat records, selects the roots to build from and runs the builder
//! with the configured strategy.

use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use crate::application::{ApplicationError, ApplicationResult, IoResultExt};
use crate::config::{Settings, SortOrder, Strategy};
use crate::domain::{
    BuildOptions, CancellationToken, ExpandFields, FlatRecord, IndexedSource, RecordSource,
    TreeBuilder, TreeError, TreeNode,
};
use crate::infrastructure::traits::FileSystem;

/// What to build and how to post-process it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildRequest {
    /// Code of the record to build from; None builds every root-level record
    pub root: Option<String>,
    pub expand: ExpandFields,
    pub sort: SortOrder,
    pub strategy: Strategy,
}

impl BuildRequest {
    /// Request populated from settings; callers override per invocation.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            root: None,
            expand: settings.expand_fields(),
            sort: settings.output.sort,
            strategy: settings.build.strategy,
        }
    }
}

/// Output from building trees: the completed trees plus every reported failure.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TreeReport {
    pub trees: Vec<TreeNode>,
    pub failures: Vec<TreeError>,
}

impl TreeReport {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn was_cancelled(&self) -> bool {
        self.failures.contains(&TreeError::Cancelled)
    }

    /// Pretty JSON of the trees (one tree is emitted as an object, several as an array).
    pub fn to_json(&self) -> ApplicationResult<String> {
        let result = match self.trees.as_slice() {
            [single] => serde_json::to_string_pretty(single),
            trees => serde_json::to_string_pretty(trees),
        };
        result.map_err(|e| ApplicationError::OperationFailed {
            context: "serialize trees".to_string(),
            source: Box::new(e),
        })
    }
}

/// Accepted record file layouts: a bare array or `{"records": [...]}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum RecordFile {
    List(Vec<FlatRecord>),
    Wrapped { records: Vec<FlatRecord> },
}

/// Service for turning record files into trees.
pub struct TreeService {
    fs: Arc<dyn FileSystem>,
    options: BuildOptions,
    cancel: CancellationToken,
}

impl TreeService {
    /// Create a new tree service.
    pub fn new(fs: Arc<dyn FileSystem>, options: BuildOptions) -> Self {
        Self {
            fs,
            options,
            cancel: CancellationToken::new(),
        }
    }

    /// Share an externally owned cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Read and parse a JSON record file.
    #[instrument(level = "debug", skip(self))]
    pub fn load_records(&self, path: &Path) -> ApplicationResult<Vec<FlatRecord>> {
        if !self.fs.is_file(path) {
            return Err(ApplicationError::OperationFailed {
                context: format!("record file not found: {}", path.display()),
                source: Box::new(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "file does not exist",
                )),
            });
        }
        let content = self
            .fs
            .read_to_string(path)
            .with_path_context("read records", path)?;
        let records = Self::parse_records(&content).map_err(|e| ApplicationError::InvalidInput {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        debug!("loaded {} records from {}", records.len(), path.display());
        Ok(records)
    }

    /// Parse records from JSON text.
    pub fn parse_records(content: &str) -> serde_json::Result<Vec<FlatRecord>> {
        Ok(match serde_json::from_str(content)? {
            RecordFile::List(records) => records,
            RecordFile::Wrapped { records } => records,
        })
    }

    /// Root-level records (no superior), in file order.
    pub fn roots(records: &[FlatRecord]) -> Vec<&FlatRecord> {
        records.iter().filter(|r| r.is_root()).collect()
    }

    /// Records to build from: the one with code `root`, or all root-level records.
    pub fn select_roots(
        records: &[FlatRecord],
        root: Option<&str>,
    ) -> ApplicationResult<Vec<FlatRecord>> {
        match root {
            Some(code) => records
                .iter()
                .find(|r| r.code.as_deref() == Some(code))
                .map(|r| vec![r.clone()])
                .ok_or_else(|| ApplicationError::RootNotFound(code.to_string())),
            None => Ok(Self::roots(records).into_iter().cloned().collect()),
        }
    }

    /// Build one tree per selected root.
    #[instrument(level = "debug", skip(self, records))]
    pub async fn build(
        &self,
        records: Vec<FlatRecord>,
        request: &BuildRequest,
    ) -> ApplicationResult<TreeReport> {
        let roots = Self::select_roots(&records, request.root.as_deref())?;
        if roots.is_empty() {
            warn!("no root-level records found");
        }
        let fields = (!request.expand.is_empty()).then_some(&request.expand);
        let builder = TreeBuilder::new(self.options).with_cancellation(self.cancel.clone());

        let mut report = match request.strategy {
            Strategy::Scan => build_all(&builder, &roots, &records, fields).await,
            Strategy::Indexed => {
                let indexed = IndexedSource::new(records);
                build_all(&builder, &roots, &indexed, fields).await
            }
        };

        for tree in &mut report.trees {
            match request.sort {
                SortOrder::None => {}
                SortOrder::Name => tree.sort_by_name(),
                SortOrder::Code => tree.sort_by_code(),
            }
        }
        info!(
            "built {} trees with {} failures",
            report.trees.len(),
            report.failures.len()
        );
        Ok(report)
    }
}

async fn build_all<S>(
    builder: &TreeBuilder,
    roots: &[FlatRecord],
    source: &S,
    fields: Option<&ExpandFields>,
) -> TreeReport
where
    S: RecordSource<FlatRecord> + ?Sized,
{
    let mut report = TreeReport::default();
    for root in roots {
        let build = builder.build_tree(root, source, fields).await;
        let cancelled = build.was_cancelled();
        report.trees.extend(build.root);
        report.failures.extend(build.failures);
        if cancelled {
            break;
        }
    }
    report
}
