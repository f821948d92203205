//! Tree builder: turns a flat record stream into nested, fully resolved subtrees.

use std::future::{self, Future};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::Notify;
use tracing::{debug, instrument, warn};

use crate::domain::error::{TreeError, TreeResult};
use crate::domain::expand::{expand, ExpandFields};
use crate::domain::node::TreeNode;
use crate::domain::record::{record_label, TreeRecord};
use crate::domain::source::RecordSource;

/// Default bound on levels below the superior of a build.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Highest accepted `max_depth`.
///
/// Every level nests one more future inside its parent's poll, so descent
/// runs on the polling thread's stack. Chains of 65 levels build on a 2 MiB
/// test thread; a 200 level chain overflows it.
pub const MAX_DEPTH_LIMIT: usize = 64;

/// Default number of sibling subtrees resolved concurrently.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Tuning knobs for a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildOptions {
    /// Levels allowed below the build's superior before descent stops
    pub max_depth: usize,
    /// Sibling subtrees resolved concurrently (at least 1)
    pub concurrency: usize,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

/// Cancellation token shared between a build and its caller.
///
/// Besides the flag it carries a [`Notify`], so streams parked on a source
/// that has no data yet are woken when the token fires.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<CancelState>,
}

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Completes once the token has been cancelled.
    pub async fn cancelled(&self) {
        loop {
            // Register before checking the flag so a concurrent cancel is not missed.
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Owned variant of [`cancelled`](Self::cancelled) for use in `'static` or
    /// borrowed-stream combinators.
    pub fn cancelled_owned(self) -> impl Future<Output = ()> + Send + 'static {
        async move { self.cancelled().await }
    }
}

/// Result of building a whole tree, root included.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TreeBuild {
    /// The root node, None when the root itself could not be read or the build
    /// was cancelled
    pub root: Option<TreeNode>,
    /// Per-record and structural failures collected along the way
    pub failures: Vec<TreeError>,
}

impl TreeBuild {
    pub fn is_complete(&self) -> bool {
        self.root.is_some() && self.failures.is_empty()
    }

    pub fn was_cancelled(&self) -> bool {
        self.failures.contains(&TreeError::Cancelled)
    }
}

/// Where the recursion currently stands: the superior's name and the ids from
/// the build's superior down to the current parent.
#[derive(Debug, Clone)]
struct Level<Id> {
    superior_name: Option<String>,
    path: Vec<Id>,
}

/// Builds trees from any [`RecordSource`].
#[derive(Debug, Clone, Default)]
pub struct TreeBuilder {
    options: BuildOptions,
    cancel: CancellationToken,
}

impl TreeBuilder {
    /// Create a builder; `max_depth` above [`MAX_DEPTH_LIMIT`] is clamped.
    pub fn new(options: BuildOptions) -> Self {
        if options.max_depth > MAX_DEPTH_LIMIT {
            warn!(
                requested = options.max_depth,
                limit = MAX_DEPTH_LIMIT,
                "max_depth clamped"
            );
        }
        Self {
            options: BuildOptions {
                max_depth: options.max_depth.min(MAX_DEPTH_LIMIT),
                concurrency: options.concurrency.max(1),
            },
            cancel: CancellationToken::new(),
        }
    }

    /// Share an externally owned cancellation token with this builder.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    /// Stream the direct children of `superior`, each as a complete subtree.
    ///
    /// Failures of single records or subtrees arrive as `Err` items and never
    /// end the stream. Children are emitted in source order, and a node is
    /// only emitted once its whole subtree and expansion are resolved. On
    /// cancellation the stream yields one `Err(TreeError::Cancelled)` and ends.
    pub fn build_children<'a, T, S>(
        &'a self,
        superior: &T,
        source: &'a S,
        fields: Option<&'a ExpandFields>,
    ) -> BoxStream<'a, TreeResult<TreeNode>>
    where
        T: TreeRecord + Send + 'a,
        S: RecordSource<T> + ?Sized,
    {
        let Some(superior_id) = superior.id() else {
            let err = TreeError::MissingId {
                record: record_label(superior),
            };
            warn!("cannot build children: {}", err);
            return stream::once(future::ready(Err(err))).boxed();
        };
        debug!(superior = ?superior_id, "building children");

        let level = Level {
            superior_name: superior.name().map(str::to_string),
            path: vec![superior_id],
        };
        stop_on_cancel(
            self.children::<T, S>(source, level, fields),
            self.cancel.clone(),
        )
    }

    /// Build `root` together with its full subtree, collecting failures on the side.
    #[instrument(level = "debug", skip_all)]
    pub async fn build_tree<T, S>(
        &self,
        root: &T,
        source: &S,
        fields: Option<&ExpandFields>,
    ) -> TreeBuild
    where
        T: TreeRecord + Send,
        S: RecordSource<T> + ?Sized,
    {
        if root.id().is_none() {
            return TreeBuild {
                root: None,
                failures: vec![TreeError::MissingId {
                    record: record_label(root),
                }],
            };
        }
        let Some(code) = root.code().filter(|c| !c.is_empty()).map(str::to_string) else {
            return TreeBuild {
                root: None,
                failures: vec![TreeError::MissingCode {
                    record: record_label(root),
                }],
            };
        };

        let mut children = Vec::new();
        let mut failures = Vec::new();
        let mut stream = self.build_children(root, source, fields);
        while let Some(item) = stream.next().await {
            match item {
                Ok(node) => children.push(node),
                Err(err) => failures.push(err),
            }
        }
        drop(stream);

        if failures.contains(&TreeError::Cancelled) {
            return TreeBuild {
                root: None,
                failures,
            };
        }

        let mut node = TreeNode::new(code, root.name().map(str::to_string));
        node.children = children;
        let node = expand(node, root, fields);
        debug!(
            code = %node.code,
            descendants = node.descendant_count(),
            failures = failures.len(),
            "tree built"
        );
        TreeBuild {
            root: Some(node),
            failures,
        }
    }

    /// Children of the last id on `level.path`, resolved concurrently in source order.
    fn children<'a, T, S>(
        &'a self,
        source: &'a S,
        level: Level<T::Id>,
        fields: Option<&'a ExpandFields>,
    ) -> BoxStream<'a, TreeResult<TreeNode>>
    where
        T: TreeRecord + Send + 'a,
        S: RecordSource<T> + ?Sized,
    {
        let Some(parent_id) = level.path.last().cloned() else {
            return stream::empty().boxed();
        };
        let cancel = self.cancel.clone();

        source
            .children_of(&parent_id)
            .take_until(cancel.clone().cancelled_owned())
            .take_while(move |_| future::ready(!cancel.is_cancelled()))
            .map(move |child| self.subtree(child, source, level.clone(), fields))
            .buffered(self.options.concurrency.max(1))
            .flat_map(stream::iter)
            .boxed()
    }

    /// Resolve one matched record into its node, preceded by any failures
    /// found in its subtree. Yields failures only when the record itself is
    /// excluded.
    fn subtree<'a, T, S>(
        &'a self,
        record: T,
        source: &'a S,
        level: Level<T::Id>,
        fields: Option<&'a ExpandFields>,
    ) -> BoxFuture<'a, Vec<TreeResult<TreeNode>>>
    where
        T: TreeRecord + Send + 'a,
        S: RecordSource<T> + ?Sized,
    {
        async move {
            if self.cancel.is_cancelled() {
                return vec![Err(TreeError::Cancelled)];
            }
            let Some(id) = record.id() else {
                let err = TreeError::MissingId {
                    record: record_label(&record),
                };
                warn!("skipping record: {}", err);
                return vec![Err(err)];
            };
            let Some(code) = record.code().filter(|c| !c.is_empty()).map(str::to_string) else {
                let err = TreeError::MissingCode {
                    record: record_label(&record),
                };
                warn!("skipping record: {}", err);
                return vec![Err(err)];
            };
            if level.path.contains(&id) {
                warn!(code = %code, "cycle detected, not descending");
                return vec![Err(TreeError::CycleDetected { code })];
            }
            if level.path.len() > self.options.max_depth {
                warn!(code = %code, max_depth = self.options.max_depth, "depth exceeded");
                return vec![Err(TreeError::DepthExceeded {
                    code,
                    max_depth: self.options.max_depth,
                })];
            }

            let name = record.name().map(str::to_string);
            let mut path = level.path;
            path.push(id);
            let next = Level {
                superior_name: name.clone(),
                path,
            };
            let resolved: Vec<TreeResult<TreeNode>> =
                self.children::<T, S>(source, next, fields).collect().await;

            if self.cancel.is_cancelled() || resolved.contains(&Err(TreeError::Cancelled)) {
                return vec![Err(TreeError::Cancelled)];
            }

            let mut out = Vec::new();
            let mut children = Vec::new();
            for item in resolved {
                match item {
                    Ok(child) => children.push(child),
                    Err(err) => out.push(Err(err)),
                }
            }

            let mut node = TreeNode::new(code, name).with_superior(level.superior_name);
            node.children = children;
            out.push(Ok(expand(node, &record, fields)));
            out
        }
        .boxed()
    }
}

/// End `stream` with a single `Cancelled` item once `cancel` fires, even
/// while `stream` is parked waiting on its source.
fn stop_on_cancel<'a>(
    stream: BoxStream<'a, TreeResult<TreeNode>>,
    cancel: CancellationToken,
) -> BoxStream<'a, TreeResult<TreeNode>> {
    let tail_cancel = cancel.clone();
    let tail = stream::once(async move {
        tail_cancel
            .is_cancelled()
            .then_some(Err(TreeError::Cancelled))
    })
    .filter_map(future::ready);

    stream
        .take_until(cancel.clone().cancelled_owned())
        .chain(tail)
        .scan(false, move |stopped, item| {
            if *stopped {
                return future::ready(None);
            }
            let item = if cancel.is_cancelled() {
                Err(TreeError::Cancelled)
            } else {
                item
            };
            if item == Err(TreeError::Cancelled) {
                *stopped = true;
            }
            future::ready(Some(item))
        })
        .boxed()
}
