//! Record sources: re-iterable async sequences of flat records.

use std::collections::HashMap;
use std::future;

use futures::stream::{self, BoxStream, StreamExt};
use tracing::{debug, instrument};

use crate::domain::membership::is_child_of;
use crate::domain::record::TreeRecord;

/// Supplies the flat record collection to the tree builder.
///
/// `records` must be re-iterable: the builder asks for a fresh stream once per
/// tree level, and every stream must describe the same logical collection.
pub trait RecordSource<T>: Sync
where
    T: TreeRecord + Send,
{
    /// Stream every record in the collection.
    fn records(&self) -> BoxStream<'_, T>;

    /// Stream the direct children of `parent_id`, in collection order.
    ///
    /// The default scans `records` and applies the membership predicate.
    fn children_of<'a>(&'a self, parent_id: &T::Id) -> BoxStream<'a, T>
    where
        T: 'a,
    {
        let parent_id = parent_id.clone();
        self.records()
            .filter(move |candidate| future::ready(is_child_of(&parent_id, candidate)))
            .boxed()
    }
}

impl<T> RecordSource<T> for [T]
where
    T: TreeRecord + Clone + Send + Sync,
{
    fn records(&self) -> BoxStream<'_, T> {
        stream::iter(self.iter().cloned()).boxed()
    }
}

impl<T> RecordSource<T> for Vec<T>
where
    T: TreeRecord + Clone + Send + Sync,
{
    fn records(&self) -> BoxStream<'_, T> {
        self.as_slice().records()
    }
}

/// Records held in memory with a parent-id index built once.
///
/// Answers `children_of` with a map lookup instead of a full scan per level.
#[derive(Debug, Clone)]
pub struct IndexedSource<T: TreeRecord> {
    records: Vec<T>,
    by_superior: HashMap<T::Id, Vec<usize>>,
}

impl<T> IndexedSource<T>
where
    T: TreeRecord + Clone + Send + Sync,
{
    pub fn new(records: Vec<T>) -> Self {
        let mut by_superior: HashMap<T::Id, Vec<usize>> = HashMap::new();
        for (idx, record) in records.iter().enumerate() {
            if let Some(superior) = record.superior_id() {
                by_superior.entry(superior).or_default().push(idx);
            }
        }
        Self {
            records,
            by_superior,
        }
    }

    /// Drain another source once and index its records.
    #[instrument(level = "debug", skip_all)]
    pub async fn collect_from<S>(source: &S) -> Self
    where
        S: RecordSource<T> + ?Sized,
    {
        let records: Vec<T> = source.records().collect().await;
        debug!("indexing {} records", records.len());
        Self::new(records)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.records
    }
}

impl<T> RecordSource<T> for IndexedSource<T>
where
    T: TreeRecord + Clone + Send + Sync,
{
    fn records(&self) -> BoxStream<'_, T> {
        self.records.as_slice().records()
    }

    fn children_of<'a>(&'a self, parent_id: &T::Id) -> BoxStream<'a, T>
    where
        T: 'a,
    {
        match self.by_superior.get(parent_id) {
            Some(indices) => {
                stream::iter(indices.iter().map(move |&i| self.records[i].clone())).boxed()
            }
            None => stream::empty().boxed(),
        }
    }
}
