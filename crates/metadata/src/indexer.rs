//! Frame metadata indexer.
//!
//! [`Indexer`] owns one engine handle and implements the index operations on
//! top of it: validated inserts, removal, lookups and the capped listings.
//! Every operation races against the caller's [`CancellationToken`].

use crate::error::{MetadataError, MetadataResult};
use crate::filter;
use crate::labels::resolve_frame_ids_for_labels;
use crate::models::{FrameRow, epoch_from_db, slot_from_db};
use crate::query::{Column, Direction, SelectQuery, Table, Values};
use crate::store::MetadataStore;
use forkchoice_core::{
    Engine, Epoch, FrameFilter, FrameMetadata, IndexedFrame, IndexerConfig, MAX_LIST_RESULTS,
    Slot, SourceSummary,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Run `fut` unless `cancel` fires first.
///
/// An already-cancelled token fails before `fut` is polled, so no I/O
/// happens. Otherwise the future is dropped when the token fires, which rolls
/// back any transaction it holds open.
pub(crate) async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> MetadataResult<T>
where
    F: Future<Output = MetadataResult<T>>,
{
    if cancel.is_cancelled() {
        return Err(MetadataError::Cancelled);
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(MetadataError::Cancelled),
        result = fut => result,
    }
}

/// Index of frame metadata over a SQLite or PostgreSQL engine.
#[derive(Clone)]
pub struct Indexer {
    store: Arc<dyn MetadataStore>,
}

impl Indexer {
    /// Wrap an already-migrated store.
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self { store }
    }

    /// Connect to the configured engine and migrate its schema.
    pub async fn open(config: &IndexerConfig) -> MetadataResult<Self> {
        let store = crate::from_config(config).await?;
        Ok(Self::new(store))
    }

    /// The underlying engine, for repository-level access.
    pub fn store(&self) -> &Arc<dyn MetadataStore> {
        &self.store
    }

    pub fn engine(&self) -> Engine {
        self.store.engine()
    }

    pub async fn health_check(&self, cancel: &CancellationToken) -> MetadataResult<()> {
        cancellable(cancel, self.store.health_check()).await
    }

    /// Index a frame's metadata and labels.
    ///
    /// Metadata is validated before any I/O. The frame row and its labels
    /// are written in one transaction; a duplicate id fails with a database
    /// error and leaves the existing frame untouched.
    pub async fn add_frame(
        &self,
        metadata: &FrameMetadata,
        cancel: &CancellationToken,
    ) -> MetadataResult<()> {
        metadata.validate()?;
        let row = FrameRow::from_metadata(metadata)?;
        let labels: Vec<&str> = metadata.unique_labels().into_iter().collect();

        cancellable(cancel, self.store.insert_frame(&row, &labels)).await?;

        tracing::debug!(
            frame_id = %row.id,
            node = %row.node,
            slot = row.wall_clock_slot,
            labels = labels.len(),
            "Indexed frame"
        );
        Ok(())
    }

    /// Remove a frame and its labels. Removing an unknown id succeeds.
    pub async fn remove_frame(&self, id: &str, cancel: &CancellationToken) -> MetadataResult<()> {
        let removed = cancellable(cancel, self.store.delete_frame(id)).await?;
        tracing::debug!(frame_id = id, removed, "Removed frame");
        Ok(())
    }

    /// Look up one frame by id.
    pub async fn get_frame(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> MetadataResult<Option<IndexedFrame>> {
        cancellable(cancel, async {
            let mut query = SelectQuery::from(Table::Frame);
            query.filter_eq(Column::Id, id).limit(1);
            let rows = self.store.fetch_frames(&query).await?;
            Ok(self.attach_labels(rows).await?.into_iter().next())
        })
        .await
    }

    /// Frames matching `filter`, earliest `fetched_at` first, ties broken by
    /// id. At most [`MAX_LIST_RESULTS`] are returned.
    pub async fn list_frames(
        &self,
        filter: &FrameFilter,
        cancel: &CancellationToken,
    ) -> MetadataResult<Vec<IndexedFrame>> {
        cancellable(cancel, async {
            let Some(mut query) = self.frame_query(filter).await? else {
                return Ok(Vec::new());
            };
            query
                .order_by(Column::FetchedAt, Direction::Asc)
                .order_by(Column::Id, Direction::Asc)
                .limit(MAX_LIST_RESULTS);

            let rows = self.store.fetch_frames(&query).await?;
            self.attach_labels(rows).await
        })
        .await
    }

    /// Distinct source nodes of frames matching `filter`, ascending.
    pub async fn list_distinct_nodes(
        &self,
        filter: &FrameFilter,
        cancel: &CancellationToken,
    ) -> MetadataResult<Vec<String>> {
        cancellable(cancel, async {
            let Some(mut query) = self.frame_query(filter).await? else {
                return Ok(Vec::new());
            };
            project_distinct(&mut query, Column::Node);
            self.store.fetch_distinct_text(&query).await
        })
        .await
    }

    /// Distinct wall clock slots of frames matching `filter`, ascending.
    pub async fn list_distinct_slots(
        &self,
        filter: &FrameFilter,
        cancel: &CancellationToken,
    ) -> MetadataResult<Vec<Slot>> {
        cancellable(cancel, async {
            let Some(mut query) = self.frame_query(filter).await? else {
                return Ok(Vec::new());
            };
            project_distinct(&mut query, Column::WallClockSlot);
            self.store
                .fetch_distinct_int(&query)
                .await?
                .into_iter()
                .map(slot_from_db)
                .collect()
        })
        .await
    }

    /// Distinct wall clock epochs of frames matching `filter`, ascending.
    pub async fn list_distinct_epochs(
        &self,
        filter: &FrameFilter,
        cancel: &CancellationToken,
    ) -> MetadataResult<Vec<Epoch>> {
        cancellable(cancel, async {
            let Some(mut query) = self.frame_query(filter).await? else {
                return Ok(Vec::new());
            };
            project_distinct(&mut query, Column::WallClockEpoch);
            self.store
                .fetch_distinct_int(&query)
                .await?
                .into_iter()
                .map(epoch_from_db)
                .collect()
        })
        .await
    }

    /// Distinct label names attached to frames matching `filter`, ascending.
    pub async fn list_distinct_labels(
        &self,
        filter: &FrameFilter,
        cancel: &CancellationToken,
    ) -> MetadataResult<Vec<String>> {
        cancellable(cancel, async {
            let mut query = SelectQuery::from(Table::FrameLabel);

            if filter.has_labels() || filter::has_predicates(filter) {
                let Some(mut frames) = self.frame_query(filter).await? else {
                    return Ok(Vec::new());
                };
                frames.distinct(Column::Id);
                let ids = self.store.fetch_distinct_text(&frames).await?;
                if ids.is_empty() {
                    return Ok(Vec::new());
                }
                query.filter_in(Column::FrameId, Values::Text(ids));
            }

            project_distinct(&mut query, Column::Name);
            self.store.fetch_distinct_text(&query).await
        })
        .await
    }

    /// Per-node summary of every indexed frame, for at most
    /// [`MAX_LIST_RESULTS`] nodes.
    pub async fn list_sources(
        &self,
        cancel: &CancellationToken,
    ) -> MetadataResult<BTreeMap<String, SourceSummary>> {
        let rows = cancellable(cancel, self.store.summarize_sources(MAX_LIST_RESULTS)).await?;
        rows.into_iter().map(|row| row.into_summary()).collect()
    }

    /// Frame query narrowed by `filter`, or `None` when the label constraint
    /// already rules out every frame.
    async fn frame_query(&self, filter: &FrameFilter) -> MetadataResult<Option<SelectQuery>> {
        let mut query = SelectQuery::from(Table::Frame);

        let required: BTreeSet<String> = filter.labels.iter().flatten().cloned().collect();
        if !required.is_empty() {
            let ids = resolve_frame_ids_for_labels(self.store.as_ref(), &required).await?;
            if ids.is_empty() {
                return Ok(None);
            }
            query.filter_in(Column::Id, Values::Text(ids.into_iter().collect()));
        }

        filter::apply(filter, &mut query)?;
        Ok(Some(query))
    }

    /// Fetch the labels of `rows` in one query and build listing entries,
    /// keeping row order.
    async fn attach_labels(&self, rows: Vec<FrameRow>) -> MetadataResult<Vec<IndexedFrame>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let mut query = SelectQuery::from(Table::FrameLabel);
        query.filter_in(
            Column::FrameId,
            Values::Text(rows.iter().map(|row| row.id.clone()).collect()),
        );

        let mut by_frame: HashMap<String, Vec<String>> = HashMap::new();
        for label in self.store.fetch_labels(&query).await? {
            by_frame.entry(label.frame_id).or_default().push(label.name);
        }

        rows.into_iter()
            .map(|row| {
                let labels = by_frame.remove(&row.id).unwrap_or_default();
                row.into_indexed(labels)
            })
            .collect()
    }
}

fn project_distinct(query: &mut SelectQuery, column: Column) {
    query
        .distinct(column)
        .order_by(column, Direction::Asc)
        .limit(MAX_LIST_RESULTS);
}
