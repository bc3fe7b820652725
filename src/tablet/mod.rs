// Copyright 2025 Tablite Project Authors. Licensed under Apache-2.0.

//! The tablet: the coordinator of the memstore, the on-disk layer set,
//! flushes, compactions and merged reads.
//!
//! A tablet is a directory:
//!
//! ```plain
//! <tablet>/
//! |- manifest.json          schema, written at create, checked at open
//! |- layer_0000000000/      lexicographic order = creation order
//! |  |- key.cf              encoded composite key, value-indexed
//! |  |- 000.col .. NNN.col  one file per column, by column index
//! \- layer_0000000001/
//! ```
//!
//! In-progress layers are written under a `.tmp` suffix and renamed into
//! place as a unit; stale temporaries are vacuumed at open.

mod layer;
mod layer_builder;
mod layer_iterator;
mod memstore;
mod merge_iterator;


use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use itertools::Itertools;
use moka::future::Cache;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

pub use layer::{DiskLayer, KeysFlushedLayer, Layer};
pub use layer_builder::{EncodedLayer, LayerBuilder, LayerWriter};
pub use layer_iterator::DiskLayerIterator;
pub use memstore::{MemStore, MemStoreIterator};
pub use merge_iterator::{MergeIterator, SourceIterator};

use self::layer_builder::path_of_key_file;
use crate::catalog::Schema;
use crate::cfile::{BlockCache, BlockCacheKey, CFileOptions, CFileReader};
use crate::error::{StorageResult, TracedStorageError};
use crate::options::StorageOptions;
use crate::row::{Row, RowBlock, RowDelta};
use crate::types::Value;

pub(crate) type PackedVec<T> = smallvec::SmallVec<[T; 8]>;

const MANIFEST_FILE_NAME: &str = "manifest.json";
const LAYER_DIR_PREFIX: &str = "layer_";
const TMP_SUFFIX: &str = ".tmp";

/// Batch size used when draining the memstore or a merge into a layer.
const BUILD_BATCH_SIZE: usize = 1024;

#[derive(Serialize, Deserialize)]
struct TabletManifest {
    schema: Schema,
}

/// The atomically published mutable state: the current memstore plus the
/// ordered layer set, oldest layer first. Cloning pins a snapshot.
#[derive(Clone)]
struct TabletComponents {
    memstore: Arc<MemStore>,
    layers: Vec<Arc<Layer>>,
}

/// A single-shard table storage unit.
///
/// Inserts, updates, flushes and compactions are serialized through one
/// write lock; reads are concurrent with each other and with writes, and
/// every reader works against the component snapshot taken when its
/// iterator was built.
pub struct Tablet {
    schema: Schema,
    path: PathBuf,
    options: StorageOptions,
    block_cache: BlockCache,
    components: RwLock<TabletComponents>,
    write_lock: tokio::sync::Mutex<()>,
    next_layer_id: AtomicU64,
}

impl Tablet {
    /// Create a new tablet directory with `schema`, then open it.
    pub async fn create(
        path: impl AsRef<Path>,
        schema: Schema,
        options: StorageOptions,
    ) -> StorageResult<Tablet> {
        if schema.num_key_columns() == 0 {
            return Err(TracedStorageError::invalid_argument(
                "tablet schema needs at least one key column",
            ));
        }
        let path = path.as_ref();
        tokio::fs::create_dir_all(path).await?;
        let manifest_path = path.join(MANIFEST_FILE_NAME);
        if tokio::fs::try_exists(&manifest_path).await? {
            return Err(TracedStorageError::invalid_argument(format!(
                "tablet already exists at {}",
                path.display()
            )));
        }
        let manifest = TabletManifest { schema };
        let data = serde_json::to_vec_pretty(&manifest)?;
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&manifest_path)
            .await?;
        file.write_all(&data).await?;
        if options.enable_fsync {
            file.sync_all().await?;
        }
        Self::open(path, options).await
    }

    /// Open an existing tablet: read the manifest, vacuum stale temporary
    /// directories, and open every layer in creation order.
    pub async fn open(path: impl AsRef<Path>, options: StorageOptions) -> StorageResult<Tablet> {
        let path = path.as_ref().to_path_buf();
        let data = tokio::fs::read(path.join(MANIFEST_FILE_NAME)).await?;
        let manifest: TabletManifest = serde_json::from_slice(&data)?;
        let schema = manifest.schema;
        let block_cache = Cache::new(options.cache_size);

        let mut layer_dirs = vec![];
        let mut read_dir = tokio::fs::read_dir(&path).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(TMP_SUFFIX) {
                warn!("removing stale temporary dir {}", entry.path().display());
                tokio::fs::remove_dir_all(entry.path()).await?;
                continue;
            }
            if name.starts_with(LAYER_DIR_PREFIX) {
                layer_dirs.push(name);
            }
        }
        layer_dirs.sort();

        let mut layers: Vec<Arc<Layer>> = vec![];
        let mut next_layer_id = 0;
        for name in layer_dirs {
            let layer_id: u64 = name[LAYER_DIR_PREFIX.len()..].parse().map_err(|_| {
                TracedStorageError::decode(format!("bad layer directory name {}", name))
            })?;
            let layer = DiskLayer::open(
                path.join(&name),
                schema.clone(),
                layer_id,
                block_cache.clone(),
            )
            .await?;
            let layer = Arc::new(Layer::Disk(layer));
            info!("opened {}", layer);
            layers.push(layer);
            next_layer_id = next_layer_id.max(layer_id + 1);
        }

        Ok(Tablet {
            components: RwLock::new(TabletComponents {
                memstore: Arc::new(MemStore::new(schema.clone())),
                layers,
            }),
            schema,
            path,
            options,
            block_cache,
            write_lock: tokio::sync::Mutex::new(()),
            next_layer_id: AtomicU64::new(next_layer_id),
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    fn snapshot(&self) -> TabletComponents {
        self.components.read().clone()
    }

    /// Insert a row. The key must not exist anywhere in the tablet, in the
    /// memstore or in any layer.
    pub async fn insert(&self, row: Row) -> StorageResult<()> {
        let _guard = self.write_lock.lock().await;
        if row.values().len() != self.schema.num_columns() {
            return Err(TracedStorageError::invalid_argument(format!(
                "row has {} values, schema has {} columns",
                row.values().len(),
                self.schema.num_columns()
            )));
        }
        let key = self.schema.encode_key(row.key_values(&self.schema))?;
        let components = self.snapshot();
        for layer in components.layers.iter().rev() {
            if layer.check_row_present(&key).await? {
                return Err(TracedStorageError::already_present(format!(
                    "{:?}",
                    row.key_values(&self.schema)
                )));
            }
        }
        components.memstore.insert(key, &row)
    }

    /// Update the non-key columns of an existing row.
    ///
    /// Rows resident in the memstore are updated in place. Rows resident in
    /// a layer are not updatable in the current layer variants, so the
    /// update reports NotSupported; a missing key reports NotFound.
    pub async fn update_row(&self, key: &[Value], delta: &RowDelta) -> StorageResult<()> {
        let _guard = self.write_lock.lock().await;
        let encoded = self.schema.encode_key(key)?;
        let components = self.snapshot();
        if components.memstore.check_row_present(&encoded) {
            return components.memstore.update_row(&encoded, delta);
        }
        for layer in components.layers.iter().rev() {
            if layer.check_row_present(&encoded).await? {
                return layer.update_row(&encoded, delta);
            }
        }
        Err(TracedStorageError::not_found("row", format!("{:?}", key)))
    }

    /// Whether a row with the given key is visible anywhere in the tablet.
    pub async fn check_row_present(&self, key: &[Value]) -> StorageResult<bool> {
        let encoded = self.schema.encode_key(key)?;
        let components = self.snapshot();
        if components.memstore.check_row_present(&encoded) {
            return Ok(true);
        }
        for layer in components.layers.iter().rev() {
            if layer.check_row_present(&encoded).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Freeze the current memstore into a new layer.
    ///
    /// Runs in two phases: the key file is persisted first and a
    /// keys-flushed handoff layer is published together with a fresh
    /// memstore, so readers start using the on-disk key index while the
    /// data columns are still being written; once the directory is renamed
    /// into place the handoff layer is swapped for the opened disk layer.
    /// On failure the temporary directory is removed and the retired
    /// memstore is published again, unchanged.
    pub async fn flush(&self) -> StorageResult<()> {
        let _guard = self.write_lock.lock().await;
        let retired = self.components.read().memstore.clone();
        if retired.is_empty() {
            debug!("flush skipped: memstore is empty");
            return Ok(());
        }
        let layer_id = self.next_layer_id.fetch_add(1, Ordering::SeqCst);
        let final_dir = self.layer_dir(layer_id);
        let tmp_dir = final_dir.with_extension("tmp");
        info!(
            "flushing memstore ({} rows) to layer {}",
            retired.entry_count(),
            layer_id
        );

        if let Err(e) = self
            .flush_inner(&retired, layer_id, &tmp_dir, &final_dir)
            .await
        {
            {
                let mut components = self.components.write();
                let installed = matches!(
                    components.layers.last().map(|l| l.layer_id()),
                    Some(id) if id == layer_id
                );
                if installed {
                    components.layers.pop();
                }
                components.memstore = retired;
            }
            let _ = tokio::fs::remove_dir_all(&tmp_dir).await;
            let _ = tokio::fs::remove_dir_all(&final_dir).await;
            return Err(e);
        }
        Ok(())
    }

    async fn flush_inner(
        &self,
        retired: &Arc<MemStore>,
        layer_id: u64,
        tmp_dir: &Path,
        final_dir: &Path,
    ) -> StorageResult<()> {
        // encode every column in memory
        let mut builder = LayerBuilder::new(
            &self.schema,
            CFileOptions::from_storage_options(&self.options),
        );
        let mut iter = retired.iter(self.schema.clone())?;
        let mut block = RowBlock::new(self.schema.clone(), BUILD_BATCH_SIZE);
        let mut keys = vec![];
        loop {
            let n = iter.next_batch(&mut block, Some(&mut keys));
            if n == 0 {
                break;
            }
            for i in 0..n {
                builder.append(&keys[i], block.row(i));
            }
        }
        let encoded = builder.finish();

        // phase one: persist the key file and hand readers the key index
        tokio::fs::create_dir(tmp_dir).await?;
        let writer = LayerWriter::new(tmp_dir, self.options.enable_fsync);
        writer.write_key_file(&encoded).await?;
        let key_reader = CFileReader::open(
            path_of_key_file(tmp_dir),
            self.block_cache.clone(),
            BlockCacheKey::default().layer(layer_id).file(0),
        )
        .await?;
        let handoff = Arc::new(Layer::KeysFlushed(KeysFlushedLayer::new(
            layer_id,
            key_reader,
            retired.clone(),
        )));
        {
            let mut components = self.components.write();
            components.layers.push(handoff);
            components.memstore = Arc::new(MemStore::new(self.schema.clone()));
        }

        // phase two: persist the data columns and swap in the disk layer
        writer.write_data_files(&encoded).await?;
        tokio::fs::rename(tmp_dir, final_dir).await?;
        let layer = DiskLayer::open(
            final_dir.to_path_buf(),
            self.schema.clone(),
            layer_id,
            self.block_cache.clone(),
        )
        .await?;
        {
            let mut components = self.components.write();
            let slot = components.layers.last_mut().unwrap();
            debug_assert_eq!(slot.layer_id(), layer_id);
            *slot = Arc::new(Layer::Disk(layer));
        }
        info!(
            "flushed layer {} ({} rows)",
            layer_id,
            retired.entry_count()
        );
        Ok(())
    }

    /// Merge all current layers into one and swap them out atomically.
    /// Inputs are deleted only after the merged output is durable and
    /// published; readers holding the old layers keep their open handles.
    pub async fn compact(&self) -> StorageResult<()> {
        let _guard = self.write_lock.lock().await;
        let inputs = self.components.read().layers.clone();
        if inputs.len() <= 1 {
            debug!("compaction skipped: {} layer(s)", inputs.len());
            return Ok(());
        }
        let layer_id = self.next_layer_id.fetch_add(1, Ordering::SeqCst);
        let final_dir = self.layer_dir(layer_id);
        let tmp_dir = final_dir.with_extension("tmp");
        info!("compacting {} layers into layer {}", inputs.len(), layer_id);

        if let Err(e) = self
            .compact_inner(&inputs, layer_id, &tmp_dir, &final_dir)
            .await
        {
            let _ = tokio::fs::remove_dir_all(&tmp_dir).await;
            let _ = tokio::fs::remove_dir_all(&final_dir).await;
            return Err(e);
        }
        Ok(())
    }

    async fn compact_inner(
        &self,
        inputs: &[Arc<Layer>],
        layer_id: u64,
        tmp_dir: &Path,
        final_dir: &Path,
    ) -> StorageResult<()> {
        // newest first, so key collisions resolve to the newest row
        let mut sources = vec![];
        for layer in inputs.iter().rev() {
            sources.push(layer.iter(self.schema.clone())?);
        }
        let mut merge = MergeIterator::new(sources, self.schema.clone());

        let mut builder = LayerBuilder::new(
            &self.schema,
            CFileOptions::from_storage_options(&self.options),
        );
        let mut block = RowBlock::new(self.schema.clone(), BUILD_BATCH_SIZE);
        let mut keys = vec![];
        loop {
            let n = merge.next_batch(&mut block, Some(&mut keys)).await?;
            if n == 0 {
                break;
            }
            for i in 0..n {
                builder.append(&keys[i], block.row(i));
            }
        }
        let encoded = builder.finish();

        tokio::fs::create_dir(tmp_dir).await?;
        let writer = LayerWriter::new(tmp_dir, self.options.enable_fsync);
        writer.write_key_file(&encoded).await?;
        writer.write_data_files(&encoded).await?;
        tokio::fs::rename(tmp_dir, final_dir).await?;

        let output = DiskLayer::open(
            final_dir.to_path_buf(),
            self.schema.clone(),
            layer_id,
            self.block_cache.clone(),
        )
        .await?;
        {
            let mut components = self.components.write();
            debug_assert_eq!(components.layers.len(), inputs.len());
            components.layers = vec![Arc::new(Layer::Disk(output))];
        }

        for layer in inputs {
            info!("vacuum {}", layer);
            if let Layer::Disk(disk) = &**layer {
                tokio::fs::remove_dir_all(disk.dir()).await?;
            }
        }
        info!(
            "compaction complete: {} -> {}",
            inputs.iter().map(|l| l.layer_id()).join(","),
            layer_id
        );
        Ok(())
    }

    /// A merged, projected iterator over a snapshot of the current
    /// components. Layers flushed after this call are not observed; the
    /// memstore content stays live.
    pub fn new_row_iterator(&self, projection: Schema) -> StorageResult<TabletIterator> {
        let components = self.snapshot();
        let mut sources = vec![SourceIterator::Mem(
            components.memstore.iter(projection.clone())?,
        )];
        for layer in components.layers.iter().rev() {
            sources.push(layer.iter(projection.clone())?);
        }
        Ok(TabletIterator {
            merge: MergeIterator::new(sources, projection),
            table_schema: self.schema.clone(),
        })
    }

    /// Sum of the memstore and per-layer row counts. Not adjusted for
    /// cross-store duplicates, which readers never observe because the
    /// merge deduplicates them.
    pub fn count_rows(&self) -> usize {
        let components = self.snapshot();
        components.memstore.entry_count()
            + components
                .layers
                .iter()
                .map(|layer| layer.count_rows())
                .sum::<usize>()
    }

    fn layer_dir(&self, layer_id: u64) -> PathBuf {
        self.path.join(format!("{}{:010}", LAYER_DIR_PREFIX, layer_id))
    }
}

/// A projected, merged scan over a tablet snapshot.
#[derive(Debug)]
pub struct TabletIterator {
    merge: MergeIterator,
    table_schema: Schema,
}

impl TabletIterator {
    pub fn schema(&self) -> &Schema {
        self.merge.schema()
    }

    pub fn has_next(&self) -> bool {
        self.merge.has_next()
    }

    /// Seek to the first row at or after the given key tuple, which must be
    /// in the tablet's key schema, not the projection. An empty tuple seeks
    /// to the start. Returns whether the key matched exactly.
    pub async fn seek_at_or_after(&mut self, key: &[Value]) -> StorageResult<bool> {
        let encoded = if key.is_empty() {
            vec![]
        } else {
            self.table_schema.encode_key(key)?
        };
        self.merge.seek_at_or_after(&encoded).await
    }

    /// Ordinals are per-store, so an ordinal seek on the merged stream is
    /// not supported; use [`seek_at_or_after`](TabletIterator::seek_at_or_after).
    pub fn seek_to_ordinal(&mut self, _ordinal: u32) -> StorageResult<()> {
        Err(TracedStorageError::not_supported(
            "ordinal seek on a merged scan",
        ))
    }

    /// Fill `block` with the next merged rows; returns the row count, 0 at
    /// the end of the scan.
    pub async fn next_batch(&mut self, block: &mut RowBlock) -> StorageResult<usize> {
        self.merge.next_batch(block, None).await
    }
}
