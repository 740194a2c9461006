use super::CacheStore;
use anyhow::{Context, Result};
use rocksdb::{Options, DB};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// RocksDB column families
///
/// - "default": unused, always present in RocksDB
/// - "http_cache": serialized HTTP cache records keyed by request URL
const CF_DEFAULT: &str = "default";
const CF_HTTP_CACHE: &str = "http_cache";

/// Persistent store under `<home>/db`
///
/// RocksDB takes a lock on the directory, so only one runtime can hold a given home's store
/// open at a time; a second open fails instead of sharing.
pub struct RocksStore {
    path: PathBuf,
    db: DB,
}

impl RocksStore {
    /// Open (or create) the store at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create database directory")?;
        }

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        opts.set_compression_type(rocksdb::DBCompressionType::Snappy);
        opts.increase_parallelism(num_cpus::get() as i32);

        // Disable statistics to reduce overhead and potential shutdown issues
        opts.set_statistics_level(rocksdb::statistics::StatsLevel::DisableAll);

        let db = DB::open_cf(&opts, path, [CF_DEFAULT, CF_HTTP_CACHE])
            .with_context(|| format!("Failed to open cache database at {}", path.display()))?;

        debug!(path = %path.display(), "opened cache database");

        Ok(Self {
            path: path.to_path_buf(),
            db,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn cf(&self) -> Result<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(CF_HTTP_CACHE)
            .context("Failed to get http_cache column family handle")
    }
}

impl Drop for RocksStore {
    fn drop(&mut self) {
        // Flush pending writes so the cache survives the restart
        if let Err(e) = self.db.flush() {
            tracing::warn!("Failed to flush cache database on shutdown: {}", e);
        }

        // Stop background compaction before the handle is released
        self.db.cancel_all_background_work(true);
    }
}

impl CacheStore for RocksStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.db
            .get_cf(self.cf()?, key)
            .context("Failed to read cache record")
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.db
            .put_cf(self.cf()?, key, value)
            .context("Failed to write cache record")
    }
}
