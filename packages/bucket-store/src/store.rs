use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use redb::{Database, DatabaseError, ReadOnlyDatabase, ReadableDatabase, TableDefinition};

use crate::bucket::{self, Bucket, BucketMut, RawKey, RawReader, RawTable};
use crate::error::Error;
use crate::path::BucketPath;

const BUCKETS: TableDefinition<RawKey, RawKey> = TableDefinition::new("buckets");

/// How often a blocked open retries the file lock.
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Settings applied every time the store file is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenOptions {
    /// Longest wait for the file lock when opening read-write.
    pub timeout: Duration,
    /// Longest wait for the file lock when opening read-only. `None` uses
    /// `timeout`.
    pub read_only_timeout: Option<Duration>,
    /// Permission bits for a newly created store file (unix only).
    pub mode: u32,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            read_only_timeout: None,
            mode: 0o600,
        }
    }
}

/// A file-backed store of nested buckets.
///
/// `BucketStore` holds no open handle. Each [`view`](BucketStore::view) and
/// [`update`](BucketStore::update) opens the file, runs exactly one
/// transaction and closes the file again before returning, on success and
/// on failure alike.
///
/// # Example
///
/// ```rust,no_run
/// use agentdb_bucket_store::{BucketStore, Error, OpenOptions};
///
/// let store = BucketStore::new("/tmp/agent.db", OpenOptions::default());
/// store.update(|tx| {
///     tx.create_bucket_if_not_exists("containers")?
///         .create_bucket_if_not_exists("web")?
///         .put("ip", "10.10.0.2")
/// })?;
///
/// let ip = store.view(|tx| match tx.bucket_at(&["containers", "web"])? {
///     Some(web) => web.get("ip"),
///     None => Ok(None),
/// })?;
/// assert_eq!(ip.as_deref(), Some("10.10.0.2"));
/// # Ok::<(), Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct BucketStore {
    path: PathBuf,
    options: OpenOptions,
}

impl BucketStore {
    pub fn new(path: impl Into<PathBuf>, options: OpenOptions) -> Self {
        Self {
            path: path.into(),
            options,
        }
    }

    /// Location of the store file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn options(&self) -> &OpenOptions {
        &self.options
    }

    /// Run `f` inside a read-only transaction.
    pub fn view<R, E, F>(&self, f: F) -> Result<R, E>
    where
        E: From<Error>,
        F: FnOnce(&ReadTx) -> Result<R, E>,
    {
        let db = self.open_read_only()?;
        let txn = db.begin_read().map_err(Error::from)?;
        let table = match txn.open_table(BUCKETS) {
            Ok(table) => Some(table),
            // Nothing was ever written.
            Err(redb::TableError::TableDoesNotExist(_)) => None,
            Err(err) => return Err(Error::from(err).into()),
        };

        let result = f(&ReadTx { table });
        drop(txn);
        log::debug!("Closing {}...", self.path.display());
        drop(db);
        result
    }

    /// Run `f` inside a read-write transaction.
    ///
    /// The transaction commits when `f` returns `Ok` and is aborted when it
    /// returns `Err`, leaving the store untouched.
    pub fn update<R, E, F>(&self, f: F) -> Result<R, E>
    where
        E: From<Error>,
        F: FnOnce(&mut WriteTx<'_>) -> Result<R, E>,
    {
        let db = self.open_read_write()?;
        let txn = db.begin_write().map_err(Error::from)?;

        let result = {
            let table = txn.open_table(BUCKETS).map_err(Error::from)?;
            let mut tx = WriteTx { table };
            f(&mut tx)
        };

        match result {
            Ok(value) => {
                txn.commit().map_err(Error::from)?;
                log::debug!("Closing {}...", self.path.display());
                Ok(value)
            }
            Err(err) => {
                if let Err(abort_err) = txn.abort() {
                    log::warn!(
                        "Aborting transaction on {}: {}",
                        self.path.display(),
                        abort_err
                    );
                }
                log::debug!("Closing {}...", self.path.display());
                Err(err)
            }
        }
    }

    fn open_read_only(&self) -> Result<ReadOnlyDatabase, Error> {
        self.ensure_initialized();
        log::debug!("Opening {} read-only...", self.path.display());
        let timeout = self.options.read_only_timeout.unwrap_or(self.options.timeout);
        wait_for_lock(&self.path, timeout, || {
            ReadOnlyDatabase::open(&self.path)
        })
    }

    fn open_read_write(&self) -> Result<Database, Error> {
        self.ensure_initialized();
        log::debug!("Opening {} read-write...", self.path.display());
        wait_for_lock(&self.path, self.options.timeout, || {
            Database::create(&self.path)
        })
    }

    /// Create an empty store file if none exists yet.
    ///
    /// Failures are only logged; the open that follows reports them.
    fn ensure_initialized(&self) {
        if self.path.exists() {
            return;
        }
        if let Err(err) = self.initialize() {
            log::warn!("Creating database {}: {}", self.path.display(), err);
        }
    }

    fn initialize(&self) -> Result<(), Error> {
        let mut options = fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(self.options.mode);
        }

        match options.open(&self.path) {
            Ok(_) => {}
            Err(error) if error.kind() == io::ErrorKind::AlreadyExists => {}
            Err(error) => {
                return Err(Error::Io {
                    path: self.path.clone(),
                    error,
                })
            }
        }

        log::debug!("Initializing {}...", self.path.display());
        let db = wait_for_lock(&self.path, self.options.timeout, || {
            Database::create(&self.path)
        })?;
        drop(db);
        Ok(())
    }
}

/// Retry `open` while another handle holds the file lock, up to `timeout`.
fn wait_for_lock<D>(
    path: &Path,
    timeout: Duration,
    mut open: impl FnMut() -> Result<D, DatabaseError>,
) -> Result<D, Error> {
    let deadline = Instant::now() + timeout;
    loop {
        match open() {
            Err(DatabaseError::DatabaseAlreadyOpen) => {
                if Instant::now() >= deadline {
                    return Err(Error::LockTimeout {
                        path: path.to_path_buf(),
                        timeout,
                    });
                }
                thread::sleep(LOCK_POLL_INTERVAL);
            }
            other => return other.map_err(Error::from),
        }
    }
}

/// A read-only transaction.
pub struct ReadTx {
    table: Option<redb::ReadOnlyTable<RawKey, RawKey>>,
}

impl ReadTx {
    fn root(&self) -> Option<Bucket<'_>> {
        self.table
            .as_ref()
            .map(|table| Bucket::new(table as &dyn RawReader, BucketPath::root()))
    }

    /// The top-level bucket `name`, if it exists.
    pub fn bucket(&self, name: &str) -> Result<Option<Bucket<'_>>, Error> {
        match self.root() {
            Some(root) => root.bucket(name),
            None => Ok(None),
        }
    }

    /// Follow `names` down from the root, one level per name.
    pub fn bucket_at(&self, names: &[&str]) -> Result<Option<Bucket<'_>>, Error> {
        match self.root() {
            Some(root) => root.bucket_at(names),
            None => Ok(None),
        }
    }

    /// Names of the top-level buckets.
    pub fn buckets(&self) -> Result<Vec<String>, Error> {
        match self.root() {
            Some(root) => root.buckets(),
            None => Ok(Vec::new()),
        }
    }
}

/// A read-write transaction.
pub struct WriteTx<'txn> {
    table: RawTable<'txn>,
}

impl<'txn> WriteTx<'txn> {
    fn root(&mut self) -> BucketMut<'_, 'txn> {
        BucketMut::new(&mut self.table, BucketPath::root())
    }

    /// Read view of the top-level bucket `name`.
    pub fn bucket(&self, name: &str) -> Result<Option<Bucket<'_>>, Error> {
        Bucket::new(&self.table as &dyn RawReader, BucketPath::root()).bucket(name)
    }

    pub fn bucket_mut(&mut self, name: &str) -> Result<Option<BucketMut<'_, 'txn>>, Error> {
        self.bucket_mut_at(&[name])
    }

    /// Follow `names` down from the root, one level per name.
    pub fn bucket_mut_at(&mut self, names: &[&str]) -> Result<Option<BucketMut<'_, 'txn>>, Error> {
        let mut root = self.root();
        let Some(found) = root.bucket_mut_at(names)? else {
            return Ok(None);
        };
        let path = found.path().clone();
        Ok(Some(BucketMut::new(&mut self.table, path)))
    }

    pub fn create_bucket_if_not_exists(&mut self, name: &str) -> Result<BucketMut<'_, 'txn>, Error> {
        let path = bucket::create_bucket(&mut self.table, &BucketPath::root(), name)?;
        Ok(BucketMut::new(&mut self.table, path))
    }

    /// Remove the top-level bucket `name` and everything below it.
    pub fn delete_bucket(&mut self, name: &str) -> Result<bool, Error> {
        bucket::delete_bucket(&mut self.table, &BucketPath::root(), name)
    }

    /// Names of the top-level buckets.
    pub fn buckets(&self) -> Result<Vec<String>, Error> {
        Bucket::new(&self.table as &dyn RawReader, BucketPath::root()).buckets()
    }
}
