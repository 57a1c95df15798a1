//! Bucket views over the flat key table.
//!
//! A [`Bucket`] reads a namespace and everything below it. A [`BucketMut`]
//! additionally creates, fills and deletes child namespaces. Both are cheap
//! handles made of a table reference and an encoded key prefix; they are
//! only valid inside the transaction that produced them.

use std::collections::BTreeMap;
use std::ops::Bound;

use redb::ReadableTable;

use crate::error::Error;
use crate::key::{self, Slot};
use crate::path::BucketPath;

pub(crate) type RawKey = &'static [u8];
pub(crate) type RawTable<'txn> = redb::Table<'txn, RawKey, RawKey>;

/// Byte-level access to the bucket table.
///
/// Implemented for both read-only and writable redb tables so bucket views
/// do not care which kind of transaction they live in.
///
/// # Object Safety
///
/// This trait is object-safe: buckets hold a `&dyn RawReader`.
pub(crate) trait RawReader {
    /// Read one key. `Ok(None)` when the key is absent.
    fn raw_get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error>;

    /// Every `(key, value)` pair in the subtree rooted at `prefix`, in key
    /// order. An empty prefix scans the whole table.
    fn raw_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, Error>;
}

impl<T: ReadableTable<RawKey, RawKey>> RawReader for T {
    fn raw_get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        Ok(self.get(key)?.map(|guard| guard.value().to_vec()))
    }

    fn raw_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, Error> {
        let end = key::prefix_end(prefix);
        let bounds: (Bound<&[u8]>, Bound<&[u8]>) = match &end {
            Some(end) => (Bound::Included(prefix), Bound::Excluded(end.as_slice())),
            None => (Bound::Unbounded, Bound::Unbounded),
        };

        let mut out = Vec::new();
        for entry in self.range::<&[u8]>(bounds)? {
            let (k, v) = entry?;
            out.push((k.value().to_vec(), v.value().to_vec()));
        }
        Ok(out)
    }
}

/// Counters for a bucket subtree.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BucketStats {
    /// The bucket itself plus every bucket nested anywhere below it.
    pub bucket_n: usize,
    /// Plain keys anywhere in the subtree.
    pub key_n: usize,
    /// Nesting levels, counting the bucket itself as one.
    pub depth: usize,
}

/// Read access to one namespace.
#[derive(Clone)]
pub struct Bucket<'a> {
    table: &'a dyn RawReader,
    path: BucketPath,
    key: Vec<u8>,
}

impl<'a> Bucket<'a> {
    pub(crate) fn new(table: &'a dyn RawReader, path: BucketPath) -> Self {
        let key = path.to_key();
        Self { table, path, key }
    }

    pub fn path(&self) -> &BucketPath {
        &self.path
    }

    /// The bucket's own name. Empty for the root.
    pub fn name(&self) -> &str {
        self.path.name().unwrap_or_default()
    }

    /// The child bucket called `name`, if one exists.
    ///
    /// Returns `None` when `name` is missing, names a plain key, or could
    /// never be stored (empty or containing NUL).
    pub fn bucket(&self, name: &str) -> Result<Option<Bucket<'a>>, Error> {
        match lookup(self.table, &self.path, name)? {
            Some((path, Slot::Bucket)) => Ok(Some(Bucket::new(self.table, path))),
            _ => Ok(None),
        }
    }

    /// Follow `names` down from this bucket, one level per name.
    pub fn bucket_at(&self, names: &[&str]) -> Result<Option<Bucket<'a>>, Error> {
        let mut current = self.clone();
        for name in names {
            match current.bucket(name)? {
                Some(next) => current = next,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }

    /// Direct child buckets in key order. Plain keys are skipped.
    pub fn children(&self) -> Result<Vec<Bucket<'a>>, Error> {
        entries(self.table, &self.key, &self.path)?
            .into_iter()
            .filter(|(_, slot)| *slot == Slot::Bucket)
            .map(|(name, _)| -> Result<Bucket<'a>, Error> {
                Ok(Bucket::new(self.table, self.path.child(&name)?))
            })
            .collect()
    }

    /// Names of the direct child buckets in key order.
    pub fn buckets(&self) -> Result<Vec<String>, Error> {
        Ok(entries(self.table, &self.key, &self.path)?
            .into_iter()
            .filter(|(_, slot)| *slot == Slot::Bucket)
            .map(|(name, _)| name)
            .collect())
    }

    /// Plain key/value pairs stored directly in this bucket.
    pub fn fields(&self) -> Result<BTreeMap<String, String>, Error> {
        Ok(entries(self.table, &self.key, &self.path)?
            .into_iter()
            .filter_map(|(name, slot)| match slot {
                Slot::Field(value) => Some((name, value)),
                Slot::Bucket => None,
            })
            .collect())
    }

    /// The value of the plain key `name`, if one exists.
    pub fn get(&self, name: &str) -> Result<Option<String>, Error> {
        match lookup(self.table, &self.path, name)? {
            Some((_, Slot::Field(value))) => Ok(Some(value)),
            _ => Ok(None),
        }
    }

    pub fn stats(&self) -> Result<BucketStats, Error> {
        stats(self.table, &self.key, &self.path)
    }
}

/// Write access to one namespace.
pub struct BucketMut<'a, 'txn> {
    table: &'a mut RawTable<'txn>,
    path: BucketPath,
    key: Vec<u8>,
}

impl<'a, 'txn> BucketMut<'a, 'txn> {
    pub(crate) fn new(table: &'a mut RawTable<'txn>, path: BucketPath) -> Self {
        let key = path.to_key();
        Self { table, path, key }
    }

    pub fn path(&self) -> &BucketPath {
        &self.path
    }

    pub fn bucket_mut(&mut self, name: &str) -> Result<Option<BucketMut<'_, 'txn>>, Error> {
        match lookup(&*self.table, &self.path, name)? {
            Some((path, Slot::Bucket)) => Ok(Some(BucketMut::new(&mut *self.table, path))),
            _ => Ok(None),
        }
    }

    /// Follow `names` down from this bucket, one level per name.
    pub fn bucket_mut_at(&mut self, names: &[&str]) -> Result<Option<BucketMut<'_, 'txn>>, Error> {
        let mut path = self.path.clone();
        for name in names {
            match lookup(&*self.table, &path, name)? {
                Some((next, Slot::Bucket)) => path = next,
                _ => return Ok(None),
            }
        }
        Ok(Some(BucketMut::new(&mut *self.table, path)))
    }

    pub fn create_bucket_if_not_exists(
        &mut self,
        name: &str,
    ) -> Result<BucketMut<'_, 'txn>, Error> {
        let path = create_bucket(&mut *self.table, &self.path, name)?;
        Ok(BucketMut::new(&mut *self.table, path))
    }

    /// Store a plain key. Fails if `name` is already a bucket.
    pub fn put(&mut self, name: &str, value: &str) -> Result<(), Error> {
        let path = self.path.child(name)?;
        let key = key::child_key(&self.key, name);
        if let Some(Slot::Bucket) = read_slot(&*self.table, &key, &path)? {
            return Err(Error::IncompatibleValue {
                path: path.to_string(),
            });
        }
        self.table.insert(key.as_slice(), key::encode_field(value).as_slice())?;
        Ok(())
    }

    /// Remove the child bucket `name` and everything below it.
    ///
    /// Returns `false` when there was nothing to delete. Fails if `name` is a
    /// plain key.
    pub fn delete_bucket(&mut self, name: &str) -> Result<bool, Error> {
        delete_bucket(&mut *self.table, &self.path, name)
    }

    pub fn stats(&self) -> Result<BucketStats, Error> {
        stats(&*self.table, &self.key, &self.path)
    }
}

fn read_slot(
    table: &dyn RawReader,
    key: &[u8],
    path: &BucketPath,
) -> Result<Option<Slot>, Error> {
    match table.raw_get(key)? {
        Some(raw) => key::decode_slot(&raw)
            .map(Some)
            .ok_or_else(|| Error::CorruptEntry {
                path: path.to_string(),
            }),
        None => Ok(None),
    }
}

/// Look up `name` under `parent`. Names that cannot be stored are absent.
fn lookup(
    table: &dyn RawReader,
    parent: &BucketPath,
    name: &str,
) -> Result<Option<(BucketPath, Slot)>, Error> {
    let Ok(path) = parent.child(name) else {
        return Ok(None);
    };
    let key = path.to_key();
    Ok(read_slot(table, &key, &path)?.map(|slot| (path, slot)))
}

/// Direct children of the bucket at `prefix`, in key order.
fn entries(
    table: &dyn RawReader,
    prefix: &[u8],
    path: &BucketPath,
) -> Result<Vec<(String, Slot)>, Error> {
    let mut out = Vec::new();
    for (k, v) in table.raw_scan(prefix)? {
        let segments = key::relative_segments(prefix, &k);
        let [name] = segments.as_slice() else {
            continue;
        };
        let corrupt = || Error::CorruptEntry {
            path: path.to_string(),
        };
        let name = std::str::from_utf8(name).map_err(|_| corrupt())?;
        let slot = key::decode_slot(&v).ok_or_else(corrupt)?;
        out.push((name.to_string(), slot));
    }
    Ok(out)
}

fn stats(table: &dyn RawReader, prefix: &[u8], path: &BucketPath) -> Result<BucketStats, Error> {
    let mut stats = BucketStats::default();
    for (k, v) in table.raw_scan(prefix)? {
        let level = key::relative_segments(prefix, &k).len();
        match key::decode_slot(&v) {
            Some(Slot::Bucket) => {
                stats.bucket_n += 1;
                stats.depth = stats.depth.max(level + 1);
            }
            Some(Slot::Field(_)) => stats.key_n += 1,
            None => {
                return Err(Error::CorruptEntry {
                    path: path.to_string(),
                })
            }
        }
    }
    Ok(stats)
}

pub(crate) fn create_bucket(
    table: &mut RawTable<'_>,
    parent: &BucketPath,
    name: &str,
) -> Result<BucketPath, Error> {
    let path = parent.child(name)?;
    let key = path.to_key();
    match read_slot(&*table, &key, &path)? {
        Some(Slot::Bucket) => {}
        Some(Slot::Field(_)) => {
            return Err(Error::IncompatibleValue {
                path: path.to_string(),
            })
        }
        None => {
            table.insert(key.as_slice(), [key::BUCKET_MARKER].as_slice())?;
        }
    }
    Ok(path)
}

pub(crate) fn delete_bucket(
    table: &mut RawTable<'_>,
    parent: &BucketPath,
    name: &str,
) -> Result<bool, Error> {
    let Ok(path) = parent.child(name) else {
        return Ok(false);
    };
    let key = path.to_key();
    match read_slot(&*table, &key, &path)? {
        None => return Ok(false),
        Some(Slot::Field(_)) => {
            return Err(Error::IncompatibleValue {
                path: path.to_string(),
            })
        }
        Some(Slot::Bucket) => {}
    }

    let doomed = table.raw_scan(&key)?;
    log::debug!("Deleting bucket {} ({} entries)...", path, doomed.len());
    for (k, _) in doomed {
        table.remove(k.as_slice())?;
    }
    Ok(true)
}
