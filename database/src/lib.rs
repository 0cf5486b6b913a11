use core::ops::{Range, RangeFrom, RangeToInclusive};
use std::{
    borrow::Cow,
    path::Path,
    sync::{Arc, Mutex},
};

use anyhow::Result;
use bytesize::ByteSize;
use im::OrdMap;
use itertools::Either;
use libmdbx::{DatabaseFlags, Environment, Geometry, WriteFlags};
use log::info;
use std_ext::ArcExt as _;
use tap::Pipe as _;

const GROWTH_STEP: ByteSize = ByteSize::mib(256);
const MAX_NAMED_DATABASES: usize = 10;

#[derive(Clone, Copy)]
pub enum DatabaseMode {
    ReadOnly,
    ReadWrite,
}

impl DatabaseMode {
    #[must_use]
    pub const fn is_read_only(self) -> bool {
        matches!(self, Self::ReadOnly)
    }

    // Zero file permissions tell MDBX to open an existing database without
    // creating one.
    #[must_use]
    pub const fn mode_permissions(self) -> u16 {
        match self {
            Self::ReadOnly => 0,
            Self::ReadWrite => 0o600,
        }
    }

    #[must_use]
    #[cfg(target_os = "linux")]
    pub fn permissions(self) -> u32 {
        self.mode_permissions().into()
    }

    #[must_use]
    #[cfg(not(target_os = "linux"))]
    pub const fn permissions(self) -> u16 {
        self.mode_permissions()
    }
}

/// An embedded key-value store.
///
/// Values are stored verbatim; callers that want compression apply it before
/// writing. All writes submitted through [`Database::put_batch`] land in one
/// transaction: either every pair is visible afterwards or none is.
pub struct Database(DatabaseKind);

enum DatabaseKind {
    Persistent {
        database_name: String,
        environment: Environment,
    },
    InMemory {
        map: Mutex<InMemoryMap>,
    },
}

type InMemoryMap = OrdMap<Arc<[u8]>, Arc<[u8]>>;

impl Database {
    pub fn persistent(
        name: &str,
        directory: impl AsRef<Path>,
        max_size: ByteSize,
        mode: DatabaseMode,
    ) -> Result<Self> {
        if !mode.is_read_only() {
            fs_err::create_dir_all(&directory)?;
        }

        let environment = Environment::builder()
            .set_max_dbs(MAX_NAMED_DATABASES)
            .set_geometry(Geometry {
                size: Some(..usize::try_from(max_size.as_u64())?),
                growth_step: Some(isize::try_from(GROWTH_STEP.as_u64())?),
                shrink_threshold: None,
                page_size: None,
            })
            .open_with_permissions(directory.as_ref(), mode.permissions())?;

        let transaction = environment.begin_rw_txn()?;

        if !mode.is_read_only() && transaction.open_db(Some(name)).is_err() {
            info!("creating database {name} in {}", directory.as_ref().display());
            transaction.create_db(Some(name), DatabaseFlags::default())?;
        }

        transaction.commit()?;

        Ok(Self(DatabaseKind::Persistent {
            database_name: name.to_owned(),
            environment,
        }))
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self(DatabaseKind::InMemory {
            map: Mutex::default(),
        })
    }

    pub fn contains_key(&self, key: impl AsRef<[u8]>) -> Result<bool> {
        let contains = match self.kind() {
            DatabaseKind::Persistent {
                database_name,
                environment,
            } => {
                let transaction = environment.begin_ro_txn()?;
                let database = transaction.open_db(Some(database_name))?;

                transaction
                    .get::<()>(database.dbi(), key.as_ref())?
                    .is_some()
            }
            DatabaseKind::InMemory { map } => map
                .lock()
                .expect("in-memory database mutex is poisoned")
                .contains_key(key.as_ref()),
        };

        Ok(contains)
    }

    pub fn get(&self, key: impl AsRef<[u8]>) -> Result<Option<Vec<u8>>> {
        match self.kind() {
            DatabaseKind::Persistent {
                database_name,
                environment,
            } => {
                let transaction = environment.begin_ro_txn()?;
                let database = transaction.open_db(Some(database_name))?;

                Ok(transaction
                    .get::<Vec<u8>>(database.dbi(), key.as_ref())?)
            }
            DatabaseKind::InMemory { map } => Ok(map
                .lock()
                .expect("in-memory database mutex is poisoned")
                .get(key.as_ref())
                .map(|value| value.to_vec())),
        }
    }

    pub fn put(&self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Result<()> {
        self.put_batch(core::iter::once((key, value)))
    }

    /// Writes all pairs in one transaction.
    pub fn put_batch(
        &self,
        pairs: impl IntoIterator<Item = (impl AsRef<[u8]>, impl AsRef<[u8]>)>,
    ) -> Result<()> {
        match self.kind() {
            DatabaseKind::Persistent {
                database_name,
                environment,
            } => {
                let transaction = environment.begin_rw_txn()?;
                let database = transaction.open_db(Some(database_name))?;

                for (key, value) in pairs {
                    transaction.put(
                        database.dbi(),
                        key.as_ref(),
                        value.as_ref(),
                        WriteFlags::default(),
                    )?;
                }

                transaction.commit()?;
            }
            DatabaseKind::InMemory { map } => {
                // Build the new map before swapping it in so a panic mid-batch
                // cannot leave a partial write behind.
                let mut map = map.lock().expect("in-memory database mutex is poisoned");
                let mut new_map = map.clone();

                for (key, value) in pairs {
                    new_map.insert(key.as_ref().into(), value.as_ref().into());
                }

                *map = new_map;
            }
        }

        Ok(())
    }

    pub fn delete(&self, key: impl AsRef<[u8]>) -> Result<()> {
        match self.kind() {
            DatabaseKind::Persistent {
                database_name,
                environment,
            } => {
                let transaction = environment.begin_rw_txn()?;
                let database = transaction.open_db(Some(database_name))?;

                let mut cursor = transaction.cursor(&database)?;

                if cursor.set::<()>(key.as_ref())?.is_some() {
                    cursor.del(WriteFlags::default())?;
                    transaction.commit()?;
                }
            }
            DatabaseKind::InMemory { map } => {
                map.lock()
                    .expect("in-memory database mutex is poisoned")
                    .remove(key.as_ref());
            }
        }

        Ok(())
    }

    pub fn delete_range(&self, range: Range<impl AsRef<[u8]>>) -> Result<()> {
        let start = range.start.as_ref();
        let end = range.end.as_ref();

        match self.kind() {
            DatabaseKind::Persistent {
                database_name,
                environment,
            } => {
                let transaction = environment.begin_rw_txn()?;
                let database = transaction.open_db(Some(database_name))?;

                let mut cursor = transaction.cursor(&database)?;

                let Some((mut key, ())) = cursor.set_range::<Cow<_>, _>(start)? else {
                    return Ok(());
                };

                while *key < *end {
                    cursor.del(WriteFlags::default())?;
                    match cursor.next::<Cow<_>, _>()? {
                        Some((next_key, ())) => key = next_key,
                        None => break,
                    }
                }

                transaction.commit()?;
            }
            DatabaseKind::InMemory { map } => {
                let mut map = map.lock().expect("in-memory database mutex is poisoned");
                let mut new_map = map.clone();

                let end_pair = map.get_key_value(end);
                let (below, _) = new_map.split(start);
                let (_, above) = new_map.split(end);

                new_map = below.union(above);

                if let Some((key, value)) = end_pair {
                    new_map.insert(key.clone_arc(), value.clone_arc());
                }

                *map = new_map;
            }
        }

        Ok(())
    }

    #[expect(clippy::type_complexity)]
    pub fn iterator_ascending(
        &self,
        range: RangeFrom<impl AsRef<[u8]>>,
    ) -> Result<impl Iterator<Item = Result<(Cow<[u8]>, Vec<u8>)>>> {
        let start = range.start.as_ref();

        match self.kind() {
            DatabaseKind::Persistent {
                database_name,
                environment,
            } => {
                let transaction = environment.begin_ro_txn()?;
                let database = transaction.open_db(Some(database_name))?;

                let mut cursor = transaction.cursor(&database)?;

                cursor
                    .set_range(start)
                    .transpose()
                    .into_iter()
                    .chain(core::iter::from_fn(move || cursor.next().transpose()))
                    .map(|result| to_owned_pair(result?))
                    .pipe(Either::Left)
            }
            DatabaseKind::InMemory { map } => {
                let map = map.lock().expect("in-memory database mutex is poisoned");
                let start_pair = map.get_key_value(start);
                let (_, mut above) = map.split(start);

                if let Some((key, value)) = start_pair {
                    above.insert(key.clone_arc(), value.clone_arc());
                }

                above
                    .into_iter()
                    .map(|(key, value)| Ok((Cow::Owned(key.to_vec()), value.to_vec())))
                    .pipe(Either::Right)
            }
        }
        .pipe(Ok)
    }

    #[expect(clippy::type_complexity)]
    pub fn iterator_descending(
        &self,
        range: RangeToInclusive<impl AsRef<[u8]>>,
    ) -> Result<impl Iterator<Item = Result<(Cow<[u8]>, Vec<u8>)>>> {
        let end = range.end.as_ref();

        match self.kind() {
            DatabaseKind::Persistent {
                database_name,
                environment,
            } => {
                let transaction = environment.begin_ro_txn()?;
                let database = transaction.open_db(Some(database_name))?;

                let mut cursor = transaction.cursor(&database)?;

                cursor
                    .set_key(end)
                    .transpose()
                    .into_iter()
                    .chain(core::iter::from_fn(move || cursor.prev().transpose()))
                    .map(|result| to_owned_pair(result?))
                    .pipe(Either::Left)
            }
            DatabaseKind::InMemory { map } => {
                let map = map.lock().expect("in-memory database mutex is poisoned");
                let end_pair = map.get_key_value(end);
                let (mut below, _) = map.split(end);

                if let Some((key, value)) = end_pair {
                    below.insert(key.clone_arc(), value.clone_arc());
                }

                below
                    .into_iter()
                    .rev()
                    .map(|(key, value)| Ok((Cow::Owned(key.to_vec()), value.to_vec())))
                    .pipe(Either::Right)
            }
        }
        .pipe(Ok)
    }

    /// The last pair whose key is `<=` the given key.
    pub fn prev(&self, key: impl AsRef<[u8]>) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        self.iterator_descending(..=key)?
            .next()
            .transpose()?
            .map(|(key, value)| (key.into_owned(), value))
            .pipe(Ok)
    }

    /// The first pair whose key is `>=` the given key.
    pub fn next(&self, key: impl AsRef<[u8]>) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        self.iterator_ascending(key..)?
            .next()
            .transpose()?
            .map(|(key, value)| (key.into_owned(), value))
            .pipe(Ok)
    }

    const fn kind(&self) -> &DatabaseKind {
        &self.0
    }
}

#[expect(clippy::type_complexity)]
fn to_owned_pair<'pair>(
    (key, value): (Cow<'pair, [u8]>, Cow<[u8]>),
) -> Result<(Cow<'pair, [u8]>, Vec<u8>)> {
    Ok((key, value.to_vec()))
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;
    use test_case::test_case;

    use super::*;

    type Constructor = fn() -> Result<Database>;

    fn build_persistent_database() -> Result<Database> {
        let database = Database::persistent(
            "test_db",
            TempDir::new()?,
            ByteSize::mib(1),
            DatabaseMode::ReadWrite,
        )?;

        populate_database(&database)?;
        Ok(database)
    }

    fn build_in_memory_database() -> Result<Database> {
        let database = Database::in_memory();
        populate_database(&database)?;
        Ok(database)
    }

    fn populate_database(database: &Database) -> Result<()> {
        database.put_batch([("A", "1"), ("B", "2"), ("C", "3")])?;
        database.put("E", "5")?;
        Ok(())
    }

    fn collect_pairs(
        pairs: impl IntoIterator<Item = Result<(impl AsRef<[u8]>, impl AsRef<[u8]>)>>,
    ) -> Result<Vec<(String, String)>> {
        pairs
            .into_iter()
            .map(|result| {
                let (key, value) = result?;
                Ok((
                    core::str::from_utf8(key.as_ref())?.to_owned(),
                    core::str::from_utf8(value.as_ref())?.to_owned(),
                ))
            })
            .collect()
    }

    fn to_pair((key, value): (&str, &str)) -> (String, String) {
        (key.to_owned(), value.to_owned())
    }

    #[test_case(build_persistent_database)]
    #[test_case(build_in_memory_database)]
    fn put_get_delete_roundtrip(constructor: Constructor) -> Result<()> {
        let database = constructor()?;

        assert!(database.contains_key("A")?);
        assert_eq!(database.get("A")?, Some(b"1".to_vec()));

        database.delete("A")?;

        assert!(!database.contains_key("A")?);
        assert_eq!(database.get("A")?, None);

        Ok(())
    }

    #[test_case(build_persistent_database)]
    #[test_case(build_in_memory_database)]
    fn later_writes_to_the_same_key_win(constructor: Constructor) -> Result<()> {
        let database = constructor()?;

        database.put_batch([("A", "7"), ("A", "8"), ("A", "9")])?;

        assert_eq!(database.get("A")?, Some(b"9".to_vec()));

        Ok(())
    }

    #[test_case(build_persistent_database)]
    #[test_case(build_in_memory_database)]
    fn iterator_ascending_starts_at_the_first_key_in_range(
        constructor: Constructor,
    ) -> Result<()> {
        let database = constructor()?;

        let pairs = collect_pairs(database.iterator_ascending("B"..)?)?;
        let expected = [("B", "2"), ("C", "3"), ("E", "5")].map(to_pair);

        assert_eq!(pairs, expected);

        Ok(())
    }

    #[test_case(build_persistent_database)]
    #[test_case(build_in_memory_database)]
    fn iterator_descending_starts_at_the_last_key_in_range(
        constructor: Constructor,
    ) -> Result<()> {
        let database = constructor()?;

        let pairs = collect_pairs(database.iterator_descending(..="D")?)?;
        let expected = [("C", "3"), ("B", "2"), ("A", "1")].map(to_pair);

        assert_eq!(pairs, expected);

        Ok(())
    }

    #[test_case(build_persistent_database)]
    #[test_case(build_in_memory_database)]
    fn prev_and_next_find_neighboring_keys(constructor: Constructor) -> Result<()> {
        let database = constructor()?;

        let prev = database.prev("D")?.map(|(key, _)| key);
        let next = database.next("D")?.map(|(key, _)| key);

        assert_eq!(prev, Some(b"C".to_vec()));
        assert_eq!(next, Some(b"E".to_vec()));

        Ok(())
    }

    #[test_case(build_persistent_database)]
    #[test_case(build_in_memory_database)]
    fn delete_range_is_end_exclusive(constructor: Constructor) -> Result<()> {
        let database = constructor()?;

        database.delete_range("B".."E")?;

        assert!(!database.contains_key("B")?);
        assert!(!database.contains_key("C")?);
        assert!(database.contains_key("A")?);
        assert!(database.contains_key("E")?);

        Ok(())
    }
}
