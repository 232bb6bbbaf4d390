use super::StateResult;
use std::fs;
use std::path::Path;
use uuid::Uuid;

#[cfg(feature = "redb")]
use redb::{Database, ReadableTable, TableDefinition};
#[cfg(feature = "redb")]
use std::sync::Arc;

/// Byte sink for encrypted state blobs. A location is a file path for
/// [`FileBackend`] and a table key for [`RedbBackend`].
pub trait StateBackend: Send + Sync {
    fn write(&self, location: &str, blob: &str) -> StateResult<()>;
    fn read(&self, location: &str) -> StateResult<Option<String>>;
    fn remove(&self, location: &str) -> StateResult<()>;

    fn exists(&self, location: &str) -> StateResult<bool> {
        Ok(self.read(location)?.is_some())
    }
}

/// One file per location. Writes go through a temporary sibling and a
/// rename so a crash mid-write leaves the previous blob intact. Every write
/// gets its own temporary name, concurrent writers never share one.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileBackend;

impl StateBackend for FileBackend {
    fn write(&self, location: &str, blob: &str) -> StateResult<()> {
        let path = Path::new(location);
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let tmp = format!("{location}.{}.tmp", Uuid::new_v4().simple());
        let written = fs::write(&tmp, blob).and_then(|()| fs::rename(&tmp, path));
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    fn read(&self, location: &str) -> StateResult<Option<String>> {
        match fs::read_to_string(location) {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn remove(&self, location: &str) -> StateResult<()> {
        match fs::remove_file(location) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn exists(&self, location: &str) -> StateResult<bool> {
        Ok(Path::new(location).exists())
    }
}

#[cfg(feature = "redb")]
const STATE_TABLE: TableDefinition<&str, &str> = TableDefinition::new("state_blobs");

/// Keeps every blob in one redb table, keyed by location.
#[cfg(feature = "redb")]
pub struct RedbBackend {
    db: Arc<Database>,
}

#[cfg(feature = "redb")]
impl RedbBackend {
    /// Opens the database at `db_path`, creating it (and parent
    /// directories) when missing.
    pub fn open(db_path: impl AsRef<Path>) -> StateResult<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let db = Database::create(db_path).map_err(redb::Error::from)?;
        Ok(Self { db: Arc::new(db) })
    }
}

#[cfg(feature = "redb")]
impl StateBackend for RedbBackend {
    fn write(&self, location: &str, blob: &str) -> StateResult<()> {
        let write_txn = self.db.begin_write().map_err(redb::Error::from)?;
        {
            let mut table = write_txn
                .open_table(STATE_TABLE)
                .map_err(redb::Error::from)?;
            table.insert(location, blob).map_err(redb::Error::from)?;
        }
        write_txn.commit().map_err(redb::Error::from)?;
        Ok(())
    }

    fn read(&self, location: &str) -> StateResult<Option<String>> {
        let read_txn = self.db.begin_read().map_err(redb::Error::from)?;

        // Table is created lazily by the first write
        let table = match read_txn.open_table(STATE_TABLE) {
            Ok(table) => table,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(redb::Error::from(e).into()),
        };

        Ok(table
            .get(location)
            .map_err(redb::Error::from)?
            .map(|guard| guard.value().to_string()))
    }

    fn remove(&self, location: &str) -> StateResult<()> {
        let write_txn = self.db.begin_write().map_err(redb::Error::from)?;
        {
            let mut table = write_txn
                .open_table(STATE_TABLE)
                .map_err(redb::Error::from)?;
            table.remove(location).map_err(redb::Error::from)?;
        }
        write_txn.commit().map_err(redb::Error::from)?;
        Ok(())
    }
}
