//! Process-wide database handle managing many collections under one data
//! directory.
//!
//! Each collection lives in `data_dir/<name>/`; startup scans for
//! subdirectories containing `meta.json` and loads each one. Dropping a
//! collection deletes its directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use arrowdb_core::{ArrowError, ArrowResult, CollectionConfig, IndexOptions};
use tracing::{debug, warn};

use crate::collection::Collection;
use crate::manifest::META_FILE_NAME;

/// Options for opening an [`ArrowDb`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Directory holding one subdirectory per collection.
    pub data_dir: PathBuf,
    /// Index options applied to newly created collections.
    pub default_index_options: IndexOptions,
}

impl ClientOptions {
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            default_index_options: IndexOptions::default(),
        }
    }
}

/// Main database interface: owns and persists a set of named collections.
#[derive(Debug)]
pub struct ArrowDb {
    data_dir: PathBuf,
    default_index_options: IndexOptions,
    collections: HashMap<String, Collection>,
}

impl ArrowDb {
    /// Opens the database, creating the data directory if missing and
    /// loading every collection found under it. A collection that fails to
    /// load is left untouched on disk and skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns `ArrowError::Io` on directory failures.
    pub fn open(options: ClientOptions) -> ArrowResult<Self> {
        std::fs::create_dir_all(&options.data_dir)?;

        let mut collections = HashMap::new();
        for entry in std::fs::read_dir(&options.data_dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_dir() || !path.join(META_FILE_NAME).exists() {
                continue;
            }
            match Collection::load(&path) {
                Ok(collection) => {
                    if collection.recovered_from_wal() {
                        warn!(
                            collection = collection.name(),
                            "collection recovered from WAL after unclean shutdown"
                        );
                    }
                    collections.insert(collection.name().to_owned(), collection);
                }
                Err(error) => {
                    // A collection that cannot be loaded is quarantined on
                    // disk rather than taking the whole database down.
                    warn!(
                        dir = %path.display(),
                        %error,
                        "skipping unloadable collection"
                    );
                }
            }
        }

        debug!(
            data_dir = %options.data_dir.display(),
            collections = collections.len(),
            "opened database"
        );
        Ok(Self {
            data_dir: options.data_dir,
            default_index_options: options.default_index_options,
            collections,
        })
    }

    /// Creates a new persistent collection named by `config.name`, using the
    /// database's default index options.
    ///
    /// # Errors
    ///
    /// - `ArrowError::AlreadyExists` for a duplicate name
    /// - `ArrowError::InvalidArgument` for an invalid config
    pub fn create_collection(&mut self, config: CollectionConfig) -> ArrowResult<&mut Collection> {
        self.create_collection_with_options(config, self.default_index_options)
    }

    /// Creates a new persistent collection with explicit index options.
    ///
    /// # Errors
    ///
    /// Same as [`ArrowDb::create_collection`].
    pub fn create_collection_with_options(
        &mut self,
        config: CollectionConfig,
        options: IndexOptions,
    ) -> ArrowResult<&mut Collection> {
        config.validate()?;
        let name = config.name.clone();
        let dir = self.collection_dir(&name);
        if self.collections.contains_key(&name) || dir.exists() {
            return Err(ArrowError::already_exists(format!("collection '{name}'")));
        }

        let collection = Collection::with_persistence(config, options, &dir)?;
        debug!(collection = %name, dir = %dir.display(), "created collection");
        Ok(self.collections.entry(name).or_insert(collection))
    }

    /// Looks up a collection by name.
    ///
    /// # Errors
    ///
    /// Returns `ArrowError::NotFound` for an unknown name.
    pub fn collection(&mut self, name: &str) -> ArrowResult<&mut Collection> {
        self.collections
            .get_mut(name)
            .ok_or_else(|| ArrowError::not_found(format!("collection '{name}'")))
    }

    /// Drops a collection and deletes its directory.
    ///
    /// # Errors
    ///
    /// Returns `ArrowError::NotFound` for an unknown name, `ArrowError::Io`
    /// on removal failure.
    pub fn drop_collection(&mut self, name: &str) -> ArrowResult<()> {
        if self.collections.remove(name).is_none() {
            return Err(ArrowError::not_found(format!("collection '{name}'")));
        }
        let dir = self.collection_dir(name);
        if dir.exists() {
            std::fs::remove_dir_all(&dir)?;
        }
        debug!(collection = name, "dropped collection");
        Ok(())
    }

    /// All collection names, sorted.
    #[must_use]
    pub fn list_collections(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.keys().cloned().collect();
        names.sort();
        names
    }

    #[must_use]
    pub fn has_collection(&self, name: &str) -> bool {
        self.collections.contains_key(name)
    }

    /// The data directory this database manages.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Checkpoints and closes every collection. Every collection is
    /// attempted even if an earlier one fails; the first error is returned.
    ///
    /// # Errors
    ///
    /// Returns the first save failure encountered.
    pub fn close(&mut self) -> ArrowResult<()> {
        let mut first_error = None;
        for (name, collection) in self.collections.drain() {
            if let Err(error) = collection.close() {
                warn!(collection = %name, %error, "failed to close collection");
                first_error.get_or_insert(error);
            }
        }
        match first_error {
            None => Ok(()),
            Some(error) => Err(error),
        }
    }

    fn collection_dir(&self, name: &str) -> PathBuf {
        self.data_dir.join(name)
    }
}
