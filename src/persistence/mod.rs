//! Whole-file JSON persistence.
//!
//! The store reads the file once when it is opened and rewrites it on
//! every commit. The same collaborator can also be installed as a hook set
//! through [`FileStore::hooks`].

mod file;

pub use file::FileStore;
