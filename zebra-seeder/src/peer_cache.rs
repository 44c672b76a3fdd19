//! Reading and writing the address book's on-disk peer cache.
//!
//! The peer cache is a JSON object that maps each canonical peer address
//! to its [`MetaAddr`] record.
//!
//! # Concurrency
//!
//! These functions block on filesystem operations, so async code should call
//! them from a blocking task.

use std::{
    collections::{BTreeMap, HashMap},
    ffi::OsString,
    fs,
    io::{self, Write},
    net::SocketAddr,
    path::Path,
};

use thiserror::Error;

use crate::meta_addr::MetaAddr;


/// An error reading or writing the peer cache.
#[derive(Error, Debug)]
pub enum PeerCacheError {
    /// The file or its directory could not be read or written.
    #[error("peer cache I/O error: {0}")]
    Io(#[from] io::Error),

    /// The file contents were not a valid peer cache.
    #[error("peer cache format error: {0}")]
    Json(#[from] serde_json::Error),

    /// The temporary file could not replace the peer cache file.
    #[error("peer cache replace error: {0}")]
    Persist(#[from] tempfile::PersistError),
}

/// Reads the peer cache at `path`.
///
/// A missing file is an empty cache.
pub fn load_peer_cache(path: &Path) -> Result<Vec<MetaAddr>, PeerCacheError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(error) => return Err(error.into()),
    };

    let peers: BTreeMap<SocketAddr, MetaAddr> = serde_json::from_slice(&bytes)?;

    Ok(peers.into_values().collect())
}

/// Reads the peer cache at `path`, and deletes it if it is corrupt.
///
/// Never fails: unreadable or corrupt caches are logged, and treated as empty.
pub fn load_or_reset(path: &Path) -> Vec<MetaAddr> {
    match load_peer_cache(path) {
        Ok(peers) => {
            info!(
                loaded_peers = peers.len(),
                ?path,
                "loaded cached peer addresses"
            );
            peers
        }
        Err(PeerCacheError::Json(error)) => {
            warn!(
                ?error,
                ?path,
                "corrupt peer cache file, deleting it and starting with an empty address book"
            );

            if let Err(error) = fs::remove_file(path) {
                warn!(?error, ?path, "could not delete corrupt peer cache file");
            }

            Vec::new()
        }
        Err(error) => {
            warn!(
                ?error,
                ?path,
                "could not read peer cache file, starting with an empty address book"
            );
            Vec::new()
        }
    }
}

/// Atomically replaces the peer cache at `path` with `peers`.
///
/// Writes a hidden temporary file in the same directory, then renames it over
/// `path`, so readers never see a partially written cache.
///
/// Returns the number of peers written.
pub fn write_peer_cache(
    path: &Path,
    peers: &HashMap<SocketAddr, MetaAddr>,
) -> Result<usize, PeerCacheError> {
    // Sorted keys make the file easier to diff and inspect.
    let sorted: BTreeMap<&SocketAddr, &MetaAddr> = peers.iter().collect();
    let json = serde_json::to_vec_pretty(&sorted)?;

    atomic_write(path, &json)?;

    Ok(peers.len())
}

/// Atomically writes `data` to `file_path`, creating its directory if needed.
fn atomic_write(file_path: &Path, data: &[u8]) -> Result<(), PeerCacheError> {
    let file_dir = file_path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    fs::create_dir_all(file_dir)?;

    // Give the temporary file a similar name to the permanent file,
    // but hide it in directory listings.
    let mut tmp_file_prefix: OsString = ".tmp.".into();
    if let Some(file_name) = file_path.file_name() {
        tmp_file_prefix.push(file_name);
    }

    // The temporary file must be on the same filesystem for the rename to be atomic.
    let mut tmp_file = tempfile::Builder::new()
        .prefix(&tmp_file_prefix)
        .tempfile_in(file_dir)?;

    tmp_file.write_all(data)?;
    tmp_file.as_file().sync_all()?;

    tmp_file.persist(file_path)?;

    Ok(())
}
