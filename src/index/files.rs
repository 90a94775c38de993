//! Where a user's index lives on disk and how big it is.

use std::io;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::model::UserId;

const INDEX_PREFIX: &str = "encryptedSearchIndex";
const INDEX_EXTENSION: &str = "sqlite3";

/// SQLite companion files that belong to the same database.
const COMPANION_SUFFIXES: [&str; 3] = ["-journal", "-wal", "-shm"];

/// File stem shared by a user's database and side-file directory.
///
/// Identifiers that are not filename-safe are replaced by a hash so the
/// name stays deterministic.
fn user_stem(user: &UserId) -> String {
    if user.is_filename_safe() {
        format!("{INDEX_PREFIX}_{user}")
    } else {
        let hash = format!("{:x}", Sha256::digest(user.as_str().as_bytes()));
        format!("{INDEX_PREFIX}_{}", &hash[..32])
    }
}

/// Example: `encryptedSearchIndex_u123.sqlite3`
pub fn index_file_name(user: &UserId) -> String {
    format!("{}.{INDEX_EXTENSION}", user_stem(user))
}

/// Database file for `user` inside `dir`.
pub fn index_path_for(dir: &Path, user: &UserId) -> PathBuf {
    dir.join(index_file_name(user))
}

/// Directory holding spilled ciphertexts for `user`.
///
/// Example: `encryptedSearchIndex_u123.content/`
pub fn content_dir_for(dir: &Path, user: &UserId) -> PathBuf {
    dir.join(format!("{}.content", user_stem(user)))
}

/// Side file for one message. Named by hash since message ids are opaque.
pub fn content_file_for(content_dir: &Path, message_id: &str) -> PathBuf {
    let hash = format!("{:x}", Sha256::digest(message_id.as_bytes()));
    content_dir.join(format!("{hash}.bin"))
}

fn companion_paths(db_path: &Path) -> impl Iterator<Item = PathBuf> + '_ {
    COMPANION_SUFFIXES.iter().map(move |suffix| {
        let mut name = db_path.as_os_str().to_owned();
        name.push(suffix);
        PathBuf::from(name)
    })
}

fn file_len(path: &Path) -> io::Result<u64> {
    match std::fs::metadata(path) {
        Ok(meta) => Ok(meta.len()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e),
    }
}

fn dir_len(path: &Path) -> io::Result<u64> {
    let entries = match std::fs::read_dir(path) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };
    let mut total = 0;
    for entry in entries {
        let entry = entry?;
        let meta = entry.metadata()?;
        if meta.is_file() {
            total += meta.len();
        }
    }
    Ok(total)
}

/// Bytes used on disk by `user`'s index: the database, its journal files,
/// and every side file. Zero when nothing exists.
pub fn footprint(dir: &Path, user: &UserId) -> io::Result<u64> {
    let db_path = index_path_for(dir, user);
    let mut total = file_len(&db_path)?;
    for companion in companion_paths(&db_path) {
        total += file_len(&companion)?;
    }
    total += dir_len(&content_dir_for(dir, user))?;
    Ok(total)
}

/// Remove a file, treating "already gone" as success.
pub fn remove_if_exists(path: &Path) -> io::Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Delete the database, its companions, and the side-file directory.
///
/// Returns whether the database file existed.
pub fn remove_store_files(dir: &Path, user: &UserId) -> io::Result<bool> {
    let db_path = index_path_for(dir, user);
    let existed = remove_if_exists(&db_path)?;
    for companion in companion_paths(&db_path) {
        remove_if_exists(&companion)?;
    }
    match std::fs::remove_dir_all(content_dir_for(dir, user)) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    Ok(existed)
}
