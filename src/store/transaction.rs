//! Wraps one logical operation (apply a parsed note, delete an entity, ...)
//! in a single SQLite transaction, committing only if the closure
//! succeeds. Mirrors the begin/record/commit shape of a git-backed
//! `Transaction`, re-targeted from git commits to SQL transactions since
//! there is no remote to commit against.

use rusqlite::Connection;

use crate::error::{Error, Result};

pub fn run<T>(conn: &mut Connection, f: impl FnOnce(&rusqlite::Transaction) -> Result<T>) -> Result<T> {
    let txn = conn.transaction().map_err(|e| Error::StoreError { message: e.to_string() })?;
    let result = f(&txn)?;
    txn.commit().map_err(|e| Error::StoreError { message: e.to_string() })?;
    Ok(result)
}
