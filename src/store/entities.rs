//! Entity CRUD against the graph store, including permalink-collision
//! disambiguation on insert.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{Error, Result};
use crate::model::{Entity, Fields};

fn row_to_entity(row: &Row) -> rusqlite::Result<Entity> {
    let metadata_json: String = row.get("entity_metadata")?;
    let entity_metadata: Fields = serde_json::from_str(&metadata_json).unwrap_or_default();
    let created_raw: String = row.get("created_at")?;
    let updated_raw: String = row.get("updated_at")?;

    Ok(Entity {
        id: row.get("id")?,
        project_id: row.get("project_id")?,
        title: row.get("title")?,
        entity_type: row.get("entity_type")?,
        content_type: row.get("content_type")?,
        file_path: row.get("file_path")?,
        permalink: row.get("permalink")?,
        checksum: row.get("checksum")?,
        created_at: parse_timestamp(&created_raw),
        updated_at: parse_timestamp(&updated_raw),
        entity_metadata,
    })
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc)).unwrap_or_else(|_| Utc::now())
}

/// Finds a permalink in `desired`'s collision class (`desired`, `desired-2`,
/// `desired-3`, ...) that is not already taken by a different entity in
/// this project.
pub fn disambiguate_permalink(
    conn: &Connection,
    project_id: i64,
    desired: &str,
    exclude_entity_id: Option<i64>,
) -> Result<String> {
    let mut candidate = desired.to_string();
    let mut suffix = 2;
    loop {
        let taken = match exclude_entity_id {
            Some(id) => conn
                .query_row(
                    "SELECT 1 FROM entities WHERE project_id = ?1 AND permalink = ?2 AND id != ?3",
                    params![project_id, candidate, id],
                    |_| Ok(()),
                )
                .optional()
                .map_err(|e| Error::StoreError { message: e.to_string() })?
                .is_some(),
            None => conn
                .query_row(
                    "SELECT 1 FROM entities WHERE project_id = ?1 AND permalink = ?2",
                    params![project_id, candidate],
                    |_| Ok(()),
                )
                .optional()
                .map_err(|e| Error::StoreError { message: e.to_string() })?
                .is_some(),
        };
        if !taken {
            return Ok(candidate);
        }
        candidate = format!("{desired}-{suffix}");
        suffix += 1;
    }
}

pub fn get_by_id(conn: &Connection, id: i64) -> Result<Option<Entity>> {
    conn.query_row("SELECT * FROM entities WHERE id = ?1", params![id], row_to_entity)
        .optional()
        .map_err(|e| Error::StoreError { message: e.to_string() })
}

pub fn get_by_permalink(conn: &Connection, project_id: i64, permalink: &str) -> Result<Option<Entity>> {
    conn.query_row(
        "SELECT * FROM entities WHERE project_id = ?1 AND permalink = ?2",
        params![project_id, permalink],
        row_to_entity,
    )
    .optional()
    .map_err(|e| Error::StoreError { message: e.to_string() })
}

pub fn get_by_title(conn: &Connection, project_id: i64, title: &str) -> Result<Option<Entity>> {
    conn.query_row(
        "SELECT * FROM entities WHERE project_id = ?1 AND title = ?2 LIMIT 1",
        params![project_id, title],
        row_to_entity,
    )
    .optional()
    .map_err(|e| Error::StoreError { message: e.to_string() })
}

pub fn get_by_file_path(conn: &Connection, project_id: i64, file_path: &str) -> Result<Option<Entity>> {
    conn.query_row(
        "SELECT * FROM entities WHERE project_id = ?1 AND file_path = ?2",
        params![project_id, file_path],
        row_to_entity,
    )
    .optional()
    .map_err(|e| Error::StoreError { message: e.to_string() })
}

pub fn list_entities(conn: &Connection, project_id: i64) -> Result<Vec<Entity>> {
    let mut stmt = conn
        .prepare("SELECT * FROM entities WHERE project_id = ?1 ORDER BY file_path")
        .map_err(|e| Error::StoreError { message: e.to_string() })?;
    let rows = stmt
        .query_map(params![project_id], row_to_entity)
        .map_err(|e| Error::StoreError { message: e.to_string() })?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(|e| Error::StoreError { message: e.to_string() })
}

pub fn get_entity_types(conn: &Connection, project_id: i64) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare("SELECT DISTINCT entity_type FROM entities WHERE project_id = ?1 ORDER BY entity_type")
        .map_err(|e| Error::StoreError { message: e.to_string() })?;
    let rows = stmt
        .query_map(params![project_id], |row| row.get::<_, String>(0))
        .map_err(|e| Error::StoreError { message: e.to_string() })?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(|e| Error::StoreError { message: e.to_string() })
}

pub fn find_by_permalinks(conn: &Connection, project_id: i64, permalinks: &[String]) -> Result<Vec<Entity>> {
    let mut found = Vec::new();
    for permalink in permalinks {
        if let Some(e) = get_by_permalink(conn, project_id, permalink)? {
            found.push(e);
        }
    }
    Ok(found)
}

pub fn find_by_file_paths(conn: &Connection, project_id: i64, file_paths: &[String]) -> Result<Vec<Entity>> {
    let mut found = Vec::new();
    for file_path in file_paths {
        if let Some(e) = get_by_file_path(conn, project_id, file_path)? {
            found.push(e);
        }
    }
    Ok(found)
}

pub fn delete_by_file_paths(conn: &Connection, project_id: i64, file_paths: &[String]) -> Result<Vec<Entity>> {
    let deleted = find_by_file_paths(conn, project_id, file_paths)?;
    for entity in &deleted {
        delete_entity(conn, entity.id)?;
    }
    Ok(deleted)
}

/// Renames an entity in place (move detection): updates `file_path` and
/// disambiguates `new_permalink`, keeping `id`, `checksum`, observations,
/// and relations untouched.
pub fn rename_entity(conn: &Connection, entity_id: i64, new_file_path: &str, new_permalink: &str) -> Result<Entity> {
    let permalink = disambiguate_permalink(conn, {
        conn.query_row("SELECT project_id FROM entities WHERE id = ?1", params![entity_id], |r| r.get(0))
            .map_err(|e| Error::StoreError { message: e.to_string() })?
    }, new_permalink, Some(entity_id))?;
    conn.execute(
        "UPDATE entities SET file_path = ?1, permalink = ?2 WHERE id = ?3",
        params![new_file_path, permalink, entity_id],
    )
    .map_err(|e| Error::StoreError { message: e.to_string() })?;
    get_by_id(conn, entity_id)?.ok_or_else(|| Error::EntityNotFound { identifier: entity_id.to_string() })
}

/// Inserts a brand-new entity row, disambiguating `permalink` against any
/// existing collision within the project. Returns the entity with its
/// assigned id and final (possibly suffixed) permalink.
pub fn insert_entity(conn: &Connection, mut entity: Entity) -> Result<Entity> {
    entity.permalink = disambiguate_permalink(conn, entity.project_id, &entity.permalink, None)?;
    let metadata_json = serde_json::to_string(&entity.entity_metadata)?;
    conn.execute(
        "INSERT INTO entities
            (project_id, title, entity_type, content_type, file_path, permalink, checksum, created_at, updated_at, entity_metadata)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            entity.project_id,
            entity.title,
            entity.entity_type,
            entity.content_type,
            entity.file_path,
            entity.permalink,
            entity.checksum,
            entity.created_at.to_rfc3339(),
            entity.updated_at.to_rfc3339(),
            metadata_json,
        ],
    )
    .map_err(|e| Error::StoreError { message: e.to_string() })?;
    entity.id = conn.last_insert_rowid();
    Ok(entity)
}

/// Updates an existing entity in place by id. If `desired_permalink`
/// differs from the stored one, disambiguates it (excluding the entity's
/// own row from the collision check) before writing.
pub fn update_entity(conn: &Connection, entity_id: i64, mut entity: Entity) -> Result<Entity> {
    entity.id = entity_id;
    entity.permalink =
        disambiguate_permalink(conn, entity.project_id, &entity.permalink, Some(entity_id))?;
    let metadata_json = serde_json::to_string(&entity.entity_metadata)?;
    conn.execute(
        "UPDATE entities SET
            title = ?1, entity_type = ?2, content_type = ?3, file_path = ?4,
            permalink = ?5, checksum = ?6, updated_at = ?7, entity_metadata = ?8
         WHERE id = ?9",
        params![
            entity.title,
            entity.entity_type,
            entity.content_type,
            entity.file_path,
            entity.permalink,
            entity.checksum,
            entity.updated_at.to_rfc3339(),
            metadata_json,
            entity_id,
        ],
    )
    .map_err(|e| Error::StoreError { message: e.to_string() })?;
    Ok(entity)
}

/// Deletes an entity and everything that references it (observations via
/// `ON DELETE CASCADE`; incoming relations' `to_id` is nulled, not
/// cascaded, so the relation row survives as unresolved).
pub fn delete_entity(conn: &Connection, id: i64) -> Result<()> {
    conn.execute("DELETE FROM entities WHERE id = ?1", params![id])
        .map_err(|e| Error::StoreError { message: e.to_string() })?;
    Ok(())
}

pub fn delete_by_permalinks(conn: &Connection, project_id: i64, permalinks: &[String]) -> Result<Vec<Entity>> {
    let deleted = find_by_permalinks(conn, project_id, permalinks)?;
    for entity in &deleted {
        delete_entity(conn, entity.id)?;
    }
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Fields;
    use chrono::Utc;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(include_str!("schema.sql")).unwrap();
        conn
    }

    fn new_entity(project_id: i64, file_path: &str, permalink: &str) -> Entity {
        Entity::new(project_id, "Title", "note", file_path, permalink, "sum", Fields::new(), Utc::now())
    }

    #[test]
    fn insert_then_get_by_permalink() {
        let conn = setup();
        let e = insert_entity(&conn, new_entity(1, "a.md", "a")).unwrap();
        assert!(e.id > 0);
        let found = get_by_permalink(&conn, 1, "a").unwrap().unwrap();
        assert_eq!(found.id, e.id);
    }

    #[test]
    fn colliding_permalink_gets_suffixed() {
        let conn = setup();
        let e1 = insert_entity(&conn, new_entity(1, "a.md", "dup")).unwrap();
        let e2 = insert_entity(&conn, new_entity(1, "b.md", "dup")).unwrap();
        assert_ne!(e1.permalink, e2.permalink);
        assert_eq!(e2.permalink, "dup-2");
    }

    #[test]
    fn update_keeps_own_permalink_on_collision_check() {
        let conn = setup();
        let e = insert_entity(&conn, new_entity(1, "a.md", "stable")).unwrap();
        let mut updated = e.clone();
        updated.title = "New Title".to_string();
        let result = update_entity(&conn, e.id, updated).unwrap();
        assert_eq!(result.permalink, "stable");
        assert_eq!(result.title, "New Title");
    }

    #[test]
    fn delete_removes_row() {
        let conn = setup();
        let e = insert_entity(&conn, new_entity(1, "a.md", "a")).unwrap();
        delete_entity(&conn, e.id).unwrap();
        assert!(get_by_id(&conn, e.id).unwrap().is_none());
    }
}
