//! Relation CRUD. Authored relations (anything but `dataview_link`) are
//! replaced wholesale per entity on each sync, same as observations.
//! `dataview_link` rows are owned exclusively by the Dataview refresh path
//! (`crate::sync::dataview_refresh`) and are replaced separately so an
//! ordinary content edit never touches them.

use rusqlite::{params, Connection, Row};

use crate::error::{Error, Result};
use crate::model::{Relation, DATAVIEW_LINK};

fn row_to_relation(row: &Row) -> rusqlite::Result<Relation> {
    Ok(Relation {
        id: row.get("id")?,
        from_id: row.get("from_id")?,
        to_id: row.get("to_id")?,
        to_name: row.get("to_name")?,
        relation_type: row.get("relation_type")?,
        context: row.get("context")?,
    })
}

pub fn list_outgoing(conn: &Connection, from_id: i64) -> Result<Vec<Relation>> {
    let mut stmt = conn
        .prepare("SELECT * FROM relations WHERE from_id = ?1 ORDER BY id")
        .map_err(|e| Error::StoreError { message: e.to_string() })?;
    let rows = stmt
        .query_map(params![from_id], row_to_relation)
        .map_err(|e| Error::StoreError { message: e.to_string() })?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(|e| Error::StoreError { message: e.to_string() })
}

pub fn list_incoming(conn: &Connection, to_id: i64) -> Result<Vec<Relation>> {
    let mut stmt = conn
        .prepare("SELECT * FROM relations WHERE to_id = ?1 ORDER BY id")
        .map_err(|e| Error::StoreError { message: e.to_string() })?;
    let rows = stmt
        .query_map(params![to_id], row_to_relation)
        .map_err(|e| Error::StoreError { message: e.to_string() })?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(|e| Error::StoreError { message: e.to_string() })
}

/// Every relation in the project with an unresolved target, joined through
/// `entities` to scope by project.
pub fn list_unresolved(conn: &Connection, project_id: i64) -> Result<Vec<Relation>> {
    let mut stmt = conn
        .prepare(
            "SELECT r.* FROM relations r
             JOIN entities e ON e.id = r.from_id
             WHERE e.project_id = ?1 AND r.to_id IS NULL
             ORDER BY r.id",
        )
        .map_err(|e| Error::StoreError { message: e.to_string() })?;
    let rows = stmt
        .query_map(params![project_id], row_to_relation)
        .map_err(|e| Error::StoreError { message: e.to_string() })?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(|e| Error::StoreError { message: e.to_string() })
}

fn insert_relation(conn: &Connection, from_id: i64, relation: &Relation) -> Result<()> {
    conn.execute(
        "INSERT INTO relations (from_id, to_id, to_name, relation_type, context) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![from_id, relation.to_id, relation.to_name, relation.relation_type, relation.context],
    )
    .map_err(|e| Error::StoreError { message: e.to_string() })?;
    Ok(())
}

/// Replaces every authored (non-`dataview_link`) relation from `from_id`
/// with `relations`. `dataview_link` rows are left untouched.
pub fn replace_authored(conn: &Connection, from_id: i64, relations: &[Relation]) -> Result<()> {
    conn.execute(
        "DELETE FROM relations WHERE from_id = ?1 AND relation_type != ?2",
        params![from_id, DATAVIEW_LINK],
    )
    .map_err(|e| Error::StoreError { message: e.to_string() })?;
    for relation in relations {
        insert_relation(conn, from_id, relation)?;
    }
    Ok(())
}

/// Replaces every `dataview_link` relation from `from_id` with
/// `relations`. Authored relations are left untouched.
pub fn replace_dataview_links(conn: &Connection, from_id: i64, relations: &[Relation]) -> Result<()> {
    conn.execute(
        "DELETE FROM relations WHERE from_id = ?1 AND relation_type = ?2",
        params![from_id, DATAVIEW_LINK],
    )
    .map_err(|e| Error::StoreError { message: e.to_string() })?;
    for relation in relations {
        insert_relation(conn, from_id, relation)?;
    }
    Ok(())
}

pub fn set_to_id(conn: &Connection, relation_id: i64, to_id: i64) -> Result<()> {
    conn.execute("UPDATE relations SET to_id = ?1 WHERE id = ?2", params![to_id, relation_id])
        .map_err(|e| Error::StoreError { message: e.to_string() })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Entity, Fields};
    use chrono::Utc;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(include_str!("schema.sql")).unwrap();
        let entity = Entity::new(1, "T", "note", "a.md", "a", "sum", Fields::new(), Utc::now());
        super::super::entities::insert_entity(&conn, entity).unwrap();
        conn
    }

    #[test]
    fn replace_authored_preserves_dataview_links() {
        let conn = setup();
        let mut dv = Relation::new(1, "Other", DATAVIEW_LINK);
        dv.to_id = Some(1);
        replace_dataview_links(&conn, 1, std::slice::from_ref(&dv)).unwrap();

        replace_authored(&conn, 1, &[Relation::new(1, "X", "links_to")]).unwrap();
        let all = list_outgoing(&conn, 1).unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().any(|r| r.relation_type == DATAVIEW_LINK));
        assert!(all.iter().any(|r| r.relation_type == "links_to"));

        replace_authored(&conn, 1, &[]).unwrap();
        let after = list_outgoing(&conn, 1).unwrap();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].relation_type, DATAVIEW_LINK);
    }

    #[test]
    fn unresolved_relations_are_listed_by_project() {
        let conn = setup();
        replace_authored(&conn, 1, &[Relation::new(1, "Missing", "links_to")]).unwrap();
        let unresolved = list_unresolved(&conn, 1).unwrap();
        assert_eq!(unresolved.len(), 1);

        set_to_id(&conn, unresolved[0].id, 1).unwrap();
        assert!(list_unresolved(&conn, 1).unwrap().is_empty());
    }
}
