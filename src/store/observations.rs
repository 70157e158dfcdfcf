//! Observation CRUD. Observations have no independent identity from the
//! author's point of view — they are replaced wholesale for an entity on
//! every sync, never diffed line-by-line.

use rusqlite::{params, Connection, Row};

use crate::error::{Error, Result};
use crate::model::Observation;

fn row_to_observation(row: &Row) -> rusqlite::Result<Observation> {
    let tags_json: String = row.get("tags")?;
    let tags: Vec<String> = serde_json::from_str(&tags_json).unwrap_or_default();
    Ok(Observation {
        id: row.get("id")?,
        entity_id: row.get("entity_id")?,
        category: row.get("category")?,
        content: row.get("content")?,
        tags,
        context: row.get("context")?,
    })
}

pub fn list_for_entity(conn: &Connection, entity_id: i64) -> Result<Vec<Observation>> {
    let mut stmt = conn
        .prepare("SELECT * FROM observations WHERE entity_id = ?1 ORDER BY id")
        .map_err(|e| Error::StoreError { message: e.to_string() })?;
    let rows = stmt
        .query_map(params![entity_id], row_to_observation)
        .map_err(|e| Error::StoreError { message: e.to_string() })?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(|e| Error::StoreError { message: e.to_string() })
}

/// Deletes every observation for `entity_id` and inserts `observations` in
/// place, assigning fresh ids. Called once per sync per changed entity.
pub fn replace_for_entity(conn: &Connection, entity_id: i64, observations: &[Observation]) -> Result<()> {
    conn.execute("DELETE FROM observations WHERE entity_id = ?1", params![entity_id])
        .map_err(|e| Error::StoreError { message: e.to_string() })?;
    for obs in observations {
        let tags_json = serde_json::to_string(&obs.tags)?;
        conn.execute(
            "INSERT INTO observations (entity_id, category, content, tags, context) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![entity_id, obs.category, obs.content, tags_json, obs.context],
        )
        .map_err(|e| Error::StoreError { message: e.to_string() })?;
    }
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
    fn replace_clears_and_reinserts() {
        let conn = setup();
        let mut obs = Observation::new("note", "first");
        obs.tags = vec!["t".to_string()];
        replace_for_entity(&conn, 1, &[obs]).unwrap();
        assert_eq!(list_for_entity(&conn, 1).unwrap().len(), 1);

        replace_for_entity(&conn, 1, &[Observation::new("note", "second")]).unwrap();
        let after = list_for_entity(&conn, 1).unwrap();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].content, "second");
    }
}
