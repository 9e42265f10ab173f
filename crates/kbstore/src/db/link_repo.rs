//! Link repository: symbolic link annotations attached to node paths.
//!
//! Links are many-to-one: any number of link records may point at the
//! same path, and the same link name may appear at several paths.

use rusqlite::params;
use serde::Serialize;

use super::{Database, DatabaseError, TableNames};

/// A link from a symbolic name to the path it was declared under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkRow {
    pub link_name: String,
    pub knowledge_base: String,
    pub parent_path: String,
}

/// A mount point for a symbolic link name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkMountRow {
    pub link_name: String,
    pub knowledge_base: String,
    pub mount_path: String,
    pub description: String,
}

pub fn insert_link(
    db: &Database,
    tables: &TableNames,
    link: &LinkRow,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            &format!(
                "INSERT INTO {} (link_name, knowledge_base, parent_path) VALUES (?1, ?2, ?3)",
                tables.link
            ),
            params![link.link_name, link.knowledge_base, link.parent_path],
        )?;
        Ok(())
    })
}

pub fn insert_mount(
    db: &Database,
    tables: &TableNames,
    mount: &LinkMountRow,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            &format!(
                "INSERT INTO {} (link_name, knowledge_base, mount_path, description)
                 VALUES (?1, ?2, ?3, ?4)",
                tables.link_mount
            ),
            params![
                mount.link_name,
                mount.knowledge_base,
                mount.mount_path,
                mount.description
            ],
        )?;
        Ok(())
    })
}

/// Finds every link record with the given name.
pub fn find_links(
    db: &Database,
    tables: &TableNames,
    link_name: &str,
) -> Result<Vec<LinkRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT link_name, knowledge_base, parent_path FROM {}
             WHERE link_name = ?1 ORDER BY id",
            tables.link
        ))?;
        let rows = stmt
            .query_map(params![link_name], |r| {
                Ok(LinkRow {
                    link_name: r.get(0)?,
                    knowledge_base: r.get(1)?,
                    parent_path: r.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Finds every mount record with the given name.
pub fn find_mounts(
    db: &Database,
    tables: &TableNames,
    link_name: &str,
) -> Result<Vec<LinkMountRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT link_name, knowledge_base, mount_path, description FROM {}
             WHERE link_name = ?1 ORDER BY id",
            tables.link_mount
        ))?;
        let rows = stmt
            .query_map(params![link_name], |r| {
                Ok(LinkMountRow {
                    link_name: r.get(0)?,
                    knowledge_base: r.get(1)?,
                    mount_path: r.get(2)?,
                    description: r.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ensure_schema;

    #[test]
    fn test_links_are_many_to_one() {
        let db = Database::open_in_memory().unwrap();
        let tables = db.with_conn(|conn| ensure_schema(conn, "kb")).unwrap();

        for path in ["kb1.site.a", "kb1.site.a", "kb1.site.b"] {
            insert_link(
                &db,
                &tables,
                &LinkRow {
                    link_name: "sensor".to_string(),
                    knowledge_base: "kb1".to_string(),
                    parent_path: path.to_string(),
                },
            )
            .unwrap();
        }

        let links = find_links(&db, &tables, "sensor").unwrap();
        assert_eq!(links.len(), 3);
        assert_eq!(links[2].parent_path, "kb1.site.b");
        assert!(find_links(&db, &tables, "other").unwrap().is_empty());
    }

    #[test]
    fn test_mounts_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let tables = db.with_conn(|conn| ensure_schema(conn, "kb")).unwrap();

        insert_mount(
            &db,
            &tables,
            &LinkMountRow {
                link_name: "sensor".to_string(),
                knowledge_base: "kb1".to_string(),
                mount_path: "kb1.site.a".to_string(),
                description: "sensor bank".to_string(),
            },
        )
        .unwrap();

        let mounts = find_mounts(&db, &tables, "sensor").unwrap();
        assert_eq!(mounts.len(), 1);
        assert_eq!(mounts[0].description, "sensor bank");
    }
}
