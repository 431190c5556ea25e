// Tag catalog, parameter templates and the ascii glyph lookup

use std::collections::BTreeMap;

use rusqlite::types::Value;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_TAG_BG_COLOR, DEFAULT_TAG_FG_COLOR, NAME_CHAR_MAX, NAME_CHAR_MIN, PARAM_COUNT};
use crate::db::columns;
use crate::db::schema;
use crate::error::{LibraryError, Result};
use crate::params::{self, names};

// ----- Tags -----

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub name: String,
    pub bg_color: i64,
    pub fg_color: i64,
}

pub fn list_tags(conn: &Connection) -> Result<Vec<Tag>> {
    let mut stmt = conn.prepare("SELECT tag, bg_color, fg_color FROM tags ORDER BY tag")?;
    let rows = stmt.query_map([], |row| {
        Ok(Tag { name: row.get(0)?, bg_color: row.get(1)?, fg_color: row.get(2)? })
    })?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn get_tag(conn: &Connection, name: &str) -> Result<Option<Tag>> {
    let tag = conn
        .query_row(
            "SELECT tag, bg_color, fg_color FROM tags WHERE tag = ?1",
            params![name],
            |row| Ok(Tag { name: row.get(0)?, bg_color: row.get(1)?, fg_color: row.get(2)? }),
        )
        .optional()?;
    Ok(tag)
}

/// Insert or recolor a tag.
pub fn upsert_tag(conn: &Connection, tag: &Tag) -> Result<()> {
    let name = tag.name.trim();
    if name.is_empty() {
        return Err(LibraryError::InvalidArgument("tag name is empty".to_string()));
    }
    conn.execute(
        "INSERT INTO tags (tag, bg_color, fg_color) VALUES (?1, ?2, ?3)
         ON CONFLICT(tag) DO UPDATE SET bg_color = excluded.bg_color, fg_color = excluded.fg_color",
        params![name, tag.bg_color, tag.fg_color],
    )?;
    Ok(())
}

/// Register tag names not yet in the catalog, with default colors.
pub fn ensure_tags(conn: &Connection, names: &[String]) -> Result<()> {
    for name in schema::normalize_tags(names) {
        conn.execute(
            "INSERT OR IGNORE INTO tags (tag, bg_color, fg_color) VALUES (?1, ?2, ?3)",
            params![name, DEFAULT_TAG_BG_COLOR, DEFAULT_TAG_FG_COLOR],
        )?;
    }
    Ok(())
}

/// Rename a tag in the catalog and on every sound carrying it. Returns sounds touched.
pub fn rename_tag(conn: &Connection, old: &str, new: &str) -> Result<usize> {
    let tag = get_tag(conn, old)?.ok_or_else(|| LibraryError::TagNotFound(old.to_string()))?;
    let new = new.trim();
    if new.is_empty() {
        return Err(LibraryError::InvalidArgument("tag name is empty".to_string()));
    }
    conn.execute("DELETE FROM tags WHERE tag = ?1", params![old])?;
    upsert_tag(conn, &Tag { name: new.to_string(), ..tag })?;

    let mut touched = 0;
    for (uid, tags) in schema::all_tag_rows(conn)? {
        if tags.iter().any(|t| t == old) {
            let renamed: Vec<String> = tags
                .into_iter()
                .map(|t| if t == old { new.to_string() } else { t })
                .collect();
            schema::set_tags(conn, &uid, &renamed)?;
            touched += 1;
        }
    }
    Ok(touched)
}

/// Remove a tag from the catalog and strip it from every sound. Returns sounds touched.
pub fn delete_tag(conn: &Connection, name: &str) -> Result<usize> {
    if conn.execute("DELETE FROM tags WHERE tag = ?1", params![name])? == 0 {
        return Err(LibraryError::TagNotFound(name.to_string()));
    }
    let mut touched = 0;
    for (uid, tags) in schema::all_tag_rows(conn)? {
        if tags.iter().any(|t| t == name) {
            let kept: Vec<String> = tags.into_iter().filter(|t| t != name).collect();
            schema::set_tags(conn, &uid, &kept)?;
            touched += 1;
        }
    }
    Ok(touched)
}

// ----- Templates -----

/// A named, partial parameter vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub name: String,
    pub params: BTreeMap<usize, i32>,
    pub groups: Vec<String>,
}

fn map_template(row: &rusqlite::Row) -> rusqlite::Result<(String, String, BTreeMap<usize, i32>)> {
    let name: String = row.get(0)?;
    let groups: String = row.get(1)?;
    let mut values = BTreeMap::new();
    for i in 0..PARAM_COUNT {
        if let Some(v) = row.get::<_, Option<i32>>(2 + i)? {
            values.insert(i, v);
        }
    }
    Ok((name, groups, values))
}

fn into_template(raw: (String, String, BTreeMap<usize, i32>)) -> Result<Template> {
    let (name, groups, params) = raw;
    Ok(Template { name, params, groups: serde_json::from_str(&groups)? })
}

/// Insert or replace a template. Values are sanitized like sound parameters.
pub fn save_template(conn: &Connection, template: &Template) -> Result<()> {
    if template.name.trim().is_empty() {
        return Err(LibraryError::InvalidArgument("template name is empty".to_string()));
    }
    let mut values = vec![Value::Null; PARAM_COUNT];
    for (&index, &value) in &template.params {
        params::check_index(index)?;
        values[index] = Value::Integer(i64::from(params::range_of(index).sanitize(value)));
    }
    values.push(Value::Text(template.name.trim().to_string()));
    values.push(Value::Text(serde_json::to_string(&schema::normalize_tags(&template.groups))?));
    conn.execute(&columns::UPSERT_TEMPLATE, rusqlite::params_from_iter(values))?;
    Ok(())
}

pub fn get_template(conn: &Connection, name: &str) -> Result<Option<Template>> {
    let raw = conn
        .query_row(&columns::SELECT_TEMPLATE_BY_NAME, params![name], map_template)
        .optional()?;
    raw.map(into_template).transpose()
}

/// All templates, or only those in `group`.
pub fn list_templates(conn: &Connection, group: Option<&str>) -> Result<Vec<Template>> {
    let mut stmt = conn.prepare(&columns::SELECT_TEMPLATES)?;
    let rows = stmt.query_map([], map_template)?;
    let mut out = Vec::new();
    for row in rows {
        let template = into_template(row?)?;
        if group.map_or(true, |g| template.groups.iter().any(|t| t == g)) {
            out.push(template);
        }
    }
    Ok(out)
}

pub fn delete_template(conn: &Connection, name: &str) -> Result<()> {
    if conn.execute("DELETE FROM templates WHERE name = ?1", params![name])? == 0 {
        return Err(LibraryError::TemplateNotFound(name.to_string()));
    }
    Ok(())
}

/// Overlay a template onto a full parameter vector.
pub fn overlay_template(base: &[i32], template: &Template) -> Result<Vec<i32>> {
    params::check_len(base)?;
    let mut out = base.to_vec();
    for (&index, &value) in &template.params {
        params::check_index(index)?;
        out[index] = value;
    }
    params::sanitize(&out)
}

// ----- ascii lookup -----

pub fn seed_ascii(conn: &Connection) -> Result<()> {
    let mut stmt = conn.prepare("INSERT OR IGNORE INTO ascii (code, glyph) VALUES (?1, ?2)")?;
    for code in NAME_CHAR_MIN..=NAME_CHAR_MAX {
        stmt.execute(params![code, names::glyph_for_code(code).to_string()])?;
    }
    Ok(())
}

/// Decode character codes through the lookup table.
pub fn lookup_glyphs(conn: &Connection, codes: &[i32]) -> Result<String> {
    let mut stmt = conn.prepare_cached("SELECT glyph FROM ascii WHERE code = ?1")?;
    let mut out = String::with_capacity(codes.len());
    for code in codes {
        let glyph: Option<String> = stmt.query_row(params![code], |row| row.get(0)).optional()?;
        out.push_str(glyph.as_deref().unwrap_or(" "));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations::create_canonical_schema;
    use crate::db::schema::{create_sound, get_tags_for, set_tags};

    fn setup_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        create_canonical_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn test_tag_rename_rewrites_sounds() {
        let conn = setup_db();
        let uid = create_sound(&conn, &params::init_sound()).unwrap();
        ensure_tags(&conn, &["bright".to_string(), "pad".to_string()]).unwrap();
        set_tags(&conn, &uid, &["bright".to_string(), "pad".to_string()]).unwrap();

        assert_eq!(rename_tag(&conn, "bright", "shiny").unwrap(), 1);
        assert_eq!(get_tags_for(&conn, &uid).unwrap(), vec!["shiny", "pad"]);
        assert!(get_tag(&conn, "bright").unwrap().is_none());
        assert_eq!(get_tag(&conn, "shiny").unwrap().unwrap().bg_color, DEFAULT_TAG_BG_COLOR);
    }

    #[test]
    fn test_tag_delete_strips_sounds() {
        let conn = setup_db();
        let uid = create_sound(&conn, &params::init_sound()).unwrap();
        ensure_tags(&conn, &["dark".to_string()]).unwrap();
        set_tags(&conn, &uid, &["dark".to_string(), "keep".to_string()]).unwrap();

        assert_eq!(delete_tag(&conn, "dark").unwrap(), 1);
        assert_eq!(get_tags_for(&conn, &uid).unwrap(), vec!["keep"]);
        assert!(matches!(delete_tag(&conn, "dark"), Err(LibraryError::TagNotFound(_))));
    }

    #[test]
    fn test_upsert_tag_recolors() {
        let conn = setup_db();
        upsert_tag(&conn, &Tag { name: "lead".into(), bg_color: 1, fg_color: 2 }).unwrap();
        upsert_tag(&conn, &Tag { name: "lead".into(), bg_color: 3, fg_color: 4 }).unwrap();
        assert_eq!(list_tags(&conn).unwrap(), vec![Tag { name: "lead".into(), bg_color: 3, fg_color: 4 }]);
    }

    #[test]
    fn test_template_round_trip_and_groups() {
        let conn = setup_db();
        let mut values = BTreeMap::new();
        values.insert(1, 63);
        values.insert(10, 300);
        save_template(&conn, &Template { name: "Wide".into(), params: values, groups: vec!["fx".into()] }).unwrap();
        save_template(&conn, &Template { name: "Plain".into(), params: BTreeMap::new(), groups: vec![] }).unwrap();

        let stored = get_template(&conn, "Wide").unwrap().unwrap();
        assert_eq!(stored.params.get(&1), Some(&64));
        assert_eq!(stored.params.get(&10), Some(&127));
        assert_eq!(stored.params.len(), 2);

        assert_eq!(list_templates(&conn, None).unwrap().len(), 2);
        let fx = list_templates(&conn, Some("fx")).unwrap();
        assert_eq!(fx.len(), 1);
        assert_eq!(fx[0].name, "Wide");

        delete_template(&conn, "Plain").unwrap();
        assert!(matches!(delete_template(&conn, "Plain"), Err(LibraryError::TemplateNotFound(_))));
    }

    #[test]
    fn test_overlay_template() {
        let mut values = BTreeMap::new();
        values.insert(20, 99);
        let template = Template { name: "T".into(), params: values, groups: vec![] };
        let out = overlay_template(&params::init_sound(), &template).unwrap();
        assert_eq!(out[20], 99);
        assert_eq!(out[21], params::init_sound()[21]);
    }

    #[test]
    fn test_ascii_lookup_matches_names() {
        let conn = setup_db();
        let codes = names::encode_name("Bass°");
        assert_eq!(lookup_glyphs(&conn, &codes).unwrap().trim_end(), "Bass°");
    }
}
