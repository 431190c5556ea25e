// Generated SQL for the wide parameter tables.
// Column order is part of the file format and is validated at startup.

use std::sync::LazyLock;

use crate::constants::{NAME_LEN, NAME_OFFSET, PARAM_COUNT};

pub fn param_column(index: usize) -> String {
    format!("param_{}", index)
}

/// Expected `sounds` column names, in order.
pub fn sounds_columns() -> Vec<String> {
    let mut cols: Vec<String> = (0..PARAM_COUNT).map(param_column).collect();
    cols.push("uid".to_string());
    cols
}

static PARAM_LIST: LazyLock<String> = LazyLock::new(|| {
    (0..PARAM_COUNT).map(param_column).collect::<Vec<_>>().join(", ")
});

static PARAM_PLACEHOLDERS: LazyLock<String> = LazyLock::new(|| {
    (1..=PARAM_COUNT).map(|i| format!("?{}", i)).collect::<Vec<_>>().join(", ")
});

pub static CREATE_SOUNDS: LazyLock<String> = LazyLock::new(|| {
    let params: Vec<String> = (0..PARAM_COUNT)
        .map(|i| format!("{} INTEGER NOT NULL DEFAULT 0", param_column(i)))
        .collect();
    format!(
        "CREATE TABLE sounds ({}, uid TEXT PRIMARY KEY NOT NULL)",
        params.join(", ")
    )
});

pub static CREATE_TEMPLATES: LazyLock<String> = LazyLock::new(|| {
    let params: Vec<String> = (0..PARAM_COUNT)
        .map(|i| format!("{} INTEGER", param_column(i)))
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS templates ({}, name TEXT PRIMARY KEY NOT NULL, groups TEXT NOT NULL DEFAULT '[]')",
        params.join(", ")
    )
});

pub static SELECT_SOUND: LazyLock<String> = LazyLock::new(|| {
    format!("SELECT {} FROM sounds WHERE uid = ?1", *PARAM_LIST)
});

pub static SELECT_ALL_SOUNDS: LazyLock<String> = LazyLock::new(|| {
    format!("SELECT uid, {} FROM sounds", *PARAM_LIST)
});

/// Parameters bind to ?1..?383, the uid to ?384.
pub static INSERT_SOUND: LazyLock<String> = LazyLock::new(|| {
    format!(
        "INSERT INTO sounds ({}, uid) VALUES ({}, ?{})",
        *PARAM_LIST,
        *PARAM_PLACEHOLDERS,
        PARAM_COUNT + 1
    )
});

pub static UPDATE_SOUND: LazyLock<String> = LazyLock::new(|| {
    let sets: Vec<String> = (0..PARAM_COUNT)
        .map(|i| format!("{} = ?{}", param_column(i), i + 1))
        .collect();
    format!("UPDATE sounds SET {} WHERE uid = ?{}", sets.join(", "), PARAM_COUNT + 1)
});

/// Name characters bind to ?1..?16.
pub static NAME_EXISTS: LazyLock<String> = LazyLock::new(|| {
    let conds: Vec<String> = (0..NAME_LEN)
        .map(|i| format!("{} = ?{}", param_column(NAME_OFFSET + i), i + 1))
        .collect();
    format!("SELECT EXISTS(SELECT 1 FROM sounds WHERE {})", conds.join(" AND "))
});

/// Template parameters bind to ?1..?383, name to ?384, groups to ?385.
pub static UPSERT_TEMPLATE: LazyLock<String> = LazyLock::new(|| {
    format!(
        "INSERT OR REPLACE INTO templates ({}, name, groups) VALUES ({}, ?{}, ?{})",
        *PARAM_LIST,
        *PARAM_PLACEHOLDERS,
        PARAM_COUNT + 1,
        PARAM_COUNT + 2
    )
});

pub static SELECT_TEMPLATE_BY_NAME: LazyLock<String> = LazyLock::new(|| {
    format!("SELECT name, groups, {} FROM templates WHERE name = ?1", *PARAM_LIST)
});

pub static SELECT_TEMPLATES: LazyLock<String> = LazyLock::new(|| {
    format!("SELECT name, groups, {} FROM templates ORDER BY name", *PARAM_LIST)
});

/// `?, ?, ?` for an IN list of `n` values.
pub fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sounds_columns_shape() {
        let cols = sounds_columns();
        assert_eq!(cols.len(), PARAM_COUNT + 1);
        assert_eq!(cols[0], "param_0");
        assert_eq!(cols[PARAM_COUNT - 1], "param_382");
        assert_eq!(cols[PARAM_COUNT], "uid");
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders(3), "?, ?, ?");
        assert_eq!(placeholders(1), "?");
    }

    #[test]
    fn test_generated_sql_binds_uid_last() {
        assert!(INSERT_SOUND.ends_with("?383, ?384)"));
        assert!(UPDATE_SOUND.ends_with("WHERE uid = ?384"));
        assert!(NAME_EXISTS.contains("param_378 = ?16"));
    }
}
