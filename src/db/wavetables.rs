// Local, dumped and preview wavetable blobs

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::constants::*;
use crate::error::{LibraryError, Result};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Wavetable {
    pub slot: i64,
    pub name: String,
    pub samples: Vec<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DumpedWavetable {
    pub id: i64,
    pub slot: i64,
    pub name: String,
    pub samples: Vec<i32>,
    pub dumped_at: String,
}

/// Samples as little-endian i32 bytes.
pub fn encode_samples(samples: &[i32]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

pub fn decode_samples(bytes: &[u8]) -> Result<Vec<i32>> {
    if bytes.len() % 4 != 0 {
        return Err(LibraryError::Invalid(format!("sample blob has {} bytes", bytes.len())));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

pub fn validate_wavetable(slot: i64, samples: &[i32]) -> Result<()> {
    if !(USER_WAVETABLE_FIRST_SLOT..=USER_WAVETABLE_LAST_SLOT).contains(&slot) {
        return Err(LibraryError::InvalidArgument(format!(
            "wavetable slot {} outside user range {}..={}",
            slot, USER_WAVETABLE_FIRST_SLOT, USER_WAVETABLE_LAST_SLOT
        )));
    }
    if samples.len() != WAVETABLE_SAMPLES {
        return Err(LibraryError::InvalidArgument(format!(
            "wavetable has {} samples, expected {}",
            samples.len(),
            WAVETABLE_SAMPLES
        )));
    }
    if let Some(bad) = samples.iter().find(|s| !(WAVE_SAMPLE_MIN..=WAVE_SAMPLE_MAX).contains(*s)) {
        return Err(LibraryError::InvalidArgument(format!("sample {} exceeds 21-bit range", bad)));
    }
    Ok(())
}

// ----- Local wavetables -----

pub fn save_local_wavetable(conn: &Connection, slot: i64, name: &str, samples: &[i32]) -> Result<()> {
    validate_wavetable(slot, samples)?;
    conn.execute(
        "INSERT INTO local_wavetables (slot, name, samples, updated_at)
         VALUES (?1, ?2, ?3, datetime('now'))
         ON CONFLICT(slot) DO UPDATE SET name = excluded.name, samples = excluded.samples,
             updated_at = excluded.updated_at",
        params![slot, name, encode_samples(samples)],
    )?;
    Ok(())
}

pub fn get_local_wavetable(conn: &Connection, slot: i64) -> Result<Option<Wavetable>> {
    let row = conn
        .query_row(
            "SELECT slot, name, samples FROM local_wavetables WHERE slot = ?1",
            params![slot],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, Vec<u8>>(2)?)),
        )
        .optional()?;
    match row {
        Some((slot, name, blob)) => Ok(Some(Wavetable { slot, name, samples: decode_samples(&blob)? })),
        None => Ok(None),
    }
}

/// (slot, name) of every local wavetable, without sample data.
pub fn list_local_wavetables(conn: &Connection) -> Result<Vec<(i64, String)>> {
    let mut stmt = conn.prepare("SELECT slot, name FROM local_wavetables ORDER BY slot")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn delete_local_wavetable(conn: &Connection, slot: i64) -> Result<bool> {
    Ok(conn.execute("DELETE FROM local_wavetables WHERE slot = ?1", params![slot])? > 0)
}

// ----- Dumped wavetables -----

/// Record a wavetable received from the instrument.
pub fn record_dumped_wavetable(conn: &Connection, slot: i64, name: &str, samples: &[i32]) -> Result<i64> {
    validate_wavetable(slot, samples)?;
    conn.execute(
        "INSERT INTO dumped_wavetables (slot, name, samples, dumped_at) VALUES (?1, ?2, ?3, ?4)",
        params![slot, name, encode_samples(samples), Utc::now().to_rfc3339()],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn list_dumped_wavetables(conn: &Connection) -> Result<Vec<DumpedWavetable>> {
    let mut stmt = conn.prepare(
        "SELECT id, slot, name, samples, dumped_at FROM dumped_wavetables ORDER BY id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, Vec<u8>>(3)?,
            row.get::<_, String>(4)?,
        ))
    })?;
    let mut out = Vec::new();
    for row in rows {
        let (id, slot, name, blob, dumped_at) = row?;
        out.push(DumpedWavetable { id, slot, name, samples: decode_samples(&blob)?, dumped_at });
    }
    Ok(out)
}

// ----- Previews -----

pub fn get_preview(conn: &Connection, slot: i64) -> Result<Option<Vec<i32>>> {
    let blob: Option<Vec<u8>> = conn
        .query_row("SELECT points FROM wavetable_previews WHERE slot = ?1", params![slot], |row| row.get(0))
        .optional()?;
    blob.map(|b| decode_samples(&b)).transpose()
}

pub fn list_previews(conn: &Connection) -> Result<Vec<(i64, String)>> {
    let mut stmt = conn.prepare("SELECT slot, name FROM wavetable_previews ORDER BY slot")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}
