//! Persistence of ECG samples and PVC candidates.
//!
//! `SqliteStore` keeps a recording in one database with `ecg_data`,
//! `metadata` and `pvcs` tables. `CsvStore` writes the same content as a
//! directory of `ecg_data.csv` (`ind,time,ecg`), `pvcs.csv` (`index,tier`)
//! and `metadata.json`.

use crate::detectors::pvc::{PvcCandidate, PvcTier};
use anyhow::{Context, Result};
use csv::{ReaderBuilder, Trim, WriterBuilder};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const ECG_FILE: &str = "ecg_data.csv";
const PVC_FILE: &str = "pvcs.csv";
const META_FILE: &str = "metadata.json";

/// Storage for one analysed recording.
pub trait EcgStore {
    /// Replace stored contents with the given samples and candidates.
    fn upload(&mut self, time: &[f64], ecg: &[f64], pvcs: &[PvcCandidate]) -> Result<()>;
    /// Number of stored samples.
    fn query_length(&self) -> Result<usize>;
    /// Samples with `start <= time < end`, ordered by time.
    fn query_range(&self, start: f64, end: f64) -> Result<(Vec<f64>, Vec<f64>)>;
    /// `(time, ecg)` of sample `index`.
    fn query_point(&self, index: usize) -> Result<Option<(f64, f64)>>;
    /// Candidates with `start <= index < end`.
    fn query_pvcs(&self, start: usize, end: usize) -> Result<Vec<PvcCandidate>>;
}

fn check_lengths(time: &[f64], ecg: &[f64]) -> Result<()> {
    if time.len() != ecg.len() {
        anyhow::bail!(
            "time has {} samples but ecg has {}",
            time.len(),
            ecg.len()
        );
    }
    Ok(())
}

fn sql_index(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// SQLite database implementing [`EcgStore`].
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .with_context(|| format!("opening database {}", path.display()))?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }
}

impl EcgStore for SqliteStore {
    fn upload(&mut self, time: &[f64], ecg: &[f64], pvcs: &[PvcCandidate]) -> Result<()> {
        check_lengths(time, ecg)?;
        let tx = self.conn.transaction()?;
        tx.execute_batch(
            r#"DROP TABLE IF EXISTS ecg_data;
            CREATE TABLE ecg_data (
                ind INTEGER PRIMARY KEY,
                time REAL NOT NULL,
                ecg REAL NOT NULL
            );
            CREATE INDEX ecg_data_time_idx ON ecg_data(time);
            DROP TABLE IF EXISTS metadata;
            CREATE TABLE metadata (length INTEGER NOT NULL);
            DROP TABLE IF EXISTS pvcs;
            CREATE TABLE pvcs (
                "index" INTEGER PRIMARY KEY,
                tier INTEGER NOT NULL
            );"#,
        )?;
        {
            let mut insert_sample =
                tx.prepare("INSERT INTO ecg_data (ind, time, ecg) VALUES (?1, ?2, ?3)")?;
            for (ind, (&t, &e)) in time.iter().zip(ecg).enumerate() {
                insert_sample.execute(params![sql_index(ind), t, e])?;
            }
            let mut insert_pvc = tx.prepare(r#"INSERT INTO pvcs ("index", tier) VALUES (?1, ?2)"#)?;
            for c in pvcs {
                insert_pvc.execute(params![sql_index(c.index), c.tier.level()])?;
            }
        }
        tx.execute(
            "INSERT INTO metadata (length) VALUES (?1)",
            params![sql_index(ecg.len())],
        )?;
        tx.commit()?;
        log::debug!(
            "stored {} samples and {} candidates in sqlite",
            ecg.len(),
            pvcs.len()
        );
        Ok(())
    }

    fn query_length(&self) -> Result<usize> {
        let length: i64 = self
            .conn
            .query_row("SELECT length FROM metadata", [], |r| r.get(0))
            .context("store holds no recording")?;
        Ok(usize::try_from(length)?)
    }

    fn query_range(&self, start: f64, end: f64) -> Result<(Vec<f64>, Vec<f64>)> {
        let mut stmt = self.conn.prepare(
            "SELECT time, ecg FROM ecg_data WHERE time >= ?1 AND time < ?2 ORDER BY time",
        )?;
        let rows = stmt
            .query_map(params![start, end], |r| Ok((r.get::<_, f64>(0)?, r.get::<_, f64>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows.into_iter().unzip())
    }

    fn query_point(&self, index: usize) -> Result<Option<(f64, f64)>> {
        let Ok(ind) = i64::try_from(index) else {
            return Ok(None);
        };
        let row = self
            .conn
            .query_row(
                "SELECT time, ecg FROM ecg_data WHERE ind = ?1",
                params![ind],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;
        Ok(row)
    }

    fn query_pvcs(&self, start: usize, end: usize) -> Result<Vec<PvcCandidate>> {
        let mut stmt = self.conn.prepare(
            r#"SELECT "index", tier FROM pvcs WHERE "index" >= ?1 AND "index" < ?2 ORDER BY "index""#,
        )?;
        let rows = stmt
            .query_map(params![sql_index(start), sql_index(end)], |r| {
                Ok((r.get::<_, i64>(0)?, r.get::<_, u8>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter()
            .map(|(index, tier)| -> Result<PvcCandidate> {
                Ok(PvcCandidate {
                    index: usize::try_from(index)?,
                    tier: PvcTier::try_from(tier)?,
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct SampleRow {
    ind: usize,
    time: f64,
    ecg: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct PvcRow {
    index: usize,
    tier: u8,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreMetadata {
    length: usize,
}

/// Directory of CSV files implementing [`EcgStore`].
///
/// Queries scan the whole sample file.
#[derive(Debug, Clone)]
pub struct CsvStore {
    dir: PathBuf,
}

impl CsvStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    fn samples(&self) -> Result<impl Iterator<Item = Result<SampleRow>>> {
        let path = self.path(ECG_FILE);
        let reader = ReaderBuilder::new()
            .trim(Trim::All)
            .from_path(&path)
            .with_context(|| format!("opening {}", path.display()))?;
        Ok(reader
            .into_deserialize::<SampleRow>()
            .enumerate()
            .map(move |(idx, row)| row.with_context(|| format!("parsing sample row {}", idx + 1))))
    }
}

impl EcgStore for CsvStore {
    fn upload(&mut self, time: &[f64], ecg: &[f64], pvcs: &[PvcCandidate]) -> Result<()> {
        check_lengths(time, ecg)?;
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating store {}", self.dir.display()))?;

        let ecg_path = self.path(ECG_FILE);
        let mut writer = WriterBuilder::new()
            .from_path(&ecg_path)
            .with_context(|| format!("creating {}", ecg_path.display()))?;
        for (ind, (&time, &ecg)) in time.iter().zip(ecg).enumerate() {
            writer.serialize(SampleRow { ind, time, ecg })?;
        }
        writer.flush()?;

        let pvc_path = self.path(PVC_FILE);
        let mut writer = WriterBuilder::new()
            .from_path(&pvc_path)
            .with_context(|| format!("creating {}", pvc_path.display()))?;
        for c in pvcs {
            writer.serialize(PvcRow {
                index: c.index,
                tier: c.tier.level(),
            })?;
        }
        writer.flush()?;

        let meta = StoreMetadata { length: ecg.len() };
        fs::write(self.path(META_FILE), serde_json::to_string_pretty(&meta)?)
            .with_context(|| format!("writing metadata in {}", self.dir.display()))?;
        log::debug!(
            "stored {} samples and {} candidates in {}",
            ecg.len(),
            pvcs.len(),
            self.dir.display()
        );
        Ok(())
    }

    fn query_length(&self) -> Result<usize> {
        let path = self.path(META_FILE);
        let text = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let meta: StoreMetadata = serde_json::from_str(&text)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(meta.length)
    }

    fn query_range(&self, start: f64, end: f64) -> Result<(Vec<f64>, Vec<f64>)> {
        let mut rows = Vec::new();
        for row in self.samples()? {
            let row = row?;
            if row.time >= start && row.time < end {
                rows.push(row);
            }
        }
        rows.sort_by(|a, b| a.time.total_cmp(&b.time));
        Ok(rows.into_iter().map(|r| (r.time, r.ecg)).unzip())
    }

    fn query_point(&self, index: usize) -> Result<Option<(f64, f64)>> {
        for row in self.samples()? {
            let row = row?;
            if row.ind == index {
                return Ok(Some((row.time, row.ecg)));
            }
        }
        Ok(None)
    }

    fn query_pvcs(&self, start: usize, end: usize) -> Result<Vec<PvcCandidate>> {
        let path = self.path(PVC_FILE);
        let mut reader = ReaderBuilder::new()
            .trim(Trim::All)
            .from_path(&path)
            .with_context(|| format!("opening {}", path.display()))?;
        let mut out = Vec::new();
        for (idx, row) in reader.deserialize::<PvcRow>().enumerate() {
            let row = row.with_context(|| format!("parsing pvc row {}", idx + 1))?;
            if row.index >= start && row.index < end {
                out.push(PvcCandidate {
                    index: row.index,
                    tier: PvcTier::try_from(row.tier)?,
                });
            }
        }
        Ok(out)
    }
}
