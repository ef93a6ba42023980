//! # Trajectory File Loader
//!
//! Reads recorded demonstrations stored as whitespace-separated text:
//!
//! ```text
//! # header lines start with '#'
//! <trajectory_id> <time> <x> <y>
//! ```

use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, Trim};
use serde::Deserialize;
use tracing::{debug, info};

use super::trajectory::Trajectory;
use crate::error::{Error, Result};

/// One row of a demonstration file
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TrajectoryRecord {
    pub trajectory_id: i64,
    pub time: f64,
    pub x: f64,
    pub y: f64,
}

/// Parse all records from a reader
pub fn read_records<R: Read>(reader: R) -> Result<Vec<TrajectoryRecord>> {
    let mut rdr = ReaderBuilder::new()
        .delimiter(b' ')
        .has_headers(false)
        .comment(Some(b'#'))
        .trim(Trim::All)
        .flexible(true)
        .from_reader(reader);

    let mut records = Vec::new();
    for result in rdr.deserialize() {
        records.push(result?);
    }
    Ok(records)
}

/// Parse all records from a file
pub fn load_records<P: AsRef<Path>>(path: P) -> Result<Vec<TrajectoryRecord>> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)?;
    let records = read_records(file)?;
    debug!("Read {} records from {}", records.len(), path.display());
    Ok(records)
}

/// Build the 2-D trajectory with the given id.
///
/// Recorded times may be negative; their absolute value is used.
pub fn trajectory_from_records(records: &[TrajectoryRecord], trajectory_id: i64) -> Result<Trajectory> {
    let selected: Vec<&TrajectoryRecord> = records
        .iter()
        .filter(|r| r.trajectory_id == trajectory_id)
        .collect();

    if selected.is_empty() {
        return Err(Error::Parse(format!(
            "no records with trajectory id {}",
            trajectory_id
        )));
    }

    let times = selected.iter().map(|r| r.time.abs()).collect();
    let rows: Vec<Vec<f64>> = selected.iter().map(|r| vec![r.x, r.y]).collect();
    Trajectory::from_rows(times, &rows)
}

/// Load one trajectory from a demonstration file
pub fn load_trajectory<P: AsRef<Path>>(path: P, trajectory_id: i64) -> Result<Trajectory> {
    let records = load_records(&path)?;
    let trajectory = trajectory_from_records(&records, trajectory_id)?;
    info!(
        "Loaded trajectory {} with {} states from {}",
        trajectory_id,
        trajectory.len(),
        path.as_ref().display()
    );
    Ok(trajectory)
}

// ============================================================================
// Tests
// ============================================================================
