use std::{
    collections::HashMap,
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::Path,
};

use glam::DVec3;
use kornia_lie::{se3::SE3, LieError};

use crate::trajectory::{Covariance, Trajectory, TrajectoryError};

/// Number of columns of a TUM record: `timestamp tx ty tz qx qy qz qw`.
const TUM_COLUMNS: usize = 8;

/// Number of columns of a TUM record followed by a row-major 6x6 covariance.
const TUM_COV_COLUMNS: usize = TUM_COLUMNS + 36;

/// Largest asymmetry accepted in a covariance before it is rejected.
const SYMMETRY_TOLERANCE: f64 = 1e-6;

/// Supported trajectory file formats, detected from the number of columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoseFormat {
    /// `timestamp tx ty tz qx qy qz qw`
    Tum,
    /// A TUM record followed by the 36 entries of the pose covariance, row major,
    /// ordered `[translation; rotation]`.
    TumCov,
}

impl PoseFormat {
    fn from_columns(columns: usize) -> Option<Self> {
        match columns {
            TUM_COLUMNS => Some(Self::Tum),
            TUM_COV_COLUMNS => Some(Self::TumCov),
            _ => None,
        }
    }

    /// Number of columns of a record in this format.
    pub fn columns(&self) -> usize {
        match self {
            Self::Tum => TUM_COLUMNS,
            Self::TumCov => TUM_COV_COLUMNS,
        }
    }
}

/// Error types for reading and writing trajectory files.
#[derive(Debug, thiserror::Error)]
pub enum TumError {
    /// Error reading or writing file
    #[error("error reading or writing file")]
    Io(#[from] std::io::Error),

    /// The file has no records.
    #[error("The file contains no poses")]
    Empty,

    /// A field could not be parsed as a finite number.
    #[error("Line {line}: {message}")]
    Parse {
        /// 1-based line number.
        line: usize,
        /// What went wrong.
        message: String,
    },

    /// The record has a number of columns matching no supported format.
    #[error("Line {line}: unsupported pose format with {columns} columns (expected 8 or 44)")]
    UnsupportedColumns {
        /// 1-based line number.
        line: usize,
        /// Number of columns found.
        columns: usize,
    },

    /// The record has a different number of columns than the first record.
    #[error("Line {line}: expected {expected} columns, got {got}")]
    InconsistentColumns {
        /// 1-based line number.
        line: usize,
        /// Number of columns of the first record.
        expected: usize,
        /// Number of columns found.
        got: usize,
    },

    /// The timestamp already appeared on an earlier line.
    #[error("Line {line}: duplicate timestamp {stamp} (first seen on line {first})")]
    DuplicateTimestamp {
        /// 1-based line number.
        line: usize,
        /// Line of the first occurrence.
        first: usize,
        /// The repeated timestamp.
        stamp: f64,
    },

    /// The pose or its covariance is invalid.
    #[error("Line {line}: invalid pose")]
    InvalidPose {
        /// 1-based line number.
        line: usize,
        /// The underlying error.
        #[source]
        source: LieError,
    },

    /// The records do not form a valid trajectory.
    #[error(transparent)]
    Trajectory(#[from] TrajectoryError),
}

/// Read a trajectory file in TUM format, with or without covariances.
///
/// # Arguments
///
/// * `path` - The path to the trajectory file.
///
/// # Returns
///
/// The trajectory sorted by timestamp.
pub fn read_trajectory(path: impl AsRef<Path>) -> Result<Trajectory, TumError> {
    let file = File::open(path)?;
    parse_trajectory(BufReader::new(file))
}

/// Parse a trajectory from any buffered reader, see [`read_trajectory`].
///
/// Blank lines and lines starting with `#` are skipped. Fields can be separated by
/// whitespace and/or commas. The format is detected from the first record and every
/// other record must have the same number of columns.
pub fn parse_trajectory(reader: impl BufRead) -> Result<Trajectory, TumError> {
    let mut format: Option<PoseFormat> = None;
    let mut seen: HashMap<u64, usize> = HashMap::new();

    let mut stamps = Vec::new();
    let mut poses = Vec::new();
    let mut covariances = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let line_no = idx + 1;

        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let values = parse_fields(trimmed, line_no)?;

        let record_format = match format {
            Some(f) if f.columns() != values.len() => {
                return Err(TumError::InconsistentColumns {
                    line: line_no,
                    expected: f.columns(),
                    got: values.len(),
                });
            }
            Some(f) => f,
            None => {
                let f = PoseFormat::from_columns(values.len()).ok_or(
                    TumError::UnsupportedColumns {
                        line: line_no,
                        columns: values.len(),
                    },
                )?;
                log::debug!("detected {f:?} trajectory format on line {line_no}");
                format = Some(f);
                f
            }
        };

        let stamp = values[0];
        // +0.0 and -0.0 are the same instant
        let key = (stamp + 0.0).to_bits();
        if let Some(&first) = seen.get(&key) {
            return Err(TumError::DuplicateTimestamp {
                line: line_no,
                first,
                stamp,
            });
        }
        seen.insert(key, line_no);

        let pose = SE3::from_qxyz(
            [values[4], values[5], values[6], values[7]],
            DVec3::new(values[1], values[2], values[3]),
        )
        .map_err(|source| TumError::InvalidPose {
            line: line_no,
            source,
        })?;

        if record_format == PoseFormat::TumCov {
            covariances.push(parse_covariance(&values[TUM_COLUMNS..], line_no)?);
        }

        stamps.push(stamp);
        poses.push(pose);
    }

    let traj = match format {
        None => return Err(TumError::Empty),
        Some(PoseFormat::Tum) => Trajectory::new(stamps, poses)?,
        Some(PoseFormat::TumCov) => Trajectory::with_covariances(stamps, poses, covariances)?,
    };

    log::debug!("parsed trajectory with {} poses", traj.len());

    Ok(traj)
}

/// Write a trajectory in TUM format, sorted by timestamp.
///
/// Trajectories carrying covariances are written with the 36 extra covariance columns.
pub fn write_trajectory(path: impl AsRef<Path>, traj: &Trajectory) -> Result<(), TumError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    let mut order = (0..traj.len()).collect::<Vec<_>>();
    let stamps = traj.timestamps();
    order.sort_by(|&a, &b| stamps[a].total_cmp(&stamps[b]));

    match traj.covariances() {
        Some(_) => writeln!(writer, "# timestamp tx ty tz qx qy qz qw cov[36]")?,
        None => writeln!(writer, "# timestamp tx ty tz qx qy qz qw")?,
    }

    for idx in order {
        let pose = &traj.poses()[idx];
        let t = pose.translation;
        let q = pose.rotation.q;
        write!(
            writer,
            "{} {} {} {} {} {} {} {}",
            stamps[idx], t.x, t.y, t.z, q.x, q.y, q.z, q.w
        )?;
        if let Some(covs) = traj.covariances() {
            let cov = &covs[idx];
            for r in 0..6 {
                for c in 0..6 {
                    write!(writer, " {}", cov[(r, c)])?;
                }
            }
        }
        writeln!(writer)?;
    }

    writer.flush()?;
    Ok(())
}

fn parse_fields(line: &str, line_no: usize) -> Result<Vec<f64>, TumError> {
    line.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .map(|s| {
            let value = s.parse::<f64>().map_err(|e| TumError::Parse {
                line: line_no,
                message: format!("{s}: {e}"),
            })?;
            if !value.is_finite() {
                return Err(TumError::Parse {
                    line: line_no,
                    message: format!("non-finite value {s}"),
                });
            }
            Ok(value)
        })
        .collect()
}

fn parse_covariance(values: &[f64], line_no: usize) -> Result<Covariance, TumError> {
    let cov = Covariance::from_row_slice(values);
    let asymmetry = (cov - cov.transpose()).amax();
    if asymmetry > SYMMETRY_TOLERANCE * cov.amax().max(1.0) {
        return Err(TumError::Parse {
            line: line_no,
            message: format!("covariance is not symmetric (max asymmetry {asymmetry:e})"),
        });
    }
    Ok((cov + cov.transpose()) * 0.5)
}
