//! The staging area: the hand-off point between extraction and loading.
//!
//! An [`ExtractArtifact`] is written as a dated CSV file
//! (`stock_data_YYYYMMDD.csv`) so the loader can run in a separate process
//! without sharing memory with the extractor. Columns are
//! `date,symbol,open,high,low,close,volume`; prices are written in their
//! shortest round-trip form, so reading a file back reproduces every field.

use std::{
  fs,
  path::{Path, PathBuf},
};

use chrono::{Local, NaiveDate};
use stockpipe_core::record::{ExtractArtifact, PriceRecord};

use crate::error::StagingError;

const FILE_PREFIX: &str = "stock_data_";
const FILE_DATE_FORMAT: &str = "%Y%m%d";

/// A directory holding staged extract artifacts.
#[derive(Debug, Clone)]
pub struct Staging {
  dir: PathBuf,
}

impl Staging {
  pub fn new(dir: impl Into<PathBuf>) -> Self { Self { dir: dir.into() } }

  pub fn dir(&self) -> &Path { &self.dir }

  /// The artifact path for an extraction run on `date`.
  pub fn path_for(&self, date: NaiveDate) -> PathBuf {
    self
      .dir
      .join(format!("{FILE_PREFIX}{}.csv", date.format(FILE_DATE_FORMAT)))
  }

  /// Write `artifact` to its dated path, replacing any earlier artifact from
  /// the same day, and return that path.
  ///
  /// The file is written under a temporary name and renamed into place, so a
  /// reader never observes a half-written artifact. The temporary file is
  /// removed if any step fails.
  pub fn write(&self, artifact: &ExtractArtifact) -> Result<PathBuf, StagingError> {
    fs::create_dir_all(&self.dir).map_err(|source| StagingError::Io {
      path: self.dir.clone(),
      source,
    })?;

    let path = self.path_for(artifact.extracted_on);
    let tmp = path.with_extension("csv.tmp");

    let written = write_csv(&tmp, artifact).and_then(|()| {
      fs::rename(&tmp, &path).map_err(|source| StagingError::Io {
        path: path.clone(),
        source,
      })
    });
    if let Err(e) = written {
      if tmp.is_file() {
        fs::remove_file(&tmp).ok();
      }
      return Err(e);
    }

    tracing::debug!(path = %path.display(), records = artifact.len(), "staged artifact");
    Ok(path)
  }

  /// Read a staged artifact back.
  ///
  /// The extraction date is taken from the file name; files named some other
  /// way are tagged with today's date.
  pub fn read(&self, path: &Path) -> Result<ExtractArtifact, StagingError> {
    if !path.is_file() {
      return Err(StagingError::Missing(path.to_path_buf()));
    }

    let csv_err = |source: csv::Error| StagingError::Csv { path: path.to_path_buf(), source };
    let mut reader = csv::Reader::from_path(path).map_err(csv_err)?;
    let records = reader
      .deserialize::<PriceRecord>()
      .collect::<Result<Vec<_>, _>>()
      .map_err(csv_err)?;

    let extracted_on = date_from_path(path).unwrap_or_else(|| {
      tracing::warn!(
        path = %path.display(),
        "artifact name carries no extraction date; using today"
      );
      Local::now().date_naive()
    });

    Ok(ExtractArtifact::new(extracted_on, records))
  }
}

fn write_csv(tmp: &Path, artifact: &ExtractArtifact) -> Result<(), StagingError> {
  let csv_err = |source: csv::Error| StagingError::Csv { path: tmp.to_path_buf(), source };
  let mut writer = csv::Writer::from_path(tmp).map_err(csv_err)?;
  for record in &artifact.records {
    writer.serialize(record).map_err(csv_err)?;
  }
  writer.flush().map_err(|source| StagingError::Io {
    path: tmp.to_path_buf(),
    source,
  })
}

/// Parse the extraction date out of a `stock_data_YYYYMMDD.csv` file name.
pub fn date_from_path(path: &Path) -> Option<NaiveDate> {
  let stem = path.file_stem()?.to_str()?;
  let digits = stem.strip_prefix(FILE_PREFIX)?;
  NaiveDate::parse_from_str(digits, FILE_DATE_FORMAT).ok()
}
