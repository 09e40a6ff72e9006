//! Dataset persistence as CSV.
//!
//! One row per [`ProductRecord`], columns in [`Field::ALL`] order, absent
//! values as empty cells. Rows are flushed as they are appended, so an
//! interrupted run leaves a valid file holding every completed entry.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use wine_harvest_catalog_models::{Dataset, Field, ProductRecord};

/// Directory, under the data directory, holding datasets.
pub const DATASET_DIR: &str = "scraped";

/// Errors writing or reading a dataset file.
#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    /// Filesystem failure.
    #[error("dataset I/O error at {path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// CSV encoding or decoding failure.
    #[error("dataset CSV error at {path}: {source}")]
    Csv {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: csv::Error,
    },

    /// An existing file lacks a column needed to resume.
    #[error("dataset {path} has no '{column}' column")]
    MissingColumn {
        /// File involved.
        path: PathBuf,
        /// Column name.
        column: String,
    },
}

/// Conventional dataset path for `retailer`:
/// `<data_dir>/scraped/<retailer>_listings.csv`.
#[must_use]
pub fn dataset_path(data_dir: &Path, retailer: &str) -> PathBuf {
    data_dir
        .join(DATASET_DIR)
        .join(format!("{retailer}_listings.csv"))
}

/// Destination for assembled records.
pub trait RecordSink {
    /// Stores `record`.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError`] if the record cannot be stored.
    fn append(&mut self, record: &ProductRecord) -> Result<(), DatasetError>;
}

impl RecordSink for Dataset {
    fn append(&mut self, record: &ProductRecord) -> Result<(), DatasetError> {
        self.push(record.clone());
        Ok(())
    }
}

/// Appends records to a CSV dataset file.
pub struct DatasetWriter {
    path: PathBuf,
    writer: csv::Writer<File>,
    written: usize,
}

impl DatasetWriter {
    /// Creates (or truncates) the file at `path` and writes the header row.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError`] if the file cannot be created.
    pub fn create(path: &Path) -> Result<Self, DatasetError> {
        create_parent(path)?;
        let file = File::create(path).map_err(|source| io_error(path, source))?;
        let mut writer = Self::wrap(path, file);
        writer
            .writer
            .write_record(Field::ALL.iter().map(AsRef::<str>::as_ref))
            .map_err(|source| csv_error(path, source))?;
        writer.flush()?;
        Ok(writer)
    }

    /// Opens the file at `path` for appending, creating it with a header row
    /// when it does not exist or is empty.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError`] if the file cannot be opened.
    pub fn append_to(path: &Path) -> Result<Self, DatasetError> {
        let has_content = std::fs::metadata(path).is_ok_and(|meta| meta.len() > 0);
        if !has_content {
            return Self::create(path);
        }

        let file = OpenOptions::new()
            .append(true)
            .open(path)
            .map_err(|source| io_error(path, source))?;
        Ok(Self::wrap(path, file))
    }

    fn wrap(path: &Path, file: File) -> Self {
        Self {
            path: path.to_owned(),
            writer: csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(file),
            written: 0,
        }
    }

    fn flush(&mut self) -> Result<(), DatasetError> {
        self.writer
            .flush()
            .map_err(|source| io_error(&self.path, source))
    }

    /// Path of the dataset file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows appended through this writer.
    #[must_use]
    pub const fn written(&self) -> usize {
        self.written
    }
}

impl RecordSink for DatasetWriter {
    fn append(&mut self, record: &ProductRecord) -> Result<(), DatasetError> {
        self.writer
            .serialize(record)
            .map_err(|source| csv_error(&self.path, source))?;
        self.flush()?;
        self.written += 1;
        Ok(())
    }
}

/// `(category, source_url)` pairs already recorded in the dataset at `path`.
/// A missing file has none.
///
/// # Errors
///
/// Returns [`DatasetError`] if the file exists but cannot be read.
pub fn completed_entries(path: &Path) -> Result<HashSet<(String, String)>, DatasetError> {
    if !path.exists() {
        return Ok(HashSet::new());
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(|source| csv_error(path, source))?;

    let headers = reader
        .headers()
        .map_err(|source| csv_error(path, source))?
        .clone();
    let column = |field: Field| {
        let name = field.to_string();
        headers
            .iter()
            .position(|header| header == name)
            .ok_or(DatasetError::MissingColumn {
                path: path.to_owned(),
                column: name,
            })
    };
    let category = column(Field::Category)?;
    let source_url = column(Field::SourceUrl)?;

    let mut done = HashSet::new();
    for row in reader.records() {
        let row = row.map_err(|source| csv_error(path, source))?;
        if let (Some(category), Some(url)) = (row.get(category), row.get(source_url)) {
            done.insert((category.to_owned(), url.to_owned()));
        }
    }

    Ok(done)
}

fn create_parent(path: &Path) -> Result<(), DatasetError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            std::fs::create_dir_all(parent).map_err(|source| io_error(parent, source))
        }
        _ => Ok(()),
    }
}

fn io_error(path: &Path, source: std::io::Error) -> DatasetError {
    DatasetError::Io {
        path: path.to_owned(),
        source,
    }
}

fn csv_error(path: &Path, source: csv::Error) -> DatasetError {
    DatasetError::Csv {
        path: path.to_owned(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use wine_harvest_catalog_models::{CatalogEntry, Price};

    use super::*;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("wine_harvest_dataset_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    fn record(category: &str, url: &str) -> ProductRecord {
        let mut record = ProductRecord::new("Rioja Reserva 2018", &CatalogEntry::new(category, url));
        record.price = Some(Price::Amount(12.5));
        record.bottle_size_cl = Some(75.0);
        record
    }

    #[test]
    fn writes_header_and_empty_cells() {
        let dir = scratch("header");
        let path = dataset_path(&dir, "decantalo");
        let mut writer = DatasetWriter::create(&path).unwrap();
        writer.append(&record("red", "https://shop.test/p/1")).unwrap();
        assert_eq!(writer.written(), 1);
        drop(writer);

        let raw = std::fs::read_to_string(&path).unwrap();
        let mut lines = raw.lines();
        assert_eq!(
            lines.next(),
            Some(
                "name,category,wine_type,price,bottle_size_cl,abv_percent,vintage_year,\
                 country,rating,review_count,is_mixed_case,source_url"
            )
        );
        assert_eq!(
            lines.next(),
            Some("Rioja Reserva 2018,red,,12.5,75.0,,,,,,false,https://shop.test/p/1")
        );

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn unavailable_price_is_written_as_label() {
        let dir = scratch("unavailable");
        let path = dataset_path(&dir, "decantalo");
        let mut r = record("red", "https://shop.test/p/1");
        r.price = Some(Price::Unavailable("out of stock".to_owned()));
        DatasetWriter::create(&path).unwrap().append(&r).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains(",out of stock,"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn append_continues_existing_file_and_resume_sees_rows() {
        let dir = scratch("append");
        let path = dataset_path(&dir, "morrisons");

        let mut first = DatasetWriter::append_to(&path).unwrap();
        first.append(&record("red", "https://shop.test/p/1")).unwrap();
        drop(first);

        let mut second = DatasetWriter::append_to(&path).unwrap();
        second.append(&record("white", "https://shop.test/p/1")).unwrap();
        drop(second);

        let raw = std::fs::read_to_string(&path).unwrap();
        assert_eq!(raw.lines().count(), 3);
        assert_eq!(raw.matches("source_url").count(), 1);

        let done = completed_entries(&path).unwrap();
        assert_eq!(done.len(), 2);
        assert!(done.contains(&("white".to_owned(), "https://shop.test/p/1".to_owned())));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_file_has_no_completed_entries() {
        let dir = scratch("missing");
        assert!(completed_entries(&dataset_path(&dir, "x")).unwrap().is_empty());
    }

    #[test]
    fn dataset_is_an_in_memory_sink() {
        let mut dataset = Dataset::new();
        dataset.append(&record("red", "https://shop.test/p/1")).unwrap();
        assert_eq!(dataset.len(), 1);
    }
}
