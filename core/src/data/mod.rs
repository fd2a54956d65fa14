//! Training Data Loading
//!
//! Reads the training table either from a CSV file or from a SQL query and
//! hands back a polars [`DataFrame`] for the validation pass.

use polars::prelude::*;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::{Column, Row, TypeInfo, ValueRef};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::Settings;
use crate::error::LoadError;

/// Where the training rows come from
#[derive(Debug, Clone, PartialEq)]
pub enum DataSource {
    /// CSV file with a header row
    Csv { path: PathBuf },
    /// sqlx connection string plus query
    Sql { connection: String, query: String },
}

impl DataSource {
    /// Pick the source for a training run
    ///
    /// An explicit CSV path wins; otherwise the configured SQL connection and
    /// query are used.
    pub fn from_settings(data_path: Option<PathBuf>, settings: &Settings) -> Result<Self, LoadError> {
        if let Some(path) = data_path {
            return Ok(DataSource::Csv { path });
        }

        match (&settings.sql_connection, &settings.sql_query) {
            (Some(connection), Some(query))
                if !connection.trim().is_empty() && !query.trim().is_empty() =>
            {
                Ok(DataSource::Sql {
                    connection: connection.clone(),
                    query: query.clone(),
                })
            }
            _ => Err(LoadError::NoSource),
        }
    }
}

/// Loads tabular rows from a [`DataSource`]
pub struct DataLoader {
    source: DataSource,
}

impl DataLoader {
    pub fn new(source: DataSource) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &DataSource {
        &self.source
    }

    /// Return the dataset as a frame
    ///
    /// Fails when the source is unreachable or yields no rows. No retries.
    pub async fn load(&self) -> Result<DataFrame, LoadError> {
        let frame = match &self.source {
            DataSource::Csv { path } => load_csv(path)?,
            DataSource::Sql { connection, query } => load_sql(connection, query).await?,
        };

        if frame.height() == 0 {
            return Err(LoadError::Empty);
        }

        info!(
            rows = frame.height(),
            columns = frame.width(),
            "Loaded training data"
        );
        Ok(frame)
    }
}

fn load_csv(path: &Path) -> Result<DataFrame, LoadError> {
    if !path.exists() {
        return Err(LoadError::FileNotFound(path.to_path_buf()));
    }

    debug!("Reading CSV from {}", path.display());
    CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .and_then(|reader| reader.finish())
        .map_err(|e| LoadError::Parse(e.to_string()))
}

async fn load_sql(connection: &str, query: &str) -> Result<DataFrame, LoadError> {
    let pool = SqlitePool::connect(connection)
        .await
        .map_err(|e| LoadError::Connection(e.to_string()))?;

    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .map_err(|e| LoadError::Connection(e.to_string()))?;

    debug!("Running training query: {}", query);
    let rows = sqlx::query(query)
        .fetch_all(&pool)
        .await
        .map_err(|e| LoadError::Query(e.to_string()))?;
    pool.close().await;

    rows_to_frame(&rows)
}

/// Column layout decided from the values a column actually holds
enum ColumnKind {
    Numeric,
    Text,
}

fn column_kind(rows: &[SqliteRow], index: usize) -> Result<ColumnKind, LoadError> {
    for row in rows {
        let raw = row
            .try_get_raw(index)
            .map_err(|e| LoadError::Query(e.to_string()))?;
        if raw.is_null() {
            continue;
        }
        match raw.type_info().name() {
            "INTEGER" | "REAL" | "NUMERIC" | "BOOLEAN" => {}
            _ => return Ok(ColumnKind::Text),
        }
    }
    Ok(ColumnKind::Numeric)
}

fn rows_to_frame(rows: &[SqliteRow]) -> Result<DataFrame, LoadError> {
    let Some(first) = rows.first() else {
        return Err(LoadError::Empty);
    };

    let mut columns = Vec::with_capacity(first.columns().len());
    for (index, column) in first.columns().iter().enumerate() {
        let name = column.name();
        let series = match column_kind(rows, index)? {
            ColumnKind::Numeric => {
                let values = rows
                    .iter()
                    .map(|row| row.try_get_unchecked::<Option<f64>, _>(index))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| LoadError::Query(e.to_string()))?;
                Series::new(name, values)
            }
            ColumnKind::Text => {
                let values = rows
                    .iter()
                    .map(|row| row.try_get_unchecked::<Option<String>, _>(index))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| LoadError::Query(e.to_string()))?;
                Series::new(name, values)
            }
        };
        columns.push(series);
    }

    DataFrame::new(columns).map_err(|e| LoadError::Parse(e.to_string()))
}
