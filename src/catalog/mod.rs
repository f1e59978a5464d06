//! Slide catalog: where slides live and what has been annotated on them.
//!
//! The catalog is a table with one row per slide:
//!
//! | column                 | content                                     |
//! |------------------------|---------------------------------------------|
//! | `id`                   | slide identifier                            |
//! | `file_path`            | path of the slide file                      |
//! | `human_coordinates`    | JSON `{"coordinates": [...]}`, nullable     |
//! | `model_coordinates`    | JSON, nullable                              |
//! | `specimen_mask_path`   | path of a produced specimen mask, nullable  |
//! | `annotation_mask_path` | path of a produced annotation mask, nullable|
//!
//! [`SqliteCatalog`] reads such a table from a SQLite database.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rusqlite::{Connection, OpenFlags};
use tracing::{debug, warn};

use crate::batch::TaskFailure;
use crate::error::CatalogError;
use crate::mask::{AnnotationGeometry, MaskTask, SpecimenOptions};

/// Default catalog table name.
pub const DEFAULT_TABLE: &str = "slides";

// =============================================================================
// SlideRecord
// =============================================================================

/// One catalog row.
///
/// Coordinates are decoded per row: a malformed `human_coordinates` value
/// is kept as the decode error so that only this slide fails.
#[derive(Debug, Clone, PartialEq)]
pub struct SlideRecord {
    pub id: String,
    pub file_path: PathBuf,
    pub human_coordinates: Option<Result<AnnotationGeometry, String>>,
    pub model_coordinates: Option<serde_json::Value>,
    pub specimen_mask_path: Option<PathBuf>,
    pub annotation_mask_path: Option<PathBuf>,
}

impl SlideRecord {
    /// Mask task for this slide, or `None` when it has no human annotation.
    ///
    /// Malformed coordinates yield the failure to report for this slide.
    pub fn mask_task(
        &self,
        downsample: f64,
        options: &SpecimenOptions,
    ) -> Option<Result<MaskTask, TaskFailure>> {
        let geometry = match self.human_coordinates.as_ref()? {
            Ok(geometry) => geometry,
            Err(message) => {
                return Some(Err(TaskFailure {
                    slide_id: self.id.clone(),
                    message: message.clone(),
                }))
            }
        };
        Some(Ok(MaskTask {
            slide_id: self.id.clone(),
            slide_path: self.file_path.clone(),
            downsample,
            options: options.clone(),
            coordinates: geometry.coordinates.clone(),
        }))
    }
}

/// Tasks planned from catalog records.
#[derive(Debug, Clone, Default)]
pub struct TaskPlan {
    /// Slides ready for mask production
    pub tasks: Vec<MaskTask>,

    /// Slides whose catalog row cannot be turned into a task
    pub rejected: Vec<TaskFailure>,

    /// Slides without human annotation
    pub skipped: usize,
}

/// Split `records` into mask tasks, rejected rows and unannotated slides.
pub fn plan_tasks(
    records: &[SlideRecord],
    downsample: f64,
    options: &SpecimenOptions,
) -> TaskPlan {
    let mut plan = TaskPlan::default();
    for record in records {
        match record.mask_task(downsample, options) {
            Some(Ok(task)) => plan.tasks.push(task),
            Some(Err(failure)) => plan.rejected.push(failure),
            None => plan.skipped += 1,
        }
    }
    plan
}

// =============================================================================
// SlideCatalog Trait
// =============================================================================

/// Source of slide records.
#[async_trait]
pub trait SlideCatalog: Send + Sync {
    /// Every slide in the catalog, ordered by id.
    async fn slides(&self) -> Result<Vec<SlideRecord>, CatalogError>;
}

// =============================================================================
// SqliteCatalog
// =============================================================================

/// Catalog backed by a table in a SQLite database file.
///
/// Each query opens its own read-only connection on the blocking pool.
#[derive(Debug, Clone)]
pub struct SqliteCatalog {
    path: PathBuf,
    table: String,
}

impl SqliteCatalog {
    /// Create a catalog over `table` in the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::InvalidTable`] unless `table` is a plain
    /// identifier; the name is interpolated into SQL.
    pub fn new(path: impl Into<PathBuf>, table: impl Into<String>) -> Result<Self, CatalogError> {
        let table = table.into();
        if !is_identifier(&table) {
            return Err(CatalogError::InvalidTable(table));
        }
        Ok(Self {
            path: path.into(),
            table,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Create the catalog table if it is missing.
    pub fn create_table(connection: &Connection, table: &str) -> Result<(), CatalogError> {
        if !is_identifier(table) {
            return Err(CatalogError::InvalidTable(table.to_string()));
        }
        connection.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id INTEGER PRIMARY KEY,
                file_path TEXT NOT NULL,
                human_coordinates TEXT,
                model_coordinates TEXT,
                specimen_mask_path TEXT,
                annotation_mask_path TEXT
            );",
            table
        ))?;
        Ok(())
    }

    fn query(path: &Path, table: &str) -> Result<Vec<SlideRecord>, CatalogError> {
        let connection = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        let mut statement = connection.prepare(&format!(
            "SELECT CAST(id AS TEXT), file_path, human_coordinates, model_coordinates, \
             specimen_mask_path, annotation_mask_path FROM {} ORDER BY id",
            table
        ))?;

        let rows = statement.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, Option<String>>(5)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, file_path, human, model, specimen, annotation) = row?;

            let human_coordinates = non_empty(human).map(|json| {
                serde_json::from_str::<AnnotationGeometry>(&json).map_err(|e| {
                    let error = CatalogError::MalformedCoordinates {
                        slide_id: id.clone(),
                        message: e.to_string(),
                    };
                    warn!(slide_id = %id, error = %e, "Malformed human coordinates");
                    error.to_string()
                })
            });
            let model_coordinates = non_empty(model).and_then(|json| {
                serde_json::from_str::<serde_json::Value>(&json)
                    .map_err(|e| {
                        warn!(slide_id = %id, error = %e, "Ignoring malformed model coordinates")
                    })
                    .ok()
            });

            records.push(SlideRecord {
                id,
                file_path: PathBuf::from(file_path),
                human_coordinates,
                model_coordinates,
                specimen_mask_path: non_empty(specimen).map(PathBuf::from),
                annotation_mask_path: non_empty(annotation).map(PathBuf::from),
            });
        }

        Ok(records)
    }
}

#[async_trait]
impl SlideCatalog for SqliteCatalog {
    async fn slides(&self) -> Result<Vec<SlideRecord>, CatalogError> {
        let path = self.path.clone();
        let table = self.table.clone();

        let records = tokio::task::spawn_blocking(move || Self::query(&path, &table))
            .await
            .map_err(|e| CatalogError::Task(e.to_string()))??;

        debug!(table = %self.table, slides = records.len(), "Loaded slide catalog");
        Ok(records)
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
