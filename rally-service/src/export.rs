// Copyright 2023 Rally Contributors
// SPDX-License-Identifier: Apache-2.0

//! Board exports.
//!
//! Exporters are resolved once at startup from the enabled features; a request for a format
//! without a resolved exporter answers 501. Only the CSV exporter ships by default; the
//! spreadsheet and PDF slots exist so deployments can compile them in.

use rally_model::{EventId, TaskStatus, UserId};
use rally_storage::Store;

use crate::{
    error::Error,
    policy::{Action, Viewer},
};

/// Requested export format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Comma-separated values.
    Csv,
    /// Excel workbook.
    Xlsx,
    /// PDF document.
    Pdf,
}

impl std::str::FromStr for ExportFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "csv" => Ok(Self::Csv),
            "xls" | "xlsx" => Ok(Self::Xlsx),
            "pdf" => Ok(Self::Pdf),
            _ => Err(()),
        }
    }
}

/// A rendered export.
#[derive(Debug, Clone)]
pub struct ExportFile {
    /// MIME type of the body.
    pub content_type: &'static str,
    /// Suggested file name.
    pub filename: String,
    /// The rendered bytes.
    pub bytes: Vec<u8>,
}

/// One row of the flattened board.
struct TaskRow {
    list: String,
    task: String,
    status: &'static str,
    assignee: String,
    due_at: String,
}

/// The export service.
#[derive(Clone)]
pub struct ExportService {
    store: Store,
    csv_enabled: bool,
}

fn status_label(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Todo => "todo",
        TaskStatus::Doing => "doing",
        TaskStatus::Done => "done",
    }
}

impl ExportService {
    /// Creates the service; exporters are resolved from the compiled features.
    pub fn new(store: Store) -> Self {
        Self {
            store,
            csv_enabled: cfg!(feature = "export-csv"),
        }
    }

    /// Whether an exporter for the format was resolved.
    pub fn available(&self, format: ExportFormat) -> bool {
        match format {
            ExportFormat::Csv => self.csv_enabled,
            ExportFormat::Xlsx | ExportFormat::Pdf => false,
        }
    }

    /// Renders the board of an event; participant-gated.
    pub async fn export_board(&self, event: EventId, user: UserId, format: ExportFormat) -> Result<ExportFile, Error> {
        if !self.available(format) {
            return Err(Error::ExporterUnavailable);
        }

        let rows = self
            .store
            .view(|tables| {
                Viewer::resolve(tables, event, user)?.require(Action::View)?;

                let mut rows = Vec::new();
                for list in tables.task_lists_of_event(event) {
                    for task in tables.tasks_of_list(list.id) {
                        let assignee = task
                            .assignee
                            .and_then(|id| tables.participants.get(id))
                            .and_then(|p| tables.users.get(p.user))
                            .map(|u| u.display_name().to_string())
                            .unwrap_or_default();
                        rows.push(TaskRow {
                            list: list.title.clone(),
                            task: task.title.clone(),
                            status: status_label(task.status),
                            assignee,
                            due_at: task
                                .due_at
                                .map(|t| rally_common::time::format_rfc3339(&t))
                                .unwrap_or_default(),
                        });
                    }
                }
                Ok(rows)
            })
            .await?;

        match format {
            ExportFormat::Csv => self.render_csv(event, &rows),
            // Unreachable while `available` gates above; kept explicit for future exporters.
            ExportFormat::Xlsx | ExportFormat::Pdf => Err(Error::ExporterUnavailable),
        }
    }

    #[cfg(feature = "export-csv")]
    fn render_csv(&self, event: EventId, rows: &[TaskRow]) -> Result<ExportFile, Error> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record(["list", "task", "status", "assignee", "due_at"])
            .map_err(|e| Error::invalid(format!("rendering csv failed: {}", e)))?;
        for row in rows {
            writer
                .write_record([
                    row.list.as_str(),
                    row.task.as_str(),
                    row.status,
                    row.assignee.as_str(),
                    row.due_at.as_str(),
                ])
                .map_err(|e| Error::invalid(format!("rendering csv failed: {}", e)))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| Error::invalid(format!("rendering csv failed: {}", e)))?;

        Ok(ExportFile {
            content_type: "text/csv",
            filename: format!("event-{}-board.csv", event),
            bytes,
        })
    }

    #[cfg(not(feature = "export-csv"))]
    fn render_csv(&self, _event: EventId, _rows: &[TaskRow]) -> Result<ExportFile, Error> {
        Err(Error::ExporterUnavailable)
    }
}
