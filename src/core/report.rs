use crate::domain::model::RunSummary;
use crate::domain::ports::Workspace;
use crate::utils::error::Result;
use std::io::Write;
use zip::write::{FileOptions, ZipWriter};

pub const JSON_REPORT: &str = "report.json";
pub const CSV_REPORT: &str = "report.csv";

/// Write the run report in the configured formats. Reports are written
/// even when jobs failed; only configuration failures skip reporting.
pub async fn write_reports<W: Workspace>(
    workspace: &W,
    summary: &RunSummary,
    formats: &[String],
) -> Result<Vec<String>> {
    let mut written = Vec::new();

    for format in formats {
        match format.as_str() {
            "json" => {
                let json_data = serde_json::to_string_pretty(summary)?;
                workspace.write_file(JSON_REPORT, json_data.as_bytes()).await?;
                written.push(JSON_REPORT.to_string());
            }
            "csv" => {
                let csv_data = render_csv(summary)?;
                workspace.write_file(CSV_REPORT, &csv_data).await?;
                written.push(CSV_REPORT.to_string());
            }
            other => {
                // Config validation already rejects these; double-written
                // configs just get a warning here
                tracing::warn!("Ignoring unknown report format: {}", other);
            }
        }
    }

    Ok(written)
}

fn render_csv(summary: &RunSummary) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    writer.write_record([
        "index",
        "job",
        "mode",
        "interpreter",
        "status",
        "exit_code",
        "duration_ms",
        "allow_failure",
        "log",
    ])?;

    for outcome in &summary.outcomes {
        writer.write_record([
            outcome.job.index.to_string(),
            outcome.job.display_name(),
            outcome.job.mode.clone(),
            outcome.job.interpreter.clone(),
            outcome.status.as_str().to_string(),
            outcome
                .exit_code
                .map(|c| c.to_string())
                .unwrap_or_default(),
            outcome.duration.as_millis().to_string(),
            outcome.job.allow_failure.to_string(),
            outcome.log_path.clone().unwrap_or_default(),
        ])?;
    }

    writer
        .into_inner()
        .map_err(|e| crate::utils::error::CiError::ExecutionError {
            message: format!("CSV buffer error: {}", e),
        })
}

/// Bundle report files and job logs into one zip archive in the
/// workspace.
pub async fn archive_artifacts<W: Workspace>(
    workspace: &W,
    summary: &RunSummary,
    report_files: &[String],
    archive_name: &str,
) -> Result<String> {
    let zip_data = {
        let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));

        for report_file in report_files {
            let data = workspace.read_file(report_file).await?;
            zip.start_file::<_, ()>(report_file.as_str(), FileOptions::default())?;
            zip.write_all(&data)?;
        }

        for outcome in &summary.outcomes {
            if let Some(log_path) = &outcome.log_path {
                let data = workspace.read_file(log_path).await?;
                zip.start_file::<_, ()>(log_path.as_str(), FileOptions::default())?;
                zip.write_all(&data)?;
            }
        }

        let cursor = zip.finish()?;
        cursor.into_inner()
    };

    tracing::debug!("Writing artifact archive ({} bytes)", zip_data.len());
    workspace.write_file(archive_name, &zip_data).await?;
    Ok(archive_name.to_string())
}
