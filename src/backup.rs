use crate::db;
use crate::model::{AppState, Exam, Student};
use anyhow::{anyhow, Context};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const MANIFEST_ENTRY: &str = "manifest.json";
const DATA_ENTRY: &str = "data.json";
pub const BUNDLE_FORMAT_V1: &str = "gradesheet-data-v1";
pub const INVALID_BACKUP_MESSAGE: &str = "无效的备份文件格式。";

/// Everything a workspace holds, as one JSON document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupData {
    pub students: Vec<Student>,
    pub exams: Vec<Exam>,
    #[serde(default)]
    pub semesters: Vec<String>,
    #[serde(default)]
    pub app_state: Option<AppState>,
    #[serde(default)]
    pub export_date: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub entry_count: usize,
    pub students: usize,
    pub exams: usize,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub bundle_format_detected: String,
    pub students: usize,
    pub exams: usize,
}

pub fn collect_backup(conn: &Connection) -> anyhow::Result<BackupData> {
    let app_state = match db::settings_get_json(conn, db::APP_STATE_KEY)? {
        Some(v) => Some(serde_json::from_value(v).context("invalid stored app state")?),
        None => None,
    };
    Ok(BackupData {
        students: db::load_students(conn)?,
        exams: db::load_exams(conn)?,
        semesters: db::load_semesters(conn)?,
        app_state,
        export_date: Some(chrono::Utc::now().to_rfc3339()),
    })
}

pub fn export_backup(conn: &Connection, out_path: &Path) -> anyhow::Result<ExportSummary> {
    let data = collect_backup(conn)?;
    let payload = serde_json::to_vec_pretty(&data).context("failed to serialize backup data")?;

    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    let out_file = File::create(out_path).with_context(|| {
        format!(
            "failed to create output file {}",
            out_path.to_string_lossy()
        )
    })?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let exported_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let manifest = json!({
        "format": BUNDLE_FORMAT_V1,
        "version": 1,
        "appVersion": env!("CARGO_PKG_VERSION"),
        "exportedAt": exported_at,
        "dataSha256": format!("{:x}", Sha256::digest(&payload)),
    });
    zip.start_file(MANIFEST_ENTRY, opts)
        .context("failed to start manifest entry")?;
    zip.write_all(
        serde_json::to_string_pretty(&manifest)
            .context("failed to serialize manifest")?
            .as_bytes(),
    )
    .context("failed to write manifest entry")?;

    zip.start_file(DATA_ENTRY, opts)
        .context("failed to start data entry")?;
    zip.write_all(&payload).context("failed to write data entry")?;

    zip.finish().context("failed to finalize zip bundle")?;

    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT_V1.to_string(),
        entry_count: 2,
        students: data.students.len(),
        exams: data.exams.len(),
    })
}

/// Reads a zip bundle, or a bare JSON document of the same shape.
pub fn read_backup(in_path: &Path) -> anyhow::Result<(BackupData, String)> {
    if !is_zip_file(in_path)? {
        let bytes = std::fs::read(in_path)
            .with_context(|| format!("failed to read {}", in_path.to_string_lossy()))?;
        return Ok((parse_backup_data(&bytes)?, "json".to_string()));
    }

    let in_file = File::open(in_path)
        .with_context(|| format!("failed to open bundle {}", in_path.to_string_lossy()))?;
    let mut archive = ZipArchive::new(in_file).context("invalid zip archive")?;

    let mut manifest_text = String::new();
    archive
        .by_name(MANIFEST_ENTRY)
        .context("bundle missing manifest.json")?
        .read_to_string(&mut manifest_text)
        .context("failed to read manifest.json")?;
    let manifest: serde_json::Value =
        serde_json::from_str(&manifest_text).context("manifest.json is invalid JSON")?;
    let format = manifest
        .get("format")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    if format != BUNDLE_FORMAT_V1 {
        return Err(anyhow!("unsupported bundle format: {}", format));
    }

    let mut payload = Vec::new();
    archive
        .by_name(DATA_ENTRY)
        .context("bundle missing data.json")?
        .read_to_end(&mut payload)
        .context("failed to read data.json")?;

    if let Some(expected) = manifest.get("dataSha256").and_then(|v| v.as_str()) {
        let actual = format!("{:x}", Sha256::digest(&payload));
        if actual != expected {
            return Err(anyhow!("data.json checksum mismatch"));
        }
    }

    Ok((parse_backup_data(&payload)?, BUNDLE_FORMAT_V1.to_string()))
}

fn parse_backup_data(bytes: &[u8]) -> anyhow::Result<BackupData> {
    let value: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|_| anyhow!(INVALID_BACKUP_MESSAGE))?;
    let has_arrays = value.get("students").map(|v| v.is_array()).unwrap_or(false)
        && value.get("exams").map(|v| v.is_array()).unwrap_or(false);
    if !has_arrays {
        return Err(anyhow!(INVALID_BACKUP_MESSAGE));
    }
    serde_json::from_value(value).context(INVALID_BACKUP_MESSAGE)
}

/// Replaces every record in the workspace with `data`, in one transaction.
pub fn restore_backup(conn: &Connection, data: &BackupData) -> anyhow::Result<()> {
    let tx = conn.unchecked_transaction()?;
    db::clear_records(&tx)?;
    for s in &data.students {
        db::write_student(&tx, s).with_context(|| format!("failed to restore student {}", s.id))?;
    }
    for e in &data.exams {
        db::write_exam(&tx, e).with_context(|| format!("failed to restore exam {}", e.id))?;
    }
    for sem in &data.semesters {
        db::write_semester(&tx, sem)?;
    }
    if let Some(state) = &data.app_state {
        db::settings_set_json(&tx, db::APP_STATE_KEY, &serde_json::to_value(state)?)?;
    }
    tx.commit()?;
    Ok(())
}

pub fn import_backup(conn: &Connection, in_path: &Path) -> anyhow::Result<ImportSummary> {
    let (data, format) = read_backup(in_path)?;
    restore_backup(conn, &data)?;
    Ok(ImportSummary {
        bundle_format_detected: format,
        students: data.students.len(),
        exams: data.exams.len(),
    })
}

fn is_zip_file(path: &Path) -> anyhow::Result<bool> {
    let mut f = File::open(path)
        .with_context(|| format!("failed to open input file {}", path.to_string_lossy()))?;
    let mut sig = [0u8; 4];
    let read = f.read(&mut sig).context("failed to read file signature")?;
    if read < 4 {
        return Ok(false);
    }
    Ok(sig == [0x50, 0x4B, 0x03, 0x04])
}
