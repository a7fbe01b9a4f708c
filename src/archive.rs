// src/archive.rs

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

/// Extensions accepted for upload and extraction
pub const SUPPORTED_EXTENSIONS: &[&str] = &[".zip", ".rar", ".7z", ".tar", ".gz"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveKind {
    Zip,
    Rar,
    SevenZip,
    Tar,
    TarGz,
}

impl ArchiveKind {
    /// Dispatch on the lowercase file extension only; content is never sniffed
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "zip" => Ok(ArchiveKind::Zip),
            "rar" => Ok(ArchiveKind::Rar),
            "7z" => Ok(ArchiveKind::SevenZip),
            "tar" => Ok(ArchiveKind::Tar),
            "gz" => Ok(ArchiveKind::TarGz),
            "" => Err(Error::validation(format!(
                "unsupported archive format: {} has no extension",
                path.display()
            ))),
            other => Err(Error::validation(format!("unsupported archive format: .{}", other))),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ArchiveKind::Zip => "zip",
            ArchiveKind::Rar => "rar",
            ArchiveKind::SevenZip => "7z",
            ArchiveKind::Tar | ArchiveKind::TarGz => "tar",
        }
    }
}

pub fn is_supported(file_name: &str) -> bool {
    ArchiveKind::from_path(Path::new(file_name)).is_ok()
}

/// A finished extraction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Extraction {
    pub extracted_path: PathBuf,
    #[serde(rename = "type")]
    pub kind: ArchiveKind,
}

/// Wire shape of an extraction attempt
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&Result<Extraction>> for ExtractionResult {
    fn from(result: &Result<Extraction>) -> Self {
        match result {
            Ok(extraction) => Self {
                success: true,
                extracted_path: Some(extraction.extracted_path.clone()),
                error: None,
            },
            Err(err) => Self {
                success: false,
                extracted_path: None,
                error: Some(err.to_string()),
            },
        }
    }
}

/// Extracts archives into per-request directories below a common root
#[derive(Debug, Clone)]
pub struct ArchiveExtractor {
    root: PathBuf,
    unrar_program: String,
    sevenzip_program: String,
}

impl ArchiveExtractor {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: root.into(),
            unrar_program: "unrar".to_string(),
            sevenzip_program: "7z".to_string(),
        }
    }

    pub fn with_programs<S: Into<String>>(mut self, unrar: S, sevenzip: S) -> Self {
        self.unrar_program = unrar.into();
        self.sevenzip_program = sevenzip.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Destination for a given request identifier
    pub fn destination(&self, destination_id: &str) -> PathBuf {
        self.root.join(format!("extracted_{}", destination_id))
    }

    pub fn extract(&self, archive_path: &Path, destination_id: &str) -> Result<Extraction> {
        let kind = ArchiveKind::from_path(archive_path)?;
        let dest = self.destination(destination_id);
        fs::create_dir_all(&dest)?;
        info!(
            "Extracting {} archive {} into {}",
            kind.label(),
            archive_path.display(),
            dest.display()
        );

        let unpacked = match kind {
            ArchiveKind::Zip => extract_zip(archive_path, &dest),
            ArchiveKind::Tar => File::open(archive_path)
                .map_err(Error::from)
                .and_then(|file| extract_tar(file, &dest)),
            ArchiveKind::TarGz => File::open(archive_path)
                .map_err(Error::from)
                .and_then(|file| extract_tar(GzDecoder::new(file), &dest)),
            ArchiveKind::Rar => {
                let mut target = dest.clone().into_os_string();
                // unrar treats the destination as a directory only with a trailing separator
                target.push(std::path::MAIN_SEPARATOR_STR);
                let mut cmd = Command::new(&self.unrar_program);
                cmd.arg("x").arg("-o+").arg("-y").arg(archive_path).arg(target);
                run_extractor(cmd, &self.unrar_program)
            }
            ArchiveKind::SevenZip => {
                let mut out_flag = std::ffi::OsString::from("-o");
                out_flag.push(&dest);
                let mut cmd = Command::new(&self.sevenzip_program);
                cmd.arg("x").arg("-y").arg(archive_path).arg(out_flag);
                run_extractor(cmd, &self.sevenzip_program)
            }
        };

        // No half-extracted trees are left behind
        if let Err(err) = unpacked {
            if let Err(cleanup) = fs::remove_dir_all(&dest) {
                warn!("Could not remove {}: {}", dest.display(), cleanup);
            }
            return Err(err);
        }

        Ok(Extraction {
            extracted_path: dest,
            kind,
        })
    }
}

fn extract_zip(archive_path: &Path, dest: &Path) -> Result<()> {
    let file = BufReader::new(File::open(archive_path)?);
    let mut archive = zip::ZipArchive::new(file)?;
    // Entries with paths escaping `dest` are rejected by the zip crate
    archive.extract(dest)?;
    Ok(())
}

fn extract_tar<R: Read>(reader: R, dest: &Path) -> Result<()> {
    let mut archive = tar::Archive::new(reader);
    for entry in archive
        .entries()
        .map_err(|e| Error::extraction(format!("unreadable tar stream: {}", e)))?
    {
        let mut entry = entry.map_err(|e| Error::extraction(format!("corrupt tar entry: {}", e)))?;
        // unpack_in refuses entries that would land outside `dest`
        let unpacked = entry
            .unpack_in(dest)
            .map_err(|e| Error::extraction(format!("cannot unpack tar entry: {}", e)))?;
        if !unpacked {
            debug!("Skipped tar entry outside destination");
        }
    }
    Ok(())
}

/// Runs an external unpack tool, surfacing exit status and stderr on failure
fn run_extractor(mut cmd: Command, program: &str) -> Result<()> {
    let output = cmd
        .output()
        .map_err(|e| Error::upstream(format!("failed to run {}: {}", program, e)))?;
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let detail = if stderr.is_empty() {
        format!("exit status {}", output.status)
    } else {
        stderr
    };
    Err(Error::upstream(format!("{} failed: {}", program, detail)))
}

/// Removes an extraction directory; `false` when there was nothing to remove
pub fn cleanup_extracted(path: &Path) -> Result<bool> {
    if !path.exists() {
        return Ok(false);
    }
    fs::remove_dir_all(path)?;
    Ok(true)
}

/// File facts reported before extraction
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveInfo {
    pub name: String,
    pub size: u64,
    pub size_formatted: String,
    #[serde(rename = "type")]
    pub extension: String,
    pub supported: bool,
    pub modified: Option<DateTime<Utc>>,
}

pub fn archive_info(path: &Path) -> Result<ArchiveInfo> {
    let metadata = fs::metadata(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::not_found(path.display().to_string()),
        _ => Error::Io(e),
    })?;
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
        .unwrap_or_default();
    Ok(ArchiveInfo {
        name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        size: metadata.len(),
        size_formatted: format_file_size(metadata.len()),
        supported: SUPPORTED_EXTENSIONS.contains(&extension.as_str()),
        extension,
        modified: metadata.modified().ok().map(DateTime::<Utc>::from),
    })
}

/// Human-readable size with at most two decimals, e.g. `1.5 KB`
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let exp = ((bytes as f64).ln() / 1024f64.ln()).floor() as usize;
    let exp = exp.min(UNITS.len() - 1);
    let value = bytes as f64 / 1024f64.powi(exp as i32);
    let rounded = (value * 100.0).round() / 100.0;
    format!("{} {}", rounded, UNITS[exp])
}
