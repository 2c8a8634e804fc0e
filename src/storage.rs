//! On-disk layout of uploaded documents: `{stem}__{form_id}.{ext}` under the
//! upload directory.

use std::path::{Path, PathBuf};

/// Last path component of a client-supplied filename. Both separators count,
/// since browsers on Windows may send `C:\scans\npi.pdf`.
pub fn base_name(filename: &str) -> &str {
    filename.rsplit(['/', '\\']).next().unwrap_or(filename)
}

/// True when `value` can be embedded in a stored file name without leaving
/// the upload directory.
pub fn is_safe_component(value: &str) -> bool {
    !value.is_empty() && !value.contains(['/', '\\', '\0']) && !value.contains("..")
}

/// Splits a client filename into stem and extension at the last dot.
pub fn split_filename(filename: &str) -> (&str, &str) {
    match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, ext),
        _ => (filename, ""),
    }
}

pub fn stored_name(stem: &str, form_id: &str, ext: &str) -> String {
    if ext.is_empty() {
        format!("{stem}__{form_id}")
    } else {
        format!("{stem}__{form_id}.{ext}")
    }
}

/// Where an uploaded document of `form_id` lives on disk.
pub fn upload_path(upload_dir: &Path, filename: &str, form_id: &str) -> PathBuf {
    let (stem, ext) = split_filename(base_name(filename));
    upload_dir.join(stored_name(stem, form_id, ext))
}

/// Reference template for a document type, e.g. `ref_uploads/dl.pdf`.
pub fn reference_path(reference_dir: &Path, file_type: &str, ext: &str) -> PathBuf {
    if ext.is_empty() {
        reference_dir.join(file_type)
    } else {
        reference_dir.join(format!("{file_type}.{ext}"))
    }
}

pub fn content_type_for(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "txt" => "text/plain",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        _ => "application/octet-stream",
    }
}
