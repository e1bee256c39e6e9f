//! Source bundle packing: the working copy, `.git` excluded, as
//! base64(gzip(tar)) with entry names relative to the root.

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

pub fn pack_working_copy(root: &Path) -> Result<String> {
    let gz = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(gz);

    let mut files = 0usize;
    for entry in WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| e.file_name() != ".git")
    {
        let entry = entry.context("walk working copy")?;
        let rel = entry.path().strip_prefix(root).context("relativize path")?;
        if entry.file_type().is_dir() {
            builder.append_dir(rel, entry.path()).context("archive directory")?;
        } else if entry.file_type().is_file() {
            builder
                .append_path_with_name(entry.path(), rel)
                .with_context(|| format!("archive {}", rel.display()))?;
            files += 1;
        }
        // Symlinks and other special files are left out of the bundle.
    }
    debug!(files, "working copy packed");

    let gz = builder.into_inner().context("finish tar archive")?;
    let bytes = gz.finish().context("finish gzip stream")?;
    Ok(BASE64.encode(bytes))
}
