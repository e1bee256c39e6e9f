//! Source bundle extraction. A bundle arrives as base64(gzip(tar)) and is
//! unpacked into a scratch directory with a strict safety envelope: no
//! entry may land outside the scratch root, regular files are capped at
//! 10 MiB, and anything that is not a directory or a regular file is
//! skipped.

use super::BuildError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use flate2::read::GzDecoder;
use std::fs;
use std::io;
use std::io::Read;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Component, Path, PathBuf};
use tar::{Archive, EntryType};
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Per-entry copy limit. Entries larger than this are silently truncated,
/// which bounds memory and disk for hostile archives; a truncated source
/// tree then fails at image-build time.
pub const MAX_ENTRY_BYTES: u64 = 10 * 1024 * 1024;

const DIR_MODE: u32 = 0o750;
const FILE_MODE: u32 = 0o600;

/// An extracted source bundle. Owns its scratch directory; dropping the
/// bundle removes it.
#[derive(Debug)]
pub struct Bundle {
    dir: TempDir,
}

impl Bundle {
    /// Decode, decompress and unpack `bundle_content`. The scratch
    /// directory is removed again if any entry fails.
    pub fn extract(bundle_content: &str) -> Result<Self, BuildError> {
        let contents = BASE64.decode(bundle_content.trim())?;
        debug!(decoded_bytes = contents.len(), "bundle decoded");

        let dir = TempDir::with_prefix("nina-bundle-")?;
        let root = dir.path().to_path_buf();

        let gz = GzDecoder::new(contents.as_slice());
        let mut archive = Archive::new(gz);

        let mut file_count = 0usize;
        let mut dir_count = 0usize;
        for entry in archive.entries()? {
            let mut entry = entry?;
            let entry_type = entry.header().entry_type();
            let rel = entry.path()?.into_owned();
            let target = confine(&root, &rel)?;
            match entry_type {
                EntryType::Directory => {
                    fs::create_dir_all(&target)?;
                    fs::set_permissions(&target, fs::Permissions::from_mode(DIR_MODE))?;
                    dir_count += 1;
                }
                EntryType::Regular => {
                    if let Some(parent) = target.parent() {
                        fs::create_dir_all(parent)?;
                    }
                    let mut file = fs::OpenOptions::new()
                        .write(true)
                        .create(true)
                        .truncate(true)
                        .mode(FILE_MODE)
                        .open(&target)?;
                    io::copy(&mut entry.by_ref().take(MAX_ENTRY_BYTES), &mut file)?;
                    file_count += 1;
                }
                other => {
                    warn!(entry = %rel.display(), entry_type = ?other, "skipping non-regular entry");
                }
            }
        }

        info!(files = file_count, dirs = dir_count, scratch = %root.display(), "bundle extracted");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Release the scratch directory. Dropping the bundle has the same
    /// effect; this variant surfaces the removal error.
    pub fn cleanup(self) -> io::Result<()> {
        self.dir.close()
    }
}

/// Join `rel` onto `root`, rejecting absolute paths, `..` components and
/// anything that would resolve outside the scratch root.
fn confine(root: &Path, rel: &Path) -> Result<PathBuf, BuildError> {
    if rel.is_absolute() {
        return Err(BuildError::PathTraversal(rel.display().to_string()));
    }
    for component in rel.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => return Err(BuildError::PathTraversal(rel.display().to_string())),
        }
    }
    let target = root.join(rel);
    if !target.starts_with(root) {
        return Err(BuildError::PathTraversal(rel.display().to_string()));
    }
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn encode(tar_bytes: Vec<u8>) -> String {
        let mut gz = GzEncoder::new(Vec::new(), Compression::default());
        gz.write_all(&tar_bytes).unwrap();
        BASE64.encode(gz.finish().unwrap())
    }

    // Writes the entry name directly into the header's raw bytes rather than
    // via `append_data`/`set_path`, which reject `..` components outright —
    // the traversal tests below need to construct exactly such archives so
    // the extractor's own defenses are what's under test.
    fn bundle_with_files(files: &[(&str, &[u8])]) -> String {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, data) in files {
            let mut header = tar::Header::new_gnu();
            let name_field = &mut header.as_gnu_mut().unwrap().name;
            let bytes = name.as_bytes();
            name_field[..bytes.len()].copy_from_slice(bytes);
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append(&header, *data).unwrap();
        }
        encode(builder.into_inner().unwrap())
    }

    #[test]
    fn extracts_files_and_directories() {
        let content = bundle_with_files(&[
            ("go.mod", b"module demo\n"),
            ("sub/main.go", b"package main\n"),
        ]);
        let bundle = Bundle::extract(&content).unwrap();
        assert!(bundle.path().join("go.mod").is_file());
        assert!(bundle.path().join("sub/main.go").is_file());
        let mode = fs::metadata(bundle.path().join("go.mod")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, FILE_MODE);
    }

    #[test]
    fn cleanup_removes_scratch_dir() {
        let content = bundle_with_files(&[("a.txt", b"hi")]);
        let bundle = Bundle::extract(&content).unwrap();
        let path = bundle.path().to_path_buf();
        assert!(path.exists());
        bundle.cleanup().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn rejects_parent_dir_traversal() {
        let content = bundle_with_files(&[("../evil.txt", b"boom")]);
        let err = Bundle::extract(&content).unwrap_err();
        assert!(matches!(err, BuildError::PathTraversal(_)), "got {err:?}");
    }

    #[test]
    fn rejects_nested_traversal() {
        let content = bundle_with_files(&[("ok/../../evil.txt", b"boom")]);
        assert!(matches!(Bundle::extract(&content).unwrap_err(), BuildError::PathTraversal(_)));
    }

    #[test]
    fn skips_symlink_entries() {
        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(EntryType::Symlink);
        header.set_size(0);
        header.set_cksum();
        builder.append_link(&mut header, "link", "/etc/passwd").unwrap();
        let content = encode(builder.into_inner().unwrap());
        let bundle = Bundle::extract(&content).unwrap();
        assert!(!bundle.path().join("link").exists());
    }

    #[test]
    fn truncates_oversized_entries() {
        let big = vec![b'x'; (MAX_ENTRY_BYTES + 4096) as usize];
        let content = bundle_with_files(&[("big.bin", big.as_slice())]);
        let bundle = Bundle::extract(&content).unwrap();
        let written = fs::metadata(bundle.path().join("big.bin")).unwrap().len();
        assert_eq!(written, MAX_ENTRY_BYTES);
    }

    #[test]
    fn rejects_garbage_base64() {
        assert!(Bundle::extract("definitely not base64 🚫").is_err());
    }

    #[test]
    fn rejects_non_gzip_payload() {
        let content = BASE64.encode(b"plain bytes, not gzip");
        assert!(Bundle::extract(&content).is_err());
    }
}
