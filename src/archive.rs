//! Extraction of the downloaded manifest archive into the row store file.

use std::{
    fs::{self, File},
    io::{BufReader, Read, Write},
    path::{Path, PathBuf},
};

use tracing::info;
use zip::ZipArchive;

use crate::{
    error::{ManifestError, Result},
    progress::DecileTracker,
};

const COPY_BUFFER_BYTES: usize = 64 * 1024;

/// A fully written copy of the manifest that has not replaced the live database yet.
#[derive(Debug)]
pub struct StagedManifest {
    pub path: PathBuf,
    pub bytes: u64,
}

/// Copies the single file inside `archive_path` next to `dest` as a staged file.
/// `on_progress` receives `(decile, bytes_so_far)` as the copy advances. The live
/// database at `dest` is left untouched; swapping it in is up to the row store.
pub fn extract_manifest(
    archive_path: &Path,
    dest: &Path,
    mut on_progress: impl FnMut(u8, u64),
) -> Result<StagedManifest> {
    let file = File::open(archive_path)?;
    let mut archive = ZipArchive::new(BufReader::new(file))?;

    let index = (0..archive.len())
        .find(|i| archive.by_index(*i).map(|e| !e.is_dir()).unwrap_or(false))
        .ok_or_else(|| {
            ManifestError::Archive(format!(
                "{} contains no manifest file",
                archive_path.display()
            ))
        })?;
    let mut entry = archive.by_index(index)?;
    let total = entry.size();
    let entry_name = entry.name().to_string();

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    let staged = staging_path(dest);
    let bytes = match copy_with_progress(&mut entry, &staged, total, &mut on_progress) {
        Ok(bytes) => bytes,
        Err(err) => {
            let _ = fs::remove_file(&staged);
            return Err(err);
        }
    };

    info!(
        archive = %archive_path.display(),
        entry = %entry_name,
        bytes,
        "Manifest archive extracted"
    );
    Ok(StagedManifest {
        path: staged,
        bytes,
    })
}

fn copy_with_progress(
    reader: &mut impl Read,
    path: &Path,
    total: u64,
    on_progress: &mut impl FnMut(u8, u64),
) -> Result<u64> {
    let mut out = File::create(path)?;
    let mut tracker = DecileTracker::new(total);
    let mut buf = vec![0_u8; COPY_BUFFER_BYTES];
    let mut copied = 0_u64;

    tracker.advance(0, |decile| on_progress(decile, 0));
    loop {
        let read = reader.read(&mut buf)?;
        if read == 0 {
            break;
        }
        out.write_all(&buf[..read])?;
        copied += read as u64;
        tracker.advance(copied, |decile| on_progress(decile, copied));
    }
    out.sync_all()?;
    Ok(copied)
}

pub fn staging_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|v| v.to_os_string())
        .unwrap_or_else(|| "manifest".into());
    name.push(".partial");
    dest.with_file_name(name)
}

/// Path of the marker recording which manifest version `db_path` holds.
pub fn version_marker_path(db_path: &Path) -> PathBuf {
    db_path.with_extension("version")
}

pub fn read_version(db_path: &Path) -> Option<String> {
    if !db_path.is_file() {
        return None;
    }
    fs::read_to_string(version_marker_path(db_path))
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn write_version(db_path: &Path, version: &str) -> Result<()> {
    fs::write(version_marker_path(db_path), version)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use zip::write::SimpleFileOptions;

    use super::*;

    fn write_zip(path: &Path, entries: &[(&str, Option<&[u8]>)]) {
        let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
        for (name, contents) in entries {
            match contents {
                Some(bytes) => {
                    zip.start_file(*name, SimpleFileOptions::default()).unwrap();
                    zip.write_all(bytes).unwrap();
                }
                None => zip.add_directory(*name, SimpleFileOptions::default()).unwrap(),
            }
        }
        zip.finish().unwrap();
    }

    #[test]
    fn extracts_first_file_entry_with_progress() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("manifest.zip");
        let payload = vec![7_u8; 200_000];
        write_zip(
            &archive,
            &[("nested/", None), ("world_sql_content.content", Some(&payload))],
        );

        let dest = dir.path().join("db").join("manifest.sqlite");
        let mut events = Vec::new();
        let staged = extract_manifest(&archive, &dest, |decile, bytes| events.push((decile, bytes)))
            .unwrap();

        assert_eq!(staged.bytes, payload.len() as u64);
        assert_eq!(staged.path, staging_path(&dest));
        assert_eq!(fs::read(&staged.path).unwrap(), payload);
        assert!(!dest.exists());
        let deciles: Vec<u8> = events.iter().map(|(d, _)| *d).collect();
        assert_eq!(deciles, (0..10).collect::<Vec<u8>>());
        assert!(events.windows(2).all(|w| w[0].1 <= w[1].1));
    }

    #[test]
    fn archive_without_files_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("empty.zip");
        write_zip(&archive, &[("only-a-dir/", None)]);

        let err = extract_manifest(&archive, &dir.path().join("out.sqlite"), |_, _| {})
            .unwrap_err();
        assert!(matches!(err, ManifestError::Archive(_)));
    }

    #[test]
    fn failed_extraction_leaves_live_database_alone() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("manifest.sqlite");
        fs::write(&dest, b"live").unwrap();
        let archive = dir.path().join("empty.zip");
        write_zip(&archive, &[("only-a-dir/", None)]);

        assert!(extract_manifest(&archive, &dest, |_, _| {}).is_err());
        assert_eq!(fs::read(&dest).unwrap(), b"live");
        assert!(!staging_path(&dest).exists());
    }

    #[test]
    fn missing_archive_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = extract_manifest(&dir.path().join("nope.zip"), &dir.path().join("out"), |_, _| {})
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn version_marker_requires_database() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("manifest.sqlite");
        write_version(&db, "v1").unwrap();
        assert_eq!(read_version(&db), None);

        fs::write(&db, b"db").unwrap();
        assert_eq!(read_version(&db).as_deref(), Some("v1"));
    }
}
