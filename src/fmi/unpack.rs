//! Extraction of artifact archives into per-instance working directories.

use std::fs::{self, File};
use std::path::Path;

use crate::error::SlaveError;

/// Extracts the archive at `archive` into `dir`, creating `dir` if needed.
///
/// Entries whose names would escape `dir` are rejected.
///
/// # Errors
///
/// Returns [`SlaveError::Unpack`] if the archive cannot be opened, is not a
/// valid zip file, or an entry cannot be written.
pub fn unpack_archive(archive: &Path, dir: &Path) -> Result<(), SlaveError> {
    let fail = |reason: String| SlaveError::Unpack {
        archive: archive.to_path_buf(),
        dir: dir.to_path_buf(),
        reason,
    };

    fs::create_dir_all(dir).map_err(|e| fail(e.to_string()))?;
    let file = File::open(archive).map_err(|e| fail(e.to_string()))?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| fail(e.to_string()))?;

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).map_err(|e| fail(e.to_string()))?;
        let Some(relative) = entry.enclosed_name() else {
            return Err(fail(format!("entry \"{}\" escapes the target", entry.name())));
        };
        let target = dir.join(relative);
        if entry.is_dir() {
            fs::create_dir_all(&target).map_err(|e| fail(e.to_string()))?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| fail(e.to_string()))?;
        }
        let mut out = File::create(&target).map_err(|e| fail(e.to_string()))?;
        std::io::copy(&mut entry, &mut out).map_err(|e| fail(e.to_string()))?;
    }
    log::debug!(
        "unpacked \"{}\" ({} entries) into \"{}\"",
        archive.display(),
        zip.len(),
        dir.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_archive(path: &Path) {
        let file = File::create(path).expect("create archive");
        let mut zip = zip::ZipWriter::new(file);
        let opts = zip::write::SimpleFileOptions::default();
        zip.start_file("modelDescription.xml", opts).expect("start");
        zip.write_all(b"<fmiModelDescription/>").expect("write");
        zip.add_directory("binaries/linux64/", opts).expect("dir");
        zip.start_file("binaries/linux64/Room.so", opts).expect("start");
        zip.write_all(b"\x7fELF").expect("write");
        zip.finish().expect("finish");
    }

    #[test]
    fn extracts_nested_entries() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let archive = tmp.path().join("room.fmu");
        write_archive(&archive);
        let dir = tmp.path().join("tmp-fmus").join("room_a");
        unpack_archive(&archive, &dir).expect("unpack");
        assert!(dir.join("modelDescription.xml").is_file());
        assert!(dir.join("binaries/linux64/Room.so").is_file());
    }

    #[test]
    fn missing_archive_is_error() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let err = unpack_archive(&tmp.path().join("absent.fmu"), &tmp.path().join("out"));
        assert!(matches!(err, Err(SlaveError::Unpack { .. })));
    }

    #[test]
    fn non_zip_is_error() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let archive = tmp.path().join("bad.fmu");
        fs::write(&archive, b"not a zip").expect("write");
        assert!(unpack_archive(&archive, &tmp.path().join("out")).is_err());
    }
}
