use crate::error::{Result, WatermarkError};
use crate::media::ProcessedFile;
use std::fs::File;
use std::io::{Cursor, Seek, Write};
use std::path::{Path, PathBuf};
use tracing::warn;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Deflate's strongest setting.
pub const COMPRESSION_LEVEL: i32 = 9;

/// Where the finished archive should go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveTarget {
    Memory,
    Path(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveOutput {
    Memory(Vec<u8>),
    Path(PathBuf),
}

/// 压缩包打包器：扁平目录，最高压缩级别
pub struct ArchivePackager;

impl ArchivePackager {
    fn entry_options() -> FileOptions {
        FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(COMPRESSION_LEVEL))
    }

    /// Archive entry name: the file name alone, without any directories.
    pub fn entry_name(name: &str) -> String {
        name.rsplit(|c| c == '/' || c == '\\')
            .find(|part| !part.is_empty())
            .unwrap_or(name)
            .to_string()
    }

    /// Stream every file into a ZIP written to `writer`. An empty list still
    /// yields a valid (empty) archive.
    pub fn write<W: Write + Seek>(writer: W, files: &[ProcessedFile]) -> Result<W> {
        let mut zip = ZipWriter::new(writer);
        for file in files {
            zip.start_file(Self::entry_name(&file.name), Self::entry_options())?;
            zip.write_all(&file.content)
                .map_err(|e| WatermarkError::ArchiveWriteFailed(e.into()))?;
        }
        Ok(zip.finish()?)
    }

    pub fn build_in_memory(files: &[ProcessedFile]) -> Result<Vec<u8>> {
        Ok(Self::write(Cursor::new(Vec::new()), files)?.into_inner())
    }

    /// Write the archive next to `path` first and rename it into place, so a
    /// reader never sees a half-written file.
    pub fn write_to_path(path: &Path, files: &[ProcessedFile]) -> Result<()> {
        let io_failure = |e: std::io::Error| WatermarkError::ArchiveWriteFailed(e.into());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_failure)?;
        }
        let partial = path.with_extension("zip.part");
        let written = File::create(&partial)
            .map_err(io_failure)
            .and_then(|file| {
                let mut file = Self::write(file, files)?;
                file.flush().map_err(io_failure)
            })
            .and_then(|()| std::fs::rename(&partial, path).map_err(io_failure));

        if written.is_err() {
            if let Err(e) = std::fs::remove_file(&partial) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %partial.display(), error = %e, "failed to remove partial archive");
                }
            }
        }
        written
    }

    pub fn package(files: &[ProcessedFile], target: ArchiveTarget) -> Result<ArchiveOutput> {
        match target {
            ArchiveTarget::Memory => Self::build_in_memory(files).map(ArchiveOutput::Memory),
            ArchiveTarget::Path(path) => {
                Self::write_to_path(&path, files)?;
                Ok(ArchiveOutput::Path(path))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use zip::ZipArchive;

    fn file(name: &str, content: &[u8]) -> ProcessedFile {
        ProcessedFile {
            name: name.to_string(),
            content: content.to_vec(),
        }
    }

    fn read_all(bytes: Vec<u8>) -> Vec<(String, Vec<u8>, CompressionMethod)> {
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        (0..archive.len())
            .map(|i| {
                let mut entry = archive.by_index(i).unwrap();
                let mut content = Vec::new();
                entry.read_to_end(&mut content).unwrap();
                (entry.name().to_string(), content, entry.compression())
            })
            .collect()
    }

    #[test]
    fn empty_archive_is_valid() {
        let bytes = ArchivePackager::build_in_memory(&[]).unwrap();
        assert!(!bytes.is_empty());
        let archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 0);
    }

    #[test]
    fn extracted_entries_match_inputs() {
        let noisy: Vec<u8> = (0..50_000u32).map(|i| (i.wrapping_mul(2654435761) >> 13) as u8).collect();
        let files = vec![
            file("photo.jpg", b"\xff\xd8\xff\xe0 jpeg-ish"),
            file("clip.mp4", &noisy),
            file("blank.png", &[0u8; 10_000]),
            file("empty.gif", b""),
        ];

        let entries = read_all(ArchivePackager::build_in_memory(&files).unwrap());

        assert_eq!(entries.len(), files.len());
        for ((name, content, method), original) in entries.iter().zip(&files) {
            assert_eq!(name, &original.name);
            assert_eq!(content, &original.content);
            assert_eq!(*method, CompressionMethod::Deflated);
        }
    }

    #[test]
    fn entries_are_flat() {
        assert_eq!(ArchivePackager::entry_name("a/b/c.png"), "c.png");
        assert_eq!(ArchivePackager::entry_name("..\\evil.mp4"), "evil.mp4");
        assert_eq!(ArchivePackager::entry_name("plain.gif"), "plain.gif");

        let entries = read_all(ArchivePackager::build_in_memory(&[file("nested/dir/x.png", b"x")]).unwrap());
        assert_eq!(entries[0].0, "x.png");
    }

    #[test]
    fn writes_to_disk_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("archives").join("batch.zip");

        let output =
            ArchivePackager::package(&[file("a.png", b"aaa")], ArchiveTarget::Path(path.clone())).unwrap();

        assert_eq!(output, ArchiveOutput::Path(path.clone()));
        assert!(!path.with_extension("zip.part").exists());
        let entries = read_all(std::fs::read(&path).unwrap());
        assert_eq!(entries[0].1, b"aaa");
    }

    #[test]
    fn unwritable_target_is_archive_failure() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();

        let err = ArchivePackager::write_to_path(&blocker.join("out.zip"), &[]).unwrap_err();
        assert!(matches!(err, WatermarkError::ArchiveWriteFailed(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn failed_rename_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        // a non-empty directory occupies the final name
        let path = dir.path().join("batch.zip");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("keep"), b"x").unwrap();

        let err = ArchivePackager::write_to_path(&path, &[file("a.png", b"a")]).unwrap_err();

        assert!(matches!(err, WatermarkError::ArchiveWriteFailed(_)));
        assert!(!path.with_extension("zip.part").exists());
        assert!(path.join("keep").exists());
    }
}
