//! Gzipped tar archives of absolute file trees.
//!
//! Entries are named by their absolute path with the leading `/` removed,
//! so unpacking an archive at `/` puts every file back where it was.
//! Both functions block; call them from `spawn_blocking`.

use crate::error::{CacheError, CacheResult};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Component, Path, PathBuf};

/// Archive entry name for an absolute path.
pub fn entry_name(path: &Path) -> CacheResult<PathBuf> {
    let mut name = PathBuf::new();
    for component in path.components() {
        match component {
            Component::RootDir => {}
            Component::Normal(part) => name.push(part),
            _ => {
                return Err(CacheError::Archive(format!(
                    "cache paths must be absolute and normalized: {}",
                    path.display()
                )));
            }
        }
    }
    if name.as_os_str().is_empty() || !path.is_absolute() {
        return Err(CacheError::Archive(format!(
            "cache paths must be absolute and normalized: {}",
            path.display()
        )));
    }
    Ok(name)
}

/// Write a gzipped tar of `paths` to `dest`. Returns the archive size.
pub fn create(paths: &[PathBuf], dest: &Path) -> CacheResult<u64> {
    let file = File::create(dest)?;
    let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);

    for path in paths {
        let name = entry_name(path)?;
        let meta = std::fs::symlink_metadata(path)?;
        if meta.is_dir() {
            builder.append_dir_all(&name, path)?;
        } else {
            builder.append_path_with_name(path, &name)?;
        }
    }

    let mut writer = builder.into_inner()?.finish()?;
    writer.flush()?;
    drop(writer);
    Ok(std::fs::metadata(dest)?.len())
}

/// Unpack a gzipped tar produced by [`create`] under `root`.
pub fn extract(archive: &Path, root: &Path) -> CacheResult<()> {
    let file = File::open(archive)?;
    let mut archive = tar::Archive::new(GzDecoder::new(BufReader::new(file)));
    archive.set_overwrite(true);
    archive.set_preserve_permissions(true);
    archive.unpack(root)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_entry_name_strips_root() {
        assert_eq!(
            entry_name(Path::new("/tmp/abc/narinfo")).unwrap(),
            PathBuf::from("tmp/abc/narinfo")
        );
        assert!(entry_name(Path::new("relative/x")).is_err());
        assert!(entry_name(Path::new("/tmp/../etc")).is_err());
        assert!(entry_name(Path::new("/")).is_err());
    }

    #[test]
    fn test_create_then_extract_under_other_root() {
        let source = tempdir().unwrap();
        let entry = source.path().join("entry");
        std::fs::create_dir_all(entry.join("nar")).unwrap();
        std::fs::write(entry.join("narinfo"), b"URL: nar/a.nar\n").unwrap();
        std::fs::write(entry.join("nar/a.nar"), vec![7u8; 100_000]).unwrap();

        let out = tempdir().unwrap();
        let archive = out.path().join("cache.tgz");
        let size = create(&[entry.clone()], &archive).unwrap();
        assert!(size > 0);

        let root = tempdir().unwrap();
        extract(&archive, root.path()).unwrap();

        let restored = root.path().join(entry_name(&entry).unwrap());
        assert_eq!(
            std::fs::read(restored.join("narinfo")).unwrap(),
            b"URL: nar/a.nar\n"
        );
        assert_eq!(
            std::fs::read(restored.join("nar/a.nar")).unwrap(),
            vec![7u8; 100_000]
        );
    }
}
