//! Copy-on-write container workspaces.
//!
//! A workspace is an overlay of the container's writable layer on top of the
//! extracted image, plus an optional volume bound into it.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use husk_common::{HuskError, HuskPaths, HuskResult, validate_image_name};

use super::overlay::OverlayFs;
use super::volume::VolumeSpec;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Builds and tears down container workspaces under a [`HuskPaths`] root.
#[derive(Debug, Clone)]
pub struct LayerStore {
    paths: HuskPaths,
}

impl LayerStore {
    /// Create a new layer store.
    #[must_use]
    pub const fn new(paths: HuskPaths) -> Self {
        Self { paths }
    }

    /// Extract `image` unless its layer directory already exists.
    ///
    /// Returns whether an extraction took place. The archive is unpacked into
    /// a staging directory first, so a failed extraction leaves nothing
    /// behind.
    pub fn create_read_only_layer(&self, image: &str) -> HuskResult<bool> {
        validate_image_name(image)?;
        let layer = self.paths.image_layer(image);
        if layer.exists() {
            tracing::debug!(image, layer = %layer.display(), "Image layer already extracted");
            return Ok(false);
        }

        let archive = self.paths.image_archive(image);
        let file = File::open(&archive).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                HuskError::config(format!("image archive {} not found", archive.display()))
            } else {
                HuskError::Io(e)
            }
        })?;

        let staging = layer.with_file_name(format!("{image}.partial"));
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        fs::create_dir_all(&staging)?;

        if let Err(e) = unpack(file, &staging) {
            if let Err(cleanup) = fs::remove_dir_all(&staging) {
                tracing::warn!(path = %staging.display(), error = %cleanup, "Failed to remove staging directory");
            }
            return Err(e);
        }
        fs::rename(&staging, &layer)?;

        tracing::info!(image, layer = %layer.display(), "Image layer extracted");
        Ok(true)
    }

    /// Create the writable layer of container `name`.
    pub fn create_write_layer(&self, name: &str) -> HuskResult<PathBuf> {
        let layer = self.paths.write_layer(name);
        fs::create_dir_all(self.paths.write_layer_diff(name))?;
        fs::create_dir_all(self.paths.write_layer_work(name))?;
        Ok(layer)
    }

    /// Overlay the writable layer of `name` on `image` at its mount point.
    pub fn create_mount_point(&self, name: &str, image: &str) -> HuskResult<PathBuf> {
        let overlay = OverlayFs::for_container(&self.paths, name, image);
        overlay.mount()?;
        Ok(overlay.merged_dir)
    }

    /// Build the root of container `name` and return its mount point.
    ///
    /// A malformed volume spec is ignored; the container starts without it.
    pub fn new_workspace(&self, volume: &str, name: &str, image: &str) -> HuskResult<PathBuf> {
        self.create_read_only_layer(image)?;
        self.create_write_layer(name)?;
        let root = self.create_mount_point(name, image)?;

        if let Some(spec) = VolumeSpec::parse(volume) {
            spec.mount(&root)?;
        }
        Ok(root)
    }

    /// Tear down the workspace of container `name`. Failures are logged.
    pub fn delete_workspace(&self, volume: &str, name: &str) {
        let root = self.paths.mount_point(name);

        if let Some(spec) = VolumeSpec::parse(volume) {
            if let Err(e) = spec.unmount(&root) {
                tracing::warn!(container = name, error = %e, "Failed to unmount volume");
            }
        }

        if let Err(e) = super::mounts::unmount(&root, true) {
            tracing::warn!(container = name, error = %e, "Failed to unmount root");
        }
        if root.exists() {
            if let Err(e) = fs::remove_dir(&root) {
                tracing::warn!(container = name, path = %root.display(), error = %e, "Failed to remove mount point");
            }
        }

        let layer = self.paths.write_layer(name);
        if layer.exists() {
            if let Err(e) = fs::remove_dir_all(&layer) {
                tracing::warn!(container = name, path = %layer.display(), error = %e, "Failed to remove write layer");
            }
        }
        tracing::debug!(container = name, "Workspace deleted");
    }
}

/// Unpack a tar archive, gzip-compressed or not, into `dest`.
fn unpack(file: File, dest: &Path) -> HuskResult<()> {
    let mut reader = BufReader::new(file);
    let compressed = reader.fill_buf()?.starts_with(&GZIP_MAGIC);

    let input: Box<dyn Read> = if compressed {
        Box::new(GzDecoder::new(reader))
    } else {
        Box::new(reader)
    };

    let mut archive = tar::Archive::new(input);
    archive.set_preserve_permissions(true);
    archive.set_overwrite(true);
    archive.unpack(dest)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::Compression;
    use flate2::write::GzEncoder;

    use super::*;

    fn write_image<W: Write>(out: W) -> W {
        let mut builder = tar::Builder::new(out);
        let content = b"hello from the image\n";
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, "etc/motd", &content[..])
            .unwrap();
        builder.into_inner().unwrap()
    }

    fn store() -> (tempfile::TempDir, HuskPaths, LayerStore) {
        let tmp = tempfile::tempdir().unwrap();
        let paths = HuskPaths::with_root(tmp.path());
        paths.create_dirs().unwrap();
        (tmp, paths.clone(), LayerStore::new(paths))
    }

    #[test]
    fn extracts_exactly_once() {
        let (_tmp, paths, store) = store();
        write_image(File::create(paths.image_archive("base")).unwrap());

        assert!(store.create_read_only_layer("base").unwrap());
        let motd = paths.image_layer("base").join("etc/motd");
        assert_eq!(fs::read_to_string(&motd).unwrap(), "hello from the image\n");

        // The archive is gone, so a second extraction would fail.
        fs::remove_file(paths.image_archive("base")).unwrap();
        assert!(!store.create_read_only_layer("base").unwrap());
        assert!(motd.exists());
    }

    #[test]
    fn extracts_gzip_archives() {
        let (_tmp, paths, store) = store();
        let encoder = GzEncoder::new(
            File::create(paths.image_archive("alpine")).unwrap(),
            Compression::default(),
        );
        write_image(encoder).finish().unwrap();

        assert!(store.create_read_only_layer("alpine").unwrap());
        assert!(paths.image_layer("alpine").join("etc/motd").exists());
    }

    #[test]
    fn failed_extraction_leaves_no_layer() {
        let (_tmp, paths, store) = store();
        fs::write(paths.image_archive("broken"), [0x1f, 0x8b, 0, 1, 2, 3]).unwrap();

        assert!(store.create_read_only_layer("broken").is_err());
        assert!(!paths.image_layer("broken").exists());
        assert!(!paths.images().join("broken.partial").exists());
    }

    #[test]
    fn missing_archive_is_config_error() {
        let (_tmp, _paths, store) = store();
        let err = store.create_read_only_layer("nope").unwrap_err();
        assert!(matches!(err, HuskError::Config { .. }));
    }

    #[test]
    fn image_names_stay_inside_the_store() {
        let (tmp, paths, store) = store();
        write_image(File::create(tmp.path().join("x.tar")).unwrap());

        for image in ["", "../x", "../../x", "a/b"] {
            let err = store.create_read_only_layer(image).unwrap_err();
            assert!(matches!(err, HuskError::InvalidImageName { .. }), "{image:?}");
        }
        assert!(!tmp.path().join("x").exists());
        assert_eq!(fs::read_dir(paths.images()).unwrap().count(), 0);

        let err = store.new_workspace("", "web", "").unwrap_err();
        assert!(matches!(err, HuskError::InvalidImageName { .. }));
        assert!(!paths.write_layer("web").exists());
    }

    #[test_log::test]
    fn delete_workspace_without_mounts() {
        let (_tmp, paths, store) = store();
        store.create_write_layer("web").unwrap();
        fs::create_dir_all(paths.mount_point("web")).unwrap();
        fs::write(paths.write_layer_diff("web").join("file"), "x").unwrap();

        store.delete_workspace("/data:/data", "web");
        assert!(!paths.write_layer("web").exists());
        assert!(!paths.mount_point("web").exists());
    }
}
