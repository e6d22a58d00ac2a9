use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::io::Reader as ImageReader;
use log::{debug, warn};

use crate::error::ImageError;

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Source of flag pictures, keyed by flag id.
pub trait ImageStore {
    fn list_ids(&self) -> BTreeSet<String>;
    fn load(&self, id: &str) -> Result<Vec<u8>, ImageError>;
}

/// Images found in a single folder; the id of each flag is its file stem.
#[derive(Debug, Default)]
pub struct FolderImageStore {
    files: BTreeMap<String, PathBuf>,
}

impl FolderImageStore {
    pub fn open(folder: &Path) -> Result<Self, ImageError> {
        let mut files = BTreeMap::new();

        for entry in fs::read_dir(folder)? {
            let path = match entry {
                Ok(entry) => entry.path(),
                Err(e) => {
                    warn!("Skipping unreadable entry in {}: {}", folder.display(), e);
                    continue;
                }
            };

            let is_image = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| IMAGE_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
                .unwrap_or(false);
            if !is_image || !path.is_file() {
                continue;
            }

            if let Some(id) = path.file_stem().and_then(|stem| stem.to_str()) {
                if let Some(previous) = files.insert(id.to_string(), path.clone()) {
                    warn!(
                        "Both {} and {} map to flag '{}', using the latter",
                        previous.display(),
                        path.display(),
                        id
                    );
                }
            }
        }

        debug!("Found {} flag images in {}", files.len(), folder.display());
        Ok(Self { files })
    }

    pub fn path_of(&self, id: &str) -> Option<&Path> {
        self.files.get(id).map(PathBuf::as_path)
    }
}

impl ImageStore for FolderImageStore {
    fn list_ids(&self) -> BTreeSet<String> {
        self.files.keys().cloned().collect()
    }

    fn load(&self, id: &str) -> Result<Vec<u8>, ImageError> {
        let path = self
            .path_of(id)
            .ok_or_else(|| ImageError::NotFound(id.to_string()))?;
        Ok(fs::read(path)?)
    }
}

/// Decoded RGBA8 pixels, ready to upload as a texture.
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

pub fn decode(bytes: &[u8]) -> Result<DecodedImage, ImageError> {
    let img = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .decode()?
        .to_rgba8();
    let (width, height) = img.dimensions();
    Ok(DecodedImage {
        width,
        height,
        rgba: img.into_raw(),
    })
}
