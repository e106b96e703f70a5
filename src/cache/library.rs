//! Named set of base icon images.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use ::image::DynamicImage;

use crate::image::io::{decode_image, has_image_extension, load_image};
use crate::util::{IconMatchError, IconMatchResult};

/// Where a base image's encoded bytes live.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BaseSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

/// Base images keyed by id (the file stem for directory scans).
///
/// Iteration is in id order, so builds and reports are deterministic.
#[derive(Clone, Debug, Default)]
pub struct BaseLibrary {
    entries: BTreeMap<String, BaseSource>,
}

impl BaseLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collects every image file directly inside `dir`.
    ///
    /// When two files share a stem, the one whose name sorts first wins.
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> IconMatchResult<Self> {
        let dir = dir.as_ref();
        let read = fs::read_dir(dir)
            .map_err(|err| IconMatchError::io(format!("{}: {err}", dir.display())))?;
        let mut paths: Vec<PathBuf> = read
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && has_image_extension(path))
            .collect();
        paths.sort();

        let mut library = Self::new();
        for path in paths {
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            library
                .entries
                .entry(stem.to_owned())
                .or_insert(BaseSource::Path(path.clone()));
        }
        Ok(library)
    }

    pub fn insert_path(&mut self, id: impl Into<String>, path: impl Into<PathBuf>) {
        self.entries.insert(id.into(), BaseSource::Path(path.into()));
    }

    pub fn insert_bytes(&mut self, id: impl Into<String>, bytes: Vec<u8>) {
        self.entries.insert(id.into(), BaseSource::Bytes(bytes));
    }

    pub fn remove(&mut self, id: &str) -> Option<BaseSource> {
        self.entries.remove(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ids in sorted order.
    pub fn ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.keys().map(String::as_str)
    }

    pub fn source(&self, id: &str) -> Option<&BaseSource> {
        self.entries.get(id)
    }

    /// Decodes base image `id`.
    pub fn load(&self, id: &str) -> IconMatchResult<DynamicImage> {
        match self.lookup(id)? {
            BaseSource::Path(path) => load_image(path),
            BaseSource::Bytes(bytes) => decode_image(bytes),
        }
    }

    /// Raw encoded bytes of base image `id`.
    pub fn read_bytes(&self, id: &str) -> IconMatchResult<Cow<'_, [u8]>> {
        match self.lookup(id)? {
            BaseSource::Path(path) => fs::read(path)
                .map(Cow::Owned)
                .map_err(|err| IconMatchError::io(format!("{}: {err}", path.display()))),
            BaseSource::Bytes(bytes) => Ok(Cow::Borrowed(bytes.as_slice())),
        }
    }

    /// BLAKE3 digest (hex) of the encoded source of `id`.
    pub fn digest(&self, id: &str) -> IconMatchResult<String> {
        let bytes = self.read_bytes(id)?;
        Ok(blake3::hash(&bytes).to_hex().to_string())
    }

    fn lookup(&self, id: &str) -> IconMatchResult<&BaseSource> {
        self.entries
            .get(id)
            .ok_or_else(|| IconMatchError::UnknownBaseImage { id: id.to_owned() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_id_is_an_error() {
        let library = BaseLibrary::new();
        assert_eq!(
            library.load("sword").unwrap_err(),
            IconMatchError::UnknownBaseImage {
                id: "sword".to_owned()
            }
        );
    }

    #[test]
    fn digest_tracks_content() {
        let mut library = BaseLibrary::new();
        library.insert_bytes("a", vec![1, 2, 3]);
        library.insert_bytes("b", vec![1, 2, 3]);
        library.insert_bytes("c", vec![3, 2, 1]);
        let a = library.digest("a").unwrap();
        assert_eq!(a, library.digest("b").unwrap());
        assert_ne!(a, library.digest("c").unwrap());
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn ids_are_sorted() {
        let mut library = BaseLibrary::new();
        library.insert_bytes("zeta", vec![]);
        library.insert_bytes("alpha", vec![]);
        assert_eq!(library.ids().collect::<Vec<_>>(), vec!["alpha", "zeta"]);
    }
}
