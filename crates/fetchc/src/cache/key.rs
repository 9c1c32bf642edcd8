//! Slot keys and on-disk paths.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use super::types::{CacheError, CacheResult};

/// Maximum number of slots probed when resolving hash collisions
pub const MAX_KEY_PROBES: usize = 8;

const META_EXTENSION: &str = "meta";
const TMP_EXTENSION: &str = "tmp";

/// Slot key for an identity, a lowercase hex SHA-256 digest
pub fn key_for(identity: &str) -> String {
    let hash = Sha256::digest(identity.as_bytes());
    format!("{hash:x}")
}

/// Next slot in the collision chain of `identity` after `key`.
///
/// Read and write paths walk the same chain, so a collision always resolves
/// to the same final slot.
pub fn next_probe(key: &str, identity: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hasher.update(identity.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Keys double as file names, so restrict them to a safe alphabet
pub(crate) fn validate(key: &str) -> CacheResult<()> {
    let valid = key.len() >= 2
        && key
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
    if valid {
        Ok(())
    } else {
        Err(CacheError::InvalidKey(key.to_string()))
    }
}

/// On-disk layout: `<root>/<k0>/<k1>/<key>` plus `<key>.meta`
#[derive(Debug, Clone)]
pub(crate) struct Layout {
    root: PathBuf,
}

impl Layout {
    pub(crate) fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub(crate) fn root(&self) -> &Path {
        &self.root
    }

    pub(crate) fn dir(&self, key: &str) -> PathBuf {
        self.root.join(&key[0..1]).join(&key[1..2])
    }

    pub(crate) fn data_path(&self, key: &str) -> PathBuf {
        self.dir(key).join(key)
    }

    pub(crate) fn meta_path(&self, key: &str) -> PathBuf {
        self.dir(key).join(format!("{key}.{META_EXTENSION}"))
    }

    pub(crate) fn tmp_path(path: &Path) -> PathBuf {
        let mut name = path.file_name().unwrap_or_default().to_os_string();
        name.push(".");
        name.push(TMP_EXTENSION);
        path.with_file_name(name)
    }
}

/// Classification of a file found while walking the cache tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CacheFile {
    Data(String),
    Meta(String),
    Temp,
    Foreign,
}

pub(crate) fn classify(file_name: &str) -> CacheFile {
    if file_name.ends_with(&format!(".{TMP_EXTENSION}")) {
        return CacheFile::Temp;
    }
    if let Some(key) = file_name.strip_suffix(&format!(".{META_EXTENSION}")) {
        return if validate(key).is_ok() {
            CacheFile::Meta(key.to_string())
        } else {
            CacheFile::Foreign
        };
    }
    if validate(file_name).is_ok() {
        CacheFile::Data(file_name.to_string())
    } else {
        CacheFile::Foreign
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_stable_hex() {
        let k = key_for("http://example.test/a");
        assert_eq!(k.len(), 64);
        assert!(k.bytes().all(|b| b.is_ascii_hexdigit()));
        assert_eq!(k, key_for("http://example.test/a"));
        assert_ne!(k, key_for("http://example.test/b"));
    }

    #[test]
    fn test_probe_chain_is_deterministic() {
        let identity = "http://example.test/a";
        let k0 = key_for(identity);
        let k1 = next_probe(&k0, identity);
        assert_ne!(k0, k1);
        assert_eq!(k1, next_probe(&k0, identity));
        assert_eq!(k1, key_for(&format!("{k0}{identity}")));
    }

    #[test]
    fn test_validate() {
        assert!(validate("ab").is_ok());
        assert!(validate("a-b_c9").is_ok());
        assert!(validate("a").is_err());
        assert!(validate("../etc").is_err());
        assert!(validate("a/b").is_err());
        assert!(validate("ab.meta").is_err());
    }

    #[test]
    fn test_layout_shards_by_first_two_chars() {
        let layout = Layout::new(PathBuf::from("/cache"));
        assert_eq!(layout.data_path("abcd"), PathBuf::from("/cache/a/b/abcd"));
        assert_eq!(
            layout.meta_path("abcd"),
            PathBuf::from("/cache/a/b/abcd.meta")
        );
        assert_eq!(
            Layout::tmp_path(&layout.meta_path("abcd")),
            PathBuf::from("/cache/a/b/abcd.meta.tmp")
        );
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify("abcd"), CacheFile::Data("abcd".to_string()));
        assert_eq!(classify("abcd.meta"), CacheFile::Meta("abcd".to_string()));
        assert_eq!(classify("abcd.tmp"), CacheFile::Temp);
        assert_eq!(classify("abcd.meta.tmp"), CacheFile::Temp);
        assert_eq!(classify(".DS_Store"), CacheFile::Foreign);
    }
}
