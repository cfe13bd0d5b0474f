//! Session-scoped key/value storage with origin partitioning.

use rl_core::LayoutError;
use rl_core::LayoutResult;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

/// String key/value storage for one browsing session.
pub trait SessionStore {
    fn get_item(&self, key: &str) -> LayoutResult<Option<String>>;
    fn set_item(&mut self, key: &str, value: &str) -> LayoutResult<()>;
    fn remove_item(&mut self, key: &str) -> LayoutResult<()>;
}

/// Session storage that lives as long as the process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemorySessionStore {
    items: BTreeMap<String, String>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl SessionStore for MemorySessionStore {
    fn get_item(&self, key: &str) -> LayoutResult<Option<String>> {
        Ok(self.items.get(key).cloned())
    }

    fn set_item(&mut self, key: &str, value: &str) -> LayoutResult<()> {
        self.items.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove_item(&mut self, key: &str) -> LayoutResult<()> {
        self.items.remove(key);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    pub partition_by_origin: bool,
    pub ephemeral_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            partition_by_origin: true,
            ephemeral_mode: false,
        }
    }
}

/// File-backed session storage, one partition file per origin.
#[derive(Debug, Clone, Default)]
pub struct StorageManager {
    pub config: StorageConfig,
    persistent_root: Option<PathBuf>,
}

impl StorageManager {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            persistent_root: None,
        }
    }

    pub fn with_persistent_root(mut self, root: PathBuf) -> Self {
        self.persistent_root = Some(root);
        self
    }

    pub fn persistent_root(&self) -> Option<&Path> {
        self.persistent_root.as_deref()
    }

    /// Opens the session partition of `origin`. Fails up front when
    /// persistence is unavailable.
    pub fn session_for(&self, origin: &str) -> LayoutResult<PartitionedSession> {
        let path = self.partition_path(origin)?;
        tracing::debug!(origin, path = %path.display(), "opened session partition");
        Ok(PartitionedSession { path })
    }

    fn partition_path(&self, origin: &str) -> LayoutResult<PathBuf> {
        if self.config.ephemeral_mode {
            return Err(LayoutError::new(
                "storage.persistence_disabled",
                "persistent session storage is disabled in ephemeral mode",
            ));
        }

        let root = self.persistent_root.as_ref().ok_or_else(|| {
            LayoutError::new(
                "storage.persistence_unconfigured",
                "session storage directory is not configured",
            )
        })?;

        let partition = if self.config.partition_by_origin {
            sanitize_partition_name(origin)
        } else {
            "global".to_owned()
        };

        Ok(root.join("sessions").join(format!("{partition}.kv")))
    }
}

/// Session store backed by a single partition file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionedSession {
    path: PathBuf,
}

impl PartitionedSession {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for PartitionedSession {
    fn get_item(&self, key: &str) -> LayoutResult<Option<String>> {
        let map = read_partition_map(&self.path)?;
        Ok(map.get(key).cloned())
    }

    fn set_item(&mut self, key: &str, value: &str) -> LayoutResult<()> {
        let mut map = read_partition_map(&self.path)?;
        map.insert(key.to_owned(), value.to_owned());
        write_partition_map(&self.path, &map)
    }

    fn remove_item(&mut self, key: &str) -> LayoutResult<()> {
        let mut map = read_partition_map(&self.path)?;
        if map.remove(key).is_none() {
            return Ok(());
        }

        if map.is_empty() {
            return fs::remove_file(&self.path).map_err(|error| {
                LayoutError::new(
                    "storage.partition_remove_failed",
                    format!(
                        "failed removing empty partition `{}`: {error}",
                        self.path.display()
                    ),
                )
            });
        }

        write_partition_map(&self.path, &map)
    }
}

fn sanitize_partition_name(origin: &str) -> String {
    let out: String = origin
        .trim()
        .to_ascii_lowercase()
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '.' || ch == '-' {
                ch
            } else {
                '_'
            }
        })
        .collect();

    if out.is_empty() {
        "unknown".to_owned()
    } else {
        out
    }
}

fn read_partition_map(path: &Path) -> LayoutResult<BTreeMap<String, String>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }

    let content = fs::read_to_string(path).map_err(|error| {
        LayoutError::new(
            "storage.partition_read_failed",
            format!("failed to read partition `{}`: {error}", path.display()),
        )
    })?;

    let mut map = BTreeMap::new();
    for (index, line) in content.lines().enumerate() {
        if line.is_empty() {
            continue;
        }

        let (key_hex, value_hex) = line.split_once('\t').ok_or_else(|| {
            LayoutError::new(
                "storage.partition_format_invalid",
                format!("invalid record at `{}` line {}", path.display(), index + 1),
            )
        })?;
        map.insert(decode_hex(key_hex)?, decode_hex(value_hex)?);
    }

    Ok(map)
}

fn write_partition_map(path: &Path, map: &BTreeMap<String, String>) -> LayoutResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|error| {
            LayoutError::new(
                "storage.partition_dir_create_failed",
                format!("failed to create `{}`: {error}", parent.display()),
            )
        })?;
    }

    let mut encoded = String::new();
    for (key, value) in map {
        encoded.push_str(&encode_hex(key));
        encoded.push('\t');
        encoded.push_str(&encode_hex(value));
        encoded.push('\n');
    }

    fs::write(path, encoded).map_err(|error| {
        LayoutError::new(
            "storage.partition_write_failed",
            format!("failed to write partition `{}`: {error}", path.display()),
        )
    })
}

fn encode_hex(value: &str) -> String {
    const DIGITS: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(value.len().saturating_mul(2));
    for byte in value.bytes() {
        out.push(char::from(DIGITS[usize::from(byte >> 4)]));
        out.push(char::from(DIGITS[usize::from(byte & 0x0f)]));
    }
    out
}

fn decode_hex(value: &str) -> LayoutResult<String> {
    let digits = value.as_bytes();
    if !digits.len().is_multiple_of(2) {
        return Err(LayoutError::new(
            "storage.partition_hex_invalid",
            "hex field length must be even",
        ));
    }

    let bytes = digits
        .chunks_exact(2)
        .map(|pair| Ok((hex_nibble(pair[0])? << 4) | hex_nibble(pair[1])?))
        .collect::<LayoutResult<Vec<u8>>>()?;

    String::from_utf8(bytes).map_err(|error| {
        LayoutError::new(
            "storage.partition_utf8_invalid",
            format!("partition field is not valid UTF-8: {error}"),
        )
    })
}

fn hex_nibble(digit: u8) -> LayoutResult<u8> {
    match digit {
        b'0'..=b'9' => Ok(digit - b'0'),
        b'a'..=b'f' => Ok(digit - b'a' + 10),
        b'A'..=b'F' => Ok(digit - b'A' + 10),
        _ => Err(LayoutError::new(
            "storage.partition_hex_invalid",
            format!("invalid hex digit `{}`", char::from(digit)),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::MemorySessionStore;
    use super::SessionStore;
    use super::StorageConfig;
    use super::StorageManager;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_storage_root(tag: &str) -> std::path::PathBuf {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|value| value.as_nanos())
            .unwrap_or_default();
        std::env::temp_dir().join(format!("render-layout-storage-{tag}-{stamp}"))
    }

    #[test]
    fn memory_store_set_get_remove() {
        let mut store = MemorySessionStore::new();
        assert_eq!(store.get_item("k"), Ok(None));
        assert!(store.set_item("k", "v").is_ok());
        assert_eq!(store.get_item("k"), Ok(Some("v".to_owned())));
        assert!(store.remove_item("k").is_ok());
        assert!(store.is_empty());
    }

    #[test]
    fn partitioned_session_persists_across_handles() {
        let root = temp_storage_root("persist");
        let manager = StorageManager::default().with_persistent_root(root.clone());

        let mut session = match manager.session_for("https://example.com") {
            Ok(session) => session,
            Err(error) => panic!("{error}"),
        };
        assert!(session.set_item("renderLayoutJsCache:/l.html", "<slot>\t\n</slot>").is_ok());

        let reopened = match manager.session_for("https://example.com") {
            Ok(session) => session,
            Err(error) => panic!("{error}"),
        };
        assert_eq!(
            reopened.get_item("renderLayoutJsCache:/l.html"),
            Ok(Some("<slot>\t\n</slot>".to_owned()))
        );

        let _ = std::fs::remove_dir_all(root);
    }

    #[test]
    fn origins_do_not_share_partitions() {
        let root = temp_storage_root("origins");
        let manager = StorageManager::default().with_persistent_root(root.clone());

        let first = manager.session_for("https://a.test");
        let second = manager.session_for("https://b.test");
        assert!(first.is_ok() && second.is_ok());
        let (mut first, second) = match (first, second) {
            (Ok(first), Ok(second)) => (first, second),
            _ => unreachable!(),
        };
        assert_ne!(first.path(), second.path());

        assert!(first.set_item("k", "a").is_ok());
        assert_eq!(second.get_item("k"), Ok(None));

        assert!(first.remove_item("k").is_ok());
        assert!(!first.path().exists());

        let _ = std::fs::remove_dir_all(root);
    }

    #[test]
    fn ephemeral_mode_blocks_persistence() {
        let config = StorageConfig {
            partition_by_origin: true,
            ephemeral_mode: true,
        };
        let manager = StorageManager::new(config).with_persistent_root(temp_storage_root("eph"));

        let opened = manager.session_for("https://example.com");
        assert!(opened.is_err());
        if let Err(error) = opened {
            assert_eq!(error.code, "storage.persistence_disabled");
        }
    }

    #[test]
    fn missing_root_is_reported() {
        let opened = StorageManager::default().session_for("https://example.com");
        assert!(opened.is_err());
        if let Err(error) = opened {
            assert_eq!(error.code, "storage.persistence_unconfigured");
        }
    }
}
