//! Data sources that deliver child records, for the initial load and for
//! lazy branches.

use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::pin::Pin;
use std::time::Duration;

use log::debug;

use crate::error::{AppError, Result};
use crate::tree::NodeData;

/// Pending result of a load.
pub type LoadFuture = Pin<Box<dyn Future<Output = Result<Vec<NodeData>>> + Send>>;

/// Asynchronously yields child records for a descriptor.
///
/// `None` asks for the top-level records; `Some` carries a lazy node's
/// descriptor (its `source`, or its key).
pub trait DataSource: Send + Sync {
    fn load(&self, descriptor: Option<&str>) -> LoadFuture;

    /// Short human-readable label for the status bar.
    fn describe(&self) -> String;
}

/// Reads a JSON array of records from disk. Lazy descriptors resolve to
/// `<descriptor>.json` next to the root file.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    root_file: PathBuf,
    dir: PathBuf,
}

impl JsonFileSource {
    pub fn new(root_file: &Path) -> Result<Self> {
        if !root_file.is_file() {
            return Err(AppError::InvalidPath(format!(
                "{} is not a file",
                root_file.display()
            )));
        }
        let dir = root_file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(Self {
            root_file: root_file.to_path_buf(),
            dir,
        })
    }

    /// File backing `descriptor`; descriptors may not leave the data directory.
    pub fn path_for(&self, descriptor: Option<&str>) -> Result<PathBuf> {
        let Some(descriptor) = descriptor else {
            return Ok(self.root_file.clone());
        };
        let relative = PathBuf::from(format!("{descriptor}.json"));
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if descriptor.is_empty() || escapes {
            return Err(AppError::InvalidPath(format!(
                "descriptor '{descriptor}' is outside the data directory"
            )));
        }
        Ok(self.dir.join(relative))
    }
}

impl DataSource for JsonFileSource {
    fn load(&self, descriptor: Option<&str>) -> LoadFuture {
        let path = self.path_for(descriptor);
        Box::pin(async move {
            let path = path?;
            debug!("reading {}", path.display());
            let text = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| AppError::Load(format!("{}: {e}", path.display())))?;
            let records: Vec<NodeData> = serde_json::from_str(&text)?;
            Ok(records)
        })
    }

    fn describe(&self) -> String {
        self.root_file.display().to_string()
    }
}

const WORDS: &[&str] = &[
    "alpha", "bravo", "charlie", "delta", "echo", "foxtrot", "golf", "hotel", "india", "juliet",
    "kilo", "lima", "mike", "november", "oscar", "papa",
];

/// Deterministic generated hierarchy for exercising large trees.
///
/// Keys are dotted paths (`n3.1.4`). Branches above `depth` are either built
/// inline (`lazy == false`) or left for lazy loading.
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    pub fanout: usize,
    pub depth: usize,
    pub lazy: bool,
    /// Simulated latency per load.
    pub latency: Duration,
}

impl SyntheticSource {
    pub fn new(fanout: usize, depth: usize, lazy: bool) -> Self {
        Self {
            fanout: fanout.max(1),
            depth: depth.max(1),
            lazy,
            latency: Duration::ZERO,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Total nodes a fully expanded tree holds.
    pub fn node_count(&self) -> usize {
        (1..=self.depth).map(|level| self.fanout.pow(level as u32)).sum()
    }

    fn level_of(descriptor: &str) -> Option<usize> {
        let path = descriptor.strip_prefix('n')?;
        let mut level = 0;
        for part in path.split('.') {
            part.parse::<usize>().ok()?;
            level += 1;
        }
        Some(level)
    }

    /// Records for the children of `parent` (at `level`, 1-based).
    fn build(&self, parent: Option<&str>, level: usize) -> Vec<NodeData> {
        (1..=self.fanout)
            .map(|i| {
                let key = match parent {
                    Some(parent) => format!("{parent}.{i}"),
                    None => format!("n{i}"),
                };
                let word = WORDS[(i * 7 + level * 3 + key.len()) % WORDS.len()];
                let mut record = NodeData::new(format!("{word} {}", &key[1..])).with_key(key.clone());
                if level < self.depth {
                    if self.lazy {
                        record = record.lazy();
                    } else {
                        record = record.with_children(self.build(Some(&key), level + 1));
                    }
                }
                record
            })
            .collect()
    }
}

impl DataSource for SyntheticSource {
    fn load(&self, descriptor: Option<&str>) -> LoadFuture {
        let records = match descriptor {
            None => Ok(self.build(None, 1)),
            Some(descriptor) => match Self::level_of(descriptor) {
                Some(level) if level < self.depth => Ok(self.build(Some(descriptor), level + 1)),
                Some(_) => Ok(Vec::new()),
                None => Err(AppError::Load(format!("unknown node '{descriptor}'"))),
            },
        };
        let latency = self.latency;
        Box::pin(async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            records
        })
    }

    fn describe(&self) -> String {
        format!(
            "generated {}x{}{}",
            self.fanout,
            self.depth,
            if self.lazy { " (lazy)" } else { "" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_data(dir: &TempDir) -> PathBuf {
        let root = dir.path().join("tree.json");
        fs::write(
            &root,
            r#"[{"key": "docs", "title": "Docs", "lazy": true},
                {"title": "Readme"}]"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("docs.json"),
            r#"[{"title": "Guide"}, {"title": "API", "lazy": true, "source": "api"}]"#,
        )
        .unwrap();
        root
    }

    #[tokio::test]
    async fn json_source_loads_root_and_lazy_children() {
        let dir = TempDir::new().unwrap();
        let source = JsonFileSource::new(&write_data(&dir)).unwrap();

        let root = source.load(None).await.unwrap();
        assert_eq!(root.len(), 2);
        assert!(root[0].lazy);

        let docs = source.load(Some("docs")).await.unwrap();
        assert_eq!(docs[0].title, "Guide");
        assert_eq!(docs[1].source.as_deref(), Some("api"));
    }

    #[tokio::test]
    async fn json_source_missing_file_is_load_error() {
        let dir = TempDir::new().unwrap();
        let source = JsonFileSource::new(&write_data(&dir)).unwrap();
        let err = source.load(Some("missing")).await.unwrap_err();
        assert!(matches!(err, AppError::Load(_)));
    }

    #[tokio::test]
    async fn json_source_malformed_file() {
        let dir = TempDir::new().unwrap();
        let root = write_data(&dir);
        fs::write(dir.path().join("bad.json"), "{not json").unwrap();
        let source = JsonFileSource::new(&root).unwrap();
        let err = source.load(Some("bad")).await.unwrap_err();
        assert!(matches!(err, AppError::Json(_)));
    }

    #[test]
    fn json_source_rejects_escaping_descriptors() {
        let dir = TempDir::new().unwrap();
        let source = JsonFileSource::new(&write_data(&dir)).unwrap();
        assert!(source.path_for(Some("../secret")).is_err());
        assert!(source.path_for(Some("/etc/passwd")).is_err());
        assert!(source.path_for(Some("")).is_err());
        assert_eq!(
            source.path_for(Some("docs")).unwrap(),
            dir.path().join("docs.json")
        );
    }

    #[test]
    fn json_source_requires_existing_file() {
        let dir = TempDir::new().unwrap();
        let err = JsonFileSource::new(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, AppError::InvalidPath(_)));
    }

    #[tokio::test]
    async fn synthetic_eager_builds_whole_hierarchy() {
        let source = SyntheticSource::new(3, 3, false);
        let root = source.load(None).await.unwrap();
        fn count(records: &[NodeData]) -> usize {
            records
                .iter()
                .map(|r| 1 + r.children.as_deref().map_or(0, count))
                .sum()
        }
        assert_eq!(count(&root), source.node_count());
        assert_eq!(source.node_count(), 3 + 9 + 27);
        assert_eq!(root[1].key.as_deref(), Some("n2"));
    }

    #[tokio::test]
    async fn synthetic_lazy_loads_one_level() {
        let source = SyntheticSource::new(2, 2, true);
        let root = source.load(None).await.unwrap();
        assert!(root.iter().all(|r| r.lazy && r.children.is_none()));

        let children = source.load(Some("n2")).await.unwrap();
        let keys: Vec<_> = children.iter().map(|r| r.key.clone().unwrap()).collect();
        assert_eq!(keys, vec!["n2.1", "n2.2"]);
        assert!(children.iter().all(|r| !r.lazy));

        assert!(source.load(Some("n2.1")).await.unwrap().is_empty());
        assert!(source.load(Some("bogus")).await.is_err());
    }

    #[test]
    fn synthetic_titles_are_deterministic() {
        let source = SyntheticSource::new(4, 1, false);
        assert_eq!(source.build(None, 1), source.build(None, 1));
    }
}
