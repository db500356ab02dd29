//! In-memory [`Store`], optionally backed by a JSON file.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use automap_types::{
    CounterSample, InterfaceKey, Link, LinkKey, Node, NodeUpdate, UtilizationSnapshot,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{Store, StoreError};

/// On-disk layout of the store file.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct Document {
    nodes: Vec<Node>,
    links: Vec<Link>,
    samples: Vec<CounterSample>,
    utilization: Vec<UtilizationSnapshot>,
}

#[derive(Debug, Default)]
struct Collections {
    nodes: BTreeMap<String, Node>,
    links: BTreeMap<LinkKey, Link>,
    samples: BTreeMap<(InterfaceKey, u64), CounterSample>,
    utilization: BTreeMap<InterfaceKey, UtilizationSnapshot>,
}

impl From<Document> for Collections {
    fn from(doc: Document) -> Self {
        Self {
            nodes: doc
                .nodes
                .into_iter()
                .map(|n| (n.device_name.clone(), n))
                .collect(),
            links: doc.links.into_iter().map(|l| (l.key(), l)).collect(),
            samples: doc.samples.into_iter().map(|s| (s.key(), s)).collect(),
            utilization: doc
                .utilization
                .into_iter()
                .map(|u| (u.interface(), u))
                .collect(),
        }
    }
}

impl Collections {
    fn to_document(&self) -> Document {
        Document {
            nodes: self.nodes.values().cloned().collect(),
            links: self.links.values().cloned().collect(),
            samples: self.samples.values().cloned().collect(),
            utilization: self.utilization.values().cloned().collect(),
        }
    }
}

fn matches_any(name: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|p| name.contains(p.as_str()))
}

/// Store holding every record in memory.
///
/// When opened from a path, the file is loaded once and rewritten on
/// [`flush`](Store::flush). The write goes to a sibling temporary file that
/// is then renamed over the original.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Collections>,
    path: Option<PathBuf>,
}

impl MemoryStore {
    /// Create an empty store with no backing file.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a store backed by `path`. A missing file starts an empty store.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let collections = match fs::read_to_string(&path) {
            Ok(content) => {
                let doc: Document = serde_json::from_str(&content).map_err(|source| {
                    StoreError::Corrupt {
                        path: path.clone(),
                        source,
                    }
                })?;
                Collections::from(doc)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = %path.display(), "store file not found, starting empty");
                Collections::default()
            }
            Err(source) => return Err(StoreError::Open { path, source }),
        };
        debug!(
            nodes = collections.nodes.len(),
            links = collections.links.len(),
            samples = collections.samples.len(),
            "store loaded"
        );
        Ok(Self {
            inner: RwLock::new(collections),
            path: Some(path),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl Store for MemoryStore {
    fn node(&self, device_name: &str) -> Result<Option<Node>, StoreError> {
        Ok(self.inner.read().nodes.get(device_name).cloned())
    }

    fn nodes(&self) -> Result<Vec<Node>, StoreError> {
        Ok(self.inner.read().nodes.values().cloned().collect())
    }

    fn nodes_matching(&self, patterns: &[String]) -> Result<Vec<Node>, StoreError> {
        Ok(self
            .inner
            .read()
            .nodes
            .values()
            .filter(|n| matches_any(&n.device_name, patterns))
            .cloned()
            .collect())
    }

    fn merge_node(&self, device_name: &str, update: &NodeUpdate) -> Result<Node, StoreError> {
        let name = device_name.to_lowercase();
        let mut inner = self.inner.write();
        let node = inner
            .nodes
            .entry(name.clone())
            .or_insert_with(|| Node::new(&name));
        node.apply(update);
        Ok(node.clone())
    }

    fn set_polling(&self, device_name: &str, to_poll: bool) -> Result<bool, StoreError> {
        let mut inner = self.inner.write();
        match inner.nodes.get_mut(device_name) {
            Some(node) => {
                node.to_poll = to_poll;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn delete_device(&self, device_name: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.write();
        let existed = inner.nodes.remove(device_name).is_some();
        inner.links.retain(|_, l| !l.touches(device_name));
        inner.samples.retain(|(k, _), _| k.device_name != device_name);
        inner.utilization.retain(|k, _| k.device_name != device_name);
        Ok(existed)
    }

    fn links(&self) -> Result<Vec<Link>, StoreError> {
        Ok(self.inner.read().links.values().cloned().collect())
    }

    fn links_matching(&self, patterns: &[String]) -> Result<Vec<Link>, StoreError> {
        Ok(self
            .inner
            .read()
            .links
            .values()
            .filter(|l| matches_any(&l.device_name, patterns))
            .cloned()
            .collect())
    }

    fn links_of(&self, device_name: &str) -> Result<Vec<Link>, StoreError> {
        Ok(self
            .inner
            .read()
            .links
            .values()
            .filter(|l| l.touches(device_name))
            .cloned()
            .collect())
    }

    fn upsert_link(&self, link: Link) -> Result<(), StoreError> {
        self.inner.write().links.insert(link.key(), link);
        Ok(())
    }

    fn delete_link(&self, key: &LinkKey) -> Result<bool, StoreError> {
        Ok(self.inner.write().links.remove(key).is_some())
    }

    fn samples_for(&self, device_names: &[String]) -> Result<Vec<CounterSample>, StoreError> {
        Ok(self
            .inner
            .read()
            .samples
            .values()
            .filter(|s| device_names.iter().any(|d| *d == s.device_name))
            .cloned()
            .collect())
    }

    fn latest_samples(&self) -> Result<Vec<CounterSample>, StoreError> {
        let inner = self.inner.read();
        let mut latest: BTreeMap<&InterfaceKey, &CounterSample> = BTreeMap::new();
        // Keys sort by interface then timestamp, so the last write wins.
        for ((iface, _), sample) in inner.samples.iter() {
            latest.insert(iface, sample);
        }
        Ok(latest.into_values().cloned().collect())
    }

    fn insert_sample(&self, sample: CounterSample) -> Result<(), StoreError> {
        self.inner.write().samples.insert(sample.key(), sample);
        Ok(())
    }

    fn utilization(&self, key: &InterfaceKey) -> Result<Option<UtilizationSnapshot>, StoreError> {
        Ok(self.inner.read().utilization.get(key).cloned())
    }

    fn all_utilization(&self) -> Result<Vec<UtilizationSnapshot>, StoreError> {
        Ok(self.inner.read().utilization.values().cloned().collect())
    }

    fn upsert_utilization(&self, snapshot: UtilizationSnapshot) -> Result<(), StoreError> {
        self.inner
            .write()
            .utilization
            .insert(snapshot.interface(), snapshot);
        Ok(())
    }

    fn flush(&self) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = {
            let inner = self.inner.read();
            serde_json::to_string_pretty(&inner.to_document())?
        };
        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        debug!(path = %path.display(), "store flushed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample(dev: &str, iface: &str, ts: u64, speed: u64) -> CounterSample {
        CounterSample::builder(dev, iface)
            .timestamp(ts)
            .speed(speed)
            .build()
    }

    #[test]
    fn merge_node_creates_then_patches() {
        let store = MemoryStore::new();
        let created = store
            .merge_node("SW1", &NodeUpdate::new().device_ip("10.0.0.1"))
            .unwrap();
        assert_eq!(created.device_name, "sw1");
        assert!(created.to_poll);

        let patched = store
            .merge_node("sw1", &NodeUpdate::new().to_poll(false))
            .unwrap();
        assert_eq!(patched.device_ip.as_deref(), Some("10.0.0.1"));
        assert!(!patched.to_poll);
        assert_eq!(store.nodes().unwrap().len(), 1);
    }

    #[test]
    fn pattern_query_is_substring() {
        let store = MemoryStore::new();
        for name in ["paris-sw1", "paris-rtr1", "lyon-sw1"] {
            store.merge_node(name, &NodeUpdate::new()).unwrap();
        }
        let found = store.nodes_matching(&["paris".to_string()]).unwrap();
        assert_eq!(found.len(), 2);
        let found = store
            .nodes_matching(&["lyon".to_string(), "rtr".to_string()])
            .unwrap();
        assert_eq!(found.len(), 2);
        assert!(store.nodes_matching(&[]).unwrap().is_empty());
    }

    #[test]
    fn set_polling_on_missing_node() {
        let store = MemoryStore::new();
        assert!(!store.set_polling("ghost", false).unwrap());
        store.merge_node("a", &NodeUpdate::new()).unwrap();
        assert!(store.set_polling("a", false).unwrap());
        assert!(!store.node("a").unwrap().unwrap().to_poll);
    }

    #[test]
    fn link_upsert_is_idempotent() {
        let store = MemoryStore::new();
        let link = Link::new("a", "1", "b", "2");
        store.upsert_link(link.clone()).unwrap();
        store.upsert_link(link.clone()).unwrap();
        store.upsert_link(link.reversed()).unwrap();
        assert_eq!(store.links().unwrap().len(), 2);
        assert_eq!(store.links_of("b").unwrap().len(), 2);
        assert!(store.delete_link(&link.key()).unwrap());
        assert!(!store.delete_link(&link.key()).unwrap());
    }

    #[test]
    fn duplicate_sample_key_updates_in_place() {
        let store = MemoryStore::new();
        store.insert_sample(sample("a", "1", 10, 100)).unwrap();
        store.insert_sample(sample("a", "1", 10, 1000)).unwrap();
        let samples = store.samples_for(&["a".to_string()]).unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].speed, 1000);
    }

    #[test]
    fn samples_come_back_ordered() {
        let store = MemoryStore::new();
        store.insert_sample(sample("b", "1", 30, 1)).unwrap();
        store.insert_sample(sample("a", "2", 20, 1)).unwrap();
        store.insert_sample(sample("a", "1", 50, 1)).unwrap();
        store.insert_sample(sample("a", "1", 10, 1)).unwrap();

        let samples = store
            .samples_for(&["a".to_string(), "b".to_string()])
            .unwrap();
        let order: Vec<(&str, &str, u64)> = samples
            .iter()
            .map(|s| (s.device_name.as_str(), s.iface_name.as_str(), s.timestamp))
            .collect();
        assert_eq!(
            order,
            vec![("a", "1", 10), ("a", "1", 50), ("a", "2", 20), ("b", "1", 30)]
        );
    }

    #[test]
    fn latest_sample_per_interface() {
        let store = MemoryStore::new();
        store.insert_sample(sample("a", "1", 10, 100)).unwrap();
        store.insert_sample(sample("a", "1", 20, 1000)).unwrap();
        store.insert_sample(sample("a", "2", 5, 10)).unwrap();

        let latest = store.latest_samples().unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].speed, 1000);
        assert_eq!(latest[1].speed, 10);
    }

    #[test]
    fn delete_device_cascades() {
        let store = MemoryStore::new();
        store.merge_node("a", &NodeUpdate::new()).unwrap();
        store.merge_node("b", &NodeUpdate::new()).unwrap();
        let link = Link::new("a", "1", "b", "2");
        store.upsert_link(link.clone()).unwrap();
        store.upsert_link(link.reversed()).unwrap();
        store.upsert_link(Link::new("b", "3", "c", "1")).unwrap();
        store.insert_sample(sample("a", "1", 10, 1)).unwrap();
        store.insert_sample(sample("b", "2", 10, 1)).unwrap();
        store
            .upsert_utilization(UtilizationSnapshot::empty("a", "1"))
            .unwrap();

        assert!(store.delete_device("a").unwrap());

        assert!(store.node("a").unwrap().is_none());
        assert_eq!(store.links().unwrap().len(), 1);
        assert!(store.samples_for(&["a".to_string()]).unwrap().is_empty());
        assert_eq!(store.samples_for(&["b".to_string()]).unwrap().len(), 1);
        assert!(store.all_utilization().unwrap().is_empty());
    }

    #[test]
    fn flush_and_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("automap.json");

        let store = MemoryStore::open(&path).unwrap();
        store.merge_node("a", &NodeUpdate::new().placement(2, 3)).unwrap();
        store.upsert_link(Link::new("a", "1", "b", "2")).unwrap();
        store.insert_sample(sample("a", "1", 10, 1000)).unwrap();
        store
            .upsert_utilization(UtilizationSnapshot::empty("a", "1"))
            .unwrap();
        store.flush().unwrap();

        let reopened = MemoryStore::open(&path).unwrap();
        let node = reopened.node("a").unwrap().unwrap();
        assert_eq!((node.groupx, node.groupy), (2, 3));
        assert_eq!(reopened.links().unwrap().len(), 1);
        assert_eq!(reopened.latest_samples().unwrap()[0].speed, 1000);
        assert_eq!(reopened.all_utilization().unwrap().len(), 1);
        assert!(!dir.path().join("automap.json.tmp").exists());
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(
            MemoryStore::open(&path),
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn flush_without_path_is_noop() {
        assert!(MemoryStore::new().flush().is_ok());
    }
}
