//! The read-only fleet snapshot the evaluator queries.
//!
//! A cluster maps keys to ordered value lists; a group is a single ordered
//! value list. The trait is the seam to whatever holds the real data; the
//! evaluator only borrows it and never writes through it. `NotFound` is a
//! soft miss the evaluator turns into an empty list, `Transient` aborts the
//! query.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("not found")]
    NotFound,
    #[error("transient state failure: {0}")]
    Transient(String),
}

pub type StateResult = std::result::Result<Vec<String>, StateError>;

pub trait State {
    fn cluster_names(&self) -> StateResult;
    fn cluster_keys(&self, name: &str) -> StateResult;
    fn cluster_lookup(&self, name: &str, key: &str) -> StateResult;
    fn group_names(&self) -> StateResult;
    fn group_values(&self, name: &str) -> StateResult;
    /// Reverse lookup: names of groups whose values contain `value`.
    fn groups_containing(&self, value: &str) -> StateResult;
}

/// In-memory snapshot preserving insertion order, used by the binary and the
/// test suites.
#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    clusters: Vec<MemoryCluster>,
    groups: Vec<(String, Vec<String>)>,
}

#[derive(Debug, Clone)]
struct MemoryCluster {
    name: String,
    keys: Vec<(String, Vec<String>)>,
}

impl MemoryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set one key of a cluster, creating the cluster on first use.
    pub fn put_cluster_key(&mut self, cluster: &str, key: &str, values: &[&str]) {
        let values: Vec<String> = values.iter().map(|v| (*v).to_owned()).collect();
        let index = match self.clusters.iter().position(|c| c.name == cluster) {
            Some(index) => index,
            None => {
                self.clusters.push(MemoryCluster {
                    name: cluster.to_owned(),
                    keys: Vec::new(),
                });
                self.clusters.len() - 1
            }
        };
        let entry = &mut self.clusters[index];
        match entry.keys.iter().position(|(k, _)| k == key) {
            Some(slot) => entry.keys[slot].1 = values,
            None => entry.keys.push((key.to_owned(), values)),
        }
    }

    pub fn put_group(&mut self, name: &str, values: &[&str]) {
        let values: Vec<String> = values.iter().map(|v| (*v).to_owned()).collect();
        match self.groups.iter().position(|(n, _)| n == name) {
            Some(slot) => self.groups[slot].1 = values,
            None => self.groups.push((name.to_owned(), values)),
        }
    }

    fn cluster(&self, name: &str) -> Option<&MemoryCluster> {
        self.clusters.iter().find(|c| c.name == name)
    }
}

impl State for MemoryState {
    fn cluster_names(&self) -> StateResult {
        Ok(self.clusters.iter().map(|c| c.name.clone()).collect())
    }

    fn cluster_keys(&self, name: &str) -> StateResult {
        let cluster = self.cluster(name).ok_or(StateError::NotFound)?;
        Ok(cluster.keys.iter().map(|(k, _)| k.clone()).collect())
    }

    fn cluster_lookup(&self, name: &str, key: &str) -> StateResult {
        let cluster = self.cluster(name).ok_or(StateError::NotFound)?;
        cluster
            .keys
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, values)| values.clone())
            .ok_or(StateError::NotFound)
    }

    fn group_names(&self) -> StateResult {
        Ok(self.groups.iter().map(|(n, _)| n.clone()).collect())
    }

    fn group_values(&self, name: &str) -> StateResult {
        self.groups
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, values)| values.clone())
            .ok_or(StateError::NotFound)
    }

    fn groups_containing(&self, value: &str) -> StateResult {
        Ok(self
            .groups
            .iter()
            .filter(|(_, values)| values.iter().any(|v| v == value))
            .map(|(n, _)| n.clone())
            .collect())
    }
}
