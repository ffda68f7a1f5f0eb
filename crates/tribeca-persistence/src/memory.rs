//! In-memory store, for simulation and tests.

use crate::error::PersistenceResult;
use crate::store::{Persister, Repository};
use parking_lot::Mutex;

/// Keeps every saved record in a vector.
pub struct MemoryStore<T> {
    records: Mutex<Vec<T>>,
}

impl<T> Default for MemoryStore<T> {
    fn default() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
        }
    }
}

impl<T: Clone> MemoryStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<T>) -> Self {
        Self {
            records: Mutex::new(records),
        }
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl<T: Clone + Send> Persister<T> for MemoryStore<T> {
    fn load_all(&self, limit: usize) -> PersistenceResult<Vec<T>> {
        let records = self.records.lock();
        let skip = records.len().saturating_sub(limit);
        Ok(records[skip..].to_vec())
    }

    fn save(&self, record: &T) -> PersistenceResult<()> {
        self.records.lock().push(record.clone());
        Ok(())
    }
}

impl<T: Clone + Send> Repository<T> for MemoryStore<T> {
    fn load_latest(&self) -> PersistenceResult<Option<T>> {
        Ok(self.records.lock().last().cloned())
    }

    fn save(&self, record: &T) -> PersistenceResult<()> {
        Persister::save(self, record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_all_keeps_most_recent() {
        let store = MemoryStore::with_records(vec![1, 2, 3, 4]);
        assert_eq!(store.load_all(2).unwrap(), vec![3, 4]);
        assert_eq!(store.load_all(10).unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_latest() {
        let store = MemoryStore::<u32>::new();
        assert_eq!(store.load_latest().unwrap(), None);
        Repository::save(&store, &7).unwrap();
        Repository::save(&store, &9).unwrap();
        assert_eq!(store.load_latest().unwrap(), Some(9));
        assert_eq!(store.len(), 2);
    }
}
