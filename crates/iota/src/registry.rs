//! Endpoint registry: identity → running worker.
//!
//! Owned by the coordinator task, which serializes every access, so there is
//! no locking here.

use std::collections::HashMap;

use crate::endpoint::EndpointId;

/// The worker currently serving an endpoint.
///
/// Replaced wholesale on every reload, never patched in place.
#[derive(Debug)]
pub struct WorkerRecord<H> {
    pub port: u16,
    pub handle: H,
    /// Name of the form value carrying the call argument.
    pub parameter: String,
    /// Monotonic per-registry counter; distinguishes successive workers of one endpoint.
    pub generation: u64,
}

#[derive(Debug)]
pub struct Registry<H> {
    records: HashMap<EndpointId, WorkerRecord<H>>,
}

impl<H> Registry<H> {
    pub fn new() -> Self {
        Self {
            records: HashMap::new(),
        }
    }

    pub fn lookup(&self, id: &EndpointId) -> Option<&WorkerRecord<H>> {
        self.records.get(id)
    }

    /// Insert or replace; returns the record that was displaced.
    pub fn put(&mut self, id: EndpointId, record: WorkerRecord<H>) -> Option<WorkerRecord<H>> {
        self.records.insert(id, record)
    }

    pub fn remove(&mut self, id: &EndpointId) -> Option<WorkerRecord<H>> {
        self.records.remove(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EndpointId, &WorkerRecord<H>)> {
        self.records.iter()
    }

    pub fn drain(&mut self) -> impl Iterator<Item = (EndpointId, WorkerRecord<H>)> + '_ {
        self.records.drain()
    }
}

impl<H> Default for Registry<H> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(port: u16, generation: u64) -> WorkerRecord<&'static str> {
        WorkerRecord {
            port,
            handle: "proc",
            parameter: "name".to_string(),
            generation,
        }
    }

    #[test]
    fn put_replaces_existing_record() {
        let mut registry = Registry::new();
        let id = EndpointId::new("alice", "greet", "Hi").unwrap();

        assert!(registry.put(id.clone(), record(9000, 1)).is_none());
        let displaced = registry.put(id.clone(), record(9001, 2)).unwrap();

        assert_eq!(displaced.port, 9000);
        assert_eq!(registry.lookup(&id).unwrap().port, 9001);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn records_are_independent_per_identity() {
        let mut registry = Registry::new();
        let a = EndpointId::new("alice", "greet", "Hi").unwrap();
        let b = EndpointId::new("bob", "greet", "Hi").unwrap();

        registry.put(a.clone(), record(9000, 1));
        registry.put(b.clone(), record(9001, 2));
        registry.remove(&a);

        assert!(registry.lookup(&a).is_none());
        assert_eq!(registry.lookup(&b).unwrap().generation, 2);
    }

    #[test]
    fn drain_empties_registry() {
        let mut registry = Registry::new();
        registry.put(EndpointId::new("a", "p", "F").unwrap(), record(1, 1));
        registry.put(EndpointId::new("b", "p", "F").unwrap(), record(2, 2));

        assert_eq!(registry.drain().count(), 2);
        assert!(registry.is_empty());
    }
}
