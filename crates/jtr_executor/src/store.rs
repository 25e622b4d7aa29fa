//! Latest known result of every test that has run in this process.

use std::collections::HashMap;
use std::sync::Arc;

use jtr_protocol::{ResultDetail, TestIdentity, TestResult};
use parking_lot::RwLock;

type ResultsInUri = HashMap<TestIdentity, ResultDetail>;

/// Results keyed by the source file a test lives in, then by the test itself.
///
/// Cloning gives another handle onto the same results. Only the dispatcher writes; report
/// rendering may read at any time, and sees the previous run's results until the current one
/// stores its own.
#[derive(Default, Clone)]
pub struct ResultStore {
    results: Arc<RwLock<HashMap<String, ResultsInUri>>>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `results`, replacing whatever was known about the same tests.
    pub fn store(&self, results: &[TestResult]) {
        let mut store = self.results.write();
        for result in results {
            store
                .entry(result.identity.source_uri.clone())
                .or_default()
                .insert(result.identity.clone(), result.detail.clone());
        }
    }

    pub fn get(&self, source_uri: &str, identity: &TestIdentity) -> Option<ResultDetail> {
        self.results.read().get(source_uri)?.get(identity).cloned()
    }

    /// Whether any test in `source_uri` has a result.
    pub fn has(&self, source_uri: &str) -> bool {
        self.results.read().contains_key(source_uri)
    }

    pub fn len(&self) -> usize {
        self.results.read().values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forgets every result.
    pub fn dispose(&self) {
        self.results.write().clear();
    }
}
