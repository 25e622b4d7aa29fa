use std::collections::{HashMap, HashSet};

use crate::model::{
    ProgressEvent, ProgressSender, ResultDetail, ResultStatus, TestIdentity, TestResult,
};

/// Per-test state accumulated while a runner reports, correlated back to the requested tests.
pub struct ResultTable {
    project: String,
    requested: Vec<TestIdentity>,
    /// Same identities as `requested`, for lookup of the requested form (with its source URI).
    requested_set: HashSet<TestIdentity>,
    entries: HashMap<TestIdentity, ResultDetail>,
    /// Identities in the order the runner first mentioned them.
    order: Vec<TestIdentity>,
    progress: Option<ProgressSender>,
}

impl ResultTable {
    pub fn new(
        project: impl Into<String>,
        requested: Vec<TestIdentity>,
        progress: Option<ProgressSender>,
    ) -> Self {
        let mut requested_set = HashSet::with_capacity(requested.len());
        let requested = requested
            .into_iter()
            .filter(|identity| requested_set.insert(identity.clone()))
            .collect();
        Self {
            project: project.into(),
            requested,
            requested_set,
            entries: HashMap::new(),
            order: Vec::new(),
            progress,
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    /// The identity for `container`/`method` in this table's project, carrying the source URI
    /// of the matching requested test if there is one.
    pub fn identity(&self, container: &str, method: &str) -> TestIdentity {
        let probe = TestIdentity::new(self.project.as_str(), container, method);
        match self.requested_set.get(&probe) {
            Some(requested) => requested.clone(),
            None => probe,
        }
    }

    pub fn identity_from_full_name(&self, full_name: &str) -> TestIdentity {
        let parsed = TestIdentity::from_full_name(self.project.as_str(), full_name);
        self.identity(&parsed.container, &parsed.method)
    }

    /// Records that `identity` started, discarding anything previously recorded for it.
    pub fn start(&mut self, identity: &TestIdentity) {
        *self.entry(identity) = ResultDetail::default();
        self.emit(ProgressEvent::Started(identity.clone()));
    }

    /// The detail recorded for `identity`, created as `Running` if the runner never started it.
    pub fn entry(&mut self, identity: &TestIdentity) -> &mut ResultDetail {
        if !self.entries.contains_key(identity) {
            self.order.push(identity.clone());
        }
        self.entries.entry(identity.clone()).or_default()
    }

    pub fn get(&self, identity: &TestIdentity) -> Option<&ResultDetail> {
        self.entries.get(identity)
    }

    /// Announces the current status of `identity`, if it has reached one.
    pub fn finished(&self, identity: &TestIdentity) {
        if let Some(detail) = self.entries.get(identity) {
            if detail.status.is_terminal() {
                self.emit(ProgressEvent::Finished(identity.clone(), detail.status));
            }
        }
    }

    pub fn failure(&self, identity: &TestIdentity, message: impl Into<String>) {
        let location = Some(identity.source_uri.clone()).filter(|uri| !uri.is_empty());
        self.emit(ProgressEvent::Failure {
            identity: identity.clone(),
            message: message.into(),
            location,
        });
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(progress) = &self.progress {
            // The listener going away doesn't change what the run produces.
            let _ = progress.send(event);
        }
    }

    /// Produces the final result set.
    ///
    /// Requested tests come first, in request order, followed by anything else the runner
    /// reported. Tests without a terminal status are `Skipped`. A requested container that the
    /// runner only reported methods of is represented by those methods.
    pub fn finalize(mut self, was_cancelled: bool, processed_any: bool) -> Vec<TestResult> {
        if was_cancelled && !processed_any {
            return Vec::new();
        }

        let reported_containers: HashSet<String> = self
            .order
            .iter()
            .filter(|identity| !identity.is_container())
            .map(|identity| identity.container.clone())
            .collect();

        let mut results = Vec::with_capacity(self.requested.len().max(self.order.len()));
        for identity in std::mem::take(&mut self.requested) {
            let detail = match self.entries.remove(&identity) {
                Some(detail) => detail,
                None if identity.is_container()
                    && reported_containers.contains(&identity.container) =>
                {
                    continue
                }
                None => ResultDetail::default(),
            };
            results.push(self.finalized(identity, detail));
        }

        for identity in std::mem::take(&mut self.order) {
            if let Some(detail) = self.entries.remove(&identity) {
                results.push(self.finalized(identity, detail));
            }
        }

        results
    }

    fn finalized(&self, identity: TestIdentity, mut detail: ResultDetail) -> TestResult {
        if !detail.status.is_terminal() {
            detail.status = ResultStatus::Skipped;
            self.emit(ProgressEvent::Finished(identity.clone(), ResultStatus::Skipped));
        }
        TestResult { identity, detail }
    }
}
