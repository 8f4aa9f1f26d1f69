//! In-memory instance repository for lifecycle tests
//!
//! Records every create and delete call and plays back scripted provider
//! states, completion markers, failures and delays.

use async_trait::async_trait;
use ember_compute::{ComputeError, InstanceSpec, Result};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use super::{DeleteAck, InstanceRepository, ProviderState};

#[derive(Default)]
struct State {
    existing: usize,
    created: Vec<InstanceSpec>,
    live: HashSet<String>,
    deletes: HashMap<String, usize>,

    image_errors: VecDeque<u16>,
    create_errors: VecDeque<u16>,
    create_delay: Option<Duration>,

    wait_errors: VecDeque<u16>,
    wait_exhausted: Option<String>,
    wait_delay: Option<Duration>,
    waits: usize,

    states: VecDeque<ProviderState>,
    state_errors: VecDeque<u16>,
    state_delay: Option<Duration>,
    state_polls: usize,

    marker: Option<(usize, String)>,
    marker_polls: usize,

    delete_errors: VecDeque<u16>,
    delete_delay: Option<Duration>,
}

pub struct FakeInstanceRepository {
    state: Mutex<State>,
}

impl FakeInstanceRepository {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }

    /// Managed instances that exist before the test starts
    pub fn with_existing(self, count: usize) -> Self {
        self.state.lock().unwrap().existing = count;
        self
    }

    /// Registers an instance as already created
    pub fn add_live(&self, name: &str) {
        self.state.lock().unwrap().live.insert(name.to_string());
    }

    pub fn fail_image_lookup(&self, statuses: &[u16]) {
        self.state.lock().unwrap().image_errors.extend(statuses);
    }

    pub fn fail_create(&self, statuses: &[u16]) {
        self.state.lock().unwrap().create_errors.extend(statuses);
    }

    /// Accepted inserts end with a resource exhaustion error
    pub fn exhaust_zone(&self, message: &str) {
        self.state.lock().unwrap().wait_exhausted = Some(message.to_string());
    }

    /// Delays the insert request itself, before it is accepted
    pub fn delay_create(&self, delay: Duration) {
        self.state.lock().unwrap().create_delay = Some(delay);
    }

    /// Failures returned by the next insert operation reads
    pub fn fail_insert_wait(&self, statuses: &[u16]) {
        self.state.lock().unwrap().wait_errors.extend(statuses);
    }

    /// Delays completion of accepted inserts
    pub fn delay_insert_wait(&self, delay: Duration) {
        self.state.lock().unwrap().wait_delay = Some(delay);
    }

    /// Provider states returned by successive polls; the last one sticks
    pub fn script_states(&self, states: &[ProviderState]) {
        self.state.lock().unwrap().states = states.iter().copied().collect();
    }

    /// Failures returned by the next state reads, before the script resumes
    pub fn fail_polls(&self, statuses: &[u16]) {
        self.state.lock().unwrap().state_errors.extend(statuses);
    }

    pub fn delay_polls(&self, delay: Duration) {
        self.state.lock().unwrap().state_delay = Some(delay);
    }

    /// The marker becomes visible once `polls` marker reads have returned nothing
    pub fn marker_after(&self, polls: usize, value: &str) {
        self.state.lock().unwrap().marker = Some((polls, value.to_string()));
    }

    pub fn fail_delete(&self, statuses: &[u16]) {
        self.state.lock().unwrap().delete_errors.extend(statuses);
    }

    pub fn delay_delete(&self, delay: Duration) {
        self.state.lock().unwrap().delete_delay = Some(delay);
    }

    pub fn created(&self) -> Vec<InstanceSpec> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn create_count(&self) -> usize {
        self.state.lock().unwrap().created.len()
    }

    pub fn delete_count(&self, name: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .deletes
            .get(name)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_deletes(&self) -> usize {
        self.state.lock().unwrap().deletes.values().sum()
    }

    pub fn live_instances(&self) -> usize {
        self.state.lock().unwrap().live.len()
    }

    pub fn insert_waits(&self) -> usize {
        self.state.lock().unwrap().waits
    }

    pub fn state_polls(&self) -> usize {
        self.state.lock().unwrap().state_polls
    }
}

async fn pause(delay: Option<Duration>) {
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
}

#[async_trait]
impl InstanceRepository for FakeInstanceRepository {
    async fn resolve_image(&self, project: &str, family: &str) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        if let Some(status) = state.image_errors.pop_front() {
            return Err(ComputeError::api_error(status, "image lookup failed"));
        }
        Ok(format!(
            "https://compute.googleapis.com/compute/v1/projects/{}/global/images/{}-v1",
            project, family
        ))
    }

    async fn count_managed_instances(&self) -> Result<usize> {
        let state = self.state.lock().unwrap();
        Ok(state.existing + state.live.len())
    }

    async fn insert_instance(&self, spec: &InstanceSpec) -> Result<String> {
        let delay = self.state.lock().unwrap().create_delay;
        pause(delay).await;

        let mut state = self.state.lock().unwrap();
        if let Some(status) = state.create_errors.pop_front() {
            return Err(ComputeError::api_error(status, "insert rejected"));
        }
        if state.live.contains(&spec.name) {
            return Err(ComputeError::api_error(409, "instance already exists"));
        }
        state.created.push(spec.clone());
        state.live.insert(spec.name.clone());
        Ok(format!("operation-insert-{}", spec.name))
    }

    async fn wait_for_insert(&self, operation: &str) -> Result<()> {
        let delay = self.state.lock().unwrap().wait_delay;
        pause(delay).await;

        let mut state = self.state.lock().unwrap();
        state.waits += 1;
        if let Some(status) = state.wait_errors.pop_front() {
            return Err(ComputeError::api_error(status, "operation read failed"));
        }
        if let Some(message) = state.wait_exhausted.clone() {
            if let Some(name) = operation.strip_prefix("operation-insert-") {
                state.live.remove(name);
            }
            return Err(ComputeError::ResourcesExhausted(message));
        }
        Ok(())
    }

    async fn instance_state(&self, name: &str) -> Result<ProviderState> {
        let delay = self.state.lock().unwrap().state_delay;
        pause(delay).await;

        let mut state = self.state.lock().unwrap();
        state.state_polls += 1;
        if let Some(status) = state.state_errors.pop_front() {
            return Err(ComputeError::api_error(status, "state read failed"));
        }
        if !state.live.contains(name) {
            return Ok(ProviderState::Missing);
        }
        let next = if state.states.len() > 1 {
            state.states.pop_front()
        } else {
            state.states.front().copied()
        };
        Ok(next.unwrap_or(ProviderState::Active))
    }

    async fn completion_marker(&self, _name: &str) -> Result<Option<String>> {
        let mut state = self.state.lock().unwrap();
        state.marker_polls += 1;
        let polls = state.marker_polls;
        Ok(state
            .marker
            .as_ref()
            .filter(|(after, _)| polls > *after)
            .map(|(_, value)| value.clone()))
    }

    async fn delete_instance(&self, name: &str) -> Result<DeleteAck> {
        let delay = self.state.lock().unwrap().delete_delay;
        pause(delay).await;

        let mut state = self.state.lock().unwrap();
        *state.deletes.entry(name.to_string()).or_insert(0) += 1;
        if let Some(status) = state.delete_errors.pop_front() {
            return Err(ComputeError::api_error(status, "delete rejected"));
        }
        if state.live.remove(name) {
            Ok(DeleteAck::Requested)
        } else {
            Ok(DeleteAck::AlreadyGone)
        }
    }
}
