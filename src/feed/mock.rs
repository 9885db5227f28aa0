use super::{FetchError, VehicleFeed, VehicleRecord};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Scripted outcome of one fetch.
#[derive(Debug, Clone)]
pub enum MockFetch {
    Batch(Vec<VehicleRecord>),
    TransportError,
    Timeout,
    Status(u16),
    DecodeError,
}

impl MockFetch {
    fn into_result(self) -> Result<Vec<VehicleRecord>, FetchError> {
        match self {
            Self::Batch(records) => Ok(records),
            Self::TransportError => Err(FetchError::Transport("mock connection refused".to_string())),
            Self::Timeout => Err(FetchError::Timeout(30)),
            Self::Status(code) => Err(FetchError::Status(code)),
            Self::DecodeError => Err(FetchError::Decode("mock unexpected payload".to_string())),
        }
    }
}

/// In-memory feed replaying scripted fetches in order.
///
/// Once the script is exhausted the last outcome is repeated; an empty script
/// yields empty batches.
#[derive(Debug, Default)]
pub struct MockVehicleFeed {
    script: Mutex<VecDeque<MockFetch>>,
    last: Mutex<Option<MockFetch>>,
    fetches: AtomicUsize,
}

impl MockVehicleFeed {
    pub fn new(script: Vec<MockFetch>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn with_batch(records: Vec<VehicleRecord>) -> Self {
        Self::new(vec![MockFetch::Batch(records)])
    }

    /// Append an outcome to the end of the script.
    pub fn push(&self, outcome: MockFetch) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(outcome);
        }
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn next_outcome(&self) -> MockFetch {
        let next = self.script.lock().ok().and_then(|mut script| script.pop_front());
        let Ok(mut last) = self.last.lock() else {
            return MockFetch::TransportError;
        };
        match next {
            Some(outcome) => {
                *last = Some(outcome.clone());
                outcome
            }
            None => last.clone().unwrap_or(MockFetch::Batch(Vec::new())),
        }
    }
}

impl VehicleFeed for MockVehicleFeed {
    async fn fetch_vehicle_batch(&self) -> Result<Vec<VehicleRecord>, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.next_outcome().into_result()
    }
}
