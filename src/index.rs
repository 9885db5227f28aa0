use crate::feed::VehicleRecord;
use std::collections::HashMap;
use tracing::debug;

/// Vehicle records of the most recent successful fetch, keyed by vehicle id.
///
/// Iteration follows the order in which each id first appeared in the batch;
/// a duplicated id keeps that position but takes the later record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VehicleIndex {
    records: Vec<VehicleRecord>,
    positions: HashMap<String, usize>,
}

impl VehicleIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index from a decoded batch. Records without a vehicle id are dropped.
    pub fn from_batch(batch: Vec<VehicleRecord>) -> Self {
        let mut index = Self {
            records: Vec::with_capacity(batch.len()),
            positions: HashMap::with_capacity(batch.len()),
        };
        for record in batch {
            let Some(id) = record.vehicle_id.clone() else {
                debug!(?record, "Skipping vehicle record without id");
                continue;
            };
            match index.positions.get(&id) {
                Some(&position) => index.records[position] = record,
                None => {
                    index.positions.insert(id, index.records.len());
                    index.records.push(record);
                }
            }
        }
        index
    }

    pub fn get(&self, vehicle_id: &str) -> Option<&VehicleRecord> {
        self.positions
            .get(vehicle_id)
            .and_then(|&position| self.records.get(position))
    }

    pub fn iter(&self) -> impl Iterator<Item = &VehicleRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
