//! Per-node buffers read by the UI.
//!
//! Each node gets a bounded time series of readouts and the latest dense
//! bitfield. Bitfields have no history: every tick replaces them wholesale.

use crate::graph::NodeId;
use crate::types::{RingBuffer, Sample, DEFAULT_MAX_POINTS};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct VisualizationBuffer {
    series: HashMap<NodeId, RingBuffer<Sample>>,
    bitfields: HashMap<NodeId, Vec<u8>>,
    max_points: usize,
}

impl Default for VisualizationBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_POINTS)
    }
}

impl VisualizationBuffer {
    pub fn new(max_points: usize) -> Self {
        Self {
            series: HashMap::new(),
            bitfields: HashMap::new(),
            max_points: max_points.max(1),
        }
    }

    pub fn max_points(&self) -> usize {
        self.max_points
    }

    /// Change the series capacity, keeping the newest samples of each node
    pub fn set_max_points(&mut self, max_points: usize) {
        self.max_points = max_points.max(1);
        for buffer in self.series.values_mut() {
            buffer.resize(self.max_points);
        }
    }

    /// Append a readout; the oldest sample is dropped once full
    pub fn push_sample(&mut self, node: &NodeId, sample: Sample) {
        let max_points = self.max_points;
        self.series
            .entry(node.clone())
            .or_insert_with(|| RingBuffer::new(max_points))
            .push(sample);
    }

    /// Replace the node's bitfield
    pub fn set_bitfield(&mut self, node: &NodeId, bits: Vec<u8>) {
        self.bitfields.insert(node.clone(), bits);
    }

    pub fn series(&self, node: &NodeId) -> Option<&RingBuffer<Sample>> {
        self.series.get(node)
    }

    pub fn latest(&self, node: &NodeId) -> Option<Sample> {
        self.series.get(node).and_then(|s| s.last().copied())
    }

    pub fn bitfield(&self, node: &NodeId) -> Option<&[u8]> {
        self.bitfields.get(node).map(Vec::as_slice)
    }

    /// Forget everything recorded for one node
    pub fn clear_node(&mut self, node: &NodeId) {
        self.series.remove(node);
        self.bitfields.remove(node);
    }

    pub fn clear(&mut self) {
        self.series.clear();
        self.bitfields.clear();
    }

    /// Nodes with any recorded data
    pub fn nodes(&self) -> impl Iterator<Item = &NodeId> {
        self.series
            .keys()
            .chain(self.bitfields.keys().filter(|n| !self.series.contains_key(*n)))
    }

    /// Owned copy for sending across the bridge
    pub fn snapshot(&self) -> VisualizationSnapshot {
        VisualizationSnapshot {
            series: self
                .series
                .iter()
                .map(|(node, buffer)| (node.clone(), buffer.to_vec()))
                .collect(),
            bitfields: self.bitfields.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VisualizationSnapshot {
    pub series: HashMap<NodeId, Vec<Sample>>,
    pub bitfields: HashMap<NodeId, Vec<u8>>,
}
