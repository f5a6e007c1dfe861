//! Lenient decoding of the engine's state snapshot.
//!
//! Expected shape:
//!
//! ```json
//! {
//!   "blocks": {
//!     "3": { "name": "enc", "type": "scalarTransformer",
//!            "num_bits": 64, "active_bits": [4, 5, 6], "num_active": 3 }
//!   },
//!   "connections": [{ "source": 3, "target": 4, "kind": "input" }]
//! }
//! ```
//!
//! Decoding never fails. A handle whose entry is missing or malformed gets an
//! all-zero state of its declared width and is listed in
//! [`DecodedState::degraded`].

use crate::engine::{EngineHandle, HandleRegistry};
use serde_json::Value;
use std::collections::HashMap;

/// Sparse active set of one block
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BlockState {
    pub num_bits: usize,
    /// Sorted, deduplicated, all `< num_bits`
    pub active_bits: Vec<u32>,
}

impl BlockState {
    pub fn zeros(num_bits: usize) -> Self {
        Self {
            num_bits,
            active_bits: Vec::new(),
        }
    }

    pub fn num_active(&self) -> usize {
        self.active_bits.len()
    }

    /// Fraction of bits that are active, 0 for a zero-width block
    pub fn active_fraction(&self) -> f64 {
        if self.num_bits == 0 {
            0.0
        } else {
            self.active_bits.len() as f64 / self.num_bits as f64
        }
    }

    /// Dense 0/1 representation
    pub fn to_bitfield(&self) -> Vec<u8> {
        let mut bits = vec![0u8; self.num_bits];
        for &i in &self.active_bits {
            if let Some(bit) = bits.get_mut(i as usize) {
                *bit = 1;
            }
        }
        bits
    }
}

#[derive(Debug, Clone, Default)]
pub struct DecodedState {
    pub blocks: HashMap<EngineHandle, BlockState>,
    /// Handles that fell back to a zero state
    pub degraded: Vec<EngineHandle>,
}

impl DecodedState {
    pub fn block(&self, handle: EngineHandle) -> Option<&BlockState> {
        self.blocks.get(&handle)
    }
}

/// Decode `json` for every live handle in `handles`
pub fn decode_state(json: &str, handles: &HandleRegistry) -> DecodedState {
    let root: Option<Value> = match serde_json::from_str(json) {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!("Engine state snapshot is not valid JSON: {}", e);
            None
        }
    };
    let blocks = root.as_ref().and_then(|r| r.get("blocks"));

    let mut decoded = DecodedState::default();
    for (handle, info) in handles.iter() {
        let declared = info.num_bits as usize;
        let entry = blocks.and_then(|b| b.get(handle.to_string()));
        match entry.and_then(|e| decode_block(e, declared)) {
            Some(state) => {
                decoded.blocks.insert(handle, state);
            }
            None => {
                tracing::debug!("Missing or malformed state for handle {} ({})", handle, info.node);
                decoded.degraded.push(handle);
                decoded.blocks.insert(handle, BlockState::zeros(declared));
            }
        }
    }
    decoded
}

/// `None` when the entry disagrees with the declared width or holds an
/// out-of-range index
fn decode_block(entry: &Value, declared_bits: usize) -> Option<BlockState> {
    if let Some(v) = entry.get("num_bits") {
        let reported = v.as_u64()?;
        if reported != declared_bits as u64 {
            tracing::debug!("Engine reports {} bits, declared {}", reported, declared_bits);
            return None;
        }
    }
    let mut active_bits = entry
        .get("active_bits")?
        .as_array()?
        .iter()
        .map(|v| {
            v.as_u64()
                .filter(|&i| i < declared_bits as u64)
                .and_then(|i| u32::try_from(i).ok())
        })
        .collect::<Option<Vec<u32>>>()?;
    active_bits.sort_unstable();
    active_bits.dedup();
    Some(BlockState {
        num_bits: declared_bits,
        active_bits,
    })
}
