use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

/// One node of a detection-region grid. Layout matches the engine's
/// `{ int x; int y; }` so foreign buffers can be viewed as `&[Roi]`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Roi {
    pub x: i32,
    pub y: i32,
}

impl Roi {
    /// Marks an unused slot in a fixed-capacity grid
    pub const UNSET: Roi = Roi { x: -1, y: -1 };

    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn is_unset(&self) -> bool {
        *self == Self::UNSET
    }
}

impl Default for Roi {
    fn default() -> Self {
        Self::UNSET
    }
}

/// Ordered nodes describing one detection region's shape
pub type RoiGroup = Vec<Roi>;

/// Rebuild a row-major `group_count x node_count` grid into owned groups.
///
/// Entry `i * node_count + j` is node `j` of group `i`. The result holds
/// value copies, so it outlives the engine-owned source buffer.
pub fn assemble(flat: &[Roi], group_count: i32, node_count: i32) -> Result<Vec<RoiGroup>> {
    if group_count <= 0 || node_count <= 0 {
        return Ok(Vec::new());
    }

    let groups = group_count as usize;
    let nodes = node_count as usize;
    let needed = groups.checked_mul(nodes).ok_or(BridgeError::IndexOutOfRange {
        index: usize::MAX,
        len: flat.len(),
    })?;

    if flat.len() < needed {
        return Err(BridgeError::IndexOutOfRange {
            index: needed - 1,
            len: flat.len(),
        });
    }

    Ok(flat[..needed]
        .chunks_exact(nodes)
        .map(<[Roi]>::to_vec)
        .collect())
}
