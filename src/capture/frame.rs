use crate::error::{BridgeError, Result};

/// Raw frame handed over by the engine. Borrowed for the duration of the
/// callback only; anything kept past that point must be copied out.
#[derive(Debug, Clone, Copy)]
pub struct RawFrame<'a> {
    pub channel_id: i32,
    pub width: u32,
    pub height: u32,
    pub data: &'a [u8],
    /// Engine-defined capture time
    pub timestamp: u64,
}

/// Plane geometry of a planar YUV 4:2:0 (I420) buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Yuv420Layout {
    pub width: usize,
    pub height: usize,
    /// Size of the Y plane, also the offset of the U plane
    pub luma_size: usize,
    /// Size of each chroma plane
    pub chroma_size: usize,
    total_size: usize,
}

impl Yuv420Layout {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let invalid = || BridgeError::InvalidDimensions {
            width: width.into(),
            height: height.into(),
        };
        if width == 0 || height == 0 {
            return Err(invalid());
        }

        let luma_size = (width as usize)
            .checked_mul(height as usize)
            .ok_or_else(invalid)?;
        let chroma_size = luma_size / 4;
        let total_size = chroma_size
            .checked_mul(2)
            .and_then(|chroma| chroma.checked_add(luma_size))
            .ok_or_else(invalid)?;
        let width = width as usize;
        let height = height as usize;

        Ok(Self {
            width,
            height,
            luma_size,
            chroma_size,
            total_size,
        })
    }

    /// Expected byte length: `w*h + 2*(w*h/4)`
    pub fn frame_size(&self) -> usize {
        self.total_size
    }

    pub fn u_offset(&self) -> usize {
        self.luma_size
    }

    pub fn v_offset(&self) -> usize {
        self.luma_size + self.chroma_size
    }

    /// Chroma sample shared by the 2x2 luma block containing (x, y)
    pub fn chroma_index(&self, x: usize, y: usize) -> usize {
        (y / 2) * (self.width / 2) + (x / 2)
    }
}
