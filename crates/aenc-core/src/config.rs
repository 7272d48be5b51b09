//! Engine configuration and parameter validation.

use crate::error::{AencError, Result};
use serde::{Deserialize, Serialize};

/// Target codec.
///
/// Governs the intra type used at unforced scene changes: AVC inserts an IDR,
/// HEVC inserts a plain I (CRA permits open-GOP recovery).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Codec {
    /// H.264/AVC.
    Avc,
    /// H.265/HEVC.
    Hevc,
}

/// Luma plane layout the scene analyzer should assume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorFormat {
    /// Planar Y followed by interleaved UV.
    Nv12,
    /// Packed 8-bit RGBA.
    Rgb4,
}

/// Engine configuration.
///
/// GOP parameters are display-order frame distances. `max_mini_gop_size`
/// bounds the reorder window and therefore the deepest hierarchical-B layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AencConfig {
    pub codec: Codec,
    pub color_format: ColorFormat,
    /// Coded frame width in pixels.
    pub frame_width: u32,
    /// Coded frame height in pixels.
    pub frame_height: u32,
    /// Source width before any scaling (used by the P-bits model).
    pub src_frame_width: u32,
    /// Source height before any scaling (used by the P-bits model).
    pub src_frame_height: u32,
    /// Luma row pitch in bytes.
    pub pitch: u32,
    /// Upper bound on mini-GOP length, one of 1, 2, 4, 8.
    pub max_mini_gop_size: u32,
    /// No I frame is placed closer than this to the previous one.
    pub min_gop_size: u32,
    /// An I frame is forced once a GOP grows to this length.
    pub max_gop_size: u32,
    /// An IDR is forced once the IDR interval reaches this length.
    pub max_idr_dist: u32,
    /// Nominal GOP length; drives strict-I placement and the P-bits model gate.
    pub gop_pic_size: u32,
    /// Place I/IDR only at `gop_pic_size` multiples, ignoring scene changes.
    pub strict_i_frame: bool,
    /// Adaptive long-term reference.
    pub altr: bool,
    /// Adaptive key-P reference.
    pub aref: bool,
    /// Adaptive perceptual QP.
    pub apq: bool,
    /// Adaptive mini-GOP sizing.
    pub agop: bool,
}

impl AencConfig {
    /// Check the GOP parameter constraints.
    ///
    /// The I-frame decision logic assumes these hold; they are rejected here
    /// so it never has to re-check them per frame.
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.max_mini_gop_size, 1 | 2 | 4 | 8) {
            return Err(AencError::InvalidParams(format!(
                "max_mini_gop_size must be 1, 2, 4 or 8, got {}",
                self.max_mini_gop_size
            )));
        }

        if self.min_gop_size >= self.max_gop_size
            || self.max_gop_size > self.max_idr_dist
            || self.max_idr_dist % self.max_gop_size != 0
        {
            return Err(AencError::InvalidParams(format!(
                "GOP sizes must satisfy min < max <= idr_dist and idr_dist % max == 0, \
                 got min {} max {} idr_dist {}",
                self.min_gop_size, self.max_gop_size, self.max_idr_dist
            )));
        }

        if self.min_gop_size > self.max_gop_size - self.max_mini_gop_size {
            return Err(AencError::InvalidParams(format!(
                "min_gop_size {} leaves no room for a mini-GOP of {} before max_gop_size {}",
                self.min_gop_size, self.max_mini_gop_size, self.max_gop_size
            )));
        }

        if self.gop_pic_size == 0 {
            return Err(AencError::InvalidParams(
                "gop_pic_size must be non-zero".into(),
            ));
        }

        Ok(())
    }
}

impl Default for AencConfig {
    fn default() -> Self {
        Self {
            codec: Codec::Avc,
            color_format: ColorFormat::Nv12,
            frame_width: 1920,
            frame_height: 1080,
            src_frame_width: 1920,
            src_frame_height: 1080,
            pitch: 1920,
            max_mini_gop_size: 8,
            min_gop_size: 8,
            max_gop_size: 32,
            max_idr_dist: 128,
            gop_pic_size: 32,
            strict_i_frame: false,
            altr: false,
            aref: false,
            apq: false,
            agop: false,
        }
    }
}
