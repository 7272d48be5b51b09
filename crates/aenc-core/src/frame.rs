//! Frame descriptors carried through the decision pipeline.

use crate::analyzer::{AnalysisToken, PMAP_SIZE};
use crate::error::{AencError, Result};
use serde::{Serialize, Serializer};
use std::fmt;

/// Maximum reference-list entries on an emitted frame.
pub const REF_LIST_CAP: usize = 8;
/// Maximum eviction entries on an emitted frame.
pub const REMOVE_FROM_DPB_CAP: usize = 8;

/// Coded-frame type.
///
/// A frame starts `Undef` and is assigned exactly once, either by the intra
/// decider or by mini-GOP layout. `Dummy` frames pad the reorder queue during
/// end-of-stream drain and never reach the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FrameType {
    /// Not yet decided.
    Undef,
    /// Instantaneous decoder refresh.
    Idr,
    /// Intra frame.
    I,
    /// Forward-predicted frame.
    P,
    /// Bi-predicted frame.
    B,
    /// End-of-stream padding, internal only.
    Dummy,
}

/// Internal frame descriptor, one per input frame.
///
/// Created at intake, mutated by assembly and classification, queued for
/// emission, then converted into an [`OutputFrame`].
#[derive(Debug, Clone)]
pub(crate) struct Frame {
    pub poc: u32,
    pub frame_type: FrameType,

    // Analyzer outputs.
    pub scene_changed: bool,
    pub repeated: bool,
    pub ltr_on_hint: bool,
    pub temporal_complexity: u32,
    pub mv: i32,
    pub high_mv_count: u32,
    pub mv_size: u32,
    pub sc: u32,
    pub tsc: u32,
    pub contrast: u32,
    pub corr: u32,
    pub suggested_mini_gop: u32,
    pub pmap: [u16; PMAP_SIZE],
    pub token: AnalysisToken,

    // Mini-GOP placement.
    pub mini_gop_size: u32,
    pub mini_gop_idx: u32,
    pub mini_gop_type: u32,
    pub pyramid_layer: u32,
    pub p_pyramid_layer: u32,
    pub p_pyramid_idx: u32,
    /// Type of the previously classified frame, threaded through the queue.
    pub prev_type: FrameType,

    // Classification results.
    pub delta_qp: i32,
    pub class_apq: u32,
    pub class_sctsc: u16,
    pub ltr: bool,
    pub use_ltr_as_reference: bool,
    pub scene_transition: bool,
    pub keep_in_dpb: bool,
    pub ref_list: Vec<u32>,
    pub remove_from_dpb: Vec<u32>,
}

impl Frame {
    pub fn new(poc: u32) -> Self {
        Self {
            poc,
            frame_type: FrameType::Undef,
            scene_changed: false,
            repeated: false,
            ltr_on_hint: false,
            temporal_complexity: 0,
            mv: 0,
            high_mv_count: 0,
            mv_size: 0,
            sc: 0,
            tsc: 0,
            contrast: 0,
            corr: 0,
            suggested_mini_gop: 0,
            pmap: [0; PMAP_SIZE],
            token: AnalysisToken::default(),
            mini_gop_size: 0,
            mini_gop_idx: 0,
            mini_gop_type: 0,
            pyramid_layer: 0,
            p_pyramid_layer: 0,
            p_pyramid_idx: 0,
            prev_type: FrameType::Undef,
            delta_qp: 0,
            class_apq: 0,
            class_sctsc: 0,
            ltr: false,
            use_ltr_as_reference: false,
            scene_transition: false,
            keep_in_dpb: false,
            ref_list: Vec::new(),
            remove_from_dpb: Vec::new(),
        }
    }

    /// End-of-stream padding frame.
    pub fn dummy(poc: u32) -> Self {
        let mut f = Self::new(poc);
        f.frame_type = FrameType::Dummy;
        f
    }
}

/// Emitted decision for one frame, in display order.
#[derive(Debug, Clone, Serialize)]
pub struct OutputFrame {
    pub poc: u32,
    /// One of `Idr`, `I`, `P`, `B`.
    pub frame_type: FrameType,
    pub scene_changed: bool,
    pub repeated: bool,
    /// This frame is to be kept as the long-term reference.
    pub ltr: bool,
    pub temporal_complexity: u32,
    pub mini_gop_size: u32,
    pub pyramid_layer: u32,
    /// Signed QP offset relative to the frame's nominal class.
    pub delta_qp: i32,
    /// Perceptual-quality class, 0..=3.
    pub class_apq: u32,
    /// Packed `(sc << 6) | (tsc << 2) | mvq` rate-control fingerprint.
    pub class_cmplx: u16,
    /// This frame must survive beyond its natural DPB lifetime.
    pub keep_in_dpb: bool,
    /// POCs to evict from the DPB on this frame.
    pub remove_from_dpb: Vec<u32>,
    /// POCs this frame references.
    pub ref_list: Vec<u32>,
    /// 8x16 per-region texture-stability scores.
    #[serde(serialize_with = "serialize_pmap")]
    pub pmap: [u16; PMAP_SIZE],
}

fn serialize_pmap<S: Serializer>(pmap: &[u16; PMAP_SIZE], ser: S) -> std::result::Result<S::Ok, S::Error> {
    ser.collect_seq(pmap.iter())
}

impl TryFrom<Frame> for OutputFrame {
    type Error = AencError;

    fn try_from(f: Frame) -> Result<Self> {
        match f.frame_type {
            FrameType::Idr | FrameType::I | FrameType::P | FrameType::B => {}
            other => {
                return Err(AencError::InternalInvariant(format!(
                    "frame {} reached the emitter as {:?}",
                    f.poc, other
                )))
            }
        }

        if f.remove_from_dpb.len() > REMOVE_FROM_DPB_CAP {
            return Err(AencError::CapacityExceeded(format!(
                "frame {} evicts {} frames, cap is {}",
                f.poc,
                f.remove_from_dpb.len(),
                REMOVE_FROM_DPB_CAP
            )));
        }

        if f.ref_list.len() > REF_LIST_CAP {
            return Err(AencError::CapacityExceeded(format!(
                "frame {} references {} frames, cap is {}",
                f.poc,
                f.ref_list.len(),
                REF_LIST_CAP
            )));
        }

        Ok(OutputFrame {
            poc: f.poc,
            frame_type: f.frame_type,
            scene_changed: f.scene_changed,
            repeated: f.repeated,
            ltr: f.ltr,
            temporal_complexity: f.temporal_complexity,
            mini_gop_size: f.mini_gop_size,
            pyramid_layer: f.pyramid_layer,
            delta_qp: f.delta_qp,
            class_apq: f.class_apq,
            class_cmplx: f.class_sctsc,
            keep_in_dpb: f.keep_in_dpb,
            remove_from_dpb: f.remove_from_dpb,
            ref_list: f.ref_list,
            pmap: f.pmap,
        })
    }
}

impl fmt::Display for OutputFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let type_str = match self.frame_type {
            FrameType::Idr => "IDR",
            FrameType::I => "I  ",
            FrameType::P => " P ",
            FrameType::B => "  B",
            _ => "UND",
        };
        write!(
            f,
            "frame[{:4}] {} {} {} {} tc {:4} gop {} pyr {} qp {:+3} {} remove {:?} ref {:?}",
            self.poc,
            type_str,
            if self.scene_changed { "SCD" } else { "   " },
            if self.repeated { "R" } else { " " },
            if self.ltr { "LTR" } else { "   " },
            self.temporal_complexity,
            self.mini_gop_size,
            self.pyramid_layer,
            self.delta_qp,
            if self.keep_in_dpb { "keep" } else { "    " },
            self.remove_from_dpb,
            self.ref_list,
        )
    }
}
