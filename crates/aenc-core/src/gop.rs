//! GOP structure decisions: I/IDR placement, mini-GOP assembly, pyramid layout.

use crate::config::{AencConfig, Codec};
use crate::error::{AencError, Result};
use crate::frame::{Frame, FrameType};
use std::collections::VecDeque;
use tracing::debug;

/// Tracks I/IDR placement across the stream.
#[derive(Debug, Default)]
pub(crate) struct IntraDecider {
    poc_of_last_i: u32,
    poc_of_last_idr: u32,
}

impl IntraDecider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide whether `f` opens a new GOP or IDR period.
    ///
    /// Must run before mini-GOP assembly: the assembler cuts mini-GOPs at the
    /// types assigned here.
    pub fn decide(&mut self, f: &mut Frame, config: &AencConfig) {
        // First frame in the sequence.
        if f.poc == 0 {
            self.mark_idr(f);
            return;
        }

        if config.strict_i_frame {
            if f.poc % config.gop_pic_size == 0 {
                if f.poc % config.max_idr_dist == 0 {
                    self.mark_idr(f);
                } else {
                    self.mark_i(f);
                }
            }
            return;
        }

        // Protected interval: keep the frame inter even on a scene change.
        let current_gop_size = f.poc - self.poc_of_last_i;
        if current_gop_size < config.min_gop_size {
            return;
        }

        if f.poc - self.poc_of_last_idr >= config.max_idr_dist {
            self.mark_idr(f);
            return;
        }

        // AVC restarts with an IDR; HEVC can recover through a CRA, so a
        // plain I suffices there.
        if f.scene_changed && config.codec == Codec::Avc {
            self.mark_idr(f);
            return;
        }

        if f.scene_changed || current_gop_size >= config.max_gop_size {
            self.mark_i(f);
        }
    }

    fn mark_i(&mut self, f: &mut Frame) {
        f.frame_type = FrameType::I;
        self.poc_of_last_i = f.poc;
        debug!(poc = f.poc, scene_changed = f.scene_changed, "I frame placed");
    }

    fn mark_idr(&mut self, f: &mut Frame) {
        f.frame_type = FrameType::Idr;
        self.poc_of_last_i = f.poc;
        self.poc_of_last_idr = f.poc;
        debug!(poc = f.poc, scene_changed = f.scene_changed, "IDR placed");
    }
}

/// Pick the next mini-GOP length, or `None` if the queue cannot be cut yet.
pub(crate) fn mini_gop_decision(queue: &VecDeque<Frame>, config: &AencConfig) -> Option<u32> {
    if (queue.len() as u32) < config.max_mini_gop_size {
        return None;
    }

    // End-of-stream padding reached the front: nothing real left to cut.
    if queue.front().map(|f| f.frame_type) == Some(FrameType::Dummy) {
        return None;
    }

    let size = common_size(queue, config).min(agop_size(queue, config));
    debug!(size, "mini-GOP cut");
    Some(size)
}

/// Walk the queue for the next forced boundary: IDR, dummy and (outside
/// strict-I mode) scene changes start the next mini-GOP; an I closes the
/// current one as its anchor.
fn common_size(queue: &VecDeque<Frame>, config: &AencConfig) -> u32 {
    let mut n = 1u32;
    for f in queue {
        if f.frame_type == FrameType::Idr
            || f.frame_type == FrameType::Dummy
            || (!config.strict_i_frame && f.scene_changed)
        {
            if n > 1 {
                n -= 1;
            }
            break;
        }
        if f.frame_type == FrameType::I {
            break;
        }
        n += 1;
    }
    n
}

/// Longest mini-GOP the per-frame suggestions support.
///
/// Descends candidate sizes; a candidate wins when more than half its span
/// carries a suggestion at least that long and full-size suggestions outnumber
/// half-size ones. Frames suggesting a quarter size or less end the count.
fn agop_size(queue: &VecDeque<Frame>, config: &AencConfig) -> u32 {
    if !config.agop {
        return config.max_mini_gop_size;
    }

    let mut candidate = config.max_mini_gop_size;
    while candidate > 1 {
        let mut full = 0u32;
        let mut half = 0u32;
        let mut counted = 0u32;
        while counted < candidate {
            let f = &queue[counted as usize];
            if f.suggested_mini_gop >= candidate {
                full += 1;
            }
            if f.suggested_mini_gop == candidate / 2 {
                half += 1;
            }
            if f.suggested_mini_gop <= candidate / 4 {
                break;
            }
            counted += 1;
        }

        if counted <= candidate / 2 || full <= half {
            candidate /= 2;
            continue;
        }
        return counted;
    }

    1
}

/// Assign mini-GOP placement and the hierarchical-B layer to one frame.
pub(crate) fn mark_frame_in_mini_gop(f: &mut Frame, size: u32, idx: u32) -> Result<()> {
    const GOP_TABLE_IDX: [usize; 9] = [0, 0, 1, 2, 2, 3, 3, 3, 3];
    const PYRAMID_LAYER: [[u32; 8]; 4] = [
        [0, 0, 0, 0, 0, 0, 0, 0],
        [1, 0, 0, 0, 0, 0, 0, 0],
        [2, 1, 2, 0, 0, 0, 0, 0],
        [3, 2, 3, 1, 3, 2, 3, 0],
    ];
    const MINI_GOP_TYPE: [u32; 4] = [1, 2, 4, 8];
    // Cyclic delta ladder for reference P frames when no Bs are present.
    const P_PYRAMID: [u32; 8] = [5, 4, 3, 2, 4, 3, 2, 1];

    if size == 0 || size as usize >= GOP_TABLE_IDX.len() {
        return Err(AencError::InternalInvariant(format!(
            "mini-GOP size {size} out of range"
        )));
    }
    if idx >= size {
        return Err(AencError::InternalInvariant(format!(
            "mini-GOP index {idx} outside mini-GOP of {size}"
        )));
    }

    f.mini_gop_size = size;
    f.mini_gop_idx = idx;
    let tbl = GOP_TABLE_IDX[size as usize];
    f.mini_gop_type = MINI_GOP_TYPE[tbl];
    f.pyramid_layer = if idx == size - 1 {
        0
    } else {
        PYRAMID_LAYER[tbl][idx as usize]
    };

    // Undecided frames become the anchor P or a hierarchical B.
    if f.frame_type == FrameType::Undef {
        f.frame_type = if f.pyramid_layer == 0 {
            FrameType::P
        } else {
            FrameType::B
        };
    }

    if matches!(f.frame_type, FrameType::I | FrameType::Idr) {
        f.p_pyramid_layer = 0;
        f.p_pyramid_idx = 0;
    } else if f.prev_type != FrameType::B && f.frame_type == FrameType::P {
        f.p_pyramid_idx = if f.p_pyramid_idx > 6 {
            0
        } else {
            f.p_pyramid_idx + 1
        };
        f.p_pyramid_layer = P_PYRAMID[f.p_pyramid_idx as usize];
    }

    Ok(())
}

/// Delta-QP rule used when AGOP is the only enabled feature.
pub(crate) fn adjust_qp_agop(f: &mut Frame) {
    if matches!(f.frame_type, FrameType::I | FrameType::Idr)
        || (f.frame_type == FrameType::P && f.mini_gop_type > 4)
    {
        return;
    }

    if f.pyramid_layer > 0 {
        f.delta_qp = match f.mini_gop_type {
            8 | 4 => f.pyramid_layer as i32 + 1,
            _ => 4,
        };
    } else if f.mini_gop_type > 1 {
        f.delta_qp = 1;
    } else {
        f.delta_qp = f.p_pyramid_layer as i32;
    }
}

/// Mini-GOP suggestion override for HEVC paired with a reorder window of two:
/// re-quantize raw spatial complexity and motion size, then arbitrate between
/// a B-pair and a flat P through a per-bin motion threshold.
pub(crate) fn hevc_pair_suggestion(raw_sc: i32, mv_size: i32) -> u32 {
    const MV_TH: [i32; 10] = [2, 4, 4, 4, 4, 4, 4, 4, 4, 6];

    let qsc = if raw_sc < 2048 {
        raw_sc >> 9
    } else {
        4 + ((raw_sc - 2048) >> 10)
    };
    let qsc = qsc.clamp(0, 9);

    let qmv = if mv_size < 1024 {
        if mv_size < 256 {
            0
        } else if mv_size < 512 {
            1
        } else {
            2
        }
    } else {
        (3 + ((mv_size - 1024) >> 10)).clamp(0, 9)
    };

    if qmv < MV_TH[qsc as usize] {
        2
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue_of(frames: Vec<Frame>) -> VecDeque<Frame> {
        frames.into_iter().collect()
    }

    fn plain_frame(poc: u32, suggested: u32) -> Frame {
        let mut f = Frame::new(poc);
        f.suggested_mini_gop = suggested;
        f
    }

    #[test]
    fn idr_at_front_cuts_alone() {
        let config = AencConfig::default();
        let mut idr = plain_frame(0, 8);
        idr.frame_type = FrameType::Idr;
        let mut frames = vec![idr];
        frames.extend((1..8).map(|poc| plain_frame(poc, 8)));
        assert_eq!(mini_gop_decision(&queue_of(frames), &config), Some(1));
    }

    #[test]
    fn i_frame_closes_its_mini_gop() {
        let config = AencConfig {
            max_mini_gop_size: 4,
            ..AencConfig::default()
        };
        let mut frames: Vec<Frame> = (0..4).map(|poc| plain_frame(poc, 8)).collect();
        frames[3].frame_type = FrameType::I;
        assert_eq!(mini_gop_decision(&queue_of(frames), &config), Some(4));
    }

    #[test]
    fn scene_change_starts_next_mini_gop() {
        let config = AencConfig {
            max_mini_gop_size: 4,
            ..AencConfig::default()
        };
        let mut frames: Vec<Frame> = (0..4).map(|poc| plain_frame(poc, 8)).collect();
        frames[2].scene_changed = true;
        assert_eq!(mini_gop_decision(&queue_of(frames), &config), Some(2));
    }

    #[test]
    fn strict_mode_ignores_scene_change_in_walk() {
        let config = AencConfig {
            max_mini_gop_size: 4,
            strict_i_frame: true,
            ..AencConfig::default()
        };
        let mut frames: Vec<Frame> = (0..4).map(|poc| plain_frame(poc, 8)).collect();
        frames[2].scene_changed = true;
        assert_eq!(mini_gop_decision(&queue_of(frames), &config), Some(4));
    }

    #[test]
    fn agop_prefers_full_size_majority() {
        let config = AencConfig {
            agop: true,
            ..AencConfig::default()
        };
        let suggestions = [8, 8, 8, 8, 4, 8, 8, 8];
        let frames: Vec<Frame> = suggestions
            .iter()
            .enumerate()
            .map(|(poc, &s)| plain_frame(poc as u32, s))
            .collect();
        assert_eq!(agop_size(&queue_of(frames), &config), 8);
    }

    #[test]
    fn agop_tie_steps_down() {
        let config = AencConfig {
            agop: true,
            ..AencConfig::default()
        };
        // Four full-size and four half-size suggestions: tie rejects 8.
        let suggestions = [8, 4, 8, 4, 8, 4, 8, 4];
        let frames: Vec<Frame> = suggestions
            .iter()
            .enumerate()
            .map(|(poc, &s)| plain_frame(poc as u32, s))
            .collect();
        assert_eq!(agop_size(&queue_of(frames), &config), 4);
    }

    #[test]
    fn agop_collapses_to_one_on_flat_suggestions() {
        let config = AencConfig {
            agop: true,
            ..AencConfig::default()
        };
        let frames: Vec<Frame> = (0..8).map(|poc| plain_frame(poc, 1)).collect();
        assert_eq!(agop_size(&queue_of(frames), &config), 1);
    }

    #[test]
    fn pyramid_layout_length_eight() {
        let expected = [3, 2, 3, 1, 3, 2, 3, 0];
        for (idx, &layer) in expected.iter().enumerate() {
            let mut f = Frame::new(idx as u32);
            mark_frame_in_mini_gop(&mut f, 8, idx as u32).unwrap();
            assert_eq!(f.pyramid_layer, layer, "idx {idx}");
            assert_eq!(f.mini_gop_type, 8);
            let expected_type = if layer == 0 { FrameType::P } else { FrameType::B };
            assert_eq!(f.frame_type, expected_type);
        }
    }

    #[test]
    fn short_mini_gop_uses_next_power_of_two_table() {
        // A 3-frame mini-GOP lays out as the first three slots of the
        // 4-table, with the anchor forced onto the last slot.
        let layers: Vec<u32> = (0..3)
            .map(|idx| {
                let mut f = Frame::new(idx);
                mark_frame_in_mini_gop(&mut f, 3, idx).unwrap();
                assert_eq!(f.mini_gop_type, 4);
                f.pyramid_layer
            })
            .collect();
        assert_eq!(layers, vec![2, 1, 0]);
    }

    #[test]
    fn intra_frame_keeps_its_type_as_anchor() {
        let mut f = Frame::new(4);
        f.frame_type = FrameType::I;
        mark_frame_in_mini_gop(&mut f, 4, 3).unwrap();
        assert_eq!(f.frame_type, FrameType::I);
        assert_eq!(f.pyramid_layer, 0);
    }

    #[test]
    fn p_pyramid_advances_on_p_after_non_b() {
        let mut idx = 0u32;
        let mut layers = Vec::new();
        for poc in 1..=9 {
            let mut f = Frame::new(poc);
            f.prev_type = FrameType::P;
            f.p_pyramid_idx = idx;
            mark_frame_in_mini_gop(&mut f, 1, 0).unwrap();
            idx = f.p_pyramid_idx;
            layers.push(f.p_pyramid_layer);
        }
        assert_eq!(layers, vec![4, 3, 2, 4, 3, 2, 1, 5, 4]);
    }

    #[test]
    fn out_of_range_marking_is_an_invariant_error() {
        let mut f = Frame::new(0);
        assert!(mark_frame_in_mini_gop(&mut f, 9, 0).is_err());
        assert!(mark_frame_in_mini_gop(&mut f, 4, 4).is_err());
    }

    #[test]
    fn intra_decider_poc_zero_is_idr() {
        let config = AencConfig::default();
        let mut decider = IntraDecider::new();
        let mut f = Frame::new(0);
        decider.decide(&mut f, &config);
        assert_eq!(f.frame_type, FrameType::Idr);
    }

    #[test]
    fn scene_change_in_protected_window_stays_inter() {
        let config = AencConfig::default(); // min_gop_size 8
        let mut decider = IntraDecider::new();
        let mut first = Frame::new(0);
        decider.decide(&mut first, &config);

        let mut f = Frame::new(5);
        f.scene_changed = true;
        decider.decide(&mut f, &config);
        assert_eq!(f.frame_type, FrameType::Undef);
    }

    #[test]
    fn avc_scene_change_is_idr_hevc_is_i() {
        for (codec, expected) in [(Codec::Avc, FrameType::Idr), (Codec::Hevc, FrameType::I)] {
            let config = AencConfig {
                codec,
                ..AencConfig::default()
            };
            let mut decider = IntraDecider::new();
            let mut first = Frame::new(0);
            decider.decide(&mut first, &config);

            let mut f = Frame::new(20);
            f.scene_changed = true;
            decider.decide(&mut f, &config);
            assert_eq!(f.frame_type, expected, "{codec:?}");
        }
    }

    #[test]
    fn strict_mode_places_on_gop_pic_size_grid() {
        let config = AencConfig {
            strict_i_frame: true,
            gop_pic_size: 4,
            max_gop_size: 16,
            max_idr_dist: 16,
            min_gop_size: 8,
            max_mini_gop_size: 4,
            ..AencConfig::default()
        };
        let mut decider = IntraDecider::new();
        let expected = [
            (0, FrameType::Idr),
            (3, FrameType::Undef),
            (4, FrameType::I),
            (8, FrameType::I),
            (16, FrameType::Idr),
        ];
        for (poc, expected_type) in expected {
            let mut f = Frame::new(poc);
            decider.decide(&mut f, &config);
            assert_eq!(f.frame_type, expected_type, "poc {poc}");
        }
    }

    #[test]
    fn max_idr_dist_forces_idr() {
        let config = AencConfig {
            min_gop_size: 8,
            max_gop_size: 32,
            max_idr_dist: 64,
            ..AencConfig::default()
        };
        let mut decider = IntraDecider::new();
        let mut first = Frame::new(0);
        decider.decide(&mut first, &config);

        let mut f = Frame::new(32);
        decider.decide(&mut f, &config);
        assert_eq!(f.frame_type, FrameType::I);

        let mut f = Frame::new(64);
        decider.decide(&mut f, &config);
        assert_eq!(f.frame_type, FrameType::Idr);
    }

    #[test]
    fn hevc_pair_suggestion_thresholds() {
        // Quiet low-complexity content pairs up.
        assert_eq!(hevc_pair_suggestion(100, 100), 2);
        // Heavy motion with low complexity flattens to P-only.
        assert_eq!(hevc_pair_suggestion(100, 3000), 1);
        // The highest complexity bin tolerates more motion.
        assert_eq!(hevc_pair_suggestion(8000, 3000), 2);
    }

    #[test]
    fn agop_only_qp_ladder() {
        let mut f = Frame::new(1);
        f.frame_type = FrameType::B;
        f.mini_gop_type = 8;
        f.pyramid_layer = 3;
        adjust_qp_agop(&mut f);
        assert_eq!(f.delta_qp, 4);

        let mut f = Frame::new(2);
        f.frame_type = FrameType::B;
        f.mini_gop_type = 2;
        f.pyramid_layer = 1;
        adjust_qp_agop(&mut f);
        assert_eq!(f.delta_qp, 4);

        let mut f = Frame::new(3);
        f.frame_type = FrameType::P;
        f.mini_gop_type = 4;
        f.pyramid_layer = 0;
        adjust_qp_agop(&mut f);
        assert_eq!(f.delta_qp, 1);

        let mut f = Frame::new(4);
        f.frame_type = FrameType::P;
        f.mini_gop_type = 1;
        f.p_pyramid_layer = 3;
        adjust_qp_agop(&mut f);
        assert_eq!(f.delta_qp, 3);

        // Anchor P of a full-size mini-GOP is left untouched.
        let mut f = Frame::new(5);
        f.frame_type = FrameType::P;
        f.mini_gop_type = 8;
        f.delta_qp = 0;
        adjust_qp_agop(&mut f);
        assert_eq!(f.delta_qp, 0);
    }
}
