//! Adaptive long-term reference.
//!
//! Promotes a frame to the single LTR slot at stream start, at IDRs while LTR
//! is active (or hinted), and at scene changes. Between promotions it tracks
//! scene drift through an 8-slot ring of per-frame drift verdicts and gates
//! whether P frames may reference the LTR at all.

use crate::analyzer::SceneAnalyzer;
use crate::frame::{Frame, FrameType};
use tracing::debug;

const SCENE_RING_SLOTS: usize = 8;

#[derive(Debug)]
pub(crate) struct Altr {
    is_ltr_on: bool,
    ltr_poc: u32,
    avg_mv0: i32,
    scene_tran_ring: [bool; SCENE_RING_SLOTS],
}

impl Altr {
    pub fn new(enabled: bool) -> Self {
        Self {
            is_ltr_on: enabled,
            ltr_poc: 0,
            avg_mv0: 0,
            scene_tran_ring: [false; SCENE_RING_SLOTS],
        }
    }

    pub fn is_ltr_on(&self) -> bool {
        self.is_ltr_on
    }

    /// Update the motion average and the scene-drift ring from one frame.
    ///
    /// The drift verdict for the current frame lands in ring slot
    /// `poc % 8`; a fully set ring declares a gradual scene transition, which
    /// retires the active LTR. Early frames (`poc <= 16`) never vote.
    pub fn observe<S: SceneAnalyzer>(&mut self, f: &mut Frame, analyzer: &mut S) {
        if matches!(f.frame_type, FrameType::I | FrameType::Idr) || f.ltr {
            return;
        }

        let mv = f.mv.clamp(0, 4000);
        if self.avg_mv0 > 8 {
            self.avg_mv0 += (mv - self.avg_mv0) / 4;
        }

        let mut flag = analyzer.ltr_transition(&f.token);
        if f.poc <= 16 {
            flag = false;
        }
        self.scene_tran_ring[(f.poc as usize) % SCENE_RING_SLOTS] = flag;
        let transition = self.scene_tran_ring.iter().all(|&slot| slot);

        f.scene_transition = transition;
        if f.scene_transition {
            debug!(poc = f.poc, "gradual scene transition, retiring LTR");
            self.is_ltr_on = false;
            // The use gate in the promotion decision recomputes this flag.
            f.use_ltr_as_reference = false;
        }
    }

    /// Promote `f` to LTR or decide whether it may reference the current one.
    pub fn decide<S: SceneAnalyzer>(&mut self, f: &mut Frame, analyzer: &mut S) {
        if f.poc == 0 {
            self.mark_ltr(f, analyzer);
            return;
        }

        if f.frame_type == FrameType::Idr && (self.is_ltr_on || f.ltr_on_hint) {
            self.mark_ltr(f, analyzer);
            return;
        }

        if f.scene_changed {
            self.mark_ltr(f, analyzer);
            return;
        }

        // High motion makes the long-term prediction useless for this frame;
        // the LTR itself stays in the DPB.
        f.use_ltr_as_reference =
            !(f.mv > 2300 || f.tsc > 1024 || (f.mv > 1024 && f.high_mv_count > 6));
    }

    fn mark_ltr<S: SceneAnalyzer>(&mut self, f: &mut Frame, analyzer: &mut S) {
        f.ltr = true;
        f.use_ltr_as_reference = true;

        self.avg_mv0 = 0;
        self.ltr_poc = f.poc;
        self.is_ltr_on = true;

        analyzer.mark_ltr_anchor(&f.token);

        f.scene_transition = false;
        self.scene_tran_ring = [false; SCENE_RING_SLOTS];
        debug!(poc = f.poc, "LTR promoted");
    }

    /// QP boost for the LTR itself; default B ladder otherwise when APQ is off.
    pub fn adjust_qp(&self, f: &mut Frame, apq_enabled: bool) {
        if f.ltr {
            f.delta_qp = if f.poc == 0 {
                -4
            } else if self.avg_mv0 > 1500 || f.poc - self.ltr_poc < 32 {
                -2
            } else {
                -4
            };
        } else if !apq_enabled && matches!(f.mini_gop_type, 4 | 8) && f.pyramid_layer > 0 {
            f.delta_qp = f.pyramid_layer as i32;
        }
    }
}
