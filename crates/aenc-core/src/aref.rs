//! Adaptive key-P reference.
//!
//! When no long-term reference is active, periodically promotes a P frame to
//! "key P" status: it occupies the single LTR slot in the DPB and anchors
//! subsequent P prediction. Promotion cadence restarts at scene changes and
//! IDRs.

use crate::frame::{Frame, FrameType};
use tracing::{debug, trace};

/// Minimum distance between key-P promotions.
const KEY_P_INTERVAL: u32 = 32;

const ACTIVITY_SLOTS: usize = 8;

#[derive(Debug)]
pub(crate) struct Aref {
    poc_of_last_key: u32,
    activity_ring: [bool; ACTIVITY_SLOTS],
    has_low_activity: bool,
}

impl Aref {
    pub fn new() -> Self {
        Self {
            poc_of_last_key: 0,
            activity_ring: [false; ACTIVITY_SLOTS],
            has_low_activity: false,
        }
    }

    /// Track recent motion activity per mini-GOP slot.
    pub fn observe(&mut self, f: &Frame) {
        if !matches!(f.frame_type, FrameType::I | FrameType::Idr) {
            self.activity_ring[(f.mini_gop_idx as usize) % ACTIVITY_SLOTS] = f.mv > 1000;
            let active = self.activity_ring.iter().filter(|&&slot| slot).count();
            self.has_low_activity = active < 3;
            trace!(
                poc = f.poc,
                mv = f.mv,
                corr = f.corr,
                low_activity = self.has_low_activity,
                "AREF activity"
            );
        } else {
            self.has_low_activity = false;
            self.activity_ring = [false; ACTIVITY_SLOTS];
        }
    }

    /// Restart the cadence at boundaries and promote due P frames to key P.
    pub fn decide(&mut self, f: &mut Frame, altr_enabled: bool, is_ltr_on: bool) {
        if f.scene_changed || f.frame_type == FrameType::Idr {
            self.poc_of_last_key = f.poc;
        }

        if !altr_enabled && (f.scene_changed || f.frame_type == FrameType::Idr) {
            f.ltr = true;
        }

        if f.frame_type == FrameType::P {
            f.ltr = false;
            if (!is_ltr_on || !altr_enabled)
                && f.poc >= self.poc_of_last_key + KEY_P_INTERVAL
            {
                f.ltr = true;
                self.poc_of_last_key = f.poc;
                debug!(poc = f.poc, "key P promoted");
            }
        }
    }

    /// Key-P boost; default B ladder when APQ is off; plain P stays neutral.
    pub fn adjust_qp(&self, f: &mut Frame, apq_enabled: bool) {
        match f.frame_type {
            FrameType::P => {
                f.delta_qp = if f.ltr {
                    if f.sc > 4 && self.has_low_activity {
                        -4
                    } else {
                        -2
                    }
                } else {
                    0
                };
            }
            FrameType::B => {
                if !apq_enabled && matches!(f.mini_gop_type, 4 | 8) && f.pyramid_layer > 0 {
                    f.delta_qp = f.pyramid_layer as i32;
                }
            }
            _ => {}
        }
    }
}
