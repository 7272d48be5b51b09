//! Adaptive perceptual QP.
//!
//! Classifies each frame into one of four perceptual bins from its spatial
//! complexity, temporal complexity and quantized motion class, then derives
//! per-layer B-frame QP deltas. A bit-cost model over P-frame feedback flags
//! noisy content and rotates the classification for subsequent B frames.

use crate::config::AencConfig;
use crate::frame::{Frame, FrameType};
use tracing::{debug, trace};

/// Perceptual class lookup, indexed `[sc][tsc][mvq]`.
#[rustfmt::skip]
const APQ_LOOKUP: [[[u32; 3]; 10]; 10] = [
    // 0          1          2          3          4          5          6          7          8          9
    [[0, 3, 0], [0, 3, 0], [0, 3, 0], [0, 0, 0], [0, 0, 0], [0, 0, 0], [0, 0, 0], [0, 0, 0], [0, 0, 0], [0, 0, 0]], // 0
    [[0, 3, 0], [0, 3, 0], [0, 3, 0], [0, 0, 0], [0, 0, 0], [0, 0, 0], [0, 0, 0], [0, 0, 0], [0, 0, 0], [0, 0, 0]], // 1
    [[0, 3, 0], [0, 3, 0], [0, 3, 0], [0, 0, 0], [0, 0, 0], [0, 0, 0], [0, 0, 0], [0, 0, 0], [0, 0, 0], [0, 0, 0]], // 2
    [[0, 3, 0], [0, 3, 0], [0, 3, 0], [2, 0, 0], [1, 2, 0], [2, 0, 0], [2, 0, 0], [2, 0, 0], [2, 0, 0], [2, 0, 0]], // 3
    [[0, 3, 0], [0, 3, 0], [0, 3, 0], [2, 0, 0], [1, 2, 0], [1, 2, 0], [1, 2, 0], [2, 0, 0], [2, 0, 0], [2, 0, 0]], // 4
    [[1, 2, 0], [1, 2, 0], [1, 2, 0], [1, 2, 0], [1, 2, 0], [1, 2, 0], [1, 2, 0], [1, 2, 0], [1, 2, 0], [1, 2, 0]], // 5
    [[1, 2, 0], [1, 2, 0], [1, 2, 0], [1, 2, 0], [1, 2, 0], [1, 2, 0], [1, 2, 0], [1, 2, 0], [1, 2, 0], [1, 1, 2]], // 6
    [[1, 2, 0], [1, 2, 0], [1, 2, 0], [1, 2, 0], [1, 2, 0], [1, 2, 0], [1, 2, 0], [1, 2, 0], [1, 2, 0], [1, 1, 2]], // 7
    [[1, 2, 0], [1, 2, 0], [1, 2, 0], [1, 2, 0], [1, 2, 0], [1, 2, 0], [1, 2, 0], [1, 2, 0], [1, 2, 0], [1, 1, 2]], // 8
    [[1, 2, 0], [1, 2, 0], [1, 2, 0], [1, 2, 0], [1, 2, 0], [1, 2, 0], [1, 2, 0], [1, 2, 0], [1, 2, 0], [1, 1, 2]], // 9
];

/// P-frame bit-cost model, indexed `[sc][tsc]` as `(mul, exp, enable)`.
#[rustfmt::skip]
const DEF_MODEL: [[[f64; 3]; 10]; 10] = [
    [[0.0, 0.0, 0.0], [0.0,    0.0,    0.0], [0.0,    0.0,    0.0], [0.0,    0.0,    0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0]], // 0
    [[0.0, 0.0, 0.0], [0.0,    0.0,    0.0], [0.0,    0.0,    0.0], [0.0,    0.0,    0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0]], // 1
    [[0.0, 0.0, 0.0], [0.2167, 0.4914, 1.0], [0.0,    0.0,    0.0], [0.0,    0.0,    0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0]], // 2
    [[0.0830, 0.6201, 1.0], [0.0916, 0.7462, 1.0], [0.3533, 0.5491, 1.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0]], // 3
    [[0.1455, 0.4302, 1.0], [0.0580, 0.7937, 1.0], [0.4327, 0.4359, 1.0], [0.2197, 0.7141, 1.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0]], // 4
    [[0.0, 0.0, 0.0], [0.1136, 0.7446, 1.0], [0.1770, 0.6730, 1.0], [0.0139, 1.4547, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0]], // 5
    [[0.0617, 0.8463, 0.0], [0.0454, 0.9545, 0.0], [0.4038, 0.4899, 1.0], [0.2234, 0.7087, 1.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0]], // 6
    [[0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0]], // 7
    [[0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0]], // 8
    [[0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0]], // 9
];

/// Threshold above which the observed/predicted bit ratio marks a P as noisy.
const NOISY_RATIO: f64 = 1.15;

#[derive(Debug, Default)]
pub(crate) struct Apq {
    last_p_noisy: bool,
    last_p_qp: u32,
}

impl Apq {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify one frame and pack its rate-control fingerprint.
    pub fn classify(&mut self, f: &mut Frame) {
        let mvq: u32 = if f.mv_size < 640 {
            0
        } else if f.mv_size < 2048 {
            1
        } else {
            2
        };

        let sc = f.sc.min(9) as usize;
        let tsc = f.tsc.min(9) as usize;
        f.class_apq = APQ_LOOKUP[sc][tsc][mvq as usize];
        f.class_sctsc = ((f.sc << 6) + (f.tsc << 2) + mvq) as u16;

        // High contrast at low spatial complexity reads as clean detail, not
        // flatness; remap the class accordingly.
        if f.contrast > 89 && f.sc > 0 && f.sc < 5 {
            f.class_apq = match f.class_apq {
                3 => 0,
                0 => {
                    if mvq > 0 {
                        2
                    } else {
                        1
                    }
                }
                2 => 1,
                other => other,
            };
        }

        if f.scene_changed {
            self.last_p_noisy = false;
            self.last_p_qp = 0;
        }
        if self.last_p_noisy {
            f.class_apq = match f.class_apq {
                1 => 2,
                2 => 0,
                0 => 3,
                other => other,
            };
        }
        trace!(
            poc = f.poc,
            class_apq = f.class_apq,
            class_sctsc = f.class_sctsc,
            "APQ classified"
        );
    }

    /// Per-layer B-frame deltas; I/IDR/P are left to the other modules.
    pub fn adjust_qp(&self, f: &mut Frame) {
        if matches!(f.frame_type, FrameType::I | FrameType::Idr | FrameType::P) {
            return;
        }

        match f.mini_gop_type {
            8 => {
                let level = f.pyramid_layer.clamp(1, 3);
                let class = f.class_apq.min(3);
                let mut qp = 1i32;
                match class {
                    1 => {
                        qp += 2;
                        if level >= 2 {
                            qp += 1;
                        }
                        if level >= 3 {
                            qp += 2;
                        }
                    }
                    2 => {
                        qp += 1;
                        if level >= 2 {
                            qp += 1;
                        }
                        if level >= 3 {
                            qp += 2;
                        }
                    }
                    3 => {
                        qp -= 1;
                        if level >= 2 {
                            qp += 1;
                        }
                        if level >= 3 {
                            qp += 1;
                        }
                    }
                    _ => {
                        if level >= 2 {
                            qp += 1;
                        }
                        if level >= 3 {
                            qp += 2;
                        }
                    }
                }
                f.delta_qp = qp;
            }
            4 => f.delta_qp = 1 + f.pyramid_layer as i32,
            _ => f.delta_qp = 3,
        }
    }

    /// Fold encoded P-frame bit feedback into the noise flag.
    ///
    /// `class_cmplx` is the fingerprint emitted with the frame's decision.
    /// The model predicts a nominal bit cost from frame area and QP; observed
    /// cost far above it marks the content noisy until the next scene change.
    pub fn update_p_bits(
        &mut self,
        config: &AencConfig,
        poc: u32,
        bits: u32,
        qp_y: u32,
        class_cmplx: u16,
    ) {
        let sc = ((class_cmplx >> 6) & 0xf) as usize;
        let tsc = ((class_cmplx >> 2) & 0xf) as usize;
        let mvq = (class_cmplx & 0x3) as u32;

        let last_qp = self.last_p_qp;
        self.last_p_qp = qp_y;

        if sc > 9 || tsc > 9 {
            self.last_p_noisy = false;
            return;
        }
        let [mul, exp, enable] = DEF_MODEL[sc][tsc];
        if enable == 0.0 || mvq > 1 || last_qp == 0 || last_qp > qp_y + 1 {
            self.last_p_noisy = false;
            return;
        }

        let area = (config.src_frame_width * config.src_frame_height * 12) as f64;
        let predicted = area / (2f64.powf((qp_y as f64 - 12.0) / 6.0) / mul).powf(1.0 / exp);
        let ratio = bits as f64 / predicted;
        self.last_p_noisy = ratio > NOISY_RATIO;
        debug!(poc, bits, qp_y, ratio, noisy = self.last_p_noisy, "P bits observed");
    }
}
