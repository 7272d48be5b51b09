//! The adaptive encoding decision engine.
//!
//! One streaming processor: frames enter in display order with their scene
//! statistics, pass through I/IDR decision, mini-GOP assembly and per-frame
//! classification, and leave in display order as coded-frame decisions.

use crate::altr::Altr;
use crate::analyzer::{SceneAnalyzer, PMAP_SIZE};
use crate::apq::Apq;
use crate::aref::Aref;
use crate::config::{AencConfig, Codec};
use crate::dpb::{Dpb, EvictCriterion};
use crate::error::{AencError, Result};
use crate::frame::{Frame, FrameType, OutputFrame};
use crate::gop::{self, IntraDecider};
use std::collections::VecDeque;
use tracing::trace;

/// Intra lookup result for a queued frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntraDecision {
    /// Frame unknown or not intra.
    None,
    /// Frame will be coded as I.
    I,
    /// Frame will be coded as IDR.
    Idr,
}

/// Adaptive encoding controller.
///
/// Frames must be submitted in strictly increasing display order. Each
/// [`process_frame`] call accepts at most one frame and emits at most one
/// decision; `Ok(None)` means more input is needed. A `None` luma plane
/// signals end of stream, after which repeated calls drain the remaining
/// decisions.
///
/// [`process_frame`]: Aenc::process_frame
#[derive(Debug)]
pub struct Aenc<S: SceneAnalyzer> {
    config: AencConfig,
    analyzer: S,
    reorder: VecDeque<Frame>,
    output: VecDeque<Frame>,
    dpb: Dpb,
    deferred_evictions: Vec<u32>,
    intra: IntraDecider,
    altr: Altr,
    aref: Aref,
    apq: Apq,
    persistence_map: [u16; PMAP_SIZE],
    eos: bool,
}

impl<S: SceneAnalyzer> Aenc<S> {
    /// Build an engine over `analyzer`.
    ///
    /// Fails with [`AencError::InvalidParams`] on a bad configuration and
    /// with [`AencError::InitFailed`] if the analyzer rejects it; no state is
    /// retained in either case.
    pub fn new(config: AencConfig, mut analyzer: S) -> Result<Self> {
        config.validate()?;
        analyzer.start(&config)?;

        let altr = Altr::new(config.altr);
        Ok(Self {
            config,
            analyzer,
            reorder: VecDeque::new(),
            output: VecDeque::new(),
            dpb: Dpb::new(),
            deferred_evictions: Vec::new(),
            intra: IntraDecider::new(),
            altr,
            aref: Aref::new(),
            apq: Apq::new(),
            persistence_map: [0; PMAP_SIZE],
            eos: false,
        })
    }

    /// Submit one frame (or signal EOS with `luma = None`) and fetch the next
    /// decision in display order, if one is ready.
    pub fn process_frame(
        &mut self,
        poc: u32,
        luma: Option<&[u8]>,
        pitch: usize,
    ) -> Result<Option<OutputFrame>> {
        match luma {
            Some(data) => {
                if self.eos {
                    return Err(AencError::InvalidState(
                        "frame submitted after end of stream".into(),
                    ));
                }
                let frame = self.intake(poc, data, pitch);
                self.reorder.push_back(frame);
            }
            None => {
                self.eos = true;
                while (self.reorder.len() as u32) < self.config.max_mini_gop_size {
                    self.reorder.push_back(Frame::dummy(poc));
                }
            }
        }

        if let Some(size) = gop::mini_gop_decision(&self.reorder, &self.config) {
            self.classify_mini_gop(size)?;
        }

        self.emit()
    }

    /// Look up the intra decision for a display order still held in the
    /// reorder or output queue.
    pub fn intra_decision(&self, display_order: u32) -> IntraDecision {
        let frame_type = self
            .reorder
            .iter()
            .find(|f| f.poc == display_order)
            .map(|f| f.frame_type)
            .or_else(|| {
                self.output
                    .iter()
                    .find(|f| f.poc == display_order)
                    .map(|f| f.frame_type)
            });

        match frame_type {
            Some(FrameType::Idr) => IntraDecision::Idr,
            Some(FrameType::I) => IntraDecision::I,
            _ => IntraDecision::None,
        }
    }

    /// Copy the most recent persistence-map snapshot into `out` and return
    /// the number of non-zero cells.
    pub fn persistence_map(&self, _display_order: u32, out: &mut [u16; PMAP_SIZE]) -> u16 {
        out.copy_from_slice(&self.persistence_map);
        self.persistence_map.iter().filter(|&&cell| cell != 0).count() as u16
    }

    /// Feed back the encoded size of a P frame for the APQ noise model.
    ///
    /// Only meaningful with APQ enabled and a nominal GOP of at least 8;
    /// otherwise a no-op.
    pub fn update_p_bits(&mut self, poc: u32, bits: u32, qp_y: u32, class_cmplx: u16) {
        if !self.config.apq || self.config.gop_pic_size < 8 {
            return;
        }
        self.apq.update_p_bits(&self.config, poc, bits, qp_y, class_cmplx);
    }

    /// Release analyzer resources and discard any queued frames.
    pub fn close(mut self) {
        self.analyzer.close();
    }

    fn intake(&mut self, poc: u32, data: &[u8], pitch: usize) -> Frame {
        let analysis = self.analyzer.analyze_frame(data, pitch);

        let mut f = Frame::new(poc);
        f.scene_changed = analysis.scene_changed;
        f.repeated = analysis.repeated;
        f.ltr_on_hint = analysis.ltr_hint;
        f.temporal_complexity = analysis.temporal_complexity;
        f.tsc = analysis.temporal_complexity;
        f.sc = analysis.spatial_complexity;
        f.mv = analysis.mv;
        f.mv_size = analysis.mv_size;
        f.high_mv_count = analysis.high_mv_count;
        f.contrast = analysis.contrast;
        f.corr = analysis.corr;
        f.use_ltr_as_reference = true;

        f.suggested_mini_gop = analysis.suggested_mini_gop;
        if self.config.codec == Codec::Hevc && self.config.max_mini_gop_size == 2 {
            f.suggested_mini_gop = gop::hevc_pair_suggestion(
                analysis.raw_spatial_complexity,
                analysis.mv_size as i32,
            );
        }

        f.pmap = analysis.pmap;
        self.persistence_map = analysis.pmap;
        f.token = analysis.token;

        self.intra.decide(&mut f, &self.config);
        f
    }

    /// Drain and classify the next `size` frames of the reorder queue.
    ///
    /// Stage order within a frame is fixed: layout, statistics, promotion
    /// decisions, reference list, DPB bookkeeping, QP adjustment.
    fn classify_mini_gop(&mut self, size: u32) -> Result<()> {
        for idx in 0..size {
            let mut f = self.reorder.pop_front().ok_or_else(|| {
                AencError::InternalInvariant("reorder queue underflow during assembly".into())
            })?;

            gop::mark_frame_in_mini_gop(&mut f, size, idx)?;

            if self.config.altr {
                self.altr.observe(&mut f, &mut self.analyzer);
            }
            if self.config.aref {
                self.aref.observe(&f);
            }
            if self.config.apq {
                self.apq.classify(&mut f);
            }

            if self.config.altr {
                self.altr.decide(&mut f, &mut self.analyzer);
            }
            if self.config.aref {
                self.aref
                    .decide(&mut f, self.config.altr, self.altr.is_ltr_on());
            }

            self.build_ref_list(&mut f);

            // New LTR or key P takes over the single retained slot.
            if (self.config.altr || self.config.aref) && f.ltr {
                self.dpb.evict_matching(&mut f, EvictCriterion::AnyLtr);
                self.dpb.keep(&mut f);
            }

            self.adjust_qp(&mut f);
            self.thread_frame_type(&f);

            self.output.push_back(f);
        }
        Ok(())
    }

    fn build_ref_list(&mut self, f: &mut Frame) {
        if f.frame_type != FrameType::P {
            return;
        }
        let wants_ltr = (self.config.altr && f.use_ltr_as_reference) || self.config.aref;
        if wants_ltr {
            if let Some(poc) = self.dpb.ltr_poc() {
                f.ref_list.push(poc);
            }
        }
    }

    fn adjust_qp(&mut self, f: &mut Frame) {
        f.delta_qp = 0;
        if self.config.altr {
            self.altr.adjust_qp(f, self.config.apq);
        }
        if self.config.aref {
            self.aref.adjust_qp(f, self.config.apq);
        }
        if self.config.apq {
            self.apq.adjust_qp(f);
        }
        if self.config.agop && !self.config.altr && !self.config.aref && !self.config.apq {
            gop::adjust_qp_agop(f);
        }
    }

    /// Thread type and P-pyramid state onto the next queued frame, and smooth
    /// the P→B transition by neutralizing the unsent predecessor's delta.
    fn thread_frame_type(&mut self, f: &Frame) {
        if let Some(next) = self.reorder.front_mut() {
            next.prev_type = f.frame_type;
            next.p_pyramid_layer = f.p_pyramid_layer;
            next.p_pyramid_idx = f.p_pyramid_idx;
            if f.prev_type == FrameType::P && f.frame_type == FrameType::B {
                if let Some(last) = self.output.back_mut() {
                    last.delta_qp = 0;
                }
            }
        }
    }

    /// Pop the next decision in display order, applying eviction deferral:
    /// evictions computed on a B frame ride along until the next non-B.
    fn emit(&mut self) -> Result<Option<OutputFrame>> {
        let Some(mut f) = self.output.pop_front() else {
            return Ok(None);
        };

        if f.frame_type == FrameType::B {
            self.deferred_evictions.append(&mut f.remove_from_dpb);
        } else {
            f.remove_from_dpb.extend(self.deferred_evictions.drain(..));
        }

        let out = OutputFrame::try_from(f)?;
        trace!(poc = out.poc, frame_type = ?out.frame_type, "decision emitted");
        Ok(Some(out))
    }
}
