//! Scene-analysis interface.
//!
//! The engine never looks at pixels itself; a [`SceneAnalyzer`] turns each raw
//! luma frame into a [`FrameAnalysis`] record and answers long-term-reference
//! drift queries against a previously chosen anchor frame. Production
//! implementations wrap a real scene-change detector; [`ScriptedAnalyzer`]
//! replays a prerecorded stats trace for offline runs and tests.

use crate::config::AencConfig;
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Persistence map width in regions.
pub const PMAP_WIDTH: usize = 16;
/// Persistence map height in regions.
pub const PMAP_HEIGHT: usize = 8;
/// Total persistence map cells.
pub const PMAP_SIZE: usize = PMAP_WIDTH * PMAP_HEIGHT;

/// Opaque per-frame handle to analyzer-owned image and stat buffers.
///
/// Handed back to the analyzer for LTR anchor installation and drift checks.
/// The engine never interprets the value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisToken(pub u64);

/// Per-frame statistics produced by the analyzer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameAnalysis {
    /// Shot boundary detected at this frame.
    pub scene_changed: bool,
    /// Frame is a repeat of its predecessor.
    pub repeated: bool,
    /// Analyzer recommends refreshing the long-term reference.
    pub ltr_hint: bool,
    /// Recommended mini-GOP length, one of 1, 2, 4, 8.
    pub suggested_mini_gop: u32,
    /// Spatial complexity class, 0..=9.
    pub spatial_complexity: u32,
    /// Raw spatial complexity measure (unbinned).
    pub raw_spatial_complexity: i32,
    /// Temporal complexity measure.
    pub temporal_complexity: u32,
    /// Dominant motion-vector magnitude.
    pub mv: i32,
    /// Aggregate motion-vector size measure.
    pub mv_size: u32,
    /// Count of recent blocks with large motion.
    pub high_mv_count: u32,
    /// Frame contrast measure.
    pub contrast: u32,
    /// Motion-compensated temporal correlation.
    pub corr: u32,
    /// 8x16 per-region texture-stability scores, 0..=3.
    #[serde(with = "pmap_serde")]
    pub pmap: [u16; PMAP_SIZE],
    /// Handle to the analyzer-owned buffers for this frame.
    #[serde(skip)]
    pub token: AnalysisToken,
}

impl Default for FrameAnalysis {
    fn default() -> Self {
        Self {
            scene_changed: false,
            repeated: false,
            ltr_hint: false,
            suggested_mini_gop: 8,
            spatial_complexity: 0,
            raw_spatial_complexity: 0,
            temporal_complexity: 0,
            mv: 0,
            mv_size: 0,
            high_mv_count: 0,
            contrast: 0,
            corr: 0,
            pmap: [0; PMAP_SIZE],
            token: AnalysisToken::default(),
        }
    }
}

/// Scene-change detector and statistics producer.
///
/// One instance serves both detector roles: the forward per-frame analysis and
/// the long-term-reference twin that compares frames against the current
/// anchor. Implementations are stateful and not reentrant; the engine owns its
/// analyzer exclusively and drives it from a single thread.
pub trait SceneAnalyzer {
    /// Prepare for a stream described by `config` (dimensions, pitch, color
    /// format). Called once before any frame.
    fn start(&mut self, config: &AencConfig) -> Result<()>;

    /// Analyze the next frame in display order.
    fn analyze_frame(&mut self, luma: &[u8], pitch: usize) -> FrameAnalysis;

    /// Install `token`'s frame as the long-term anchor for drift checks.
    fn mark_ltr_anchor(&mut self, token: &AnalysisToken);

    /// Re-run the long-term detector: has `token`'s frame drifted away from
    /// the current anchor?
    fn ltr_transition(&mut self, token: &AnalysisToken) -> bool;

    /// Release analyzer resources.
    fn close(&mut self) {}
}

/// One entry of a prerecorded stats trace.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScriptedFrame {
    /// The analysis record to replay for this frame.
    pub analysis: FrameAnalysis,
    /// LTR drift verdict to report when this frame is checked.
    #[serde(default)]
    pub ltr_transition: bool,
}

/// Analyzer that replays a prerecorded trace instead of looking at pixels.
///
/// Frames past the end of the trace replay as all-quiet defaults.
#[derive(Debug, Default)]
pub struct ScriptedAnalyzer {
    script: Vec<ScriptedFrame>,
    cursor: usize,
    transitions: Vec<bool>,
    anchor: Option<AnalysisToken>,
}

impl ScriptedAnalyzer {
    /// Build a replay analyzer over `script`, one entry per display-order frame.
    pub fn new(script: Vec<ScriptedFrame>) -> Self {
        Self {
            script,
            cursor: 0,
            transitions: Vec::new(),
            anchor: None,
        }
    }
}

impl SceneAnalyzer for ScriptedAnalyzer {
    fn start(&mut self, _config: &AencConfig) -> Result<()> {
        Ok(())
    }

    fn analyze_frame(&mut self, _luma: &[u8], _pitch: usize) -> FrameAnalysis {
        let (mut analysis, transition) = match self.script.get(self.cursor) {
            Some(entry) => (entry.analysis.clone(), entry.ltr_transition),
            None => (FrameAnalysis::default(), false),
        };
        analysis.token = AnalysisToken(self.cursor as u64);
        self.transitions.push(transition);
        self.cursor += 1;
        analysis
    }

    fn mark_ltr_anchor(&mut self, token: &AnalysisToken) {
        self.anchor = Some(token.clone());
    }

    fn ltr_transition(&mut self, token: &AnalysisToken) -> bool {
        if self.anchor.is_none() {
            return false;
        }
        self.transitions
            .get(token.0 as usize)
            .copied()
            .unwrap_or(false)
    }
}

/// Serde shim for the fixed-size persistence map.
///
/// Serialized as a plain sequence; on read, shorter sequences zero-fill so
/// hand-written traces may omit trailing cells.
mod pmap_serde {
    use super::PMAP_SIZE;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(pmap: &[u16; PMAP_SIZE], ser: S) -> Result<S::Ok, S::Error> {
        ser.collect_seq(pmap.iter())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<[u16; PMAP_SIZE], D::Error> {
        let cells = Vec::<u16>::deserialize(de)?;
        if cells.len() > PMAP_SIZE {
            return Err(D::Error::custom(format!(
                "persistence map has {} cells, at most {} allowed",
                cells.len(),
                PMAP_SIZE
            )));
        }
        let mut pmap = [0u16; PMAP_SIZE];
        pmap[..cells.len()].copy_from_slice(&cells);
        Ok(pmap)
    }
}
