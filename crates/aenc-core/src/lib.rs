//! Adaptive encoding decision engine.
//!
//! `aenc-core` turns a display-order stream of raw frames plus per-frame
//! scene statistics into coded-frame decisions for a downstream encoder:
//! frame type (IDR/I/P/B), quantization offset, long-term reference
//! management, and decoded-picture-buffer eviction. It performs no pixel
//! transformation, bitstream emission or rate control itself.
//!
//! # Features
//!
//! - Adaptive I/IDR placement with scene-change handling and GOP constraints
//! - Adaptive mini-GOP sizing (AGOP) with hierarchical-B pyramid layout
//! - Adaptive long-term reference promotion and use gating (ALTR)
//! - Periodic key-P reference promotion (AREF)
//! - Perceptual QP classification with P-frame bit feedback (APQ)
//!
//! # Example
//!
//! ```
//! use aenc_core::{Aenc, AencConfig, ScriptedAnalyzer, ScriptedFrame};
//!
//! let config = AencConfig {
//!     max_mini_gop_size: 1,
//!     ..AencConfig::default()
//! };
//! let trace = vec![ScriptedFrame::default(); 4];
//! let mut engine = Aenc::new(config, ScriptedAnalyzer::new(trace))?;
//! if let Some(decision) = engine.process_frame(0, Some(&[]), 0)? {
//!     println!("{decision}");
//! }
//! # Ok::<(), aenc_core::AencError>(())
//! ```

pub mod analyzer;
pub mod config;
pub mod engine;
pub mod error;
pub mod frame;

mod altr;
mod apq;
mod aref;
mod dpb;
mod gop;

pub use analyzer::{
    AnalysisToken, FrameAnalysis, SceneAnalyzer, ScriptedAnalyzer, ScriptedFrame, PMAP_HEIGHT,
    PMAP_SIZE, PMAP_WIDTH,
};
pub use config::{AencConfig, Codec, ColorFormat};
pub use engine::{Aenc, IntraDecision};
pub use error::{AencError, Result};
pub use frame::{FrameType, OutputFrame, REF_LIST_CAP, REMOVE_FROM_DPB_CAP};

#[cfg(test)]
mod tests;
