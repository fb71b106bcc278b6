//! Part Linker
//!
//! Concatenates compiled parts into one binary in the only order the hardware
//! understands:
//!
//! ```text
//! [wrapper header?] [prolog?] [previous stage?] [main] [epilog?]
//! ```
//!
//! The order is enforced here, never configurable: pushing a segment that
//! does not strictly follow the previous one is a [`PrismError::Link`].
//! Register usage merges by pointwise maximum as segments are pushed.
//!
//! # Two-Phase Wrapper
//!
//! When the halves of a merged invocation run with different active-thread
//! counts the linker is given a [`WrapperPlan`] and emits a fixed-size header
//! in front of the parts:
//!
//! | Bytes  | Field |
//! |--------|-------|
//! | 0..4   | magic `PWRP` |
//! | 4      | phase 1 merged-wave-info byte |
//! | 5      | phase 2 merged-wave-info byte |
//! | 6      | handoff barrier (always 1) |
//! | 7      | reserved |
//! | 8..12  | phase 1 entry offset (LE) |
//! | 12..16 | phase 2 entry offset (LE) |
//!
//! Phase 1 covers the prolog and previous stage, phase 2 starts at the main
//! part. Without a plan the parts are concatenated flat.

use smallvec::SmallVec;

use prism_core::{PrismError, RegisterUsage, Result};

use crate::merge::WrapperPlan;

pub const WRAPPER_MAGIC: [u8; 4] = *b"PWRP";
pub const WRAPPER_HEADER_SIZE: usize = 16;

/// Position of a part inside a linked binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SegmentKind {
    Prolog,
    PreviousStage,
    Main,
    Epilog,
}

impl SegmentKind {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Prolog => "prolog",
            Self::PreviousStage => "previous stage",
            Self::Main => "main",
            Self::Epilog => "epilog",
        }
    }
}

/// One part's byte range in the linked binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub kind: SegmentKind,
    pub offset: usize,
    pub len: usize,
}

/// Decoded wrapper header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WrapperHeader {
    pub first_wave_info_byte: u8,
    pub second_wave_info_byte: u8,
    pub barrier: bool,
    pub first_entry: u32,
    pub second_entry: u32,
}

impl WrapperHeader {
    /// Decode the header at the start of `code`, if present.
    #[must_use]
    pub fn parse(code: &[u8]) -> Option<Self> {
        let header = code.get(..WRAPPER_HEADER_SIZE)?;
        if header[..4] != WRAPPER_MAGIC {
            return None;
        }
        let word = |at: usize| u32::from_le_bytes([header[at], header[at + 1], header[at + 2], header[at + 3]]);
        Some(Self {
            first_wave_info_byte: header[4],
            second_wave_info_byte: header[5],
            barrier: header[6] != 0,
            first_entry: word(8),
            second_entry: word(12),
        })
    }
}

/// Result of [`Linker::finish`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkOutput {
    pub code: Vec<u8>,
    pub segments: SmallVec<[Segment; 4]>,
    pub usage: RegisterUsage,
    pub wrapper: Option<WrapperPlan>,
}

impl LinkOutput {
    /// Segment kinds in binary order.
    pub fn order(&self) -> impl Iterator<Item = SegmentKind> + '_ {
        self.segments.iter().map(|s| s.kind)
    }

    #[must_use]
    pub fn segment(&self, kind: SegmentKind) -> Option<&Segment> {
        self.segments.iter().find(|s| s.kind == kind)
    }

    #[must_use]
    pub fn segment_bytes(&self, kind: SegmentKind) -> Option<&[u8]> {
        self.segment(kind).map(|s| &self.code[s.offset..s.offset + s.len])
    }
}

/// Ordered part concatenation.
#[derive(Debug, Default)]
pub struct Linker {
    code: Vec<u8>,
    segments: SmallVec<[Segment; 4]>,
    usage: RegisterUsage,
    wrapper: Option<WrapperPlan>,
}

impl Linker {
    #[must_use]
    pub fn new(wrapper: Option<WrapperPlan>) -> Self {
        let code = if wrapper.is_some() {
            vec![0; WRAPPER_HEADER_SIZE]
        } else {
            Vec::new()
        };
        Self {
            code,
            wrapper,
            ..Default::default()
        }
    }

    /// Append one part. `kind` must strictly follow the last pushed kind.
    pub fn push(&mut self, kind: SegmentKind, code: &[u8], usage: &RegisterUsage) -> Result<()> {
        if let Some(last) = self.segments.last()
            && last.kind >= kind
        {
            return Err(PrismError::Link(format!(
                "{} part cannot follow {} part",
                kind.name(),
                last.kind.name()
            )));
        }
        self.segments.push(Segment {
            kind,
            offset: self.code.len(),
            len: code.len(),
        });
        self.code.extend_from_slice(code);
        self.usage.merge_max(usage);
        Ok(())
    }

    pub fn finish(mut self) -> Result<LinkOutput> {
        let main = self
            .segments
            .iter()
            .find(|s| s.kind == SegmentKind::Main)
            .copied()
            .ok_or_else(|| PrismError::Link("no main part".into()))?;

        if let Some(plan) = &self.wrapper {
            if !self.segments.iter().any(|s| s.kind == SegmentKind::PreviousStage) {
                return Err(PrismError::Link(
                    "two-phase wrapper requires a previous stage".into(),
                ));
            }
            let header = &mut self.code[..WRAPPER_HEADER_SIZE];
            header[..4].copy_from_slice(&WRAPPER_MAGIC);
            header[4] = plan.first.wave_info_byte;
            header[5] = plan.second.wave_info_byte;
            header[6] = 1;
            header[7] = 0;
            header[8..12].copy_from_slice(&(WRAPPER_HEADER_SIZE as u32).to_le_bytes());
            header[12..16].copy_from_slice(&(main.offset as u32).to_le_bytes());
        }

        Ok(LinkOutput {
            code: self.code,
            segments: self.segments,
            usage: self.usage,
            wrapper: self.wrapper,
        })
    }
}
