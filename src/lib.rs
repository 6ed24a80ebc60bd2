pub mod cluster;
pub mod error;
pub mod merge;
pub mod overlay;
pub mod quad;
mod result;
pub mod tref;
pub mod util;

use serde::{Deserialize, Serialize};
use tracing::instrument;

pub use cluster::cluster;
pub use error::{MergeError, Result};
pub use merge::{can_merge, MergeParams};
pub use quad::{Direction, Quadrilateral, Rgb};
pub use result::*;
pub use tref::{MergeRequest, MergeResponse, ParamOverrides, TextRegionExchange};

pub const VERSION: &str = concat!("textline_merge/", env!("CARGO_PKG_VERSION"));

/// What to do with a line that cannot be decoded or has degenerate geometry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Fail the whole request.
    #[default]
    Strict,
    /// Drop the line and report it in [`MergeOutcome::skipped`].
    Lenient,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedLine {
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub regions: Vec<TextRegion>,
    pub skipped: Vec<SkippedLine>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MergeOptions {
    pub params: MergeParams,
    pub policy: ErrorPolicy,
    pub clip: bool,
}

#[derive(Debug, Clone, Default)]
pub struct TextlineMergerBuilder {
    options: MergeOptions,
}

impl TextlineMergerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn params(mut self, params: MergeParams) -> Self {
        self.options.params = params;
        self
    }

    pub fn policy(mut self, policy: ErrorPolicy) -> Self {
        self.options.policy = policy;
        self
    }

    pub fn lenient(self, lenient: bool) -> Self {
        self.policy(if lenient {
            ErrorPolicy::Lenient
        } else {
            ErrorPolicy::Strict
        })
    }

    pub fn clip(mut self, clip: bool) -> Self {
        self.options.clip = clip;
        self
    }

    #[instrument(skip(self))]
    pub fn build(self) -> TextlineMerger {
        TextlineMerger {
            options: self.options,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TextlineMerger {
    options: MergeOptions,
}

impl TextlineMerger {
    pub fn options(&self) -> &MergeOptions {
        &self.options
    }

    /// Groups already decoded lines into regions.
    #[instrument(skip(self, lines), fields(count = lines.len()))]
    pub fn merge(&self, lines: Vec<Quadrilateral>) -> Result<MergeOutcome> {
        self.merge_with(lines, &self.options.params)
    }

    fn merge_with(&self, lines: Vec<Quadrilateral>, params: &MergeParams) -> Result<MergeOutcome> {
        let mut skipped = Vec::new();
        let mut kept = Vec::with_capacity(lines.len());
        for (index, line) in lines.into_iter().enumerate() {
            match line.font_size() {
                Ok(_) => kept.push(line),
                Err(err) => self.reject(index, err, &mut skipped)?,
            }
        }
        let regions = cluster(kept, params)?;
        Ok(MergeOutcome { regions, skipped })
    }

    /// Decodes exchange entries with the given image size, then merges them.
    #[instrument(skip(self, entries, overrides), fields(count = entries.len()))]
    pub fn merge_exchange(
        &self,
        entries: &[TextRegionExchange],
        width: u32,
        height: u32,
        overrides: &ParamOverrides,
    ) -> Result<MergeOutcome> {
        tref::check_dimensions(width, height)?;
        let params = overrides.apply(self.options.params);

        let mut skipped = Vec::new();
        let mut lines = Vec::with_capacity(entries.len());
        let mut origin = Vec::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            match Quadrilateral::from_exchange(entry, width, height) {
                Ok(mut line) => {
                    if self.options.clip {
                        line.clip(width, height);
                    }
                    lines.push(line);
                    origin.push(index);
                }
                Err(err) => self.reject(index, err, &mut skipped)?,
            }
        }

        let mut outcome = self.merge_with(lines, &params)?;
        // Indices reported by the geometry pass refer to decoded lines only.
        for it in outcome.skipped.iter_mut() {
            it.index = origin[it.index];
        }
        skipped.append(&mut outcome.skipped);
        skipped.sort_by_key(|it| it.index);
        outcome.skipped = skipped;
        Ok(outcome)
    }

    pub fn merge_request(&self, request: &MergeRequest) -> Result<MergeResponse> {
        let outcome = self.merge_exchange(
            &request.textlines,
            request.width,
            request.height,
            &request.overrides,
        )?;
        MergeResponse::from_outcome(&outcome, request.width, request.height)
    }

    fn reject(&self, index: usize, err: MergeError, skipped: &mut Vec<SkippedLine>) -> Result<()> {
        match self.options.policy {
            ErrorPolicy::Strict => {
                log::debug!("Rejecting request because of line {index}: {err}");
                Err(err)
            }
            ErrorPolicy::Lenient => {
                log::debug!("Skipping line {index}: {err}");
                skipped.push(SkippedLine {
                    index,
                    reason: err.to_string(),
                });
                Ok(())
            }
        }
    }
}

impl MergeResponse {
    pub fn from_outcome(outcome: &MergeOutcome, width: u32, height: u32) -> Result<Self> {
        Ok(Self {
            regions: outcome
                .regions
                .iter()
                .map(|it| it.to_exchange(width, height))
                .collect::<Result<_>>()?,
            version: VERSION.to_string(),
            skipped: outcome.skipped.clone(),
        })
    }
}
