/// Pipeline cache keyed by full pipeline description

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::error::Result;
use crate::graphics_device::{GraphicsDevice, Pipeline, PipelineDesc, PipelineKey};
use crate::engine_debug;

/// Lazily created pipelines, alive until `clear()` or drop
#[derive(Default)]
pub struct PipelineCache {
    pipelines: FxHashMap<PipelineKey, Arc<dyn Pipeline>>,
    hits: u64,
    misses: u64,
}

impl PipelineCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached pipeline for `desc`, created on first use
    pub fn get_or_create(&mut self, device: &dyn GraphicsDevice, desc: &PipelineDesc) -> Result<Arc<dyn Pipeline>> {
        let key = desc.cache_key();
        if let Some(pipeline) = self.pipelines.get(&key) {
            self.hits += 1;
            return Ok(pipeline.clone());
        }

        let pipeline = device.create_pipeline(desc.clone())?;
        self.misses += 1;
        engine_debug!(
            "kerberos::renderer",
            "Created pipeline '{}' ({} cached)",
            desc.label,
            self.pipelines.len() + 1
        );
        self.pipelines.insert(key, pipeline.clone());
        Ok(pipeline)
    }

    /// Drop every cached pipeline
    ///
    /// The caller must make sure no submitted work still uses them.
    pub fn clear(&mut self) {
        self.pipelines.clear();
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }
}

#[cfg(test)]
#[path = "pipeline_cache_tests.rs"]
mod tests;
