/// Configuration of an island executable.
#[derive(Debug, Clone)]
pub struct IslandConfig {
    /// Check every value a kernel produces against the output's metadata.
    pub check_output_metas: bool,
    /// Hand uniquely owned internal matrix buffers back to the device pool at
    /// the end of each run.
    pub reuse_internal_buffers: bool,
}

impl Default for IslandConfig {
    fn default() -> Self {
        Self {
            check_output_metas: true,
            reuse_internal_buffers: true,
        }
    }
}

impl IslandConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable output metadata checks.
    pub fn with_output_checks(mut self, enabled: bool) -> Self {
        self.check_output_metas = enabled;
        self
    }

    /// Enable or disable internal buffer reuse.
    pub fn with_buffer_reuse(mut self, enabled: bool) -> Self {
        self.reuse_internal_buffers = enabled;
        self
    }
}
