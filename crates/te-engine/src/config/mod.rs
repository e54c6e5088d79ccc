//! Engine configuration
//!
//! Compile-time defaults with runtime environment overrides.
//!
//! # Configuration Priority (highest wins)
//!
//! 1. Builder calls
//! 2. Environment variables (`from_env`)
//! 3. Library defaults (`defaults`)
//!
//! # Example
//!
//! ```rust,ignore
//! use te_engine::config::EngineConfig;
//!
//! let config = EngineConfig::from_env().cq_depth(64).irq_mode(true);
//! config.validate()?;
//! ```

pub mod defaults;

use std::str::FromStr;

/// Parse `key` from the environment, falling back to `default`
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

/// Per-module engine configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Hardware CQ depth in words
    pub cq_depth: u32,
    /// CQ watermark level
    pub cq_watermark: u32,
    /// Upper bound of the fill threshold
    pub fill_cq_thresh: u32,
    /// Completions arrive by interrupt instead of polling
    pub irq_mode: bool,
    /// Bookings each slot can hold
    pub event_depth: usize,
    /// EQ records read per dispatch step
    pub eq_batch: usize,
    /// Preallocated tasks per slot FIFO
    pub slot_queue_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl EngineConfig {
    /// Defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `TE_CQ_DEPTH`
    /// - `TE_CQ_WM`
    /// - `TE_FILL_CQ_THRESH`
    /// - `TE_IRQ_MODE` (0/1)
    /// - `TE_EVENT_DEPTH`
    /// - `TE_EQ_BATCH`
    /// - `TE_SLOT_QUEUE_DEPTH`
    pub fn from_env() -> Self {
        Self {
            cq_depth: env_or("TE_CQ_DEPTH", defaults::CQ_DEPTH),
            cq_watermark: env_or("TE_CQ_WM", defaults::CQ_WM),
            fill_cq_thresh: env_or("TE_FILL_CQ_THRESH", defaults::FILL_CQ_THRESH),
            irq_mode: env_flag("TE_IRQ_MODE", defaults::IRQ_MODE),
            event_depth: env_or("TE_EVENT_DEPTH", defaults::EVENT_DEPTH),
            eq_batch: env_or("TE_EQ_BATCH", defaults::EQ_BATCH),
            slot_queue_depth: env_or("TE_SLOT_QUEUE_DEPTH", defaults::SLOT_QUEUE_DEPTH),
        }
    }

    /// Library defaults only, ignoring the environment
    pub fn new() -> Self {
        Self {
            cq_depth: defaults::CQ_DEPTH,
            cq_watermark: defaults::CQ_WM,
            fill_cq_thresh: defaults::FILL_CQ_THRESH,
            irq_mode: defaults::IRQ_MODE,
            event_depth: defaults::EVENT_DEPTH,
            eq_batch: defaults::EQ_BATCH,
            slot_queue_depth: defaults::SLOT_QUEUE_DEPTH,
        }
    }

    // Builder methods

    pub fn cq_depth(mut self, n: u32) -> Self {
        self.cq_depth = n;
        self
    }

    pub fn cq_watermark(mut self, n: u32) -> Self {
        self.cq_watermark = n;
        self
    }

    pub fn fill_cq_thresh(mut self, n: u32) -> Self {
        self.fill_cq_thresh = n;
        self
    }

    pub fn irq_mode(mut self, enable: bool) -> Self {
        self.irq_mode = enable;
        self
    }

    pub fn event_depth(mut self, n: usize) -> Self {
        self.event_depth = n;
        self
    }

    pub fn eq_batch(mut self, n: usize) -> Self {
        self.eq_batch = n;
        self
    }

    pub fn slot_queue_depth(mut self, n: usize) -> Self {
        self.slot_queue_depth = n;
        self
    }

    /// Threshold of free CQ words below which `fill` waits
    ///
    /// Capped by the margin above the watermark so a watermark interrupt
    /// always finds enough room to make progress.
    pub fn cq_thresh(&self) -> u32 {
        self.fill_cq_thresh
            .min(self.cq_depth.saturating_sub(self.cq_watermark) + 1)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cq_depth == 0 {
            return Err(ConfigError::InvalidValue("cq_depth must be > 0"));
        }
        if self.cq_depth > 4096 {
            return Err(ConfigError::InvalidValue("cq_depth must be <= 4096"));
        }
        if self.cq_watermark == 0 || self.cq_watermark > self.cq_depth {
            return Err(ConfigError::InvalidValue("cq_watermark must be in 1..=cq_depth"));
        }
        if self.fill_cq_thresh == 0 {
            return Err(ConfigError::InvalidValue("fill_cq_thresh must be > 0"));
        }
        if self.event_depth == 0 {
            return Err(ConfigError::InvalidValue("event_depth must be > 0"));
        }
        if self.eq_batch == 0 || self.eq_batch > crate::event::EQ_BATCH_MAX {
            return Err(ConfigError::InvalidValue("eq_batch must be in 1..=64"));
        }
        if self.slot_queue_depth == 0 {
            return Err(ConfigError::InvalidValue("slot_queue_depth must be > 0"));
        }
        Ok(())
    }

    /// Dump configuration (for debugging)
    pub fn print(&self) {
        te_core::te_print!("TrustEngine configuration:");
        te_core::te_print!("  cq_depth:          {}", self.cq_depth);
        te_core::te_print!("  cq_watermark:      {}", self.cq_watermark);
        te_core::te_print!("  fill_cq_thresh:    {}", self.fill_cq_thresh);
        te_core::te_print!("  cq_thresh:         {}", self.cq_thresh());
        te_core::te_print!("  irq_mode:          {}", self.irq_mode);
        te_core::te_print!("  event_depth:       {}", self.event_depth);
        te_core::te_print!("  eq_batch:          {}", self.eq_batch);
        te_core::te_print!("  slot_queue_depth:  {}", self.slot_queue_depth);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidValue(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = EngineConfig::new();
        assert!(config.validate().is_ok());
        assert_eq!(config.cq_depth, defaults::CQ_DEPTH);
        assert_eq!(config.irq_mode, defaults::IRQ_MODE);
    }

    #[test]
    fn test_thresh_never_exceeds_const() {
        let config = EngineConfig::new().cq_depth(32);
        assert!(config.cq_thresh() <= defaults::FILL_CQ_THRESH);
        assert_eq!(config.cq_thresh(), 32 - defaults::CQ_WM + 1);

        // small margin wins over the constant
        let config = EngineConfig::new().cq_depth(32).cq_watermark(30);
        assert_eq!(config.cq_thresh(), 3);

        // large margin is capped by the constant
        let config = EngineConfig::new().cq_depth(256).cq_watermark(8);
        assert_eq!(config.cq_thresh(), defaults::FILL_CQ_THRESH);
    }

    #[test]
    fn test_builder() {
        let config = EngineConfig::new()
            .cq_depth(64)
            .cq_watermark(60)
            .irq_mode(true)
            .event_depth(4);
        assert_eq!(config.cq_depth, 64);
        assert_eq!(config.cq_thresh(), 5);
        assert!(config.irq_mode);
        assert_eq!(config.event_depth, 4);
    }

    #[test]
    fn test_validation() {
        assert!(EngineConfig::new().cq_depth(0).validate().is_err());
        assert!(EngineConfig::new().cq_depth(16).cq_watermark(17).validate().is_err());
        assert!(EngineConfig::new().eq_batch(0).validate().is_err());
        assert!(EngineConfig::new().eq_batch(65).validate().is_err());
        assert!(EngineConfig::new().cq_depth(8192).validate().is_err());
    }

    #[test]
    fn test_env_override() {
        std::env::set_var("__TE_TEST_DEPTH__", "48");
        assert_eq!(env_or("__TE_TEST_DEPTH__", 32u32), 48);
        std::env::set_var("__TE_TEST_DEPTH__", "garbage");
        assert_eq!(env_or("__TE_TEST_DEPTH__", 32u32), 32);
        std::env::remove_var("__TE_TEST_DEPTH__");
        assert!(!env_flag("__TE_TEST_FLAG_UNSET__", false));
    }
}
