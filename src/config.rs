//! Recognized decode options.
//!
//! Defaults live here; a `trellis.toml`-style file can override them
//! (flat `key = value` lines, minimal section-aware scan), and CLI flags
//! override both.

use std::path::Path;

use crate::engine::Device;

/// Default maximum candidate states per frame when chunking.
pub const DEFAULT_CHUNK_WIDTH: usize = 128;
/// Default per-frame mass retention threshold.
pub const DEFAULT_CHUNK_THRESHOLD: f32 = 0.95;

#[derive(Clone, Debug, PartialEq)]
pub struct DecodeConfig {
    /// Enable per-frame state pruning.
    pub use_chunking: bool,
    /// Maximum candidate states per frame (doubles on demand).
    pub chunk_width: usize,
    /// Mass retention threshold in (0, 1].
    pub chunk_threshold: f32,
    /// Sequences per decoded batch.
    pub batch_size: usize,
    /// Async writer threads; 0 writes in-thread.
    pub save_workers: usize,
    /// Accelerator adapter index; CPU when absent.
    pub device: Option<usize>,
    /// Inputs are already natural-log probabilities.
    pub log_probs: bool,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            use_chunking: false,
            chunk_width: DEFAULT_CHUNK_WIDTH,
            chunk_threshold: DEFAULT_CHUNK_THRESHOLD,
            batch_size: 1,
            save_workers: 0,
            device: None,
            log_probs: false,
        }
    }
}

impl DecodeConfig {
    pub fn device(&self) -> Device {
        match self.device {
            Some(index) => Device::Accelerator(index),
            None => Device::Cpu,
        }
    }

    /// Load overrides from a config file on top of the defaults.
    ///
    /// Accepts flat `key = value` lines; `#` comments and section headers
    /// are skipped. Unknown keys are rejected so typos don't silently fall
    /// back to defaults.
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read '{}': {}", path.display(), e))?;
        let mut cfg = Self::default();

        for (n, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('[') {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| format!("line {}: expected 'key = value'", n + 1))?;
            let (key, value) = (key.trim(), value.trim());
            match key {
                "use_chunking" => cfg.use_chunking = parse(n, key, value)?,
                "chunk_width" => cfg.chunk_width = parse(n, key, value)?,
                "chunk_threshold" => cfg.chunk_threshold = parse(n, key, value)?,
                "batch_size" => cfg.batch_size = parse(n, key, value)?,
                "save_workers" => cfg.save_workers = parse(n, key, value)?,
                "log_probs" => cfg.log_probs = parse(n, key, value)?,
                "device" => {
                    cfg.device = if value == "none" {
                        None
                    } else {
                        Some(parse(n, key, value)?)
                    }
                }
                _ => return Err(format!("line {}: unrecognized option '{}'", n + 1, key)),
            }
        }

        if !(cfg.chunk_threshold > 0.0 && cfg.chunk_threshold <= 1.0) {
            return Err("chunk_threshold must be in (0, 1]".to_string());
        }
        if cfg.batch_size == 0 {
            return Err("batch_size must be at least 1".to_string());
        }
        Ok(cfg)
    }
}

fn parse<T: std::str::FromStr>(n: usize, key: &str, value: &str) -> Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("line {}: invalid value '{}' for {}", n + 1, value, key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn defaults_match_documented_values() {
        let cfg = DecodeConfig::default();
        assert!(!cfg.use_chunking);
        assert_eq!(cfg.chunk_width, 128);
        assert_eq!(cfg.batch_size, 1);
        assert_eq!(cfg.device(), Device::Cpu);
    }

    #[test]
    fn parses_overrides_and_skips_comments() {
        let file = write_config(
            "# decoding options\n[decode]\nuse_chunking = true\nchunk_width = 64\nbatch_size = 8\ndevice = 1\n",
        );
        let cfg = DecodeConfig::load(file.path()).unwrap();
        assert!(cfg.use_chunking);
        assert_eq!(cfg.chunk_width, 64);
        assert_eq!(cfg.batch_size, 8);
        assert_eq!(cfg.device(), Device::Accelerator(1));
        assert_eq!(cfg.chunk_threshold, DEFAULT_CHUNK_THRESHOLD);
    }

    #[test]
    fn rejects_unknown_keys() {
        let file = write_config("chunk_widht = 64\n");
        assert!(DecodeConfig::load(file.path()).unwrap_err().contains("unrecognized"));
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let file = write_config("chunk_threshold = 1.5\n");
        assert!(DecodeConfig::load(file.path()).is_err());
    }

    #[test]
    fn device_none_is_cpu() {
        let file = write_config("device = none\n");
        let cfg = DecodeConfig::load(file.path()).unwrap();
        assert_eq!(cfg.device(), Device::Cpu);
    }
}
