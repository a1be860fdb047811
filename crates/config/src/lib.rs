//! MapScript Configuration
//!
//! Loads the script engine options from a plain text file. Both the
//! `key: value` and `key = value` spellings are accepted; `//` and `#`
//! start a comment line.

use mapscript_core::MapScriptError;
use std::fs;
use std::path::{Path, PathBuf};

/// Script engine configuration
#[derive(Debug, Clone)]
pub struct ScriptConfig {
    // ========== Compiler ==========
    /// Report argument-count mismatches against native signatures
    pub warn_func_mismatch_paramnum: bool,
    /// Report argument-type mismatches against native signatures at runtime
    pub warn_func_mismatch_argtypes: bool,
    /// Require the `{ ... }` pair around every script body
    pub require_outer_braces: bool,

    // ========== Runaway protection ==========
    /// Opcodes one run burst may execute
    pub check_cmdcount: u32,
    /// Jumps one run burst may take
    pub check_gotocount: u32,
    /// Nested user-function calls
    pub max_call_depth: usize,
    /// Evaluation stack cells
    pub stack_limit: usize,

    // ========== Input ==========
    /// Lowest accepted numeric answer for `input`
    pub input_min_value: i64,
    /// Highest accepted numeric answer for `input`
    pub input_max_value: i64,

    // ========== Actor interaction ==========
    /// Max distance in cells between an actor and an NPC holding a dialog
    pub npc_interaction_range: u32,

    // ========== Persistence ==========
    /// File holding global-persistent (`$`) variables
    pub global_reg_file: PathBuf,
    /// Seconds between periodic flushes of dirty global variables
    pub global_reg_flush_interval: u64,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            warn_func_mismatch_paramnum: true,
            warn_func_mismatch_argtypes: true,
            require_outer_braces: true,
            check_cmdcount: 65535,
            check_gotocount: 2048,
            max_call_depth: 64,
            stack_limit: 4096,
            input_min_value: 0,
            input_max_value: i32::MAX as i64,
            npc_interaction_range: 14,
            global_reg_file: PathBuf::from("save/mapreg.txt"),
            global_reg_flush_interval: 300,
        }
    }
}

impl ScriptConfig {
    /// Load configuration from a file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, MapScriptError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| MapScriptError::Config(format!("{}: {}", path.display(), e)))?;
        Ok(Self::parse(&content))
    }

    /// Parse configuration text on top of the defaults
    pub fn parse(content: &str) -> Self {
        let mut config = Self::default();

        for line in content.lines() {
            let line = line.trim();

            // Skip comments and empty lines
            if line.is_empty() || line.starts_with("//") || line.starts_with('#') {
                continue;
            }

            let split = line.find(|c| c == ':' || c == '=');
            if let Some(pos) = split {
                let key = line[..pos].trim();
                let value = line[pos + 1..].trim();
                config.parse_option(key, value);
            }
        }

        config
    }

    fn parse_option(&mut self, key: &str, value: &str) {
        match key {
            "warn_func_mismatch_paramnum" => {
                self.warn_func_mismatch_paramnum = parse_switch(value).unwrap_or(true);
            }
            "warn_func_mismatch_argtypes" => {
                self.warn_func_mismatch_argtypes = parse_switch(value).unwrap_or(true);
            }
            "require_outer_braces" => {
                self.require_outer_braces = parse_switch(value).unwrap_or(true);
            }
            "check_cmdcount" => {
                self.check_cmdcount = value.parse().unwrap_or(65535);
            }
            "check_gotocount" => {
                self.check_gotocount = value.parse().unwrap_or(2048);
            }
            "max_call_depth" => {
                self.max_call_depth = value.parse().unwrap_or(64);
            }
            "stack_limit" => {
                self.stack_limit = value.parse().unwrap_or(4096);
            }
            "input_min_value" => {
                self.input_min_value = value.parse().unwrap_or(0);
            }
            "input_max_value" => {
                self.input_max_value = value.parse().unwrap_or(i32::MAX as i64);
            }
            "npc_interaction_range" => {
                self.npc_interaction_range = value.parse().unwrap_or(14);
            }
            "global_reg_file" => self.global_reg_file = PathBuf::from(value),
            "global_reg_flush_interval" => {
                self.global_reg_flush_interval = value.parse().unwrap_or(300);
            }
            _ => {
                tracing::debug!("Unknown script option: {} = {}", key, value);
            }
        }
    }

    /// Log a configuration summary
    pub fn display(&self) {
        tracing::info!("Script configuration:");
        tracing::info!("  Param count warnings: {}", self.warn_func_mismatch_paramnum);
        tracing::info!("  Arg type warnings: {}", self.warn_func_mismatch_argtypes);
        tracing::info!("  Opcode budget: {}", self.check_cmdcount);
        tracing::info!("  Jump budget: {}", self.check_gotocount);
        tracing::info!("  Call depth: {}", self.max_call_depth);
        tracing::info!("  Input range: {}..={}", self.input_min_value, self.input_max_value);
        tracing::info!("  Interaction range: {} cells", self.npc_interaction_range);
        tracing::info!(
            "  Global variables: {} (flush every {}s)",
            self.global_reg_file.display(),
            self.global_reg_flush_interval
        );
    }
}

/// Accepts `yes/no`, `on/off`, `true/false` and numbers
fn parse_switch(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "yes" | "on" | "true" => Some(true),
        "no" | "off" | "false" => Some(false),
        other => other.parse::<i64>().ok().map(|n| n != 0),
    }
}
