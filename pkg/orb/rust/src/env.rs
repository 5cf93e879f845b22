// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::errors::ConfigError;

pub const DEFAULT_DOTENV: &str = ".env";

/// Parse a systemd-style environment file into key-value pairs.
/// Supports `KEY=VALUE`, `KEY="VALUE"`, `KEY='VALUE'`, comments (#), and blank lines.
pub fn parse_environment_file(path: &Path) -> Result<Vec<(String, String)>, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::EnvFile {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_environment(&contents))
}

fn parse_environment(contents: &str) -> Vec<(String, String)> {
    let mut vars = Vec::new();
    for line in contents.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        if let Some((key, raw_val)) = trimmed.split_once('=') {
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            let val = raw_val
                .trim()
                .trim_matches('"')
                .trim_matches('\'')
                .to_string();
            vars.push((key.to_string(), val));
        }
    }
    vars
}

/// The supervisor's inherited environment plus the variables loaded from
/// env files. File values never replace a variable that is already set.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    vars: HashMap<String, String>,
    overlay: Vec<(String, String)>,
}

impl Environment {
    pub fn inherit() -> Self {
        let vars = std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect();
        Self::from_vars(vars)
    }

    pub fn from_vars(vars: HashMap<String, String>) -> Self {
        Self {
            vars,
            overlay: Vec::new(),
        }
    }

    /// Load `./.env` (unless skipped) followed by every explicit file.
    pub fn load(mut self, files: &[PathBuf], skip_dotenv: bool) -> Result<Self, ConfigError> {
        if !skip_dotenv {
            let dotenv = Path::new(DEFAULT_DOTENV);
            if dotenv.is_file() {
                match parse_environment_file(dotenv) {
                    Ok(vars) => self.apply(dotenv, vars),
                    Err(e) => warn!("skipping {}: {}", DEFAULT_DOTENV, e),
                }
            }
        }
        for file in files {
            let vars = parse_environment_file(file)?;
            self.apply(file, vars);
        }
        Ok(self)
    }

    fn apply(&mut self, path: &Path, vars: Vec<(String, String)>) {
        let mut added = 0usize;
        for (key, value) in vars {
            if self.vars.contains_key(&key) {
                continue;
            }
            self.vars.insert(key.clone(), value.clone());
            self.overlay.push((key, value));
            added += 1;
        }
        info!("loaded {} variables from {}", added, path.display());
    }

    /// Full view used for template `Env` lookups.
    pub fn vars(&self) -> &HashMap<String, String> {
        &self.vars
    }

    /// Variables that came from env files, to be set on spawned processes.
    pub fn overlay(&self) -> &[(String, String)] {
        &self.overlay
    }
}
