//! Suite loading
//!
//! A suite is either a single YAML file or a directory tree of them. Files and
//! directories whose names start with `_` are ignored, which keeps shared
//! snippets and drafts out of the suite.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use walkdir::WalkDir;

use super::config::{merge_cases, Config, ConfigFragment};
use crate::common::{Error, Result};

/// Load and join every configuration file found at `path`
pub fn load(path: &Path) -> Result<Config> {
    let path = if path.is_relative() {
        std::env::current_dir()?.join(path)
    } else {
        path.to_path_buf()
    };

    let files = discover_config_files(&path)?;
    if files.is_empty() {
        return Err(Error::Config(format!(
            "No configuration files found in '{}'",
            path.display()
        )));
    }

    let mut fragments = Vec::with_capacity(files.len());
    for file in &files {
        tracing::debug!(file = %file.display(), "Loading configuration fragment");
        fragments.push(load_fragment(file)?);
    }

    let base_dir = if path.is_dir() {
        path.clone()
    } else {
        path.parent().map(Path::to_path_buf).unwrap_or_default()
    };

    let config = join_fragments(fragments, base_dir)?;
    tracing::info!(
        files = files.len(),
        services = config.services.len(),
        general_cases = config.general_cases.len(),
        "Configuration loaded"
    );
    Ok(config)
}

/// Collect configuration files in deterministic (sorted) order
pub fn discover_config_files(path: &Path) -> Result<Vec<PathBuf>> {
    if !path.exists() {
        return Err(Error::FileRead {
            path: path.display().to_string(),
            error: "no such file or directory".to_string(),
        });
    }
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut files = Vec::new();
    let walker = WalkDir::new(path)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden_name(entry.file_name()));
    for entry in walker {
        let entry = entry.map_err(|e| Error::Config(format!("Failed to walk directory: {}", e)))?;
        if entry.file_type().is_file() && is_config_file(entry.path()) {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn is_hidden_name(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with('_')
}

fn is_config_file(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext == "yml" || ext == "yaml")
}

/// Parse a single configuration file
pub fn load_fragment(path: &Path) -> Result<ConfigFragment> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
        path: path.display().to_string(),
        error: e.to_string(),
    })?;
    serde_yaml::from_str(&content).map_err(|e| Error::ConfigParse {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

/// Join fragments; any name or field defined twice is a conflict
pub fn join_fragments(fragments: Vec<ConfigFragment>, base_dir: PathBuf) -> Result<Config> {
    let mut application = None;
    let mut services = IndexMap::new();
    let mut environment = IndexMap::new();
    let mut general_cases = IndexMap::new();
    let mut cases = IndexMap::new();

    for fragment in fragments {
        if let Some(app) = fragment.application {
            if application.is_some() {
                return Err(Error::conflict("application", "application"));
            }
            application = Some(app);
        }
        insert_unique(&mut services, fragment.services, "services")?;
        insert_unique(&mut environment, fragment.environment, "environment")?;
        insert_unique(&mut general_cases, fragment.general_cases, "general_cases")?;
        merge_cases(&mut cases, fragment.cases, "")?;
    }

    let application = application
        .ok_or_else(|| Error::Config("'application' section is not defined".to_string()))?;
    if application.request_type.is_empty() {
        return Err(Error::Config(
            "'application.request_type' must not be empty".to_string(),
        ));
    }

    Ok(Config {
        application,
        services,
        environment,
        general_cases,
        cases,
        base_dir,
    })
}

fn insert_unique<T>(
    dst: &mut IndexMap<String, T>,
    src: IndexMap<String, T>,
    section: &str,
) -> Result<()> {
    for (name, value) in src {
        if dst.contains_key(&name) {
            return Err(Error::conflict(section, &name));
        }
        dst.insert(name, value);
    }
    Ok(())
}
