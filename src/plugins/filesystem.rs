//! `filesystem` service
//!
//! Prepares and checks files below a host directory the application writes to.
//!
//! ```yaml
//! services:
//!   files: { type: filesystem, root: ./storage }
//! cases:
//!   upload:
//!     prepare_services:
//!       files: [clear, { file: { name: seed.txt, content: "hello" } }]
//!     check_services:
//!       - files:
//!           - exists: { name: "{{ response.data.upload.path }}" }
//!           - content: { name: seed.txt, expected: "hello", save_result_to: seed }
//! ```

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use super::{param_items, Service, ServiceChecker, ServiceContext, ServicePreparer};
use crate::common::{Error, Result, Value};
use crate::testing::{interpolate, is_equal, VariableStore};

#[derive(Debug, Clone)]
pub struct FilesystemService {
    name: String,
    root: PathBuf,
}

impl FilesystemService {
    /// Params: `root` (relative paths resolve against the configuration directory)
    pub fn from_params(ctx: &ServiceContext, params: &Value) -> Result<Self> {
        let root = params
            .get("root")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::service(&ctx.name, "'root' (string) should be set"))?;
        let root = Path::new(root);
        let root = if root.is_relative() {
            ctx.base_dir.join(root)
        } else {
            root.to_path_buf()
        };
        Ok(Self {
            name: ctx.name.clone(),
            root,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Single step of a filesystem preparer
#[derive(Debug, Clone, PartialEq)]
enum PrepareAction {
    /// Remove everything under root
    Clear,
    /// Write a file, creating parent directories
    File { name: String, content: String },
}

/// Single step of a filesystem checker
#[derive(Debug, Clone, PartialEq)]
enum CheckAction {
    Exists {
        name: String,
        exists: bool,
    },
    Content {
        name: String,
        expected: Option<Value>,
        save_result_to: Option<String>,
    },
}

impl Service for FilesystemService {
    fn preparer(&self, params: &Value) -> Result<Arc<dyn ServicePreparer>> {
        let mut actions = Vec::new();
        for item in param_items(params) {
            match item {
                Value::String(s) if s == "clear" => actions.push(PrepareAction::Clear),
                Value::Object(map) => {
                    for (key, value) in map {
                        match key.as_str() {
                            "clear" => actions.push(PrepareAction::Clear),
                            "file" => actions.push(PrepareAction::File {
                                name: required_str(&self.name, value, "file.name")?,
                                content: value
                                    .get("content")
                                    .map(Value::to_text)
                                    .unwrap_or_default(),
                            }),
                            other => {
                                return Err(Error::service(
                                    &self.name,
                                    format!("unknown filesystem preparer '{}'", other),
                                ))
                            }
                        }
                    }
                }
                other => {
                    return Err(Error::service(
                        &self.name,
                        format!("filesystem preparer should be 'clear' or a map, got {}", other),
                    ))
                }
            }
        }
        Ok(Arc::new(FilesystemPreparer {
            service: self.clone(),
            actions,
        }))
    }

    fn checker(&self, params: &Value) -> Result<Arc<dyn ServiceChecker>> {
        let mut actions = Vec::new();
        for item in param_items(params) {
            let map = item.as_object().ok_or_else(|| {
                Error::service(&self.name, format!("filesystem checker should be a map, got {}", item))
            })?;
            for (key, value) in map {
                match key.as_str() {
                    "exists" => actions.push(CheckAction::Exists {
                        name: required_str(&self.name, value, "exists.name")?,
                        exists: value.get("exists").and_then(Value::as_bool).unwrap_or(true),
                    }),
                    "content" => actions.push(CheckAction::Content {
                        name: required_str(&self.name, value, "content.name")?,
                        expected: value.get("expected").cloned(),
                        save_result_to: value
                            .get("save_result_to")
                            .and_then(Value::as_str)
                            .map(str::to_string),
                    }),
                    other => {
                        return Err(Error::service(
                            &self.name,
                            format!("unknown filesystem checker '{}'", other),
                        ))
                    }
                }
            }
        }
        Ok(Arc::new(FilesystemChecker {
            service: self.clone(),
            actions,
        }))
    }
}

fn required_str(service: &str, params: &Value, field: &str) -> Result<String> {
    let key = field.rsplit('.').next().unwrap_or(field);
    params
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::service(service, format!("'{}' (string) should be set", field)))
}

pub struct FilesystemPreparer {
    service: FilesystemService,
    actions: Vec<PrepareAction>,
}

#[async_trait]
impl ServicePreparer for FilesystemPreparer {
    async fn prepare(&self) -> Result<()> {
        let root = self.service.root();
        for action in &self.actions {
            match action {
                PrepareAction::Clear => {
                    tracing::debug!(service = %self.service.name, root = %root.display(), "Clearing directory");
                    clear_dir(root)
                        .await
                        .map_err(|e| Error::service(&self.service.name, format!("unable to clear '{}': {}", root.display(), e)))?;
                }
                PrepareAction::File { name, content } => {
                    let path = root.join(name);
                    tracing::debug!(service = %self.service.name, file = %path.display(), "Writing file");
                    if let Some(parent) = path.parent() {
                        tokio::fs::create_dir_all(parent).await?;
                    }
                    tokio::fs::write(&path, content).await.map_err(|e| {
                        Error::service(&self.service.name, format!("unable to write '{}': {}", path.display(), e))
                    })?;
                }
            }
        }
        Ok(())
    }
}

/// Remove every entry of a directory; a missing directory counts as clear
async fn clear_dir(root: &Path) -> std::io::Result<()> {
    let mut entries = match tokio::fs::read_dir(root).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            tokio::fs::remove_dir_all(entry.path()).await?;
        } else {
            tokio::fs::remove_file(entry.path()).await?;
        }
    }
    Ok(())
}

pub struct FilesystemChecker {
    service: FilesystemService,
    actions: Vec<CheckAction>,
}

impl FilesystemChecker {
    fn resolve_name(&self, name: &str, variables: &VariableStore) -> Result<PathBuf> {
        let name = interpolate(&Value::from(name), variables)?.to_text();
        Ok(self.service.root().join(name))
    }
}

#[async_trait]
impl ServiceChecker for FilesystemChecker {
    async fn check(&self, variables: &mut VariableStore) -> Result<()> {
        for action in &self.actions {
            match action {
                CheckAction::Exists { name, exists } => {
                    let path = self.resolve_name(name, variables)?;
                    let actual = tokio::fs::try_exists(&path).await?;
                    if actual != *exists {
                        let state = if actual { "exists" } else { "does not exist" };
                        return Err(Error::service(
                            &self.service.name,
                            format!("file '{}' {}", path.display(), state),
                        ));
                    }
                }
                CheckAction::Content {
                    name,
                    expected,
                    save_result_to,
                } => {
                    let path = self.resolve_name(name, variables)?;
                    let content = tokio::fs::read(&path).await.map_err(|e| {
                        Error::service(&self.service.name, format!("unable to read '{}': {}", path.display(), e))
                    })?;
                    if let Some(expected) = expected {
                        let expected = interpolate(expected, variables)?;
                        is_equal(&Value::Bytes(content.clone()), &expected)?;
                    }
                    if let Some(key) = save_result_to {
                        variables.save(key.clone(), Value::from(String::from_utf8_lossy(&content).into_owned()));
                    }
                }
            }
        }
        Ok(())
    }
}
