//! Command handlers

pub mod annotation;
pub mod config;
pub mod document;
pub mod meta;
pub mod serve;

use std::path::Path;

use anyhow::{bail, Context, Result};

use rr_core::{Commands, Config, DocumentInfo, PathKind};

/// What a handler does with the document it opens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Only reads; the container is left byte-for-byte as it was
    Read,
    /// Modifies; the container is saved once the handler succeeds
    Write,
}

/// Open `path`, run `f` on the open document, then close it
///
/// Read access only accepts existing `.rr` containers and closes without
/// packing. Write access also imports a bare PDF, and a successful `f` is
/// followed by an explicit save so a failed write is reported instead of
/// only logged.
pub fn with_document<T>(
    config: &Config,
    path: &Path,
    access: Access,
    f: impl FnOnce(&Commands, &DocumentInfo) -> Result<T>,
) -> Result<T> {
    if access == Access::Read && PathKind::of(path) != Some(PathKind::Container) {
        bail!(
            "Not a .rr container: {}. Run `rrdoc import` first.",
            path.display()
        );
    }

    let commands = Commands::new(config);
    let info = commands
        .open_file(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let result = f(&commands, &info);
    match access {
        Access::Read => {
            commands.discard_file();
            result
        }
        Access::Write => {
            let saved = match &result {
                Ok(_) => commands.save_file().context("Failed to save document"),
                Err(_) => Ok(()),
            };
            commands.close_file();
            saved?;
            result
        }
    }
}
