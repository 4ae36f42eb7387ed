//! Document command handlers

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};

use rr_core::{Config, ContainerCodec, PathKind};

use super::{with_document, Access};
use crate::output::Output;

/// Create a container next to a PDF
pub fn import(config: &Config, path: &Path, output: &Output) -> Result<()> {
    if PathKind::of(path) != Some(PathKind::SourceDocument) {
        bail!("Only PDF files can be imported: {}", path.display());
    }

    let archive_path = ContainerCodec::from_config(config)
        .import_raw_document(path)
        .with_context(|| format!("Failed to import {}", path.display()))?;

    output.success(&format!("Created {}", archive_path.display()));
    Ok(())
}

/// Show a document summary
pub fn info(config: &Config, path: &Path, output: &Output) -> Result<()> {
    let info = with_document(config, path, Access::Read, |_, info| Ok(info.clone()))?;
    output.print_document(&info);
    Ok(())
}

/// Write the embedded PDF of `container` to `out`
pub fn extract(
    config: &Config,
    container: &Path,
    out: &Path,
    force: bool,
    output: &Output,
) -> Result<()> {
    if PathKind::of(container) != Some(PathKind::Container) {
        bail!("Not a .rr container: {}", container.display());
    }
    if out.exists() && !force {
        bail!(
            "{} already exists. Use --force to overwrite it.",
            out.display()
        );
    }

    let bytes = with_document(config, container, Access::Read, |commands, _| {
        Ok(commands.read_source_bytes()?)
    })?;
    fs::write(out, &bytes).with_context(|| format!("Failed to write {}", out.display()))?;

    output.success(&format!(
        "Extracted {} bytes to {}",
        bytes.len(),
        out.display()
    ));
    Ok(())
}
