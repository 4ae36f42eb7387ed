//! Annotation command handlers

use std::path::Path;

use anyhow::{bail, Context, Result};

use rr_core::{
    AnnotationPatch, AnnotationType, Config, CreateAnnotationInput, PositionData,
    UpdateAnnotationInput,
};

use super::{with_document, Access};
use crate::output::Output;

/// Optional fields shared by create and update
#[derive(Debug, Default)]
pub struct Fields {
    pub color: Option<String>,
    pub content: Option<String>,
    /// Position payload as JSON text
    pub position: Option<String>,
}

impl Fields {
    fn position_data(&self) -> Result<Option<PositionData>> {
        self.position
            .as_deref()
            .map(|json| PositionData::from_json(json).context("Invalid --position JSON"))
            .transpose()
    }
}

/// List annotations, optionally on one page
pub fn list(config: &Config, container: &Path, page: Option<u32>, output: &Output) -> Result<()> {
    let annotations = with_document(config, container, Access::Read, |commands, _| {
        Ok(commands.get_annotations(page)?)
    })?;

    output.print_annotations(&annotations);
    Ok(())
}

/// Create an annotation
pub fn create(
    config: &Config,
    container: &Path,
    annotation_type: AnnotationType,
    page: u32,
    fields: Fields,
    output: &Output,
) -> Result<()> {
    let input = CreateAnnotationInput {
        annotation_type,
        page_number: page,
        position_data: fields.position_data()?,
        color: fields.color,
        content: fields.content,
    };

    let annotation = with_document(config, container, Access::Write, |commands, _| {
        Ok(commands.create_annotation(&input)?)
    })?;

    output.success(&format!("Created {}: {}", annotation.annotation_type, annotation.id));
    output.print_annotation(&annotation);
    Ok(())
}

/// Update an annotation
pub fn update(
    config: &Config,
    container: &Path,
    id: String,
    fields: Fields,
    output: &Output,
) -> Result<()> {
    let patch = AnnotationPatch {
        position_data: fields.position_data()?,
        color: fields.color,
        content: fields.content,
    };
    if patch.is_empty() {
        bail!("Nothing to update. Pass --color, --content or --position.");
    }

    let input = UpdateAnnotationInput { id, patch };
    let updated = with_document(config, container, Access::Write, |commands, _| {
        Ok(commands.update_annotation(&input)?)
    })?;

    if !updated {
        bail!("Annotation not found: {}", input.id);
    }
    output.success(&format!("Updated annotation: {}", input.id));
    Ok(())
}

/// Delete an annotation
pub fn delete(config: &Config, container: &Path, id: &str, output: &Output) -> Result<()> {
    let deleted = with_document(config, container, Access::Write, |commands, _| {
        Ok(commands.delete_annotation(id)?)
    })?;

    if !deleted {
        bail!("Annotation not found: {}", id);
    }
    output.success(&format!("Deleted annotation: {}", id));
    Ok(())
}
