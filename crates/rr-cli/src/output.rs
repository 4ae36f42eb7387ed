//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use serde::Serialize;

use rr_core::{Annotation, DocumentInfo};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Print a document summary
    pub fn print_document(&self, info: &DocumentInfo) {
        match self.format {
            OutputFormat::Human => {
                println!("Container:  {}", info.archive_path.display());
                println!(
                    "Title:      {}",
                    info.title.as_deref().unwrap_or("(untitled)")
                );
                println!("Pages:      {}", optional_number(info.page_count));
                println!("Last page:  {}", optional_number(info.last_page));
            }
            OutputFormat::Json => print_json(info),
            OutputFormat::Quiet => {
                println!("{}", info.archive_path.display());
            }
        }
    }

    /// Print a single annotation
    pub fn print_annotation(&self, annotation: &Annotation) {
        match self.format {
            OutputFormat::Human => {
                println!("ID:       {}", annotation.id);
                println!("Type:     {}", annotation.annotation_type);
                println!("Page:     {}", annotation.page_number);
                if let Some(ref color) = annotation.color {
                    println!("Color:    {}", color);
                }
                if let Some(ref content) = annotation.content {
                    println!("Content:  {}", content);
                }
                if let Some(text) = annotation
                    .position_data
                    .as_ref()
                    .and_then(|p| p.selected_text.as_deref())
                {
                    println!("Text:     \"{}\"", truncate(text, 60));
                }
                println!(
                    "Created:  {}",
                    annotation.created_at.format("%Y-%m-%d %H:%M")
                );
                println!(
                    "Updated:  {}",
                    annotation.updated_at.format("%Y-%m-%d %H:%M")
                );
            }
            OutputFormat::Json => print_json(annotation),
            OutputFormat::Quiet => {
                println!("{}", annotation.id);
            }
        }
    }

    /// Print a list of annotations
    pub fn print_annotations(&self, annotations: &[Annotation]) {
        match self.format {
            OutputFormat::Human => {
                if annotations.is_empty() {
                    println!("No annotations found.");
                    return;
                }
                for annotation in annotations {
                    let summary = annotation
                        .content
                        .as_deref()
                        .or_else(|| {
                            annotation
                                .position_data
                                .as_ref()
                                .and_then(|p| p.selected_text.as_deref())
                        })
                        .unwrap_or("");
                    println!(
                        "{} | p.{:<4} | {:<9} | {}",
                        short_id(&annotation.id),
                        annotation.page_number,
                        annotation.annotation_type.as_str(),
                        truncate_line(summary, 50)
                    );
                }
                println!("\n{} annotation(s)", annotations.len());
            }
            OutputFormat::Json => print_json(annotations),
            OutputFormat::Quiet => {
                for annotation in annotations {
                    println!("{}", annotation.id);
                }
            }
        }
    }

    /// Print a metadata value
    pub fn print_metadata(&self, key: &str, value: Option<&str>) {
        match self.format {
            OutputFormat::Human => match value {
                Some(value) => println!("{} = {}", key, value),
                None => println!("{} is not set", key),
            },
            OutputFormat::Json => {
                println!("{}", serde_json::json!({ "key": key, "value": value }));
            }
            OutputFormat::Quiet => {
                if let Some(value) = value {
                    println!("{}", value);
                }
            }
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to serialize output: {}", e),
    }
}

fn optional_number(value: Option<u32>) -> String {
    value
        .map(|n| n.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// First eight characters of an ID
fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

/// Truncate a string to max length, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Truncate to first line and max length
fn truncate_line(s: &str, max_len: usize) -> String {
    let first_line = s.lines().next().unwrap_or("");
    truncate(first_line, max_len)
}
