//! Metadata command handlers

use std::path::Path;

use anyhow::Result;

use rr_core::Config;

use super::{with_document, Access};
use crate::output::Output;

/// Print one metadata value
pub fn get(config: &Config, container: &Path, key: &str, output: &Output) -> Result<()> {
    let value = with_document(config, container, Access::Read, |commands, _| {
        Ok(commands.get_metadata(key)?)
    })?;

    output.print_metadata(key, value.as_deref());
    Ok(())
}

/// Insert or replace one metadata value
pub fn set(config: &Config, container: &Path, key: &str, value: &str, output: &Output) -> Result<()> {
    with_document(config, container, Access::Write, |commands, _| {
        Ok(commands.set_metadata(key, value)?)
    })?;

    output.success(&format!("Set {} = {}", key, value));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputFormat;
    use rr_core::{Commands, ContainerCodec};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_set_then_get() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config {
            work_dir: temp_dir.path().join("work"),
            ..Config::default()
        };
        let pdf = temp_dir.path().join("book.pdf");
        fs::write(&pdf, b"%PDF-1.4\n%%EOF\n").unwrap();
        let container = ContainerCodec::from_config(&config)
            .import_raw_document(&pdf)
            .unwrap();
        let output = Output::new(OutputFormat::Quiet);

        set(&config, &container, "page_count", "320", &output).unwrap();
        set(&config, &container, "page_count", "321", &output).unwrap();
        get(&config, &container, "page_count", &output).unwrap();

        let commands = Commands::new(&config);
        let info = commands.open_file(&container).unwrap();
        assert_eq!(info.page_count, Some(321));
        assert_eq!(info.title.as_deref(), Some("book"));
        commands.close_file();
    }
}
