use anyhow::Result;

use taskloom_core::OrchestratorConfig;

use crate::output::OutputFormat;

pub fn show(config: &OrchestratorConfig, format: OutputFormat) -> Result<()> {
    format.emit(config, || {
        print!("{}", config.to_toml()?);
        Ok(())
    })
}
