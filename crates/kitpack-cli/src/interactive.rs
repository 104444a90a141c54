//! Interactive selection for the install command.
//!
//! Prompts for whatever version or integration was not given on the
//! command line. Uses dialoguer for terminal UI prompts.

use std::io::{self, Write};

use anyhow::{Result, bail};
use console::style;
use dialoguer::{Confirm, Select, theme::ColorfulTheme};

/// Pre-filled values from CLI args that skip prompts.
#[derive(Debug, Clone, Default)]
pub struct PrefilledSelection {
    /// Version tag - if Some, skip version prompt
    pub version: Option<String>,
    /// Integration name - if Some, skip integration prompt
    pub integration: Option<String>,
    /// Skip the confirmation
    pub yes: bool,
}

/// Result of interactive selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallSelection {
    pub version: String,
    pub integration: String,
    /// Whether user confirmed the install
    pub confirmed: bool,
}

/// Display label for a version; the first listed version is the latest.
pub fn version_label(version: &str, latest: Option<&str>) -> String {
    if Some(version) == latest {
        format!("{version} (latest)")
    } else {
        version.to_string()
    }
}

pub struct SelectionFlow<W: Write = io::Stdout> {
    prefilled: PrefilledSelection,
    /// Output writer (for testing)
    writer: W,
    theme: ColorfulTheme,
}

impl SelectionFlow<io::Stdout> {
    pub fn new(prefilled: PrefilledSelection) -> Self {
        Self {
            prefilled,
            writer: io::stdout(),
            theme: ColorfulTheme::default(),
        }
    }
}

impl<W: Write> SelectionFlow<W> {
    #[cfg(test)]
    pub fn with_writer(prefilled: PrefilledSelection, writer: W) -> Self {
        Self {
            prefilled,
            writer,
            theme: ColorfulTheme::default(),
        }
    }

    /// Whether the version list has to be fetched.
    pub fn needs_versions(&self) -> bool {
        self.prefilled.version.is_none()
    }

    /// Whether the integration list has to be fetched.
    pub fn needs_integrations(&self) -> bool {
        self.prefilled.integration.is_none()
    }

    /// Pick a version and an integration, then confirm.
    ///
    /// `versions` is expected newest first, as the front door lists them.
    pub fn collect(
        &mut self,
        versions: &[String],
        integrations: &[String],
    ) -> Result<InstallSelection> {
        let version = self.prompt_version(versions)?;
        writeln!(
            self.writer,
            "{} {}",
            style("Selected version:").green(),
            version
        )?;

        let integration = self.prompt_integration(integrations)?;
        writeln!(
            self.writer,
            "{} {}",
            style("Selected integration:").green(),
            integration
        )?;

        let confirmed = self.show_summary_and_confirm(&version, &integration)?;
        Ok(InstallSelection {
            version,
            integration,
            confirmed,
        })
    }

    fn prompt_version(&self, versions: &[String]) -> Result<String> {
        if let Some(version) = &self.prefilled.version {
            return Ok(version.clone());
        }
        if versions.is_empty() {
            bail!("no versions available");
        }

        let latest = versions.first().map(String::as_str);
        let labels: Vec<String> = versions.iter().map(|v| version_label(v, latest)).collect();
        let selection = Select::with_theme(&self.theme)
            .with_prompt("Select version")
            .items(&labels)
            .default(0)
            .interact()?;

        Ok(versions[selection].clone())
    }

    fn prompt_integration(&self, integrations: &[String]) -> Result<String> {
        if let Some(integration) = &self.prefilled.integration {
            return Ok(integration.clone());
        }
        if integrations.is_empty() {
            bail!("no integrations available");
        }

        let selection = Select::with_theme(&self.theme)
            .with_prompt("Select integration")
            .items(integrations)
            .default(0)
            .interact()?;

        Ok(integrations[selection].clone())
    }

    fn show_summary_and_confirm(&mut self, version: &str, integration: &str) -> Result<bool> {
        writeln!(self.writer)?;
        writeln!(self.writer, "{}", style("  Summary").bold())?;
        writeln!(self.writer, "  ───────────────────────────")?;
        writeln!(self.writer, "  Version:     {}", style(version).green())?;
        writeln!(self.writer, "  Integration: {}", style(integration).green())?;
        writeln!(self.writer)?;

        if self.prefilled.yes {
            return Ok(true);
        }

        let confirmed = Confirm::with_theme(&self.theme)
            .with_prompt("Download and install?")
            .default(true)
            .interact()?;

        Ok(confirmed)
    }
}
