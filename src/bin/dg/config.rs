use std::fs;
use std::path::{Path, PathBuf};

use dyngraph::cli::CliError;
use serde::{Deserialize, Serialize};

use super::ui::Theme;

/// Defaults read from the optional TOML config file.
#[derive(Debug, Default)]
pub struct CliConfig {
    path: Option<PathBuf>,
    data: RawConfig,
}

impl CliConfig {
    pub fn load(explicit: Option<PathBuf>) -> Result<Self, CliError> {
        let path = explicit.or_else(default_config_path);
        let data = match path.as_ref() {
            Some(config_path) if config_path.exists() => read_file(config_path)?,
            _ => RawConfig::default(),
        };
        Ok(Self { path, data })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn csv(&self) -> &CsvSection {
        &self.data.csv
    }

    pub fn graph(&self) -> &GraphSection {
        &self.data.graph
    }

    pub fn loader(&self) -> &LoaderSection {
        &self.data.loader
    }

    pub fn theme(&self) -> Result<Theme, CliError> {
        match self.data.ui.theme.as_deref() {
            None => Ok(Theme::Auto),
            Some(raw) => Theme::parse(raw)
                .ok_or_else(|| CliError::Message(format!("unknown theme '{raw}' in config"))),
        }
    }
}

fn read_file(path: &Path) -> Result<RawConfig, CliError> {
    let contents = fs::read_to_string(path).map_err(|source| CliError::ReadConfig {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| CliError::ParseConfig {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct RawConfig {
    #[serde(default)]
    csv: CsvSection,
    #[serde(default)]
    graph: GraphSection,
    #[serde(default)]
    loader: LoaderSection,
    #[serde(default)]
    ui: UiSection,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct CsvSection {
    pub src_col: Option<String>,
    pub dst_col: Option<String>,
    pub time_col: Option<String>,
    pub feature_cols: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct GraphSection {
    pub time_unit: Option<String>,
    pub backend: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct LoaderSection {
    pub batch_size: Option<usize>,
    pub batch_unit: Option<String>,
    pub drop_last: Option<bool>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct UiSection {
    theme: Option<String>,
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("dyngraph").join("dg.toml"))
}
