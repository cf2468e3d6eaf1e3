//! Ambient configuration loading: `COWORK_HOME/config.toml` merged with a
//! project-local `.agent/config.toml` and environment overrides.

use std::collections::HashSet;
use std::path::Path;
use std::path::PathBuf;

use dirs::home_dir;
use serde::Deserialize;

use crate::error::CoworkErr;
use crate::error::Result;

const CONFIG_TOML_FILE: &str = "config.toml";
const PROJECT_CONFIG_DIR: &str = ".agent";

/// Raw shape of `config.toml`. Every field is optional: a missing file, or a
/// missing field within one, falls back to the default in [`Config`].
#[derive(Debug, Default, Deserialize)]
struct ConfigToml {
    provider: Option<String>,
    model: Option<String>,
    sub_agent_model: Option<String>,
    step_budget: Option<usize>,
    #[serde(default)]
    command_deny_list: Vec<Vec<String>>,
    rollout_dir: Option<PathBuf>,
}

/// Resolved configuration the Session Registry hands to each new session.
#[derive(Debug, Clone)]
pub struct Config {
    pub provider: String,
    pub model: String,
    pub sub_agent_model: Option<String>,
    pub step_budget: usize,
    pub command_deny_list: HashSet<Vec<String>>,
    /// Directory append-only turn transcripts (the rollout write-ahead log)
    /// are written under, one file per session. `None` disables
    /// persistence, e.g. in tests.
    pub rollout_dir: Option<PathBuf>,
    pub cowork_home: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: "google".to_string(),
            model: "gemini-3-flash-preview".to_string(),
            sub_agent_model: None,
            step_budget: crate::turn::DEFAULT_STEP_BUDGET,
            command_deny_list: HashSet::new(),
            rollout_dir: None,
            cowork_home: PathBuf::from(".cowork"),
        }
    }
}

impl Config {
    /// Loads `COWORK_HOME/config.toml`, overlays a project-local
    /// `<cwd>/.agent/config.toml` if present, then applies environment
    /// variable overrides. Sessions don't have named profiles, so this is a
    /// plain base-then-project-then-env layering.
    pub fn load(cwd: &Path) -> Result<Self> {
        let cowork_home = find_cowork_home()?;
        let mut merged = load_toml_at(&cowork_home.join(CONFIG_TOML_FILE))?;
        let project = load_toml_at(&cwd.join(PROJECT_CONFIG_DIR).join(CONFIG_TOML_FILE))?;
        merge_onto(&mut merged, project);

        let mut config = Config {
            cowork_home,
            ..Config::default()
        };
        if let Some(provider) = merged.provider {
            config.provider = provider;
        }
        if let Some(model) = merged.model {
            config.model = model;
        }
        config.sub_agent_model = merged.sub_agent_model;
        if let Some(budget) = merged.step_budget {
            config.step_budget = budget;
        }
        config.command_deny_list = merged.command_deny_list.into_iter().collect();
        config.rollout_dir = merged.rollout_dir.or_else(|| Some(config.cowork_home.join("rollouts")));

        if let Ok(provider) = std::env::var("COWORK_PROVIDER") {
            config.provider = provider;
        }
        if let Ok(model) = std::env::var("COWORK_MODEL") {
            config.model = model;
        }

        tracing::debug!(
            provider = %config.provider,
            model = %config.model,
            step_budget = config.step_budget,
            "resolved session config"
        );
        Ok(config)
    }
}

fn load_toml_at(path: &Path) -> Result<ConfigToml> {
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            tracing::debug!(path = %path.display(), "loaded config file");
            toml::from_str(&contents).map_err(CoworkErr::from)
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(ConfigToml::default()),
        Err(err) => Err(CoworkErr::Io(err)),
    }
}

/// Overlays `overlay` onto `base`, field by field; `overlay`'s `Some`/
/// non-empty values win. Used for the project-local `.agent/config.toml`
/// layer on top of `COWORK_HOME`'s.
fn merge_onto(base: &mut ConfigToml, overlay: ConfigToml) {
    if overlay.provider.is_some() {
        base.provider = overlay.provider;
    }
    if overlay.model.is_some() {
        base.model = overlay.model;
    }
    if overlay.sub_agent_model.is_some() {
        base.sub_agent_model = overlay.sub_agent_model;
    }
    if overlay.step_budget.is_some() {
        base.step_budget = overlay.step_budget;
    }
    if !overlay.command_deny_list.is_empty() {
        base.command_deny_list = overlay.command_deny_list;
    }
    if overlay.rollout_dir.is_some() {
        base.rollout_dir = overlay.rollout_dir;
    }
}

/// `COWORK_HOME` env var if set, else `~/.cowork`. A missing directory is
/// not an error: sessions create it lazily on first rollout write.
pub fn find_cowork_home() -> Result<PathBuf> {
    if let Ok(val) = std::env::var("COWORK_HOME")
        && !val.is_empty()
    {
        return Ok(PathBuf::from(val));
    }
    let mut home = home_dir().ok_or_else(|| {
        CoworkErr::Other("could not determine home directory for COWORK_HOME default".to_string())
    })?;
    home.push(".cowork");
    Ok(home)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_no_files_present() {
        let tmp = tempfile::tempdir().expect("tempdir");
        unsafe {
            std::env::set_var("COWORK_HOME", tmp.path().join("home"));
        }
        let config = Config::load(tmp.path()).expect("load");
        assert_eq!(config.provider, "google");
        assert_eq!(config.model, "gemini-3-flash-preview");
        unsafe {
            std::env::remove_var("COWORK_HOME");
        }
    }

    #[test]
    fn project_local_config_overrides_home() {
        let tmp = tempfile::tempdir().expect("tempdir");
        unsafe {
            std::env::set_var("COWORK_HOME", tmp.path().join("home"));
        }
        std::fs::create_dir_all(tmp.path().join(".agent")).expect("mkdir");
        std::fs::write(
            tmp.path().join(".agent").join(CONFIG_TOML_FILE),
            "provider = \"anthropic\"\nmodel = \"claude-opus-4-6\"\n",
        )
        .expect("write");

        let config = Config::load(tmp.path()).expect("load");
        assert_eq!(config.provider, "anthropic");
        assert_eq!(config.model, "claude-opus-4-6");
        unsafe {
            std::env::remove_var("COWORK_HOME");
        }
    }
}
