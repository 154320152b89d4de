use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};
use std::time::Duration;

use anyhow::{
  Context,
  anyhow
};
use tracing::{
  debug,
  info,
  trace,
  warn
};

const CONFIG_ENV_VAR: &str =
  "TASKPAD_CONFIG";
const DEFAULT_BASE_URL: &str =
  "http://127.0.0.1:8000/api";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct Config {
  map: HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Config {
  #[tracing::instrument(skip(
    config_override
  ))]
  pub fn load(
    config_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::defaults();

    let path = resolve_config_path(
      config_override
    )?;
    if let Some(path) = path {
      info!(config = %path.display(), "loading config");
      cfg.load_file(&path)?;
    } else {
      warn!(
        "no config file found; using \
         defaults"
      );
    }

    Ok(cfg)
  }

  pub fn defaults() -> Self {
    let mut map = HashMap::new();
    map.insert(
      "api.base_url".to_string(),
      DEFAULT_BASE_URL.to_string()
    );
    map.insert(
      "api.refresh_path".to_string(),
      taskpad_wire::endpoints::DEFAULT_REFRESH
        .to_string()
    );
    map.insert(
      "api.timeout_secs".to_string(),
      DEFAULT_TIMEOUT_SECS.to_string()
    );
    map.insert(
      "data.location".to_string(),
      "~/.taskpad".to_string()
    );
    map.insert(
      "display.color".to_string(),
      "on".to_string()
    );

    Config {
      map,
      loaded_files: vec![]
    }
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k)
        .to_string();
      debug!(key = %key, value = %v, "applying override");
      self.map.insert(key, v);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  pub fn base_url(&self) -> String {
    self
      .get("api.base_url")
      .unwrap_or_else(|| {
        DEFAULT_BASE_URL.to_string()
      })
  }

  pub fn refresh_path(&self) -> String {
    self
      .get("api.refresh_path")
      .unwrap_or_else(|| {
        taskpad_wire::endpoints::DEFAULT_REFRESH
          .to_string()
      })
  }

  pub fn timeout(
    &self
  ) -> anyhow::Result<Duration> {
    let Some(raw) =
      self.get("api.timeout_secs")
    else {
      return Ok(Duration::from_secs(
        DEFAULT_TIMEOUT_SECS
      ));
    };
    let secs = raw
      .trim()
      .parse::<u64>()
      .with_context(|| {
        format!(
          "invalid api.timeout_secs: \
           {raw}"
        )
      })?;
    Ok(Duration::from_secs(secs))
  }

  pub fn iter(
    &self
  ) -> impl Iterator<Item = (&String, &String)>
  {
    self.map.iter()
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;

    let table = text
      .parse::<toml::Table>()
      .with_context(|| {
        format!(
          "invalid config file {}",
          path.display()
        )
      })?;

    self
      .loaded_files
      .push(path.clone());

    let mut flat = Vec::new();
    flatten_table(
      "",
      &table,
      &mut flat
    );
    for (key, value) in flat {
      trace!(key = %key, value = %value, "loaded config key");
      self.map.insert(key, value);
    }

    Ok(())
  }
}

fn flatten_table(
  prefix: &str,
  table: &toml::Table,
  out: &mut Vec<(String, String)>
) {
  for (key, value) in table {
    let full = if prefix.is_empty() {
      key.clone()
    } else {
      format!("{prefix}.{key}")
    };

    match value {
      | toml::Value::Table(inner) => {
        flatten_table(&full, inner, out)
      }
      | toml::Value::String(s) => {
        out.push((full, s.clone()))
      }
      | toml::Value::Boolean(b) => {
        let text =
          if *b { "on" } else { "off" };
        out.push((full, text.to_string()))
      }
      | other => {
        out.push((full, other.to_string()))
      }
    }
  }
}

#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = if let Some(path) =
    override_dir
  {
    path.to_path_buf()
  } else if let Some(cfg_value) =
    cfg.get("data.location")
  {
    expand_tilde(Path::new(&cfg_value))
  } else {
    default_data_dir()?
  };

  if !dir.exists() {
    info!(dir = %dir.display(), "creating data directory");
    fs::create_dir_all(&dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          dir.display()
        )
      })?;
  }

  Ok(dir)
}

#[tracing::instrument(skip(
  override_path
))]
fn resolve_config_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(config_env) =
    std::env::var(CONFIG_ENV_VAR)
  {
    if config_env == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      config_env
    )));
  }

  let Some(config_dir) =
    dirs::config_dir()
  else {
    return Ok(None);
  };
  let candidate = config_dir
    .join("taskpad")
    .join("config.toml");
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
}

fn default_data_dir()
-> anyhow::Result<PathBuf> {
  let home = dirs::home_dir()
    .ok_or_else(|| {
      anyhow!(
        "cannot determine home \
         directory"
      )
    })?;
  Ok(home.join(".taskpad"))
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use std::fs;

  use super::Config;

  #[test]
  fn toml_sections_flatten_to_dotted_keys()
   {
    let dir =
      tempfile::tempdir().unwrap();
    let path =
      dir.path().join("config.toml");
    fs::write(
      &path,
      "[api]\nbase_url = \
       \"https://todo.example.com/api\"\n\
       timeout_secs = 5\n\n[display]\n\
       color = false\ntimezone = \
       \"Europe/Berlin\"\n"
    )
    .unwrap();

    let cfg =
      Config::load(Some(&path)).unwrap();
    assert_eq!(
      cfg.base_url(),
      "https://todo.example.com/api"
    );
    assert_eq!(
      cfg.timeout().unwrap().as_secs(),
      5
    );
    assert_eq!(
      cfg.get("display.color").as_deref(),
      Some("off")
    );
    assert_eq!(
      cfg
        .get("display.timezone")
        .as_deref(),
      Some("Europe/Berlin")
    );
    assert_eq!(
      cfg.refresh_path(),
      "/auth/refresh/"
    );
    assert_eq!(cfg.loaded_files.len(), 1);
  }

  #[test]
  fn overrides_replace_file_values() {
    let mut cfg = Config::defaults();
    cfg.apply_overrides(vec![
      (
        "rc.api.refresh_path".to_string(),
        "/token/refresh/".to_string()
      ),
      (
        "api.timeout_secs".to_string(),
        "nope".to_string()
      ),
    ]);
    assert_eq!(
      cfg.refresh_path(),
      "/token/refresh/"
    );
    assert!(cfg.timeout().is_err());
  }
}
