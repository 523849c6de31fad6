//! Startup configuration: one YAML file read once, deserialized with
//! serde. Per-corpus sections map manifest stems (case-insensitively) to
//! their title/date columns; `max_sum` is accepted as a legacy synonym of
//! `payload_scale`.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use loaders::CorpusFields;

fn default_registry() -> String {
    "Corpora".to_string()
}
fn default_engine_config() -> String {
    "workbench_config".to_string()
}
fn default_batch_size() -> usize {
    100
}
fn default_timeout() -> u64 {
    10
}
fn default_doctpc_type() -> Option<String> {
    Some("VectorField".to_string())
}
fn default_sim_type() -> Option<String> {
    Some("VectorFloatField".to_string())
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct CorpusSection {
    pub title_field: String,
    pub date_field: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    /// Base URL of the search engine.
    pub engine_url: url::Url,

    #[serde(default = "default_registry")]
    pub registry_collection: String,

    /// Configset used when creating collections.
    #[serde(default = "default_engine_config")]
    pub engine_config: String,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default)]
    payload_scale: Option<u64>,

    /// Legacy synonym for `payload_scale`; if both are set they must agree.
    #[serde(default)]
    max_sum: Option<u64>,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Field names never surfaced as corpus metadata.
    #[serde(default)]
    pub denylist_fields: Vec<String>,

    /// Engine field type for `doctpc_*` fields. Explicitly nulling this
    /// out makes model indexing fail with a configuration error.
    #[serde(default = "default_doctpc_type")]
    pub doctpc_field_type: Option<String>,

    /// Engine field type for `sim_*` fields.
    #[serde(default = "default_sim_type")]
    pub sim_field_type: Option<String>,

    /// Per-corpus column mappings, keyed by manifest stem.
    #[serde(default)]
    pub corpora: HashMap<String, CorpusSection>,

    /// Trainer-specific options, passed through untouched.
    #[serde(default)]
    pub mallet: HashMap<String, String>,
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Config> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading configuration file {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&raw)
            .with_context(|| format!("parsing configuration file {}", path.display()))?;
        if let (Some(scale), Some(max_sum)) = (config.payload_scale, config.max_sum) {
            if scale != max_sum {
                anyhow::bail!(
                    "payload_scale ({scale}) and max_sum ({max_sum}) disagree; set only one"
                );
            }
        }
        Ok(config)
    }

    pub fn payload_scale(&self) -> u64 {
        self.payload_scale.or(self.max_sum).unwrap_or(1000)
    }

    /// Column mapping for a corpus, located by manifest stem. Lookup is
    /// case-insensitive; a missing section is fatal for the operation.
    pub fn corpus_fields(&self, stem: &str) -> anyhow::Result<CorpusFields> {
        let wanted = stem.to_lowercase();
        let section = self
            .corpora
            .iter()
            .find(|(key, _)| key.to_lowercase() == wanted)
            .map(|(_, section)| section)
            .ok_or_else(|| {
                anyhow::anyhow!("no corpus configuration section for '{stem}'")
            })?;
        Ok(CorpusFields {
            title_field: section.title_field.clone(),
            date_field: section.date_field.clone(),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn write_config(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let (_dir, path) = write_config("engine_url: \"http://localhost:8983\"\n");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.registry_collection, "Corpora");
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.payload_scale(), 1000);
        assert_eq!(config.doctpc_field_type.as_deref(), Some("VectorField"));
    }

    #[test]
    fn max_sum_is_a_synonym_for_payload_scale() {
        let (_dir, path) = write_config(
            "engine_url: \"http://localhost:8983\"\nmax_sum: 500\n",
        );
        assert_eq!(Config::load(&path).unwrap().payload_scale(), 500);
    }

    #[test]
    fn disagreeing_scales_are_rejected() {
        let (_dir, path) = write_config(
            "engine_url: \"http://localhost:8983\"\npayload_scale: 1000\nmax_sum: 500\n",
        );
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn corpus_section_lookup_is_case_insensitive() {
        let (_dir, path) = write_config(
            "engine_url: \"http://localhost:8983\"\n\
             corpora:\n  cordis:\n    title_field: title\n    date_field: startDate\n",
        );
        let config = Config::load(&path).unwrap();
        let fields = config.corpus_fields("Cordis").unwrap();
        assert_eq!(fields.title_field, "title");
        assert_eq!(fields.date_field, "startDate");

        let err = config.corpus_fields("scipers").unwrap_err();
        assert!(err.to_string().contains("scipers"));
    }
}
