//! Loader for trained topic-model directories. A model directory holds a
//! `trainconfig.json` naming the training corpus and the trainer family,
//! and a `TMmodel/` subdirectory with the sparse doc-topic and topic-word
//! matrices plus per-topic statistics. Rows are aligned by position with
//! the id list the trainer persisted next to the matrices.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::npz::{read_npy, CsrMatrix};
use crate::payload::{encode_distribution, topic_token};
use crate::LoadError;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct TrainConfig {
    #[serde(rename = "TrDtSet")]
    pub tr_dt_set: String,
    pub trainer: String,
}

/// A trained topic model on disk.
#[derive(Debug, Clone)]
pub struct TopicModel {
    path: PathBuf,
    name: String,
    config: TrainConfig,
}

impl TopicModel {
    pub fn open(path: &Path) -> Result<Self, LoadError> {
        if !path.is_dir() {
            return Err(LoadError::MissingArtifact(path.display().to_string()));
        }
        let raw = std::fs::read_to_string(path.join("trainconfig.json"))
            .map_err(|_| LoadError::MissingArtifact("trainconfig.json".to_string()))?;
        let config: TrainConfig = serde_json::from_str(&raw)?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        Ok(TopicModel { path: path.to_path_buf(), name, config })
    }

    /// The collection name: lowercased directory stem.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn trainer(&self) -> &str {
        &self.config.trainer
    }

    /// Name of the corpus collection this model was trained on: the stem
    /// of the `TrDtSet` path, lowercased like corpus collection names.
    pub fn corpus_name(&self) -> String {
        Path::new(&self.config.tr_dt_set)
            .file_stem()
            .map(|s| s.to_string_lossy().to_lowercase())
            .unwrap_or_default()
    }

    fn tm_dir(&self) -> PathBuf {
        self.path.join("TMmodel")
    }

    /// The persisted document ids, one per doc-topic matrix row. Only the
    /// mallet family defines the alignment artifact.
    pub fn doc_ids(&self) -> Result<Vec<String>, LoadError> {
        match self.config.trainer.as_str() {
            "mallet" => {
                let raw = std::fs::read_to_string(self.path.join("corpus.txt"))
                    .map_err(|_| LoadError::MissingArtifact("corpus.txt".to_string()))?;
                Ok(raw
                    .lines()
                    .filter(|line| !line.trim().is_empty())
                    .filter_map(|line| line.split_whitespace().next())
                    .map(str::to_string)
                    .collect())
            }
            other => Err(LoadError::UnsupportedTrainer(other.to_string())),
        }
    }

    /// Encodes every doc-topic row as a weighted payload, paired with the
    /// persisted id list in order. A length mismatch is fatal.
    pub fn encode_doc_topics(&self, scale: u64) -> Result<Vec<(String, String)>, LoadError> {
        let thetas = CsrMatrix::read(&self.tm_dir().join("thetas.npz"))?;
        let ids = self.doc_ids()?;
        if thetas.rows != ids.len() {
            return Err(LoadError::RowIdMismatch {
                rows: thetas.rows,
                ids: ids.len(),
            });
        }
        tracing::debug!(
            rows = thetas.rows,
            topics = thetas.cols,
            model = %self.name,
            "encoding doc-topic payloads"
        );
        Ok(ids
            .into_iter()
            .enumerate()
            .map(|(row, id)| {
                let dense = thetas.densify_row(row);
                let payload = encode_distribution(&dense, scale, row as u64, topic_token);
                (id, payload)
            })
            .collect())
    }

    /// One record per topic: payload-encoded word distribution plus the
    /// per-topic statistics passed through verbatim.
    pub fn encode_topics(&self, scale: u64) -> Result<Vec<Map<String, Value>>, LoadError> {
        let tm = self.tm_dir();
        let betas = CsrMatrix::read(&tm.join("betas.npz"))?;
        let vocab = required_lines(&tm.join("vocab.txt"))?;
        if vocab.len() != betas.cols {
            return Err(LoadError::VocabMismatch {
                cols: betas.cols,
                terms: vocab.len(),
            });
        }
        let k = betas.rows;

        let alphas = optional_f64(&tm.join("alphas.npy"), k)?;
        let entropy = optional_f64(&tm.join("topic_entropy.npy"), k)?;
        let coherence = optional_f64(&tm.join("topic_coherence.npy"), k)?;
        let ndocs_active = optional_i64(&tm.join("ndocs_active.npy"), k)?;
        let descriptions = optional_lines(&tm.join("tpc_descriptions.txt"), k);
        let labels = optional_lines(&tm.join("tpc_labels.txt"), k);
        let coords = optional_coords(&tm.join("tpc_coords.npy"), k)?;

        let mut out = Vec::with_capacity(k);
        for topic in 0..k {
            let dense = betas.densify_row(topic);
            let payload =
                encode_distribution(&dense, scale, topic as u64, |w| vocab[w].clone());
            let (active, _) = betas.row(topic);
            let terms: Vec<String> = active
                .iter()
                .map(|&w| vocab[w as usize].clone())
                .collect();

            let mut record = Map::new();
            record.insert("id".to_string(), Value::String(topic_token(topic)));
            record.insert("betas".to_string(), Value::String(payload));
            record.insert("alphas".to_string(), Value::from(alphas[topic]));
            record.insert("topic_entropy".to_string(), Value::from(entropy[topic]));
            record.insert(
                "topic_coherence".to_string(),
                Value::from(coherence[topic]),
            );
            record.insert(
                "ndocs_active".to_string(),
                Value::from(ndocs_active[topic]),
            );
            record.insert(
                "tpc_descriptions".to_string(),
                Value::String(descriptions[topic].clone()),
            );
            record.insert(
                "tpc_labels".to_string(),
                Value::String(labels[topic].clone()),
            );
            record.insert(
                "coords".to_string(),
                Value::from(vec![coords[topic].0, coords[topic].1]),
            );
            record.insert("vocab".to_string(), Value::from(terms));
            out.push(record);
        }
        Ok(out)
    }

    /// Precomputed top-K document similarities, when the artifact exists.
    /// Rows align with the doc-topic matrix; tokens are the ids of the
    /// similar documents and weights are scores scaled by `scale`.
    pub fn encode_similarities(
        &self,
        scale: u64,
    ) -> Result<Option<Vec<(String, String)>>, LoadError> {
        let path = self.tm_dir().join("distances.npz");
        if !path.exists() {
            return Ok(None);
        }
        let sims = CsrMatrix::read(&path)?;
        let ids = self.doc_ids()?;
        if sims.rows != ids.len() {
            return Err(LoadError::RowIdMismatch {
                rows: sims.rows,
                ids: ids.len(),
            });
        }
        let mut out = Vec::with_capacity(sims.rows);
        for row in 0..sims.rows {
            let (cols, scores) = sims.row(row);
            let mut payload = String::new();
            for (&col, &score) in cols.iter().zip(scores) {
                let weight = (score * scale as f64).round() as u64;
                if weight == 0 {
                    continue;
                }
                if !payload.is_empty() {
                    payload.push(' ');
                }
                payload.push_str(&ids[col as usize]);
                payload.push('|');
                payload.push_str(&weight.to_string());
            }
            out.push((ids[row].clone(), payload));
        }
        Ok(Some(out))
    }
}

fn required_lines(path: &Path) -> Result<Vec<String>, LoadError> {
    let raw = std::fs::read_to_string(path).map_err(|_| {
        LoadError::MissingArtifact(
            path.file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
        )
    })?;
    Ok(raw.lines().map(str::to_string).collect())
}

fn optional_lines(path: &Path, k: usize) -> Vec<String> {
    let mut lines: Vec<String> = std::fs::read_to_string(path)
        .map(|raw| raw.lines().map(str::to_string).collect())
        .unwrap_or_default();
    lines.resize(k, String::new());
    lines
}

fn optional_f64(path: &Path, k: usize) -> Result<Vec<f64>, LoadError> {
    if !path.exists() {
        return Ok(vec![0.0; k]);
    }
    let values = read_npy(path)?.as_f64()?;
    expect_len(path, values.len(), k)?;
    Ok(values)
}

fn optional_i64(path: &Path, k: usize) -> Result<Vec<i64>, LoadError> {
    if !path.exists() {
        return Ok(vec![0; k]);
    }
    let values = read_npy(path)?.as_i64()?;
    expect_len(path, values.len(), k)?;
    Ok(values)
}

fn optional_coords(path: &Path, k: usize) -> Result<Vec<(f64, f64)>, LoadError> {
    if !path.exists() {
        return Ok(vec![(0.0, 0.0); k]);
    }
    let values = read_npy(path)?.as_f64()?;
    expect_len(path, values.len(), k * 2)?;
    Ok(values.chunks_exact(2).map(|c| (c[0], c[1])).collect())
}

fn expect_len(path: &Path, found: usize, expected: usize) -> Result<(), LoadError> {
    if found != expected {
        return Err(LoadError::Npy(format!(
            "{} holds {found} values, expected {expected}",
            path.display()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::npz::test::csr_npz;
    use crate::payload::parse_payload;

    fn write_model(dir: &Path, trainer: &str, corpus_lines: &str) {
        std::fs::create_dir_all(dir.join("TMmodel")).unwrap();
        std::fs::write(
            dir.join("trainconfig.json"),
            serde_json::json!({
                "TrDtSet": "/data/datasets/Cordis.json",
                "trainer": trainer,
                "TMparam": {"ntopics": 3}
            })
            .to_string(),
        )
        .unwrap();
        std::fs::write(dir.join("corpus.txt"), corpus_lines).unwrap();

        // Two documents over three topics.
        let thetas = csr_npz(
            (2, 3),
            &[0, 3, 5],
            &[0, 1, 2, 0, 2],
            &[0.2, 0.3, 0.5, 0.6, 0.4],
        );
        std::fs::write(dir.join("TMmodel/thetas.npz"), thetas).unwrap();

        // Three topics over four words.
        let betas = csr_npz(
            (3, 4),
            &[0, 2, 4, 6],
            &[0, 1, 1, 2, 2, 3],
            &[0.5, 0.5, 0.25, 0.75, 0.9, 0.1],
        );
        std::fs::write(dir.join("TMmodel/betas.npz"), betas).unwrap();
        std::fs::write(dir.join("TMmodel/vocab.txt"), "energy\ngrid\nsolar\nwind\n").unwrap();
        std::fs::write(dir.join("TMmodel/tpc_labels.txt"), "Energy\nGrids\nWind\n").unwrap();
    }

    #[test]
    fn corpus_name_comes_from_the_training_set_stem() {
        let dir = tempfile::tempdir().unwrap();
        let model_dir = dir.path().join("Mallet-25");
        write_model(&model_dir, "mallet", "D1 0 text\nD2 0 text\n");
        let model = TopicModel::open(&model_dir).unwrap();
        assert_eq!(model.name(), "mallet-25");
        assert_eq!(model.corpus_name(), "cordis");
    }

    #[test]
    fn doc_topic_payloads_align_with_ids_and_sum_to_scale() {
        let dir = tempfile::tempdir().unwrap();
        let model_dir = dir.path().join("Mallet-25");
        write_model(&model_dir, "mallet", "D1 0 text\nD2 0 text\n");
        let model = TopicModel::open(&model_dir).unwrap();

        let encoded = model.encode_doc_topics(1000).unwrap();
        assert_eq!(encoded.len(), 2);
        assert_eq!(encoded[0].0, "D1");
        assert_eq!(encoded[1].0, "D2");
        for (_, payload) in &encoded {
            let pairs = parse_payload(payload);
            assert_eq!(pairs.iter().map(|(_, w)| w).sum::<u64>(), 1000);
            assert!(pairs.iter().all(|(_, w)| *w > 0));
        }
        // Document 2 has no weight on topic 1.
        assert!(!encoded[1].1.contains("t1|"));
    }

    #[test]
    fn id_list_length_mismatch_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let model_dir = dir.path().join("Mallet-25");
        write_model(&model_dir, "mallet", "D1 0 text\n");
        let model = TopicModel::open(&model_dir).unwrap();
        assert!(matches!(
            model.encode_doc_topics(1000),
            Err(LoadError::RowIdMismatch { rows: 2, ids: 1 })
        ));
    }

    #[test]
    fn topic_records_carry_stats_and_active_vocab() {
        let dir = tempfile::tempdir().unwrap();
        let model_dir = dir.path().join("Mallet-25");
        write_model(&model_dir, "mallet", "D1 0 text\nD2 0 text\n");
        let model = TopicModel::open(&model_dir).unwrap();

        let topics = model.encode_topics(1000).unwrap();
        assert_eq!(topics.len(), 3);
        assert_eq!(topics[0]["id"], "t0");
        assert_eq!(topics[2]["tpc_labels"], "Wind");

        let betas = topics[0]["betas"].as_str().unwrap();
        let pairs = parse_payload(betas);
        assert_eq!(pairs.iter().map(|(_, w)| w).sum::<u64>(), 1000);
        assert_eq!(pairs[0].0, "energy");

        let vocab: Vec<&str> = topics[1]["vocab"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        assert_eq!(vocab, vec!["grid", "solar"]);
    }

    #[test]
    fn non_mallet_trainers_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let model_dir = dir.path().join("Prodlda-10");
        write_model(&model_dir, "prodlda", "D1 0 text\nD2 0 text\n");
        let model = TopicModel::open(&model_dir).unwrap();
        assert!(matches!(
            model.doc_ids(),
            Err(LoadError::UnsupportedTrainer(t)) if t == "prodlda"
        ));
    }

    #[test]
    fn similarities_are_optional() {
        let dir = tempfile::tempdir().unwrap();
        let model_dir = dir.path().join("Mallet-25");
        write_model(&model_dir, "mallet", "D1 0 text\nD2 0 text\n");
        let model = TopicModel::open(&model_dir).unwrap();
        assert!(model.encode_similarities(1000).unwrap().is_none());

        let sims = csr_npz((2, 2), &[0, 2, 4], &[0, 1, 0, 1], &[1.0, 0.5, 0.5, 1.0]);
        std::fs::write(model_dir.join("TMmodel/distances.npz"), sims).unwrap();
        let encoded = model.encode_similarities(1000).unwrap().unwrap();
        assert_eq!(encoded[0].0, "D1");
        assert_eq!(encoded[0].1, "D1|1000 D2|500");
    }
}
