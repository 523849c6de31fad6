//! Streaming loader for logical corpora. A logical corpus is a small JSON
//! manifest naming one parquet file, the id column and the lemma columns;
//! the loader turns each parquet row into a flat JSON record ready for the
//! engine, computing the derived fields (`all_lemmas`, `nwords_per_doc`,
//! `bow`) and normalizing timestamps on the way through.

use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use parquet::basic::{ConvertedType, LogicalType, Type as PhysicalType};
use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::record::reader::RowIter;
use serde_json::{Map, Value};

use crate::sanitize::clean_xml_string;
use crate::LoadError;

/// Wire format every date field is normalized to before indexing.
const INSTANT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// Per-corpus column mapping, resolved from the configuration section
/// keyed by the manifest stem.
#[derive(Debug, Clone)]
pub struct CorpusFields {
    pub title_field: String,
    pub date_field: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
struct Manifest {
    #[serde(rename = "Dtsets")]
    datasets: Vec<Dataset>,
}

#[derive(Debug, Clone, serde::Deserialize)]
struct Dataset {
    parquet: PathBuf,
    idfld: String,
    #[serde(rename = "lemmasfld", default)]
    lemmas_fields: Vec<String>,
}

/// A logical corpus: manifest plus the configured column mapping. Opening
/// the corpus only reads the manifest; rows stream on demand.
#[derive(Debug, Clone)]
pub struct LogicalCorpus {
    name: String,
    dataset: Dataset,
    fields: CorpusFields,
}

impl LogicalCorpus {
    pub fn open(manifest_path: &Path, fields: CorpusFields) -> Result<Self, LoadError> {
        let raw = std::fs::read_to_string(manifest_path)?;
        let manifest: Manifest = serde_json::from_str(&raw)?;
        if manifest.datasets.len() != 1 {
            return Err(LoadError::MultipleDatasets(manifest.datasets.len()));
        }
        let mut dataset = manifest.datasets.into_iter().next().unwrap();

        // Relative data paths are anchored at the manifest's directory.
        if dataset.parquet.is_relative() {
            if let Some(parent) = manifest_path.parent() {
                dataset.parquet = parent.join(&dataset.parquet);
            }
        }

        let name = manifest_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        Ok(LogicalCorpus {
            name,
            dataset,
            fields,
        })
    }

    /// The collection name: lowercased manifest stem.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Opens the parquet file and returns the lazy document stream. The
    /// stream is finite and non-restartable; call again for a fresh pass.
    pub fn stream(&self) -> Result<DocumentStream, LoadError> {
        let file = File::open(&self.dataset.parquet)?;
        let reader = SerializedFileReader::try_from(file)?;

        let mut renames = HashMap::new();
        renames.insert(self.dataset.idfld.clone(), "id".to_string());
        renames.insert(self.fields.title_field.clone(), "title".to_string());
        renames.insert(self.fields.date_field.clone(), "date".to_string());
        let rename = |name: &str| -> String {
            renames.get(name).cloned().unwrap_or_else(|| name.to_string())
        };

        let file_meta = reader.metadata().file_metadata();
        let total_rows = file_meta.num_rows().max(0) as u64;

        let mut columns = Vec::new();
        let mut timestamp_columns = HashSet::new();
        let mut saw_id_source = false;
        for column in file_meta.schema_descr().columns() {
            let source_name = column.path().parts().join(".");
            saw_id_source |= source_name == self.dataset.idfld;
            let renamed = rename(&source_name);
            if is_timestamp_column(
                column.physical_type(),
                column.converted_type(),
                column.logical_type(),
            ) {
                timestamp_columns.insert(renamed.clone());
            }
            columns.push(renamed);
        }
        if !saw_id_source {
            return Err(LoadError::MissingColumn(self.dataset.idfld.clone()));
        }
        columns.extend(
            ["all_lemmas", "nwords_per_doc", "bow"]
                .into_iter()
                .map(str::to_string),
        );

        let lemma_columns: Vec<String> = self
            .dataset
            .lemmas_fields
            .iter()
            .map(|f| rename(f))
            .collect();

        Ok(DocumentStream {
            iter: reader.into_iter(),
            renames,
            timestamp_columns,
            lemma_columns,
            columns,
            total_rows,
            dictionary: Dictionary::default(),
        })
    }
}

/// Lazy, finite, non-restartable sequence of flat engine-ready records.
pub struct DocumentStream {
    iter: RowIter<'static>,
    renames: HashMap<String, String>,
    timestamp_columns: HashSet<String>,
    lemma_columns: Vec<String>,
    columns: Vec<String>,
    total_rows: u64,
    dictionary: Dictionary,
}

impl DocumentStream {
    /// Field names of the emitted records, renames applied and derived
    /// columns included. Available before any row is consumed, so the
    /// registry record can be written in the same pass.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn total_rows(&self) -> u64 {
        self.total_rows
    }

    fn transform(&mut self, value: Value) -> Result<Map<String, Value>, LoadError> {
        let obj = match value {
            Value::Object(obj) => obj,
            other => {
                return Err(parquet::errors::ParquetError::General(format!(
                    "row decoded to a non-record value: {other}"
                ))
                .into())
            }
        };

        let mut out = Map::new();
        for (key, value) in obj {
            let key = self
                .renames
                .get(&key)
                .cloned()
                .unwrap_or(key);

            let mut value = match value {
                Value::Null => Value::String(String::new()),
                v => v,
            };
            if let Value::String(s) = &value {
                if let Cow::Owned(cleaned) = clean_xml_string(s) {
                    value = Value::String(cleaned);
                }
            }
            if self.timestamp_columns.contains(&key) {
                let raw = value.as_str().unwrap_or("");
                value = Value::String(normalize_instant(raw));
            }
            out.insert(key, value);
        }

        let all_lemmas = self
            .lemma_columns
            .iter()
            .filter_map(|c| out.get(c).and_then(Value::as_str))
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        let nwords = all_lemmas.split_whitespace().count();
        let bow = self
            .dictionary
            .bow_string(&all_lemmas)
            .map(Value::String)
            .unwrap_or(Value::Null);

        out.insert("all_lemmas".to_string(), Value::String(all_lemmas));
        out.insert("nwords_per_doc".to_string(), Value::from(nwords as u64));
        out.insert("bow".to_string(), bow);
        Ok(out)
    }
}

impl Iterator for DocumentStream {
    type Item = Result<Map<String, Value>, LoadError>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.iter.next()?;
        Some(match row {
            Ok(row) => self.transform(row.to_json_value()),
            Err(e) => Err(e.into()),
        })
    }
}

fn is_timestamp_column(
    physical: PhysicalType,
    converted: ConvertedType,
    logical: Option<LogicalType>,
) -> bool {
    matches!(logical, Some(LogicalType::Timestamp { .. }))
        || matches!(
            converted,
            ConvertedType::TIMESTAMP_MILLIS | ConvertedType::TIMESTAMP_MICROS
        )
        // Legacy writers persist timestamps as INT96.
        || physical == PhysicalType::INT96
}

/// Normalizes a source timestamp to the UTC instant wire format. Invalid
/// values and empty strings produce the empty string.
pub fn normalize_instant(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return String::new();
    }

    let zoned = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f %z")
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z"))
        .map(|dt| dt.with_timezone(&Utc));
    let parsed: Option<DateTime<Utc>> = match zoned {
        Ok(dt) => Some(dt),
        Err(_) => NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f"))
            .ok()
            .map(|naive| naive.and_utc()),
    };

    match parsed {
        Some(dt) => dt.format(INSTANT_FORMAT).to_string(),
        None => String::new(),
    }
}

/// Corpus-wide token dictionary. Tokens get dense integer ids in
/// first-encounter order; bag-of-words strings list `word|count` pairs in
/// dictionary-id order, mirroring the trainers' own dictionaries.
#[derive(Debug, Default)]
struct Dictionary {
    ids: HashMap<String, usize>,
}

impl Dictionary {
    fn bow_string(&mut self, text: &str) -> Option<String> {
        let mut counts: HashMap<usize, u64> = HashMap::new();
        let mut words: HashMap<usize, &str> = HashMap::new();
        for token in text.split_whitespace() {
            let next_id = self.ids.len();
            let id = *self
                .ids
                .entry(token.to_string())
                .or_insert(next_id);
            *counts.entry(id).or_insert(0) += 1;
            words.entry(id).or_insert(token);
        }
        if counts.is_empty() {
            return None;
        }
        let mut ids: Vec<usize> = counts.keys().copied().collect();
        ids.sort_unstable();
        Some(
            ids.iter()
                .map(|id| format!("{}|{}", words[id], counts[id]))
                .collect::<Vec<_>>()
                .join(" "),
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn plain_timestamp_normalizes_to_utc_instant() {
        assert_eq!(
            normalize_instant("2011-12-03 10:15:30"),
            "2011-12-03T10:15:30.000000Z"
        );
    }

    #[test]
    fn zoned_timestamp_is_converted() {
        // Shape produced by the parquet row-to-json conversion.
        assert_eq!(
            normalize_instant("2024-01-01 02:13:00 +00:00"),
            "2024-01-01T02:13:00.000000Z"
        );
        assert_eq!(
            normalize_instant("2024-01-01 02:13:00 +02:00"),
            "2024-01-01T00:13:00.000000Z"
        );
    }

    #[test]
    fn fractional_seconds_survive() {
        assert_eq!(
            normalize_instant("2019-06-01 00:00:00.250"),
            "2019-06-01T00:00:00.250000Z"
        );
    }

    #[test]
    fn invalid_and_empty_values_become_empty() {
        assert_eq!(normalize_instant(""), "");
        assert_eq!(normalize_instant("not a date"), "");
        assert_eq!(normalize_instant("2019-13-45 99:99:99"), "");
    }

    #[test]
    fn bow_orders_by_first_encounter() {
        let mut dict = Dictionary::default();
        assert_eq!(
            dict.bow_string("beta alpha beta").as_deref(),
            Some("beta|2 alpha|1")
        );
        // Ids persist across documents: alpha keeps id 1.
        assert_eq!(
            dict.bow_string("gamma alpha").as_deref(),
            Some("alpha|1 gamma|1")
        );
        assert_eq!(dict.bow_string(""), None);
    }

    #[test]
    fn manifest_with_two_datasets_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cordis.json");
        std::fs::write(
            &path,
            serde_json::json!({
                "Dtsets": [
                    {"parquet": "a.parquet", "idfld": "projectID"},
                    {"parquet": "b.parquet", "idfld": "projectID"},
                ]
            })
            .to_string(),
        )
        .unwrap();
        let fields = CorpusFields {
            title_field: "title".to_string(),
            date_field: "startDate".to_string(),
        };
        assert!(matches!(
            LogicalCorpus::open(&path, fields),
            Err(LoadError::MultipleDatasets(2))
        ));
    }

    #[test]
    fn corpus_name_is_the_lowercased_stem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Cordis.json");
        std::fs::write(
            &path,
            serde_json::json!({
                "Dtsets": [{"parquet": "a.parquet", "idfld": "projectID", "lemmasfld": ["lemmas"]}]
            })
            .to_string(),
        )
        .unwrap();
        let fields = CorpusFields {
            title_field: "title".to_string(),
            date_field: "startDate".to_string(),
        };
        let corpus = LogicalCorpus::open(&path, fields).unwrap();
        assert_eq!(corpus.name(), "cordis");
    }
}
