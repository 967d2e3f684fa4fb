//! Tag sets, tag maps and random tag generators

use super::pickable::{default_weight, is_default_weight, Pickable};
use super::words::{ADJECTIVES, ADVERBS, NOUNS, VERBS};
use crate::error::ConfigError;
use crate::flags::FlagGate;
use crate::models::{AttributeValue, Attributes};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// A configured tag value; lists contribute one element per use
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<String>),
}

impl TagValue {
    /// Concrete attribute for one span or resource, `None` for an empty list
    pub fn resolve<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<AttributeValue> {
        match self {
            TagValue::Bool(v) => Some(AttributeValue::Bool(*v)),
            TagValue::Int(v) => Some(AttributeValue::Int(*v)),
            TagValue::Float(v) => Some(AttributeValue::Double(*v)),
            TagValue::String(v) => Some(AttributeValue::String(v.clone())),
            TagValue::List(values) if values.is_empty() => None,
            TagValue::List(values) => Some(AttributeValue::String(
                values[rng.gen_range(0..values.len())].clone(),
            )),
        }
    }
}

pub type TagMap = BTreeMap<String, TagValue>;

/// Resolve every entry of `tags` into `attrs`
pub fn insert_tags<R: Rng + ?Sized>(tags: &TagMap, attrs: &mut Attributes, rng: &mut R) {
    for (key, value) in tags {
        if let Some(resolved) = value.resolve(rng) {
            attrs.insert(key.clone(), resolved);
        }
    }
}

/// Synthesizes random tags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagGenerator {
    /// Emit a single tag under this key instead of `numTags` named ones
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_name: Option<String>,

    /// Random letters per value; zero yields `adverb-verb` words instead
    #[serde(default = "default_val_length")]
    pub val_length: usize,

    #[serde(default)]
    pub num_tags: usize,

    /// Bound on distinct values per key; zero means unbounded
    #[serde(default, skip_serializing_if = "is_zero")]
    pub num_vals: usize,
}

fn default_val_length() -> usize {
    8
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

impl TagGenerator {
    pub fn generate<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<(String, String)> {
        if let Some(key) = self.key_name.as_deref().filter(|k| !k.is_empty()) {
            let value = self.value(rng);
            return vec![(key.to_string(), value)];
        }

        let mut tags = Vec::with_capacity(self.num_tags);
        for _ in 0..self.num_tags {
            let key = random_tag_name(rng);
            let value = self.value(rng);
            tags.push((key, value));
        }
        tags
    }

    fn value<R: Rng + ?Sized>(&self, rng: &mut R) -> String {
        if self.val_length == 0 {
            return random_tag_value(rng);
        }
        if self.num_vals > 0 {
            // Same index, same value: cardinality stays at num_vals
            let index = rng.gen_range(0..self.num_vals) as u64;
            let mut seeded = StdRng::seed_from_u64(index);
            return random_letters(self.val_length, &mut seeded);
        }
        random_letters(self.val_length, rng)
    }
}

fn random_letters<R: Rng + ?Sized>(len: usize, rng: &mut R) -> String {
    (0..len)
        .map(|_| LETTERS[rng.gen_range(0..LETTERS.len())] as char)
        .collect()
}

/// `adjective-noun`, e.g. `misty-river`
pub fn random_tag_name<R: Rng + ?Sized>(rng: &mut R) -> String {
    let adjective = ADJECTIVES[rng.gen_range(0..ADJECTIVES.len())];
    let noun = NOUNS[rng.gen_range(0..NOUNS.len())];
    format!("{}-{}", adjective, noun)
}

/// `adverb-verb`, e.g. `quietly-hums`
pub fn random_tag_value<R: Rng + ?Sized>(rng: &mut R) -> String {
    let adverb = ADVERBS[rng.gen_range(0..ADVERBS.len())];
    let verb = VERBS[rng.gen_range(0..VERBS.len())];
    format!("{}-{}", adverb, verb)
}

/// Weighted, flag-gated group of span attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagSet {
    #[serde(default = "default_weight", skip_serializing_if = "is_default_weight")]
    pub weight: f64,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: TagMap,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tag_generators: Vec<TagGenerator>,

    /// Keys copied from the parent span when it has them
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inherit: Vec<String>,

    /// Tag key to a single-column CSV file of candidate values
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub csv_tags: BTreeMap<String, PathBuf>,

    #[serde(flatten)]
    pub gate: FlagGate,

    #[serde(skip)]
    pub(crate) csv_values: TagMap,
}

impl Default for TagSet {
    fn default() -> Self {
        Self {
            weight: default_weight(),
            tags: TagMap::new(),
            tag_generators: Vec::new(),
            inherit: Vec::new(),
            csv_tags: BTreeMap::new(),
            gate: FlagGate::default(),
            csv_values: TagMap::new(),
        }
    }
}

impl TagSet {
    /// Read CSV-backed tag lists; relative paths resolve against `base_dir`
    pub(crate) fn load(&mut self, base_dir: Option<&Path>) -> Result<(), ConfigError> {
        self.csv_values.clear();
        for (key, path) in &self.csv_tags {
            if self.tags.contains_key(key) {
                return Err(ConfigError::CsvTags {
                    key: key.clone(),
                    path: path.clone(),
                    reason: "key is already defined in tags".to_string(),
                });
            }
            let resolved = match base_dir {
                Some(dir) if path.is_relative() => dir.join(path),
                _ => path.clone(),
            };
            let values = load_csv_values(key, &resolved)?;
            self.csv_values.insert(key.clone(), TagValue::List(values));
        }
        Ok(())
    }

    /// Values loaded from `csvTags`
    pub fn csv_values(&self) -> &TagMap {
        &self.csv_values
    }

    /// Add this set's attributes to a span
    pub fn apply<R: Rng + ?Sized>(
        &self,
        attrs: &mut Attributes,
        parent: Option<&Attributes>,
        rng: &mut R,
    ) {
        insert_tags(&self.tags, attrs, rng);
        insert_tags(&self.csv_values, attrs, rng);

        for generator in &self.tag_generators {
            for (key, value) in generator.generate(rng) {
                attrs.insert(key, AttributeValue::String(value));
            }
        }

        if let Some(parent) = parent {
            for key in &self.inherit {
                if let Some(value) = parent.get(key) {
                    attrs.insert(key.clone(), value.clone());
                }
            }
        }
    }
}

impl Pickable for TagSet {
    fn weight(&self) -> f64 {
        self.weight
    }

    fn gate(&self) -> &FlagGate {
        &self.gate
    }
}

fn load_csv_values(key: &str, path: &Path) -> Result<Vec<String>, ConfigError> {
    let fail = |reason: String| ConfigError::CsvTags {
        key: key.to_string(),
        path: path.to_path_buf(),
        reason,
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|e| fail(e.to_string()))?;

    let mut values = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.map_err(|e| fail(e.to_string()))?;
        if record.len() != 1 {
            return Err(fail(format!(
                "line {} has {} columns, expected 1",
                line + 1,
                record.len()
            )));
        }
        let value = record[0].trim();
        if !value.is_empty() {
            values.push(value.to_string());
        }
    }

    if values.is_empty() {
        return Err(fail("file contains no values".to_string()));
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn test_tag_values_deserialize_by_shape() {
        let tags: TagMap = serde_yaml::from_str(
            "region: us-east-1\nretries: 3\nratio: 0.25\ncanary: true\nzone: [a, b]\n",
        )
        .unwrap();

        assert_eq!(tags["region"], TagValue::String("us-east-1".into()));
        assert_eq!(tags["retries"], TagValue::Int(3));
        assert_eq!(tags["ratio"], TagValue::Float(0.25));
        assert_eq!(tags["canary"], TagValue::Bool(true));
        assert_eq!(tags["zone"], TagValue::List(vec!["a".into(), "b".into()]));
    }

    #[test]
    fn test_insert_tags_picks_from_lists() {
        let mut tags = TagMap::new();
        tags.insert("zone".into(), TagValue::List(vec!["a".into(), "b".into()]));
        tags.insert("empty".into(), TagValue::List(vec![]));
        tags.insert("n".into(), TagValue::Int(7));

        let mut attrs = Attributes::new();
        insert_tags(&tags, &mut attrs, &mut rng());

        assert!(matches!(
            attrs.get("zone"),
            Some(AttributeValue::String(v)) if v == "a" || v == "b"
        ));
        assert!(!attrs.contains_key("empty"));
        assert_eq!(attrs["n"], AttributeValue::Int(7));
    }

    #[test]
    fn test_generator_with_key_name() {
        let generator = TagGenerator {
            key_name: Some("session".into()),
            val_length: 12,
            num_tags: 50,
            num_vals: 0,
        };
        let tags = generator.generate(&mut rng());

        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].0, "session");
        assert_eq!(tags[0].1.len(), 12);
        assert!(tags[0].1.chars().all(|c| c.is_ascii_alphabetic()));
    }

    #[test]
    fn test_generator_named_tags() {
        let generator = TagGenerator {
            key_name: None,
            val_length: 4,
            num_tags: 5,
            num_vals: 0,
        };
        let tags = generator.generate(&mut rng());

        assert_eq!(tags.len(), 5);
        for (key, value) in tags {
            let (adjective, noun) = key.split_once('-').unwrap();
            assert!(ADJECTIVES.contains(&adjective));
            assert!(NOUNS.contains(&noun));
            assert_eq!(value.len(), 4);
        }
    }

    #[test]
    fn test_generator_bounds_value_cardinality() {
        let generator = TagGenerator {
            key_name: Some("user".into()),
            val_length: 10,
            num_tags: 0,
            num_vals: 3,
        };
        let mut rng = rng();
        let distinct: std::collections::HashSet<String> = (0..200)
            .map(|_| generator.generate(&mut rng).remove(0).1)
            .collect();

        assert!(distinct.len() <= 3);
        assert!(distinct.len() >= 2);
    }

    #[test]
    fn test_zero_length_values_use_words() {
        let generator = TagGenerator {
            key_name: Some("mood".into()),
            val_length: 0,
            num_tags: 0,
            num_vals: 0,
        };
        let value = generator.generate(&mut rng()).remove(0).1;
        let (adverb, verb) = value.split_once('-').unwrap();
        assert!(ADVERBS.contains(&adverb));
        assert!(VERBS.contains(&verb));
    }

    #[test]
    fn test_apply_inherits_from_parent() {
        let set = TagSet {
            inherit: vec!["customer".into(), "absent".into()],
            ..TagSet::default()
        };
        let mut parent = Attributes::new();
        parent.insert("customer".into(), "acme".into());

        let mut attrs = Attributes::new();
        set.apply(&mut attrs, Some(&parent), &mut rng());

        assert_eq!(attrs["customer"], AttributeValue::String("acme".into()));
        assert!(!attrs.contains_key("absent"));
    }

    #[test]
    fn test_csv_tags_loaded_relative_to_base_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("customers.csv")).unwrap();
        writeln!(file, "acme\nglobex\ninitech").unwrap();

        let mut set = TagSet {
            csv_tags: [("customer".to_string(), PathBuf::from("customers.csv"))].into(),
            ..TagSet::default()
        };
        set.load(Some(dir.path())).unwrap();

        assert_eq!(
            set.csv_values()["customer"],
            TagValue::List(vec!["acme".into(), "globex".into(), "initech".into()])
        );
    }

    #[test]
    fn test_csv_tags_reject_multiple_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pairs.csv");
        std::fs::write(&path, "a,b\nc,d\n").unwrap();

        let mut set = TagSet {
            csv_tags: [("pair".to_string(), path)].into(),
            ..TagSet::default()
        };
        let err = set.load(None).unwrap_err();
        assert!(err.to_string().contains("expected 1"));
    }

    #[test]
    fn test_csv_tags_reject_empty_file_and_duplicate_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        std::fs::write(&path, "").unwrap();

        let mut empty = TagSet {
            csv_tags: [("k".to_string(), path.clone())].into(),
            ..TagSet::default()
        };
        assert!(empty.load(None).unwrap_err().to_string().contains("no values"));

        let mut duplicate = TagSet {
            tags: [("k".to_string(), TagValue::Int(1))].into(),
            csv_tags: [("k".to_string(), path)].into(),
            ..TagSet::default()
        };
        assert!(duplicate
            .load(None)
            .unwrap_err()
            .to_string()
            .contains("already defined"));
    }

    #[test]
    fn test_csv_tags_missing_file() {
        let mut set = TagSet {
            csv_tags: [("k".to_string(), PathBuf::from("/definitely/not/here.csv"))].into(),
            ..TagSet::default()
        };
        assert!(matches!(set.load(None), Err(ConfigError::CsvTags { .. })));
    }
}
