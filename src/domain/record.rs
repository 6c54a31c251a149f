//! Extracted records and the ordered record set

use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

use super::item::ItemReference;
use super::schema::{FieldSpec, FieldValue};

/// Worker identity within one extraction run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkerId(pub usize);

impl WorkerId {
    /// Identity reserved for the single-threaded discovery phase
    pub const DISCOVERY: Self = Self(usize::MAX);
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if *self == Self::DISCOVERY {
            write!(f, "discovery")
        } else {
            write!(f, "worker-{}", self.0)
        }
    }
}

/// One complete record: `id`, `url` and every schema field, in schema order
///
/// Built only through [`Record::from_values`] or [`Record::all_fallback`],
/// both of which cover the whole schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    sequence_index: usize,
    id: String,
    url: String,
    fields: Vec<(String, FieldValue)>,
}

impl Record {
    /// Pair each spec with its extracted value. `values` must be schema-aligned.
    pub(crate) fn from_values(
        item: &ItemReference,
        schema: &[FieldSpec],
        values: Vec<FieldValue>,
    ) -> Self {
        debug_assert_eq!(schema.len(), values.len());
        let fields = schema
            .iter()
            .zip(values)
            .map(|(spec, value)| (spec.name.clone(), value))
            .collect();
        Self {
            sequence_index: item.sequence_index,
            id: item.record_id(),
            url: item.url.clone(),
            fields,
        }
    }

    /// Record whose every field holds its fallback value
    #[must_use]
    pub fn all_fallback(item: &ItemReference, schema: &[FieldSpec]) -> Self {
        let values = schema.iter().map(|spec| spec.fallback.clone()).collect();
        Self::from_values(item, schema, values)
    }

    #[must_use]
    pub const fn sequence_index(&self) -> usize {
        self.sequence_index
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Look up a schema field by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    /// All keys in output order, `id` and `url` first
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        ["id", "url"]
            .into_iter()
            .chain(self.fields.iter().map(|(name, _)| name.as_str()))
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len() + 2))?;
        map.serialize_entry("id", &self.id)?;
        map.serialize_entry("url", &self.url)?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Why a task produced no extracted record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskFailureReason {
    /// The worker's document session could not be started
    SessionInit(String),
    /// Navigation failed or timed out
    DocumentLoad(String),
}

impl std::fmt::Display for TaskFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SessionInit(message) => write!(f, "session init failed: {message}"),
            Self::DocumentLoad(message) => write!(f, "document load failed: {message}"),
        }
    }
}

/// Diagnostic kept for each failed task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub sequence_index: usize,
    pub url: String,
    pub worker_id: WorkerId,
    pub reason: TaskFailureReason,
}

/// What the dispatcher does with a task whose document could not be loaded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskFailurePolicy {
    /// Emit an all-fallback record so every item appears in the output
    #[default]
    Fallback,
    /// Leave the item out of the output
    Omit,
}

/// Records of one run, ordered by ascending sequence index
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordSet {
    records: Vec<Record>,
    failures: Vec<TaskFailure>,
}

impl RecordSet {
    /// Build a set from records and failures in any order
    #[must_use]
    pub fn new(mut records: Vec<Record>, mut failures: Vec<TaskFailure>) -> Self {
        records.sort_by_key(Record::sequence_index);
        failures.sort_by_key(|failure| failure.sequence_index);
        Self { records, failures }
    }

    #[must_use]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Task-level diagnostics, ordered by sequence index
    #[must_use]
    pub fn failures(&self) -> &[TaskFailure] {
        &self.failures
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Vec<FieldSpec> {
        vec![
            FieldSpec::text("Title", ".title", "Unknown"),
            FieldSpec::integer("NumBackers", ".backers"),
        ]
    }

    #[test]
    fn test_record_serializes_in_schema_order() {
        let item = ItemReference::new(4, "https://example.com/p").unwrap();
        let record = Record::from_values(
            &item,
            &schema(),
            vec![FieldValue::from("Lamp"), FieldValue::from(12)],
        );

        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(
            json,
            r#"{"id":"5","url":"https://example.com/p","Title":"Lamp","NumBackers":12}"#
        );
    }

    #[test]
    fn test_all_fallback_covers_schema() {
        let item = ItemReference::new(0, "https://example.com/p").unwrap();
        let record = Record::all_fallback(&item, &schema());

        let keys: Vec<_> = record.keys().collect();
        assert_eq!(keys, vec!["id", "url", "Title", "NumBackers"]);
        assert_eq!(record.get("Title"), Some(&FieldValue::from("Unknown")));
        assert_eq!(record.get("NumBackers"), Some(&FieldValue::Null));
    }

    #[test]
    fn test_record_set_sorts_by_sequence_index() {
        let records = [3, 0, 2, 1]
            .into_iter()
            .map(|i| {
                let item = ItemReference::new(i, &format!("https://example.com/{i}")).unwrap();
                Record::all_fallback(&item, &schema())
            })
            .collect();

        let set = RecordSet::new(records, Vec::new());
        let order: Vec<_> = set.records().iter().map(Record::sequence_index).collect();
        assert_eq!(order, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_worker_id_display() {
        assert_eq!(WorkerId(2).to_string(), "worker-2");
        assert_eq!(WorkerId::DISCOVERY.to_string(), "discovery");
    }
}
