use serde::{Deserialize, Deserializer};

/// One entry of an activity search page. Only the identifier matters to
/// the sync engine; the name is kept for log lines.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivitySummary {
    #[serde(default, deserialize_with = "activity_id")]
    pub activity_id: Option<String>,
    #[serde(default)]
    pub activity_name: Option<String>,
}

/// Activity ids arrive as JSON numbers but are handled as opaque strings.
fn activity_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Num(u64),
        Str(String),
    }

    Ok(Option::<RawId>::deserialize(deserializer)?.map(|id| match id {
        RawId::Num(n) => n.to_string(),
        RawId::Str(s) => s,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub detailed_import_result: DetailedImportResult,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedImportResult {
    #[serde(default)]
    pub upload_id: Option<i64>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub successes: Vec<ImportEntry>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub failures: Vec<ImportEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImportEntry {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub messages: Vec<ImportMessage>,
}

/// The importer sends `null` where it has nothing to list.
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImportMessage {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub content: Option<String>,
}

impl DetailedImportResult {
    /// Human-readable reasons for every rejected entry, e.g. "202: Duplicate Activity.".
    pub fn failure_reasons(&self) -> Vec<String> {
        self.failures
            .iter()
            .flat_map(|f| f.messages.iter())
            .map(|m| match (&m.code, &m.content) {
                (Some(code), Some(content)) => format!("{code}: {content}"),
                (None, Some(content)) => content.clone(),
                (Some(code), None) => format!("code {code}"),
                (None, None) => "unknown reason".to_string(),
            })
            .collect()
    }
}
