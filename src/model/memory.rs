use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::schema::{Schema, SYSTEM_FIELDS};
use super::{Document, Model, ModelError};
use crate::filter::{lookup, FilterData, FilterOrder, FilterWhere};

/// In-process document store guarded by an async lock
pub struct MemoryModel {
    name: String,
    schema: Schema,
    documents: RwLock<Vec<Document>>,
}

impl MemoryModel {
    pub fn new(name: impl Into<String>, schema: Schema) -> Self {
        Self {
            name: name.into(),
            schema,
            documents: RwLock::new(Vec::new()),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    fn visible(&self, document: &Document) -> bool {
        !(self.schema.is_safe() && document.get("deleted") == Some(&Value::Bool(true)))
    }

    fn matching<'a>(
        &self,
        documents: &'a [Document],
        filter: &Map<String, Value>,
    ) -> Result<Vec<&'a Document>, ModelError> {
        let filter = self.schema.cast_filter(filter)?;
        Ok(documents
            .iter()
            .filter(|doc| self.visible(doc) && FilterWhere::matches(doc, &filter))
            .collect())
    }

    fn check_unique(&self, documents: &[Document], candidate: &Document) -> Result<(), ModelError> {
        let id = candidate.get("id");
        for path in self.schema.unique_paths() {
            let Some(value) = lookup(candidate, path).filter(|v| !v.is_null()) else {
                continue;
            };
            let taken = documents
                .iter()
                .filter(|doc| self.visible(doc) && doc.get("id") != id)
                .any(|doc| lookup(doc, path) == Some(value));
            if taken {
                return Err(ModelError::Duplicate {
                    field: path.clone(),
                    value: value.clone(),
                });
            }
        }
        Ok(())
    }

    fn now() -> Value {
        Value::String(Utc::now().to_rfc3339())
    }
}

fn select_of(query: &FilterData) -> &[String] {
    query.select.as_deref().unwrap_or(&[])
}

#[async_trait]
impl Model for MemoryModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find(&self, query: &FilterData) -> Result<Vec<Document>, ModelError> {
        let documents = self.documents.read().await;
        let mut found = self.matching(&documents, &query.filter)?;
        if !query.sort.is_empty() {
            found.sort_by(|a, b| FilterOrder::compare(a, b, &query.sort));
        }

        let skip = query.skip.unwrap_or(0);
        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(found
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|doc| FilterOrder::project(doc, select_of(query)))
            .collect())
    }

    async fn count(&self, filter: &Map<String, Value>) -> Result<u64, ModelError> {
        let documents = self.documents.read().await;
        Ok(self.matching(&documents, filter)?.len() as u64)
    }

    async fn find_one(&self, query: &FilterData) -> Result<Option<Document>, ModelError> {
        let documents = self.documents.read().await;
        let mut found = self.matching(&documents, &query.filter)?;
        if !query.sort.is_empty() {
            found.sort_by(|a, b| FilterOrder::compare(a, b, &query.sort));
        }
        Ok(found
            .into_iter()
            .next()
            .map(|doc| FilterOrder::project(doc, select_of(query))))
    }

    async fn find_by_id(&self, id: &str, select: Option<&[String]>) -> Result<Option<Document>, ModelError> {
        let documents = self.documents.read().await;
        Ok(documents
            .iter()
            .find(|doc| self.visible(doc) && doc.get("id").and_then(Value::as_str) == Some(id))
            .map(|doc| FilterOrder::project(doc, select.unwrap_or(&[]))))
    }

    async fn create(&self, body: Value) -> Result<Document, ModelError> {
        let mut document = match body {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(ModelError::Cast {
                    kind: "Object".to_string(),
                    value: other,
                    path: String::new(),
                })
            }
        };
        for field in SYSTEM_FIELDS {
            document.remove(*field);
        }
        self.schema.validate(&self.name, &mut document)?;

        document.insert("id".to_string(), Value::String(Uuid::new_v4().to_string()));
        if self.schema.has_timestamps() {
            let now = Self::now();
            document.insert("createdAt".to_string(), now.clone());
            document.insert("updatedAt".to_string(), now);
        }

        let mut documents = self.documents.write().await;
        self.check_unique(&documents, &document)?;
        documents.push(document.clone());
        tracing::debug!("{} created {}", self.name, document["id"]);
        Ok(document)
    }

    async fn save(&self, mut document: Document) -> Result<Document, ModelError> {
        let id = document
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ModelError::NotFound(String::new()))?;

        let mut documents = self.documents.write().await;
        let index = documents
            .iter()
            .position(|doc| self.visible(doc) && doc.get("id").and_then(Value::as_str) == Some(id.as_str()))
            .ok_or_else(|| ModelError::NotFound(id.clone()))?;

        // System fields always come from the stored copy
        let stored = &documents[index];
        for field in SYSTEM_FIELDS {
            match stored.get(*field) {
                Some(value) => document.insert(field.to_string(), value.clone()),
                None => document.remove(*field),
            };
        }
        self.schema.validate(&self.name, &mut document)?;
        if self.schema.has_timestamps() {
            document.insert("updatedAt".to_string(), Self::now());
        }

        self.check_unique(&documents, &document)?;
        documents[index] = document.clone();
        Ok(document)
    }

    async fn remove(&self, id: &str) -> Result<Option<Document>, ModelError> {
        let mut documents = self.documents.write().await;
        let Some(index) = documents
            .iter()
            .position(|doc| self.visible(doc) && doc.get("id").and_then(Value::as_str) == Some(id))
        else {
            return Ok(None);
        };

        if self.schema.is_safe() {
            let document = &mut documents[index];
            document.insert("deleted".to_string(), Value::Bool(true));
            document.insert("deletedAt".to_string(), Self::now());
            return Ok(Some(document.clone()));
        }
        Ok(Some(documents.remove(index)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Filter;
    use crate::model::Field;
    use serde_json::json;

    fn model(safe: bool) -> MemoryModel {
        let schema = Schema::new()
            .field("title", Field::string().required().unique())
            .field("comments", Field::number().default(0))
            .safe(safe);
        MemoryModel::new("Example", schema)
    }

    async fn seed(model: &MemoryModel) {
        for (title, comments) in [("a", 5), ("b", 15), ("c", 10)] {
            model.create(json!({ "title": title, "comments": comments })).await.unwrap();
        }
    }

    #[tokio::test]
    async fn create_assigns_id_and_timestamps() {
        let m = model(false);
        let doc = m.create(json!({ "title": "hello", "id": "forged" })).await.unwrap();
        let id = doc["id"].as_str().unwrap();
        assert_ne!(id, "forged");
        assert!(Uuid::parse_str(id).is_ok());
        assert!(doc.contains_key("createdAt"));
        assert_eq!(doc["comments"], json!(0));
    }

    #[tokio::test]
    async fn find_filters_sorts_and_pages() {
        let m = model(false);
        seed(&m).await;

        let query = Filter::from_query(&json!({
            "filter": { "comments": { "$gte": "10" } },
            "sort": "-comments",
            "select": "title"
        }))
        .unwrap();
        let found = m.find(&query).await.unwrap();
        let titles: Vec<_> = found.iter().map(|d| d["title"].clone()).collect();
        assert_eq!(titles, vec![json!("b"), json!("c")]);
        assert!(found[0].get("comments").is_none());

        let query = Filter::from_query(&json!({ "sort": "comments", "skip": "1", "limit": "1" })).unwrap();
        let found = m.find(&query).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["title"], json!("c"));

        assert_eq!(m.count(&Map::new()).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn unique_fields_reject_duplicates() {
        let m = model(false);
        seed(&m).await;
        let err = m.create(json!({ "title": "a" })).await.unwrap_err();
        assert!(matches!(err, ModelError::Duplicate { field, .. } if field == "title"));
    }

    #[tokio::test]
    async fn save_keeps_system_fields() {
        let m = model(false);
        let mut doc = m.create(json!({ "title": "x" })).await.unwrap();
        let created = doc["createdAt"].clone();
        doc.insert("comments".into(), json!(3));
        doc.insert("createdAt".into(), json!("yesterday"));
        let saved = m.save(doc).await.unwrap();
        assert_eq!(saved["comments"], json!(3));
        assert_eq!(saved["createdAt"], created);

        let mut stray = Map::new();
        stray.insert("id".into(), json!("nope"));
        assert!(matches!(m.save(stray).await, Err(ModelError::NotFound(_))));
    }

    #[tokio::test]
    async fn soft_delete_hides_documents() {
        let m = model(true);
        seed(&m).await;
        let first = m.find(&FilterData::default()).await.unwrap().remove(0);
        let id = first["id"].as_str().unwrap();

        let removed = m.remove(id).await.unwrap().unwrap();
        assert_eq!(removed["deleted"], json!(true));
        assert!(m.find_by_id(id, None).await.unwrap().is_none());
        assert_eq!(m.count(&Map::new()).await.unwrap(), 2);
        assert!(m.remove(id).await.unwrap().is_none());
    }
}
