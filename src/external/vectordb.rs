use qdrant_client::{
    config::QdrantConfig,
    qdrant::{
        point_id::PointIdOptions, value::Kind, vectors_config::Config, CollectionInfo,
        CountPoints, CreateCollection, DeleteCollection, Distance, GetCollectionInfoRequest,
        PointId, PointStruct, ScoredPoint, ScrollPoints, SearchPoints, UpsertPoints, Value,
        VectorParams, VectorsConfig, WithPayloadSelector, WriteOrdering,
    },
    Qdrant,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

use crate::external::error::{service_url, ExternalError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorDBConfig {
    pub collection_name: String,
    pub host: String,
    pub port: u16,
    pub vector_size: usize,
}

impl VectorDBConfig {
    /// Get the full URL for the Qdrant service
    pub fn get_url(&self) -> Result<String, ExternalError> {
        let url = service_url(&self.host, self.port)?;
        Ok(url.as_str().trim_end_matches('/').to_string())
    }
}

impl Default for VectorDBConfig {
    fn default() -> Self {
        Self {
            collection_name: "repo_chunks".to_string(),
            host: "localhost".to_string(),
            port: 6334,
            vector_size: 768,
        }
    }
}

/// A point to upsert: id, vector and a flat string payload.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: HashMap<String, String>,
}

/// A search hit with its payload flattened back to strings.
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub id: String,
    pub score: f32,
    pub payload: HashMap<String, String>,
}

/// Wrapper for Qdrant vector database
pub struct VectorDB {
    client: Qdrant,
    config: VectorDBConfig,
}

impl VectorDB {
    /// Create a new vector database client with the given configuration
    pub fn new(config: VectorDBConfig) -> Result<Self, ExternalError> {
        let url = config.get_url()?;
        let qdrant_config = QdrantConfig::from_url(&url);
        let client = Qdrant::new(qdrant_config)
            .map_err(|e| ExternalError::ConnectionError(e.to_string()))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &VectorDBConfig {
        &self.config
    }

    pub async fn collection_exists(&self) -> Result<bool, ExternalError> {
        self.client
            .collection_exists(self.config.collection_name.clone())
            .await
            .map_err(|e| ExternalError::VectorDBError(e.to_string()))
    }

    /// Drop the collection if it exists and create it empty.
    pub async fn recreate_collection(&self) -> Result<(), ExternalError> {
        if self.collection_exists().await? {
            let delete = DeleteCollection {
                collection_name: self.config.collection_name.clone(),
                ..Default::default()
            };
            self.client
                .delete_collection(delete)
                .await
                .map_err(|e| ExternalError::VectorDBError(e.to_string()))?;
            info!(collection = %self.config.collection_name, "dropped Qdrant collection");
        }

        let vectors_config = VectorsConfig {
            config: Some(Config::Params(VectorParams {
                size: self.config.vector_size as u64,
                distance: Distance::Cosine.into(),
                ..Default::default()
            })),
        };

        let create_collection = CreateCollection {
            collection_name: self.config.collection_name.clone(),
            vectors_config: Some(vectors_config),
            ..Default::default()
        };

        self.client
            .create_collection(create_collection)
            .await
            .map_err(|e| ExternalError::VectorDBError(e.to_string()))?;

        info!(collection = %self.config.collection_name, "created Qdrant collection");
        Ok(())
    }

    /// Vector size the existing collection was created with.
    pub async fn collection_vector_size(&self) -> Result<Option<u64>, ExternalError> {
        let request = GetCollectionInfoRequest {
            collection_name: self.config.collection_name.clone(),
        };
        let response = self
            .client
            .collection_info(request)
            .await
            .map_err(|e| ExternalError::VectorDBError(e.to_string()))?;

        Ok(response.result.as_ref().and_then(vector_size))
    }

    /// String payload of an arbitrary point, if the collection has any.
    pub async fn first_payload(&self) -> Result<Option<HashMap<String, String>>, ExternalError> {
        let request = ScrollPoints {
            collection_name: self.config.collection_name.clone(),
            limit: Some(1),
            with_payload: Some(WithPayloadSelector::from(true)),
            ..Default::default()
        };
        let response = self
            .client
            .scroll(request)
            .await
            .map_err(|e| ExternalError::VectorDBError(e.to_string()))?;

        Ok(response
            .result
            .into_iter()
            .next()
            .map(|point| string_payload(point.payload)))
    }

    /// Insert vectors with their payloads into the collection
    pub async fn insert_vectors(&self, records: Vec<VectorRecord>) -> Result<(), ExternalError> {
        let points: Vec<PointStruct> = records
            .into_iter()
            .map(|record| {
                let payload: HashMap<String, Value> = record
                    .payload
                    .into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect();

                PointStruct {
                    id: Some(PointId {
                        point_id_options: Some(PointIdOptions::Uuid(record.id)),
                    }),
                    payload,
                    vectors: Some(record.vector.into()),
                }
            })
            .collect();

        let upsert_points = UpsertPoints {
            collection_name: self.config.collection_name.clone(),
            wait: Some(true),
            points,
            ordering: Some(WriteOrdering::default()),
            ..Default::default()
        };

        self.client
            .upsert_points(upsert_points)
            .await
            .map_err(|e| ExternalError::VectorDBError(e.to_string()))?;

        Ok(())
    }

    /// Search for at most `limit` vectors scoring at least `score_threshold`
    pub async fn search_vectors(
        &self,
        vector: Vec<f32>,
        limit: u64,
        score_threshold: f32,
    ) -> Result<Vec<VectorHit>, ExternalError> {
        let search_request = SearchPoints {
            collection_name: self.config.collection_name.clone(),
            vector,
            limit,
            score_threshold: Some(score_threshold),
            with_payload: Some(WithPayloadSelector::from(true)),
            ..Default::default()
        };

        let results = self
            .client
            .search_points(search_request)
            .await
            .map_err(|e| ExternalError::VectorDBError(e.to_string()))?;

        Ok(results.result.into_iter().filter_map(into_hit).collect())
    }

    /// Exact number of points in the collection
    pub async fn count_points(&self) -> Result<u64, ExternalError> {
        let request = CountPoints {
            collection_name: self.config.collection_name.clone(),
            exact: Some(true),
            ..Default::default()
        };

        let response = self
            .client
            .count(request)
            .await
            .map_err(|e| ExternalError::VectorDBError(e.to_string()))?;

        Ok(response.result.map(|r| r.count).unwrap_or(0))
    }
}

fn into_hit(point: ScoredPoint) -> Option<VectorHit> {
    let id = match point.id?.point_id_options? {
        PointIdOptions::Uuid(uuid) => uuid,
        PointIdOptions::Num(num) => num.to_string(),
    };

    Some(VectorHit {
        id,
        score: point.score,
        payload: string_payload(point.payload),
    })
}

fn string_payload(payload: HashMap<String, Value>) -> HashMap<String, String> {
    payload
        .into_iter()
        .filter_map(|(k, v)| match v.kind {
            Some(Kind::StringValue(s)) => Some((k, s)),
            _ => None,
        })
        .collect()
}

fn vector_size(info: &CollectionInfo) -> Option<u64> {
    let vectors = info.config.as_ref()?.params.as_ref()?.vectors_config.as_ref()?;
    match vectors.config.as_ref()? {
        Config::Params(params) => Some(params.size),
        Config::ParamsMap(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_generation() {
        // Test with plain hostname
        let config = VectorDBConfig {
            host: "localhost".to_string(),
            ..VectorDBConfig::default()
        };
        assert_eq!(config.get_url().unwrap(), "http://localhost:6334");

        // Test with http:// prefix
        let config = VectorDBConfig {
            host: "http://example.com".to_string(),
            ..VectorDBConfig::default()
        };
        assert_eq!(config.get_url().unwrap(), "http://example.com:6334");

        // Test with https:// prefix
        let config = VectorDBConfig {
            host: "https://example.com".to_string(),
            ..VectorDBConfig::default()
        };
        assert_eq!(config.get_url().unwrap(), "https://example.com:6334");
    }

    #[test]
    fn test_hit_payload_keeps_strings_only() {
        let mut payload = HashMap::new();
        payload.insert("content".to_string(), Value::from("fn main() {}".to_string()));
        payload.insert("count".to_string(), Value::from(3i64));

        let point = ScoredPoint {
            id: Some(PointId {
                point_id_options: Some(PointIdOptions::Uuid("abc".to_string())),
            }),
            payload,
            score: 0.75,
            ..Default::default()
        };

        let hit = into_hit(point).unwrap();
        assert_eq!(hit.id, "abc");
        assert_eq!(hit.score, 0.75);
        assert_eq!(hit.payload.len(), 1);
        assert_eq!(hit.payload["content"], "fn main() {}");
    }

    #[test]
    fn test_vector_size_of_single_vector_collection() {
        use qdrant_client::qdrant::{CollectionConfig, CollectionParams};

        let info = CollectionInfo {
            config: Some(CollectionConfig {
                params: Some(CollectionParams {
                    vectors_config: Some(VectorsConfig {
                        config: Some(Config::Params(VectorParams {
                            size: 768,
                            distance: Distance::Cosine.into(),
                            ..Default::default()
                        })),
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(vector_size(&info), Some(768));
        assert_eq!(vector_size(&CollectionInfo::default()), None);
    }

    #[test]
    fn test_hit_without_id_is_dropped() {
        let point = ScoredPoint {
            score: 0.5,
            ..Default::default()
        };
        assert!(into_hit(point).is_none());
    }
}
