//! The default in-process `VectorIndex` (spec §6.2): per-collection
//! dashmap-backed store with brute-force cosine similarity, good enough at
//! the single-user catalog scale this system targets (spec §5).

use async_trait::async_trait;
use dashmap::DashMap;
use flowforge_core::{Result, StoredVectorRecord, VectorCollection, VectorIndex, VectorQueryHit};

#[derive(Default)]
pub struct InMemoryVectorIndex {
    collections: DashMap<VectorCollection, DashMap<String, StoredVectorRecord>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a <= f32::EPSILON || norm_b <= f32::EPSILON {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn upsert(&self, collection: VectorCollection, records: Vec<StoredVectorRecord>) -> Result<()> {
        let table = self.collections.entry(collection).or_default();
        // A reader either sees a new record fully (embedding + payload) or
        // not at all (spec §4.3 "Concurrency"): each insert is a single
        // atomic map operation, never a partial field update.
        for record in records {
            table.insert(record.record_id.clone(), record);
        }
        Ok(())
    }

    async fn query(
        &self,
        collection: VectorCollection,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<VectorQueryHit>> {
        let Some(table) = self.collections.get(&collection) else {
            return Ok(vec![]);
        };
        let mut scored: Vec<VectorQueryHit> = table
            .iter()
            .map(|entry| VectorQueryHit {
                record_id: entry.record_id.clone(),
                score: cosine(embedding, &entry.embedding),
                payload: entry.payload.clone(),
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    async fn delete(&self, collection: VectorCollection, ids: &[String]) -> Result<()> {
        if let Some(table) = self.collections.get(&collection) {
            for id in ids {
                table.remove(id);
            }
        }
        Ok(())
    }

    async fn count(&self, collection: VectorCollection) -> Result<usize> {
        Ok(self.collections.get(&collection).map(|t| t.len()).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(id: &str, v: Vec<f32>) -> StoredVectorRecord {
        StoredVectorRecord {
            record_id: id.into(),
            embedding: v,
            payload: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn query_ranks_by_cosine_similarity() {
        let index = InMemoryVectorIndex::new();
        index
            .upsert(
                VectorCollection::Nodes,
                vec![rec("a", vec![1.0, 0.0]), rec("b", vec![0.0, 1.0])],
            )
            .await
            .unwrap();

        let hits = index.query(VectorCollection::Nodes, &[1.0, 0.0], 2).await.unwrap();
        assert_eq!(hits[0].record_id, "a");
    }

    #[tokio::test]
    async fn delete_removes_record() {
        let index = InMemoryVectorIndex::new();
        index
            .upsert(VectorCollection::Nodes, vec![rec("a", vec![1.0, 0.0])])
            .await
            .unwrap();
        index
            .delete(VectorCollection::Nodes, &["a".to_string()])
            .await
            .unwrap();
        assert_eq!(index.count(VectorCollection::Nodes).await.unwrap(), 0);
    }
}
