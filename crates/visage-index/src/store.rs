//! RocksDB-backed vector index with an in-memory HNSW graph.
//!
//! Embeddings and profile rows live in separate column families and always
//! move together in one `WriteBatch`, so a crash cannot leave a vector
//! without its profile. On open the store reconciles any orphans left by
//! older versions and reports how many it removed, then builds the search
//! graph from the surviving vectors. The graph is rebuilt after each
//! mutation; at the scale of an on-device user registry the rebuild is
//! cheap and keeps queries exact-to-the-graph.

use crate::errors::*;
use crate::profile::UserProfile;
use instant_distance::{Builder, HnswMap, Point, Search};
use parking_lot::RwLock;
use rocksdb::{IteratorMode, Options, WriteBatch, DB};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// Embedding dimensionality accepted by the index.
pub const EMBEDDING_DIMS: usize = 512;
/// Tolerance on the unit-norm invariant.
pub const NORM_TOLERANCE: f32 = 1e-4;

const CF_EMBEDDINGS: &str = "embeddings";
const CF_PROFILES: &str = "profiles";

/// Unit-length embedding as an HNSW point under cosine distance.
#[derive(Clone, Debug)]
struct Embedding(Vec<f32>);

impl Point for Embedding {
    fn distance(&self, other: &Self) -> f32 {
        let dot: f32 = self.0.iter().zip(other.0.iter()).map(|(a, b)| a * b).sum();
        // Unit vectors: cosine distance, clamped against rounding
        (1.0 - dot).clamp(0.0, 2.0)
    }
}

/// One page of a profile listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListPage {
    pub total: usize,
    pub users: Vec<UserProfile>,
    pub has_more: bool,
}

/// Index statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStats {
    pub count: usize,
    pub dims: usize,
    pub index_type: String,
}

struct IndexState {
    embeddings: HashMap<String, Vec<f32>>,
    profiles: HashMap<String, UserProfile>,
    graph: Option<HnswMap<Embedding, String>>,
}

impl IndexState {
    fn rebuild_graph(&mut self) {
        if self.embeddings.is_empty() {
            self.graph = None;
            return;
        }
        let mut points = Vec::with_capacity(self.embeddings.len());
        let mut ids = Vec::with_capacity(self.embeddings.len());
        for (user_id, embedding) in &self.embeddings {
            points.push(Embedding(embedding.clone()));
            ids.push(user_id.clone());
        }
        self.graph = Some(Builder::default().build(points, ids));
    }
}

/// Persistent nearest-neighbor index over user embeddings.
pub struct VectorIndex {
    db: DB,
    state: RwLock<IndexState>,
    reconciled_orphans: usize,
}

impl VectorIndex {
    /// Open (or create) the index at `path`, reconcile orphans and build the
    /// search graph.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let db = DB::open_cf(&opts, &path, [CF_EMBEDDINGS, CF_PROFILES])
            .map_err(|e| IndexError::Database(e.to_string()))?;
        debug!("Opened vector index at {:?}", path.as_ref());

        let (embeddings, profiles, orphans) = Self::load_and_reconcile(&db)?;
        if orphans > 0 {
            warn!(orphans, "Removed orphan index rows during startup");
        }

        let mut state = IndexState {
            embeddings,
            profiles,
            graph: None,
        };
        state.rebuild_graph();

        info!(count = state.profiles.len(), "Vector index ready");
        Ok(Self {
            db,
            state: RwLock::new(state),
            reconciled_orphans: orphans,
        })
    }

    /// Open a throwaway index in a temp directory, for tests in this and
    /// dependent crates.
    pub fn open_test() -> Result<(tempfile::TempDir, Self)> {
        let dir = tempfile::TempDir::new()?;
        let index = Self::open(dir.path())?;
        Ok((dir, index))
    }

    /// How many orphan rows the startup reconciliation removed. Non-zero
    /// means a previous run died mid-write and should be surfaced as a
    /// health inconsistency.
    pub fn reconciled_orphans(&self) -> usize {
        self.reconciled_orphans
    }

    fn load_and_reconcile(
        db: &DB,
    ) -> Result<(HashMap<String, Vec<f32>>, HashMap<String, UserProfile>, usize)> {
        let cf_emb = db
            .cf_handle(CF_EMBEDDINGS)
            .ok_or_else(|| IndexError::Database("missing embeddings column family".into()))?;
        let cf_prof = db
            .cf_handle(CF_PROFILES)
            .ok_or_else(|| IndexError::Database("missing profiles column family".into()))?;

        let mut embeddings = HashMap::new();
        for item in db.iterator_cf(cf_emb, IteratorMode::Start) {
            let (key, value) = item.map_err(|e| IndexError::Database(e.to_string()))?;
            let user_id = String::from_utf8_lossy(&key).to_string();
            let embedding: Vec<f32> = serde_json::from_slice(&value)?;
            embeddings.insert(user_id, embedding);
        }

        let mut profiles = HashMap::new();
        for item in db.iterator_cf(cf_prof, IteratorMode::Start) {
            let (key, value) = item.map_err(|e| IndexError::Database(e.to_string()))?;
            let user_id = String::from_utf8_lossy(&key).to_string();
            let profile: UserProfile = serde_json::from_slice(&value)?;
            profiles.insert(user_id, profile);
        }

        // Remove rows that lost their counterpart in a crash
        let mut orphans = 0;
        let orphan_vectors: Vec<String> = embeddings
            .keys()
            .filter(|id| !profiles.contains_key(*id))
            .cloned()
            .collect();
        for user_id in orphan_vectors {
            db.delete_cf(cf_emb, user_id.as_bytes())
                .map_err(|e| IndexError::Database(e.to_string()))?;
            embeddings.remove(&user_id);
            orphans += 1;
        }

        let orphan_profiles: Vec<String> = profiles
            .keys()
            .filter(|id| !embeddings.contains_key(*id))
            .cloned()
            .collect();
        for user_id in orphan_profiles {
            db.delete_cf(cf_prof, user_id.as_bytes())
                .map_err(|e| IndexError::Database(e.to_string()))?;
            profiles.remove(&user_id);
            orphans += 1;
        }

        Ok((embeddings, profiles, orphans))
    }

    fn validate_embedding(embedding: &[f32]) -> Result<()> {
        if embedding.len() != EMBEDDING_DIMS {
            return Err(IndexError::DimensionMismatch {
                expected: EMBEDDING_DIMS,
                got: embedding.len(),
            });
        }
        let norm: f32 = embedding.iter().map(|v| v * v).sum::<f32>().sqrt();
        if (norm - 1.0).abs() > NORM_TOLERANCE {
            return Err(IndexError::NotNormalized { norm });
        }
        Ok(())
    }

    /// Insert or replace a user's embedding and profile atomically.
    pub fn upsert(&self, profile: UserProfile, embedding: Vec<f32>) -> Result<()> {
        Self::validate_embedding(&embedding)?;

        let cf_emb = self
            .db
            .cf_handle(CF_EMBEDDINGS)
            .ok_or_else(|| IndexError::Database("missing embeddings column family".into()))?;
        let cf_prof = self
            .db
            .cf_handle(CF_PROFILES)
            .ok_or_else(|| IndexError::Database("missing profiles column family".into()))?;

        let mut batch = WriteBatch::default();
        batch.put_cf(cf_emb, profile.user_id.as_bytes(), serde_json::to_vec(&embedding)?);
        batch.put_cf(cf_prof, profile.user_id.as_bytes(), serde_json::to_vec(&profile)?);
        self.db
            .write(batch)
            .map_err(|e| IndexError::Database(e.to_string()))?;

        let mut state = self.state.write();
        state.embeddings.insert(profile.user_id.clone(), embedding);
        state.profiles.insert(profile.user_id.clone(), profile);
        state.rebuild_graph();
        Ok(())
    }

    /// Persist a profile change without touching the embedding.
    pub fn put_profile(&self, profile: UserProfile) -> Result<()> {
        let mut state = self.state.write();
        if !state.profiles.contains_key(&profile.user_id) {
            return Err(IndexError::NotFound(profile.user_id));
        }

        let cf_prof = self
            .db
            .cf_handle(CF_PROFILES)
            .ok_or_else(|| IndexError::Database("missing profiles column family".into()))?;
        self.db
            .put_cf(cf_prof, profile.user_id.as_bytes(), serde_json::to_vec(&profile)?)
            .map_err(|e| IndexError::Database(e.to_string()))?;

        state.profiles.insert(profile.user_id.clone(), profile);
        Ok(())
    }

    /// Remove a user's embedding and profile atomically, returning the
    /// removed profile.
    pub fn delete(&self, user_id: &str) -> Result<UserProfile> {
        let mut state = self.state.write();
        let profile = state
            .profiles
            .get(user_id)
            .cloned()
            .ok_or_else(|| IndexError::NotFound(user_id.to_string()))?;

        let cf_emb = self
            .db
            .cf_handle(CF_EMBEDDINGS)
            .ok_or_else(|| IndexError::Database("missing embeddings column family".into()))?;
        let cf_prof = self
            .db
            .cf_handle(CF_PROFILES)
            .ok_or_else(|| IndexError::Database("missing profiles column family".into()))?;

        let mut batch = WriteBatch::default();
        batch.delete_cf(cf_emb, user_id.as_bytes());
        batch.delete_cf(cf_prof, user_id.as_bytes());
        self.db
            .write(batch)
            .map_err(|e| IndexError::Database(e.to_string()))?;

        state.embeddings.remove(user_id);
        state.profiles.remove(user_id);
        state.rebuild_graph();
        Ok(profile)
    }

    /// Fetch one profile.
    pub fn get(&self, user_id: &str) -> Option<UserProfile> {
        self.state.read().profiles.get(user_id).cloned()
    }

    /// Whether any registered user's id starts with the given slug prefix.
    pub fn slug_exists(&self, slug: &str) -> bool {
        let prefix = format!("{}_", slug);
        self.state
            .read()
            .profiles
            .keys()
            .any(|id| id.starts_with(&prefix))
    }

    /// All user ids currently registered.
    pub fn user_ids(&self) -> Vec<String> {
        self.state.read().profiles.keys().cloned().collect()
    }

    /// Page over profiles, newest registration first (ties by id).
    pub fn list(&self, offset: usize, limit: usize) -> ListPage {
        let state = self.state.read();
        let mut users: Vec<&UserProfile> = state.profiles.values().collect();
        users.sort_by(|a, b| {
            b.registration_timestamp
                .cmp(&a.registration_timestamp)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });

        let total = users.len();
        let page: Vec<UserProfile> = users
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();
        let has_more = total > offset + page.len();

        ListPage {
            total,
            users: page,
            has_more,
        }
    }

    /// Nearest neighbors by cosine distance. Results are
    /// `(user_id, distance)` sorted nearest first.
    pub fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<(String, f32)>> {
        Self::validate_embedding(embedding)?;

        let state = self.state.read();
        let Some(graph) = state.graph.as_ref() else {
            return Ok(Vec::new());
        };

        let point = Embedding(embedding.to_vec());
        let mut search = Search::default();
        let hits = graph
            .search(&point, &mut search)
            .take(k)
            .map(|item| (item.value.clone(), item.distance))
            .collect();
        Ok(hits)
    }

    pub fn count(&self) -> usize {
        self.state.read().profiles.len()
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            count: self.count(),
            dims: EMBEDDING_DIMS,
            index_type: "hnsw".to_string(),
        }
    }
}
