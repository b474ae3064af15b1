//! Interest-seed construction from a user's behavioral signal graph.
//!
//! [`SeedBuilder`] aggregates four capped signal sources (own posts, own
//! likes, followee posts, followee likes) into one or more weighted
//! [`SearchSeed`] profiles: merged and recency-decayed candidate weights,
//! power-law flattening, deterministic k-means over the candidates'
//! stored vectors, and per-cluster tag/keyword/vector aggregation.
//!
//! Stateless and request-scoped: every call owns its working data and the
//! only shared resource is the read-only store.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::codec;
use crate::config::RecsConfig;
use crate::error::{RecsError, Result};
use crate::store::{summaries_chunked, RecsStore};
use crate::types::{
    HashCount, HashWeight, PostId, SearchSeed, TagCount, TagWeight, UserId,
};
use crate::vecmath::{self, KMeansOptions};

/// FNV-1a over the id bytes; stable across processes, unlike the std
/// hasher, so clustering seeds and placeholder indexes reproduce.
fn fnv1a64(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

/// A candidate post after merge, decay, and power-law normalization.
#[derive(Debug, Clone)]
struct Candidate {
    post: PostId,
    effective_weight: f64,
}

/// A candidate that also carries a decoded stored vector.
#[derive(Debug, Clone)]
struct Material {
    post: PostId,
    effective_weight: f64,
    /// Decoded vector as stored (not length-normalized).
    raw: Vec<f32>,
    /// Unit-length copy used for clustering.
    unit: Vec<f32>,
}

/// Builds per-user interest seeds from behavioral signals.
pub struct SeedBuilder {
    store: Arc<dyn RecsStore>,
    config: RecsConfig,
}

impl SeedBuilder {
    pub fn new(store: Arc<dyn RecsStore>, config: RecsConfig) -> Self {
        Self { store, config }
    }

    /// Build up to `num_clusters` interest seeds for a user.
    ///
    /// Returns an empty list for users with no behavioral signal at all;
    /// users whose signal posts carry no vectors get exactly one tag-only
    /// seed with a deterministic one-hot placeholder vector. Emitted seeds
    /// are sorted by descending weight (tie-break: lexicographically-first
    /// leading tag) and only seeds with positive weight are returned.
    ///
    /// # Errors
    ///
    /// [`RecsError::InvalidClusterCount`] if `num_clusters` is 0; store
    /// and codec failures propagate.
    pub async fn build_search_seed_for_user(
        &self,
        user: UserId,
        num_clusters: usize,
    ) -> Result<Vec<SearchSeed>> {
        if num_clusters == 0 {
            return Err(RecsError::InvalidClusterCount {
                requested: num_clusters,
            });
        }

        let candidates = self.gather_candidates(user).await?;
        if candidates.is_empty() {
            debug!(%user, "no behavioral signal; empty seed list");
            return Ok(Vec::new());
        }
        let candidate_ids: Vec<PostId> = candidates.iter().map(|c| c.post).collect();

        // Associations and ownership for every candidate, fetched once.
        let tag_assocs = self.store.tags_for_posts(&candidate_ids).await?;
        let keyword_assocs = self.store.keywords_for_posts(&candidate_ids).await?;
        let owners: HashMap<PostId, UserId> = self
            .store
            .posts(&candidate_ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p.owner))
            .collect();

        let mut tags_by_post: HashMap<PostId, Vec<(String, u8)>> = HashMap::new();
        for a in tag_assocs {
            tags_by_post
                .entry(a.post)
                .or_default()
                .push((a.tag, a.source_count));
        }
        let mut keywords_by_post: HashMap<PostId, Vec<(u32, u8)>> = HashMap::new();
        for a in keyword_assocs {
            keywords_by_post
                .entry(a.post)
                .or_default()
                .push((a.hash, a.source_count));
        }

        let materials = self.gather_materials(&candidates).await?;
        debug!(
            %user,
            candidates = candidates.len(),
            with_vectors = materials.len(),
            "seed materials gathered"
        );

        if materials.is_empty() {
            let seed = self.build_tag_only_seed(
                user,
                &candidates,
                &tags_by_post,
                &keywords_by_post,
                &owners,
            );
            return Ok(seed.into_iter().collect());
        }

        let groups = self.group_materials(user, &materials, num_clusters)?;

        let mut seeds = Vec::with_capacity(groups.len());
        for member_indices in &groups {
            if member_indices.is_empty() {
                continue;
            }
            let members: Vec<&Material> = member_indices.iter().map(|&i| &materials[i]).collect();
            if let Some(seed) =
                self.build_cluster_seed(user, &members, &tags_by_post, &keywords_by_post, &owners)?
            {
                seeds.push(seed);
            }
        }

        seeds.sort_by(|a, b| {
            b.weight.total_cmp(&a.weight).then_with(|| {
                let ta = a.tags.first().map(|t| t.tag.as_str()).unwrap_or("");
                let tb = b.tags.first().map(|t| t.tag.as_str()).unwrap_or("");
                ta.cmp(tb)
            })
        });
        Ok(seeds)
    }

    /// Gather, merge, decay, and normalize the four signal sources.
    async fn gather_candidates(&self, user: UserId) -> Result<Vec<Candidate>> {
        let cfg = &self.config;
        let weights = cfg.source_weights;
        let mut merged: HashMap<PostId, f64> = HashMap::new();
        let mut absorb = |ids: &[PostId], base: f64| {
            for &id in ids {
                *merged.entry(id).or_insert(0.0) += base;
            }
        };

        let own_posts = self
            .store
            .recent_posts_by_owner(user, cfg.source_cap)
            .await?;
        absorb(&own_posts, weights.own_posts);

        let own_likes = self.store.recent_likes_by_user(user, cfg.source_cap).await?;
        absorb(&own_likes, weights.own_likes);

        // Most-recently-active followees: largest id of their latest post.
        let followees = self.store.followees(user).await?;
        let latest = self.store.latest_post_ids(&followees).await?;
        let mut active: Vec<UserId> = followees
            .into_iter()
            .filter(|f| latest.contains_key(f))
            .collect();
        active.sort_unstable_by_key(|f| std::cmp::Reverse(latest[f]));
        active.truncate(cfg.followee_cap);

        let per_followee = (cfg.source_cap / cfg.followee_cap.max(1)).max(1);
        for &followee in &active {
            let posts = self
                .store
                .recent_posts_by_owner(followee, per_followee)
                .await?;
            absorb(&posts, weights.followee_posts);
            let likes = self
                .store
                .recent_likes_by_user(followee, per_followee)
                .await?;
            absorb(&likes, weights.followee_likes);
        }

        if merged.is_empty() {
            return Ok(Vec::new());
        }

        // Mild id-order recency decay: the weakest post retains
        // `recency_floor` of its weight relative to the strongest.
        let mut ranked: Vec<(PostId, f64)> = merged.into_iter().collect();
        ranked.sort_unstable_by(|a, b| b.0.cmp(&a.0));
        let n = ranked.len();
        if n > 1 {
            let span = (n - 1) as f64;
            for (i, entry) in ranked.iter_mut().enumerate() {
                entry.1 *= self.config.recency_floor.powf(i as f64 / span);
            }
        }

        // Normalize and flatten so no single very-active post dominates.
        let total: f64 = ranked.iter().map(|(_, w)| w).sum();
        Ok(ranked
            .into_iter()
            .map(|(post, w)| Candidate {
                post,
                effective_weight: (w / total).powf(self.config.weight_gamma),
            })
            .collect())
    }

    /// Decode stored vectors for candidates that have one.
    async fn gather_materials(&self, candidates: &[Candidate]) -> Result<Vec<Material>> {
        let ids: Vec<PostId> = candidates.iter().map(|c| c.post).collect();
        let summaries =
            summaries_chunked(self.store.as_ref(), &ids, self.config.vector_fetch_chunk).await?;
        let weight_of: HashMap<PostId, f64> = candidates
            .iter()
            .map(|c| (c.post, c.effective_weight))
            .collect();

        let mut materials = Vec::new();
        for summary in summaries {
            let Some(features) = summary.features.as_deref() else {
                continue;
            };
            if features.len() != self.config.feature_dim {
                continue;
            }
            let raw = codec::decode(features, self.config.quant_gamma)?;
            let unit = vecmath::normalize_l2(&raw);
            if vecmath::l2_norm(&unit) == 0.0 {
                // An all-zero stored vector carries no direction.
                continue;
            }
            if let Some(&effective_weight) = weight_of.get(&summary.post) {
                materials.push(Material {
                    post: summary.post,
                    effective_weight,
                    raw,
                    unit,
                });
            }
        }
        // Strongest signal first; the degraded one-cluster-per-material
        // path relies on this ordering.
        materials.sort_by(|a, b| {
            b.effective_weight
                .total_cmp(&a.effective_weight)
                .then_with(|| b.post.cmp(&a.post))
        });
        Ok(materials)
    }

    /// Partition materials into clusters per the three regimes.
    fn group_materials(
        &self,
        user: UserId,
        materials: &[Material],
        num_clusters: usize,
    ) -> Result<Vec<Vec<usize>>> {
        if num_clusters <= 1 {
            return Ok(vec![(0..materials.len()).collect()]);
        }
        if materials.len() < num_clusters {
            // Degrade gracefully: one cluster per material, strongest first.
            return Ok((0..materials.len()).map(|i| vec![i]).collect());
        }
        let vectors: Vec<Vec<f32>> = materials.iter().map(|m| m.unit.clone()).collect();
        let assignments = vecmath::cluster_by_kmeans(
            &vectors,
            num_clusters,
            &KMeansOptions {
                seed: fnv1a64(&user.0.to_le_bytes()),
                normalize: true,
                max_iterations: self.config.kmeans_max_iterations,
            },
        )?;
        let mut groups = vec![Vec::new(); num_clusters];
        for (i, &cluster) in assignments.iter().enumerate() {
            groups[cluster].push(i);
        }
        debug!(
            %user,
            requested = num_clusters,
            populated = groups.iter().filter(|g| !g.is_empty()).count(),
            "clustered seed materials"
        );
        Ok(groups)
    }

    /// Build one seed from a cluster of vector-bearing members.
    fn build_cluster_seed(
        &self,
        user: UserId,
        members: &[&Material],
        tags_by_post: &HashMap<PostId, Vec<(String, u8)>>,
        keywords_by_post: &HashMap<PostId, Vec<(u32, u8)>>,
        owners: &HashMap<PostId, UserId>,
    ) -> Result<Option<SearchSeed>> {
        let weight: f64 = members.iter().map(|m| m.effective_weight).sum();
        if weight <= 0.0 {
            return Ok(None);
        }

        let weighted: Vec<(PostId, f64)> = members
            .iter()
            .map(|m| (m.post, m.effective_weight))
            .collect();
        let (tags, extra_tags) = self.tag_tiers(&weighted, tags_by_post);
        let (keyword_hashes, extra_hashes) = self.keyword_tiers(&weighted, keywords_by_post);

        // Weighted sum of the stored (pre-normalization) vectors, then one
        // normalization before re-quantization.
        let mut sum = vec![0.0f32; self.config.feature_dim];
        for m in members {
            for (s, x) in sum.iter_mut().zip(&m.raw) {
                *s += *x * m.effective_weight as f32;
            }
        }
        let unit = vecmath::normalize_l2(&sum);
        let features = if vecmath::l2_norm(&unit) > 0.0 {
            codec::encode(
                &unit,
                self.config.feature_dim,
                self.config.quant_percentile,
                self.config.quant_gamma,
            )?
        } else {
            // Members cancelled out exactly; fall back to the user's
            // deterministic placeholder direction.
            self.placeholder_features(user)
        };

        let post_ids = self.representative_posts(user, &weighted, owners);

        Ok(Some(SearchSeed {
            tags,
            extra_tags,
            keyword_hashes,
            extra_hashes,
            features,
            weight,
            post_ids,
        }))
    }

    /// No-vector fallback: one tag-only seed over every candidate.
    fn build_tag_only_seed(
        &self,
        user: UserId,
        candidates: &[Candidate],
        tags_by_post: &HashMap<PostId, Vec<(String, u8)>>,
        keywords_by_post: &HashMap<PostId, Vec<(u32, u8)>>,
        owners: &HashMap<PostId, UserId>,
    ) -> Option<SearchSeed> {
        let weight: f64 = candidates.iter().map(|c| c.effective_weight).sum();
        if weight <= 0.0 {
            return None;
        }
        let weighted: Vec<(PostId, f64)> = candidates
            .iter()
            .map(|c| (c.post, c.effective_weight))
            .collect();
        let (tags, extra_tags) = self.tag_tiers(&weighted, tags_by_post);
        let (keyword_hashes, extra_hashes) = self.keyword_tiers(&weighted, keywords_by_post);
        let post_ids = self.representative_posts(user, &weighted, owners);
        debug!(%user, "no candidate vectors; emitting tag-only seed");
        Some(SearchSeed {
            tags,
            extra_tags,
            keyword_hashes,
            extra_hashes,
            features: self.placeholder_features(user),
            weight,
            post_ids,
        })
    }

    /// Deterministic one-hot placeholder: the hot index derives from a
    /// hash of the user id, so the same user always gets the same one.
    fn placeholder_features(&self, user: UserId) -> Vec<i8> {
        let dim = self.config.feature_dim;
        let index = (fnv1a64(&user.0.to_le_bytes()) % dim as u64) as usize;
        let mut features = vec![0i8; dim];
        features[index] = 127;
        features
    }

    /// Score tags across weighted members and split into the integer-count
    /// primary tier and the fractional near-miss tier.
    fn tag_tiers(
        &self,
        members: &[(PostId, f64)],
        tags_by_post: &HashMap<PostId, Vec<(String, u8)>>,
    ) -> (Vec<TagCount>, Vec<TagWeight>) {
        let mut scores: HashMap<&str, f64> = HashMap::new();
        for (post, weight) in members {
            if let Some(assocs) = tags_by_post.get(post) {
                for (tag, source_count) in assocs {
                    *scores.entry(tag.as_str()).or_insert(0.0) +=
                        weight * (1.0 + *source_count as f64).ln();
                }
            }
        }
        let ranked = rank_scores(scores);
        let cutoff_index = self.config.tag_top_n.min(ranked.len());
        if cutoff_index == 0 {
            return (Vec::new(), Vec::new());
        }
        let cutoff = ranked[cutoff_index - 1].1;
        let primary = ranked[..cutoff_index]
            .iter()
            .map(|(tag, score)| TagCount {
                tag: tag.to_string(),
                count: ((score / cutoff).round() as u32).max(1),
            })
            .collect();
        let extra = ranked[cutoff_index..]
            .iter()
            .take(self.config.extra_tag_n)
            .map(|(tag, score)| TagWeight {
                tag: tag.to_string(),
                // Ties with the cutoff stay strictly below 1.
                weight: (score / cutoff).min(0.99),
            })
            .collect();
        (primary, extra)
    }

    /// Same tiering for keyword hashes.
    fn keyword_tiers(
        &self,
        members: &[(PostId, f64)],
        keywords_by_post: &HashMap<PostId, Vec<(u32, u8)>>,
    ) -> (Vec<HashCount>, Vec<HashWeight>) {
        let mut scores: HashMap<u32, f64> = HashMap::new();
        for (post, weight) in members {
            if let Some(assocs) = keywords_by_post.get(post) {
                for (hash, source_count) in assocs {
                    *scores.entry(*hash).or_insert(0.0) +=
                        weight * (1.0 + *source_count as f64).ln();
                }
            }
        }
        let ranked = rank_hash_scores(scores);
        let cutoff_index = self.config.keyword_top_n.min(ranked.len());
        if cutoff_index == 0 {
            return (Vec::new(), Vec::new());
        }
        let cutoff = ranked[cutoff_index - 1].1;
        let primary = ranked[..cutoff_index]
            .iter()
            .map(|(hash, score)| HashCount {
                hash: *hash,
                count: ((score / cutoff).round() as u32).max(1),
            })
            .collect();
        let extra = ranked[cutoff_index..]
            .iter()
            .take(self.config.extra_keyword_n)
            .map(|(hash, score)| HashWeight {
                hash: *hash,
                weight: (score / cutoff).min(0.99),
            })
            .collect();
        (primary, extra)
    }

    /// Top non-self members by weight, capped.
    fn representative_posts(
        &self,
        user: UserId,
        members: &[(PostId, f64)],
        owners: &HashMap<PostId, UserId>,
    ) -> Vec<PostId> {
        let mut ranked: Vec<&(PostId, f64)> = members
            .iter()
            .filter(|(post, _)| owners.get(post).is_some_and(|o| *o != user))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| b.0.cmp(&a.0)));
        ranked
            .into_iter()
            .take(self.config.representative_cap)
            .map(|(post, _)| *post)
            .collect()
    }
}

fn rank_scores(scores: HashMap<&str, f64>) -> Vec<(String, f64)> {
    let mut ranked: Vec<(String, f64)> = scores
        .into_iter()
        .map(|(tag, score)| (tag.to_string(), score))
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked
}

fn rank_hash_scores(scores: HashMap<u32, f64>) -> Vec<(u32, f64)> {
    let mut ranked: Vec<(u32, f64)> = scores.into_iter().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked
}
