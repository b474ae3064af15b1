//! Candidate retrieval and multi-factor rank fusion.
//!
//! [`Ranker`] resolves a tag/vector query in two explicit stages over a
//! typed [`Candidate`] structure:
//!
//! 1. **Lexical stage** — owns `base_score`: capped tag/keyword index
//!    fetches, self-exclusion, linear id-order rank decay, idf-like tag
//!    weights, rootness and social-proximity factors.
//! 2. **Vector refine stage** — owns `score`: when a query vector is
//!    present, each candidate's score is replaced with its
//!    contrast-stretched cosine similarity; candidates without a usable
//!    vector sink to negative infinity but stay in the list.
//!
//! Positional adjustments (owner decay, likes promotion, reply demotion,
//! seed-post boost, duplicate-content demotion) then operate on rank
//! positions, each gated by its [`RankKnobs`] knob. The final page is cut
//! after ordering.
//!
//! Stateless and request-scoped; store reads are chunked and sequential.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::debug;

use crate::codec;
use crate::config::RecsConfig;
use crate::error::Result;
use crate::store::{summaries_chunked, RecsStore};
use crate::types::{PostId, RankKnobs, RecommendationQuery, SortOrder, UserId};
use crate::vecmath;

/// One post moving through the ranking pipeline.
#[derive(Debug, Clone)]
struct Candidate {
    post: PostId,
    owner: Option<UserId>,
    is_root: bool,
    likes: u32,
    /// Lexical-stage relevance. Never mutated after stage one.
    base_score: f64,
    /// Decoded stored vector, if the post has one.
    vector: Option<Vec<f32>>,
    /// Current ordering score: base, then overwritten by the refine
    /// stage, then scaled by owner decay.
    score: f64,
}

/// Ranks candidate posts against a tag/vector query.
pub struct Ranker {
    store: Arc<dyn RecsStore>,
    config: RecsConfig,
}

impl Ranker {
    pub fn new(store: Arc<dyn RecsStore>, config: RecsConfig) -> Self {
        Self { store, config }
    }

    /// Retrieve, score, adjust, and page candidate posts for a query.
    ///
    /// An empty tag set is a valid empty result. Malformed tag entries
    /// (empty names, zero counts) are skipped, not fatal; empty
    /// intermediate results short-circuit to an empty list.
    pub async fn recommend_posts(&self, query: &RecommendationQuery) -> Result<Vec<PostId>> {
        let tags: Vec<(&str, u32)> = query
            .tags
            .iter()
            .filter(|(name, count)| !name.is_empty() && *count > 0)
            .map(|(name, count)| (name.as_str(), *count))
            .collect();
        if tags.is_empty() {
            return Ok(Vec::new());
        }
        let hashes: Vec<(u32, u32)> = query
            .keyword_hashes
            .iter()
            .filter(|(_, count)| *count > 0)
            .copied()
            .collect();

        let mut candidates = self.lexical_stage(query, &tags, &hashes).await?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        // Bounded universe, then guaranteed seed-post inclusion.
        candidates.sort_by(|a, b| {
            b.base_score
                .total_cmp(&a.base_score)
                .then_with(|| b.post.cmp(&a.post))
        });
        candidates.truncate(self.config.universe_cap);
        self.include_seed_posts(query, &mut candidates).await?;
        self.attach_vectors(&mut candidates).await?;

        if let Some(query_vector) = query.features.as_deref() {
            self.vector_refine_stage(query_vector, &mut candidates);
        }

        self.apply_owner_decay(&query.knobs, &mut candidates);
        self.apply_positional_adjustments(query, &mut candidates);
        self.apply_duplicate_demotion(&query.knobs, &mut candidates);

        debug!(universe = candidates.len(), "ranked candidate universe");
        let mut ids: Vec<PostId> = candidates.into_iter().map(|c| c.post).collect();
        if query.page.order == SortOrder::Asc {
            ids.reverse();
        }
        Ok(ids
            .into_iter()
            .skip(query.page.offset)
            .take(query.page.limit)
            .collect())
    }

    /// Stage one: fetch tag/keyword matches and compute `base_score`.
    async fn lexical_stage(
        &self,
        query: &RecommendationQuery,
        tags: &[(&str, u32)],
        hashes: &[(u32, u32)],
    ) -> Result<Vec<Candidate>> {
        let cap = self.config.tag_fetch_cap;

        // Per-post matched terms: (query count, source count, tag name/hash).
        let mut tag_matches: HashMap<PostId, Vec<(usize, u32, u8)>> = HashMap::new();
        for (term_index, (tag, query_count)) in tags.iter().enumerate() {
            for assoc in self.store.posts_for_tag(tag, cap).await? {
                tag_matches.entry(assoc.post).or_default().push((
                    term_index,
                    *query_count,
                    assoc.source_count,
                ));
            }
        }
        let mut hash_matches: HashMap<PostId, Vec<(usize, u32, u8)>> = HashMap::new();
        for (term_index, (hash, query_count)) in hashes.iter().enumerate() {
            for assoc in self.store.posts_for_keyword(*hash, cap).await? {
                hash_matches.entry(assoc.post).or_default().push((
                    term_index,
                    *query_count,
                    assoc.source_count,
                ));
            }
        }

        let mut ids: Vec<PostId> = tag_matches
            .keys()
            .chain(hash_matches.keys())
            .copied()
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        ids.sort_unstable();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let posts = self.store.posts(&ids).await?;
        let meta: HashMap<PostId, _> = posts.into_iter().map(|p| (p.id, p)).collect();

        // Resolve ownership, then drop the querying user's own posts.
        let survivors: Vec<PostId> = ids
            .into_iter()
            .filter(|id| match (meta.get(id), query.self_user) {
                (Some(post), Some(self_user)) => post.owner != self_user,
                (Some(_), None) => true,
                // Tag entries pointing at unknown posts are skipped.
                (None, _) => false,
            })
            .collect();
        if survivors.is_empty() {
            return Ok(Vec::new());
        }

        let tag_weights = idf_weights(tags.len(), &survivors, &tag_matches);
        let hash_weights = idf_weights(hashes.len(), &survivors, &hash_matches);
        let post_rank = linear_rank_scores(&survivors);

        let followees: HashSet<UserId> = match query.self_user {
            Some(self_user) => self.store.followees(self_user).await?.into_iter().collect(),
            None => HashSet::new(),
        };

        let candidates = survivors
            .iter()
            .map(|id| {
                let post = &meta[id];
                let rootness = if post.is_root() {
                    1.0
                } else {
                    self.config.reply_rootness
                };
                let proximity = match query.self_user {
                    None => 1.0,
                    Some(self_user) if post.owner == self_user => self.config.proximity.self_tier,
                    Some(_) if followees.contains(&post.owner) => self.config.proximity.followee,
                    Some(_) => self.config.proximity.stranger,
                };
                let rank_score = post_rank[id];

                let mut base = 0.0;
                for matches_and_weights in [
                    (tag_matches.get(id), &tag_weights),
                    (hash_matches.get(id), &hash_weights),
                ] {
                    let (matches, weights) = matches_and_weights;
                    let Some(matches) = matches else { continue };
                    for &(term_index, query_count, source_count) in matches {
                        base += rank_score
                            * (source_count as f64 + query_count as f64).ln()
                            * weights[term_index]
                            * rootness
                            * proximity;
                    }
                }

                Candidate {
                    post: *id,
                    owner: Some(post.owner),
                    is_root: post.is_root(),
                    likes: post.likes,
                    base_score: base,
                    vector: None,
                    score: base,
                }
            })
            .collect();
        Ok(candidates)
    }

    /// Pull in explicitly supplied seed posts not already in the universe.
    async fn include_seed_posts(
        &self,
        query: &RecommendationQuery,
        candidates: &mut Vec<Candidate>,
    ) -> Result<()> {
        let present: HashSet<PostId> = candidates.iter().map(|c| c.post).collect();
        let missing: Vec<PostId> = query
            .seed_posts
            .iter()
            .filter(|id| !present.contains(id))
            .copied()
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        let meta: HashMap<PostId, _> = self
            .store
            .posts(&missing)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();
        for id in missing {
            // Included regardless of rank; unknown posts keep neutral
            // attributes rather than being dropped.
            let (owner, is_root, likes) = match meta.get(&id) {
                Some(post) => (Some(post.owner), post.is_root(), post.likes),
                None => (None, true, 0),
            };
            candidates.push(Candidate {
                post: id,
                owner,
                is_root,
                likes,
                base_score: 0.0,
                vector: None,
                score: 0.0,
            });
        }
        Ok(())
    }

    /// Fetch and decode candidate vectors in bounded sequential pages.
    async fn attach_vectors(&self, candidates: &mut [Candidate]) -> Result<()> {
        let ids: Vec<PostId> = candidates.iter().map(|c| c.post).collect();
        let summaries =
            summaries_chunked(self.store.as_ref(), &ids, self.config.vector_fetch_chunk).await?;
        let mut vectors: HashMap<PostId, Vec<f32>> = HashMap::new();
        for summary in summaries {
            if let Some(features) = summary.features.as_deref() {
                vectors.insert(summary.post, codec::decode(features, self.config.quant_gamma)?);
            }
        }
        for candidate in candidates.iter_mut() {
            candidate.vector = vectors.remove(&candidate.post);
        }
        Ok(())
    }

    /// Stage two: overwrite scores with contrast-stretched cosine against
    /// the query vector. Missing or mismatched vectors sink to -inf but
    /// remain in the universe (excluded via ordering, not removal).
    fn vector_refine_stage(&self, query_vector: &[f32], candidates: &mut Vec<Candidate>) {
        let query_unit = vecmath::normalize_l2(query_vector);
        for candidate in candidates.iter_mut() {
            candidate.score = match candidate.vector.as_deref() {
                Some(v) if v.len() == query_unit.len() => {
                    let unit = vecmath::normalize_l2(v);
                    // Dimensions checked above, so this cannot fail.
                    let cos = vecmath::cosine_similarity(&query_unit, &unit).unwrap_or(0.0) as f64;
                    vecmath::sigmoidal_contrast(
                        cos.clamp(0.0, 1.0),
                        self.config.contrast_gain,
                        self.config.contrast_mid,
                    )
                }
                _ => f64::NEG_INFINITY,
            };
        }
        candidates.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| b.post.cmp(&a.post)));
    }

    /// Multiply each successive post from an already-seen author by
    /// `decay^occurrences`, then re-sort.
    fn apply_owner_decay(&self, knobs: &RankKnobs, candidates: &mut Vec<Candidate>) {
        if !(0.0..1.0).contains(&knobs.owner_decay) {
            return;
        }
        let mut seen: HashMap<UserId, u32> = HashMap::new();
        for candidate in candidates.iter_mut() {
            let Some(owner) = candidate.owner else { continue };
            let occurrences = seen.entry(owner).or_insert(0);
            if *occurrences > 0 {
                candidate.score *= knobs.owner_decay.powi(*occurrences as i32);
            }
            *occurrences += 1;
        }
        candidates.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| b.post.cmp(&a.post)));
    }

    /// Secondary positional key: likes promotion, reply demotion, and
    /// seed-post boost, applied to rank positions rather than scores.
    fn apply_positional_adjustments(
        &self,
        query: &RecommendationQuery,
        candidates: &mut Vec<Candidate>,
    ) {
        let knobs = &query.knobs;
        if !knobs.any_positional() {
            return;
        }
        let seed_rank: HashMap<PostId, usize> = query
            .seed_posts
            .iter()
            .enumerate()
            .map(|(i, id)| (*id, i))
            .collect();
        let seed_len = query.seed_posts.len().max(1) as f64;

        let mut keyed: Vec<(f64, Candidate)> = candidates
            .drain(..)
            .enumerate()
            .map(|(position, candidate)| {
                let mut key = position as f64;
                // Diminishing-returns likes promotion.
                key -= knobs.likes_promotion_alpha * (1.0 + candidate.likes as f64).ln();
                if !candidate.is_root {
                    key += knobs.reply_demotion;
                }
                if let Some(&rank) = seed_rank.get(&candidate.post) {
                    // Earlier in the supplied seed list = larger boost.
                    key -= knobs.seed_post_promotion * (seed_len - rank as f64) / seed_len;
                }
                (key, candidate)
            })
            .collect();
        keyed.sort_by(|(ka, a), (kb, b)| {
            ka.total_cmp(kb)
                .then_with(|| b.base_score.total_cmp(&a.base_score))
                .then_with(|| b.post.cmp(&a.post))
        });
        candidates.extend(keyed.into_iter().map(|(_, c)| c));
    }

    /// Demote near-duplicate content: once a candidate's similarity to the
    /// running sum of previously-seen vectors exceeds the threshold, its
    /// position takes a proportional penalty (zero at the threshold, the
    /// full weight at similarity 1).
    fn apply_duplicate_demotion(&self, knobs: &RankKnobs, candidates: &mut Vec<Candidate>) {
        if knobs.duplicate_demotion <= 0.0 {
            return;
        }
        let threshold = self.config.duplicate_threshold;
        // A threshold of 1.0 can never be exceeded and would make the
        // penalty denominator zero.
        if threshold >= 1.0 {
            return;
        }
        let mut running: Option<Vec<f32>> = None;
        let mut keyed: Vec<(f64, usize, Candidate)> = Vec::with_capacity(candidates.len());
        for (position, candidate) in candidates.drain(..).enumerate() {
            let mut key = position as f64;
            if let Some(vector) = candidate.vector.as_deref() {
                if let Some(sum) = running.as_deref() {
                    if sum.len() == vector.len() {
                        let sim = vecmath::cosine_similarity(vector, sum).unwrap_or(0.0) as f64;
                        if sim > threshold {
                            key += knobs.duplicate_demotion * (sim - threshold)
                                / (1.0 - threshold);
                        }
                    }
                }
                running = match running.take() {
                    None => Some(vector.to_vec()),
                    Some(sum) if sum.len() == vector.len() => {
                        Some(vecmath::add_vectors(&sum, vector).unwrap_or(sum))
                    }
                    Some(sum) => Some(sum),
                };
            }
            keyed.push((key, position, candidate));
        }
        keyed.sort_by(|(ka, pa, _), (kb, pb, _)| ka.total_cmp(kb).then_with(|| pa.cmp(pb)));
        candidates.extend(keyed.into_iter().map(|(_, _, c)| c));
    }
}

/// Linear id-descending rank decay, normalized to (0, 1].
fn linear_rank_scores(ids: &[PostId]) -> HashMap<PostId, f64> {
    let mut ordered = ids.to_vec();
    ordered.sort_unstable_by(|a, b| b.cmp(a));
    let n = ordered.len() as f64;
    ordered
        .into_iter()
        .enumerate()
        .map(|(i, id)| (id, (n - i as f64) / n))
        .collect()
}

/// Idf-like per-term weights: rarer-but-present terms score higher.
///
/// Posts carrying each term accumulate the same linear rank decay; the
/// term's weight is `ln(total / termScore)` over the summed scores.
fn idf_weights(
    term_count: usize,
    survivors: &[PostId],
    matches: &HashMap<PostId, Vec<(usize, u32, u8)>>,
) -> Vec<f64> {
    if term_count == 0 {
        return Vec::new();
    }
    let bearing: Vec<PostId> = {
        let mut ids: Vec<PostId> = survivors
            .iter()
            .filter(|id| matches.contains_key(id))
            .copied()
            .collect();
        ids.sort_unstable_by(|a, b| b.cmp(a));
        ids
    };
    let rank = linear_rank_scores(&bearing);
    let mut term_scores = vec![0.0f64; term_count];
    for id in &bearing {
        for &(term_index, _, _) in &matches[id] {
            term_scores[term_index] += rank[id];
        }
    }
    let total: f64 = term_scores.iter().sum();
    term_scores
        .into_iter()
        .map(|score| {
            if score > 0.0 && total > 0.0 {
                (total / score).ln()
            } else {
                0.0
            }
        })
        .collect()
}
