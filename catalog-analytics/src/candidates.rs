// ---------------------------------------------------------------------------
// Candidate Aggregator: merge per-signal candidates into a ranked top-K list
// ---------------------------------------------------------------------------
//
// For one source item every signal proposes candidates:
//
//   same author       100           (any kind)
//   same publisher     50           (any kind, normalized name)
//   same category      30           (source kind only)
//   co-occurrence      20 × count   (any kind)
//
// Candidates for the same item are merged by summing scores. The retained
// tag is the contributing signal with the highest static base weight, so a
// large co-occurrence count never displaces an author match as the tag.
// Ranking is score descending, then `ItemKey` ascending.
// ---------------------------------------------------------------------------

use std::collections::HashMap;

use crate::cooccurrence::CoOccurrenceIndex;
use crate::error::AnalyticsError;
use crate::signal_index::SignalIndex;
use crate::types::{CatalogItem, ItemKey, RelatedItemEdge, RelationCandidate, RelationKind};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Maximum related edges persisted per source item.
pub const DEFAULT_MAX_RELATED: usize = 20;

/// Aggregate scores are divided by this to produce `similarity_score`.
pub const SIMILARITY_SCALE: f64 = 100.0;

// ---------------------------------------------------------------------------
// Merging
// ---------------------------------------------------------------------------

struct Merged {
	score: u64,
	relation: RelationKind,
}

fn contribute(
	merged: &mut HashMap<ItemKey, Merged>,
	source: &ItemKey,
	candidate: &ItemKey,
	relation: RelationKind,
	score: u64,
) {
	if candidate == source || score == 0 {
		return;
	}
	match merged.get_mut(candidate) {
		Some(existing) => {
			existing.score = existing.score.saturating_add(score);
			if relation.base_weight() > existing.relation.base_weight() {
				existing.relation = relation;
			}
		}
		None => {
			merged.insert(candidate.clone(), Merged { score, relation });
		}
	}
}

/// Sort descending by score, ascending by key on ties, and keep `limit`.
pub fn rank(mut candidates: Vec<RelationCandidate>, limit: usize) -> Vec<RelationCandidate> {
	candidates.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.key.cmp(&b.key)));
	candidates.truncate(limit);
	candidates
}

// ---------------------------------------------------------------------------
// CandidateAggregator
// ---------------------------------------------------------------------------

pub struct CandidateAggregator<'a> {
	signals: &'a SignalIndex,
	cooccurrence: &'a CoOccurrenceIndex,
	max_related: usize,
}

impl<'a> CandidateAggregator<'a> {
	pub fn new(signals: &'a SignalIndex, cooccurrence: &'a CoOccurrenceIndex) -> Self {
		Self {
			signals,
			cooccurrence,
			max_related: DEFAULT_MAX_RELATED,
		}
	}

	pub fn with_max_related(mut self, max_related: usize) -> Self {
		self.max_related = max_related;
		self
	}

	/// Merged, ranked, capped candidates for `source`. Never contains `source`.
	pub fn candidates_for(
		&self,
		source: &CatalogItem,
	) -> Result<Vec<RelationCandidate>, AnalyticsError> {
		if source.id.trim().is_empty() {
			return Err(AnalyticsError::InvalidItem(format!(
				"{} item with empty id",
				source.kind
			)));
		}

		let source_key = source.key();
		let mut merged: HashMap<ItemKey, Merged> = HashMap::new();

		if let Some(author) = source.author.as_deref() {
			for key in self.signals.items_by_author(author) {
				contribute(
					&mut merged,
					&source_key,
					key,
					RelationKind::SameAuthor,
					RelationKind::SameAuthor.base_weight(),
				);
			}
		}

		if let Some(publisher) = source.publisher_name.as_deref() {
			for key in self.signals.items_by_publisher(publisher) {
				contribute(
					&mut merged,
					&source_key,
					key,
					RelationKind::SamePublisher,
					RelationKind::SamePublisher.base_weight(),
				);
			}
		}

		if let Some(category) = source.category_id.as_deref() {
			for key in self.signals.items_by_category(category) {
				if key.kind != source.kind {
					continue;
				}
				contribute(
					&mut merged,
					&source_key,
					key,
					RelationKind::SameCategory,
					RelationKind::SameCategory.base_weight(),
				);
			}
		}

		if let Some(partners) = self.cooccurrence.partner_map(&source_key) {
			for (key, &count) in partners {
				// Activity can outlive catalog rows.
				if !self.signals.contains(key) {
					continue;
				}
				contribute(
					&mut merged,
					&source_key,
					key,
					RelationKind::CoOccurrence,
					RelationKind::CoOccurrence.base_weight().saturating_mul(count),
				);
			}
		}

		let candidates: Vec<RelationCandidate> = merged
			.into_iter()
			.map(|(key, m)| RelationCandidate {
				key,
				relation: m.relation,
				score: m.score,
			})
			.collect();

		Ok(rank(candidates, self.max_related))
	}

	/// Persistable edges for `source`, in rank order.
	pub fn edges_for(&self, source: &CatalogItem) -> Result<Vec<RelatedItemEdge>, AnalyticsError> {
		let candidates = self.candidates_for(source)?;
		Ok(candidates
			.into_iter()
			.map(|c| to_edge(source, c))
			.collect())
	}
}

fn to_edge(source: &CatalogItem, candidate: RelationCandidate) -> RelatedItemEdge {
	RelatedItemEdge {
		source_kind: source.kind,
		source_id: source.id.clone(),
		related_kind: candidate.key.kind,
		related_id: candidate.key.id,
		relation: candidate.relation,
		similarity_score: candidate.score as f64 / SIMILARITY_SCALE,
	}
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
	use super::*;
	use crate::types::{ActivityRecord, ItemKind};

	fn book(id: &str) -> CatalogItem {
		CatalogItem {
			kind: ItemKind::Book,
			id: id.to_string(),
			author: None,
			publisher_name: None,
			category_id: None,
		}
	}

	fn with_author(mut item: CatalogItem, author: &str) -> CatalogItem {
		item.author = Some(author.to_string());
		item
	}

	fn with_publisher(mut item: CatalogItem, publisher: &str) -> CatalogItem {
		item.publisher_name = Some(publisher.to_string());
		item
	}

	fn with_category(mut item: CatalogItem, category: &str) -> CatalogItem {
		item.category_id = Some(category.to_string());
		item
	}

	fn hold(user: &str, kind: ItemKind, id: &str) -> ActivityRecord {
		ActivityRecord {
			user_id: user.to_string(),
			kind,
			item_id: id.to_string(),
		}
	}

	fn run(
		catalog: &[CatalogItem],
		activity: &[ActivityRecord],
		source: &CatalogItem,
	) -> Vec<RelationCandidate> {
		let signals = SignalIndex::build(catalog);
		let co = CoOccurrenceIndex::mine(activity);
		CandidateAggregator::new(&signals, &co)
			.candidates_for(source)
			.unwrap()
	}

	#[test]
	fn author_and_publisher_stack_and_keep_author_tag() {
		let x = with_publisher(with_author(book("X"), "Smith"), "Acme");
		let y = with_publisher(with_author(book("Y"), "Smith"), "Acme");
		let result = run(&[x.clone(), y], &[], &x);

		assert_eq!(result.len(), 1);
		assert_eq!(result[0].key, ItemKey::new(ItemKind::Book, "Y"));
		assert_eq!(result[0].score, 150);
		assert_eq!(result[0].relation, RelationKind::SameAuthor);
	}

	#[test]
	fn source_item_is_never_a_candidate() {
		let a = with_category(with_publisher(with_author(book("A"), "Smith"), "Acme"), "c1");
		let b = with_category(with_publisher(with_author(book("B"), "Smith"), "Acme"), "c1");
		let activity = vec![
			hold("u1", ItemKind::Book, "A"),
			hold("u1", ItemKind::Book, "B"),
		];
		let catalog = vec![a.clone(), b];
		let result = run(&catalog, &activity, &a);
		assert!(result.iter().all(|c| c.key != a.key()));
		assert_eq!(result.len(), 1);
	}

	#[test]
	fn two_signals_strictly_outscore_either_alone() {
		let src = with_category(with_author(book("S"), "Smith"), "c1");
		let both = with_category(with_author(book("B"), "Smith"), "c1");
		let author_only = with_author(book("A"), "Smith");
		let category_only = with_category(book("C"), "c1");
		let catalog = vec![src.clone(), both, author_only, category_only];
		let result = run(&catalog, &[], &src);

		let score = |id: &str| {
			result
				.iter()
				.find(|c| c.key.id == id)
				.map(|c| c.score)
				.unwrap()
		};
		assert!(score("B") > score("A"));
		assert!(score("B") > score("C"));
		assert_eq!(score("B"), 130);
	}

	#[test]
	fn co_occurrence_weight_scales_with_count() {
		let a = book("A");
		let catalog = vec![a.clone(), book("B"), book("C")];
		let activity = vec![
			hold("u1", ItemKind::Book, "A"),
			hold("u1", ItemKind::Book, "B"),
			hold("u1", ItemKind::Book, "C"),
			hold("u2", ItemKind::Book, "A"),
			hold("u2", ItemKind::Book, "B"),
		];
		let result = run(&catalog, &activity, &a);
		assert_eq!(result[0].key.id, "B");
		assert_eq!(result[0].score, 40);
		assert_eq!(result[0].relation, RelationKind::CoOccurrence);
		assert_eq!(result[1].key.id, "C");
		assert_eq!(result[1].score, 20);
	}

	#[test]
	fn co_occurrence_partners_outside_the_catalog_are_dropped() {
		let a = book("A");
		let activity = vec![
			hold("u1", ItemKind::Book, "A"),
			hold("u1", ItemKind::Book, "gone"),
			hold("u2", ItemKind::Book, "A"),
			hold("u2", ItemKind::Audiobook, "B"),
		];
		let result = run(&[a.clone(), book("B")], &activity, &a);
		assert!(result.is_empty());

		let shelf = vec![
			hold("u3", ItemKind::Book, "A"),
			hold("u3", ItemKind::Book, "B"),
		];
		let result = run(&[a.clone(), book("B")], &shelf, &a);
		assert_eq!(result.len(), 1);
		assert_eq!(result[0].key, ItemKey::new(ItemKind::Book, "B"));
	}

	#[test]
	fn heavy_co_occurrence_does_not_replace_author_tag() {
		let a = with_author(book("A"), "Smith");
		let b = with_author(book("B"), "Smith");
		let activity: Vec<ActivityRecord> = (0..10)
			.flat_map(|u| {
				let user = format!("u{u}");
				vec![
					hold(&user, ItemKind::Book, "A"),
					hold(&user, ItemKind::Book, "B"),
				]
			})
			.collect();
		let result = run(&[a.clone(), b], &activity, &a);
		assert_eq!(result[0].score, 100 + 200);
		assert_eq!(result[0].relation, RelationKind::SameAuthor);
	}

	#[test]
	fn publisher_matches_across_kinds_but_category_does_not() {
		let src = with_category(with_publisher(book("1"), "Acme"), "c1");
		let audio = CatalogItem {
			kind: ItemKind::Audiobook,
			id: "9".into(),
			author: None,
			publisher_name: Some("ACME".into()),
			category_id: Some("c1".into()),
		};
		let result = run(&[src.clone(), audio], &[], &src);
		assert_eq!(result.len(), 1);
		assert_eq!(result[0].key, ItemKey::new(ItemKind::Audiobook, "9"));
		assert_eq!(result[0].relation, RelationKind::SamePublisher);
		assert_eq!(result[0].score, 50);
	}

	#[test]
	fn output_is_capped_at_max_related() {
		let mut catalog = vec![with_category(book("src"), "c")];
		for i in 0..30 {
			catalog.push(with_category(book(&format!("{i:02}")), "c"));
		}
		let signals = SignalIndex::build(&catalog);
		let co = CoOccurrenceIndex::mine(&[]);
		let agg = CandidateAggregator::new(&signals, &co);
		let result = agg.candidates_for(&catalog[0]).unwrap();
		assert_eq!(result.len(), DEFAULT_MAX_RELATED);

		let small = CandidateAggregator::new(&signals, &co).with_max_related(3);
		assert_eq!(small.candidates_for(&catalog[0]).unwrap().len(), 3);
	}

	#[test]
	fn ties_break_by_ascending_key() {
		let src = with_category(book("m"), "c");
		let catalog = vec![
			src.clone(),
			with_category(book("z"), "c"),
			with_category(book("a"), "c"),
			with_category(book("k"), "c"),
		];
		let result = run(&catalog, &[], &src);
		let ids: Vec<&str> = result.iter().map(|c| c.key.id.as_str()).collect();
		assert_eq!(ids, vec!["a", "k", "z"]);
	}

	#[test]
	fn edges_scale_scores_by_one_hundred() {
		let x = with_publisher(with_author(book("X"), "Smith"), "Acme");
		let y = with_publisher(with_author(book("Y"), "Smith"), "Acme");
		let signals = SignalIndex::build(&[x.clone(), y]);
		let co = CoOccurrenceIndex::mine(&[]);
		let edges = CandidateAggregator::new(&signals, &co).edges_for(&x).unwrap();
		assert_eq!(edges.len(), 1);
		assert!((edges[0].similarity_score - 1.5).abs() < 1e-10);
		assert_eq!(edges[0].source_id, "X");
		assert_eq!(edges[0].related_id, "Y");
	}

	#[test]
	fn item_with_no_signals_has_no_candidates() {
		let lonely = book("L");
		let result = run(&[lonely.clone(), book("O")], &[], &lonely);
		assert!(result.is_empty());
	}

	#[test]
	fn empty_id_is_rejected() {
		let signals = SignalIndex::build(&[]);
		let co = CoOccurrenceIndex::mine(&[]);
		let err = CandidateAggregator::new(&signals, &co)
			.candidates_for(&book("  "))
			.unwrap_err();
		assert_eq!(err.code(), "ANALYTICS_INVALID_ITEM");
	}

	#[test]
	fn rank_orders_and_truncates() {
		let c = |id: &str, score| RelationCandidate {
			key: ItemKey::new(ItemKind::Book, id),
			relation: RelationKind::SameCategory,
			score,
		};
		let ranked = rank(vec![c("b", 30), c("a", 30), c("c", 100)], 2);
		assert_eq!(ranked, vec![c("c", 100), c("a", 30)]);
	}
}
