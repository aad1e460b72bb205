//! Chunk deduplication by id.

use crate::types::RetrievalChunk;
use std::collections::HashMap;

/// NaN ranks below every real score.
fn rank(similarity: f64) -> f64 {
    if similarity.is_nan() {
        f64::NEG_INFINITY
    } else {
        similarity
    }
}

/// Keep one chunk per id.
///
/// The survivor is the occurrence with the highest similarity; on a tie the
/// earliest occurrence wins. Survivors keep the position of the occurrence
/// that was retained, so the output is otherwise in first-seen order.
pub fn dedup_chunks(chunks: Vec<RetrievalChunk>) -> Vec<RetrievalChunk> {
    // id -> index into `chunks` of the best occurrence so far
    let mut best: HashMap<&str, usize> = HashMap::with_capacity(chunks.len());

    for (idx, chunk) in chunks.iter().enumerate() {
        match best.get(chunk.id.as_str()) {
            Some(&kept) if rank(chunks[kept].similarity) >= rank(chunk.similarity) => {}
            _ => {
                best.insert(chunk.id.as_str(), idx);
            }
        }
    }

    let mut keep = vec![false; chunks.len()];
    for idx in best.into_values() {
        keep[idx] = true;
    }

    chunks
        .into_iter()
        .zip(keep)
        .filter_map(|(chunk, kept)| kept.then_some(chunk))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn chunk(id: &str, similarity: f64, content: &str) -> RetrievalChunk {
        RetrievalChunk {
            id: id.to_string(),
            content: content.to_string(),
            document_id: "d".to_string(),
            document_name: "doc.md".to_string(),
            dataset_id: "ds".to_string(),
            similarity,
            vector_similarity: 0.0,
            term_similarity: 0.0,
            positions: Vec::new(),
            keywords: Vec::new(),
            highlight: None,
        }
    }

    fn ids(chunks: &[RetrievalChunk]) -> Vec<&str> {
        chunks.iter().map(|c| c.id.as_str()).collect()
    }

    #[test]
    fn test_keeps_highest_similarity_at_its_position() {
        let out = dedup_chunks(vec![
            chunk("a", 0.3, "a-low"),
            chunk("b", 0.5, "b"),
            chunk("a", 0.9, "a-high"),
            chunk("c", 0.1, "c"),
        ]);

        assert_eq!(ids(&out), vec!["b", "a", "c"]);
        assert_eq!(out[1].content, "a-high");
    }

    #[test]
    fn test_tie_keeps_first_occurrence() {
        let out = dedup_chunks(vec![
            chunk("a", 0.5, "first"),
            chunk("b", 0.4, "b"),
            chunk("a", 0.5, "second"),
        ]);

        assert_eq!(ids(&out), vec!["a", "b"]);
        assert_eq!(out[0].content, "first");
    }

    #[test]
    fn test_nan_similarity_never_wins() {
        let out = dedup_chunks(vec![
            chunk("a", f64::NAN, "nan-first"),
            chunk("a", 0.1, "real"),
            chunk("a", f64::NAN, "nan-last"),
        ]);

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].content, "real");
    }

    #[test]
    fn test_unique_ids_unchanged() {
        let input = vec![chunk("x", 0.1, ""), chunk("y", 0.9, ""), chunk("z", 0.5, "")];
        assert_eq!(dedup_chunks(input.clone()), input);
        assert!(dedup_chunks(Vec::new()).is_empty());
    }

    fn similarity() -> impl Strategy<Value = f64> {
        prop_oneof![
            4 => 0.0..=1.0f64,
            1 => Just(f64::NAN),
            1 => Just(f64::INFINITY),
            1 => Just(f64::NEG_INFINITY),
            1 => -1.0e9..1.0e9f64,
        ]
    }

    /// Chunks whose content records their input position.
    fn pool() -> impl Strategy<Value = Vec<RetrievalChunk>> {
        prop::collection::vec(("[a-e]", similarity()), 0..40).prop_map(|items| {
            items
                .into_iter()
                .enumerate()
                .map(|(idx, (id, score))| chunk(&id, score, &idx.to_string()))
                .collect()
        })
    }

    fn position(chunk: &RetrievalChunk) -> usize {
        chunk.content.parse().unwrap()
    }

    proptest! {
        #[test]
        fn prop_one_survivor_per_id(input in pool()) {
            let out = dedup_chunks(input.clone());

            let mut seen = HashSet::new();
            for c in &out {
                prop_assert!(seen.insert(c.id.clone()), "duplicate id {}", c.id);
            }
            let expected: HashSet<String> = input.iter().map(|c| c.id.clone()).collect();
            prop_assert_eq!(seen, expected);
        }

        #[test]
        fn prop_survivor_is_best_and_earliest(input in pool()) {
            let out = dedup_chunks(input.clone());

            for survivor in &out {
                let first_best = input
                    .iter()
                    .filter(|c| c.id == survivor.id)
                    .fold(None::<&RetrievalChunk>, |best, c| match best {
                        Some(b) if rank(b.similarity) >= rank(c.similarity) => Some(b),
                        _ => Some(c),
                    })
                    .unwrap();
                prop_assert_eq!(position(survivor), position(first_best));
            }
        }

        #[test]
        fn prop_output_keeps_input_order(input in pool()) {
            let positions: Vec<usize> = dedup_chunks(input).iter().map(position).collect();
            prop_assert!(positions.windows(2).all(|w| w[0] < w[1]));
        }

        #[test]
        fn prop_dedup_is_idempotent(input in pool()) {
            let once = dedup_chunks(input);
            let twice = dedup_chunks(once.clone());
            prop_assert_eq!(ids(&once), ids(&twice));
        }
    }
}
