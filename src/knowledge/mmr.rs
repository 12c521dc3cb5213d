pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Maximal marginal relevance selection.
///
/// Picks up to `k` indices from `candidates`, each step maximising
/// `lambda * sim(query, d) - (1 - lambda) * max sim(d, selected)`. Returns indices into
/// `candidates` in selection order.
pub fn maximal_marginal_relevance(
    query: &[f32],
    candidates: &[&[f32]],
    k: usize,
    lambda: f32,
) -> Vec<usize> {
    let relevance: Vec<f32> = candidates
        .iter()
        .map(|candidate| cosine_similarity(query, candidate))
        .collect();

    let mut selected: Vec<usize> = Vec::with_capacity(k.min(candidates.len()));

    while selected.len() < k.min(candidates.len()) {
        let mut best: Option<(usize, f32)> = None;

        for (idx, candidate) in candidates.iter().enumerate() {
            if selected.contains(&idx) {
                continue;
            }

            let redundancy = selected
                .iter()
                .map(|&s| cosine_similarity(candidate, candidates[s]))
                .fold(f32::MIN, f32::max);
            let redundancy = if selected.is_empty() { 0.0 } else { redundancy };

            let score = lambda * relevance[idx] - (1.0 - lambda) * redundancy;
            if best.map_or(true, |(_, best_score)| score > best_score) {
                best = Some((idx, score));
            }
        }

        match best {
            Some((idx, _)) => selected.push(idx),
            None => break,
        }
    }

    selected
}
