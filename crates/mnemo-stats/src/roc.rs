//! Area under the receiver operating characteristic curve.
//!
//! The AUC is computed from the Mann-Whitney U statistic: the probability that a
//! randomly chosen positive sample scores higher than a randomly chosen negative
//! sample, counting ties as one half. Tied scores receive their average rank,
//! which makes the result identical to integrating the empirical ROC curve with
//! the trapezoidal rule.

/// ROC AUC for binary `labels` (`1` positive, anything else negative) and `scores`.
///
/// Returns `None` when only one class is present (the curve is undefined), when
/// the slices differ in length, or when any score is `NaN`.
///
/// # Examples
///
/// ```
/// use mnemo_stats::roc::roc_auc;
///
/// assert_eq!(roc_auc(&[0, 1], &[0.2, 0.9]), Some(1.0));
/// assert_eq!(roc_auc(&[0, 1], &[0.9, 0.2]), Some(0.0));
/// assert_eq!(roc_auc(&[1, 1], &[0.2, 0.9]), None);
/// ```
#[expect(clippy::cast_precision_loss)]
#[must_use]
pub fn roc_auc(labels: &[u8], scores: &[f64]) -> Option<f64> {
    if labels.len() != scores.len() || scores.iter().any(|s| s.is_nan()) {
        return None;
    }
    let n_pos = labels.iter().filter(|&&l| l == 1).count();
    let n_neg = labels.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return None;
    }

    let ranks = average_ranks(scores);
    let pos_rank_sum = labels
        .iter()
        .zip(&ranks)
        .filter(|&(&l, _)| l == 1)
        .map(|(_, r)| r)
        .sum::<f64>();
    let n_pos_f = n_pos as f64;
    let u = pos_rank_sum - n_pos_f * (n_pos_f + 1.0) / 2.0;
    Some(u / (n_pos_f * n_neg as f64))
}

/// 1-based ranks with ties resolved to their average rank.
#[expect(clippy::cast_precision_loss)]
fn average_ranks(scores: &[f64]) -> Vec<f64> {
    let mut order = (0..scores.len()).collect::<Vec<_>>();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut ranks = vec![0.0; scores.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && scores[order[end]].total_cmp(&scores[order[start]]).is_eq() {
            end += 1;
        }
        // positions start..end share ranks start+1..=end
        let rank = (start + 1 + end) as f64 / 2.0;
        for &idx in &order[start..end] {
            ranks[idx] = rank;
        }
        start = end;
    }
    ranks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ties_count_half() {
        assert_eq!(roc_auc(&[0, 1], &[0.5, 0.5]), Some(0.5));
        assert_eq!(roc_auc(&[0, 0, 1, 1], &[0.5, 0.5, 0.5, 0.5]), Some(0.5));
    }

    #[test]
    fn test_matches_pairwise_count() {
        let labels = [1, 0, 1, 0, 1, 0, 0];
        let scores = [0.9, 0.3, 0.4, 0.4, 0.2, 0.8, 0.1];
        let mut wins = 0.0;
        let mut pairs = 0.0;
        for (i, &li) in labels.iter().enumerate() {
            for (j, &lj) in labels.iter().enumerate() {
                if li == 1 && lj == 0 {
                    pairs += 1.0;
                    if scores[i] > scores[j] {
                        wins += 1.0;
                    } else if scores[i] == scores[j] {
                        wins += 0.5;
                    }
                }
            }
        }
        let auc = roc_auc(&labels, &scores).unwrap();
        assert!((auc - wins / pairs).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_nan_and_length_mismatch() {
        assert_eq!(roc_auc(&[0, 1], &[f64::NAN, 0.1]), None);
        assert_eq!(roc_auc(&[0, 1, 1], &[0.1, 0.2]), None);
    }
}
