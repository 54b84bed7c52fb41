use crate::models::{LatencyResult, ProfileCandidate, ProfileItem};
use std::collections::HashMap;

/// Rank profiles by measured latency, fastest first.
///
/// Inner-joins `profiles` with `latencies` on `index_id`, keeps only strictly
/// positive delays and sorts ascending. The sort is stable, so equal delays keep
/// the order of `profiles`. A profile with several recorded latencies appears once
/// per match.
pub fn rank_candidates(profiles: &[ProfileItem], latencies: &[LatencyResult]) -> Vec<ProfileCandidate> {
    let mut by_id: HashMap<&str, Vec<i64>> = HashMap::new();
    for result in latencies {
        by_id
            .entry(result.index_id.as_str())
            .or_default()
            .push(result.delay_ms);
    }

    let mut ranked: Vec<(i64, &ProfileItem)> = profiles
        .iter()
        .flat_map(|profile| {
            by_id
                .get(profile.index_id.as_str())
                .into_iter()
                .flatten()
                .filter(|delay| **delay > 0)
                .map(move |delay| (*delay, profile))
        })
        .collect();

    ranked.sort_by_key(|(delay, _)| *delay);

    ranked
        .into_iter()
        .map(|(delay, profile)| ProfileCandidate {
            index_id: profile.index_id.clone(),
            delay_ms: Some(delay),
        })
        .collect()
}

/// The lowest-latency profile with a valid test result, if any
pub fn select_best(profiles: &[ProfileItem], latencies: &[LatencyResult]) -> Option<ProfileCandidate> {
    rank_candidates(profiles, latencies).into_iter().next()
}
