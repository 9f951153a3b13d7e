//! Target Clusterer — spatial grouping of anomalous samples
//!
//! Builds connected components over the proximity graph: two anomalous
//! samples connect when their great-circle distance is within the
//! configured radius. Components with at least the minimum cluster size
//! become follow-up targets; smaller ones are isolated anomalies, dropped
//! silently.
//!
//! Neighbor search is near-linear: samples are bucketed into a lat/lon
//! grid whose cells are at least one radius wide, so each sample only
//! checks the 3×3 surrounding cells instead of every other sample.
//!
//! Determinism is contractual — field-ops manifests are regenerated from
//! these targets, so identical (samples, radius, min size) must reproduce
//! identical membership and identical cluster ids. Components are
//! insensitive to union order, and ids are assigned by ascending minimum
//! member sample id.

use crate::types::{AnomalousSample, Target};
use std::collections::HashMap;

/// Mean Earth radius (km), for haversine distance.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Kilometres per degree of latitude (and of longitude at the equator).
const KM_PER_DEG: f64 = 111.32;

/// Great-circle distance between two lon/lat points, in kilometres.
pub fn haversine_km(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

/// Union-find over sample indices, with path compression and union by rank.
struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    fn find(&mut self, i: usize) -> usize {
        let mut root = i;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        // Path compression
        let mut node = i;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }
}

/// Connected-component clusterer for one element's anomalous set.
pub struct TargetClusterer;

impl TargetClusterer {
    /// Group anomalous samples into follow-up targets.
    ///
    /// `radius_km` is the edge distance of the proximity graph;
    /// `min_cluster_size` is the smallest component emitted as a target.
    pub fn cluster(
        element: &str,
        samples: &[AnomalousSample],
        radius_km: f64,
        min_cluster_size: usize,
    ) -> Vec<Target> {
        if samples.is_empty() {
            return Vec::new();
        }

        let mut components = DisjointSet::new(samples.len());
        let grid = GridIndex::build(samples, radius_km);

        for (i, sample) in samples.iter().enumerate() {
            for j in grid.neighbor_candidates(sample) {
                // Each unordered pair is checked once
                if j <= i {
                    continue;
                }
                let other = &samples[j];
                let dist = haversine_km(
                    sample.longitude,
                    sample.latitude,
                    other.longitude,
                    other.latitude,
                );
                if dist <= radius_km {
                    components.union(i, j);
                }
            }
        }

        // Gather members per component root
        let mut member_indices: HashMap<usize, Vec<usize>> = HashMap::new();
        for i in 0..samples.len() {
            let root = components.find(i);
            member_indices.entry(root).or_default().push(i);
        }

        // Component order: ascending minimum member sample id
        let mut clusters: Vec<Vec<usize>> = member_indices
            .into_values()
            .filter(|members| members.len() >= min_cluster_size)
            .collect();
        clusters.sort_by(|a, b| min_id(samples, a).cmp(&min_id(samples, b)));

        clusters
            .into_iter()
            .enumerate()
            .map(|(cluster_id, members)| build_target(element, cluster_id as u32, samples, members))
            .collect()
    }
}

fn min_id<'a>(samples: &'a [AnomalousSample], members: &[usize]) -> &'a str {
    members
        .iter()
        .map(|&i| samples[i].id.as_str())
        .min()
        .unwrap_or("")
}

fn build_target(
    element: &str,
    cluster_id: u32,
    samples: &[AnomalousSample],
    members: Vec<usize>,
) -> Target {
    let n_points = members.len();
    let n = n_points as f64;

    let mut lon_sum = 0.0;
    let mut lat_sum = 0.0;
    let mut value_sum = 0.0;
    let mut max_value = f64::NEG_INFINITY;
    let mut member_ids: Vec<String> = Vec::with_capacity(n_points);

    for &i in &members {
        let s = &samples[i];
        lon_sum += s.longitude;
        lat_sum += s.latitude;
        value_sum += s.value;
        max_value = max_value.max(s.value);
        member_ids.push(s.id.clone());
    }
    member_ids.sort();

    Target {
        cluster_id,
        element: element.to_string(),
        member_ids,
        centroid_longitude: lon_sum / n,
        centroid_latitude: lat_sum / n,
        n_points,
        max_value,
        mean_value: value_sum / n,
    }
}

// ============================================================================
// Grid Index
// ============================================================================

/// Lat/lon bucketing keyed by the clustering radius.
///
/// Cell heights are one radius of latitude; cell widths are one radius of
/// longitude at the survey's most poleward sample, so any two samples
/// within one radius always fall in the same or adjacent cells.
struct GridIndex {
    cells: HashMap<(i64, i64), Vec<usize>>,
    lat_cell_deg: f64,
    lon_cell_deg: f64,
}

impl GridIndex {
    fn build(samples: &[AnomalousSample], radius_km: f64) -> Self {
        let max_abs_lat = samples
            .iter()
            .map(|s| s.latitude.abs())
            .fold(0.0_f64, f64::max)
            // Longitude degrees degenerate at the poles; clamping keeps the
            // cells finite and merely widens them near 90°
            .min(89.0);

        let lat_cell_deg = radius_km / KM_PER_DEG;
        let lon_cell_deg = radius_km / (KM_PER_DEG * max_abs_lat.to_radians().cos());

        let mut cells: HashMap<(i64, i64), Vec<usize>> = HashMap::new();
        for (i, sample) in samples.iter().enumerate() {
            let key = (
                (sample.latitude / lat_cell_deg).floor() as i64,
                (sample.longitude / lon_cell_deg).floor() as i64,
            );
            cells.entry(key).or_default().push(i);
        }

        Self {
            cells,
            lat_cell_deg,
            lon_cell_deg,
        }
    }

    /// All sample indices in the 3×3 cell neighborhood of a sample.
    fn neighbor_candidates(&self, sample: &AnomalousSample) -> impl Iterator<Item = usize> + '_ {
        let row = (sample.latitude / self.lat_cell_deg).floor() as i64;
        let col = (sample.longitude / self.lon_cell_deg).floor() as i64;

        (-1..=1).flat_map(move |dr| {
            (-1..=1).flat_map(move |dc| {
                self.cells
                    .get(&(row + dr, col + dc))
                    .into_iter()
                    .flatten()
                    .copied()
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(id: &str, lon: f64, lat: f64, value: f64) -> AnomalousSample {
        AnomalousSample {
            id: id.to_string(),
            longitude: lon,
            latitude: lat,
            value,
        }
    }

    /// Two points `km` apart east-west along latitude 45.
    fn pair_km_apart(km: f64) -> Vec<AnomalousSample> {
        let dlon = km / (KM_PER_DEG * 45.0_f64.to_radians().cos());
        vec![
            sample("S1", -66.0, 45.0, 10.0),
            sample("S2", -66.0 + dlon, 45.0, 20.0),
        ]
    }

    #[test]
    fn test_haversine_known_distance() {
        // One degree of longitude at the equator ≈ 111.2 km
        let d = haversine_km(0.0, 0.0, 1.0, 0.0);
        assert!((d - 111.19).abs() < 0.5, "got {d}");
        assert_eq!(haversine_km(-66.0, 45.0, -66.0, 45.0), 0.0);
    }

    #[test]
    fn test_pair_within_radius_forms_one_target() {
        let samples = pair_km_apart(50.0);
        let targets = TargetClusterer::cluster("As", &samples, 100.0, 1);
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].n_points, 2);
        assert_eq!(targets[0].member_ids, vec!["S1", "S2"]);
        assert_eq!(targets[0].max_value, 20.0);
        assert!((targets[0].mean_value - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_pair_beyond_radius_stays_singletons() {
        let samples = pair_km_apart(50.0);
        let targets = TargetClusterer::cluster("As", &samples, 10.0, 1);
        assert_eq!(targets.len(), 2);
        assert!(targets.iter().all(|t| t.n_points == 1));
    }

    #[test]
    fn test_min_cluster_size_drops_small_components() {
        let samples = pair_km_apart(50.0);
        // Singletons with m = 2: nothing survives, silently
        let targets = TargetClusterer::cluster("As", &samples, 10.0, 2);
        assert!(targets.is_empty());
        // The joined pair does survive m = 2
        let targets = TargetClusterer::cluster("As", &samples, 100.0, 2);
        assert_eq!(targets.len(), 1);
        assert!(targets.iter().all(|t| t.n_points >= 2));
    }

    #[test]
    fn test_transitive_chaining() {
        // A-B and B-C within radius, A-C beyond: still one component
        let dlon = 6.0 / (KM_PER_DEG * 45.0_f64.to_radians().cos());
        let samples = vec![
            sample("A", -66.0, 45.0, 1.0),
            sample("B", -66.0 + dlon, 45.0, 2.0),
            sample("C", -66.0 + 2.0 * dlon, 45.0, 3.0),
        ];
        let targets = TargetClusterer::cluster("As", &samples, 7.0, 1);
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].n_points, 3);
    }

    #[test]
    fn test_cluster_ids_follow_min_member_id() {
        // Two well-separated pairs; the component containing "A1" gets id 0
        // regardless of input order.
        let samples = vec![
            sample("B1", 10.0, 10.0, 1.0),
            sample("B2", 10.01, 10.0, 1.0),
            sample("A1", -60.0, 45.0, 1.0),
            sample("A2", -60.01, 45.0, 1.0),
        ];
        let targets = TargetClusterer::cluster("As", &samples, 5.0, 1);
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].cluster_id, 0);
        assert_eq!(targets[0].member_ids, vec!["A1", "A2"]);
        assert_eq!(targets[1].cluster_id, 1);
        assert_eq!(targets[1].member_ids, vec!["B1", "B2"]);
    }

    #[test]
    fn test_rerun_is_identical() {
        let samples: Vec<AnomalousSample> = (0..40)
            .map(|i| {
                sample(
                    &format!("S{i:02}"),
                    -66.0 + (i % 7) as f64 * 0.03,
                    45.0 + (i / 7) as f64 * 0.03,
                    i as f64,
                )
            })
            .collect();

        let first = TargetClusterer::cluster("As", &samples, 5.0, 2);
        let second = TargetClusterer::cluster("As", &samples, 5.0, 2);
        assert_eq!(first, second, "identical input must reproduce identical targets");
        assert!(!first.is_empty());
    }

    #[test]
    fn test_grid_matches_all_pairs() {
        // The grid index is an optimization only: membership must match a
        // brute-force all-pairs pass.
        let samples: Vec<AnomalousSample> = (0..60)
            .map(|i| {
                sample(
                    &format!("S{i:02}"),
                    -66.0 + ((i * 37) % 23) as f64 * 0.021,
                    45.0 + ((i * 53) % 19) as f64 * 0.017,
                    1.0,
                )
            })
            .collect();
        let radius = 3.0;

        let targets = TargetClusterer::cluster("As", &samples, radius, 1);

        let mut brute = DisjointSet::new(samples.len());
        for i in 0..samples.len() {
            for j in (i + 1)..samples.len() {
                let d = haversine_km(
                    samples[i].longitude,
                    samples[i].latitude,
                    samples[j].longitude,
                    samples[j].latitude,
                );
                if d <= radius {
                    brute.union(i, j);
                }
            }
        }
        let mut expected: HashMap<usize, usize> = HashMap::new();
        for i in 0..samples.len() {
            let root = brute.find(i);
            *expected.entry(root).or_default() += 1;
        }
        let mut expected_sizes: Vec<usize> = expected.into_values().collect();
        expected_sizes.sort_unstable();

        let mut got_sizes: Vec<usize> = targets.iter().map(|t| t.n_points).collect();
        got_sizes.sort_unstable();
        assert_eq!(got_sizes, expected_sizes);
    }

    #[test]
    fn test_empty_input() {
        assert!(TargetClusterer::cluster("As", &[], 7.5, 1).is_empty());
    }
}
