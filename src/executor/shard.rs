//! Round-robin directory assignment
//!
//! Directory `k` belongs to worker `k % workers`. The same formula is used
//! at startup and when a dead worker is replaced, so a replacement always
//! receives exactly the shard its predecessor held.

/// Workers actually started: never more than there are directories
pub fn effective_workers(requested: usize, directories: usize) -> usize {
    requested.min(directories)
}

/// `ceil(directories / workers)`, the largest shard any worker receives
pub fn shard_size(directories: usize, workers: usize) -> usize {
    if workers == 0 {
        0
    } else {
        directories.div_ceil(workers)
    }
}

/// Worker owning directory `k`
pub fn owner_of(k: usize, workers: usize) -> usize {
    k % workers
}

/// Directories assigned to `worker`, in order
pub fn shard_for<S: AsRef<str>>(directories: &[S], worker: usize, workers: usize) -> Vec<&str> {
    if workers == 0 {
        return Vec::new();
    }
    directories
        .iter()
        .enumerate()
        .filter(|&(k, _)| owner_of(k, workers) == worker)
        .map(|(_, dir)| dir.as_ref())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dirs(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("/save/site{}", i)).collect()
    }

    #[test]
    fn test_round_robin() {
        let d = dirs(7);
        assert_eq!(shard_for(&d, 0, 3), vec!["/save/site0", "/save/site3", "/save/site6"]);
        assert_eq!(shard_for(&d, 1, 3), vec!["/save/site1", "/save/site4"]);
        assert_eq!(shard_for(&d, 2, 3), vec!["/save/site2", "/save/site5"]);
        assert_eq!(shard_size(7, 3), 3);
    }

    #[test]
    fn test_every_directory_owned_once() {
        for workers in 1..6 {
            let d = dirs(11);
            let mut seen = Vec::new();
            for w in 0..workers {
                for dir in shard_for(&d, w, workers) {
                    let k = d.iter().position(|x| x == dir).unwrap();
                    assert_eq!(owner_of(k, workers), w);
                    seen.push(k);
                }
                assert!(shard_for(&d, w, workers).len() <= shard_size(d.len(), workers));
            }
            seen.sort_unstable();
            assert_eq!(seen, (0..11).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_recomputed_shard_is_identical() {
        let d = dirs(9);
        assert_eq!(shard_for(&d, 1, 4), shard_for(&d, 1, 4));
    }

    #[test]
    fn test_effective_workers_clamped() {
        assert_eq!(effective_workers(5, 2), 2);
        assert_eq!(effective_workers(3, 10), 3);
        assert_eq!(effective_workers(3, 0), 0);
        assert_eq!(shard_size(0, 0), 0);
    }
}
