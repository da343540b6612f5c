//! Merging of releases reported by several sources.

use std::collections::HashMap;

use crate::indexer::{Protocol, ReleaseInfo};

/// Deduplicate releases by [`ReleaseInfo::dedup_key`].
///
/// The first occurrence keeps its position in the output. When a later
/// duplicate carries richer metadata (swarm counts first, then the number
/// of populated optional fields) it replaces the earlier instance in place.
pub fn deduplicate_releases(releases: Vec<ReleaseInfo>) -> Vec<ReleaseInfo> {
    let mut index: HashMap<(String, u64, Protocol), usize> = HashMap::new();
    let mut merged: Vec<ReleaseInfo> = Vec::with_capacity(releases.len());

    for release in releases {
        let key = release.dedup_key();
        match index.get(&key) {
            Some(&position) => {
                if richness(&release) > richness(&merged[position]) {
                    merged[position] = release;
                }
            }
            None => {
                index.insert(key, merged.len());
                merged.push(release);
            }
        }
    }

    merged
}

fn richness(release: &ReleaseInfo) -> (bool, usize) {
    (
        release.seeders.is_some() || release.peers.is_some(),
        release.completeness(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn release(title: &str, source: &str, size: u64) -> ReleaseInfo {
        let mut r = ReleaseInfo::new(
            title,
            format!("http://{}/{}", source, title),
            source,
            Protocol::Torrent,
        );
        r.size = size;
        r
    }

    #[test]
    fn test_distinct_releases_are_kept_in_order() {
        let out = deduplicate_releases(vec![
            release("Movie.A.2020.1080p", "s1", 100),
            release("Movie.B.2020.1080p", "s1", 100),
        ]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].title, "Movie.A.2020.1080p");
    }

    #[test]
    fn test_same_title_different_size_is_not_a_duplicate() {
        let out = deduplicate_releases(vec![
            release("Movie.A.2020.1080p", "s1", 100),
            release("Movie.A.2020.1080p", "s2", 200),
        ]);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_duplicate_with_seeders_replaces_bare_one() {
        let bare = release("Movie.A.2020.1080p", "s1", 100);
        let mut rich = release("movie a 2020 1080p", "s2", 100);
        rich.seeders = Some(12);

        let out = deduplicate_releases(vec![bare, rich]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].source_name, "s2");
        assert_eq!(out[0].seeders, Some(12));
    }

    #[test]
    fn test_first_wins_on_equal_metadata() {
        let out = deduplicate_releases(vec![
            release("Movie.A.2020.1080p", "s1", 100),
            release("Movie.A.2020.1080p", "s2", 100),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].source_name, "s1");
    }

    #[test]
    fn test_protocol_is_part_of_identity() {
        let torrent = release("Movie.A.2020.1080p", "s1", 100);
        let mut usenet = release("Movie.A.2020.1080p", "s2", 100);
        usenet.protocol = Protocol::Usenet;
        assert_eq!(deduplicate_releases(vec![torrent, usenet]).len(), 2);
    }
}
