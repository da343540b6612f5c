//! Testing utilities and mock implementations.
//!
//! Mocks for every external collaborator, so the whole pipeline can run in
//! tests without a network, a download client or a library on disk.
//!
//! # Example
//!
//! ```rust,ignore
//! use mediarr_core::testing::{MockDownloadClient, MockImporter, MockTransport};
//!
//! let client = MockDownloadClient::new();
//! let importer = MockImporter::new();
//!
//! // Drive a submitted download to completion
//! client.complete(&id, "/downloads/movie").await;
//! ```

mod mock_download_client;
mod mock_importer;
mod mock_transport;

pub use mock_download_client::{MockDownloadClient, RecordedSubmission};
pub use mock_importer::{MockImporter, RecordedImport};
pub use mock_transport::{MockTransport, StaticSource};

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::decision::{AcceptanceProfile, Decision, DecisionScore, Target};
    use crate::indexer::{Protocol, ReleaseInfo};
    use crate::parser::Quality;

    /// A parsed release with a plausible size.
    pub fn release(title: &str, protocol: Protocol) -> ReleaseInfo {
        let mut release = ReleaseInfo::new(
            title,
            format!("https://source.test/download/{}", title),
            "mock-source",
            protocol,
        )
        .with_parsed();
        release.size = 4 * 1024 * 1024 * 1024; // 4 GB
        if protocol == Protocol::Torrent {
            release.seeders = Some(50);
            release.peers = Some(60);
        }
        release
    }

    /// A torrent release with a known info hash.
    pub fn torrent_release(title: &str, info_hash: &str) -> ReleaseInfo {
        let mut release = release(title, Protocol::Torrent);
        release.info_hash = Some(info_hash.to_string());
        release.download_url = format!("magnet:?xt=urn:btih:{}", info_hash);
        release
    }

    /// An accepted decision for `release` with a default score.
    pub fn accepted(release: ReleaseInfo) -> Decision {
        Decision::accepted(release, DecisionScore::default())
    }

    /// A profile accepting the common HD and UHD qualities.
    pub fn hd_profile(id: &str) -> AcceptanceProfile {
        AcceptanceProfile::new(
            id,
            vec![
                Quality::Hdtv720p,
                Quality::Webdl1080p,
                Quality::Bluray1080p,
                Quality::Remux2160p,
            ],
        )
    }

    /// A target with nothing on disk.
    pub fn target(id: &str, profile_id: &str) -> Target {
        Target::new(id, profile_id)
    }
}
