//! Download clients.

mod qbittorrent;
mod types;

pub use qbittorrent::QBittorrentClient;
pub use types::{
    ClientDownloadId, ClientState, ClientStatus, DownloadClient, DownloadClientError,
};
