//! Peer artifact retrieval
//!
//! The external tool writes a config file and a QR code for every peer under
//! `<config_root>/peer_<id>/`; the bot only ever reads them.

use std::path::{Path, PathBuf};
use wgaccess_common::{Error, Result};

/// Filesystem locations of the artifacts generated for one peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerArtifacts {
    pub conf: PathBuf,
    pub qr: PathBuf,
}

/// Resolve artifact paths for a peer and verify both files exist
pub fn locate(config_root: &Path, peer_id: &str) -> Result<PeerArtifacts> {
    let dir = config_root.join(format!("peer_{peer_id}"));
    let conf = dir.join(format!("peer_{peer_id}.conf"));
    let qr = dir.join(format!("peer_{peer_id}.png"));
    for path in [&conf, &qr] {
        if !path.is_file() {
            return Err(Error::ArtifactMissing(path.clone()));
        }
    }
    Ok(PeerArtifacts { conf, qr })
}
