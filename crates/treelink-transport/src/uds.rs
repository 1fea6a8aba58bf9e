use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::os::unix::net::UnixDatagram;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::{FrameSink, FrameSource, LinkConfig};

/// Unix datagram socket link.
///
/// Each datagram carries exactly one frame, so the socket preserves the
/// frame boundaries the instrument protocol depends on. A bound link answers
/// whichever peer sent to it last; a connected link always talks to the path
/// it connected to.
pub struct DatagramLink {
    socket: UnixDatagram,
    path: PathBuf,
    peer: Option<PathBuf>,
    config: LinkConfig,
    created_inode: Option<(u64, u64)>,
    /// Whether the path should be removed on drop (clones never clean up).
    cleanup_on_drop: bool,
}

impl DatagramLink {
    /// Default permission mode for created socket paths.
    pub const DEFAULT_SOCKET_MODE: u32 = 0o600;
    /// Maximum socket path length.
    /// Unix `sockaddr_un.sun_path` is typically 108 bytes on Linux, 104 on macOS.
    #[cfg(target_os = "linux")]
    const MAX_PATH_LEN: usize = 108;
    #[cfg(not(target_os = "linux"))]
    const MAX_PATH_LEN: usize = 104;

    /// Bind a datagram socket at `path` and wait for a peer to speak first.
    ///
    /// A stale socket file at `path` is removed first; any other kind of file
    /// is left alone and reported as a bind error.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        Self::bind_with_config(path, LinkConfig::default())
    }

    /// Bind with explicit link configuration.
    pub fn bind_with_config(path: impl AsRef<Path>, config: LinkConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let socket = bind_socket(&path, Self::DEFAULT_SOCKET_MODE)?;
        let created = std::fs::symlink_metadata(&path).map_err(|e| TransportError::Bind {
            path: path.clone(),
            source: e,
        })?;

        info!(?path, "listening on unix datagram socket");

        let link = Self {
            socket,
            path,
            peer: None,
            config,
            created_inode: Some((created.dev(), created.ino())),
            cleanup_on_drop: true,
        };
        link.apply_timeouts()?;
        Ok(link)
    }

    /// Bind a local socket at `local` and connect it to the socket at `remote`.
    pub fn connect(local: impl AsRef<Path>, remote: impl AsRef<Path>) -> Result<Self> {
        Self::connect_with_config(local, remote, LinkConfig::default())
    }

    /// Connect with explicit link configuration.
    pub fn connect_with_config(
        local: impl AsRef<Path>,
        remote: impl AsRef<Path>,
        config: LinkConfig,
    ) -> Result<Self> {
        let remote = remote.as_ref().to_path_buf();
        let mut link = Self::bind_with_config(local, config)?;
        link.socket
            .connect(&remote)
            .map_err(|e| TransportError::Connect {
                path: remote.clone(),
                source: e,
            })?;
        debug!(path = ?remote, "connected unix datagram socket");
        link.peer = Some(remote);
        Ok(link)
    }

    /// Clone the socket handle so reads and writes can live on separate threads.
    pub fn try_clone(&self) -> Result<Self> {
        Ok(Self {
            socket: self.socket.try_clone()?,
            path: self.path.clone(),
            peer: self.peer.clone(),
            config: self.config.clone(),
            created_inode: None,
            cleanup_on_drop: false,
        })
    }

    /// The path this socket is bound to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The path frames are sent to, once known.
    pub fn peer(&self) -> Option<&Path> {
        self.peer.as_deref()
    }

    /// Current link configuration.
    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    fn apply_timeouts(&self) -> Result<()> {
        self.socket.set_read_timeout(self.config.read_timeout)?;
        self.socket.set_write_timeout(self.config.write_timeout)?;
        Ok(())
    }
}

fn bind_socket(path: &Path, mode: u32) -> Result<UnixDatagram> {
    let path_bytes = path.as_os_str().len();
    if path_bytes >= DatagramLink::MAX_PATH_LEN {
        return Err(TransportError::PathTooLong {
            path: path.to_path_buf(),
            len: path_bytes,
            max: DatagramLink::MAX_PATH_LEN,
        });
    }

    if path.exists() {
        let metadata = std::fs::symlink_metadata(path).map_err(|e| TransportError::Bind {
            path: path.to_path_buf(),
            source: e,
        })?;
        if !metadata.file_type().is_socket() {
            return Err(TransportError::Bind {
                path: path.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    "existing path is not a unix socket",
                ),
            });
        }
        debug!(?path, "removing stale socket");
        std::fs::remove_file(path).map_err(|e| TransportError::Bind {
            path: path.to_path_buf(),
            source: e,
        })?;
    }

    let socket = UnixDatagram::bind(path).map_err(|e| TransportError::Bind {
        path: path.to_path_buf(),
        source: e,
    })?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).map_err(|e| {
        TransportError::Bind {
            path: path.to_path_buf(),
            source: e,
        }
    })?;
    Ok(socket)
}

impl FrameSink for DatagramLink {
    fn send_frame(&mut self, frame: &[u8]) -> Result<()> {
        if frame.len() > self.config.max_frame_size {
            return Err(TransportError::FrameTooLarge {
                size: frame.len(),
                max: self.config.max_frame_size,
            });
        }
        let peer = self.peer.as_ref().ok_or(TransportError::NoPeer)?;
        self.socket.send_to(frame, peer)?;
        Ok(())
    }
}

impl FrameSource for DatagramLink {
    fn recv_frame(&mut self) -> Result<Bytes> {
        // One spare byte so an oversized datagram is detected instead of truncated.
        let mut buf = vec![0u8; self.config.max_frame_size + 1];
        loop {
            let (read, addr) = match self.socket.recv_from(&mut buf) {
                Ok(received) => received,
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Io(err)),
            };
            if read > self.config.max_frame_size {
                return Err(TransportError::FrameTooLarge {
                    size: read,
                    max: self.config.max_frame_size,
                });
            }
            if let Some(from) = addr.as_pathname() {
                if self.peer.as_deref() != Some(from) {
                    debug!(peer = ?from, "datagram peer changed");
                    self.peer = Some(from.to_path_buf());
                }
            }
            return Ok(Bytes::copy_from_slice(&buf[..read]));
        }
    }
}

impl Drop for DatagramLink {
    fn drop(&mut self) {
        if !self.cleanup_on_drop {
            return;
        }
        if let Some((expected_dev, expected_ino)) = self.created_inode {
            if let Ok(metadata) = std::fs::symlink_metadata(&self.path) {
                if metadata.file_type().is_socket()
                    && metadata.dev() == expected_dev
                    && metadata.ino() == expected_ino
                {
                    debug!(path = ?self.path, "cleaning up socket file");
                    let _ = std::fs::remove_file(&self.path);
                } else {
                    debug!(
                        path = ?self.path,
                        "socket path identity changed; skipping cleanup"
                    );
                }
            }
        }
    }
}

impl std::fmt::Debug for DatagramLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatagramLink")
            .field("path", &self.path)
            .field("peer", &self.peer)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "treelink-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn connect_send_and_reply() {
        let dir = temp_dir("dgram");
        let device_path = dir.join("device.sock");
        let host_path = dir.join("host.sock");

        let mut device = DatagramLink::bind(&device_path).unwrap();
        let mut host = DatagramLink::connect(&host_path, &device_path).unwrap();

        host.send_frame(&[0x00, 0x02]).unwrap();
        let frame = device.recv_frame().unwrap();
        assert_eq!(frame.as_ref(), &[0x00, 0x02]);
        assert_eq!(device.peer(), Some(host_path.as_path()));

        device.send_frame(&[0x02, 0x00, 0x00]).unwrap();
        assert_eq!(host.recv_frame().unwrap().as_ref(), &[0x02, 0x00, 0x00]);

        drop(device);
        assert!(!device_path.exists(), "socket file should be cleaned up");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn unbound_peer_cannot_send() {
        let dir = temp_dir("nopeer");
        let mut device = DatagramLink::bind(dir.join("device.sock")).unwrap();
        assert!(matches!(
            device.send_frame(&[1]),
            Err(TransportError::NoPeer)
        ));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn oversized_frame_rejected_before_send() {
        let dir = temp_dir("oversize");
        let device_path = dir.join("device.sock");
        let _device = DatagramLink::bind(&device_path).unwrap();
        let mut host = DatagramLink::connect(dir.join("host.sock"), &device_path).unwrap();

        let err = host.send_frame(&[0u8; 32]).unwrap_err();
        assert!(matches!(err, TransportError::FrameTooLarge { size: 32, .. }));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn read_timeout_applies() {
        let dir = temp_dir("timeout");
        let config = LinkConfig {
            read_timeout: Some(Duration::from_millis(10)),
            ..LinkConfig::default()
        };
        let mut device = DatagramLink::bind_with_config(dir.join("device.sock"), config).unwrap();
        let err = device.recv_frame().unwrap_err();
        assert!(matches!(
            err,
            TransportError::Io(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut
        ));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn path_too_long() {
        let long_path = "/tmp/".to_string() + &"a".repeat(200) + ".sock";
        let result = DatagramLink::bind(&long_path);
        assert!(matches!(result, Err(TransportError::PathTooLong { .. })));
    }

    #[test]
    fn bind_rejects_existing_non_socket_file() {
        let dir = temp_dir("bind-file");
        let sock_path = dir.join("not-a-socket.sock");
        std::fs::write(&sock_path, b"regular-file").unwrap();

        let result = DatagramLink::bind(&sock_path);
        assert!(matches!(result, Err(TransportError::Bind { .. })));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn clone_does_not_remove_socket() {
        let dir = temp_dir("clone");
        let sock_path = dir.join("device.sock");
        let link = DatagramLink::bind(&sock_path).unwrap();
        let clone = link.try_clone().unwrap();
        drop(clone);
        assert!(sock_path.exists());
        drop(link);
        assert!(!sock_path.exists());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
