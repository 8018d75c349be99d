use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread;

use base64::{Engine, engine::general_purpose::STANDARD};
use bzip2::Compression;
use bzip2::write::BzEncoder;
use framesink_ingest::{Delivery, IngestConfig, IngestOutcome, IngestService};
use framesink_protocol::messages::{NotifyPullRequest, ReceiveChunkRequest};
use framesink_protocol::{FileMetadata, TransferKind};
use framesink_transfer::{ChecksumAlgorithm, checksum_bytes};
use tempfile::TempDir;

type Seen = Arc<Mutex<Vec<Delivery>>>;

fn service(config: IngestConfig) -> (Arc<IngestService>, Seen) {
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let notifier = Arc::new(move |d: &Delivery| sink.lock().unwrap().push(d.clone()));
    (Arc::new(IngestService::new(config, notifier)), seen)
}

fn frame_bytes() -> Vec<u8> {
    (0..768u32).map(|i| (i * 7 % 251) as u8).collect()
}

fn frame_chunks(data: &[u8], metadata: &FileMetadata) -> Vec<ReceiveChunkRequest> {
    [(0usize, 512usize, 1u32), (512, 768, 2)]
        .into_iter()
        .map(|(start, end, seq)| {
            let mut req =
                ReceiveChunkRequest::from_bytes("img0001.fits", &data[start..end], start as u64, seq, 2);
            req.file_type = "fits".into();
            req.metadata = metadata.clone();
            req
        })
        .collect()
}

fn verifying_config(dir: &TempDir) -> IngestConfig {
    let mut cfg = IngestConfig::new(dir.path());
    cfg.verify_checksum = true;
    cfg
}

#[test]
fn two_chunk_frame_in_either_order() {
    let data = frame_bytes();
    let metadata = FileMetadata {
        size: Some(768),
        checksum: Some(checksum_bytes(&data, ChecksumAlgorithm::Md5)),
    };

    for reverse in [false, true] {
        let dir = TempDir::new().unwrap();
        let (svc, seen) = service(verifying_config(&dir));

        let mut chunks = frame_chunks(&data, &metadata);
        if reverse {
            chunks.reverse();
        }
        let first = svc.receive_chunk(chunks.remove(0)).unwrap();
        assert_eq!(first, IngestOutcome::Pending { remaining: 1 });
        let last = svc.receive_chunk(chunks.remove(0)).unwrap();

        let path = dir.path().join("img0001.fits");
        assert_eq!(last, IngestOutcome::Completed(path.clone()));
        assert_eq!(std::fs::read(&path).unwrap(), data);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].path, path);
        assert_eq!(seen[0].file_type, "fits");
        assert_eq!(seen[0].kind, TransferKind::Push);
    }
}

#[test]
fn every_permutation_reassembles() {
    let data: Vec<u8> = (0..400u32).map(|i| (i % 256) as u8).collect();
    let pieces: Vec<(u64, &[u8])> = data
        .chunks(100)
        .enumerate()
        .map(|(i, c)| (i as u64 * 100, c))
        .collect();

    let orders: [[usize; 4]; 6] = [
        [0, 1, 2, 3],
        [3, 2, 1, 0],
        [1, 3, 0, 2],
        [2, 0, 3, 1],
        [3, 0, 1, 2],
        [1, 2, 3, 0],
    ];
    for order in orders {
        let dir = TempDir::new().unwrap();
        let (svc, seen) = service(IngestConfig::new(dir.path()));
        for (n, idx) in order.iter().enumerate() {
            let (offset, bytes) = pieces[*idx];
            svc.receive_chunk(ReceiveChunkRequest::from_bytes(
                "frame.fits",
                bytes,
                offset,
                n as u32 + 1,
                4,
            ))
            .unwrap();
        }
        assert_eq!(std::fs::read(dir.path().join("frame.fits")).unwrap(), data);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }
}

#[test]
fn compressed_chunks() {
    let dir = TempDir::new().unwrap();
    let (svc, seen) = service(IngestConfig::new(dir.path()));
    let data = vec![b'A'; 50_000];

    let mut enc = BzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(&data).unwrap();
    let mut req = ReceiveChunkRequest::from_bytes("flat.fits", &[], 0, 1, 1);
    req.buffer = STANDARD.encode(enc.finish().unwrap());
    req.compressed = true;
    req.metadata.size = Some(50_000);

    svc.receive_chunk(req).unwrap();
    assert_eq!(std::fs::read(dir.path().join("flat.fits")).unwrap(), data);
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[test]
fn concurrent_chunks_from_many_threads() {
    let dir = TempDir::new().unwrap();
    let (svc, seen) = service(verifying_config(&dir));
    let count = 32u32;
    let data: Vec<u8> = (0..count * 1000).map(|i| (i % 253) as u8).collect();
    let data = Arc::new(data);
    let checksum = checksum_bytes(&data, ChecksumAlgorithm::Md5);

    let handles: Vec<_> = (0..count)
        .map(|i| {
            let svc = Arc::clone(&svc);
            let data = Arc::clone(&data);
            let checksum = checksum.clone();
            thread::spawn(move || {
                let start = (i * 1000) as usize;
                let mut req = ReceiveChunkRequest::from_bytes(
                    "burst.fits",
                    &data[start..start + 1000],
                    start as u64,
                    i + 1,
                    count,
                );
                req.metadata = FileMetadata {
                    size: Some(u64::from(count) * 1000),
                    checksum: Some(checksum),
                };
                svc.receive_chunk(req).unwrap()
            })
        })
        .collect();

    let completed = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|o| matches!(o, IngestOutcome::Completed(_)))
        .count();

    assert_eq!(completed, 1);
    assert_eq!(seen.lock().unwrap().len(), 1);
    assert_eq!(
        std::fs::read(dir.path().join("burst.fits")).unwrap(),
        *data
    );
    assert!(svc.active_sessions().is_empty());
}

#[test]
fn existing_file_is_preserved() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("img0001.fits");
    std::fs::write(&path, b"earlier exposure").unwrap();
    let (svc, _) = service(IngestConfig::new(dir.path()));

    svc.receive_chunk(ReceiveChunkRequest::from_bytes("img0001.fits", b"new", 0, 1, 1))
        .unwrap();

    assert_eq!(std::fs::read(&path).unwrap(), b"new");
    let others: Vec<PathBuf> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p != &path)
        .collect();
    assert_eq!(others.len(), 1);
    assert_eq!(std::fs::read(&others[0]).unwrap(), b"earlier exposure");
}

#[cfg(unix)]
#[test]
fn pull_by_copy_with_mount_remap() {
    let remote = TempDir::new().unwrap();
    let mount = TempDir::new().unwrap();
    let data_dir = TempDir::new().unwrap();
    std::fs::write(mount.path().join("img0002.fits"), b"pulled frame").unwrap();

    let mut cfg = verifying_config(&data_dir);
    cfg.pull.method = "copy".into();
    cfg.pull.mount_remap = Some(framesink_fetch::MountRemap {
        remote_prefix: remote.path().to_path_buf(),
        local_prefix: mount.path().to_path_buf(),
    });
    let (svc, seen) = service(cfg);

    let outcome = svc
        .notify_pull(NotifyPullRequest {
            remote_path: remote.path().join("img0002.fits").to_string_lossy().into_owned(),
            file_type: "fits".into(),
            metadata: FileMetadata {
                size: Some(12),
                checksum: None,
            },
            group: None,
        })
        .unwrap();

    let dest = data_dir.path().join("img0002.fits");
    assert_eq!(outcome, IngestOutcome::Completed(dest.clone()));
    assert_eq!(std::fs::read(&dest).unwrap(), b"pulled frame");

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].kind, TransferKind::Pull);
    assert_eq!(
        seen[0].metadata.checksum,
        Some(checksum_bytes(b"pulled frame", ChecksumAlgorithm::Md5))
    );
    assert!(svc.active_sessions().is_empty());
}

#[cfg(unix)]
#[test]
fn failed_pull_releases_session() {
    let data_dir = TempDir::new().unwrap();
    let mut cfg = IngestConfig::new(data_dir.path());
    cfg.pull.method = "copy".into();
    let (svc, seen) = service(cfg);

    let req = NotifyPullRequest {
        remote_path: "/nonexistent/img0003.fits".into(),
        file_type: "fits".into(),
        metadata: FileMetadata::default(),
        group: None,
    };
    let err = svc.notify_pull(req.clone()).unwrap_err();
    assert_eq!(err.code(), 502);
    assert!(svc.active_sessions().is_empty());
    assert!(seen.lock().unwrap().is_empty());

    let err = svc.notify_pull(req).unwrap_err();
    assert_eq!(err.code(), 502);
}

#[test]
fn unsupported_pull_method() {
    let data_dir = TempDir::new().unwrap();
    let mut cfg = IngestConfig::new(data_dir.path());
    cfg.pull.method = "carrier-pigeon".into();
    let (svc, _) = service(cfg);

    let err = svc
        .notify_pull(NotifyPullRequest {
            remote_path: "/remote/img0004.fits".into(),
            file_type: "fits".into(),
            metadata: FileMetadata::default(),
            group: None,
        })
        .unwrap_err();
    assert_eq!(err.code(), 501);
}

#[test]
fn pull_preserves_existing_destination() {
    let remote = TempDir::new().unwrap();
    let data_dir = TempDir::new().unwrap();
    let src = remote.path().join("img0004.fits");
    std::fs::write(&src, b"second readout").unwrap();
    let dest = data_dir.path().join("img0004.fits");
    std::fs::write(&dest, b"first readout").unwrap();

    let mut cfg = IngestConfig::new(data_dir.path());
    cfg.pull.method = "copy".into();
    let (svc, seen) = service(cfg);

    svc.notify_pull(NotifyPullRequest {
        remote_path: src.to_string_lossy().into_owned(),
        file_type: "fits".into(),
        metadata: FileMetadata::default(),
        group: None,
    })
    .unwrap();

    assert_eq!(std::fs::read(&dest).unwrap(), b"second readout");
    let others: Vec<PathBuf> = std::fs::read_dir(data_dir.path())
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p != &dest)
        .collect();
    assert_eq!(others.len(), 1);
    let renamed = others[0].file_name().unwrap().to_string_lossy().into_owned();
    assert!(renamed.starts_with("img0004.fits."), "unexpected name {renamed}");
    assert_eq!(std::fs::read(&others[0]).unwrap(), b"first readout");
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[cfg(unix)]
#[test]
fn failed_staged_pull_hides_password() {
    let data_dir = TempDir::new().unwrap();
    let mut cfg = IngestConfig::new(data_dir.path());
    cfg.pull.method = "ftp".into();
    cfg.pull.username = Some("obs".into());
    cfg.pull.password = Some("s3cr3t-pass".into());
    cfg.pull.tools.lftp = "false".into();
    let (svc, _) = service(cfg);

    let err = svc
        .notify_pull(NotifyPullRequest {
            remote_path: "/remote/img0005.fits".into(),
            file_type: "fits".into(),
            metadata: FileMetadata::default(),
            group: None,
        })
        .unwrap_err();

    assert_eq!(err.code(), 502);
    let text = err.to_string();
    assert!(!text.contains("s3cr3t-pass"), "password leaked: {text}");
    assert!(text.contains("obs,***"));
}
