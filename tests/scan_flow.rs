//! End-to-end scan scenarios against loopback mock servers

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;

use camscout::{CancelToken, Detector, DeviceRegistry, ProtocolKind, RtspConfig, ScanConfig};

/// Scan config aimed at a single loopback host with the given ports and
/// multicast discovery disabled.
fn loopback_config(ports: Vec<u16>) -> ScanConfig {
    ScanConfig {
        subnet: "127.0.0.1/32".to_string(),
        port_timeout: 1,
        discovery_timeout: 1,
        max_concurrency: 8,
        ports,
        enable_onvif: false,
        enable_upnp: false,
        check_rtsp: false,
    }
}

fn loopback_rtsp_config() -> RtspConfig {
    RtspConfig {
        timeout: 1,
        use_ffmpeg: false,
        ffmpeg_path: String::new(),
        default_paths: vec!["/stream1".to_string()],
    }
}

/// RTSP camera mock: OPTIONS → 200, DESCRIBE → 200 + SDP
async fn rtsp_camera(sdp: &'static str) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                loop {
                    let mut buf = [0u8; 2048];
                    let Ok(n) = socket.read(&mut buf).await else {
                        return;
                    };
                    if n == 0 {
                        return;
                    }
                    let request = String::from_utf8_lossy(&buf[..n]).to_string();
                    let cseq = request
                        .lines()
                        .find_map(|l| l.strip_prefix("CSeq: "))
                        .unwrap_or("1");
                    let reply = if request.starts_with("DESCRIBE") {
                        format!(
                            "RTSP/1.0 200 OK\r\nCSeq: {cseq}\r\nContent-Type: application/sdp\r\nContent-Length: {}\r\n\r\n{sdp}",
                            sdp.len()
                        )
                    } else {
                        format!("RTSP/1.0 200 OK\r\nCSeq: {cseq}\r\nPublic: OPTIONS, DESCRIBE\r\n\r\n")
                    };
                    if socket.write_all(reply.as_bytes()).await.is_err() {
                        return;
                    }
                }
            });
        }
    });
    port
}

/// HLS origin mock serving one playlist path
async fn hls_origin() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 2048];
                let Ok(n) = socket.read(&mut buf).await else {
                    return;
                };
                let request = String::from_utf8_lossy(&buf[..n]).to_string();
                let body = "#EXTM3U\n#EXT-X-VERSION:3\n#EXTINF:6.0,\nseg0.ts\n";
                let reply = if request.starts_with("GET /stream.m3u8 ") {
                    format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: application/vnd.apple.mpegurl\r\nContent-Length: {}\r\n\r\n{body}",
                        body.len()
                    )
                } else {
                    "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n".to_string()
                };
                let _ = socket.write_all(reply.as_bytes()).await;
            });
        }
    });
    port
}

/// RTMP server mock completing the handshake with S0 = 3
async fn rtmp_server() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let mut c0c1 = vec![0u8; 1537];
                if socket.read_exact(&mut c0c1).await.is_err() {
                    return;
                }
                let mut reply = vec![3u8];
                reply.extend_from_slice(&c0c1[1..]);
                reply.extend_from_slice(&c0c1[1..]);
                if socket.write_all(&reply).await.is_err() {
                    return;
                }
                let mut c2 = vec![0u8; 1536];
                let _ = socket.read_exact(&mut c2).await;
            });
        }
    });
    port
}

#[tokio::test]
async fn rtsp_camera_yields_one_device_with_rtsp_protocol() {
    let port = rtsp_camera("v=0\r\nm=video 0 RTP/AVP 96\r\na=rtpmap:96 H264/90000\r\n").await;

    let detector = Detector::new(loopback_config(vec![port]), loopback_rtsp_config());
    let devices = detector.scan("127.0.0.1/32", CancelToken::new()).await.unwrap();

    assert_eq!(devices.len(), 1);
    let device = &devices[0];
    assert_eq!(device.ip, "127.0.0.1");

    let rtsp = device
        .protocols
        .iter()
        .find(|p| p.kind == ProtocolKind::Rtsp)
        .expect("RTSP protocol must be recorded");
    assert_eq!(rtsp.port, port);
    assert_eq!(rtsp.url, format!("rtsp://127.0.0.1:{port}"));
    assert!(rtsp.available);
}

#[tokio::test]
async fn hls_host_yields_hls_protocol_with_playlist_url() {
    let port = hls_origin().await;

    let detector = Detector::new(loopback_config(vec![port]), loopback_rtsp_config());
    let devices = detector.scan("127.0.0.1/32", CancelToken::new()).await.unwrap();

    assert_eq!(devices.len(), 1);
    let hls = devices[0]
        .protocols
        .iter()
        .find(|p| p.kind == ProtocolKind::Hls)
        .expect("HLS protocol must be recorded");
    assert_eq!(hls.url, format!("http://127.0.0.1:{port}/stream.m3u8"));
    assert!(hls.available);
}

#[tokio::test]
async fn rtmp_handshake_yields_rtmp_protocol() {
    let port = rtmp_server().await;

    let detector = Detector::new(loopback_config(vec![port]), loopback_rtsp_config());
    let devices = detector.scan("127.0.0.1/32", CancelToken::new()).await.unwrap();

    assert_eq!(devices.len(), 1);
    let rtmp = devices[0]
        .protocols
        .iter()
        .find(|p| p.kind == ProtocolKind::Rtmp)
        .expect("RTMP protocol must be recorded");
    assert_eq!(rtmp.url, format!("rtmp://127.0.0.1:{port}"));
}

#[tokio::test]
async fn host_without_open_ports_produces_no_device() {
    // Bind then drop to get a port that is almost certainly closed
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let detector = Detector::new(loopback_config(vec![port]), loopback_rtsp_config());
    let devices = detector.scan("127.0.0.1/32", CancelToken::new()).await.unwrap();
    assert!(devices.is_empty());
}

#[tokio::test]
async fn check_rtsp_enumerates_streams() {
    let sdp = "v=0\r\nm=video 0 RTP/AVP 96\r\na=rtpmap:96 H264/90000\r\na=framerate:25\r\na=x-dimensions:1920x1080\r\n";
    let port = rtsp_camera(sdp).await;

    let mut config = loopback_config(vec![port]);
    config.check_rtsp = true;

    let detector = Detector::new(config, loopback_rtsp_config());
    let devices = detector.scan("127.0.0.1/32", CancelToken::new()).await.unwrap();

    assert_eq!(devices.len(), 1);
    let streams = &devices[0].rtsp_streams;
    assert!(!streams.is_empty(), "stream discovery must find streams");
    assert!(streams.iter().all(|s| s.available));
    assert!(streams.iter().any(|s| s.codec == "H.264"));
    assert!(streams.iter().any(|s| s.resolution == "1920x1080"));

    // Dedup by URL string equality
    let mut urls: Vec<&str> = streams.iter().map(|s| s.url.as_str()).collect();
    let before = urls.len();
    urls.sort_unstable();
    urls.dedup();
    assert_eq!(urls.len(), before);
}

#[tokio::test]
async fn sweep_results_feed_the_registry() {
    let port = rtsp_camera("v=0\r\n").await;

    let detector = Detector::new(loopback_config(vec![port]), loopback_rtsp_config());
    let devices = detector.scan("127.0.0.1/32", CancelToken::new()).await.unwrap();

    let registry = DeviceRegistry::new(Duration::from_secs(30));
    for device in devices.clone() {
        registry.add_device(device).await;
    }
    registry.save_snapshot(devices).await;

    assert_eq!(registry.device_count().await, 1);
    assert_eq!(
        registry.devices_by_protocol(ProtocolKind::Rtsp).await.len(),
        1
    );
    assert!(registry.snapshot().await.is_some());
}

#[tokio::test]
async fn cancellation_returns_promptly_with_partial_results() {
    // A sweep over many unroutable-but-local addresses with slow timeouts
    let config = ScanConfig {
        subnet: "127.0.0.0/24".to_string(),
        port_timeout: 2,
        discovery_timeout: 5,
        max_concurrency: 2,
        ports: vec![9],
        enable_onvif: false,
        enable_upnp: false,
        check_rtsp: false,
    };
    let detector = Detector::new(config, loopback_rtsp_config());

    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let result = detector.scan("127.0.0.0/24", cancel).await;
    let elapsed = started.elapsed();

    assert!(result.is_ok(), "cancellation must never be a fatal error");
    // Bounded by roughly one port timeout plus scheduling slack
    assert!(
        elapsed < Duration::from_secs(4),
        "cancelled scan took {elapsed:?}"
    );
}

#[tokio::test]
async fn concurrency_stays_within_the_semaphore_bound() {
    // The semaphore is the observable bound: no more than `width` permits
    // may ever be out at once.
    let width = 4;
    let semaphore = Arc::new(Semaphore::new(width));
    let peak = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let active = Arc::new(std::sync::atomic::AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..32 {
        let semaphore = semaphore.clone();
        let peak = peak.clone();
        let active = active.clone();
        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.unwrap();
            let now = active.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
            peak.fetch_max(now, std::sync::atomic::Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            active.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert!(peak.load(std::sync::atomic::Ordering::SeqCst) <= width);
}
