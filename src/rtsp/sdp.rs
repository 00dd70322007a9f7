//! SDP (Session Description Protocol) decoding
//!
//! Extracts codec, resolution, frame rate and audio details from the body
//! of a DESCRIBE response. Parsing is line-oriented and forgiving: unknown
//! attributes are skipped, and partially described streams still produce a
//! usable [`StreamInfo`].

use crate::models::RtspStreamInfo;

/// Decoded media session
#[derive(Debug, Clone, Default)]
pub struct StreamInfo {
    pub url: String,
    pub codec: String,
    pub resolution: String,
    pub fps: f64,
    pub bitrate: u64,
    pub audio_codec: String,
    pub channels: u8,
    pub available: bool,
    pub video_tracks: Vec<VideoTrack>,
    pub audio_tracks: Vec<AudioTrack>,
}

#[derive(Debug, Clone, Default)]
pub struct VideoTrack {
    pub codec: String,
    pub resolution: String,
    pub fps: f64,
    pub bitrate: u64,
    pub profile: String,
    pub level: String,
}

#[derive(Debug, Clone, Default)]
pub struct AudioTrack {
    pub codec: String,
    pub channels: u8,
    pub sample_rate: u32,
    pub bitrate: u64,
}

impl StreamInfo {
    pub fn into_model(self) -> RtspStreamInfo {
        RtspStreamInfo {
            url: self.url,
            codec: self.codec,
            resolution: self.resolution,
            fps: self.fps,
            bitrate: self.bitrate,
            audio_codec: self.audio_codec,
            channels: self.channels,
            available: self.available,
            checked_at: Some(chrono::Utc::now()),
        }
    }
}

#[derive(Clone, Copy, PartialEq)]
enum MediaSection {
    None,
    Video,
    Audio,
}

/// Parse an SDP document. The first `m=video` section populates the primary
/// codec/resolution/fps/bitrate fields.
pub fn parse_sdp(sdp: &str) -> StreamInfo {
    let mut info = StreamInfo::default();
    let mut section = MediaSection::None;

    for raw in sdp.lines() {
        let line = raw.trim();
        if line.len() < 2 || line.as_bytes()[1] != b'=' {
            continue;
        }

        let value = &line[2..];
        match line.as_bytes()[0] {
            b'm' => {
                let kind = value.split_whitespace().next().unwrap_or("");
                section = match kind {
                    "video" => {
                        info.video_tracks.push(VideoTrack::default());
                        MediaSection::Video
                    }
                    "audio" => {
                        info.audio_tracks.push(AudioTrack::default());
                        MediaSection::Audio
                    }
                    _ => MediaSection::None,
                };
            }
            b'b' => {
                // b=AS:2048 (kbit/s)
                if let Some(kbps) = value.strip_prefix("AS:").and_then(|v| v.parse::<u64>().ok()) {
                    if section == MediaSection::Video {
                        if let Some(track) = info.video_tracks.last_mut() {
                            track.bitrate = kbps * 1000;
                        }
                    }
                }
            }
            b'a' => parse_attribute(value, section, &mut info),
            _ => {}
        }
    }

    if let Some(video) = info.video_tracks.first() {
        info.codec = video.codec.clone();
        info.resolution = video.resolution.clone();
        info.fps = video.fps;
        info.bitrate = video.bitrate;
    }
    if let Some(audio) = info.audio_tracks.first() {
        info.audio_codec = audio.codec.clone();
        info.channels = audio.channels;
    }

    info
}

fn parse_attribute(attr: &str, section: MediaSection, info: &mut StreamInfo) {
    if let Some(rest) = attr.strip_prefix("rtpmap:") {
        // rtpmap:96 H264/90000[/channels]
        let mut fields = rest.split_whitespace();
        let _payload_type = fields.next();
        if let Some(encoding) = fields.next() {
            let mut parts = encoding.split('/');
            let codec = parts.next().unwrap_or("");
            match section {
                MediaSection::Video => {
                    if let Some(track) = info.video_tracks.last_mut() {
                        track.codec = normalize_video_codec(codec);
                    }
                }
                MediaSection::Audio => {
                    if let Some(track) = info.audio_tracks.last_mut() {
                        track.codec = normalize_audio_codec(codec);
                        if let Some(rate) = parts.next().and_then(|r| r.parse().ok()) {
                            track.sample_rate = rate;
                        }
                        if let Some(channels) = parts.next().and_then(|c| c.parse().ok()) {
                            track.channels = channels;
                        }
                    }
                }
                MediaSection::None => {}
            }
        }
        return;
    }

    if let Some(rest) = attr.strip_prefix("fmtp:") {
        if section == MediaSection::Video {
            if let Some((_payload_type, params)) = rest.split_once(' ') {
                parse_fmtp_params(params, info);
            }
        }
        return;
    }

    if let Some(rest) = attr.strip_prefix("framerate:") {
        if section == MediaSection::Video {
            if let Ok(fps) = rest.trim().parse::<f64>() {
                if let Some(track) = info.video_tracks.last_mut() {
                    track.fps = fps;
                }
            }
        }
        return;
    }

    if let Some(rest) = attr.strip_prefix("x-dimensions:") {
        if section == MediaSection::Video {
            if let Some(resolution) = parse_dimensions(rest.trim()) {
                if let Some(track) = info.video_tracks.last_mut() {
                    track.resolution = resolution;
                }
            }
        }
        return;
    }

    // Vendor attributes sometimes smuggle the resolution as width=/height=
    if attr.contains("width=") && attr.contains("height=") {
        if section == MediaSection::Video {
            if let (Some(width), Some(height)) =
                (scan_number(attr, "width="), scan_number(attr, "height="))
            {
                if let Some(track) = info.video_tracks.last_mut() {
                    track.resolution = format!("{width}x{height}");
                }
            }
        }
    }
}

fn parse_fmtp_params(params: &str, info: &mut StreamInfo) {
    for pair in params.split(';') {
        let pair = pair.trim();
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();

        match key {
            "profile-level-id" if value.len() >= 6 => {
                if let Some(track) = info.video_tracks.last_mut() {
                    track.profile = value[0..2].to_string();
                    track.level = value[4..6].to_string();
                }
            }
            "sprop-parameter-sets" => {
                // H.264 SPS decode would recover the coded resolution; the
                // parameter sets stay opaque here and the resolution remains
                // unknown unless another attribute names it.
            }
            _ => {}
        }
    }
}

/// `x-dimensions` appears in the wild both as "1920,1080" and "1920x1080"
fn parse_dimensions(value: &str) -> Option<String> {
    let separator = if value.contains(',') { ',' } else { 'x' };
    let (width, height) = value.split_once(separator)?;
    let width: u32 = width.trim().parse().ok()?;
    let height: u32 = height.trim().parse().ok()?;
    Some(format!("{width}x{height}"))
}

fn scan_number(text: &str, key: &str) -> Option<u32> {
    let start = text.find(key)? + key.len();
    let digits: String = text[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

fn normalize_video_codec(codec: &str) -> String {
    let upper = codec.to_uppercase();
    if upper.contains("H264") || upper.contains("H.264") || upper == "AVC" {
        "H.264".to_string()
    } else if upper.contains("H265") || upper.contains("H.265") || upper == "HEVC" {
        "H.265".to_string()
    } else if upper.contains("JPEG") {
        "MJPEG".to_string()
    } else if upper.contains("MPEG4") || upper.contains("MPEG-4") {
        "MPEG-4".to_string()
    } else {
        upper
    }
}

fn normalize_audio_codec(codec: &str) -> String {
    let upper = codec.to_uppercase();
    if upper.contains("AAC") || upper.contains("MPEG4-GENERIC") {
        "AAC".to_string()
    } else if upper == "PCMU" || upper == "PCMA" {
        "G.711".to_string()
    } else if upper.contains("PCM") {
        "PCM".to_string()
    } else if upper.contains("G722") {
        "G.722".to_string()
    } else {
        upper
    }
}
