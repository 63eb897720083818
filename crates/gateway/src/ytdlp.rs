//! Video metadata via the `yt-dlp` binary's single-JSON dump.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use clipgate_domain::external::{
    ExtractionError, VideoExtractor, VideoFormat, VideoInfo, MAX_FORMATS,
};
use metrics::counter;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, warn};
use url::Url;

const FLAGS: [&str; 4] = ["-J", "--no-warnings", "--no-playlist", "--skip-download"];

pub struct YtDlpExtractor {
    program: String,
    timeout: Duration,
}

/// Subset of yt-dlp's info JSON. Everything is optional because extractors
/// differ in what they report.
#[derive(Debug, Deserialize)]
struct RawInfo {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    thumbnail: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    extractor_key: Option<String>,
    #[serde(default)]
    extractor: Option<String>,
    #[serde(default)]
    formats: Vec<RawFormat>,
}

#[derive(Debug, Deserialize)]
struct RawFormat {
    format_id: String,
    #[serde(default)]
    ext: Option<String>,
    #[serde(default)]
    resolution: Option<String>,
    #[serde(default)]
    vcodec: Option<String>,
}

impl YtDlpExtractor {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

#[async_trait]
impl VideoExtractor for YtDlpExtractor {
    async fn extract(&self, url: &str) -> Result<VideoInfo, ExtractionError> {
        let url = validate_url(url)?;
        let mut command = Command::new(&self.program);
        command
            .args(FLAGS)
            .arg(url.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => {
                counter!("extractions_total", "result" => "spawn_error").increment(1);
                warn!(program = %self.program, error = %err, "failed to run extractor");
                return Err(ExtractionError::Failure("extractor unavailable".into()));
            }
            Err(_) => {
                counter!("extractions_total", "result" => "timeout").increment(1);
                warn!(url = %url, "extractor timed out");
                return Err(ExtractionError::Timeout);
            }
        };

        if !output.status.success() {
            counter!("extractions_total", "result" => "failed").increment(1);
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(url = %url, status = %output.status, stderr = %stderr.trim(), "extractor failed");
            return Err(ExtractionError::Failure(format!(
                "extractor exited with {}",
                output.status
            )));
        }

        let info = parse_info(&output.stdout)?;
        counter!("extractions_total", "result" => "ok").increment(1);
        debug!(url = %url, formats = info.formats.len(), "extracted video info");
        Ok(info)
    }
}

/// Accepts absolute `http`/`https` URLs only.
pub fn validate_url(raw: &str) -> Result<Url, ExtractionError> {
    let trimmed = raw.trim();
    let url = Url::parse(trimmed).map_err(|_| ExtractionError::InvalidUrl(trimmed.to_string()))?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url),
        _ => Err(ExtractionError::InvalidUrl(trimmed.to_string())),
    }
}

fn parse_info(stdout: &[u8]) -> Result<VideoInfo, ExtractionError> {
    let raw: RawInfo = serde_json::from_slice(stdout)
        .map_err(|err| ExtractionError::Failure(format!("unreadable extractor output: {err}")))?;
    let platform = raw
        .extractor_key
        .or(raw.extractor)
        .map(|name| name.to_lowercase());
    let formats = raw
        .formats
        .into_iter()
        .filter(|format| format.vcodec.as_deref() != Some("none"))
        .take(MAX_FORMATS)
        .map(|format| VideoFormat {
            format_id: format.format_id,
            ext: format.ext,
            resolution: format.resolution,
        })
        .collect();
    Ok(VideoInfo {
        title: raw.title,
        thumbnail: raw.thumbnail,
        duration: raw.duration,
        platform,
        formats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "title": "Rust in 100 Seconds",
        "thumbnail": "https://i.ytimg.com/vi/abc/maxresdefault.jpg",
        "duration": 156.0,
        "extractor": "youtube",
        "extractor_key": "Youtube",
        "formats": [
            {"format_id": "139", "ext": "m4a", "resolution": "audio only", "vcodec": "none"},
            {"format_id": "160", "ext": "mp4", "resolution": "256x144", "vcodec": "avc1"},
            {"format_id": "133", "ext": "mp4", "resolution": "426x240", "vcodec": "avc1"},
            {"format_id": "134", "ext": "mp4", "resolution": "640x360", "vcodec": "avc1"},
            {"format_id": "135", "ext": "mp4", "resolution": "854x480", "vcodec": "avc1"},
            {"format_id": "136", "ext": "mp4", "resolution": "1280x720", "vcodec": "avc1"},
            {"format_id": "137", "ext": "mp4", "resolution": "1920x1080", "vcodec": "avc1"},
            {"format_id": "18", "ext": "mp4", "resolution": "640x360"}
        ]
    }"#;

    #[test]
    fn keeps_first_six_video_formats() {
        let info = parse_info(SAMPLE.as_bytes()).unwrap();
        assert_eq!(info.platform.as_deref(), Some("youtube"));
        assert_eq!(info.duration, Some(156.0));
        let ids: Vec<_> = info.formats.iter().map(|f| f.format_id.as_str()).collect();
        assert_eq!(ids, ["160", "133", "134", "135", "136", "137"]);
    }

    #[test]
    fn platform_falls_back_to_extractor_name() {
        let info = parse_info(br#"{"extractor": "Vimeo", "formats": []}"#).unwrap();
        assert_eq!(info.platform.as_deref(), Some("vimeo"));
        assert!(info.formats.is_empty());
        assert_eq!(info.title, None);
    }

    #[test]
    fn garbage_output_is_a_failure() {
        assert!(matches!(
            parse_info(b"ERROR: Unsupported URL"),
            Err(ExtractionError::Failure(_))
        ));
    }

    #[test]
    fn rejects_non_http_urls() {
        assert!(validate_url("https://youtu.be/abc").is_ok());
        assert!(validate_url(" http://vimeo.com/1 ").is_ok());
        for bad in ["", "not a url", "file:///etc/passwd", "ftp://host/video", "--exec=rm"] {
            assert!(
                matches!(validate_url(bad), Err(ExtractionError::InvalidUrl(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[cfg(unix)]
    mod stub {
        use std::os::unix::fs::PermissionsExt;
        use std::path::PathBuf;

        use super::*;

        fn write_stub(name: &str, body: &str) -> PathBuf {
            let path = std::env::temp_dir().join(format!(
                "clipgate-ytdlp-{name}-{}.sh",
                std::process::id()
            ));
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            let mut perms = std::fs::metadata(&path).unwrap().permissions();
            perms.set_mode(0o755);
            std::fs::set_permissions(&path, perms).unwrap();
            path
        }

        #[tokio::test]
        async fn runs_binary_and_parses_stdout() {
            let stub = write_stub(
                "ok",
                &format!("cat <<'JSON'\n{SAMPLE}\nJSON"),
            );
            let extractor = YtDlpExtractor::new(stub.to_string_lossy(), Duration::from_secs(5));
            let info = extractor
                .extract("https://www.youtube.com/watch?v=abc")
                .await
                .unwrap();
            assert_eq!(info.title.as_deref(), Some("Rust in 100 Seconds"));
            assert_eq!(info.formats.len(), MAX_FORMATS);
            std::fs::remove_file(stub).ok();
        }

        #[tokio::test]
        async fn non_zero_exit_is_a_failure() {
            let stub = write_stub("fail", "echo 'ERROR: private video' >&2\nexit 1");
            let extractor = YtDlpExtractor::new(stub.to_string_lossy(), Duration::from_secs(5));
            let err = extractor
                .extract("https://www.youtube.com/watch?v=abc")
                .await
                .unwrap_err();
            assert!(matches!(err, ExtractionError::Failure(_)));
            std::fs::remove_file(stub).ok();
        }

        #[tokio::test]
        async fn slow_binary_times_out() {
            let stub = write_stub("slow", "sleep 5");
            let extractor =
                YtDlpExtractor::new(stub.to_string_lossy(), Duration::from_millis(200));
            let err = extractor
                .extract("https://www.youtube.com/watch?v=abc")
                .await
                .unwrap_err();
            assert_eq!(err, ExtractionError::Timeout);
            std::fs::remove_file(stub).ok();
        }

        #[tokio::test]
        async fn missing_binary_is_a_failure() {
            let extractor =
                YtDlpExtractor::new("/nonexistent/clipgate-yt-dlp", Duration::from_secs(1));
            let err = extractor
                .extract("https://www.youtube.com/watch?v=abc")
                .await
                .unwrap_err();
            assert!(matches!(err, ExtractionError::Failure(_)));
        }
    }
}
