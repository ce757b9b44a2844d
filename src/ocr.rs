//! OCR engine boundary.
//!
//! The pipeline only talks to [`TextRecognizer`]. [`TesseractEngine`] drives
//! the `tesseract` executable with an explicit [`TesseractConfig`], killing
//! calls that run longer than the configured timeout.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use image::DynamicImage;
use png::{BitDepth, ColorType, Encoder};
use thiserror::Error;

/// Errors reported by an OCR engine.
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("OCR language '{language}' is not installed (available: {available:?})")]
    LanguageMissing {
        language: String,
        available: Vec<String>,
    },
    #[error("failed to run {program}: {source}")]
    Spawn { program: PathBuf, source: io::Error },
    #[error("OCR engine timed out after {0:?}")]
    Timeout(Duration),
    #[error("OCR engine exited with {status}: {stderr}")]
    Failed { status: ExitStatus, stderr: String },
    #[error("failed to encode region image: {0}")]
    Encode(String),
    #[error("OCR I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("OCR processing failed: {0}")]
    Processing(String),
}

impl OcrError {
    /// Whether another attempt at the same region may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            OcrError::Timeout(_)
                | OcrError::Failed { .. }
                | OcrError::Io(_)
                | OcrError::Processing(_)
        )
    }
}

/// An engine that turns a region image into text.
pub trait TextRecognizer: Send + Sync {
    /// Language resources the engine has installed.
    fn available_languages(&self) -> Result<Vec<String>, OcrError>;

    /// Recognize the text in `image` using the `language` resource.
    fn recognize(&self, image: &DynamicImage, language: &str) -> Result<String, OcrError>;
}

/// Fail fast when `language` is not installed.
pub fn ensure_language<R>(recognizer: &R, language: &str) -> Result<(), OcrError>
where
    R: TextRecognizer + ?Sized,
{
    let available = recognizer.available_languages()?;
    tracing::debug!(?available, "installed OCR languages");
    if available.iter().any(|lang| lang == language) {
        Ok(())
    } else {
        Err(OcrError::LanguageMissing {
            language: language.to_owned(),
            available,
        })
    }
}

/// Run `recognize`, retrying transient failures up to `retries` more times.
pub fn recognize_with_retry<R>(
    recognizer: &R,
    image: &DynamicImage,
    language: &str,
    retries: u32,
) -> Result<String, OcrError>
where
    R: TextRecognizer + ?Sized,
{
    let mut attempt = 0;
    loop {
        match recognizer.recognize(image, language) {
            Ok(text) => return Ok(text),
            Err(err) if err.is_transient() && attempt < retries => {
                attempt += 1;
                tracing::warn!(attempt, error = %err, "OCR attempt failed, retrying");
            }
            Err(err) => return Err(err),
        }
    }
}

/// Settings for [`TesseractEngine`], fixed at construction time.
#[derive(Debug, Clone)]
pub struct TesseractConfig {
    pub executable: PathBuf,
    /// Passed as `--tessdata-dir` when set.
    pub tessdata_dir: Option<PathBuf>,
    /// Page segmentation mode (`--psm`).
    pub page_segmentation: Option<u8>,
    pub timeout: Duration,
}

impl Default for TesseractConfig {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("tesseract"),
            tessdata_dir: None,
            page_segmentation: None,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Tesseract command-line engine.
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    config: TesseractConfig,
}

impl TesseractEngine {
    pub fn new(config: TesseractConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TesseractConfig {
        &self.config
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.config.executable);
        if let Some(dir) = &self.config.tessdata_dir {
            cmd.arg("--tessdata-dir").arg(dir);
        }
        cmd
    }

    fn spawn_error(&self, source: io::Error) -> OcrError {
        OcrError::Spawn {
            program: self.config.executable.clone(),
            source,
        }
    }
}

impl TextRecognizer for TesseractEngine {
    fn available_languages(&self) -> Result<Vec<String>, OcrError> {
        let output = self
            .command()
            .arg("--list-langs")
            .output()
            .map_err(|e| self.spawn_error(e))?;
        if !output.status.success() {
            return Err(OcrError::Failed {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }
        // Older releases print the list on stderr.
        let mut listing = String::from_utf8_lossy(&output.stdout).into_owned();
        listing.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(parse_language_list(&listing))
    }

    fn recognize(&self, image: &DynamicImage, language: &str) -> Result<String, OcrError> {
        let workdir = tempfile::tempdir()?;
        let input_path = workdir.path().join("region.png");
        let output_base = workdir.path().join("region");
        let stderr_path = workdir.path().join("stderr.log");

        fs::write(&input_path, encode_region(image)?)?;

        let mut cmd = self.command();
        cmd.arg(&input_path).arg(&output_base).arg("-l").arg(language);
        if let Some(psm) = self.config.page_segmentation {
            cmd.arg("--psm").arg(psm.to_string());
        }
        let child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(fs::File::create(&stderr_path)?))
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        let status = wait_with_timeout(child, self.config.timeout)?;
        if !status.success() {
            let stderr = fs::read_to_string(&stderr_path).unwrap_or_default();
            return Err(OcrError::Failed {
                status,
                stderr: stderr.trim().to_owned(),
            });
        }

        let text = fs::read_to_string(output_base.with_extension("txt"))?;
        Ok(clean_output(&text))
    }
}

/// Wait for `child`, killing it once `timeout` has elapsed.
fn wait_with_timeout(mut child: Child, timeout: Duration) -> Result<ExitStatus, OcrError> {
    let started = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        if started.elapsed() > timeout {
            let _ = child.kill();
            let _ = child.wait();
            return Err(OcrError::Timeout(timeout));
        }
        std::thread::sleep(Duration::from_millis(25));
    }
}

/// Language codes from `tesseract --list-langs` output.
fn parse_language_list(listing: &str) -> Vec<String> {
    let mut languages: Vec<String> = listing
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("List of available languages"))
        .filter(|line| !line.contains(char::is_whitespace))
        .map(str::to_owned)
        .collect();
    languages.sort();
    languages.dedup();
    languages
}

/// Tesseract ends every page with a form feed, which `trim` also strips.
fn clean_output(text: &str) -> String {
    text.trim().to_owned()
}

fn encode_region(image: &DynamicImage) -> Result<Vec<u8>, OcrError> {
    let rgb = image.to_rgb8();
    encode_png(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb)
}

fn encode_png(data: &[u8], width: u32, height: u32, color: ColorType) -> Result<Vec<u8>, OcrError> {
    let mut buffer = Vec::new();
    let mut encoder = Encoder::new(&mut buffer, width, height);
    encoder.set_color(color);
    encoder.set_depth(BitDepth::Eight);
    let mut writer = encoder
        .write_header()
        .map_err(|e| OcrError::Encode(e.to_string()))?;
    writer
        .write_image_data(data)
        .map_err(|e| OcrError::Encode(e.to_string()))?;
    drop(writer);
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Flaky {
        failures: u32,
        calls: AtomicU32,
        transient: bool,
    }

    impl Flaky {
        fn new(failures: u32, transient: bool) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
                transient,
            }
        }
    }

    impl TextRecognizer for Flaky {
        fn available_languages(&self) -> Result<Vec<String>, OcrError> {
            Ok(vec!["eng".into(), "heb".into()])
        }

        fn recognize(&self, _image: &DynamicImage, _language: &str) -> Result<String, OcrError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                if self.transient {
                    Err(OcrError::Timeout(Duration::from_secs(1)))
                } else {
                    Err(OcrError::Encode("bad region".into()))
                }
            } else {
                Ok("שלום".into())
            }
        }
    }

    fn blank() -> DynamicImage {
        DynamicImage::new_rgb8(4, 4)
    }

    #[test]
    fn retries_transient_failures() {
        let engine = Flaky::new(1, true);
        assert_eq!(recognize_with_retry(&engine, &blank(), "heb", 1).unwrap(), "שלום");
        assert_eq!(engine.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn gives_up_after_retries() {
        let engine = Flaky::new(5, true);
        let err = recognize_with_retry(&engine, &blank(), "heb", 1).unwrap_err();
        assert!(matches!(err, OcrError::Timeout(_)));
        assert_eq!(engine.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn does_not_retry_permanent_failures() {
        let engine = Flaky::new(1, false);
        assert!(recognize_with_retry(&engine, &blank(), "heb", 3).is_err());
        assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn language_check() {
        let engine = Flaky::new(0, true);
        assert!(ensure_language(&engine, "heb").is_ok());
        match ensure_language(&engine, "yid") {
            Err(OcrError::LanguageMissing { language, available }) => {
                assert_eq!(language, "yid");
                assert_eq!(available, vec!["eng", "heb"]);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn parses_language_listing() {
        let listing =
            "List of available languages in \"/usr/share/tessdata/\" (3):\neng\nheb\nosd\n";
        assert_eq!(parse_language_list(listing), vec!["eng", "heb", "osd"]);
        assert!(parse_language_list("").is_empty());
    }

    #[test]
    fn strips_page_separator() {
        assert_eq!(clean_output("שורה\nשנייה\n\u{c}"), "שורה\nשנייה");
    }

    #[test]
    fn encodes_png_signature() {
        let png = encode_region(&blank()).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (4, 4));
    }

    #[cfg(unix)]
    fn write_script(dir: &std::path::Path, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    // Kept in one test so no other test forks while a script is being written.
    #[cfg(unix)]
    #[test]
    fn tesseract_subprocess() {
        let missing = TesseractEngine::new(TesseractConfig {
            executable: PathBuf::from("/nonexistent/tesseract"),
            ..TesseractConfig::default()
        });
        assert!(matches!(missing.available_languages(), Err(OcrError::Spawn { .. })));
        assert!(matches!(missing.recognize(&blank(), "heb"), Err(OcrError::Spawn { .. })));

        let dir = tempfile::tempdir().unwrap();

        // Arguments: <image> <output base> -l <lang>
        let fake = write_script(
            dir.path(),
            "fake-ocr",
            "#!/bin/sh\nprintf 'טקסט %s\\n\\f' \"$4\" > \"$2.txt\"\n",
        );
        let engine = TesseractEngine::new(TesseractConfig {
            executable: fake,
            ..TesseractConfig::default()
        });
        assert_eq!(engine.recognize(&blank(), "heb").unwrap(), "טקסט heb");

        let failing = write_script(dir.path(), "failing-ocr", "#!/bin/sh\necho boom >&2\nexit 3\n");
        let engine = TesseractEngine::new(TesseractConfig {
            executable: failing,
            ..TesseractConfig::default()
        });
        match engine.recognize(&blank(), "heb") {
            Err(OcrError::Failed { stderr, .. }) => assert_eq!(stderr, "boom"),
            other => panic!("unexpected result: {other:?}"),
        }

        let slow = write_script(dir.path(), "slow-ocr", "#!/bin/sh\nsleep 5\n");
        let engine = TesseractEngine::new(TesseractConfig {
            executable: slow,
            timeout: Duration::from_millis(200),
            ..TesseractConfig::default()
        });
        let started = Instant::now();
        assert!(matches!(engine.recognize(&blank(), "heb"), Err(OcrError::Timeout(_))));
        assert!(started.elapsed() < Duration::from_secs(4));
    }
}
