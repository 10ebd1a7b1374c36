use anyhow::{anyhow, bail, Context, Result};
use std::path::PathBuf;
use std::process::Command;

/// A photo camera that can take one shot at a time.
pub trait CameraBackend: Send + 'static {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Take one photo with the current settings.
    fn capture(&mut self) -> Result<()>;

    /// Set exposure compensation in EV (0.0 = metered exposure).
    fn set_exposure_compensation(&mut self, ev: f64) -> Result<()>;
}

impl<B: CameraBackend + ?Sized> CameraBackend for Box<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn capture(&mut self) -> Result<()> {
        (**self).capture()
    }

    fn set_exposure_compensation(&mut self, ev: f64) -> Result<()> {
        (**self).set_exposure_compensation(ev)
    }
}

/// Camera backends selectable from configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CameraKind {
    #[default]
    Gphoto2,
    LogOnly,
}

impl CameraKind {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "gphoto2" => Ok(Self::Gphoto2),
            "log" | "dry-run" => Ok(Self::LogOnly),
            other => Err(anyhow!(
                "unknown photo backend '{}' (expected gphoto2 or log)",
                other
            )),
        }
    }
}

// ----------------------------------------------------------------------------
// gphoto2 command-line backend
// ----------------------------------------------------------------------------

/// Drives a tethered camera through the `gphoto2` command-line tool.
///
/// Each shot is a separate `gphoto2` invocation, so the camera is only held
/// open while a command runs.
pub struct Gphoto2Camera {
    program: PathBuf,
    filename: Option<String>,
}

impl Gphoto2Camera {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            filename: None,
        }
    }

    /// Download pattern passed through as `--filename` (gphoto2 `%` escapes).
    pub fn with_filename(mut self, pattern: Option<String>) -> Self {
        self.filename = pattern;
        self
    }

    pub(crate) fn capture_args(&self) -> Vec<String> {
        let mut args = vec!["--capture-image-and-download".to_string()];
        if let Some(pattern) = &self.filename {
            args.push("--filename".to_string());
            args.push(pattern.clone());
        }
        args
    }

    pub(crate) fn exposure_args(ev: f64) -> Vec<String> {
        vec![
            "--set-config".to_string(),
            format!("exposurecompensation={}", (ev * 1000.0).round() as i64),
        ]
    }

    fn run(&self, args: &[String]) -> Result<()> {
        let output = Command::new(&self.program)
            .args(args)
            .output()
            .with_context(|| format!("spawn {}", self.program.display()))?;
        if !output.status.success() {
            bail!(
                "{} {} failed ({}): {}",
                self.program.display(),
                args.join(" "),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}

impl CameraBackend for Gphoto2Camera {
    fn name(&self) -> &'static str {
        "gphoto2"
    }

    fn capture(&mut self) -> Result<()> {
        self.run(&self.capture_args())
    }

    fn set_exposure_compensation(&mut self, ev: f64) -> Result<()> {
        self.run(&Self::exposure_args(ev))
    }
}

// ----------------------------------------------------------------------------
// Dry-run backend
// ----------------------------------------------------------------------------

/// Logs shots instead of taking them.
#[derive(Debug, Default)]
pub struct LogOnlyCamera {
    shots: u64,
    ev: f64,
}

impl LogOnlyCamera {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shots(&self) -> u64 {
        self.shots
    }
}

impl CameraBackend for LogOnlyCamera {
    fn name(&self) -> &'static str {
        "log"
    }

    fn capture(&mut self) -> Result<()> {
        self.shots += 1;
        log::info!("dry run: shot #{} at {:+.2} EV", self.shots, self.ev);
        Ok(())
    }

    fn set_exposure_compensation(&mut self, ev: f64) -> Result<()> {
        self.ev = ev;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_backend_names() {
        assert_eq!(CameraKind::parse("gphoto2").unwrap(), CameraKind::Gphoto2);
        assert_eq!(CameraKind::parse("LOG").unwrap(), CameraKind::LogOnly);
        assert!(CameraKind::parse("canon").is_err());
    }

    #[test]
    fn gphoto2_arguments() {
        let camera = Gphoto2Camera::new("gphoto2");
        assert_eq!(camera.capture_args(), vec!["--capture-image-and-download"]);

        let camera = camera.with_filename(Some("trap_%n.%C".to_string()));
        assert_eq!(
            camera.capture_args(),
            vec!["--capture-image-and-download", "--filename", "trap_%n.%C"]
        );

        assert_eq!(
            Gphoto2Camera::exposure_args(-0.7),
            vec!["--set-config", "exposurecompensation=-700"]
        );
        assert_eq!(
            Gphoto2Camera::exposure_args(0.0),
            vec!["--set-config", "exposurecompensation=0"]
        );
    }

    #[test]
    fn missing_gphoto2_binary_is_an_error() {
        let mut camera = Gphoto2Camera::new("/nonexistent/gphoto2-for-tests");
        assert!(camera.capture().is_err());
    }

    #[test]
    fn log_only_camera_counts_shots() -> Result<()> {
        let mut camera = LogOnlyCamera::new();
        camera.set_exposure_compensation(1.0)?;
        camera.capture()?;
        camera.capture()?;
        assert_eq!(camera.shots(), 2);
        Ok(())
    }
}
