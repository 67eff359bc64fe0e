use anyhow::{ensure, Context, Result};
use clap::Parser;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const WINDOW_NAME: &str = "Frame";

// Blob normalisation
pub const BLOB_SCALE: f64 = 0.007843;
pub const BLOB_MEAN: f64 = 127.5;

/// Classes the bundled person/dog/cat/bird network was trained on.
pub const DEFAULT_LABELS: [&str; 4] = ["person", "dog", "cat", "bird"];

pub const QUIT_KEY: i32 = b'q' as i32;

/// Real-time object detection on a camera stream.
#[derive(Parser, Debug, Clone)]
#[command(name = "realtime-object-detection", version)]
pub struct Args {
    /// Path to the network configuration file
    #[arg(short = 'g', long = "cfg", value_name = "PATH")]
    pub cfg: PathBuf,

    /// Path to the pre-trained weights
    #[arg(short = 'm', long = "model", value_name = "PATH")]
    pub model: PathBuf,

    /// Minimum probability to filter weak detections
    #[arg(short = 'c', long, default_value_t = 0.2)]
    pub confidence: f32,

    /// Threshold when applying non-maxima suppression
    #[arg(short = 't', long, default_value_t = 0.3)]
    pub threshold: f32,

    /// Camera index, stream URL or video file
    #[arg(short = 's', long = "src", default_value = "0")]
    pub source: String,

    /// Class names, one per line
    #[arg(short = 'l', long, value_name = "PATH")]
    pub labels: Option<PathBuf>,

    /// Side of the square network input
    #[arg(long, default_value_t = 224)]
    pub input_size: i32,

    /// Seconds to let the camera sensor warm up
    #[arg(long, default_value_t = 0.0)]
    pub warmup: f64,
}

impl Args {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            (0.0..=1.0).contains(&self.confidence),
            "confidence must be within [0, 1], got {}",
            self.confidence
        );
        ensure!(
            (0.0..=1.0).contains(&self.threshold),
            "threshold must be within [0, 1], got {}",
            self.threshold
        );
        ensure!(
            self.input_size > 0,
            "input size must be positive, got {}",
            self.input_size
        );
        ensure!(
            self.warmup.is_finite() && self.warmup >= 0.0,
            "warmup must be a non-negative number of seconds"
        );
        Ok(())
    }

    pub fn warmup(&self) -> Duration {
        Duration::from_secs_f64(self.warmup)
    }

    /// Loads the label table, falling back to [`DEFAULT_LABELS`].
    pub fn labels(&self) -> Result<Vec<String>> {
        let labels = match &self.labels {
            Some(path) => load_labels(path)?,
            None => DEFAULT_LABELS.iter().map(|l| l.to_string()).collect(),
        };
        ensure!(!labels.is_empty(), "label table is empty");
        Ok(labels)
    }
}

fn load_labels(path: &Path) -> Result<Vec<String>> {
    let file =
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let reader = BufReader::new(file);
    let mut labels = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if !line.is_empty() {
            labels.push(line.to_string());
        }
    }
    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec!["realtime-object-detection", "-g", "net.cfg", "-m", "net.weights"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn defaults() {
        let args = parse(&[]);
        assert_eq!(args.cfg, PathBuf::from("net.cfg"));
        assert_eq!(args.model, PathBuf::from("net.weights"));
        assert_eq!(args.confidence, 0.2);
        assert_eq!(args.threshold, 0.3);
        assert_eq!(args.source, "0");
        assert_eq!(args.input_size, 224);
        assert!(args.labels.is_none());
        args.validate().unwrap();
    }

    #[test]
    fn model_files_are_required() {
        assert!(Args::try_parse_from(["realtime-object-detection", "-g", "net.cfg"]).is_err());
        assert!(Args::try_parse_from(["realtime-object-detection", "-m", "net.weights"]).is_err());
    }

    #[test]
    fn long_flags() {
        let args = parse(&["--confidence", "0.5", "--threshold", "0.45", "--src", "rtsp://cam/1"]);
        assert_eq!(args.confidence, 0.5);
        assert_eq!(args.threshold, 0.45);
        assert_eq!(args.source, "rtsp://cam/1");
    }

    #[test]
    fn rejects_out_of_range() {
        assert!(parse(&["-c", "1.5"]).validate().is_err());
        assert!(parse(&["--threshold=-0.1"]).validate().is_err());
        assert!(parse(&["--input-size", "0"]).validate().is_err());
        assert!(parse(&["--input-size=-224"]).validate().is_err());
        assert!(parse(&["--warmup=-1"]).validate().is_err());
        parse(&["--input-size", "416", "--warmup", "2"]).validate().unwrap();
    }

    #[test]
    fn accepts_any_positive_input_size() {
        parse(&["--input-size", "300"]).validate().unwrap();
        parse(&["--input-size", "1"]).validate().unwrap();
    }

    #[test]
    fn builtin_labels() {
        let labels = parse(&[]).labels().unwrap();
        assert_eq!(labels, vec!["person", "dog", "cat", "bird"]);
    }

    #[test]
    fn labels_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "person\n\n  bicycle \ncar").unwrap();
        let path = file.path().to_str().unwrap();

        let labels = parse(&["-l", path]).labels().unwrap();
        assert_eq!(labels, vec!["person", "bicycle", "car"]);
    }

    #[test]
    fn empty_labels_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap();
        assert!(parse(&["-l", path]).labels().is_err());
    }

    #[test]
    fn missing_labels_file() {
        assert!(parse(&["-l", "/nonexistent/classes.names"]).labels().is_err());
    }
}
