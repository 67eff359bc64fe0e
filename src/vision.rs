use anyhow::{Context, Result};
use log::{debug, info};
use opencv::{
    core::{self, Rect, Scalar, Size, Vector},
    dnn::{self, Net, NetTrait, NetTraitConst},
    imgproc,
    prelude::*,
};
use std::path::Path;

use crate::config::{self, Args};

/// Represents a single detected object
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    pub bbox: Rect,
    pub class_id: usize,
}

/// A decoded output row that passed the confidence filter, before suppression.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub class_id: usize,
    pub confidence: f32,
    pub bbox: Rect,
}

pub struct Detector {
    net: Net,
    labels: Vec<String>,
    out_names: Vector<String>,
    input_size: i32,
    confidence: f32,
    threshold: f32,
}

impl Detector {
    /// Loads the network from its weights/config pair.
    pub fn new(args: &Args, labels: Vec<String>) -> Result<Self> {
        let mut net = load_net(&args.model, &args.cfg)?;
        net.set_preferable_backend(dnn::DNN_BACKEND_OPENCV)?;
        net.set_preferable_target(dnn::DNN_TARGET_CPU)?;

        let out_layers = net.get_unconnected_out_layers()?;
        let layer_names = net.get_layer_names()?;
        let mut out_names = Vector::<String>::new();

        for i in out_layers.iter() {
            let name = layer_names
                .get(i as usize - 1)
                .with_context(|| format!("output layer {} has no name", i))?;
            out_names.push(name.as_str());
        }
        debug!("output layers: {:?}", out_names.to_vec());

        Ok(Self {
            net,
            labels,
            out_names,
            input_size: args.input_size,
            confidence: args.confidence,
            threshold: args.threshold,
        })
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Runs one forward pass on `frame` and returns the suppressed detections.
    pub fn detect(&mut self, frame: &Mat) -> Result<Vec<Detection>> {
        let size = Size::new(self.input_size, self.input_size);
        let mut resized = Mat::default();
        imgproc::resize(frame, &mut resized, size, 0.0, 0.0, imgproc::INTER_LINEAR)?;

        let blob = dnn::blob_from_image(
            &resized,
            config::BLOB_SCALE,
            size,
            Scalar::all(config::BLOB_MEAN),
            false,
            false,
            core::CV_32F,
        )?;

        self.net.set_input(&blob, "", 1.0, Scalar::default())?;

        let mut outputs = Vector::<Mat>::new();
        self.net.forward(&mut outputs, &self.out_names)?;

        self.process_outputs(&outputs, frame.cols(), frame.rows())
    }

    fn process_outputs(
        &self,
        outputs: &Vector<Mat>,
        frame_w: i32,
        frame_h: i32,
    ) -> Result<Vec<Detection>> {
        let mut candidates = Vec::new();

        for output in outputs.iter() {
            for row in 0..output.rows() {
                let row_data = output.at_row::<f32>(row)?;
                if let Some(c) = decode_row(row_data, frame_w, frame_h, self.confidence) {
                    candidates.push(c);
                }
            }
        }

        let kept = suppress(&candidates, self.confidence, self.threshold)?;
        debug!("{} candidates, {} after suppression", candidates.len(), kept.len());

        Ok(kept
            .into_iter()
            .map(|c| Detection {
                label: label_for(&self.labels, c.class_id),
                confidence: c.confidence,
                bbox: c.bbox,
                class_id: c.class_id,
            })
            .collect())
    }
}

fn load_net(model: &Path, cfg: &Path) -> Result<Net> {
    info!("loading model...");
    let model_path = model.to_str().context("model path is not valid UTF-8")?;
    let cfg_path = cfg.to_str().context("config path is not valid UTF-8")?;
    dnn::read_net(model_path, cfg_path, "").with_context(|| {
        format!(
            "Failed to load network from {} and {}",
            model.display(),
            cfg.display()
        )
    })
}

/// Applies non-max suppression and returns the surviving candidates in the
/// order the library ranks them.
pub fn suppress(candidates: &[Candidate], confidence: f32, threshold: f32) -> Result<Vec<Candidate>> {
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let boxes: Vector<Rect> = candidates.iter().map(|c| c.bbox).collect();
    let confidences: Vector<f32> = candidates.iter().map(|c| c.confidence).collect();

    let mut indices = Vector::<i32>::new();
    dnn::nms_boxes(&boxes, &confidences, confidence, threshold, &mut indices, 1.0, 0)?;

    Ok(indices
        .iter()
        .filter_map(|i| candidates.get(i as usize).copied())
        .collect())
}

/// Decodes one YOLO output row: `[cx, cy, w, h, objectness, class scores...]`
/// with coordinates normalised to the frame.
pub fn decode_row(row: &[f32], frame_w: i32, frame_h: i32, threshold: f32) -> Option<Candidate> {
    if row.len() < 6 {
        return None;
    }

    let (class_id, confidence) = best_class(&row[5..])?;
    if confidence.is_nan() || confidence <= threshold {
        return None;
    }

    Some(Candidate {
        class_id,
        confidence,
        bbox: calculate_bbox(row, frame_w, frame_h),
    })
}

/// Returns the index and value of the highest score, skipping NaN. The first
/// index wins ties.
pub fn best_class(scores: &[f32]) -> Option<(usize, f32)> {
    scores
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, score)| !score.is_nan())
        .fold(None, |best, (i, score)| match best {
            Some((_, max)) if max >= score => best,
            _ => Some((i, score)),
        })
}

fn calculate_bbox(row: &[f32], frame_w: i32, frame_h: i32) -> Rect {
    let cx = (row[0] * frame_w as f32) as i32;
    let cy = (row[1] * frame_h as f32) as i32;
    let w = (row[2] * frame_w as f32) as i32;
    let h = (row[3] * frame_h as f32) as i32;
    Rect::new(
        (cx as f32 - w as f32 / 2.0) as i32,
        (cy as f32 - h as f32 / 2.0) as i32,
        w,
        h,
    )
}

pub fn label_for(labels: &[String], class_id: usize) -> String {
    match labels.get(class_id) {
        Some(label) => label.clone(),
        None => format!("class {}", class_id),
    }
}
