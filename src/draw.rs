use anyhow::Result;
use opencv::{
    core::{Point, Scalar},
    imgproc,
    prelude::*,
};
use rand::Rng;

use crate::vision::Detection;

/// One colour per class, picked at random on start-up.
pub struct Palette {
    colors: Vec<Scalar>,
}

impl Palette {
    pub fn random(len: usize) -> Self {
        let mut rng = rand::thread_rng();
        Self::with_rng(len, &mut rng)
    }

    pub fn with_rng<R: Rng + ?Sized>(len: usize, rng: &mut R) -> Self {
        let colors = (0..len.max(1))
            .map(|_| {
                Scalar::new(
                    rng.gen_range(0.0..255.0),
                    rng.gen_range(0.0..255.0),
                    rng.gen_range(0.0..255.0),
                    0.0,
                )
            })
            .collect();
        Self { colors }
    }

    /// Class ids past the end of the table wrap around.
    pub fn color(&self, class_id: usize) -> Scalar {
        self.colors[class_id % self.colors.len()]
    }
}

pub fn caption(det: &Detection) -> String {
    format!("{}: {:.4}", det.label, det.confidence)
}

pub fn draw_detections(frame: &mut Mat, detections: &[Detection], palette: &Palette) -> Result<()> {
    for det in detections {
        let color = palette.color(det.class_id);

        imgproc::rectangle(frame, det.bbox, color, 2, imgproc::LINE_8, 0)?;

        imgproc::put_text(
            frame,
            &caption(det),
            Point::new(det.bbox.x, det.bbox.y - 5),
            imgproc::FONT_HERSHEY_SIMPLEX,
            0.5,
            color,
            2,
            imgproc::LINE_8,
            false,
        )?;
    }
    Ok(())
}
