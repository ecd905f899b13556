use std::collections::BTreeSet;

use image::{Rgb, RgbImage};
use ndarray::{prelude::*, Zip};
use rayon::prelude::*;

use crate::classes::ClassTable;
use crate::errors::{LandCoverError, Result};

const UNMAPPED_COLOR: Rgb<u8> = Rgb([0, 0, 0]);

/// Per-pixel class indices, `[height, width]`.
///
/// Every value is below the channel count of the logits it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredictionMask {
    classes: Array2<u32>,
}

/// Colored mask plus the class indices that had no color assigned.
#[derive(Debug)]
pub struct ColorizedMask {
    pub image: RgbImage,
    pub unmapped: BTreeSet<u32>,
}

impl PredictionMask {
    /// Arg-max over the class axis of `[1, C, H, W]` scores. Ties go to the
    /// lowest class index.
    pub fn from_logits(logits: ArrayView4<f32>) -> Result<Self> {
        let (batch, channels, height, width) = logits.dim();
        if batch != 1 {
            return Err(LandCoverError::model(
                "arg-max",
                format!("expected a single image, got batch of {batch}"),
            ));
        }
        if channels == 0 {
            return Err(LandCoverError::model("arg-max", "model returned no classes"));
        }

        let scores = logits.index_axis_move(Axis(0), 0);
        let mut classes = Array2::<u32>::zeros((height, width));
        Zip::from(&mut classes)
            .and(scores.lanes(Axis(0)))
            .par_for_each(|class, lane| *class = argmax(lane));

        Ok(Self { classes })
    }

    #[cfg(test)]
    pub(crate) fn from_array(classes: Array2<u32>) -> Self {
        Self { classes }
    }

    /// `(width, height)`, the same order `image` uses.
    pub fn dimensions(&self) -> (u32, u32) {
        let (height, width) = self.classes.dim();
        (width as u32, height as u32)
    }

    #[cfg(test)]
    pub(crate) fn get(&self, x: u32, y: u32) -> Option<u32> {
        self.classes.get((y as usize, x as usize)).copied()
    }

    #[cfg(test)]
    pub(crate) fn as_array(&self) -> ArrayView2<u32> {
        self.classes.view()
    }

    pub fn unique_classes(&self) -> BTreeSet<u32> {
        self.classes.iter().copied().collect()
    }

    /// Paints each pixel with its class color. Classes missing from the
    /// table are painted black and returned in `unmapped`.
    pub fn colorize(&self, table: &ClassTable) -> ColorizedMask {
        let (width, height) = self.dimensions();
        let mut image = RgbImage::new(width, height);

        let classes = self.classes.as_standard_layout();
        let unmapped = image
            .par_chunks_exact_mut(3)
            .zip(classes.as_slice().unwrap_or_default().par_iter())
            .filter_map(|(pixel, &class)| {
                let (color, missing) = match table.color(class) {
                    Some(color) => (color, None),
                    None => (UNMAPPED_COLOR, Some(class)),
                };
                pixel.copy_from_slice(&color.0);
                missing
            })
            .collect::<BTreeSet<u32>>();

        ColorizedMask { image, unmapped }
    }
}

fn argmax(lane: ArrayView1<f32>) -> u32 {
    let mut best_index = 0;
    let mut best_score = f32::NEG_INFINITY;
    for (index, &score) in lane.iter().enumerate() {
        if score > best_score {
            best_score = score;
            best_index = index;
        }
    }
    best_index as u32
}
