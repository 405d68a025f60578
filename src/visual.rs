use anyhow::{bail, Context, Result};
use image::{DynamicImage, GenericImageView, ImageFormat};
use serde::Serialize;
use std::io::Cursor;
use std::path::Path;

/// Composite reference bitmap, one grid cell per stage. Read-only after load.
#[derive(Debug, Clone)]
pub struct ReferenceImage {
    image: DynamicImage,
    cols: u32,
    rows: u32,
}

/// Pixel rectangle, `right`/`lower` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CropRect {
    pub left: u32,
    pub upper: u32,
    pub right: u32,
    pub lower: u32,
}

impl CropRect {
    pub fn width(&self) -> u32 {
        self.right - self.left
    }

    pub fn height(&self) -> u32 {
        self.lower - self.upper
    }
}

#[derive(Debug, Clone)]
pub struct ImageRegion {
    pub stage: usize,
    pub rect: CropRect,
    pub image: DynamicImage,
}

impl ImageRegion {
    pub fn to_png(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.image
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .context("failed to encode stage crop as png")?;
        Ok(buf)
    }
}

/// Visual result for one request. `Unavailable` never fails the request.
#[derive(Debug, Clone)]
pub enum VisualOutcome {
    Available(ImageRegion),
    Unavailable { reason: String },
}

/// Grid cell for `stage`: row = stage / cols, col = stage % cols,
/// with integer cell sizes. `None` when the stage lies outside the grid
/// or the image is too small to give every cell at least one pixel.
pub fn crop_rect(width: u32, height: u32, stage: usize, cols: u32, rows: u32) -> Option<CropRect> {
    if cols == 0 || rows == 0 || stage >= (cols as usize) * (rows as usize) {
        return None;
    }
    let cell_w = width / cols;
    let cell_h = height / rows;
    if cell_w == 0 || cell_h == 0 {
        return None;
    }
    let row = stage as u32 / cols;
    let col = stage as u32 % cols;
    Some(CropRect {
        left: col * cell_w,
        upper: row * cell_h,
        right: (col + 1) * cell_w,
        lower: (row + 1) * cell_h,
    })
}

impl ReferenceImage {
    pub fn new(image: DynamicImage, cols: u32, rows: u32) -> Self {
        Self { image, cols, rows }
    }

    pub fn open(path: &Path, cols: u32, rows: u32) -> Result<Self> {
        let image = image::open(path)
            .with_context(|| format!("failed to open reference image {}", path.display()))?;
        let (w, h) = image.dimensions();
        if cols == 0 || rows == 0 || w < cols || h < rows {
            bail!("{}x{} reference image too small for a {}x{} grid", w, h, cols, rows);
        }
        Ok(Self::new(image, cols, rows))
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn grid(&self) -> (u32, u32) {
        (self.cols, self.rows)
    }

    pub fn crop_for_stage(&self, stage: usize) -> Option<ImageRegion> {
        let (w, h) = self.image.dimensions();
        let rect = crop_rect(w, h, stage, self.cols, self.rows)?;
        let image = self
            .image
            .crop_imm(rect.left, rect.upper, rect.width(), rect.height());
        Some(ImageRegion { stage, rect, image })
    }
}

/// Map a stage to its reference crop, degrading to `Unavailable` instead of failing.
pub fn visual_for_stage(reference: Option<&ReferenceImage>, stage: usize) -> VisualOutcome {
    let Some(reference) = reference else {
        return VisualOutcome::Unavailable {
            reason: "reference image not found".to_string(),
        };
    };
    match reference.crop_for_stage(stage) {
        Some(region) => VisualOutcome::Available(region),
        None => {
            let (cols, rows) = reference.grid();
            let (w, h) = reference.dimensions();
            let reason = if cols == 0 || rows == 0 || w < cols || h < rows {
                format!("{}x{} reference image too small for a {}x{} grid", w, h, cols, rows)
            } else {
                format!("stage {} outside {}x{} reference grid", stage, cols, rows)
            };
            VisualOutcome::Unavailable { reason }
        }
    }
}
