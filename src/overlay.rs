//! Annotated overlay rendering.
//!
//! The overlay is a transparent RGBA raster sized to the source frame and
//! redrawn from scratch every cycle: resize to the current frame dimensions,
//! clear, then draw one box per detection. People are highlighted in red,
//! everything else in green. The renderer is stateless: it retains no
//! detections between cycles, so a cycle's draw can only ever show that
//! cycle's batch.

use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use anyhow::{Context, Result};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;

use crate::detect::{Detection, DetectionBatch};

/// Highlight for "person" detections (red).
pub const PERSON_COLOR: Rgba<u8> = Rgba([0xff, 0x0f, 0x0f, 0xff]);
/// Highlight for every other category (green).
pub const OTHER_COLOR: Rgba<u8> = Rgba([0x00, 0xb6, 0x12, 0xff]);

const LABEL_TAG_HEIGHT: u32 = 14;
const LABEL_TEXT_SCALE: f32 = 12.0;

/// Target surface for overlay drawing.
///
/// Owned by the pipeline and handed to the presentation layer read-only; the
/// renderer resizes it to the source dimensions on every render, since frame
/// dimensions can change with device or orientation.
pub struct OverlaySurface {
    image: RgbaImage,
}

impl OverlaySurface {
    pub fn new() -> Self {
        Self {
            image: RgbaImage::new(0, 0),
        }
    }

    /// Match the surface to the given dimensions and clear it.
    pub fn resize_and_clear(&mut self, width: u32, height: u32) {
        if self.image.dimensions() != (width, height) {
            self.image = RgbaImage::new(width, height);
        } else {
            for pixel in self.image.pixels_mut() {
                *pixel = Rgba([0, 0, 0, 0]);
            }
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// True when every pixel is fully transparent.
    pub fn is_blank(&self) -> bool {
        self.image.pixels().all(|p| p.0[3] == 0)
    }
}

impl Default for OverlaySurface {
    fn default() -> Self {
        Self::new()
    }
}

/// Draws detection boxes and labels onto an `OverlaySurface`.
pub struct OverlayRenderer {
    font: Option<FontVec>,
}

impl OverlayRenderer {
    pub fn new() -> Self {
        Self { font: None }
    }

    /// Load a TTF font for label text. Without a font, boxes get a filled
    /// tag strip instead of text.
    pub fn load_font<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read font file {}", path.display()))?;
        let font = FontVec::try_from_vec(bytes)
            .map_err(|_| anyhow::anyhow!("invalid font file {}", path.display()))?;
        self.font = Some(font);
        Ok(())
    }

    /// Render one cycle's detections.
    ///
    /// The surface is resized to `frame_width` x `frame_height` and cleared
    /// before anything is drawn; an empty batch therefore produces a clean,
    /// correctly sized surface.
    pub fn render(
        &self,
        surface: &mut OverlaySurface,
        batch: &DetectionBatch,
        mirrored: bool,
        frame_width: u32,
        frame_height: u32,
    ) {
        surface.resize_and_clear(frame_width, frame_height);
        if frame_width == 0 || frame_height == 0 {
            return;
        }

        for detection in batch.iter() {
            self.draw_detection(surface, detection, mirrored, frame_width, frame_height);
        }
    }

    fn draw_detection(
        &self,
        surface: &mut OverlaySurface,
        detection: &Detection,
        mirrored: bool,
        frame_width: u32,
        frame_height: u32,
    ) {
        let color = if detection.is_person() {
            PERSON_COLOR
        } else {
            OTHER_COLOR
        };

        let bbox = if mirrored {
            detection.bbox.mirrored(frame_width)
        } else {
            detection.bbox
        };

        // Clamp to the surface; skip boxes that leave no visible area.
        let x0 = bbox.x.max(0.0).min(frame_width as f32 - 1.0) as i32;
        let y0 = bbox.y.max(0.0).min(frame_height as f32 - 1.0) as i32;
        let x1 = (bbox.x + bbox.width).max(0.0).min(frame_width as f32) as i32;
        let y1 = (bbox.y + bbox.height).max(0.0).min(frame_height as f32) as i32;
        let width = (x1 - x0).max(0) as u32;
        let height = (y1 - y0).max(0) as u32;
        if width < 2 || height < 2 {
            return;
        }

        let rect = Rect::at(x0, y0).of_size(width, height);
        draw_hollow_rect_mut(&mut surface.image, rect, color);

        // Label tag sits just above the box, or inside its top edge when the
        // box touches the top of the frame.
        let tag_y = if y0 >= LABEL_TAG_HEIGHT as i32 {
            y0 - LABEL_TAG_HEIGHT as i32
        } else {
            y0
        };
        let tag_width = width.min(frame_width);
        let tag = Rect::at(x0, tag_y).of_size(tag_width, LABEL_TAG_HEIGHT);
        draw_filled_rect_mut(&mut surface.image, tag, color);

        if let Some(font) = &self.font {
            let text = format!("{} {:.0}%", detection.label, detection.confidence * 100.0);
            draw_text_mut(
                &mut surface.image,
                Rgba([0xff, 0xff, 0xff, 0xff]),
                x0 + 2,
                tag_y + 1,
                PxScale::from(LABEL_TEXT_SCALE),
                font,
                &text,
            );
        }
    }
}

impl Default for OverlayRenderer {
    fn default() -> Self {
        Self::new()
    }
}
