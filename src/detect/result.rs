/// Label emitted by detection backends for people. The auto-record trigger
/// keys off this label.
pub const PERSON_LABEL: &str = "person";

/// Axis-aligned bounding box in source-frame pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Same box mirrored horizontally within a frame of the given width.
    pub fn mirrored(&self, frame_width: u32) -> Self {
        Self {
            x: frame_width as f32 - self.x - self.width,
            ..*self
        }
    }
}

/// One labeled, localized object found in a frame.
///
/// Produced fresh each cycle and never persisted.
#[derive(Clone, Debug)]
pub struct Detection {
    pub label: String,
    /// Confidence in [0, 1].
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            label: label.into(),
            confidence,
            bbox,
        }
    }

    pub fn is_person(&self) -> bool {
        self.label == PERSON_LABEL
    }
}

/// Ordered detections for one inference cycle. Insertion order is the model
/// output order. May be empty.
#[derive(Clone, Debug, Default)]
pub struct DetectionBatch {
    pub detections: Vec<Detection>,
}

impl DetectionBatch {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self { detections }
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Detection> {
        self.detections.iter()
    }

    pub fn contains_label(&self, label: &str) -> bool {
        self.detections.iter().any(|d| d.label == label)
    }

    /// The auto-record trigger predicate.
    pub fn contains_person(&self) -> bool {
        self.contains_label(PERSON_LABEL)
    }
}
