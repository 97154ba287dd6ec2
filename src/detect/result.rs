/// Result of running detection on a frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetectionResult {
    /// Labelled objects.
    pub detections: Vec<Detection>,
    /// Recognized text regions.
    pub text_blocks: Vec<TextBlock>,
}

impl DetectionResult {
    pub fn is_empty(&self) -> bool {
        self.detections.is_empty() && self.text_blocks.is_empty()
    }
}

/// Box in normalized 0..1 coordinates of the upright frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl BoundingBox {
    pub const FULL_FRAME: BoundingBox = BoundingBox {
        x: 0.0,
        y: 0.0,
        w: 1.0,
        h: 1.0,
    };
}

#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub bounds: BoundingBox,
    pub label: String,
    pub confidence: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TextBlock {
    pub bounds: BoundingBox,
    pub text: String,
}
