/// Ratio used for images that have not been probed or failed to decode.
pub const NEUTRAL_RATIO: f32 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Portrait,
    Landscape,
}

impl Orientation {
    pub fn from_ratio(ratio: f32) -> Self {
        if ratio < 1.0 {
            Self::Portrait
        } else {
            Self::Landscape
        }
    }

    /// Number of grid rows a cell of this orientation occupies.
    pub fn row_span(self) -> u32 {
        match self {
            Self::Portrait => 2,
            Self::Landscape => 1,
        }
    }
}

/// Width/height ratios aligned by index with the photo list they were
/// computed for.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AspectRatioTable {
    pub list_hash: u64,
    pub ratios: Vec<f32>,
}

impl AspectRatioTable {
    pub fn new(list_hash: u64, ratios: Vec<f32>) -> Self {
        Self { list_hash, ratios }
    }

    /// Ratio at `index`, neutral when missing.
    pub fn ratio(&self, index: usize) -> f32 {
        self.ratios.get(index).copied().unwrap_or(NEUTRAL_RATIO)
    }

    pub fn orientation(&self, index: usize) -> Orientation {
        Orientation::from_ratio(self.ratio(index))
    }
}
