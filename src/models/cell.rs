#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellPlacement {
    /// Index into the photo list.
    pub index: usize,
    pub column: u32,
    pub row: u32,
    pub row_span: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GridModel {
    pub columns: u32,
    /// Number of grid rows in use, including the tail of spanning cells.
    pub row_count: u32,
    /// Height of one grid row in pixels.
    pub row_height_px: f32,
    /// Width of one column in pixels.
    pub column_width_px: f32,
    pub cells: Vec<CellPlacement>,
}

impl GridModel {
    pub fn new(
        columns: u32,
        row_count: u32,
        row_height_px: f32,
        column_width_px: f32,
        cells: Vec<CellPlacement>,
    ) -> Self {
        Self {
            columns,
            row_count,
            row_height_px,
            column_width_px,
            cells,
        }
    }
}
