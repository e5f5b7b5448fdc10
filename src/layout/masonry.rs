use crate::models::{CellPlacement, GridModel};

/// Configuration for the responsive masonry grid.
///
/// Cells fill columns left-to-right, top-to-bottom. Portrait cells span two
/// rows; placement never backtracks to fill earlier holes.
#[derive(Debug, Clone)]
pub struct MasonryLayout {
    /// Minimum grid row height in pixels (default: 200)
    pub min_row_height: f32,
    /// Gap between rows and columns in pixels (default: 16)
    pub gap: f32,
    /// Content width at which a second column appears (default: 768)
    pub two_column_width: f32,
    /// Content width at which a third column appears (default: 1024)
    pub three_column_width: f32,
    /// Horizontal margin on narrow layouts (default: 80)
    pub narrow_margin: f32,
    /// Horizontal margin once two columns fit (default: 160)
    pub wide_margin: f32,
}

impl Default for MasonryLayout {
    fn default() -> Self {
        Self {
            min_row_height: 200.0,
            gap: 16.0,
            two_column_width: 768.0,
            three_column_width: 1024.0,
            narrow_margin: 80.0,
            wide_margin: 160.0,
        }
    }
}

impl MasonryLayout {
    pub fn columns_for_width(&self, viewport_width: f32) -> u32 {
        if viewport_width >= self.three_column_width {
            3
        } else if viewport_width >= self.two_column_width {
            2
        } else {
            1
        }
    }

    pub fn margin_for_width(&self, viewport_width: f32) -> f32 {
        if viewport_width >= self.two_column_width {
            self.wide_margin
        } else {
            self.narrow_margin
        }
    }

    fn column_width(&self, viewport_width: f32, columns: u32) -> f32 {
        let usable = viewport_width - 2.0 * self.margin_for_width(viewport_width);
        let gaps = self.gap * columns.saturating_sub(1) as f32;
        ((usable - gaps) / columns.max(1) as f32).max(1.0)
    }

    fn row_height(&self, column_width: f32) -> f32 {
        // A 3:2 landscape fills one row; two rows plus a gap fit a 2:3 portrait.
        (column_width / 1.5).max(self.min_row_height)
    }

    /// Pixel height of a cell spanning `row_span` rows.
    pub fn span_height(&self, grid: &GridModel, row_span: u32) -> f32 {
        let span = row_span.max(1) as f32;
        grid.row_height_px * span + self.gap * (span - 1.0)
    }

    /// Places cells with the given row spans into `columns` columns.
    ///
    /// Returns the placements in input order and the number of rows used.
    pub fn place(&self, spans: &[u32], columns: u32) -> (Vec<CellPlacement>, u32) {
        let columns = columns.max(1) as usize;
        let mut occupied: Vec<Vec<bool>> = Vec::new();
        let mut placements = Vec::with_capacity(spans.len());
        let mut cursor_row = 0usize;
        let mut cursor_col = 0usize;

        let is_free = |occupied: &Vec<Vec<bool>>, row: usize, col: usize, span: usize| {
            (row..row + span).all(|r| occupied.get(r).map_or(true, |cells| !cells[col]))
        };

        for (index, &span) in spans.iter().enumerate() {
            let span = span.max(1) as usize;
            loop {
                if cursor_col >= columns {
                    cursor_row += 1;
                    cursor_col = 0;
                }
                if is_free(&occupied, cursor_row, cursor_col, span) {
                    break;
                }
                cursor_col += 1;
            }

            while occupied.len() < cursor_row + span {
                occupied.push(vec![false; columns]);
            }
            for row in occupied.iter_mut().skip(cursor_row).take(span) {
                row[cursor_col] = true;
            }

            placements.push(CellPlacement {
                index,
                column: cursor_col as u32,
                row: cursor_row as u32,
                row_span: span as u32,
            });
            cursor_col += 1;
        }

        (placements, occupied.len() as u32)
    }

    /// Computes the grid for the given per-cell row spans.
    pub fn compute(&self, spans: &[u32], viewport_width: f32) -> GridModel {
        let viewport_width = if viewport_width.is_finite() {
            viewport_width.max(1.0)
        } else {
            1.0
        };
        let columns = self.columns_for_width(viewport_width);
        let column_width = self.column_width(viewport_width, columns);
        let row_height = self.row_height(column_width);

        if spans.is_empty() {
            return GridModel::new(columns, 0, row_height, column_width, Vec::new());
        }

        let (cells, row_count) = self.place(spans, columns);
        GridModel::new(columns, row_count, row_height, column_width, cells)
    }

    /// Total pixel height of the grid.
    pub fn total_height(&self, grid: &GridModel) -> f32 {
        if grid.row_count == 0 {
            return 0.0;
        }
        let rows = grid.row_count as f32;
        grid.row_height_px * rows + self.gap * (rows - 1.0)
    }
}
