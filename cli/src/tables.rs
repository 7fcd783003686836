//! Minimal column layout for flat report rows.

#[derive(Clone, Copy)]
pub enum Align {
    Left,
    Right,
}

pub struct Column {
    title: String,
    align: Align,

    // True for the one column allowed to shrink when the terminal is
    // narrow (the description, in practice).
    elastic: bool,
}

impl Column {
    pub fn new(title: &str, align: Align) -> Self {
        Column {
            title: title.to_string(),
            align,
            elastic: false,
        }
    }

    pub fn elastic(mut self) -> Self {
        self.elastic = true;
        self
    }
}

pub struct Table {
    columns: Vec<Column>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(columns: Vec<Column>) -> Self {
        Table {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn add_row(&mut self, cells: Vec<String>) {
        self.rows.push(cells);
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn render(&self, max_width: usize) -> String {
        let mut widths: Vec<usize> = self
            .columns
            .iter()
            .map(|c| c.title.chars().count())
            .collect();
        for row in &self.rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.chars().count());
            }
        }

        // If the rows overflow the terminal, the elastic column gives up
        // the difference (down to a readable minimum).
        let sep = "  ";
        let total: usize = widths.iter().sum::<usize>()
            + sep.len() * self.columns.len().saturating_sub(1);
        if total > max_width {
            let over = total - max_width;
            if let Some(idx) = self.columns.iter().position(|c| c.elastic) {
                if let Some(w) = widths.get_mut(idx) {
                    *w = w.saturating_sub(over).max(8);
                }
            }
        }

        let mut out = String::new();
        let titles: Vec<String> =
            self.columns.iter().map(|c| c.title.clone()).collect();
        self.push_row(&mut out, &titles, &widths, sep);
        let dashes: Vec<String> =
            widths.iter().map(|w| "─".repeat(*w)).collect();
        self.push_row(&mut out, &dashes, &widths, sep);
        for row in &self.rows {
            self.push_row(&mut out, row, &widths, sep);
        }
        out
    }

    fn push_row(
        &self,
        out: &mut String,
        cells: &[String],
        widths: &[usize],
        sep: &str,
    ) {
        for (idx, column) in self.columns.iter().enumerate() {
            if idx > 0 {
                out.push_str(sep);
            }
            let width = widths.get(idx).copied().unwrap_or(0);
            let cell = cells.get(idx).map(String::as_str).unwrap_or("");
            let cell = truncated(cell, width);
            match column.align {
                Align::Left => out.push_str(&format!("{cell:<width$}")),
                Align::Right => out.push_str(&format!("{cell:>width$}")),
            }
        }
        // Trailing spaces from the last padded cell add nothing.
        while out.ends_with(' ') {
            out.pop();
        }
        out.push('\n');
    }
}

fn truncated(value: &str, width: usize) -> String {
    if value.chars().count() <= width {
        return value.to_string();
    }
    let kept: String = value
        .chars()
        .take(width.saturating_sub(1))
        .collect();
    format!("{kept}…")
}

#[cfg(test)]
mod test {
    use crate::tables::{Align, Column, Table};

    #[test]
    fn test_alignment_and_truncation() {
        let mut table = Table::new(vec![
            Column::new("Description", Align::Left).elastic(),
            Column::new("Amount", Align::Right),
        ]);
        table.add_row(vec![
            "A VERY LONG MERCHANT DESCRIPTION".to_string(),
            "-12.99".to_string(),
        ]);
        table.add_row(vec!["SHORT".to_string(), "-1.00".to_string()]);

        let wide = table.render(80);
        assert!(wide.contains("A VERY LONG MERCHANT DESCRIPTION"));
        assert!(wide.contains(" -1.00"));

        let narrow = table.render(28);
        assert!(!narrow.contains("A VERY LONG MERCHANT DESCRIPTION"));
        assert!(narrow.contains('…'));
        for line in narrow.lines() {
            assert!(line.chars().count() <= 28, "too wide: {line:?}");
        }
    }
}
