use std::io::IsTerminal;

use comfy_table::{presets::NOTHING, Attribute, Cell, Table};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct CliTableTheme {
    pub use_color: bool,
}

impl CliTableTheme {
    pub(crate) fn detect() -> Self {
        let is_tty = std::io::stdout().is_terminal();
        let no_color = std::env::var_os("NO_COLOR").is_some();
        resolve_table_theme(is_tty, no_color)
    }

    pub(crate) fn new_data_table(self, headers: &[&str]) -> Table {
        let mut table = Table::new();
        table.load_preset(NOTHING);
        let header_cells: Vec<Cell> = headers.iter().map(|h| self.header_cell(h)).collect();
        table.set_header(header_cells);
        table
    }

    fn header_cell(self, text: &str) -> Cell {
        let mut cell = Cell::new(text);
        if self.use_color {
            cell = cell.add_attribute(Attribute::Bold);
        }
        cell
    }
}

fn resolve_table_theme(is_tty: bool, no_color: bool) -> CliTableTheme {
    CliTableTheme {
        use_color: is_tty && !no_color,
    }
}

#[cfg(test)]
mod tests {
    use comfy_table::presets::NOTHING;

    use super::resolve_table_theme;

    #[test]
    fn resolve_table_theme_enables_color_for_tty() {
        assert!(resolve_table_theme(true, false).use_color);
    }

    #[test]
    fn resolve_table_theme_disables_color_when_no_color_is_set() {
        assert!(!resolve_table_theme(true, true).use_color);
        assert!(!resolve_table_theme(false, false).use_color);
    }

    #[test]
    fn data_table_uses_nothing_preset() {
        let theme = resolve_table_theme(false, false);
        let mut table = theme.new_data_table(&["A", "B"]);
        assert_eq!(table.current_style_as_preset(), NOTHING);
    }
}
