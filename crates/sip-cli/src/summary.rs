use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

use sip_cli::pipeline::{MapOutcome, StatsOutcome};
use sip_model::{RecDefNode, RecDefTree};

pub fn print_schema(tree: &RecDefTree) {
    println!(
        "Record definition: {} {}",
        tree.prefix(),
        tree.rec_def().version
    );
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Path"),
        header_cell("Flags"),
        header_cell("Type"),
        header_cell("Field"),
        header_cell("System"),
        header_cell("Search"),
    ]);
    apply_table_style(&mut table);
    for node in tree.walk() {
        table.add_row(vec![
            path_cell(node),
            Cell::new(flags(node)),
            optional_cell(node.field_type.as_deref()),
            Cell::new(&node.field_name),
            optional_cell(node.system_field.as_deref()),
            optional_cell(node.search_field.as_deref()),
        ]);
    }
    println!("{table}");
}

pub fn print_map_summary(outcome: &MapOutcome) {
    let mut table = Table::new();
    table.set_header(vec![header_cell("Outcome"), header_cell("Records")]);
    apply_table_style(&mut table);
    align_column(&mut table, 1, CellAlignment::Right);
    table.add_row(vec![
        Cell::new("Mapped"),
        Cell::new(outcome.mapped).fg(Color::Green),
    ]);
    table.add_row(vec![
        Cell::new("Failed"),
        count_cell(outcome.failures.len(), Color::Red),
    ]);
    table.add_row(vec![
        Cell::new("Skipped"),
        count_cell(outcome.skipped.len(), Color::Red),
    ]);
    table.add_row(vec![
        Cell::new("Missing required fields"),
        count_cell(outcome.missing_fields.len(), Color::Yellow),
    ]);
    table.add_row(vec![
        Cell::new("TOTAL")
            .fg(Color::Cyan)
            .add_attribute(Attribute::Bold),
        Cell::new(outcome.records()).add_attribute(Attribute::Bold),
    ]);
    println!("{table}");

    if !outcome.warnings.is_empty() {
        println!("Mapping warnings:");
        for warning in &outcome.warnings {
            println!("  {warning}");
        }
    }
    if !outcome.failures.is_empty() {
        let mut failures = Table::new();
        failures.set_header(vec![header_cell("Record"), header_cell("Error")]);
        apply_table_style(&mut failures);
        for err in &outcome.failures {
            failures.add_row(vec![
                Cell::new(err.record_id()).fg(Color::Red),
                Cell::new(err.to_string()),
            ]);
        }
        println!("{failures}");
    }
}

pub fn print_stats_summary(outcome: &StatsOutcome) {
    let stats = &outcome.stats;
    println!("Records: {}", stats.records());
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Path"),
        header_cell("Values"),
        header_cell("Distinct"),
        header_cell("Unique"),
        header_cell("Most frequent"),
    ]);
    apply_table_style(&mut table);
    align_column(&mut table, 1, CellAlignment::Right);
    align_column(&mut table, 2, CellAlignment::Right);
    align_column(&mut table, 3, CellAlignment::Center);
    for (path, field) in stats.fields() {
        let values = field.values();
        let distinct = if values.is_trimmed() {
            format!("{}+", values.len())
        } else {
            values.len().to_string()
        };
        let top = values
            .counters()
            .first()
            .map(|counter| format!("{} ({})", counter.value, counter.count));
        table.add_row(vec![
            Cell::new(path),
            Cell::new(field.total()),
            Cell::new(distinct),
            if field.is_unique() {
                Cell::new("yes").fg(Color::Green)
            } else {
                dim_cell("no")
            },
            optional_cell(top.as_deref()),
        ]);
    }
    println!("{table}");
    for event in stats.capacity_events() {
        println!("  {event}");
    }
    if !outcome.unidentified.is_empty() {
        println!("Records without identifier: {}", outcome.unidentified.len());
    }
}

pub fn apply_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120);
}

fn align_column(table: &mut Table, index: usize, alignment: CellAlignment) {
    if let Some(column) = table.column_mut(index) {
        column.set_cell_alignment(alignment);
    }
}

fn flags(node: &RecDefNode) -> String {
    let mut flags = String::new();
    if node.repeatable {
        flags.push('*');
    }
    if node.required {
        flags.push('!');
    }
    if node.always_present {
        flags.push('+');
    }
    flags
}

fn path_cell(node: &RecDefNode) -> Cell {
    let cell = Cell::new(node.path());
    if node.is_attribute() {
        cell.fg(Color::DarkGrey)
    } else if node.is_leaf() {
        cell
    } else {
        cell.fg(Color::Blue).add_attribute(Attribute::Bold)
    }
}

fn count_cell(count: usize, color: Color) -> Cell {
    if count > 0 {
        Cell::new(count).fg(color).add_attribute(Attribute::Bold)
    } else {
        dim_cell(count)
    }
}

fn optional_cell(value: Option<&str>) -> Cell {
    match value {
        Some(value) => Cell::new(value),
        None => dim_cell("-"),
    }
}

fn header_cell(label: &str) -> Cell {
    Cell::new(label)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

fn dim_cell<T: ToString>(value: T) -> Cell {
    Cell::new(value).fg(Color::DarkGrey)
}
