use serde_json::Value;

use terminal_size::{terminal_size, Width};

// Render an API row array as an ASCII table.
// Returns true if a table was printed (i.e., the value was an array), false otherwise.
pub fn print_rows(val: &Value) -> bool {
    let Value::Array(items) = val else { return false };
    if items.is_empty() {
        println!("(no rows)");
        return true;
    }

    let cols = columns_for(items);
    let rows: Vec<Vec<String>> = items.iter().map(|item| row_cells(item, &cols)).collect();

    let termw = get_terminal_width();
    crate::tprintln!("[cli.outputformatter] detected terminal width={} columns", termw);

    let mut widths: Vec<usize> = cols.iter().map(|c| c.len().min(termw)).collect();
    for r in &rows {
        for (i, cell) in r.iter().enumerate().take(cols.len()) {
            if cell.len() > widths[i] {
                widths[i] = cell.len().min(termw);
            }
        }
    }

    let sep = build_separator(&widths);
    println!("{}", fit_line_to_width(&sep, termw));
    println!("{}", fit_line_to_width(&build_row(&cols, &widths), termw));
    println!("{}", fit_line_to_width(&sep, termw));
    for r in &rows {
        println!("{}", fit_line_to_width(&build_row(r, &widths), termw));
    }
    println!("{}", fit_line_to_width(&sep, termw));
    println!("rows: {}, cols: {}", rows.len(), cols.len());

    true
}

// Columns are the union of keys across all object rows (sorted); scalar rows
// collapse to a single "value" column.
fn columns_for(items: &[Value]) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    let mut any_object = false;
    for item in items {
        if let Value::Object(map) = item {
            any_object = true;
            for k in map.keys() {
                if !keys.iter().any(|existing| existing == k) {
                    keys.push(k.clone());
                }
            }
        }
    }
    if !any_object {
        return vec!["value".to_string()];
    }
    keys.sort();
    keys
}

fn row_cells(item: &Value, cols: &[String]) -> Vec<String> {
    match item {
        Value::Object(map) => cols
            .iter()
            .map(|c| map.get(c).map(cell_text).unwrap_or_default())
            .collect(),
        other => vec![cell_text(other)],
    }
}

fn cell_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn build_separator(widths: &[usize]) -> String {
    let mut s = String::from("+");
    for w in widths {
        s.push_str(&"-".repeat(w + 2));
        s.push('+');
    }
    s
}

fn build_row(cells: &[String], widths: &[usize]) -> String {
    let mut s = String::from("|");
    for (i, w) in widths.iter().enumerate() {
        let cell = cells.get(i).map(String::as_str).unwrap_or("");
        s.push(' ');
        s.push_str(cell);
        if cell.len() < *w {
            s.push_str(&" ".repeat(w - cell.len()));
        }
        s.push_str(" |");
    }
    s
}

fn fit_line_to_width(line: &str, termw: usize) -> String {
    if line.len() <= termw {
        line.to_string()
    } else {
        line.chars().take(termw).collect()
    }
}

fn get_terminal_width() -> usize {
    match terminal_size() {
        Some((Width(w), _)) => w as usize,
        None => 120,
    }
}
