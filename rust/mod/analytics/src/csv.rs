//! CSV rendering of report rows.

use serde_json::Value;

/// Render JSON objects as CSV.
///
/// Columns come from the keys of the first row. Every present value is
/// double-quoted with embedded quotes doubled; null or missing values are
/// empty fields; nested objects and arrays are written as JSON text.
/// Whole-number floats are written without a fractional part (`12.0` as
/// `12`). Rows are separated by `\n` with no trailing newline.
pub fn to_csv(rows: &[Value]) -> String {
    let Some(first) = rows.first().and_then(Value::as_object) else {
        return String::new();
    };
    let headers: Vec<&String> = first.keys().collect();

    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(
        headers
            .iter()
            .map(|h| h.as_str())
            .collect::<Vec<_>>()
            .join(","),
    );
    for row in rows {
        let fields: Vec<String> = headers
            .iter()
            .map(|h| field(row.get(h.as_str())))
            .collect();
        lines.push(fields.join(","));
    }
    lines.join("\n")
}

fn field(value: Option<&Value>) -> String {
    let text = match value {
        None | Some(Value::Null) => return String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => number(n),
        Some(other) => other.to_string(),
    };
    format!("\"{}\"", text.replace('"', "\"\""))
}

fn number(n: &serde_json::Number) -> String {
    match n.as_f64() {
        Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
        _ => n.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_is_empty_string() {
        assert_eq!(to_csv(&[]), "");
    }

    #[test]
    fn quotes_every_value() {
        let rows = vec![
            json!({"name": "Night shift", "count": 3, "ok": true}),
            json!({"name": "say \"hi\"", "count": null, "ok": false}),
        ];
        assert_eq!(
            to_csv(&rows),
            "name,count,ok\n\"Night shift\",\"3\",\"true\"\n\"say \"\"hi\"\"\",,\"false\""
        );
    }

    #[test]
    fn whole_floats_drop_the_fraction() {
        let rows = vec![json!({"avg": 12.0, "rate": 12.5, "neg": -3.0, "n": 7})];
        let csv = to_csv(&rows);
        let body = csv.lines().nth(1).unwrap();
        assert_eq!(body, "\"12\",\"12.5\",\"-3\",\"7\"");
    }

    #[test]
    fn nested_values_are_json() {
        let rows = vec![json!({"flags": ["SOX"], "details": {"a": "b"}})];
        let csv = to_csv(&rows);
        let body = csv.lines().nth(1).unwrap();
        assert_eq!(body, "\"[\"\"SOX\"\"]\",\"{\"\"a\"\":\"\"b\"\"}\"");
    }

    #[test]
    fn header_follows_first_row() {
        let rows = vec![json!({"b": 1, "a": 2}), json!({"a": 5, "c": 9})];
        let csv = to_csv(&rows);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "b,a");
        assert_eq!(lines[0].split(',').count(), 2);
        assert_eq!(lines[2], ",\"5\"");
    }
}
