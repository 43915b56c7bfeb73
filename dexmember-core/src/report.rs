//! Output formatting - plaintext and JSON.

use serde_json::json;

use crate::member::Member;

/// Renders one member per line.
pub fn format_plain(members: &[Member]) -> String {
    let mut out = String::new();
    for m in members {
        out.push_str(&m.to_string());
        out.push('\n');
    }
    out
}

/// Prints members in plain text format.
pub fn print_plain(members: &[Member]) {
    print!("{}", format_plain(members));
}

/// Renders members as a JSON document with a total count.
pub fn format_json(members: &[Member], unit_count: usize) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&json!({
        "units": unit_count,
        "count": members.len(),
        "members": members,
    }))
}

/// Prints members in JSON format.
///
/// Falls back to one display string per member if serialization fails.
pub fn print_json(members: &[Member], unit_count: usize) {
    match format_json(members, unit_count) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            tracing::warn!(error = %e, "JSON serialization failed");
            let rendered: Vec<String> = members.iter().map(|m| m.to_string()).collect();
            println!("{{\"members\": {:?}}}", rendered);
        }
    }
}
