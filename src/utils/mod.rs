// src/utils/mod.rs

//! Shared utilities.

pub mod http;

pub use http::HttpClient;

use std::collections::HashMap;

/// Replace `{key}` placeholders in `template` with values from `match_map`,
/// or positional `subs` entries when the key is numeric.
pub fn expand(template: &str, match_map: &HashMap<String, String>, subs: &[&str]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        rest = &rest[open + 1..];
        let close = match rest.find('}') {
            Some(i) => i,
            None => break,
        };
        let key = &rest[..close];
        if let Some(v) = match_map.get(key) {
            out.push_str(v);
        } else if let Ok(i) = key.parse::<usize>() {
            if let Some(s) = subs.get(i) {
                out.push_str(s);
            }
        }
        rest = &rest[close + 1..];
    }
    out.push_str(rest);
    out
}
