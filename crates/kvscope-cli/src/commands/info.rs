use std::collections::BTreeMap;

use kvscope_core::{InfoSections, sample_node};

pub fn run(node: &str, section: Option<&str>, json: bool, timeout_ms: u64) {
    let conn = super::connect_node(node, timeout_ms);
    let info = match sample_node(&conn) {
        Ok(i) => i,
        Err(e) => super::fail(e),
    };

    let wanted = section.map(str::to_lowercase);
    let selected = select(&info.sections, wanted.as_deref());
    if selected.is_empty() {
        if let Some(name) = wanted {
            super::fail(format!("{node} reported no section {name:?}"));
        }
    }

    if json {
        match serde_json::to_string_pretty(&selected) {
            Ok(s) => println!("{s}"),
            Err(e) => super::fail(e),
        }
        return;
    }

    println!("{} ({} sections)", info.address, selected.len());
    for (name, fields) in &selected {
        println!();
        println!("# {name}");
        for (field, value) in fields {
            println!("  {field:<32} {value}");
        }
    }
}

/// Sections (sorted, fields sorted), optionally restricted to one name.
fn select<'a>(
    sections: &'a InfoSections,
    only: Option<&str>,
) -> BTreeMap<&'a str, BTreeMap<&'a str, &'a str>> {
    sections
        .section_names()
        .into_iter()
        .filter(|name| only.is_none_or(|o| o == *name))
        .filter_map(|name| {
            let fields = sections.section(name)?;
            let sorted = fields
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect();
            Some((name, sorted))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvscope_core::parse_info;

    #[test]
    fn test_select_all_sorted() {
        let sections = parse_info("# Server\nredis_version:7.2.4\narch_bits:64\n# Clients\nconnected_clients:1\n");
        let selected = select(&sections, None);
        let names: Vec<&str> = selected.keys().copied().collect();
        assert_eq!(names, vec!["clients", "server"]);
        let fields: Vec<&str> = selected["server"].keys().copied().collect();
        assert_eq!(fields, vec!["arch_bits", "redis_version"]);
    }

    #[test]
    fn test_select_one_section() {
        let sections = parse_info("# Server\nredis_version:7.2.4\n# Keyspace\n");
        let selected = select(&sections, Some("keyspace"));
        assert_eq!(selected.len(), 1);
        assert!(selected["keyspace"].is_empty());
        assert!(select(&sections, Some("cpu")).is_empty());
    }
}
