//! Helpers for rendering deterministic archive paths.

/// Replace every character that is not alphanumeric, `-` or `_` with `_`.
pub fn sanitize_component(name: &str) -> String {
    let sanitized: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if sanitized.is_empty() {
        "_".to_string()
    } else {
        sanitized
    }
}

/// Folder name for a `(target, origin)` pair: `<target>__<origin>`.
pub fn pair_folder_name(target_company: &str, origin_company: &str) -> String {
    format!(
        "{}__{}",
        sanitize_component(target_company),
        sanitize_component(origin_company)
    )
}

/// File name for one step: `NN_<agent>.json`.
pub fn step_file_name(step: u32, agent: &str) -> String {
    format!("{:02}_{}.json", step, sanitize_component(agent))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_path_unsafe_characters() {
        assert_eq!(sanitize_component("acme.com"), "acme_com");
        assert_eq!(sanitize_component("a/b\\c"), "a_b_c");
        assert_eq!(sanitize_component("Big Corp"), "Big_Corp");
        assert_eq!(sanitize_component(".."), "__");
        assert_eq!(sanitize_component("  "), "_");
        assert_eq!(sanitize_component("münchen-re_ag"), "münchen-re_ag");
    }

    #[test]
    fn pair_and_step_names_are_stable() {
        assert_eq!(pair_folder_name("acme.com", "initech"), "acme_com__initech");
        assert_eq!(step_file_name(3, "match_scorer"), "03_match_scorer.json");
        assert_eq!(step_file_name(120, "a"), "120_a.json");
    }
}
