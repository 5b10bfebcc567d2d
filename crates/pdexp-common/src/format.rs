pub fn bool_label(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

/// Splits a delimited flag value, dropping blanks.
pub fn split_list(value: &str, delimiter: char) -> Vec<String> {
    value
        .split(delimiter)
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_list_skips_blank_entries() {
        assert_eq!(split_list("P1, ,P2,", ','), vec!["P1", "P2"]);
        assert!(split_list("", ';').is_empty());
    }

    #[test]
    fn bool_labels() {
        assert_eq!(bool_label(true), "true");
        assert_eq!(bool_label(false), "false");
    }
}
