/// Quote a table or column name for interpolation into SQL.
///
/// Names are always quoted so mixed case, spaces and keywords survive;
/// embedded double quotes are doubled.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote and comma-join a list of column names.
pub fn quote_list<S: AsRef<str>>(names: &[S]) -> String {
    names
        .iter()
        .map(|n| quote_identifier(n.as_ref()))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_name_is_quoted() {
        assert_eq!(quote_identifier("events"), "\"events\"");
    }

    #[test]
    fn embedded_quote_is_doubled() {
        assert_eq!(quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn case_and_spaces_preserved() {
        assert_eq!(quote_identifier("Order Items"), "\"Order Items\"");
    }

    #[test]
    fn list_is_comma_joined() {
        assert_eq!(quote_list(&["a", "b"]), "\"a\", \"b\"");
    }
}
