/// Converts `MyService`, `my_service` or `HTTPClient` into `myService` / `httpClient`.
#[must_use]
pub fn to_lower_camel(source: &str) -> String {
    let mut result = String::with_capacity(source.len());
    for (index, segment) in source.split(['_', '-', ' ']).filter(|segment| !segment.is_empty()).enumerate() {
        if index == 0 {
            result.push_str(&lower_leading_run(segment));
        } else {
            result.push_str(&upper_first(segment));
        }
    }
    result
}

#[must_use]
pub fn upper_first(source: &str) -> String {
    let mut chars = source.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// An acronym prefix stays together, its last capital starts the next word.
fn lower_leading_run(segment: &str) -> String {
    let chars: Vec<char> = segment.chars().collect();
    let run = chars.iter().take_while(|char| char.is_uppercase()).count();
    let keep_last = run > 1 && chars.get(run).is_some_and(|char| char.is_lowercase());
    let lowered = if keep_last { run - 1 } else { run };

    chars
        .iter()
        .enumerate()
        .flat_map(|(index, char)| {
            if index < lowered {
                char.to_lowercase().collect::<Vec<_>>()
            } else {
                vec![*char]
            }
        })
        .collect()
}

/// Splits a rendered type name (`core::any::type_name`) into its path segments and generic suffix.
///
/// `alloc::vec::Vec<alloc::string::String>` yields `(["alloc", "vec", "Vec"], "<alloc::string::String>")`,
/// `dyn app::EventLog + Send` yields `(["app", "EventLog"], "")`.
#[must_use]
pub fn split_type_path(type_name: &str) -> (Vec<&str>, &str) {
    let trimmed = type_name.trim();
    let trimmed = trimmed.strip_prefix("dyn ").unwrap_or(trimmed);
    let trimmed = trimmed.strip_prefix('&').unwrap_or(trimmed).trim_start();

    let (path, generics) = match trimmed.find('<') {
        Some(position) => trimmed.split_at(position),
        None => (trimmed, ""),
    };
    let path = path.split(" +").next().unwrap_or(path).trim();
    let generics = match generics.rfind('>') {
        Some(end) => &generics[..=end],
        None => generics,
    };

    (path.split("::").filter(|segment| !segment.is_empty()).collect(), generics)
}

#[cfg(test)]
mod tests {
    use super::{split_type_path, to_lower_camel};

    #[test]
    fn test_to_lower_camel() {
        assert_eq!(to_lower_camel("MyService"), "myService");
        assert_eq!(to_lower_camel("my_service"), "myService");
        assert_eq!(to_lower_camel("HTTPClient"), "httpClient");
        assert_eq!(to_lower_camel("ID"), "id");
        assert_eq!(to_lower_camel("service"), "service");
        assert_eq!(to_lower_camel(""), "");
    }

    #[test]
    fn test_split_type_path() {
        assert_eq!(
            split_type_path("alloc::vec::Vec<alloc::string::String>"),
            (vec!["alloc", "vec", "Vec"], "<alloc::string::String>")
        );
        assert_eq!(split_type_path("dyn app::logs::EventLog"), (vec!["app", "logs", "EventLog"], ""));
        assert_eq!(split_type_path("dyn app::EventLog + Send + Sync"), (vec!["app", "EventLog"], ""));
        assert_eq!(split_type_path("i32"), (vec!["i32"], ""));
    }
}
