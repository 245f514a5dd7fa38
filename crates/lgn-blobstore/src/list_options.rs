use crate::{gateway::ListOptions, path::SEPARATOR, ListContainerOptions};

/// Translates generic listing options into native ones.
///
/// | directory | recursive | native scope              |
/// |-----------|-----------|---------------------------|
/// | none      | true      | prefix `""`               |
/// | none      | false     | under path `""`           |
/// | `d`       | true      | prefix `d/`               |
/// | `d`       | false     | under path `d`            |
///
/// A recursive listing of a directory uses the directory followed by the
/// separator as prefix, so that `d1` does not also match `d10/...`.
///
/// The marker and page size are copied as-is. This never fails: an option set
/// the backend does not accept is reported by the backend itself.
pub fn to_native_list_options(from: &ListContainerOptions) -> ListOptions {
    let directory = from
        .directory
        .as_deref()
        .map(|directory| directory.trim_matches(SEPARATOR))
        .filter(|directory| !directory.is_empty());

    let options = match (directory, from.recursive) {
        (None, true) => ListOptions::default().with_prefix(""),
        (None, false) => ListOptions::default().under_path(""),
        (Some(directory), true) => {
            ListOptions::default().with_prefix(format!("{}{}", directory, SEPARATOR))
        }
        (Some(directory), false) => ListOptions::default().under_path(directory),
    };

    let options = match &from.marker {
        Some(marker) => options.after_marker(marker.clone()),
        None => options,
    };

    match from.max_results {
        Some(max_results) => options.max_results(max_results),
        None => options,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::ListScope;

    #[test]
    fn test_root_listings_have_distinct_shapes() {
        let recursive = to_native_list_options(&ListContainerOptions::new().recursive());
        let flat = to_native_list_options(&ListContainerOptions::new());

        assert_eq!(recursive.scope, ListScope::Prefix(String::new()));
        assert_eq!(flat.scope, ListScope::UnderPath(String::new()));
        assert_ne!(recursive, flat);
    }

    #[test]
    fn test_directory_listings() {
        let options =
            to_native_list_options(&ListContainerOptions::new().in_directory("d1").recursive());
        assert_eq!(options.scope, ListScope::Prefix("d1/".to_string()));

        let options = to_native_list_options(&ListContainerOptions::new().in_directory("d1"));
        assert_eq!(options.scope, ListScope::UnderPath("d1".to_string()));

        let options = to_native_list_options(&ListContainerOptions::new().in_directory("/d1/"));
        assert_eq!(options.scope, ListScope::UnderPath("d1".to_string()));
    }

    #[test]
    fn test_marker_and_max_results() {
        let from = ListContainerOptions::new()
            .after_marker("d1/b.txt")
            .max_results(10);
        let options = to_native_list_options(&from);

        assert_eq!(options.marker.as_deref(), Some("d1/b.txt"));
        assert_eq!(options.max_results, Some(10));

        let options = to_native_list_options(&ListContainerOptions::new());

        assert_eq!(options.marker, None);
        assert_eq!(options.max_results, None);
    }

    #[test]
    fn test_translation_is_pure() {
        let from = ListContainerOptions::new()
            .in_directory("d1")
            .after_marker("m")
            .max_results(3);
        let snapshot = from.clone();

        assert_eq!(to_native_list_options(&from), to_native_list_options(&from));
        assert_eq!(from, snapshot);
    }
}
